use std::{any::Any, io, os::{fd::{AsFd, BorrowedFd}, unix::net::UnixDatagram}, sync::{atomic::{AtomicBool, AtomicUsize, Ordering}, Arc, Mutex}};
use can_core::{error::{ControlError, SessionError}, CanFrame, EventDirection, Listener, WIRE_FRAME_SIZE};
use canpanel_socketcan::{LinkControl, RawSocket, SessionStatus, SocketFactory, SocketSession, Transmit};

#[derive(Default)]
struct FakeLink {
    up: AtomicBool,
}

impl FakeLink {
    fn new(up: bool) -> Arc<Self> {
        Arc::new(Self { up: AtomicBool::new(up) })
    }
}

impl LinkControl for FakeLink {
    fn is_up(&self, _: &str) -> bool {
        self.up.load(Ordering::SeqCst)
    }
    fn set_up(&self, _: &str) -> Result<(), ControlError> {
        self.up.store(true, Ordering::SeqCst);
        Ok(())
    }
    fn set_down(&self, _: &str) -> Result<(), ControlError> {
        self.up.store(false, Ordering::SeqCst);
        Ok(())
    }
    fn set_bitrate(&self, _: &str, _: u32) -> Result<(), ControlError> {
        Ok(())
    }
}

struct FakeSocket {
    sock: UnixDatagram,
    short_write: Option<usize>,
}

impl AsFd for FakeSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.sock.as_fd()
    }
}

impl RawSocket for FakeSocket {
    fn write_frame(&self, buf: &[u8]) -> io::Result<usize> {
        match self.short_write {
            Some(n) => Ok(n),
            None => self.sock.send(buf),
        }
    }
    fn read_frame(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.sock.recv(buf)
    }
}

/// Hands out one end of a datagram pair, keeping the other end as the bus.
#[derive(Default)]
struct FakeFactory {
    opened: Arc<AtomicUsize>,
    bus: Arc<Mutex<Option<UnixDatagram>>>,
    short_write: Option<usize>,
    fail: bool,
}

impl SocketFactory for FakeFactory {
    type Socket = FakeSocket;

    fn open(&self, _: &str) -> Result<Self::Socket, SessionError> {
        if self.fail {
            return Err(SessionError::os_failure("bind failed: No such device"));
        }
        let (ours, theirs) = UnixDatagram::pair()
            .map_err(SessionError::os_failure)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        *self.bus.lock().unwrap() = Some(theirs);
        Ok(FakeSocket { sock: ours, short_write: self.short_write })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Status(bool),
    Sent(u32, Vec<u8>),
    Received(u32, Vec<u8>),
    Text(EventDirection, String),
}

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl Listener for Recorder {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn on_status_changed(&self, up: bool) {
        self.events.lock().unwrap().push(Event::Status(up));
    }
    fn on_frame_transmitted(&self, frame: &CanFrame) {
        assert!(frame.timestamp() > 0);
        self.events.lock().unwrap().push(Event::Sent(frame.id(), frame.data().to_vec()));
    }
    fn on_frame_received(&self, frame: &CanFrame) {
        self.events.lock().unwrap().push(Event::Received(frame.id(), frame.data().to_vec()));
    }
    fn on_text_event(&self, direction: EventDirection, message: &str) {
        self.events.lock().unwrap().push(Event::Text(direction, message.to_owned()));
    }
}

fn session(factory: FakeFactory, up: bool) -> (SocketSession<FakeFactory, FakeLink>, Recorder) {
    let session = SocketSession::new(factory, FakeLink::new(up));
    let recorder = Recorder::default();
    session.register_listener("recorder".into(), Box::new(recorder.clone()));
    (session, recorder)
}

#[test]
fn send_without_open_is_not_open() {
    let opened = Arc::new(AtomicUsize::new(0));
    let (session, recorder) = session(FakeFactory { opened: Arc::clone(&opened), ..Default::default() }, true);

    assert_eq!(session.send(0x100, &[1, 2]), Err(SessionError::NotOpen));
    assert_eq!(session.transmit(0x100, &[1, 2]), Err(SessionError::NotOpen));
    assert_eq!(opened.load(Ordering::SeqCst), 0);
    assert_eq!(session.status(), SessionStatus::Closed);
    assert!(recorder.take().iter().all(|e| matches!(e, Event::Text(EventDirection::Sys, _))));
}

#[test]
fn open_on_down_interface() {
    let opened = Arc::new(AtomicUsize::new(0));
    let (session, recorder) = session(FakeFactory { opened: Arc::clone(&opened), ..Default::default() }, false);

    assert_eq!(session.open("can0"), Err(SessionError::InterfaceDown("can0".into())));
    assert_eq!(opened.load(Ordering::SeqCst), 0);
    assert!(!session.is_open());
    assert_eq!(session.readable_fd(), None);
    assert_eq!(recorder.take(), vec![
        Event::Status(false),
        Event::Text(EventDirection::Sys, "Interface can0 is DOWN; cannot open socket".into()),
    ]);
}

#[test]
fn open_os_failure_stays_closed() {
    let (session, recorder) = session(FakeFactory { fail: true, ..Default::default() }, true);

    assert!(matches!(session.open("can0"), Err(SessionError::OsFailure(_))));
    assert!(!session.is_open());
    let events = recorder.take();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], Event::Status(false));
    assert!(matches!(&events[1], Event::Text(EventDirection::Sys, _)));
}

#[test]
fn open_send_end_to_end() -> anyhow::Result<()> {
    let factory = FakeFactory::default();
    let bus = Arc::clone(&factory.bus);
    let opened = Arc::clone(&factory.opened);
    let (session, recorder) = session(factory, true);

    session.open("can0")?;
    assert!(session.is_open());
    assert_eq!(session.interface().as_deref(), Some("can0"));
    assert!(session.readable_fd().is_some());

    // already open
    session.open("can0")?;
    assert_eq!(opened.load(Ordering::SeqCst), 1);

    session.send(0x1803_D028, &[0xDE, 0xAD])?;

    let mut buf = [0u8; 64];
    let n = bus.lock().unwrap().as_ref().unwrap().recv(&mut buf)?;
    assert_eq!(n, WIRE_FRAME_SIZE);
    assert_eq!(&buf[..4], &(0x1803_D028u32 | 0x8000_0000).to_ne_bytes());
    assert_eq!(buf[4], 2);
    assert_eq!(&buf[8..16], &[0xDE, 0xAD, 0, 0, 0, 0, 0, 0]);

    assert_eq!(recorder.take(), vec![
        Event::Status(true),
        Event::Text(EventDirection::Sys, "Socket opened on can0".into()),
        Event::Sent(0x1803_D028, vec![0xDE, 0xAD]),
    ]);

    Ok(())
}

#[test]
fn long_payload_is_truncated() -> anyhow::Result<()> {
    let factory = FakeFactory::default();
    let bus = Arc::clone(&factory.bus);
    let (session, recorder) = session(factory, true);
    session.open("can0")?;
    recorder.take();

    session.send(0x10, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10])?;
    let mut buf = [0u8; 64];
    let n = bus.lock().unwrap().as_ref().unwrap().recv(&mut buf)?;
    assert_eq!(n, WIRE_FRAME_SIZE);
    assert_eq!(buf[4], 8);
    assert_eq!(recorder.take(), vec![Event::Sent(0x10, vec![1, 2, 3, 4, 5, 6, 7, 8])]);

    Ok(())
}

#[test]
fn short_write_is_not_sent() -> anyhow::Result<()> {
    let (session, recorder) = session(FakeFactory { short_write: Some(8), ..Default::default() }, true);
    session.open("can0")?;
    recorder.take();

    assert_eq!(
        session.send(0x10, &[1]),
        Err(SessionError::WriteIncomplete { written: 8, expected: WIRE_FRAME_SIZE })
    );
    let events = recorder.take();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::Text(EventDirection::Sys, _)));

    Ok(())
}

#[test]
fn readable_decodes_and_drops_short_reads() -> anyhow::Result<()> {
    let factory = FakeFactory::default();
    let bus = Arc::clone(&factory.bus);
    let (session, recorder) = session(factory, true);
    session.open("can0")?;
    recorder.take();

    let mut wire = [0u8; WIRE_FRAME_SIZE];
    wire[..4].copy_from_slice(&(0x0CF0_0400u32 | 0x8000_0000 | 0x4000_0000).to_ne_bytes());
    wire[4] = 3;
    wire[8..11].copy_from_slice(&[0xAA, 0xBB, 0xCC]);
    bus.lock().unwrap().as_ref().unwrap().send(&wire)?;

    let frame = session.on_readable().expect("one frame");
    assert_eq!(frame.id(), 0x0CF0_0400);
    assert_eq!(frame.data(), &[0xAA, 0xBB, 0xCC]);

    bus.lock().unwrap().as_ref().unwrap().send(&wire[..10])?;
    assert!(session.on_readable().is_none());

    let events = recorder.take();
    assert_eq!(events[0], Event::Received(0x0CF0_0400, vec![0xAA, 0xBB, 0xCC]));
    assert_eq!(events[1], Event::Text(EventDirection::Sys, format!("CAN read error: {}", SessionError::ReadIncomplete(10))));
    assert!(session.is_open());

    Ok(())
}

#[test]
fn close_is_idempotent() -> anyhow::Result<()> {
    let (session, recorder) = session(FakeFactory::default(), true);

    session.close();
    session.open("can0")?;
    session.close();
    session.close();

    assert!(!session.is_open());
    assert_eq!(session.send(0x10, &[1]), Err(SessionError::NotOpen));
    assert!(session.on_readable().is_none());
    let statuses: Vec<Event> = recorder.take()
        .into_iter()
        .filter(|e| matches!(e, Event::Status(_)))
        .collect();
    assert_eq!(statuses, vec![Event::Status(false), Event::Status(true), Event::Status(false), Event::Status(false)]);

    Ok(())
}

/// Listeners may call back into the session while being notified.
#[test]
fn reentrant_listener() -> anyhow::Result<()> {
    struct Closer(SocketSession<FakeFactory, FakeLink>);
    impl Listener for Closer {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn on_status_changed(&self, _: bool) {}
        fn on_frame_transmitted(&self, _: &CanFrame) {
            self.0.close();
        }
        fn on_frame_received(&self, _: &CanFrame) {}
        fn on_text_event(&self, _: EventDirection, _: &str) {}
    }

    let (session, _recorder) = session(FakeFactory::default(), true);
    session.open("can0")?;
    session.register_listener("closer".into(), Box::new(Closer(session.clone())));
    assert_eq!(session.listener_names(), vec!["closer".to_string(), "recorder".to_string()]);

    session.send(0x10, &[1])?;
    assert!(!session.is_open());
    assert!(session.unregister_listener("closer"));

    Ok(())
}
