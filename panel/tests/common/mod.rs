#![allow(dead_code)]

use std::{any::Any, io, os::{fd::{AsFd, BorrowedFd}, unix::net::UnixDatagram}, sync::{atomic::{AtomicBool, Ordering}, Arc, Mutex}};
use can_core::{error::{ControlError, SessionError}, CanFrame, EventDirection, Listener, WIRE_FRAME_SIZE};
use canpanel::{settings::Settings, Command, ControlPanel};
use canpanel_socketcan::{LinkControl, RawSocket, SocketFactory};

#[derive(Default)]
pub struct FakeLink {
    pub up: AtomicBool,
    pub fail: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeLink {
    pub fn new(up: bool) -> Arc<Self> {
        Arc::new(Self { up: AtomicBool::new(up), ..Default::default() })
    }

    pub fn calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn record(&self, call: String) -> Result<(), ControlError> {
        self.calls.lock().unwrap().push(call);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ControlError::CommandFailed(1));
        }
        Ok(())
    }
}

impl LinkControl for FakeLink {
    fn is_up(&self, _: &str) -> bool {
        self.up.load(Ordering::SeqCst)
    }
    fn set_up(&self, iface: &str) -> Result<(), ControlError> {
        self.record(format!("{iface} up"))?;
        self.up.store(true, Ordering::SeqCst);
        Ok(())
    }
    fn set_down(&self, iface: &str) -> Result<(), ControlError> {
        self.record(format!("{iface} down"))?;
        self.up.store(false, Ordering::SeqCst);
        Ok(())
    }
    fn set_bitrate(&self, iface: &str, bitrate: u32) -> Result<(), ControlError> {
        self.record(format!("{iface} bitrate {bitrate}"))
    }
}

pub struct FakeSocket(UnixDatagram);

impl AsFd for FakeSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl RawSocket for FakeSocket {
    fn write_frame(&self, buf: &[u8]) -> io::Result<usize> {
        self.0.send(buf)
    }
    fn read_frame(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.recv(buf)
    }
}

/// Keeps the far end of every opened socket so written frames can be read back.
#[derive(Clone, Default)]
pub struct FakeFactory {
    pub bus: Arc<Mutex<Option<UnixDatagram>>>,
}

impl FakeFactory {
    /// Payloads of every frame written so far.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        let guard = self.bus.lock().unwrap();
        let Some(bus) = guard.as_ref() else { return vec![] };
        bus.set_nonblocking(true).unwrap();

        let mut frames = Vec::new();
        let mut buf = [0u8; WIRE_FRAME_SIZE];
        while let Ok(n) = bus.recv(&mut buf) {
            assert_eq!(n, WIRE_FRAME_SIZE);
            let dlc = buf[4] as usize;
            frames.push(buf[8..8 + dlc].to_vec());
        }
        frames
    }

    pub fn inject(&self, wire: &[u8]) {
        self.bus.lock().unwrap().as_ref().unwrap().send(wire).unwrap();
    }
}

impl SocketFactory for FakeFactory {
    type Socket = FakeSocket;

    fn open(&self, _: &str) -> Result<Self::Socket, SessionError> {
        let (ours, theirs) = UnixDatagram::pair()
            .map_err(SessionError::os_failure)?;
        *self.bus.lock().unwrap() = Some(theirs);
        Ok(FakeSocket(ours))
    }
}

#[derive(Clone, Default)]
pub struct Recorder {
    pub lines: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap())
    }
}

impl Listener for Recorder {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn on_status_changed(&self, up: bool) {
        self.lines.lock().unwrap().push(format!("status {up}"));
    }
    fn on_frame_transmitted(&self, frame: &CanFrame) {
        self.lines.lock().unwrap().push(format!("tx {:08X} {:02X?}", frame.id(), frame.data()));
    }
    fn on_frame_received(&self, frame: &CanFrame) {
        self.lines.lock().unwrap().push(format!("rx {:08X} {:02X?}", frame.id(), frame.data()));
    }
    fn on_text_event(&self, direction: EventDirection, message: &str) {
        self.lines.lock().unwrap().push(format!("{direction} {message}"));
    }
}

pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.set_payload(Command::Forward, vec![0x01])
        .set_payload(Command::Backward, vec![0x02])
        .set_payload(Command::Left, vec![0x03])
        .set_payload(Command::Right, vec![0x04])
        .set_payload(Command::Stop, vec![0x00]);
    settings
}

pub struct Harness {
    pub panel: ControlPanel<FakeFactory, FakeLink>,
    pub factory: FakeFactory,
    pub link: Arc<FakeLink>,
    pub recorder: Recorder,
}

pub fn harness(up: bool) -> Harness {
    let factory = FakeFactory::default();
    let link = FakeLink::new(up);
    let panel = ControlPanel::new(settings(), factory.clone(), Arc::clone(&link));
    let recorder = Recorder::default();
    panel.session().register_listener("recorder".into(), Box::new(recorder.clone()));

    Harness { panel, factory, link, recorder }
}
