use std::{os::fd::{AsFd, AsRawFd, RawFd}, sync::{Arc, Mutex, MutexGuard}};
use can_core::{decode, encode, error::SessionError, CanFrame, Direct, EventDirection, Listener, Listeners, WireFrame, WIRE_FRAME_SIZE};
use crate::{LinkControl, RawSocket, SocketFactory};

/// Anything that can put a frame on the bus.
pub trait Transmit {
    fn transmit(&self, id: u32, payload: &[u8]) -> Result<(), SessionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Closed,
    Open,
}

struct Opened<S> {
    iface: String,
    socket: S,
}

/// One raw CAN socket bound to one interface.
///
/// Clones share the same socket and listeners. Open, close, send and read are
/// serialized by an internal lock; listeners are notified after the lock is
/// released so they may call back into the session.
pub struct SocketSession<F: SocketFactory, L> {
    factory: Arc<F>,
    link: Arc<L>,
    socket: Arc<Mutex<Option<Opened<F::Socket>>>>,
    listeners: Listeners,
}

impl<F: SocketFactory, L> Clone for SocketSession<F, L> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            link: Arc::clone(&self.link),
            socket: Arc::clone(&self.socket),
            listeners: self.listeners.clone(),
        }
    }
}

impl<F, L> SocketSession<F, L>
where
    F: SocketFactory,
    L: LinkControl,
{
    pub fn new(factory: F, link: Arc<L>) -> Self {
        Self {
            factory: Arc::new(factory),
            link,
            socket: Default::default(),
            listeners: Listeners::new(),
        }
    }

    #[inline]
    pub fn register_listener(&self, name: String, listener: Box<dyn Listener>) -> bool {
        self.listeners.register(name, listener)
    }

    #[inline]
    pub fn unregister_listener(&self, name: &str) -> bool {
        self.listeners.unregister(name)
    }

    #[inline]
    pub fn listener_names(&self) -> Vec<String> {
        self.listeners.names()
    }

    #[inline]
    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub fn status(&self) -> SessionStatus {
        match self.lock().as_ref() {
            Some(_) => SessionStatus::Open,
            None => SessionStatus::Closed,
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.status() == SessionStatus::Open
    }

    /// Interface the socket is bound to, if open.
    pub fn interface(&self) -> Option<String> {
        self.lock().as_ref().map(|o| o.iface.clone())
    }

    /// Descriptor to watch for readability, if open.
    pub fn readable_fd(&self) -> Option<RawFd> {
        self.lock().as_ref().map(|o| o.socket.as_fd().as_raw_fd())
    }

    /// Open and bind a socket on `iface`. Succeeds without effect when already open.
    pub fn open(&self, iface: &str) -> Result<(), SessionError> {
        let result = {
            let mut guard = self.lock();
            if guard.is_some() {
                return Ok(());
            }

            if !self.link.is_up(iface) {
                Err(SessionError::InterfaceDown(iface.to_owned()))
            }
            else {
                self.factory.open(iface)
                    .map(|socket| {
                        *guard = Some(Opened { iface: iface.to_owned(), socket });
                    })
            }
        };

        match &result {
            Ok(()) => {
                log::info!("CAN-PANEL - socket opened on {}", iface);
                self.listeners.status_changed(true);
                self.listeners.text_event(EventDirection::Sys, &format!("Socket opened on {}", iface));
            },
            Err(SessionError::InterfaceDown(_)) => {
                log::warn!("CAN-PANEL - interface {} is down, socket not opened", iface);
                self.listeners.status_changed(false);
                self.listeners.text_event(EventDirection::Sys, &format!("Interface {} is DOWN; cannot open socket", iface));
            },
            Err(e) => {
                log::warn!("CAN-PANEL - open {} failed: {}", iface, e);
                self.listeners.status_changed(false);
                self.listeners.text_event(EventDirection::Sys, &e.to_string());
            },
        }

        result
    }

    /// Release the socket. Safe to call when already closed.
    pub fn close(&self) {
        let closed = self.lock().take();
        if let Some(opened) = closed {
            log::info!("CAN-PANEL - socket on {} closed", opened.iface);
        }

        self.listeners.status_changed(false);
        self.listeners.text_event(EventDirection::Sys, "Socket closed");
    }

    /// Encode and write one extended frame.
    pub fn send(&self, id: u32, payload: &[u8]) -> Result<(), SessionError> {
        let wire = encode(id, payload);
        let result = {
            let guard = self.lock();
            match guard.as_ref() {
                Some(opened) => match opened.socket.write_frame(&wire.as_bytes()) {
                    Ok(WIRE_FRAME_SIZE) => Ok(()),
                    Ok(written) => Err(SessionError::WriteIncomplete { written, expected: WIRE_FRAME_SIZE }),
                    Err(e) => Err(SessionError::os_failure(format!("write failed: {}", e))),
                },
                None => Err(SessionError::NotOpen),
            }
        };

        match &result {
            Ok(()) => {
                let mut frame = decode(&wire);
                frame.set_direct(Direct::Transmit)
                    .set_timestamp(None);
                log::trace!("CAN-PANEL - transmitted: {}", frame);
                self.listeners.frame_transmitted(&frame);
            },
            Err(SessionError::NotOpen) => {
                self.listeners.text_event(EventDirection::Sys, "Not connected. Cannot send.");
            },
            Err(e) => {
                log::warn!("CAN-PANEL - transmit failed: {}", e);
                self.listeners.text_event(EventDirection::Sys, &e.to_string());
            },
        }

        result
    }

    /// Handle one readability notification: a single bounded read.
    ///
    /// Read failures are logged and reported as text events, never returned.
    pub fn on_readable(&self) -> Option<CanFrame> {
        let mut buffer = [0u8; WIRE_FRAME_SIZE];
        let result = {
            let guard = self.lock();
            match guard.as_ref() {
                Some(opened) => opened.socket.read_frame(&mut buffer)
                    .map_err(|e| SessionError::os_failure(format!("read failed: {}", e)))
                    .and_then(|read| WireFrame::from_bytes(&buffer[..read])
                        .ok_or(SessionError::ReadIncomplete(read))),
                None => {
                    log::debug!("CAN-PANEL - readable notification on a closed session");
                    return None;
                },
            }
        };

        match result {
            Ok(wire) => {
                let mut frame = decode(&wire);
                frame.set_timestamp(None);
                log::trace!("CAN-PANEL - received: {}", frame);
                self.listeners.frame_received(&frame);
                Some(frame)
            },
            Err(e) => {
                log::warn!("CAN-PANEL - CAN read error: {}", e);
                self.listeners.text_event(EventDirection::Sys, &format!("CAN read error: {}", e));
                None
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Opened<F::Socket>>> {
        self.socket.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<F, L> Transmit for SocketSession<F, L>
where
    F: SocketFactory,
    L: LinkControl,
{
    #[inline]
    fn transmit(&self, id: u32, payload: &[u8]) -> Result<(), SessionError> {
        self.send(id, payload)
    }
}
