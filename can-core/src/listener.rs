use std::{any::Any, collections::HashMap, fmt::{Display, Formatter}, sync::{Arc, Mutex}};
use crate::frame::CanFrame;

/// Origin of a text event in the frame log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDirection {
    Sys,
    Tx,
    Rx,
}

impl Display for EventDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sys => f.write_str("SYS"),
            Self::Tx => f.write_str("TX"),
            Self::Rx => f.write_str("RX"),
        }
    }
}

pub trait Listener: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    /// Callback when the socket was opened(`true`) or closed(`false`).
    fn on_status_changed(&self, up: bool);
    /// Callback when frame transmit success.
    fn on_frame_transmitted(&self, frame: &CanFrame);
    /// Callback when a frame received.
    fn on_frame_received(&self, frame: &CanFrame);
    /// Callback for free-form log lines.
    fn on_text_event(&self, direction: EventDirection, message: &str);
}

/// Named listener registry shared between clones of its owner.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<Mutex<HashMap<String, Arc<dyn Listener>>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: String, listener: Box<dyn Listener>) -> bool {
        log::trace!("CAN-PANEL - register listener {}", name);
        match self.inner.lock() {
            Ok(mut listeners) => {
                listeners.insert(name, Arc::from(listener));
                true
            },
            Err(e) => {
                log::warn!("CAN-PANEL - listener error {} when registering listener {}", e, name);
                false
            },
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        log::trace!("CAN-PANEL - unregister listener {}", name);
        match self.inner.lock() {
            Ok(mut listeners) => listeners.remove(name).is_some(),
            Err(e) => {
                log::warn!("CAN-PANEL - listener error {} when unregistering listener {}", e, name);
                false
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        match self.inner.lock() {
            Ok(v) => {
                let mut names: Vec<String> = v.keys().cloned().collect();
                names.sort();
                names
            },
            Err(e) => {
                log::warn!("CAN-PANEL - listener error {} when get all listener names", e);
                vec![]
            },
        }
    }

    /// Run `callback` against the listener registered under `name`, if any.
    pub fn listener_callback(&self, name: &str, callback: impl FnOnce(&dyn Listener)) {
        match self.inner.lock() {
            Ok(listeners) => {
                if let Some(listener) = listeners.get(name) {
                    callback(listener.as_ref());
                }
            },
            Err(e) => {
                log::warn!("CAN-PANEL - listener error {} when trying to callback", e);
            }
        }
    }

    #[inline]
    pub fn status_changed(&self, up: bool) {
        self.for_each(|l| l.on_status_changed(up));
    }

    #[inline]
    pub fn frame_transmitted(&self, frame: &CanFrame) {
        self.for_each(|l| l.on_frame_transmitted(frame));
    }

    #[inline]
    pub fn frame_received(&self, frame: &CanFrame) {
        self.for_each(|l| l.on_frame_received(frame));
    }

    #[inline]
    pub fn text_event(&self, direction: EventDirection, message: &str) {
        self.for_each(|l| l.on_text_event(direction, message));
    }

    /// Listeners are collected first so a callback may use the registry again.
    fn for_each(&self, f: impl Fn(&dyn Listener)) {
        let snapshot: Vec<Arc<dyn Listener>> = match self.inner.lock() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(e) => {
                log::warn!("CAN-PANEL - listener error {} when notifying", e);
                return;
            },
        };

        snapshot.iter().for_each(|l| f(l.as_ref()));
    }
}
