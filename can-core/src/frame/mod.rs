mod wire;
pub use wire::*;

use std::fmt::{Display, Formatter, Write};
use crate::constants::{CAN_FRAME_MAX_SIZE, EFF_MASK};
use crate::utils::system_timestamp;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Direct {
    #[default]
    Transmit,
    Receive,
}

impl Display for Direct {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transmit => f.write_str("Tx"),
            Self::Receive => f.write_str("Rx"),
        }
    }
}

/// A classic CAN frame with a 29-bit extended identifier.
///
/// The identifier never carries the extended/remote/error flag bits and the
/// payload never exceeds [`CAN_FRAME_MAX_SIZE`] bytes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CanFrame {
    pub(crate) timestamp: u64,
    pub(crate) id: u32,
    pub(crate) data: Vec<u8>,
    pub(crate) direct: Direct,
}

impl CanFrame {
    /// Build a frame, masking the id to 29 bits and truncating the payload to 8 bytes.
    pub fn new(id: u32, data: &[u8]) -> Self {
        let length = data.len().min(CAN_FRAME_MAX_SIZE);
        if length < data.len() {
            log::debug!("CAN-PANEL - payload of {} bytes truncated to {}", data.len(), length);
        }

        Self {
            timestamp: 0,
            id: id & EFF_MASK,
            data: data[..length].to_vec(),
            direct: Default::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// ensure return the actual length of data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Set the timestamp in milliseconds since epoch, `None` means now.
    #[inline]
    pub fn set_timestamp(&mut self, value: Option<u64>) -> &mut Self {
        self.timestamp = value.unwrap_or_else(system_timestamp);
        self
    }

    #[inline]
    pub fn direct(&self) -> Direct {
        self.direct
    }

    #[inline]
    pub fn set_direct(&mut self, direct: Direct) -> &mut Self {
        self.direct = direct;
        self
    }
}

impl Display for CanFrame {
    /// Output Frame as `asc` String.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let data_str = self.data
            .iter()
            .fold(String::new(), |mut out, &b| {
                let _ = write!(out, "{b:02x} ");
                out
            });

        write!(f, "{:.3} {}x {} d {} {}",
               self.timestamp as f64 / 1000.,
               format!("{: >8x}", self.id),
               self.direct,
               format!("{: >2}", self.length()),
               data_str,
        )
    }
}
