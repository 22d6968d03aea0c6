use crate::constants::{IdentifierFlags, CAN_FRAME_MAX_SIZE, EFF_MASK, WIRE_FRAME_SIZE};
use super::{CanFrame, Direct};

/// Wire image of a classic CAN frame, layout compatible with the kernel's `struct can_frame`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WireFrame {
    pub can_id: u32,
    pub can_dlc: u8,
    pub(crate) pad: u8,
    pub(crate) res0: u8,
    pub(crate) len8_dlc: u8,
    pub data: [u8; CAN_FRAME_MAX_SIZE],
}

const _: () = assert!(std::mem::size_of::<WireFrame>() == WIRE_FRAME_SIZE);

impl WireFrame {
    /// Raw bytes as written to a CAN_RAW socket, in native byte order.
    pub fn as_bytes(&self) -> [u8; WIRE_FRAME_SIZE] {
        let mut bytes = [0u8; WIRE_FRAME_SIZE];
        bytes[..4].copy_from_slice(&self.can_id.to_ne_bytes());
        bytes[4] = self.can_dlc;
        bytes[5] = self.pad;
        bytes[6] = self.res0;
        bytes[7] = self.len8_dlc;
        bytes[8..].copy_from_slice(&self.data);
        bytes
    }

    /// Rebuild a wire frame from a read buffer, `None` unless it holds exactly one frame.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != WIRE_FRAME_SIZE {
            return None;
        }

        let mut can_id = [0u8; 4];
        can_id.copy_from_slice(&bytes[..4]);
        let mut data = [0u8; CAN_FRAME_MAX_SIZE];
        data.copy_from_slice(&bytes[8..]);

        Some(Self {
            can_id: u32::from_ne_bytes(can_id),
            can_dlc: bytes[4],
            pad: bytes[5],
            res0: bytes[6],
            len8_dlc: bytes[7],
            data,
        })
    }
}

/// Encode an identifier and payload as an extended frame.
///
/// The id is masked to 29 bits and flagged extended, the payload is silently
/// truncated to 8 bytes and unused data bytes are zero.
pub fn encode(id: u32, payload: &[u8]) -> WireFrame {
    let dlc = payload.len().min(CAN_FRAME_MAX_SIZE);
    let mut frame = WireFrame {
        can_id: (id & EFF_MASK) | IdentifierFlags::EXTENDED.bits(),
        can_dlc: dlc as u8,
        ..Default::default()
    };
    frame.data[..dlc].copy_from_slice(&payload[..dlc]);

    frame
}

/// Decode a wire frame, stripping the flag bits and copying `dlc` bytes of payload.
pub fn decode(wire: &WireFrame) -> CanFrame {
    let dlc = (wire.can_dlc as usize).min(CAN_FRAME_MAX_SIZE);

    CanFrame {
        timestamp: 0,
        id: wire.can_id & EFF_MASK,
        data: wire.data[..dlc].to_vec(),
        direct: Direct::Receive,
    }
}
