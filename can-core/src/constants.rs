use bitflags::bitflags;

bitflags! {
    /// Identifier flags carried in the upper bits of the 32-bit wire identifier.
    ///
    /// Flag values correspond to the format used by the Linux [SocketCAN][socketcan]
    /// library, so that the all-in-one 32-bit identifier can be written to a raw socket
    /// as is.
    ///
    /// [socketcan]: https://www.kernel.org/doc/Documentation/networking/can.txt
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IdentifierFlags: u32 {
        /// The frame is using the extended format i.e. 29-bit extended identifiers.
        const EXTENDED = 0x8000_0000;
        /// The frame is a remote transmission request.
        const REMOTE = 0x4000_0000;
        /// The frame is an error frame.
        const ERROR = 0x2000_0000;
    }
}

/// Mask for extended identifiers.
pub const EFF_MASK: u32 = 0x1FFF_FFFF;
/// The max sizeof can-frame's data.
pub const CAN_FRAME_MAX_SIZE: usize = 8;
/// The sizeof a classic can-frame on the wire(`struct can_frame`).
pub const WIRE_FRAME_SIZE: usize = 16;
/// Identifier used when no settings are available.
pub const DEFAULT_CAN_ID: u32 = 0x1803_D028;
/// Repeat interval used when the requested one is invalid.
pub const DEFAULT_INTERVAL_MS: u32 = 1000;
