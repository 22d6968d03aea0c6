//! SocketCAN transport of the CAN control panel: raw sockets, link control and the socket session.

mod socket;
pub use socket::*;
mod iface;
pub use iface::*;
mod session;
pub use session::*;
