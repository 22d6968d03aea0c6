//! **`can-core`**, frame codec, error taxonomy and event listeners of the CAN control panel.

mod constants;
pub use constants::*;
mod frame;
pub use frame::*;
mod listener;
pub use listener::*;

pub mod error;
pub mod utils;
