pub mod error;
mod command;
pub use command::*;
pub mod settings;
pub mod scheduler;
mod panel;
pub use panel::*;
pub mod logger;
pub mod runtime;
