pub mod config;
pub mod error;
pub mod plugin;
pub mod session;
mod slot;

pub use config::*;
pub use error::*;
pub use plugin::*;
pub use session::*;
pub use slot::{RequestHandle, SlotState};
