mod actions;
mod client;
mod coordinator;
mod diff;
mod error;
mod handle;
mod logger;
pub mod login;
mod protocol;
mod types;

pub use client::{CosaClient, CosaClientBuilder};
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use error::{ConnectError, Error, Result};
pub use handle::CoordinatorHandle;
pub use logger::MessageLogMode;
pub use protocol::DEFAULT_HOST;
pub use types::*;
