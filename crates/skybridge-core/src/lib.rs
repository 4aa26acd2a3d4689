pub mod config;
pub mod errors;
pub mod types;

pub use config::{EnvironmentName, Settings};
pub use errors::DecodeError;
pub use types::{ClientId, ClientMessage, Command, CommandFrame, Notification};
