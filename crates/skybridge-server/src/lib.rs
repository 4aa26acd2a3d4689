pub mod consumer;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;

pub use consumer::Consumer;
pub use registry::{Connection, ConnectionRegistry, RegistryError};
pub use router::CommandRouter;
pub use server::{AppState, ServerConfig, ServerHandle, build_router, start};
