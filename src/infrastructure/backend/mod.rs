pub mod error;
pub mod memory_backend;
pub mod rest_backend;

pub use error::RemoteError;
pub use memory_backend::MemoryBackend;
pub use rest_backend::RestBackend;
