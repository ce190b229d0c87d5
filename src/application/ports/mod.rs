pub mod file_export;
pub mod local_storage;
pub mod remote_backend;

pub use file_export::FileExporter;
pub use local_storage::LocalStorage;
pub use remote_backend::RemoteBackend;
