pub mod connection_pool;
pub mod directory_exporter;
pub mod memory_storage;
mod queries;
pub mod sqlite_storage;

pub use connection_pool::ConnectionPool;
pub use directory_exporter::DirectoryExporter;
pub use memory_storage::MemoryLocalStorage;
pub use sqlite_storage::SqliteLocalStorage;
