pub mod backend;
pub mod cache;
pub mod jobs;
pub mod storage;
