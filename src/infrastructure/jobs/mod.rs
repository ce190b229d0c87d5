pub mod auto_backup;
pub mod mirror_queue;
pub mod rate_limit_sweep;

pub use auto_backup::spawn_auto_backup;
pub use mirror_queue::{MirrorJob, MirrorQueue, MirrorStatus};
pub use rate_limit_sweep::spawn_rate_limit_sweep;
