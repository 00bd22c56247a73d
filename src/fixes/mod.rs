//! Fix application: per-category handlers, backups, retries and batching

pub mod applicator;
pub mod backup;
pub mod batch;
pub mod handlers;
pub mod retry;

pub use applicator::FixApplicator;
pub use backup::{BackupStore, ResourceBackup, ResourceSnapshot, ResourceType};
pub use batch::BatchFixApplicator;
pub use handlers::{extract_module_name, select_handler, FixHandler, RESERVED_ENV_KEYS};
pub use retry::with_retry;
