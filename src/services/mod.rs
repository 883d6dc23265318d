//! Background services.

pub mod cleanup;

pub use cleanup::{CleanupConfig, start_cleanup_task};
