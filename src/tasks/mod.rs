//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache instance
//! is initialized.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired cache items at configured intervals

mod cleanup;

pub use cleanup::spawn_cleanup_task;
