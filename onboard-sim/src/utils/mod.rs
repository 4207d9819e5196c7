//! Utility modules for onboard-sim

pub mod db_retry;
pub mod deadline;
pub mod json_reply;

pub use db_retry::retry_on_lock;
pub use deadline::{with_deadline, DeadlineError};
pub use json_reply::extract_json_object;
