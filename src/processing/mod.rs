//! Upload and chat orchestration shared by the HTTP surface.

mod service;
pub mod types;

pub use service::{ChatApi, ChatService};
pub use types::{FailureKind, ServiceError, UploadOutcome};
