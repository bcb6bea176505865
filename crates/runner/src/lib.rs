//! Outbound HTTP clients.
//!
//! - [`workflow`]: hands run payloads to the external workflow runner's webhook.
//! - [`pages`]: looks up the current display name of a publishing page.

pub mod error;
pub mod pages;
pub mod workflow;

pub use error::RunnerError;
pub use pages::{GraphPageDirectory, PageDirectory};
pub use workflow::{HttpWorkflowRunner, RunPayload, WorkflowRunner};
