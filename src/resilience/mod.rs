//! Resilience at the collaborator boundary: retry with bounded timeout
//! and bounded concurrent fan-out.

pub mod limit;
pub mod retry;

pub use limit::fan_out;
pub use retry::{RetryConfig, RetryPolicy};
