pub mod claude;
pub mod prompt;

use async_trait::async_trait;

use crate::error::Result;
use crate::workflow::roles::Role;

/// Runs one prompt on behalf of a role and returns its text output.
///
/// Implementations own any retry or backoff; callers treat an `Err` as final.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, role: Role, prompt: &str) -> Result<String>;
}
