pub mod artifacts;
pub mod history;
pub mod orchestrator;
pub mod roles;
pub mod types;

pub use history::{WorkflowRepository, WorkflowSummary};
pub use orchestrator::Orchestrator;
pub use roles::{Role, Stage};
pub use types::{AgentStep, Status, WorkflowMetrics, WorkflowReport, WorkflowRun};
