use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::PipelineMode;
use crate::error::{AppError, Result};

/// A pipeline specialization with a fixed position in the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ProductManager,
    Architect,
    Database,
    Backend,
    Frontend,
    Security,
    Qa,
    Devops,
    TechWriter,
}

/// The fixed role order every run follows.
pub const SEQUENCE: [Role; 9] = [
    Role::ProductManager,
    Role::Architect,
    Role::Database,
    Role::Backend,
    Role::Frontend,
    Role::Security,
    Role::Qa,
    Role::Devops,
    Role::TechWriter,
];

/// Roles that only depend on the architect and can run side by side.
pub const PARALLEL_BRANCH: [Role; 3] = [Role::Database, Role::Backend, Role::Frontend];

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ProductManager => "product_manager",
            Role::Architect => "architect",
            Role::Database => "database",
            Role::Backend => "backend",
            Role::Frontend => "frontend",
            Role::Security => "security",
            Role::Qa => "qa",
            Role::Devops => "devops",
            Role::TechWriter => "tech_writer",
        }
    }

    /// Position of this role in [`SEQUENCE`].
    pub fn position(&self) -> usize {
        SEQUENCE.iter().position(|r| r == self).unwrap_or(SEQUENCE.len())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        SEQUENCE
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| AppError::InputValidation(format!("Unknown role: {s}")))
    }
}

/// One unit of scheduling in a pipeline plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// A role that runs alone, after everything before it.
    Single(Role),
    /// Independent roles run concurrently and joined all-or-nothing.
    Parallel(Vec<Role>),
}

impl Stage {
    pub fn roles(&self) -> &[Role] {
        match self {
            Stage::Single(role) => std::slice::from_ref(role),
            Stage::Parallel(roles) => roles,
        }
    }
}

/// Lay out the stages for a pipeline mode.
///
/// Flattening the plan always yields [`SEQUENCE`], so step order in a run
/// matches the fixed role order in either mode.
pub fn plan(mode: PipelineMode) -> Vec<Stage> {
    match mode {
        PipelineMode::Sequential => SEQUENCE.iter().copied().map(Stage::Single).collect(),
        PipelineMode::Parallel => {
            let mut stages = Vec::new();
            let mut branch_added = false;
            for role in SEQUENCE {
                if PARALLEL_BRANCH.contains(&role) {
                    if !branch_added {
                        stages.push(Stage::Parallel(PARALLEL_BRANCH.to_vec()));
                        branch_added = true;
                    }
                } else {
                    stages.push(Stage::Single(role));
                }
            }
            stages
        }
    }
}
