//! Job Orchestrator: asynchronous conversions with observable lifecycle and live progress.
//!
//! Jobs move `pending → running → {done | error}`. Only the task that runs a job mutates its
//! record; observers hold [`JobSubscription`]s that read from a per-job broadcast channel and can
//! be dropped at any time without affecting the job.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

pub mod events;
pub mod orchestrator;
pub mod registry;

pub use events::{JobEvent, JobSubscription};
pub use orchestrator::{JobOrchestrator, OrchestratorOpts};
pub use registry::{JobRegistry, JobSnapshot};

/// Opaque, unguessable job identifier (128 random bits, lowercase hex).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub(crate) fn random() -> Self {
        Self(format!("{:032x}", rand::random::<u128>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// A finished job's output, offered under `filename`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Arc<Vec<u8>>,
    pub filename: String,
}

impl Artifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
