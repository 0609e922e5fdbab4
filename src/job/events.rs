use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::{job::JobId, pipeline::ProgressEvent};

/// Typed notification on a job's progress stream.
///
/// Serialized as `{"type": "progress", "currentIndex", "totalCount", "phase"}`,
/// `{"type": "done", "size"}` or `{"type": "error", "message"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobEvent {
    Progress(ProgressEvent),
    Done { size: usize },
    Error { message: String },
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

/// One observer's view of a job's events.
///
/// Yields progress events followed by exactly one terminal event, then `None`. A subscriber that
/// falls behind skips the progress events it missed; the job never waits for it.
#[derive(Debug)]
pub struct JobSubscription {
    job_id: JobId,
    replay: Option<JobEvent>,
    rx: Option<broadcast::Receiver<JobEvent>>,
    finished: bool,
}

impl JobSubscription {
    pub(crate) fn terminal(job_id: JobId, event: JobEvent) -> Self {
        Self {
            job_id,
            replay: Some(event),
            rx: None,
            finished: false,
        }
    }

    pub(crate) fn live(
        job_id: JobId,
        last_progress: Option<ProgressEvent>,
        rx: broadcast::Receiver<JobEvent>,
    ) -> Self {
        Self {
            job_id,
            replay: last_progress.map(JobEvent::Progress),
            rx: Some(rx),
            finished: false,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub async fn next(&mut self) -> Option<JobEvent> {
        if self.finished {
            return None;
        }
        if let Some(event) = self.replay.take() {
            if event.is_terminal() {
                self.finish();
            }
            return Some(event);
        }

        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.is_terminal() {
                        self.finish();
                    }
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(job = %self.job_id, skipped, "subscriber lagged behind job events");
                }
                Err(RecvError::Closed) => {
                    self.finish();
                    return None;
                }
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.rx = None;
    }
}
