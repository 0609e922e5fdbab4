use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::broadcast;

use crate::{
    foundation::error::{Svg2GifError, Svg2GifResult},
    job::{Artifact, JobEvent, JobId, JobStatus, JobSubscription},
    pipeline::ProgressEvent,
};

struct JobRecord {
    status: JobStatus,
    display_name: String,
    artifact: Option<Artifact>,
    failure_reason: Option<String>,
    last_progress: Option<ProgressEvent>,
    events: broadcast::Sender<JobEvent>,
}

impl JobRecord {
    fn terminal_event(&self) -> Option<JobEvent> {
        match self.status {
            JobStatus::Done => Some(JobEvent::Done {
                size: self.artifact.as_ref().map_or(0, Artifact::len),
            }),
            JobStatus::Error => Some(JobEvent::Error {
                message: self.failure_reason.clone().unwrap_or_default(),
            }),
            JobStatus::Pending | JobStatus::Running => None,
        }
    }
}

/// Point-in-time copy of a job's observable state.
#[derive(Clone, Debug, PartialEq)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub display_name: String,
    pub failure_reason: Option<String>,
    pub last_progress: Option<ProgressEvent>,
}

/// Shared map of live job records.
///
/// Status changes and event publication happen under the same lock as subscription, so a new
/// subscriber either sees a terminal status or is registered before the terminal event is sent.
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, JobRecord>>,
    event_capacity: usize,
}

impl JobRegistry {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            event_capacity: event_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobRecord>> {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn insert(&self, display_name: String) -> JobId {
        let mut jobs = self.lock();
        let id = loop {
            let id = JobId::random();
            if !jobs.contains_key(&id) {
                break id;
            }
        };
        let (events, _) = broadcast::channel(self.event_capacity);
        jobs.insert(
            id.clone(),
            JobRecord {
                status: JobStatus::Pending,
                display_name,
                artifact: None,
                failure_reason: None,
                last_progress: None,
                events,
            },
        );
        id
    }

    /// Returns `false` if the record no longer exists or has already left `pending`.
    pub(crate) fn mark_running(&self, id: &JobId) -> bool {
        match self.lock().get_mut(id) {
            Some(rec) if rec.status == JobStatus::Pending => {
                rec.status = JobStatus::Running;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn publish_progress(&self, id: &JobId, event: ProgressEvent) {
        if let Some(rec) = self.lock().get_mut(id)
            && rec.status == JobStatus::Running
        {
            rec.last_progress = Some(event);
            // No receivers is fine: progress is not queued for late joiners.
            let _ = rec.events.send(JobEvent::Progress(event));
        }
    }

    pub(crate) fn complete(&self, id: &JobId, bytes: Vec<u8>) {
        if let Some(rec) = self.lock().get_mut(id)
            && !rec.status.is_terminal()
        {
            let size = bytes.len();
            rec.status = JobStatus::Done;
            rec.artifact = Some(Artifact {
                bytes: Arc::new(bytes),
                filename: rec.display_name.clone(),
            });
            let _ = rec.events.send(JobEvent::Done { size });
        }
    }

    pub(crate) fn fail(&self, id: &JobId, reason: String) {
        if let Some(rec) = self.lock().get_mut(id)
            && !rec.status.is_terminal()
        {
            let message = if reason.trim().is_empty() {
                "job failed".to_owned()
            } else {
                reason
            };
            rec.status = JobStatus::Error;
            rec.failure_reason = Some(message.clone());
            let _ = rec.events.send(JobEvent::Error { message });
        }
    }

    /// Drop a record. Open subscriptions drain what they already received and then end.
    pub(crate) fn remove(&self, id: &JobId) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn subscribe(&self, id: &JobId) -> Svg2GifResult<JobSubscription> {
        let jobs = self.lock();
        let rec = jobs
            .get(id)
            .ok_or_else(|| Svg2GifError::job_not_found(id.as_str()))?;
        Ok(match rec.terminal_event() {
            Some(event) => JobSubscription::terminal(id.clone(), event),
            None => JobSubscription::live(id.clone(), rec.last_progress, rec.events.subscribe()),
        })
    }

    /// The artifact of a `done` job. Every other case is the same `JobNotFound`.
    pub fn fetch_result(&self, id: &JobId) -> Svg2GifResult<Artifact> {
        self.lock()
            .get(id)
            .filter(|rec| rec.status == JobStatus::Done)
            .and_then(|rec| rec.artifact.clone())
            .ok_or_else(|| Svg2GifError::job_not_found(id.as_str()))
    }

    pub fn status(&self, id: &JobId) -> Option<JobSnapshot> {
        self.lock().get(id).map(|rec| JobSnapshot {
            id: id.clone(),
            status: rec.status,
            display_name: rec.display_name.clone(),
            failure_reason: rec.failure_reason.clone(),
            last_progress: rec.last_progress,
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
