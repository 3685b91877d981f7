//! Process-wide job state, keyed by job id

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a job; `Completed` and `Error` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

/// What happened to one site of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SiteOutcome {
    Written {
        site: String,
        file_name: String,
        matches: usize,
        pages: usize,
    },
    NoMatches {
        site: String,
    },
    Failed {
        site: String,
        reason: String,
    },
}

impl SiteOutcome {
    pub fn site(&self) -> &str {
        match self {
            SiteOutcome::Written { site, .. }
            | SiteOutcome::NoMatches { site }
            | SiteOutcome::Failed { site, .. } => site,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SiteOutcome::Failed { .. })
    }
}

/// Point-in-time copy of a job's state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub progress: u8,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sites: Vec<SiteOutcome>,
}

/// Source of timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of opaque job ids
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random UUID v4 ids
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Percentage of sites done, rounded; an empty job counts as done
pub fn progress_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = (done as f64 * 100.0 / total as f64).round();
    percent.clamp(0.0, 100.0) as u8
}

/// Registry of every live job
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobSnapshot>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl JobRegistry {
    /// Create a registry using the wall clock and UUID ids
    pub fn new() -> Self {
        Self::with_parts(Arc::new(SystemClock), Arc::new(UuidGenerator))
    }

    pub fn with_parts(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            clock,
            ids,
        }
    }

    /// Register a new job in `Processing` state and return its id.
    /// The id is guaranteed not to collide with a live job.
    pub fn create(&self) -> String {
        let now = self.clock.now();
        let mut jobs = self.jobs.write();
        let id = loop {
            let id = self.ids.next_id();
            if !jobs.contains_key(&id) {
                break id;
            }
        };

        jobs.insert(
            id.clone(),
            JobSnapshot {
                id: id.clone(),
                progress: 0,
                status: JobStatus::Processing,
                created_at: now,
                updated_at: now,
                sites: Vec::new(),
            },
        );
        id
    }

    pub fn get(&self, id: &str) -> Option<JobSnapshot> {
        self.jobs.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.read().contains_key(id)
    }

    /// Raise progress; lower values and updates to terminal jobs are ignored
    pub fn set_progress(&self, id: &str, progress: u8) -> bool {
        let now = self.clock.now();
        let mut jobs = self.jobs.write();
        match jobs.get_mut(id) {
            Some(job) if !job.status.is_terminal() => {
                let progress = progress.min(100);
                if progress > job.progress {
                    job.progress = progress;
                    job.updated_at = now;
                }
                true
            }
            _ => false,
        }
    }

    pub fn record_site(&self, id: &str, outcome: SiteOutcome) -> bool {
        let now = self.clock.now();
        let mut jobs = self.jobs.write();
        match jobs.get_mut(id) {
            Some(job) if !job.status.is_terminal() => {
                job.sites.push(outcome);
                job.updated_at = now;
                true
            }
            _ => false,
        }
    }

    /// `Processing → Completed`; progress is pinned to 100
    pub fn complete(&self, id: &str) -> bool {
        self.finish(id, JobStatus::Completed)
    }

    /// `Processing → Error`
    pub fn fail(&self, id: &str) -> bool {
        self.finish(id, JobStatus::Error)
    }

    fn finish(&self, id: &str, status: JobStatus) -> bool {
        let now = self.clock.now();
        let mut jobs = self.jobs.write();
        match jobs.get_mut(id) {
            Some(job) if !job.status.is_terminal() => {
                job.status = status;
                if status == JobStatus::Completed {
                    job.progress = 100;
                }
                job.updated_at = now;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, id: &str) -> Option<JobSnapshot> {
        self.jobs.write().remove(id)
    }

    /// Drop terminal jobs not updated within `ttl`; returns the evicted ids.
    /// Jobs still processing are never evicted.
    pub fn evict_expired(&self, ttl: Duration) -> Vec<String> {
        let now = self.clock.now();
        let mut jobs = self.jobs.write();

        let expired: Vec<String> = jobs
            .values()
            .filter(|job| job.status.is_terminal())
            .filter(|job| (now - job.updated_at).to_std().unwrap_or_default() > ttl)
            .map(|job| job.id.clone())
            .collect();

        for id in &expired {
            jobs.remove(id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
