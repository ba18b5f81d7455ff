use crate::domain::dpg::settings::EncodeConfig;
use std::fmt;
use std::path::PathBuf;
use tokio::time::Instant;

/// Assigned at admission, strictly increasing, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token identifying who submitted a job. Only compared, never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requester(String);

impl Requester {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Queued,
    /// Holds the single execution slot. `started` flips once the pipeline is
    /// launched; from then on the job can no longer be evicted.
    Converting { started: bool },
    Downloadable { expires_at: Instant },
    Failed { detail: String },
}

#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub source: PathBuf,
    pub config: EncodeConfig,
    pub requester: Requester,
    pub state: JobState,
    pub last_seen: Instant,
}

impl Job {
    pub fn is_owned_by(&self, requester: &Requester) -> bool {
        &self.requester == requester
    }
}

/// What a requester is allowed to learn about their job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// 1-based; position 1 is converted next.
    Queued { position: usize },
    Converting,
    Downloadable { artifact: PathBuf },
    Failed { detail: String },
    /// Absent, evicted, expired, or owned by someone else.
    NotFound,
}
