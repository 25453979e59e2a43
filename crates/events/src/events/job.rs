use pkgd_types::{JobId, PackageInfo};
use serde::{Deserialize, Serialize};

/// Results of asynchronous jobs, keyed by job identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    SearchFinished {
        job_id: JobId,
        query: String,
        results: Vec<PackageInfo>,
    },

    PruneFinished {
        job_id: JobId,
        removed: Vec<PackageInfo>,
    },

    MigrateFinished {
        job_id: JobId,
        from_format: u32,
        to_format: u32,
    },

    /// A job ended without producing a result
    Failed {
        job_id: JobId,
        operation: String,
        error: String,
    },
}

impl JobEvent {
    #[must_use]
    pub fn job_id(&self) -> JobId {
        match self {
            Self::SearchFinished { job_id, .. }
            | Self::PruneFinished { job_id, .. }
            | Self::MigrateFinished { job_id, .. }
            | Self::Failed { job_id, .. } => *job_id,
        }
    }
}
