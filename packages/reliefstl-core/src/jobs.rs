use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::fetch::Sources;
use crate::models::JobRequest;
use crate::tiling;

/// Callback contract: called monotonically with a percentage in [0, 100] and
/// an informational message. Must never block the pipeline.
pub type ProgressFn = dyn Fn(f32, &str) + Send + Sync;

/// Cloneable progress sink. Panics raised by the callback are swallowed at
/// the call site so a misbehaving observer cannot fail a job.
#[derive(Clone, Default)]
pub struct Progress(Option<Arc<ProgressFn>>);

impl Progress {
    pub fn new(sink: impl Fn(f32, &str) + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(sink)))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn report(&self, percent: f32, message: &str) {
        if let Some(sink) = &self.0 {
            let sink: &ProgressFn = sink.as_ref();
            let _ = catch_unwind(AssertUnwindSafe(|| sink(percent.clamp(0.0, 100.0), message)));
        }
    }

    /// Sub-sink mapping a nested 0..100 range into `[lo, hi]` of this sink.
    pub fn section(&self, lo: f32, hi: f32) -> Progress {
        let outer = self.clone();
        Progress::new(move |pct, msg| {
            outer.report(lo + (hi - lo) * (pct / 100.0), msg);
        })
    }
}

/// Lifecycle of one generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    DownloadingTerrain,
    DownloadingBuildings,
    DownloadingRoads,
    GeneratingStl,
    Completed,
    Failed,
}

/// Status record readable while the owning worker mutates it. Readers must
/// tolerate torn reads across fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: f32,
    pub message: String,
    pub download_url: Option<String>,
}

lazy_static! {
    static ref JOB_REGISTRY: RwLock<HashMap<String, JobRecord>> = RwLock::new(HashMap::new());
}

pub fn register_job(job_id: &str) -> JobRecord {
    let record = JobRecord {
        job_id: job_id.to_string(),
        status: JobStatus::Pending,
        progress: 0.0,
        message: "job created, starting processing".to_string(),
        download_url: None,
    };
    JOB_REGISTRY
        .write()
        .insert(job_id.to_string(), record.clone());
    record
}

pub fn update_job(job_id: &str, apply: impl FnOnce(&mut JobRecord)) {
    if let Some(record) = JOB_REGISTRY.write().get_mut(job_id) {
        apply(record);
    }
}

pub fn job_status(job_id: &str) -> Option<JobRecord> {
    JOB_REGISTRY.read().get(job_id).cloned()
}

pub fn remove_job(job_id: &str) -> Option<JobRecord> {
    JOB_REGISTRY.write().remove(job_id)
}

/// Handle returned by `submit_job`; the job keeps running if dropped.
pub struct JobHandle {
    pub job_id: String,
    worker: JoinHandle<()>,
}

impl JobHandle {
    /// Block until the worker finishes. Status is read from the registry.
    pub fn wait(self) -> Option<JobRecord> {
        let _ = self.worker.join();
        job_status(&self.job_id)
    }
}

/// Validate the request, register the job and run it on a background worker.
/// Returns immediately with a handle; progress and final state land in the
/// job registry.
pub fn submit_job(sources: Sources, request: JobRequest, output_dir: PathBuf) -> Result<JobHandle> {
    request.validate()?;
    let job_id = Uuid::new_v4().to_string();
    register_job(&job_id);
    info!(
        job_id = %job_id,
        grid_split = request.grid_split,
        "job accepted"
    );

    let worker_id = job_id.clone();
    let worker = std::thread::spawn(move || {
        match tiling::run_job(&sources, &request, &worker_id, &output_dir) {
            Ok(path) => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                update_job(&worker_id, |job| {
                    job.status = JobStatus::Completed;
                    job.progress = 100.0;
                    job.message = "STL generated successfully".to_string();
                    job.download_url = Some(format!("/output/{}", file_name));
                });
                info!(job_id = %worker_id, path = %path.display(), "job completed");
            }
            Err(err) => {
                update_job(&worker_id, |job| {
                    job.status = JobStatus::Failed;
                    job.progress = 0.0;
                    job.message = format!("error: {}", err);
                });
                tracing::error!(job_id = %worker_id, error = %err, "job failed");
            }
        }
    });

    Ok(JobHandle { job_id, worker })
}
