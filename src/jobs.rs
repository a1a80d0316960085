//! In-process job dispatch.
//!
//! A caller hands over three paths (input, reference, rules) and gets back an
//! opaque [`JobId`]; the transform runs on a worker thread and the caller
//! polls [`Dispatcher::status`] or [`Dispatcher::result`]. At most one live
//! job may own a given output path.

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    engine::TransformationEngine,
    error::{EngineError, Result},
    pipeline::{self, PipelineOptions, RunSummary},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        JobId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(JobId)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub input: PathBuf,
    pub reference: PathBuf,
    pub rules: PathBuf,
    /// Defaults to [`output_path_for`] the input.
    pub output: Option<PathBuf>,
}

impl JobRequest {
    pub fn new(
        input: impl Into<PathBuf>,
        reference: impl Into<PathBuf>,
        rules: impl Into<PathBuf>,
    ) -> Self {
        JobRequest {
            input: input.into(),
            reference: reference.into(),
            rules: rules.into(),
            output: None,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| output_path_for(&self.input))
    }
}

/// `<id>_input.csv` becomes `<id>_output.csv`; any other name gets an
/// `_output.csv` suffix on its stem. The result sits beside the input.
pub fn output_path_for(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output_name = match name.strip_suffix("input.csv") {
        Some(prefix) => format!("{prefix}output.csv"),
        None => {
            let stem = input
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "report".to_string());
            format!("{stem}_output.csv")
        }
    };
    input.with_file_name(output_name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed { output: PathBuf, rows: usize },
    Failed { error: String },
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed { .. } => "completed",
            JobState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed { .. } | JobState::Failed { .. })
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub output: PathBuf,
    #[serde(flatten)]
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// What the result endpoint hands back for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    NotReady,
    Ready(PathBuf),
    Failed(String),
}

type JobTable = Arc<Mutex<HashMap<JobId, JobStatus>>>;

pub struct Dispatcher {
    options: PipelineOptions,
    jobs: JobTable,
    workers: Mutex<HashMap<JobId, JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(options: PipelineOptions) -> Self {
        Dispatcher {
            options,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn submit(&self, request: JobRequest) -> Result<JobId> {
        self.reap();
        let output = request.output_path();
        let id = JobId::new();
        {
            let mut jobs = lock(&self.jobs);
            if let Some(busy) = jobs
                .values()
                .find(|job| job.output == output && !job.state.is_terminal())
            {
                return Err(EngineError::OutputBusy {
                    path: output,
                    job: busy.id.as_uuid(),
                });
            }
            jobs.insert(
                id,
                JobStatus {
                    id,
                    output: output.clone(),
                    state: JobState::Pending,
                    submitted_at: Utc::now(),
                    finished_at: None,
                },
            );
        }
        info!("Job {id} submitted: {:?} -> {:?}", request.input, output);

        let jobs = Arc::clone(&self.jobs);
        let options = self.options.clone();
        let handle = thread::spawn(move || {
            set_state(&jobs, id, JobState::Running);
            let state = match run_job(&request, &output, &options) {
                Ok(summary) => {
                    info!("Job {id} completed with {} row(s)", summary.rows);
                    JobState::Completed {
                        output: summary.output,
                        rows: summary.rows,
                    }
                }
                Err(err) => {
                    error!("Job {id} failed: {err}");
                    JobState::Failed {
                        error: err.to_string(),
                    }
                }
            };
            set_state(&jobs, id, state);
        });
        lock(&self.workers).insert(id, handle);
        Ok(id)
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.reap();
        lock(&self.jobs).get(&id).cloned()
    }

    pub fn result(&self, id: JobId) -> Option<JobResult> {
        self.status(id).map(|status| match status.state {
            JobState::Pending | JobState::Running => JobResult::NotReady,
            JobState::Completed { output, .. } => JobResult::Ready(output),
            JobState::Failed { error } => JobResult::Failed(error),
        })
    }

    /// Blocks until the job reaches a terminal state.
    pub fn wait(&self, id: JobId) -> Option<JobStatus> {
        let handle = lock(&self.workers).remove(&id);
        if let Some(handle) = handle {
            self.join_worker(id, handle);
        }
        self.status(id)
    }

    pub fn jobs(&self) -> Vec<JobStatus> {
        self.reap();
        let mut jobs: Vec<JobStatus> = lock(&self.jobs).values().cloned().collect();
        jobs.sort_by_key(|job| job.submitted_at);
        jobs
    }

    /// Worker threads not yet joined.
    pub fn active_workers(&self) -> usize {
        self.reap();
        lock(&self.workers).len()
    }

    /// Joins every worker whose thread has already exited.
    fn reap(&self) {
        let finished: Vec<(JobId, JoinHandle<()>)> = {
            let mut workers = lock(&self.workers);
            let ids: Vec<JobId> = workers
                .iter()
                .filter(|(_, handle)| handle.is_finished())
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| workers.remove(&id).map(|handle| (id, handle)))
                .collect()
        };
        for (id, handle) in finished {
            self.join_worker(id, handle);
        }
    }

    fn join_worker(&self, id: JobId, handle: JoinHandle<()>) {
        if handle.join().is_err() {
            set_state(
                &self.jobs,
                id,
                JobState::Failed {
                    error: "worker thread panicked".to_string(),
                },
            );
        }
    }
}

fn run_job(request: &JobRequest, output: &Path, options: &PipelineOptions) -> Result<RunSummary> {
    let engine = TransformationEngine::from_path(&request.rules)?;
    pipeline::process(&engine, &request.input, &request.reference, output, options)
}

fn set_state(jobs: &JobTable, id: JobId, state: JobState) {
    if let Some(job) = lock(jobs).get_mut(&id) {
        if state.is_terminal() {
            job.finished_at = Some(Utc::now());
        }
        job.state = state;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
