use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bundle;
use crate::docx::Package;
use crate::error::{Error, ErrorKind};
use crate::latex::Emitted;
use crate::model::{ConversionOptions, MediaAsset, Warning};

/// Lifecycle of one conversion request. Every task passes through
/// `Converting`; `Ready` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Uploaded,
    Converting,
    Ready,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            TaskState::Uploaded => "uploaded",
            TaskState::Converting => "converting",
            TaskState::Ready => "ready",
            TaskState::Failed => "failed",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    fn generate() -> Self {
        TaskId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(s.to_string())
    }
}

/// What a failed task remembers about its error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for Failure {
    fn from(e: &Error) -> Self {
        Failure {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Output of a successful conversion. Archives are built on first download
/// and cached, so repeated downloads return the same bytes.
struct Artifacts {
    latex: String,
    manifest: Vec<MediaAsset>,
    warnings: Vec<Warning>,
    bundle: OnceLock<Vec<u8>>,
    media_bundle: OnceLock<Vec<u8>>,
}

impl From<Emitted> for Artifacts {
    fn from(emitted: Emitted) -> Self {
        Artifacts {
            latex: emitted.latex,
            manifest: emitted.manifest,
            warnings: emitted.warnings,
            bundle: OnceLock::new(),
            media_bundle: OnceLock::new(),
        }
    }
}

struct Task {
    id: TaskId,
    state: TaskState,
    original_filename: String,
    output_filename: String,
    options: Option<ConversionOptions>,
    source: Arc<[u8]>,
    artifacts: Option<Arc<Artifacts>>,
    failure: Option<Failure>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Task {
    fn status(&self) -> TaskStatus {
        let (warnings, media_count) = match &self.artifacts {
            Some(a) => (a.warnings.clone(), a.manifest.len()),
            None => (Vec::new(), 0),
        };
        TaskStatus {
            id: self.id.clone(),
            state: self.state,
            original_filename: self.original_filename.clone(),
            output_filename: self.output_filename.clone(),
            options: self.options.clone(),
            failure: self.failure.clone(),
            warnings,
            media_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn transition(&mut self, state: TaskState) {
        log::info!("Task {}: {} -> {}", self.id, self.state, state);
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// Snapshot of a task, safe to hand out after the store lock is released.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub id: TaskId,
    pub state: TaskState,
    pub original_filename: String,
    pub output_filename: String,
    pub options: Option<ConversionOptions>,
    pub failure: Option<Failure>,
    pub warnings: Vec<Warning>,
    pub media_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct TaskConfig {
    /// Upper bound on one conversion; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// How long an idle task is kept before `purge_expired` drops it.
    pub retention: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Owns every task and drives the upload → convert → download lifecycle.
///
/// The store lock is only held while a task changes state; conversions and
/// archive building run outside it, so independent tasks proceed in
/// parallel.
#[derive(Default)]
pub struct TaskManager {
    config: TaskConfig,
    tasks: Mutex<HashMap<TaskId, Task>>,
}

fn default_output_filename(original: &str) -> String {
    let base = base_name(original);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    if stem.is_empty() {
        String::from("document.tex")
    } else {
        format!("{stem}.tex")
    }
}

/// Archive member names must not escape the bundle root.
fn normalize_output_filename(name: &str) -> Option<String> {
    let base = base_name(name.trim());
    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    if base.to_ascii_lowercase().ends_with(".tex") {
        Some(base.to_string())
    } else {
        Some(format!("{base}.tex"))
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

impl TaskManager {
    pub fn new(config: TaskConfig) -> Self {
        Self {
            config,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the raw upload under a fresh id. The bytes must open as a DOCX
    /// package; identical uploads still get distinct ids.
    pub fn upload(
        &self,
        original_filename: &str,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Result<TaskId, Error> {
        let source: Arc<[u8]> = bytes.into();
        if let Err(e) = Package::open(&source) {
            log::warn!("Rejected upload {original_filename:?}: {e}");
            return Err(Error::InvalidFormat(e.to_string()));
        }

        let id = TaskId::generate();
        let now = Utc::now();
        let task = Task {
            id: id.clone(),
            state: TaskState::Uploaded,
            original_filename: original_filename.to_string(),
            output_filename: default_output_filename(original_filename),
            options: None,
            source,
            artifacts: None,
            failure: None,
            created_at: now,
            updated_at: now,
        };
        log::info!(
            "Task {id}: uploaded {original_filename:?} ({} bytes)",
            task.source.len()
        );
        self.lock().insert(id.clone(), task);
        Ok(id)
    }

    /// Run the conversion pipeline for an uploaded task. Returns once the
    /// task is `Ready` or `Failed`; pipeline errors are recorded on the task,
    /// not returned.
    pub fn convert(
        &self,
        id: &TaskId,
        output_filename: Option<&str>,
        options: ConversionOptions,
    ) -> Result<TaskStatus, Error> {
        let source = {
            let mut tasks = self.lock();
            let task = tasks
                .get_mut(id)
                .ok_or_else(|| Error::UnknownTask(id.to_string()))?;
            if task.state != TaskState::Uploaded {
                return Err(Error::InvalidState {
                    id: id.to_string(),
                    state: task.state,
                });
            }
            if let Some(name) = output_filename.and_then(normalize_output_filename) {
                task.output_filename = name;
            }
            task.options = Some(options.clone());
            task.transition(TaskState::Converting);
            Arc::clone(&task.source)
        };

        let start = Instant::now();
        let outcome = self.run_pipeline(source, options);
        let elapsed = start.elapsed();

        let mut tasks = self.lock();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| Error::UnknownTask(id.to_string()))?;
        match outcome {
            Ok(emitted) => {
                log::info!(
                    "Task {id}: converted in {:.1}ms, {} warnings, {} media files",
                    elapsed.as_secs_f64() * 1000.0,
                    emitted.warnings.len(),
                    emitted.manifest.len()
                );
                task.artifacts = Some(Arc::new(Artifacts::from(emitted)));
                task.transition(TaskState::Ready);
            }
            Err(e) => {
                log::warn!("Task {id}: conversion failed: {e}");
                task.failure = Some(Failure::from(&e));
                task.transition(TaskState::Failed);
            }
        }
        Ok(task.status())
    }

    /// `convert` on a named worker thread. The handle yields the same
    /// result `convert` would have returned.
    pub fn spawn_convert(
        self: &Arc<Self>,
        id: TaskId,
        output_filename: Option<String>,
        options: ConversionOptions,
    ) -> Result<thread::JoinHandle<Result<TaskStatus, Error>>, Error> {
        let manager = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("convert-{id}"))
            .spawn(move || manager.convert(&id, output_filename.as_deref(), options))?;
        Ok(handle)
    }

    /// The pipeline runs on its own thread so a deadline can be enforced and
    /// a panic inside it still ends in `Failed`.
    fn run_pipeline(
        &self,
        source: Arc<[u8]>,
        options: ConversionOptions,
    ) -> Result<Emitted, Error> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(String::from("docx-pipeline"))
            .spawn(move || {
                let result = crate::convert_docx_bytes_to_latex(&source, &options);
                // The receiver is gone after a timeout.
                let _ = tx.send(result);
            })?;

        match self.config.timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(result) => result,
                Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::Timeout(timeout)),
                Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::WorkerLost),
            },
            None => rx.recv().unwrap_or(Err(Error::WorkerLost)),
        }
    }

    fn ready(&self, id: &TaskId) -> Result<(Arc<Artifacts>, String), Error> {
        let tasks = self.lock();
        let task = tasks
            .get(id)
            .ok_or_else(|| Error::UnknownTask(id.to_string()))?;
        match (&task.state, &task.artifacts) {
            (TaskState::Ready, Some(artifacts)) => {
                Ok((Arc::clone(artifacts), task.output_filename.clone()))
            }
            _ => Err(Error::NotReady {
                id: id.to_string(),
                state: task.state,
            }),
        }
    }

    /// The emitted LaTeX as UTF-8 bytes.
    pub fn download(&self, id: &TaskId) -> Result<Vec<u8>, Error> {
        let (artifacts, _) = self.ready(id)?;
        Ok(artifacts.latex.as_bytes().to_vec())
    }

    /// Zip of the LaTeX file, its media and a README.
    pub fn download_complete(&self, id: &TaskId) -> Result<Vec<u8>, Error> {
        let (artifacts, output_filename) = self.ready(id)?;
        if let Some(bytes) = artifacts.bundle.get() {
            return Ok(bytes.clone());
        }
        let bytes = bundle::complete(&output_filename, &artifacts.latex, &artifacts.manifest)?;
        Ok(artifacts.bundle.get_or_init(|| bytes).clone())
    }

    /// Zip of the extracted media only.
    pub fn download_media(&self, id: &TaskId) -> Result<Vec<u8>, Error> {
        let (artifacts, _) = self.ready(id)?;
        if let Some(bytes) = artifacts.media_bundle.get() {
            return Ok(bytes.clone());
        }
        let bytes = bundle::media_only(&artifacts.manifest)?;
        Ok(artifacts.media_bundle.get_or_init(|| bytes).clone())
    }

    pub fn status(&self, id: &TaskId) -> Result<TaskStatus, Error> {
        self.lock()
            .get(id)
            .map(Task::status)
            .ok_or_else(|| Error::UnknownTask(id.to_string()))
    }

    /// All tasks, oldest first.
    pub fn list(&self) -> Vec<TaskStatus> {
        let mut all: Vec<TaskStatus> = self.lock().values().map(Task::status).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn remove(&self, id: &TaskId) -> Result<TaskStatus, Error> {
        let task = self
            .lock()
            .remove(id)
            .ok_or_else(|| Error::UnknownTask(id.to_string()))?;
        log::info!("Task {id}: removed");
        Ok(task.status())
    }

    /// Drop tasks idle for longer than the retention window. Tasks still
    /// converting are kept. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let Ok(retention) = chrono::Duration::from_std(self.config.retention) else {
            return 0;
        };
        let mut tasks = self.lock();
        let before = tasks.len();
        tasks.retain(|_, task| {
            task.state == TaskState::Converting || now - task.updated_at < retention
        });
        let purged = before - tasks.len();
        if purged > 0 {
            log::info!("Purged {purged} expired tasks");
        }
        purged
    }
}
