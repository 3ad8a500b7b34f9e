// src/store/file.rs

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::backfill::{BackfillConfig, BackfillTask};
use crate::checkpoint::Checkpoint;
use crate::engine::ExecutionState;
use crate::errors::{FlowError, Result};
use crate::schedule::{Schedule, ScheduleEvent};
use crate::store::StateStore;

/// Default directory, relative to the working directory, for on-disk state.
pub const DEFAULT_STATE_DIR: &str = ".assetflow";

/// JSON documents under a root directory.
///
/// Layout:
///
/// ```text
/// <root>/state/<pipeline>.json
/// <root>/checkpoints/<run_id>.jsonl
/// <root>/schedules/<id>.json
/// <root>/events/<schedule_id>.jsonl
/// <root>/backfills/<id>.json
/// <root>/backfill_tasks/<backfill_id>/<task_id>.json
/// ```
///
/// Single documents are replaced atomically through a uniquely named temp
/// file in the same directory, so concurrent writers of one record never
/// share a temp path and the last rename wins. Logs are appended one JSON
/// value per line.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn doc_path(&self, kind: &str, key: &str, ext: &str) -> PathBuf {
        self.root.join(kind).join(format!("{}.{ext}", sanitize(key)))
    }
}

/// Map a record key onto a safe file name.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn store_err(err: anyhow::Error) -> FlowError {
    FlowError::Store(format!("{err:#}"))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("{:?} has no parent directory", path))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("creating state directory at {:?}", parent))?;

    // Temp names carry no `.json` extension, so directory scans skip them.
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("creating temp file in {:?}", parent))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }

    tmp.persist(path)
        .with_context(|| format!("replacing {:?}", path))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("opening {:?}", path)),
    };
    let value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {:?}", path))?;
    Ok(Some(value))
}

fn append_line<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating state directory at {:?}", parent))?;
    }

    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {:?} for append", path))?;
    file.write_all(&line)?;
    file.flush()?;
    Ok(())
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
    let mut out = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(v) => out.push(v),
            // A crash mid-append leaves a torn last line.
            Err(e) => warn!(path = ?path, line = idx + 1, error = %e, "skipping unreadable record"),
        }
    }
    Ok(out)
}

fn read_dir_json<T: DeserializeOwned>(dir: &Path) -> anyhow::Result<Vec<T>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {:?}", dir))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(v) = read_json(&path)? {
            out.push(v);
        }
    }
    Ok(out)
}

fn remove_if_exists(path: &Path) -> anyhow::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("removing {:?}", path)),
    }
}

impl StateStore for FileStore {
    fn save_state(&self, state: &ExecutionState) -> Result<()> {
        let path = self.doc_path("state", &state.pipeline_id, "json");
        debug!(pipeline = %state.pipeline_id, path = ?path, "saving execution state");
        write_json(&path, state).map_err(store_err)
    }

    fn load_state(&self, pipeline_id: &str) -> Result<Option<ExecutionState>> {
        read_json(&self.doc_path("state", pipeline_id, "json")).map_err(store_err)
    }

    fn clear_state(&self, pipeline_id: &str) -> Result<bool> {
        remove_if_exists(&self.doc_path("state", pipeline_id, "json")).map_err(store_err)
    }

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        append_line(
            &self.doc_path("checkpoints", &checkpoint.run_id, "jsonl"),
            checkpoint,
        )
        .map_err(store_err)
    }

    fn load_checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>> {
        read_lines(&self.doc_path("checkpoints", run_id, "jsonl")).map_err(store_err)
    }

    fn save_schedule(&self, schedule: &Schedule) -> Result<()> {
        write_json(&self.doc_path("schedules", &schedule.id, "json"), schedule).map_err(store_err)
    }

    fn load_schedule(&self, id: &str) -> Result<Option<Schedule>> {
        read_json(&self.doc_path("schedules", id, "json")).map_err(store_err)
    }

    fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> =
            read_dir_json(&self.root.join("schedules")).map_err(store_err)?;
        schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(schedules)
    }

    fn delete_schedule(&self, id: &str) -> Result<bool> {
        remove_if_exists(&self.doc_path("schedules", id, "json")).map_err(store_err)
    }

    fn save_event(&self, event: &ScheduleEvent) -> Result<()> {
        append_line(&self.doc_path("events", &event.schedule_id, "jsonl"), event)
            .map_err(store_err)
    }

    fn list_events(&self, schedule_id: &str) -> Result<Vec<ScheduleEvent>> {
        read_lines(&self.doc_path("events", schedule_id, "jsonl")).map_err(store_err)
    }

    fn save_backfill(&self, config: &BackfillConfig) -> Result<()> {
        write_json(&self.doc_path("backfills", &config.backfill_id, "json"), config)
            .map_err(store_err)
    }

    fn load_backfill(&self, backfill_id: &str) -> Result<Option<BackfillConfig>> {
        read_json(&self.doc_path("backfills", backfill_id, "json")).map_err(store_err)
    }

    fn save_backfill_task(&self, task: &BackfillTask) -> Result<()> {
        let path = self
            .root
            .join("backfill_tasks")
            .join(sanitize(&task.backfill_id))
            .join(format!("{}.json", sanitize(&task.task_id)));
        write_json(&path, task).map_err(store_err)
    }

    fn list_backfill_tasks(&self, backfill_id: &str) -> Result<Vec<BackfillTask>> {
        let dir = self.root.join("backfill_tasks").join(sanitize(backfill_id));
        let mut tasks: Vec<BackfillTask> = read_dir_json(&dir).map_err(store_err)?;
        tasks.sort_by_key(|t| t.scheduled_for);
        Ok(tasks)
    }
}
