use anyhow::{Context, Result};
use routine_core::{Category, CompletedTask, CoreError, ScheduledTask, TaskStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

pub fn routine_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("ROUTINE_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".routine"))
}

pub fn ensure_routine_home() -> Result<PathBuf> {
    let dir = routine_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// JSON files under the routine home:
/// - `tasks.json`: the whole list, rewritten on every save
/// - `categories.json`
/// - `history.jsonl`: append-only, one completion per line
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn tasks_path(&self) -> PathBuf {
        self.dir.join("tasks.json")
    }

    fn categories_path(&self) -> PathBuf {
        self.dir.join("categories.json")
    }

    fn history_path(&self) -> PathBuf {
        self.dir.join("history.jsonl")
    }
}

fn read_json<T: DeserializeOwned + Default>(path: &Path, op: &str) -> Result<T, CoreError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let s = fs::read_to_string(path)
        .map_err(|e| CoreError::persistence(op, format!("read {}: {e}", path.display())))?;
    serde_json::from_str(&s)
        .map_err(|e| CoreError::persistence(op, format!("parse {}: {e}", path.display())))
}

/// Write to a sibling temp file then rename, so a crash never leaves half a file.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, op: &str) -> Result<(), CoreError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CoreError::persistence(op, e))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CoreError::persistence(op, format!("create {}: {e}", parent.display())))?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .map_err(|e| CoreError::persistence(op, format!("write {}: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|e| CoreError::persistence(op, format!("rename to {}: {e}", path.display())))
}

impl TaskStore for JsonFileStore {
    fn load_tasks(&self) -> Result<Vec<ScheduledTask>, CoreError> {
        read_json(&self.tasks_path(), "load_tasks")
    }

    fn save_tasks(&self, tasks: &[ScheduledTask]) -> Result<(), CoreError> {
        write_json(&self.tasks_path(), tasks, "save_tasks")
    }

    fn load_history(&self) -> Result<Vec<CompletedTask>, CoreError> {
        let p = self.history_path();
        if !p.exists() {
            return Ok(vec![]);
        }
        let f = fs::File::open(&p).map_err(|e| CoreError::persistence("load_history", e))?;
        let mut out = Vec::new();
        for (n, line) in BufReader::new(f).lines().enumerate() {
            let line = line.map_err(|e| CoreError::persistence("load_history", e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CompletedTask>(&line) {
                Ok(rec) => out.push(rec),
                Err(e) => warn!(line = n + 1, error = %e, "skipping unreadable history line"),
            }
        }
        Ok(out)
    }

    fn append_history(&self, record: &CompletedTask) -> Result<(), CoreError> {
        let p = self.history_path();
        let line = serde_json::to_string(record).map_err(|e| CoreError::persistence("append_history", e))?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&p)
            .map_err(|e| CoreError::persistence("append_history", format!("open {}: {e}", p.display())))?;
        writeln!(f, "{}", line).map_err(|e| CoreError::persistence("append_history", e))
    }

    fn load_categories(&self) -> Result<Vec<Category>, CoreError> {
        read_json(&self.categories_path(), "load_categories")
    }

    fn save_categories(&self, categories: &[Category]) -> Result<(), CoreError> {
        write_json(&self.categories_path(), categories, "save_categories")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use routine_core::TimeInterval;

    fn task(id: &str) -> ScheduledTask {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let iv = TimeInterval::starting_at(start, Duration::minutes(30)).unwrap();
        ScheduledTask::new(id, format!("Task {id}"), iv, start)
    }

    #[test]
    fn missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load_tasks().unwrap().is_empty());
        assert!(store.load_history().unwrap().is_empty());
        assert!(store.load_categories().unwrap().is_empty());
    }

    #[test]
    fn tasks_are_replaced_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.save_tasks(&[task("a"), task("b")]).unwrap();
        store.save_tasks(&[task("c")]).unwrap();
        let loaded = store.load_tasks().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "c");
        assert!(!dir.path().join("tasks.json.tmp").exists());
    }

    #[test]
    fn history_appends_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let t = task("a");
        store.append_history(&CompletedTask::snapshot(&t, t.end)).unwrap();
        let mut f = OpenOptions::new()
            .append(true)
            .open(dir.path().join("history.jsonl"))
            .unwrap();
        writeln!(f, "not json").unwrap();
        store.append_history(&CompletedTask::snapshot(&task("b"), t.end)).unwrap();

        let ids: Vec<_> = store
            .load_history()
            .unwrap()
            .into_iter()
            .map(|h| h.task.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn corrupt_task_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tasks.json"), "{oops").unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(matches!(
            store.load_tasks(),
            Err(CoreError::Persistence { .. })
        ));
    }
}
