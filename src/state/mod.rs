//! The working-state store: a small versioned record of what the session is
//! doing, persisted in a project-local file.
//!
//! Reads are cached on first load; `invalidate` drops the cache. Writes go
//! through a merge that clamps list sizes (recent decisions are bounded and
//! append-only, open tasks are compacted). The compact rendering is what the
//! orchestrator injects into system prompts. The file is written with
//! owner-only permissions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

pub const SCHEMA_VERSION: u32 = 1;

/// Bounds applied on every write.
const MAX_DECISIONS: usize = 20;
const MAX_OPEN_TASKS: usize = 30;

/// Project-local directory holding runtime files.
pub const STATE_DIR: &str = ".foreman";
const STATE_FILE: &str = "state.json";

// ─── Records ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub title: String,
    pub why: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenTaskStatus {
    Open,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTask {
    pub id: String,
    pub title: String,
    pub status: OpenTaskStatus,
    pub updated_at: DateTime<Utc>,
}

/// The persisted working state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingState {
    pub schema_version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub goal: String,
    /// One line describing the current activity.
    #[serde(default)]
    pub now: String,
    #[serde(default)]
    pub recent_decisions: Vec<Decision>,
    #[serde(default)]
    pub tasks_open: Vec<OpenTask>,
    #[serde(default)]
    pub conventions: BTreeMap<String, String>,
}

impl Default for WorkingState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            updated_at: Utc::now(),
            goal: String::new(),
            now: String::new(),
            recent_decisions: Vec::new(),
            tasks_open: Vec::new(),
            conventions: BTreeMap::new(),
        }
    }
}

impl WorkingState {
    /// Append a decision (the list is append-only; the store clamps it).
    pub fn record_decision(&mut self, title: impl Into<String>, why: impl Into<String>) {
        self.recent_decisions.push(Decision {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            why: why.into(),
            at: Utc::now(),
        });
    }

    /// Add or update an open task by title.
    pub fn upsert_task(&mut self, title: &str, status: OpenTaskStatus) {
        let now = Utc::now();
        if let Some(task) = self.tasks_open.iter_mut().find(|t| t.title == title) {
            task.status = status;
            task.updated_at = now;
        } else {
            self.tasks_open.push(OpenTask {
                id: Uuid::new_v4().to_string(),
                title: title.to_string(),
                status,
                updated_at: now,
            });
        }
    }

    /// Compact rendering injected into system prompts.
    pub fn to_context_block(&self) -> String {
        let mut out = String::new();
        if !self.goal.is_empty() {
            out.push_str(&format!("Goal: {}\n", self.goal));
        }
        if !self.now.is_empty() {
            out.push_str(&format!("Now: {}\n", self.now));
        }
        let open: Vec<&OpenTask> = self
            .tasks_open
            .iter()
            .filter(|t| t.status != OpenTaskStatus::Done)
            .collect();
        if !open.is_empty() {
            out.push_str("Open tasks:\n");
            for task in open {
                let marker = match task.status {
                    OpenTaskStatus::InProgress => "*",
                    _ => "-",
                };
                out.push_str(&format!("{marker} {}\n", task.title));
            }
        }
        if !self.recent_decisions.is_empty() {
            out.push_str("Recent decisions:\n");
            for decision in self.recent_decisions.iter().rev().take(5) {
                out.push_str(&format!("- {}: {}\n", decision.title, decision.why));
            }
        }
        if !self.conventions.is_empty() {
            out.push_str("Conventions:\n");
            for (name, value) in &self.conventions {
                out.push_str(&format!("- {name}: {value}\n"));
            }
        }
        out.trim_end().to_string()
    }
}

// ─── Store ─────────────────────────────────────────────────────────────────

/// File-backed store with a first-load cache.
pub struct WorkingStateStore {
    path: PathBuf,
    cache: Mutex<Option<WorkingState>>,
}

impl WorkingStateStore {
    /// Store for a project root; the file lives at `.foreman/state.json`.
    pub fn for_project(project_root: &Path) -> Self {
        Self {
            path: project_root.join(STATE_DIR).join(STATE_FILE),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, reading the file at most once until invalidated.
    /// A missing file yields the default state; a corrupt file is an error.
    pub fn load(&self) -> Result<WorkingState> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = cache.as_ref() {
            return Ok(state.clone());
        }

        let state = if self.path.exists() {
            let raw = std::fs::read_to_string(&self.path)?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::State(format!("corrupt state file: {e}")))?
        } else {
            WorkingState::default()
        };
        *cache = Some(state.clone());
        Ok(state)
    }

    /// Drop the cache; the next load re-reads the file.
    pub fn invalidate(&self) {
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Merge-write: clamp list sizes, stamp the update time, persist with
    /// owner-only permissions, and refresh the cache.
    pub fn save(&self, mut state: WorkingState) -> Result<()> {
        // Decisions: append-only but bounded — keep the newest.
        if state.recent_decisions.len() > MAX_DECISIONS {
            let excess = state.recent_decisions.len() - MAX_DECISIONS;
            state.recent_decisions.drain(..excess);
        }
        // Open tasks: compact by dropping finished work first.
        if state.tasks_open.len() > MAX_OPEN_TASKS {
            state.tasks_open.retain(|t| t.status != OpenTaskStatus::Done);
            state.tasks_open.truncate(MAX_OPEN_TASKS);
        }
        state.schema_version = SCHEMA_VERSION;
        state.updated_at = Utc::now();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&state)?;
        std::fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = Some(state);
        Ok(())
    }
}
