//! Persistent chat history as JSON lines.
//!
//! Each line is one completed exchange. Records are loaded into memory when
//! the store is opened and the whole file is rewritten on every mutation.

use chrono::{DateTime, Utc};
use docchat_core::error::StorageError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

const TITLE_CHARS: usize = 50;

/// One completed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    /// First 50 characters of the question, with `...` when cut.
    pub title: String,
    pub user: String,
    pub assistant: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatRecord {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        let user = user.into();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title_for(&user),
            user,
            assistant: assistant.into(),
            timestamp: Utc::now(),
        }
    }
}

fn title_for(question: &str) -> String {
    let mut title: String = question.chars().take(TITLE_CHARS).collect();
    if question.chars().count() > TITLE_CHARS {
        title.push_str("...");
    }
    title
}

/// A file-backed list of [`ChatRecord`]s.
pub struct ChatHistory {
    path: PathBuf,
    records: Arc<RwLock<Vec<ChatRecord>>>,
}

impl ChatHistory {
    /// Open the store at `path`.
    ///
    /// A missing file starts empty (it is created on first write).
    /// Unreadable lines are skipped.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = records.len(), "Chat history loaded");
        Self {
            path,
            records: Arc::new(RwLock::new(records)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Vec<ChatRecord> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<ChatRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted chat record");
                    None
                }
            })
            .collect()
    }

    async fn flush(&self) -> Result<(), StorageError> {
        let records = self.records.read().await;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Io(format!("Failed to create history directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for record in records.iter() {
            let line = serde_json::to_string(record)
                .map_err(|e| StorageError::Encoding(format!("Failed to serialize record: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(&self.path, &content)
            .map_err(|e| StorageError::Io(format!("Failed to write history file: {e}")))?;

        Ok(())
    }

    /// Record a completed exchange and persist it.
    pub async fn append(
        &self,
        user: impl Into<String>,
        assistant: impl Into<String>,
    ) -> Result<ChatRecord, StorageError> {
        let record = ChatRecord::new(user, assistant);
        self.records.write().await.push(record.clone());
        self.flush().await?;
        Ok(record)
    }

    /// All records, oldest first.
    pub async fn list(&self) -> Vec<ChatRecord> {
        self.records.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<ChatRecord> {
        self.records.read().await.iter().find(|r| r.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.records.write().await.clear();
        self.flush().await
    }
}
