//! Conversation persistence: one pretty-printed JSON array of messages per
//! file, named once from a summary of the first turn.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::NaiveDateTime;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::completion::Completer;
use crate::core::config::data::path_display;
use crate::core::message::Message;

pub const CONVERSATION_EXTENSION: &str = "json";
pub const UNTITLED_NAME: &str = "Untitled";
pub const MAX_SLUG_CHARS: usize = 15;

const UNSAFE_NAME_CHARS: &[char] = &['\n', '\r', '\t', '\\', '/', '*', '?', ':', '"', '<', '>', '|'];

pub const NAMING_SYSTEM_PROMPT: &str = "You are a dialog naming assistant that extracts dialog keywords as a record file name, within fifteen words.";
pub const NAMING_USER_PREFIX: &str =
    "Extract the theme of the dialog (only the words of the theme itself): ";
const NAMING_TEMPERATURE: f32 = 0.6;

#[derive(Debug)]
pub enum StoreError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Serialize(serde_json::Error),
    InvalidName(String),
    NotFound(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { path, source } => {
                write!(f, "Conversation I/O failed at {}: {}", path_display(path), source)
            }
            StoreError::Parse { path, source } => {
                write!(f, "Failed to parse conversation {}: {}", path_display(path), source)
            }
            StoreError::Serialize(source) => write!(f, "Failed to serialize conversation: {source}"),
            StoreError::InvalidName(name) => write!(f, "Invalid conversation name '{name}'"),
            StoreError::NotFound(name) => write!(f, "Conversation '{name}' not found"),
        }
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Parse { source, .. } => Some(source),
            StoreError::Serialize(source) => Some(source),
            StoreError::InvalidName(_) | StoreError::NotFound(_) => None,
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone)]
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stored conversation names, most recently written first. Empty files
    /// are ignored.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&self.dir, err)),
        };

        let mut conversations: Vec<(SystemTime, String)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_error(&self.dir, err))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CONVERSATION_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let metadata = entry.metadata().map_err(|err| io_error(&path, err))?;
            if !metadata.is_file() || metadata.len() == 0 {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            conversations.push((modified, name.to_string()));
        }

        conversations.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(conversations.into_iter().map(|(_, name)| name).collect())
    }

    pub fn load(&self, name: &str) -> Result<Vec<Message>, StoreError> {
        let path = self.path_for(name)?;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(err) => return Err(io_error(&path, err)),
        };
        serde_json::from_str(&contents).map_err(|source| StoreError::Parse { path, source })
    }

    /// Overwrite the whole file. The new contents land in a temp file first
    /// and are renamed into place.
    pub fn save(&self, name: &str, messages: &[Message]) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.dir).map_err(|err| io_error(&self.dir, err))?;

        let contents = serde_json::to_string_pretty(messages).map_err(StoreError::Serialize)?;
        let mut temp_file = NamedTempFile::new_in(&self.dir).map_err(|err| io_error(&self.dir, err))?;
        temp_file
            .write_all(contents.as_bytes())
            .map_err(|err| io_error(temp_file.path(), err))?;
        temp_file
            .as_file_mut()
            .sync_all()
            .map_err(|err| io_error(&path, err))?;
        temp_file
            .persist(&path)
            .map_err(|err| io_error(&path, err.error))?;

        debug!(name = %name, messages = messages.len(), "Conversation saved");
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(err) => Err(io_error(&path, err)),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|path| path.exists()).unwrap_or(false)
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        let trimmed = name.trim();
        if trimmed.is_empty()
            || trimmed != name
            || name == "."
            || name == ".."
            || name.contains(UNSAFE_NAME_CHARS)
        {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self
            .dir
            .join(format!("{name}.{CONVERSATION_EXTENSION}")))
    }

    /// `base`, or `base-2`, `base-3`, ... for the first name not on disk.
    pub fn unique_name(&self, base: &str) -> String {
        if !self.exists(base) {
            return base.to_string();
        }
        (2..)
            .map(|suffix| format!("{base}-{suffix}"))
            .find(|candidate| !self.exists(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}

/// Remove characters that are unsafe in file names and cap the length.
pub fn slugify(summary: &str) -> String {
    let cleaned: String = summary
        .chars()
        .filter(|c| !UNSAFE_NAME_CHARS.contains(c))
        .collect();
    cleaned
        .trim()
        .chars()
        .take(MAX_SLUG_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

/// `{slug}_{MMDDHHMM}`, with [`UNTITLED_NAME`] standing in for an empty slug.
pub fn conversation_name(summary: &str, now: NaiveDateTime) -> String {
    let slug = slugify(summary);
    let slug = if slug.is_empty() || slug == "." || slug == ".." {
        UNTITLED_NAME.to_string()
    } else {
        slug
    };
    format!("{slug}_{}", now.format("%m%d%H%M"))
}

/// Ask the naming model for a short theme of `text` and turn it into a
/// conversation name. A failed call names the conversation as untitled.
pub async fn summarize_name(
    completer: &dyn Completer,
    model: &str,
    text: &str,
    now: NaiveDateTime,
) -> String {
    let prompt = format!("{NAMING_USER_PREFIX}{text}");
    let summary = match completer
        .complete(model, NAMING_SYSTEM_PROMPT, &prompt, NAMING_TEMPERATURE)
        .await
    {
        Ok(summary) => summary,
        Err(err) => {
            warn!(error = %err, "Conversation naming failed");
            String::new()
        }
    };
    conversation_name(&summary, now)
}
