//! Derived state and the reducers that build it
//!
//! Reconstructed state is a pure function of a base (empty, or a snapshot)
//! folded with an ordered slice of events. Each reducer handles the event
//! types it understands and leaves its state untouched for every other
//! type, including [`EventType::Unknown`], so replay never fails on
//! unfamiliar history.
//!
//! Maps are ordered so the same replay always serializes to the same bytes.
//! These types are also the body of snapshot payloads, which are
//! bincode-encoded: fields are always serialized, never skipped.

use crate::event::{Event, EventPayload, EventType, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One conversation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: i64,
    pub sequence_number: u64,
    pub model: Option<String>,
}

/// Active session as of some instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Option<String>,
    pub session_name: Option<String>,
    pub working_dir: Option<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
    /// Messages in sequence order
    pub conversation: Vec<ConversationTurn>,
}

impl SessionState {
    /// Fold one event into the session
    pub fn apply(&mut self, event: &Event) {
        match (&event.event_type, &event.payload) {
            (EventType::SessionCreated, EventPayload::Session(p)) => {
                self.session_id = p.session_id.clone();
                self.session_name = p.session_name.clone();
                self.working_dir = p.working_dir.clone();
                if p.model.is_some() {
                    self.model = p.model.clone();
                }
                if p.provider.is_some() {
                    self.provider = p.provider.clone();
                }
            }
            (EventType::SessionSwitched | EventType::SessionRestored, EventPayload::Session(p)) => {
                self.session_id = p.session_id.clone();
                self.working_dir = p.working_dir.clone();
                if p.session_name.is_some() {
                    self.session_name = p.session_name.clone();
                }
            }
            (EventType::SessionRenamed, EventPayload::Session(p)) => {
                if p.session_name.is_some() {
                    self.session_name = p.session_name.clone();
                }
            }
            (EventType::LlmMessageUser, payload) => self.push_turn(Role::User, event, payload),
            (EventType::LlmMessageAssistant, payload) => self.push_turn(Role::Assistant, event, payload),
            (EventType::LlmMessageSystem, payload) => self.push_turn(Role::System, event, payload),
            (EventType::ModelChanged, EventPayload::ModelChange(p)) => {
                if p.new_model.is_some() {
                    self.model = p.new_model.clone();
                }
            }
            (EventType::ProviderChanged, EventPayload::ModelChange(p)) => {
                if p.new_provider.is_some() {
                    self.provider = p.new_provider.clone();
                }
            }
            _ => {}
        }
    }

    fn push_turn(&mut self, role: Role, event: &Event, payload: &EventPayload) {
        let (content, model) = match payload {
            EventPayload::Message(p) => (p.content.clone(), p.model.clone()),
            EventPayload::Other(Value::Object(map)) => (
                map.get("content").and_then(Value::as_str).unwrap_or_default().to_string(),
                None,
            ),
            _ => (String::new(), None),
        };
        self.conversation.push(ConversationTurn {
            role,
            content,
            timestamp: event.timestamp,
            sequence_number: event.sequence_number,
            model,
        });
    }
}

/// One tracked path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Blob key of the content; `None` when deleted or tracked by metadata only
    pub content_hash: Option<String>,
    pub exists: bool,
    /// Timestamp of the last event touching this path
    pub last_modified: i64,
    pub size: Option<u64>,
}

/// Every path seen so far, including deleted ones
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub files: BTreeMap<String, FileEntry>,
}

impl FileState {
    /// Fold one event into the file map
    pub fn apply(&mut self, event: &Event) {
        match (&event.event_type, &event.payload) {
            (EventType::FileCreated | EventType::FileModified, EventPayload::FileChange(p)) => {
                self.files.insert(
                    p.path.clone(),
                    FileEntry {
                        content_hash: p.effective_hash().map(str::to_string),
                        exists: true,
                        last_modified: event.timestamp,
                        size: p.size,
                    },
                );
            }
            (EventType::FileDeleted, EventPayload::FileChange(p)) => {
                // The key stays so rename history remains visible
                self.files.insert(
                    p.path.clone(),
                    FileEntry {
                        content_hash: None,
                        exists: false,
                        last_modified: event.timestamp,
                        size: None,
                    },
                );
            }
            (EventType::FileRenamed | EventType::FileMoved, EventPayload::FileMove(p)) => {
                if let Some(mut entry) = self.files.remove(&p.old_path) {
                    entry.last_modified = event.timestamp;
                    self.files.insert(p.new_path.clone(), entry);
                }
            }
            (EventType::DirectoryRenamed | EventType::DirectoryMoved, EventPayload::FileMove(p)) => {
                let old_prefix = dir_prefix(&p.old_path);
                let moved: Vec<String> = self
                    .files
                    .keys()
                    .filter(|path| path.starts_with(&old_prefix))
                    .cloned()
                    .collect();
                for old in moved {
                    if let Some(mut entry) = self.files.remove(&old) {
                        entry.last_modified = event.timestamp;
                        let new_path = format!("{}{}", dir_prefix(&p.new_path), &old[old_prefix.len()..]);
                        self.files.insert(new_path, entry);
                    }
                }
            }
            (EventType::DirectoryDeleted, EventPayload::FileChange(p)) => {
                let prefix = dir_prefix(&p.path);
                for (_, entry) in self.files.iter_mut().filter(|(path, _)| path.starts_with(&prefix)) {
                    entry.exists = false;
                    entry.content_hash = None;
                    entry.size = None;
                    entry.last_modified = event.timestamp;
                }
            }
            _ => {}
        }
    }

    /// Path to content hash for every existing file with content
    pub fn checksums(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .filter(|(_, entry)| entry.exists)
            .filter_map(|(path, entry)| entry.content_hash.clone().map(|hash| (path.clone(), hash)))
            .collect()
    }

    /// Number of paths that currently exist
    pub fn existing_count(&self) -> usize {
        self.files.values().filter(|entry| entry.exists).count()
    }

    /// Entry for one path
    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }
}

fn dir_prefix(path: &str) -> String {
    format!("{}/", path.trim_end_matches('/'))
}

/// Repository pointers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitState {
    pub commit_hash: Option<String>,
    pub branch: Option<String>,
    /// No file change recorded since the last commit
    pub is_clean: bool,
    pub last_commit_message: Option<String>,
    pub last_commit_author: Option<String>,
    pub last_commit_timestamp: Option<i64>,
}

impl Default for GitState {
    fn default() -> Self {
        Self {
            commit_hash: None,
            branch: None,
            is_clean: true,
            last_commit_message: None,
            last_commit_author: None,
            last_commit_timestamp: None,
        }
    }
}

impl GitState {
    /// Fold one event into the git pointers
    pub fn apply(&mut self, event: &Event) {
        match (&event.event_type, &event.payload) {
            (EventType::GitCommit, EventPayload::GitCommit(p)) => {
                self.commit_hash = Some(p.hash.clone());
                if p.branch.is_some() {
                    self.branch = p.branch.clone();
                }
                self.last_commit_message = Some(p.message.clone());
                self.last_commit_author = Some(p.author.clone());
                self.last_commit_timestamp = Some(event.timestamp);
                self.is_clean = true;
            }
            (EventType::GitBranchSwitched, EventPayload::GitBranch(p)) => {
                self.branch = Some(p.branch.clone());
            }
            (
                EventType::FileCreated
                | EventType::FileModified
                | EventType::FileDeleted
                | EventType::FileRenamed
                | EventType::FileMoved,
                _,
            ) => {
                self.is_clean = false;
            }
            _ => {}
        }
    }
}

/// The three derived states replayed together
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedState {
    pub session: SessionState,
    pub files: FileState,
    pub git: GitState,
}

impl DerivedState {
    /// Fold one event into all three states
    pub fn apply(&mut self, event: &Event) {
        self.session.apply(event);
        self.files.apply(event);
        self.git.apply(event);
    }

    /// Fold a slice of events, in the order given
    pub fn apply_all<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) -> usize {
        let mut applied = 0;
        for event in events {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Replay `events` on top of `base`
    pub fn replay<'a>(base: DerivedState, events: impl IntoIterator<Item = &'a Event>) -> DerivedState {
        let mut state = base;
        state.apply_all(events);
        state
    }
}
