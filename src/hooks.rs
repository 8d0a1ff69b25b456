//! Producer adapters that turn file, git, session and tool activity into events
//!
//! Hooks sit on the boundary between the host application and the
//! timeline. A hook never fails the caller: storage errors, unreadable
//! files and a missing `git` binary are logged with `warn!` and reported as
//! `None`/`false`. Successful recordings return the new event's id.

use crate::blob_store::BlobStore;
use crate::error::Result;
use crate::event::{
    EventInput, EventType, FileChangePayload, FileMovePayload, GitBranchPayload, GitCommitPayload,
    GitSyncPayload, MessagePayload, ModelChangePayload, Role, SessionPayload, ToolCallPayload,
};
use crate::log_store::EventRecord;
use crate::logger::EventLogger;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use serde_json::{json, Value};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest string tool result recorded verbatim, in characters
pub const DEFAULT_MAX_RESULT_LENGTH: usize = 10_000;

const TRUNCATION_MARKER: &str = "... (truncated)";

/// Destination for hook events
///
/// Implemented by [`EventLogger`] and by the `Timeline` facade, which also
/// feeds appended events to the snapshot triggers.
pub trait EventSink: Send + Sync + fmt::Debug {
    /// Append one event
    fn append(&self, input: EventInput) -> Result<EventRecord>;
}

impl EventSink for EventLogger {
    fn append(&self, input: EventInput) -> Result<EventRecord> {
        self.try_log(input)
    }
}

/// Append through the sink, downgrading any error to a warning
fn record(sink: &dyn EventSink, input: EventInput, what: &str) -> Option<String> {
    match sink.append(input) {
        Ok(record) => Some(record.id),
        Err(e) => {
            warn!("Dropped {} event: {}", what, e);
            None
        }
    }
}

/// Records file lifecycle events for one working directory
#[derive(Debug, Clone)]
pub struct FileHook {
    sink: Arc<dyn EventSink>,
    blobs: BlobStore,
    root: PathBuf,
    max_blob_size: u64,
    session_id: Option<String>,
}

impl FileHook {
    /// Hook rooted at `root`; content above `max_blob_size` bytes (0 for no
    /// limit) is tracked by size only
    pub fn new(sink: Arc<dyn EventSink>, blobs: BlobStore, root: impl Into<PathBuf>, max_blob_size: u64) -> Self {
        Self {
            sink,
            blobs,
            root: root.into(),
            max_blob_size,
            session_id: None,
        }
    }

    /// Tag every recorded event with a session
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_created(&self, path: impl AsRef<Path>) -> Option<String> {
        self.record_content(EventType::FileCreated, path.as_ref())
    }

    pub fn record_modified(&self, path: impl AsRef<Path>) -> Option<String> {
        self.record_content(EventType::FileModified, path.as_ref())
    }

    pub fn record_deleted(&self, path: impl AsRef<Path>) -> Option<String> {
        let key = self.key(path.as_ref())?;
        let payload = FileChangePayload {
            session_id: self.session_id.clone(),
            ..FileChangePayload::path_only(key.clone())
        };
        record(self.sink.as_ref(), self.input(EventType::FileDeleted, &key).payload(payload), "file deletion")
    }

    pub fn record_renamed(&self, old_path: impl AsRef<Path>, new_path: impl AsRef<Path>) -> Option<String> {
        let old_key = self.key(old_path.as_ref())?;
        let new_key = self.key(new_path.as_ref())?;
        let payload = FileMovePayload {
            old_path: old_key,
            new_path: new_key.clone(),
            session_id: self.session_id.clone(),
            ..Default::default()
        };
        record(self.sink.as_ref(), self.input(EventType::FileRenamed, &new_key).payload(payload), "file rename")
    }

    fn record_content(&self, event_type: EventType, path: &Path) -> Option<String> {
        let key = self.key(path)?;
        let payload = match self.capture(&key) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Could not capture {}: {}", key, e);
                return None;
            }
        };
        record(self.sink.as_ref(), self.input(event_type, &key).payload(payload), "file change")
    }

    fn capture(&self, key: &str) -> Result<FileChangePayload> {
        let content = fs::read(self.root.join(key))?;
        let size = content.len() as u64;
        let mut payload = match self.blobs.store_with_limit(&content, self.max_blob_size)? {
            Some(hash) => FileChangePayload::new(key, hash),
            None => {
                debug!("{} exceeds the blob limit ({} bytes), tracking metadata only", key, size);
                FileChangePayload {
                    reason: Some("exceeds_max_blob_size".to_string()),
                    ..FileChangePayload::path_only(key)
                }
            }
        };
        payload.size = Some(size);
        payload.session_id = self.session_id.clone();
        Ok(payload)
    }

    fn input(&self, event_type: EventType, key: &str) -> EventInput {
        EventInput::new(event_type, "user").aggregate(key, "file")
    }

    /// Root-relative, `/`-separated key for `path`
    fn key(&self, path: &Path) -> Option<String> {
        let relative = if path.is_absolute() {
            match path.strip_prefix(&self.root) {
                Ok(relative) => relative,
                Err(_) => {
                    warn!("Ignoring {:?}: outside {:?}", path, self.root);
                    return None;
                }
            }
        } else {
            path
        };

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => {
                    warn!("Ignoring {:?}: not a plain relative path", path);
                    return None;
                }
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }
}

/// Records git activity, either from explicit details or by asking `git`
#[derive(Debug, Clone)]
pub struct GitHook {
    sink: Arc<dyn EventSink>,
    session_id: Option<String>,
}

impl GitHook {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn record_commit(&self, commit: GitCommitPayload) -> Option<String> {
        let hash = commit.hash.clone();
        let payload = GitCommitPayload {
            session_id: commit.session_id.or_else(|| self.session_id.clone()),
            ..commit
        };
        let input = EventInput::new(EventType::GitCommit, "git")
            .aggregate(hash, "commit")
            .payload(payload);
        record(self.sink.as_ref(), input, "git commit")
    }

    pub fn record_branch_switch(&self, branch: &str, previous_branch: Option<&str>) -> Option<String> {
        let payload = GitBranchPayload {
            branch: branch.to_string(),
            previous_branch: previous_branch.map(str::to_string),
            session_id: self.session_id.clone(),
            ..Default::default()
        };
        let input = EventInput::new(EventType::GitBranchSwitched, "git")
            .aggregate(branch, "branch")
            .payload(payload);
        record(self.sink.as_ref(), input, "git branch switch")
    }

    pub fn record_push(&self, remote: &str, branch: &str) -> Option<String> {
        self.record_sync(EventType::GitPush, Some(remote), Some(branch), None, None)
    }

    pub fn record_pull(&self, remote: &str, branch: &str) -> Option<String> {
        self.record_sync(EventType::GitPull, Some(remote), Some(branch), None, None)
    }

    pub fn record_merge(&self, source_branch: &str, target_branch: &str) -> Option<String> {
        self.record_sync(EventType::GitMerge, None, None, Some(source_branch), Some(target_branch))
    }

    fn record_sync(
        &self,
        event_type: EventType,
        remote: Option<&str>,
        branch: Option<&str>,
        source_branch: Option<&str>,
        target_branch: Option<&str>,
    ) -> Option<String> {
        let payload = GitSyncPayload {
            remote: remote.map(str::to_string),
            branch: branch.map(str::to_string),
            source_branch: source_branch.map(str::to_string),
            target_branch: target_branch.map(str::to_string),
            session_id: self.session_id.clone(),
            ..Default::default()
        };
        let aggregate = branch.or(target_branch).unwrap_or("HEAD");
        let input = EventInput::new(event_type.clone(), "git")
            .aggregate(aggregate, "branch")
            .payload(payload);
        record(self.sink.as_ref(), input, event_type.as_str())
    }

    /// Describe `HEAD` of the repository at `repo`
    pub fn capture_commit(&self, repo: &Path) -> Option<GitCommitPayload> {
        let line = run_git(repo, &["log", "-1", "--format=%H%x1f%s%x1f%an%x1f%ae"])?;
        let mut fields = line.split('\u{1f}');
        let hash = fields.next().filter(|h| !h.is_empty())?.to_string();
        Some(GitCommitPayload {
            hash,
            message: fields.next().unwrap_or_default().to_string(),
            author: fields.next().unwrap_or_default().to_string(),
            email: fields.next().unwrap_or_default().to_string(),
            branch: self.capture_branch(repo),
            session_id: self.session_id.clone(),
            ..Default::default()
        })
    }

    /// Current branch name, `None` when detached or not a repository
    pub fn capture_branch(&self, repo: &Path) -> Option<String> {
        run_git(repo, &["rev-parse", "--abbrev-ref", "HEAD"]).filter(|b| b != "HEAD")
    }

    /// Record whatever `HEAD` currently points at
    pub fn record_head(&self, repo: &Path) -> Option<String> {
        let commit = self.capture_commit(repo)?;
        self.record_commit(commit)
    }
}

pub(crate) fn run_git(repo: &Path, args: &[&str]) -> Option<String> {
    let output = match Command::new("git").arg("-C").arg(repo).args(args).output() {
        Ok(output) => output,
        Err(e) => {
            warn!("Failed to run git: {}", e);
            return None;
        }
    };
    if !output.status.success() {
        debug!(
            "git {} failed in {:?}: {}",
            args.join(" "),
            repo,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Records session lifecycle and conversation events
#[derive(Debug, Clone)]
pub struct SessionHook {
    sink: Arc<dyn EventSink>,
}

impl SessionHook {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub fn record_session_created(&self, session: SessionPayload) -> Option<String> {
        let Some(session_id) = session.session_id.clone() else {
            warn!("Dropped session creation without a session id");
            return None;
        };
        self.record(EventType::SessionCreated, &session_id, "user", session)
    }

    pub fn record_session_switched(&self, session_id: &str, working_dir: Option<&str>) -> Option<String> {
        let payload = SessionPayload {
            session_id: Some(session_id.to_string()),
            working_dir: working_dir.map(str::to_string),
            ..Default::default()
        };
        self.record(EventType::SessionSwitched, session_id, "user", payload)
    }

    pub fn record_message(&self, session_id: &str, role: Role, content: &str, model: Option<&str>) -> Option<String> {
        let (event_type, actor) = match role {
            Role::User => (EventType::LlmMessageUser, "user"),
            Role::Assistant => (EventType::LlmMessageAssistant, "assistant"),
            Role::System => (EventType::LlmMessageSystem, "system"),
        };
        let payload = MessagePayload {
            role: Some(role),
            content: content.to_string(),
            session_id: Some(session_id.to_string()),
            model: model.map(str::to_string),
            ..Default::default()
        };
        self.record(event_type, session_id, actor, payload)
    }

    pub fn record_model_changed(&self, session_id: &str, old_model: Option<&str>, new_model: &str) -> Option<String> {
        let payload = ModelChangePayload {
            old_model: old_model.map(str::to_string),
            new_model: Some(new_model.to_string()),
            session_id: Some(session_id.to_string()),
            ..Default::default()
        };
        self.record(EventType::ModelChanged, session_id, "user", payload)
    }

    pub fn record_provider_changed(
        &self,
        session_id: &str,
        old_provider: Option<&str>,
        new_provider: &str,
    ) -> Option<String> {
        let payload = ModelChangePayload {
            old_provider: old_provider.map(str::to_string),
            new_provider: Some(new_provider.to_string()),
            session_id: Some(session_id.to_string()),
            ..Default::default()
        };
        self.record(EventType::ProviderChanged, session_id, "user", payload)
    }

    pub fn record_streaming_started(&self, session_id: &str, model: &str, provider: &str) -> Option<String> {
        let payload = json!({"session_id": session_id, "model": model, "provider": provider});
        self.record(EventType::LlmStreamingStart, session_id, &format!("llm:{}", model), payload)
    }

    pub fn record_streaming_finished(
        &self,
        session_id: &str,
        model: &str,
        provider: &str,
        token_count: Option<u64>,
    ) -> Option<String> {
        let mut payload = json!({"session_id": session_id, "model": model, "provider": provider});
        if let Some(count) = token_count {
            payload["token_count"] = json!(count);
        }
        self.record(EventType::LlmStreamingEnd, session_id, &format!("llm:{}", model), payload)
    }

    /// Record a failed model request
    pub fn record_llm_error(&self, session_id: &str, model: &str, provider: &str, error: &str) -> Option<String> {
        let payload = json!({"session_id": session_id, "model": model, "provider": provider, "error": error});
        self.record(EventType::LlmError, session_id, &format!("llm:{}", model), payload)
    }

    fn record(
        &self,
        event_type: EventType,
        session_id: &str,
        actor: &str,
        payload: impl Into<crate::event::EventPayload>,
    ) -> Option<String> {
        let what = event_type.as_str().to_string();
        let input = EventInput::new(event_type, actor)
            .aggregate(session_id, "session")
            .payload(payload);
        record(self.sink.as_ref(), input, &what)
    }
}

/// Records tool executions and permission decisions
///
/// Tool events are aggregated by session. Long string results are cut to
/// `max_result_length` characters; structured results are kept whole.
#[derive(Debug, Clone)]
pub struct ToolHook {
    sink: Arc<dyn EventSink>,
    capture_permissions: bool,
    max_result_length: usize,
}

impl ToolHook {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            capture_permissions: true,
            max_result_length: DEFAULT_MAX_RESULT_LENGTH,
        }
    }

    /// Skip permission events entirely when `false`
    pub fn capture_permissions(mut self, capture: bool) -> Self {
        self.capture_permissions = capture;
        self
    }

    pub fn max_result_length(mut self, length: usize) -> Self {
        self.max_result_length = length;
        self
    }

    /// Record the start of a call; pass the returned id to the matching
    /// success or failure so the outcome points back at it
    pub fn record_call_started(&self, session_id: &str, tool_name: &str, arguments: Value) -> Option<String> {
        let payload = ToolCallPayload {
            arguments,
            ..Self::base(session_id, tool_name)
        };
        self.record(EventType::ToolCallStarted, session_id, &tool_actor(tool_name), payload, None)
    }

    pub fn record_call_succeeded(
        &self,
        session_id: &str,
        tool_name: &str,
        arguments: Value,
        result: Value,
        duration: Option<Duration>,
        started_id: Option<&str>,
    ) -> Option<String> {
        let payload = ToolCallPayload {
            arguments,
            result: Some(self.truncate(result)),
            duration_ms: duration.map(millis),
            ..Self::base(session_id, tool_name)
        };
        self.record(EventType::ToolCallSuccess, session_id, &tool_actor(tool_name), payload, started_id)
    }

    pub fn record_call_failed(
        &self,
        session_id: &str,
        tool_name: &str,
        arguments: Value,
        error: &str,
        duration: Option<Duration>,
        started_id: Option<&str>,
    ) -> Option<String> {
        let payload = ToolCallPayload {
            arguments,
            error: Some(error.to_string()),
            duration_ms: duration.map(millis),
            ..Self::base(session_id, tool_name)
        };
        self.record(EventType::ToolCallFailed, session_id, &tool_actor(tool_name), payload, started_id)
    }

    pub fn record_permission_requested(&self, session_id: &str, tool_name: &str, arguments: Value) -> Option<String> {
        let payload = ToolCallPayload {
            arguments,
            ..Self::base(session_id, tool_name)
        };
        self.record_permission(EventType::ToolPermissionRequested, session_id, payload)
    }

    pub fn record_permission_granted(&self, session_id: &str, tool_name: &str) -> Option<String> {
        self.record_permission(EventType::ToolPermissionGranted, session_id, Self::base(session_id, tool_name))
    }

    pub fn record_permission_denied(&self, session_id: &str, tool_name: &str) -> Option<String> {
        self.record_permission(EventType::ToolPermissionDenied, session_id, Self::base(session_id, tool_name))
    }

    fn record_permission(&self, event_type: EventType, session_id: &str, payload: ToolCallPayload) -> Option<String> {
        if !self.capture_permissions {
            debug!("Permission capture off, skipping {}", event_type);
            return None;
        }
        self.record(event_type, session_id, "user", payload, None)
    }

    fn base(session_id: &str, tool_name: &str) -> ToolCallPayload {
        ToolCallPayload {
            tool_name: tool_name.to_string(),
            session_id: Some(session_id.to_string()),
            ..Default::default()
        }
    }

    fn truncate(&self, result: Value) -> Value {
        match result {
            Value::String(text) if text.chars().count() > self.max_result_length => {
                let mut cut: String = text.chars().take(self.max_result_length).collect();
                cut.push_str(TRUNCATION_MARKER);
                Value::String(cut)
            }
            other => other,
        }
    }

    fn record(
        &self,
        event_type: EventType,
        session_id: &str,
        actor: &str,
        payload: ToolCallPayload,
        caused_by: Option<&str>,
    ) -> Option<String> {
        let what = event_type.as_str().to_string();
        let mut input = EventInput::new(event_type, actor)
            .aggregate(session_id, "session")
            .payload(payload);
        if let Some(id) = caused_by {
            input = input.caused_by(id);
        }
        record(self.sink.as_ref(), input, &what)
    }
}

fn tool_actor(tool_name: &str) -> String {
    format!("tool:{}", tool_name)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
