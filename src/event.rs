//! Event model: the closed set of event types, their categories, and the
//! typed payload carried by each.
//!
//! Events are stored with their payload serialized as JSON text. On the way
//! back out the payload is decoded according to the event's type into an
//! [`EventPayload`] variant; anything that does not fit the expected shape,
//! or belongs to a type without a dedicated shape, decodes as
//! [`EventPayload::Other`]. Payload structs keep unrecognized fields in
//! `extra`. A known side field with the wrong JSON type decodes as absent
//! in the typed view; the stored payload text is never rewritten.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Named grouping of event types used by filters and statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventCategory {
    /// Session lifecycle
    Session,
    /// Conversation messages and streaming
    Llm,
    /// Tool invocations and permissions
    Tool,
    /// File and directory changes
    File,
    /// Git operations
    Git,
    /// Rewind operations
    Rewind,
}

impl EventCategory {
    /// All categories in display order
    pub const ALL: [EventCategory; 6] = [
        EventCategory::Session,
        EventCategory::Llm,
        EventCategory::Tool,
        EventCategory::File,
        EventCategory::Git,
        EventCategory::Rewind,
    ];

    /// Upper-case category name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Session => "SESSION",
            EventCategory::Llm => "LLM",
            EventCategory::Tool => "TOOL",
            EventCategory::File => "FILE",
            EventCategory::Git => "GIT",
            EventCategory::Rewind => "REWIND",
        }
    }

    /// Every known event type belonging to this category
    pub fn event_types(&self) -> Vec<EventType> {
        EventType::ALL
            .iter()
            .filter(|t| t.category() == Some(*self))
            .cloned()
            .collect()
    }

    /// Whether `event_type` belongs to this category
    pub fn contains(&self, event_type: &EventType) -> bool {
        event_type.category() == Some(*self)
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EventCategory::ALL
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("unknown event category: {}", s))
    }
}

macro_rules! event_types {
    ($( $variant:ident => $name:literal, $category:expr, $desc:literal; )*) => {
        /// Kind of an event
        ///
        /// Serialized as its SCREAMING_SNAKE name. Names written by a newer
        /// producer decode as [`EventType::Unknown`].
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventType {
            $(
                #[doc = $desc]
                $variant,
            )*
            /// Type name not known to this build
            Unknown(String),
        }

        impl EventType {
            /// Every known event type
            pub const ALL: &'static [EventType] = &[$(EventType::$variant,)*];

            /// Stored name of this type
            pub fn as_str(&self) -> &str {
                match self {
                    $(EventType::$variant => $name,)*
                    EventType::Unknown(name) => name.as_str(),
                }
            }

            /// Human readable description
            pub fn description(&self) -> &'static str {
                match self {
                    $(EventType::$variant => $desc,)*
                    EventType::Unknown(_) => "Unrecognized event type",
                }
            }

            /// Category this type belongs to, if any
            pub fn category(&self) -> Option<EventCategory> {
                match self {
                    $(EventType::$variant => $category,)*
                    EventType::Unknown(_) => None,
                }
            }

            fn from_known(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(EventType::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

use EventCategory as C;

event_types! {
    SessionCreated => "SESSION_CREATED", Some(C::Session), "New session created";
    SessionSwitched => "SESSION_SWITCHED", Some(C::Session), "Switched to another session";
    SessionRenamed => "SESSION_RENAMED", Some(C::Session), "Session renamed";
    SessionClosed => "SESSION_CLOSED", Some(C::Session), "Session closed";
    SessionRestored => "SESSION_RESTORED", Some(C::Session), "Session restored from a rewind";

    LlmMessageUser => "LLM_MESSAGE_USER", Some(C::Llm), "User message sent";
    LlmMessageAssistant => "LLM_MESSAGE_ASSISTANT", Some(C::Llm), "Assistant message received";
    LlmMessageSystem => "LLM_MESSAGE_SYSTEM", Some(C::Llm), "System message added";
    LlmStreamingStart => "LLM_STREAMING_START", Some(C::Llm), "Streaming response started";
    LlmStreamingChunk => "LLM_STREAMING_CHUNK", Some(C::Llm), "Streaming chunk received";
    LlmStreamingEnd => "LLM_STREAMING_END", Some(C::Llm), "Streaming response finished";
    LlmError => "LLM_ERROR", Some(C::Llm), "Model request failed";

    ToolCallStarted => "TOOL_CALL_STARTED", Some(C::Tool), "Tool execution started";
    ToolCallSuccess => "TOOL_CALL_SUCCESS", Some(C::Tool), "Tool execution succeeded";
    ToolCallFailed => "TOOL_CALL_FAILED", Some(C::Tool), "Tool execution failed";
    ToolPermissionRequested => "TOOL_PERMISSION_REQUESTED", Some(C::Tool), "Tool permission requested";
    ToolPermissionGranted => "TOOL_PERMISSION_GRANTED", Some(C::Tool), "Tool permission granted";
    ToolPermissionDenied => "TOOL_PERMISSION_DENIED", Some(C::Tool), "Tool permission denied";

    FileRead => "FILE_READ", Some(C::File), "File read";
    FileCreated => "FILE_CREATED", Some(C::File), "File created";
    FileModified => "FILE_MODIFIED", Some(C::File), "File modified";
    FileDeleted => "FILE_DELETED", Some(C::File), "File deleted";
    FileRenamed => "FILE_RENAMED", Some(C::File), "File renamed";
    FilePermissionChanged => "FILE_PERMISSION_CHANGED", Some(C::File), "File permissions changed";
    FileMoved => "FILE_MOVED", Some(C::File), "File moved";

    DirectoryCreated => "DIRECTORY_CREATED", Some(C::File), "Directory created";
    DirectoryDeleted => "DIRECTORY_DELETED", Some(C::File), "Directory deleted";
    DirectoryRenamed => "DIRECTORY_RENAMED", Some(C::File), "Directory renamed";
    DirectoryMoved => "DIRECTORY_MOVED", Some(C::File), "Directory moved";

    GitInit => "GIT_INIT", Some(C::Git), "Repository initialized";
    GitAdd => "GIT_ADD", Some(C::Git), "Files staged";
    GitCommit => "GIT_COMMIT", Some(C::Git), "Commit created";
    GitPush => "GIT_PUSH", Some(C::Git), "Pushed to remote";
    GitPull => "GIT_PULL", Some(C::Git), "Pulled from remote";
    GitFetch => "GIT_FETCH", Some(C::Git), "Fetched from remote";
    GitMerge => "GIT_MERGE", Some(C::Git), "Branches merged";
    GitRebase => "GIT_REBASE", Some(C::Git), "Branch rebased";
    GitBranchCreated => "GIT_BRANCH_CREATED", Some(C::Git), "Branch created";
    GitBranchSwitched => "GIT_BRANCH_SWITCHED", Some(C::Git), "Switched branch";
    GitBranchDeleted => "GIT_BRANCH_DELETED", Some(C::Git), "Branch deleted";
    GitTagCreated => "GIT_TAG_CREATED", Some(C::Git), "Tag created";
    GitTagDeleted => "GIT_TAG_DELETED", Some(C::Git), "Tag deleted";
    GitStashPush => "GIT_STASH_PUSH", Some(C::Git), "Changes stashed";
    GitStashPop => "GIT_STASH_POP", Some(C::Git), "Stash applied";
    GitConflict => "GIT_CONFLICT", Some(C::Git), "Merge conflict detected";

    CliStarted => "CLI_STARTED", None, "CLI started";
    CliStopped => "CLI_STOPPED", None, "CLI stopped";
    CliCommandExecuted => "CLI_COMMAND_EXECUTED", None, "CLI command executed";
    ModelChanged => "MODEL_CHANGED", None, "Model switched";
    ProviderChanged => "PROVIDER_CHANGED", None, "Provider switched";
    SettingsUpdated => "SETTINGS_UPDATED", None, "Settings updated";
    ApiKeyAdded => "API_KEY_ADDED", None, "API key added";
    ApiKeyRemoved => "API_KEY_REMOVED", None, "API key removed";

    RewindStarted => "REWIND_STARTED", Some(C::Rewind), "Rewind started";
    RewindSnapshotLoaded => "REWIND_SNAPSHOT_LOADED", Some(C::Rewind), "Rewind selected its base snapshot";
    RewindEventsReplayed => "REWIND_EVENTS_REPLAYED", Some(C::Rewind), "Rewind replayed events";
    RewindStateMaterialized => "REWIND_STATE_MATERIALIZED", Some(C::Rewind), "Rewind wrote its output directory";
    RewindCompleted => "REWIND_COMPLETED", Some(C::Rewind), "Rewind completed";
    RewindFailed => "REWIND_FAILED", Some(C::Rewind), "Rewind failed";

    SnapshotCreated => "SNAPSHOT_CREATED", None, "Snapshot created";
    SnapshotLoaded => "SNAPSHOT_LOADED", None, "Snapshot loaded";
    SnapshotDeleted => "SNAPSHOT_DELETED", None, "Snapshot deleted";

    ErrorOccurred => "ERROR_OCCURRED", None, "Error occurred";
    ExceptionThrown => "EXCEPTION_THROWN", None, "Exception thrown";
}

impl EventType {
    /// Decode a stored name, keeping unknown names as [`EventType::Unknown`]
    pub fn from_name(name: &str) -> Self {
        EventType::from_known(name).unwrap_or_else(|| EventType::Unknown(name.to_string()))
    }

    /// Whether this build knows the type
    pub fn is_known(&self) -> bool {
        !matches!(self, EventType::Unknown(_))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse: only known names are accepted
impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        EventType::from_known(&upper).ok_or_else(|| format!("unknown event type: {}", s))
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(EventType::from_name(&name))
    }
}

/// Accept session ids written as strings or numbers
fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Decode an auxiliary field, treating a mistyped value as absent
///
/// One odd side field must not push the whole payload into
/// [`EventPayload::Other`] and hide its path or hash from the reducers.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Extract a normalized session id from a raw JSON payload
pub fn session_id_of(value: &Value) -> Option<String> {
    match value.get("session_id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Conversation role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human input
    User,
    /// Model output
    Assistant,
    /// System prompt or injected context
    System,
}

/// Session lifecycle payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Fields not modelled above
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Conversation message payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "lenient")]
    pub content: String,
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Tool invocation payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub tool_name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub arguments: Value,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// File content change payload
///
/// `new_hash` is the blob key of the content after the change. Producers
/// that only track metadata (over-limit files) omit it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileChangePayload {
    pub path: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub old_hash: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub new_hash: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub size_delta: Option<i64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl FileChangePayload {
    /// Payload for a path with a known content hash
    pub fn new(path: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            new_hash: Some(hash.into()),
            ..Default::default()
        }
    }

    /// Payload for a path without content
    pub fn path_only(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Content hash after the change (`new_hash`, falling back to `content_hash`)
    pub fn effective_hash(&self) -> Option<&str> {
        self.new_hash
            .as_deref()
            .or(self.content_hash.as_deref())
            .filter(|h| !h.is_empty())
    }
}

/// Rename or move payload for files and directories
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMovePayload {
    pub old_path: String,
    pub new_path: String,
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Commit payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitCommitPayload {
    pub hash: String,
    #[serde(default, deserialize_with = "lenient")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient")]
    pub author: String,
    #[serde(default, deserialize_with = "lenient")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient")]
    pub files_changed: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub insertions: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub deletions: u64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Branch create/switch/delete payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitBranchPayload {
    pub branch: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub previous_branch: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Push/pull/fetch/merge/rebase payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitSyncPayload {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub source_branch: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub target_branch: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Model or provider switch payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelChangePayload {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub old_model: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub new_model: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub old_provider: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub new_provider: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Snapshot lifecycle payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEventPayload {
    pub snapshot_id: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub compressed_size_bytes: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub uncompressed_size_bytes: Option<u64>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Rewind state-machine payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewindEventPayload {
    pub target_timestamp: i64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub target_timestamp_human: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub events_replayed: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub files_restored: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub files_skipped: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Typed event payload
///
/// Serializes as the bare inner object; the variant is implied by the
/// event's type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Session(SessionPayload),
    Message(MessagePayload),
    Tool(ToolCallPayload),
    FileChange(FileChangePayload),
    FileMove(FileMovePayload),
    GitCommit(GitCommitPayload),
    GitBranch(GitBranchPayload),
    GitSync(GitSyncPayload),
    ModelChange(ModelChangePayload),
    Snapshot(SnapshotEventPayload),
    Rewind(RewindEventPayload),
    /// Any payload without a dedicated shape
    Other(Value),
}

impl Default for EventPayload {
    fn default() -> Self {
        EventPayload::Other(Value::Object(Map::new()))
    }
}

macro_rules! payload_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for EventPayload {
                fn from(payload: $ty) -> Self {
                    EventPayload::$variant(payload)
                }
            }
        )*
    };
}

payload_from! {
    SessionPayload => Session,
    MessagePayload => Message,
    ToolCallPayload => Tool,
    FileChangePayload => FileChange,
    FileMovePayload => FileMove,
    GitCommitPayload => GitCommit,
    GitBranchPayload => GitBranch,
    GitSyncPayload => GitSync,
    ModelChangePayload => ModelChange,
    SnapshotEventPayload => Snapshot,
    RewindEventPayload => Rewind,
    Value => Other,
}

fn typed<T: DeserializeOwned>(value: Value, wrap: fn(T) -> EventPayload) -> EventPayload {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(payload) => wrap(payload),
        Err(_) => EventPayload::Other(value),
    }
}

impl EventPayload {
    /// Decode a raw JSON payload according to the event type
    ///
    /// Never fails: a payload that does not match the expected shape for its
    /// type comes back as [`EventPayload::Other`].
    pub fn decode(event_type: &EventType, value: Value) -> Self {
        use EventType::*;

        match event_type {
            SessionCreated | SessionSwitched | SessionRenamed | SessionClosed | SessionRestored => {
                typed(value, EventPayload::Session)
            }
            LlmMessageUser | LlmMessageAssistant | LlmMessageSystem => typed(value, EventPayload::Message),
            ToolCallStarted | ToolCallSuccess | ToolCallFailed | ToolPermissionRequested
            | ToolPermissionGranted | ToolPermissionDenied => typed(value, EventPayload::Tool),
            FileRead | FileCreated | FileModified | FileDeleted | FilePermissionChanged | DirectoryCreated
            | DirectoryDeleted => typed(value, EventPayload::FileChange),
            FileRenamed | FileMoved | DirectoryRenamed | DirectoryMoved => typed(value, EventPayload::FileMove),
            GitCommit => typed(value, EventPayload::GitCommit),
            GitBranchCreated | GitBranchSwitched | GitBranchDeleted => typed(value, EventPayload::GitBranch),
            GitPush | GitPull | GitFetch | GitMerge | GitRebase => typed(value, EventPayload::GitSync),
            ModelChanged | ProviderChanged => typed(value, EventPayload::ModelChange),
            SnapshotCreated | SnapshotLoaded | SnapshotDeleted => typed(value, EventPayload::Snapshot),
            RewindStarted | RewindSnapshotLoaded | RewindEventsReplayed | RewindStateMaterialized
            | RewindCompleted | RewindFailed => typed(value, EventPayload::Rewind),
            _ => EventPayload::Other(value),
        }
    }

    /// Payload as a JSON value
    pub fn to_value(&self) -> Value {
        match self {
            EventPayload::Other(value) => value.clone(),
            shaped => serde_json::to_value(shaped).unwrap_or(Value::Null),
        }
    }

    /// Canonical serialized form used for storage and checksums
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Immutable, sequenced fact read back from the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEvent")]
pub struct Event {
    pub id: String,
    /// Microseconds since the Unix epoch
    pub timestamp: i64,
    pub sequence_number: u64,
    pub event_type: EventType,
    pub actor: String,
    pub aggregate_id: Option<String>,
    pub aggregate_type: Option<String>,
    pub payload: EventPayload,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub metadata: Option<Value>,
    /// SHA-256 hex of the stored payload text
    pub checksum: String,
}

impl Event {
    /// Category of this event's type
    pub fn category(&self) -> Option<EventCategory> {
        self.event_type.category()
    }
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    timestamp: i64,
    sequence_number: u64,
    event_type: EventType,
    actor: String,
    #[serde(default)]
    aggregate_id: Option<String>,
    #[serde(default)]
    aggregate_type: Option<String>,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default)]
    causation_id: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    checksum: String,
}

impl From<RawEvent> for Event {
    fn from(raw: RawEvent) -> Self {
        let payload = EventPayload::decode(&raw.event_type, raw.payload);
        Event {
            id: raw.id,
            timestamp: raw.timestamp,
            sequence_number: raw.sequence_number,
            event_type: raw.event_type,
            actor: raw.actor,
            aggregate_id: raw.aggregate_id,
            aggregate_type: raw.aggregate_type,
            payload,
            correlation_id: raw.correlation_id,
            causation_id: raw.causation_id,
            metadata: raw.metadata,
            checksum: raw.checksum,
        }
    }
}

/// Producer-side description of an event, before id/timestamp/sequence are assigned
///
/// ```rust
/// use chronolog::event::{EventInput, EventType, FileChangePayload};
///
/// let input = EventInput::new(EventType::FileModified, "user")
///     .aggregate("src/main.rs", "file")
///     .payload(FileChangePayload::new("src/main.rs", "ab".repeat(32)))
///     .correlation("op-1");
/// assert_eq!(input.aggregate_id.as_deref(), Some("src/main.rs"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EventInput {
    pub event_type: EventType,
    pub actor: String,
    pub aggregate_id: Option<String>,
    pub aggregate_type: Option<String>,
    pub payload: EventPayload,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub metadata: Option<Value>,
}

impl EventInput {
    /// Start an input with an empty payload
    pub fn new(event_type: EventType, actor: impl Into<String>) -> Self {
        Self {
            event_type,
            actor: actor.into(),
            aggregate_id: None,
            aggregate_type: None,
            payload: EventPayload::default(),
            correlation_id: None,
            causation_id: None,
            metadata: None,
        }
    }

    /// Set the aggregate this event concerns
    pub fn aggregate(mut self, id: impl Into<String>, kind: impl Into<String>) -> Self {
        self.aggregate_id = Some(id.into());
        self.aggregate_type = Some(kind.into());
        self
    }

    /// Set a typed payload
    pub fn payload(mut self, payload: impl Into<EventPayload>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set a raw JSON payload, stored exactly as given
    pub fn payload_json(mut self, value: Value) -> Self {
        self.payload = EventPayload::Other(value);
        self
    }

    /// Group with other events of one logical operation
    pub fn correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Mark the event that directly triggered this one
    pub fn caused_by(mut self, id: impl Into<String>) -> Self {
        self.causation_id = Some(id.into());
        self
    }

    /// Attach free-form metadata
    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_names_round_trip() {
        for event_type in EventType::ALL {
            assert_eq!(&EventType::from_name(event_type.as_str()), event_type);
            assert_eq!(&event_type.as_str().parse::<EventType>().unwrap(), event_type);
        }
        assert_eq!(EventType::ALL.len(), 64);
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let t = EventType::from_name("QUANTUM_LEAP");
        assert_eq!(t, EventType::Unknown("QUANTUM_LEAP".to_string()));
        assert_eq!(t.as_str(), "QUANTUM_LEAP");
        assert!(t.category().is_none());
        assert!("QUANTUM_LEAP".parse::<EventType>().is_err());
    }

    #[test]
    fn test_categories() {
        assert_eq!(EventType::DirectoryMoved.category(), Some(EventCategory::File));
        assert_eq!(EventType::GitCommit.category(), Some(EventCategory::Git));
        assert_eq!(EventType::ModelChanged.category(), None);
        assert_eq!("file".parse::<EventCategory>().unwrap(), EventCategory::File);
        assert!(EventCategory::Rewind.event_types().contains(&EventType::RewindFailed));
        assert_eq!(EventCategory::Session.event_types().len(), 5);
    }

    #[test]
    fn test_decode_typed_payload() {
        let payload = EventPayload::decode(
            &EventType::FileModified,
            json!({"path": "a.txt", "new_hash": "h2", "session_id": 7, "editor": "vim"}),
        );
        match payload {
            EventPayload::FileChange(p) => {
                assert_eq!(p.path, "a.txt");
                assert_eq!(p.effective_hash(), Some("h2"));
                assert_eq!(p.session_id.as_deref(), Some("7"));
                assert_eq!(p.extra.get("editor"), Some(&json!("vim")));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_decode_mismatched_shape_falls_back() {
        let value = json!({"unexpected": true});
        let payload = EventPayload::decode(&EventType::GitCommit, value.clone());
        assert_eq!(payload, EventPayload::Other(value));
    }

    #[test]
    fn test_mistyped_side_fields_keep_typed_shape() {
        let payload = EventPayload::decode(
            &EventType::FileModified,
            json!({"path": "a.txt", "new_hash": "H2", "size": "12", "reason": 5}),
        );
        let EventPayload::FileChange(p) = payload else {
            panic!("unexpected payload {:?}", payload);
        };
        assert_eq!(p.effective_hash(), Some("H2"));
        assert_eq!(p.size, None);
        assert_eq!(p.reason, None);

        let payload = EventPayload::decode(&EventType::GitCommit, json!({"hash": "abc123", "message": null}));
        assert!(matches!(payload, EventPayload::GitCommit(ref p) if p.hash == "abc123" && p.message.is_empty()));

        let payload = EventPayload::decode(
            &EventType::LlmMessageUser,
            json!({"content": "hi", "role": "robot", "token_count": -3}),
        );
        assert!(matches!(payload, EventPayload::Message(ref p) if p.content == "hi" && p.role.is_none()));
    }

    #[test]
    fn test_extra_fields_survive_serialization() {
        let raw = json!({"old_path": "a", "new_path": "b", "note": "kept"});
        let payload = EventPayload::decode(&EventType::FileRenamed, raw.clone());
        assert_eq!(payload.to_value(), raw);
    }

    #[test]
    fn test_event_deserializes_with_typed_payload() {
        let event: Event = serde_json::from_value(json!({
            "id": "e1",
            "timestamp": 100,
            "sequence_number": 1,
            "event_type": "GIT_BRANCH_SWITCHED",
            "actor": "git:alice",
            "payload": {"branch": "main"},
            "checksum": "x"
        }))
        .unwrap();
        assert!(matches!(event.payload, EventPayload::GitBranch(ref p) if p.branch == "main"));
        assert_eq!(event.category(), Some(EventCategory::Git));
    }
}
