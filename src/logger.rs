//! Event logger: the single entry point for producing events
//!
//! The logger stamps each [`EventInput`] with an id, a microsecond
//! timestamp from the injected clock, and the next sequence number, computes
//! the payload checksum and appends it. History is never touched.
//!
//! Failures are reported in the returned [`LogResult`] rather than as
//! errors, so producers can stay fail-soft without matching on error types.
//!
//! Listeners registered with [`EventLogger::subscribe`] see every event
//! after it is durably appended. A panicking listener is logged and skipped;
//! it never fails the append or starves the other listeners.

use crate::clock::ClockRef;
use crate::error::{Result, TimelineError};
use crate::event::{session_id_of, Event, EventInput, EventType};
use crate::log_store::{EventRecord, LogStore};
use crate::utils::hash_data;
use parking_lot::RwLock;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Attempts made when a concurrent writer steals a sequence number
const MAX_APPEND_ATTEMPTS: usize = 3;

/// Outcome of a single append
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogResult {
    pub success: bool,
    pub event_id: Option<String>,
    pub sequence_number: Option<u64>,
    pub timestamp: Option<i64>,
    pub error: Option<String>,
}

impl LogResult {
    fn ok(record: &EventRecord) -> Self {
        Self {
            success: true,
            event_id: Some(record.id.clone()),
            sequence_number: Some(record.sequence_number),
            timestamp: Some(record.timestamp),
            error: None,
        }
    }

    fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            event_id: None,
            sequence_number: None,
            timestamp: None,
            error: Some(error.to_string()),
        }
    }
}

/// Result of re-checking every stored checksum
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChecksumSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub invalid_ids: Vec<String>,
}

impl ChecksumSummary {
    /// True when no event failed verification
    pub fn is_clean(&self) -> bool {
        self.invalid == 0
    }
}

/// Callback run for each appended event
pub type EventListener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle for removing a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    /// `None` listens to every type
    event_type: Option<EventType>,
    listener: EventListener,
}

/// Validates, stamps and appends events
pub struct EventLogger {
    store: Arc<LogStore>,
    clock: ClockRef,
    enabled: AtomicBool,
    subscriptions: RwLock<Vec<Subscription>>,
    next_subscription: AtomicU64,
}

impl std::fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogger")
            .field("enabled", &self.is_enabled())
            .field("subscriptions", &self.subscriptions.read().len())
            .finish()
    }
}

impl EventLogger {
    /// Create a logger writing to `store`
    pub fn new(store: Arc<LogStore>, clock: ClockRef) -> Self {
        Self {
            store,
            clock,
            enabled: AtomicBool::new(true),
            subscriptions: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Underlying log store
    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    /// Clock used to stamp events
    pub fn clock(&self) -> &ClockRef {
        &self.clock
    }

    /// Turn logging on or off; while off every `log` call fails softly
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        debug!("Timeline logging {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Whether `log` currently accepts events
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Append one event
    ///
    /// Never panics and never returns an error: any failure, including a
    /// disabled logger, comes back as `success: false` with a message.
    pub fn log(&self, input: EventInput) -> LogResult {
        match self.try_log(input) {
            Ok(record) => LogResult::ok(&record),
            Err(e) => {
                debug!("Event not logged: {}", e);
                LogResult::failed(e)
            }
        }
    }

    /// Append one event, returning the stored row
    ///
    /// # Errors
    ///
    /// - [`TimelineError::LoggingDisabled`] while logging is switched off
    /// - [`TimelineError::SequenceCollision`] or a busy database after repeated retries
    /// - [`TimelineError::Database`] on storage failure
    pub fn try_log(&self, input: EventInput) -> Result<EventRecord> {
        if !self.is_enabled() {
            return Err(TimelineError::LoggingDisabled);
        }

        let mut record = self.prepare(input)?;
        let mut attempt = 1;
        loop {
            match self.store.append_next(&mut record) {
                Ok(_) => {
                    self.notify(std::slice::from_ref(&record));
                    return Ok(record);
                }
                Err(e) if e.is_recoverable() && attempt < MAX_APPEND_ATTEMPTS => {
                    warn!(attempt, error = %e, "append contended, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Append several events in one transaction
    ///
    /// All or nothing: if the transaction fails, every returned result is a
    /// failure carrying the same message.
    pub fn log_batch(&self, inputs: Vec<EventInput>) -> Vec<LogResult> {
        let count = inputs.len();
        match self.try_log_batch(inputs) {
            Ok(records) => records.iter().map(LogResult::ok).collect(),
            Err(e) => {
                debug!("Batch of {} events not logged: {}", count, e);
                let message = e.to_string();
                (0..count).map(|_| LogResult::failed(&message)).collect()
            }
        }
    }

    /// Append several events atomically, returning the stored rows
    pub fn try_log_batch(&self, inputs: Vec<EventInput>) -> Result<Vec<EventRecord>> {
        if !self.is_enabled() {
            return Err(TimelineError::LoggingDisabled);
        }

        let mut records = inputs
            .into_iter()
            .map(|input| self.prepare(input))
            .collect::<Result<Vec<_>>>()?;

        let mut attempt = 1;
        loop {
            match self.store.append_batch_next(&mut records) {
                Ok(()) => {
                    self.notify(&records);
                    return Ok(records);
                }
                Err(e) if e.is_recoverable() && attempt < MAX_APPEND_ATTEMPTS => {
                    warn!(attempt, error = %e, "batch append contended, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run `listener` for every appended event of `event_type`, or of any
    /// type when `None`
    ///
    /// Listeners run synchronously on the appending thread, after the
    /// event is stored, in subscription order. They may log further events.
    pub fn subscribe(&self, event_type: Option<EventType>, listener: EventListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription {
            id,
            event_type,
            listener,
        });
        id
    }

    /// Remove a listener; `false` if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    fn notify(&self, records: &[EventRecord]) {
        for record in records {
            // Cloned out so listeners can subscribe or log without deadlocking
            let listeners: Vec<EventListener> = self
                .subscriptions
                .read()
                .iter()
                .filter(|s| s.event_type.as_ref().map_or(true, |t| t.as_str() == record.event_type))
                .map(|s| s.listener.clone())
                .collect();
            if listeners.is_empty() {
                continue;
            }

            let event = record.to_event();
            for listener in listeners {
                if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                    warn!("Event listener panicked on {} #{}", record.event_type, record.sequence_number);
                }
            }
        }
    }

    /// Recompute one event's checksum from its stored payload
    ///
    /// Unknown ids and read failures verify as `false`.
    pub fn verify(&self, event_id: &str) -> bool {
        match self.verify_event(event_id) {
            Ok(()) => true,
            Err(e) if e.is_not_found() => false,
            Err(TimelineError::ChecksumMismatch { .. }) => false,
            Err(e) => {
                warn!("Could not verify event {}: {}", event_id, e);
                false
            }
        }
    }

    /// Like [`verify`](Self::verify), but says what went wrong
    ///
    /// # Errors
    ///
    /// - [`TimelineError::EventNotFound`] for unknown ids
    /// - [`TimelineError::ChecksumMismatch`] when the payload was altered
    pub fn verify_event(&self, event_id: &str) -> Result<()> {
        let (payload, checksum) = self
            .store
            .get_payload_and_checksum(event_id)?
            .ok_or_else(|| TimelineError::EventNotFound(event_id.to_string()))?;

        let actual = hash_data(payload.as_bytes());
        if actual != checksum {
            return Err(TimelineError::ChecksumMismatch {
                event_id: event_id.to_string(),
                expected: checksum,
                actual,
            });
        }
        Ok(())
    }

    /// Verify every stored event, collecting failures instead of stopping at the first
    pub fn verify_all(&self) -> Result<ChecksumSummary> {
        let mut summary = ChecksumSummary::default();
        for (id, payload, checksum) in self.store.all_payloads()? {
            summary.total += 1;
            if hash_data(payload.as_bytes()) == checksum {
                summary.valid += 1;
            } else {
                warn!("Checksum mismatch for event {}", id);
                summary.invalid += 1;
                summary.invalid_ids.push(id);
            }
        }
        debug!(
            "Verified {} events: {} valid, {} invalid",
            summary.total, summary.valid, summary.invalid
        );
        Ok(summary)
    }

    fn prepare(&self, input: EventInput) -> Result<EventRecord> {
        let payload_value = input.payload.to_value();
        let payload = input.payload.to_json()?;
        let metadata = input
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(EventRecord {
            id: Uuid::new_v4().to_string(),
            timestamp: self.clock.now_micros(),
            sequence_number: 0,
            event_type: input.event_type.as_str().to_string(),
            actor: input.actor,
            aggregate_id: input.aggregate_id,
            aggregate_type: input.aggregate_type,
            checksum: hash_data(payload.as_bytes()),
            payload,
            correlation_id: input.correlation_id,
            causation_id: input.causation_id,
            metadata,
            session_id: session_id_of(&payload_value),
        })
    }
}
