//! Read-side access to the event log
//!
//! Every read goes through a [`QueryFilter`], compiled into one SQL `WHERE`
//! clause shared by the count and the page, so `total` always reflects the
//! same filter as `events`. Nothing here writes.

use crate::collections::{HashMap, HashMapExt, HashSet, HashSetExt};
use crate::error::{Result, TimelineError};
use crate::event::{Event, EventCategory, EventType};
use crate::log_store::{event_from_row, LogStore, EVENT_COLUMNS};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default page size
pub const DEFAULT_LIMIT: usize = 100;

/// Causation trees stop growing below this depth
pub const MAX_CAUSATION_DEPTH: usize = 64;

/// Result ordering by timestamp, then sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filter over the event log
///
/// Empty or `None` fields do not constrain. Event types and categories
/// combine with AND: an event must match both when both are given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryFilter {
    /// Inclusive lower bound, microseconds
    pub start_time: Option<i64>,
    /// Inclusive upper bound, microseconds
    pub end_time: Option<i64>,
    pub event_types: Vec<EventType>,
    pub categories: Vec<EventCategory>,
    pub actor: Option<String>,
    pub aggregate_id: Option<String>,
    pub aggregate_type: Option<String>,
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
    /// Page size; `None` returns every match
    pub limit: Option<usize>,
    pub offset: usize,
    pub order: SortOrder,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            event_types: Vec::new(),
            categories: Vec::new(),
            actor: None,
            aggregate_id: None,
            aggregate_type: None,
            session_id: None,
            correlation_id: None,
            limit: Some(DEFAULT_LIMIT),
            offset: 0,
            order: SortOrder::Asc,
        }
    }
}

/// One page of events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub events: Vec<Event>,
    /// Matches across all pages
    pub total: usize,
    pub has_more: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

/// An event and everything it (transitively) caused
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CausationNode {
    pub event: Event,
    pub depth: usize,
    /// Direct effects, by timestamp
    pub children: Vec<CausationNode>,
}

impl CausationNode {
    /// Number of nodes below this one
    pub fn descendant_count(&self) -> usize {
        self.children.iter().map(|c| 1 + c.descendant_count()).sum()
    }

    /// Depth of the deepest descendant relative to this node
    pub fn height(&self) -> usize {
        self.children.iter().map(|c| 1 + c.height()).max().unwrap_or(0)
    }
}

/// Start and end of a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    /// 0 when the window is empty
    pub earliest: i64,
    /// 0 when the window is empty
    pub latest: i64,
}

/// Aggregate counts over a filtered window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventStats {
    pub total_events: usize,
    pub events_by_type: BTreeMap<String, usize>,
    pub events_by_category: BTreeMap<String, usize>,
    pub events_by_actor: BTreeMap<String, usize>,
    pub time_range: TimeRange,
}

/// Compiled `WHERE` clause with its bound values
struct WhereClause {
    sql: String,
    values: Vec<SqlValue>,
}

/// `filter.offset` as an SQL integer
fn page_offset(filter: &QueryFilter) -> Result<i64> {
    i64::try_from(filter.offset)
        .map_err(|_| TimelineError::validation(format!("offset {} is out of range", filter.offset)))
}

/// Query engine over a [`LogStore`]
#[derive(Debug, Clone)]
pub struct QueryEngine {
    store: Arc<LogStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<LogStore>) -> Self {
        Self { store }
    }

    /// Filtered, paginated read
    ///
    /// # Errors
    ///
    /// - [`TimelineError::Validation`] if `start_time` is after `end_time`
    ///   or `offset` is beyond what storage can address
    /// - [`TimelineError::Database`] on storage failure
    pub fn query(&self, filter: &QueryFilter) -> Result<QueryResult> {
        let offset_sql = page_offset(filter)?;
        let clause = self.compile(filter)?;
        let limit_sql = filter.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(-1));

        let (total, events) = self.store.with_conn(|conn| {
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM events {}", clause.sql),
                params_from_iter(clause.values.iter()),
                |row| row.get(0),
            )?;

            let order = filter.order.sql();
            let sql = format!(
                "SELECT {} FROM events {} ORDER BY timestamp {}, sequence_number {} LIMIT ? OFFSET ?",
                EVENT_COLUMNS, clause.sql, order, order
            );
            let mut values = clause.values.clone();
            values.push(SqlValue::Integer(limit_sql));
            values.push(SqlValue::Integer(offset_sql));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), event_from_row)?;
            let events = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((total as usize, events))
        })?;

        debug!("Query matched {} events, returning {}", total, events.len());
        Ok(QueryResult {
            has_more: filter.offset.saturating_add(events.len()) < total,
            events,
            total,
            offset: filter.offset,
            limit: filter.limit,
        })
    }

    fn compile(&self, filter: &QueryFilter) -> Result<WhereClause> {
        if let (Some(start), Some(end)) = (filter.start_time, filter.end_time) {
            if start > end {
                return Err(TimelineError::validation(format!(
                    "start_time {} is after end_time {}",
                    start, end
                )));
            }
        }

        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(start) = filter.start_time {
            conditions.push("timestamp >= ?".into());
            values.push(SqlValue::Integer(start));
        }
        if let Some(end) = filter.end_time {
            conditions.push("timestamp <= ?".into());
            values.push(SqlValue::Integer(end));
        }

        let mut push_types = |types: Vec<String>, conditions: &mut Vec<String>| {
            if types.is_empty() {
                // A category with no known types matches nothing
                conditions.push("0".into());
                return;
            }
            let placeholders = vec!["?"; types.len()].join(", ");
            conditions.push(format!("event_type IN ({})", placeholders));
            values.extend(types.into_iter().map(SqlValue::Text));
        };

        if !filter.event_types.is_empty() {
            let names = filter.event_types.iter().map(|t| t.as_str().to_string()).collect();
            push_types(names, &mut conditions);
        }
        if !filter.categories.is_empty() {
            let names: BTreeSet<String> = filter
                .categories
                .iter()
                .flat_map(|c| c.event_types())
                .map(|t| t.as_str().to_string())
                .collect();
            push_types(names.into_iter().collect(), &mut conditions);
        }

        for (column, value) in [
            ("actor", &filter.actor),
            ("aggregate_id", &filter.aggregate_id),
            ("aggregate_type", &filter.aggregate_type),
            ("correlation_id", &filter.correlation_id),
        ] {
            if let Some(value) = value {
                conditions.push(format!("{} = ?", column));
                values.push(SqlValue::Text(value.clone()));
            }
        }

        if let Some(session_id) = &filter.session_id {
            let from_payload =
                "CASE WHEN json_valid(payload) THEN CAST(json_extract(payload, '$.session_id') AS TEXT) END";
            if self.store.has_session_column() {
                conditions.push(format!("COALESCE(session_id, {}) = ?", from_payload));
            } else {
                conditions.push(format!("{} = ?", from_payload));
            }
            values.push(SqlValue::Text(session_id.clone()));
        }

        let sql = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        Ok(WhereClause { sql, values })
    }

    /// One event by id
    pub fn get_event_by_id(&self, event_id: &str) -> Result<Option<Event>> {
        self.store.get_event(event_id)
    }

    /// Everything `root_event_id` caused, as a tree
    ///
    /// Children at each level are ordered by timestamp. Each event appears
    /// at most once, so a causation cycle cannot loop, and the tree is cut
    /// at [`MAX_CAUSATION_DEPTH`]. Returns `None` for an unknown root.
    pub fn get_causation_chain(&self, root_event_id: &str) -> Result<Option<CausationNode>> {
        self.get_causation_chain_with_depth(root_event_id, MAX_CAUSATION_DEPTH)
    }

    /// [`get_causation_chain`](Self::get_causation_chain) with an explicit depth cap
    pub fn get_causation_chain_with_depth(
        &self,
        root_event_id: &str,
        max_depth: usize,
    ) -> Result<Option<CausationNode>> {
        let Some(root) = self.store.get_event(root_event_id)? else {
            return Ok(None);
        };

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(root.id.clone());
        let mut children_of: HashMap<String, Vec<Event>> = HashMap::new();
        let mut worklist: VecDeque<(String, usize)> = VecDeque::new();
        worklist.push_back((root.id.clone(), 0));

        self.store.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM events WHERE causation_id = ?1 ORDER BY timestamp ASC, sequence_number ASC",
                EVENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;

            while let Some((id, depth)) = worklist.pop_front() {
                if depth >= max_depth {
                    warn!("Causation chain truncated at depth {} below {}", max_depth, root_event_id);
                    continue;
                }
                let rows = stmt.query_map(params![id], event_from_row)?;
                let mut children = Vec::new();
                for child in rows {
                    let child = child?;
                    if visited.insert(child.id.clone()) {
                        worklist.push_back((child.id.clone(), depth + 1));
                        children.push(child);
                    } else {
                        warn!("Causation cycle detected at event {}", child.id);
                    }
                }
                if !children.is_empty() {
                    children_of.insert(id, children);
                }
            }
            Ok(())
        })?;

        Ok(Some(assemble(root, 0, &mut children_of)))
    }

    /// Every event of one logical operation, by timestamp
    pub fn get_correlation_chain(&self, correlation_id: &str) -> Result<Vec<Event>> {
        let filter = QueryFilter {
            correlation_id: Some(correlation_id.to_string()),
            limit: None,
            ..Default::default()
        };
        Ok(self.query(&filter)?.events)
    }

    /// Case-insensitive substring search over payloads
    ///
    /// `filter` narrows the candidates first; its pagination applies to the
    /// matches.
    pub fn search_payload(&self, text: &str, filter: &QueryFilter) -> Result<QueryResult> {
        page_offset(filter)?;
        let candidates = self.query(&QueryFilter {
            limit: None,
            offset: 0,
            ..filter.clone()
        })?;

        let needle = text.to_lowercase();
        let matches: Vec<Event> = candidates
            .events
            .into_iter()
            .filter(|event| {
                event
                    .payload
                    .to_json()
                    .map(|json| json.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .collect();

        let total = matches.len();
        let page: Vec<Event> = matches
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(QueryResult {
            has_more: filter.offset.saturating_add(page.len()) < total,
            events: page,
            total,
            offset: filter.offset,
            limit: filter.limit,
        })
    }

    /// Counts by type, category and actor, plus the time range
    pub fn get_stats(&self, filter: &QueryFilter) -> Result<EventStats> {
        let clause = self.compile(filter)?;
        let params = || params_from_iter(clause.values.iter());

        self.store.with_conn(|conn| {
            let mut stats = EventStats::default();

            let (count, earliest, latest): (i64, Option<i64>, Option<i64>) = conn.query_row(
                &format!("SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM events {}", clause.sql),
                params(),
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            stats.total_events = count as usize;
            stats.time_range = TimeRange {
                earliest: earliest.unwrap_or(0),
                latest: latest.unwrap_or(0),
            };

            let mut stmt = conn.prepare(&format!(
                "SELECT event_type, COUNT(*) FROM events {} GROUP BY event_type",
                clause.sql
            ))?;
            let rows = stmt.query_map(params(), |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (name, count) = row?;
                if let Some(category) = EventType::from_name(&name).category() {
                    *stats.events_by_category.entry(category.as_str().to_string()).or_insert(0) += count as usize;
                }
                stats.events_by_type.insert(name, count as usize);
            }

            let mut stmt = conn.prepare(&format!(
                "SELECT actor, COUNT(*) FROM events {} GROUP BY actor",
                clause.sql
            ))?;
            let rows = stmt.query_map(params(), |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (actor, count) = row?;
                stats.events_by_actor.insert(actor, count as usize);
            }

            Ok(stats)
        })
    }

    /// Events carrying `session_id`, oldest first
    pub fn get_session_events(&self, session_id: &str, limit: Option<usize>) -> Result<QueryResult> {
        self.query(&QueryFilter {
            session_id: Some(session_id.to_string()),
            limit,
            ..Default::default()
        })
    }

    /// File-category events whose aggregate is `path`, oldest first
    pub fn get_file_events(&self, path: &str, limit: Option<usize>) -> Result<QueryResult> {
        self.query(&QueryFilter {
            categories: vec![EventCategory::File],
            aggregate_id: Some(path.to_string()),
            limit,
            ..Default::default()
        })
    }

    /// Newest events first
    pub fn get_recent_events(&self, limit: usize) -> Result<Vec<Event>> {
        Ok(self
            .query(&QueryFilter {
                limit: Some(limit),
                order: SortOrder::Desc,
                ..Default::default()
            })?
            .events)
    }

    /// Up to `before` events at or before `timestamp`, then up to `after` strictly after it
    ///
    /// The result is in ascending order throughout.
    pub fn get_events_around_time(&self, timestamp: i64, before: usize, after: usize) -> Result<Vec<Event>> {
        let mut events = self
            .query(&QueryFilter {
                end_time: Some(timestamp),
                limit: Some(before),
                order: SortOrder::Desc,
                ..Default::default()
            })?
            .events;
        events.reverse();

        if let Some(start) = timestamp.checked_add(1) {
            events.extend(
                self.query(&QueryFilter {
                    start_time: Some(start),
                    limit: Some(after),
                    ..Default::default()
                })?
                .events,
            );
        }
        Ok(events)
    }

    /// Timestamp of the earliest event, if any
    pub fn earliest_timestamp(&self) -> Result<Option<i64>> {
        self.store.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT MIN(timestamp) FROM events", [], |row| row.get::<_, Option<i64>>(0))
                .optional()?
                .flatten())
        })
    }
}

fn assemble(event: Event, depth: usize, children_of: &mut HashMap<String, Vec<Event>>) -> CausationNode {
    let children = children_of
        .remove(&event.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| assemble(child, depth + 1, children_of))
        .collect();
    CausationNode { event, depth, children }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::event::{EventInput, FileChangePayload, SessionPayload};
    use crate::logger::EventLogger;
    use serde_json::json;

    struct Fixture {
        engine: QueryEngine,
        logger: EventLogger,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(LogStore::open_in_memory().unwrap());
        Fixture {
            engine: QueryEngine::new(store.clone()),
            logger: EventLogger::new(store, clock.clone()),
            clock,
        }
    }

    impl Fixture {
        fn log_at(&self, ts: i64, input: EventInput) -> String {
            self.clock.set(ts);
            let result = self.logger.log(input);
            assert!(result.success, "{:?}", result.error);
            result.event_id.unwrap()
        }
    }

    fn file(event_type: EventType, path: &str) -> EventInput {
        EventInput::new(event_type, "user")
            .aggregate(path, "file")
            .payload(FileChangePayload::path_only(path))
    }

    #[test]
    fn test_huge_offset_is_rejected() {
        let fx = fixture();
        fx.log_at(100, file(EventType::FileCreated, "a.txt"));

        let filter = QueryFilter {
            offset: usize::MAX,
            ..Default::default()
        };
        assert!(matches!(fx.engine.query(&filter), Err(TimelineError::Validation(_))));
        assert!(matches!(fx.engine.search_payload("a.txt", &filter), Err(TimelineError::Validation(_))));

        let past_end = fx
            .engine
            .query(&QueryFilter {
                offset: i64::MAX as usize,
                limit: Some(usize::MAX),
                ..Default::default()
            })
            .unwrap();
        assert!(past_end.events.is_empty());
        assert_eq!(past_end.total, 1);
        assert!(!past_end.has_more);
    }

    #[test]
    fn test_filters_and_pagination() {
        let fx = fixture();
        for i in 0..5 {
            fx.log_at(100 + i, file(EventType::FileModified, "a.txt"));
        }
        fx.log_at(200, EventInput::new(EventType::GitCommit, "git:bob").payload_json(json!({"hash": "abc"})));

        let page = fx
            .engine
            .query(&QueryFilter {
                categories: vec![EventCategory::File],
                limit: Some(2),
                offset: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.events.len(), 2);
        assert_eq!(page.events[0].timestamp, 102);
        assert!(page.has_more);

        let git = fx
            .engine
            .query(&QueryFilter {
                actor: Some("git:bob".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(git.total, 1);

        let window = fx
            .engine
            .query(&QueryFilter {
                start_time: Some(101),
                end_time: Some(103),
                order: SortOrder::Desc,
                ..Default::default()
            })
            .unwrap();
        let times: Vec<_> = window.events.iter().map(|e| e.timestamp).collect();
        assert_eq!(times, vec![103, 102, 101]);
    }

    #[test]
    fn test_types_and_categories_combine() {
        let fx = fixture();
        fx.log_at(1, file(EventType::FileCreated, "a"));
        fx.log_at(2, file(EventType::FileDeleted, "a"));
        fx.log_at(3, EventInput::new(EventType::GitPush, "git"));

        let result = fx
            .engine
            .query(&QueryFilter {
                event_types: vec![EventType::FileDeleted, EventType::GitPush],
                categories: vec![EventCategory::File],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.events[0].event_type, EventType::FileDeleted);
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let fx = fixture();
        let err = fx
            .engine
            .query(&QueryFilter {
                start_time: Some(10),
                end_time: Some(5),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_session_filter_accepts_numeric_ids() {
        let fx = fixture();
        fx.log_at(1, EventInput::new(EventType::SessionCreated, "user").payload_json(json!({"session_id": 12})));
        fx.log_at(
            2,
            EventInput::new(EventType::SessionSwitched, "user").payload(SessionPayload {
                session_id: Some("12".into()),
                ..Default::default()
            }),
        );
        fx.log_at(3, EventInput::new(EventType::SessionCreated, "user").payload_json(json!({"session_id": 13})));

        assert_eq!(fx.engine.get_session_events("12", None).unwrap().total, 2);
        assert_eq!(fx.engine.get_session_events("13", None).unwrap().total, 1);
    }

    #[test]
    fn test_causation_tree() {
        let fx = fixture();
        let root = fx.log_at(10, EventInput::new(EventType::CliCommandExecuted, "user"));
        let late = fx.log_at(30, file(EventType::FileModified, "b").caused_by(&root));
        let early = fx.log_at(20, file(EventType::FileModified, "a").caused_by(&root));
        let grandchild = fx.log_at(40, EventInput::new(EventType::GitCommit, "git").caused_by(&early));
        fx.log_at(50, EventInput::new(EventType::GitPush, "git"));

        let tree = fx.engine.get_causation_chain(&root).unwrap().unwrap();
        assert_eq!(tree.descendant_count(), 3);
        assert_eq!(tree.height(), 2);
        assert_eq!(tree.children[0].event.id, early);
        assert_eq!(tree.children[1].event.id, late);
        assert_eq!(tree.children[0].children[0].event.id, grandchild);
        assert_eq!(tree.children[0].children[0].depth, 2);

        assert!(fx.engine.get_causation_chain("missing").unwrap().is_none());
    }

    #[test]
    fn test_causation_cycle_terminates() {
        let fx = fixture();
        let a = fx.log_at(1, EventInput::new(EventType::CliStarted, "user").caused_by("placeholder"));
        let b = fx.log_at(2, EventInput::new(EventType::CliStopped, "user").caused_by(&a));
        fx.engine
            .store
            .with_conn(|conn| {
                conn.execute("UPDATE events SET causation_id = ?1 WHERE id = ?2", [&b, &a])?;
                Ok(())
            })
            .unwrap();

        let tree = fx.engine.get_causation_chain(&a).unwrap().unwrap();
        assert_eq!(tree.descendant_count(), 1);

        let capped = fx.engine.get_causation_chain_with_depth(&a, 0).unwrap().unwrap();
        assert!(capped.children.is_empty());
    }

    #[test]
    fn test_correlation_and_search() {
        let fx = fixture();
        fx.log_at(2, file(EventType::FileModified, "Readme.MD").correlation("op"));
        fx.log_at(1, file(EventType::FileCreated, "readme.md").correlation("op"));
        fx.log_at(3, file(EventType::FileCreated, "main.rs"));

        let chain = fx.engine.get_correlation_chain("op").unwrap();
        assert_eq!(chain.iter().map(|e| e.timestamp).collect::<Vec<_>>(), vec![1, 2]);

        let found = fx
            .engine
            .search_payload(
                "README",
                &QueryFilter {
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(found.total, 2);
        assert_eq!(found.events.len(), 1);
        assert!(found.has_more);
    }

    #[test]
    fn test_stats() {
        let fx = fixture();
        let empty = fx.engine.get_stats(&QueryFilter::default()).unwrap();
        assert_eq!(empty.total_events, 0);
        assert_eq!(empty.time_range, TimeRange { earliest: 0, latest: 0 });

        fx.log_at(5, file(EventType::FileCreated, "a"));
        fx.log_at(9, file(EventType::FileModified, "a"));
        fx.log_at(7, EventInput::new(EventType::ModelChanged, "system"));

        let stats = fx.engine.get_stats(&QueryFilter::default()).unwrap();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.events_by_category.get("FILE"), Some(&2));
        assert_eq!(stats.events_by_type.get("MODEL_CHANGED"), Some(&1));
        assert_eq!(stats.events_by_actor.get("user"), Some(&2));
        assert_eq!(stats.time_range, TimeRange { earliest: 5, latest: 9 });
    }

    #[test]
    fn test_events_around_time() {
        let fx = fixture();
        for ts in [10, 20, 30, 40, 50] {
            fx.log_at(ts, file(EventType::FileModified, "a"));
        }
        let around = fx.engine.get_events_around_time(30, 2, 1).unwrap();
        let times: Vec<_> = around.iter().map(|e| e.timestamp).collect();
        assert_eq!(times, vec![20, 30, 40]);

        let recent = fx.engine.get_recent_events(2).unwrap();
        assert_eq!(recent[0].timestamp, 50);
        assert_eq!(fx.engine.get_file_events("a", None).unwrap().total, 5);
        assert_eq!(fx.engine.earliest_timestamp().unwrap(), Some(10));
    }
}
