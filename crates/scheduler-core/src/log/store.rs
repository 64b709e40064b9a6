use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::LogError;

use super::record::{Action, LogRecord};

/// Filters accepted by [`LogStore::read`]. `actions` is OR-within-field
/// (any matching action passes); every populated field is AND-ed together.
#[derive(Debug, Default, Clone)]
pub struct LogFilter {
    pub actions: Option<HashSet<Action>>,
    pub task_name: Option<String>,
    pub min_time: Option<DateTime<Utc>>,
    pub max_time: Option<DateTime<Utc>>,
}

impl LogFilter {
    pub fn matches(&self, record: &LogRecord) -> bool {
        if let Some(actions) = &self.actions {
            if !actions.contains(&record.action) {
                return false;
            }
        }
        if let Some(name) = &self.task_name {
            if &record.task_name != name {
                return false;
            }
        }
        if let Some(min) = self.min_time {
            if record.created < min {
                return false;
            }
        }
        if let Some(max) = self.max_time {
            if record.created > max {
                return false;
            }
        }
        true
    }
}

/// Append-only log store, authoritative source of task status.
///
/// Exposes two read paths deliberately: [`LogStore::snapshot`] returns a
/// cached, explicitly-refreshed view used by condition evaluation (so start
/// decisions within one cycle never observe records appended during that
/// same cycle), while [`LogStore::read`] always scans the live, authoritative
/// stream and is used by the external read API.
pub struct LogStore {
    all: Mutex<Vec<LogRecord>>,
    snapshot: Mutex<Arc<Vec<LogRecord>>>,
    per_task: Mutex<std::collections::HashMap<String, VecDeque<LogRecord>>>,
    cap_per_task: usize,
}

impl LogStore {
    pub fn new(cap_per_task: usize) -> Self {
        Self {
            all: Mutex::new(Vec::new()),
            snapshot: Mutex::new(Arc::new(Vec::new())),
            per_task: Mutex::new(std::collections::HashMap::new()),
            cap_per_task,
        }
    }

    /// Append a record. Retried once on lock poisoning (the only realistic
    /// failure mode for an in-memory store), then fatal per the
    /// "log is truth" invariant.
    pub fn append(&self, record: LogRecord) -> Result<(), LogError> {
        for attempt in 0..2 {
            match self.try_append(&record) {
                Ok(()) => return Ok(()),
                Err(e) if attempt == 0 => {
                    tracing::warn!(error = %e, "log append failed, retrying once");
                    continue;
                }
                Err(e) => return Err(LogError::AppendFailed(e)),
            }
        }
        unreachable!("loop always returns within two attempts")
    }

    fn try_append(&self, record: &LogRecord) -> Result<(), String> {
        let mut all = self
            .all
            .lock()
            .map_err(|_| "log store mutex poisoned".to_string())?;
        all.push(record.clone());
        drop(all);

        let mut per_task = self
            .per_task
            .lock()
            .map_err(|_| "per-task cache mutex poisoned".to_string())?;
        let deque = per_task
            .entry(record.task_name.clone())
            .or_insert_with(VecDeque::new);
        deque.push_back(record.clone());
        while deque.len() > self.cap_per_task {
            deque.pop_front();
        }

        tracing::event!(
            target: "scheduler_core::log",
            tracing::Level::INFO,
            task_name = %record.task_name,
            action = ?record.action,
            "lifecycle record appended"
        );
        Ok(())
    }

    /// Refresh the cached snapshot from the live stream. Called by the
    /// scheduler at well-defined points in the cycle (start, and again after
    /// harvest before shutdown-condition evaluation).
    pub fn refresh_snapshot(&self) {
        let all = self.all.lock().expect("log store mutex poisoned");
        let snapshot = Arc::new(all.clone());
        *self.snapshot.lock().expect("snapshot mutex poisoned") = snapshot;
    }

    /// The cached view as of the last [`LogStore::refresh_snapshot`] call.
    pub fn snapshot(&self) -> Arc<Vec<LogRecord>> {
        self.snapshot.lock().expect("snapshot mutex poisoned").clone()
    }

    /// Always-live read against the authoritative stream, filtered and
    /// returned in chronological order.
    pub fn read(&self, filter: &LogFilter) -> Vec<LogRecord> {
        let all = self.all.lock().expect("log store mutex poisoned");
        all.iter().filter(|r| filter.matches(r)).cloned().collect()
    }

    /// The FIFO-capped tail for a single task, used for cheap status checks
    /// when `force_status_from_logs` is off.
    pub fn per_task_tail(&self, task_name: &str) -> Vec<LogRecord> {
        let per_task = self.per_task.lock().expect("per-task cache mutex poisoned");
        per_task
            .get(task_name)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(secs: i64, name: &str, action: Action) -> LogRecord {
        let created = DateTime::from_timestamp(secs, 0).unwrap();
        LogRecord::new(created, name, action)
    }

    #[test]
    fn round_trip_no_filter_preserves_order() {
        let store = LogStore::new(100);
        for i in 0..6 {
            store.append(rec(i, "t", Action::Run)).unwrap();
        }
        let all = store.read(&LogFilter::default());
        assert_eq!(all.len(), 6);
        for (i, r) in all.iter().enumerate() {
            assert_eq!(r.created, DateTime::from_timestamp(i as i64, 0).unwrap());
        }
    }

    #[test]
    fn filter_by_action_subset() {
        let store = LogStore::new(100);
        store.append(rec(0, "t", Action::Run)).unwrap();
        store.append(rec(1, "t", Action::Success)).unwrap();
        store.append(rec(2, "t", Action::Run)).unwrap();
        store.append(rec(3, "t", Action::Fail)).unwrap();

        let mut actions = HashSet::new();
        actions.insert(Action::Success);
        let filter = LogFilter {
            actions: Some(actions),
            ..Default::default()
        };
        let result = store.read(&filter);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].action, Action::Success);
    }

    #[test]
    fn filter_by_time_range() {
        let store = LogStore::new(100);
        for i in 0..6 {
            store.append(rec(i * 60, "t", Action::Run)).unwrap();
        }
        let filter = LogFilter {
            min_time: Some(DateTime::from_timestamp(90, 0).unwrap()),
            max_time: Some(DateTime::from_timestamp(330, 0).unwrap()),
            ..Default::default()
        };
        let result = store.read(&filter);
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn compound_filter_is_and_across_fields_or_within_actions() {
        let store = LogStore::new(100);
        store.append(rec(0, "mytask", Action::Run)).unwrap();
        store.append(rec(60, "mytask", Action::Success)).unwrap();
        store.append(rec(120, "other", Action::Success)).unwrap();
        store.append(rec(180, "mytask", Action::Terminate)).unwrap();

        let mut actions = HashSet::new();
        actions.insert(Action::Success);
        actions.insert(Action::Terminate);
        let filter = LogFilter {
            task_name: Some("mytask".to_string()),
            actions: Some(actions),
            min_time: Some(DateTime::from_timestamp(30, 0).unwrap()),
            max_time: None,
        };
        let result = store.read(&filter);
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|r| r.task_name == "mytask"));
    }

    #[test]
    fn snapshot_is_stale_until_refreshed() {
        let store = LogStore::new(100);
        store.append(rec(0, "t", Action::Run)).unwrap();
        store.refresh_snapshot();
        assert_eq!(store.snapshot().len(), 1);

        store.append(rec(1, "t", Action::Success)).unwrap();
        assert_eq!(store.snapshot().len(), 1, "snapshot unchanged without refresh");
        assert_eq!(store.read(&LogFilter::default()).len(), 2, "live read sees it");

        store.refresh_snapshot();
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn per_task_cache_evicts_fifo() {
        let store = LogStore::new(3);
        for i in 0..5 {
            store.append(rec(i, "t", Action::Run)).unwrap();
        }
        let tail = store.per_task_tail("t");
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].created, DateTime::from_timestamp(2, 0).unwrap());
    }
}
