use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{ToolArgs, ToolExecutionResult};

/// Default number of entries kept by [`ExecutionHistory`].
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// One recorded tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHistoryEntry {
    pub tool_id: String,
    pub tool_name: String,
    pub args: ToolArgs,
    pub result: ToolExecutionResult,
    pub timestamp_ms: i64,
}

/// Bounded FIFO log of tool invocations. Oldest entries are evicted first.
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    entries: VecDeque<ExecutionHistoryEntry>,
    capacity: usize,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
        }
    }

    pub fn push(&mut self, entry: ExecutionHistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Returns the newest `limit` entries (all when `None`), oldest first.
    pub fn recent(&self, limit: Option<usize>) -> Vec<ExecutionHistoryEntry> {
        let take = limit.unwrap_or(self.entries.len()).min(self.entries.len());
        self.entries
            .iter()
            .skip(self.entries.len() - take)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
