//! Bounded record buffer for callback output

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use streamgate_types::Record;

use crate::manager::RecordCallback;

/// Bounded ring buffer receiving connector callback output.
///
/// Appends arrive from multiple connector tasks running on OS threads, so
/// the queue sits behind a mutex. When full, the oldest record is evicted
/// and counted.
pub struct RecordBuffer {
    records: Mutex<VecDeque<Record>>,
    capacity: usize,
    evicted: AtomicU64,
}

impl RecordBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            evicted: AtomicU64::new(0),
        }
    }

    /// Appends a record, evicting the oldest when at capacity.
    pub fn push(&self, record: Record) {
        let mut records = self.records.lock().unwrap();
        if records.len() == self.capacity {
            records.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        records.push_back(record);
    }

    /// Clones the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.lock().unwrap().iter().cloned().collect()
    }

    /// Removes and returns the current contents, oldest first.
    pub fn drain(&self) -> Vec<Record> {
        self.records.lock().unwrap().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of records evicted since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// A callback appending every record to this buffer.
    pub fn callback(self: &Arc<Self>) -> RecordCallback {
        let buffer = Arc::clone(self);
        Arc::new(move |record| buffer.push(record))
    }
}
