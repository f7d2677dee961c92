//! Shared test infrastructure: a current-thread runtime helper and an
//! in-memory data source that logs every operation and can hold responses
//! until the test releases them.

#![allow(dead_code)]

use keyper::query::FetchParams;
use keyper::{err, DataSource, Error, Key, Loaded, Result, Value, ValueRecord};

use keyper_core::async_trait;

use tokio::sync::oneshot;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Runs a test body on a fresh current-thread runtime.
pub fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to create test runtime")
        .block_on(future)
}

/// Polls the scheduler until spawned tasks have had a chance to make
/// progress up to their next suspension point.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// An in-memory data source.
///
/// Every operation appends a descriptor to the log before it runs. With the
/// gate closed, operations park on a oneshot until the test releases them by
/// descriptor substring — which is how the coalescing and race scenarios
/// order their resolutions.
#[derive(Debug)]
pub struct TestSource {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<String, Vec<ValueRecord>>,
    log: Vec<String>,
    gated: bool,
    parked: Vec<(String, oneshot::Sender<()>)>,
    fail: HashSet<String>,
    next_id: i64,
}

impl TestSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                ..Inner::default()
            }),
        })
    }

    pub fn seed(&self, collection: &str, records: impl IntoIterator<Item = ValueRecord>) {
        let mut inner = self.inner.lock().unwrap();
        let slot = inner.records.entry(collection.to_string()).or_default();
        for record in records {
            slot.push(record);
        }
    }

    /// Parks all subsequent operations until released.
    pub fn gate(&self) {
        self.inner.lock().unwrap().gated = true;
    }

    /// Releases parked operations whose descriptor contains `needle`.
    pub fn release(&self, needle: &str) -> usize {
        let released: Vec<_> = {
            let mut inner = self.inner.lock().unwrap();
            let (matching, parked) = inner
                .parked
                .drain(..)
                .partition(|(descriptor, _)| descriptor.contains(needle));
            inner.parked = parked;
            matching
        };
        let count = released.len();
        for (_, gate) in released {
            let _ = gate.send(());
        }
        count
    }

    /// Opens the gate and releases everything parked.
    pub fn release_all(&self) -> usize {
        self.inner.lock().unwrap().gated = false;
        self.release("")
    }

    /// Makes the next operation named `op` fail.
    pub fn fail(&self, op: &str) {
        self.inner.lock().unwrap().fail.insert(op.to_string());
    }

    /// Number of issued operations of the given kind.
    pub fn calls(&self, op: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|descriptor| descriptor.split_whitespace().next() == Some(op))
            .count()
    }

    pub fn log(&self) -> Vec<String> {
        self.inner.lock().unwrap().log.clone()
    }

    pub fn parked_ops(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .parked
            .iter()
            .map(|(descriptor, _)| descriptor.clone())
            .collect()
    }

    async fn checkpoint(&self, op: &str, descriptor: String) -> Result<()> {
        let (gate, failed) = {
            let mut inner = self.inner.lock().unwrap();
            inner.log.push(descriptor.clone());
            let failed = inner.fail.remove(op);
            let gate = if inner.gated && !failed {
                let (tx, rx) = oneshot::channel();
                inner.parked.push((descriptor, tx));
                Some(rx)
            } else {
                None
            };
            (gate, failed)
        };
        if failed {
            return Err(err!("simulated {op} failure"));
        }
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(())
    }

    fn lookup(records: &[ValueRecord], key: &Key) -> Option<ValueRecord> {
        records
            .iter()
            .find(|record| record_key(record).as_ref() == Some(key))
            .cloned()
    }
}

fn record_key(record: &ValueRecord) -> Option<Key> {
    record.get("id").and_then(|id| Key::from_value(id).ok())
}

#[async_trait]
impl DataSource for TestSource {
    async fn find_one(&self, collection: &str, key: &Key) -> Result<ValueRecord> {
        self.checkpoint("find_one", format!("find_one {collection} {key}"))
            .await?;
        let inner = self.inner.lock().unwrap();
        let records = inner.records.get(collection).map(Vec::as_slice).unwrap_or(&[]);
        Self::lookup(records, key)
            .ok_or_else(|| Error::record_not_found(format!("{collection} {key}")))
    }

    async fn find(&self, collection: &str, params: &FetchParams) -> Result<Loaded> {
        self.checkpoint("find", format!("find {collection} {}", params.pending_key()))
            .await?;
        let inner = self.inner.lock().unwrap();
        let records = inner.records.get(collection).map(Vec::as_slice).unwrap_or(&[]);

        let mut matched: Vec<ValueRecord> = records
            .iter()
            .filter(|record| params.filter.matches_record(record))
            .cloned()
            .collect();
        if let Some(order_by) = &params.order_by {
            matched.sort_by(|a, b| order_by.compare_records(a, b));
        }
        let total = matched.len() as u64;
        if let Some(offset) = params.offset {
            let offset = (offset as usize).min(matched.len());
            matched.drain(..offset);
        }
        if let Some(limit) = params.limit {
            matched.truncate(limit as usize);
        }

        Ok(Loaded::with_total(matched, total))
    }

    async fn find_all(&self, collection: &str, keys: &[Key]) -> Result<Vec<ValueRecord>> {
        self.checkpoint("find_all", format!("find_all {collection} {}", keys.len()))
            .await?;
        let inner = self.inner.lock().unwrap();
        let records = inner.records.get(collection).map(Vec::as_slice).unwrap_or(&[]);
        Ok(keys
            .iter()
            .filter_map(|key| Self::lookup(records, key))
            .collect())
    }

    async fn create(&self, collection: &str, payload: ValueRecord) -> Result<ValueRecord> {
        self.checkpoint("create", format!("create {collection}")).await?;
        let mut inner = self.inner.lock().unwrap();

        let mut record = payload;
        if record.get("id").is_none() {
            let existing_max = inner
                .records
                .get(collection)
                .map(Vec::as_slice)
                .unwrap_or(&[])
                .iter()
                .filter_map(|r| match r.get("id") {
                    Some(Value::I64(id)) => Some(*id),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            let id = (existing_max + 1).max(inner.next_id);
            inner.next_id = id + 1;
            record.insert("id", id);
        }

        let key = record_key(&record)
            .ok_or_else(|| Error::invalid_key(format!("{collection} payload has no usable id")))?;
        let slot = inner.records.entry(collection.to_string()).or_default();
        slot.retain(|existing| record_key(existing).as_ref() != Some(&key));
        slot.push(record.clone());
        Ok(record)
    }

    async fn update(&self, collection: &str, key: &Key, payload: ValueRecord) -> Result<ValueRecord> {
        self.checkpoint("update", format!("update {collection} {key}"))
            .await?;
        let mut inner = self.inner.lock().unwrap();
        let records = inner
            .records
            .get_mut(collection)
            .ok_or_else(|| Error::record_not_found(format!("{collection} {key}")))?;
        let record = records
            .iter_mut()
            .find(|record| record_key(record).as_ref() == Some(key))
            .ok_or_else(|| Error::record_not_found(format!("{collection} {key}")))?;
        record.merge(&payload);
        Ok(record.clone())
    }

    async fn delete(&self, collection: &str, key: &Key) -> Result<()> {
        self.checkpoint("delete", format!("delete {collection} {key}"))
            .await?;
        let mut inner = self.inner.lock().unwrap();
        let records = inner
            .records
            .get_mut(collection)
            .ok_or_else(|| Error::record_not_found(format!("{collection} {key}")))?;
        let before = records.len();
        records.retain(|record| record_key(record).as_ref() != Some(key));
        if records.len() == before {
            return Err(Error::record_not_found(format!("{collection} {key}")));
        }
        Ok(())
    }
}
