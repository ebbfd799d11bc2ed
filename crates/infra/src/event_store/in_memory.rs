use std::collections::HashMap;
use std::sync::RwLock;

use invoicekit_core::{AggregateId, TenantId};

use super::r#trait::{
    validate_commit, EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    /// Commit order across all streams.
    log: Vec<StoredEvent>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev. A single write lock covers each commit, which makes
/// multi-stream commits trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    fn stored(e: UncommittedEvent, sequence_number: u64) -> StoredEvent {
        StoredEvent {
            event_id: e.event_id,
            tenant_id: e.tenant_id,
            aggregate_id: e.aggregate_id,
            aggregate_type: e.aggregate_type,
            sequence_number,
            event_type: e.event_type,
            event_version: e.event_version,
            occurred_at: e.occurred_at,
            payload: e.payload,
        }
    }
}

impl EventStore for InMemoryEventStore {
    fn append_atomic(
        &self,
        appends: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let appends: Vec<StreamAppend> = appends
            .into_iter()
            .filter(|a| !a.events.is_empty())
            .collect();
        if appends.is_empty() {
            return Ok(vec![]);
        }

        let tenant_id = validate_commit(&appends)?;

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        // Check every stream before writing anything.
        for append in &appends {
            let head = &append.events[0];
            let key = StreamKey {
                tenant_id,
                aggregate_id: head.aggregate_id,
            };
            let stream = inner.streams.get(&key).map(Vec::as_slice).unwrap_or(&[]);
            let current = Self::current_version(stream);

            if !append.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}: expected {:?}, found {current}",
                    head.aggregate_id, append.expected_version
                )));
            }
            if let Some(existing) = stream.first() {
                if existing.aggregate_type != head.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{}', attempted append with '{}'",
                        existing.aggregate_type, head.aggregate_type
                    )));
                }
            }
        }

        let mut committed = Vec::new();
        for append in appends {
            let key = StreamKey {
                tenant_id,
                aggregate_id: append.events[0].aggregate_id,
            };
            let stream = inner.streams.entry(key).or_default();
            let mut next = Self::current_version(stream) + 1;
            let mut stored_batch = Vec::with_capacity(append.events.len());
            for e in append.events {
                let stored = Self::stored(e, next);
                next += 1;
                stream.push(stored.clone());
                stored_batch.push(stored);
            }
            inner.log.extend(stored_batch.iter().cloned());
            committed.extend(stored_batch);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_all(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner
            .log
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use invoicekit_core::ExpectedVersion;
    use serde_json::json;
    use uuid::Uuid;

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, kind: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: kind.to_string(),
            event_type: format!("{kind}.happened"),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({ "n": 1 }),
        }
    }

    #[test]
    fn assigns_consecutive_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let stream = AggregateId::new();

        let first = store
            .append(
                vec![event(tenant, stream, "t"), event(tenant, stream, "t")],
                ExpectedVersion::Exact(0),
            )
            .unwrap();
        let second = store
            .append(vec![event(tenant, stream, "t")], ExpectedVersion::Exact(2))
            .unwrap();

        assert_eq!(
            first.iter().chain(&second).map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let stream = AggregateId::new();
        store
            .append(vec![event(tenant, stream, "t")], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(vec![event(tenant, stream, "t")], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn atomic_commit_writes_nothing_when_one_stream_is_stale() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let settings = AggregateId::new();
        let invoice = AggregateId::new();
        store
            .append(vec![event(tenant, settings, "s")], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append_atomic(vec![
                StreamAppend::new(vec![event(tenant, invoice, "i")], ExpectedVersion::Exact(0)),
                StreamAppend::new(vec![event(tenant, settings, "s")], ExpectedVersion::Exact(0)),
            ])
            .unwrap_err();

        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert!(store.load_stream(tenant, invoice).unwrap().is_empty());
        assert_eq!(store.load_all(tenant).unwrap().len(), 1);
    }

    #[test]
    fn atomic_commit_rejects_mixed_tenants() {
        let store = InMemoryEventStore::new();
        let err = store
            .append_atomic(vec![
                StreamAppend::new(
                    vec![event(TenantId::new(), AggregateId::new(), "a")],
                    ExpectedVersion::Exact(0),
                ),
                StreamAppend::new(
                    vec![event(TenantId::new(), AggregateId::new(), "a")],
                    ExpectedVersion::Exact(0),
                ),
            ])
            .unwrap_err();
        assert!(matches!(err, EventStoreError::TenantIsolation(_)));
    }

    #[test]
    fn streams_and_logs_are_tenant_scoped() {
        let store = InMemoryEventStore::new();
        let a = TenantId::new();
        let b = TenantId::new();
        let stream = AggregateId::new();
        store
            .append(vec![event(a, stream, "t")], ExpectedVersion::Exact(0))
            .unwrap();

        assert!(store.load_stream(b, stream).unwrap().is_empty());
        assert!(store.load_all(b).unwrap().is_empty());
        assert_eq!(store.load_all(a).unwrap().len(), 1);
    }

    #[test]
    fn aggregate_type_is_stable_per_stream() {
        let store = InMemoryEventStore::new();
        let tenant = TenantId::new();
        let stream = AggregateId::new();
        store
            .append(vec![event(tenant, stream, "a")], ExpectedVersion::Any)
            .unwrap();
        let err = store
            .append(vec![event(tenant, stream, "b")], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }
}
