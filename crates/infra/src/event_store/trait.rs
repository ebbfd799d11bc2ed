use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use invoicekit_core::{AggregateId, ExpectedVersion, TenantId};
use std::sync::Arc;

/// An event ready to be appended to a stream (not yet assigned a sequence number).
///
/// Built from a typed domain event with [`UncommittedEvent::from_typed`], which
/// serializes the payload and captures `event_type`, `event_version` and
/// `occurred_at` so the stream can be deserialized later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only stream (assigned a sequence number).
///
/// Sequence numbers start at 1, are per stream `(tenant_id, aggregate_id)` and have
/// no gaps. The stream version is the sequence number of its last event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Convert a stored event into a tenant-scoped event envelope for publication.
    pub fn to_envelope(&self) -> invoicekit_events::EventEnvelope<JsonValue> {
        invoicekit_events::EventEnvelope::new(
            self.event_id,
            self.tenant_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

/// One stream's share of a multi-stream commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAppend {
    pub events: Vec<UncommittedEvent>,
    pub expected_version: ExpectedVersion,
}

impl StreamAppend {
    pub fn new(events: Vec<UncommittedEvent>, expected_version: ExpectedVersion) -> Self {
        Self {
            events,
            expected_version,
        }
    }
}

/// Event store operation error.
///
/// Infrastructure failures (storage, concurrency, isolation), as opposed to domain
/// errors (validation, invariants).
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Append-only, tenant-scoped event store.
///
/// Streams are keyed by `(tenant_id, aggregate_id)`. Implementations must:
/// - reject batches that mix tenants, or mix aggregates within one stream append
/// - check `ExpectedVersion` against the current stream version before writing
/// - assign sequence numbers `current_version + 1, + 2, ...` with no gaps
/// - persist a whole commit or nothing, including multi-stream commits
pub trait EventStore: Send + Sync {
    /// Append events to an aggregate stream.
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.append_atomic(vec![StreamAppend::new(events, expected_version)])
    }

    /// Append to several streams of one tenant in a single all-or-nothing commit.
    ///
    /// Every stream's expected version is checked before anything is written; one
    /// stale stream fails the whole commit with `Concurrency`.
    fn append_atomic(
        &self,
        appends: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for a tenant + aggregate, in sequence order.
    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Every event of a tenant in commit order (projection rebuilds).
    fn load_all(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected_version)
    }

    fn append_atomic(
        &self,
        appends: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append_atomic(appends)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(tenant_id, aggregate_id)
    }

    fn load_all(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_all(tenant_id)
    }
}

impl UncommittedEvent {
    /// Wrap a typed domain event with its stream metadata.
    pub fn from_typed<E>(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: invoicekit_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// Shape checks shared by every backend, run before any storage access.
///
/// Returns the commit's tenant. Empty appends are dropped by the caller.
pub(crate) fn validate_commit(appends: &[StreamAppend]) -> Result<TenantId, EventStoreError> {
    let first = appends
        .iter()
        .flat_map(|a| a.events.first())
        .next()
        .ok_or_else(|| EventStoreError::InvalidAppend("commit contains no events".to_string()))?;
    let tenant_id = first.tenant_id;

    let mut seen_streams = Vec::with_capacity(appends.len());
    for (stream_idx, append) in appends.iter().enumerate() {
        let Some(head) = append.events.first() else {
            continue;
        };

        if seen_streams.contains(&head.aggregate_id) {
            return Err(EventStoreError::InvalidAppend(format!(
                "stream {} appears twice in one commit",
                head.aggregate_id
            )));
        }
        seen_streams.push(head.aggregate_id);

        for (idx, e) in append.events.iter().enumerate() {
            if e.tenant_id != tenant_id {
                return Err(EventStoreError::TenantIsolation(format!(
                    "commit contains multiple tenant_ids (stream {stream_idx}, index {idx})"
                )));
            }
            if e.aggregate_id != head.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "stream append contains multiple aggregate_ids (stream {stream_idx}, index {idx})"
                )));
            }
            if e.aggregate_type != head.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream append contains multiple aggregate_types (stream {stream_idx}, index {idx})"
                )));
            }
        }
    }

    Ok(tenant_id)
}
