//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   -> load stream (tenant-scoped) and validate it
//!   -> rehydrate aggregate
//!   -> handle command (pure decision)          = decide
//!   -> append with optimistic version check
//!   -> publish committed envelopes to the bus  = commit
//! ```
//!
//! `dispatch` runs both halves for a single stream. Callers that must change
//! several streams together (reserving an invoice number while creating the
//! invoice) call `decide` per stream and hand all decisions to one `commit`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use invoicekit_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use invoicekit_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale aggregate version; reload and retry.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid line item: {0}")]
    InvalidLineItem(String),
    #[error("invalid payment: {0}")]
    InvalidPayment(String),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("not found")]
    NotFound,
    /// The command conflicts with current state (already exists, already paid).
    #[error("conflict: {0}")]
    Conflict(String),
    /// Stored payloads no longer deserialize into the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
    /// Publication failed after a successful append; the events are durable.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvalidAmount(msg) => DispatchError::InvalidAmount(msg),
            DomainError::InvalidLineItem(msg) => DispatchError::InvalidLineItem(msg),
            DomainError::InvalidPayment(msg) => DispatchError::InvalidPayment(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
        }
    }
}

/// Outcome of `decide`: the events to append for one stream and the state the
/// aggregate will be in once they are committed.
#[derive(Debug, Clone)]
pub struct Decision<A> {
    pub state: A,
    pub append: StreamAppend,
}

/// Aggregate state after a successful commit, with the stored events.
#[derive(Debug, Clone)]
pub struct Committed<A> {
    pub state: A,
    pub events: Vec<StoredEvent>,
}

/// Reusable command execution engine over any `EventStore` + `EventBus` pair.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate without handling a command (reads).
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Load, rehydrate and handle. Nothing is written.
    ///
    /// The returned append expects the stream version that was loaded, so a
    /// concurrent writer turns the later commit into `DispatchError::Concurrency`.
    #[instrument(
        skip(self, command, make_aggregate),
        fields(tenant_id = %tenant_id, aggregate_id = %aggregate_id),
        err
    )]
    pub fn decide<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Decision<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: invoicekit_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut state = make_aggregate(tenant_id, aggregate_id);
        apply_history(&mut state, &history)?;

        let decided = state.handle(command)?;

        let mut events = Vec::with_capacity(decided.len());
        for ev in &decided {
            events.push(UncommittedEvent::from_typed(
                tenant_id,
                aggregate_id,
                aggregate_type,
                Uuid::now_v7(),
                ev,
            )?);
            state.apply(ev);
        }

        Ok(Decision {
            state,
            append: StreamAppend::new(events, expected),
        })
    }

    /// Append every decision in one atomic commit, then publish.
    #[instrument(skip(self, appends), fields(streams = appends.len()), err)]
    pub fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, DispatchError> {
        let committed = self.store.append_atomic(appends)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }
        debug!(events = committed.len(), "committed");

        Ok(committed)
    }

    /// `decide` + `commit` for a single stream.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Committed<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: invoicekit_events::Event + Serialize + DeserializeOwned,
    {
        let decision = self.decide(tenant_id, aggregate_id, aggregate_type, command, make_aggregate)?;
        let events = self.commit(vec![decision.append])?;
        Ok(Committed {
            state: decision.state,
            events,
        })
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // A backend must never hand back another tenant's events; check anyway.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
