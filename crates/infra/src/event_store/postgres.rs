//! Postgres-backed event store.
//!
//! | SQLx error | Postgres code | `EventStoreError` |
//! |---|---|---|
//! | unique violation | `23505` | `Concurrency` (another writer took the sequence number) |
//! | check violation | `23514` | `InvalidAppend` |
//! | any other database error | | `Backend` |
//! | pool closed, IO, protocol | | `Backend` |
//!
//! The `EventStore` trait is synchronous. Calls made on a tokio worker thread are
//! wrapped in `block_in_place`, so the store can be used from axum handlers and
//! from `spawn_blocking` tasks alike.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use invoicekit_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{validate_commit, EventStore, EventStoreError, StoredEvent, StreamAppend};

/// Postgres-backed append-only event store.
///
/// Every query filters on `tenant_id`. A commit runs in one transaction: each
/// touched stream's version is compared with the expectation, then rows are
/// inserted. A concurrent writer that slips in between trips the
/// `(tenant_id, aggregate_id, sequence_number)` unique constraint.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and apply the bundled migrations.
    pub async fn connect(database_url: &str) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| EventStoreError::Backend(format!("migration failed: {e}")))?;

        Ok(Self::new(pool))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, aggregate_id = %aggregate_id), err)]
    pub async fn load_stream_async(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE tenant_id = $1 AND aggregate_id = $2
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        rows.iter().map(row_to_stored).collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub async fn load_all_async(
        &self,
        tenant_id: TenantId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE tenant_id = $1
            ORDER BY global_position ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_all", e))?;

        rows.iter().map(row_to_stored).collect()
    }

    #[instrument(skip(self, appends), fields(streams = appends.len()), err)]
    pub async fn append_atomic_async(
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut committed = Vec::new();
        for append in appends {
            let aggregate_id = append.events[0].aggregate_id;
            let aggregate_type = append.events[0].aggregate_type.clone();

            let (current, existing_type) =
                check_stream_version(&mut tx, tenant_id, aggregate_id).await?;

            if let Some(existing_type) = existing_type {
                if existing_type != aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{existing_type}', attempted append with '{aggregate_type}'"
                    )));
                }
            }
            if !append.expected_version.matches(current) {
                return Err(stale(aggregate_id, append.expected_version, current));
            }

            let mut next = current + 1;
            for event in append.events {
                sqlx::query(
                    r#"
                    INSERT INTO events (
                        event_id, tenant_id, aggregate_id, aggregate_type, sequence_number,
                        event_type, event_version, occurred_at, payload
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    "#,
                )
                .bind(event.event_id)
                .bind(tenant_id.as_uuid())
                .bind(aggregate_id.as_uuid())
                .bind(&event.aggregate_type)
                .bind(next as i64)
                .bind(&event.event_type)
                .bind(event.event_version as i32)
                .bind(event.occurred_at)
                .bind(&event.payload)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_event", e))?;

                committed.push(StoredEvent {
                    event_id: event.event_id,
                    tenant_id: event.tenant_id,
                    aggregate_id: event.aggregate_id,
                    aggregate_type: event.aggregate_type,
                    sequence_number: next,
                    event_type: event.event_type,
                    event_version: event.event_version,
                    occurred_at: event.occurred_at,
                    payload: event.payload,
                });
                next += 1;
            }
        }

        // Dropping `tx` on any early return above rolls the whole commit back.
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(committed)
    }
}

impl EventStore for PostgresEventStore {
    fn append_atomic(
        &self,
        appends: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        run_blocking(self.append_atomic_async(appends))
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        run_blocking(self.load_stream_async(tenant_id, aggregate_id))
    }

    fn load_all(&self, tenant_id: TenantId) -> Result<Vec<StoredEvent>, EventStoreError> {
        run_blocking(self.load_all_async(tenant_id))
    }
}

fn run_blocking<F, T>(fut: F) -> Result<T, EventStoreError>
where
    F: Future<Output = Result<T, EventStoreError>>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        EventStoreError::Backend("PostgresEventStore requires a tokio runtime".to_string())
    })?;

    match handle.runtime_flavor() {
        tokio::runtime::RuntimeFlavor::CurrentThread => Err(EventStoreError::Backend(
            "PostgresEventStore needs a multi-threaded tokio runtime".to_string(),
        )),
        _ => tokio::task::block_in_place(|| handle.block_on(fut)),
    }
}

fn stale(aggregate_id: AggregateId, expected: ExpectedVersion, found: u64) -> EventStoreError {
    EventStoreError::Concurrency(format!(
        "stream {aggregate_id}: expected {expected:?}, found {found}"
    ))
}

async fn check_stream_version(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(MAX(sequence_number), 0) AS current_version,
               MAX(aggregate_type) AS aggregate_type
        FROM events
        WHERE tenant_id = $1 AND aggregate_id = $2
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    let current: i64 = row
        .try_get("current_version")
        .map_err(|e| EventStoreError::Backend(format!("failed to read current_version: {e}")))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| EventStoreError::Backend(format!("failed to read aggregate_type: {e}")))?;

    Ok((current as u64, aggregate_type))
}

fn row_to_stored(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    let read = |e: sqlx::Error| EventStoreError::Backend(format!("failed to decode event row: {e}"));

    let sequence_number: i64 = row.try_get("sequence_number").map_err(read)?;
    let event_version: i32 = row.try_get("event_version").map_err(read)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(read)?;

    Ok(StoredEvent {
        event_id: row.try_get("event_id").map_err(read)?,
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(read)?),
        aggregate_id: AggregateId::from_uuid(row.try_get("aggregate_id").map_err(read)?),
        aggregate_type: row.try_get("aggregate_type").map_err(read)?,
        sequence_number: sequence_number as u64,
        event_type: row.try_get("event_type").map_err(read)?,
        event_version: event_version as u32,
        occurred_at,
        payload: row.try_get("payload").map_err(read)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::Backend(msg),
            }
        }
        other => EventStoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
