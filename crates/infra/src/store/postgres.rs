//! Postgres-backed lending store.
//!
//! ## Atomic transitions
//!
//! `commit_transition` runs in one transaction:
//!
//! 1. `UPDATE lending_requests ... WHERE id = $1 AND version = $expected`
//!    (0 rows: concurrency error)
//! 2. `UPDATE items SET available_quantity = available_quantity + $delta
//!    WHERE id = $1 AND available_quantity + $delta BETWEEN 0 AND total_quantity`
//!    (0 rows: inventory bounds error)
//! 3. commit
//!
//! The stock check and the write are a single conditional statement, so two
//! concurrent approvals can never push the counter below zero. The
//! `items_available_within_total` check constraint backs this up.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Concurrency` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (check constraint violation) | `23514` | `InventoryBounds` |
//! | anything else | | `Database` |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tracing::instrument;
use uuid::Uuid;

use campusops_auth::{Actor, Role};
use campusops_core::{
    DomainId, ExpectedVersion, FacultyId, ItemId, Money, RequestId, StudentId, UserId,
};
use campusops_lending::{Item, ItemKind, LendingRequest, RequestStatus};

use super::{LendingStore, ListScope, StoreError, TransitionCommit};

const SCHEMA: &str = include_str!("../../migrations/0001_lending.sql");

macro_rules! item_columns {
    () => {
        "i.id AS item_ref, i.kind AS item_kind, i.name AS item_name, \
         i.total_quantity AS item_total, i.available_quantity AS item_available, \
         i.domain_id AS item_domain"
    };
}

macro_rules! request_columns {
    () => {
        "r.id, r.item_id, r.student_id, r.faculty_id, r.quantity, r.status, \
         r.request_date, r.required_date, r.approval_date, r.collection_date, \
         r.due_date, r.return_date, r.fine_amount, r.fine_paid, r.payment_proof, \
         r.notes, r.faculty_notes, r.version"
    };
}

#[derive(Debug, Clone)]
pub struct PostgresLendingStore {
    pool: Arc<PgPool>,
}

impl PostgresLendingStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they don't exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl LendingStore for PostgresLendingStore {
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn resolve_actor(&self, user_id: UserId) -> Result<Option<Actor>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                u.role,
                s.id AS student_id,
                f.id AS faculty_id,
                ARRAY(
                    SELECT dc.domain_id
                    FROM domain_coordinators dc
                    WHERE dc.faculty_id = f.id
                    ORDER BY dc.domain_id
                ) AS domains
            FROM users u
            LEFT JOIN students s ON s.user_id = u.id
            LEFT JOIN faculty f ON f.user_id = u.id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("resolve_actor", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let role: String = col(&row, "role")?;
        let role: Role = role
            .parse()
            .map_err(|e| StoreError::Database(format!("user {user_id}: {e}")))?;
        let student_id: Option<Uuid> = col(&row, "student_id")?;
        let faculty_id: Option<Uuid> = col(&row, "faculty_id")?;
        let domains: Vec<Uuid> = col(&row, "domains")?;

        let actor = match role {
            Role::Admin => Some(Actor::Admin { user_id }),
            Role::Student => student_id.map(|id| Actor::Student {
                user_id,
                student_id: StudentId::from_uuid(id),
            }),
            Role::Faculty => faculty_id.map(|id| Actor::Faculty {
                user_id,
                faculty_id: FacultyId::from_uuid(id),
                coordinated_domains: domains.into_iter().map(DomainId::from_uuid).collect(),
            }),
        };

        if actor.is_none() {
            tracing::warn!(%user_id, %role, "user has no profile for its role");
        }
        Ok(actor)
    }

    #[instrument(skip(self, item), fields(item_id = %item.id_typed(), kind = %item.kind()), err)]
    async fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO items (id, kind, name, total_quantity, available_quantity, domain_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.id_typed().as_uuid())
        .bind(item.kind().as_str())
        .bind(item.name())
        .bind(item.total_quantity())
        .bind(item.available_quantity())
        .bind(item.domain_id().map(Uuid::from))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(concat!("SELECT ", item_columns!(), " FROM items i WHERE i.id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    #[instrument(skip(self), fields(kind = %kind), err)]
    async fn list_items(&self, kind: ItemKind) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            item_columns!(),
            " FROM items i WHERE i.kind = $1 ORDER BY i.name ASC, i.id ASC"
        ))
        .bind(kind.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_items", e))?;

        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip(self, request), fields(request_id = %request.id, item_id = %request.item_id), err)]
    async fn insert_request(&self, request: &LendingRequest) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO lending_requests (
                id, item_id, student_id, faculty_id, quantity, status,
                request_date, required_date, approval_date, collection_date,
                due_date, return_date, fine_amount, fine_paid, payment_proof,
                notes, faculty_notes, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.item_id.as_uuid())
        .bind(request.student_id.as_uuid())
        .bind(request.faculty_id.map(Uuid::from))
        .bind(request.quantity)
        .bind(request.status.as_str())
        .bind(request.request_date)
        .bind(request.required_date)
        .bind(request.approval_date)
        .bind(request.collection_date)
        .bind(request.due_date)
        .bind(request.return_date)
        .bind(request.fine_amount.map(|m| m.minor()))
        .bind(request.fine_paid)
        .bind(request.payment_proof.as_deref())
        .bind(request.notes.as_deref())
        .bind(request.faculty_notes.as_deref())
        .bind(request.version as i64)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_request", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    async fn load_request(&self, id: RequestId) -> Result<Option<LendingRequest>, StoreError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            request_columns!(),
            " FROM lending_requests r WHERE r.id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_request", e))?;

        row.as_ref().map(request_from_row).transpose()
    }

    #[instrument(skip(self), fields(kind = %kind), err)]
    async fn list_requests(
        &self,
        kind: ItemKind,
        scope: &ListScope,
    ) -> Result<Vec<(LendingRequest, Item)>, StoreError> {
        let (tag, student, faculty, domains): (&str, Option<Uuid>, Option<Uuid>, Vec<Uuid>) = match scope {
            ListScope::All => ("all", None, None, Vec::new()),
            ListScope::Student(id) => ("student", Some(*id.as_uuid()), None, Vec::new()),
            ListScope::Faculty { faculty_id, domains } => (
                "faculty",
                None,
                Some(*faculty_id.as_uuid()),
                domains.iter().map(|d| *d.as_uuid()).collect(),
            ),
        };

        let rows = sqlx::query(concat!(
            "SELECT ",
            request_columns!(),
            ", ",
            item_columns!(),
            r#"
            FROM lending_requests r
            JOIN items i ON i.id = r.item_id
            WHERE i.kind = $1
              AND (
                    $2::text = 'all'
                 OR ($2::text = 'student' AND r.student_id = $3::uuid)
                 OR ($2::text = 'faculty' AND (
                        r.faculty_id = $4::uuid
                     OR i.domain_id IS NULL
                     OR i.domain_id = ANY($5::uuid[])))
              )
            ORDER BY r.request_date DESC, r.id DESC
            "#
        ))
        .bind(kind.as_str())
        .bind(tag)
        .bind(student)
        .bind(faculty)
        .bind(domains)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_requests", e))?;

        rows.iter()
            .map(|row| Ok((request_from_row(row)?, item_from_row(row)?)))
            .collect()
    }

    #[instrument(
        skip(self, commit),
        fields(
            request_id = %commit.request.id,
            item_id = %commit.item_id,
            status = %commit.request.status,
            delta = commit.inventory_delta,
            expected_version = ?commit.expected_version
        ),
        err
    )]
    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<(LendingRequest, Item), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let request = &commit.request;
        let new_version = sqlx::query(
            r#"
            UPDATE lending_requests
            SET faculty_id = $3,
                status = $4,
                approval_date = $5,
                collection_date = $6,
                due_date = $7,
                return_date = $8,
                fine_amount = $9,
                fine_paid = $10,
                payment_proof = $11,
                faculty_notes = $12,
                version = version + 1
            WHERE id = $1
              AND ($2::bigint IS NULL OR version = $2::bigint)
            RETURNING version
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(expected_param(commit.expected_version))
        .bind(request.faculty_id.map(Uuid::from))
        .bind(request.status.as_str())
        .bind(request.approval_date)
        .bind(request.collection_date)
        .bind(request.due_date)
        .bind(request.return_date)
        .bind(request.fine_amount.map(|m| m.minor()))
        .bind(request.fine_paid)
        .bind(request.payment_proof.as_deref())
        .bind(request.faculty_notes.as_deref())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_request", e))?;

        let Some(version_row) = new_version else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Concurrency(format!(
                "request {} changed or was removed (expected {:?})",
                request.id, commit.expected_version
            )));
        };
        let version: i64 = col(&version_row, "version")?;

        let item_row = if commit.inventory_delta == 0 {
            sqlx::query(concat!("SELECT ", item_columns!(), " FROM items i WHERE i.id = $1"))
                .bind(commit.item_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("load_item", e))?
        } else {
            sqlx::query(concat!(
                r#"
                UPDATE items AS i
                SET available_quantity = i.available_quantity + $2
                WHERE i.id = $1
                  AND i.available_quantity + $2 BETWEEN 0 AND i.total_quantity
                RETURNING "#,
                item_columns!()
            ))
            .bind(commit.item_id.as_uuid())
            .bind(commit.inventory_delta)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("adjust_inventory", e))?
        };

        let Some(item_row) = item_row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(if commit.inventory_delta == 0 {
                StoreError::NotFound(format!("item {}", commit.item_id))
            } else {
                StoreError::InventoryBounds(format!(
                    "item {}: delta {} would leave available quantity outside 0..=total",
                    commit.item_id, commit.inventory_delta
                ))
            });
        };
        let item = item_from_row(&item_row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let mut stored = commit.request;
        stored.version = version as u64;
        Ok((stored, item))
    }

    #[instrument(skip(self), fields(request_id = %id, expected_version = ?expected_version), err)]
    async fn delete_request(
        &self,
        id: RequestId,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM lending_requests
            WHERE id = $1
              AND ($2::bigint IS NULL OR version = $2::bigint)
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected_param(expected_version))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_request", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Concurrency(format!(
                "request {id} changed or was removed (expected {expected_version:?})"
            )));
        }
        Ok(())
    }
}

fn expected_param(expected: ExpectedVersion) -> Option<i64> {
    match expected {
        ExpectedVersion::Any => None,
        ExpectedVersion::Exact(v) => Some(v as i64),
    }
}

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Database(format!("failed to decode column {name}: {e}")))
}

fn item_from_row(row: &PgRow) -> Result<Item, StoreError> {
    let id = ItemId::from_uuid(col(row, "item_ref")?);
    let kind: String = col(row, "item_kind")?;
    let kind: ItemKind = kind
        .parse()
        .map_err(|e| StoreError::Database(format!("item {id}: {e}")))?;
    let domain: Option<Uuid> = col(row, "item_domain")?;

    Item::restore(
        id,
        kind,
        col(row, "item_name")?,
        col(row, "item_total")?,
        col(row, "item_available")?,
        domain.map(DomainId::from_uuid),
    )
    .map_err(|e| StoreError::Database(e.to_string()))
}

fn request_from_row(row: &PgRow) -> Result<LendingRequest, StoreError> {
    let id = RequestId::from_uuid(col(row, "id")?);
    let status: String = col(row, "status")?;
    let status: RequestStatus = status
        .parse()
        .map_err(|e| StoreError::Database(format!("request {id}: {e}")))?;
    let faculty_id: Option<Uuid> = col(row, "faculty_id")?;
    let fine_amount: Option<i64> = col(row, "fine_amount")?;
    let version: i64 = col(row, "version")?;
    let ts = |name: &str| -> Result<Option<DateTime<Utc>>, StoreError> { col(row, name) };

    Ok(LendingRequest {
        id,
        item_id: ItemId::from_uuid(col(row, "item_id")?),
        student_id: StudentId::from_uuid(col(row, "student_id")?),
        faculty_id: faculty_id.map(FacultyId::from_uuid),
        quantity: col(row, "quantity")?,
        status,
        request_date: col(row, "request_date")?,
        required_date: ts("required_date")?,
        approval_date: ts("approval_date")?,
        collection_date: ts("collection_date")?,
        due_date: ts("due_date")?,
        return_date: ts("return_date")?,
        fine_amount: fine_amount.map(Money::from_minor),
        fine_paid: col(row, "fine_paid")?,
        payment_proof: col(row, "payment_proof")?,
        notes: col(row, "notes")?,
        faculty_notes: col(row, "faculty_notes")?,
        version: version as u64,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Concurrency(msg),
                Some("23503") => StoreError::NotFound(msg),
                Some("23514") => StoreError::InventoryBounds(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}
