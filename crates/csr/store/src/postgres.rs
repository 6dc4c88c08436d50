//! PostgreSQL storage implementation
//!
//! Entities are stored as JSONB documents with the columns needed for
//! lookups and guards promoted alongside. Checkpoint uniqueness is the
//! table's primary key, and both status transitions are conditional
//! `UPDATE ... WHERE status = ...` statements run inside a transaction.

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csr_types::{
    Checkpoint, CheckpointNumber, CheckpointStatus, NotesUpdate, Notification, NotificationAudience,
    NotificationId, NotificationStatus, Program, ProgramId, ProgramMetrics, Role, School, Sponsor,
    SponsorId, User, UserId,
};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Postgres, Row, Transaction};
use std::time::Duration;

/// PostgreSQL-backed storage
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to PostgreSQL and initialize schema
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;
        tracing::info!(max_connections, "PostgreSQL storage ready");
        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS programs (
                id UUID PRIMARY KEY,
                sponsor_id UUID NOT NULL,
                status TEXT NOT NULL,
                status_rank SMALLINT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS programs_sponsor_id ON programs(sponsor_id);"#,
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                program_id UUID NOT NULL REFERENCES programs(id),
                number SMALLINT NOT NULL CHECK (number BETWEEN 1 AND 5),
                status TEXT NOT NULL,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (program_id, number)
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sponsors (
                id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS schools (
                id UUID PRIMARY KEY,
                program_id UUID,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS schools_program_id ON schools(program_id);"#,
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                role TEXT NOT NULL,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS users_role ON users(role);"#,
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id UUID PRIMARY KEY,
                status TEXT NOT NULL,
                sponsor_id UUID,
                user_id TEXT,
                next_attempt_at TIMESTAMPTZ,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"ALTER TABLE notifications ADD COLUMN IF NOT EXISTS next_attempt_at TIMESTAMPTZ;"#,
            r#"CREATE INDEX IF NOT EXISTS notifications_pending ON notifications(created_at) WHERE status = 'pending';"#,
            r#"CREATE INDEX IF NOT EXISTS notifications_sponsor ON notifications(sponsor_id, created_at DESC);"#,
            r#"CREATE INDEX IF NOT EXISTS notifications_user ON notifications(user_id, created_at DESC);"#,
        ];

        for stmt in statements {
            sqlx::query(stmt).execute(&self.pool).await?;
        }

        Ok(())
    }

    fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, StorageError> {
        serde_json::to_value(value)
            .map_err(|e| StorageError::InvalidData(format!("json serialize error: {}", e)))
    }

    fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, StorageError> {
        serde_json::from_value(value)
            .map_err(|e| StorageError::InvalidData(format!("json deserialize error: {}", e)))
    }

    fn decode<T: serde::de::DeserializeOwned>(row: &PgRow) -> Result<T, StorageError> {
        let data: Value = row.try_get("data")?;
        Self::from_json(data)
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::Admin => "admin",
            Role::Sponsor => "sponsor",
        }
    }

    /// Lock a checkpoint row for the rest of the transaction
    async fn lock_checkpoint(
        tx: &mut Transaction<'_, Postgres>,
        program_id: &ProgramId,
        number: CheckpointNumber,
    ) -> Result<Option<Checkpoint>, StorageError> {
        let row = sqlx::query(
            "SELECT data FROM checkpoints WHERE program_id = $1 AND number = $2 FOR UPDATE",
        )
        .bind(program_id.as_uuid())
        .bind(number.get() as i16)
        .fetch_optional(&mut **tx)
        .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    /// Conditional write of a checkpoint; `false` when `expected` no longer holds
    async fn swap_checkpoint(
        tx: &mut Transaction<'_, Postgres>,
        checkpoint: &Checkpoint,
        expected: CheckpointStatus,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE checkpoints
            SET status = $3, data = $4, updated_at = $5
            WHERE program_id = $1 AND number = $2 AND status = $6
            "#,
        )
        .bind(checkpoint.program_id.as_uuid())
        .bind(checkpoint.number.get() as i16)
        .bind(checkpoint.status.as_str())
        .bind(Self::to_json(checkpoint)?)
        .bind(checkpoint.updated_at)
        .bind(expected.as_str())
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ProgramStorage for PostgresStorage {
    async fn get_program(&self, id: &ProgramId) -> StorageResult<Option<Program>> {
        let row = sqlx::query("SELECT data FROM programs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_programs(&self) -> StorageResult<Vec<Program>> {
        let rows = sqlx::query("SELECT data FROM programs ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::decode).collect()
    }

    async fn create_program(
        &self,
        program: Program,
        checkpoints: Vec<Checkpoint>,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO programs (id, sponsor_id, status, status_rank, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(program.id.as_uuid())
        .bind(program.sponsor_id.as_uuid())
        .bind(program.status.as_str())
        .bind(program.status.rank())
        .bind(Self::to_json(&program)?)
        .bind(program.created_at)
        .bind(program.updated_at)
        .execute(&mut *tx)
        .await?;

        for checkpoint in &checkpoints {
            if checkpoint.program_id != program.id {
                return Err(StorageError::InvalidData(format!(
                    "checkpoint {} belongs to program {}, not {}",
                    checkpoint.number, checkpoint.program_id, program.id
                )));
            }
            sqlx::query(
                r#"
                INSERT INTO checkpoints (program_id, number, status, data, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(checkpoint.program_id.as_uuid())
            .bind(checkpoint.number.get() as i16)
            .bind(checkpoint.status.as_str())
            .bind(Self::to_json(checkpoint)?)
            .bind(checkpoint.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_program_metrics(
        &self,
        id: &ProgramId,
        metrics: ProgramMetrics,
    ) -> StorageResult<bool> {
        let updated_at = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE programs
            SET data = jsonb_set(jsonb_set(data, '{metrics}', $2), '{updated_at}', to_jsonb($3::timestamptz)),
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(Self::to_json(&metrics)?)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CheckpointStorage for PostgresStorage {
    async fn get_checkpoint(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
    ) -> StorageResult<Option<Checkpoint>> {
        let row = sqlx::query("SELECT data FROM checkpoints WHERE program_id = $1 AND number = $2")
            .bind(program_id.as_uuid())
            .bind(number.get() as i16)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn list_checkpoints(&self, program_id: &ProgramId) -> StorageResult<Vec<Checkpoint>> {
        let rows = sqlx::query("SELECT data FROM checkpoints WHERE program_id = $1 ORDER BY number")
            .bind(program_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::decode).collect()
    }

    async fn mark_ready(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
        transition: ReadyTransition,
    ) -> StorageResult<TransitionOutcome<Checkpoint>> {
        let mut tx = self.pool.begin().await?;

        let Some(mut checkpoint) = Self::lock_checkpoint(&mut tx, program_id, number).await? else {
            return Ok(TransitionOutcome::NotFound);
        };
        if !checkpoint.status.can_transition_to(CheckpointStatus::Ready) {
            return Ok(TransitionOutcome::Conflict {
                current: checkpoint.status,
            });
        }

        checkpoint.status = CheckpointStatus::Ready;
        checkpoint.triggered_at = Some(transition.triggered_at);
        checkpoint.triggered_by = Some(transition.triggered_by);
        checkpoint.metrics_snapshot = Some(transition.metrics_snapshot);
        checkpoint.updated_at = transition.triggered_at;

        if !Self::swap_checkpoint(&mut tx, &checkpoint, CheckpointStatus::Pending).await? {
            tracing::debug!(
                program_id = %program_id,
                checkpoint = %number,
                "Lost race to mark checkpoint ready"
            );
            return Ok(TransitionOutcome::Conflict {
                current: CheckpointStatus::Ready,
            });
        }

        tx.commit().await?;
        Ok(TransitionOutcome::Applied(checkpoint))
    }

    async fn mark_completed(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
        transition: CompletionTransition,
    ) -> StorageResult<TransitionOutcome<CompletedTransition>> {
        let mut tx = self.pool.begin().await?;

        let program_row = sqlx::query("SELECT data FROM programs WHERE id = $1 FOR UPDATE")
            .bind(program_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(mut program) = program_row.as_ref().map(Self::decode::<Program>).transpose()? else {
            return Ok(TransitionOutcome::NotFound);
        };

        let Some(mut checkpoint) = Self::lock_checkpoint(&mut tx, program_id, number).await? else {
            return Ok(TransitionOutcome::NotFound);
        };
        if !checkpoint.status.can_transition_to(CheckpointStatus::Completed) {
            return Ok(TransitionOutcome::Conflict {
                current: checkpoint.status,
            });
        }

        checkpoint.status = CheckpointStatus::Completed;
        checkpoint.acknowledged_at = Some(transition.completed_at);
        checkpoint.acknowledged_by = Some(transition.acknowledged_by);
        checkpoint.completed_at = Some(transition.completed_at);
        checkpoint.updated_at = transition.completed_at;

        if !Self::swap_checkpoint(&mut tx, &checkpoint, CheckpointStatus::Ready).await? {
            tracing::debug!(
                program_id = %program_id,
                checkpoint = %number,
                "Lost race to complete checkpoint"
            );
            return Ok(TransitionOutcome::Conflict {
                current: CheckpointStatus::Completed,
            });
        }

        let advanced = transition
            .advance_program_to
            .map(|target| program.advance_status(target))
            .unwrap_or(false);
        if advanced {
            sqlx::query(
                r#"
                UPDATE programs
                SET status = $2, status_rank = $3, data = $4, updated_at = $5
                WHERE id = $1 AND status_rank < $3
                "#,
            )
            .bind(program.id.as_uuid())
            .bind(program.status.as_str())
            .bind(program.status.rank())
            .bind(Self::to_json(&program)?)
            .bind(program.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(TransitionOutcome::Applied(CompletedTransition {
            checkpoint,
            program,
        }))
    }

    async fn update_notes(
        &self,
        program_id: &ProgramId,
        number: CheckpointNumber,
        update: &NotesUpdate,
    ) -> StorageResult<Option<Checkpoint>> {
        let mut tx = self.pool.begin().await?;

        let Some(mut checkpoint) = Self::lock_checkpoint(&mut tx, program_id, number).await? else {
            return Ok(None);
        };
        if let Some(admin_notes) = &update.admin_notes {
            checkpoint.admin_notes = Some(admin_notes.clone());
        }
        if let Some(notes) = &update.notes {
            checkpoint.notes = Some(notes.clone());
        }
        checkpoint.updated_at = Utc::now();

        sqlx::query(
            "UPDATE checkpoints SET data = $3, updated_at = $4 WHERE program_id = $1 AND number = $2",
        )
        .bind(program_id.as_uuid())
        .bind(number.get() as i16)
        .bind(Self::to_json(&checkpoint)?)
        .bind(checkpoint.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(checkpoint))
    }
}

#[async_trait]
impl SponsorStorage for PostgresStorage {
    async fn get_sponsor(&self, id: &SponsorId) -> StorageResult<Option<Sponsor>> {
        let row = sqlx::query("SELECT data FROM sponsors WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn upsert_sponsor(&self, sponsor: Sponsor) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sponsors (id, user_id, data, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id)
            DO UPDATE SET user_id = EXCLUDED.user_id, data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(sponsor.id.as_uuid())
        .bind(sponsor.user_id.as_str())
        .bind(Self::to_json(&sponsor)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SchoolStorage for PostgresStorage {
    async fn list_schools_for_program(&self, program_id: &ProgramId) -> StorageResult<Vec<School>> {
        let rows = sqlx::query("SELECT data FROM schools WHERE program_id = $1")
            .bind(program_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::decode).collect()
    }

    async fn upsert_school(&self, school: School) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO schools (id, program_id, data, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id)
            DO UPDATE SET program_id = EXCLUDED.program_id, data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(school.id.as_uuid())
        .bind(school.program_id.map(|p| *p.as_uuid()))
        .bind(Self::to_json(&school)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl UserStorage for PostgresStorage {
    async fn list_users_by_role(&self, role: Role) -> StorageResult<Vec<User>> {
        let rows = sqlx::query("SELECT data FROM users WHERE role = $1 ORDER BY id")
            .bind(Self::role_str(role))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::decode).collect()
    }

    async fn upsert_user(&self, user: User) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, role, data, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id)
            DO UPDATE SET role = EXCLUDED.role, data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user.id.as_str())
        .bind(Self::role_str(user.role))
        .bind(Self::to_json(&user)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl NotificationStorage for PostgresStorage {
    async fn insert_notification(&self, notification: Notification) -> StorageResult<()> {
        let (sponsor_id, user_id) = match &notification.audience {
            NotificationAudience::Sponsor { sponsor_id } => (Some(*sponsor_id.as_uuid()), None),
            NotificationAudience::Admin { user_id } => (None, Some(user_id.as_str().to_string())),
        };

        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, status, sponsor_id, user_id, next_attempt_at, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(notification.id.as_uuid())
        .bind(notification.status.as_str())
        .bind(sponsor_id)
        .bind(user_id)
        .bind(notification.next_attempt_at)
        .bind(Self::to_json(&notification)?)
        .bind(notification.created_at)
        .bind(notification.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_notification(&self, id: &NotificationId) -> StorageResult<Option<Notification>> {
        let row = sqlx::query("SELECT data FROM notifications WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::decode).transpose()
    }

    async fn update_notification(&self, notification: Notification) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $2, next_attempt_at = $3, data = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(notification.id.as_uuid())
        .bind(notification.status.as_str())
        .bind(notification.next_attempt_at)
        .bind(Self::to_json(&notification)?)
        .bind(notification.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_due_notifications(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM notifications
            WHERE status = $1 AND (next_attempt_at IS NULL OR next_attempt_at <= $2)
            ORDER BY created_at
            LIMIT $3
            "#,
        )
        .bind(NotificationStatus::Pending.as_str())
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode).collect()
    }

    async fn list_notifications_for_sponsor(
        &self,
        sponsor_id: &SponsorId,
        limit: usize,
    ) -> StorageResult<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT data FROM notifications WHERE sponsor_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(sponsor_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode).collect()
    }

    async fn list_notifications_for_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> StorageResult<Vec<Notification>> {
        let rows = sqlx::query(
            "SELECT data FROM notifications WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode).collect()
    }
}

impl Storage for PostgresStorage {}
