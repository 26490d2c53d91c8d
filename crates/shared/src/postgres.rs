//! PostgreSQL store

use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::store::Store;
use crate::types::{ReportRequest, ReportStatus, ReservationOutcome, Team, WorkflowHistoryEntry};

/// Database row for report requests (status stored as TEXT)
#[derive(Debug, FromRow)]
struct ReportRow {
    id: Uuid,
    user_id: Uuid,
    team_id: Uuid,
    form_data: serde_json::Value,
    status: String,
    result: Option<String>,
    quota_reserved: bool,
    attempts: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<ReportRow> for ReportRequest {
    type Error = StoreError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        Ok(ReportRequest {
            id: row.id,
            user_id: row.user_id,
            team_id: row.team_id,
            form_data: row.form_data,
            status: row.status.parse()?,
            result: row.result,
            quota_reserved: row.quota_reserved,
            attempts: row.attempts,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const REPORT_COLUMNS: &str = "id, user_id, team_id, form_data, status, result, quota_reserved, attempts, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn get_team(&self, team_id: Uuid) -> StoreResult<Option<Team>> {
        let team = sqlx::query_as::<_, Team>(
            r#"
            SELECT id, name, subscription_id, billing_product_reference,
                   current_messages, message_limit, created_at, updated_at
            FROM teams
            WHERE id = $1
            "#,
        )
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(team)
    }

    async fn team_for_user(&self, user_id: Uuid) -> StoreResult<Option<Team>> {
        let team = sqlx::query_as::<_, Team>(
            r#"
            SELECT t.id, t.name, t.subscription_id, t.billing_product_reference,
                   t.current_messages, t.message_limit, t.created_at, t.updated_at
            FROM teams t
            JOIN team_members m ON m.team_id = t.id
            WHERE m.user_id = $1
            ORDER BY m.joined_at ASC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(team)
    }

    async fn list_teams(&self) -> StoreResult<Vec<Team>> {
        let teams = sqlx::query_as::<_, Team>(
            r#"
            SELECT id, name, subscription_id, billing_product_reference,
                   current_messages, message_limit, created_at, updated_at
            FROM teams
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(teams)
    }

    async fn increment_usage(&self, team_id: Uuid, amount: i64) -> StoreResult<Option<i64>> {
        // Single statement: concurrent increments serialize on the row lock
        let current: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE teams
            SET current_messages = GREATEST(current_messages + $2, 0),
                updated_at = NOW()
            WHERE id = $1
            RETURNING current_messages
            "#,
        )
        .bind(team_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(current)
    }

    async fn insert_report(&self, report: &ReportRequest) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO report_requests (
                id, user_id, team_id, form_data, status, result,
                quota_reserved, attempts, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(report.id)
        .bind(report.user_id)
        .bind(report.team_id)
        .bind(&report.form_data)
        .bind(report.status.as_str())
        .bind(&report.result)
        .bind(report.quota_reserved)
        .bind(report.attempts)
        .bind(report.created_at)
        .bind(report.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_report(&self, report_id: Uuid) -> StoreResult<Option<ReportRequest>> {
        let row: Option<ReportRow> = sqlx::query_as(&format!(
            "SELECT {} FROM report_requests WHERE id = $1",
            REPORT_COLUMNS
        ))
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReportRequest::try_from).transpose()
    }

    async fn transition_report(
        &self,
        report_id: Uuid,
        from: &[ReportStatus],
        to: ReportStatus,
        result: Option<&str>,
    ) -> StoreResult<Option<ReportRequest>> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();

        let row: Option<ReportRow> = sqlx::query_as(&format!(
            r#"
            UPDATE report_requests
            SET status = $2,
                result = COALESCE($3, result),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($4)
            RETURNING {}
            "#,
            REPORT_COLUMNS
        ))
        .bind(report_id)
        .bind(to.as_str())
        .bind(result)
        .bind(&from)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReportRequest::try_from).transpose()
    }

    async fn reserve_quota(
        &self,
        report_id: Uuid,
        team_id: Uuid,
        ceiling: Option<i64>,
    ) -> StoreResult<ReservationOutcome> {
        let mut tx = self.pool.begin().await?;

        let already: Option<bool> = sqlx::query_scalar(
            "SELECT quota_reserved FROM report_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(report_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(already) = already else {
            tx.rollback().await?;
            return Err(StoreError::NotFound(format!("report {}", report_id)));
        };

        if already {
            tx.commit().await?;
            return Ok(ReservationOutcome::AlreadyReserved);
        }

        // Conditional increment: the limit check and the add are one statement
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE teams
            SET current_messages = current_messages + 1,
                updated_at = NOW()
            WHERE id = $1
              AND ($2::BIGINT IS NULL OR current_messages < $2)
            RETURNING current_messages
            "#,
        )
        .bind(team_id)
        .bind(ceiling)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current_messages) = updated else {
            let current: Option<i64> =
                sqlx::query_scalar("SELECT current_messages FROM teams WHERE id = $1")
                    .bind(team_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;

            return Ok(match current {
                Some(current_messages) => ReservationOutcome::LimitReached { current_messages },
                None => ReservationOutcome::TeamNotFound,
            });
        };

        sqlx::query(
            "UPDATE report_requests SET quota_reserved = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(report_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ReservationOutcome::Reserved { current_messages })
    }

    async fn release_quota(&self, report_id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let team_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE report_requests
            SET quota_reserved = FALSE,
                updated_at = NOW()
            WHERE id = $1 AND quota_reserved
            RETURNING team_id
            "#,
        )
        .bind(report_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(team_id) = team_id else {
            tx.commit().await?;
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE teams
            SET current_messages = GREATEST(current_messages - 1, 0),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(team_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn claim_stale_report(
        &self,
        stale_before: OffsetDateTime,
    ) -> StoreResult<Option<ReportRequest>> {
        let row: Option<ReportRow> = sqlx::query_as(&format!(
            r#"
            UPDATE report_requests
            SET attempts = attempts + 1,
                updated_at = NOW()
            WHERE id = (
                SELECT id FROM report_requests
                WHERE status IN ('pending', 'processing')
                  AND updated_at < $1
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            REPORT_COLUMNS
        ))
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReportRequest::try_from).transpose()
    }

    async fn list_stale_reports(
        &self,
        stale_before: OffsetDateTime,
    ) -> StoreResult<Vec<ReportRequest>> {
        let rows: Vec<ReportRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM report_requests
            WHERE status IN ('pending', 'processing')
              AND updated_at < $1
            ORDER BY created_at ASC
            "#,
            REPORT_COLUMNS
        ))
        .bind(stale_before)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ReportRequest::try_from).collect()
    }

    async fn append_history(&self, entry: &WorkflowHistoryEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_history (id, team_id, user_id, input, output, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.team_id)
        .bind(entry.user_id)
        .bind(&entry.input)
        .bind(&entry.output)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_history(
        &self,
        team_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<WorkflowHistoryEntry>> {
        let entries = sqlx::query_as::<_, WorkflowHistoryEntry>(
            r#"
            SELECT id, team_id, user_id, input, output, created_at
            FROM workflow_history
            WHERE team_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(team_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
