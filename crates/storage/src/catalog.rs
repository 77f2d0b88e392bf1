//! Record store using PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use tracing::instrument;

use storm_common::{
    BoundingBox, CategoryRequirement, FetchLog, ModelRun, NewFetchLog, ProcessorKind,
    ProviderSource, SourceProtocol, StormError, StormEvent, StormResult, TimeWindow,
};

use crate::records::RecordStore;

/// Database connection pool and record operations.
pub struct Catalog {
    pool: PgPool,
}

fn db_err(context: &str, e: sqlx::Error) -> StormError {
    StormError::Database(format!("{}: {}", context, e))
}

impl Catalog {
    /// Create a new catalog connection from database URL.
    pub async fn connect(database_url: &str) -> StormResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| db_err("Connection failed", e))?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> StormResult<()> {
        // Split SQL statements and execute them individually
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| db_err("Migration failed", e))?;
            }
        }

        Ok(())
    }

    /// Create a model run for a storm with no output yet.
    pub async fn create_model_run(&self, storm_id: i64) -> StormResult<ModelRun> {
        let row = sqlx::query_as::<_, ModelRunRow>(
            "INSERT INTO model_runs (storm_id) VALUES ($1) \
             RETURNING id, storm_id, model_output_snapshot, model_output_snapshot_extracted, \
             covered_data_snapshot, date_requested, date_returned",
        )
        .bind(storm_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("Insert failed", e))?;

        Ok(row.into())
    }
}

#[async_trait]
impl RecordStore for Catalog {
    async fn storm(&self, id: i64) -> StormResult<StormEvent> {
        let row = sqlx::query_as::<_, StormRow>(
            "SELECT id, name, bbox_min_x, bbox_min_y, bbox_max_x, bbox_max_y, \
             start_date, end_date FROM storms WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("Query failed", e))?;

        row.map(Into::into)
            .ok_or_else(|| StormError::NotFound(format!("Storm {} not found", id)))
    }

    async fn requirement(&self, id: i64) -> StormResult<CategoryRequirement> {
        let row = sqlx::query_as::<_, RequirementRow>(
            "SELECT id, storm_id, name, bbox_min_x, bbox_min_y, bbox_max_x, bbox_max_y, \
             start_date, end_date, active FROM requirements WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("Query failed", e))?;

        row.map(Into::into)
            .ok_or_else(|| StormError::NotFound(format!("Requirement {} not found", id)))
    }

    async fn provider(&self, id: i64) -> StormResult<ProviderSource> {
        let row = sqlx::query_as::<_, ProviderRow>(
            "SELECT id, requirement_id, name, processor, source, url, active, data_regex \
             FROM providers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("Query failed", e))?;

        row.ok_or_else(|| StormError::NotFound(format!("Provider {} not found", id)))?
            .try_into()
    }

    async fn active_requirements(&self, storm_id: i64) -> StormResult<Vec<CategoryRequirement>> {
        let rows = sqlx::query_as::<_, RequirementRow>(
            "SELECT id, storm_id, name, bbox_min_x, bbox_min_y, bbox_max_x, bbox_max_y, \
             start_date, end_date, active FROM requirements \
             WHERE storm_id = $1 AND active ORDER BY id",
        )
        .bind(storm_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("Query failed", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn active_providers(&self, requirement_id: i64) -> StormResult<Vec<ProviderSource>> {
        let rows = sqlx::query_as::<_, ProviderRow>(
            "SELECT id, requirement_id, name, processor, source, url, active, data_regex \
             FROM providers WHERE requirement_id = $1 AND active ORDER BY id",
        )
        .bind(requirement_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("Query failed", e))?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(skip(self, log), fields(storm = log.storm_id, provider = log.provider_id))]
    async fn insert_fetch_log(&self, log: NewFetchLog) -> StormResult<FetchLog> {
        let row = sqlx::query_as::<_, FetchLogRow>(
            "INSERT INTO fetch_logs (storm_id, requirement_id, provider_id, date, success) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, storm_id, requirement_id, \
             (SELECT name FROM requirements WHERE id = $2) AS requirement_name, \
             provider_id, date, success, snapshot",
        )
        .bind(log.storm_id)
        .bind(log.requirement_id)
        .bind(log.provider_id)
        .bind(log.date)
        .bind(log.success)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("Insert failed", e))?;

        Ok(row.into())
    }

    async fn fetch_log(&self, id: i64) -> StormResult<FetchLog> {
        let row = sqlx::query_as::<_, FetchLogRow>(&format!("{} WHERE l.id = $1", FETCH_LOG_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("Query failed", e))?;

        row.map(Into::into)
            .ok_or_else(|| StormError::NotFound(format!("Fetch log {} not found", id)))
    }

    #[instrument(skip(self))]
    async fn set_log_snapshot(&self, id: i64, snapshot: &str) -> StormResult<()> {
        let result = sqlx::query("UPDATE fetch_logs SET snapshot = $2 WHERE id = $1")
            .bind(id)
            .bind(snapshot)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("Update failed", e))?;

        if result.rows_affected() == 0 {
            return Err(StormError::NotFound(format!("Fetch log {} not found", id)));
        }
        Ok(())
    }

    async fn fetch_logs_for_storm(&self, storm_id: i64) -> StormResult<Vec<FetchLog>> {
        let rows = sqlx::query_as::<_, FetchLogRow>(&format!(
            "{} WHERE l.storm_id = $1 ORDER BY l.id",
            FETCH_LOG_SELECT
        ))
        .bind(storm_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("Query failed", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn model_run(&self, id: i64) -> StormResult<ModelRun> {
        let row = sqlx::query_as::<_, ModelRunRow>(
            "SELECT id, storm_id, model_output_snapshot, model_output_snapshot_extracted, \
             covered_data_snapshot, date_requested, date_returned FROM model_runs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("Query failed", e))?;

        row.map(Into::into)
            .ok_or_else(|| StormError::NotFound(format!("Model run {} not found", id)))
    }

    #[instrument(skip(self, run), fields(run = run.id))]
    async fn save_model_run(&self, run: &ModelRun) -> StormResult<()> {
        let result = sqlx::query(
            "UPDATE model_runs SET model_output_snapshot = $2, \
             model_output_snapshot_extracted = $3, covered_data_snapshot = $4, \
             date_returned = $5 WHERE id = $1",
        )
        .bind(run.id)
        .bind(&run.model_output_snapshot)
        .bind(run.model_output_snapshot_extracted)
        .bind(&run.covered_data_snapshot)
        .bind(run.date_returned)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("Update failed", e))?;

        if result.rows_affected() == 0 {
            return Err(StormError::NotFound(format!("Model run {} not found", run.id)));
        }
        Ok(())
    }
}

const FETCH_LOG_SELECT: &str = "SELECT l.id, l.storm_id, l.requirement_id, \
     r.name AS requirement_name, l.provider_id, l.date, l.success, l.snapshot \
     FROM fetch_logs l JOIN requirements r ON r.id = l.requirement_id";

#[derive(FromRow)]
struct StormRow {
    id: i64,
    name: String,
    bbox_min_x: f64,
    bbox_min_y: f64,
    bbox_max_x: f64,
    bbox_max_y: f64,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

impl From<StormRow> for StormEvent {
    fn from(row: StormRow) -> Self {
        StormEvent {
            id: row.id,
            name: row.name,
            geo: BoundingBox::new(row.bbox_min_x, row.bbox_min_y, row.bbox_max_x, row.bbox_max_y),
            window: TimeWindow::new(row.start_date, row.end_date),
        }
    }
}

#[derive(FromRow)]
struct RequirementRow {
    id: i64,
    storm_id: i64,
    name: String,
    bbox_min_x: f64,
    bbox_min_y: f64,
    bbox_max_x: f64,
    bbox_max_y: f64,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    active: bool,
}

impl From<RequirementRow> for CategoryRequirement {
    fn from(row: RequirementRow) -> Self {
        CategoryRequirement {
            id: row.id,
            storm_id: row.storm_id,
            name: row.name,
            geo: BoundingBox::new(row.bbox_min_x, row.bbox_min_y, row.bbox_max_x, row.bbox_max_y),
            window: TimeWindow::new(row.start_date, row.end_date),
            active: row.active,
        }
    }
}

#[derive(FromRow)]
struct ProviderRow {
    id: i64,
    requirement_id: i64,
    name: String,
    processor: String,
    source: String,
    url: String,
    active: bool,
    data_regex: Option<String>,
}

impl TryFrom<ProviderRow> for ProviderSource {
    type Error = StormError;

    fn try_from(row: ProviderRow) -> StormResult<Self> {
        let processor = ProcessorKind::parse(&row.processor).ok_or_else(|| {
            StormError::Configuration(format!(
                "Provider {} has unknown processor '{}'",
                row.id, row.processor
            ))
        })?;
        let source = SourceProtocol::parse(&row.source).ok_or_else(|| {
            StormError::Configuration(format!(
                "Provider {} has unknown source '{}'",
                row.id, row.source
            ))
        })?;

        Ok(ProviderSource {
            id: row.id,
            requirement_id: row.requirement_id,
            name: row.name,
            processor,
            source,
            url: row.url,
            active: row.active,
            data_regex: row.data_regex.filter(|r| !r.is_empty()),
        })
    }
}

#[derive(FromRow)]
struct FetchLogRow {
    id: i64,
    storm_id: i64,
    requirement_id: i64,
    requirement_name: String,
    provider_id: i64,
    date: DateTime<Utc>,
    success: bool,
    snapshot: String,
}

impl From<FetchLogRow> for FetchLog {
    fn from(row: FetchLogRow) -> Self {
        FetchLog {
            id: row.id,
            storm_id: row.storm_id,
            requirement_id: row.requirement_id,
            requirement_name: row.requirement_name,
            provider_id: row.provider_id,
            date: row.date,
            success: row.success,
            snapshot: row.snapshot,
        }
    }
}

#[derive(FromRow)]
struct ModelRunRow {
    id: i64,
    storm_id: i64,
    model_output_snapshot: String,
    model_output_snapshot_extracted: bool,
    covered_data_snapshot: String,
    date_requested: DateTime<Utc>,
    date_returned: Option<DateTime<Utc>>,
}

impl From<ModelRunRow> for ModelRun {
    fn from(row: ModelRunRow) -> Self {
        ModelRun {
            id: row.id,
            storm_id: row.storm_id,
            model_output_snapshot: row.model_output_snapshot,
            model_output_snapshot_extracted: row.model_output_snapshot_extracted,
            covered_data_snapshot: row.covered_data_snapshot,
            date_requested: row.date_requested,
            date_returned: row.date_returned,
        }
    }
}

/// Database schema SQL.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS storms (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(100) NOT NULL UNIQUE,
    bbox_min_x DOUBLE PRECISION NOT NULL,
    bbox_min_y DOUBLE PRECISION NOT NULL,
    bbox_max_x DOUBLE PRECISION NOT NULL,
    bbox_max_y DOUBLE PRECISION NOT NULL,
    start_date TIMESTAMPTZ NOT NULL,
    end_date TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS requirements (
    id BIGSERIAL PRIMARY KEY,
    storm_id BIGINT NOT NULL REFERENCES storms(id) ON DELETE CASCADE,
    name VARCHAR(100) NOT NULL UNIQUE,
    bbox_min_x DOUBLE PRECISION NOT NULL,
    bbox_min_y DOUBLE PRECISION NOT NULL,
    bbox_max_x DOUBLE PRECISION NOT NULL,
    bbox_max_y DOUBLE PRECISION NOT NULL,
    start_date TIMESTAMPTZ NOT NULL,
    end_date TIMESTAMPTZ NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS providers (
    id BIGSERIAL PRIMARY KEY,
    requirement_id BIGINT NOT NULL REFERENCES requirements(id) ON DELETE CASCADE,
    name VARCHAR(200) NOT NULL,
    processor VARCHAR(50) NOT NULL,
    source VARCHAR(50) NOT NULL,
    url TEXT NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    data_regex TEXT
);

CREATE TABLE IF NOT EXISTS fetch_logs (
    id BIGSERIAL PRIMARY KEY,
    storm_id BIGINT NOT NULL REFERENCES storms(id) ON DELETE CASCADE,
    requirement_id BIGINT NOT NULL REFERENCES requirements(id) ON DELETE CASCADE,
    provider_id BIGINT NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
    date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    success BOOLEAN NOT NULL,
    snapshot TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_fetch_logs_storm_date ON fetch_logs(storm_id, date DESC);

CREATE TABLE IF NOT EXISTS model_runs (
    id BIGSERIAL PRIMARY KEY,
    storm_id BIGINT NOT NULL REFERENCES storms(id) ON DELETE CASCADE,
    model_output_snapshot TEXT NOT NULL DEFAULT '',
    model_output_snapshot_extracted BOOLEAN NOT NULL DEFAULT FALSE,
    covered_data_snapshot TEXT NOT NULL DEFAULT '',
    date_requested TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    date_returned TIMESTAMPTZ
)
"#;
