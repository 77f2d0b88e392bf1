//! Durable record contract for storms, requirements, providers, fetch logs
//! and model runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use storm_common::{
    CategoryRequirement, FetchLog, ModelRun, NewFetchLog, ProviderSource, StormError,
    StormEvent, StormResult,
};

/// Read/write access to the relational records the stages coordinate through.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn storm(&self, id: i64) -> StormResult<StormEvent>;

    async fn requirement(&self, id: i64) -> StormResult<CategoryRequirement>;

    async fn provider(&self, id: i64) -> StormResult<ProviderSource>;

    /// Active requirements of a storm, ordered by id.
    async fn active_requirements(&self, storm_id: i64) -> StormResult<Vec<CategoryRequirement>>;

    /// Active providers of a requirement, ordered by id.
    async fn active_providers(&self, requirement_id: i64) -> StormResult<Vec<ProviderSource>>;

    /// Append a fetch log; the snapshot starts empty.
    async fn insert_fetch_log(&self, log: NewFetchLog) -> StormResult<FetchLog>;

    async fn fetch_log(&self, id: i64) -> StormResult<FetchLog>;

    /// Set the snapshot path of an archived fetch log.
    async fn set_log_snapshot(&self, id: i64, snapshot: &str) -> StormResult<()>;

    /// Every fetch log of a storm, in insertion order.
    async fn fetch_logs_for_storm(&self, storm_id: i64) -> StormResult<Vec<FetchLog>>;

    async fn model_run(&self, id: i64) -> StormResult<ModelRun>;

    /// Persist every mutable field of a model run.
    async fn save_model_run(&self, run: &ModelRun) -> StormResult<()>;
}

#[derive(Default)]
struct Tables {
    storms: BTreeMap<i64, StormEvent>,
    requirements: BTreeMap<i64, CategoryRequirement>,
    providers: BTreeMap<i64, ProviderSource>,
    logs: BTreeMap<i64, FetchLog>,
    runs: BTreeMap<i64, ModelRun>,
}

/// Process-local record store used by tests and one-shot runs.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: RwLock<Tables>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_storm(&self, storm: StormEvent) {
        self.tables.write().await.storms.insert(storm.id, storm);
    }

    /// Add a requirement; names are unique across all storms.
    pub async fn add_requirement(&self, requirement: CategoryRequirement) -> StormResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .requirements
            .values()
            .any(|r| r.name == requirement.name && r.id != requirement.id)
        {
            return Err(StormError::Validation(format!(
                "Requirement name '{}' already exists",
                requirement.name
            )));
        }
        tables.requirements.insert(requirement.id, requirement);
        Ok(())
    }

    pub async fn add_provider(&self, provider: ProviderSource) {
        self.tables
            .write()
            .await
            .providers
            .insert(provider.id, provider);
    }

    pub async fn add_model_run(&self, run: ModelRun) {
        self.tables.write().await.runs.insert(run.id, run);
    }

    /// Insert a log with an explicit snapshot, as an archived row would look.
    pub async fn add_fetch_log(&self, log: FetchLog) {
        self.tables.write().await.logs.insert(log.id, log);
    }
}

fn missing(kind: &str, id: i64) -> StormError {
    StormError::NotFound(format!("{} {} not found", kind, id))
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn storm(&self, id: i64) -> StormResult<StormEvent> {
        let tables = self.tables.read().await;
        tables.storms.get(&id).cloned().ok_or_else(|| missing("Storm", id))
    }

    async fn requirement(&self, id: i64) -> StormResult<CategoryRequirement> {
        let tables = self.tables.read().await;
        tables
            .requirements
            .get(&id)
            .cloned()
            .ok_or_else(|| missing("Requirement", id))
    }

    async fn provider(&self, id: i64) -> StormResult<ProviderSource> {
        let tables = self.tables.read().await;
        tables
            .providers
            .get(&id)
            .cloned()
            .ok_or_else(|| missing("Provider", id))
    }

    async fn active_requirements(&self, storm_id: i64) -> StormResult<Vec<CategoryRequirement>> {
        let tables = self.tables.read().await;
        Ok(tables
            .requirements
            .values()
            .filter(|r| r.storm_id == storm_id && r.active)
            .cloned()
            .collect())
    }

    async fn active_providers(&self, requirement_id: i64) -> StormResult<Vec<ProviderSource>> {
        let tables = self.tables.read().await;
        Ok(tables
            .providers
            .values()
            .filter(|p| p.requirement_id == requirement_id && p.active)
            .cloned()
            .collect())
    }

    async fn insert_fetch_log(&self, log: NewFetchLog) -> StormResult<FetchLog> {
        let mut tables = self.tables.write().await;
        let id = tables.logs.keys().next_back().copied().unwrap_or(0) + 1;
        let row = FetchLog {
            id,
            storm_id: log.storm_id,
            requirement_id: log.requirement_id,
            requirement_name: log.requirement_name,
            provider_id: log.provider_id,
            date: log.date,
            success: log.success,
            snapshot: String::new(),
        };
        tables.logs.insert(id, row.clone());
        Ok(row)
    }

    async fn fetch_log(&self, id: i64) -> StormResult<FetchLog> {
        let tables = self.tables.read().await;
        tables.logs.get(&id).cloned().ok_or_else(|| missing("Fetch log", id))
    }

    async fn set_log_snapshot(&self, id: i64, snapshot: &str) -> StormResult<()> {
        let mut tables = self.tables.write().await;
        let log = tables.logs.get_mut(&id).ok_or_else(|| missing("Fetch log", id))?;
        log.snapshot = snapshot.to_string();
        Ok(())
    }

    async fn fetch_logs_for_storm(&self, storm_id: i64) -> StormResult<Vec<FetchLog>> {
        let tables = self.tables.read().await;
        Ok(tables
            .logs
            .values()
            .filter(|l| l.storm_id == storm_id)
            .cloned()
            .collect())
    }

    async fn model_run(&self, id: i64) -> StormResult<ModelRun> {
        let tables = self.tables.read().await;
        tables.runs.get(&id).cloned().ok_or_else(|| missing("Model run", id))
    }

    async fn save_model_run(&self, run: &ModelRun) -> StormResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.runs.contains_key(&run.id) {
            return Err(missing("Model run", run.id));
        }
        tables.runs.insert(run.id, run.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use storm_common::{BoundingBox, TimeWindow};

    fn requirement(id: i64, name: &str) -> CategoryRequirement {
        CategoryRequirement {
            id,
            storm_id: 1,
            name: name.to_string(),
            geo: BoundingBox::new(-97.5, 28.2, -91.0, 33.3),
            window: TimeWindow::new(
                Utc.with_ymd_and_hms(2017, 8, 20, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2017, 9, 3, 0, 0, 0).unwrap(),
            ),
            active: true,
        }
    }

    #[tokio::test]
    async fn test_requirement_names_are_unique() {
        let store = MemoryRecordStore::new();
        store.add_requirement(requirement(1, "Winds")).await.unwrap();
        let err = store.add_requirement(requirement(2, "Winds")).await.unwrap_err();
        assert!(matches!(err, StormError::Validation(_)));
    }

    #[tokio::test]
    async fn test_fetch_log_snapshot_starts_empty() {
        let store = MemoryRecordStore::new();
        let log = store
            .insert_fetch_log(NewFetchLog {
                storm_id: 1,
                requirement_id: 1,
                requirement_name: "Winds".to_string(),
                provider_id: 3,
                date: Utc::now(),
                success: true,
            })
            .await
            .unwrap();
        assert!(!log.is_archived());

        store.set_log_snapshot(log.id, "covered-data-archive/Harvey/Winds-2017-08-30.tgz").await.unwrap();
        assert!(store.fetch_log(log.id).await.unwrap().is_archived());
    }

    #[tokio::test]
    async fn test_missing_records_are_not_found() {
        let store = MemoryRecordStore::new();
        assert!(matches!(store.storm(9).await, Err(StormError::NotFound(_))));
        assert!(matches!(
            store.save_model_run(&ModelRun::new(4, 1)).await,
            Err(StormError::NotFound(_))
        ));
    }
}
