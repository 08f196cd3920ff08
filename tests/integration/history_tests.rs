//! History service integration tests
//!
//! Drive the service directly against the SQLite record store and the mock
//! stores, covering persistence, retention and concurrency behavior.

use std::sync::Arc;

use chrono::Duration;
use fleet_history::{
    config::HistoryConfig,
    db::{HistoryStore, RecordStore, SqliteRecordStore},
    models::{ActionType, FilterCriteria, HistoryQuery, LogEntry, Module, NewEntry},
    services::{export, load_snapshot, ExportFormat, HistoryService, NoEnvironment},
    utils::ManualClock,
};
use serde_json::{json, Value};

use crate::common::{
    fleet_scenario, test_config, test_epoch, FailingRecordStore, SwitchableRecordStore, TestApp,
};

fn scenario_entries() -> Vec<NewEntry> {
    fleet_scenario()
        .into_iter()
        .map(|body| {
            serde_json::from_value::<fleet_history::models::RecordRequest>(body)
                .unwrap()
                .into_new_entry()
                .unwrap()
        })
        .collect()
}

async fn record_scenario(app: &TestApp) {
    for entry in scenario_entries() {
        app.advance(Duration::seconds(1));
        app.history().record(entry).await.unwrap();
    }
}

#[tokio::test]
async fn test_finance_filter_and_page_helper() {
    let app = TestApp::new().await;
    record_scenario(&app).await;

    let criteria = FilterCriteria::default().module(Module::Finance);
    let finance = app.history().filter(&criteria).await;
    assert_eq!(finance.len(), 3);
    assert!(finance
        .windows(2)
        .all(|pair| pair[0].timestamp >= pair[1].timestamp));
    assert!(finance.iter().all(|e| e.module == Module::Finance));

    let page = app.history().page(1, Some(2), &criteria).await;
    assert_eq!(page.entries.len(), 2);
    assert_eq!(page.total, 3);
    assert_eq!(page.pages, 2);
    assert_eq!(page.entries[0], finance[0]);
}

#[tokio::test]
async fn test_entries_survive_reopen_on_sqlite() {
    let config = test_config();
    let pool = fleet_history::db::init_pool(&config.database).await.unwrap();
    let backend: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(pool));
    let clock = Arc::new(ManualClock::new(test_epoch()));

    let first = HistoryService::open_with(
        HistoryStore::new(backend.clone(), "historiqueApp"),
        HistoryConfig::default(),
        clock.clone(),
        Arc::new(NoEnvironment),
    )
    .await;
    let id = first
        .record(NewEntry::new(ActionType::Creation, "chauffeur").utilisateur("awa"))
        .await
        .unwrap();
    drop(first);

    let reopened = HistoryService::open_with(
        HistoryStore::new(backend.clone(), "historiqueApp"),
        HistoryConfig::default(),
        clock,
        Arc::new(NoEnvironment),
    )
    .await;
    let entry = reopened.get(&id).await.unwrap();
    assert_eq!(entry.module, Module::Planning);
    assert_eq!(entry.utilisateur, "awa");

    let raw = backend.load("historiqueApp").await.unwrap().unwrap();
    let document: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(document["version"], 1);
    assert_eq!(document["entries"][0]["id"], id.as_str());
}

#[tokio::test]
async fn test_capacity_evicts_oldest_entries() {
    let mut config = test_config();
    config.history.max_entries = 3;
    let app = TestApp::with_config(config).await;

    let mut ids = Vec::new();
    for i in 0..5 {
        app.advance(Duration::seconds(1));
        ids.push(
            app.history()
                .record(
                    NewEntry::new(ActionType::Validation, "trajet").commentaire(format!("#{}", i)),
                )
                .await
                .unwrap(),
        );
    }

    assert_eq!(app.history().len().await, 3);
    assert!(app.history().get(&ids[0]).await.is_none());
    assert!(app.history().get(&ids[1]).await.is_none());

    let newest: Vec<String> = app
        .history()
        .filter(&FilterCriteria::default())
        .await
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(newest, vec![ids[4].clone(), ids[3].clone(), ids[2].clone()]);
}

#[tokio::test]
async fn test_retention_boundary() {
    let app = TestApp::new().await;
    app.history()
        .record(NewEntry::new(ActionType::Creation, "intervention"))
        .await
        .unwrap();

    app.advance(Duration::days(364));
    assert_eq!(app.history().cleanup().await, 0);
    assert_eq!(app.history().len().await, 1);

    app.advance(Duration::days(2));
    assert_eq!(app.history().cleanup().await, 1);
    assert!(app.history().is_empty().await);
}

#[tokio::test]
async fn test_failing_store_keeps_entries_in_memory() {
    let backend = Arc::new(FailingRecordStore::default());
    let app = TestApp::with_store(test_config(), backend.clone(), None).await;

    let recorded = app
        .history()
        .try_record(NewEntry::new(ActionType::Import, "piece"))
        .await
        .unwrap();
    assert!(!recorded.persisted);
    assert!(app.history().get(&recorded.entry.id).await.is_some());
    assert_eq!(
        backend.attempts.load(std::sync::atomic::Ordering::SeqCst),
        1
    );

    let response = app.get("/api/v1/health/ready").await;
    response.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_store_recovers_after_failure() {
    let backend = Arc::new(SwitchableRecordStore::default());
    let app = TestApp::with_store(test_config(), backend.clone(), None).await;

    backend.set_failing(true);
    let lost = app
        .history()
        .try_record(NewEntry::new(ActionType::Creation, "marque"))
        .await
        .unwrap();
    assert!(!lost.persisted);

    backend.set_failing(false);
    let saved = app
        .history()
        .try_record(NewEntry::new(ActionType::Creation, "modele"))
        .await
        .unwrap();
    assert!(saved.persisted);

    // The next successful write carries the whole in-memory log
    let raw = backend.load("historiqueApp").await.unwrap().unwrap();
    assert!(raw.contains(&lost.entry.id));
    assert!(raw.contains(&saved.entry.id));
}

#[tokio::test]
async fn test_quota_on_sqlite_store() {
    let mut config = test_config();
    config.history.quota_bytes = Some(3_000);
    let app = TestApp::with_config(config).await;

    for i in 0..30 {
        app.advance(Duration::seconds(1));
        let recorded = app
            .history()
            .try_record(
                NewEntry::new(ActionType::Modification, "depense")
                    .donnees(json!({"montant": i * 1000, "motif": "entretien"})),
            )
            .await
            .unwrap();
        assert!(recorded.persisted);
    }

    assert!(app.history().len().await < 30);
}

#[tokio::test]
async fn test_json_export_round_trip() {
    let app = TestApp::new().await;
    record_scenario(&app).await;

    let query = HistoryQuery::new(FilterCriteria::default());
    let document = app
        .history()
        .export(ExportFormat::Json, &query)
        .await
        .unwrap();
    let parsed: Value = serde_json::from_str(&document).unwrap();
    let exported: Vec<LogEntry> = serde_json::from_value(parsed["donnees"].clone()).unwrap();

    assert_eq!(exported, app.history().filter(&FilterCriteria::default()).await);
    assert_eq!(
        document,
        app.history()
            .export(ExportFormat::Json, &query)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_snapshot_export_leaves_store_untouched() {
    let app = TestApp::new().await;
    let expired = app
        .history()
        .record(NewEntry::new(ActionType::Creation, "depense"))
        .await
        .unwrap();
    app.advance(Duration::days(400));
    let recent = app
        .history()
        .record(NewEntry::new(ActionType::Creation, "recette"))
        .await
        .unwrap();

    let backend = app.history().store().backend().clone();
    let before = backend.load("historiqueApp").await.unwrap().unwrap();

    let now = app.history().now();
    let snapshot = load_snapshot(app.history().store(), &app.state.config.history, now).await;
    let query = HistoryQuery::new(FilterCriteria::default());
    let entries = snapshot.sorted(&query);
    let document =
        export::render(ExportFormat::Json, &entries, &query.criteria, ';', now).unwrap();

    let exported: Value = serde_json::from_str(&document).unwrap();
    assert_eq!(exported["meta"]["total"], 1);
    assert_eq!(exported["donnees"][0]["id"], recent.as_str());
    assert!(!document.contains(&expired));

    let after = backend.load("historiqueApp").await.unwrap().unwrap();
    assert_eq!(before, after);
    assert_eq!(app.history().len().await, 2);
}

#[tokio::test]
async fn test_concurrent_records_are_all_kept() {
    let app = TestApp::new().await;
    let history = app.state.history.clone();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let history = history.clone();
            tokio::spawn(async move {
                history
                    .record(
                        NewEntry::new(ActionType::Creation, "trajet")
                            .commentaire(format!("Trajet {}", i)),
                    )
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 20);
    assert_eq!(history.len().await, 20);

    let backend = history.store().backend().clone();
    let raw = backend.load("historiqueApp").await.unwrap().unwrap();
    let document: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(document["entries"].as_array().unwrap().len(), 20);
}
