//! API integration tests
//!
//! Tests the API endpoints with real HTTP requests against a test router.

use axum::{body::Body, http::Request};
use serde_json::{json, Value};

use crate::common::{
    fleet_scenario, refs, user_with_password, EntryFactory, TestApp,
};

async fn app_with_scenario() -> TestApp {
    let app = TestApp::new().await;
    for body in fleet_scenario() {
        app.record(body).await;
    }
    app
}

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/health").await;

    response.assert_ok();

    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_detailed_health_endpoint() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/health/detailed").await;

    response.assert_ok();

    let json: Value = response.json();
    assert_eq!(json["components"]["database"]["status"], "healthy");
    assert_eq!(json["components"]["record_store"]["status"], "healthy");
    assert_eq!(json["entries"], 0);
}

#[tokio::test]
async fn test_liveness_and_readiness_probes() {
    let app = TestApp::new().await;
    app.get("/api/v1/health/live").await.assert_ok();
    app.get("/api/v1/health/ready").await.assert_ok();
}

#[tokio::test]
async fn test_record_structured_entry() {
    let app = TestApp::new().await;
    let response = app
        .post_json(
            "/api/v1/history",
            json!({
                "type": "creation",
                "entite": "recette",
                "donnees": {"montant": 1200},
                "utilisateur": "awa",
                "commentaire": "Paiement client"
            }),
        )
        .await;

    response.assert_created();
    let json: Value = response.json();
    let id = json["id"].as_str().unwrap();
    assert!(id.starts_with("hist_"));
    assert_eq!(json["persisted"], true);
    assert_eq!(json["entry"]["module"], "finance");
    assert_eq!(json["entry"]["timestamp"], "2024-03-01T08:00:00.000Z");
    assert!(json["entry"]["idReference"]
        .as_str()
        .unwrap()
        .starts_with("ref_"));

    let fetched = app.get(&format!("/api/v1/history/{}", id)).await;
    fetched.assert_ok();
    assert_eq!(fetched.json::<Value>()["commentaire"], "Paiement client");
}

#[tokio::test]
async fn test_record_positional_entry() {
    let app = TestApp::new().await;
    let response = app
        .post_json(
            "/api/v1/history",
            json!(["update", "vehicule", {"plaque": "DK-1234-A"}, "moussa"]),
        )
        .await;

    response.assert_created();
    let entry = &response.json::<Value>()["entry"];
    assert_eq!(entry["type"], "modification");
    assert_eq!(entry["module"], "vehicules");
    assert_eq!(entry["utilisateur"], "moussa");
    assert_eq!(entry["commentaire"], "");
}

#[tokio::test]
async fn test_record_defaults_user_to_system() {
    let app = TestApp::new().await;
    let entry = app
        .record(json!({"type": "connexion", "entite": "utilisateur"}))
        .await;
    assert_eq!(entry["utilisateur"], "system");
    assert_eq!(entry["donnees"], json!({}));
}

#[tokio::test]
async fn test_record_rejects_invalid_requests() {
    let app = TestApp::new().await;

    let cases = [
        json!({"type": "creation"}),
        json!({"type": "", "entite": "recette"}),
        json!({"type": "renommage", "entite": "recette"}),
        json!({"type": "creation", "entite": "recette", "module": "comptabilite"}),
        json!({"type": "creation", "entite": "recette", "commentaire": "x".repeat(2001)}),
        json!([]),
        json!(["creation", 42]),
    ];

    for body in cases {
        let response = app.post_json("/api/v1/history", body.clone()).await;
        assert_eq!(
            response.status,
            axum::http::StatusCode::UNPROCESSABLE_ENTITY,
            "body {} gave {}",
            body,
            response.text()
        );
        let json: Value = response.json();
        assert_eq!(json["error"], "validation_error");
    }

    assert!(app.history().is_empty().await);
}

#[tokio::test]
async fn test_password_is_masked_in_stored_entry() {
    let app = TestApp::new().await;
    let entry = app.record(user_with_password()).await;

    assert_eq!(entry["donnees"]["password"], "*** MASQUÉ ***");
    assert_eq!(entry["donnees"]["profil"]["apiKey"], "*** MASQUÉ ***");
    assert_eq!(entry["donnees"]["profil"]["langue"], "fr");
    assert_eq!(entry["donnees"]["nom"], "Sow");

    let export = app.get("/api/v1/history/export?format=json").await;
    assert!(!export.text().contains("s3cret!"));
}

#[tokio::test]
async fn test_request_metadata_is_captured() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/history")
        .header("Content-Type", "application/json")
        .header("X-Forwarded-For", "196.1.95.20, 10.0.0.1")
        .header(
            "User-Agent",
            "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
        )
        .header("X-Screen-Resolution", "1920x1080x24")
        .body(Body::from(
            json!({"type": "connexion", "entite": "utilisateur"}).to_string(),
        ))
        .unwrap();

    let response = app.request(request).await;
    response.assert_created();

    let entry = &response.json::<Value>()["entry"];
    assert_eq!(entry["ip"], "196.1.95.20");
    assert_eq!(entry["navigateur"]["name"], "Firefox");
    assert_eq!(entry["navigateur"]["version"], "121");
    assert_eq!(entry["resolution"]["width"], 1920);
    assert_eq!(entry["resolution"]["colorDepth"], 24);
}

#[tokio::test]
async fn test_get_unknown_entry_returns_not_found() {
    let app = TestApp::new().await;
    let response = app.get("/api/v1/history/hist_0_missing").await;
    response.assert_not_found();
    assert_eq!(response.json::<Value>()["error"], "not_found");
}

#[tokio::test]
async fn test_paginated_listing_by_module() {
    let app = app_with_scenario().await;

    let response = app.get("/api/v1/history?module=finance&limit=2").await;
    response.assert_ok();
    let page: Value = response.json();
    assert_eq!(page["total"], 3);
    assert_eq!(page["pages"], 2);
    assert_eq!(page["page"], 1);
    let entries = page["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["commentaire"], "Correction du montant");
    assert_eq!(entries[1]["commentaire"], "Plein gasoil");

    let second: Value = app
        .get("/api/v1/history?module=finance&limit=2&page=2")
        .await
        .json();
    assert_eq!(second["entries"].as_array().unwrap().len(), 1);
    assert_eq!(second["entries"][0]["commentaire"], "Recette course Dakar-Thiès");
}

#[tokio::test]
async fn test_listing_accepts_taille_page() {
    let app = app_with_scenario().await;

    let page: Value = app
        .get("/api/v1/history?module=finance&taillePage=2&page=2")
        .await
        .json();
    assert_eq!(page["limit"], 2);
    assert_eq!(page["pages"], 2);
    assert_eq!(page["entries"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_listing_clamps_page_and_limit() {
    let app = app_with_scenario().await;

    let page: Value = app.get("/api/v1/history?page=99&limit=1000").await.json();
    assert_eq!(page["limit"], 100);
    assert_eq!(page["page"], 1);
    assert_eq!(page["entries"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_listing_ignores_blank_parameters_and_sorts() {
    let app = app_with_scenario().await;

    let page: Value = app
        .get("/api/v1/history?module=&type=&triPar=utilisateur&ordreTri=asc")
        .await
        .json();
    assert_eq!(page["total"], 5);
    assert_eq!(page["entries"][0]["utilisateur"], "awa");
    assert_eq!(page["entries"][4]["utilisateur"], "moussa");
}

#[tokio::test]
async fn test_listing_rejects_unknown_module() {
    let app = TestApp::new().await;
    app.get("/api/v1/history?module=comptabilite")
        .await
        .assert_bad_request();
}

#[tokio::test]
async fn test_filter_endpoint() {
    let app = app_with_scenario().await;

    let entries: Vec<Value> = app.get("/api/v1/history/filter?module=finance").await.json();
    assert_eq!(entries.len(), 3);
    let timestamps: Vec<&str> = entries
        .iter()
        .map(|e| e["timestamp"].as_str().unwrap())
        .collect();
    let mut sorted = timestamps.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(timestamps, sorted);

    let searched: Vec<Value> = app
        .get("/api/v1/history/filter?recherche=GASOIL")
        .await
        .json();
    assert_eq!(searched.len(), 1);
    assert_eq!(searched[0]["entite"], "depense");

    let by_user: Vec<Value> = app
        .get("/api/v1/history/filter?utilisateur=moussa&type=modification")
        .await
        .json();
    assert_eq!(by_user.len(), 1);
}

#[tokio::test]
async fn test_filter_by_date_range() {
    let app = app_with_scenario().await;

    let same_day: Vec<Value> = app
        .get("/api/v1/history/filter?dateDebut=2024-03-01&dateFin=2024-03-01")
        .await
        .json();
    assert_eq!(same_day.len(), 5);

    let later: Vec<Value> = app
        .get("/api/v1/history/filter?dateDebut=2024-03-02")
        .await
        .json();
    assert!(later.is_empty());

    app.get("/api/v1/history/filter?dateDebut=yesterday")
        .await
        .assert_bad_request();
}

#[tokio::test]
async fn test_entries_by_reference_oldest_first() {
    let app = app_with_scenario().await;

    let response = app
        .get(&format!("/api/v1/history/reference/{}", refs::RECETTE_REF))
        .await;
    response.assert_ok();
    let entries: Vec<Value> = response.json();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["type"], "creation");
    assert_eq!(entries[1]["type"], "modification");

    app.get("/api/v1/history/reference/bad%20ref")
        .await
        .assert_bad_request();
}

#[tokio::test]
async fn test_csv_export_headers_and_body() {
    let app = app_with_scenario().await;

    let response = app
        .get("/api/v1/history/export?format=csv&module=vehicules")
        .await;
    response.assert_ok();
    assert_eq!(
        response.header("content-type"),
        Some("text/csv; charset=utf-8")
    );
    assert_eq!(
        response.header("content-disposition"),
        Some("attachment; filename=\"historique_2024-03-01.csv\"")
    );

    let text = response.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "id;timestamp;type;entite;utilisateur;commentaire;donnees"
    );
    assert!(lines[1].contains("\"Relevé kilométrique\""));
}

#[tokio::test]
async fn test_json_export_document() {
    let app = app_with_scenario().await;

    let response = app
        .get("/api/v1/history/export?format=json&module=finance")
        .await;
    response.assert_ok();
    assert_eq!(
        response.header("content-type"),
        Some("application/json; charset=utf-8")
    );

    let document: Value = response.json();
    assert_eq!(document["meta"]["total"], 3);
    assert_eq!(document["meta"]["criteres"], json!({"module": "finance"}));
    assert_eq!(document["meta"]["dateExport"], "2024-03-01T08:00:05.000Z");

    let filtered: Value = app.get("/api/v1/history/filter?module=finance").await.json();
    assert_eq!(document["donnees"], filtered);
}

#[tokio::test]
async fn test_export_of_empty_history() {
    let app = TestApp::new().await;

    let csv = app.get("/api/v1/history/export?format=csv").await;
    csv.assert_ok();
    assert!(csv.text().is_empty());

    let document: Value = app.get("/api/v1/history/export").await.json();
    assert_eq!(document["donnees"], json!([]));
    assert_eq!(document["meta"]["total"], 0);
}

#[tokio::test]
async fn test_export_rejects_unknown_format() {
    let app = TestApp::new().await;
    app.get("/api/v1/history/export?format=xml")
        .await
        .assert_bad_request();
}

#[tokio::test]
async fn test_statistics_and_facets() {
    let app = app_with_scenario().await;

    let stats: Value = app.get("/api/v1/history/stats").await.json();
    assert_eq!(stats["total"], 5);
    assert_eq!(stats["total30Jours"], 5);
    assert_eq!(stats["actionsParType"]["creation"], 3);
    assert_eq!(stats["actionsParType"]["modification"], 2);
    assert_eq!(stats["actionsParModule"]["finance"], 3);
    assert_eq!(stats["actionsParModule"]["vehicules"], 2);
    assert_eq!(stats["actionsParUtilisateur"]["awa"], 2);
    assert_eq!(stats["actionsParJour"]["2024-03-01"], 5);
    assert_eq!(stats["actionsParJour"].as_object().unwrap().len(), 30);

    let facets: Value = app.get("/api/v1/history/facets").await.json();
    assert_eq!(facets["types"], json!(["creation", "modification"]));
    assert_eq!(facets["modules"], json!(["finance", "vehicules"]));
    assert_eq!(facets["utilisateurs"], json!(["awa", "fatou", "moussa"]));
}

#[tokio::test]
async fn test_clear_requires_confirmation() {
    let app = app_with_scenario().await;

    app.delete("/api/v1/history").await.assert_bad_request();
    app.delete("/api/v1/history?confirm=false")
        .await
        .assert_bad_request();
    assert_eq!(app.history().len().await, 5);

    let response = app.delete("/api/v1/history?confirm=true").await;
    response.assert_ok();
    assert_eq!(response.json::<Value>()["persisted"], true);

    let page: Value = app.get("/api/v1/history").await.json();
    assert_eq!(page["total"], 0);
    assert_eq!(page["pages"], 0);
}

#[tokio::test]
async fn test_cleanup_endpoint_removes_expired_entries() {
    let app = app_with_scenario().await;

    let response = app.post("/api/v1/history/cleanup").await;
    response.assert_ok();
    assert_eq!(response.json::<Value>()["removed"], 0);

    app.advance(chrono::Duration::days(366));
    app.record(json!({"type": "connexion", "entite": "utilisateur"}))
        .await;

    let response = app.post("/api/v1/history/cleanup").await;
    let json: Value = response.json();
    assert_eq!(json["removed"], 5);
    assert_eq!(json["retentionDays"], 365);
    assert_eq!(app.history().len().await, 1);
}

#[tokio::test]
async fn test_random_entries_are_all_listed() {
    let app = TestApp::new().await;
    let factory = EntryFactory::new();
    for body in factory.batch(25) {
        app.record(body).await;
    }

    let page: Value = app.get("/api/v1/history?limit=10&page=3").await.json();
    assert_eq!(page["total"], 25);
    assert_eq!(page["pages"], 3);
    assert_eq!(page["entries"].as_array().unwrap().len(), 5);
}
