//! 読み込み処理の結合テスト
//!
//! モックサーバーに対して、利用者特定からキャッシュ書き込みまでの流れを検証

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use erasure_reports::api::HttpReportsApi;
use erasure_reports::app::load_with_preview;
use erasure_reports::identity::IdentityChain;
use erasure_reports::loader::{LoadErrorKind, LoadOutcome, LoadStatus, ReportLoader, EMPTY_NOTICE, REPORTS_CACHE_KEY};
use erasure_reports::storage::{PROFILE_KEY, TOKEN_KEY};
use erasure_reports_common::{CacheStore, KeyValueStorage, ManualClock, MemoryStorage, NormalizedReportRow, DEFAULT_CACHE_TTL};
use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;

const T0: i64 = 1_710_460_800_000;

type TestLoader = ReportLoader<HttpReportsApi, Arc<MemoryStorage>, Arc<ManualClock>>;

fn loader_for(server: &MockServer, storage: Arc<MemoryStorage>, token: Option<String>) -> TestLoader {
    let api = HttpReportsApi::new(&server.url("/api"), token.clone()).expect("valid base url");
    let cache = CacheStore::with_clock(storage.clone(), Arc::new(ManualClock::new(T0)), "test", DEFAULT_CACHE_TTL);
    ReportLoader::new(api, cache, IdentityChain::standard(storage, token))
}

fn token_with(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig", header, payload)
}

fn storage_with_profile(email: &str) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .set_item(PROFILE_KEY, &json!({ "email": email }).to_string())
        .unwrap();
    storage
}

/// プロフィールのメールアドレスで一覧を取得し、キャッシュに書き込む
#[tokio::test]
async fn test_load_with_stored_profile() {
    let server = MockServer::start_async().await;
    let listing = server.mock(|when, then| {
        when.method(GET)
            .path("/api/reports")
            .query_param("email", "ops@example.com");
        then.status(200).json_body(json!({
            "success": true,
            "data": [
                { "id": 7, "report_details_json": "{\"report_id\":\"ER-7\",\"datetime\":\"2024-03-01T10:00:00Z\",\"erasure_log\":[{},{}]}" },
                { "id": "8", "report_details_json": { "datetime": "2024-03-02", "status": "FAILED" } }
            ]
        }));
    });

    let loader = loader_for(&server, storage_with_profile("ops@example.com"), None);
    let outcome = loader.load().await.unwrap();
    listing.assert();

    assert_eq!(outcome, LoadOutcome::Loaded { count: 2 });
    let rows = loader.rows();
    assert_eq!(rows[0].id, "ER-7");
    assert_eq!(rows[0].devices, 2);
    assert_eq!(rows[0].date, "2024-03-01");
    assert_eq!(rows[1].id, "8");
    assert_eq!(rows[1].status, "failed");

    let cached: Vec<NormalizedReportRow> = loader.cache().get(REPORTS_CACHE_KEY).unwrap();
    assert_eq!(cached.len(), 2);
}

/// プロフィールがなければトークンのクレームから特定する
#[tokio::test]
async fn test_identity_falls_back_to_token_claim() {
    let server = MockServer::start_async().await;
    let token = token_with(json!({ "user_email": "claim@example.com" }));
    let listing = server.mock(|when, then| {
        when.method(GET)
            .path("/api/reports")
            .query_param("email", "claim@example.com")
            .header("authorization", format!("Bearer {}", token));
        then.status(200).json_body(json!({ "success": true, "data": [] }));
    });

    let storage = Arc::new(MemoryStorage::new());
    storage.set_item(TOKEN_KEY, &token).unwrap();
    let loader = loader_for(&server, storage, Some(token.clone()));

    let outcome = loader.load().await.unwrap();
    listing.assert();
    assert_eq!(
        outcome,
        LoadOutcome::Empty {
            notice: EMPTY_NOTICE.to_string()
        }
    );
}

/// 利用者を特定できなければ通信しない
#[tokio::test]
async fn test_unknown_identity_makes_no_request() {
    let server = MockServer::start_async().await;
    let listing = server.mock(|when, then| {
        when.method(GET).path("/api/reports");
        then.status(200).json_body(json!({ "success": true, "data": [] }));
    });

    let loader = loader_for(&server, Arc::new(MemoryStorage::new()), None);
    assert!(loader.load().await.is_err());
    listing.assert_hits(0);

    let snapshot = loader.snapshot();
    assert!(matches!(
        snapshot.status,
        LoadStatus::Error {
            kind: LoadErrorKind::Identity,
            ..
        }
    ));
}

/// `success: false` はAPIエラーとして扱い、行をクリアする
#[tokio::test]
async fn test_unsuccessful_listing_clears_rows() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/api/reports");
        then.status(200)
            .json_body(json!({ "success": false, "error": "account locked" }));
    });

    let storage = storage_with_profile("ops@example.com");
    let loader = loader_for(&server, storage, None);
    loader.cache().set(
        REPORTS_CACHE_KEY,
        &vec![NormalizedReportRow {
            id: "CACHED".into(),
            ..Default::default()
        }],
    );

    let err = loader.load().await.unwrap_err();
    assert!(err.to_string().contains("account locked"));

    let snapshot = loader.snapshot();
    assert!(snapshot.rows.is_empty());
    assert!(matches!(
        snapshot.status,
        LoadStatus::Error {
            kind: LoadErrorKind::Transport,
            ..
        }
    ));
}

/// キャッシュがあれば通信完了前に通知される
#[tokio::test]
async fn test_preview_reports_cached_rows_first() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/api/reports");
        then.status(200).json_body(json!({
            "success": true,
            "data": { "id": "NET-1", "report_details_json": null }
        }));
    });

    let loader = loader_for(&server, storage_with_profile("ops@example.com"), None);
    loader.cache().set(
        REPORTS_CACHE_KEY,
        &vec![
            NormalizedReportRow {
                id: "CACHED-1".into(),
                ..Default::default()
            },
            NormalizedReportRow {
                id: "CACHED-2".into(),
                ..Default::default()
            },
        ],
    );

    let mut previews = Vec::new();
    let outcome = load_with_preview(&loader, |snapshot| previews.push(snapshot.rows.len()))
        .await
        .unwrap();

    assert_eq!(previews, vec![2]);
    assert_eq!(outcome, LoadOutcome::Loaded { count: 1 });
    assert_eq!(loader.rows()[0].id, "NET-1");
    assert!(!loader.snapshot().from_cache);
}

/// キャッシュがなければ通知されない
#[tokio::test]
async fn test_preview_is_silent_without_cache() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/api/reports");
        then.status(503);
    });

    let loader = loader_for(&server, storage_with_profile("ops@example.com"), None);
    let mut previews = 0;
    let result = load_with_preview(&loader, |_| previews += 1).await;

    assert!(result.unwrap_err().is_transport());
    assert_eq!(previews, 0);
}
