//! Client behaviour against a live service on a loopback port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use tempfile::TempDir;

use dms::client::{ApiClient, ClientError};
use dms::config::{ClientConfig, Config};
use dms::db::{Database, Store};
use dms::directory::{self, NewPlant, NewUser, PlantPatch};
use dms::fields::{Frequency, InstanceStatus, Role};
use dms::prefs::Prefs;
use dms::server::{build_router, AppState};
use dms::task::{InstanceFilter, InstanceUpdate, NewTaskMaster};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn seeded_store(dir: &TempDir) -> Store {
    let now = Utc::now();
    let mut db = Database::default();
    directory::create_plant(&mut db, NewPlant { name: "Pune Works".into(), code: "PUN".into(), location: None }, now)
        .unwrap();
    directory::create_user(
        &mut db,
        NewUser { email: "admin@plant.example".into(), display_name: "Admin".into(), role: Role::Admin, ..Default::default() },
        now,
    )
    .unwrap();
    directory::create_user(
        &mut db,
        NewUser { email: "op@plant.example".into(), display_name: "Op".into(), plant: Some("PUN".into()), ..Default::default() },
        now,
    )
    .unwrap();
    Store::with_database(&dir.path().join("dms.json"), db)
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn start_service(dir: &TempDir) -> String {
    let mut config = Config::default();
    config.auth.tokens.insert("tok-admin".into(), "admin@plant.example".into());
    config.auth.tokens.insert("tok-op".into(), "op@plant.example".into());
    spawn(build_router(AppState::new(seeded_store(dir), config))).await
}

fn client(base_url: &str) -> ApiClient {
    ApiClient::new(&ClientConfig { base_url: base_url.to_string(), timeout_secs: 5 }).unwrap()
}

fn sweep_master() -> NewTaskMaster {
    NewTaskMaster {
        title: "Sweep floor".into(),
        description: "Bay 2".into(),
        assigned_to: Some(2),
        frequency: Frequency::Daily,
        start_date: d("2024-01-01"),
        estimated_duration: Some(15),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_reads_without_session_are_empty() {
    let dir = tempfile::tempdir().unwrap();
    let api = client(&start_service(&dir).await);

    assert!(api.me().await.unwrap().is_none());
    assert!(api.plants(false).await.unwrap().is_empty());
    let page = api.task_instances(&InstanceFilter::default()).await.unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.pagination.total, 0);
}

#[tokio::test]
async fn test_generate_then_work_own_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let base = start_service(&dir).await;

    let admin = client(&base);
    admin.login("tok-admin");
    let master = admin.create_task_master(&sweep_master()).await.unwrap();
    assert_eq!(master.plant_id, 1);

    let report = admin.generate(Some(d("2024-01-03"))).await.unwrap();
    assert_eq!(report.generated, 3);
    assert_eq!(admin.generate(Some(d("2024-01-03"))).await.unwrap().generated, 0);

    let op = client(&base);
    op.login("tok-op");
    let mine = op.my_tasks(&InstanceFilter::default()).await.unwrap();
    assert_eq!(mine.pagination.total, 3);
    assert!(mine.data.iter().all(|t| t.status == InstanceStatus::Pending));
    assert!(op.cached_reads() > 0);

    let first = mine.data[0].id;
    let start = InstanceUpdate { status: Some(InstanceStatus::InProgress), ..Default::default() };
    op.update_instance(first, &start).await.unwrap();
    assert_eq!(op.cached_reads(), 0);

    let mine = op.my_tasks(&InstanceFilter::default()).await.unwrap();
    let started = mine.data.iter().find(|t| t.id == first).unwrap();
    assert_eq!(started.status, InstanceStatus::InProgress);

    let skip = InstanceUpdate { status: Some(InstanceStatus::Completed), ..Default::default() };
    let err = op.update_instance(mine.data[1].id, &skip).await.unwrap_err();
    match err {
        ClientError::Api { status, body } => {
            assert_eq!(status, 409);
            assert_eq!(body.code, "INVALID_TRANSITION");
        }
        other => panic!("expected 409, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_generation_creates_one_instance() {
    let dir = tempfile::tempdir().unwrap();
    let api = client(&start_service(&dir).await);
    api.login("tok-admin");
    let master = api.create_task_master(&sweep_master()).await.unwrap();

    let day = Some(d("2024-01-01"));
    let (a, b, c, e) = tokio::join!(api.generate(day), api.generate(day), api.generate(day), api.generate(day));
    let total: usize = [a, b, c, e].into_iter().map(|r| r.unwrap().generated).sum();
    assert_eq!(total, 1);

    let page = api.task_instances(&InstanceFilter::default()).await.unwrap();
    let for_day = page
        .data
        .iter()
        .filter(|t| t.task_master_id == master.id && t.scheduled_date == d("2024-01-01"))
        .count();
    assert_eq!(for_day, 1);
    assert_eq!(page.pagination.total, 1);
}

#[tokio::test]
async fn test_rejected_token_expires_session() {
    let dir = tempfile::tempdir().unwrap();
    let api = client(&start_service(&dir).await);
    api.login("tok-revoked");

    let err = api.plants(false).await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    assert!(!api.session().is_logged_in());
    assert_eq!(api.cached_reads(), 0);
}

#[tokio::test]
async fn test_invalid_payloads_never_leave_the_client() {
    // Nothing listens here; a request would fail with a transport error.
    let api = client("http://127.0.0.1:9");
    api.login("tok-admin");

    let mut input = sweep_master();
    input.title = "  ".into();
    let err = api.create_task_master(&input).await.unwrap_err();
    match err {
        ClientError::Validation(v) => assert!(v.details.iter().any(|f| f.field == "title")),
        other => panic!("expected validation error, got {other:?}"),
    }

    let zero = InstanceUpdate { actual_duration: Some(0), ..Default::default() };
    assert!(matches!(api.update_instance(1, &zero).await, Err(ClientError::Validation(_))));
}

#[tokio::test]
async fn test_reads_retry_once_and_mutations_never() {
    let reads = Arc::new(AtomicUsize::new(0));
    let writes = Arc::new(AtomicUsize::new(0));
    let (r, w) = (reads.clone(), writes.clone());
    let router = Router::new().route(
        "/plants",
        get(move || {
            let r = r.clone();
            async move {
                if r.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(StatusCode::SERVICE_UNAVAILABLE)
                } else {
                    Ok(Json(json!([])))
                }
            }
        })
        .post(move || {
            let w = w.clone();
            async move {
                w.fetch_add(1, Ordering::SeqCst);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }),
    );
    let api = client(&spawn(router).await);
    api.login("tok");

    assert!(api.plants(false).await.unwrap().is_empty());
    assert_eq!(reads.load(Ordering::SeqCst), 2);

    let err = api
        .create_plant(&NewPlant { name: "Chakan".into(), code: "CHK".into(), location: None })
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_selected_plant_survives_restart_until_deactivated() {
    let dir = tempfile::tempdir().unwrap();
    let base = start_service(&dir).await;
    let prefs_path = dir.path().join("prefs.json");

    let first = client(&base).with_prefs(prefs_path.clone());
    first.login("tok-admin");
    first.select_plant(Some(1));
    assert_eq!(Prefs::load(&prefs_path).selected_plant_id, Some(1));

    let second = client(&base).with_prefs(prefs_path.clone());
    second.login("tok-admin");
    assert_eq!(second.restore_selected_plant().await.unwrap(), Some(1));
    assert_eq!(second.session().active_plant(), Some(1));

    second
        .update_plant(1, &PlantPatch { is_active: Some(false), ..Default::default() })
        .await
        .unwrap();

    let third = client(&base).with_prefs(prefs_path.clone());
    third.login("tok-admin");
    assert_eq!(third.restore_selected_plant().await.unwrap(), None);
    assert_eq!(Prefs::load(&prefs_path).selected_plant_id, None);
}

#[tokio::test]
async fn test_switching_users_forgets_plant() {
    let dir = tempfile::tempdir().unwrap();
    let base = start_service(&dir).await;
    let prefs_path = dir.path().join("prefs.json");

    let api = client(&base).with_prefs(prefs_path.clone());
    api.login("tok-admin");
    api.select_plant(Some(1));
    api.login("tok-op");

    assert_eq!(api.session().active_plant(), None);
    assert_eq!(Prefs::load(&prefs_path).selected_plant_id, None);
}
