use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{CurrentUser, SharedState};
use crate::db::Page;
use crate::directory::{self, NewPlant, NewUser, Plant, PlantPatch, User, UserPatch};
use crate::errors::DmsError;
use crate::fields::{Module, Permission};
use crate::generator::{self, GenerationReport};
use crate::lifecycle;
use crate::registry;
use crate::settings::{AppSettings, SettingsPatch};
use crate::task::{
    InstanceFilter, InstanceUpdate, MasterFilter, NewOneTimeTask, NewTaskMaster, OneTimeTaskCreated, TaskInstance,
    TaskMaster, TaskMasterPatch,
};

// ── Request payload types ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantQuery {
    #[serde(default)]
    pub active_only: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

// ── Error handling ────────────────────────────────────────────────────

/// `{error: {code, message, details?}}` with its HTTP status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }
}

impl From<DmsError> for ApiError {
    fn from(err: DmsError) -> Self {
        let status = match &err {
            DmsError::Validation(_) | DmsError::PlantMatch(_) => StatusCode::BAD_REQUEST,
            DmsError::NotFound { .. } => StatusCode::NOT_FOUND,
            DmsError::Conflict(_) | DmsError::InvalidTransition { .. } => StatusCode::CONFLICT,
            DmsError::Forbidden(_) => StatusCode::FORBIDDEN,
            DmsError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let details = match &err {
            DmsError::Validation(v) => serde_json::to_value(&v.details).ok(),
            _ => None,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        ApiError {
            status,
            code: err.code(),
            message: err.to_string(),
            details,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.code,
                message: &self.message,
                details: self.details.as_ref(),
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/task-masters", get(list_task_masters).post(create_task_master))
        .route(
            "/task-masters/{id}",
            get(get_task_master).put(update_task_master).delete(delete_task_master),
        )
        .route("/task-instances", get(list_task_instances).post(create_one_time_task))
        .route("/task-instances/my-tasks", get(my_tasks))
        .route("/task-instances/generate", post(generate_instances))
        .route("/task-instances/{id}", put(update_task_instance))
        .route("/plants", get(list_plants).post(create_plant))
        .route("/plants/{id}", put(update_plant))
        .route("/users", get(list_users).post(create_user))
        .route("/users/me", get(current_user))
        .route("/users/{id}", put(update_user))
        .route("/app-settings", get(get_settings).put(update_settings))
        .route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "ok"
}

// ── Task masters ──────────────────────────────────────────────────────

async fn list_task_masters(
    State(state): State<SharedState>,
    user: CurrentUser,
    query: Result<Query<MasterFilter>, QueryRejection>,
) -> Result<Json<Page<TaskMaster>>, ApiError> {
    user.require(Module::TaskMasters, Permission::Read)?;
    let Query(filter) = query?;
    Ok(Json(state.read(|db| registry::list_task_masters(db, &filter))?))
}

async fn get_task_master(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<u64>,
) -> Result<Json<TaskMaster>, ApiError> {
    user.require(Module::TaskMasters, Permission::Read)?;
    Ok(Json(state.read(|db| registry::get_task_master(db, id))??))
}

async fn create_task_master(
    State(state): State<SharedState>,
    user: CurrentUser,
    payload: Result<Json<NewTaskMaster>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(Module::TaskMasters, Permission::Write)?;
    let Json(input) = payload?;
    let created_by = user.0.id;
    let master = state.write(|db| registry::create_task_master(db, input, created_by, Utc::now()))?;
    Ok((StatusCode::CREATED, Json(master)))
}

async fn update_task_master(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<u64>,
    payload: Result<Json<TaskMasterPatch>, JsonRejection>,
) -> Result<Json<TaskMaster>, ApiError> {
    user.require(Module::TaskMasters, Permission::Write)?;
    let Json(patch) = payload?;
    Ok(Json(state.write(|db| registry::update_task_master(db, id, patch, Utc::now()))?))
}

async fn delete_task_master(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    user.require(Module::TaskMasters, Permission::Delete)?;
    state.write(|db| registry::delete_task_master(db, id))?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Task instances ────────────────────────────────────────────────────

async fn list_task_instances(
    State(state): State<SharedState>,
    user: CurrentUser,
    query: Result<Query<InstanceFilter>, QueryRejection>,
) -> Result<Json<Page<TaskInstance>>, ApiError> {
    user.require(Module::TaskInstances, Permission::Read)?;
    let Query(filter) = query?;
    Ok(Json(state.read(|db| lifecycle::list_instances(db, &filter))?))
}

async fn my_tasks(
    State(state): State<SharedState>,
    user: CurrentUser,
    query: Result<Query<InstanceFilter>, QueryRejection>,
) -> Result<Json<Page<TaskInstance>>, ApiError> {
    let Query(filter) = query?;
    let user_id = user.0.id;
    Ok(Json(state.read(|db| lifecycle::my_tasks(db, user_id, &filter))?))
}

async fn create_one_time_task(
    State(state): State<SharedState>,
    user: CurrentUser,
    payload: Result<Json<NewOneTimeTask>, JsonRejection>,
) -> Result<(StatusCode, Json<OneTimeTaskCreated>), ApiError> {
    user.require(Module::TaskMasters, Permission::Write)?;
    let Json(input) = payload?;
    let created_by = user.0.id;
    let created = state.write(|db| generator::create_one_time_task(db, input, created_by, Utc::now()))?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_task_instance(
    State(state): State<SharedState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<u64>,
    payload: Result<Json<InstanceUpdate>, JsonRejection>,
) -> Result<Json<TaskInstance>, ApiError> {
    let Json(update) = payload?;
    Ok(Json(state.write(|db| lifecycle::update_instance(db, id, update, &actor, Utc::now()))?))
}

async fn generate_instances(
    State(state): State<SharedState>,
    user: CurrentUser,
    body: Bytes,
) -> Result<Json<GenerationReport>, ApiError> {
    user.require(Module::TaskMasters, Permission::Write)?;
    let request: GenerateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        GenerateRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(format!("Invalid generate request: {e}")))?
    };
    let today = today();
    let as_of = generator::check_as_of(request.as_of.unwrap_or(today), today).map_err(DmsError::from)?;
    let opts = state.config.generation.options();
    let report = state.write(|db| Ok(generator::generate_due_instances(db, as_of, Utc::now(), opts)))?;
    Ok(Json(report))
}

// ── Directory ─────────────────────────────────────────────────────────

async fn list_plants(
    State(state): State<SharedState>,
    user: CurrentUser,
    query: Result<Query<PlantQuery>, QueryRejection>,
) -> Result<Json<Vec<Plant>>, ApiError> {
    user.require(Module::Plants, Permission::Read)?;
    let Query(q) = query?;
    Ok(Json(state.read(|db| directory::list_plants(db, q.active_only.unwrap_or(false)))?))
}

async fn create_plant(
    State(state): State<SharedState>,
    user: CurrentUser,
    payload: Result<Json<NewPlant>, JsonRejection>,
) -> Result<(StatusCode, Json<Plant>), ApiError> {
    user.require(Module::Plants, Permission::Write)?;
    let Json(input) = payload?;
    let plant = state.write(|db| directory::create_plant(db, input, Utc::now()))?;
    Ok((StatusCode::CREATED, Json(plant)))
}

async fn update_plant(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<u64>,
    payload: Result<Json<PlantPatch>, JsonRejection>,
) -> Result<Json<Plant>, ApiError> {
    user.require(Module::Plants, Permission::Write)?;
    let Json(patch) = payload?;
    Ok(Json(state.write(|db| directory::update_plant(db, id, patch))?))
}

async fn list_users(
    State(state): State<SharedState>,
    user: CurrentUser,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<Page<User>>, ApiError> {
    user.require(Module::Users, Permission::Read)?;
    let Query(q) = query?;
    Ok(Json(state.read(|db| directory::list_users(db, q.page, q.limit))?))
}

async fn current_user(user: CurrentUser) -> Json<User> {
    Json(user.0)
}

async fn create_user(
    State(state): State<SharedState>,
    user: CurrentUser,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    user.require(Module::Users, Permission::Write)?;
    let Json(input) = payload?;
    let created = state.write(|db| directory::create_user(db, input, Utc::now()))?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_user(
    State(state): State<SharedState>,
    user: CurrentUser,
    Path(id): Path<u64>,
    payload: Result<Json<UserPatch>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    user.require(Module::Users, Permission::Write)?;
    let Json(patch) = payload?;
    Ok(Json(state.write(|db| directory::update_user(db, id, patch))?))
}

// ── Settings ──────────────────────────────────────────────────────────

async fn get_settings(State(state): State<SharedState>, _user: CurrentUser) -> Result<Json<AppSettings>, ApiError> {
    Ok(Json(state.read(|db| db.settings.clone())?))
}

async fn update_settings(
    State(state): State<SharedState>,
    user: CurrentUser,
    payload: Result<Json<SettingsPatch>, JsonRejection>,
) -> Result<Json<AppSettings>, ApiError> {
    user.require(Module::Settings, Permission::Write)?;
    let Json(patch) = payload?;
    let settings = state.write(|db| {
        db.settings.apply(patch)?;
        Ok(db.settings.clone())
    })?;
    Ok(Json(settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{Database, Store};
    use crate::fields::Role;
    use crate::server::{build_router, AppState};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app(dir: &tempfile::TempDir) -> Router {
        let now = Utc::now();
        let mut db = Database::default();
        directory::create_plant(&mut db, NewPlant { name: "Pune Works".into(), code: "pun".into(), location: None }, now)
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

        let mut config = Config::default();
        config.auth.tokens.insert("tok-admin".into(), "admin@plant.example".into());
        config.auth.tokens.insert("tok-op".into(), "op@plant.example".into());
        config.auth.tokens.insert("tok-ghost".into(), "ghost@plant.example".into());
        let store = Store::with_database(&dir.path().join("dms.json"), db);
        build_router(AppState::new(store, config))
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn sweep_master() -> Value {
        json!({
            "title": "Sweep floor",
            "description": "Bay 2",
            "assignedTo": 2,
            "frequency": "daily",
            "startDate": "2024-01-01",
            "estimatedDuration": 15
        })
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let dir = tempfile::tempdir().unwrap();
        let response = test_app(&dir).oneshot(request("GET", "/health", None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_missing_and_unknown_tokens_are_401() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        for token in [None, Some("nope"), Some("tok-ghost")] {
            let response = app.clone().oneshot(request("GET", "/users/me", token, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(body_json(response).await["error"]["code"], "UNAUTHORIZED");
        }
    }

    #[tokio::test]
    async fn test_create_master_derives_plant() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        let response = app
            .clone()
            .oneshot(request("POST", "/task-masters", Some("tok-admin"), Some(sweep_master())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let master = body_json(response).await;
        assert_eq!(master["plantId"], 1);
        assert_eq!(master["assignedBy"], 1);
        assert_eq!(master["taskType"], "recurring");

        let response = app
            .oneshot(request("GET", "/task-masters?plantId=1&frequency=daily", Some("tok-admin"), None))
            .await
            .unwrap();
        let page = body_json(response).await;
        assert_eq!(page["pagination"]["total"], 1);
        assert_eq!(page["pagination"]["limit"], 20);
    }

    #[tokio::test]
    async fn test_validation_error_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = sweep_master();
        body["frequency"] = json!("custom");
        body["estimatedDuration"] = json!(0);
        let response = test_app(&dir)
            .oneshot(request("POST", "/task-masters", Some("tok-admin"), Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let err = body_json(response).await;
        assert_eq!(err["error"]["code"], "VALIDATION_ERROR");
        let fields: Vec<&str> = err["error"]["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["field"].as_str().unwrap())
            .collect();
        assert!(fields.contains(&"estimatedDuration"));
        assert!(fields.contains(&"frequencyValue"));
    }

    #[tokio::test]
    async fn test_employee_cannot_create_master() {
        let dir = tempfile::tempdir().unwrap();
        let response = test_app(&dir)
            .oneshot(request("POST", "/task-masters", Some("tok-op"), Some(sweep_master())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_generate_is_idempotent_and_lifecycle_flows() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        app.clone()
            .oneshot(request("POST", "/task-masters", Some("tok-admin"), Some(sweep_master())))
            .await
            .unwrap();

        let as_of = json!({"asOf": "2024-01-01"});
        for expected in [1, 0] {
            let response = app
                .clone()
                .oneshot(request("POST", "/task-instances/generate", Some("tok-admin"), Some(as_of.clone())))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await, json!({"generated": expected, "errors": 0}));
        }

        let response = app
            .clone()
            .oneshot(request("GET", "/task-instances/my-tasks", Some("tok-op"), None))
            .await
            .unwrap();
        let page = body_json(response).await;
        assert_eq!(page["data"].as_array().unwrap().len(), 1);
        let id = page["data"][0]["id"].as_u64().unwrap();

        let jump = json!({"status": "completed"});
        let response = app
            .clone()
            .oneshot(request("PUT", &format!("/task-instances/{id}"), Some("tok-op"), Some(jump)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"]["code"], "INVALID_TRANSITION");

        for status in ["in-progress", "completed"] {
            let response = app
                .clone()
                .oneshot(request("PUT", &format!("/task-instances/{id}"), Some("tok-op"), Some(json!({"status": status}))))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let saved = Database::load(&dir.path().join("dms.json")).unwrap();
        assert_eq!(saved.task_instances[0].status, crate::fields::InstanceStatus::Completed);
        assert!(saved.task_instances[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn test_generate_rejects_future_as_of() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        app.clone()
            .oneshot(request("POST", "/task-masters", Some("tok-admin"), Some(sweep_master())))
            .await
            .unwrap();

        let ahead = (today() + chrono::Days::new(1)).to_string();
        let response = app
            .clone()
            .oneshot(request("POST", "/task-instances/generate", Some("tok-admin"), Some(json!({"asOf": ahead}))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["details"][0]["field"], "asOf");

        let saved = Database::load(&dir.path().join("dms.json")).unwrap();
        assert!(saved.task_instances.is_empty());
        assert_eq!(saved.task_masters[0].last_generated, None);
    }

    #[tokio::test]
    async fn test_one_time_task_returns_both_records() {
        let dir = tempfile::tempdir().unwrap();
        let body = json!({
            "title": "Fire drill",
            "description": "Whole plant",
            "assignedTo": 2,
            "scheduledDate": "2024-03-01",
            "dueDate": "2024-03-02",
            "estimatedDuration": 60
        });
        let response = test_app(&dir)
            .oneshot(request("POST", "/task-instances", Some("tok-admin"), Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["taskMaster"]["isActive"], false);
        assert_eq!(created["taskMaster"]["taskType"], "one-time");
        assert_eq!(created["taskInstance"]["dueDate"], "2024-03-02");
    }

    #[tokio::test]
    async fn test_unknown_master_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let response = test_app(&dir)
            .oneshot(request("GET", "/task-masters/99", Some("tok-admin"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_settings_update_requires_admin() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        let patch = json!({"primaryColor": "#00aa00"});
        let response = app
            .clone()
            .oneshot(request("PUT", "/app-settings", Some("tok-op"), Some(patch.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(request("PUT", "/app-settings", Some("tok-admin"), Some(patch)))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["primaryColor"], "#00AA00");
    }
}
