//! Typed REST client for the DMS service.
//!
//! Policies carried here rather than at each call site:
//!
//! - reads are cached per session epoch and retried once on transport errors
//!   or 5xx; mutations are never retried
//! - a 401 or 404 while logged out resolves to an empty result
//! - a 401 while logged in expires the session and clears the cache
//! - mutations evict the cached reads of the resources they touch
//! - create payloads are validated locally before any request is made

use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{ReadCache, SessionContext};
use crate::config::ClientConfig;
use crate::db::Page;
use crate::directory::{NewPlant, NewUser, Plant, PlantPatch, User, UserPatch};
use crate::errors::ValidationError;
use crate::generator::GenerationReport;
use crate::prefs::Prefs;
use crate::settings::{AppSettings, SettingsPatch};
use crate::task::{
    InstanceFilter, InstanceUpdate, MasterFilter, NewOneTimeTask, NewTaskMaster, OneTimeTaskCreated, TaskInstance,
    TaskMaster, TaskMasterPatch,
};

const READ_RETRIES: u32 = 1;

const TASK_MASTERS: &str = "/task-masters";
const TASK_INSTANCES: &str = "/task-instances";
const PLANTS: &str = "/plants";
const USERS: &str = "/users";
const APP_SETTINGS: &str = "/app-settings";

/// The `error` object of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

impl ApiErrorBody {
    /// `details` as display lines, whether the server sent a string, a list of
    /// `{field, message}` objects, or a plain object.
    pub fn detail_lines(&self) -> Vec<String> {
        fn scalar(v: &Value) -> String {
            match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        }
        match &self.details {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match (item.get("field"), item.get("message")) {
                    (Some(f), Some(m)) => format!("{}: {}", scalar(f), scalar(m)),
                    _ => scalar(item),
                })
                .collect(),
            Some(Value::Object(map)) => map.iter().map(|(k, v)| format!("{k}: {}", scalar(v))).collect(),
            Some(other) => vec![scalar(other)],
        }
    }
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self.detail_lines();
        if lines.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} ({})", self.message, lines.join("; "))
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Session expired; log in again")]
    SessionExpired,

    #[error("{body} [HTTP {status}]")]
    Api { status: u16, body: ApiErrorBody },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
}

fn encode<T: Serialize + ?Sized>(body: &T) -> Result<Value, ClientError> {
    serde_json::to_value(body).map_err(|e| ClientError::Decode(e.to_string()))
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Mutex<SessionContext>,
    cache: Mutex<ReadCache>,
    prefs_path: Option<PathBuf>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ClientError::Transport)?;
        Ok(ApiClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session: Mutex::new(SessionContext::default()),
            cache: Mutex::new(ReadCache::default()),
            prefs_path: None,
        })
    }

    /// Persist the selected plant to `path`.
    pub fn with_prefs(mut self, path: PathBuf) -> Self {
        self.prefs_path = Some(path);
        self
    }

    // ── Session ───────────────────────────────────────────────────────

    pub fn session(&self) -> SessionContext {
        lock(&self.session).clone()
    }

    pub fn cached_reads(&self) -> usize {
        lock(&self.cache).len()
    }

    /// Start a session or switch to another user.
    pub fn login(&self, token: &str) {
        let switching = lock(&self.session).is_logged_in();
        lock(&self.session).login(token);
        lock(&self.cache).clear();
        if switching {
            self.write_prefs(Prefs::default());
        }
        info!(switching, "session started");
    }

    pub fn logout(&self) {
        lock(&self.session).logout();
        lock(&self.cache).clear();
        self.write_prefs(Prefs::default());
        info!("session ended");
    }

    fn expire_session(&self) {
        lock(&self.session).logout();
        lock(&self.cache).clear();
        warn!("session expired");
    }

    /// Make `plant` the active plant and remember it.
    pub fn select_plant(&self, plant: Option<u64>) {
        if lock(&self.session).set_active_plant(plant) {
            lock(&self.cache).clear();
        }
        self.write_prefs(Prefs {
            selected_plant_id: plant,
        });
    }

    /// Re-apply the remembered plant if it still exists and is active;
    /// otherwise forget it.
    pub async fn restore_selected_plant(&self) -> Result<Option<u64>, ClientError> {
        let Some(path) = &self.prefs_path else {
            return Ok(None);
        };
        let prefs = Prefs::load(path);
        if prefs.selected_plant_id.is_none() {
            return Ok(None);
        }
        let plants = self.plants(true).await?;
        let restored = prefs.restore_plant(&plants);
        if restored.is_none() {
            debug!(plant_id = ?prefs.selected_plant_id, "remembered plant is gone or inactive");
        }
        self.select_plant(restored);
        Ok(restored)
    }

    fn write_prefs(&self, prefs: Prefs) {
        if let Some(path) = &self.prefs_path {
            if let Err(e) = prefs.save(path) {
                warn!(error = %e, "could not save preferences");
            }
        }
    }

    // ── Transport ─────────────────────────────────────────────────────

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> reqwest::RequestBuilder {
        let req = self.http.request(method, self.url(path));
        match token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn body_of(response: Response) -> Result<Value, ClientError> {
        let status = response.status();
        let bytes = response.bytes().await.map_err(ClientError::Transport)?;
        if !status.is_success() {
            let body = serde_json::from_slice::<ErrorEnvelope>(&bytes)
                .map(|e| e.error)
                .unwrap_or_else(|_| ApiErrorBody {
                    code: format!("HTTP_{}", status.as_u16()),
                    message: String::from_utf8_lossy(&bytes).trim().to_string(),
                    details: None,
                });
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// GET with caching and a single retry. `None` means the service said
    /// 401/404 to a caller without a session.
    async fn get<Q: Serialize + ?Sized>(&self, path: &str, query: &Q) -> Result<Option<Value>, ClientError> {
        let key = format!("{path}?{}", encode(query)?);
        let (token, epoch) = {
            let s = lock(&self.session);
            (s.token().map(str::to_string), s.epoch())
        };
        if let Some(hit) = lock(&self.cache).get(&key, epoch) {
            debug!(key, "cache hit");
            return Ok(Some(hit));
        }

        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let sent = self
                .request(Method::GET, path, token.as_deref())
                .query(query)
                .send()
                .await;
            match sent {
                Ok(r) if r.status().is_server_error() && attempt <= READ_RETRIES => {
                    debug!(path, status = r.status().as_u16(), "retrying read");
                }
                Ok(r) => break r,
                Err(e) if attempt <= READ_RETRIES => debug!(path, error = %e, "retrying read"),
                Err(e) => return Err(ClientError::Transport(e)),
            }
        };

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND) {
            if token.is_none() {
                debug!(path, status = status.as_u16(), "no session; treating as empty");
                return Ok(None);
            }
            if status == StatusCode::UNAUTHORIZED {
                self.expire_session();
                return Err(ClientError::SessionExpired);
            }
        }

        let value = Self::body_of(response).await?;
        let current = lock(&self.session).epoch();
        lock(&self.cache).put(key, epoch, current, value.clone());
        Ok(Some(value))
    }

    /// One attempt, then evict the cached reads under `touches`.
    async fn send(&self, method: Method, path: &str, body: Option<Value>, touches: &[&str]) -> Result<Value, ClientError> {
        let token = lock(&self.session).token().map(str::to_string);
        let mut req = self.request(method, path, token.as_deref());
        if let Some(body) = &body {
            req = req.json(body);
        }
        let response = req.send().await.map_err(ClientError::Transport)?;
        if response.status() == StatusCode::UNAUTHORIZED && token.is_some() {
            self.expire_session();
            return Err(ClientError::SessionExpired);
        }
        let value = Self::body_of(response).await?;
        lock(&self.cache).invalidate(touches);
        Ok(value)
    }

    fn active_plant(&self) -> Option<u64> {
        lock(&self.session).active_plant()
    }

    // ── Reads ─────────────────────────────────────────────────────────

    pub async fn me(&self) -> Result<Option<User>, ClientError> {
        self.get("/users/me", &()).await?.map(decode).transpose()
    }

    pub async fn users(&self, page: Option<usize>, limit: Option<usize>) -> Result<Page<User>, ClientError> {
        let query = [("page", page), ("limit", limit)];
        let query: Vec<_> = query.iter().filter_map(|(k, v)| v.map(|v| (*k, v))).collect();
        Ok(self.get(USERS, &query).await?.map(decode).transpose()?.unwrap_or_default())
    }

    pub async fn plants(&self, active_only: bool) -> Result<Vec<Plant>, ClientError> {
        let query = [("activeOnly", active_only)];
        Ok(self.get(PLANTS, &query).await?.map(decode).transpose()?.unwrap_or_default())
    }

    /// Task masters; without an explicit plant filter the active plant applies.
    pub async fn task_masters(&self, filter: &MasterFilter) -> Result<Page<TaskMaster>, ClientError> {
        let mut filter = filter.clone();
        if filter.plant_id.is_none() {
            filter.plant_id = self.active_plant();
        }
        Ok(self.get(TASK_MASTERS, &filter).await?.map(decode).transpose()?.unwrap_or_default())
    }

    pub async fn task_master(&self, id: u64) -> Result<Option<TaskMaster>, ClientError> {
        self.get(&format!("{TASK_MASTERS}/{id}"), &()).await?.map(decode).transpose()
    }

    pub async fn task_instances(&self, filter: &InstanceFilter) -> Result<Page<TaskInstance>, ClientError> {
        let mut filter = filter.clone();
        if filter.plant_id.is_none() {
            filter.plant_id = self.active_plant();
        }
        Ok(self.get(TASK_INSTANCES, &filter).await?.map(decode).transpose()?.unwrap_or_default())
    }

    pub async fn my_tasks(&self, filter: &InstanceFilter) -> Result<Page<TaskInstance>, ClientError> {
        let mut filter = filter.clone();
        if filter.plant_id.is_none() {
            filter.plant_id = self.active_plant();
        }
        let path = format!("{TASK_INSTANCES}/my-tasks");
        Ok(self.get(&path, &filter).await?.map(decode).transpose()?.unwrap_or_default())
    }

    pub async fn settings(&self) -> Result<Option<AppSettings>, ClientError> {
        self.get(APP_SETTINGS, &()).await?.map(decode).transpose()
    }

    // ── Mutations ─────────────────────────────────────────────────────

    pub async fn create_task_master(&self, input: &NewTaskMaster) -> Result<TaskMaster, ClientError> {
        input.validate()?;
        decode(self.send(Method::POST, TASK_MASTERS, Some(encode(input)?), &[TASK_MASTERS]).await?)
    }

    pub async fn update_task_master(&self, id: u64, patch: &TaskMasterPatch) -> Result<TaskMaster, ClientError> {
        if patch.is_empty() {
            return Err(ValidationError::single("patch", "nothing to update").into());
        }
        let path = format!("{TASK_MASTERS}/{id}");
        decode(self.send(Method::PUT, &path, Some(encode(patch)?), &[TASK_MASTERS]).await?)
    }

    pub async fn delete_task_master(&self, id: u64) -> Result<(), ClientError> {
        let path = format!("{TASK_MASTERS}/{id}");
        self.send(Method::DELETE, &path, None, &[TASK_MASTERS]).await?;
        Ok(())
    }

    pub async fn create_one_time_task(&self, input: &NewOneTimeTask) -> Result<OneTimeTaskCreated, ClientError> {
        input.validate()?;
        let value = self
            .send(Method::POST, TASK_INSTANCES, Some(encode(input)?), &[TASK_MASTERS, TASK_INSTANCES])
            .await?;
        decode(value)
    }

    pub async fn update_instance(&self, id: u64, update: &InstanceUpdate) -> Result<TaskInstance, ClientError> {
        if update.actual_duration == Some(0) {
            return Err(ValidationError::single("actualDuration", "must be greater than 0").into());
        }
        let path = format!("{TASK_INSTANCES}/{id}");
        decode(self.send(Method::PUT, &path, Some(encode(update)?), &[TASK_INSTANCES]).await?)
    }

    pub async fn generate(&self, as_of: Option<NaiveDate>) -> Result<GenerationReport, ClientError> {
        let body = as_of.map(|d| serde_json::json!({ "asOf": d }));
        let path = format!("{TASK_INSTANCES}/generate");
        let report: GenerationReport = decode(self.send(Method::POST, &path, body, &[TASK_INSTANCES, TASK_MASTERS]).await?)?;
        if report.errors > 0 {
            warn!(errors = report.errors, "some task masters could not be generated");
        }
        Ok(report)
    }

    pub async fn create_plant(&self, input: &NewPlant) -> Result<Plant, ClientError> {
        if input.code.trim().is_empty() {
            return Err(ValidationError::single("code", "is required").into());
        }
        decode(self.send(Method::POST, PLANTS, Some(encode(input)?), &[PLANTS]).await?)
    }

    pub async fn update_plant(&self, id: u64, patch: &PlantPatch) -> Result<Plant, ClientError> {
        let path = format!("{PLANTS}/{id}");
        decode(self.send(Method::PUT, &path, Some(encode(patch)?), &[PLANTS]).await?)
    }

    pub async fn create_user(&self, input: &NewUser) -> Result<User, ClientError> {
        if !input.email.contains('@') {
            return Err(ValidationError::single("email", "must be a valid email address").into());
        }
        decode(self.send(Method::POST, USERS, Some(encode(input)?), &[USERS]).await?)
    }

    pub async fn update_user(&self, id: u64, patch: &UserPatch) -> Result<User, ClientError> {
        let path = format!("{USERS}/{id}");
        decode(self.send(Method::PUT, &path, Some(encode(patch)?), &[USERS]).await?)
    }

    pub async fn update_settings(&self, patch: &SettingsPatch) -> Result<AppSettings, ClientError> {
        decode(self.send(Method::PUT, APP_SETTINGS, Some(encode(patch)?), &[APP_SETTINGS]).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(details: Value) -> ApiErrorBody {
        ApiErrorBody {
            code: "VALIDATION_ERROR".into(),
            message: "Validation failed".into(),
            details: Some(details),
        }
    }

    #[test]
    fn field_details_are_flattened() {
        let b = body(json!([
            {"field": "title", "message": "is required"},
            "frequencyValue must be at least 1"
        ]));
        assert_eq!(b.detail_lines(), vec!["title: is required", "frequencyValue must be at least 1"]);
        assert_eq!(
            b.to_string(),
            "Validation failed (title: is required; frequencyValue must be at least 1)"
        );
    }

    #[test]
    fn string_and_object_details() {
        assert_eq!(body(json!("plant is closed")).detail_lines(), vec!["plant is closed"]);
        assert_eq!(body(json!({"limit": 500})).detail_lines(), vec!["limit: 500"]);
        assert!(body(Value::Null).detail_lines().is_empty());
    }

    #[test]
    fn api_error_display_carries_status() {
        let err = ClientError::Api { status: 409, body: body(json!([])) };
        assert_eq!(err.to_string(), "Validation failed [HTTP 409]");
        assert_eq!(err.status(), Some(409));
    }
}
