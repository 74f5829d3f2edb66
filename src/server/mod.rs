//! HTTP service over the file store.
//!
//! The store sits behind a `std::sync::Mutex`. Handlers take the lock, run the
//! whole read-modify-save and release it before returning, so no await point
//! ever holds it and generation runs are serialized.

pub mod api;
pub mod auth;

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::db::{Database, Store};
use crate::errors::{DmsError, StoreError};

pub use api::ApiError;
pub use auth::CurrentUser;

pub struct AppState {
    pub store: Mutex<Store>,
    pub config: Config,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: Store, config: Config) -> SharedState {
        Arc::new(AppState {
            store: Mutex::new(store),
            config,
        })
    }

    /// Run `f` against the current database.
    pub fn read<T>(&self, f: impl FnOnce(&Database) -> T) -> Result<T, DmsError> {
        let store = self.store.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(store.db()))
    }

    /// Run `f` as one store transaction.
    pub fn write<T>(&self, f: impl FnOnce(&mut Database) -> Result<T, DmsError>) -> Result<T, DmsError> {
        let mut store = self.store.lock().map_err(|_| StoreError::LockPoisoned)?;
        store.mutate(f)
    }
}

/// Full router with request tracing.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: Config, store: Store) -> Result<()> {
    let bind = config.server.bind.clone();
    let path = store.path().display().to_string();
    let app = build_router(AppState::new(store, config));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!(addr = %bind, store = %path, "dms service listening");
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
