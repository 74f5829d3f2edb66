//! # dms - plant task operations
//!
//! Recurring maintenance and operations work for manufacturing plants.
//!
//! - **Task masters** describe recurring work: what, who, how often.
//! - **Generation** turns due masters into dated task instances, at most one
//!   per master per scheduled date, with bounded catch-up.
//! - **Instances** move through pending, in-progress, completed and cancelled.
//! - **Plants and users** scope every task; a user's plant decides where
//!   their tasks live, and module permissions decide what they may change.
//!
//! The same operations are available from the CLI against a local JSON store,
//! over REST (`dms serve`), and through the session-aware [`client::ApiClient`].

pub mod cache;
pub mod cli;
pub mod client;
pub mod cmd;
pub mod config;
pub mod db;
pub mod directory;
pub mod display;
pub mod errors;
pub mod fields;
pub mod frequency;
pub mod generator;
pub mod lifecycle;
pub mod logging;
pub mod prefs;
pub mod registry;
pub mod remote;
pub mod server;
pub mod settings;
pub mod task;
