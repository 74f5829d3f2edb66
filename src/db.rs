//! File-backed store and shared utilities.
//!
//! This module provides the `Database` document holding every task master, task
//! instance, plant, user and the application settings, the `Store` wrapper that
//! applies mutations transactionally, pagination helpers, and human-friendly
//! date parsing.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::directory::{Plant, User};
use crate::errors::{DmsError, StoreError};
use crate::settings::AppSettings;
use crate::task::{TaskInstance, TaskMaster};

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

/// In-memory image of the JSON store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    #[serde(default)]
    pub task_masters: Vec<TaskMaster>,
    #[serde(default)]
    pub task_instances: Vec<TaskInstance>,
    #[serde(default)]
    pub plants: Vec<Plant>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub settings: AppSettings,
    #[serde(default)]
    pub last_ids: IdCounters,
}

/// Highest id issued so far per record kind. Ids are never handed out twice,
/// even after the record holding one is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdCounters {
    #[serde(default)]
    pub task_master: u64,
    #[serde(default)]
    pub task_instance: u64,
    #[serde(default)]
    pub plant: u64,
    #[serde(default)]
    pub user: u64,
}

/// Next id after both the counter and every id in use; stores files written
/// before the counters existed start from their highest id.
fn issue_id(last: &mut u64, in_use: impl Iterator<Item = u64>) -> u64 {
    let next = in_use.max().unwrap_or(0).max(*last) + 1;
    *last = next;
    next
}

impl Database {
    /// Load the database from a JSON file; a missing file yields an empty database.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Database::default());
        }
        let buf = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&buf).map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save the database using an atomic write (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let data = serde_json::to_string_pretty(self).map_err(StoreError::Serialize)?;
        let tmp = path.with_extension("json.tmp");
        let mut f = File::create(&tmp).map_err(io_err)?;
        f.write_all(data.as_bytes()).map_err(io_err)?;
        f.flush().map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }

    pub fn next_master_id(&mut self) -> u64 {
        issue_id(&mut self.last_ids.task_master, self.task_masters.iter().map(|t| t.id))
    }

    pub fn next_instance_id(&mut self) -> u64 {
        issue_id(&mut self.last_ids.task_instance, self.task_instances.iter().map(|t| t.id))
    }

    pub fn next_plant_id(&mut self) -> u64 {
        issue_id(&mut self.last_ids.plant, self.plants.iter().map(|p| p.id))
    }

    pub fn next_user_id(&mut self) -> u64 {
        issue_id(&mut self.last_ids.user, self.users.iter().map(|u| u.id))
    }

    pub fn master(&self, id: u64) -> Option<&TaskMaster> {
        self.task_masters.iter().find(|t| t.id == id)
    }

    pub fn master_mut(&mut self, id: u64) -> Option<&mut TaskMaster> {
        self.task_masters.iter_mut().find(|t| t.id == id)
    }

    pub fn instance(&self, id: u64) -> Option<&TaskInstance> {
        self.task_instances.iter().find(|t| t.id == id)
    }

    pub fn instance_mut(&mut self, id: u64) -> Option<&mut TaskInstance> {
        self.task_instances.iter_mut().find(|t| t.id == id)
    }

    pub fn plant(&self, id: u64) -> Option<&Plant> {
        self.plants.iter().find(|p| p.id == id)
    }

    pub fn plant_mut(&mut self, id: u64) -> Option<&mut Plant> {
        self.plants.iter_mut().find(|p| p.id == id)
    }

    pub fn user(&self, id: u64) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn user_mut(&mut self, id: u64) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        let email = email.trim().to_lowercase();
        self.users.iter().find(|u| u.email == email)
    }

    /// Whether an instance already exists for this occurrence of a master.
    pub fn has_instance_for(&self, master_id: u64, scheduled_date: NaiveDate) -> bool {
        self.task_instances
            .iter()
            .any(|t| t.task_master_id == master_id && t.scheduled_date == scheduled_date)
    }

    /// Insert an instance, refusing a second one for the same `(master, scheduled date)`.
    pub fn insert_instance(&mut self, instance: TaskInstance) -> Result<(), DmsError> {
        if self.has_instance_for(instance.task_master_id, instance.scheduled_date) {
            return Err(DmsError::Conflict(format!(
                "task master {} already has an instance scheduled for {}",
                instance.task_master_id, instance.scheduled_date
            )));
        }
        self.task_instances.push(instance);
        Ok(())
    }
}

/// A database bound to its file. Every mutation runs against a copy that
/// replaces the in-memory state only once it has been saved.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    db: Database,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::load(path)?;
        debug!(path = %path.display(), masters = db.task_masters.len(), instances = db.task_instances.len(), "store opened");
        Ok(Store {
            path: path.to_path_buf(),
            db,
        })
    }

    /// A store that starts from `db` and persists to `path`.
    pub fn with_database(path: &Path, db: Database) -> Self {
        Store {
            path: path.to_path_buf(),
            db,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn mutate<T>(&mut self, f: impl FnOnce(&mut Database) -> Result<T, DmsError>) -> Result<T, DmsError> {
        let mut draft = self.db.clone();
        let out = f(&mut draft)?;
        draft.save(&self.path)?;
        self.db = draft;
        Ok(out)
    }
}

/// Pagination block of a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// `{data, pagination}` list envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Page {
            data: Vec::new(),
            pagination: Pagination {
                page: 1,
                limit: DEFAULT_PAGE_LIMIT,
                total: 0,
                total_pages: 0,
            },
        }
    }
}

/// Slice `items` into one page. `page` is 1-based; `limit` is clamped to
/// `1..=MAX_PAGE_LIMIT`.
pub fn paginate<T>(items: Vec<T>, page: Option<usize>, limit: Option<usize>) -> Page<T> {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let page = page.unwrap_or(1).max(1);
    let total = items.len();
    let total_pages = total.div_ceil(limit);
    let data = items.into_iter().skip((page - 1) * limit).take(limit).collect();
    Page {
        data,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages,
        },
    }
}

/// Copy the store file into a timestamped file under `backup/` next to it.
pub fn create_backup(db_path: &Path) -> Result<PathBuf, StoreError> {
    let io_err = |source| StoreError::Io {
        path: db_path.to_path_buf(),
        source,
    };
    if !db_path.exists() {
        return Err(io_err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Database file does not exist",
        )));
    }
    let parent_dir = db_path.parent().unwrap_or_else(|| Path::new("."));
    let backup_dir = parent_dir.join("backup");
    fs::create_dir_all(&backup_dir).map_err(io_err)?;

    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let db_filename = db_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("dms.json");
    let backup_path = backup_dir.join(format!("{timestamp}_{db_filename}"));
    fs::copy(db_path, &backup_path).map_err(io_err)?;
    Ok(backup_path)
}

/// Parse human-readable date input relative to `today`.
///
/// Supports:
/// - "today", "tomorrow", "yesterday"
/// - "next monday", "friday", "this friday"
/// - "end of week", "end of month"
/// - "in 3d", "in 2w", "in 1m"
/// - "YYYY-MM-DD" format
pub fn parse_date_input(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();

    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        "yesterday" => return Some(today - Duration::days(1)),
        "end of week" | "eow" => {
            let (_, end) = start_end_of_week(today);
            return Some(end);
        }
        "end of month" | "eom" => {
            let first = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?;
            let first_of_next = first.checked_add_months(chrono::Months::new(1))?;
            return Some(first_of_next - Duration::days(1));
        }
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("in ") {
        let rest = rest.trim();
        if let Some(nd) = rest.strip_suffix('d') {
            if let Ok(days) = nd.trim().parse::<i64>() {
                return Some(today + Duration::days(days));
            }
        }
        if let Some(nw) = rest.strip_suffix('w') {
            if let Ok(weeks) = nw.trim().parse::<i64>() {
                return Some(today + Duration::weeks(weeks));
            }
        }
        if let Some(nm) = rest.strip_suffix('m') {
            if let Ok(months) = nm.trim().parse::<u32>() {
                return today.checked_add_months(chrono::Months::new(months));
            }
        }
    }

    let weekdays = [
        ("monday", 0), ("tuesday", 1), ("wednesday", 2), ("thursday", 3),
        ("friday", 4), ("saturday", 5), ("sunday", 6),
        ("mon", 0), ("tue", 1), ("wed", 2), ("thu", 3),
        ("fri", 4), ("sat", 5), ("sun", 6),
    ];
    let current_day = today.weekday().num_days_from_monday() as i64;
    for (day_name, target_day) in weekdays {
        let days_ahead = (target_day + 7 - current_day) % 7;
        if s == day_name || s == format!("this {day_name}") {
            return Some(today + Duration::days(days_ahead));
        }
        if s == format!("next {day_name}") {
            let days_to_add = if days_ahead == 0 { 7 } else { days_ahead + 7 };
            return Some(today + Duration::days(days_to_add));
        }
    }

    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

/// Start and end dates of the ISO week (Monday to Sunday) containing `today`.
pub fn start_end_of_week(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let weekday = today.weekday().num_days_from_monday() as i64;
    let start = today - Duration::days(weekday);
    (start, start + Duration::days(6))
}
