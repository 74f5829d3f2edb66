//! Task master and task instance data structures.
//!
//! A `TaskMaster` is the template describing what work recurs, for whom and how
//! often. A `TaskInstance` is one dated unit of that work, carrying copies of
//! the master's descriptive fields as they were when it was created.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::fields::*;
use crate::frequency::Recurrence;

/// A recurring (or one-time) task template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMaster {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub plant_id: u64,
    pub assigned_to: u64,
    pub assigned_by: u64,
    pub priority: Priority,
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_value: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_unit: Option<FrequencyUnit>,
    pub start_date: NaiveDate,
    pub is_active: bool,
    #[serde(default)]
    pub task_type: TaskType,
    pub estimated_duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default)]
    pub due_within_days: u32,
    #[serde(default)]
    pub last_generated: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskMaster {
    pub fn recurrence(&self) -> Result<Recurrence, ValidationError> {
        Recurrence::from_parts(self.frequency, self.frequency_value, self.frequency_unit)
    }

    /// Whether the generator should look at this master at all on `today`.
    pub fn is_generation_candidate(&self, today: NaiveDate) -> bool {
        self.task_type == TaskType::Recurring && self.is_active && self.start_date <= today
    }
}

/// One concrete, dated unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInstance {
    pub id: u64,
    pub task_master_id: u64,
    pub title: String,
    pub description: String,
    pub plant_id: u64,
    pub assigned_to: u64,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub scheduled_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InstanceStatus,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub estimated_duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskInstance {
    /// Materialize a pending instance of `master` for one occurrence.
    pub fn from_master(
        master: &TaskMaster,
        id: u64,
        scheduled_date: NaiveDate,
        due_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        TaskInstance {
            id,
            task_master_id: master.id,
            title: master.title.clone(),
            description: master.description.clone(),
            plant_id: master.plant_id,
            assigned_to: master.assigned_to,
            priority: master.priority,
            instructions: master.instructions.clone(),
            scheduled_date,
            due_date,
            status: InstanceStatus::Pending,
            completed_at: None,
            notes: None,
            estimated_duration: master.estimated_duration,
            actual_duration: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Trim a free-text field and drop it when nothing is left.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Payload for creating a task master.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTaskMaster {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<u64>,
    /// Derived from the assignee; a value that disagrees is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_value: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_unit: Option<FrequencyUnit>,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_within_days: Option<u32>,
}

impl NewTaskMaster {
    /// Field checks that need no directory lookup.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if self.title.trim().is_empty() {
            err.push("title", "is required");
        }
        if self.description.trim().is_empty() {
            err.push("description", "is required");
        }
        if self.assigned_to.is_none() {
            err.push("assignedTo", "is required");
        }
        match self.estimated_duration {
            None => err.push("estimatedDuration", "is required"),
            Some(0) => err.push("estimatedDuration", "must be greater than 0"),
            Some(_) => {}
        }
        if let Err(freq) = Recurrence::from_parts(self.frequency, self.frequency_value, self.frequency_unit) {
            err.details.extend(freq.details);
        }
        err.into_result()
    }

    /// Drop empty optional text and custom-only fields that do not apply.
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self.instructions = non_empty(self.instructions);
        if self.frequency != Frequency::Custom {
            self.frequency_value = None;
            self.frequency_unit = None;
        }
        self
    }
}

/// Partial update of a task master; `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMasterPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_value: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_unit: Option<FrequencyUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<u32>,
    /// An empty string clears the instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_within_days: Option<u32>,
}

impl TaskMasterPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskMasterPatch::default()
    }
}

/// Payload for the one-time task flow: a master that never recurs plus its
/// single instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOneTimeTask {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    pub scheduled_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl NewOneTimeTask {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if self.title.trim().is_empty() {
            err.push("title", "is required");
        }
        if self.description.trim().is_empty() {
            err.push("description", "is required");
        }
        if self.assigned_to.is_none() {
            err.push("assignedTo", "is required");
        }
        match self.estimated_duration {
            None => err.push("estimatedDuration", "is required"),
            Some(0) => err.push("estimatedDuration", "must be greater than 0"),
            Some(_) => {}
        }
        if self.due_date < self.scheduled_date {
            err.push("dueDate", "must not be before the scheduled date");
        }
        err.into_result()
    }
}

/// Result of the one-time task flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimeTaskCreated {
    pub task_master: TaskMaster,
    pub task_instance: TaskInstance,
}

/// Body of a task instance update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InstanceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Filters for listing task masters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl MasterFilter {
    /// A frequency filter only matches recurring masters; one-time masters
    /// carry a placeholder frequency.
    pub fn matches(&self, m: &TaskMaster) -> bool {
        self.plant_id.is_none_or(|p| m.plant_id == p)
            && self.assigned_to.is_none_or(|a| m.assigned_to == a)
            && self
                .frequency
                .is_none_or(|f| m.task_type == TaskType::Recurring && m.frequency == f)
            && self.is_active.is_none_or(|a| m.is_active == a)
            && self.task_type.is_none_or(|t| m.task_type == t)
    }
}

/// Filters for listing task instances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InstanceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl InstanceFilter {
    pub fn matches(&self, t: &TaskInstance) -> bool {
        self.status.is_none_or(|s| t.status == s)
            && self.plant_id.is_none_or(|p| t.plant_id == p)
            && self.assigned_to.is_none_or(|a| t.assigned_to == a)
    }
}
