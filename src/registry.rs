//! Task master registry.
//!
//! CRUD over task master templates. The registry owns the invariants a master
//! must satisfy whenever it is written: required fields, a positive estimated
//! duration, a complete custom recurrence, and a plant derived from the
//! assignee rather than chosen independently.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::db::{paginate, Database, Page};
use crate::directory::resolve_assignee_plant;
use crate::errors::{DmsError, ValidationError};
use crate::fields::{Frequency, TaskType};
use crate::task::{non_empty, MasterFilter, NewTaskMaster, TaskMaster, TaskMasterPatch};

/// Resolve the plant a master assigned to `assigned_to` belongs to.
///
/// `requested` is the plant the caller believes applies; it is accepted only
/// when it equals the derived one.
pub fn derive_plant(db: &Database, assigned_to: u64, requested: Option<u64>) -> Result<u64, DmsError> {
    let assignee = db
        .user(assigned_to)
        .ok_or_else(|| ValidationError::single("assignedTo", format!("employee {assigned_to} does not exist")))?;
    if !assignee.is_active {
        return Err(ValidationError::single("assignedTo", format!("employee {} is inactive", assignee.email)).into());
    }
    let plant = resolve_assignee_plant(assignee, &db.plants)?;
    if let Some(requested) = requested {
        if requested != plant.id {
            return Err(ValidationError::single(
                "plantId",
                format!("must match the assignee's plant ({})", plant.code),
            )
            .into());
        }
    }
    Ok(plant.id)
}

fn validate_master(m: &TaskMaster) -> Result<(), ValidationError> {
    let mut err = ValidationError::new();
    if m.title.trim().is_empty() {
        err.push("title", "is required");
    }
    if m.description.trim().is_empty() {
        err.push("description", "is required");
    }
    if m.estimated_duration == 0 {
        err.push("estimatedDuration", "must be greater than 0");
    }
    if let Err(freq) = m.recurrence() {
        err.details.extend(freq.details);
    }
    if m.task_type == TaskType::OneTime && m.is_active {
        err.push("isActive", "one-time task masters cannot be activated");
    }
    err.into_result()
}

pub fn create_task_master(
    db: &mut Database,
    input: NewTaskMaster,
    created_by: u64,
    now: DateTime<Utc>,
) -> Result<TaskMaster, DmsError> {
    let input = input.normalized();
    input.validate()?;
    let assigned_to = input
        .assigned_to
        .ok_or_else(|| ValidationError::single("assignedTo", "is required"))?;
    let plant_id = derive_plant(db, assigned_to, input.plant_id)?;

    let master = TaskMaster {
        id: db.next_master_id(),
        title: input.title,
        description: input.description,
        plant_id,
        assigned_to,
        assigned_by: created_by,
        priority: input.priority.unwrap_or_default(),
        frequency: input.frequency,
        frequency_value: input.frequency_value,
        frequency_unit: input.frequency_unit,
        start_date: input.start_date,
        is_active: input.is_active.unwrap_or(true),
        task_type: TaskType::Recurring,
        estimated_duration: input.estimated_duration.unwrap_or_default(),
        instructions: input.instructions,
        due_within_days: input.due_within_days.unwrap_or(0),
        last_generated: None,
        created_at: now,
        updated_at: now,
    };
    validate_master(&master)?;
    db.task_masters.push(master.clone());
    info!(
        master_id = master.id,
        frequency = ?master.frequency,
        assigned_to = master.assigned_to,
        plant_id = master.plant_id,
        "task master created"
    );
    Ok(master)
}

pub fn get_task_master(db: &Database, id: u64) -> Result<TaskMaster, DmsError> {
    db.master(id).cloned().ok_or(DmsError::not_found("Task master", id))
}

/// Apply a partial update; the merged master is re-validated before it is written.
pub fn update_task_master(
    db: &mut Database,
    id: u64,
    patch: TaskMasterPatch,
    now: DateTime<Utc>,
) -> Result<TaskMaster, DmsError> {
    let mut draft = get_task_master(db, id)?;

    if let Some(title) = patch.title {
        draft.title = title.trim().to_string();
    }
    if let Some(description) = patch.description {
        draft.description = description.trim().to_string();
    }
    if let Some(priority) = patch.priority {
        draft.priority = priority;
    }
    if let Some(frequency) = patch.frequency {
        draft.frequency = frequency;
    }
    if patch.frequency_value.is_some() {
        draft.frequency_value = patch.frequency_value;
    }
    if patch.frequency_unit.is_some() {
        draft.frequency_unit = patch.frequency_unit;
    }
    if draft.frequency != Frequency::Custom {
        draft.frequency_value = None;
        draft.frequency_unit = None;
    }
    if let Some(start) = patch.start_date {
        draft.start_date = start;
    }
    if let Some(active) = patch.is_active {
        draft.is_active = active;
    }
    if let Some(minutes) = patch.estimated_duration {
        draft.estimated_duration = minutes;
    }
    if patch.instructions.is_some() {
        draft.instructions = non_empty(patch.instructions);
    }
    if let Some(days) = patch.due_within_days {
        draft.due_within_days = days;
    }
    if patch.assigned_to.is_some() || patch.plant_id.is_some() {
        let assigned_to = patch.assigned_to.unwrap_or(draft.assigned_to);
        draft.plant_id = derive_plant(db, assigned_to, patch.plant_id)?;
        draft.assigned_to = assigned_to;
    }
    validate_master(&draft)?;
    draft.updated_at = now;

    let slot = db.master_mut(id).ok_or(DmsError::not_found("Task master", id))?;
    *slot = draft.clone();
    info!(master_id = id, is_active = draft.is_active, "task master updated");
    Ok(draft)
}

/// Pause or resume generation for a recurring master.
pub fn set_task_master_active(db: &mut Database, id: u64, active: bool, now: DateTime<Utc>) -> Result<TaskMaster, DmsError> {
    let patch = TaskMasterPatch {
        is_active: Some(active),
        ..Default::default()
    };
    update_task_master(db, id, patch, now)
}

/// Hard delete. Instances already generated from the master are left in place.
pub fn delete_task_master(db: &mut Database, id: u64) -> Result<TaskMaster, DmsError> {
    let idx = db
        .task_masters
        .iter()
        .position(|m| m.id == id)
        .ok_or(DmsError::not_found("Task master", id))?;
    let removed = db.task_masters.remove(idx);
    let orphaned = db.task_instances.iter().filter(|t| t.task_master_id == id).count();
    info!(master_id = id, orphaned_instances = orphaned, "task master deleted");
    Ok(removed)
}

/// Masters matching `filter`, ordered by id.
pub fn list_task_masters(db: &Database, filter: &MasterFilter) -> Page<TaskMaster> {
    let mut masters: Vec<TaskMaster> = db
        .task_masters
        .iter()
        .filter(|m| filter.matches(m))
        .cloned()
        .collect();
    masters.sort_by_key(|m| m.id);
    paginate(masters, filter.page, filter.limit)
}
