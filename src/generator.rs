//! Task instance generation.
//!
//! Expands recurring task masters into dated task instances. A run looks at
//! every active recurring master whose start date has arrived, works out which
//! occurrences in `(last generated, today]` have no instance yet, and creates
//! them. Because each occurrence is keyed by `(master, scheduled date)`, running
//! generation twice on the same day creates nothing the second time.
//!
//! One-time tasks go through [`create_one_time_task`] instead: the master is
//! written as a non-recurring, inactive template together with its single
//! instance, and is never picked up by a run.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::errors::{DmsError, ValidationError};
use crate::fields::{Frequency, TaskType};
use crate::registry::derive_plant;
use crate::task::{non_empty, NewOneTimeTask, OneTimeTaskCreated, TaskInstance, TaskMaster};

pub const DEFAULT_MAX_CATCH_UP: usize = 31;

/// Outcome of one generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generated: usize,
    pub errors: usize,
}

impl GenerationReport {
    /// One-line summary for display.
    pub fn summary(&self) -> String {
        match (self.generated, self.errors) {
            (0, 0) => "No tasks were due for generation.".to_string(),
            (n, 0) => format!("Generated {n} task(s)."),
            (n, e) => format!("Generated {n} task(s); {e} task master(s) could not be processed."),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    /// Upper bound on occurrences materialized per master in one run; older
    /// missed occurrences beyond it are skipped.
    pub max_catch_up: usize,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        GenerationOptions {
            max_catch_up: DEFAULT_MAX_CATCH_UP,
        }
    }
}

/// A requested generation date. Running ahead of the real date would create
/// future work and move `last_generated` past today.
pub fn check_as_of(as_of: NaiveDate, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    if as_of > today {
        return Err(ValidationError::single("asOf", format!("must not be after today ({today})")));
    }
    Ok(as_of)
}

/// Generate every due instance as of `today`.
pub fn generate_due_instances(
    db: &mut Database,
    today: NaiveDate,
    now: DateTime<Utc>,
    opts: GenerationOptions,
) -> GenerationReport {
    let candidates: Vec<u64> = db
        .task_masters
        .iter()
        .filter(|m| m.is_generation_candidate(today))
        .map(|m| m.id)
        .collect();

    let mut report = GenerationReport::default();
    for id in candidates {
        match generate_for_master(db, id, today, now, opts) {
            Ok(n) => report.generated += n,
            Err(e) => {
                warn!(master_id = id, error = %e, "task master skipped during generation");
                report.errors += 1;
            }
        }
    }
    info!(%today, generated = report.generated, errors = report.errors, "generation finished");
    report
}

fn due_date_for(master: &TaskMaster, scheduled: NaiveDate) -> NaiveDate {
    scheduled
        .checked_add_days(Days::new(u64::from(master.due_within_days)))
        .unwrap_or(scheduled)
}

fn generate_for_master(
    db: &mut Database,
    id: u64,
    today: NaiveDate,
    now: DateTime<Utc>,
    opts: GenerationOptions,
) -> Result<usize, DmsError> {
    let master = db.master(id).cloned().ok_or(DmsError::not_found("Task master", id))?;
    let rule = master.recurrence()?;
    if !db.user(master.assigned_to).is_some_and(|u| u.is_active) {
        return Err(ValidationError::single(
            "assignedTo",
            format!("employee {} is no longer active", master.assigned_to),
        )
        .into());
    }

    let mut due = rule.due_through(master.start_date, master.last_generated, today);
    let Some(&latest) = due.last() else {
        return Ok(0);
    };
    let cap = opts.max_catch_up.max(1);
    if due.len() > cap {
        let skipped = due.len() - cap;
        warn!(master_id = id, skipped, "missed occurrences older than the catch-up window were skipped");
        due.drain(..skipped);
    }

    let mut created = 0;
    for scheduled in due {
        if db.has_instance_for(id, scheduled) {
            debug!(master_id = id, %scheduled, "occurrence already has an instance");
            continue;
        }
        let instance = TaskInstance::from_master(
            &master,
            db.next_instance_id(),
            scheduled,
            due_date_for(&master, scheduled),
            now,
        );
        db.insert_instance(instance)?;
        created += 1;
    }

    if let Some(m) = db.master_mut(id) {
        m.last_generated = Some(latest);
    }
    Ok(created)
}

/// Create a one-time task: an inactive, non-recurring master plus its single
/// instance, written together.
pub fn create_one_time_task(
    db: &mut Database,
    input: NewOneTimeTask,
    created_by: u64,
    now: DateTime<Utc>,
) -> Result<OneTimeTaskCreated, DmsError> {
    input.validate()?;
    let assigned_to = input
        .assigned_to
        .ok_or_else(|| ValidationError::single("assignedTo", "is required"))?;
    let plant_id = derive_plant(db, assigned_to, None)?;
    let lead_days = (input.due_date - input.scheduled_date).num_days();

    let master = TaskMaster {
        id: db.next_master_id(),
        title: input.title.trim().to_string(),
        description: input.description.trim().to_string(),
        plant_id,
        assigned_to,
        assigned_by: created_by,
        priority: input.priority.unwrap_or_default(),
        frequency: Frequency::Daily,
        frequency_value: None,
        frequency_unit: None,
        start_date: input.scheduled_date,
        is_active: false,
        task_type: TaskType::OneTime,
        estimated_duration: input.estimated_duration.unwrap_or_default(),
        instructions: non_empty(input.instructions),
        due_within_days: u32::try_from(lead_days).unwrap_or(u32::MAX),
        last_generated: Some(input.scheduled_date),
        created_at: now,
        updated_at: now,
    };
    let instance = TaskInstance::from_master(&master, db.next_instance_id(), input.scheduled_date, input.due_date, now);

    db.task_masters.push(master.clone());
    db.insert_instance(instance.clone())?;
    info!(master_id = master.id, instance_id = instance.id, scheduled = %instance.scheduled_date, "one-time task created");
    Ok(OneTimeTaskCreated {
        task_master: master,
        task_instance: instance,
    })
}
