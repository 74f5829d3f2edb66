//! Task instance lifecycle.
//!
//! ```text
//! pending ──> in-progress ──> completed
//!    │             │
//!    └─────────────┴──> cancelled
//! ```
//!
//! `completed` and `cancelled` are terminal. A pending instance has to be
//! started before it can be completed. Overdue and due-soon are computed from
//! `(due date, status, today)` and never stored.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::db::{paginate, Database, Page};
use crate::directory::User;
use crate::errors::{DmsError, ValidationError};
use crate::fields::{InstanceStatus, Module, Permission, Role};
use crate::task::{non_empty, InstanceFilter, InstanceUpdate, TaskInstance};

pub const DEFAULT_DUE_SOON_DAYS: i64 = 3;

/// Accept or reject a status change. Re-asserting the current status is allowed
/// and changes nothing.
pub fn check_transition(from: InstanceStatus, to: InstanceStatus) -> Result<(), DmsError> {
    use InstanceStatus::*;
    if from == to {
        return Ok(());
    }
    if from.is_terminal() {
        return Err(DmsError::InvalidTransition { from, to });
    }
    match (from, to) {
        (Pending, InProgress) | (InProgress, Completed) | (_, Cancelled) => Ok(()),
        _ => Err(DmsError::InvalidTransition { from, to }),
    }
}

/// Apply an update to one instance. Everything is checked before any field is
/// written, so a rejected update leaves the instance as it was.
pub fn apply_update(instance: &mut TaskInstance, update: InstanceUpdate, now: DateTime<Utc>) -> Result<(), DmsError> {
    let target = update.status.unwrap_or(instance.status);
    check_transition(instance.status, target)?;

    let completing = target == InstanceStatus::Completed && instance.status != InstanceStatus::Completed;
    let mut err = ValidationError::new();
    if update.actual_duration == Some(0) {
        err.push("actualDuration", "must be greater than 0");
    }
    if update.completed_at.is_some() && !completing {
        err.push("completedAt", "may only be set when completing the task");
    }
    if let Some(at) = update.completed_at {
        if at.date_naive() < instance.scheduled_date {
            err.push("completedAt", "must not be before the scheduled date");
        }
    }
    err.into_result()?;

    if completing {
        instance.completed_at = Some(update.completed_at.unwrap_or(now));
    }
    instance.status = target;
    if update.notes.is_some() {
        instance.notes = non_empty(update.notes);
    }
    if let Some(minutes) = update.actual_duration {
        instance.actual_duration = Some(minutes);
    }
    instance.updated_at = now;
    Ok(())
}

/// Days from `today` until `due` (negative once past due).
pub fn days_until_due(due: NaiveDate, today: NaiveDate) -> i64 {
    (due - today).num_days()
}

pub fn is_overdue(due: NaiveDate, status: InstanceStatus, today: NaiveDate) -> bool {
    status != InstanceStatus::Completed && due < today
}

pub fn is_due_soon(due: NaiveDate, status: InstanceStatus, today: NaiveDate, within_days: i64) -> bool {
    let days = days_until_due(due, today);
    status != InstanceStatus::Completed && days > 0 && days <= within_days
}

impl TaskInstance {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        is_overdue(self.due_date, self.status, today)
    }

    pub fn is_due_soon(&self, today: NaiveDate, within_days: i64) -> bool {
        is_due_soon(self.due_date, self.status, today, within_days)
    }
}

/// Update an instance on behalf of `actor`. Employees may only touch their own
/// instances; managers and admins may touch any.
pub fn update_instance(
    db: &mut Database,
    id: u64,
    update: InstanceUpdate,
    actor: &User,
    now: DateTime<Utc>,
) -> Result<TaskInstance, DmsError> {
    let instance = db.instance_mut(id).ok_or(DmsError::not_found("Task instance", id))?;
    if !actor.can(Module::TaskInstances, Permission::Write) {
        return Err(DmsError::Forbidden(format!("{} may not update task instances", actor.email)));
    }
    if instance.assigned_to != actor.id && !actor.role.at_least(Role::Manager) {
        return Err(DmsError::Forbidden(format!("task instance {id} is assigned to someone else")));
    }

    let mut draft = instance.clone();
    let from = draft.status;
    apply_update(&mut draft, update, now)?;
    *instance = draft.clone();
    if from != draft.status {
        info!(instance_id = id, from = ?from, to = ?draft.status, actor = actor.id, "task instance status changed");
    }
    Ok(draft)
}

/// Instances matching `filter`, earliest due first.
pub fn list_instances(db: &Database, filter: &InstanceFilter) -> Page<TaskInstance> {
    let mut items: Vec<TaskInstance> = db
        .task_instances
        .iter()
        .filter(|t| filter.matches(t))
        .cloned()
        .collect();
    items.sort_by_key(|t| (t.due_date, t.id));
    paginate(items, filter.page, filter.limit)
}

/// Instances assigned to `user_id`.
pub fn my_tasks(db: &Database, user_id: u64, filter: &InstanceFilter) -> Page<TaskInstance> {
    let filter = InstanceFilter {
        assigned_to: Some(user_id),
        ..filter.clone()
    };
    list_instances(db, &filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::PermissionMatrix;
    use crate::fields::Priority;
    use chrono::Duration;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn instance(status: InstanceStatus) -> TaskInstance {
        let now = Utc::now();
        TaskInstance {
            id: 1,
            task_master_id: 1,
            title: "Calibrate gauge".into(),
            description: "Line 3 pressure gauge".into(),
            plant_id: 1,
            assigned_to: 5,
            priority: Priority::High,
            instructions: None,
            scheduled_date: d("2024-01-01"),
            due_date: d("2024-01-02"),
            status,
            completed_at: None,
            notes: None,
            estimated_duration: 30,
            actual_duration: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn user(id: u64, role: Role) -> User {
        User {
            id,
            email: format!("u{id}@plant.example"),
            display_name: format!("User {id}"),
            role,
            module_permissions: PermissionMatrix::for_role(role),
            is_active: true,
            employee_id: None,
            plant: None,
            department: None,
            designation: None,
            contact_no: None,
            created_at: Utc::now(),
        }
    }

    fn to(status: InstanceStatus) -> InstanceUpdate {
        InstanceUpdate { status: Some(status), ..Default::default() }
    }

    #[test]
    fn happy_path_stamps_completed_at() {
        let mut t = instance(InstanceStatus::Pending);
        let now = Utc::now();
        apply_update(&mut t, to(InstanceStatus::InProgress), now).unwrap();
        assert_eq!(t.completed_at, None);
        apply_update(&mut t, InstanceUpdate { actual_duration: Some(45), ..to(InstanceStatus::Completed) }, now).unwrap();
        assert_eq!(t.status, InstanceStatus::Completed);
        assert_eq!(t.completed_at, Some(now));
        assert_eq!(t.actual_duration, Some(45));
    }

    #[test]
    fn pending_cannot_jump_to_completed() {
        let mut t = instance(InstanceStatus::Pending);
        let before = t.clone();
        let err = apply_update(&mut t, to(InstanceStatus::Completed), Utc::now()).unwrap_err();
        assert!(matches!(err, DmsError::InvalidTransition { .. }));
        assert_eq!(t, before);
    }

    #[test]
    fn terminal_states_stay_terminal() {
        for from in [InstanceStatus::Completed, InstanceStatus::Cancelled] {
            for target in [InstanceStatus::Pending, InstanceStatus::InProgress] {
                assert!(check_transition(from, target).is_err());
            }
        }
        assert!(check_transition(InstanceStatus::Completed, InstanceStatus::Cancelled).is_err());
        assert!(check_transition(InstanceStatus::Cancelled, InstanceStatus::Completed).is_err());
        assert!(check_transition(InstanceStatus::Completed, InstanceStatus::Completed).is_ok());
        assert!(check_transition(InstanceStatus::Pending, InstanceStatus::Cancelled).is_ok());
        assert!(check_transition(InstanceStatus::InProgress, InstanceStatus::Cancelled).is_ok());
    }

    #[test]
    fn rejected_update_leaves_notes_untouched() {
        let mut t = instance(InstanceStatus::InProgress);
        let update = InstanceUpdate { notes: Some("done early".into()), actual_duration: Some(0), ..Default::default() };
        assert!(apply_update(&mut t, update, Utc::now()).is_err());
        assert_eq!(t.notes, None);
    }

    #[test]
    fn completed_at_only_when_completing() {
        let mut t = instance(InstanceStatus::Pending);
        let update = InstanceUpdate { completed_at: Some(Utc::now()), ..to(InstanceStatus::InProgress) };
        assert!(matches!(apply_update(&mut t, update, Utc::now()), Err(DmsError::Validation(_))));
    }

    #[test]
    fn overdue_ignores_completed_instances() {
        let today = d("2024-06-01");
        assert!(!is_overdue(d("2000-01-01"), InstanceStatus::Completed, today));
        assert!(is_overdue(d("2024-05-31"), InstanceStatus::Pending, today));
        assert!(!is_overdue(today, InstanceStatus::InProgress, today));
    }

    #[test]
    fn due_soon_window() {
        let today = d("2024-06-01");
        assert!(!is_due_soon(today, InstanceStatus::Pending, today, 3));
        assert!(is_due_soon(today + Duration::days(1), InstanceStatus::Pending, today, 3));
        assert!(is_due_soon(today + Duration::days(3), InstanceStatus::Pending, today, 3));
        assert!(!is_due_soon(today + Duration::days(4), InstanceStatus::Pending, today, 3));
        assert!(!is_due_soon(today + Duration::days(2), InstanceStatus::Completed, today, 3));
    }

    #[test]
    fn employees_update_only_their_own_instances() {
        let mut db = Database::default();
        db.task_instances.push(instance(InstanceStatus::Pending));

        let other = user(9, Role::Employee);
        let err = update_instance(&mut db, 1, to(InstanceStatus::InProgress), &other, Utc::now()).unwrap_err();
        assert!(matches!(err, DmsError::Forbidden(_)));

        let owner = user(5, Role::Employee);
        update_instance(&mut db, 1, to(InstanceStatus::InProgress), &owner, Utc::now()).unwrap();

        let manager = user(2, Role::Manager);
        let done = update_instance(&mut db, 1, to(InstanceStatus::Completed), &manager, Utc::now()).unwrap();
        assert_eq!(done.status, InstanceStatus::Completed);

        let guest = user(5, Role::Guest);
        assert!(matches!(
            update_instance(&mut db, 1, InstanceUpdate::default(), &guest, Utc::now()),
            Err(DmsError::Forbidden(_))
        ));
    }
}
