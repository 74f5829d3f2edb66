//! Enumerations and field types for task operations.
//!
//! This module defines the structured values used to classify task masters and
//! task instances: priorities, recurrence frequencies, instance status, and the
//! role and permission vocabulary of the user directory.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Priority classification for task importance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

/// How often a task master recurs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
    Custom,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
            Frequency::Custom => "custom",
        }
    }
}

/// Unit of a custom recurrence interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FrequencyUnit {
    Days,
    Weeks,
    Months,
}

/// Whether a master recurs or stands behind a single one-time instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    #[default]
    Recurring,
    OneTime,
}

/// Task instance status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl InstanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::InProgress => "in-progress",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further status changes.
    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceStatus::Completed | InstanceStatus::Cancelled)
    }
}

/// Account role, ordered by ascending privilege.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Guest,
    #[default]
    Employee,
    Manager,
    Admin,
}

impl Role {
    /// Numeric privilege level: guest=0, employee=1, manager=2, admin=3.
    pub fn level(self) -> u8 {
        match self {
            Role::Guest => 0,
            Role::Employee => 1,
            Role::Manager => 2,
            Role::Admin => 3,
        }
    }

    pub fn at_least(self, other: Role) -> bool {
        self.level() >= other.level()
    }
}

/// Application modules that carry their own permissions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Module {
    TaskMasters,
    TaskInstances,
    Plants,
    Users,
    Settings,
}

impl Module {
    pub const ALL: [Module; 5] = [
        Module::TaskMasters,
        Module::TaskInstances,
        Module::Plants,
        Module::Users,
        Module::Settings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Module::TaskMasters => "task-masters",
            Module::TaskInstances => "task-instances",
            Module::Plants => "plants",
            Module::Users => "users",
            Module::Settings => "settings",
        }
    }
}

/// Kinds of permission grantable per module.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    Read,
    Write,
    Delete,
    Admin,
}

impl Permission {
    pub const ALL: [Permission; 4] = [
        Permission::Read,
        Permission::Write,
        Permission::Delete,
        Permission::Admin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Delete => "delete",
            Permission::Admin => "admin",
        }
    }
}

/// Filtering options for task instances based on due dates.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DueFilter {
    Today,
    ThisWeek,
    Overdue,
    DueSoon,
}
