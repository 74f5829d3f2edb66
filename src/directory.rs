//! Plant and user directory.
//!
//! Plants are the facilities tasks are scoped to; users are the employees and
//! accounts tasks are assigned to. The directory also owns the assignee plant
//! auto-fill used when a task master is created.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{paginate, Database, Page};
use crate::errors::{DmsError, PlantMatchError, ValidationError};
use crate::fields::{Module, Permission, Role};
use crate::task::non_empty;

/// A manufacturing facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plant {
    pub id: u64,
    pub name: String,
    /// Unique, uppercase, fixed at creation.
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlant {
    pub name: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Accepted only when it matches the stored code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Fixed module × permission table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionMatrix(BTreeMap<Module, BTreeSet<Permission>>);

impl PermissionMatrix {
    /// The grants a new account of `role` starts with.
    pub fn for_role(role: Role) -> Self {
        use Module::*;
        use Permission::*;
        let mut m = PermissionMatrix::default();
        match role {
            Role::Admin => {
                for module in Module::ALL {
                    for perm in Permission::ALL {
                        m.grant(module, perm);
                    }
                }
            }
            Role::Manager => {
                for perm in [Read, Write, Delete] {
                    m.grant(TaskMasters, perm);
                }
                m.grant(TaskInstances, Read);
                m.grant(TaskInstances, Write);
                m.grant(Plants, Read);
                m.grant(Users, Read);
                m.grant(Settings, Read);
            }
            Role::Employee => {
                m.grant(TaskInstances, Read);
                m.grant(TaskInstances, Write);
                m.grant(TaskMasters, Read);
                m.grant(Plants, Read);
            }
            Role::Guest => {
                m.grant(TaskInstances, Read);
            }
        }
        m
    }

    pub fn grant(&mut self, module: Module, perm: Permission) {
        self.0.entry(module).or_default().insert(perm);
    }

    pub fn revoke(&mut self, module: Module, perm: Permission) {
        if let Some(set) = self.0.get_mut(&module) {
            set.remove(&perm);
            if set.is_empty() {
                self.0.remove(&module);
            }
        }
    }

    pub fn allows(&self, module: Module, perm: Permission) -> bool {
        self.0.get(&module).is_some_and(|set| set.contains(&perm))
    }
}

/// An employee account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    /// Stored lowercase; fixed at creation.
    pub email: String,
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub module_permissions: PermissionMatrix,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    /// Free-text plant name or code, matched against plant records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_no: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Admins may do everything; anyone else needs the grant. Inactive
    /// accounts may do nothing.
    pub fn can(&self, module: Module, perm: Permission) -> bool {
        self.is_active && (self.role == Role::Admin || self.module_permissions.allows(module, perm))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_permissions: Option<PermissionMatrix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_no: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    /// Accepted only when it matches the stored email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_permissions: Option<PermissionMatrix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_no: Option<String>,
}

/// Derive an assignee's plant: exact case-insensitive match on code first,
/// then on name.
pub fn resolve_assignee_plant<'a>(user: &User, plants: &'a [Plant]) -> Result<&'a Plant, PlantMatchError> {
    let Some(wanted) = user.plant.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
        return Err(PlantMatchError::NoPlantOnEmployee {
            employee: user.email.clone(),
        });
    };
    plants
        .iter()
        .find(|p| p.code.eq_ignore_ascii_case(wanted))
        .or_else(|| plants.iter().find(|p| p.name.trim().to_lowercase() == wanted.to_lowercase()))
        .ok_or_else(|| PlantMatchError::NoMatch {
            employee: user.email.clone(),
            plant: wanted.to_string(),
        })
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn validate_code(code: &str, err: &mut ValidationError) {
    if code.is_empty() {
        err.push("code", "is required");
    } else if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        err.push("code", "may only contain letters, digits, '-' and '_'");
    }
}

pub fn create_plant(db: &mut Database, input: NewPlant, now: DateTime<Utc>) -> Result<Plant, DmsError> {
    let code = normalize_code(&input.code);
    let mut err = ValidationError::new();
    if input.name.trim().is_empty() {
        err.push("name", "is required");
    }
    validate_code(&code, &mut err);
    err.into_result()?;
    if db.plants.iter().any(|p| p.code == code) {
        return Err(DmsError::Conflict(format!("plant code {code} is already in use")));
    }

    let plant = Plant {
        id: db.next_plant_id(),
        name: input.name.trim().to_string(),
        code,
        location: non_empty(input.location),
        is_active: true,
        created_at: now,
    };
    db.plants.push(plant.clone());
    info!(plant_id = plant.id, code = %plant.code, "plant created");
    Ok(plant)
}

pub fn update_plant(db: &mut Database, id: u64, patch: PlantPatch) -> Result<Plant, DmsError> {
    let plant = db.plant_mut(id).ok_or(DmsError::not_found("Plant", id))?;
    let mut err = ValidationError::new();
    if let Some(code) = &patch.code {
        if normalize_code(code) != plant.code {
            err.push("code", "cannot be changed after creation");
        }
    }
    if let Some(name) = &patch.name {
        if name.trim().is_empty() {
            err.push("name", "must not be empty");
        }
    }
    err.into_result()?;

    if let Some(name) = patch.name {
        plant.name = name.trim().to_string();
    }
    if patch.location.is_some() {
        plant.location = non_empty(patch.location);
    }
    if let Some(active) = patch.is_active {
        plant.is_active = active;
    }
    Ok(plant.clone())
}

/// Plants sorted by name.
pub fn list_plants(db: &Database, active_only: bool) -> Vec<Plant> {
    let mut plants: Vec<Plant> = db
        .plants
        .iter()
        .filter(|p| !active_only || p.is_active)
        .cloned()
        .collect();
    plants.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    plants
}

fn validate_email(email: &str, err: &mut ValidationError) {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => err.push("email", "must be a valid email address"),
    }
}

pub fn create_user(db: &mut Database, input: NewUser, now: DateTime<Utc>) -> Result<User, DmsError> {
    let email = input.email.trim().to_lowercase();
    let mut err = ValidationError::new();
    validate_email(&email, &mut err);
    if input.display_name.trim().is_empty() {
        err.push("displayName", "is required");
    }
    err.into_result()?;
    if db.user_by_email(&email).is_some() {
        return Err(DmsError::Conflict(format!("user {email} already exists")));
    }

    let user = User {
        id: db.next_user_id(),
        email,
        display_name: input.display_name.trim().to_string(),
        role: input.role,
        module_permissions: input
            .module_permissions
            .unwrap_or_else(|| PermissionMatrix::for_role(input.role)),
        is_active: true,
        employee_id: non_empty(input.employee_id),
        plant: non_empty(input.plant),
        department: non_empty(input.department),
        designation: non_empty(input.designation),
        contact_no: non_empty(input.contact_no),
        created_at: now,
    };
    db.users.push(user.clone());
    info!(user_id = user.id, email = %user.email, role = ?user.role, "user created");
    Ok(user)
}

pub fn update_user(db: &mut Database, id: u64, patch: UserPatch) -> Result<User, DmsError> {
    let user = db.user_mut(id).ok_or(DmsError::not_found("User", id))?;
    let mut err = ValidationError::new();
    if let Some(email) = &patch.email {
        if email.trim().to_lowercase() != user.email {
            err.push("email", "cannot be changed after creation");
        }
    }
    if let Some(name) = &patch.display_name {
        if name.trim().is_empty() {
            err.push("displayName", "must not be empty");
        }
    }
    err.into_result()?;

    if let Some(name) = patch.display_name {
        user.display_name = name.trim().to_string();
    }
    if let Some(role) = patch.role {
        user.role = role;
    }
    if let Some(perms) = patch.module_permissions {
        user.module_permissions = perms;
    }
    if let Some(active) = patch.is_active {
        user.is_active = active;
    }
    if patch.employee_id.is_some() {
        user.employee_id = non_empty(patch.employee_id);
    }
    if patch.plant.is_some() {
        user.plant = non_empty(patch.plant);
    }
    if patch.department.is_some() {
        user.department = non_empty(patch.department);
    }
    if patch.designation.is_some() {
        user.designation = non_empty(patch.designation);
    }
    if patch.contact_no.is_some() {
        user.contact_no = non_empty(patch.contact_no);
    }
    Ok(user.clone())
}

/// Users sorted by display name.
pub fn list_users(db: &Database, page: Option<usize>, limit: Option<usize>) -> Page<User> {
    let mut users = db.users.clone();
    users.sort_by(|a, b| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()));
    paginate(users, page, limit)
}
