//! Command implementations for the CLI interface.
//!
//! Local commands open the JSON store, run one transaction and print the
//! result. Every handler returns `anyhow::Result`; `main` prints the error
//! chain and exits non-zero.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate, Utc};
use clap::{Subcommand, ValueEnum};
use clap_complete::{generate, Shell};

use crate::config::Config;
use crate::db::{create_backup, paginate, parse_date_input, Database, Store};
use crate::directory::{self, NewPlant, NewUser, PlantPatch, UserPatch};
use crate::display::*;
use crate::errors::DmsError;
use crate::fields::*;
use crate::generator::{check_as_of, create_one_time_task, generate_due_instances};
use crate::lifecycle::apply_update;
use crate::registry;
use crate::remote::RemoteArgs;
use crate::settings::SettingsPatch;
use crate::task::{InstanceFilter, InstanceUpdate, MasterFilter, NewOneTimeTask, NewTaskMaster, TaskInstance, TaskMasterPatch};

#[derive(Subcommand)]
pub enum Commands {
    /// Manage recurring task masters.
    Master {
        #[command(subcommand)]
        action: MasterAction,
    },

    /// Generate every task instance that is due.
    Generate {
        /// Generate as of this date instead of today.
        #[arg(long)]
        date: Option<String>,
    },

    /// Create a one-time task: a master that never recurs plus its single instance.
    OneTime {
        /// Short title for the task.
        title: String,
        #[arg(long)]
        desc: String,
        /// Assignee id or email.
        #[arg(long)]
        assignee: String,
        /// Scheduled date: YYYY-MM-DD, "today", "tomorrow", "in Nd" or a weekday.
        #[arg(long, default_value = "today")]
        scheduled: String,
        /// Due date; defaults to the scheduled date.
        #[arg(long)]
        due: Option<String>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        /// Estimated duration in minutes.
        #[arg(long)]
        estimate: u32,
        #[arg(long)]
        instructions: Option<String>,
    },

    /// Work with task instances.
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Manage plants.
    Plant {
        #[command(subcommand)]
        action: PlantAction,
    },

    /// Manage users.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Show or change branding settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Run the HTTP service.
    Serve {
        /// Address to bind, overriding [server] bind.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Talk to a running service.
    Remote(RemoteArgs),

    /// Copy the store into a timestamped file under backup/.
    Backup,

    /// Export task instances to CSV.
    Export {
        /// Output file.
        #[arg(long, default_value = "task-instances.csv")]
        output: String,
        #[arg(long, value_enum)]
        status: Option<InstanceStatus>,
        #[arg(long)]
        plant: Option<u64>,
    },

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum MasterAction {
    /// Add a task master.
    Add {
        title: String,
        #[arg(long)]
        desc: String,
        /// Assignee id or email; the plant is taken from the assignee.
        #[arg(long)]
        assignee: String,
        /// Expected plant id; rejected if it is not the assignee's plant.
        #[arg(long)]
        plant: Option<u64>,
        #[arg(long, value_enum, default_value_t = Frequency::Daily)]
        frequency: Frequency,
        /// Interval for --frequency custom.
        #[arg(long)]
        every: Option<u32>,
        /// Unit for --frequency custom.
        #[arg(long, value_enum)]
        unit: Option<FrequencyUnit>,
        /// First occurrence date; defaults to today.
        #[arg(long)]
        start: Option<String>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        /// Estimated duration in minutes.
        #[arg(long)]
        estimate: u32,
        #[arg(long)]
        instructions: Option<String>,
        /// Days between scheduled date and due date.
        #[arg(long)]
        due_within: Option<u32>,
        /// Create without generating until resumed.
        #[arg(long)]
        paused: bool,
    },
    /// List task masters.
    List {
        #[arg(long)]
        plant: Option<u64>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long, value_enum)]
        frequency: Option<Frequency>,
        #[arg(long)]
        active: Option<bool>,
        /// recurring or one-time.
        #[arg(long = "type", value_enum)]
        task_type: Option<TaskType>,
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show one task master.
    View { id: u64 },
    /// Change fields of a task master.
    Update {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        #[arg(long, value_enum)]
        frequency: Option<Frequency>,
        #[arg(long)]
        every: Option<u32>,
        #[arg(long, value_enum)]
        unit: Option<FrequencyUnit>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        estimate: Option<u32>,
        /// Empty string clears the instructions.
        #[arg(long)]
        instructions: Option<String>,
        #[arg(long)]
        due_within: Option<u32>,
    },
    /// Stop generating instances.
    Pause { id: u64 },
    /// Resume generating instances.
    Resume { id: u64 },
    /// Delete a task master. Its instances are kept.
    Delete { id: u64 },
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// List task instances.
    List {
        #[arg(long, value_enum)]
        status: Option<InstanceStatus>,
        #[arg(long)]
        plant: Option<u64>,
        /// Assignee id or email.
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long, value_enum)]
        due: Option<DueFilter>,
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show one task instance.
    View { id: u64 },
    /// Move a pending instance to in-progress.
    Start {
        id: u64,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Complete an in-progress instance.
    Complete {
        id: u64,
        /// Actual duration in minutes.
        #[arg(long)]
        actual: Option<u32>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Cancel a pending or in-progress instance.
    Cancel {
        id: u64,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum PlantAction {
    /// Add a plant.
    Add {
        name: String,
        /// Unique code, stored uppercase.
        code: String,
        #[arg(long)]
        location: Option<String>,
    },
    /// List plants.
    List {
        #[arg(long)]
        active_only: bool,
    },
    /// Change a plant. The code cannot change.
    Update {
        id: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        active: Option<bool>,
    },
}

#[derive(Subcommand)]
pub enum UserAction {
    /// Add a user.
    Add {
        email: String,
        name: String,
        #[arg(long, value_enum, default_value_t = Role::Employee)]
        role: Role,
        /// Plant name or code.
        #[arg(long)]
        plant: Option<String>,
        #[arg(long)]
        employee_id: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        designation: Option<String>,
        #[arg(long)]
        contact: Option<String>,
    },
    /// List users.
    List {
        #[arg(long)]
        page: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show a user and their permissions.
    View { user: String },
    /// Change a user. The email cannot change.
    Update {
        user: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_enum)]
        role: Option<Role>,
        #[arg(long)]
        plant: Option<String>,
        #[arg(long)]
        active: Option<bool>,
        /// Grant module:permission, e.g. plants:write. May be repeated.
        #[arg(long)]
        grant: Vec<String>,
        /// Revoke module:permission. May be repeated.
        #[arg(long)]
        revoke: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print current settings.
    Show,
    /// Change settings.
    Set {
        #[arg(long)]
        app_name: Option<String>,
        #[arg(long)]
        company: Option<String>,
        /// Empty string removes the logo.
        #[arg(long)]
        logo: Option<String>,
        /// #RRGGBB
        #[arg(long)]
        color: Option<String>,
    },
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a human date argument relative to `today`.
pub fn parse_date_arg(s: &str, today: NaiveDate) -> Result<NaiveDate> {
    parse_date_input(s, today).ok_or_else(|| {
        anyhow!("Invalid date '{s}': use YYYY-MM-DD, today, tomorrow, in Nd, or a weekday name")
    })
}

/// Resolve a user given by id or email.
pub fn resolve_user(db: &Database, who: &str) -> Result<u64> {
    let who = who.trim();
    if let Ok(id) = who.parse::<u64>() {
        return db.user(id).map(|u| u.id).ok_or_else(|| anyhow!("No user with id {id}"));
    }
    db.user_by_email(who)
        .map(|u| u.id)
        .ok_or_else(|| anyhow!("No user with email '{who}'"))
}

/// The user local changes are attributed to.
pub fn acting_user(db: &Database, acting_as: Option<&str>) -> Result<u64> {
    match acting_as {
        Some(who) => resolve_user(db, who),
        None => db
            .users
            .iter()
            .find(|u| u.is_active && u.role == Role::Admin)
            .map(|u| u.id)
            .ok_or_else(|| anyhow!("No active admin user; pass --as or add one with `dms user add <email> <name> --role admin`")),
    }
}

fn parse_grant(s: &str) -> Result<(Module, Permission)> {
    let (module, perm) = s
        .split_once(':')
        .ok_or_else(|| anyhow!("Expected module:permission, got '{s}'"))?;
    let module = Module::from_str(module.trim(), true).map_err(|e| anyhow!("Unknown module '{module}': {e}"))?;
    let perm = Permission::from_str(perm.trim(), true).map_err(|e| anyhow!("Unknown permission '{perm}': {e}"))?;
    Ok((module, perm))
}

fn mutate<T>(store: &mut Store, f: impl FnOnce(&mut Database) -> Result<T, DmsError>) -> Result<T> {
    Ok(store.mutate(f)?)
}

pub fn cmd_master(store: &mut Store, acting_as: Option<&str>, action: MasterAction) -> Result<()> {
    let today = today();
    match action {
        MasterAction::Add {
            title, desc, assignee, plant, frequency, every, unit, start, priority, estimate,
            instructions, due_within, paused,
        } => {
            let assigned_to = resolve_user(store.db(), &assignee)?;
            let created_by = acting_user(store.db(), acting_as)?;
            let start_date = match start {
                Some(s) => parse_date_arg(&s, today)?,
                None => today,
            };
            let input = NewTaskMaster {
                title,
                description: desc,
                assigned_to: Some(assigned_to),
                plant_id: plant,
                priority,
                frequency,
                frequency_value: every,
                frequency_unit: unit,
                start_date,
                is_active: Some(!paused),
                estimated_duration: Some(estimate),
                instructions,
                due_within_days: due_within,
            };
            let master = mutate(store, |db| registry::create_task_master(db, input, created_by, Utc::now()))?;
            println!("Created task master {}: {} (plant {})", master.id, master.title, master.plant_id);
        }
        MasterAction::List { plant, assignee, frequency, active, task_type, page, limit } => {
            let assigned_to = assignee.map(|a| resolve_user(store.db(), &a)).transpose()?;
            let filter = MasterFilter { plant_id: plant, assigned_to, frequency, is_active: active, task_type, page, limit };
            print_master_table(&registry::list_task_masters(store.db(), &filter));
        }
        MasterAction::View { id } => print_master_detail(&registry::get_task_master(store.db(), id)?),
        MasterAction::Update {
            id, title, desc, assignee, priority, frequency, every, unit, start, estimate, instructions, due_within,
        } => {
            let assigned_to = assignee.map(|a| resolve_user(store.db(), &a)).transpose()?;
            let start_date = start.map(|s| parse_date_arg(&s, today)).transpose()?;
            let patch = TaskMasterPatch {
                title,
                description: desc,
                assigned_to,
                plant_id: None,
                priority,
                frequency,
                frequency_value: every,
                frequency_unit: unit,
                start_date,
                is_active: None,
                estimated_duration: estimate,
                instructions,
                due_within_days: due_within,
            };
            if patch.is_empty() {
                bail!("Nothing to update");
            }
            let master = mutate(store, |db| registry::update_task_master(db, id, patch, Utc::now()))?;
            println!("Updated task master {}.", master.id);
        }
        MasterAction::Pause { id } => {
            mutate(store, |db| registry::set_task_master_active(db, id, false, Utc::now()))?;
            println!("Paused task master {id}.");
        }
        MasterAction::Resume { id } => {
            mutate(store, |db| registry::set_task_master_active(db, id, true, Utc::now()))?;
            println!("Resumed task master {id}.");
        }
        MasterAction::Delete { id } => {
            let removed = mutate(store, |db| registry::delete_task_master(db, id))?;
            println!("Deleted task master {}: {}", removed.id, removed.title);
        }
    }
    Ok(())
}

pub fn cmd_generate(store: &mut Store, config: &Config, date: Option<String>) -> Result<()> {
    let today = today();
    let as_of = match date {
        Some(s) => check_as_of(parse_date_arg(&s, today)?, today)?,
        None => today,
    };
    let opts = config.generation.options();
    let report = mutate(store, |db| Ok(generate_due_instances(db, as_of, Utc::now(), opts)))?;
    println!("{}", report.summary());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_one_time(
    store: &mut Store,
    acting_as: Option<&str>,
    title: String,
    desc: String,
    assignee: String,
    scheduled: String,
    due: Option<String>,
    priority: Option<Priority>,
    estimate: u32,
    instructions: Option<String>,
) -> Result<()> {
    let today = today();
    let assigned_to = resolve_user(store.db(), &assignee)?;
    let created_by = acting_user(store.db(), acting_as)?;
    let scheduled_date = parse_date_arg(&scheduled, today)?;
    let due_date = match due {
        Some(s) => parse_date_arg(&s, today)?,
        None => scheduled_date,
    };
    let input = NewOneTimeTask {
        title,
        description: desc,
        assigned_to: Some(assigned_to),
        priority,
        scheduled_date,
        due_date,
        estimated_duration: Some(estimate),
        instructions,
    };
    let created = mutate(store, |db| create_one_time_task(db, input, created_by, Utc::now()))?;
    println!(
        "Created one-time task {} (master {}) scheduled {}, due {}",
        created.task_instance.id, created.task_master.id, created.task_instance.scheduled_date, created.task_instance.due_date
    );
    Ok(())
}

fn transition(store: &mut Store, id: u64, update: InstanceUpdate) -> Result<TaskInstance> {
    mutate(store, |db| {
        let instance = db.instance_mut(id).ok_or(DmsError::not_found("Task instance", id))?;
        let mut draft = instance.clone();
        apply_update(&mut draft, update, Utc::now())?;
        *instance = draft.clone();
        Ok(draft)
    })
}

pub fn cmd_task(store: &mut Store, config: &Config, action: TaskAction) -> Result<()> {
    let today = today();
    let due_soon = config.lifecycle.due_soon_days;
    match action {
        TaskAction::List { status, plant, assignee, due, page, limit } => {
            let assigned_to = assignee.map(|a| resolve_user(store.db(), &a)).transpose()?;
            let filter = InstanceFilter { status, plant_id: plant, assigned_to, page: None, limit: None };
            let mut rows: Vec<TaskInstance> = store
                .db()
                .task_instances
                .iter()
                .filter(|t| filter.matches(t) && due.is_none_or(|df| matches_due(t, df, today, due_soon)))
                .cloned()
                .collect();
            rows.sort_by_key(|t| (t.due_date, t.id));
            let page = paginate(rows, page, limit);
            print_instance_page(&page, today, due_soon);
        }
        TaskAction::View { id } => {
            let t = store.db().instance(id).ok_or(DmsError::not_found("Task instance", id))?;
            print_instance_detail(t, today, due_soon);
        }
        TaskAction::Start { id, notes } => {
            let update = InstanceUpdate { status: Some(InstanceStatus::InProgress), notes, ..Default::default() };
            let t = transition(store, id, update)?;
            println!("Started {}: {}", t.id, t.title);
        }
        TaskAction::Complete { id, actual, notes } => {
            let update = InstanceUpdate {
                status: Some(InstanceStatus::Completed),
                notes,
                actual_duration: actual,
                completed_at: None,
            };
            let t = transition(store, id, update)?;
            println!("Completed {}: {}", t.id, t.title);
        }
        TaskAction::Cancel { id, notes } => {
            let update = InstanceUpdate { status: Some(InstanceStatus::Cancelled), notes, ..Default::default() };
            let t = transition(store, id, update)?;
            println!("Cancelled {}: {}", t.id, t.title);
        }
    }
    Ok(())
}

pub fn cmd_plant(store: &mut Store, action: PlantAction) -> Result<()> {
    match action {
        PlantAction::Add { name, code, location } => {
            let plant = mutate(store, |db| directory::create_plant(db, NewPlant { name, code, location }, Utc::now()))?;
            println!("Created plant {} ({})", plant.id, plant.code);
        }
        PlantAction::List { active_only } => print_plant_table(&directory::list_plants(store.db(), active_only)),
        PlantAction::Update { id, name, location, active } => {
            let patch = PlantPatch { name, code: None, location, is_active: active };
            let plant = mutate(store, |db| directory::update_plant(db, id, patch))?;
            println!("Updated plant {} ({})", plant.id, plant.code);
        }
    }
    Ok(())
}

pub fn cmd_user(store: &mut Store, action: UserAction) -> Result<()> {
    match action {
        UserAction::Add { email, name, role, plant, employee_id, department, designation, contact } => {
            let input = NewUser {
                email,
                display_name: name,
                role,
                module_permissions: None,
                employee_id,
                plant,
                department,
                designation,
                contact_no: contact,
            };
            let user = mutate(store, |db| directory::create_user(db, input, Utc::now()))?;
            println!("Created user {} <{}>", user.id, user.email);
        }
        UserAction::List { page, limit } => print_user_table(&directory::list_users(store.db(), page, limit)),
        UserAction::View { user } => {
            let id = resolve_user(store.db(), &user)?;
            if let Some(u) = store.db().user(id) {
                print_user_detail(u);
            }
        }
        UserAction::Update { user, name, role, plant, active, grant, revoke } => {
            let id = resolve_user(store.db(), &user)?;
            let grants = grant.iter().map(|g| parse_grant(g)).collect::<Result<Vec<_>>>()?;
            let revokes = revoke.iter().map(|r| parse_grant(r)).collect::<Result<Vec<_>>>()?;
            let module_permissions = if grants.is_empty() && revokes.is_empty() {
                None
            } else {
                let current = store.db().user(id).map(|u| u.module_permissions.clone()).unwrap_or_default();
                let mut matrix = current;
                for (m, p) in grants {
                    matrix.grant(m, p);
                }
                for (m, p) in revokes {
                    matrix.revoke(m, p);
                }
                Some(matrix)
            };
            let patch = UserPatch {
                display_name: name,
                role,
                plant,
                is_active: active,
                module_permissions,
                ..Default::default()
            };
            let user = mutate(store, |db| directory::update_user(db, id, patch))?;
            println!("Updated user {} <{}>", user.id, user.email);
        }
    }
    Ok(())
}

pub fn cmd_settings(store: &mut Store, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => print_settings(&store.db().settings),
        SettingsAction::Set { app_name, company, logo, color } => {
            let patch = SettingsPatch { app_name, company_name: company, logo_url: logo, primary_color: color };
            let settings = mutate(store, |db| {
                db.settings.apply(patch)?;
                Ok(db.settings.clone())
            })?;
            print_settings(&settings);
        }
    }
    Ok(())
}

pub fn cmd_backup(db_path: &Path) -> Result<()> {
    let path = create_backup(db_path)?;
    println!("Backup written to {}", path.display());
    Ok(())
}

pub fn cmd_export(db: &Database, output: &str, status: Option<InstanceStatus>, plant: Option<u64>) -> Result<()> {
    let rows: Vec<&TaskInstance> = db
        .task_instances
        .iter()
        .filter(|t| status.is_none_or(|s| t.status == s))
        .filter(|t| plant.is_none_or(|p| t.plant_id == p))
        .collect();
    std::fs::write(output, instances_to_csv(&rows)).with_context(|| format!("Failed to write {output}"))?;
    println!("Exported {} task instance(s) to {output}", rows.len());
    Ok(())
}

pub fn cmd_completions(shell: Shell) {
    use crate::cli::Cli;
    use clap::CommandFactory;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> Store {
        let mut store = Store::open(&dir.path().join("dms.json")).unwrap();
        cmd_plant(&mut store, PlantAction::Add { name: "Pune Works".into(), code: "pun".into(), location: None }).unwrap();
        for (email, role, plant) in [("admin@plant.example", Role::Admin, None), ("op@plant.example", Role::Employee, Some("Pune Works"))] {
            cmd_user(
                &mut store,
                UserAction::Add {
                    email: email.into(),
                    name: email.into(),
                    role,
                    plant: plant.map(Into::into),
                    employee_id: None,
                    department: None,
                    designation: None,
                    contact: None,
                },
            )
            .unwrap();
        }
        store
    }

    #[test]
    fn master_add_then_generate_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);
        cmd_master(
            &mut store,
            None,
            MasterAction::Add {
                title: "Sweep".into(),
                desc: "Bay 1".into(),
                assignee: "op@plant.example".into(),
                plant: None,
                frequency: Frequency::Daily,
                every: None,
                unit: None,
                start: Some("2024-01-01".into()),
                priority: None,
                estimate: 10,
                instructions: None,
                due_within: None,
                paused: false,
            },
        )
        .unwrap();
        cmd_generate(&mut store, &Config::default(), Some("2024-01-03".into())).unwrap();

        let saved = Database::load(store.path()).unwrap();
        assert_eq!(saved.task_masters[0].assigned_by, 1);
        assert_eq!(saved.task_masters[0].plant_id, 1);
        assert_eq!(saved.task_instances.len(), 3);
    }

    #[test]
    fn generate_refuses_future_date() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);
        let err = cmd_generate(&mut store, &Config::default(), Some("tomorrow".into())).unwrap_err();
        assert!(err.to_string().contains("asOf"));
        assert!(store.db().task_instances.is_empty());
    }

    #[test]
    fn failed_transition_leaves_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);
        cmd_one_time(
            &mut store, None, "Drill".into(), "All".into(), "2".into(), "2024-02-01".into(), None, None, 30, None,
        )
        .unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();
        assert!(cmd_task(&mut store, &Config::default(), TaskAction::Complete { id: 1, actual: None, notes: None }).is_err());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);

        cmd_task(&mut store, &Config::default(), TaskAction::Start { id: 1, notes: Some("on it".into()) }).unwrap();
        cmd_task(&mut store, &Config::default(), TaskAction::Complete { id: 1, actual: Some(25), notes: None }).unwrap();
        assert_eq!(store.db().task_instances[0].status, InstanceStatus::Completed);
    }

    #[test]
    fn user_lookup_by_id_or_email() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert_eq!(resolve_user(store.db(), "2").unwrap(), 2);
        assert_eq!(resolve_user(store.db(), "OP@plant.example").unwrap(), 2);
        assert!(resolve_user(store.db(), "nobody@plant.example").is_err());
        assert_eq!(acting_user(store.db(), None).unwrap(), 1);
    }

    #[test]
    fn grants_parse_module_and_permission() {
        assert_eq!(parse_grant("plants:write").unwrap(), (Module::Plants, Permission::Write));
        assert_eq!(parse_grant("task-masters:delete").unwrap(), (Module::TaskMasters, Permission::Delete));
        assert!(parse_grant("plants").is_err());
        assert!(parse_grant("reports:read").is_err());
    }

    #[test]
    fn export_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);
        cmd_one_time(
            &mut store, None, "Drill".into(), "All".into(), "op@plant.example".into(), "2024-02-01".into(),
            Some("2024-02-03".into()), None, 30, None,
        )
        .unwrap();
        let out = dir.path().join("out.csv");
        cmd_export(store.db(), out.to_str().unwrap(), None, Some(1)).unwrap();
        let csv = std::fs::read_to_string(out).unwrap();
        assert_eq!(csv.lines().count(), 2);
    }
}
