//! `dms remote`: the same operations, performed through the REST client.

use std::path::Path;

use anyhow::{bail, Result};
use chrono::Local;
use clap::{Args, Subcommand};

use crate::client::{ApiClient, ClientError};
use crate::config::{Config, PREFS_FILE};
use crate::cmd::parse_date_arg;
use crate::display::*;
use crate::fields::{InstanceStatus, Priority};
use crate::task::{InstanceFilter, InstanceUpdate, MasterFilter, NewOneTimeTask};

#[derive(Args)]
pub struct RemoteArgs {
    /// Bearer token issued by the identity provider.
    #[arg(long, env = "DMS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Service URL, overriding [client] base_url.
    #[arg(long)]
    pub url: Option<String>,

    #[command(subcommand)]
    pub action: RemoteAction,
}

#[derive(Subcommand)]
pub enum RemoteAction {
    /// Check the token and show who it belongs to.
    Whoami,
    /// Forget the session and the selected plant.
    Logout,
    /// Choose the plant that scopes listings.
    SelectPlant {
        /// Plant id; omit to clear.
        id: Option<u64>,
    },
    /// List plants.
    Plants {
        #[arg(long)]
        active_only: bool,
    },
    /// List task masters.
    Masters {
        #[arg(long)]
        plant: Option<u64>,
        #[arg(long)]
        page: Option<usize>,
    },
    /// List your task instances.
    MyTasks {
        #[arg(long, value_enum)]
        status: Option<InstanceStatus>,
        #[arg(long)]
        page: Option<usize>,
    },
    /// List all task instances.
    Tasks {
        #[arg(long, value_enum)]
        status: Option<InstanceStatus>,
        #[arg(long)]
        assignee: Option<u64>,
        #[arg(long)]
        page: Option<usize>,
    },
    /// Move an instance to in-progress.
    Start { id: u64 },
    /// Complete an instance.
    Complete {
        id: u64,
        #[arg(long)]
        actual: Option<u32>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Cancel an instance.
    Cancel { id: u64 },
    /// Create a one-time task.
    OneTime {
        title: String,
        #[arg(long)]
        desc: String,
        /// Assignee user id.
        #[arg(long)]
        assignee: u64,
        #[arg(long, default_value = "today")]
        scheduled: String,
        #[arg(long)]
        due: Option<String>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        #[arg(long)]
        estimate: u32,
    },
    /// Run generation on the service.
    Generate {
        #[arg(long)]
        date: Option<String>,
    },
    /// Show branding settings.
    Settings,
}

fn session_hint(err: ClientError) -> anyhow::Error {
    match err {
        ClientError::SessionExpired => anyhow::anyhow!("Session expired; pass a fresh --token or set DMS_TOKEN"),
        other => other.into(),
    }
}

pub async fn cmd_remote(args: RemoteArgs, config: &Config, data_dir: &Path) -> Result<()> {
    let mut client_config = config.client.clone();
    if let Some(url) = args.url {
        client_config.base_url = url;
    }
    let client = ApiClient::new(&client_config)?.with_prefs(data_dir.join(PREFS_FILE));

    let logging_out = matches!(args.action, RemoteAction::Logout);
    if let Some(token) = args.token.as_deref().filter(|_| !logging_out) {
        client.login(token);
        client.restore_selected_plant().await.map_err(session_hint)?;
    }

    let today = Local::now().date_naive();
    let due_soon = config.lifecycle.due_soon_days;
    match args.action {
        RemoteAction::Logout => {
            client.logout();
            println!("Logged out; selected plant cleared.");
        }
        RemoteAction::Whoami => match client.me().await.map_err(session_hint)? {
            Some(user) => print_user_detail(&user),
            None => println!("Not logged in."),
        },
        RemoteAction::SelectPlant { id } => {
            if let Some(id) = id {
                let plants = client.plants(true).await.map_err(session_hint)?;
                if !plants.iter().any(|p| p.id == id) {
                    bail!("Plant {id} does not exist or is inactive");
                }
            }
            client.select_plant(id);
            match id {
                Some(id) => println!("Selected plant {id}."),
                None => println!("Plant selection cleared."),
            }
        }
        RemoteAction::Plants { active_only } => {
            print_plant_table(&client.plants(active_only).await.map_err(session_hint)?);
        }
        RemoteAction::Masters { plant, page } => {
            let filter = MasterFilter { plant_id: plant, page, ..Default::default() };
            print_master_table(&client.task_masters(&filter).await.map_err(session_hint)?);
        }
        RemoteAction::MyTasks { status, page } => {
            let filter = InstanceFilter { status, page, ..Default::default() };
            print_instance_page(&client.my_tasks(&filter).await.map_err(session_hint)?, today, due_soon);
        }
        RemoteAction::Tasks { status, assignee, page } => {
            let filter = InstanceFilter { status, assigned_to: assignee, page, ..Default::default() };
            print_instance_page(&client.task_instances(&filter).await.map_err(session_hint)?, today, due_soon);
        }
        RemoteAction::Start { id } => {
            let update = InstanceUpdate { status: Some(InstanceStatus::InProgress), ..Default::default() };
            let t = client.update_instance(id, &update).await.map_err(session_hint)?;
            println!("Started {}: {}", t.id, t.title);
        }
        RemoteAction::Complete { id, actual, notes } => {
            let update = InstanceUpdate {
                status: Some(InstanceStatus::Completed),
                notes,
                actual_duration: actual,
                completed_at: None,
            };
            let t = client.update_instance(id, &update).await.map_err(session_hint)?;
            println!("Completed {}: {}", t.id, t.title);
        }
        RemoteAction::Cancel { id } => {
            let update = InstanceUpdate { status: Some(InstanceStatus::Cancelled), ..Default::default() };
            let t = client.update_instance(id, &update).await.map_err(session_hint)?;
            println!("Cancelled {}: {}", t.id, t.title);
        }
        RemoteAction::OneTime { title, desc, assignee, scheduled, due, priority, estimate } => {
            let scheduled_date = parse_date_arg(&scheduled, today)?;
            let due_date = due.map(|d| parse_date_arg(&d, today)).transpose()?.unwrap_or(scheduled_date);
            let input = NewOneTimeTask {
                title,
                description: desc,
                assigned_to: Some(assignee),
                priority,
                scheduled_date,
                due_date,
                estimated_duration: Some(estimate),
                instructions: None,
            };
            let created = client.create_one_time_task(&input).await.map_err(session_hint)?;
            println!("Created one-time task {} (master {})", created.task_instance.id, created.task_master.id);
        }
        RemoteAction::Generate { date } => {
            let as_of = date.map(|d| parse_date_arg(&d, today)).transpose()?;
            let report = client.generate(as_of).await.map_err(session_hint)?;
            println!("{}", report.summary());
        }
        RemoteAction::Settings => match client.settings().await.map_err(session_hint)? {
            Some(settings) => print_settings(&settings),
            None => println!("Not logged in."),
        },
    }
    Ok(())
}
