use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use dms::cli::Cli;
use dms::cmd::*;
use dms::config::{default_data_dir, Config, CONFIG_FILE, STORE_FILE};
use dms::db::Store;
use dms::logging::init_tracing;
use dms::remote::cmd_remote;
use dms::server;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let config_path = cli.config.clone().unwrap_or_else(|| data_dir.join(CONFIG_FILE));
    let mut config = Config::load(&config_path)?;
    init_tracing(&config.logging.level, cli.verbose);

    let db_path: PathBuf = cli.db.clone().unwrap_or_else(|| data_dir.join(STORE_FILE));
    let acting_as = cli.acting_as.as_deref();

    match cli.command {
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
        Commands::Remote(args) => cmd_remote(args, &config, &data_dir).await,
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let store = Store::open(&db_path)?;
            server::serve(config, store).await
        }
        Commands::Backup => cmd_backup(&db_path),
        command => {
            let mut store = Store::open(&db_path)?;
            match command {
                Commands::Master { action } => cmd_master(&mut store, acting_as, action),
                Commands::Generate { date } => cmd_generate(&mut store, &config, date),
                Commands::OneTime { title, desc, assignee, scheduled, due, priority, estimate, instructions } => {
                    cmd_one_time(&mut store, acting_as, title, desc, assignee, scheduled, due, priority, estimate, instructions)
                }
                Commands::Task { action } => cmd_task(&mut store, &config, action),
                Commands::Plant { action } => cmd_plant(&mut store, action),
                Commands::User { action } => cmd_user(&mut store, action),
                Commands::Settings { action } => cmd_settings(&mut store, action),
                Commands::Export { output, status, plant } => cmd_export(store.db(), &output, status, plant),
                Commands::Completions { .. } | Commands::Remote(_) | Commands::Serve { .. } | Commands::Backup => Ok(()),
            }
        }
    }
}
