//! Init command - create the dataset, tables and access roles
//!
//! # Usage
//!
//! ```bash
//! whsync init                               # dataset, tables, roles from config
//! whsync init --dry-run                     # print the SQL without executing
//! whsync init --populate                    # then run a full dimension sync
//! whsync init --url http://ch:8123 --user admin
//! ```
//!
//! The administrative password is read from `--password` or
//! `WHSYNC_ADMIN_PASSWORD`; the ingest credentials are not used here.

mod client;
mod schema;

use anyhow::{Context, Result, bail};
use clap::Args;
use owo_colors::OwoColorize;
use whsync_config::Config;
use whsync_schema::SCHEMA_VERSION;

use self::client::{SchemaClient, first_line};
use super::synchronizer;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// ClickHouse HTTP URL (defaults to [warehouse] url)
    #[arg(long)]
    pub url: Option<String>,

    /// Administrative user
    #[arg(long, env = "WHSYNC_ADMIN_USER", default_value = "default")]
    pub user: String,

    /// Administrative password
    #[arg(long, env = "WHSYNC_ADMIN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Show what would be created without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Populate banking networks and dates once the schema exists
    #[arg(long)]
    pub populate: bool,
}

pub async fn run(args: InitArgs, config: &Config) -> Result<()> {
    let dataset = config.warehouse.dataset.as_str();
    let url = args.url.as_deref().unwrap_or(&config.warehouse.url);
    let roles = &config.warehouse.roles;
    let tables = &config.dimensions.tables;

    println!();
    println!(
        "{} {}",
        "whsync init".bold(),
        format!("(schema v{})", SCHEMA_VERSION).dimmed()
    );
    println!("{}", "─".repeat(50));
    println!("Dataset       {}", dataset.cyan());
    println!("URL           {}", url.dimmed());
    println!("Roles         {}, {}", roles.viewer.cyan(), roles.job_runner.cyan());
    println!("{}", "─".repeat(50));
    println!();

    if args.dry_run {
        print_dry_run(config);
        return Ok(());
    }

    print!("Connecting to ClickHouse... ");
    let client = SchemaClient::connect(url, &args.user, args.password.as_deref()).await?;
    println!("{}", "✓".green());
    if let Ok(version) = client.version().await {
        println!("  Version: {}", version.dimmed());
    }

    print!("Creating database '{}'... ", dataset);
    client.execute(&schema::create_database(dataset)).await?;
    println!("{}", "✓".green());

    let statements = schema::create_tables(dataset, tables);
    print!("Creating tables ({})... ", statements.len());
    client.execute_all(&statements).await?;
    println!("{}", "✓".green());

    print!("Creating roles... ");
    client.execute_all(&schema::create_roles(roles)).await?;
    client.execute_all(&schema::grant_roles(dataset, roles)).await?;
    println!("{}", "✓".green());

    println!("Tables:");
    let mut missing = 0;
    for (_, table) in tables.all() {
        print!("  {}... ", table);
        if client.table_exists(dataset, table).await? {
            println!("{}", "✓".green());
        } else {
            println!("{}", "✗ not found".red());
            missing += 1;
        }
    }
    if missing > 0 {
        bail!("{} tables missing after init", missing);
    }

    if args.populate {
        print!("Populating dimensions... ");
        let summary = synchronizer(config)?
            .sync_all()
            .await
            .context("dimension sync failed")?;
        println!("{}", "✓".green());
        println!(
            "  {} networks, {} dates",
            summary.networks.cyan(),
            summary.dates.cyan()
        );
    }

    println!();
    println!("{}", "Setup complete!".green().bold());
    println!();
    if !args.populate {
        println!("Next steps:");
        println!("  {}", "whsync sync".dimmed());
        println!();
    }

    Ok(())
}

fn print_dry_run(config: &Config) {
    let dataset = config.warehouse.dataset.as_str();
    let roles = &config.warehouse.roles;

    println!("{}", "[DRY RUN] Would execute:".yellow().bold());
    println!();

    println!("-- Create database");
    println!("{};", schema::create_database(dataset));
    println!();

    println!("-- Create tables");
    for sql in schema::create_tables(dataset, &config.dimensions.tables) {
        println!("{};", first_line(&sql));
    }
    println!();

    println!("-- Create roles");
    for sql in schema::create_roles(roles) {
        println!("{};", sql);
    }
    for sql in schema::grant_roles(dataset, roles) {
        println!("{};", sql);
    }
    println!();
}
