use anyhow::{Context, Result};
use birdmap_core::{ApiKey, Config, EbirdClient, source::API_KEY_ENV};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "birdmap", version, about = "Map of notable eBird sightings near a fixed point")]
pub struct Cli {
    /// Defaults to `build` when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch notable observations and publish the map.
    Build(BuildArgs),

    /// Inspect or create the configuration file.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Default, Args)]
pub struct BuildArgs {
    /// Config file to use instead of the platform default.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory that receives `latest.html` and archived maps.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Search radius in kilometres (1-50).
    #[arg(long)]
    pub radius: Option<u32>,

    /// Lookback window in days (1-30).
    #[arg(long)]
    pub back_days: Option<u32>,

    /// Only write `latest.html`.
    #[arg(long)]
    pub no_archive: bool,
}

impl BuildArgs {
    /// Flags win over file and environment settings.
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.publish.output_dir = dir.clone();
        }
        if let Some(radius) = self.radius {
            config.query.radius_km = radius;
        }
        if let Some(days) = self.back_days {
            config.query.back_days = days;
        }
        if self.no_archive {
            config.publish.archive = false;
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the default config file path.
    Path,

    /// Write a config file with the default settings.
    Init {
        /// Where to write; defaults to the platform config path.
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file without asking.
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command.unwrap_or_else(|| Command::Build(BuildArgs::default())) {
            Command::Build(args) => {
                build(args, std::env::var(API_KEY_ENV).ok(), |name| std::env::var(name).ok()).await
            }
            Command::Config(ConfigCommand::Path) => {
                println!("{}", Config::config_file_path()?.display());
                Ok(())
            }
            Command::Config(ConfigCommand::Init { path, force }) => init_config(path, force),
        }
    }
}

/// One scheduled run. The key is checked first so a missing secret fails
/// before config is read or any request is made.
pub async fn build<F>(args: BuildArgs, raw_api_key: Option<String>, env: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = ApiKey::new(raw_api_key.unwrap_or_default())?;

    let mut config = Config::load(args.config.as_deref())?;
    config.apply_env_overrides(env)?;
    args.apply(&mut config);
    config.notable_query()?;

    let client = EbirdClient::from_config(api_key, &config.http)?;
    let report = birdmap_core::run(&client, &config, Utc::now()).await?;

    log::info!(
        "Published {} observation(s) of {} species to '{}'",
        report.observations,
        report.species,
        report.published.latest.display()
    );

    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path {
        Some(p) => p,
        None => Config::config_file_path()?,
    };

    if path.exists() && !force {
        let overwrite = inquire::Confirm::new(&format!("{} already exists. Overwrite?", path.display()))
            .with_default(false)
            .prompt()
            .context("Refusing to overwrite existing config without confirmation (use --force)")?;

        if !overwrite {
            println!("Left {} unchanged.", path.display());
            return Ok(());
        }
    }

    Config::default().save_to(&path)?;
    println!("Wrote default configuration to {}", path.display());

    Ok(())
}
