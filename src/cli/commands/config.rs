use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::load_config;
use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a config file with default values")]
    Init {
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration and data paths")]
    Path,
    #[command(about = "Edit configuration file")]
    Edit,
}

pub async fn handle_config(
    cmd: ConfigCommand,
    config_path: Option<&Path>,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { force } => handle_init(config_path, force, formatter.as_ref()),
        ConfigCommand::Show => handle_show(config_path, format),
        ConfigCommand::Path => handle_path(config_path),
        ConfigCommand::Edit => handle_edit(config_path, formatter.as_ref()),
    }
}

fn target_path(config_path: Option<&Path>) -> Result<PathBuf> {
    config_path
        .map(Path::to_path_buf)
        .or_else(Config::config_path)
        .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))
}

fn handle_init(config_path: Option<&Path>, force: bool, formatter: &dyn Formatter) -> Result<()> {
    let path = target_path(config_path)?;

    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default()
        .save_to(&path)
        .context("failed to write config")?;
    println!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );

    Ok(())
}

fn handle_show(config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if let Ok(path) = target_path(config_path)
        && path.exists()
    {
        println!("# Config: {}", path.display());
    } else {
        println!("# Config: defaults (no file)");
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    println!();
    println!("# Resolved paths");
    println!("# socket_path = \"{}\"", config.socket_path().display());
    println!("# staging_dir = \"{}\"", config.staging_dir().display());
    if let Some(dir) = config.embedding.model_dir() {
        println!("# model_dir = \"{}\"", dir.display());
    }

    Ok(())
}

fn handle_path(config_path: Option<&Path>) -> Result<()> {
    let path = target_path(config_path)?;
    let state = if path.exists() { "active" } else { "would be" };

    println!("Configuration paths:");
    println!();
    println!("Config file ({state}): {}", path.display());
    if let Some(dir) = Config::data_dir() {
        println!("Data directory: {}", dir.display());
    }
    if let Some(dir) = Config::models_dir() {
        println!("Models directory: {}", dir.display());
    }
    if let Some(db) = Config::metrics_db_path() {
        println!("Metrics database: {}", db.display());
    }

    if let Ok(cwd) = std::env::current_dir() {
        let env_path = cwd.join(".env");
        if env_path.exists() {
            println!(".env file (active): {}", env_path.display());
        }
    }

    Ok(())
}

fn handle_edit(config_path: Option<&Path>, formatter: &dyn Formatter) -> Result<()> {
    let path = target_path(config_path)?;

    if !path.exists() {
        Config::default()
            .save_to(&path)
            .context("failed to write config")?;
        println!(
            "{}",
            formatter.format_message(&format!("Created config at: {}", path.display()))
        );
    }

    let editor = std::env::var("EDITOR")
        .unwrap_or_else(|_| std::env::var("VISUAL").unwrap_or_else(|_| "vim".into()));

    Command::new(&editor)
        .arg(&path)
        .status()
        .context(format!("failed to open editor: {}", editor))?;

    Ok(())
}
