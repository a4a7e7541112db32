use std::path::Path;

use duka_core::config::normalize_base_url;
use duka_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::config_file::{default_config_path, env_lookup, CliConfig};
use crate::error::CliError;

pub fn run_config(
    command: ConfigCommands,
    config: CliConfig,
    explicit_db_path: Option<&Path>,
    db_path: &Path,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init { api_url, api_token } => {
            let updated = apply_init(config, api_url, api_token, explicit_db_path)?;
            let path = updated.save().map_err(CliError::Config)?;
            println!("Config written to {}", path.display());
            if updated.api_url.is_none() {
                println!("No server configured yet. Run `duka config init --api-url <URL>`.");
            }
            Ok(())
        }
        ConfigCommands::Show => run_config_show(&config, db_path),
    }
}

/// Merge `config init` flags into the existing file contents.
pub fn apply_init(
    mut config: CliConfig,
    api_url: Option<String>,
    api_token: Option<String>,
    explicit_db_path: Option<&Path>,
) -> Result<CliConfig, CliError> {
    if let Some(url) = normalize_text_option(api_url) {
        config.api_url = Some(normalize_base_url(url)?);
    }
    if let Some(token) = normalize_text_option(api_token) {
        config.api_token = Some(token);
    }
    if let Some(path) = explicit_db_path {
        config.db_path = Some(path.to_path_buf());
    }
    config.sync.validate()?;
    Ok(config)
}

fn run_config_show(config: &CliConfig, db_path: &Path) -> Result<(), CliError> {
    let config_path = default_config_path().map_err(CliError::Config)?;
    let remote = config.remote_config(env_lookup)?;
    let sync = config.sync_config(env_lookup)?;

    println!("Config file:  {}", config_path.display());
    println!("Database:     {}", db_path.display());
    match remote {
        Some(remote) => {
            println!("Server:       {}", remote.base_url);
            println!(
                "API token:    {}",
                if remote.api_token.is_some() {
                    "set"
                } else {
                    "not set"
                }
            );
        }
        None => println!("Server:       not configured"),
    }
    println!("Sync:");
    println!("{}", serde_json::to_string_pretty(&sync)?);
    Ok(())
}
