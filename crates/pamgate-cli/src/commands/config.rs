//! Config inspection command.

use std::path::Path;

use anyhow::Result;
use pamgate_core::Config;
use pamgate_gateway::GatewayAuthConfig;

use crate::ui;

/// What to do with the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Check syntax and semantics.
    Validate,
    /// Print the config file path.
    Path,
}

/// Config command arguments.
#[derive(Debug, Clone)]
pub struct ConfigArgs {
    /// Action to run.
    pub action: ConfigAction,
}

/// Run the config command.
pub fn run_config(args: ConfigArgs) -> Result<()> {
    let config_path = Config::default_path();

    match args.action {
        ConfigAction::Path => {
            println!("{}", config_path.display());
            Ok(())
        }
        ConfigAction::Show => show_config(&config_path),
        ConfigAction::Validate => {
            if validate_config(&config_path) {
                Ok(())
            } else {
                anyhow::bail!("Configuration is invalid")
            }
        }
    }
}

/// Load the file (or defaults) with environment overrides applied.
fn effective_config(config_path: &Path) -> Result<Config> {
    let config = if config_path.exists() {
        Config::load(config_path)?
    } else {
        Config::default()
    };
    Ok(config.with_env_overrides()?)
}

/// Show the effective configuration.
fn show_config(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        ui::info(&format!(
            "No config file at {}, showing defaults",
            config_path.display()
        ));
    }

    let config = effective_config(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Validate the configuration, reporting each check. Returns whether it passed.
fn validate_config(config_path: &Path) -> bool {
    ui::header("Validating Configuration");

    if config_path.exists() {
        let content = match std::fs::read_to_string(config_path) {
            Ok(content) => content,
            Err(e) => {
                ui::error(&format!("Cannot read {}: {e}", config_path.display()));
                return false;
            }
        };

        match json5::from_str::<serde_json::Value>(&content) {
            Ok(value) => {
                ui::success("Syntax: Valid JSON5");
                if value.get("auth").is_none() {
                    ui::warning("Missing 'auth' section, defaults apply");
                }
            }
            Err(e) => {
                ui::error(&format!("Syntax error: {e}"));
                return false;
            }
        }
    } else {
        ui::warning(&format!(
            "Config file not found: {}, defaults apply",
            config_path.display()
        ));
    }

    let config = match effective_config(config_path) {
        Ok(config) => {
            ui::success("Schema: Configuration is valid");
            config
        }
        Err(e) => {
            ui::error(&format!("Schema error: {e}"));
            return false;
        }
    };

    match GatewayAuthConfig::from_section(&config.auth) {
        Ok(auth) => {
            ui::success("Whitelists: All entries parse");
            if auth.key_management_whitelist.is_unrestricted() {
                ui::warning("Key management is reachable from any address");
            }
            true
        }
        Err(e) => {
            ui::error(&format!("Whitelist error: {e}"));
            false
        }
    }
}
