//! Whitelist check command.

use std::net::IpAddr;

use anyhow::Result;
use pamgate_core::Config;
use pamgate_gateway::{GatewayAuthConfig, WhitelistPolicy};

use crate::ui;

/// Whitelist command arguments.
#[derive(Debug, Clone)]
pub struct WhitelistArgs {
    /// Address to check.
    pub addr: IpAddr,
    /// Check the key-management whitelist instead of form login.
    pub key_management: bool,
}

/// Run the whitelist check. Returns whether the address is permitted.
pub fn run_whitelist(args: &WhitelistArgs) -> Result<bool> {
    let config = Config::load_default()?.with_env_overrides()?;
    let auth = GatewayAuthConfig::from_section(&config.auth)?;

    let (name, policy) = select_policy(&auth, args.key_management);
    let permitted = policy.permits(args.addr);

    ui::kv("Gateway", name);
    ui::kv("Ranges", &describe(policy));
    if permitted {
        ui::success(&format!("{} is whitelisted", args.addr));
    } else {
        ui::error(&format!("{} is not whitelisted", args.addr));
    }

    Ok(permitted)
}

fn select_policy(auth: &GatewayAuthConfig, key_management: bool) -> (&'static str, &WhitelistPolicy) {
    if key_management {
        ("key-management", &auth.key_management_whitelist)
    } else {
        ("form-login", &auth.form_login_whitelist)
    }
}

fn describe(policy: &WhitelistPolicy) -> String {
    if policy.ranges().is_empty() {
        return "(none)".to_string();
    }
    policy
        .ranges()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
