//! Login command: one attempt through the configured gateway.

use std::net::IpAddr;

use anyhow::Result;
use pamgate_core::{Config, Secret};
use pamgate_gateway::{AuthenticationOutcome, AuthenticationRequest, gateways_from_config};

use crate::ui;

/// Environment variable consulted before prompting for a password.
pub const PASSWORD_ENV: &str = "PAMGATE_PASSWORD";

/// Login command arguments.
#[derive(Debug, Clone)]
pub struct LoginArgs {
    /// Username to authenticate.
    pub username: String,
    /// Origin address of the attempt.
    pub origin: IpAddr,
    /// Use the key-management gateway.
    pub key_management: bool,
}

/// Run the login command. Returns whether access was granted.
pub async fn run_login(args: LoginArgs) -> Result<bool> {
    let config = Config::load_default()?.with_env_overrides()?;
    let gateways = gateways_from_config(&config)?;
    let gateway = if args.key_management {
        gateways.key_management
    } else {
        gateways.form_login
    };

    let secret = read_secret(&args.username)?;
    let request = AuthenticationRequest::username_password(args.username, secret);

    let outcome = gateway.authenticate(request, args.origin).await;
    report(gateway.name(), &outcome);
    Ok(outcome.is_granted())
}

fn read_secret(username: &str) -> Result<Secret> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        tracing::debug!("Using password from {}", PASSWORD_ENV);
        return Ok(Secret::from(password));
    }
    let password = ui::prompts::password(&format!("Password for {username}"))?;
    Ok(Secret::from(password))
}

fn report(gateway: &str, outcome: &AuthenticationOutcome) {
    ui::header(&format!("Login via {gateway}"));
    match outcome {
        AuthenticationOutcome::Granted(granted) => {
            ui::success(&format!("Access granted to {}", granted.username));
            ui::kv("Grants", "");
            for grant in &granted.grants {
                ui::item(grant.as_str());
            }
        }
        AuthenticationOutcome::Denied(denial) => {
            ui::error(&format!("Access denied: {}", denial.kind));
            ui::kv("Code", denial.kind.code());
            ui::kv("Detail", &denial.detail);
            if denial.kind.is_transient() {
                ui::info("The identity backend may recover; try again later");
            }
        }
    }
}
