//! Cloud session command handlers

use anyhow::{bail, Result};

use possync_core::SyncOrchestrator;

use super::with_recovery_hint;
use crate::output::Output;

/// Check a cloud URL (defaults to the configured one) without saving it
pub async fn test_connection(
    orchestrator: &SyncOrchestrator,
    url: Option<String>,
    output: &Output,
) -> Result<()> {
    let url = url.unwrap_or_else(|| orchestrator.configuration().cloud_url);
    let result = orchestrator.test_connection(&url).await;
    output.print_connection_test(&url, &result);

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Log in to the cloud and store the token
pub async fn login(
    orchestrator: &SyncOrchestrator,
    username: String,
    password: Option<String>,
    output: &Output,
) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => prompt_password()?,
    };

    if let Err(e) = orchestrator.login(&username, &password).await {
        if orchestrator.configuration().is_configured() {
            bail!(with_recovery_hint(
                format!("Login failed: {}", e),
                e.recovery_suggestion()
            ));
        }
        bail!(
            "Login failed: {}. Enable sync first with:\n  \
             possync sync-config set cloud_url https://your-server\n  \
             possync sync-config set enabled true",
            e
        );
    }

    output.success(&format!("Logged in as {}", username));
    Ok(())
}

/// Forget the stored token
pub fn logout(orchestrator: &SyncOrchestrator, output: &Output) -> Result<()> {
    orchestrator.logout();
    output.success("Logged out");
    Ok(())
}

fn prompt_password() -> Result<String> {
    use std::io::{self, Write};

    print!("Password: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let password = input.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("Password is required");
    }
    Ok(password)
}
