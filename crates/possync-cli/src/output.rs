//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use possync_core::{
    ConnectionTestResult, EntityRegistry, SyncConfiguration, SyncResult, SyncStatusSnapshot,
    WriteOutcome,
};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print the outcome of one sync cycle
    pub fn print_sync_result(&self, result: &SyncResult) {
        match self.format {
            OutputFormat::Human => {
                let mark = if result.success { "✓" } else { "✗" };
                println!(
                    "{} Sync {} at {}",
                    mark,
                    if result.success {
                        "complete"
                    } else {
                        "finished with errors"
                    },
                    result.completed_at.format("%Y-%m-%d %H:%M:%S")
                );
                println!("  Uploaded:   {}", result.uploaded);
                println!("  Downloaded: {}", result.downloaded);
                for error in &result.errors {
                    println!("  Error:      {}", error);
                }
            }
            OutputFormat::Json => print_json(result),
            OutputFormat::Quiet => {
                println!("{} {}", result.uploaded, result.downloaded);
            }
        }
    }

    /// Print local sync status alongside the orchestrator's view
    pub fn print_status(
        &self,
        status: &SyncStatusSnapshot,
        registry: &EntityRegistry,
        connected: bool,
        config: &SyncConfiguration,
    ) {
        match self.format {
            OutputFormat::Human => {
                println!("Sync Status");
                println!("===========");
                println!();
                println!(
                    "  Sync:      {}",
                    if config.enabled { "enabled" } else { "disabled" }
                );
                println!("  Server:    {}", config.cloud_url);
                println!("  Logged in: {}", if connected { "yes" } else { "no" });
                println!(
                    "  Pharmacy:  {}",
                    status.pharmacy_id.as_deref().unwrap_or("(unknown)")
                );
                println!(
                    "  Last sync: {}",
                    status
                        .last_sync_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "never".to_string())
                );
                println!();
                println!("Pending:");
                for entity in registry.iter() {
                    println!(
                        "  {:<10} {}",
                        format!("{}:", entity.label()),
                        status.pending_sync.get(entity)
                    );
                }
                println!("  {:<10} {}", "Total:", status.pending_sync.total);
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": status,
                        "connected": connected,
                        "configuration": config,
                    })
                );
            }
            OutputFormat::Quiet => {
                println!("{}", status.pending_sync.total);
            }
        }
    }

    /// Print sync settings
    pub fn print_sync_configuration(&self, config: &SyncConfiguration) {
        match self.format {
            OutputFormat::Human => {
                println!("Sync configuration:");
                println!("  cloud_url:     {}", config.cloud_url);
                println!("  enabled:       {}", config.enabled);
                println!("  auto_sync:     {}", config.auto_sync);
                println!("  sync_interval: {} min", config.sync_interval);
            }
            OutputFormat::Json => print_json(config),
            OutputFormat::Quiet => {
                println!("{}", config.enabled);
            }
        }
    }

    pub fn print_connection_test(&self, url: &str, result: &ConnectionTestResult) {
        match self.format {
            OutputFormat::Human => {
                let mark = if result.success { "✓" } else { "✗" };
                println!("{} {}: {}", mark, url, result.message);
            }
            OutputFormat::Json => print_json(result),
            OutputFormat::Quiet => {
                println!("{}", result.success);
            }
        }
    }

    pub fn print_write_outcome(&self, entity: &str, id: &str, outcome: &WriteOutcome) {
        let (state, detail) = match outcome {
            WriteOutcome::Applied => ("applied", "will upload with the next sync".to_string()),
            WriteOutcome::QueuedOffline => (
                "queued",
                "saved offline, will upload once sync is available".to_string(),
            ),
            WriteOutcome::Failed(reason) => ("failed", reason.clone()),
        };

        match self.format {
            OutputFormat::Human => {
                let mark = if outcome.is_stored() { "✓" } else { "✗" };
                println!("{} {} {}: {}", mark, entity, id, detail);
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "entity_type": entity,
                        "id": id,
                        "outcome": state,
                        "message": detail,
                    })
                );
            }
            OutputFormat::Quiet => {
                println!("{}", state);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an info message (not shown in quiet mode)
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}
