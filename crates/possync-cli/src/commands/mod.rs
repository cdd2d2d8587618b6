//! Command handlers

pub mod config;
pub mod record;
pub mod session;
pub mod status;
pub mod sync;
pub mod sync_config;

/// Append a recovery hint on its own line, when there is one
pub fn with_recovery_hint(message: String, hint: Option<&str>) -> String {
    match hint {
        Some(hint) => format!("{}\n{}", message, hint),
        None => message,
    }
}
