//! Logging configuration using tracing
//!
//! Structured logging to stderr, filtered through the RUST_LOG environment variable.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber
///
/// Filtering comes from RUST_LOG and defaults to "warn" so that the outcome
/// printed on stdout stays the only noise.
///
/// # Example RUST_LOG values
/// - `RUST_LOG=info` - phase start/finish
/// - `RUST_LOG=cardsync=debug` - every page fetched
/// - `RUST_LOG=cardsync::extraction=trace,reqwest=info`
///
/// # Errors
/// Returns an error if the subscriber has already been initialized
pub fn init() -> crate::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true),
        )
        .try_init()
        .map_err(|e| crate::SyncError::Other(format!("Failed to initialize tracing: {}", e)))?;

    Ok(())
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_helper() {
        init_test();
        init_test();
    }

    #[test]
    fn test_structured_fields() {
        init_test();
        tracing::info!(phase = "cards", count = 10, "Pushed page");
        tracing::warn!(delay_seconds = 5, "Rate limited");
    }
}
