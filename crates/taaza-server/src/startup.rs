//! Server startup utilities.

use taaza_config::AppConfig;
use tracing::info;

/// Prints the startup banner.
pub fn print_banner() {
    info!(
        r"
  _____
 |_   _|_ _  __ _ ______ _
   | |/ _` |/ _` |_  / _` |
   | | (_| | (_| |/ / (_| |
   |_|\__,_|\__,_/___\__,_|

        Email Service
    "
    );
}

/// Prints server startup information.
pub fn print_startup_info(config: &AppConfig) {
    let separator = "=".repeat(60);
    let port = config.server.port;
    info!("{}", separator);
    info!("REST API:  http://0.0.0.0:{}/api/v1/email", port);
    info!("Health:    http://0.0.0.0:{}/health", port);
    info!("Workers:   {}", config.email.worker_count);
    info!(
        "Limit:     {} emails per recipient per {}s{}",
        config.email.rate_limit.per_recipient_limit,
        config.email.rate_limit.window_secs,
        if config.email.rate_limit.enabled { "" } else { " (disabled)" }
    );
    info!("{}", separator);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_banner_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_banner();
    }

    #[test]
    fn test_print_startup_info_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_startup_info(&AppConfig::default());
    }
}
