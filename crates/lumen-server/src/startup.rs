//! Startup banner and summary.

use lumen_config::AppConfig;
use tracing::info;

/// Prints the startup banner.
pub fn print_banner() {
    info!(r#"
    __
   / /   __  ______ ___  ___  ____
  / /   / / / / __ `__ \/ _ \/ __ \
 / /___/ /_/ / / / / / /  __/ / / /
/_____/\__,_/_/ /_/ /_/\___/_/ /_/

         thumbnails, live
    "#);
}

/// Prints what this process runs and where.
pub fn print_startup_info(config: &AppConfig) {
    let separator = "=".repeat(60);
    let addr = config.server.addr();
    info!("{}", separator);
    info!("Role:      {}", config.role);
    if config.role.runs_gateway() {
        info!("Realtime:  ws://{}{}", addr, config.realtime.path);
        info!("Jobs API:  http://{}/api/v1/jobs", addr);
        info!("Health:    http://{}/health", addr);
    }
    if config.role.runs_workers() {
        info!(
            "Workers:   {} on queue '{}'",
            config.jobs.concurrency, config.jobs.queue_name
        );
    }
    if config.observability.metrics_enabled {
        info!("Metrics:   http://{}{}", addr, config.observability.metrics_path);
    }
    info!("{}", separator);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_config::ProcessRole;

    #[test]
    fn test_print_banner_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_banner();
    }

    #[test]
    fn test_print_startup_info_for_each_role() {
        let _ = tracing_subscriber::fmt::try_init();
        let mut config = AppConfig::default();
        for role in [ProcessRole::All, ProcessRole::Worker, ProcessRole::Gateway] {
            config.role = role;
            print_startup_info(&config);
        }
    }
}
