use tracing_subscriber::EnvFilter;

const SERVICE_FILTER: &str = "info,sqlx=warn";
const CLI_FILTER: &str = "warn";

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// JSON logs for long-running services. `RUST_LOG` overrides the filter.
pub fn init(service_name: &str) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter_or(SERVICE_FILTER))
        .json()
        .flatten_event(true)
        .with_target(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            service = service_name,
            version = env!("CARGO_PKG_VERSION"),
            "logging initialized"
        );
    }
}

/// Plain-text logs on stderr for interactive commands, so stdout stays
/// machine-readable.
pub fn init_cli() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or(CLI_FILTER))
        .with_writer(std::io::stderr)
        .try_init();
}
