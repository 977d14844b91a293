use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,gridcast=debug";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
/// Logs go to stderr so command output on stdout stays clean.
pub fn init(json: bool) {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(EnvFilter::new(env_filter))
        .with(json_layer)
        .with(text_layer)
        .init();
}
