use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the default tracing subscriber. `RUST_LOG` overrides the filter.
/// Calling it again after a subscriber is installed does nothing.
pub fn init() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confab=debug,confab_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_ok() {
        tracing::info!("Tracing initialized");
    }
}
