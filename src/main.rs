use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use soulmate_api::{
    api::{create_router, AppState},
    config::Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,soulmate_api=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Initialize application state
    let state = AppState::from_config(&config).await?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        model = %config.openai_model,
        "Profile store and completion client ready"
    );

    // Create the router with all routes
    let app = create_router(state);

    // Start the server
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Server running on http://{}", address);
    axum::serve(listener, app).await?;

    Ok(())
}
