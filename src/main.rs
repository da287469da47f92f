use std::sync::Arc;

use dotenv::dotenv;
use tracing::info;

use reelverse::{blob::LocalBlobStore, config::settings::Settings, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelverse=info,tower_http=info".into()),
        )
        .init();

    let settings = Settings::from_env()?;
    let store = reelverse::connect_store(&settings).await?;

    tokio::fs::create_dir_all(&settings.media_dir).await?;
    let blobs = Arc::new(LocalBlobStore::new(
        settings.media_dir.clone(),
        settings.media_base_url.clone(),
    ));

    let app_state = AppState {
        store,
        blobs,
        settings: settings.clone(),
    };
    let app = reelverse::router(app_state);

    info!("Server running on http://localhost:{}", settings.port);

    let listener = tokio::net::TcpListener::bind(settings.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
