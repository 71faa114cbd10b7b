use backend::{app, AppState, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config).await;
    let app = app(state);

    info!("Starting server on {bind_addr}");
    axum::serve(
        tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("bind"),
        app,
    )
    .await
    .expect("server error");
}
