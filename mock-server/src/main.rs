use mock_server::{StubConfig, StubServer};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let mut config = StubConfig::default();
    if std::env::var("PV_WRAPPED_TEXT").is_ok_and(|v| v == "1" || v == "true") {
        config = config.wrapped();
    }

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, wrapped = config.wrapped_text, "stub RPM server listening");
    mock_server::run(listener, StubServer::new(config)).await
}
