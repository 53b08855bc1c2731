use mock_cms::MockCms;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mock_cms=debug")),
        )
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let client_id = std::env::var("MOCK_CLIENT_ID").unwrap_or_else(|_| "mock-client".to_string());
    let client_secret =
        std::env::var("MOCK_CLIENT_SECRET").unwrap_or_else(|_| "mock-secret".to_string());

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, %client_id, "mock CMS listening");
    mock_cms::run(listener, MockCms::new(client_id, client_secret)).await
}
