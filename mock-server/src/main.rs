use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mock_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let list_ids = std::env::var("LIST_IDS").unwrap_or_else(|_| "list1".to_string());
    let list_ids: Vec<&str> = list_ids.split(',').map(str::trim).filter(|id| !id.is_empty()).collect();

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, lists = ?list_ids, "mock mailchimp listening on /3.0");
    mock_server::run(listener, &list_ids).await
}
