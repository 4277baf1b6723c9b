use std::net::SocketAddr;
use std::sync::Arc;

use tradeloom::datasource::{HttpQuoteProvider, MockQuoteProvider};
use tradeloom::orchestration::{Assembler, Ingestor, QuoteService};
use tradeloom::{api, config::Config, db::init_db, QuoteProvider, Repository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env()?;
    let port = config.port;

    let pool = init_db(&config.database_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let provider: Arc<dyn QuoteProvider> = match &config.quote_api_url {
        Some(url) => Arc::new(HttpQuoteProvider::new(url.clone())),
        None => {
            tracing::warn!("no QUOTE_API_URL configured, open positions value from cache or zero");
            Arc::new(MockQuoteProvider::new())
        }
    };
    let quotes = Arc::new(QuoteService::new(provider, repo.clone()));
    let assembler = Arc::new(Assembler::new(repo.clone(), quotes));
    let ingestor = Arc::new(Ingestor::new(repo.clone()));

    let app = api::create_router(api::AppState {
        repo,
        assembler,
        ingestor,
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
