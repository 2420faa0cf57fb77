use std::sync::Arc;

use clap::Parser;
use inventory_graphql::{inventory_schema, Config, GraphQLServer, GraphQLService, MemoryStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inventory_graphql=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    tracing::info!(
        listen = %config.listen,
        endpoint = %config.endpoint,
        seed = config.seed,
        "starting inventory server"
    );

    let store = if config.seed {
        MemoryStore::seeded()
    } else {
        MemoryStore::new()
    };
    let schema = inventory_schema(Arc::new(store))?;
    let service = GraphQLService::with_config(Arc::new(schema), config.executor_config());

    GraphQLServer::new(service, config.endpoint.clone())
        .serve(&config.listen)
        .await?;
    Ok(())
}
