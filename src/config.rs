use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::executor::ExecutorConfig;
use crate::server::DEFAULT_ENDPOINT;

/// Server settings, read from the command line or the environment.
#[derive(Clone, Debug, Parser)]
#[command(name = "inventory-graphql", about = "Inventory GraphQL server")]
pub struct Config {
    /// Address to bind.
    #[arg(long, env = "INVENTORY_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: String,

    /// Path answering GraphQL `POST` requests.
    #[arg(long, env = "INVENTORY_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Requests running longer than this are cancelled. `0` disables the limit.
    #[arg(long, env = "INVENTORY_REQUEST_TIMEOUT_MS", default_value_t = 30_000)]
    pub request_timeout_ms: u64,

    /// Start with the demo catalogue in the store.
    #[arg(long, env = "INVENTORY_SEED", default_value_t = true, action = ArgAction::Set)]
    pub seed: bool,
}

impl Config {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            request_timeout: (self.request_timeout_ms > 0)
                .then(|| Duration::from_millis(self.request_timeout_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["inventory-graphql"]).unwrap();

        assert_eq!(config.listen, "127.0.0.1:8080");
        assert_eq!(config.endpoint, "/api/graphql");
        assert!(config.seed);
        assert_eq!(
            config.executor_config().request_timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::try_parse_from([
            "inventory-graphql",
            "--listen",
            "0.0.0.0:9000",
            "--request-timeout-ms",
            "0",
            "--seed",
            "false",
        ])
        .unwrap();

        assert_eq!(config.listen, "0.0.0.0:9000");
        assert!(!config.seed);
        assert_eq!(config.executor_config().request_timeout, None);
    }
}
