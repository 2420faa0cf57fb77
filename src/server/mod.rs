mod axum;
mod service;

pub use self::axum::{GraphQLRequest, GraphQLResponse, GraphQLServer, DEFAULT_ENDPOINT};
pub use service::GraphQLService;
