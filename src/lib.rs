pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod loader;
pub mod model;
pub mod query;
pub mod response;
pub mod schema;
pub mod server;
pub mod store;
pub mod value;

pub use async_graphql_value::ConstValue;
pub use config::Config;
pub use context::{Ctx, RequestContext};
pub use error::{Error, RequestError, ResolveError, Result, SchemaError, StoreError};
pub use executor::{Executor, ExecutorConfig};
pub use inventory::inventory_schema;
pub use loader::{BatchLoader, BatchResult, BoxFuture, LoaderRegistry};
pub use query::{FieldSelection, OperationKind, QueryShape};
pub use response::{PathSegment, Response, ServerError};
pub use schema::{FieldDefinition, InputObjectType, InputValue, ObjectType, Resolution, Schema, TypeRef};
pub use server::{GraphQLRequest, GraphQLResponse, GraphQLServer, GraphQLService};
pub use store::{MemoryStore, Store};
pub use value::{FromConstValue, ToConstValue};
