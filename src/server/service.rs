use std::collections::HashMap;
use std::sync::Arc;

use async_graphql_value::ConstValue;

use crate::context::RequestContext;
use crate::error::RequestError;
use crate::executor::{Executor, ExecutorConfig};
use crate::query::QueryShape;
use crate::response::Response;
use crate::schema::Schema;

use super::GraphQLRequest;

/// Executes GraphQL requests against one schema. Every call gets its own
/// [`RequestContext`], so loaders and their caches live for one request only.
#[derive(Clone, Debug)]
pub struct GraphQLService {
    executor: Arc<Executor>,
}

impl GraphQLService {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_config(schema, ExecutorConfig::default())
    }

    pub fn with_config(schema: Arc<Schema>, config: ExecutorConfig) -> Self {
        Self {
            executor: Arc::new(Executor::with_config(schema, config)),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.executor.schema()
    }

    pub async fn execute(&self, request: GraphQLRequest) -> Response {
        let variables = match request.variables.map(variables_from_json).transpose() {
            Ok(variables) => variables.unwrap_or_default(),
            Err(error) => return Response::from_request_error(&error),
        };

        let shape = match QueryShape::parse(
            &request.query,
            request.operation_name.as_deref(),
            &variables,
        ) {
            Ok(shape) => shape,
            Err(error) => {
                tracing::debug!(%error, "rejected request");
                return Response::from_request_error(&error);
            }
        };

        let context = Arc::new(RequestContext::with_variables(variables));
        self.executor.execute_with_timeout(&shape, context).await
    }

    pub async fn execute_query(&self, query: &str) -> Response {
        self.execute(GraphQLRequest::new(query)).await
    }

    pub async fn execute_with_variables(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Response {
        let mut request = GraphQLRequest::new(query);
        request.variables = Some(variables);
        self.execute(request).await
    }
}

fn variables_from_json(
    variables: serde_json::Value,
) -> Result<HashMap<String, ConstValue>, RequestError> {
    match variables {
        serde_json::Value::Null => Ok(HashMap::new()),
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(name, value)| match ConstValue::from_json(value) {
                Ok(value) => Ok((name, value)),
                Err(e) => Err(RequestError::Parse {
                    message: format!("variable '{}': {}", name, e),
                }),
            })
            .collect(),
        _ => Err(RequestError::Parse {
            message: "variables must be an object".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::inventory_schema;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn service() -> GraphQLService {
        let schema = inventory_schema(Arc::new(MemoryStore::seeded())).unwrap();
        GraphQLService::new(Arc::new(schema))
    }

    #[tokio::test]
    async fn test_execute_query() {
        let response = service().execute_query("{ items { barcode title } }").await;

        assert!(response.is_ok());
        let data = response.into_json()["data"].clone();
        assert_eq!(data["items"].as_array().unwrap().len(), 3);
        assert_eq!(data["items"][0], json!({ "barcode": "123", "title": "Headphone" }));
    }

    #[tokio::test]
    async fn test_execute_with_variables() {
        let response = service()
            .execute_with_variables(
                "query Find($code: String!) { item(barcode: $code) { title } }",
                json!({ "code": "456" }),
            )
            .await;

        assert_eq!(response.into_json()["data"]["item"]["title"], "Keyboard");
    }

    #[tokio::test]
    async fn test_rejected_requests_carry_no_data() {
        let service = service();

        let syntax = service.execute_query("{ items {").await;
        assert!(syntax.data.is_none());
        assert_eq!(syntax.errors[0].extensions.code, "PARSE_ERROR");
        assert!(syntax.errors[0].path.is_empty());

        let variables = service
            .execute_with_variables("{ items { title } }", json!([1, 2]))
            .await;
        assert!(variables.data.is_none());
    }

    #[tokio::test]
    async fn test_self_spreading_fragment_is_rejected() {
        let response = service()
            .execute_query("{ ...A } fragment A on Query { items { title } ...A }")
            .await;

        assert!(response.data.is_none());
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].extensions.code, "FRAGMENT_CYCLE");
    }

    #[tokio::test]
    async fn test_repeated_fields_keep_every_subfield() {
        let service = service();

        let response = service.execute_query("{ items { barcode } items { title } }").await;
        assert!(response.is_ok(), "{:?}", response.errors);
        let data = response.into_json()["data"].clone();
        assert_eq!(data["items"][0]["barcode"], "123");
        assert_eq!(data["items"][0]["title"], "Headphone");

        service
            .execute_query(
                "mutation { createCustomer(customer: { name: \"Ada\", billingAddress: \"1 Loop\" }) { customerId } }",
            )
            .await;
        service
            .execute_query(
                "mutation { createOrder(order: { tag: \"t\", createdAt: \"now\", customerId: 1 }) { orderId } }",
            )
            .await;

        let response = service
            .execute_query(
                "{ orders { customer { name } ...F } } fragment F on Order { customer { billingAddress } }",
            )
            .await;
        assert!(response.is_ok(), "{:?}", response.errors);
        assert_eq!(
            response.into_json()["data"]["orders"][0]["customer"],
            json!({ "name": "Ada", "billingAddress": "1 Loop" })
        );
    }

    #[tokio::test]
    async fn test_writes_visible_to_later_requests() {
        let store = Arc::new(MemoryStore::seeded());
        let schema = Arc::new(inventory_schema(store.clone()).unwrap());
        let service = GraphQLService::with_config(
            schema,
            ExecutorConfig {
                request_timeout: Some(Duration::from_secs(5)),
            },
        );
        let query = "mutation { addOrderItem(orderitem: { barcode: \"123\", quantity: 1, orderId: 1 }) { id } }";

        let before = service.execute_query(query).await;
        assert_eq!(before.errors[0].extensions.code, "STORE_ERROR");

        service
            .execute_query(
                "mutation { createCustomer(customer: { name: \"Eve\", billingAddress: \"x\" }) { customerId } }",
            )
            .await;
        service
            .execute_query(
                "mutation { createOrder(order: { tag: \"t\", createdAt: \"now\", customerId: 1 }) { orderId } }",
            )
            .await;

        let after = service
            .execute_query("{ order(id: 1) { customer { name } } }")
            .await;
        assert!(after.is_ok(), "{:?}", after.errors);
        assert_eq!(after.into_json()["data"]["order"]["customer"]["name"], "Eve");
    }
}
