use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use super::GraphQLService;
use crate::response::{Response, ServerError};

pub const DEFAULT_ENDPOINT: &str = "/api/graphql";

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default)]
    pub variables: Option<serde_json::Value>,
    #[serde(default, rename = "operationName")]
    pub operation_name: Option<String>,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
            operation_name: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GraphQLResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ServerError>,
}

impl From<Response> for GraphQLResponse {
    fn from(response: Response) -> Self {
        Self {
            data: response
                .data
                .map(|data| data.into_json().unwrap_or(serde_json::Value::Null)),
            errors: response.errors,
        }
    }
}

impl GraphQLResponse {
    /// `200` whenever some data resolved, `400` for whole-request failures.
    pub fn status(&self) -> StatusCode {
        if self.data.is_some() {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        }
    }
}

struct AppState {
    service: GraphQLService,
}

pub struct GraphQLServer {
    service: GraphQLService,
    endpoint: String,
}

impl GraphQLServer {
    pub fn new(service: GraphQLService, endpoint: impl Into<String>) -> Self {
        Self {
            service,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn serve(self, addr: &str) -> crate::Result<()> {
        let addr: SocketAddr = addr.parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid address: {}", e),
            )
        })?;

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

        let endpoint = self.endpoint.clone();
        let app = self.router().layer(cors);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("GraphQL endpoint at http://{}{}", listener.local_addr()?, endpoint);
        axum::serve(listener, app).await?;
        Ok(())
    }

    /// `POST` on the endpoint (and any path below it) plus `GET /health`.
    pub fn router(self) -> Router {
        self.build(None)
    }

    /// Like [`router`](Self::router), handing every request the endpoint does
    /// not answer to `next` untouched, including non-`POST` requests on the
    /// endpoint path itself.
    pub fn router_with_fallback(self, next: Router) -> Router {
        self.build(Some(next))
    }

    fn build(self, next: Option<Router>) -> Router {
        let state = Arc::new(AppState {
            service: self.service,
        });

        let mut graphql = post(graphql_post_handler);
        if let Some(next) = &next {
            graphql = graphql.fallback_service(next.clone());
        }

        // The endpoint answers for its own path and every path below it.
        let nested = format!("{}/*rest", self.endpoint.trim_end_matches('/'));
        let router = Router::new()
            .route(&self.endpoint, graphql.clone())
            .route(&nested, graphql)
            .route("/health", get(health_handler))
            .with_state(state);

        match next {
            Some(next) => router.fallback_service(next),
            None => router,
        }
    }
}

async fn graphql_post_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GraphQLRequest>,
) -> impl IntoResponse {
    tracing::debug!(operation = ?request.operation_name, "graphql request");

    let response = GraphQLResponse::from(state.service.execute(request).await);
    (response.status(), Json(response))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::inventory_schema;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use hyper::Request;
    use tower::ServiceExt;

    fn create_test_server() -> GraphQLServer {
        let schema = inventory_schema(Arc::new(MemoryStore::seeded())).unwrap();
        GraphQLServer::new(GraphQLService::new(Arc::new(schema)), DEFAULT_ENDPOINT)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn graphql_post(app: &Router, body: &str) -> (StatusCode, serde_json::Value) {
        let (status, body) = send(
            app,
            Request::builder()
                .method("POST")
                .uri(DEFAULT_ENDPOINT)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn fallback() -> Router {
        Router::new().fallback(|method: Method, uri: axum::http::Uri| async move {
            format!("next: {} {}", method, uri.path())
        })
    }

    #[tokio::test]
    async fn test_graphql_request_parsing() {
        let json = r#"{"query": "{ items { title } }"}"#;
        let request: GraphQLRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.query, "{ items { title } }");
        assert!(request.variables.is_none());
        assert!(request.operation_name.is_none());
    }

    #[tokio::test]
    async fn test_graphql_request_with_operation_name() {
        let json = r#"{"query": "query GetItems { items { title } }", "operationName": "GetItems"}"#;
        let request: GraphQLRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.operation_name, Some("GetItems".to_string()));
    }

    #[tokio::test]
    async fn test_simple_query() {
        let app = create_test_server().router();

        let (status, json) = graphql_post(&app, r#"{"query": "{ item(barcode: \"123\") { title sellingPrice } }"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["item"]["title"], "Headphone");
        assert_eq!(json["data"]["item"]["sellingPrice"], 50.0);
        assert!(json.get("errors").is_none());
    }

    #[tokio::test]
    async fn test_query_with_variables() {
        let app = create_test_server().router();

        let body = r#"{
            "query": "query Find($code: String!) { item(barcode: $code) { title } }",
            "variables": {"code": "789"}
        }"#;

        let (status, json) = graphql_post(&app, body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["item"]["title"], "Monitor");
    }

    #[tokio::test]
    async fn test_field_error_keeps_status_ok() {
        let app = create_test_server().router();

        let (status, json) =
            graphql_post(&app, r#"{"query": "{ items { title } nonexistent }"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["items"].as_array().unwrap().len(), 3);
        assert!(json["data"]["nonexistent"].is_null());
        assert_eq!(json["errors"][0]["path"], serde_json::json!(["nonexistent"]));
        assert_eq!(json["errors"][0]["extensions"]["code"], "UNKNOWN_FIELD");
    }

    #[tokio::test]
    async fn test_syntax_error_returns_error() {
        let app = create_test_server().router();

        let (status, json) = graphql_post(&app, r#"{"query": "{ items"}"#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json.get("data").is_none());
        assert_eq!(json["errors"][0]["extensions"]["code"], "PARSE_ERROR");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_server().router();

        let (status, body) = send(
            &app,
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_endpoint_accepts_post_only() {
        let app = create_test_server().router();

        let (status, _) = send(
            &app,
            Request::builder()
                .method("GET")
                .uri(DEFAULT_ENDPOINT)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_other_traffic_reaches_fallback() {
        let app = create_test_server().router_with_fallback(fallback());

        let (status, body) = send(
            &app,
            Request::builder()
                .method("GET")
                .uri("/index.html")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(String::from_utf8(body).unwrap(), "next: GET /index.html");

        let (status, body) = send(
            &app,
            Request::builder()
                .method("GET")
                .uri(DEFAULT_ENDPOINT)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(String::from_utf8(body).unwrap(), "next: GET /api/graphql");

        let (status, json) = graphql_post(&app, r#"{"query": "{ items { barcode } }"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["items"][2]["barcode"], "789");
    }

    #[tokio::test]
    async fn test_paths_below_endpoint_are_served() {
        let app = create_test_server().router_with_fallback(fallback());

        let (status, body) = send(
            &app,
            Request::builder()
                .method("POST")
                .uri("/api/graphql/inventory")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"query": "{ item(barcode: \"456\") { title } }"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"]["item"]["title"], "Keyboard");

        let (_, body) = send(
            &app,
            Request::builder()
                .method("POST")
                .uri("/api/graphqlx")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(String::from_utf8(body).unwrap(), "next: POST /api/graphqlx");
    }

    #[test]
    fn test_graphql_response_serialization_with_data() {
        let response = GraphQLResponse {
            data: Some(serde_json::json!({"items": []})),
            errors: vec![],
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("items"));
        assert!(!json.contains("errors"));
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_graphql_response_serialization_with_errors() {
        let response = GraphQLResponse::from(Response::from_request_error(
            &crate::error::RequestError::Cancelled,
        ));

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("REQUEST_CANCELLED"));
        assert!(!json.contains("data"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
