use std::fmt;

use async_graphql_value::ConstValue;
use serde::Serialize;

use crate::error::{RequestError, ResolveError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{}", name),
            Self::Index(index) => write!(f, "{}", index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorExtensions {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerError {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    pub extensions: ErrorExtensions,
}

impl ServerError {
    pub fn field(error: &ResolveError, path: Vec<PathSegment>) -> Self {
        Self {
            message: error.to_string(),
            path,
            extensions: ErrorExtensions {
                code: error.code().to_string(),
            },
        }
    }

    pub fn request(error: &RequestError) -> Self {
        Self {
            message: error.to_string(),
            path: Vec::new(),
            extensions: ErrorExtensions {
                code: error.code().to_string(),
            },
        }
    }

    /// Dotted form of the path, e.g. `orders.0.customer`.
    pub fn path_string(&self) -> String {
        self.path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Outcome of executing one request: whatever resolved plus per-field errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ConstValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ServerError>,
}

impl Response {
    pub fn new(data: ConstValue, errors: Vec<ServerError>) -> Self {
        Self {
            data: Some(data),
            errors,
        }
    }

    /// A whole-request failure carrying no data.
    pub fn from_request_error(error: &RequestError) -> Self {
        Self {
            data: None,
            errors: vec![ServerError::request(error)],
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_json(self) -> serde_json::Value {
        serde_json::to_value(&self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::object;
    use serde_json::json;

    #[test]
    fn test_response_serialization() {
        let error = ResolveError::resolver("boom");
        let response = Response::new(
            object([("a", ConstValue::Number(1.into())), ("b", ConstValue::Null)]),
            vec![ServerError::field(
                &error,
                vec![
                    PathSegment::Field("orders".to_string()),
                    PathSegment::Index(0),
                    PathSegment::Field("b".to_string()),
                ],
            )],
        );

        assert_eq!(
            response.into_json(),
            json!({
                "data": { "a": 1, "b": null },
                "errors": [{
                    "message": "boom",
                    "path": ["orders", 0, "b"],
                    "extensions": { "code": "RESOLVER_ERROR" }
                }]
            })
        );
    }

    #[test]
    fn test_request_error_has_no_data() {
        let response = Response::from_request_error(&RequestError::Cancelled);
        let json = response.into_json();
        assert!(json.get("data").is_none());
        assert_eq!(json["errors"][0]["extensions"]["code"], "REQUEST_CANCELLED");
        assert!(json["errors"][0].get("path").is_none());
    }
}
