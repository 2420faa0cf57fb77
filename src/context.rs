//! Per-request state and the context handed to every resolver call.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_graphql_value::{ConstValue, Name};
use indexmap::IndexMap;
use tokio::sync::Notify;

use crate::error::ResolveError;
use crate::loader::{BatchLoader, BatchResult, BoxFuture, LoaderRegistry};
use crate::value::FromConstValue;

/// State owned by exactly one request.
///
/// Holds the request's loaders, so batched results never leak into another
/// request. Dropping the context drops every loader and placeholder with it.
#[derive(Default)]
pub struct RequestContext {
    loaders: LoaderRegistry,
    variables: HashMap<String, ConstValue>,
    cancelled: AtomicBool,
    cancel_notify: Notify,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variables(variables: HashMap<String, ConstValue>) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    pub fn loaders(&self) -> &LoaderRegistry {
        &self.loaders
    }

    pub fn variable(&self, name: &str) -> Option<&ConstValue> {
        self.variables.get(name)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.cancel_notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("loaders", &self.loaders.len())
            .field("variables", &self.variables)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[derive(Debug)]
pub struct Ctx<'a> {
    value: Option<&'a ConstValue>,
    args: &'a IndexMap<Name, ConstValue>,
    request: &'a Arc<RequestContext>,
}

impl<'a> Ctx<'a> {
    pub fn new(
        value: Option<&'a ConstValue>,
        args: &'a IndexMap<Name, ConstValue>,
        request: &'a Arc<RequestContext>,
    ) -> Self {
        Self {
            value,
            args,
            request,
        }
    }

    pub fn arg(&self, name: &str) -> Option<&ConstValue> {
        self.args.get(name)
    }

    pub fn arg_as<T: FromConstValue>(&self, name: &str) -> Option<T> {
        self.arg(name).and_then(|v| T::from_const_value(v).ok())
    }

    /// Reads an argument, failing the field when it is missing or malformed.
    pub fn try_arg<T: FromConstValue>(&self, name: &str) -> Result<T, ResolveError> {
        let value = self.arg(name).unwrap_or(&ConstValue::Null);
        T::from_const_value(value).map_err(|found| ResolveError::ArgumentTypeMismatch {
            argument: name.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            found,
        })
    }

    pub fn parent(&self) -> Option<&ConstValue> {
        self.value
    }

    pub fn parent_as<T: FromConstValue>(&self) -> Option<T> {
        self.value.and_then(|v| T::from_const_value(v).ok())
    }

    pub fn parent_field(&self, name: &str) -> Option<&ConstValue> {
        match self.value? {
            ConstValue::Object(obj) => obj.get(name),
            _ => None,
        }
    }

    /// Reads a field of the parent object, failing the field when absent.
    pub fn try_parent_field<T: FromConstValue>(&self, name: &str) -> Result<T, ResolveError> {
        let value = self.parent_field(name).unwrap_or(&ConstValue::Null);
        T::from_const_value(value)
            .map_err(|e| ResolveError::resolver(format!("parent field '{}': {}", name, e)))
    }

    pub fn variable(&self, name: &str) -> Option<&ConstValue> {
        self.request.variable(name)
    }

    pub fn request(&self) -> &Arc<RequestContext> {
        self.request
    }

    /// The request's loader registered under `name`, created with `loader_fn`
    /// on first use.
    pub fn loader<K, V, F>(
        &self,
        name: &str,
        loader_fn: F,
    ) -> Result<Arc<BatchLoader<K, V>>, ResolveError>
    where
        K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: Fn(Vec<K>) -> BoxFuture<'static, BatchResult<K, V>> + Send + Sync + 'static,
    {
        self.request.loaders().get_or_add(name, loader_fn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{object, ToConstValue};
    use std::time::Duration;

    #[test]
    fn test_ctx_accessors() {
        let parent = object([
            ("orderId", 3i64.to_const_value()),
            ("tag", "gift".to_const_value()),
        ]);
        let mut args = IndexMap::new();
        args.insert(Name::new("limit"), 10i64.to_const_value());
        let request = Arc::new(RequestContext::with_variables(HashMap::from([(
            "who".to_string(),
            "ada".to_const_value(),
        )])));

        let ctx = Ctx::new(Some(&parent), &args, &request);
        assert_eq!(ctx.arg_as::<i64>("limit"), Some(10));
        assert_eq!(ctx.try_parent_field::<i64>("orderId"), Ok(3));
        assert!(ctx.try_parent_field::<i64>("customerId").is_err());
        assert_eq!(ctx.variable("who"), Some(&"ada".to_const_value()));

        let err = ctx.try_arg::<String>("limit").unwrap_err();
        assert!(matches!(err, ResolveError::ArgumentTypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let request = Arc::new(RequestContext::new());
        let waiter = {
            let request = request.clone();
            tokio::spawn(async move { request.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        request.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(request.is_cancelled());
    }
}
