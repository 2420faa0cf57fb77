//! Field resolution engine.
//!
//! Execution proceeds in ticks. A tick first runs every queued field
//! synchronously: immediate results complete on the spot and queue their nested
//! selections into the same tick, deferred results join the tick's wait-set.
//! The wait-set is then driven until it drains. Whenever it stops making
//! progress while loaders hold pending keys, all loaders are dispatched
//! together. Dispatches are polled next to the wait-set, so a slow bulk fetch
//! never stalls fields waiting on something else. Nested selections of deferred results form the next tick, so keys
//! discovered on one level of the query land in the same batch.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use async_graphql_value::{ConstValue, Name};
use futures::future::poll_fn;
use futures_util::stream::FuturesUnordered;
use futures_util::task::{waker, ArcWake};
use futures_util::StreamExt;

use crate::context::{Ctx, RequestContext};
use crate::error::{RequestError, ResolveError};
use crate::loader::{BoxFuture, LoaderRegistry};
use crate::query::{FieldSelection, OperationKind, QueryShape};
use crate::response::{PathSegment, Response, ServerError};
use crate::schema::{Resolution, Schema, TypeRef};
use crate::value::kind_of;

/// Consecutive self-wakes tolerated in one poll before yielding to the runtime.
const MAX_SPINS: usize = 64;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on a whole request. `None` disables the timeout.
    pub request_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

pub struct Executor {
    schema: Arc<Schema>,
    config: ExecutorConfig,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .finish()
    }
}

type NodeId = usize;

#[derive(Debug)]
enum NodeState {
    Pending,
    Resolving,
    Resolved(Completed),
    Failed,
}

#[derive(Debug)]
enum Completed {
    Null,
    Leaf(ConstValue),
    Object(Vec<(Name, NodeId)>),
    List(Vec<NodeId>),
}

/// Arena holding one node per requested field or list element.
#[derive(Debug, Default)]
struct ResultTree {
    nodes: Vec<NodeState>,
    errors: Vec<ServerError>,
}

impl ResultTree {
    fn alloc(&mut self) -> NodeId {
        self.nodes.push(NodeState::Pending);
        self.nodes.len() - 1
    }

    fn set(&mut self, node: NodeId, state: NodeState) {
        self.nodes[node] = state;
    }

    fn resolve(&mut self, node: NodeId, completed: Completed) {
        self.set(node, NodeState::Resolved(completed));
    }

    fn fail(&mut self, node: NodeId, path: &[PathSegment], error: &ResolveError) {
        tracing::debug!(path = ?path, %error, "field failed");
        self.set(node, NodeState::Failed);
        self.errors.push(ServerError::field(error, path.to_vec()));
    }

    fn render(&self, node: NodeId) -> ConstValue {
        match &self.nodes[node] {
            NodeState::Resolved(Completed::Leaf(value)) => value.clone(),
            NodeState::Resolved(Completed::Object(fields)) => ConstValue::Object(
                fields
                    .iter()
                    .map(|(key, child)| (key.clone(), self.render(*child)))
                    .collect(),
            ),
            NodeState::Resolved(Completed::List(items)) => {
                ConstValue::List(items.iter().map(|child| self.render(*child)).collect())
            }
            NodeState::Resolved(Completed::Null)
            | NodeState::Failed
            | NodeState::Pending
            | NodeState::Resolving => ConstValue::Null,
        }
    }
}

struct Job<'a> {
    node: NodeId,
    path: Vec<PathSegment>,
    parent_type: &'a str,
    parent: Option<Arc<ConstValue>>,
    selection: &'a FieldSelection,
}

/// Bookkeeping for a deferred field while its future is in the wait-set.
struct Waiting<'a> {
    node: NodeId,
    path: Vec<PathSegment>,
    ty: &'a TypeRef,
    selection: &'a FieldSelection,
}

type Outcome = (usize, Result<ConstValue, ResolveError>);

struct WaitSet<'a> {
    waiting: Vec<Waiting<'a>>,
    futures: FuturesUnordered<BoxFuture<'static, Outcome>>,
}

impl<'a> WaitSet<'a> {
    fn new() -> Self {
        Self {
            waiting: Vec::new(),
            futures: FuturesUnordered::new(),
        }
    }

    fn push(
        &mut self,
        waiting: Waiting<'a>,
        future: BoxFuture<'static, Result<ConstValue, ResolveError>>,
    ) {
        let index = self.waiting.len();
        self.waiting.push(waiting);
        self.futures
            .push(Box::pin(async move { (index, future.await) }));
    }

    fn len(&self) -> usize {
        self.futures.len()
    }
}

enum Progress {
    Completed(Outcome),
    Dispatch,
    Drained,
}

/// Records whether anything was woken while the wait-set was being polled.
struct WakeFlag {
    woken: AtomicBool,
    parent: Waker,
}

impl ArcWake for WakeFlag {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.woken.store(true, Ordering::SeqCst);
        arc_self.parent.wake_by_ref();
    }
}

/// Polls the wait-set and the in-flight loader dispatches together until a
/// field completes, or until no field can make progress without a new
/// dispatch.
fn poll_progress(
    cx: &mut Context<'_>,
    futures: &mut FuturesUnordered<BoxFuture<'static, Outcome>>,
    dispatches: &mut FuturesUnordered<BoxFuture<'_, usize>>,
    loaders: &LoaderRegistry,
) -> Poll<Progress> {
    for _ in 0..MAX_SPINS {
        let flag = Arc::new(WakeFlag {
            woken: AtomicBool::new(false),
            parent: cx.waker().clone(),
        });
        let flag_waker = waker(flag.clone());
        let mut flag_cx = Context::from_waker(&flag_waker);

        while let Poll::Ready(Some(dispatched)) = dispatches.poll_next_unpin(&mut flag_cx) {
            tracing::trace!(dispatched, "loaders fulfilled");
        }

        match futures.poll_next_unpin(&mut flag_cx) {
            Poll::Ready(Some(outcome)) => return Poll::Ready(Progress::Completed(outcome)),
            Poll::Ready(None) if dispatches.is_empty() => return Poll::Ready(Progress::Drained),
            _ if flag.woken.load(Ordering::SeqCst) => continue,
            Poll::Pending if loaders.has_pending() => return Poll::Ready(Progress::Dispatch),
            _ => return Poll::Pending,
        }
    }
    // Every wake above was forwarded to `cx`, so we are polled again.
    Poll::Pending
}

impl Executor {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_config(schema, ExecutorConfig::default())
    }

    pub fn with_config(schema: Arc<Schema>, config: ExecutorConfig) -> Self {
        Self { schema, config }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Resolves `shape` within `request`.
    ///
    /// Field failures are reported next to the data that did resolve. Only
    /// cancelling the request fails it as a whole.
    pub async fn execute(&self, shape: &QueryShape, request: Arc<RequestContext>) -> Response {
        tokio::select! {
            biased;
            _ = request.cancelled() => {
                tracing::debug!("request cancelled");
                Response::from_request_error(&RequestError::Cancelled)
            }
            response = self.run(shape, &request) => response,
        }
    }

    /// Like [`execute`](Self::execute), cancelling the request once the
    /// configured timeout elapses.
    pub async fn execute_with_timeout(
        &self,
        shape: &QueryShape,
        request: Arc<RequestContext>,
    ) -> Response {
        let Some(timeout) = self.config.request_timeout else {
            return self.execute(shape, request).await;
        };

        match tokio::time::timeout(timeout, self.execute(shape, request.clone())).await {
            Ok(response) => response,
            Err(_) => {
                request.cancel();
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(timeout_ms, "request timed out");
                Response::from_request_error(&RequestError::Timeout { timeout_ms })
            }
        }
    }

    async fn run(&self, shape: &QueryShape, request: &Arc<RequestContext>) -> Response {
        let (root_type, serial) = match shape.operation {
            OperationKind::Query => (self.schema.query_type(), false),
            OperationKind::Mutation => (self.schema.mutation_type().unwrap_or("Mutation"), true),
        };

        let mut tree = ResultTree::default();
        let root = tree.alloc();
        let mut root_jobs = Vec::with_capacity(shape.selections.len());
        let mut root_fields = Vec::with_capacity(shape.selections.len());
        for selection in &shape.selections {
            let node = tree.alloc();
            root_fields.push((Name::new(selection.response_key()), node));
            root_jobs.push(Job {
                node,
                path: vec![PathSegment::Field(selection.response_key().to_string())],
                parent_type: root_type,
                parent: None,
                selection,
            });
        }
        tree.resolve(root, Completed::Object(root_fields));

        if serial {
            for job in root_jobs {
                self.drive(&mut tree, request, VecDeque::from([job])).await;
            }
        } else {
            self.drive(&mut tree, request, root_jobs.into()).await;
        }

        tracing::debug!(errors = tree.errors.len(), "request resolved");
        let data = tree.render(root);
        Response::new(data, tree.errors)
    }

    /// Runs ticks until no field of `queue` or its descendants is left.
    async fn drive<'a>(
        &'a self,
        tree: &mut ResultTree,
        request: &Arc<RequestContext>,
        mut queue: VecDeque<Job<'a>>,
    ) {
        let mut tick = 0usize;
        while !queue.is_empty() {
            tick += 1;
            let mut wait_set = WaitSet::new();
            let mut next = VecDeque::new();

            while let Some(job) = queue.pop_front() {
                self.resolve_field(tree, request, job, &mut queue, &mut wait_set);
            }
            tracing::trace!(tick, deferred = wait_set.len(), "tick started");

            let mut dispatches: FuturesUnordered<BoxFuture<'_, usize>> = FuturesUnordered::new();
            loop {
                let progress = poll_fn(|cx| {
                    poll_progress(
                        cx,
                        &mut wait_set.futures,
                        &mut dispatches,
                        request.loaders(),
                    )
                })
                .await;
                match progress {
                    Progress::Completed((index, result)) => {
                        let waiting = &wait_set.waiting[index];
                        self.complete(
                            tree,
                            waiting.node,
                            &waiting.path,
                            waiting.ty,
                            waiting.selection,
                            result,
                            &mut next,
                        );
                    }
                    Progress::Dispatch => {
                        tracing::trace!(tick, in_flight = dispatches.len(), "dispatching loaders");
                        dispatches.push(Box::pin(request.loaders().dispatch_all()));
                    }
                    Progress::Drained => break,
                }
            }

            queue = next;
        }
    }

    fn resolve_field<'a>(
        &'a self,
        tree: &mut ResultTree,
        request: &Arc<RequestContext>,
        job: Job<'a>,
        queue: &mut VecDeque<Job<'a>>,
        wait_set: &mut WaitSet<'a>,
    ) {
        tree.set(job.node, NodeState::Resolving);
        let selection = job.selection;

        if selection.name == "__typename" {
            let type_name = ConstValue::String(job.parent_type.to_string());
            tree.resolve(job.node, Completed::Leaf(type_name));
            return;
        }

        let field = match self.schema.resolve(job.parent_type, &selection.name) {
            Ok(field) => field,
            Err(error) => return tree.fail(job.node, &job.path, &error),
        };
        let args = match self.schema.coerce_arguments(field, &selection.arguments) {
            Ok(args) => args,
            Err(error) => return tree.fail(job.node, &job.path, &error),
        };

        let ctx = Ctx::new(job.parent.as_deref(), &args, request);
        match (field.resolver)(&ctx) {
            Resolution::Immediate(result) => self.complete(
                tree,
                job.node,
                &job.path,
                &field.ty,
                selection,
                result,
                queue,
            ),
            Resolution::Deferred(future) => wait_set.push(
                Waiting {
                    node: job.node,
                    path: job.path,
                    ty: &field.ty,
                    selection,
                },
                future,
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn complete<'a>(
        &'a self,
        tree: &mut ResultTree,
        node: NodeId,
        path: &[PathSegment],
        ty: &'a TypeRef,
        selection: &'a FieldSelection,
        result: Result<ConstValue, ResolveError>,
        queue: &mut VecDeque<Job<'a>>,
    ) {
        match result {
            Ok(value) => self.complete_value(tree, node, path, ty, selection, value, queue),
            Err(error) if error.is_not_found() => tree.resolve(node, Completed::Null),
            Err(error) => tree.fail(node, path, &error),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn complete_value<'a>(
        &'a self,
        tree: &mut ResultTree,
        node: NodeId,
        path: &[PathSegment],
        ty: &'a TypeRef,
        selection: &'a FieldSelection,
        value: ConstValue,
        queue: &mut VecDeque<Job<'a>>,
    ) {
        match (ty, value) {
            (TypeRef::NonNull(_), ConstValue::Null) => tree.fail(
                node,
                path,
                &ResolveError::resolver(format!(
                    "Cannot return null for non-nullable field of type {}",
                    ty
                )),
            ),
            (_, ConstValue::Null) => tree.resolve(node, Completed::Null),
            (TypeRef::NonNull(inner), value) => {
                self.complete_value(tree, node, path, inner, selection, value, queue)
            }
            (TypeRef::List(inner), ConstValue::List(items)) => {
                let children: Vec<NodeId> = items.iter().map(|_| tree.alloc()).collect();
                tree.resolve(node, Completed::List(children.clone()));
                for (index, (child, item)) in children.into_iter().zip(items).enumerate() {
                    let mut child_path = path.to_vec();
                    child_path.push(PathSegment::Index(index));
                    self.complete_value(tree, child, &child_path, inner, selection, item, queue);
                }
            }
            (TypeRef::List(_), other) => tree.fail(
                node,
                path,
                &ResolveError::resolver(format!("Expected a list, found {}", kind_of(&other))),
            ),
            (TypeRef::Named(type_name), value) if self.schema.is_object(type_name) => {
                if !matches!(value, ConstValue::Object(_)) {
                    let error = ResolveError::resolver(format!(
                        "Expected an object of type {}, found {}",
                        type_name,
                        kind_of(&value)
                    ));
                    return tree.fail(node, path, &error);
                }

                let parent = Arc::new(value);
                let mut fields = Vec::with_capacity(selection.selections.len());
                for child in &selection.selections {
                    let child_node = tree.alloc();
                    let mut child_path = path.to_vec();
                    child_path.push(PathSegment::Field(child.response_key().to_string()));
                    fields.push((Name::new(child.response_key()), child_node));
                    queue.push_back(Job {
                        node: child_node,
                        path: child_path,
                        parent_type: type_name,
                        parent: Some(parent.clone()),
                        selection: child,
                    });
                }
                tree.resolve(node, Completed::Object(fields));
            }
            (TypeRef::Named(_), value) => tree.resolve(node, Completed::Leaf(value)),
        }
    }
}
