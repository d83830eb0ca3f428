//! The executable middleware unit and the declarative middleware entry.
//!
//! [`MiddlewareService<F>`] is the fundamental building block: it wraps a
//! single async closure and implements `tower::Service<Invocation>`. Every
//! executable the engine runs — block entries, mediator and emitter
//! handlers, lifecycle hooks — is type-erased into [`BoxedMiddleware`] via
//! [`middleware`] / [`middleware_sync`].
//!
//! [`Middleware`] is the declarative entry stored inside a module spec: an
//! anonymous function, a named (and possibly disabled) descriptor, or a
//! service expression such as `"rate_limiter(redis, clock)"` resolved
//! through the module's compiler at run time.

use std::future::Future;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use lattice_core::Flow;
use tower::util::BoxCloneSyncService;
use tower::Service;

use crate::error::{MiddlewareError, MiddlewareResult};
use crate::invocation::Invocation;

/// A type-erased, `Clone + Send + Sync` tower service that processes one
/// [`Invocation`] and yields a [`Flow`] signal.
pub type BoxedMiddleware = BoxCloneSyncService<Invocation, Flow, MiddlewareError>;

// ============================================================================
// MiddlewareService
// ============================================================================

/// A tower [`Service`] that calls a single async closure.
///
/// Holds the closure directly with no heap allocation; type erasure happens
/// once, in [`middleware`].
pub struct MiddlewareService<F> {
    f: F,
}

impl<F: Clone> Clone for MiddlewareService<F> {
    fn clone(&self) -> Self {
        MiddlewareService { f: self.f.clone() }
    }
}

impl<F, Fut> Service<Invocation> for MiddlewareService<F>
where
    F: Fn(Invocation) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult<Flow>> + Send + 'static,
{
    type Response = Flow;
    type Error = MiddlewareError;
    type Future = BoxFuture<'static, MiddlewareResult<Flow>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<MiddlewareResult<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        Box::pin((self.f)(invocation))
    }
}

/// Wraps an async closure into a [`BoxedMiddleware`].
pub fn middleware<F, Fut>(f: F) -> BoxedMiddleware
where
    F: Fn(Invocation) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult<Flow>> + Send + 'static,
{
    BoxCloneSyncService::new(MiddlewareService { f })
}

/// Wraps a synchronous closure into a [`BoxedMiddleware`].
pub fn middleware_sync<F>(f: F) -> BoxedMiddleware
where
    F: Fn(Invocation) -> MiddlewareResult<Flow> + Clone + Send + Sync + 'static,
{
    middleware(move |invocation| std::future::ready(f(invocation)))
}

// ============================================================================
// Blocks
// ============================================================================

/// The five middleware blocks of a module, in their fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    Security,
    PreLogicTransformers,
    Validators,
    ModuleLogic,
    PostLogicTransformers,
}

impl Block {
    /// The fixed execution order.
    pub const ORDER: [Block; 5] = [
        Block::Security,
        Block::PreLogicTransformers,
        Block::Validators,
        Block::ModuleLogic,
        Block::PostLogicTransformers,
    ];

    /// The block name used in logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Block::Security => "security",
            Block::PreLogicTransformers => "pre_logic_transformers",
            Block::Validators => "validators",
            Block::ModuleLogic => "module_logic",
            Block::PostLogicTransformers => "post_logic_transformers",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Block::Security => 0,
            Block::PreLogicTransformers => 1,
            Block::Validators => 2,
            Block::ModuleLogic => 3,
            Block::PostLogicTransformers => 4,
        }
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Middleware entry
// ============================================================================

/// One declarative entry inside a middleware block.
#[derive(Clone)]
pub enum Middleware {
    /// A function entry, optionally named and optionally disabled. Named
    /// entries are the targets of tree-level overrides; disabled entries
    /// are skipped by the engine.
    Handler {
        name: Option<String>,
        wants: Vec<String>,
        disabled: bool,
        service: BoxedMiddleware,
    },
    /// A `"service(a, b)"` expression: the named service is compiled
    /// through the module's scope at run time and must be a
    /// [`BoxedMiddleware`]; the parenthesized names become its wants.
    Expression { raw: String },
}

impl Middleware {
    /// Creates an anonymous entry from an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Invocation) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult<Flow>> + Send + 'static,
    {
        Middleware::Handler {
            name: None,
            wants: Vec::new(),
            disabled: false,
            service: middleware(f),
        }
    }

    /// Creates an anonymous entry from a synchronous closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Invocation) -> MiddlewareResult<Flow> + Clone + Send + Sync + 'static,
    {
        Middleware::Handler {
            name: None,
            wants: Vec::new(),
            disabled: false,
            service: middleware_sync(f),
        }
    }

    /// Creates an entry from an already type-erased service.
    pub fn service(service: BoxedMiddleware) -> Self {
        Middleware::Handler {
            name: None,
            wants: Vec::new(),
            disabled: false,
            service,
        }
    }

    /// Creates a service-expression entry, parsed when the module is added.
    pub fn expression(raw: impl Into<String>) -> Self {
        Middleware::Expression { raw: raw.into() }
    }

    /// Names the entry, making it an override target.
    pub fn named(self, name: impl Into<String>) -> Self {
        match self {
            Middleware::Handler {
                wants,
                disabled,
                service,
                ..
            } => Middleware::Handler {
                name: Some(name.into()),
                wants,
                disabled,
                service,
            },
            other => other,
        }
    }

    /// Declares the dependency names resolved before each call.
    pub fn wants<I, S>(self, wants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self {
            Middleware::Handler {
                name,
                disabled,
                service,
                ..
            } => Middleware::Handler {
                name,
                wants: wants.into_iter().map(Into::into).collect(),
                disabled,
                service,
            },
            other => other,
        }
    }

    /// Marks the entry disabled; the engine skips it.
    pub fn disabled(self) -> Self {
        match self {
            Middleware::Handler {
                name,
                wants,
                service,
                ..
            } => Middleware::Handler {
                name,
                wants,
                disabled: true,
                service,
            },
            other => other,
        }
    }

    /// The entry's name, when it has one (expressions are named after
    /// their target service).
    pub fn name(&self) -> Option<&str> {
        match self {
            Middleware::Handler { name, .. } => name.as_deref(),
            Middleware::Expression { raw } => Some(raw.as_str()),
        }
    }

    /// A diagnostic label for errors and logs.
    pub(crate) fn label(&self) -> String {
        match self {
            Middleware::Handler { name, .. } => {
                name.clone().unwrap_or_else(|| "<anonymous>".to_string())
            }
            Middleware::Expression { raw } => raw.clone(),
        }
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Middleware::Handler {
                name,
                wants,
                disabled,
                ..
            } => f
                .debug_struct("Middleware::Handler")
                .field("name", name)
                .field("wants", wants)
                .field("disabled", disabled)
                .finish_non_exhaustive(),
            Middleware::Expression { raw } => {
                f.debug_tuple("Middleware::Expression").field(raw).finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;

    #[tokio::test]
    async fn sync_wrapper_returns_flow_immediately() {
        let mut svc = middleware_sync(|_| Ok(Flow::SkipBlock));
        let flow = svc.call(Invocation::new(State::new())).await.unwrap();
        assert_eq!(flow, Flow::SkipBlock);
    }

    #[tokio::test]
    async fn async_wrapper_is_awaited() {
        let mut svc = middleware(|invocation: Invocation| async move {
            tokio::task::yield_now().await;
            invocation.state().set("touched", true);
            Ok(Flow::Continue)
        });
        let state = State::new();
        let flow = svc.call(Invocation::new(state.clone())).await.unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(state.get("touched"), Some(serde_json::json!(true)));
    }

    #[test]
    fn builder_marks_entries() {
        let entry = Middleware::sync(|_| Ok(Flow::Continue))
            .named("guard")
            .wants(["limits"])
            .disabled();
        match entry {
            Middleware::Handler {
                name,
                wants,
                disabled,
                ..
            } => {
                assert_eq!(name.as_deref(), Some("guard"));
                assert_eq!(wants, vec!["limits".to_string()]);
                assert!(disabled);
            }
            _ => panic!("expected handler entry"),
        }
    }

    #[test]
    fn block_order_is_fixed() {
        let names: Vec<_> = Block::ORDER.iter().map(|b| b.as_str()).collect();
        assert_eq!(
            names,
            [
                "security",
                "pre_logic_transformers",
                "validators",
                "module_logic",
                "post_logic_transformers",
            ]
        );
    }
}
