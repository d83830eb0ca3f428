//! The block execution engine.
//!
//! Runs one module's five middleware blocks in fixed order, interpreting
//! each entry's [`Flow`] signal: `Continue` advances to the next entry,
//! `SkipBlock` abandons the rest of the current block, `Abort` ends the
//! whole run successfully. Errors travel up unchanged; routing them is the
//! caller's job.

use std::sync::Arc;

use lattice_core::{Caller, Compiler, Flow, ResolveError, ResolvedArgs, ServiceArc};
use tower::Service;
use tracing::{debug, trace};

use crate::error::{ArgumentError, MiddlewareError, MiddlewareResult};
use crate::invocation::Invocation;
use crate::middleware::{Block, BoxedMiddleware};
use crate::state::State;

/// One prepared entry: the add-time form of a middleware, with expressions
/// already parsed.
#[derive(Clone)]
pub(crate) enum Entry {
    Handler {
        label: String,
        wants: Vec<String>,
        disabled: bool,
        service: BoxedMiddleware,
    },
    /// A parsed `"service(a, b)"` expression; the service is compiled per
    /// run so removals and re-registrations take effect.
    Service {
        label: String,
        service: String,
        wants: Vec<String>,
    },
}

impl Entry {
    fn label(&self) -> &str {
        match self {
            Entry::Handler { label, .. } | Entry::Service { label, .. } => label,
        }
    }
}

/// Runs all five blocks against a shared state.
pub(crate) async fn run_blocks(
    module: &str,
    blocks: &[Vec<Entry>; 5],
    compiler: &Arc<Compiler>,
    caller: &Caller,
    state: &State,
    http: Option<&ServiceArc>,
) -> MiddlewareResult<()> {
    for block in Block::ORDER {
        let entries = &blocks[block.index()];
        if entries.is_empty() {
            continue;
        }
        trace!(module, block = %block, entries = entries.len(), "Running block");

        for entry in entries {
            let flow = run_entry(module, block, entry, compiler, caller, state, http).await?;
            match flow {
                Flow::Continue => {}
                Flow::SkipBlock => {
                    debug!(module, block = %block, middleware = entry.label(), "Block skipped");
                    break;
                }
                Flow::Abort => {
                    debug!(module, block = %block, middleware = entry.label(), "Run aborted");
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

async fn run_entry(
    module: &str,
    block: Block,
    entry: &Entry,
    compiler: &Arc<Compiler>,
    caller: &Caller,
    state: &State,
    http: Option<&ServiceArc>,
) -> MiddlewareResult<Flow> {
    let (label, wants, mut service) = match entry {
        Entry::Handler {
            label,
            wants,
            disabled,
            service,
        } => {
            if *disabled {
                trace!(module, block = %block, middleware = %label, "Entry disabled, skipped");
                return Ok(Flow::Continue);
            }
            (label, wants, service.clone())
        }
        Entry::Service {
            label,
            service,
            wants,
        } => {
            let resolved = compiler.compile(service, compiler, caller).await?;
            let callable = Arc::clone(&resolved.instance)
                .downcast::<BoxedMiddleware>()
                .map_err(|_| ResolveError::NotCallable {
                    service: service.clone(),
                })?;
            (label, wants, (*callable).clone())
        }
    };

    let args = resolve_wants(label, wants, compiler, caller).await?;
    let mut invocation = Invocation::new(state.clone()).with_args(args);
    if let Some(http) = http {
        invocation = invocation.with_http(Arc::clone(http));
    }

    service.call(invocation).await
}

/// Resolves an entry's wants through the module's compiler chain. A name
/// missing everywhere reports the middleware it was declared for.
pub(crate) async fn resolve_wants(
    label: &str,
    wants: &[String],
    compiler: &Arc<Compiler>,
    caller: &Caller,
) -> MiddlewareResult<ResolvedArgs> {
    let mut args = ResolvedArgs::new();
    for want in wants {
        let resolved = compiler
            .compile(want, compiler, caller)
            .await
            .map_err(|e| {
                // The want itself is unknown; a missing *transitive*
                // dependency stays a plain resolve error.
                if matches!(&e, ResolveError::NotFound(name) if name == want) {
                    MiddlewareError::Argument(ArgumentError::Unresolvable {
                        name: want.clone(),
                        middleware: label.to_string(),
                        source: e,
                    })
                } else {
                    MiddlewareError::Resolve(e)
                }
            })?;
        args.insert(want.clone(), resolved.instance);
    }
    Ok(args)
}
