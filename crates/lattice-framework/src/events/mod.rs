//! In-process event primitives.
//!
//! Three flavors, all async, none polled:
//!
//! - [`Mediator`] — request/response within one module or plugin: a single
//!   handler per event, awaited, its result propagated.
//! - [`Emitter`] — fire-and-forget within one module: the handler runs on a
//!   spawned task and completion is not synchronized with the caller.
//! - [`ExposedMediator`] — a cross-plugin contract: events are declared by
//!   their owner, handlers attach via `pre_bind` before the first emit, and
//!   every emit awaits all bound handlers in bind order.

mod emitter;
mod exposed;
mod mediator;

pub use emitter::Emitter;
pub use exposed::ExposedMediator;
pub use mediator::Mediator;

/// The mediator event consulted when a middleware run fails.
pub const ON_ERROR_EVENT: &str = "on_error";
