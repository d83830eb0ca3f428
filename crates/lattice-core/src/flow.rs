//! Completion signals for middleware and event handlers.
//!
//! A tagged enum returned directly from every call; nothing ever waits for
//! a signal to be raised out of band. Failures travel on the error channel
//! of the middleware service, not in this enum.

/// The completion signal returned by a middleware or event handler call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Proceed to the next entry in the current block.
    Continue,
    /// Abandon the remaining entries of the current block only; execution
    /// proceeds with the next block.
    SkipBlock,
    /// Stop the whole module immediately. This is an early, successful
    /// stop — it is never visible to error handlers.
    Abort,
}

impl Flow {
    /// Alias for [`Flow::Continue`].
    pub fn next() -> Self {
        Flow::Continue
    }

    /// Alias for [`Flow::SkipBlock`].
    pub fn skip() -> Self {
        Flow::SkipBlock
    }

    /// Alias for [`Flow::Abort`].
    pub fn done() -> Self {
        Flow::Abort
    }

    /// Returns `true` if the signal lets the current block keep running.
    pub fn continues_block(self) -> bool {
        matches!(self, Flow::Continue)
    }
}
