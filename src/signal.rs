// SPDX-License-Identifier: GPL-3.0-only

//! Single-resolution completion signals for asynchronous teardown chains
//!
//! Every pending asynchronous operation (device close, session release, the
//! user-facing "fully released" signal) owns exactly one [`CompletionSignal`]
//! while in flight. Callers subscribe and receive a [`Completion`] they can
//! await; repeated subscriptions observe the same underlying resolution, which
//! is what makes `release()` idempotent.

use tokio::sync::oneshot;

/// Awaitable handle observing a single completion event
#[derive(Debug)]
pub struct Completion {
    rx: Option<oneshot::Receiver<()>>,
}

impl Completion {
    /// A completion that is already resolved
    pub(crate) fn resolved() -> Self {
        Self { rx: None }
    }

    pub(crate) fn pending(rx: oneshot::Receiver<()>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Wait until the operation completes.
    ///
    /// Returns immediately if the operation already completed. A dropped
    /// resolver counts as completion; teardown chains resolve-or-drop, never
    /// leak a waiter.
    pub async fn wait(self) {
        if let Some(rx) = self.rx {
            let _ = rx.await;
        }
    }
}

/// Single-producer resolution side of a completion
#[derive(Debug, Default)]
pub(crate) struct CompletionSignal {
    waiters: Vec<oneshot::Sender<()>>,
    resolved: bool,
}

impl CompletionSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Observers registered after resolution get an
    /// already-resolved completion.
    pub(crate) fn subscribe(&mut self) -> Completion {
        if self.resolved {
            return Completion::resolved();
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        Completion::pending(rx)
    }

    /// Resolve the signal, waking every observer. Idempotent.
    pub(crate) fn resolve(&mut self) {
        self.resolved = true;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}
