//! Cooperative cancellation for store-touching operations
//!
//! Every public tracker and store operation takes a [`CancelToken`]. The
//! token is checked at operation entry and once more before entering a
//! write transaction; a fired token makes the operation return
//! [`Error::Cancelled`](crate::Error::Cancelled) and leave no durable
//! trace. After a transaction commits, cancellation is irrelevant.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation flag shared between a caller and the
/// operations it started.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    fired: Arc<AtomicBool>,
}

impl CancelToken {
    /// A fresh, unfired token.
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Fire the token. All clones observe the cancellation.
    pub fn cancel(&self) {
        self.fired.store(true, Ordering::Release);
    }

    /// Whether the token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Return `Err(Cancelled)` if the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
