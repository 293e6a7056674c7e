//! Idempotent release handles.
//!
//! Every registration-style operation (subscribe, retain, optimistic
//! apply) returns a [`Disposable`]: a one-shot token whose release runs
//! exactly once. Releasing it again is a no-op, which keeps composition
//! safe when multiple owners might hold the same handle.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Teardown = Box<dyn FnOnce() + Send>;

struct Inner {
    released: AtomicBool,
    teardown: Mutex<Option<Teardown>>,
}

/// One-shot release token.
///
/// Clones share the same release state: disposing any clone releases the
/// underlying registration, and every subsequent `dispose` on any clone is
/// a no-op. Dropping a `Disposable` does *not* release it; release is an
/// explicit intent.
#[derive(Clone)]
pub struct Disposable {
    inner: Arc<Inner>,
}

impl Disposable {
    /// Create a handle that runs `teardown` on first dispose.
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                released: AtomicBool::new(false),
                teardown: Mutex::new(Some(Box::new(teardown))),
            }),
        }
    }

    /// A handle whose dispose has no effect beyond flipping its own flag.
    pub fn noop() -> Self {
        Self {
            inner: Arc::new(Inner {
                released: AtomicBool::new(true),
                teardown: Mutex::new(None),
            }),
        }
    }

    /// Release the registration this handle represents.
    ///
    /// The first call runs the teardown; every later call (on this handle or
    /// any clone of it) is a no-op.
    pub fn dispose(&self) {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(teardown) = self.inner.teardown.lock().take() {
            teardown();
        }
    }

    /// Check whether this handle has been released.
    pub fn is_disposed(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("released", &self.is_disposed())
            .finish()
    }
}
