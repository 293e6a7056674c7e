//! Cold observable streams.
//!
//! This is the stream primitive the execution surface is built on: an
//! [`Observable`] performs no work until an observer subscribes, and every
//! subscription re-runs the source independently. Terminal events
//! (complete, error) and unsubscription all run the source's teardown
//! exactly once, synchronously.

use crate::disposable::Disposable;
use crate::error::RuntimeError;
use futures::channel::mpsc;
use futures::stream::Stream;
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Callbacks receiving events from one subscription.
///
/// Built incrementally; any callback left unset is a no-op.
pub struct Observer<T> {
    next: Box<dyn FnMut(T) + Send>,
    error: Box<dyn FnMut(RuntimeError) + Send>,
    complete: Box<dyn FnMut() + Send>,
}

impl<T> Observer<T> {
    /// Observer with all callbacks defaulted to no-ops.
    pub fn new() -> Self {
        Self {
            next: Box::new(|_| {}),
            error: Box::new(|_| {}),
            complete: Box::new(|| {}),
        }
    }

    /// Set the payload callback.
    pub fn on_next(mut self, f: impl FnMut(T) + Send + 'static) -> Self {
        self.next = Box::new(f);
        self
    }

    /// Set the error callback.
    pub fn on_error(mut self, f: impl FnMut(RuntimeError) + Send + 'static) -> Self {
        self.error = Box::new(f);
        self
    }

    /// Set the completion callback.
    pub fn on_complete(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.complete = Box::new(f);
        self
    }
}

impl<T> Default for Observer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal event recorded while the observer is checked out of its slot.
enum Terminal {
    Error(RuntimeError),
    Complete,
}

struct SubscriptionState<T> {
    closed: AtomicBool,
    observer: Mutex<Option<Observer<T>>>,
    teardown: Mutex<Option<Disposable>>,
    /// Terminal raised from inside an `on_next` callback, waiting for the
    /// in-progress `next` to dispatch it once the callback returns.
    pending: Mutex<Option<Terminal>>,
}

impl<T> SubscriptionState<T> {
    fn run_teardown(&self) {
        if let Some(teardown) = self.teardown.lock().take() {
            teardown.dispose();
        }
    }

    /// Store the source's teardown, or run it immediately when a terminal
    /// event already fired synchronously during the source call.
    fn attach_teardown(&self, teardown: Disposable) {
        if self.closed.load(Ordering::Acquire) {
            teardown.dispose();
            return;
        }
        *self.teardown.lock() = Some(teardown);
        // Terminal may have raced in between the check and the store.
        if self.closed.load(Ordering::Acquire) {
            self.run_teardown();
        }
    }

    fn finish_unsubscribe(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Drop the observer without firing any callback.
        self.observer.lock().take();
        self.run_teardown();
    }
}

/// Producer side of one subscription, handed to the observable's source.
pub struct Sink<T> {
    state: Arc<SubscriptionState<T>>,
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Sink<T> {
    /// Deliver a payload. Dropped silently once the subscription is closed.
    pub fn next(&self, value: T) {
        if self.state.closed.load(Ordering::Acquire) {
            return;
        }
        // The observer is taken out of its slot for the duration of the
        // callback so the callback may itself unsubscribe or raise a
        // terminal on this same subscription.
        let taken = self.state.observer.lock().take();
        if let Some(mut observer) = taken {
            (observer.next)(value);
            match self.state.pending.lock().take() {
                // A terminal raised inside the callback is dispatched here,
                // to the observer this call holds.
                Some(Terminal::Error(error)) => {
                    (observer.error)(error);
                    self.state.run_teardown();
                }
                Some(Terminal::Complete) => {
                    (observer.complete)();
                    self.state.run_teardown();
                }
                None => {
                    if !self.state.closed.load(Ordering::Acquire) {
                        *self.state.observer.lock() = Some(observer);
                    }
                }
            }
        }
    }

    /// Deliver a terminal error, close the subscription, run the teardown.
    pub fn error(&self, error: RuntimeError) {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let taken = self.state.observer.lock().take();
        if let Some(mut observer) = taken {
            (observer.error)(error);
            self.state.run_teardown();
        } else {
            // The observer is checked out by a `next` further up the stack;
            // record the terminal for it to dispatch after the callback.
            *self.state.pending.lock() = Some(Terminal::Error(error));
        }
    }

    /// Deliver completion, close the subscription, run the teardown.
    pub fn complete(&self) {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let taken = self.state.observer.lock().take();
        if let Some(mut observer) = taken {
            (observer.complete)();
            self.state.run_teardown();
        } else {
            *self.state.pending.lock() = Some(Terminal::Complete);
        }
    }

    /// Check whether the subscription has terminated or been cancelled.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }
}

/// Handle to one active subscription.
pub struct Subscription {
    cancel: Disposable,
    closed: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl Subscription {
    /// Cancel the subscription: no further events are delivered and the
    /// source's teardown runs synchronously. Idempotent, and a no-op after
    /// a terminal event.
    pub fn unsubscribe(&self) {
        self.cancel.dispose();
    }

    /// Check whether the subscription is closed (terminated or cancelled).
    pub fn is_closed(&self) -> bool {
        (self.closed)()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A lazy, cold stream of values.
///
/// Nothing runs until [`subscribe`](Observable::subscribe) is called, and
/// each subscription invokes the source again, so independent subscriptions
/// never share state at this layer.
pub struct Observable<T> {
    source: Arc<dyn Fn(Sink<T>) -> Disposable + Send + Sync>,
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable").finish_non_exhaustive()
    }
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Create an observable from a source function.
    ///
    /// The source receives the subscription's [`Sink`] and returns a
    /// teardown handle, run exactly once on terminal or cancellation.
    pub fn new(source: impl Fn(Sink<T>) -> Disposable + Send + Sync + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Subscribe an observer, running the source.
    pub fn subscribe(&self, observer: Observer<T>) -> Subscription {
        let state = Arc::new(SubscriptionState {
            closed: AtomicBool::new(false),
            observer: Mutex::new(Some(observer)),
            teardown: Mutex::new(None),
            pending: Mutex::new(None),
        });

        let sink = Sink {
            state: Arc::clone(&state),
        };
        let teardown = (self.source)(sink);
        state.attach_teardown(teardown);

        let cancel_state = Arc::clone(&state);
        let closed_state = Arc::clone(&state);
        Subscription {
            cancel: Disposable::new(move || cancel_state.finish_unsubscribe()),
            closed: Arc::new(move || closed_state.closed.load(Ordering::Acquire)),
        }
    }

    /// Bridge into a [`futures::Stream`] of `Result` items.
    ///
    /// Subscribes immediately; dropping the stream cancels the
    /// subscription.
    pub fn into_stream(self) -> EventStream<T> {
        let (tx, rx) = mpsc::unbounded::<Result<T, RuntimeError>>();
        let tx_next = tx.clone();
        let tx_error = tx.clone();
        let tx_complete = tx;

        let subscription = self.subscribe(
            Observer::new()
                .on_next(move |value| {
                    let _ = tx_next.unbounded_send(Ok(value));
                })
                .on_error(move |err| {
                    let _ = tx_error.unbounded_send(Err(err));
                    tx_error.close_channel();
                })
                .on_complete(move || {
                    tx_complete.close_channel();
                }),
        );

        EventStream {
            receiver: rx,
            subscription,
        }
    }
}

/// [`futures::Stream`] view over an observable subscription.
pub struct EventStream<T> {
    receiver: mpsc::UnboundedReceiver<Result<T, RuntimeError>>,
    subscription: Subscription,
}

impl<T> EventStream<T> {
    /// Handle to the underlying subscription.
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl<T> Stream for EventStream<T> {
    type Item = Result<T, RuntimeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().receiver).poll_next(cx)
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}
