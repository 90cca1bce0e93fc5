//! Hopping work onto the home execution context.
//!
//! The embedding host's state (and its script engine) may only be touched from one
//! thread. [`HomeContext`] lives on that thread and owns the state; [`Dispatcher`] is a
//! cloneable, `Send` handle that any other thread uses to post a closure and block until
//! the home thread has run it.
//!
//! # Protocol
//!
//! ```text
//! network thread                      home thread
//! --------------                      -----------
//! run_on_home(work) ──(job, done_tx)──▶ run() / run_pending()
//!       │                                  │ work(&mut state)
//!       ◀──────────── Result ──────────────┘ done_tx.send(result)
//! ```
//!
//! The home thread decides when to drain: [`HomeContext::run`] blocks until every
//! dispatcher is gone, [`HomeContext::run_pending`] drains whatever is queued and returns,
//! so a host with its own loop can call it between iterations.

use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, ThreadId};
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::error::DispatchError;

/// Work queued for the home context but not yet picked up.
/// Callers block while their job is queued, so this only bounds bursts.
const QUEUE_CAPACITY: usize = 32;

type Job<S> = Box<dyn FnOnce(&mut S) -> anyhow::Result<()> + Send>;

struct Posted<S> {
    job: Job<S>,
    done: async_channel::Sender<Result<(), DispatchError>>,
}

/// The home side of the bridge. Owns the host state and is pinned to the thread that
/// created it (it is neither `Send` nor `Sync`). Dropping it closes the queue.
pub struct HomeContext<S> {
    state: S,
    receiver: async_channel::Receiver<Posted<S>>,
    home: ThreadId,
    _pinned: PhantomData<*const ()>,
}

/// Handle used by other threads to run work on the home context
pub struct Dispatcher<S> {
    sender: async_channel::Sender<Posted<S>>,
    home: ThreadId,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            home: self.home,
        }
    }
}

impl<S> std::fmt::Debug for Dispatcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("home", &self.home)
            .field("available", &self.is_available())
            .finish()
    }
}

impl<S> HomeContext<S> {
    /// Capture the current thread as the home context for `state`.
    pub fn new(state: S) -> (Self, Dispatcher<S>) {
        let (sender, receiver) = async_channel::bounded(QUEUE_CAPACITY);
        let home = thread::current().id();
        debug!(?home, "Home execution context captured");
        (
            Self {
                state,
                receiver,
                home,
                _pinned: PhantomData,
            },
            Dispatcher { sender, home },
        )
    }

    /// Run posted work until every [`Dispatcher`] has been dropped.
    /// Returns the number of jobs executed.
    pub fn run(&mut self) -> usize {
        let mut executed = 0;
        while let Ok(posted) = self.receiver.recv_blocking() {
            self.execute(posted);
            executed += 1;
        }
        debug!(executed, "All dispatchers dropped, home loop exiting");
        executed
    }

    /// Run whatever is queued right now without waiting for more
    pub fn run_pending(&mut self) -> usize {
        let mut executed = 0;
        while let Ok(posted) = self.receiver.try_recv() {
            self.execute(posted);
            executed += 1;
        }
        executed
    }

    /// True while at least one [`Dispatcher`] is alive or work is still queued
    pub fn has_dispatchers(&self) -> bool {
        !(self.receiver.is_closed() && self.receiver.is_empty())
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Stop accepting work and hand the state back. Anything still queued is
    /// dropped, so its callers see [`DispatchError::ContextUnavailable`].
    pub fn shutdown(self) -> S {
        self.receiver.close();
        let mut abandoned = 0;
        while self.receiver.try_recv().is_ok() {
            abandoned += 1;
        }
        if abandoned > 0 {
            warn!(abandoned, "Home context shut down with queued work");
        }
        self.state
    }

    fn execute(&mut self, posted: Posted<S>) {
        let Posted { job, done } = posted;
        let started = Instant::now();
        let state = &mut self.state;

        let result = match panic::catch_unwind(AssertUnwindSafe(move || job(state))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(DispatchError::WorkFailed(err)),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "Dispatched work panicked on the home context");
                Err(DispatchError::WorkPanicked(message))
            }
        };

        debug!(
            duration_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Dispatched work finished"
        );

        // The caller may have gone away; nothing to report to in that case.
        let _ = done.try_send(result);
    }
}

impl<S> Dispatcher<S> {
    /// Run `work` on the home context and block until it has finished.
    ///
    /// Errors returned by `work` come back as [`DispatchError::WorkFailed`] and panics as
    /// [`DispatchError::WorkPanicked`]. Calling this from the home thread itself is
    /// rejected with [`DispatchError::CalledFromHome`] since nobody would drain the job.
    pub fn run_on_home<F>(&self, work: F) -> Result<(), DispatchError>
    where
        F: FnOnce(&mut S) -> anyhow::Result<()> + Send + 'static,
    {
        if thread::current().id() == self.home {
            return Err(DispatchError::CalledFromHome);
        }

        let (done_tx, done_rx) = async_channel::bounded(1);
        self.sender
            .send_blocking(Posted {
                job: Box::new(work),
                done: done_tx,
            })
            .map_err(|_| DispatchError::ContextUnavailable)?;

        done_rx
            .recv_blocking()
            .map_err(|_| DispatchError::ContextUnavailable)?
    }

    /// False once the home context has shut down
    pub fn is_available(&self) -> bool {
        !self.sender.is_closed()
    }

    pub fn home_thread(&self) -> ThreadId {
        self.home
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
