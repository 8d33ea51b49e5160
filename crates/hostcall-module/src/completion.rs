//! `CallHandle` — completion object for one asynchronous call.
//!
//! The dispatcher keeps the `CompletionSlot` in its correlation table and
//! hands the caller a `CallHandle` pointing at the same slot. The slot is
//! fulfilled exactly once, by the inbound router or by the reaper.
//!
//! The caller can block (`wait`, `wait_timeout`), poll (`try_take`), or
//! `.await` the handle. Completion wakes all three.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use hostcall_core::envelope::{CmdId, Envelope};
use hostcall_core::error::Result;

enum SlotState {
    Pending(Option<Waker>),
    Ready(Result<Envelope>),
    /// Result already handed out through `poll`.
    Taken,
}

/// One-shot result cell shared between the table and the handle.
pub struct CompletionSlot {
    state: Mutex<SlotState>,
    cond: Condvar,
}

impl CompletionSlot {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending(None)),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Fulfil the slot. Returns `false` if it was already fulfilled.
    pub fn complete(&self, result: Result<Envelope>) -> bool {
        let waker = {
            let mut state = self.lock();
            match &mut *state {
                SlotState::Pending(waker) => {
                    let waker = waker.take();
                    *state = SlotState::Ready(result);
                    waker
                }
                _ => return false,
            }
        };
        self.cond.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    pub fn is_complete(&self) -> bool {
        !matches!(*self.lock(), SlotState::Pending(_))
    }
}

impl Default for CompletionSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller side of a pending asynchronous call.
///
/// Consuming accessors return the handle back while the call is still
/// pending, so a result can only be taken once.
pub struct CallHandle {
    cmd_id: CmdId,
    slot: Arc<CompletionSlot>,
}

impl CallHandle {
    pub fn new(cmd_id: CmdId, slot: Arc<CompletionSlot>) -> Self {
        Self { cmd_id, slot }
    }

    #[inline]
    pub fn cmd_id(&self) -> CmdId {
        self.cmd_id
    }

    pub fn is_complete(&self) -> bool {
        self.slot.is_complete()
    }

    /// The result if the call has completed, otherwise the handle itself.
    pub fn try_take(self) -> std::result::Result<Result<Envelope>, CallHandle> {
        let taken = {
            let mut state = self.slot.lock();
            take_ready(&mut state)
        };
        taken.ok_or(self)
    }

    /// Block until the call completes.
    ///
    /// Never returns if the host drops the request and nothing reaps it.
    pub fn wait(self) -> Result<Envelope> {
        let mut state = self.slot.lock();
        loop {
            if let Some(result) = take_ready(&mut state) {
                return result;
            }
            state = match self.slot.cond.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Block for at most `timeout`. Returns the handle back on expiry.
    pub fn wait_timeout(self, timeout: Duration) -> std::result::Result<Result<Envelope>, CallHandle> {
        let deadline = Instant::now() + timeout;
        {
            let mut state = self.slot.lock();
            loop {
                if let Some(result) = take_ready(&mut state) {
                    return Ok(result);
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                state = match self.slot.cond.wait_timeout(state, deadline - now) {
                    Ok((guard, _)) => guard,
                    Err(poisoned) => poisoned.into_inner().0,
                };
            }
        }
        Err(self)
    }
}

fn take_ready(state: &mut SlotState) -> Option<Result<Envelope>> {
    match std::mem::replace(state, SlotState::Taken) {
        SlotState::Ready(result) => Some(result),
        other => {
            *state = other;
            None
        }
    }
}

impl Future for CallHandle {
    type Output = Result<Envelope>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.slot.lock();
        if let Some(result) = take_ready(&mut state) {
            return Poll::Ready(result);
        }
        // Polling after Ready stays pending forever.
        if let SlotState::Pending(waker) = &mut *state {
            let stale = waker.as_ref().map_or(true, |w| !w.will_wake(cx.waker()));
            if stale {
                *waker = Some(cx.waker().clone());
            }
        }
        Poll::Pending
    }
}

impl std::fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHandle")
            .field("cmd_id", &self.cmd_id)
            .field("complete", &self.is_complete())
            .finish()
    }
}
