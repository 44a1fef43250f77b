use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;
use uuid::Uuid;

use parley_types::events::ClientCommand;

/// Quiet period after the last keystroke before `typing:stop` goes out.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingState {
    Idle,
    Typing,
}

struct Inner {
    state: TypingState,
    /// Bumped on every re-arm or cancel so a stale timer can tell it lost
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Debounces keystrokes in one conversation into `typing:start` /
/// `typing:stop` commands for `peer`.
///
/// Must be used inside a tokio runtime. Dropping the indicator while typing
/// emits `typing:stop` and cancels the timer, so the peer is never left
/// seeing a stale indicator.
pub struct TypingIndicator {
    peer: Uuid,
    timeout: Duration,
    outbound: mpsc::UnboundedSender<ClientCommand>,
    inner: Arc<Mutex<Inner>>,
}

impl TypingIndicator {
    pub fn new(peer: Uuid, timeout: Duration, outbound: mpsc::UnboundedSender<ClientCommand>) -> Self {
        Self {
            peer,
            timeout,
            outbound,
            inner: Arc::new(Mutex::new(Inner {
                state: TypingState::Idle,
                generation: 0,
                timer: None,
            })),
        }
    }

    pub fn peer(&self) -> Uuid {
        self.peer
    }

    pub fn state(&self) -> TypingState {
        self.lock().state
    }

    /// Feed the current input value after a keystroke.
    pub fn on_input(&self, value: &str) {
        let mut inner = self.lock();

        if value.trim().is_empty() {
            self.stop_locked(&mut inner);
            return;
        }

        if inner.state == TypingState::Idle {
            inner.state = TypingState::Typing;
            self.emit(true);
        }
        self.arm_locked(&mut inner);
    }

    /// The message was sent: stop right away.
    pub fn on_send(&self) {
        self.stop();
    }

    /// Force `Idle`, emitting `typing:stop` if currently typing.
    pub fn stop(&self) {
        let mut inner = self.lock();
        self.stop_locked(&mut inner);
    }

    fn arm_locked(&self, inner: &mut Inner) {
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.generation += 1;

        let generation = inner.generation;
        let shared = Arc::clone(&self.inner);
        let outbound = self.outbound.clone();
        let peer = self.peer;
        let timeout = self.timeout;

        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.generation != generation || inner.state != TypingState::Typing {
                return;
            }
            inner.state = TypingState::Idle;
            inner.timer = None;
            trace!("typing timeout for {}", peer);
            let _ = outbound.send(ClientCommand::typing(peer, false));
        }));
    }

    fn stop_locked(&self, inner: &mut Inner) {
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.generation += 1;

        if inner.state == TypingState::Typing {
            inner.state = TypingState::Idle;
            self.emit(false);
        }
    }

    fn emit(&self, is_typing: bool) {
        // A closed outbound queue means the session is gone; nothing to tell.
        let _ = self.outbound.send(ClientCommand::typing(self.peer, is_typing));
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TypingIndicator {
    fn drop(&mut self) {
        self.stop();
    }
}
