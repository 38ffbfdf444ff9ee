use std::sync::Arc;
use std::time::Duration;

use futures::lock::Mutex;
use tokio::task::JoinHandle;

use wayfarer_config::config;
use wayfarer_database::Database;

/// Typing signal state for one user in one conversation
enum SignalState {
    Idle,
    Active,
    PendingStop,
}

struct TypingInner {
    state: SignalState,
    /// Bumped whenever a pending stop becomes irrelevant, so a timer
    /// that already fired its sleep cannot apply a stale transition
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Debounces raw typing signals into a minimal write pattern: one
/// immediate write when typing starts, one quiet-period write after it
/// stops.
///
/// Presence is best-effort throughout; write failures are logged and
/// never surfaced to the caller.
pub struct TypingDebouncer {
    db: Database,
    conversation: String,
    user: String,
    inner: Arc<Mutex<TypingInner>>,
}

impl TypingDebouncer {
    /// Create a debouncer for one user in one conversation
    pub fn new(db: Database, conversation: &str, user: &str) -> Self {
        Self {
            db,
            conversation: conversation.to_string(),
            user: user.to_string(),
            inner: Arc::new(Mutex::new(TypingInner {
                state: SignalState::Idle,
                generation: 0,
                timer: None,
            })),
        }
    }

    pub async fn set_typing(&self, typing: bool) {
        if typing {
            self.start().await
        } else {
            self.stop().await
        }
    }

    async fn start(&self) {
        {
            let mut inner = self.inner.lock().await;
            match inner.state {
                SignalState::Idle => inner.state = SignalState::Active,
                // Already signaling. A stop timer that is already
                // running keeps running and will clear the signal.
                SignalState::Active | SignalState::PendingStop => return,
            }
        }

        self.write(true).await;
    }

    async fn stop(&self) {
        let delay = Duration::from_millis(config().await.presence.typing_debounce_ms);

        let mut inner = self.inner.lock().await;
        if !matches!(inner.state, SignalState::Active) {
            return;
        }

        inner.state = SignalState::PendingStop;
        inner.generation += 1;
        let generation = inner.generation;

        let db = self.db.clone();
        let conversation = self.conversation.clone();
        let user = self.user.clone();
        let shared = Arc::clone(&self.inner);

        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut inner = shared.lock().await;
                if inner.generation != generation
                    || !matches!(inner.state, SignalState::PendingStop)
                {
                    return;
                }
                inner.state = SignalState::Idle;
                inner.timer = None;
            }

            if let Err(error) = db.set_typing(&conversation, &user, false).await {
                warn!("Failed to clear typing signal: {error:?}");
            }
        }));
    }

    /// Cancel any pending timer and clear the signal if it is still set.
    /// Safe to call from any state, repeatedly.
    pub async fn shutdown(&self) {
        let was_signaling = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;

            if let Some(timer) = inner.timer.take() {
                timer.abort();
            }

            let was_signaling = !matches!(inner.state, SignalState::Idle);
            inner.state = SignalState::Idle;
            was_signaling
        };

        if was_signaling {
            self.write(false).await;
        }
    }

    async fn write(&self, typing: bool) {
        if let Err(error) = self
            .db
            .set_typing(&self.conversation, &self.user, typing)
            .await
        {
            warn!("Failed to record typing signal: {error:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wayfarer_database::{Database, DatabaseInfo};

    use super::TypingDebouncer;

    async fn database() -> Database {
        DatabaseInfo::Reference.connect().await.unwrap()
    }

    /// Recorded (typing, user) writes, in order of arrival
    async fn writes(db: &Database) -> Vec<bool> {
        match db {
            Database::Reference(reference) => reference
                .presence_log
                .lock()
                .await
                .iter()
                .map(|write| write.typing)
                .collect(),
        }
    }

    async fn past_debounce_window() {
        let delay = wayfarer_config::config().await.presence.typing_debounce_ms;
        tokio::time::sleep(Duration::from_millis(delay + 100)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_stop_coalesces_to_two_writes() {
        let db = database().await;
        let typing = TypingDebouncer::new(db.clone(), "trip", "alice");

        typing.set_typing(true).await;
        typing.set_typing(false).await;

        // Nothing further is written until the quiet period elapses
        assert_eq!(vec![true], writes(&db).await);

        past_debounce_window().await;
        assert_eq!(vec![true, false], writes(&db).await);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_start_is_one_write() {
        let db = database().await;
        let typing = TypingDebouncer::new(db.clone(), "trip", "alice");

        typing.set_typing(true).await;
        typing.set_typing(true).await;
        typing.set_typing(true).await;

        assert_eq!(vec![true], writes(&db).await);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_idle_writes_nothing() {
        let db = database().await;
        let typing = TypingDebouncer::new(db.clone(), "trip", "alice");

        typing.set_typing(false).await;
        past_debounce_window().await;

        assert!(writes(&db).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_does_not_cancel_a_pending_stop() {
        let db = database().await;
        let typing = TypingDebouncer::new(db.clone(), "trip", "alice");

        typing.set_typing(true).await;
        typing.set_typing(false).await;
        // Typing resumed while the stop timer was pending; the timer
        // keeps running and still clears the signal
        typing.set_typing(true).await;

        past_debounce_window().await;
        assert_eq!(vec![true, false], writes(&db).await);

        // Back in the idle state, a fresh start signals again
        typing.set_typing(true).await;
        assert_eq!(vec![true, false, true], writes(&db).await);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_a_final_stop() {
        let db = database().await;
        let typing = TypingDebouncer::new(db.clone(), "trip", "alice");

        typing.set_typing(true).await;
        typing.shutdown().await;

        assert_eq!(vec![true, false], writes(&db).await);

        // Shutdown again is a no-op
        typing.shutdown().await;
        assert_eq!(vec![true, false], writes(&db).await);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_a_pending_timer() {
        let db = database().await;
        let typing = TypingDebouncer::new(db.clone(), "trip", "alice");

        typing.set_typing(true).await;
        typing.set_typing(false).await;
        typing.shutdown().await;

        assert_eq!(vec![true, false], writes(&db).await);

        // The aborted timer must not add a third write later
        past_debounce_window().await;
        assert_eq!(vec![true, false], writes(&db).await);
    }
}
