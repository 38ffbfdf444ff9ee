use std::sync::Arc;

use futures::lock::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use wayfarer_config::config;
use wayfarer_database::{Database, PageCursor};
use wayfarer_result::{Error, Result};

use crate::{FeedEntry, FeedQuery, Paginator, Timeline};

/// Snapshot of one feed as exposed to consumers
#[derive(Debug, Clone)]
pub struct FeedState<T> {
    /// Entries in ascending creation order
    pub items: Vec<T>,
    /// Whether the first window delivery is still outstanding
    pub loading: bool,
    /// Most recent transport failure. A live-stream failure is terminal
    /// for the attached identity until `refresh`; a backfill failure
    /// clears on the next successful operation.
    pub error: Option<Error>,
    /// Whether older entries may still be fetched
    pub has_more: bool,
}

impl<T> Default for FeedState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: true,
            error: None,
            has_more: false,
        }
    }
}

struct Attached<Q: FeedQuery> {
    query: Q,
    timeline: Timeline<Q::Entry>,
    paginator: Paginator,
    loading: bool,
    error: Option<Error>,
    worker: JoinHandle<()>,
}

struct SessionInner<Q: FeedQuery> {
    /// Bumped on every teardown; asynchronous results carrying an older
    /// epoch are discarded instead of touching the new feed's state
    epoch: u64,
    attached: Option<Attached<Q>>,
}

/// Ties one live subscription, timeline, and pagination cursor to a feed
/// identity, recreating all three whenever the identity changes.
///
/// At most one subscription is open per session at any time. Sessions are
/// fully isolated from each other and share no mutable state.
pub struct FeedSession<Q: FeedQuery> {
    db: Database,
    inner: Arc<Mutex<SessionInner<Q>>>,
    state: Arc<watch::Sender<FeedState<Q::Entry>>>,
}

impl<Q: FeedQuery> FeedSession<Q> {
    /// Create a detached session against the given engine handle
    pub fn new(db: Database) -> Self {
        let (state, _) = watch::channel(FeedState::default());
        Self {
            db,
            inner: Arc::new(Mutex::new(SessionInner {
                epoch: 0,
                attached: None,
            })),
            state: Arc::new(state),
        }
    }

    /// Observe this feed; the receiver always holds the latest snapshot
    pub fn state(&self) -> watch::Receiver<FeedState<Q::Entry>> {
        self.state.subscribe()
    }

    /// Attach to a feed identity.
    ///
    /// No-op when already attached to an equal query; otherwise the
    /// previous identity is torn down first.
    pub async fn attach(&self, query: Q) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if let Some(attached) = &inner.attached {
            if attached.query == query {
                return Ok(());
            }
        }

        self.detach_locked(&mut inner);
        self.open_locked(&mut inner, query).await
    }

    /// Tear down the current identity, if any. Safe to call repeatedly,
    /// including before the first delivery has arrived.
    pub async fn detach(&self) {
        let mut inner = self.inner.lock().await;
        self.detach_locked(&mut inner);
    }

    /// Tear down and reattach the current identity, recovering from a
    /// terminal subscription error
    pub async fn refresh(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let Some(query) = inner.attached.as_ref().map(|attached| attached.query.clone()) else {
            return Ok(());
        };

        self.detach_locked(&mut inner);
        self.open_locked(&mut inner, query).await
    }

    /// Fetch one page of entries older than everything currently known.
    ///
    /// Resolves to zero without fetching when no cursor exists yet or a
    /// fetch is already in flight. A page that resolves after the feed
    /// was torn down is discarded.
    pub async fn load_more(&self) -> Result<usize> {
        let page_size = config().await.feed.page_size;

        let (epoch, query, cursor) = {
            let mut inner = self.inner.lock().await;
            let epoch = inner.epoch;
            let Some(attached) = inner.attached.as_mut() else {
                return Ok(0);
            };
            let Some(cursor) = attached.paginator.begin() else {
                return Ok(0);
            };
            (epoch, attached.query.clone(), cursor)
        };

        let fetched = query.page_before(&self.db, &cursor, page_size).await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            debug!("Discarding backfill page for a torn-down feed");
            return Ok(0);
        }
        let Some(attached) = inner.attached.as_mut() else {
            return Ok(0);
        };

        match fetched {
            Ok(page) => {
                let count = page.len();
                let oldest = page.last().map(|entry| PageCursor {
                    created_at: entry.created_at(),
                    id: entry.entry_id().to_string(),
                });

                attached.timeline.prepend_older(page);
                attached.paginator.finish(oldest, count, page_size);
                publish(attached, &self.state);
                Ok(count)
            }
            Err(error) => {
                warn!("Backfill fetch failed: {error:?}");
                attached.paginator.abort();
                attached.error = Some(error.clone());
                publish(attached, &self.state);
                Err(error)
            }
        }
    }

    fn detach_locked(&self, inner: &mut SessionInner<Q>) {
        inner.epoch += 1;

        if let Some(attached) = inner.attached.take() {
            attached.worker.abort();
            debug!("Detached live feed subscription");
        }

        self.state.send_replace(FeedState::default());
    }

    async fn open_locked(&self, inner: &mut SessionInner<Q>, query: Q) -> Result<()> {
        let window_size = config().await.feed.window_size;

        let mut subscription = match query.subscribe(&self.db, window_size).await {
            Ok(subscription) => subscription,
            Err(error) => {
                self.state.send_replace(FeedState {
                    loading: false,
                    error: Some(error.clone()),
                    ..FeedState::default()
                });
                return Err(error);
            }
        };

        info!("Attached live feed subscription");

        let epoch = inner.epoch;
        let shared = Arc::clone(&self.inner);
        let state = Arc::clone(&self.state);

        let worker = tokio::spawn(async move {
            while let Some(delivery) = subscription.recv().await {
                let mut inner = shared.lock().await;
                if inner.epoch != epoch {
                    return;
                }
                let Some(attached) = inner.attached.as_mut() else {
                    return;
                };

                match delivery {
                    Ok(window) => {
                        attached.timeline.apply_window(window);

                        if let Some(oldest) = attached.timeline.oldest() {
                            attached.paginator.seed(PageCursor {
                                created_at: oldest.created_at(),
                                id: oldest.entry_id().to_string(),
                            });
                        }

                        attached.loading = false;
                        attached.error = None;
                        publish(attached, &state);
                    }
                    Err(error) => {
                        // Terminal for this identity until refresh
                        warn!("Live subscription failed: {error:?}");
                        attached.loading = false;
                        attached.error = Some(error);
                        publish(attached, &state);
                        subscription.close();
                        return;
                    }
                }
            }
        });

        inner.attached = Some(Attached {
            query,
            timeline: Timeline::new(),
            paginator: Paginator::new(),
            loading: true,
            error: None,
            worker,
        });

        Ok(())
    }
}

impl<Q: FeedQuery> Drop for FeedSession<Q> {
    fn drop(&mut self) {
        if let Some(mut inner) = self.inner.try_lock() {
            if let Some(attached) = inner.attached.take() {
                attached.worker.abort();
            }
        }
    }
}

fn publish<Q: FeedQuery>(attached: &Attached<Q>, state: &watch::Sender<FeedState<Q::Entry>>) {
    state.send_replace(FeedState {
        items: attached.timeline.entries().to_vec(),
        loading: attached.loading,
        error: attached.error.clone(),
        has_more: attached.paginator.has_more(),
    });
}

#[cfg(test)]
mod tests {
    use wayfarer_database::{Conversation, Database, DatabaseInfo, MembershipRecord, Message};

    use crate::{FeedSession, InboxFeed, MessageFeed};

    async fn database() -> Database {
        DatabaseInfo::Reference.connect().await.unwrap()
    }

    async fn seed_conversation(db: &Database, id: &str, recipients: &[&str]) {
        let mut conversation = Conversation {
            id: id.to_string(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            added_users: recipients
                .iter()
                .map(|r| MembershipRecord {
                    user_id: r.to_string(),
                    added_by: r.to_string(),
                })
                .collect(),
            ..Default::default()
        };
        db.insert_conversation(&mut conversation).await.unwrap();
    }

    async fn seed_message(db: &Database, conversation: &str, id: &str) -> Message {
        let mut message = Message {
            id: id.to_string(),
            conversation: conversation.to_string(),
            author: "alice".to_string(),
            content: id.to_string(),
            ..Default::default()
        };
        db.insert_message(&mut message).await.unwrap();
        message
    }

    #[tokio::test]
    async fn live_window_flows_into_state() {
        let db = database().await;
        seed_conversation(&db, "trip", &["alice", "bob"]).await;

        let session = FeedSession::new(db.clone());
        session
            .attach(MessageFeed {
                conversation: "trip".to_string(),
            })
            .await
            .unwrap();

        let mut state = session.state();

        seed_message(&db, "trip", "m1").await;
        seed_message(&db, "trip", "m2").await;

        let snapshot = state
            .wait_for(|state| state.items.len() == 2)
            .await
            .unwrap()
            .clone();

        assert!(!snapshot.loading);
        assert_eq!("m1", snapshot.items[0].id);
        assert_eq!("m2", snapshot.items[1].id);
        assert!(snapshot.items[0].created_at <= snapshot.items[1].created_at);

        session.detach().await;
    }

    #[tokio::test]
    async fn attach_to_the_same_identity_is_a_noop() {
        let db = database().await;
        seed_conversation(&db, "trip", &["alice", "bob"]).await;
        seed_message(&db, "trip", "m1").await;

        let session = FeedSession::new(db.clone());
        let query = MessageFeed {
            conversation: "trip".to_string(),
        };

        session.attach(query.clone()).await.unwrap();
        let mut state = session.state();
        state.wait_for(|state| state.items.len() == 1).await.unwrap();

        // Reattaching the same identity must not reset anything
        session.attach(query).await.unwrap();
        let snapshot = session.state().borrow().clone();
        assert_eq!(1, snapshot.items.len());
        assert!(!snapshot.loading);

        session.detach().await;
    }

    #[tokio::test]
    async fn switching_identity_resets_the_feed() {
        let db = database().await;
        seed_conversation(&db, "trip-a", &["alice", "bob"]).await;
        seed_conversation(&db, "trip-b", &["alice", "carol"]).await;
        seed_message(&db, "trip-a", "a1").await;
        seed_message(&db, "trip-b", "b1").await;

        let session = FeedSession::new(db.clone());
        session
            .attach(MessageFeed {
                conversation: "trip-a".to_string(),
            })
            .await
            .unwrap();

        let mut state = session.state();
        state.wait_for(|state| state.items.len() == 1).await.unwrap();

        session
            .attach(MessageFeed {
                conversation: "trip-b".to_string(),
            })
            .await
            .unwrap();

        let snapshot = state
            .wait_for(|state| state.items.iter().any(|m| m.id == "b1"))
            .await
            .unwrap()
            .clone();

        assert_eq!(1, snapshot.items.len());
        assert!(snapshot.items.iter().all(|m| m.conversation == "trip-b"));

        session.detach().await;
    }

    #[tokio::test]
    async fn detach_is_idempotent() {
        let db = database().await;
        let session: FeedSession<MessageFeed> = FeedSession::new(db);

        session.detach().await;
        session.detach().await;

        let snapshot = session.state().borrow().clone();
        assert!(snapshot.items.is_empty());
        assert!(snapshot.loading);

        // Pagination before any attach resolves as a no-op
        assert_eq!(0, session.load_more().await.unwrap());
    }

    #[tokio::test]
    async fn refresh_rebuilds_the_current_identity() {
        let db = database().await;
        seed_conversation(&db, "trip", &["alice", "bob"]).await;
        seed_message(&db, "trip", "m1").await;

        let session = FeedSession::new(db.clone());
        session
            .attach(MessageFeed {
                conversation: "trip".to_string(),
            })
            .await
            .unwrap();

        let mut state = session.state();
        state.wait_for(|state| state.items.len() == 1).await.unwrap();

        session.refresh().await.unwrap();

        let snapshot = state
            .wait_for(|state| state.items.len() == 1)
            .await
            .unwrap()
            .clone();
        assert_eq!("m1", snapshot.items[0].id);

        session.detach().await;
    }

    #[tokio::test]
    async fn backfill_grows_the_prefix_until_exhausted() {
        let db = database().await;
        seed_conversation(&db, "trip", &["alice", "bob"]).await;

        // Default window and page size are both 30: sixty messages leave
        // exactly one full page beyond the live window
        for index in 0..60 {
            seed_message(&db, "trip", &format!("m{index:02}")).await;
        }

        let session = FeedSession::new(db.clone());
        session
            .attach(MessageFeed {
                conversation: "trip".to_string(),
            })
            .await
            .unwrap();

        let mut state = session.state();
        state.wait_for(|state| state.items.len() == 30).await.unwrap();

        let fetched = session.load_more().await.unwrap();
        assert_eq!(30, fetched);

        let snapshot = session.state().borrow().clone();
        assert_eq!(60, snapshot.items.len());
        assert_eq!("m00", snapshot.items[0].id);
        assert!(snapshot.has_more);

        // The remainder was an exact multiple of the page size, so one
        // more empty fetch is needed to settle the flag
        let fetched = session.load_more().await.unwrap();
        assert_eq!(0, fetched);
        assert!(!session.state().borrow().has_more);

        session.detach().await;
    }

    #[tokio::test]
    async fn inbox_feed_tracks_conversation_summaries() {
        let db = database().await;
        seed_conversation(&db, "trip-a", &["alice", "bob"]).await;
        seed_conversation(&db, "trip-b", &["alice", "carol"]).await;
        seed_conversation(&db, "other", &["dave", "erin"]).await;

        let session = FeedSession::new(db.clone());
        session
            .attach(InboxFeed {
                user: "alice".to_string(),
            })
            .await
            .unwrap();

        let mut state = session.state();
        let snapshot = state
            .wait_for(|state| state.items.len() == 2)
            .await
            .unwrap()
            .clone();

        assert!(snapshot.items.iter().all(|c| c.contains_user("alice")));

        // Summary updates flow through the same window
        db.bump_unreads("trip-a", "bob").await.unwrap();
        let snapshot = state
            .wait_for(|state| {
                state
                    .items
                    .iter()
                    .any(|c| c.id == "trip-a" && c.unread_count("alice") == 1)
            })
            .await
            .unwrap()
            .clone();
        assert_eq!(2, snapshot.items.len());

        session.detach().await;
    }
}
