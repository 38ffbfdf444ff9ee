use wayfarer_database::iso8601_timestamp::Timestamp;
use wayfarer_database::{Conversation, Message};

/// Entry that can live in a [`Timeline`]: ordered by creation time,
/// identified by a server id or, before one exists, by a client key.
pub trait FeedEntry: Clone + PartialEq + Send + Sync + 'static {
    /// Server-assigned id; empty while the entry is a pending local echo
    fn entry_id(&self) -> &str;

    /// Client-generated key matching a pending echo to its stored entry
    fn client_key(&self) -> Option<&str>;

    /// When the entry was created
    fn created_at(&self) -> Timestamp;
}

impl FeedEntry for Message {
    fn entry_id(&self) -> &str {
        &self.id
    }

    fn client_key(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }
}

impl FeedEntry for Conversation {
    fn entry_id(&self) -> &str {
        &self.id
    }

    fn client_key(&self) -> Option<&str> {
        None
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }
}

/// Chronologically ordered, duplicate-free sequence of feed entries.
///
/// The tail of the sequence mirrors the live window; everything before it
/// came from backfill pages. After every merge the sequence is
/// non-decreasing by creation time and holds at most one entry per
/// logical item.
pub struct Timeline<T: FeedEntry> {
    entries: Vec<T>,
}

impl<T: FeedEntry> Default for Timeline<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: FeedEntry> Timeline<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in ascending creation order
    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest known entry
    pub fn oldest(&self) -> Option<&T> {
        self.entries.first()
    }

    /// Apply a full live-window snapshot, delivered most recent first.
    ///
    /// The window owns everything at or after its oldest timestamp; the
    /// backfilled prefix before that point stays untouched. Pending local
    /// echoes survive until their stored counterpart arrives. An empty
    /// window has no range and replaces nothing.
    pub fn apply_window(&mut self, mut window: Vec<T>) {
        window.reverse();

        let Some(window_start) = window.first().map(|entry| entry.created_at()) else {
            return;
        };

        self.entries.retain(|entry| {
            entry.created_at() < window_start || entry.entry_id().is_empty()
        });

        for entry in window {
            self.merge_entry(entry);
        }

        self.sort();
    }

    /// Prepend a page of older entries, delivered most recent first
    pub fn prepend_older(&mut self, mut page: Vec<T>) {
        page.reverse();

        for entry in page {
            self.merge_entry(entry);
        }

        self.sort();
    }

    /// Insert a local echo that has not round-tripped yet
    pub fn insert_pending(&mut self, entry: T) {
        self.merge_entry(entry);
        self.sort();
    }

    /// Merge one entry, resolving it against any logical duplicate:
    /// a stored entry always beats a pending echo, and between two
    /// stored entries the later-merged one wins.
    fn merge_entry(&mut self, entry: T) {
        let Some(existing) = self
            .entries
            .iter_mut()
            .find(|existing| same_entry(*existing, &entry))
        else {
            self.entries.push(entry);
            return;
        };

        if entry.entry_id().is_empty() && !existing.entry_id().is_empty() {
            return;
        }

        *existing = entry;
    }

    fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| a.created_at().cmp(&b.created_at()));
    }
}

/// Whether two entries denote the same logical item
fn same_entry<T: FeedEntry>(a: &T, b: &T) -> bool {
    if !a.entry_id().is_empty() && a.entry_id() == b.entry_id() {
        return true;
    }

    matches!(
        (a.client_key(), b.client_key()),
        (Some(ours), Some(theirs)) if ours == theirs
    )
}

#[cfg(test)]
mod tests {
    use wayfarer_database::iso8601_timestamp::{Duration, Timestamp};
    use wayfarer_database::Message;

    use super::Timeline;

    fn at(millis: i64) -> Timestamp {
        Timestamp::UNIX_EPOCH + Duration::milliseconds(millis)
    }

    fn message(id: &str, millis: i64) -> Message {
        Message {
            id: id.to_string(),
            created_at: at(millis),
            ..Default::default()
        }
    }

    fn pending(nonce: &str, millis: i64) -> Message {
        Message {
            nonce: Some(nonce.to_string()),
            created_at: at(millis),
            ..Default::default()
        }
    }

    fn ids(timeline: &Timeline<Message>) -> Vec<&str> {
        timeline
            .entries()
            .iter()
            .map(|entry| entry.id.as_str())
            .collect()
    }

    fn assert_ascending(timeline: &Timeline<Message>) {
        let entries = timeline.entries();
        for pair in entries.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[test]
    fn window_extends_a_backfilled_prefix() {
        let mut timeline = Timeline::new();
        timeline.prepend_older(vec![message("2", 20), message("1", 10)]);

        timeline.apply_window(vec![message("4", 40), message("3", 30)]);

        assert_eq!(vec!["1", "2", "3", "4"], ids(&timeline));
        assert_ascending(&timeline);
    }

    #[test]
    fn window_replaces_its_own_range() {
        let mut timeline = Timeline::new();
        timeline.apply_window(vec![message("3", 30), message("2", 20)]);

        // The window now reaches further back and no longer carries "2":
        // within its range the delivery is authoritative
        timeline.apply_window(vec![message("3", 30), message("1", 15)]);

        assert_eq!(vec!["1", "3"], ids(&timeline));
    }

    #[test]
    fn entries_below_the_window_range_are_kept() {
        let mut timeline = Timeline::new();
        timeline.apply_window(vec![message("3", 30), message("2", 20)]);

        // "2" fell out of the bounded window; it predates the new range
        // and stays as prefix
        timeline.apply_window(vec![message("4", 40), message("3", 30)]);

        assert_eq!(vec!["2", "3", "4"], ids(&timeline));
    }

    #[test]
    fn empty_window_is_a_noop() {
        let mut timeline = Timeline::new();
        timeline.prepend_older(vec![message("1", 10)]);

        timeline.apply_window(Vec::new());

        assert_eq!(vec!["1"], ids(&timeline));
    }

    #[test]
    fn duplicates_never_grow_the_sequence() {
        let mut timeline = Timeline::new();
        timeline.apply_window(vec![message("2", 20), message("1", 10)]);
        let before = timeline.len();

        timeline.prepend_older(vec![message("1", 10)]);
        timeline.apply_window(vec![message("2", 20), message("1", 10)]);

        assert_eq!(before, timeline.len());
        assert_ascending(&timeline);
    }

    #[test]
    fn later_stored_entry_wins() {
        let mut timeline = Timeline::new();
        timeline.prepend_older(vec![message("1", 10)]);

        let mut edited = message("1", 10);
        edited.content = "updated".to_string();
        timeline.apply_window(vec![edited]);

        assert_eq!(1, timeline.len());
        assert_eq!("updated", timeline.entries()[0].content);
    }

    #[test]
    fn stored_entry_replaces_pending_echo() {
        let mut timeline = Timeline::new();
        timeline.insert_pending(pending("c1", 50));

        let mut stored = message("5", 50);
        stored.nonce = Some("c1".to_string());
        timeline.apply_window(vec![stored]);

        assert_eq!(1, timeline.len());
        assert_eq!("5", timeline.entries()[0].id);
    }

    #[test]
    fn pending_echo_survives_unrelated_windows() {
        let mut timeline = Timeline::new();
        timeline.insert_pending(pending("c1", 50));

        timeline.apply_window(vec![message("2", 45), message("1", 40)]);

        assert_eq!(3, timeline.len());
        assert!(timeline.entries().iter().any(|entry| entry.id.is_empty()));
        assert_ascending(&timeline);
    }

    #[test]
    fn pending_echo_does_not_displace_a_stored_entry() {
        let mut timeline = Timeline::new();
        let mut stored = message("5", 50);
        stored.nonce = Some("c1".to_string());
        timeline.apply_window(vec![stored]);

        timeline.insert_pending(pending("c1", 50));

        assert_eq!(1, timeline.len());
        assert_eq!("5", timeline.entries()[0].id);
    }

    #[test]
    fn pages_prepend_without_reordering_the_tail() {
        let mut timeline = Timeline::new();
        timeline.apply_window(vec![message("6", 60), message("5", 50)]);

        timeline.prepend_older(vec![message("4", 40), message("3", 30)]);
        timeline.prepend_older(vec![message("2", 20), message("1", 10)]);

        assert_eq!(vec!["1", "2", "3", "4", "5", "6"], ids(&timeline));
        assert_ascending(&timeline);
    }

    #[test]
    fn interleaved_merges_keep_the_order_invariant() {
        let mut timeline = Timeline::new();
        timeline.apply_window(vec![message("8", 80), message("7", 70)]);
        timeline.prepend_older(vec![message("6", 60), message("5", 50)]);
        timeline.apply_window(vec![message("9", 90), message("8", 80)]);
        timeline.prepend_older(vec![message("4", 40)]);
        timeline.apply_window(vec![message("9", 90), message("8", 80)]);

        assert_eq!(vec!["4", "5", "6", "7", "8", "9"], ids(&timeline));
        assert_ascending(&timeline);
    }
}
