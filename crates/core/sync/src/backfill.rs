use wayfarer_database::PageCursor;

/// Backward pagination state for one feed.
///
/// Owns the cursor and the "more available" flag. At most one page fetch
/// may be in flight; further requests while busy are dropped, not queued.
#[derive(Debug, Clone, Default)]
pub struct Paginator {
    cursor: Option<PageCursor>,
    has_more: bool,
    in_flight: bool,
}

impl Paginator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> Option<&PageCursor> {
        self.cursor.as_ref()
    }

    /// Whether older entries may still exist.
    ///
    /// Derived from the size of the last fetched page, so a feed whose
    /// remainder is an exact multiple of the page size needs one extra
    /// empty fetch before this settles to `false`.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Seed the cursor from the first live delivery. Later deliveries
    /// never move it; only fetched pages do.
    pub fn seed(&mut self, cursor: PageCursor) {
        if self.cursor.is_none() {
            self.cursor = Some(cursor);
            self.has_more = true;
        }
    }

    /// Begin a page fetch. Returns the cursor to fetch before, or `None`
    /// when no cursor exists yet or a fetch is already in flight.
    pub fn begin(&mut self) -> Option<PageCursor> {
        if self.in_flight {
            return None;
        }

        let cursor = self.cursor.clone()?;
        self.in_flight = true;
        Some(cursor)
    }

    /// Record a fetched page: advance the cursor to the page's oldest
    /// entry and derive whether more pages may exist.
    pub fn finish(&mut self, oldest: Option<PageCursor>, fetched: usize, page_size: usize) {
        self.in_flight = false;
        if let Some(oldest) = oldest {
            self.cursor = Some(oldest);
        }
        self.has_more = fetched == page_size;
    }

    /// Abandon an in-flight fetch without touching the cursor
    pub fn abort(&mut self) {
        self.in_flight = false;
    }
}
