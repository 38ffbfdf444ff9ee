auto_derived!(
    /// Composite primary key of a typing signal
    #[derive(Hash)]
    pub struct ConversationCompositeKey {
        pub conversation: String,
        pub user: String,
    }

    /// One recorded typing write.
    ///
    /// The reference driver keeps these in arrival order so tests can
    /// assert how many writes a signal pattern produced.
    pub struct PresenceWrite {
        pub key: ConversationCompositeKey,
        pub typing: bool,
    }
);
