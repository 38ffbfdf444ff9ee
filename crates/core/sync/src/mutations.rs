use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::lock::Mutex;
use lru::LruCache;
use ulid::Ulid;

use wayfarer_config::config;
use wayfarer_database::{Database, Message, MessagePreview};
use wayfarer_result::{Error, Result};

use crate::content::{sanitize_content, truncate_chars};

/// Receipt of a successful send.
///
/// The message write and the conversation bookkeeping write are separate
/// operations. When only the bookkeeping fails, the message still exists;
/// the failure is reported here instead of failing the call, so callers
/// can retry the bookkeeping without re-sending the message.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub message: Message,
    pub metadata_error: Option<Error>,
}

/// Write path for conversations: sending, read receipts, membership.
///
/// Construct one per composition root with its engine handle; clones
/// share the nonce cache.
#[derive(Clone)]
pub struct Messenger {
    db: Database,
    nonces: Arc<Mutex<LruCache<String, ()>>>,
}

impl Messenger {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            nonces: Arc::new(Mutex::new(LruCache::new(NonZeroUsize::new(1000).unwrap()))),
        }
    }

    /// Send a message.
    ///
    /// Content is scrubbed and silently truncated; a message needs either
    /// content or an attachment. The sent message is not injected into
    /// any open feed directly; it arrives through the next live window
    /// delivery, matched against an optimistic echo by its nonce.
    pub async fn send_message(
        &self,
        conversation: &str,
        author: &str,
        content: &str,
        attachment: Option<String>,
        nonce: Option<String>,
    ) -> Result<SendReceipt> {
        let settings = config().await;

        require_field("conversation", conversation)?;
        require_field("author", author)?;
        if let Some(url) = &attachment {
            require_field("attachment", url)?;
        }

        let content = sanitize_content(content, settings.features.limits.message_length);
        if content.is_empty() && attachment.is_none() {
            return Err(create_error!(EmptyMessage));
        }

        let nonce = match nonce {
            Some(nonce) => {
                let mut nonces = self.nonces.lock().await;
                if nonces.get(&nonce).is_some() {
                    return Err(create_error!(DuplicateNonce));
                }
                nonces.put(nonce.clone(), ());
                nonce
            }
            None => Ulid::new().to_string(),
        };

        // Resolve the conversation before writing anything
        self.db.fetch_conversation(conversation).await?;

        let mut message = Message {
            id: Ulid::new().to_string(),
            nonce: Some(nonce),
            conversation: conversation.to_string(),
            author: author.to_string(),
            content,
            attachment,
            ..Default::default()
        };

        self.db.insert_message(&mut message).await?;

        // Bookkeeping is a separate write set with no transaction around
        // it; a failure here leaves the message in place and is reported
        // on the receipt
        let preview = MessagePreview {
            content: truncate_chars(&message.content, settings.features.limits.preview_length),
            author: author.to_string(),
            created_at: message.created_at,
        };

        let metadata_error = match self.register_message(conversation, author, &preview).await {
            Ok(()) => None,
            Err(error) => {
                warn!("Message stored but conversation bookkeeping failed: {error:?}");
                Some(error)
            }
        };

        Ok(SendReceipt {
            message,
            metadata_error,
        })
    }

    /// Mark a message read.
    ///
    /// Re-marking by the same member is a no-op. The member's unread
    /// counter is zeroed outright, not decremented: reading any one
    /// message counts the member as caught up on the conversation.
    pub async fn mark_read(&self, conversation: &str, message: &str, user: &str) -> Result<()> {
        require_field("conversation", conversation)?;
        require_field("message", message)?;
        require_field("user", user)?;

        self.db.add_read_receipt(message, user).await?;
        self.db.clear_unread(conversation, user).await
    }

    /// Add a user to a conversation, recording who added them
    pub async fn add_member(&self, conversation: &str, user: &str, added_by: &str) -> Result<()> {
        require_field("conversation", conversation)?;
        require_field("user", user)?;
        require_field("added_by", added_by)?;

        let settings = config().await;
        let existing = self.db.fetch_conversation(conversation).await?;

        if existing.contains_user(user) {
            return Err(create_error!(AlreadyInConversation));
        }

        let max = settings.features.limits.conversation_size;
        if existing.recipients.len() >= max {
            return Err(create_error!(ConversationFull { max }));
        }

        self.db
            .add_user_to_conversation(conversation, user, added_by)
            .await
    }

    /// Remove a user from a conversation.
    ///
    /// Only the member recorded as the user's adder may remove them, and
    /// never the user themselves. Both refusals raise the same error so
    /// callers cannot tell which rule applied.
    pub async fn remove_member(
        &self,
        conversation: &str,
        user: &str,
        requested_by: &str,
    ) -> Result<()> {
        require_field("conversation", conversation)?;
        require_field("user", user)?;
        require_field("requested_by", requested_by)?;

        let existing = self.db.fetch_conversation(conversation).await?;
        if !existing.contains_user(user) {
            return Err(create_error!(NotInConversation));
        }

        match existing.added_by(user) {
            Some(added_by) if added_by == requested_by && requested_by != user => {
                self.db
                    .remove_user_from_conversation(conversation, user)
                    .await
            }
            _ => Err(create_error!(PermissionDenied)),
        }
    }

    async fn register_message(
        &self,
        conversation: &str,
        author: &str,
        preview: &MessagePreview,
    ) -> Result<()> {
        self.db.set_last_message(conversation, preview).await?;
        self.db.bump_unreads(conversation, author).await
    }
}

fn require_field(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(create_error!(FailedValidation {
            field: field.to_string()
        }));
    }

    Ok(())
}
