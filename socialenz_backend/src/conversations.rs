use crate::database::models::{ConversationRecord, MessageRecord};
use crate::database::repositories::{
    ConversationRepository, MessageRepository, SqliteRepositories, UserRepository,
};
use crate::database::Database;
use crate::error::{SocialError, SocialResult};
use crate::identity::{summary_of, UserSummary};
use crate::utils::now_utc_iso;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    File,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Audio => "audio",
            MessageType::File => "file",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Some(MessageType::Text),
            "image" => Some(MessageType::Image),
            "video" => Some(MessageType::Video),
            "audio" => Some(MessageType::Audio),
            "file" => Some(MessageType::File),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewMessage {
    pub content: Option<String>,
    pub media_url: Option<String>,
    #[serde(rename = "type")]
    pub message_type: Option<MessageType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub media_url: Option<String>,
    pub is_seen: bool,
    pub delivered_at: Option<String>,
    pub seen_at: Option<String>,
    pub created_at: String,
}

impl MessageView {
    fn from_record(record: MessageRecord) -> Self {
        Self {
            message_type: MessageType::parse(&record.message_type).unwrap_or_default(),
            id: record.id,
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            content: record.content,
            media_url: record.media_url,
            is_seen: record.is_seen,
            delivered_at: record.delivered_at,
            seen_at: record.seen_at,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: String,
    pub participant: UserSummary,
    pub last_message: Option<MessageView>,
    pub unread_count: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenOutcome {
    pub conversation_id: String,
    pub marked: usize,
}

#[derive(Clone)]
pub struct ConversationService {
    database: Database,
}

impl ConversationService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Derives a deterministic conversation ID from two user IDs.
    pub fn derive_conversation_id(user_a: &str, user_b: &str) -> String {
        let mut users = [user_a, user_b];
        users.sort();
        let hash = blake3::hash(format!("socialenz-conversation-v1:{}:{}", users[0], users[1]).as_bytes());
        hash.as_bytes()[..16]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Persists a message, creating the pair's conversation on first contact. The
    /// lookup, insert, append and counter update share one transaction.
    pub fn send_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        input: NewMessage,
    ) -> SocialResult<MessageView> {
        let content = input
            .content
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        let media_url = input.media_url.filter(|url| !url.trim().is_empty());
        if content.is_none() && media_url.is_none() {
            return Err(SocialError::bad_request("Message content or media is required"));
        }
        if sender_id == receiver_id {
            return Err(SocialError::bad_request("You cannot message yourself"));
        }
        let message_type = input.message_type.unwrap_or_default();

        self.database.with_transaction(|repos| {
            if repos.users().get(receiver_id)?.is_none() {
                return Err(SocialError::not_found("Receiver not found"));
            }
            let now = now_utc_iso();
            let conversation = find_or_create(&repos, sender_id, receiver_id, &now)?;

            let record = MessageRecord {
                id: Uuid::new_v4().to_string(),
                conversation_id: conversation.id.clone(),
                sender_id: sender_id.to_string(),
                receiver_id: receiver_id.to_string(),
                content,
                message_type: message_type.as_str().to_string(),
                media_url,
                is_seen: false,
                delivered_at: Some(now.clone()),
                seen_at: None,
                created_at: now.clone(),
            };
            repos.messages().create(&record)?;
            repos
                .conversations()
                .set_last_message(&conversation.id, &record.id, &now)?;
            repos
                .conversations()
                .increment_unread(&conversation.id, receiver_id)?;
            Ok(MessageView::from_record(record))
        })
    }

    /// The ten most recent messages between the pair, newest first.
    pub fn list_messages(&self, user_a: &str, user_b: &str) -> SocialResult<Vec<MessageView>> {
        self.database.with_repositories(|repos| {
            let Some(conversation) = repos.conversations().find_by_pair(user_a, user_b)? else {
                return Ok(Vec::new());
            };
            let records = repos
                .messages()
                .list_for_conversation(&conversation.id, HISTORY_LIMIT)?;
            Ok(records.into_iter().map(MessageView::from_record).collect())
        })
    }

    pub fn list_conversations(&self, user_id: &str) -> SocialResult<Vec<ConversationView>> {
        self.database.with_repositories(|repos| {
            let mut views = Vec::new();
            for conversation in repos.conversations().list_for_user(user_id)? {
                let participant = summary_of(&repos, conversation.other_participant(user_id))?;
                let last_message = match conversation.last_message_id.as_deref() {
                    Some(id) => repos.messages().get(id)?.map(MessageView::from_record),
                    None => None,
                };
                let unread_count = repos
                    .conversations()
                    .unread_counts(&conversation.id)?
                    .get(user_id)
                    .copied()
                    .unwrap_or(0);
                views.push(ConversationView {
                    id: conversation.id,
                    participant,
                    last_message,
                    unread_count,
                    updated_at: conversation.updated_at,
                });
            }
            Ok(views)
        })
    }

    /// Resets the caller's unread counter and marks messages addressed to them as seen.
    pub fn mark_conversation_seen(&self, user_id: &str, other_user_id: &str) -> SocialResult<SeenOutcome> {
        self.database.with_transaction(|repos| {
            let conversation = repos
                .conversations()
                .find_by_pair(user_id, other_user_id)?
                .ok_or_else(|| SocialError::not_found("Conversation not found"))?;
            let marked = repos
                .messages()
                .mark_seen_by(&conversation.id, user_id, &now_utc_iso())?;
            repos.conversations().reset_unread(&conversation.id, user_id)?;
            Ok(SeenOutcome {
                conversation_id: conversation.id,
                marked,
            })
        })
    }
}

fn find_or_create(
    repos: &SqliteRepositories<'_>,
    sender_id: &str,
    receiver_id: &str,
    now: &str,
) -> anyhow::Result<ConversationRecord> {
    if let Some(existing) = repos.conversations().find_by_pair(sender_id, receiver_id)? {
        return Ok(existing);
    }
    let (participant_a, participant_b) = if sender_id < receiver_id {
        (sender_id, receiver_id)
    } else {
        (receiver_id, sender_id)
    };
    let record = ConversationRecord {
        id: ConversationService::derive_conversation_id(sender_id, receiver_id),
        participant_a: participant_a.to_string(),
        participant_b: participant_b.to_string(),
        last_message_id: None,
        created_at: now.to_string(),
        updated_at: now.to_string(),
    };
    repos.conversations().insert_if_absent(&record)?;
    let stored = repos
        .conversations()
        .find_by_pair(sender_id, receiver_id)?
        .ok_or_else(|| anyhow::anyhow!("conversation missing after insert"))?;
    repos.conversations().ensure_unread_counter(&stored.id, sender_id)?;
    repos.conversations().ensure_unread_counter(&stored.id, receiver_id)?;
    tracing::debug!(conversation_id = %stored.id, "created conversation");
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tests::seed_user;

    fn text(content: &str) -> NewMessage {
        NewMessage {
            content: Some(content.to_string()),
            ..NewMessage::default()
        }
    }

    #[test]
    fn conversation_id_is_order_independent() {
        let a = ConversationService::derive_conversation_id("alice", "bob");
        let b = ConversationService::derive_conversation_id("bob", "alice");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_ne!(a, ConversationService::derive_conversation_id("alice", "carol"));
    }

    #[test]
    fn send_message_validates_input() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let service = ConversationService::new(db);

        assert!(matches!(
            service.send_message(&alice, "anyone", NewMessage::default()),
            Err(SocialError::BadRequest(_))
        ));
        assert!(matches!(
            service.send_message(&alice, "anyone", text("   ")),
            Err(SocialError::BadRequest(_))
        ));
        assert!(matches!(
            service.send_message(&alice, &alice, text("hi")),
            Err(SocialError::BadRequest(_))
        ));
        assert!(matches!(
            service.send_message(&alice, "missing", text("hi")),
            Err(SocialError::NotFound(_))
        ));
    }

    #[test]
    fn first_message_creates_conversation_and_counts_unread() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let service = ConversationService::new(db.clone());

        let sent = service.send_message(&alice, &bob, text("hi")).unwrap();
        assert_eq!(sent.message_type, MessageType::Text);
        assert!(sent.delivered_at.is_some());
        assert!(!sent.is_seen);

        let counts = db
            .with_repositories(|repos| repos.conversations().unread_counts(&sent.conversation_id))
            .unwrap();
        assert_eq!(counts.get(&bob), Some(&1));
        assert_eq!(counts.get(&alice), Some(&0));

        let media_only = NewMessage {
            media_url: Some("/media/clip.mp4".into()),
            message_type: Some(MessageType::Video),
            ..NewMessage::default()
        };
        service.send_message(&bob, &alice, media_only).unwrap();

        let conversations = service.list_conversations(&alice).unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].participant.username, "bob");
        assert_eq!(conversations[0].unread_count, 1);
        assert_eq!(
            conversations[0].last_message.as_ref().map(|m| m.message_type),
            Some(MessageType::Video)
        );
    }

    #[test]
    fn history_is_capped_and_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let service = ConversationService::new(db);

        assert!(service.list_messages(&alice, &bob).unwrap().is_empty());
        for i in 0..12 {
            service.send_message(&alice, &bob, text(&format!("m{i}"))).unwrap();
        }
        let history = service.list_messages(&bob, &alice).unwrap();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].content.as_deref(), Some("m11"));
        assert_eq!(history[9].content.as_deref(), Some("m2"));
    }

    #[test]
    fn marking_seen_resets_only_the_callers_counter() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let service = ConversationService::new(db);

        assert!(matches!(
            service.mark_conversation_seen(&bob, &alice),
            Err(SocialError::NotFound(_))
        ));
        service.send_message(&alice, &bob, text("one")).unwrap();
        service.send_message(&alice, &bob, text("two")).unwrap();
        service.send_message(&bob, &alice, text("back")).unwrap();

        let outcome = service.mark_conversation_seen(&bob, &alice).unwrap();
        assert_eq!(outcome.marked, 2);
        assert_eq!(service.list_conversations(&bob).unwrap()[0].unread_count, 0);
        assert_eq!(service.list_conversations(&alice).unwrap()[0].unread_count, 1);

        let history = service.list_messages(&alice, &bob).unwrap();
        let to_bob: Vec<_> = history.iter().filter(|m| m.receiver_id == bob).collect();
        assert!(to_bob.iter().all(|m| m.is_seen && m.seen_at.is_some()));
        assert!(history.iter().filter(|m| m.receiver_id == alice).all(|m| !m.is_seen));
    }

    #[test]
    fn concurrent_first_messages_share_one_conversation() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let service = ConversationService::new(db.clone());

        std::thread::scope(|scope| {
            for i in 0..8 {
                let service = service.clone();
                let (from, to) = if i % 2 == 0 { (&alice, &bob) } else { (&bob, &alice) };
                scope.spawn(move || {
                    service
                        .send_message(from, to, text(&format!("msg {i}")))
                        .unwrap();
                });
            }
        });

        db.with_repositories(|repos| {
            assert_eq!(repos.conversations().count()?, 1);
            let conversation = repos.conversations().find_by_pair(&alice, &bob)?.unwrap();
            assert_eq!(repos.messages().count_for_conversation(&conversation.id)?, 8);
            let counts = repos.conversations().unread_counts(&conversation.id)?;
            assert_eq!(counts.get(&alice), Some(&4));
            assert_eq!(counts.get(&bob), Some(&4));
            Ok::<(), anyhow::Error>(())
        })
        .unwrap();
    }
}
