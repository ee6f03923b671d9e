use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub profile_picture: String,
    pub bio: String,
    pub website: String,
    pub location: String,
    pub gender: String, // 'male' or 'female'
    pub phone_number: String,
    pub date_of_birth: Option<String>, // YYYY-MM-DD
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: String,
    pub author_id: String,
    pub caption: String,
    /// URL of the optional audio track.
    pub music: Option<String>,
    pub location: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    /// Lexicographically smaller participant id.
    pub participant_a: String,
    pub participant_b: String,
    pub last_message_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ConversationRecord {
    pub fn other_participant(&self, user_id: &str) -> &str {
        if self.participant_a == user_id {
            &self.participant_b
        } else {
            &self.participant_a
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: Option<String>,
    pub message_type: String, // text, image, video, audio, file
    pub media_url: Option<String>,
    pub is_seen: bool,
    pub delivered_at: Option<String>,
    pub seen_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub receiver_id: String,
    pub sender_id: String,
    pub kind: String, // like, comment, follow
    pub post_id: Option<String>,
    pub message: Option<String>,
    pub read: bool,
    pub created_at: String,
}
