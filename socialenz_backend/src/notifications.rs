use crate::database::models::NotificationRecord;
use crate::database::repositories::{NotificationRepository, SqliteRepositories};
use crate::database::Database;
use crate::error::{SocialError, SocialResult};
use crate::identity::{summary_of, UserSummary};
use crate::utils::now_utc_iso;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const LIST_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Follow => "follow",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "like" => Some(NotificationKind::Like),
            "comment" => Some(NotificationKind::Comment),
            "follow" => Some(NotificationKind::Follow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub sender_id: String,
    pub receiver_id: String,
    pub kind: NotificationKind,
    pub post_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub sender: UserSummary,
    pub receiver_id: String,
    pub post_id: Option<String>,
    pub message: Option<String>,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
    pub notifications: Vec<NotificationView>,
    pub unread_count: usize,
}

/// Inserts a notification through the given repositories so callers can make it part of
/// a larger transaction.
pub(crate) fn insert_notification(
    repos: &SqliteRepositories<'_>,
    input: NewNotification,
) -> anyhow::Result<NotificationView> {
    let record = NotificationRecord {
        id: Uuid::new_v4().to_string(),
        receiver_id: input.receiver_id,
        sender_id: input.sender_id,
        kind: input.kind.as_str().to_string(),
        post_id: input.post_id,
        message: input.message,
        read: false,
        created_at: now_utc_iso(),
    };
    repos.notifications().create(&record)?;
    view_of(repos, record)
}

fn view_of(repos: &SqliteRepositories<'_>, record: NotificationRecord) -> anyhow::Result<NotificationView> {
    let kind = NotificationKind::parse(&record.kind)
        .ok_or_else(|| anyhow::anyhow!("unknown notification kind {}", record.kind))?;
    let sender = summary_of(repos, &record.sender_id)?;
    Ok(NotificationView {
        id: record.id,
        kind,
        sender,
        receiver_id: record.receiver_id,
        post_id: record.post_id,
        message: record.message,
        read: record.read,
        created_at: record.created_at,
    })
}

#[derive(Clone)]
pub struct NotificationService {
    database: Database,
}

impl NotificationService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Plain insert, no deduplication.
    pub fn create(&self, input: NewNotification) -> SocialResult<NotificationView> {
        self.database
            .with_repositories(|repos| Ok(insert_notification(&repos, input)?))
    }

    pub fn list(&self, user_id: &str) -> SocialResult<NotificationList> {
        self.database.with_repositories(|repos| {
            let records = repos.notifications().list_for_receiver(user_id, LIST_LIMIT)?;
            let mut notifications = Vec::with_capacity(records.len());
            for record in records {
                notifications.push(view_of(&repos, record)?);
            }
            let unread_count = repos.notifications().count_unread(user_id)?;
            Ok(NotificationList {
                notifications,
                unread_count,
            })
        })
    }

    pub fn mark_read(&self, notification_id: &str, user_id: &str) -> SocialResult<NotificationView> {
        self.database.with_repositories(|repos| {
            let record = repos
                .notifications()
                .get(notification_id)?
                .ok_or_else(|| SocialError::not_found("Notification not found"))?;
            if record.receiver_id != user_id {
                return Err(SocialError::forbidden(
                    "You can only update your own notifications",
                ));
            }
            repos.notifications().mark_read(notification_id)?;
            let record = NotificationRecord { read: true, ..record };
            Ok(view_of(&repos, record)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tests::seed_user;

    #[test]
    fn notifications_list_newest_first_with_unread_count() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let service = NotificationService::new(db);

        for kind in [NotificationKind::Follow, NotificationKind::Like] {
            service
                .create(NewNotification {
                    sender_id: bob.clone(),
                    receiver_id: alice.clone(),
                    kind,
                    post_id: None,
                    message: Some("hello".into()),
                })
                .unwrap();
        }

        let list = service.list(&alice).unwrap();
        assert_eq!(list.unread_count, 2);
        assert_eq!(list.notifications[0].kind, NotificationKind::Like);
        assert_eq!(list.notifications[0].sender.username, "bob");
        assert!(service.list(&bob).unwrap().notifications.is_empty());
    }

    #[test]
    fn only_the_receiver_can_mark_read() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let service = NotificationService::new(db);
        let created = service
            .create(NewNotification {
                sender_id: bob.clone(),
                receiver_id: alice.clone(),
                kind: NotificationKind::Follow,
                post_id: None,
                message: None,
            })
            .unwrap();

        assert!(matches!(
            service.mark_read(&created.id, &bob),
            Err(SocialError::Forbidden(_))
        ));
        assert!(matches!(
            service.mark_read("missing", &alice),
            Err(SocialError::NotFound(_))
        ));
        let updated = service.mark_read(&created.id, &alice).unwrap();
        assert!(updated.read);
        assert_eq!(service.list(&alice).unwrap().unread_count, 0);
    }

    #[test]
    fn kind_serializes_as_type() {
        let view = NotificationView {
            id: "n".into(),
            kind: NotificationKind::Comment,
            sender: UserSummary {
                id: "u".into(),
                username: "bob".into(),
                profile_picture: String::new(),
            },
            receiver_id: "r".into(),
            post_id: Some("p".into()),
            message: None,
            read: false,
            created_at: "now".into(),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "comment");
        assert_eq!(json["postId"], "p");
    }
}
