mod bookmarks;
mod comments;
mod conversations;
mod follows;
mod likes;
mod messages;
mod notifications;
mod posts;
mod users;

use super::models::{
    CommentRecord, ConversationRecord, MessageRecord, NotificationRecord, PostRecord, UserRecord,
};
use anyhow::Result;
use rusqlite::Connection;
use std::collections::HashMap;

pub trait UserRepository {
    fn create(&self, record: &UserRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<UserRecord>>;
    fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>>;
    /// Overwrites every profile column of an existing user (not the credentials).
    fn update_profile(&self, record: &UserRecord) -> Result<()>;
    /// Users that are neither `user_id` nor followed by `user_id`, in store order.
    fn list_not_followed_by(&self, user_id: &str, limit: usize) -> Result<Vec<UserRecord>>;
    /// Case-insensitive substring match on the username.
    fn search_username(&self, keyword: &str, limit: usize) -> Result<Vec<UserRecord>>;
}

pub trait FollowRepository {
    fn is_following(&self, follower_id: &str, following_id: &str) -> Result<bool>;
    fn follow(&self, follower_id: &str, following_id: &str, created_at: &str) -> Result<()>;
    fn unfollow(&self, follower_id: &str, following_id: &str) -> Result<usize>;
    fn followers_of(&self, user_id: &str) -> Result<Vec<String>>;
    fn following_of(&self, user_id: &str) -> Result<Vec<String>>;
}

pub trait PostRepository {
    fn create(&self, record: &PostRecord, images: &[String]) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<PostRecord>>;
    fn images_for(&self, post_id: &str) -> Result<Vec<String>>;
    /// Newest first.
    fn list_recent(&self, limit: usize, offset: usize) -> Result<Vec<PostRecord>>;
    /// Newest first.
    fn list_for_author(&self, author_id: &str, limit: usize, offset: usize) -> Result<Vec<PostRecord>>;
    /// The author's post sequence in creation order.
    fn ids_for_author(&self, author_id: &str) -> Result<Vec<String>>;
    /// Newest first.
    fn list_liked_by(&self, user_id: &str) -> Result<Vec<PostRecord>>;
    fn delete(&self, id: &str) -> Result<usize>;
}

pub trait LikeRepository {
    fn has_liked(&self, post_id: &str, user_id: &str) -> Result<bool>;
    /// Returns the number of inserted rows (0 when the like already existed).
    fn add(&self, post_id: &str, user_id: &str, created_at: &str) -> Result<usize>;
    fn remove(&self, post_id: &str, user_id: &str) -> Result<usize>;
    fn likers_of(&self, post_id: &str) -> Result<Vec<String>>;
    fn count_for_post(&self, post_id: &str) -> Result<usize>;
    fn delete_for_post(&self, post_id: &str) -> Result<usize>;
}

pub trait CommentRepository {
    fn create(&self, record: &CommentRecord) -> Result<()>;
    /// Newest first.
    fn list_for_post(&self, post_id: &str) -> Result<Vec<CommentRecord>>;
    fn count_for_post(&self, post_id: &str) -> Result<usize>;
    fn delete_for_post(&self, post_id: &str) -> Result<usize>;
}

pub trait BookmarkRepository {
    fn is_bookmarked(&self, user_id: &str, post_id: &str) -> Result<bool>;
    fn add(&self, user_id: &str, post_id: &str, created_at: &str) -> Result<usize>;
    fn remove(&self, user_id: &str, post_id: &str) -> Result<usize>;
    /// Bookmarked post ids in the order they were bookmarked.
    fn post_ids_for_user(&self, user_id: &str) -> Result<Vec<String>>;
    fn delete_for_post(&self, post_id: &str) -> Result<usize>;
}

pub trait ConversationRepository {
    fn find_by_pair(&self, user_a: &str, user_b: &str) -> Result<Option<ConversationRecord>>;
    /// Inserts the conversation unless one already exists for its participant pair.
    /// Returns whether a row was inserted.
    fn insert_if_absent(&self, record: &ConversationRecord) -> Result<bool>;
    /// Most recently active first.
    fn list_for_user(&self, user_id: &str) -> Result<Vec<ConversationRecord>>;
    fn set_last_message(&self, conversation_id: &str, message_id: &str, at: &str) -> Result<()>;
    fn ensure_unread_counter(&self, conversation_id: &str, user_id: &str) -> Result<()>;
    fn increment_unread(&self, conversation_id: &str, user_id: &str) -> Result<()>;
    fn reset_unread(&self, conversation_id: &str, user_id: &str) -> Result<()>;
    /// Returns HashMap<user_id, count>
    fn unread_counts(&self, conversation_id: &str) -> Result<HashMap<String, i64>>;
    fn count(&self) -> Result<usize>;
}

pub trait MessageRepository {
    fn create(&self, record: &MessageRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<MessageRecord>>;
    /// Newest first.
    fn list_for_conversation(&self, conversation_id: &str, limit: usize) -> Result<Vec<MessageRecord>>;
    fn mark_seen_by(&self, conversation_id: &str, receiver_id: &str, seen_at: &str) -> Result<usize>;
    fn count_for_conversation(&self, conversation_id: &str) -> Result<usize>;
}

pub trait NotificationRepository {
    fn create(&self, record: &NotificationRecord) -> Result<()>;
    fn get(&self, id: &str) -> Result<Option<NotificationRecord>>;
    /// Newest first.
    fn list_for_receiver(&self, receiver_id: &str, limit: usize) -> Result<Vec<NotificationRecord>>;
    fn count_unread(&self, receiver_id: &str) -> Result<usize>;
    fn mark_read(&self, id: &str) -> Result<()>;
    fn count_for_post(&self, post_id: &str) -> Result<usize>;
    fn delete_for_post(&self, post_id: &str) -> Result<usize>;
}

/// Repository factory bound to one connection (or one open transaction).
pub struct SqliteRepositories<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRepositories<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn users(&self) -> impl UserRepository + '_ {
        users::SqliteUserRepository { conn: self.conn }
    }

    pub fn follows(&self) -> impl FollowRepository + '_ {
        follows::SqliteFollowRepository { conn: self.conn }
    }

    pub fn posts(&self) -> impl PostRepository + '_ {
        posts::SqlitePostRepository { conn: self.conn }
    }

    pub fn likes(&self) -> impl LikeRepository + '_ {
        likes::SqliteLikeRepository { conn: self.conn }
    }

    pub fn comments(&self) -> impl CommentRepository + '_ {
        comments::SqliteCommentRepository { conn: self.conn }
    }

    pub fn bookmarks(&self) -> impl BookmarkRepository + '_ {
        bookmarks::SqliteBookmarkRepository { conn: self.conn }
    }

    pub fn conversations(&self) -> impl ConversationRepository + '_ {
        conversations::SqliteConversationRepository { conn: self.conn }
    }

    pub fn messages(&self) -> impl MessageRepository + '_ {
        messages::SqliteMessageRepository { conn: self.conn }
    }

    pub fn notifications(&self) -> impl NotificationRepository + '_ {
        notifications::SqliteNotificationRepository { conn: self.conn }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MIGRATIONS;

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        conn.execute_batch(MIGRATIONS).expect("migrations");
        conn
    }

    fn user(id: &str, username: &str) -> UserRecord {
        UserRecord {
            id: id.into(),
            username: username.into(),
            email: format!("{username}@example.com"),
            password_hash: "hash".into(),
            full_name: String::new(),
            profile_picture: String::new(),
            bio: String::new(),
            website: String::new(),
            location: String::new(),
            gender: "male".into(),
            phone_number: "555".into(),
            date_of_birth: None,
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    fn post(id: &str, author: &str, created_at: &str) -> PostRecord {
        PostRecord {
            id: id.into(),
            author_id: author.into(),
            caption: format!("caption {id}"),
            music: None,
            location: None,
            created_at: created_at.into(),
            updated_at: created_at.into(),
        }
    }

    #[test]
    fn user_lookup_and_search() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);
        repos.users().create(&user("u1", "Alice")).unwrap();
        repos.users().create(&user("u2", "bob")).unwrap();
        repos.users().create(&user("u3", "malice_99")).unwrap();

        assert_eq!(repos.users().get_by_username("Alice").unwrap().unwrap().id, "u1");
        assert!(repos.users().get_by_username("alice").unwrap().is_none());

        let found = repos.users().search_username("ALICE", 20).unwrap();
        let ids: Vec<_> = found.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u3"]);

        // Wildcards in the keyword are matched literally.
        assert!(repos.users().search_username("%", 20).unwrap().is_empty());
        assert_eq!(repos.users().search_username("_9", 20).unwrap().len(), 1);
    }

    #[test]
    fn search_folds_non_ascii_case() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);
        repos.users().create(&user("u1", "Émile")).unwrap();
        repos.users().create(&user("u2", "ÖZGÜR")).unwrap();

        for keyword in ["émile", "ÉMILE", "mil"] {
            let found = repos.users().search_username(keyword, 20).unwrap();
            assert_eq!(found.len(), 1, "keyword {keyword}");
            assert_eq!(found[0].username, "Émile");
        }
        assert_eq!(repos.users().search_username("özgü", 20).unwrap()[0].id, "u2");
    }

    #[test]
    fn duplicate_username_is_rejected_by_schema() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);
        repos.users().create(&user("u1", "alice")).unwrap();
        assert!(repos.users().create(&user("u2", "alice")).is_err());
    }

    #[test]
    fn follow_edges_are_projected_both_ways() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);
        repos.users().create(&user("u1", "alice")).unwrap();
        repos.users().create(&user("u2", "bob")).unwrap();
        repos.users().create(&user("u3", "carol")).unwrap();

        repos.follows().follow("u1", "u2", "2024-01-01T00:00:00Z").unwrap();
        assert!(repos.follows().is_following("u1", "u2").unwrap());
        assert!(!repos.follows().is_following("u2", "u1").unwrap());
        assert_eq!(repos.follows().followers_of("u2").unwrap(), vec!["u1".to_string()]);
        assert_eq!(repos.follows().following_of("u1").unwrap(), vec!["u2".to_string()]);

        let suggestions = repos.users().list_not_followed_by("u1", 10).unwrap();
        let ids: Vec<_> = suggestions.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["u3"]);

        assert!(repos.follows().follow("u1", "u1", "2024-01-01T00:00:00Z").is_err());
        assert_eq!(repos.follows().unfollow("u1", "u2").unwrap(), 1);
        assert!(repos.follows().followers_of("u2").unwrap().is_empty());
    }

    #[test]
    fn posts_keep_image_order_and_list_newest_first() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);
        repos.users().create(&user("u1", "alice")).unwrap();
        repos
            .posts()
            .create(
                &post("p1", "u1", "2024-01-01T00:00:01Z"),
                &["a.jpg".into(), "b.jpg".into(), "c.jpg".into()],
            )
            .unwrap();
        repos
            .posts()
            .create(&post("p2", "u1", "2024-01-01T00:00:02Z"), &["d.jpg".into()])
            .unwrap();

        assert_eq!(repos.posts().images_for("p1").unwrap(), vec!["a.jpg", "b.jpg", "c.jpg"]);
        let recent: Vec<_> = repos
            .posts()
            .list_recent(10, 0)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(recent, vec!["p2", "p1"]);
        assert_eq!(repos.posts().ids_for_author("u1").unwrap(), vec!["p1", "p2"]);
        assert_eq!(repos.posts().list_recent(1, 1).unwrap()[0].id, "p1");
    }

    #[test]
    fn likes_are_a_set() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);
        repos.users().create(&user("u1", "alice")).unwrap();
        repos
            .posts()
            .create(&post("p1", "u1", "2024-01-01T00:00:01Z"), &["a.jpg".into()])
            .unwrap();

        assert_eq!(repos.likes().add("p1", "u1", "2024-01-01T00:00:02Z").unwrap(), 1);
        assert_eq!(repos.likes().add("p1", "u1", "2024-01-01T00:00:03Z").unwrap(), 0);
        assert_eq!(repos.likes().count_for_post("p1").unwrap(), 1);
        assert_eq!(repos.posts().list_liked_by("u1").unwrap().len(), 1);
        assert_eq!(repos.likes().remove("p1", "u1").unwrap(), 1);
        assert_eq!(repos.likes().remove("p1", "u1").unwrap(), 0);
        assert_eq!(repos.likes().count_for_post("p1").unwrap(), 0);
    }

    #[test]
    fn conversation_pair_is_unique() {
        let conn = setup_conn();
        let repos = SqliteRepositories::new(&conn);
        repos.users().create(&user("u1", "alice")).unwrap();
        repos.users().create(&user("u2", "bob")).unwrap();

        let record = ConversationRecord {
            id: "c1".into(),
            participant_a: "u1".into(),
            participant_b: "u2".into(),
            last_message_id: None,
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-01T00:00:00Z".into(),
        };
        assert!(repos.conversations().insert_if_absent(&record).unwrap());
        let duplicate = ConversationRecord {
            id: "c2".into(),
            ..record.clone()
        };
        assert!(!repos.conversations().insert_if_absent(&duplicate).unwrap());
        assert_eq!(repos.conversations().count().unwrap(), 1);
        assert_eq!(
            repos.conversations().find_by_pair("u2", "u1").unwrap().unwrap().id,
            "c1"
        );

        repos.conversations().ensure_unread_counter("c1", "u2").unwrap();
        repos.conversations().increment_unread("c1", "u2").unwrap();
        repos.conversations().increment_unread("c1", "u2").unwrap();
        repos.conversations().ensure_unread_counter("c1", "u2").unwrap();
        let counts = repos.conversations().unread_counts("c1").unwrap();
        assert_eq!(counts.get("u2"), Some(&2));
        repos.conversations().reset_unread("c1", "u2").unwrap();
        assert_eq!(repos.conversations().unread_counts("c1").unwrap().get("u2"), Some(&0));
    }
}
