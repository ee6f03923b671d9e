use crate::database::models::{CommentRecord, PostRecord};
use crate::database::repositories::{
    BookmarkRepository, CommentRepository, LikeRepository, NotificationRepository, PostRepository,
    SqliteRepositories, UserRepository,
};
use crate::database::Database;
use crate::error::{SocialError, SocialResult};
use crate::identity::{summaries_of, summary_of, UserSummary};
use crate::notifications::{insert_notification, NewNotification, NotificationKind, NotificationView};
use crate::utils::now_utc_iso;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_POST_IMAGES: usize = 10;
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: String,
    pub caption: String,
    /// Already-uploaded image URLs, in display order.
    pub images: Vec<String>,
    pub music: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub text: String,
    pub author: UserSummary,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub caption: String,
    pub images: Vec<String>,
    pub music: Option<String>,
    pub location: Option<String>,
    pub author: UserSummary,
    pub likes: Vec<UserSummary>,
    pub likes_count: usize,
    /// Newest first.
    pub comments: Vec<CommentView>,
    pub comments_count: usize,
    pub created_at: String,
    pub updated_at: String,
}

/// Compact form used on profile pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: String,
    pub caption: String,
    pub image: Option<String>,
    pub likes_count: usize,
    pub comments_count: usize,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub posts: Vec<PostView>,
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeOutcome {
    pub liked: bool,
    pub likes_count: usize,
    #[serde(skip)]
    pub notification: Option<NotificationView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentOutcome {
    pub comment: CommentView,
    #[serde(skip)]
    pub notification: Option<NotificationView>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkOutcome {
    pub bookmarked: bool,
}

/// Checks caption and image count before anything is uploaded or stored.
pub fn validate_post_input(caption: &str, image_count: usize) -> SocialResult<()> {
    if caption.trim().is_empty() {
        return Err(SocialError::bad_request("Caption is required"));
    }
    if image_count == 0 {
        return Err(SocialError::bad_request("At least one image is required"));
    }
    if image_count > MAX_POST_IMAGES {
        return Err(SocialError::bad_request(format!(
            "A post can have at most {MAX_POST_IMAGES} images"
        )));
    }
    Ok(())
}

/// Resolves `page` (1-based) and `limit` query values into `(page, limit, offset)`.
/// Offsets that SQLite cannot represent are rejected.
pub fn page_window(page: Option<usize>, limit: Option<usize>) -> SocialResult<(usize, usize, usize)> {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1)
        .checked_mul(limit)
        .filter(|offset| i64::try_from(*offset).is_ok())
        .ok_or_else(|| SocialError::bad_request("Page is out of range"))?;
    Ok((page, limit, offset))
}

pub(crate) fn post_summaries_for_author(
    repos: &SqliteRepositories<'_>,
    author_id: &str,
) -> anyhow::Result<Vec<PostSummary>> {
    let mut summaries = Vec::new();
    for post_id in repos.posts().ids_for_author(author_id)? {
        let Some(post) = repos.posts().get(&post_id)? else {
            continue;
        };
        summaries.push(PostSummary {
            image: repos.posts().images_for(&post.id)?.into_iter().next(),
            likes_count: repos.likes().count_for_post(&post.id)?,
            comments_count: repos.comments().count_for_post(&post.id)?,
            id: post.id,
            caption: post.caption,
            created_at: post.created_at,
        });
    }
    Ok(summaries)
}

fn comment_view(repos: &SqliteRepositories<'_>, record: CommentRecord) -> anyhow::Result<CommentView> {
    Ok(CommentView {
        author: summary_of(repos, &record.author_id)?,
        id: record.id,
        post_id: record.post_id,
        text: record.text,
        created_at: record.created_at,
    })
}

fn expand_post(repos: &SqliteRepositories<'_>, record: PostRecord) -> anyhow::Result<PostView> {
    let images = repos.posts().images_for(&record.id)?;
    let likes = summaries_of(repos, &repos.likes().likers_of(&record.id)?)?;
    let mut comments = Vec::new();
    for comment in repos.comments().list_for_post(&record.id)? {
        comments.push(comment_view(repos, comment)?);
    }
    Ok(PostView {
        author: summary_of(repos, &record.author_id)?,
        likes_count: likes.len(),
        comments_count: comments.len(),
        likes,
        comments,
        images,
        id: record.id,
        caption: record.caption,
        music: record.music,
        location: record.location,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}

fn expand_posts(repos: &SqliteRepositories<'_>, records: Vec<PostRecord>) -> anyhow::Result<Vec<PostView>> {
    records.into_iter().map(|record| expand_post(repos, record)).collect()
}

fn require_post(repos: &SqliteRepositories<'_>, post_id: &str) -> SocialResult<PostRecord> {
    repos
        .posts()
        .get(post_id)?
        .ok_or_else(|| SocialError::not_found("Post not found"))
}

#[derive(Clone)]
pub struct ContentService {
    database: Database,
}

impl ContentService {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn create_post(&self, input: NewPost) -> SocialResult<PostView> {
        validate_post_input(&input.caption, input.images.len())?;
        let now = now_utc_iso();
        let record = PostRecord {
            id: Uuid::new_v4().to_string(),
            author_id: input.author_id,
            caption: input.caption.trim().to_string(),
            music: input.music,
            location: input.location.filter(|loc| !loc.trim().is_empty()),
            created_at: now.clone(),
            updated_at: now,
        };
        self.database.with_transaction(|repos| {
            repos.posts().create(&record, &input.images)?;
            Ok(expand_post(&repos, record)?)
        })
    }

    pub fn list_posts(&self, page: Option<usize>, limit: Option<usize>) -> SocialResult<PostPage> {
        let (page, limit, offset) = page_window(page, limit)?;
        self.database.with_repositories(|repos| {
            let records = repos.posts().list_recent(limit, offset)?;
            Ok(PostPage {
                posts: expand_posts(&repos, records)?,
                page,
                limit,
            })
        })
    }

    pub fn list_posts_by_author(
        &self,
        author_id: &str,
        page: Option<usize>,
        limit: Option<usize>,
    ) -> SocialResult<PostPage> {
        let (page, limit, offset) = page_window(page, limit)?;
        self.database.with_repositories(|repos| {
            if repos.users().get(author_id)?.is_none() {
                return Err(SocialError::not_found("User not found"));
            }
            let records = repos.posts().list_for_author(author_id, limit, offset)?;
            Ok(PostPage {
                posts: expand_posts(&repos, records)?,
                page,
                limit,
            })
        })
    }

    pub fn list_liked_posts(&self, user_id: &str) -> SocialResult<Vec<PostView>> {
        self.database.with_repositories(|repos| {
            let records = repos.posts().list_liked_by(user_id)?;
            Ok(expand_posts(&repos, records)?)
        })
    }

    pub fn toggle_like(&self, post_id: &str, user_id: &str) -> SocialResult<LikeOutcome> {
        self.database.with_transaction(|repos| {
            let post = require_post(&repos, post_id)?;
            let liked = if repos.likes().has_liked(post_id, user_id)? {
                repos.likes().remove(post_id, user_id)?;
                false
            } else {
                repos.likes().add(post_id, user_id, &now_utc_iso())?;
                true
            };

            let notification = if liked && post.author_id != user_id {
                let liker = summary_of(&repos, user_id)?;
                Some(insert_notification(
                    &repos,
                    NewNotification {
                        sender_id: user_id.to_string(),
                        receiver_id: post.author_id.clone(),
                        kind: NotificationKind::Like,
                        post_id: Some(post.id.clone()),
                        message: Some(format!("{} liked your post", liker.username)),
                    },
                )?)
            } else {
                None
            };

            Ok(LikeOutcome {
                liked,
                likes_count: repos.likes().count_for_post(post_id)?,
                notification,
            })
        })
    }

    pub fn add_comment(&self, post_id: &str, user_id: &str, text: &str) -> SocialResult<CommentOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SocialError::bad_request("Comment text is required"));
        }
        self.database.with_transaction(|repos| {
            let post = require_post(&repos, post_id)?;
            let record = CommentRecord {
                id: Uuid::new_v4().to_string(),
                post_id: post.id.clone(),
                author_id: user_id.to_string(),
                text: text.to_string(),
                created_at: now_utc_iso(),
            };
            repos.comments().create(&record)?;
            let comment = comment_view(&repos, record)?;

            let notification = if post.author_id != user_id {
                Some(insert_notification(
                    &repos,
                    NewNotification {
                        sender_id: user_id.to_string(),
                        receiver_id: post.author_id.clone(),
                        kind: NotificationKind::Comment,
                        post_id: Some(post.id.clone()),
                        message: Some(format!("{} commented on your post", comment.author.username)),
                    },
                )?)
            } else {
                None
            };
            Ok(CommentOutcome {
                comment,
                notification,
            })
        })
    }

    pub fn list_comments(&self, post_id: &str) -> SocialResult<Vec<CommentView>> {
        self.database.with_repositories(|repos| {
            require_post(&repos, post_id)?;
            let mut comments = Vec::new();
            for record in repos.comments().list_for_post(post_id)? {
                comments.push(comment_view(&repos, record)?);
            }
            Ok(comments)
        })
    }

    /// Removes the post together with its comments, notifications, likes, images and bookmarks
    /// in one transaction.
    pub fn delete_post(&self, post_id: &str, requester_id: &str) -> SocialResult<()> {
        self.database.with_transaction(|repos| {
            let post = require_post(&repos, post_id)?;
            if post.author_id != requester_id {
                return Err(SocialError::forbidden("You can only delete your own posts"));
            }
            let comments = repos.comments().delete_for_post(post_id)?;
            let notifications = repos.notifications().delete_for_post(post_id)?;
            repos.likes().delete_for_post(post_id)?;
            repos.bookmarks().delete_for_post(post_id)?;
            repos.posts().delete(post_id)?;
            tracing::info!(post_id, comments, notifications, "deleted post");
            Ok(())
        })
    }

    pub fn toggle_bookmark(&self, post_id: &str, user_id: &str) -> SocialResult<BookmarkOutcome> {
        self.database.with_transaction(|repos| {
            require_post(&repos, post_id)?;
            let bookmarked = if repos.bookmarks().is_bookmarked(user_id, post_id)? {
                repos.bookmarks().remove(user_id, post_id)?;
                false
            } else {
                repos.bookmarks().add(user_id, post_id, &now_utc_iso())?;
                true
            };
            Ok(BookmarkOutcome { bookmarked })
        })
    }

    pub fn list_bookmarks(&self, user_id: &str) -> SocialResult<Vec<PostView>> {
        self.database.with_repositories(|repos| {
            let mut posts = Vec::new();
            for post_id in repos.bookmarks().post_ids_for_user(user_id)? {
                if let Some(record) = repos.posts().get(&post_id)? {
                    posts.push(expand_post(&repos, record)?);
                }
            }
            Ok(posts)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tests::seed_user;

    fn setup() -> (Database, ContentService) {
        let db = Database::open_in_memory().unwrap();
        (db.clone(), ContentService::new(db))
    }

    fn new_post(author: &str, caption: &str) -> NewPost {
        NewPost {
            author_id: author.to_string(),
            caption: caption.to_string(),
            images: vec!["/media/a.jpg".into()],
            music: None,
            location: None,
        }
    }

    #[test]
    fn create_post_requires_caption_and_images() {
        let (db, service) = setup();
        let alice = seed_user(&db, "alice");

        let mut input = new_post(&alice, "   ");
        assert!(matches!(service.create_post(input.clone()), Err(SocialError::BadRequest(_))));
        input.caption = "hello".into();
        input.images.clear();
        assert!(matches!(service.create_post(input.clone()), Err(SocialError::BadRequest(_))));
        input.images = (0..11).map(|i| format!("/media/{i}.jpg")).collect();
        assert!(matches!(service.create_post(input), Err(SocialError::BadRequest(_))));

        let view = service.create_post(new_post(&alice, "hello")).unwrap();
        assert_eq!(view.author.username, "alice");
        assert_eq!(view.images, vec!["/media/a.jpg"]);
    }

    #[test]
    fn listing_is_newest_first_and_paged() {
        let (db, service) = setup();
        let alice = seed_user(&db, "alice");
        let first = service.create_post(new_post(&alice, "one")).unwrap();
        let second = service.create_post(new_post(&alice, "two")).unwrap();

        let page = service.list_posts(None, None).unwrap();
        assert_eq!(page.limit, DEFAULT_PAGE_SIZE);
        let ids: Vec<_> = page.posts.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

        let page = service.list_posts(Some(2), Some(1)).unwrap();
        assert_eq!(page.posts[0].id, first.id);

        assert_eq!(page_window(Some(0), Some(1000)).unwrap(), (1, MAX_PAGE_SIZE, 0));

        let by_author = service.list_posts_by_author(&alice, None, None).unwrap();
        assert_eq!(by_author.posts.len(), 2);
        assert!(matches!(
            service.list_posts_by_author("missing", None, None),
            Err(SocialError::NotFound(_))
        ));
    }

    #[test]
    fn huge_page_numbers_are_rejected_not_wrapped() {
        let (db, service) = setup();
        let alice = seed_user(&db, "alice");
        service.create_post(new_post(&alice, "one")).unwrap();

        assert!(matches!(
            service.list_posts(Some(usize::MAX), Some(2)),
            Err(SocialError::BadRequest(_))
        ));
        assert!(matches!(
            service.list_posts_by_author(&alice, Some(usize::MAX), Some(1)),
            Err(SocialError::BadRequest(_))
        ));
        assert!(page_window(Some(usize::MAX), Some(1)).is_err());

        let beyond = service.list_posts(Some(1_000), Some(MAX_PAGE_SIZE)).unwrap();
        assert!(beyond.posts.is_empty());
    }

    #[test]
    fn like_toggle_is_idempotent_set_membership() {
        let (db, service) = setup();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let post = service.create_post(new_post(&alice, "hello")).unwrap();

        let liked = service.toggle_like(&post.id, &bob).unwrap();
        assert!(liked.liked);
        assert_eq!(liked.likes_count, 1);
        assert!(liked.notification.is_some());
        assert_eq!(service.list_liked_posts(&bob).unwrap().len(), 1);

        let unliked = service.toggle_like(&post.id, &bob).unwrap();
        assert!(!unliked.liked);
        assert_eq!(unliked.likes_count, 0);

        // Liking your own post does not notify.
        let own = service.toggle_like(&post.id, &alice).unwrap();
        assert!(own.notification.is_none());

        assert!(matches!(
            service.toggle_like("missing", &bob),
            Err(SocialError::NotFound(_))
        ));
    }

    #[test]
    fn comments_validate_and_list_newest_first() {
        let (db, service) = setup();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let post = service.create_post(new_post(&alice, "hello")).unwrap();

        assert!(matches!(
            service.add_comment(&post.id, &bob, "  \n "),
            Err(SocialError::BadRequest(_))
        ));
        assert!(matches!(
            service.add_comment("missing", &bob, "hi"),
            Err(SocialError::NotFound(_))
        ));

        service.add_comment(&post.id, &bob, " first ").unwrap();
        let second = service.add_comment(&post.id, &alice, "second").unwrap();
        assert!(second.notification.is_none());

        let comments = service.list_comments(&post.id).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].text, "second");
        assert_eq!(comments[1].text, "first");
        assert_eq!(comments[1].author.username, "bob");
        assert!(matches!(service.list_comments("missing"), Err(SocialError::NotFound(_))));
    }

    #[test]
    fn delete_post_cascades_and_checks_ownership() {
        let (db, service) = setup();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let post = service.create_post(new_post(&alice, "hello")).unwrap();
        let keep = service.create_post(new_post(&alice, "keep")).unwrap();
        service.toggle_like(&post.id, &bob).unwrap();
        service.add_comment(&post.id, &bob, "nice").unwrap();
        service.toggle_bookmark(&post.id, &bob).unwrap();

        assert!(matches!(
            service.delete_post(&post.id, &bob),
            Err(SocialError::Forbidden(_))
        ));
        assert!(matches!(
            service.delete_post("missing", &alice),
            Err(SocialError::NotFound(_))
        ));

        service.delete_post(&post.id, &alice).unwrap();

        db.with_repositories(|repos| {
            assert!(repos.posts().get(&post.id)?.is_none());
            assert_eq!(repos.comments().count_for_post(&post.id)?, 0);
            assert_eq!(repos.notifications().count_for_post(&post.id)?, 0);
            assert_eq!(repos.likes().count_for_post(&post.id)?, 0);
            assert!(repos.posts().images_for(&post.id)?.is_empty());
            assert!(!repos.bookmarks().is_bookmarked(&bob, &post.id)?);
            assert_eq!(repos.posts().ids_for_author(&alice)?, vec![keep.id.clone()]);
            assert!(repos.users().get(&alice)?.is_some());
            Ok::<(), anyhow::Error>(())
        })
        .unwrap();
    }

    #[test]
    fn bookmarks_toggle() {
        let (db, service) = setup();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let post = service.create_post(new_post(&alice, "hello")).unwrap();

        assert!(service.toggle_bookmark(&post.id, &bob).unwrap().bookmarked);
        let saved = service.list_bookmarks(&bob).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].author.username, "alice");
        assert!(!service.toggle_bookmark(&post.id, &bob).unwrap().bookmarked);
        assert!(service.list_bookmarks(&bob).unwrap().is_empty());
        assert!(matches!(
            service.toggle_bookmark("missing", &bob),
            Err(SocialError::NotFound(_))
        ));
    }
}
