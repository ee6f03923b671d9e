use crate::auth::{hash_password, issue_token, verify_password};
use crate::config::AuthConfig;
use crate::content::{post_summaries_for_author, PostSummary};
use crate::database::models::UserRecord;
use crate::database::repositories::{FollowRepository, SqliteRepositories, UserRepository};
use crate::database::Database;
use crate::error::{SocialError, SocialResult};
use crate::notifications::{insert_notification, NewNotification, NotificationKind, NotificationView};
use crate::utils::now_utc_iso;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

const SUGGESTION_LIMIT: usize = 10;
const SEARCH_LIMIT: usize = 50;
const DATE_FORMAT: &str = "%Y-%m-%d";
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub profile_picture: String,
}

impl UserSummary {
    fn from_record(record: &UserRecord) -> Self {
        Self {
            id: record.id.clone(),
            username: record.username.clone(),
            profile_picture: record.profile_picture.clone(),
        }
    }
}

pub(crate) fn summary_of(repos: &SqliteRepositories<'_>, user_id: &str) -> anyhow::Result<UserSummary> {
    let record = repos
        .users()
        .get(user_id)?
        .ok_or_else(|| anyhow::anyhow!("user {user_id} referenced but missing"))?;
    Ok(UserSummary::from_record(&record))
}

pub(crate) fn summaries_of(
    repos: &SqliteRepositories<'_>,
    user_ids: &[String],
) -> anyhow::Result<Vec<UserSummary>> {
    user_ids.iter().map(|id| summary_of(repos, id)).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// Sparse update of one field. `Keep` is the default for absent fields, an explicit JSON
/// `null` deserializes to `Clear`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Patch::Set(value),
            None => Patch::Clear,
        })
    }
}

impl Patch<String> {
    /// Blank values leave the field untouched, matching form submissions that send every
    /// input whether or not it was filled in.
    pub fn non_blank(self) -> Self {
        match self {
            Patch::Set(value) if value.trim().is_empty() => Patch::Keep,
            Patch::Set(value) => Patch::Set(value.trim().to_string()),
            other => other,
        }
    }

    fn apply_to(self, target: &mut String) {
        match self.non_blank() {
            Patch::Keep => {}
            Patch::Clear => target.clear(),
            Patch::Set(value) => *target = value,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfilePatch {
    pub full_name: Patch<String>,
    pub bio: Patch<String>,
    pub website: Patch<String>,
    pub location: Patch<String>,
    pub gender: Patch<String>,
    pub phone_number: Patch<String>,
    pub date_of_birth: Patch<String>,
    pub profile_picture: Patch<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub profile_picture: String,
    pub bio: String,
    pub website: String,
    pub location: String,
    pub gender: Gender,
    pub phone_number: String,
    pub date_of_birth: Option<String>,
    pub followers: Vec<UserSummary>,
    pub following: Vec<UserSummary>,
    pub posts: Vec<PostSummary>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowOutcome {
    pub following: bool,
    pub target: UserSummary,
    #[serde(skip)]
    pub notification: Option<NotificationView>,
}

fn is_email_shaped(email: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(EMAIL_PATTERN).ok())
        .as_ref()
        .map(|re| re.is_match(email))
        .unwrap_or(false)
}

impl RegisterInput {
    fn validated(self) -> SocialResult<Self> {
        let username = self.username.trim().to_string();
        let email = self.email.trim().to_lowercase();
        let phone_number = self.phone_number.trim().to_string();
        if username.is_empty() || email.is_empty() || self.password.is_empty() || phone_number.is_empty() {
            return Err(SocialError::bad_request("All fields are required"));
        }
        if username.chars().count() < 3 {
            return Err(SocialError::bad_request(
                "Username must be at least 3 characters long",
            ));
        }
        if !is_email_shaped(&email) {
            return Err(SocialError::bad_request("Invalid email address"));
        }
        if self.password.chars().count() < 6 {
            return Err(SocialError::bad_request(
                "Password must be at least 6 characters long",
            ));
        }
        Ok(Self {
            username,
            email,
            password: self.password,
            phone_number,
        })
    }
}

/// Outcome of a profile edit. `replaced_picture` is the picture URL the edit
/// swapped out or cleared, if any.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub profile: ProfileView,
    pub replaced_picture: Option<String>,
}

#[derive(Clone)]
pub struct IdentityService {
    database: Database,
    auth: AuthConfig,
}

impl IdentityService {
    pub fn new(database: Database, auth: AuthConfig) -> Self {
        Self { database, auth }
    }

    pub fn register(&self, input: RegisterInput) -> SocialResult<UserSummary> {
        let input = input.validated()?;
        let taken = self
            .database
            .with_repositories(|repos| Ok::<_, SocialError>(repos.users().get_by_username(&input.username)?.is_some()))?;
        if taken {
            return Err(SocialError::Conflict("Username already exists".into()));
        }

        let password_hash = hash_password(&input.password, self.auth.bcrypt_cost)?;
        let now = now_utc_iso();
        let record = UserRecord {
            id: Uuid::new_v4().to_string(),
            username: input.username,
            email: input.email,
            password_hash,
            full_name: String::new(),
            profile_picture: String::new(),
            bio: String::new(),
            website: String::new(),
            location: String::new(),
            gender: Gender::default().as_str().to_string(),
            phone_number: input.phone_number,
            date_of_birth: None,
            created_at: now.clone(),
            updated_at: now,
        };

        // Re-checked under the transaction: hashing above runs without the store lock.
        self.database.with_transaction(|repos| {
            if repos.users().get_by_username(&record.username)?.is_some() {
                return Err(SocialError::Conflict("Username already exists".into()));
            }
            repos.users().create(&record)?;
            Ok(())
        })?;
        tracing::info!(user_id = %record.id, username = %record.username, "registered user");
        Ok(UserSummary::from_record(&record))
    }

    pub fn authenticate(&self, input: LoginInput) -> SocialResult<LoginOutcome> {
        let username = input.username.trim();
        if username.is_empty() || input.password.is_empty() {
            return Err(SocialError::bad_request("Username and password are required"));
        }
        let record = self
            .database
            .with_repositories(|repos| Ok::<_, SocialError>(repos.users().get_by_username(username)?))?
            .ok_or_else(|| SocialError::not_found("User not found"))?;
        if !verify_password(&input.password, &record.password_hash)? {
            return Err(SocialError::Unauthorized("Invalid credentials".into()));
        }
        let token = issue_token(&self.auth, &record.id, &record.username)?;
        Ok(LoginOutcome {
            token,
            user: UserSummary::from_record(&record),
        })
    }

    pub fn find_user(&self, user_id: &str) -> SocialResult<Option<UserSummary>> {
        self.database.with_repositories(|repos| {
            Ok(repos.users().get(user_id)?.as_ref().map(UserSummary::from_record))
        })
    }

    pub fn get_profile(&self, user_id: &str) -> SocialResult<ProfileView> {
        self.database.with_repositories(|repos| {
            let record = repos
                .users()
                .get(user_id)?
                .ok_or_else(|| SocialError::not_found("User not found"))?;
            Ok(profile_view(&repos, record)?)
        })
    }

    pub fn edit_profile(
        &self,
        requester_id: &str,
        user_id: &str,
        patch: ProfilePatch,
    ) -> SocialResult<ProfileUpdate> {
        self.database.with_transaction(|repos| {
            let mut record = repos
                .users()
                .get(user_id)?
                .ok_or_else(|| SocialError::not_found("User not found"))?;
            if record.id != requester_id {
                return Err(SocialError::forbidden("You can only edit your own profile"));
            }

            let gender = match patch.gender.non_blank() {
                Patch::Keep => None,
                Patch::Clear => Some(Gender::default()),
                Patch::Set(raw) => Some(
                    Gender::parse(&raw)
                        .ok_or_else(|| SocialError::bad_request("Gender must be male or female"))?,
                ),
            };
            let date_of_birth = match patch.date_of_birth.non_blank() {
                Patch::Keep => record.date_of_birth.clone(),
                Patch::Clear => None,
                Patch::Set(raw) => {
                    let date = NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|_| {
                        SocialError::bad_request("Date of birth must be formatted as YYYY-MM-DD")
                    })?;
                    Some(date.format(DATE_FORMAT).to_string())
                }
            };

            patch.full_name.apply_to(&mut record.full_name);
            patch.bio.apply_to(&mut record.bio);
            patch.website.apply_to(&mut record.website);
            patch.location.apply_to(&mut record.location);
            patch.phone_number.apply_to(&mut record.phone_number);
            let previous_picture = record.profile_picture.clone();
            patch.profile_picture.apply_to(&mut record.profile_picture);
            let replaced_picture = Some(previous_picture)
                .filter(|old| !old.is_empty() && *old != record.profile_picture);
            if let Some(gender) = gender {
                record.gender = gender.as_str().to_string();
            }
            record.date_of_birth = date_of_birth;
            record.updated_at = now_utc_iso();

            repos.users().update_profile(&record)?;
            Ok(ProfileUpdate {
                profile: profile_view(&repos, record)?,
                replaced_picture,
            })
        })
    }

    /// Toggles the follow edge from `current_user_id` to `target_user_id`.
    pub fn follow_or_unfollow(
        &self,
        current_user_id: &str,
        target_user_id: &str,
    ) -> SocialResult<FollowOutcome> {
        if current_user_id == target_user_id {
            return Err(SocialError::bad_request("You cannot follow/unfollow yourself"));
        }
        self.database.with_transaction(|repos| {
            let target = repos
                .users()
                .get(target_user_id)?
                .ok_or_else(|| SocialError::not_found("User not found"))?;
            let current = repos
                .users()
                .get(current_user_id)?
                .ok_or_else(|| SocialError::not_found("User not found"))?;

            if repos.follows().is_following(current_user_id, target_user_id)? {
                repos.follows().unfollow(current_user_id, target_user_id)?;
                return Ok(FollowOutcome {
                    following: false,
                    target: UserSummary::from_record(&target),
                    notification: None,
                });
            }

            repos
                .follows()
                .follow(current_user_id, target_user_id, &now_utc_iso())?;
            let notification = insert_notification(
                &repos,
                NewNotification {
                    sender_id: current.id.clone(),
                    receiver_id: target.id.clone(),
                    kind: NotificationKind::Follow,
                    post_id: None,
                    message: Some(format!("{} started following you", current.username)),
                },
            )?;
            Ok(FollowOutcome {
                following: true,
                target: UserSummary::from_record(&target),
                notification: Some(notification),
            })
        })
    }

    pub fn suggested_users(&self, user_id: &str) -> SocialResult<Vec<UserSummary>> {
        self.database.with_repositories(|repos| {
            let users = repos.users().list_not_followed_by(user_id, SUGGESTION_LIMIT)?;
            Ok(users.iter().map(UserSummary::from_record).collect())
        })
    }

    pub fn search_users(&self, keyword: &str) -> SocialResult<Vec<UserSummary>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(SocialError::bad_request("Keyword is required"));
        }
        self.database.with_repositories(|repos| {
            let users = repos.users().search_username(keyword, SEARCH_LIMIT)?;
            Ok(users.iter().map(UserSummary::from_record).collect())
        })
    }
}

fn profile_view(repos: &SqliteRepositories<'_>, record: UserRecord) -> anyhow::Result<ProfileView> {
    let followers = summaries_of(repos, &repos.follows().followers_of(&record.id)?)?;
    let following = summaries_of(repos, &repos.follows().following_of(&record.id)?)?;
    let posts = post_summaries_for_author(repos, &record.id)?;
    Ok(ProfileView {
        gender: Gender::parse(&record.gender).unwrap_or_default(),
        id: record.id,
        username: record.username,
        email: record.email,
        full_name: record.full_name,
        profile_picture: record.profile_picture,
        bio: record.bio,
        website: record.website,
        location: record.location,
        phone_number: record.phone_number,
        date_of_birth: record.date_of_birth,
        followers,
        following,
        posts,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}
