use crate::database::models::UserRecord;
use crate::utils::escape_like;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqliteUserRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, profile_picture, bio, \
     website, location, gender, phone_number, date_of_birth, created_at, updated_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        full_name: row.get(4)?,
        profile_picture: row.get(5)?,
        bio: row.get(6)?,
        website: row.get(7)?,
        location: row.get(8)?,
        gender: row.get(9)?,
        phone_number: row.get(10)?,
        date_of_birth: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl<'conn> super::UserRepository for SqliteUserRepository<'conn> {
    fn create(&self, record: &UserRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO users (id, username, username_lower, email, password_hash, full_name,
                               profile_picture, bio, website, location, gender, phone_number,
                               date_of_birth, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                record.id,
                record.username,
                record.username.to_lowercase(),
                record.email,
                record.password_hash,
                record.full_name,
                record.profile_picture,
                record.bio,
                record.website,
                record.location,
                record.gender,
                record.phone_number,
                record.date_of_birth,
                record.created_at,
                record.updated_at
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], map_user)
            .optional()?)
    }

    fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![username], map_user)
            .optional()?)
    }

    fn update_profile(&self, record: &UserRecord) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE users
            SET full_name = ?2,
                profile_picture = ?3,
                bio = ?4,
                website = ?5,
                location = ?6,
                gender = ?7,
                phone_number = ?8,
                date_of_birth = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
            params![
                record.id,
                record.full_name,
                record.profile_picture,
                record.bio,
                record.website,
                record.location,
                record.gender,
                record.phone_number,
                record.date_of_birth,
                record.updated_at
            ],
        )?;
        Ok(())
    }

    fn list_not_followed_by(&self, user_id: &str, limit: usize) -> Result<Vec<UserRecord>> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE id <> ?1
              AND id NOT IN (SELECT following_id FROM follows WHERE follower_id = ?1)
            ORDER BY rowid ASC
            LIMIT ?2
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, limit as i64], map_user)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// SQLite's `lower()` only folds ASCII, so matching runs against the
    /// Unicode-lowercased copy written at insert.
    fn search_username(&self, keyword: &str, limit: usize) -> Result<Vec<UserRecord>> {
        let pattern = format!("%{}%", escape_like(&keyword.to_lowercase()));
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE username_lower LIKE ?1 ESCAPE '\'
            ORDER BY rowid ASC
            LIMIT ?2
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pattern, limit as i64], map_user)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}
