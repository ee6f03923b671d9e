use anyhow::Result;
use rusqlite::{params, Connection};

pub(super) struct SqliteBookmarkRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::BookmarkRepository for SqliteBookmarkRepository<'conn> {
    fn is_bookmarked(&self, user_id: &str, post_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM bookmarks WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn add(&self, user_id: &str, post_id: &str, created_at: &str) -> Result<usize> {
        let inserted = self.conn.execute(
            r#"
            INSERT INTO bookmarks (user_id, post_id, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id, post_id) DO NOTHING
            "#,
            params![user_id, post_id, created_at],
        )?;
        Ok(inserted)
    }

    fn remove(&self, user_id: &str, post_id: &str) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM bookmarks WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
        )?;
        Ok(removed)
    }

    fn post_ids_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT post_id FROM bookmarks WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn delete_for_post(&self, post_id: &str) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM bookmarks WHERE post_id = ?1", params![post_id])?;
        Ok(removed)
    }
}
