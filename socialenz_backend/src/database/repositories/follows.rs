use anyhow::Result;
use rusqlite::{params, Connection};

/// One row per directed edge. A user's followers and following lists are two
/// projections of the same table, so they can never disagree.
pub(super) struct SqliteFollowRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> SqliteFollowRepository<'conn> {
    fn collect_ids(&self, sql: &str, user_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}

impl<'conn> super::FollowRepository for SqliteFollowRepository<'conn> {
    fn is_following(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1 AND following_id = ?2",
            params![follower_id, following_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn follow(&self, follower_id: &str, following_id: &str, created_at: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO follows (follower_id, following_id, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(follower_id, following_id) DO NOTHING
            "#,
            params![follower_id, following_id, created_at],
        )?;
        Ok(())
    }

    fn unfollow(&self, follower_id: &str, following_id: &str) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
            params![follower_id, following_id],
        )?;
        Ok(removed)
    }

    fn followers_of(&self, user_id: &str) -> Result<Vec<String>> {
        self.collect_ids(
            "SELECT follower_id FROM follows WHERE following_id = ?1 ORDER BY created_at ASC, rowid ASC",
            user_id,
        )
    }

    fn following_of(&self, user_id: &str) -> Result<Vec<String>> {
        self.collect_ids(
            "SELECT following_id FROM follows WHERE follower_id = ?1 ORDER BY created_at ASC, rowid ASC",
            user_id,
        )
    }
}
