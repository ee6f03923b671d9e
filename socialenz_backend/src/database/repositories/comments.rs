use crate::database::models::CommentRecord;
use anyhow::Result;
use rusqlite::{params, Connection};

pub(super) struct SqliteCommentRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::CommentRepository for SqliteCommentRepository<'conn> {
    fn create(&self, record: &CommentRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO comments (id, post_id, author_id, text, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.id,
                record.post_id,
                record.author_id,
                record.text,
                record.created_at
            ],
        )?;
        Ok(())
    }

    fn list_for_post(&self, post_id: &str) -> Result<Vec<CommentRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, post_id, author_id, text, created_at
            FROM comments
            WHERE post_id = ?1
            ORDER BY created_at DESC, rowid DESC
            "#,
        )?;
        let rows = stmt.query_map(params![post_id], |row| {
            Ok(CommentRecord {
                id: row.get(0)?,
                post_id: row.get(1)?,
                author_id: row.get(2)?,
                text: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    fn count_for_post(&self, post_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn delete_for_post(&self, post_id: &str) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM comments WHERE post_id = ?1", params![post_id])?;
        Ok(removed)
    }
}
