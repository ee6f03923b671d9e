use crate::database::models::PostRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqlitePostRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<PostRecord> {
    Ok(PostRecord {
        id: row.get(0)?,
        author_id: row.get(1)?,
        caption: row.get(2)?,
        music: row.get(3)?,
        location: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl<'conn> SqlitePostRepository<'conn> {
    fn query_posts(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<PostRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, map_post)?;
        let mut posts = Vec::new();
        for row in rows {
            posts.push(row?);
        }
        Ok(posts)
    }
}

impl<'conn> super::PostRepository for SqlitePostRepository<'conn> {
    fn create(&self, record: &PostRecord, images: &[String]) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO posts (id, author_id, caption, music, location, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.id,
                record.author_id,
                record.caption,
                record.music,
                record.location,
                record.created_at,
                record.updated_at
            ],
        )?;
        let mut stmt = self
            .conn
            .prepare("INSERT INTO post_images (post_id, position, url) VALUES (?1, ?2, ?3)")?;
        for (position, url) in images.iter().enumerate() {
            stmt.execute(params![record.id, position as i64, url])?;
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<PostRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, author_id, caption, music, location, created_at, updated_at
                FROM posts
                WHERE id = ?1
                "#,
                params![id],
                map_post,
            )
            .optional()?)
    }

    fn images_for(&self, post_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url FROM post_images WHERE post_id = ?1 ORDER BY position ASC")?;
        let rows = stmt.query_map(params![post_id], |row| row.get::<_, String>(0))?;
        let mut urls = Vec::new();
        for row in rows {
            urls.push(row?);
        }
        Ok(urls)
    }

    fn list_recent(&self, limit: usize, offset: usize) -> Result<Vec<PostRecord>> {
        self.query_posts(
            r#"
            SELECT id, author_id, caption, music, location, created_at, updated_at
            FROM posts
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1 OFFSET ?2
            "#,
            params![limit as i64, offset as i64],
        )
    }

    fn list_for_author(&self, author_id: &str, limit: usize, offset: usize) -> Result<Vec<PostRecord>> {
        self.query_posts(
            r#"
            SELECT id, author_id, caption, music, location, created_at, updated_at
            FROM posts
            WHERE author_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2 OFFSET ?3
            "#,
            params![author_id, limit as i64, offset as i64],
        )
    }

    fn ids_for_author(&self, author_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM posts WHERE author_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![author_id], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn list_liked_by(&self, user_id: &str) -> Result<Vec<PostRecord>> {
        self.query_posts(
            r#"
            SELECT p.id, p.author_id, p.caption, p.music, p.location, p.created_at, p.updated_at
            FROM posts p
            INNER JOIN post_likes l ON l.post_id = p.id
            WHERE l.user_id = ?1
            ORDER BY p.created_at DESC, p.rowid DESC
            "#,
            params![user_id],
        )
    }

    fn delete(&self, id: &str) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        Ok(removed)
    }
}
