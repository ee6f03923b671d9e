use crate::database::models::MessageRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqliteMessageRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        receiver_id: row.get(3)?,
        content: row.get(4)?,
        message_type: row.get(5)?,
        media_url: row.get(6)?,
        is_seen: row.get::<_, i64>(7)? != 0,
        delivered_at: row.get(8)?,
        seen_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

impl<'conn> super::MessageRepository for SqliteMessageRepository<'conn> {
    fn create(&self, record: &MessageRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, receiver_id, content, message_type,
                                  media_url, is_seen, delivered_at, seen_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                record.id,
                record.conversation_id,
                record.sender_id,
                record.receiver_id,
                record.content,
                record.message_type,
                record.media_url,
                record.is_seen as i64,
                record.delivered_at,
                record.seen_at,
                record.created_at
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<MessageRecord>> {
        let result = self
            .conn
            .query_row(
                r#"
                SELECT id, conversation_id, sender_id, receiver_id, content, message_type,
                       media_url, is_seen, delivered_at, seen_at, created_at
                FROM messages
                WHERE id = ?1
                "#,
                params![id],
                map_message,
            )
            .optional()?;
        Ok(result)
    }

    fn list_for_conversation(&self, conversation_id: &str, limit: usize) -> Result<Vec<MessageRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, conversation_id, sender_id, receiver_id, content, message_type,
                   media_url, is_seen, delivered_at, seen_at, created_at
            FROM messages
            WHERE conversation_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![conversation_id, limit as i64], map_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    fn mark_seen_by(&self, conversation_id: &str, receiver_id: &str, seen_at: &str) -> Result<usize> {
        let updated = self.conn.execute(
            r#"
            UPDATE messages
            SET is_seen = 1, seen_at = ?3
            WHERE conversation_id = ?1 AND receiver_id = ?2 AND is_seen = 0
            "#,
            params![conversation_id, receiver_id, seen_at],
        )?;
        Ok(updated)
    }

    fn count_for_conversation(&self, conversation_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
