use crate::database::models::ConversationRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

pub(super) struct SqliteConversationRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<ConversationRecord> {
    Ok(ConversationRecord {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        last_message_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl<'conn> super::ConversationRepository for SqliteConversationRepository<'conn> {
    fn find_by_pair(&self, user_a: &str, user_b: &str) -> Result<Option<ConversationRecord>> {
        let (low, high) = if user_a <= user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, participant_a, participant_b, last_message_id, created_at, updated_at
                FROM conversations
                WHERE participant_a = ?1 AND participant_b = ?2
                "#,
                params![low, high],
                map_conversation,
            )
            .optional()?)
    }

    fn insert_if_absent(&self, record: &ConversationRecord) -> Result<bool> {
        let inserted = self.conn.execute(
            r#"
            INSERT INTO conversations (id, participant_a, participant_b, last_message_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT DO NOTHING
            "#,
            params![
                record.id,
                record.participant_a,
                record.participant_b,
                record.last_message_id,
                record.created_at,
                record.updated_at
            ],
        )?;
        Ok(inserted > 0)
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<ConversationRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, participant_a, participant_b, last_message_id, created_at, updated_at
            FROM conversations
            WHERE participant_a = ?1 OR participant_b = ?1
            ORDER BY updated_at DESC, rowid DESC
            "#,
        )?;
        let rows = stmt.query_map(params![user_id], map_conversation)?;
        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }

    fn set_last_message(&self, conversation_id: &str, message_id: &str, at: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE conversations SET last_message_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![conversation_id, message_id, at],
        )?;
        Ok(())
    }

    fn ensure_unread_counter(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO conversation_unread (conversation_id, user_id, count)
            VALUES (?1, ?2, 0)
            ON CONFLICT(conversation_id, user_id) DO NOTHING
            "#,
            params![conversation_id, user_id],
        )?;
        Ok(())
    }

    fn increment_unread(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO conversation_unread (conversation_id, user_id, count)
            VALUES (?1, ?2, 1)
            ON CONFLICT(conversation_id, user_id) DO UPDATE SET count = count + 1
            "#,
            params![conversation_id, user_id],
        )?;
        Ok(())
    }

    fn reset_unread(&self, conversation_id: &str, user_id: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO conversation_unread (conversation_id, user_id, count)
            VALUES (?1, ?2, 0)
            ON CONFLICT(conversation_id, user_id) DO UPDATE SET count = 0
            "#,
            params![conversation_id, user_id],
        )?;
        Ok(())
    }

    fn unread_counts(&self, conversation_id: &str) -> Result<HashMap<String, i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, count FROM conversation_unread WHERE conversation_id = ?1",
        )?;
        let rows = stmt.query_map(params![conversation_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = HashMap::new();
        for row in rows {
            let (user_id, count) = row?;
            counts.insert(user_id, count);
        }
        Ok(counts)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
