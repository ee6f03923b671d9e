use crate::database::models::NotificationRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(super) struct SqliteNotificationRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

fn map_notification(row: &Row<'_>) -> rusqlite::Result<NotificationRecord> {
    Ok(NotificationRecord {
        id: row.get(0)?,
        receiver_id: row.get(1)?,
        sender_id: row.get(2)?,
        kind: row.get(3)?,
        post_id: row.get(4)?,
        message: row.get(5)?,
        read: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
    })
}

impl<'conn> super::NotificationRepository for SqliteNotificationRepository<'conn> {
    fn create(&self, record: &NotificationRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO notifications (id, receiver_id, sender_id, kind, post_id, message, read, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.id,
                record.receiver_id,
                record.sender_id,
                record.kind,
                record.post_id,
                record.message,
                record.read as i64,
                record.created_at
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<NotificationRecord>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, receiver_id, sender_id, kind, post_id, message, read, created_at
                FROM notifications
                WHERE id = ?1
                "#,
                params![id],
                map_notification,
            )
            .optional()?)
    }

    fn list_for_receiver(&self, receiver_id: &str, limit: usize) -> Result<Vec<NotificationRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, receiver_id, sender_id, kind, post_id, message, read, created_at
            FROM notifications
            WHERE receiver_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![receiver_id, limit as i64], map_notification)?;
        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    fn count_unread(&self, receiver_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE receiver_id = ?1 AND read = 0",
            params![receiver_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn mark_read(&self, id: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    fn count_for_post(&self, post_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn delete_for_post(&self, post_id: &str) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM notifications WHERE post_id = ?1",
            params![post_id],
        )?;
        Ok(removed)
    }
}
