use crate::db::new_id;
use crate::errors::{AppError, AppResult};
use crate::models::{
    ContactMessage, ContactRequest, MessageStatus, Notification, NotificationKind, Platform,
};
use crate::store::users::{validate_email, validate_name};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

const MAX_BODY_CHARS: usize = 5000;

const CONTACT_COLUMNS: &str =
    "id, name, email, phone, subject, body, status, created_at, handled_at";

fn contact_from_row(row: &Row) -> rusqlite::Result<ContactMessage> {
    Ok(ContactMessage {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
        handled_at: row.get(8)?,
    })
}

pub fn submit_contact(conn: &Connection, req: &ContactRequest, now: i64) -> AppResult<ContactMessage> {
    validate_name(&req.name)?;
    validate_email(&req.email)?;
    if req.subject.trim().is_empty() {
        return Err(AppError::bad_request("subject must not be empty"));
    }
    let body_len = req.body.trim().chars().count();
    if body_len == 0 || body_len > MAX_BODY_CHARS {
        return Err(AppError::bad_request(format!(
            "message must be between 1 and {MAX_BODY_CHARS} characters"
        )));
    }

    let message = ContactMessage {
        id: new_id(),
        name: req.name.trim().to_string(),
        email: req.email.trim().to_string(),
        phone: req.phone.clone().filter(|p| !p.trim().is_empty()),
        subject: req.subject.trim().to_string(),
        body: req.body.trim().to_string(),
        status: MessageStatus::New,
        created_at: now,
        handled_at: None,
    };
    conn.execute(
        &format!("INSERT INTO contact_messages({CONTACT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)"),
        params![
            message.id,
            message.name,
            message.email,
            message.phone,
            message.subject,
            message.body,
            message.status,
            message.created_at
        ],
    )?;
    info!(message_id = %message.id, "contact message received");
    Ok(message)
}

pub fn list_contact(conn: &Connection, status: Option<MessageStatus>) -> AppResult<Vec<ContactMessage>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CONTACT_COLUMNS} FROM contact_messages
         WHERE ?1 IS NULL OR status = ?1
         ORDER BY created_at DESC, id"
    ))?;
    let rows = stmt.query_map([status], contact_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Marks a message handled; the first handled_at wins.
pub fn handle_contact(conn: &Connection, message_id: &str, now: i64) -> AppResult<ContactMessage> {
    conn.execute(
        "UPDATE contact_messages
         SET status = 'handled', handled_at = COALESCE(handled_at, ?)
         WHERE id = ?",
        params![now, message_id],
    )?;
    conn.query_row(
        &format!("SELECT {CONTACT_COLUMNS} FROM contact_messages WHERE id = ?"),
        [message_id],
        contact_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("message not found"))
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, title, body, kind, read, created_at";

fn notification_from_row(row: &Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        kind: row.get(4)?,
        read: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn create_notification(
    conn: &Connection,
    user_id: &str,
    title: &str,
    body: &str,
    kind: NotificationKind,
    now: i64,
) -> AppResult<Notification> {
    if title.trim().is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }
    let notification = Notification {
        id: new_id(),
        user_id: user_id.to_string(),
        title: title.trim().to_string(),
        body: body.trim().to_string(),
        kind,
        read: false,
        created_at: now,
    };
    conn.execute(
        &format!("INSERT INTO notifications({NOTIFICATION_COLUMNS}) VALUES (?, ?, ?, ?, ?, 0, ?)"),
        params![
            notification.id,
            notification.user_id,
            notification.title,
            notification.body,
            notification.kind,
            notification.created_at
        ],
    )?;
    Ok(notification)
}

pub fn list_notifications(
    conn: &Connection,
    user_id: &str,
    unread_only: bool,
) -> AppResult<Vec<Notification>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications
         WHERE user_id = ? AND (? = 0 OR read = 0)
         ORDER BY created_at DESC, id"
    ))?;
    let rows = stmt.query_map(params![user_id, unread_only], notification_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn unread_count(conn: &Connection, user_id: &str) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read = 0",
        [user_id],
        |r| r.get(0),
    )?)
}

/// Only the owner can mark a notification; anyone else sees 404.
pub fn mark_read(conn: &Connection, user_id: &str, notification_id: &str) -> AppResult<Notification> {
    let changed = conn.execute(
        "UPDATE notifications SET read = 1 WHERE id = ? AND user_id = ?",
        params![notification_id, user_id],
    )?;
    if changed == 0 {
        return Err(AppError::not_found("notification not found"));
    }
    Ok(conn.query_row(
        &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?"),
        [notification_id],
        notification_from_row,
    )?)
}

pub fn register_device(
    conn: &Connection,
    user_id: &str,
    token: &str,
    platform: Platform,
    now: i64,
) -> AppResult<()> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::bad_request("device token must not be empty"));
    }
    conn.execute(
        "INSERT INTO device_tokens(token, user_id, platform, registered_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(token) DO UPDATE SET
             user_id = excluded.user_id,
             platform = excluded.platform,
             registered_at = excluded.registered_at",
        params![token, user_id, platform, now],
    )?;
    Ok(())
}

pub fn device_tokens(conn: &Connection, user_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT token FROM device_tokens WHERE user_id = ? ORDER BY token")?;
    let rows = stmt.query_map([user_id], |r| r.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::Academy;

    fn contact(body: &str) -> ContactRequest {
        ContactRequest {
            name: "Visitor".to_string(),
            email: "visitor@example.test".to_string(),
            phone: None,
            subject: "Trial lesson".to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn contact_message_lifecycle() {
        let academy = Academy::new();
        let message = submit_contact(&academy.conn, &contact("Do you teach chemistry?"), 5).unwrap();
        assert_eq!(message.status, MessageStatus::New);
        assert_eq!(list_contact(&academy.conn, Some(MessageStatus::New)).unwrap().len(), 1);

        let handled = handle_contact(&academy.conn, &message.id, 9).unwrap();
        assert_eq!(handled.handled_at, Some(9));
        let again = handle_contact(&academy.conn, &message.id, 12).unwrap();
        assert_eq!(again.handled_at, Some(9));

        assert!(list_contact(&academy.conn, Some(MessageStatus::New)).unwrap().is_empty());
        assert_eq!(list_contact(&academy.conn, None).unwrap().len(), 1);
        assert!(handle_contact(&academy.conn, "missing", 1).is_err());
    }

    #[test]
    fn contact_body_limits() {
        let academy = Academy::new();
        assert!(submit_contact(&academy.conn, &contact("   "), 1).is_err());
        assert!(submit_contact(&academy.conn, &contact(&"x".repeat(5001)), 1).is_err());
        assert!(submit_contact(&academy.conn, &contact(&"x".repeat(5000)), 1).is_ok());
    }

    #[test]
    fn notifications_are_private_to_owner() {
        let academy = Academy::new();
        let note = create_notification(
            &academy.conn,
            &academy.parent_user_id,
            "Holiday",
            "No classes Monday",
            NotificationKind::General,
            3,
        )
        .unwrap();
        assert_eq!(unread_count(&academy.conn, &academy.parent_user_id).unwrap(), 1);

        assert!(mark_read(&academy.conn, &academy.teacher_id, &note.id).is_err());
        let read = mark_read(&academy.conn, &academy.parent_user_id, &note.id).unwrap();
        assert!(read.read);
        assert!(list_notifications(&academy.conn, &academy.parent_user_id, true)
            .unwrap()
            .is_empty());
        assert_eq!(
            list_notifications(&academy.conn, &academy.parent_user_id, false).unwrap().len(),
            1
        );
    }

    #[test]
    fn device_registration_moves_token_between_users() {
        let academy = Academy::new();
        register_device(&academy.conn, &academy.parent_user_id, "tok-1", Platform::Android, 1).unwrap();
        register_device(&academy.conn, &academy.teacher_id, "tok-1", Platform::Ios, 2).unwrap();
        assert!(device_tokens(&academy.conn, &academy.parent_user_id).unwrap().is_empty());
        assert_eq!(device_tokens(&academy.conn, &academy.teacher_id).unwrap(), vec!["tok-1"]);
    }
}
