use crate::errors::AppResult;
use crate::models::{Notification, NotificationKind, Student};
use crate::store::messages;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, warn};

/// Hands persisted notifications to a delivery channel.
pub trait Notifier: Send + Sync {
    fn deliver(&self, notification: &Notification, device_tokens: &[String]);
}

/// Push delivery is not configured; notifications stay in the inbox only.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, notification: &Notification, device_tokens: &[String]) {
        debug!(
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            devices = device_tokens.len(),
            "push delivery not configured, notification stored only"
        );
    }
}

/// Persists a notification for `user_id` and hands it to the notifier.
pub fn notify_user(
    conn: &Connection,
    notifier: &dyn Notifier,
    user_id: &str,
    title: &str,
    body: &str,
    kind: NotificationKind,
    now: i64,
) -> AppResult<Notification> {
    let notification = messages::create_notification(conn, user_id, title, body, kind, now)?;
    let devices = messages::device_tokens(conn, user_id)?;
    notifier.deliver(&notification, &devices);
    Ok(notification)
}

/// Notifies the parent of a student, and the student when they have a login.
pub fn notify_family(
    conn: &Connection,
    notifier: &dyn Notifier,
    student: &Student,
    title: &str,
    body: &str,
    kind: NotificationKind,
    now: i64,
) -> AppResult<()> {
    let parent_user: Option<String> = conn
        .query_row(
            "SELECT user_id FROM parents WHERE id = ?",
            [&student.parent_id],
            |r| r.get(0),
        )
        .optional()?;
    for user_id in parent_user.iter().chain(student.user_id.iter()) {
        notify_user(conn, notifier, user_id, title, body, kind, now)?;
    }
    Ok(())
}

/// [`notify_family`] for callers whose own write is already committed:
/// a failure is logged and reported as `false`.
pub fn notify_family_or_log(
    conn: &Connection,
    notifier: &dyn Notifier,
    student: &Student,
    title: &str,
    body: &str,
    kind: NotificationKind,
    now: i64,
) -> bool {
    match notify_family(conn, notifier, student, title, body, kind, now) {
        Ok(()) => true,
        Err(err) => {
            warn!(student_id = %student.id, kind = kind.as_str(), "family notification failed: {}", err.message);
            false
        }
    }
}
