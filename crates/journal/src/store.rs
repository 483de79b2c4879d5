//! SQLite event store implementation.

use crate::{Error, Event, Result, SessionId};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// SQLite-backed event store.
///
/// The connection sits behind a mutex so one store can be shared by a chat
/// session and a run driver through an `Arc`.
pub struct EventStore {
    conn: Mutex<Connection>,
}

/// Aggregate view of one session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub message_count: usize,
}

impl EventStore {
    /// Open or create an event store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Create an in-memory event store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_session
                ON events(session_id, seq);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::Lock)
    }

    /// Append an event to the store.
    pub fn append(&self, event: &Event) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO events (id, session_id, timestamp, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id.to_string(),
                event.session_id.to_string(),
                event.timestamp.to_rfc3339(),
                event.kind.name(),
                serde_json::to_string(&event.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Load all events for a session in insertion order.
    pub fn load_session(&self, session_id: SessionId) -> Result<Vec<Event>> {
        self.load_events(session_id, None)
    }

    /// Load a session's events, optionally keeping only one kind
    /// (`"message"`, `"function_call"`, `"run_status"`, ...).
    pub fn load_events(&self, session_id: SessionId, kind: Option<&str>) -> Result<Vec<Event>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, data FROM events
             WHERE session_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY seq",
        )?;

        let rows = stmt.query_map(params![session_id.to_string(), kind], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp, data) = row?;
            let Ok(id) = id.parse::<Uuid>() else {
                continue;
            };
            let Some(timestamp) = DateTime::parse_from_rfc3339(&timestamp).ok() else {
                continue;
            };
            events.push(Event {
                id,
                session_id,
                timestamp: timestamp.with_timezone(&Utc),
                kind: serde_json::from_str(&data)?,
            });
        }
        Ok(events)
    }

    /// Summarize every known session, most recently started first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT session_id,
                    MIN(timestamp),
                    MAX(CASE WHEN kind = 'session_end' THEN timestamp END),
                    SUM(CASE WHEN kind = 'message' THEN 1 ELSE 0 END)
             FROM events
             GROUP BY session_id
             ORDER BY MIN(seq) DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, started, ended, messages) = row?;
            let (Ok(id), Ok(started_at)) = (
                id.parse::<SessionId>(),
                DateTime::parse_from_rfc3339(&started),
            )
            else {
                continue;
            };
            sessions.push(SessionSummary {
                id,
                started_at: started_at.with_timezone(&Utc),
                ended_at: ended
                    .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
                    .map(|t| t.with_timezone(&Utc)),
                message_count: usize::try_from(messages).unwrap_or_default(),
            });
        }
        Ok(sessions)
    }

    /// Resolve a session from a unique id prefix.
    pub fn find_session(&self, prefix: &str) -> Result<SessionId> {
        let matching: Vec<SessionId> = self
            .list_sessions()?
            .into_iter()
            .map(|s| s.id)
            .filter(|id| id.to_string().starts_with(prefix))
            .collect();
        match matching.as_slice() {
            [id] => Ok(*id),
            _ => Err(Error::NotFound(format!(
                "{} sessions match '{prefix}'",
                matching.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventKind, Role};
    use serde_json::json;

    #[test]
    fn events_come_back_in_insertion_order() {
        let store = EventStore::in_memory().unwrap();
        let session = SessionId::new();
        store
            .append(&Event::new(session, EventKind::SessionStart))
            .unwrap();
        store
            .append(&Event::message(session, Role::User, "Weather in Paris?"))
            .unwrap();
        store
            .append(&Event::new(
                session,
                EventKind::FunctionCall {
                    call_id: "call_1_0".into(),
                    name: "get_weather".into(),
                    arguments: json!({"city": "Paris"}),
                },
            ))
            .unwrap();

        let events = store.load_session(session).unwrap();
        let names: Vec<_> = events.iter().map(|e| e.kind.name()).collect();
        assert_eq!(names, ["session_start", "message", "function_call"]);
    }

    #[test]
    fn kind_filter_and_isolation() {
        let store = EventStore::in_memory().unwrap();
        let a = SessionId::new();
        let b = SessionId::new();
        store.append(&Event::message(a, Role::User, "hi")).unwrap();
        store
            .append(&Event::new(a, EventKind::Compacted { removed_turns: 2 }))
            .unwrap();
        store.append(&Event::message(b, Role::User, "other")).unwrap();

        let messages = store.load_events(a, Some("message")).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].kind,
            EventKind::Message {
                role: Role::User,
                content: "hi".into()
            }
        );
    }

    #[test]
    fn list_sessions_summarizes() {
        let store = EventStore::in_memory().unwrap();
        let older = SessionId::new();
        let newer = SessionId::new();
        store
            .append(&Event::new(older, EventKind::SessionStart))
            .unwrap();
        store.append(&Event::message(older, Role::User, "a")).unwrap();
        store
            .append(&Event::message(older, Role::Assistant, "b"))
            .unwrap();
        store
            .append(&Event::new(older, EventKind::SessionEnd))
            .unwrap();
        store
            .append(&Event::new(newer, EventKind::SessionStart))
            .unwrap();

        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, newer);
        assert!(sessions[0].ended_at.is_none());
        assert_eq!(sessions[1].message_count, 2);
        assert!(sessions[1].ended_at.is_some());
    }

    #[test]
    fn find_session_by_prefix() {
        let store = EventStore::in_memory().unwrap();
        let id = SessionId::new();
        store.append(&Event::new(id, EventKind::SessionStart)).unwrap();

        let prefix = &id.to_string()[..8];
        assert_eq!(store.find_session(prefix).unwrap(), id);
        assert!(matches!(
            store.find_session("zzzz"),
            Err(Error::NotFound(_))
        ));
    }
}
