//! SQLite-backed event journal for switchyard sessions.
//!
//! Every text turn, dispatched function call, function outcome, history
//! compaction and observed run status can be appended here, giving an audit
//! trail that survives the in-memory history being compacted.
//!
//! # Example
//!
//! ```no_run
//! use journal::{Event, EventKind, EventStore, Role, SessionId};
//!
//! let store = EventStore::open("journal.db")?;
//! let session_id = SessionId::new();
//! store.append(&Event::new(session_id, EventKind::SessionStart))?;
//! store.append(&Event::message(session_id, Role::User, "Weather in Paris?"))?;
//!
//! for event in store.load_session(session_id)? {
//!     println!("{}: {:?}", event.timestamp, event.kind);
//! }
//! # Ok::<(), journal::Error>(())
//! ```

mod error;
mod event;
mod store;

pub use error::{Error, Result};
pub use event::{Event, EventKind, Role, SessionId};
pub use store::{EventStore, SessionSummary};
