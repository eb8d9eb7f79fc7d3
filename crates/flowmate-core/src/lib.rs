//! FlowMate Core Library
//!
//! This crate provides the notes side of FlowMate, a clinician notes
//! app: per-user note and shift storage, share links, read-only shared
//! views and copy-on-read.
//!
//! # Architecture
//!
//! - **Store**: a partitioned document store behind [`DocumentStore`],
//!   with SQLite and in-memory implementations
//! - **Session**: one page load's working set, save guards and notices
//!
//! # Quick Start
//!
//! ```text
//! let store = SqliteStore::open(&config)?;
//! let session = Session::new(&store, LocalIdentity::signed_in(user), settings);
//! session.handle_identity_change().await?;
//!
//! // Share a note
//! let link = session.share_note(&note_id).await?;
//! println!("{}", link.url);
//! ```
//!
//! # Modules
//!
//! - `session`: Page-load state and the operations the CLI drives
//! - `models`: Users, notes, sharing state and attachments
//! - `shifts`: Shift records for the scheduler
//! - `store`: Document store contract and implementations
//! - `share` / `resolver`: Issuing and resolving share links
//! - `access`: Access modes and the note detail view
//! - `copy`: Copying a shared note into one's own notes
//! - `config`: Application configuration

pub mod access;
pub mod config;
pub mod copy;
pub mod error;
pub mod guard;
pub mod identity;
pub mod models;
pub mod notice;
pub mod resolver;
pub mod session;
pub mod share;
pub mod shifts;
pub mod store;

pub use access::{AccessMode, Control, NoteDetailView, Viewer};
pub use config::Config;
pub use error::{Error, Result};
pub use guard::{SaveGuard, SaveOutcome};
pub use identity::{IdentityProvider, LocalIdentity};
pub use models::{
    ImageAttachment, Note, NoteContent, NoteId, NoteKind, ShareToken, Sharing, SoapSections,
    User, UserId,
};
pub use notice::{Notice, NoticeLevel, Notices};
pub use resolver::{SharedNote, SharedNoteResolver};
pub use session::{LinkOpen, NoteFilter, Session, SessionSettings};
pub use share::{ShareLink, ShareLinkManager};
pub use shifts::{Shift, ShiftDraft, ShiftId, ShiftType};
pub use store::{DocumentStore, MemoryStore, NoteQuery, SqliteStore, StoreError};
