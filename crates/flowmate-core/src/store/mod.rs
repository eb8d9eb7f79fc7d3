//! Document store contract
//!
//! The store is partitioned by owner: each user id keys a partition that
//! holds a `notes` and a `schedules` sub-collection. Queries support
//! equality filters plus a limit; writes get store-assigned ids and
//! timestamps.
//!
//! ## Implementations
//!
//! - [`MemoryStore`]: in-process store with fault injection, for tests
//! - [`SqliteStore`]: SQLite-backed store used by the CLI
//!
//! There is no secondary index from share token to owner. Finding a note
//! by token is a scan over [`DocumentStore::partitions`]; see
//! [`crate::resolver`].

pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::models::{Note, NoteContent, NoteId, NoteKind, Sharing, User, UserId};
use crate::shifts::{Shift, ShiftDraft, ShiftId};

/// Equality filters over a partition's notes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteQuery {
    pub share_token: Option<String>,
    pub shared: Option<bool>,
    pub kind: Option<NoteKind>,
    pub limit: Option<usize>,
}

impl NoteQuery {
    /// `share_token == token AND shared == true`, limited to one result
    pub fn by_share_token(token: &str) -> Self {
        Self {
            share_token: Some(token.to_string()),
            shared: Some(true),
            kind: None,
            limit: Some(1),
        }
    }

    pub fn by_kind(kind: NoteKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Check a note against every filter (the limit is not a filter)
    pub fn matches(&self, note: &Note) -> bool {
        if let Some(ref token) = self.share_token {
            if note.share_token().map(|t| t.as_str()) != Some(token.as_str()) {
                return false;
            }
        }
        if let Some(shared) = self.shared {
            if note.is_shared() != shared {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if note.content.kind != kind {
                return false;
            }
        }
        true
    }
}

/// Partitioned document store
///
/// Every method is an await point. Callers must not assume any ordering
/// between two calls other than the one their own await chain gives them.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// Make sure the user's partition exists (called on sign-in)
    async fn ensure_partition(&self, user: &User) -> StoreResult<()>;

    /// All partition keys, in a stable order
    async fn partitions(&self) -> StoreResult<Vec<UserId>>;

    /// All notes in a partition, newest first
    async fn list_notes(&self, owner: &UserId) -> StoreResult<Vec<Note>>;

    async fn get_note(&self, owner: &UserId, id: &NoteId) -> StoreResult<Option<Note>>;

    /// Notes in a partition matching `query`, newest first
    async fn query_notes(&self, owner: &UserId, query: &NoteQuery) -> StoreResult<Vec<Note>>;

    /// Create a note; the store assigns id and timestamps
    async fn create_note(&self, owner: &UserId, content: &NoteContent) -> StoreResult<Note>;

    /// Replace a note's content; bumps `updated_at`
    async fn update_note(
        &self,
        owner: &UserId,
        id: &NoteId,
        content: &NoteContent,
    ) -> StoreResult<Note>;

    /// Write only the sharing fields of a note
    async fn set_sharing(&self, owner: &UserId, id: &NoteId, sharing: &Sharing)
        -> StoreResult<()>;

    /// Delete a note; deleting a missing note succeeds
    async fn delete_note(&self, owner: &UserId, id: &NoteId) -> StoreResult<()>;

    /// All shifts in a partition, ordered by date then start time
    async fn list_shifts(&self, owner: &UserId) -> StoreResult<Vec<Shift>>;

    async fn create_shift(&self, owner: &UserId, draft: &ShiftDraft) -> StoreResult<Shift>;

    async fn update_shift(
        &self,
        owner: &UserId,
        id: &ShiftId,
        draft: &ShiftDraft,
    ) -> StoreResult<Shift>;

    async fn delete_shift(&self, owner: &UserId, id: &ShiftId) -> StoreResult<()>;
}
