//! Shared note resolution
//!
//! There is no global index from token to owner, so resolving a token
//! scans every partition and queries each for
//! `share_token == token AND shared == true`, stopping at the first hit.
//! This is O(users) and is the scalability ceiling of link sharing;
//! removing it means adding a token index to the data model.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{Note, ShareToken, UserId};
use crate::store::{DocumentStore, NoteQuery};

/// A note reached through its share link
///
/// Exists only for the duration of a shared view and is never written
/// back to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedNote {
    pub owner: UserId,
    pub note: Note,
}

impl SharedNote {
    pub fn token(&self) -> Option<&ShareToken> {
        self.note.share_token()
    }
}

pub struct SharedNoteResolver<'a, S> {
    store: &'a S,
}

impl<'a, S: DocumentStore> SharedNoteResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Find the note currently shared under `token`
    ///
    /// A partition whose query fails is skipped. Only a failure to list
    /// partitions is reported as `StoreUnavailable`.
    pub async fn resolve(&self, token: &str) -> Result<SharedNote> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::NotFound("empty share token".to_string()));
        }

        let partitions = self
            .store
            .partitions()
            .await
            .map_err(Error::from_store_read)?;
        debug!("Resolving share token across {} partitions", partitions.len());

        let query = NoteQuery::by_share_token(token);
        for owner in partitions {
            match self.store.query_notes(&owner, &query).await {
                Ok(mut hits) => {
                    if hits.is_empty() {
                        continue;
                    }
                    let note = hits.swap_remove(0);
                    debug!("Share token matched note {} of {}", note.id, owner);
                    return Ok(SharedNote { owner, note });
                }
                Err(err) => {
                    warn!("Skipping partition {} while resolving share: {}", owner, err);
                }
            }
        }

        Err(Error::NotFound(format!("no note shared as '{}'", token)))
    }
}
