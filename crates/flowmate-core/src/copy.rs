//! Copy-on-read
//!
//! A signed-in viewer can copy a note into their own partition. The copy
//! is a new, private note; it keeps a trace of where it came from but has
//! no further link to the source.

use chrono::Utc;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{display_date, Note, NoteContent, Provenance, Sharing, User};
use crate::store::DocumentStore;

/// Content for a copy of `source`
pub fn copy_content(source: &Note) -> NoteContent {
    let from = &source.content;
    NoteContent {
        title: format!("{} (Copied)", from.title),
        body: from.body.clone(),
        kind: from.kind,
        soap: from.soap.clone(),
        images: from.images.clone(),
        tags: from.tags.clone(),
        date: display_date(Utc::now()),
        sharing: Sharing::Private,
        provenance: Some(Provenance {
            copied_from: from.title.clone(),
            original_share_token: source.share_token().cloned(),
        }),
    }
}

/// Persist a copy of `source` in the viewer's partition
pub async fn copy_to_my_notes<S: DocumentStore>(
    store: &S,
    viewer: Option<&User>,
    source: &Note,
) -> Result<Note> {
    let user = viewer.ok_or_else(|| Error::NotAuthenticated("copy notes".to_string()))?;

    let copy = store
        .create_note(&user.id, &copy_content(source))
        .await
        .map_err(Error::from_store_write)?;

    info!(
        "Copied note {} of {} to {} as {}",
        source.id, source.owner, user.id, copy.id
    );
    Ok(copy)
}
