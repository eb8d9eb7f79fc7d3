//! Share links
//!
//! Sharing a note mints a fresh [`ShareToken`], stores it on the note and
//! hands back `<base>?share=<token>`. Unsharing clears the token, which
//! kills every link issued for the note.

use chrono::Utc;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::models::{Note, ShareToken, Sharing, User};
use crate::store::DocumentStore;

/// Query parameter that carries the token
pub const SHARE_PARAM: &str = "share";

/// Build `<base>?share=<token>`, dropping any query or fragment on `base`
pub fn build_share_link(base: &Url, token: &ShareToken) -> Url {
    let mut link = base.clone();
    link.set_query(None);
    link.set_fragment(None);
    link.query_pairs_mut()
        .append_pair(SHARE_PARAM, token.as_str());
    link
}

/// Read the token from a share link
///
/// Accepts a full link, a bare `?share=...` query, or the token itself.
pub fn share_token_from_link(input: &str) -> Option<ShareToken> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(link) = Url::parse(input) {
        return share_param(&link);
    }

    if let Some(query) = input.strip_prefix('?') {
        return url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == SHARE_PARAM)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(ShareToken::new);
    }

    if input.chars().any(char::is_whitespace) {
        return None;
    }
    Some(ShareToken::new(input))
}

/// The `share` parameter of a location, if present and non-empty
pub fn share_param(location: &Url) -> Option<ShareToken> {
    location
        .query_pairs()
        .find(|(key, _)| key == SHARE_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(ShareToken::new)
}

/// Remove the `share` parameter, keeping every other parameter
pub fn strip_share_param(location: &Url) -> Url {
    let kept: Vec<(String, String)> = location
        .query_pairs()
        .filter(|(key, _)| key != SHARE_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut stripped = location.clone();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    stripped
}

/// A link just issued for a note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    pub url: Url,
    pub sharing: Sharing,
}

impl ShareLink {
    pub fn token(&self) -> Option<&ShareToken> {
        self.sharing.token()
    }
}

/// Shares and unshares notes on behalf of their owner
pub struct ShareLinkManager<'a, S> {
    store: &'a S,
    base_url: &'a Url,
}

impl<'a, S: DocumentStore> ShareLinkManager<'a, S> {
    pub fn new(store: &'a S, base_url: &'a Url) -> Self {
        Self { store, base_url }
    }

    /// Share `note`, replacing any token it already had
    pub async fn share(&self, viewer: Option<&User>, note: &Note) -> Result<ShareLink> {
        ensure_owner(viewer, note, "share")?;

        let token = ShareToken::generate();
        let sharing = Sharing::Shared {
            token: token.clone(),
            shared_at: Utc::now(),
        };
        if let Some(old) = note.share_token() {
            debug!("Replacing share token {} on note {}", old, note.id);
        }

        self.store
            .set_sharing(&note.owner, &note.id, &sharing)
            .await
            .map_err(Error::from_store_write)?;

        info!("Shared note {} with token {}", note.id, token);
        Ok(ShareLink {
            url: build_share_link(self.base_url, &token),
            sharing,
        })
    }

    /// Make `note` private; a note that is already private is left alone
    pub async fn unshare(&self, viewer: Option<&User>, note: &Note) -> Result<Sharing> {
        ensure_owner(viewer, note, "unshare")?;

        if !note.is_shared() {
            debug!("Note {} is already private", note.id);
            return Ok(Sharing::Private);
        }

        self.store
            .set_sharing(&note.owner, &note.id, &Sharing::Private)
            .await
            .map_err(Error::from_store_write)?;

        info!("Unshared note {}", note.id);
        Ok(Sharing::Private)
    }
}

fn ensure_owner(viewer: Option<&User>, note: &Note, action: &str) -> Result<()> {
    match viewer {
        Some(user) if note.is_owned_by(&user.id) => Ok(()),
        Some(user) => Err(Error::PermissionDenied(format!(
            "{} cannot {} a note owned by {}",
            user.id, action, note.owner
        ))),
        None => Err(Error::PermissionDenied(format!(
            "sign in to {} this note",
            action
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NoteContent;
    use crate::store::{MemoryStore, NoteQuery};

    fn base() -> Url {
        Url::parse("https://flowmate.app/").unwrap()
    }

    async fn seeded(store: &MemoryStore, owner: &User) -> Note {
        store
            .create_note(&owner.id, &NoteContent::new("Rounds 4/1"))
            .await
            .unwrap()
    }

    #[test]
    fn test_build_share_link_strips_existing_query() {
        let base = Url::parse("https://flowmate.app/notes?tab=soap#top").unwrap();
        let link = build_share_link(&base, &ShareToken::new("share_1_abcdefghi"));
        assert_eq!(
            link.as_str(),
            "https://flowmate.app/notes?share=share_1_abcdefghi"
        );
    }

    #[test]
    fn test_token_from_link_forms() {
        let expected = Some(ShareToken::new("share_1_abcdefghi"));
        assert_eq!(
            share_token_from_link("https://flowmate.app/?share=share_1_abcdefghi"),
            expected
        );
        assert_eq!(share_token_from_link("?share=share_1_abcdefghi"), expected);
        assert_eq!(share_token_from_link("share_1_abcdefghi"), expected);
        assert_eq!(share_token_from_link("https://flowmate.app/?share="), None);
        assert_eq!(share_token_from_link("https://flowmate.app/"), None);
        assert_eq!(share_token_from_link("   "), None);
    }

    #[test]
    fn test_strip_share_param() {
        let location = Url::parse("https://flowmate.app/?share=abc").unwrap();
        assert_eq!(strip_share_param(&location).as_str(), "https://flowmate.app/");

        let location = Url::parse("https://flowmate.app/?utm=mail&share=abc").unwrap();
        assert_eq!(
            strip_share_param(&location).as_str(),
            "https://flowmate.app/?utm=mail"
        );
    }

    #[tokio::test]
    async fn test_share_persists_token() {
        let store = MemoryStore::new();
        let alice = User::new("alice", "Alice");
        let note = seeded(&store, &alice).await;
        let base = base();
        let manager = ShareLinkManager::new(&store, &base);

        let link = manager.share(Some(&alice), &note).await.unwrap();
        let token = link.token().unwrap().clone();
        assert!(link.url.as_str().ends_with(&format!("?share={}", token)));

        let stored = store.get_note(&alice.id, &note.id).await.unwrap().unwrap();
        assert_eq!(stored.share_token(), Some(&token));
    }

    #[tokio::test]
    async fn test_non_owner_cannot_share() {
        let store = MemoryStore::new();
        let alice = User::new("alice", "Alice");
        let bob = User::new("bob", "Bob");
        let note = seeded(&store, &alice).await;
        let base = base();
        let manager = ShareLinkManager::new(&store, &base);

        let err = manager.share(Some(&bob), &note).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
        let err = manager.share(None, &note).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_unshare_private_note_skips_write() {
        let store = MemoryStore::new();
        let alice = User::new("alice", "Alice");
        let note = seeded(&store, &alice).await;
        let base = base();
        let manager = ShareLinkManager::new(&store, &base);

        let writes = store.write_count();
        let sharing = manager.unshare(Some(&alice), &note).await.unwrap();
        assert_eq!(sharing, Sharing::Private);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_unshare_clears_token() {
        let store = MemoryStore::new();
        let alice = User::new("alice", "Alice");
        let mut note = seeded(&store, &alice).await;
        let base = base();
        let manager = ShareLinkManager::new(&store, &base);

        let link = manager.share(Some(&alice), &note).await.unwrap();
        let token = link.token().unwrap().to_string();
        note.content.sharing = link.sharing;

        manager.unshare(Some(&alice), &note).await.unwrap();
        let hits = store
            .query_notes(&alice.id, &NoteQuery::by_share_token(&token))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_share_on_offline_store() {
        let store = MemoryStore::new();
        let alice = User::new("alice", "Alice");
        let note = seeded(&store, &alice).await;
        store.set_offline(true);
        let base = base();
        let manager = ShareLinkManager::new(&store, &base);

        let err = manager.share(Some(&alice), &note).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }
}
