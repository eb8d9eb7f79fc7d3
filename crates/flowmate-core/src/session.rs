//! Viewer session
//!
//! A [`Session`] is one page load: the signed-in user's working set of
//! notes and shifts, the currently open shared note, the save guards and
//! the notice queue. All state is interior (`Cell`/`RefCell`) and the
//! session is driven from a single task; no borrow is held across an
//! await.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use url::Url;

use crate::access::{AccessMode, NoteDetailView, Viewer};
use crate::config::Config;
use crate::copy;
use crate::error::{Error, Result};
use crate::guard::{SaveGuard, SaveOutcome, SaveTicket};
use crate::identity::IdentityProvider;
use crate::models::{Note, NoteContent, NoteId, NoteKind, Sharing, User, UserId};
use crate::notice::Notices;
use crate::resolver::{SharedNote, SharedNoteResolver};
use crate::share::{self, ShareLink, ShareLinkManager};
use crate::shifts::{Shift, ShiftDraft, ShiftId};
use crate::store::{DocumentStore, StoreError};

const LOADING_SHARED: &str = "Loading shared note...";

/// Settings a session needs from the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub base_url: Url,
    pub resolve_timeout: Duration,
}

impl SessionSettings {
    /// Settings for `base_url` with the default resolve timeout
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            resolve_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            Error::Validation(format!("invalid base_url '{}': {}", config.base_url, e))
        })?;
        Ok(Self {
            base_url,
            resolve_timeout: config.resolve_timeout(),
        })
    }
}

/// Which notes a list shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NoteFilter {
    #[default]
    All,
    Kind(NoteKind),
}

impl NoteFilter {
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("all") {
            return Some(NoteFilter::All);
        }
        NoteKind::parse(s).map(NoteFilter::Kind)
    }

    pub fn matches(&self, note: &Note) -> bool {
        match self {
            NoteFilter::All => true,
            NoteFilter::Kind(kind) => note.content.kind == *kind,
        }
    }
}

/// Result of handling the page's share link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOpen {
    /// The location carries no share parameter
    NoLink,
    /// The link was already handled during this page load
    AlreadyHandled,
    Opened(NoteDetailView),
}

pub struct Session<'s, S, I> {
    store: &'s S,
    identity: I,
    settings: SessionSettings,
    notes: RefCell<Vec<Note>>,
    shifts: RefCell<Vec<Shift>>,
    shared_view: RefCell<Option<SharedNote>>,
    note_save: SaveGuard,
    shift_save: SaveGuard,
    notices: Notices,
    location: RefCell<Url>,
    link_handled: Cell<bool>,
}

impl<'s, S: DocumentStore, I: IdentityProvider> Session<'s, S, I> {
    /// Start a page load at the base URL
    pub fn new(store: &'s S, identity: I, settings: SessionSettings) -> Self {
        let location = settings.base_url.clone();
        Self {
            store,
            identity,
            settings,
            notes: RefCell::new(Vec::new()),
            shifts: RefCell::new(Vec::new()),
            shared_view: RefCell::new(None),
            note_save: SaveGuard::new("note"),
            shift_save: SaveGuard::new("shift"),
            notices: Notices::new(),
            location: RefCell::new(location),
            link_handled: Cell::new(false),
        }
    }

    /// Start a page load at `location`
    pub fn with_location(mut self, location: Url) -> Self {
        self.location = RefCell::new(location);
        self
    }

    // ==================== Accessors ====================

    pub fn store(&self) -> &S {
        self.store
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn current_user(&self) -> Option<User> {
        self.identity.current_user()
    }

    /// The visible page location
    pub fn location(&self) -> Url {
        self.location.borrow().clone()
    }

    /// The working set, newest first
    pub fn notes(&self) -> Vec<Note> {
        self.notes.borrow().clone()
    }

    pub fn note(&self, id: &NoteId) -> Option<Note> {
        self.notes.borrow().iter().find(|n| &n.id == id).cloned()
    }

    pub fn shifts(&self) -> Vec<Shift> {
        self.shifts.borrow().clone()
    }

    pub fn is_saving_note(&self) -> bool {
        self.note_save.is_saving()
    }

    // ==================== Identity ====================

    /// Reload or clear the working set for whoever is signed in now
    pub async fn handle_identity_change(&self) -> Result<()> {
        match self.current_user() {
            Some(user) => {
                if let Err(err) = self.store.ensure_partition(&user).await {
                    self.notices.error("Failed to load your account. Please try again.");
                    return Err(Error::from_store_write(err));
                }
                self.load_notes().await?;
                self.load_shifts().await?;
                Ok(())
            }
            None => {
                debug!("Signed out, clearing working set");
                self.notes.borrow_mut().clear();
                self.shifts.borrow_mut().clear();
                Ok(())
            }
        }
    }

    /// Follow identity changes until the provider goes away
    pub async fn follow_identity(&self) {
        let mut changes = self.identity.subscribe();
        while changes.changed().await.is_ok() {
            if let Err(err) = self.handle_identity_change().await {
                warn!("Failed to apply identity change: {}", err);
            }
        }
    }

    // ==================== Notes ====================

    /// Load the signed-in user's notes; anonymous clears the working set
    pub async fn load_notes(&self) -> Result<usize> {
        let Some(user) = self.current_user() else {
            self.notes.borrow_mut().clear();
            return Ok(0);
        };

        let notes = match self.store.list_notes(&user.id).await {
            Ok(notes) => notes,
            Err(err) => {
                self.notices.error("Failed to load notes. Please try again.");
                return Err(Error::from_store_read(err));
            }
        };

        debug!("Loaded {} notes for {}", notes.len(), user.id);
        let count = notes.len();
        *self.notes.borrow_mut() = notes;
        Ok(count)
    }

    /// Create (`existing == None`) or update a note
    ///
    /// Updating keeps the note's sharing state and provenance, and keeps
    /// its images when the draft carries none.
    pub async fn save_note(
        &self,
        draft: NoteContent,
        existing: Option<&NoteId>,
    ) -> Result<SaveOutcome<Note>> {
        let Some(ticket) = self.note_save.try_begin() else {
            return Ok(SaveOutcome::Ignored);
        };

        let Some(user) = self.current_user() else {
            self.notices.error("Please sign in to access Notes");
            return Err(Error::NotAuthenticated("save notes".to_string()));
        };

        if draft.title.trim().is_empty() {
            self.notices.error("Please enter a title for your note");
            return Err(Error::Validation("a note needs a title".to_string()));
        }

        match self.write_note(&user, draft, existing, &ticket).await {
            Ok(note) => {
                let mut notes = self.notes.borrow_mut();
                match notes.iter_mut().find(|n| n.id == note.id) {
                    Some(slot) => *slot = note.clone(),
                    None => notes.insert(0, note.clone()),
                }
                drop(notes);
                info!("Saved note {}", note.id);
                self.notices.success("Note saved successfully!");
                Ok(SaveOutcome::Saved(note))
            }
            Err(Error::Cancelled) => {
                debug!("Discarding result of cancelled note save");
                Ok(SaveOutcome::Cancelled)
            }
            Err(err) => {
                self.notices.error("Failed to save note. Please try again.");
                Err(err)
            }
        }
    }

    async fn write_note(
        &self,
        user: &User,
        mut draft: NoteContent,
        existing: Option<&NoteId>,
        ticket: &SaveTicket<'_>,
    ) -> Result<Note> {
        let current = match existing {
            Some(id) => Some(self.owned_note(user, id).await?),
            None => None,
        };

        ticket.check()?;

        let written = match current {
            Some(current) => {
                draft.sharing = current.content.sharing;
                draft.provenance = current.content.provenance;
                if draft.images.is_empty() {
                    draft.images = current.content.images;
                }
                self.store.update_note(&user.id, &current.id, &draft).await
            }
            None => {
                draft.sharing = Sharing::Private;
                self.store.create_note(&user.id, &draft).await
            }
        };

        ticket.check()?;
        written.map_err(Error::from_store_write)
    }

    /// Find one of the user's own notes, in the working set or the store
    async fn owned_note(&self, user: &User, id: &NoteId) -> Result<Note> {
        if let Some(note) = self.note(id) {
            return Ok(note);
        }
        self.store
            .get_note(&user.id, id)
            .await
            .map_err(Error::from_store_read)?
            .ok_or_else(|| Error::NotFound(format!("note '{}'", id)))
    }

    /// Mark the in-flight note save as cancelled
    pub fn cancel_note_save(&self) -> bool {
        self.note_save.cancel()
    }

    pub async fn delete_note(&self, id: &NoteId) -> Result<()> {
        let Some(user) = self.current_user() else {
            return Err(Error::NotAuthenticated("delete notes".to_string()));
        };

        if let Err(err) = self.store.delete_note(&user.id, id).await {
            self.notices.error("Failed to delete note. Please try again.");
            return Err(Error::from_store_write(err));
        }

        self.notes.borrow_mut().retain(|n| &n.id != id);
        info!("Deleted note {}", id);
        self.notices.success("Note deleted successfully!");
        Ok(())
    }

    pub fn filter_notes(&self, filter: NoteFilter) -> Vec<Note> {
        self.notes
            .borrow()
            .iter()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect()
    }

    /// Case-insensitive search; a blank query returns every note
    pub fn search_notes(&self, query: &str) -> Vec<Note> {
        let query = query.trim();
        self.notes
            .borrow()
            .iter()
            .filter(|n| query.is_empty() || n.content.matches_text(query))
            .cloned()
            .collect()
    }

    /// The `limit` most recently updated notes
    pub fn recent_notes(&self, limit: usize) -> Vec<Note> {
        let mut notes = self.notes();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        notes.truncate(limit);
        notes
    }

    // ==================== Sharing ====================

    /// Share one of the user's notes and return its link
    pub async fn share_note(&self, id: &NoteId) -> Result<ShareLink> {
        let user = self.current_user();
        let note = self.sharable_note(user.as_ref(), id)?;

        let manager = ShareLinkManager::new(self.store, &self.settings.base_url);
        match manager.share(user.as_ref(), &note).await {
            Ok(link) => {
                self.set_cached_sharing(&note.owner, &note.id, &link.sharing);
                self.notices.success("Note shared successfully!");
                Ok(link)
            }
            Err(err) => {
                self.notices.error("Failed to share note. Please try again.");
                Err(err)
            }
        }
    }

    pub async fn unshare_note(&self, id: &NoteId) -> Result<()> {
        let user = self.current_user();
        let note = self.sharable_note(user.as_ref(), id)?;

        let was_shared = note.is_shared();
        let manager = ShareLinkManager::new(self.store, &self.settings.base_url);
        match manager.unshare(user.as_ref(), &note).await {
            Ok(sharing) => {
                self.set_cached_sharing(&note.owner, &note.id, &sharing);
                if was_shared {
                    self.notices.success("Note unshared successfully!");
                } else {
                    self.notices.info("Note is not shared.");
                }
                Ok(())
            }
            Err(err) => {
                self.notices.error("Failed to unshare note. Please try again.");
                Err(err)
            }
        }
    }

    /// The note a share/unshare targets: the working set first, then the
    /// open shared view
    fn sharable_note(&self, user: Option<&User>, id: &NoteId) -> Result<Note> {
        if user.is_none() {
            return Err(Error::PermissionDenied(
                "sign in to share notes".to_string(),
            ));
        }
        if let Some(note) = self.note(id) {
            return Ok(note);
        }
        self.shared_view
            .borrow()
            .as_ref()
            .filter(|shared| &shared.note.id == id)
            .map(|shared| shared.note.clone())
            .ok_or_else(|| Error::NotFound(format!("note '{}'", id)))
    }

    fn set_cached_sharing(&self, owner: &UserId, id: &NoteId, sharing: &Sharing) {
        for note in self.notes.borrow_mut().iter_mut() {
            if &note.owner == owner && &note.id == id {
                note.content.sharing = sharing.clone();
            }
        }
        if let Some(shared) = self.shared_view.borrow_mut().as_mut() {
            if &shared.owner == owner && &shared.note.id == id {
                shared.note.content.sharing = sharing.clone();
            }
        }
    }

    // ==================== Viewing ====================

    /// Open one of the user's own notes from the list
    pub fn open_note(&self, id: &NoteId) -> Result<NoteDetailView> {
        let user = self.current_user();
        let note = self
            .note(id)
            .ok_or_else(|| Error::NotFound(format!("note '{}'", id)))?;

        let mode = AccessMode::for_view(Viewer::of(user.as_ref(), &note.owner), false);
        let view = NoteDetailView::build(&note, mode)
            .ok_or_else(|| Error::PermissionDenied(format!("note '{}'", id)))?;
        self.shared_view.borrow_mut().take();
        Ok(view)
    }

    /// Rebuild the open shared note's view for the current viewer
    pub fn shared_view(&self) -> Option<NoteDetailView> {
        let shared = self.shared_view.borrow().clone()?;
        let user = self.current_user();
        let mode = AccessMode::for_view(Viewer::of(user.as_ref(), &shared.owner), true);
        NoteDetailView::build(&shared.note, mode)
    }

    /// Leave the shared view
    pub fn close_shared_view(&self) {
        self.shared_view.borrow_mut().take();
    }

    /// Resolve the page location's share link, at most once per load
    ///
    /// On success or `NotFound` the `share` parameter is removed from the
    /// location. A timeout leaves it in place.
    pub async fn open_share_link(&self) -> Result<LinkOpen> {
        if self.link_handled.replace(true) {
            debug!("Share link already handled for this page load");
            return Ok(LinkOpen::AlreadyHandled);
        }

        let Some(token) = share::share_param(&self.location.borrow()) else {
            return Ok(LinkOpen::NoLink);
        };

        self.notices.show_loading(LOADING_SHARED);
        let resolver = SharedNoteResolver::new(self.store);
        let resolved =
            tokio::time::timeout(self.settings.resolve_timeout, resolver.resolve(token.as_str()))
                .await;
        self.notices.clear_loading();

        match resolved {
            Err(_) => {
                warn!(
                    "Share lookup timed out after {:?}",
                    self.settings.resolve_timeout
                );
                self.notices
                    .error("Failed to load shared note. Please try again.");
                Err(Error::StoreUnavailable(StoreError::Unavailable(format!(
                    "share lookup timed out after {:?}",
                    self.settings.resolve_timeout
                ))))
            }
            Ok(Err(Error::NotFound(msg))) => {
                self.clear_share_param();
                self.notices
                    .error("Shared note not found or has been removed.");
                Err(Error::NotFound(msg))
            }
            Ok(Err(err)) => {
                self.notices
                    .error("Failed to load shared note. Please try again.");
                Err(err)
            }
            Ok(Ok(shared)) => {
                self.clear_share_param();
                let user = self.current_user();
                let mode =
                    AccessMode::for_view(Viewer::of(user.as_ref(), &shared.owner), true);
                let view = NoteDetailView::build(&shared.note, mode).ok_or_else(|| {
                    Error::PermissionDenied(format!("note '{}'", shared.note.id))
                })?;
                info!("Opened shared note {} of {}", shared.note.id, shared.owner);
                *self.shared_view.borrow_mut() = Some(shared);
                self.notices.success("Shared note loaded successfully!");
                Ok(LinkOpen::Opened(view))
            }
        }
    }

    fn clear_share_param(&self) {
        let stripped = share::strip_share_param(&self.location.borrow());
        *self.location.borrow_mut() = stripped;
    }

    /// Copy the open shared note into the user's notes
    pub async fn copy_shared_to_my_notes(&self) -> Result<Note> {
        let shared = self
            .shared_view
            .borrow()
            .clone()
            .ok_or_else(|| Error::NotFound("no shared note is open".to_string()))?;

        let user = self.current_user();
        if user.is_none() {
            self.notices.error("You must be logged in to copy notes.");
            return Err(Error::NotAuthenticated("copy notes".to_string()));
        }

        match copy::copy_to_my_notes(self.store, user.as_ref(), &shared.note).await {
            Ok(copy) => {
                self.notes.borrow_mut().insert(0, copy.clone());
                self.notices
                    .success("Note copied to your notes successfully!");
                Ok(copy)
            }
            Err(err) => {
                self.notices.error("Failed to copy note. Please try again.");
                Err(err)
            }
        }
    }

    // ==================== Shifts ====================

    pub async fn load_shifts(&self) -> Result<usize> {
        let Some(user) = self.current_user() else {
            self.shifts.borrow_mut().clear();
            return Ok(0);
        };

        let shifts = match self.store.list_shifts(&user.id).await {
            Ok(shifts) => shifts,
            Err(err) => {
                self.notices.error("Failed to load shifts. Please try again.");
                return Err(Error::from_store_read(err));
            }
        };

        let count = shifts.len();
        *self.shifts.borrow_mut() = shifts;
        Ok(count)
    }

    /// Create (`existing == None`) or update a shift
    pub async fn save_shift(
        &self,
        draft: ShiftDraft,
        existing: Option<&ShiftId>,
    ) -> Result<SaveOutcome<Shift>> {
        let Some(ticket) = self.shift_save.try_begin() else {
            return Ok(SaveOutcome::Ignored);
        };

        let Some(user) = self.current_user() else {
            self.notices.error("Please sign in to access Schedule");
            return Err(Error::NotAuthenticated("save shifts".to_string()));
        };

        if let Err(err) = draft.validate() {
            self.notices.error("Please fill in all required fields.");
            return Err(err);
        }

        if ticket.is_cancelled() {
            return Ok(SaveOutcome::Cancelled);
        }

        let written = match existing {
            Some(id) => self.store.update_shift(&user.id, id, &draft).await,
            None => self.store.create_shift(&user.id, &draft).await,
        };

        if ticket.is_cancelled() {
            debug!("Discarding result of cancelled shift save");
            return Ok(SaveOutcome::Cancelled);
        }

        match written {
            Ok(shift) => {
                let mut shifts = self.shifts.borrow_mut();
                match shifts.iter_mut().find(|s| s.id == shift.id) {
                    Some(slot) => *slot = shift.clone(),
                    None => shifts.push(shift.clone()),
                }
                shifts.sort_by_key(|s| (s.draft.date, s.draft.start_time));
                drop(shifts);
                self.notices.success("Shift saved successfully!");
                Ok(SaveOutcome::Saved(shift))
            }
            Err(err) => {
                self.notices.error("Failed to save shift. Please try again.");
                Err(Error::from_store_write(err))
            }
        }
    }

    pub fn cancel_shift_save(&self) -> bool {
        self.shift_save.cancel()
    }

    pub async fn delete_shift(&self, id: &ShiftId) -> Result<()> {
        let Some(user) = self.current_user() else {
            return Err(Error::NotAuthenticated("delete shifts".to_string()));
        };

        if let Err(err) = self.store.delete_shift(&user.id, id).await {
            self.notices.error("Failed to delete shift. Please try again.");
            return Err(Error::from_store_write(err));
        }

        self.shifts.borrow_mut().retain(|s| &s.id != id);
        self.notices.success("Shift deleted successfully!");
        Ok(())
    }

    /// Shifts that start on `date`
    pub fn shifts_on(&self, date: NaiveDate) -> Vec<Shift> {
        self.shifts
            .borrow()
            .iter()
            .filter(|s| s.draft.date == date)
            .cloned()
            .collect()
    }

    /// The next `limit` shifts starting on or after `from`, soonest first
    pub fn upcoming_shifts(&self, from: NaiveDate, limit: usize) -> Vec<Shift> {
        let mut upcoming: Vec<Shift> = self
            .shifts
            .borrow()
            .iter()
            .filter(|s| s.draft.date >= from)
            .cloned()
            .collect();
        upcoming.sort_by_key(|s| (s.draft.date, s.draft.start_time));
        upcoming.truncate(limit);
        upcoming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Control;
    use crate::config::DEFAULT_BASE_URL;
    use crate::identity::LocalIdentity;
    use crate::models::SoapSections;
    use crate::notice::NoticeLevel;
    use crate::shifts::ShiftType;
    use crate::store::{MemoryStore, SqliteStore};

    fn settings() -> SessionSettings {
        SessionSettings::new(Url::parse(DEFAULT_BASE_URL).unwrap())
    }

    fn alice() -> User {
        User::new("alice", "Alice")
    }

    fn bob() -> User {
        User::new("bob", "Bob")
    }

    async fn session_for(
        store: &MemoryStore,
        user: Option<User>,
    ) -> Session<'_, MemoryStore, LocalIdentity> {
        let identity = match user {
            Some(user) => LocalIdentity::signed_in(user),
            None => LocalIdentity::anonymous(),
        };
        let session = Session::new(store, identity, settings());
        session.handle_identity_change().await.unwrap();
        session
    }

    async fn at_link<'s>(
        store: &'s MemoryStore,
        user: Option<User>,
        link: &Url,
    ) -> Session<'s, MemoryStore, LocalIdentity> {
        session_for(store, user).await.with_location(link.clone())
    }

    async fn saved(session: &Session<'_, MemoryStore, LocalIdentity>, title: &str) -> Note {
        session
            .save_note(NoteContent::new(title).with_body("Bed 12 weaned to 2L NC"), None)
            .await
            .unwrap()
            .saved()
            .unwrap()
    }

    fn last_message(session: &Session<'_, MemoryStore, LocalIdentity>) -> Option<String> {
        session.notices().drain().pop().map(|n| n.message)
    }

    // ==================== Notes ====================

    #[tokio::test]
    async fn test_save_creates_then_updates() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;

        let note = saved(&session, "Rounds").await;
        assert_eq!(session.notes().len(), 1);

        let draft = note.content.clone().with_body("updated");
        let updated = session
            .save_note(draft, Some(&note.id))
            .await
            .unwrap()
            .saved()
            .unwrap();
        assert_eq!(updated.id, note.id);
        assert_eq!(session.notes().len(), 1);
        assert_eq!(session.notes()[0].content.body, "updated");
    }

    #[tokio::test]
    async fn test_update_preserves_sharing_and_images() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        let draft = NoteContent::new("Rounds")
            .with_image(crate::models::ImageAttachment::from_bytes("image/png", &[1]));
        let note = session
            .save_note(draft, None)
            .await
            .unwrap()
            .saved()
            .unwrap();
        let link = session.share_note(&note.id).await.unwrap();

        let edited = NoteContent::new("Rounds v2");
        let updated = session
            .save_note(edited, Some(&note.id))
            .await
            .unwrap()
            .saved()
            .unwrap();
        assert_eq!(updated.share_token(), link.token());
        assert_eq!(updated.content.images.len(), 1);
    }

    #[tokio::test]
    async fn test_save_requires_title() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;

        let err = session
            .save_note(NoteContent::new("  "), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!session.is_saving_note());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_anonymous_save_is_rejected() {
        let store = MemoryStore::new();
        let session = session_for(&store, None).await;

        let err = session
            .save_note(NoteContent::new("x"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated(_)));
    }

    #[tokio::test]
    async fn test_rapid_double_save_writes_once() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        let gate = store.hold_next_write();
        let draft = NoteContent::new("Rounds");

        let (first, second) = tokio::join!(session.save_note(draft.clone(), None), async {
            let outcome = session.save_note(draft.clone(), None).await;
            gate.release();
            outcome
        });

        assert!(first.unwrap().is_saved());
        assert_eq!(second.unwrap(), SaveOutcome::Ignored);
        assert_eq!(store.write_count(), 1);
        assert_eq!(session.notes().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_save_leaves_list_unchanged() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        let gate = store.hold_next_write();

        let (outcome, ()) = tokio::join!(session.save_note(NoteContent::new("Draft"), None), async {
            assert!(session.cancel_note_save());
            gate.release();
        });

        assert_eq!(outcome.unwrap(), SaveOutcome::Cancelled);
        assert!(session.notes().is_empty());
        assert!(session.notices().drain().is_empty());
        assert!(!session.is_saving_note());
    }

    #[tokio::test]
    async fn test_cancelled_failing_save_is_silent() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        store.reject_writes(true);
        let gate = store.hold_next_write();

        let (outcome, ()) = tokio::join!(session.save_note(NoteContent::new("Draft"), None), async {
            session.cancel_note_save();
            gate.release();
        });

        assert_eq!(outcome.unwrap(), SaveOutcome::Cancelled);
        assert!(session.notices().drain().is_empty());
    }

    #[tokio::test]
    async fn test_failed_save_releases_guard() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        store.reject_writes(true);

        let err = session
            .save_note(NoteContent::new("Draft"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreWriteFailed(_)));
        assert!(!session.is_saving_note());
        assert_eq!(
            last_message(&session).as_deref(),
            Some("Failed to save note. Please try again.")
        );
    }

    #[tokio::test]
    async fn test_delete_filter_and_search() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        let plain = saved(&session, "Handoff").await;
        session
            .save_note(
                NoteContent::new("Bed 4").with_soap(SoapSections {
                    subjective: "dyspnea".into(),
                    ..SoapSections::default()
                }),
                None,
            )
            .await
            .unwrap();

        assert_eq!(session.filter_notes(NoteFilter::All).len(), 2);
        assert_eq!(session.filter_notes(NoteFilter::Kind(NoteKind::Soap)).len(), 1);
        assert_eq!(session.search_notes("DYSPNEA").len(), 1);
        assert_eq!(session.search_notes("").len(), 2);

        session.delete_note(&plain.id).await.unwrap();
        assert_eq!(session.notes().len(), 1);
        assert!(store.get_note(&alice().id, &plain.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_notes_by_last_update() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        let mut notes = Vec::new();
        for title in ["Admit", "Rounds", "Handoff", "Discharge"] {
            notes.push(saved(&session, title).await);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let draft = notes[0].content.clone().with_body("re-examined");
        session.save_note(draft, Some(&notes[0].id)).await.unwrap();

        let titles: Vec<_> = session
            .recent_notes(3)
            .into_iter()
            .map(|n| n.content.title)
            .collect();
        assert_eq!(titles, vec!["Admit", "Discharge", "Handoff"]);
        assert_eq!(session.recent_notes(10).len(), 4);
    }

    #[tokio::test]
    async fn test_sign_out_clears_working_set() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        saved(&session, "Rounds").await;

        session.identity().sign_out();
        session.handle_identity_change().await.unwrap();
        assert!(session.notes().is_empty());

        session.identity().sign_in(alice());
        session.handle_identity_change().await.unwrap();
        assert_eq!(session.notes().len(), 1);
    }

    #[tokio::test]
    async fn test_follow_identity_reloads() {
        let store = MemoryStore::new();
        {
            let seed = session_for(&store, Some(alice())).await;
            saved(&seed, "Rounds").await;
        }
        let session = session_for(&store, None).await;

        tokio::select! {
            biased;
            _ = session.follow_identity() => unreachable!("identity provider is still alive"),
            _ = async {
                session.identity().sign_in(alice());
                tokio::time::sleep(Duration::from_millis(20)).await;
            } => {}
        }
        assert_eq!(session.notes().len(), 1);
    }

    // ==================== Sharing ====================

    #[tokio::test]
    async fn test_share_updates_cache_immediately() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        let note = saved(&session, "Rounds").await;

        let link = session.share_note(&note.id).await.unwrap();
        let cached = session.note(&note.id).unwrap();
        assert_eq!(cached.share_token(), link.token());
        assert!(session.open_note(&note.id).unwrap().allows(Control::Unshare));

        session.unshare_note(&note.id).await.unwrap();
        assert!(!session.note(&note.id).unwrap().is_shared());
        assert!(session.open_note(&note.id).unwrap().allows(Control::Share));
    }

    #[tokio::test]
    async fn test_unshare_private_note_only_informs() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        let note = saved(&session, "Rounds").await;
        session.notices().drain();

        session.unshare_note(&note.id).await.unwrap();
        let notices = session.notices().drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Info);
        assert_eq!(notices[0].message, "Note is not shared.");
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_cannot_share() {
        let store = MemoryStore::new();
        let session = session_for(&store, None).await;

        let err = session.share_note(&NoteId::from("n1")).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_reshare_invalidates_old_link() {
        let store = MemoryStore::new();
        let owner = session_for(&store, Some(alice())).await;
        let note = saved(&owner, "Rounds").await;
        let first = owner.share_note(&note.id).await.unwrap();
        let second = owner.share_note(&note.id).await.unwrap();
        assert_ne!(first.token(), second.token());

        let stale = at_link(&store, Some(bob()), &first.url).await;
        assert!(matches!(
            stale.open_share_link().await,
            Err(Error::NotFound(_))
        ));

        let fresh = at_link(&store, Some(bob()), &second.url).await;
        assert!(matches!(
            fresh.open_share_link().await,
            Ok(LinkOpen::Opened(_))
        ));
    }

    // ==================== Viewing ====================

    #[tokio::test]
    async fn test_rounds_scenario() {
        let store = MemoryStore::new();
        let owner = session_for(&store, Some(alice())).await;
        let original = saved(&owner, "Rounds 4/1").await;
        let link = owner.share_note(&original.id).await.unwrap();

        let viewer = at_link(&store, Some(bob()), &link.url).await;
        let LinkOpen::Opened(view) = viewer.open_share_link().await.unwrap() else {
            panic!("expected shared view");
        };
        assert_eq!(view.mode, AccessMode::SharedWithCopy);
        assert_eq!(view.title, "Rounds 4/1 (Shared)");
        assert!(view.allows(Control::CopyToMyNotes));
        assert!(!view.allows(Control::Edit));
        assert_eq!(view.note.content.body, original.content.body);
        assert_eq!(viewer.location().as_str(), "https://flowmate.app/");

        let copy = viewer.copy_shared_to_my_notes().await.unwrap();
        assert_eq!(copy.content.title, "Rounds 4/1 (Copied)");
        assert!(!copy.is_shared());
        assert_eq!(viewer.notes()[0].id, copy.id);

        let edited = original.content.clone().with_body("edited later");
        owner.save_note(edited, Some(&original.id)).await.unwrap();
        owner.delete_note(&original.id).await.unwrap();

        viewer.load_notes().await.unwrap();
        let kept = viewer.note(&copy.id).unwrap();
        assert_eq!(kept.content.body, "Bed 12 weaned to 2L NC");
    }

    #[tokio::test]
    async fn test_anonymous_visitor_scenario() {
        let store = MemoryStore::new();
        let owner = session_for(&store, Some(alice())).await;
        let note = saved(&owner, "Rounds 4/1").await;
        let link = owner.share_note(&note.id).await.unwrap();

        let visitor = at_link(&store, None, &link.url).await;
        let LinkOpen::Opened(view) = visitor.open_share_link().await.unwrap() else {
            panic!("expected shared view");
        };
        assert_eq!(view.mode, AccessMode::AnonymousView);
        assert!(view.controls().is_empty());
        assert_eq!(view.note.content.body, note.content.body);

        let err = visitor.copy_shared_to_my_notes().await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated(_)));
    }

    #[tokio::test]
    async fn test_stale_link_scenario() {
        let store = MemoryStore::new();
        let owner = session_for(&store, Some(alice())).await;
        let note = saved(&owner, "Rounds 4/1").await;
        let link = owner.share_note(&note.id).await.unwrap();
        owner.unshare_note(&note.id).await.unwrap();

        let viewer = at_link(&store, Some(bob()), &link.url).await;
        let err = viewer.open_share_link().await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(
            last_message(&viewer).as_deref(),
            Some("Shared note not found or has been removed.")
        );
        assert_eq!(viewer.location().as_str(), "https://flowmate.app/");
        assert!(!viewer.notices().is_loading());
    }

    #[tokio::test]
    async fn test_share_scenario_on_sqlite() {
        let store = SqliteStore::open_in_memory().unwrap();
        let owner = Session::new(&store, LocalIdentity::signed_in(alice()), settings());
        owner.handle_identity_change().await.unwrap();
        let original = owner
            .save_note(
                NoteContent::new("Rounds 4/1").with_body("Bed 12 weaned to 2L NC"),
                None,
            )
            .await
            .unwrap()
            .saved()
            .unwrap();
        let link = owner.share_note(&original.id).await.unwrap();

        let viewer = Session::new(&store, LocalIdentity::signed_in(bob()), settings())
            .with_location(link.url.clone());
        viewer.handle_identity_change().await.unwrap();
        let LinkOpen::Opened(view) = viewer.open_share_link().await.unwrap() else {
            panic!("expected shared view");
        };
        assert_eq!(view.mode, AccessMode::SharedWithCopy);
        assert_eq!(view.note.content.body, "Bed 12 weaned to 2L NC");

        let copy = viewer.copy_shared_to_my_notes().await.unwrap();
        assert_eq!(copy.owner, bob().id);
        assert!(!copy.is_shared());

        owner.unshare_note(&original.id).await.unwrap();
        let stored = store.get_note(&alice().id, &original.id).await.unwrap().unwrap();
        assert!(!stored.is_shared());

        let late = Session::new(&store, LocalIdentity::signed_in(bob()), settings())
            .with_location(link.url.clone());
        late.handle_identity_change().await.unwrap();
        assert!(matches!(
            late.open_share_link().await,
            Err(Error::NotFound(_))
        ));

        late.load_notes().await.unwrap();
        let kept = late.note(&copy.id).unwrap();
        assert_eq!(kept.content.title, "Rounds 4/1 (Copied)");
        assert_eq!(store.note_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_owner_opening_own_link_can_edit() {
        let store = MemoryStore::new();
        let owner = session_for(&store, Some(alice())).await;
        let note = saved(&owner, "Rounds").await;
        let link = owner.share_note(&note.id).await.unwrap();

        let again = at_link(&store, Some(alice()), &link.url).await;
        let LinkOpen::Opened(view) = again.open_share_link().await.unwrap() else {
            panic!("expected view");
        };
        assert_eq!(view.mode, AccessMode::OwnerEdit);
        assert_eq!(view.title, "Rounds");
        assert!(view.allows(Control::Unshare));
    }

    #[tokio::test]
    async fn test_link_handled_once_per_load() {
        let store = MemoryStore::new();
        let owner = session_for(&store, Some(alice())).await;
        let note = saved(&owner, "Rounds").await;
        let link = owner.share_note(&note.id).await.unwrap();

        let viewer = at_link(&store, Some(bob()), &link.url).await;
        assert!(matches!(
            viewer.open_share_link().await,
            Ok(LinkOpen::Opened(_))
        ));
        assert_eq!(
            viewer.open_share_link().await.unwrap(),
            LinkOpen::AlreadyHandled
        );

        let plain = session_for(&store, Some(bob())).await;
        assert_eq!(plain.open_share_link().await.unwrap(), LinkOpen::NoLink);
    }

    #[tokio::test]
    async fn test_stalled_resolution_times_out() {
        let store = MemoryStore::new();
        store.stall_partition_scan(true);
        let link = Url::parse("https://flowmate.app/?share=share_1_abcdefghi").unwrap();
        let settings = SessionSettings {
            resolve_timeout: Duration::from_millis(30),
            ..settings()
        };
        let session =
            Session::new(&store, LocalIdentity::anonymous(), settings).with_location(link.clone());

        let err = session.open_share_link().await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(!session.notices().is_loading());
        let notices = session.notices().drain();
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(session.location(), link);
    }

    #[tokio::test]
    async fn test_shared_view_follows_sign_in() {
        let store = MemoryStore::new();
        let owner = session_for(&store, Some(alice())).await;
        let note = saved(&owner, "Rounds").await;
        let link = owner.share_note(&note.id).await.unwrap();

        let visitor = at_link(&store, None, &link.url).await;
        visitor.open_share_link().await.unwrap();
        assert_eq!(visitor.shared_view().unwrap().mode, AccessMode::AnonymousView);

        visitor.identity().sign_in(bob());
        visitor.handle_identity_change().await.unwrap();
        assert_eq!(
            visitor.shared_view().unwrap().mode,
            AccessMode::SharedWithCopy
        );
    }

    #[tokio::test]
    async fn test_non_owner_cannot_share_shared_view() {
        let store = MemoryStore::new();
        let owner = session_for(&store, Some(alice())).await;
        let note = saved(&owner, "Rounds").await;
        let link = owner.share_note(&note.id).await.unwrap();

        let viewer = at_link(&store, Some(bob()), &link.url).await;
        viewer.open_share_link().await.unwrap();
        let err = viewer.share_note(&note.id).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    // ==================== Shifts ====================

    #[tokio::test]
    async fn test_shift_crud() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        let day = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();

        let shift = session
            .save_shift(ShiftDraft::preset(day, ShiftType::Night, "MICU"), None)
            .await
            .unwrap()
            .saved()
            .unwrap();
        assert_eq!(session.shifts_on(day).len(), 1);
        assert!(session.shifts_on(day.succ_opt().unwrap()).is_empty());

        let edited = shift.draft.clone().with_notes("float");
        session.save_shift(edited, Some(&shift.id)).await.unwrap();
        assert_eq!(session.shifts()[0].draft.notes, "float");

        session.delete_shift(&shift.id).await.unwrap();
        assert!(session.shifts().is_empty());
    }

    #[tokio::test]
    async fn test_shift_requires_location() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        let day = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();

        let err = session
            .save_shift(ShiftDraft::preset(day, ShiftType::Morning, ""), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(
            last_message(&session).as_deref(),
            Some("Please fill in all required fields.")
        );
    }

    #[tokio::test]
    async fn test_rapid_double_shift_save_writes_once() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        let day = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let draft = ShiftDraft::preset(day, ShiftType::Evening, "ER");
        let gate = store.hold_next_write();

        let (first, second) = tokio::join!(session.save_shift(draft.clone(), None), async {
            let outcome = session.save_shift(draft.clone(), None).await;
            gate.release();
            outcome
        });

        assert!(first.unwrap().is_saved());
        assert_eq!(second.unwrap(), SaveOutcome::Ignored);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_shift_save_leaves_schedule_unchanged() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        let day = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let gate = store.hold_next_write();

        let draft = ShiftDraft::preset(day, ShiftType::Night, "MICU");
        let (outcome, ()) = tokio::join!(session.save_shift(draft.clone(), None), async {
            assert!(session.cancel_shift_save());
            gate.release();
        });

        assert_eq!(outcome.unwrap(), SaveOutcome::Cancelled);
        assert!(session.shifts().is_empty());
        assert!(session.notices().drain().is_empty());

        // The guard is free again
        let retried = session.save_shift(draft, None).await.unwrap();
        assert!(retried.is_saved());
        assert_eq!(session.shifts().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_without_shift_save_is_noop() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        assert!(!session.cancel_shift_save());
    }

    #[tokio::test]
    async fn test_upcoming_shifts_from_today() {
        let store = MemoryStore::new();
        let session = session_for(&store, Some(alice())).await;
        let today = NaiveDate::from_ymd_opt(2025, 4, 10).unwrap();

        for offset in [9i64, -1, 2, 0, 5] {
            let date = today + chrono::Duration::days(offset);
            session
                .save_shift(ShiftDraft::preset(date, ShiftType::Morning, "Ward 4"), None)
                .await
                .unwrap();
        }

        let dates: Vec<_> = session
            .upcoming_shifts(today, 3)
            .into_iter()
            .map(|s| s.draft.date)
            .collect();
        assert_eq!(
            dates,
            vec![
                today,
                today + chrono::Duration::days(2),
                today + chrono::Duration::days(5),
            ]
        );
        assert!(session
            .upcoming_shifts(today + chrono::Duration::days(10), 3)
            .is_empty());
    }
}
