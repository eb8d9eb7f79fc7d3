//! Access modes for the note detail view
//!
//! The mode is decided from who is looking and whether the note was
//! reached through a share link. [`NoteDetailView`] is built from the mode
//! and contains only the controls that mode allows, so a read-only view
//! never carries an edit or share control at all.

use crate::models::{Note, User, UserId};

/// Who is looking at a note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Owner,
    AuthenticatedNonOwner,
    Anonymous,
}

impl Viewer {
    pub fn of(user: Option<&User>, owner: &UserId) -> Self {
        match user {
            Some(user) if &user.id == owner => Viewer::Owner,
            Some(_) => Viewer::AuthenticatedNonOwner,
            None => Viewer::Anonymous,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Owner viewing their own note, through the list or its own link
    OwnerEdit,
    /// Signed-in user viewing someone else's shared note
    SharedWithCopy,
    /// Signed-out visitor viewing a shared note
    AnonymousView,
    /// No view may be shown
    Denied,
}

impl AccessMode {
    pub fn for_view(viewer: Viewer, shared_view: bool) -> Self {
        match (viewer, shared_view) {
            (Viewer::Owner, _) => AccessMode::OwnerEdit,
            (Viewer::AuthenticatedNonOwner, true) => AccessMode::SharedWithCopy,
            (Viewer::Anonymous, true) => AccessMode::AnonymousView,
            (_, false) => AccessMode::Denied,
        }
    }

    pub fn is_read_only(&self) -> bool {
        !matches!(self, AccessMode::OwnerEdit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Edit,
    Share,
    Unshare,
    Delete,
    CopyToMyNotes,
    BackToList,
}

impl Control {
    pub fn label(&self) -> &'static str {
        match self {
            Control::Edit => "Edit",
            Control::Share => "Share",
            Control::Unshare => "Unshare",
            Control::Delete => "Delete",
            Control::CopyToMyNotes => "Copy to My Notes",
            Control::BackToList => "Back to Notes",
        }
    }
}

/// A rendered note detail view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDetailView {
    pub title: String,
    pub note: Note,
    pub mode: AccessMode,
    controls: Vec<Control>,
}

impl NoteDetailView {
    /// Build the view for `mode`, or `None` when the mode denies access
    pub fn build(note: &Note, mode: AccessMode) -> Option<Self> {
        let (title, controls) = match mode {
            AccessMode::OwnerEdit => {
                let sharing = if note.is_shared() {
                    Control::Unshare
                } else {
                    Control::Share
                };
                (
                    note.content.title.clone(),
                    vec![Control::Edit, sharing, Control::Delete, Control::BackToList],
                )
            }
            AccessMode::SharedWithCopy => (
                shared_title(&note.content.title),
                vec![Control::CopyToMyNotes, Control::BackToList],
            ),
            AccessMode::AnonymousView => (shared_title(&note.content.title), Vec::new()),
            AccessMode::Denied => return None,
        };

        Some(Self {
            title,
            note: note.clone(),
            mode,
            controls,
        })
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn allows(&self, control: Control) -> bool {
        self.controls.contains(&control)
    }
}

fn shared_title(title: &str) -> String {
    format!("{} (Shared)", title)
}
