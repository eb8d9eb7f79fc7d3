//! Data models for FlowMate
//!
//! Defines the core data structures: users, notes (with their sharing
//! state and provenance) and image attachments. Shifts live in
//! [`crate::shifts`].
//!
//! Note identifiers are only unique inside their owner's partition, so a
//! note is always addressed as `(owner, id)`.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a user, and of that user's partition in the store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Owner-scoped note identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier (store-assigned on create)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A signed-in user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            display_name: display_name.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Note kind: a free-form note or a structured SOAP note
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    #[default]
    Normal,
    Soap,
}

impl NoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteKind::Normal => "normal",
            NoteKind::Soap => "soap",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Some(NoteKind::Normal),
            "soap" => Some(NoteKind::Soap),
            _ => None,
        }
    }
}

impl fmt::Display for NoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four sections of a SOAP note
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoapSections {
    pub subjective: String,
    pub objective: String,
    pub assessment: String,
    pub plan: String,
}

impl SoapSections {
    pub fn is_empty(&self) -> bool {
        self.subjective.is_empty()
            && self.objective.is_empty()
            && self.assessment.is_empty()
            && self.plan.is_empty()
    }

    /// Sections in display order, labelled
    pub fn labelled(&self) -> [(&'static str, &str); 4] {
        [
            ("Subjective", &self.subjective),
            ("Objective", &self.objective),
            ("Assessment", &self.assessment),
            ("Plan", &self.plan),
        ]
    }
}

/// An embedded image, stored as a `data:` URL payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageAttachment(String);

impl ImageAttachment {
    /// Wrap an already-encoded payload
    pub fn from_data_url(data_url: impl Into<String>) -> Self {
        Self(data_url.into())
    }

    /// Encode raw image bytes as a base64 `data:` URL
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        Self(format!("data:{};base64,{}", mime, BASE64.encode(bytes)))
    }

    pub fn data_url(&self) -> &str {
        &self.0
    }

    /// Blank payloads are skipped when rendering
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// MIME type of a base64 `data:` URL, if it is one
    pub fn mime(&self) -> Option<&str> {
        let rest = self.0.strip_prefix("data:")?;
        let (meta, _) = rest.split_once(',')?;
        meta.strip_suffix(";base64")
    }

    /// Decode the payload of a base64 `data:` URL
    pub fn decode(&self) -> Option<Vec<u8>> {
        self.mime()?;
        let (_, payload) = self.0.split_once(',')?;
        BASE64.decode(payload).ok()
    }
}

/// Opaque capability string granting read access to one note
///
/// Format: `share_<unix-millis>_<9 base-36 chars>`. Uniqueness comes from
/// the timestamp plus the random suffix; it is a capability link, not a
/// security boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareToken(String);

impl ShareToken {
    /// Mint a fresh token
    pub fn generate() -> Self {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut bits = Uuid::new_v4().as_u128();
        let suffix: String = (0..9)
            .map(|_| {
                let c = ALPHABET[(bits % 36) as usize] as char;
                bits /= 36;
                c
            })
            .collect();
        Self(format!("share_{}_{}", Utc::now().timestamp_millis(), suffix))
    }

    /// Wrap a token read from a link or a stored record
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sharing state of a note
///
/// A token exists exactly when the note is shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Sharing {
    #[default]
    Private,
    Shared {
        token: ShareToken,
        shared_at: DateTime<Utc>,
    },
}

impl Sharing {
    pub fn is_shared(&self) -> bool {
        matches!(self, Sharing::Shared { .. })
    }

    pub fn token(&self) -> Option<&ShareToken> {
        match self {
            Sharing::Shared { token, .. } => Some(token),
            Sharing::Private => None,
        }
    }

    pub fn shared_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Sharing::Shared { shared_at, .. } => Some(*shared_at),
            Sharing::Private => None,
        }
    }

    /// Rebuild from the flat stored fields
    ///
    /// `shared` without a token (or a token without `shared`) decodes as
    /// private: such a record can never be resolved by link.
    pub fn from_stored(
        shared: bool,
        token: Option<String>,
        shared_at: Option<DateTime<Utc>>,
    ) -> Self {
        match (shared, token) {
            (true, Some(token)) if !token.is_empty() => Sharing::Shared {
                token: ShareToken(token),
                shared_at: shared_at.unwrap_or_else(Utc::now),
            },
            _ => Sharing::Private,
        }
    }
}

/// Where a copied note came from (trace only, never used for access)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub copied_from: String,
    pub original_share_token: Option<ShareToken>,
}

/// Everything about a note that is persisted besides its identity and
/// store-assigned timestamps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteContent {
    pub title: String,
    pub body: String,
    pub kind: NoteKind,
    pub soap: Option<SoapSections>,
    pub images: Vec<ImageAttachment>,
    pub tags: Vec<String>,
    /// Human-readable date shown in lists ("April 1, 2025")
    pub date: String,
    pub sharing: Sharing,
    pub provenance: Option<Provenance>,
}

impl NoteContent {
    /// Create content with the given title, dated today
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            date: display_date(Utc::now()),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Turn this into a SOAP note with the given sections
    pub fn with_soap(mut self, soap: SoapSections) -> Self {
        self.kind = NoteKind::Soap;
        self.soap = Some(soap);
        self
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        for tag in tags {
            self.add_tag(tag);
        }
        self
    }

    /// Add a tag (duplicates and blanks are ignored)
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into().trim().to_string();
        if !tag.is_empty() && !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    /// Remove a tag
    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|t| t != tag);
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Case-insensitive match over title, body, SOAP sections and tags
    pub fn matches_text(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        let hit = |s: &str| s.to_lowercase().contains(&query);
        hit(&self.title)
            || hit(&self.body)
            || self
                .soap
                .as_ref()
                .is_some_and(|s| s.labelled().iter().any(|(_, text)| hit(text)))
            || self.tags.iter().any(|t| hit(t))
    }
}

/// A note as stored in its owner's partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "NoteRecord", from = "NoteRecord")]
pub struct Note {
    pub id: NoteId,
    pub owner: UserId,
    pub content: NoteContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn is_shared(&self) -> bool {
        self.content.sharing.is_shared()
    }

    pub fn share_token(&self) -> Option<&ShareToken> {
        self.content.sharing.token()
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.owner == user
    }
}

/// Flat document representation of a note
///
/// This is the shape written to JSON output and mirrors the stored
/// document: sharing is three independent fields here and is validated on
/// the way back into a [`Note`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    pub id: NoteId,
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub note_type: NoteKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subjective: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub shared: bool,
    #[serde(default)]
    pub share_id: Option<String>,
    #[serde(default)]
    pub shared_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copied_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_share_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Note> for NoteRecord {
    fn from(note: Note) -> Self {
        let c = note.content;
        let shared = c.sharing.is_shared();
        let share_id = c.sharing.token().map(|t| t.to_string());
        let shared_at = c.sharing.shared_at();
        let soap = c.soap.unwrap_or_default();
        let has_soap = c.kind == NoteKind::Soap;
        let pick = |s: String| has_soap.then_some(s);
        let (copied_from, original_share_id) = match c.provenance {
            Some(p) => (
                Some(p.copied_from),
                p.original_share_token.map(|t| t.to_string()),
            ),
            None => (None, None),
        };
        Self {
            id: note.id,
            user_id: note.owner,
            title: c.title,
            content: c.body,
            note_type: c.kind,
            subjective: pick(soap.subjective),
            objective: pick(soap.objective),
            assessment: pick(soap.assessment),
            plan: pick(soap.plan),
            images: c.images,
            tags: c.tags,
            date: c.date,
            shared,
            share_id,
            shared_at,
            copied_from,
            original_share_id,
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}

impl From<NoteRecord> for Note {
    fn from(r: NoteRecord) -> Self {
        let soap = match r.note_type {
            NoteKind::Soap => Some(SoapSections {
                subjective: r.subjective.unwrap_or_default(),
                objective: r.objective.unwrap_or_default(),
                assessment: r.assessment.unwrap_or_default(),
                plan: r.plan.unwrap_or_default(),
            }),
            NoteKind::Normal => None,
        };
        let provenance = r.copied_from.map(|copied_from| Provenance {
            copied_from,
            original_share_token: r.original_share_id.map(ShareToken::new),
        });
        Self {
            id: r.id,
            owner: r.user_id,
            content: NoteContent {
                title: r.title,
                body: r.content,
                kind: r.note_type,
                soap,
                images: r.images,
                tags: r.tags,
                date: r.date,
                sharing: Sharing::from_stored(r.shared, r.share_id, r.shared_at),
                provenance,
            },
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Format a timestamp the way note lists display it ("April 1, 2025")
pub fn display_date(at: DateTime<Utc>) -> String {
    at.format("%B %-d, %Y").to_string()
}

/// Split a comma-separated tag input into trimmed, non-empty tags
pub fn parse_tags(input: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}
