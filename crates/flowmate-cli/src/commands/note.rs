//! Note command handlers

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;

use flowmate_core::models::parse_tags;
use flowmate_core::{
    ImageAttachment, Note, NoteContent, NoteFilter, NoteId, NoteKind, SaveOutcome, SoapSections,
};

use super::{parse_note_id, CliSession};
use crate::editor::{confirm, edit_soap, edit_text};
use crate::output::Output;

/// Note fields shared by `create` and `edit`
#[derive(Args, Debug, Default, Clone)]
pub struct NoteFields {
    /// Note title
    #[arg(short = 'T', long)]
    pub title: Option<String>,
    /// Note body (opens the editor when omitted)
    #[arg(short, long)]
    pub body: Option<String>,
    /// Note type: normal or soap
    #[arg(short, long)]
    pub kind: Option<String>,
    /// SOAP subjective section
    #[arg(long)]
    pub subjective: Option<String>,
    /// SOAP objective section
    #[arg(long)]
    pub objective: Option<String>,
    /// SOAP assessment section
    #[arg(long)]
    pub assessment: Option<String>,
    /// SOAP plan section
    #[arg(long)]
    pub plan: Option<String>,
    /// Tags to add (repeatable, or comma separated)
    #[arg(short, long)]
    pub tag: Vec<String>,
    /// Image file to attach (png, jpeg, gif, webp)
    #[arg(long)]
    pub image: Vec<PathBuf>,
}

impl NoteFields {
    fn has_soap(&self) -> bool {
        self.subjective.is_some()
            || self.objective.is_some()
            || self.assessment.is_some()
            || self.plan.is_some()
    }

    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.body.is_none()
            && self.kind.is_none()
            && !self.has_soap()
            && self.tag.is_empty()
            && self.image.is_empty()
    }

    /// Apply the given fields on top of `content`
    fn apply_to(&self, content: &mut NoteContent) -> Result<()> {
        if let Some(ref title) = self.title {
            content.title = title.clone();
        }
        if let Some(ref body) = self.body {
            content.body = body.clone();
        }
        if let Some(ref kind) = self.kind {
            content.kind = NoteKind::parse(kind)
                .ok_or_else(|| anyhow!("Unknown note type: '{}'. Use 'normal' or 'soap'.", kind))?;
        }

        if self.has_soap() || content.kind == NoteKind::Soap {
            let mut soap = content.soap.take().unwrap_or_default();
            let sections = [
                (&self.subjective, &mut soap.subjective),
                (&self.objective, &mut soap.objective),
                (&self.assessment, &mut soap.assessment),
                (&self.plan, &mut soap.plan),
            ];
            for (given, slot) in sections {
                if let Some(text) = given {
                    *slot = text.clone();
                }
            }
            content.kind = NoteKind::Soap;
            content.soap = Some(soap);
        } else {
            content.soap = None;
        }

        for tag in self.tag.iter().flat_map(|t| parse_tags(t)) {
            content.add_tag(tag);
        }

        for path in &self.image {
            content.images.push(load_image(path)?);
        }

        Ok(())
    }
}

/// Largest image file accepted as an attachment
const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Read an image file into a `data:` URL attachment
fn load_image(path: &Path) -> Result<ImageAttachment> {
    let mime = image_mime(path)
        .ok_or_else(|| anyhow!("Unsupported image type: {}", path.display()))?;
    let size = std::fs::metadata(path)
        .with_context(|| format!("Failed to read image: {:?}", path))?
        .len();
    if size > MAX_IMAGE_BYTES {
        bail!("Image size must be less than 5MB: {}", path.display());
    }
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read image: {:?}", path))?;
    Ok(ImageAttachment::from_bytes(mime, &bytes))
}

fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Save a note, cancelling the save on Ctrl-C
///
/// After a cancel the save is still awaited so its result is discarded by
/// the session rather than dropped mid-write.
async fn save_interruptible(
    session: &CliSession<'_>,
    draft: NoteContent,
    existing: Option<&NoteId>,
) -> Result<SaveOutcome<Note>> {
    let save = session.save_note(draft, existing);
    tokio::pin!(save);

    let outcome = tokio::select! {
        outcome = &mut save => outcome,
        _ = tokio::signal::ctrl_c() => {
            session.cancel_note_save();
            save.await
        }
    };
    Ok(outcome?)
}

fn report_outcome(outcome: SaveOutcome<Note>, output: &Output) {
    match outcome {
        SaveOutcome::Saved(note) => output.print_note(&note),
        SaveOutcome::Cancelled => output.message("Save cancelled."),
        SaveOutcome::Ignored => output.message("A save is already in progress."),
    }
}

/// Create a new note
pub async fn create(session: &CliSession<'_>, fields: NoteFields, output: &Output) -> Result<()> {
    let mut draft = NoteContent::new(fields.title.clone().unwrap_or_default());
    fields.apply_to(&mut draft)?;

    match draft.kind {
        NoteKind::Normal if fields.body.is_none() => {
            draft.body = edit_text("")?.trim_end().to_string();
        }
        NoteKind::Soap if !fields.has_soap() => {
            draft.soap = Some(edit_soap(&SoapSections::default())?);
        }
        _ => {}
    }

    let outcome = save_interruptible(session, draft, None).await?;
    report_outcome(outcome, output);
    Ok(())
}

/// List notes, optionally filtered by type and tag
pub fn list(
    session: &CliSession<'_>,
    kind: Option<String>,
    tag: Option<String>,
    output: &Output,
) -> Result<()> {
    let filter = match kind {
        Some(ref k) => NoteFilter::parse(k)
            .ok_or_else(|| anyhow!("Unknown note type: '{}'. Use 'all', 'normal' or 'soap'.", k))?,
        None => NoteFilter::All,
    };

    let mut notes = session.filter_notes(filter);
    if let Some(ref tag) = tag {
        notes.retain(|n| n.content.has_tag(tag));
    }

    output.print_notes(&notes);
    Ok(())
}

/// Show one of the user's notes
pub fn show(session: &CliSession<'_>, id: String, output: &Output) -> Result<()> {
    let note_id = parse_note_id(&id, &session.notes())?;
    let view = session.open_note(&note_id)?;
    output.print_note_view(&view);
    Ok(())
}

/// Edit a note, opening the editor on its body when no field is given
pub async fn edit(
    session: &CliSession<'_>,
    id: String,
    fields: NoteFields,
    untag: Vec<String>,
    output: &Output,
) -> Result<()> {
    let note_id = parse_note_id(&id, &session.notes())?;
    let note = session
        .note(&note_id)
        .ok_or_else(|| anyhow!("Note not found: {}", id))?;

    let mut draft = note.content.clone();
    fields.apply_to(&mut draft)?;
    for tag in &untag {
        draft.remove_tag(tag);
    }

    if fields.is_empty() && untag.is_empty() {
        match draft.soap {
            Some(ref soap) => {
                let edited = edit_soap(soap)?;
                if &edited == soap {
                    output.message("No changes made.");
                    return Ok(());
                }
                draft.soap = Some(edited);
            }
            None => {
                let edited = edit_text(&draft.body)?;
                let edited = edited.trim_end();
                if edited == note.content.body.trim_end() {
                    output.message("No changes made.");
                    return Ok(());
                }
                draft.body = edited.to_string();
            }
        }
    }

    let outcome = save_interruptible(session, draft, Some(&note_id)).await?;
    report_outcome(outcome, output);
    Ok(())
}

/// Delete a note
pub async fn delete(session: &CliSession<'_>, id: String, yes: bool, output: &Output) -> Result<()> {
    let note_id = parse_note_id(&id, &session.notes())?;
    let note = session
        .note(&note_id)
        .ok_or_else(|| anyhow!("Note not found: {}", id))?;

    if output.should_prompt()
        && !yes
        && !confirm(&format!("Delete note '{}'?", note.content.title))?
    {
        println!("Cancelled.");
        return Ok(());
    }

    session.delete_note(&note_id).await?;
    Ok(())
}

/// Search the user's notes
pub fn search(session: &CliSession<'_>, query: String, output: &Output) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Search query cannot be empty");
    }
    let notes = session.search_notes(&query);
    output.print_notes(&notes);
    Ok(())
}

/// Share a note and print its link
pub async fn share(session: &CliSession<'_>, id: String, output: &Output) -> Result<()> {
    let note_id = parse_note_id(&id, &session.notes())?;
    let link = session.share_note(&note_id).await?;
    output.print_share_link(&link);
    Ok(())
}

/// Stop sharing a note
pub async fn unshare(session: &CliSession<'_>, id: String) -> Result<()> {
    let note_id = parse_note_id(&id, &session.notes())?;
    session.unshare_note(&note_id).await?;
    Ok(())
}
