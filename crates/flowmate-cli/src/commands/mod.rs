//! Command handlers
//!
//! Every handler that needs data receives a [`CliSession`] built once in
//! `main`; its notices are printed after the handler returns.

use anyhow::{bail, Result};

use flowmate_core::{LocalIdentity, Note, NoteId, Session, Shift, ShiftId, SqliteStore};

use crate::output::short_id;

pub mod config;
pub mod home;
pub mod note;
pub mod share;
pub mod shift;
pub mod status;

pub type CliSession<'s> = Session<'s, SqliteStore, LocalIdentity>;

/// Parse a note ID (full ID or prefix) against the user's notes
pub fn parse_note_id(id: &str, notes: &[Note]) -> Result<NoteId> {
    if let Some(note) = notes.iter().find(|n| n.id.as_str() == id) {
        return Ok(note.id.clone());
    }

    let matches: Vec<_> = notes
        .iter()
        .filter(|n| n.id.as_str().starts_with(id))
        .collect();

    match matches.len() {
        0 => bail!("No note found matching: {}", id),
        1 => Ok(matches[0].id.clone()),
        _ => {
            eprintln!("Multiple notes match '{}':", id);
            for note in &matches {
                eprintln!("  {} - {}", short_id(note.id.as_str()), note.content.title);
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}

/// Parse a shift ID (full ID or prefix) against the user's shifts
pub fn parse_shift_id(id: &str, shifts: &[Shift]) -> Result<ShiftId> {
    if let Some(shift) = shifts.iter().find(|s| s.id.as_str() == id) {
        return Ok(shift.id.clone());
    }

    let matches: Vec<_> = shifts
        .iter()
        .filter(|s| s.id.as_str().starts_with(id))
        .collect();

    match matches.len() {
        0 => bail!("No shift found matching: {}", id),
        1 => Ok(matches[0].id.clone()),
        _ => {
            eprintln!("Multiple shifts match '{}':", id);
            for shift in &matches {
                eprintln!(
                    "  {} - {} {}",
                    short_id(shift.id.as_str()),
                    shift.draft.date,
                    shift.draft.location
                );
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}
