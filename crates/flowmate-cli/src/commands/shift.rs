//! Shift command handlers

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveTime};
use clap::Args;

use flowmate_core::{SaveOutcome, Shift, ShiftDraft, ShiftId, ShiftType};

use super::{parse_shift_id, CliSession};
use crate::editor::confirm;
use crate::output::Output;

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD.", s))
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .with_context(|| format!("Invalid time '{}'. Use HH:MM.", s))
}

fn parse_kind(s: &str) -> Result<ShiftType> {
    ShiftType::parse(s).ok_or_else(|| {
        anyhow!(
            "Unknown shift type: '{}'. Use morning, evening, night or custom.",
            s
        )
    })
}

/// Build a draft from command-line values
///
/// Preset hours apply unless both times are given. A custom shift needs
/// both times.
pub fn shift_draft(
    date: Option<&str>,
    kind: &str,
    location: String,
    start: Option<&str>,
    end: Option<&str>,
    notes: Option<String>,
) -> Result<ShiftDraft> {
    let date = match date {
        Some(d) => parse_date(d)?,
        None => Local::now().date_naive(),
    };
    let kind = parse_kind(kind)?;

    let mut draft = ShiftDraft::preset(date, kind, location);
    match (start, end) {
        (Some(start), Some(end)) => {
            draft = draft.with_times(parse_time(start)?, parse_time(end)?);
        }
        (None, None) if kind == ShiftType::Custom => {
            bail!("Custom shifts need --start and --end");
        }
        (None, None) => {}
        _ => bail!("Give both --start and --end, or neither"),
    }

    if let Some(notes) = notes {
        draft = draft.with_notes(notes);
    }
    Ok(draft)
}

/// Changes for `shift edit`; anything left out keeps its current value
#[derive(Args, Debug, Default, Clone)]
pub struct ShiftChanges {
    /// Date (YYYY-MM-DD)
    #[arg(short, long)]
    pub date: Option<String>,
    /// Shift type (morning, evening, night, custom)
    #[arg(short = 'T', long = "type")]
    pub kind: Option<String>,
    /// Location
    #[arg(short, long)]
    pub location: Option<String>,
    /// Start time (HH:MM)
    #[arg(long)]
    pub start: Option<String>,
    /// End time (HH:MM)
    #[arg(long)]
    pub end: Option<String>,
    /// Notes
    #[arg(short, long)]
    pub notes: Option<String>,
}

impl ShiftChanges {
    fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.kind.is_none()
            && self.location.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.notes.is_none()
    }

    /// Apply the changes on top of `draft`
    ///
    /// A new preset type brings its default hours unless times are given.
    fn apply_to(&self, draft: &mut ShiftDraft) -> Result<()> {
        if let Some(ref date) = self.date {
            draft.date = parse_date(date)?;
        }
        if let Some(ref kind) = self.kind {
            draft.kind = parse_kind(kind)?;
            if let Some((start, end)) = draft.kind.default_hours() {
                draft.start_time = start;
                draft.end_time = end;
            }
        }
        if let Some(ref start) = self.start {
            draft.start_time = parse_time(start)?;
        }
        if let Some(ref end) = self.end {
            draft.end_time = parse_time(end)?;
        }
        if let Some(ref location) = self.location {
            draft.location = location.clone();
        }
        if let Some(ref notes) = self.notes {
            draft.notes = notes.clone();
        }
        Ok(())
    }
}

/// Save a shift, cancelling the save on Ctrl-C
async fn save_interruptible(
    session: &CliSession<'_>,
    draft: ShiftDraft,
    existing: Option<&ShiftId>,
) -> Result<SaveOutcome<Shift>> {
    let save = session.save_shift(draft, existing);
    tokio::pin!(save);

    let outcome = tokio::select! {
        outcome = &mut save => outcome,
        _ = tokio::signal::ctrl_c() => {
            session.cancel_shift_save();
            save.await
        }
    };
    Ok(outcome?)
}

fn report_outcome(outcome: SaveOutcome<Shift>, output: &Output) {
    match outcome {
        SaveOutcome::Saved(shift) => output.print_shift(&shift),
        SaveOutcome::Cancelled => output.message("Save cancelled."),
        SaveOutcome::Ignored => output.message("A save is already in progress."),
    }
}

/// Add a shift
pub async fn add(session: &CliSession<'_>, draft: ShiftDraft, output: &Output) -> Result<()> {
    let outcome = save_interruptible(session, draft, None).await?;
    report_outcome(outcome, output);
    Ok(())
}

/// Edit a shift
pub async fn edit(
    session: &CliSession<'_>,
    id: String,
    changes: ShiftChanges,
    output: &Output,
) -> Result<()> {
    let shifts = session.shifts();
    let shift_id = parse_shift_id(&id, &shifts)?;
    let shift = shifts
        .iter()
        .find(|s| s.id == shift_id)
        .ok_or_else(|| anyhow!("Shift not found: {}", id))?;

    if changes.is_empty() {
        output.message("No changes made.");
        return Ok(());
    }

    let mut draft = shift.draft.clone();
    changes.apply_to(&mut draft)?;

    let outcome = save_interruptible(session, draft, Some(&shift_id)).await?;
    report_outcome(outcome, output);
    Ok(())
}

/// List shifts, optionally for a single day
pub fn list(session: &CliSession<'_>, date: Option<String>, output: &Output) -> Result<()> {
    let shifts = match date {
        Some(ref d) => session.shifts_on(parse_date(d)?),
        None => session.shifts(),
    };
    output.print_shifts(&shifts);
    Ok(())
}

/// Delete a shift
pub async fn delete(session: &CliSession<'_>, id: String, yes: bool, output: &Output) -> Result<()> {
    let shifts = session.shifts();
    let shift_id = parse_shift_id(&id, &shifts)?;

    if output.should_prompt() && !yes && !confirm(&format!("Delete shift {}?", shift_id))? {
        println!("Cancelled.");
        return Ok(());
    }

    session.delete_shift(&shift_id).await?;
    Ok(())
}
