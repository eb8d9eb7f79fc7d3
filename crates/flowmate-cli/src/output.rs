//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)
//!
//! Session notices go to stderr so JSON on stdout stays parseable.

use serde::Serialize;

use flowmate_core::{Note, NoteDetailView, Notice, NoticeLevel, ShareLink, Shift};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a note detail view
    ///
    /// Only the controls carried by the view are listed.
    pub fn print_note_view(&self, view: &NoteDetailView) {
        match self.format {
            OutputFormat::Human => {
                let note = &view.note;
                println!("{}", view.title);
                println!("{}", "─".repeat(view.title.chars().count().max(8)));
                println!("ID:       {}", note.id);
                println!("Type:     {}", note.content.kind);
                println!("Date:     {}", note.content.date);
                if !note.content.tags.is_empty() {
                    println!("Tags:     {}", note.content.tags.join(", "));
                }
                if let Some(token) = note.share_token() {
                    if !view.mode.is_read_only() {
                        println!("Shared:   {}", token);
                    }
                }
                if let Some(ref provenance) = note.content.provenance {
                    println!("Copied:   from \"{}\"", provenance.copied_from);
                }
                println!();

                match note.content.soap {
                    Some(ref soap) if !soap.is_empty() => {
                        for (label, text) in soap.labelled() {
                            println!("── {} ──", label);
                            println!("{}", text);
                            println!();
                        }
                    }
                    _ => println!("{}", note.content.body),
                }

                let images: Vec<_> = note
                    .content
                    .images
                    .iter()
                    .filter(|i| !i.is_blank())
                    .collect();
                if !images.is_empty() {
                    println!();
                    println!("── Images ({}) ──", images.len());
                    for image in images {
                        println!("  {}", image.mime().unwrap_or("unknown"));
                    }
                }

                if !view.controls().is_empty() {
                    println!();
                    let labels: Vec<_> = view.controls().iter().map(|c| c.label()).collect();
                    println!("[{}]", labels.join("] ["));
                }
            }
            OutputFormat::Json => {
                let controls: Vec<_> = view.controls().iter().map(|c| c.label()).collect();
                print_json(&serde_json::json!({
                    "title": view.title,
                    "readOnly": view.mode.is_read_only(),
                    "controls": controls,
                    "note": view.note,
                }));
            }
            OutputFormat::Quiet => {
                println!("{}", view.note.id);
            }
        }
    }

    /// Print a note after it was written
    pub fn print_note(&self, note: &Note) {
        match self.format {
            OutputFormat::Human => {
                println!("{} | {}", short_id(note.id.as_str()), note.content.title);
            }
            OutputFormat::Json => print_json(note),
            OutputFormat::Quiet => println!("{}", note.id),
        }
    }

    /// Print a list of notes
    pub fn print_notes(&self, notes: &[Note]) {
        match self.format {
            OutputFormat::Human => {
                if notes.is_empty() {
                    println!("No notes found.");
                    return;
                }
                for note in notes {
                    let shared = if note.is_shared() { " [shared]" } else { "" };
                    println!(
                        "{} | {:<4} | {}{} | {}",
                        short_id(note.id.as_str()),
                        note.content.kind,
                        truncate(&note.content.title, 35),
                        shared,
                        note.content.date
                    );
                }
                println!("\n{} note(s)", notes.len());
            }
            OutputFormat::Json => print_json(&notes),
            OutputFormat::Quiet => {
                for note in notes {
                    println!("{}", note.id);
                }
            }
        }
    }

    /// Print an issued share link
    pub fn print_share_link(&self, link: &ShareLink) {
        match self.format {
            OutputFormat::Human => {
                println!("Share link: {}", link.url);
            }
            OutputFormat::Json => {
                print_json(&serde_json::json!({
                    "url": link.url.as_str(),
                    "token": link.token().map(|t| t.as_str()),
                }));
            }
            OutputFormat::Quiet => println!("{}", link.url),
        }
    }

    /// Print a list of shifts
    pub fn print_shifts(&self, shifts: &[Shift]) {
        match self.format {
            OutputFormat::Human => {
                if shifts.is_empty() {
                    println!("No shifts found.");
                    return;
                }
                for shift in shifts {
                    let overnight = if shift.is_overnight() { " (+1)" } else { "" };
                    println!(
                        "{} | {} | {}-{}{} | {:<7} | {}",
                        short_id(shift.id.as_str()),
                        shift.draft.date.format("%Y-%m-%d"),
                        shift.draft.start_time.format("%H:%M"),
                        shift.draft.end_time.format("%H:%M"),
                        overnight,
                        shift.draft.kind,
                        truncate(&shift.draft.location, 30)
                    );
                    if !shift.draft.notes.is_empty() {
                        println!("         {}", truncate_line(&shift.draft.notes, 60));
                    }
                }
                println!("\n{} shift(s)", shifts.len());
            }
            OutputFormat::Json => print_json(&shifts),
            OutputFormat::Quiet => {
                for shift in shifts {
                    println!("{}", shift.id);
                }
            }
        }
    }

    /// Print a single shift after it was written
    pub fn print_shift(&self, shift: &Shift) {
        match self.format {
            OutputFormat::Json => print_json(shift),
            OutputFormat::Quiet => println!("{}", shift.id),
            OutputFormat::Human => self.print_shifts(std::slice::from_ref(shift)),
        }
    }

    /// Print the home dashboard
    pub fn print_home(&self, signed_in: bool, shifts: &[Shift], notes: &[Note]) {
        match self.format {
            OutputFormat::Human => {
                println!("Upcoming Shifts");
                if !signed_in {
                    println!("  Sign in to view your shifts");
                } else if shifts.is_empty() {
                    println!("  No upcoming shifts");
                }
                for shift in shifts {
                    println!(
                        "  {} | {}-{} | {}",
                        shift.draft.date.format("%A, %B %-d, %Y"),
                        shift.draft.start_time.format("%H:%M"),
                        shift.draft.end_time.format("%H:%M"),
                        shift.draft.location
                    );
                    if !shift.draft.notes.is_empty() {
                        println!("    {}", truncate_line(&shift.draft.notes, 60));
                    }
                }

                println!();
                println!("Recent Notes");
                if !signed_in {
                    println!("  Sign in to view your notes");
                } else if notes.is_empty() {
                    println!("  No recent notes");
                }
                for note in notes {
                    println!(
                        "  {} | {} | {}",
                        short_id(note.id.as_str()),
                        truncate(&note.content.title, 35),
                        note.content.date
                    );
                }
            }
            OutputFormat::Json => print_json(&serde_json::json!({
                "upcomingShifts": shifts,
                "recentNotes": notes,
            })),
            OutputFormat::Quiet => {
                for shift in shifts {
                    println!("{}", shift.id);
                }
                for note in notes {
                    println!("{}", note.id);
                }
            }
        }
    }

    /// Print session notices to stderr
    ///
    /// Quiet mode still reports errors.
    pub fn print_notices(&self, notices: &[Notice]) {
        for notice in notices {
            match self.format {
                OutputFormat::Human => match notice.level {
                    NoticeLevel::Success => eprintln!("✓ {}", notice.message),
                    NoticeLevel::Error => eprintln!("✗ {}", notice.message),
                    NoticeLevel::Info => eprintln!("{}", notice.message),
                },
                OutputFormat::Json => {
                    eprintln!(
                        "{}",
                        serde_json::json!({
                            "status": level_name(notice.level),
                            "message": notice.message
                        })
                    );
                }
                OutputFormat::Quiet => {
                    if notice.level == NoticeLevel::Error {
                        eprintln!("{}", notice.message);
                    }
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

fn level_name(level: NoticeLevel) -> &'static str {
    match level {
        NoticeLevel::Success => "success",
        NoticeLevel::Error => "error",
        NoticeLevel::Info => "info",
    }
}

/// First eight characters of an id
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("Überweisung Station 4", 8), "Überw...");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("single line", 20), "single line");
        assert_eq!(truncate_line("line one\nline two", 20), "line one");
        assert_eq!(
            truncate_line("very long single line here", 10),
            "very lo..."
        );
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
