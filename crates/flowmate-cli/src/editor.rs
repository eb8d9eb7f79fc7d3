//! Interactive editing support
//!
//! Note bodies and SOAP sections are edited in the user's `$EDITOR`
//! through a temporary markdown file. Deletes ask for confirmation.

use std::env;
use std::io::{self, Read, Seek, Write};
use std::process::Command;

use anyhow::{bail, Context, Result};

use flowmate_core::SoapSections;

const SECTION_PREFIX: &str = "## ";

/// An external editor command
pub struct Editor {
    command: String,
}

impl Editor {
    /// Use $EDITOR, $VISUAL, or the first common editor on PATH
    pub fn detect() -> Result<Self> {
        let from_env = ["EDITOR", "VISUAL"]
            .into_iter()
            .filter_map(|var| env::var(var).ok())
            .find(|cmd| !cmd.trim().is_empty());

        let command = match from_env {
            Some(cmd) => cmd,
            None => match ["nano", "vim", "vi", "emacs"]
                .into_iter()
                .find(|cmd| command_exists(cmd))
            {
                Some(cmd) => cmd.to_string(),
                None => bail!(
                    "No editor found. Set $EDITOR environment variable.\n\
                     Example: export EDITOR=nano"
                ),
            },
        };

        Ok(Self { command })
    }

    /// Edit `initial` and return the saved text
    pub fn edit(&self, initial: &str) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .prefix("flowmate_note_")
            .suffix(".md")
            .tempfile()
            .context("Failed to create temp file")?;
        file.write_all(initial.as_bytes())
            .context("Failed to write temp file")?;
        file.flush()?;

        let status = Command::new(&self.command)
            .arg(file.path())
            .status()
            .with_context(|| format!("Failed to run editor: {}", self.command))?;
        if !status.success() {
            bail!(
                "Editor '{}' exited with non-zero status. Check that your editor is configured correctly.",
                self.command
            );
        }

        // Editors usually replace the file, so reopen it by path
        let mut edited = String::new();
        let mut reopened = file.reopen().context("Failed to read edited file")?;
        reopened.rewind()?;
        reopened.read_to_string(&mut edited)?;
        Ok(edited)
    }
}

/// Edit a note body
pub fn edit_text(initial: &str) -> Result<String> {
    Editor::detect()?.edit(initial)
}

/// Edit all four SOAP sections in one buffer
pub fn edit_soap(soap: &SoapSections) -> Result<SoapSections> {
    let edited = Editor::detect()?.edit(&render_soap(soap))?;
    Ok(parse_soap(&edited))
}

fn render_soap(soap: &SoapSections) -> String {
    let mut text = String::new();
    for (label, body) in soap.labelled() {
        text.push_str(SECTION_PREFIX);
        text.push_str(label);
        text.push('\n');
        if !body.is_empty() {
            text.push_str(body);
            text.push('\n');
        }
        text.push('\n');
    }
    text
}

#[derive(Clone, Copy)]
enum Section {
    Subjective,
    Objective,
    Assessment,
    Plan,
}

impl Section {
    fn from_heading(line: &str) -> Option<Self> {
        let label = line.strip_prefix(SECTION_PREFIX)?;
        match label.trim().to_ascii_lowercase().as_str() {
            "subjective" => Some(Section::Subjective),
            "objective" => Some(Section::Objective),
            "assessment" => Some(Section::Assessment),
            "plan" => Some(Section::Plan),
            _ => None,
        }
    }
}

/// Read sections back by their headings
///
/// Text before the first heading is dropped. A `## ` line that is not one
/// of the four section labels stays in the body of the current section.
fn parse_soap(text: &str) -> SoapSections {
    let mut soap = SoapSections::default();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        if let Some(section) = Section::from_heading(line) {
            current = Some(section);
            continue;
        }
        let slot = match current {
            Some(Section::Subjective) => Some(&mut soap.subjective),
            Some(Section::Objective) => Some(&mut soap.objective),
            Some(Section::Assessment) => Some(&mut soap.assessment),
            Some(Section::Plan) => Some(&mut soap.plan),
            None => None,
        };
        if let Some(section) = slot {
            section.push_str(line);
            section.push('\n');
        }
    }

    for section in [
        &mut soap.subjective,
        &mut soap.objective,
        &mut soap.assessment,
        &mut soap.plan,
    ] {
        let trimmed = section.trim().to_string();
        *section = trimmed;
    }
    soap
}

fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Prompt for confirmation
///
/// Returns false without asking when stdin is not a TTY.
pub fn confirm(prompt: &str) -> Result<bool> {
    if !atty::is(atty::Stream::Stdin) {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}
