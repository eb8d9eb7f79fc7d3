//! Status command handler

use anyhow::Result;

use flowmate_core::Config;

use super::CliSession;
use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(session: &CliSession<'_>, config: &Config, output: &Output) -> Result<()> {
    let store = session.store();
    let user = session.current_user();
    let notes = session.notes();
    let shared = notes.iter().filter(|n| n.is_shared()).count();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "user": user.as_ref().map(|u| u.id.as_str()),
                    "base_url": session.settings().base_url.as_str(),
                    "database": config.sqlite_path(),
                    "counts": {
                        "notes": notes.len(),
                        "shared": shared,
                        "shifts": session.shifts().len(),
                        "all_notes": store.note_count().unwrap_or(0),
                        "all_shifts": store.shift_count().unwrap_or(0)
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!(
                "{}",
                user.as_ref().map(|u| u.id.as_str()).unwrap_or("anonymous")
            );
        }
        OutputFormat::Human => {
            println!("FlowMate Status");
            println!("===============");
            println!();
            match user {
                Some(ref user) => println!("Signed in as: {} ({})", user.display_name, user.id),
                None => println!("Signed in as: (anonymous)"),
            }
            println!("Share links:  {}", session.settings().base_url);
            println!("Database:     {}", config.sqlite_path().display());
            println!();
            if user.is_some() {
                println!("Your data:");
                println!("  Notes:  {} ({} shared)", notes.len(), shared);
                println!("  Shifts: {}", session.shifts().len());
                println!();
            }
            println!("Store:");
            println!("  Notes:  {}", store.note_count().unwrap_or(0));
            println!("  Shifts: {}", store.shift_count().unwrap_or(0));
        }
    }

    Ok(())
}
