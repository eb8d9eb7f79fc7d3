//! Home dashboard

use anyhow::Result;
use chrono::Local;

use super::CliSession;
use crate::output::Output;

/// Entries shown in each dashboard section
const DASHBOARD_ENTRIES: usize = 3;

/// Show the next shifts and the most recently updated notes
pub fn show(session: &CliSession<'_>, output: &Output) -> Result<()> {
    let signed_in = session.current_user().is_some();
    let today = Local::now().date_naive();
    let shifts = session.upcoming_shifts(today, DASHBOARD_ENTRIES);
    let notes = session.recent_notes(DASHBOARD_ENTRIES);
    output.print_home(signed_in, &shifts, &notes);
    Ok(())
}
