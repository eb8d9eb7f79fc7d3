//! Shared link command handlers

use anyhow::{anyhow, bail, Result};
use url::Url;

use flowmate_core::share::{build_share_link, share_param, share_token_from_link};
use flowmate_core::LinkOpen;

use super::CliSession;
use crate::output::Output;

/// Turn a link, `?share=` query or bare token into a page location
///
/// Full links are used as given; anything else is placed on `base`.
pub fn link_location(input: &str, base: &Url) -> Result<Url> {
    if let Ok(link) = Url::parse(input.trim()) {
        if share_param(&link).is_some() {
            return Ok(link);
        }
        bail!("Link has no share token: {}", input);
    }

    let token =
        share_token_from_link(input).ok_or_else(|| anyhow!("Not a share link: {}", input))?;
    Ok(build_share_link(base, &token))
}

async fn open_link(session: &CliSession<'_>) -> Result<()> {
    match session.open_share_link().await? {
        LinkOpen::Opened(_) => Ok(()),
        LinkOpen::NoLink | LinkOpen::AlreadyHandled => bail!("No share link to open"),
    }
}

/// Open a shared note from its link
pub async fn open(session: &CliSession<'_>, output: &Output) -> Result<()> {
    open_link(session).await?;
    let view = session
        .shared_view()
        .ok_or_else(|| anyhow!("Shared note is not available"))?;
    output.print_note_view(&view);
    Ok(())
}

/// Open a shared note and copy it into the user's notes
pub async fn copy(session: &CliSession<'_>, output: &Output) -> Result<()> {
    open_link(session).await?;
    let copied = session.copy_shared_to_my_notes().await?;
    output.print_note(&copied);
    Ok(())
}
