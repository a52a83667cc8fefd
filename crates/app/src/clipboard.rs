use arboard::Clipboard;
use hotprompt_core::LlmSession;
use snafu::{ResultExt, Whatever};

/// Text the result view would copy: the latest answer, unless it is blank.
pub fn text_to_copy(session: &LlmSession) -> Option<&str> {
    session
        .latest_response()
        .filter(|text| !text.trim().is_empty())
}

/// Opens the clipboard per call so no display connection outlives the copy.
pub fn copy_to_clipboard(text: &str) -> Result<(), Whatever> {
    let mut clipboard = Clipboard::new().whatever_context("failed to access clipboard")?;
    clipboard
        .set_text(text)
        .whatever_context("failed to set clipboard text")?;
    Ok(())
}
