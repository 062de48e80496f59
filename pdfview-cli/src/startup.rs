use pdfview_core::DocumentSession;
use tracing::{debug, warn};

/// Applies `--password` and `--page` to a freshly loaded document. Neither
/// option can stop the viewer from starting; a problem comes back as a
/// notice for the status line.
pub fn apply_startup_options(
    session: &mut DocumentSession,
    password: Option<&str>,
    page: Option<usize>,
) -> Option<String> {
    let mut notice = None;

    if let Some(password) = password {
        if session.state().is_encrypted {
            if let Err(err) = session.attempt_decrypt(password) {
                warn!(%err, "startup password did not unlock the document");
                notice = Some(err.to_string());
            }
        } else {
            debug!("document is not encrypted, password ignored");
        }
    }

    if let Some(page) = page {
        if session.state().is_encrypted {
            debug!(page, "document is locked, start page ignored");
            notice.get_or_insert_with(|| format!("unlock the document to go to page {page}"));
        } else if let Err(err) = session.goto_page(page) {
            warn!(%err, "start page ignored");
            notice = Some(err.to_string());
        }
    }

    notice
}
