//! System browser integration for the authorization hand-off.

use perch_core::UrlOpener;
use perch_domain::{PerchError, Result};
use tracing::{debug, warn};

/// Opens URLs with the platform's default handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemUrlOpener;

impl UrlOpener for SystemUrlOpener {
    fn open(&self, url: &str) -> Result<()> {
        debug!(%url, "opening system browser");
        open::that(url).map_err(|err| {
            warn!(error = %err, "failed to open system browser");
            PerchError::Platform(format!("could not open browser: {err}"))
        })
    }
}
