//! Surfacing the authorization URL to the user
//!
//! Opening a browser is a side effect outside the flow's correctness: the
//! `Authenticator` only needs the URL handed to something that shows it.
//! Embedders (and tests) supply their own `BrowserLauncher`.

use tracing::{info, warn};

/// Something that can present the authorization URL to the user.
pub trait BrowserLauncher: Send + Sync {
    /// Called once per login attempt, after the callback listener is bound.
    fn open(&self, url: &str);
}

/// Opens the system default browser, printing the URL when none can be launched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) {
        match open::that_detached(url) {
            Ok(()) => info!("opened authorization page in the default browser"),
            Err(e) => {
                warn!(error = %e, "could not launch a browser, printing the authorization URL");
                println!("Open this URL in a browser to log in to Spotify:\n{url}");
            }
        }
    }
}
