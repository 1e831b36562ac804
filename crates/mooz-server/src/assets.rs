//! Static UI serving for paths no route claims.

use std::path::Path;

use tower_http::services::{ServeDir, ServeFile};
use tracing::{info, warn};

/// Serve files from `dir`, answering unknown paths with `index.html` so
/// client-side routes resolve.
///
/// Returns `None` (and logs) if `dir` is not a directory.
pub fn spa_service(dir: &Path) -> Option<ServeDir<ServeFile>> {
    if !dir.is_dir() {
        warn!(path = %dir.display(), "assets directory does not exist, skipping static file serving");
        return None;
    }
    info!(path = %dir.display(), "serving UI assets");
    Some(
        ServeDir::new(dir)
            .append_index_html_on_directories(true)
            .fallback(ServeFile::new(dir.join("index.html"))),
    )
}
