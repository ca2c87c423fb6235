//! Output helpers for the get command.

use std::path::{Path, PathBuf};

use fetchstack::Download;

/// File name used when a URL has no usable last path segment.
const FALLBACK_NAME: &str = "index.html";

/// File name for the `index`-th download of `url_path`.
///
/// Prefixed with the position on the command line so that URLs sharing a
/// last segment don't overwrite each other.
pub fn file_name_for(index: usize, url_path: &str) -> String {
    let name = url_path
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .unwrap_or(FALLBACK_NAME);
    format!("{:03}-{}", index, name)
}

/// Where the body of `download` is written inside `dir`.
pub fn output_path(dir: &Path, index: usize, download: &Download) -> PathBuf {
    dir.join(file_name_for(index, download.url().path()))
}

/// One-line summary of a finished download.
pub fn describe_success(download: &Download) -> String {
    let status = download
        .status_code()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "---".to_string());
    format!(
        "[{}] {:>8} bytes  {}",
        status,
        download.data().len(),
        download.url()
    )
}
