//! Mapping from remote URLs to cache paths.
//!
//! `https://host/some/path` lives at `root/https/host/some/path`. The URL
//! path is kept verbatim (no percent-decoding); a query string is appended
//! to the file name as a deterministically encoded `?q=...` component so two
//! URLs differing only in query never collide.

use std::path::{Path, PathBuf};

use hoist_util::errors::HoistError;

/// Suffix of the in-flight download file.
pub const PART_SUFFIX: &str = ".part";
/// Suffix of the cross-process lock file.
pub const LOCK_SUFFIX: &str = ".lock";
/// Suffix of the freshness-probe sidecar.
pub const LAST_CHECK_SUFFIX: &str = ".lastCheck";

/// Compute the cache path for a URL under `root`.
pub fn url_to_path(root: &Path, url: &str) -> miette::Result<PathBuf> {
    let (scheme, rest) = url.split_once("://").ok_or_else(|| HoistError::Config {
        message: format!("not an absolute URL: {url}"),
    })?;
    if scheme != "http" && scheme != "https" {
        return Err(HoistError::Config {
            message: format!("unsupported URL scheme {scheme:?} in {url}"),
        }
        .into());
    }

    let (without_query, query) = match rest.split_once('?') {
        Some((r, q)) => (r, Some(q)),
        None => (rest, None),
    };

    let mut path = root.join(scheme);
    for segment in without_query.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            continue;
        }
        path.push(segment);
    }

    if let Some(query) = query {
        let mut name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.push_str("?q=");
        name.push_str(&encode_query(query));
        path.set_file_name(name);
    }

    Ok(path)
}

/// Percent-encode a query string so the result is a safe, deterministic
/// file-name component.
fn encode_query(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for byte in query.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Path of the `.part` file for a cache path.
pub fn part_path(path: &Path) -> PathBuf {
    hoist_util::fs::sibling(path, PART_SUFFIX)
}

/// Path of the `.lock` file for a cache path.
pub fn lock_path(path: &Path) -> PathBuf {
    hoist_util::fs::sibling(path, LOCK_SUFFIX)
}

/// Path of the `.lastCheck` sidecar for a cache path.
pub fn last_check_path(path: &Path) -> PathBuf {
    hoist_util::fs::sibling(path, LAST_CHECK_SUFFIX)
}

/// Path of the checksum sidecar for a cache path and algorithm extension.
pub fn checksum_path(path: &Path, extension: &str) -> PathBuf {
    hoist_util::fs::sibling(path, &format!(".{extension}"))
}
