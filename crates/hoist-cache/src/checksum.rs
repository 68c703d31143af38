//! Artifact checksum verification against repository sidecar files.

use std::path::Path;

use hoist_util::errors::HoistError;
use hoist_util::hash;

/// Checksum algorithms, in the order repositories usually publish them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha1,
    Sha256,
    Md5,
}

impl ChecksumAlgorithm {
    /// Sidecar file extension: `lib-1.0.jar` pairs with `lib-1.0.jar.sha1`.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Md5 => "md5",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Md5 => "MD5",
        }
    }

    /// Hex digest of a file on disk.
    pub fn compute_file(&self, path: &Path) -> std::io::Result<String> {
        match self {
            Self::Sha1 => hash::sha1_file(path),
            Self::Sha256 => hash::sha256_file(path),
            Self::Md5 => {
                let data = std::fs::read(path)?;
                Ok(hash::md5_bytes(&data))
            }
        }
    }
}

/// One entry of the verification ladder: try an algorithm, or accept the
/// file without verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumOption {
    Verify(ChecksumAlgorithm),
    /// Accept the artifact even though no checksum could be fetched.
    None,
}

/// The ladder tried for each artifact when nothing else is configured.
pub fn default_ladder() -> Vec<ChecksumOption> {
    vec![
        ChecksumOption::Verify(ChecksumAlgorithm::Sha1),
        ChecksumOption::None,
    ]
}

/// Extract the hex hash from a checksum file.
///
/// Checksum files may contain just the hash, or `hash  filename`.
pub fn extract_hash(content: &str) -> String {
    content.split_whitespace().next().unwrap_or("").to_string()
}

/// Verify a file against an expected hex digest.
pub fn verify_file(
    algorithm: ChecksumAlgorithm,
    path: &Path,
    url: &str,
    expected: &str,
) -> miette::Result<()> {
    let actual = algorithm.compute_file(path).map_err(HoistError::Io)?;
    if actual.eq_ignore_ascii_case(expected) {
        tracing::debug!("{} ok for {url}", algorithm.name());
        Ok(())
    } else {
        Err(HoistError::ChecksumMismatch {
            url: url.to_string(),
            algorithm: algorithm.name().to_string(),
            expected: expected.to_string(),
            actual,
        }
        .into())
    }
}
