//! Cache policies: whether and when to contact the network for a URL.

use hoist_util::errors::HoistError;

/// A rule governing network access for a fetch. Policies are evaluated in
/// the order the caller configured them; the first that yields a result
/// wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Use a local file if present; never touch the network.
    LocalOnly,
    /// Use the local file, but revalidate changing URLs whose last probe is
    /// older than the TTL.
    LocalUpdateChanging,
    /// Like `LocalUpdateChanging`, but revalidate every URL.
    LocalUpdate,
    /// Unconditional re-download.
    Update,
    /// Download only what is missing locally.
    FetchMissing,
}

impl CachePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalOnly => "local-only",
            Self::LocalUpdateChanging => "local-update-changing",
            Self::LocalUpdate => "local-update",
            Self::Update => "update",
            Self::FetchMissing => "fetch-missing",
        }
    }
}

impl std::fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The policy chain used when nothing is configured.
pub fn default_policies() -> Vec<CachePolicy> {
    vec![CachePolicy::LocalUpdateChanging, CachePolicy::FetchMissing]
}

/// Parse a comma- or space-separated cache mode expression.
///
/// Tokens: `default`, `update`, `update-changing`, `force`, `missing`,
/// `offline`. Each token expands to one or more policies; tokens
/// concatenate in order.
pub fn parse_mode(input: &str) -> miette::Result<Vec<CachePolicy>> {
    let mut policies = Vec::new();
    for token in input.split([',', ' ']).map(str::trim).filter(|t| !t.is_empty()) {
        match token {
            "default" => policies.extend(default_policies()),
            "update" => policies.push(CachePolicy::LocalUpdate),
            "update-changing" => policies.push(CachePolicy::LocalUpdateChanging),
            "force" => policies.push(CachePolicy::Update),
            "missing" => policies.push(CachePolicy::FetchMissing),
            "offline" => policies.push(CachePolicy::LocalOnly),
            other => {
                return Err(HoistError::Config {
                    message: format!("unknown cache mode {other:?}"),
                }
                .into());
            }
        }
    }
    if policies.is_empty() {
        policies = default_policies();
    }
    Ok(policies)
}
