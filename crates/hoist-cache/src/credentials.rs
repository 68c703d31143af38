//! Repository credentials: matching rules and the line-oriented file format.
//!
//! A credentials file holds one or more labeled records:
//!
//! ```text
//! corp.host=nexus.example.com
//! corp.username=deploy
//! corp.password=hunter2
//! corp.realm=Sonatype Nexus
//! corp.https-only=true
//! corp.auto=true
//! corp.pass-on-redirect=false
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use hoist_util::errors::HoistError;

/// One credential record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Host this credential applies to (exact match, or subdomains too
    /// when `match_host` is set).
    pub host: String,
    pub username: String,
    pub password: String,
    /// When set, only requests challenged with this realm match.
    pub realm: Option<String>,
    /// Refuse to send this credential over plain HTTP.
    pub https_only: bool,
    /// Attach preemptively, before any 401 challenge.
    pub auto: bool,
    /// Keep sending the credential after a redirect to another host.
    pub pass_on_redirect: bool,
    /// Also match subdomains of `host`.
    pub match_host: bool,
}

impl Credential {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            realm: None,
            https_only: true,
            auto: true,
            pass_on_redirect: false,
            match_host: false,
        }
    }

    fn host_matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let own = self.host.to_ascii_lowercase();
        if host == own {
            return true;
        }
        self.match_host
            && host
                .strip_suffix(own.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }

    /// Whether this credential applies to a request.
    ///
    /// `realm` is the realm from a `WWW-Authenticate` challenge, if the
    /// server sent one; a credential with a configured realm only matches
    /// that realm, while a realm-less credential matches any.
    pub fn matches(&self, host: &str, https: bool, realm: Option<&str>) -> bool {
        if !self.host_matches(host) {
            return false;
        }
        if self.https_only && !https {
            return false;
        }
        match (&self.realm, realm) {
            (Some(want), Some(have)) => want == have,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// An ordered set of credentials. Matching is stable: the first record in
/// configuration order wins; `match_host` only widens a record to
/// subdomains and never reorders.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    credentials: Vec<Credential>,
}

impl CredentialStore {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// First credential matching the request, in configuration order.
    pub fn find(&self, host: &str, https: bool, realm: Option<&str>) -> Option<&Credential> {
        self.credentials
            .iter()
            .find(|c| c.matches(host, https, realm))
    }

    /// First credential to attach preemptively (before any challenge).
    pub fn find_auto(&self, host: &str, https: bool) -> Option<&Credential> {
        self.credentials
            .iter()
            .find(|c| c.auto && c.matches(host, https, None))
    }
}

/// Parse the line-oriented credentials format.
pub fn parse_credentials(input: &str) -> miette::Result<Vec<Credential>> {
    // label -> (key -> value), labels kept in first-seen order
    let mut order: Vec<String> = Vec::new();
    let mut records: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| HoistError::Config {
            message: format!("credentials line is not key=value: {line:?}"),
        })?;
        let (label, field) = key.trim().rsplit_once('.').ok_or_else(|| HoistError::Config {
            message: format!("credentials key has no label: {key:?}"),
        })?;
        if !records.contains_key(label) {
            order.push(label.to_string());
        }
        records
            .entry(label.to_string())
            .or_default()
            .insert(field.to_string(), value.trim().to_string());
    }

    let mut credentials = Vec::new();
    for label in order {
        let fields = &records[&label];
        let host = fields.get("host").cloned().ok_or_else(|| HoistError::Config {
            message: format!("credential {label:?} has no host"),
        })?;
        let mut credential = Credential::new(
            host,
            fields.get("username").cloned().unwrap_or_default(),
            fields.get("password").cloned().unwrap_or_default(),
        );
        credential.realm = fields.get("realm").cloned();
        if let Some(v) = fields.get("https-only") {
            credential.https_only = v == "true";
        }
        if let Some(v) = fields.get("auto") {
            credential.auto = v == "true";
        }
        if let Some(v) = fields.get("pass-on-redirect") {
            credential.pass_on_redirect = v == "true";
        }
        if let Some(v) = fields.get("match-host") {
            credential.match_host = v == "true";
        }
        credentials.push(credential);
    }
    Ok(credentials)
}

/// Load credentials from an inline value or a file path.
///
/// A value containing `=` is treated as inline content; anything else is
/// read as a file path.
pub fn load_credentials(value: &str) -> miette::Result<Vec<Credential>> {
    if value.contains('=') {
        parse_credentials(value)
    } else {
        let path = Path::new(value);
        let content = std::fs::read_to_string(path).map_err(|e| HoistError::Config {
            message: format!("cannot read credentials file {}: {e}", path.display()),
        })?;
        parse_credentials(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# corporate nexus
corp.host=nexus.example.com
corp.username=deploy
corp.password=hunter2
corp.realm=Sonatype Nexus
corp.https-only=true
corp.auto=true
corp.pass-on-redirect=false

lab.host=lab.example.com
lab.username=ci
lab.password=secret
lab.https-only=false
lab.match-host=true
"#;

    #[test]
    fn parse_two_records_in_order() {
        let creds = parse_credentials(SAMPLE).unwrap();
        assert_eq!(creds.len(), 2);
        assert_eq!(creds[0].host, "nexus.example.com");
        assert_eq!(creds[0].realm.as_deref(), Some("Sonatype Nexus"));
        assert!(creds[0].https_only);
        assert_eq!(creds[1].host, "lab.example.com");
        assert!(creds[1].match_host);
        assert!(!creds[1].https_only);
    }

    #[test]
    fn host_matching() {
        let creds = parse_credentials(SAMPLE).unwrap();
        let store = CredentialStore::new(creds);

        // exact host, https, matching realm
        assert!(store
            .find("nexus.example.com", true, Some("Sonatype Nexus"))
            .is_some());
        // wrong realm
        assert!(store
            .find("nexus.example.com", true, Some("Other"))
            .is_none());
        // https-only blocks plain http
        assert!(store.find("nexus.example.com", false, None).is_none());
        // subdomain only matches with match-host
        assert!(store.find("sub.lab.example.com", false, None).is_some());
        assert!(store.find("sub.nexus.example.com", true, None).is_none());
        // suffix without dot boundary must not match
        assert!(store.find("evil-lab.example.com", false, None).is_none());
    }

    #[test]
    fn first_declared_wins() {
        let creds = parse_credentials(
            "a.host=repo.example.com\na.username=first\na.password=x\na.https-only=false\n\
             b.host=repo.example.com\nb.username=second\nb.password=y\nb.https-only=false\n",
        )
        .unwrap();
        let store = CredentialStore::new(creds);
        assert_eq!(store.find("repo.example.com", true, None).unwrap().username, "first");
    }

    #[test]
    fn realm_less_credential_matches_any_realm() {
        let creds =
            parse_credentials("x.host=h.example.com\nx.username=u\nx.password=p\n").unwrap();
        let store = CredentialStore::new(creds);
        assert!(store.find("h.example.com", true, Some("Whatever")).is_some());
    }

    #[test]
    fn inline_vs_file_detection() {
        let creds = load_credentials("q.host=h.example.com\nq.username=u\nq.password=p").unwrap();
        assert_eq!(creds.len(), 1);

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("credentials.properties");
        std::fs::write(&path, "f.host=file.example.com\nf.username=u\nf.password=p\n").unwrap();
        let creds = load_credentials(path.to_str().unwrap()).unwrap();
        assert_eq!(creds[0].host, "file.example.com");
    }

    #[test]
    fn missing_host_rejected() {
        assert!(parse_credentials("x.username=u\nx.password=p\n").is_err());
    }
}
