//! Repository abstraction: URL layout, descriptor dialects, changing flag.

use hoist_core::coordinate::Coordinate;

/// Maven Central base URL.
pub const MAVEN_CENTRAL_URL: &str = "https://repo.maven.apache.org/maven2";

/// Descriptor dialect served by a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// XML project descriptors (`.pom`).
    Xml,
    /// Flat key/value descriptors (`.deps`).
    Flat,
}

impl Dialect {
    /// File extension of descriptors in this dialect.
    pub fn extension(&self) -> &'static str {
        match self {
            Dialect::Xml => "pom",
            Dialect::Flat => "deps",
        }
    }
}

/// A configured repository. Credentials are matched by host at fetch time,
/// not attached here.
#[derive(Debug, Clone)]
pub struct Repository {
    pub name: String,
    pub url: String,
    pub dialect: Dialect,
    /// Whether artifacts served here may change in place (snapshots).
    /// Changing URLs are subject to TTL-based revalidation.
    pub changing: bool,
}

impl Repository {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into().trim_end_matches('/').to_string(),
            dialect: Dialect::Xml,
            changing: false,
        }
    }

    /// Construct the default Maven Central repository.
    pub fn maven_central() -> Self {
        Self::new("maven-central", MAVEN_CENTRAL_URL)
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_changing(mut self, changing: bool) -> Self {
        self.changing = changing;
        self
    }

    /// Standard layout path for a coordinate directory.
    ///
    /// `org.jetbrains.kotlinx:kotlinx-coroutines-core:1.8.0` becomes
    /// `org/jetbrains/kotlinx/kotlinx-coroutines-core/1.8.0`
    pub fn coordinate_path(organization: &str, name: &str, version: &str) -> String {
        format!("{}/{}/{}", organization.replace('.', "/"), name, version)
    }

    /// Full URL to a specific file within the repository.
    pub fn file_url(&self, organization: &str, name: &str, version: &str, filename: &str) -> String {
        format!(
            "{}/{}/{}",
            self.url,
            Self::coordinate_path(organization, name, version),
            filename
        )
    }

    /// URL of the descriptor for a coordinate, in this repository's dialect.
    pub fn descriptor_url(&self, coordinate: &Coordinate) -> String {
        let filename = format!(
            "{}-{}.{}",
            coordinate.module.name,
            coordinate.version,
            self.dialect.extension()
        );
        self.file_url(
            &coordinate.module.organization,
            &coordinate.module.name,
            &coordinate.version,
            &filename,
        )
    }

    /// URL of the artifact file for a coordinate (classifier and type
    /// come from the coordinate itself).
    pub fn artifact_url(&self, coordinate: &Coordinate) -> String {
        self.file_url(
            &coordinate.module.organization,
            &coordinate.module.name,
            &coordinate.version,
            &coordinate.file_name(),
        )
    }

    /// URL of the artifact-level `maven-metadata.xml` (version listing).
    pub fn version_listing_url(&self, organization: &str, name: &str) -> String {
        format!(
            "{}/{}/{}/maven-metadata.xml",
            self.url,
            organization.replace('.', "/"),
            name
        )
    }

    /// URL of the version-level `maven-metadata.xml` (snapshot timestamps).
    pub fn snapshot_metadata_url(&self, organization: &str, name: &str, version: &str) -> String {
        format!(
            "{}/{}/maven-metadata.xml",
            self.url,
            Self::coordinate_path(organization, name, version)
        )
    }

    /// Whether a given version should be treated as changing in this repo.
    pub fn is_changing(&self, version: &str) -> bool {
        self.changing || version.ends_with("-SNAPSHOT")
    }
}
