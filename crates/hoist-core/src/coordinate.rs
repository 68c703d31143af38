use serde::{Deserialize, Serialize};

use crate::version::VersionConstraint;

/// The unit of version reconciliation: `organization:name` without a version.
///
/// Within a resolved graph at most one version per module survives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Module {
    pub organization: String,
    pub name: String,
}

impl Module {
    pub fn new(organization: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.organization, self.name)
    }
}

/// A fully pinned artifact version, optionally narrowed to a
/// classifier and artifact type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub module: Module,
    pub version: String,
    #[serde(default)]
    pub classifier: Option<String>,
    #[serde(default = "default_type")]
    pub type_: String,
}

fn default_type() -> String {
    "jar".to_string()
}

impl Coordinate {
    pub fn new(module: Module, version: impl Into<String>) -> Self {
        Self {
            module,
            version: version.into(),
            classifier: None,
            type_: default_type(),
        }
    }

    /// Parse `"org:name:version"` or `"org:name:version:classifier"`.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [org, name, version] => Some(Self::new(Module::new(*org, *name), *version)),
            [org, name, version, classifier] => Some(Self {
                module: Module::new(*org, *name),
                version: (*version).to_string(),
                classifier: Some((*classifier).to_string()),
                type_: default_type(),
            }),
            _ => None,
        }
    }

    /// File name of this artifact: `name-version[-classifier].<type>`.
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}-{}-{}.{}", self.module.name, self.version, c, self.type_),
            None => format!("{}-{}.{}", self.module.name, self.version, self.type_),
        }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.module, self.version)
    }
}

/// Dependency scope, including the descriptor-only `import` scope used for
/// bill-of-materials splicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Compile,
    Runtime,
    Provided,
    Test,
    System,
    Import,
}

impl Default for Scope {
    fn default() -> Self {
        Self::Compile
    }
}

impl Scope {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "compile" => Some(Self::Compile),
            "runtime" => Some(Self::Runtime),
            "provided" => Some(Self::Provided),
            "test" => Some(Self::Test),
            "system" => Some(Self::System),
            "import" => Some(Self::Import),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Runtime => "runtime",
            Self::Provided => "provided",
            Self::Test => "test",
            Self::System => "system",
            Self::Import => "import",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transitive dependency to exclude. `*` matches any whole segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Exclusion {
    pub organization: String,
    pub name: String,
}

impl Exclusion {
    pub fn new(organization: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            name: name.into(),
        }
    }

    /// Whether this exclusion pattern prunes the given module.
    pub fn matches(&self, module: &Module) -> bool {
        (self.organization == "*" || self.organization == module.organization)
            && (self.name == "*" || self.name == module.name)
    }
}

impl std::fmt::Display for Exclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.organization, self.name)
    }
}

/// Whether any exclusion in the set prunes `module`.
pub fn excluded(exclusions: &std::collections::BTreeSet<Exclusion>, module: &Module) -> bool {
    exclusions.iter().any(|e| e.matches(module))
}

/// A dependency as declared by a descriptor: a module, a version constraint,
/// a scope, and the exclusions that apply to everything reached through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub module: Module,
    pub constraint: VersionConstraint,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub classifier: Option<String>,
    #[serde(default)]
    pub type_: Option<String>,
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
}

impl Dependency {
    pub fn new(module: Module, constraint: VersionConstraint) -> Self {
        Self {
            module,
            constraint,
            scope: Scope::default(),
            optional: false,
            classifier: None,
            type_: None,
            exclusions: Vec::new(),
        }
    }

    /// Parse `"org:name:version"` shorthand with a compile scope.
    pub fn parse(s: &str) -> Option<Self> {
        let coord = Coordinate::parse(s)?;
        let constraint = VersionConstraint::parse(&coord.version);
        let mut dep = Self::new(coord.module, constraint);
        dep.classifier = coord.classifier;
        Some(dep)
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.module, self.constraint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn parse_coordinate() {
        let c = Coordinate::parse("org.example:lib:1.0").unwrap();
        assert_eq!(c.module.organization, "org.example");
        assert_eq!(c.module.name, "lib");
        assert_eq!(c.version, "1.0");
        assert_eq!(c.type_, "jar");
        assert!(c.classifier.is_none());
    }

    #[test]
    fn parse_coordinate_with_classifier() {
        let c = Coordinate::parse("org.example:lib:1.0:sources").unwrap();
        assert_eq!(c.classifier.as_deref(), Some("sources"));
        assert_eq!(c.file_name(), "lib-1.0-sources.jar");
    }

    #[test]
    fn parse_rejects_wrong_arity() {
        assert!(Coordinate::parse("org.example").is_none());
        assert!(Coordinate::parse("a:b:c:d:e:f").is_none());
    }

    #[test]
    fn exclusion_wildcards() {
        let module = Module::new("commons-logging", "commons-logging");
        assert!(Exclusion::new("commons-logging", "commons-logging").matches(&module));
        assert!(Exclusion::new("commons-logging", "*").matches(&module));
        assert!(Exclusion::new("*", "*").matches(&module));
        assert!(!Exclusion::new("commons-logging", "other").matches(&module));
        assert!(!Exclusion::new("org.else", "*").matches(&module));
    }

    #[test]
    fn excluded_checks_whole_set() {
        let mut set = BTreeSet::new();
        set.insert(Exclusion::new("org.a", "*"));
        set.insert(Exclusion::new("org.b", "lib"));
        assert!(excluded(&set, &Module::new("org.a", "anything")));
        assert!(excluded(&set, &Module::new("org.b", "lib")));
        assert!(!excluded(&set, &Module::new("org.b", "other")));
    }

    #[test]
    fn scope_round_trip() {
        for s in ["compile", "runtime", "provided", "test", "system", "import"] {
            assert_eq!(Scope::parse(s).unwrap().as_str(), s);
        }
        assert!(Scope::parse("ksp").is_none());
    }
}
