//! Project descriptor parsing: dependency declarations, dependency
//! management, parent references, profiles, and property interpolation.

use std::collections::BTreeMap;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use hoist_core::coordinate::{Dependency, Exclusion, Module, Scope};
use hoist_core::version::VersionConstraint;
use hoist_util::errors::{HoistError, HoistResult};

/// A parsed project descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Project {
    pub organization: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub packaging: Option<String>,

    pub parent: Option<ParentRef>,
    pub properties: BTreeMap<String, String>,
    pub dependencies: Vec<DeclaredDependency>,
    pub dependency_management: Vec<DeclaredDependency>,
    pub profiles: Vec<Profile>,

    /// Elements the parser does not model, kept verbatim for debugging.
    pub opaque: Vec<OpaqueElement>,
}

/// Reference to a parent descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParentRef {
    pub organization: String,
    pub name: String,
    pub version: String,
}

impl ParentRef {
    pub fn module(&self) -> Module {
        Module::new(self.organization.clone(), self.name.clone())
    }
}

/// A dependency as written in a descriptor, before property substitution
/// and dependency-management overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclaredDependency {
    pub organization: String,
    pub name: String,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub optional: bool,
    pub classifier: Option<String>,
    pub type_: Option<String>,
    pub exclusions: Vec<Exclusion>,
}

impl DeclaredDependency {
    pub fn module(&self) -> Module {
        Module::new(self.organization.clone(), self.name.clone())
    }

    /// Convert to a resolved-model dependency once an effective version
    /// is known.
    pub fn to_dependency(&self, version: &str) -> Dependency {
        Dependency {
            module: self.module(),
            constraint: VersionConstraint::parse(version),
            scope: self
                .scope
                .as_deref()
                .and_then(Scope::parse)
                .unwrap_or_default(),
            optional: self.optional,
            classifier: self.classifier.clone(),
            type_: self.type_.clone(),
            exclusions: self.exclusions.clone(),
        }
    }
}

/// An element the parser does not understand, retained verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueElement {
    pub name: String,
    pub body: String,
}

/// An activation-gated descriptor fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub id: Option<String>,
    pub activation: Activation,
    pub properties: BTreeMap<String, String>,
    pub dependencies: Vec<DeclaredDependency>,
    pub dependency_management: Vec<DeclaredDependency>,
}

/// Conditions under which a profile applies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activation {
    pub active_by_default: bool,
    pub property: Option<PropertyTrigger>,
    pub file_exists: Option<String>,
    pub file_missing: Option<String>,
    pub os_name: Option<String>,
    pub jdk: Option<String>,
}

/// A property-presence trigger. A leading `!` on the name inverts it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyTrigger {
    pub name: String,
    pub value: Option<String>,
}

/// The environment profiles are evaluated against.
#[derive(Debug, Clone)]
pub struct ActivationContext {
    pub properties: BTreeMap<String, String>,
    pub os_name: String,
    pub jdk: Option<String>,
}

impl Default for ActivationContext {
    fn default() -> Self {
        Self {
            properties: BTreeMap::new(),
            os_name: std::env::consts::OS.to_string(),
            jdk: None,
        }
    }
}

impl Activation {
    /// Whether this activation holds in the given context. All configured
    /// conditions must hold; a profile with no conditions never activates
    /// unless `active_by_default` is set.
    pub fn is_active(&self, ctx: &ActivationContext) -> bool {
        let mut any = false;

        if let Some(ref trigger) = self.property {
            any = true;
            let (negated, name) = match trigger.name.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, trigger.name.as_str()),
            };
            let holds = match (&trigger.value, ctx.properties.get(name)) {
                (Some(want), Some(have)) => want == have,
                (Some(_), None) => false,
                (None, present) => present.is_some(),
            };
            if holds == negated {
                return false;
            }
        }
        if let Some(ref path) = self.file_exists {
            any = true;
            if !Path::new(path).exists() {
                return false;
            }
        }
        if let Some(ref path) = self.file_missing {
            any = true;
            if Path::new(path).exists() {
                return false;
            }
        }
        if let Some(ref os) = self.os_name {
            any = true;
            if !os.eq_ignore_ascii_case(&ctx.os_name) {
                return false;
            }
        }
        if let Some(ref jdk) = self.jdk {
            any = true;
            match &ctx.jdk {
                Some(have) => {
                    if !have.starts_with(jdk.as_str()) {
                        return false;
                    }
                }
                None => return false,
            }
        }

        any || self.active_by_default
    }
}

impl Project {
    /// Effective organization (falls back to parent).
    pub fn effective_organization(&self) -> Option<&str> {
        self.organization
            .as_deref()
            .or(self.parent.as_ref().map(|p| p.organization.as_str()))
    }

    /// Effective version (falls back to parent).
    pub fn effective_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .or(self.parent.as_ref().map(|p| p.version.as_str()))
    }

    pub fn module(&self) -> Option<Module> {
        Some(Module::new(
            self.effective_organization()?.to_string(),
            self.name.clone()?,
        ))
    }

    /// Resolve `${property}` references in a string using descriptor
    /// properties, built-in project variables, and the environment.
    ///
    /// Unresolvable references are left in place; self-referential chains
    /// fail with a property-cycle error.
    pub fn interpolate(&self, input: &str) -> HoistResult<String> {
        let mut stack = Vec::new();
        self.expand(input, &mut stack)
    }

    fn expand(&self, input: &str, stack: &mut Vec<String>) -> HoistResult<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                // Unterminated reference, keep verbatim
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let key = &after[..end];
            if stack.iter().any(|k| k == key) {
                return Err(HoistError::PropertyCycle {
                    property: key.to_string(),
                }
                .into());
            }
            match self.lookup_property(key) {
                Some(value) => {
                    stack.push(key.to_string());
                    let expanded = self.expand(&value, stack)?;
                    stack.pop();
                    out.push_str(&expanded);
                }
                None => {
                    out.push_str("${");
                    out.push_str(key);
                    out.push('}');
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn lookup_property(&self, key: &str) -> Option<String> {
        match key {
            "project.groupId" | "pom.groupId" => {
                self.effective_organization().map(|s| s.to_string())
            }
            "project.artifactId" | "pom.artifactId" => self.name.clone(),
            "project.version" | "pom.version" => self.effective_version().map(|s| s.to_string()),
            "project.packaging" | "pom.packaging" => self.packaging.clone(),
            "project.parent.groupId" => self.parent.as_ref().map(|p| p.organization.clone()),
            "project.parent.version" => self.parent.as_ref().map(|p| p.version.clone()),
            _ => {
                if let Some(value) = self.properties.get(key) {
                    return Some(value.clone());
                }
                if let Some(env_key) = key.strip_prefix("env.") {
                    return std::env::var(env_key).ok();
                }
                std::env::var(key).ok()
            }
        }
    }

    /// Interpolate property references in dependencies and dependency
    /// management. Call after parent inheritance and profile activation.
    pub fn resolve_properties(&mut self) -> HoistResult<()> {
        let snapshot = self.clone();
        for dep in self
            .dependencies
            .iter_mut()
            .chain(self.dependency_management.iter_mut())
        {
            dep.organization = snapshot.interpolate(&dep.organization)?;
            dep.name = snapshot.interpolate(&dep.name)?;
            if let Some(ref v) = dep.version {
                dep.version = Some(snapshot.interpolate(v)?);
            }
        }
        Ok(())
    }

    /// Merge a parent descriptor's properties, dependencies, and dependency
    /// management into this one.
    pub fn apply_parent(&mut self, parent: &Project) {
        for (k, v) in &parent.properties {
            self.properties
                .entry(k.clone())
                .or_insert_with(|| v.clone());
        }
        if self.organization.is_none() {
            self.organization = parent.effective_organization().map(|s| s.to_string());
        }
        if self.version.is_none() {
            self.version = parent.effective_version().map(|s| s.to_string());
        }
        for dep in &parent.dependencies {
            let dominated = self
                .dependencies
                .iter()
                .any(|d| d.organization == dep.organization && d.name == dep.name);
            if !dominated {
                self.dependencies.push(dep.clone());
            }
        }
        for dm in &parent.dependency_management {
            let dominated = self
                .dependency_management
                .iter()
                .any(|d| d.organization == dm.organization && d.name == dm.name);
            if !dominated {
                self.dependency_management.push(dm.clone());
            }
        }
    }

    /// Merge the bodies of all profiles active in `ctx` as if they were
    /// declared directly in the descriptor. Call once, before property
    /// substitution.
    pub fn activate_profiles(&mut self, ctx: &ActivationContext) -> Vec<String> {
        let profiles = std::mem::take(&mut self.profiles);
        let mut activated = Vec::new();
        for profile in &profiles {
            if !profile.activation.is_active(ctx) {
                continue;
            }
            activated.push(profile.id.clone().unwrap_or_else(|| "<anonymous>".into()));
            for (k, v) in &profile.properties {
                self.properties.insert(k.clone(), v.clone());
            }
            self.dependencies.extend(profile.dependencies.iter().cloned());
            for dm in &profile.dependency_management {
                let dominated = self
                    .dependency_management
                    .iter()
                    .any(|d| d.organization == dm.organization && d.name == dm.name);
                if !dominated {
                    self.dependency_management.push(dm.clone());
                }
            }
        }
        self.profiles = profiles;
        activated
    }

    /// Look up a dependency-management entry for a module.
    pub fn managed_entry(&self, module: &Module) -> Option<&DeclaredDependency> {
        self.dependency_management
            .iter()
            .find(|d| d.organization == module.organization && d.name == module.name)
    }

    /// Look up a managed version for a module.
    pub fn managed_version(&self, module: &Module) -> Option<&str> {
        self.managed_entry(module).and_then(|d| d.version.as_deref())
    }

    /// Bill-of-materials imports: dependency-management entries with
    /// `scope = "import"` and a descriptor packaging type. The imported
    /// artifact contributes only its dependency management and is not
    /// itself added as a dependency.
    pub fn bom_imports(&self) -> Vec<&DeclaredDependency> {
        self.dependency_management
            .iter()
            .filter(|d| {
                d.scope.as_deref() == Some("import") && d.type_.as_deref().unwrap_or("jar") == "pom"
            })
            .collect()
    }
}

/// Top-level elements the parser understands; everything else is opaque.
const KNOWN_ELEMENTS: &[&str] = &[
    "modelVersion",
    "groupId",
    "artifactId",
    "version",
    "packaging",
    "parent",
    "properties",
    "dependencies",
    "dependencyManagement",
    "profiles",
];

/// Parse an XML project descriptor.
pub fn parse_project(xml: &str) -> miette::Result<Project> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut project = Project::default();
    let mut path: Vec<String> = Vec::new();
    let mut text_buf = String::new();

    // Accumulators for nested elements
    let mut current_dep: Option<DeclaredDependency> = None;
    let mut current_exclusion: Option<(String, Option<String>)> = None;
    let mut current_parent: Option<ParentRef> = None;
    let mut current_profile: Option<Profile> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();

                // Unknown top-level elements are swallowed whole and retained
                if path.len() == 1 && path[0] == "project" && !KNOWN_ELEMENTS.contains(&tag.as_str())
                {
                    let end = e.to_end().into_owned();
                    let body = reader.read_text(end.name()).map_err(|err| HoistError::Parse {
                        offset: reader.buffer_position() as usize,
                        message: format!("unreadable <{tag}> element: {err}"),
                    })?;
                    project.opaque.push(OpaqueElement {
                        name: tag,
                        body: body.trim().to_string(),
                    });
                    continue;
                }

                path.push(tag);
                text_buf.clear();

                let ctx = path_context(&path);
                match ctx.as_str() {
                    _ if ctx.ends_with(">dependencies>dependency") => {
                        current_dep = Some(DeclaredDependency::default());
                    }
                    _ if ctx.ends_with(">exclusions>exclusion") && current_dep.is_some() => {
                        current_exclusion = Some((String::new(), None));
                    }
                    "project>parent" => {
                        current_parent = Some(ParentRef::default());
                    }
                    "project>profiles>profile" => {
                        current_profile = Some(Profile::default());
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                text_buf = e.unescape().unwrap_or_default().to_string();
            }
            Ok(Event::End(_)) => {
                let ctx = path_context(&path);
                let last = path.last().map(|s| s.as_str()).unwrap_or_default();

                // <properties> children, in the project or in a profile
                if path.len() >= 2 && path[path.len() - 2] == "properties" {
                    let target = match current_profile {
                        Some(ref mut profile) => &mut profile.properties,
                        None => &mut project.properties,
                    };
                    target.insert(last.to_string(), text_buf.clone());
                }

                // Dependency fields and exclusions
                if let Some(ref mut dep) = current_dep {
                    if let Some(ref mut excl) = current_exclusion {
                        match last {
                            "groupId" => excl.0 = text_buf.clone(),
                            "artifactId" => excl.1 = Some(text_buf.clone()),
                            _ => {}
                        }
                        if ctx.ends_with(">exclusions>exclusion") {
                            let (org, name) = current_exclusion.take().unwrap();
                            dep.exclusions
                                .push(Exclusion::new(org, name.unwrap_or_else(|| "*".into())));
                        }
                    } else {
                        match last {
                            "groupId" if ctx.ends_with(">dependency>groupId") => {
                                dep.organization = text_buf.clone();
                            }
                            "artifactId" if ctx.ends_with(">dependency>artifactId") => {
                                dep.name = text_buf.clone();
                            }
                            "version" if ctx.ends_with(">dependency>version") => {
                                dep.version = Some(text_buf.clone());
                            }
                            "scope" if ctx.ends_with(">dependency>scope") => {
                                dep.scope = Some(text_buf.clone());
                            }
                            "optional" if ctx.ends_with(">dependency>optional") => {
                                dep.optional = text_buf.trim() == "true";
                            }
                            "classifier" if ctx.ends_with(">dependency>classifier") => {
                                dep.classifier = Some(text_buf.clone());
                            }
                            "type" if ctx.ends_with(">dependency>type") => {
                                dep.type_ = Some(text_buf.clone());
                            }
                            _ => {}
                        }
                    }

                    if ctx.ends_with(">dependencies>dependency") {
                        let dep = current_dep.take().unwrap();
                        let managed = ctx.contains("dependencyManagement");
                        let target = match current_profile {
                            Some(ref mut profile) if managed => &mut profile.dependency_management,
                            Some(ref mut profile) => &mut profile.dependencies,
                            None if managed => &mut project.dependency_management,
                            None => &mut project.dependencies,
                        };
                        target.push(dep);
                    }
                }

                // Parent fields
                if let Some(ref mut parent) = current_parent {
                    match ctx.as_str() {
                        "project>parent>groupId" => parent.organization = text_buf.clone(),
                        "project>parent>artifactId" => parent.name = text_buf.clone(),
                        "project>parent>version" => parent.version = text_buf.clone(),
                        "project>parent" => project.parent = current_parent.take(),
                        _ => {}
                    }
                }

                // Profile id and activation
                if let Some(ref mut profile) = current_profile {
                    match ctx.as_str() {
                        "project>profiles>profile>id" => profile.id = Some(text_buf.clone()),
                        "project>profiles>profile>activation>activeByDefault" => {
                            profile.activation.active_by_default = text_buf.trim() == "true";
                        }
                        "project>profiles>profile>activation>property>name" => {
                            profile
                                .activation
                                .property
                                .get_or_insert_with(PropertyTrigger::default)
                                .name = text_buf.clone();
                        }
                        "project>profiles>profile>activation>property>value" => {
                            profile
                                .activation
                                .property
                                .get_or_insert_with(PropertyTrigger::default)
                                .value = Some(text_buf.clone());
                        }
                        "project>profiles>profile>activation>file>exists" => {
                            profile.activation.file_exists = Some(text_buf.clone());
                        }
                        "project>profiles>profile>activation>file>missing" => {
                            profile.activation.file_missing = Some(text_buf.clone());
                        }
                        "project>profiles>profile>activation>os>name" => {
                            profile.activation.os_name = Some(text_buf.clone());
                        }
                        "project>profiles>profile>activation>jdk" => {
                            profile.activation.jdk = Some(text_buf.clone());
                        }
                        "project>profiles>profile" => {
                            project.profiles.push(current_profile.take().unwrap());
                        }
                        _ => {}
                    }
                }

                // Top-level project fields
                if path.len() == 2 && current_dep.is_none() && current_profile.is_none() {
                    match last {
                        "groupId" => project.organization = Some(text_buf.clone()),
                        "artifactId" => project.name = Some(text_buf.clone()),
                        "version" => project.version = Some(text_buf.clone()),
                        "packaging" => project.packaging = Some(text_buf.clone()),
                        _ => {}
                    }
                }

                path.pop();
                text_buf.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(HoistError::Parse {
                    offset: reader.buffer_position() as usize,
                    message: format!("malformed descriptor: {e}"),
                }
                .into());
            }
            _ => {}
        }
    }

    Ok(project)
}

/// Build a context string from the current XML path for matching.
fn path_context(path: &[String]) -> String {
    path.join(">")
}

/// Serialize the canonical subset of a descriptor back to XML.
///
/// Profiles and opaque elements are not emitted; for descriptors without
/// them, `parse_project(serialize_project(p))` reproduces `p`.
pub fn serialize_project(project: &Project) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<project>\n");

    if let Some(ref parent) = project.parent {
        out.push_str("  <parent>\n");
        push_tag(&mut out, 4, "groupId", &parent.organization);
        push_tag(&mut out, 4, "artifactId", &parent.name);
        push_tag(&mut out, 4, "version", &parent.version);
        out.push_str("  </parent>\n");
    }
    if let Some(ref v) = project.organization {
        push_tag(&mut out, 2, "groupId", v);
    }
    if let Some(ref v) = project.name {
        push_tag(&mut out, 2, "artifactId", v);
    }
    if let Some(ref v) = project.version {
        push_tag(&mut out, 2, "version", v);
    }
    if let Some(ref v) = project.packaging {
        push_tag(&mut out, 2, "packaging", v);
    }

    if !project.properties.is_empty() {
        out.push_str("  <properties>\n");
        for (k, v) in &project.properties {
            push_tag(&mut out, 4, k, v);
        }
        out.push_str("  </properties>\n");
    }

    if !project.dependencies.is_empty() {
        out.push_str("  <dependencies>\n");
        for dep in &project.dependencies {
            serialize_dependency(&mut out, dep, 4);
        }
        out.push_str("  </dependencies>\n");
    }

    if !project.dependency_management.is_empty() {
        out.push_str("  <dependencyManagement>\n    <dependencies>\n");
        for dep in &project.dependency_management {
            serialize_dependency(&mut out, dep, 6);
        }
        out.push_str("    </dependencies>\n  </dependencyManagement>\n");
    }

    out.push_str("</project>\n");
    out
}

fn serialize_dependency(out: &mut String, dep: &DeclaredDependency, indent: usize) {
    let pad = " ".repeat(indent);
    out.push_str(&format!("{pad}<dependency>\n"));
    push_tag(out, indent + 2, "groupId", &dep.organization);
    push_tag(out, indent + 2, "artifactId", &dep.name);
    if let Some(ref v) = dep.version {
        push_tag(out, indent + 2, "version", v);
    }
    if let Some(ref v) = dep.classifier {
        push_tag(out, indent + 2, "classifier", v);
    }
    if let Some(ref v) = dep.type_ {
        push_tag(out, indent + 2, "type", v);
    }
    if let Some(ref v) = dep.scope {
        push_tag(out, indent + 2, "scope", v);
    }
    if dep.optional {
        push_tag(out, indent + 2, "optional", "true");
    }
    if !dep.exclusions.is_empty() {
        out.push_str(&format!("{pad}  <exclusions>\n"));
        for excl in &dep.exclusions {
            out.push_str(&format!("{pad}    <exclusion>\n"));
            push_tag(out, indent + 6, "groupId", &excl.organization);
            push_tag(out, indent + 6, "artifactId", &excl.name);
            out.push_str(&format!("{pad}    </exclusion>\n"));
        }
        out.push_str(&format!("{pad}  </exclusions>\n"));
    }
    out.push_str(&format!("{pad}</dependency>\n"));
}

fn push_tag(out: &mut String, indent: usize, tag: &str, value: &str) {
    let pad = " ".repeat(indent);
    out.push_str(&format!("{pad}<{tag}>{}</{tag}>\n", escape_text(value)));
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
