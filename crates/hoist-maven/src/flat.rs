//! The flat descriptor dialect: a line-oriented key/value header followed by
//! explicit dependency sections.
//!
//! ```text
//! organization=org.example
//! name=app
//! version=1.0
//! parent=org.example:parent:2.0
//! property.coroutines.version=1.8.0
//!
//! [dependencies]
//! org.a:a:1.0 scope=runtime optional exclude=org.x:*
//! org.b:b:${coroutines.version}
//! com.example:native-lib:2.0:linux
//!
//! [dependencyManagement]
//! com.google.guava:guava:32.0.0-jre
//! org.springframework:spring-bom:6.0.0::pom scope=import
//! ```
//!
//! `#` starts a comment. Dependency lines are a coordinate of the form
//! `org:name:version[:classifier[:type]]` plus optional space-separated
//! attributes (`scope=`, `optional`, repeatable `exclude=org:name`). An
//! empty classifier segment carries a type without a classifier.

use hoist_core::coordinate::Exclusion;
use hoist_util::errors::HoistError;

use crate::project::{DeclaredDependency, ParentRef, Project};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Dependencies,
    DependencyManagement,
}

/// Parse a flat descriptor.
pub fn parse_flat(input: &str) -> miette::Result<Project> {
    let mut project = Project::default();
    let mut section = Section::Header;
    let mut offset = 0usize;

    for line in input.split('\n') {
        let line_offset = offset;
        offset += line.len() + 1;

        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = match name {
                "dependencies" => Section::Dependencies,
                "dependencyManagement" => Section::DependencyManagement,
                other => {
                    return Err(HoistError::Parse {
                        offset: line_offset,
                        message: format!("unknown section [{other}]"),
                    }
                    .into());
                }
            };
            continue;
        }

        match section {
            Section::Header => parse_header_line(&mut project, line, line_offset)?,
            Section::Dependencies => {
                let dep = parse_dependency_line(line, line_offset)?;
                project.dependencies.push(dep);
            }
            Section::DependencyManagement => {
                let dep = parse_dependency_line(line, line_offset)?;
                project.dependency_management.push(dep);
            }
        }
    }

    Ok(project)
}

fn parse_header_line(project: &mut Project, line: &str, offset: usize) -> miette::Result<()> {
    let Some((key, value)) = line.split_once('=') else {
        return Err(HoistError::Parse {
            offset,
            message: format!("expected key=value, got {line:?}"),
        }
        .into());
    };
    let key = key.trim();
    let value = value.trim().to_string();

    match key {
        "organization" => project.organization = Some(value),
        "name" => project.name = Some(value),
        "version" => project.version = Some(value),
        "packaging" => project.packaging = Some(value),
        "parent" => {
            let parts: Vec<&str> = value.split(':').collect();
            let [org, name, version] = parts.as_slice() else {
                return Err(HoistError::Parse {
                    offset,
                    message: format!("parent must be org:name:version, got {value:?}"),
                }
                .into());
            };
            project.parent = Some(ParentRef {
                organization: (*org).to_string(),
                name: (*name).to_string(),
                version: (*version).to_string(),
            });
        }
        _ => {
            if let Some(prop) = key.strip_prefix("property.") {
                project.properties.insert(prop.to_string(), value);
            } else {
                return Err(HoistError::Parse {
                    offset,
                    message: format!("unknown header key {key:?}"),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn parse_dependency_line(line: &str, offset: usize) -> miette::Result<DeclaredDependency> {
    let mut fields = line.split_whitespace();
    let coordinate = fields.next().ok_or_else(|| HoistError::Parse {
        offset,
        message: "empty dependency line".to_string(),
    })?;

    let parts: Vec<&str> = coordinate.split(':').collect();
    let mut dep = match parts.as_slice() {
        [org, name] => DeclaredDependency {
            organization: (*org).to_string(),
            name: (*name).to_string(),
            ..Default::default()
        },
        [org, name, version] => DeclaredDependency {
            organization: (*org).to_string(),
            name: (*name).to_string(),
            version: Some((*version).to_string()),
            ..Default::default()
        },
        [org, name, version, classifier] => DeclaredDependency {
            organization: (*org).to_string(),
            name: (*name).to_string(),
            version: Some((*version).to_string()),
            classifier: non_empty(classifier),
            ..Default::default()
        },
        [org, name, version, classifier, type_] => DeclaredDependency {
            organization: (*org).to_string(),
            name: (*name).to_string(),
            version: Some((*version).to_string()),
            classifier: non_empty(classifier),
            type_: non_empty(type_),
            ..Default::default()
        },
        _ => {
            return Err(HoistError::Parse {
                offset,
                message: format!(
                    "expected org:name[:version[:classifier[:type]]], got {coordinate:?}"
                ),
            }
            .into());
        }
    };

    for field in fields {
        if field == "optional" {
            dep.optional = true;
            continue;
        }
        let Some((key, value)) = field.split_once('=') else {
            return Err(HoistError::Parse {
                offset,
                message: format!("unknown dependency attribute {field:?}"),
            }
            .into());
        };
        match key {
            "scope" => dep.scope = Some(value.to_string()),
            "exclude" => {
                let (org, name) = value.split_once(':').ok_or_else(|| HoistError::Parse {
                    offset,
                    message: format!("exclude must be org:name, got {value:?}"),
                })?;
                dep.exclusions.push(Exclusion::new(org, name));
            }
            _ => {
                return Err(HoistError::Parse {
                    offset,
                    message: format!("unknown dependency attribute {key:?}"),
                }
                .into());
            }
        }
    }

    Ok(dep)
}

fn non_empty(segment: &str) -> Option<String> {
    if segment.is_empty() {
        None
    } else {
        Some(segment.to_string())
    }
}

/// Serialize the canonical subset of a descriptor in the flat dialect.
pub fn serialize_flat(project: &Project) -> String {
    let mut out = String::new();

    if let Some(ref v) = project.organization {
        out.push_str(&format!("organization={v}\n"));
    }
    if let Some(ref v) = project.name {
        out.push_str(&format!("name={v}\n"));
    }
    if let Some(ref v) = project.version {
        out.push_str(&format!("version={v}\n"));
    }
    if let Some(ref v) = project.packaging {
        out.push_str(&format!("packaging={v}\n"));
    }
    if let Some(ref p) = project.parent {
        out.push_str(&format!("parent={}:{}:{}\n", p.organization, p.name, p.version));
    }
    for (k, v) in &project.properties {
        out.push_str(&format!("property.{k}={v}\n"));
    }

    if !project.dependencies.is_empty() {
        out.push_str("\n[dependencies]\n");
        for dep in &project.dependencies {
            serialize_dependency_line(&mut out, dep);
        }
    }
    if !project.dependency_management.is_empty() {
        out.push_str("\n[dependencyManagement]\n");
        for dep in &project.dependency_management {
            serialize_dependency_line(&mut out, dep);
        }
    }

    out
}

fn serialize_dependency_line(out: &mut String, dep: &DeclaredDependency) {
    out.push_str(&dep.organization);
    out.push(':');
    out.push_str(&dep.name);
    if let Some(ref v) = dep.version {
        out.push(':');
        out.push_str(v);
        // classifier and type ride in the coordinate; an empty classifier
        // segment carries a type alone
        if dep.classifier.is_some() || dep.type_.is_some() {
            out.push(':');
            out.push_str(dep.classifier.as_deref().unwrap_or(""));
        }
        if let Some(ref t) = dep.type_ {
            out.push(':');
            out.push_str(t);
        }
    }
    if let Some(ref s) = dep.scope {
        out.push_str(&format!(" scope={s}"));
    }
    if dep.optional {
        out.push_str(" optional");
    }
    for excl in &dep.exclusions {
        out.push_str(&format!(" exclude={}:{}", excl.organization, excl.name));
    }
    out.push('\n');
}
