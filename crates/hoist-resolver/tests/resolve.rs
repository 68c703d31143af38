//! Resolution scenarios against a pre-seeded offline cache: descriptors are
//! written at their cache paths up front and the cache runs in local-only
//! mode, so no test touches the network.

use std::collections::BTreeMap;

use hoist_cache::{Cache, CacheConfig, CachePolicy};
use hoist_core::coordinate::{Dependency, Exclusion, Module, Scope};
use hoist_maven::project::{
    serialize_project, ActivationContext, DeclaredDependency, ParentRef, Project,
};
use hoist_maven::repository::{Dialect, Repository};
use hoist_resolver::resolver::{resolve, ResolveOptions, Resolution};

const REPO_URL: &str = "https://repo.test/maven";

fn offline_cache(root: &std::path::Path) -> Cache {
    Cache::new(CacheConfig {
        root: root.to_path_buf(),
        policies: vec![CachePolicy::LocalOnly],
        ..Default::default()
    })
    .unwrap()
}

fn repo() -> Repository {
    Repository::new("test", REPO_URL)
}

/// A small builder for descriptor fixtures.
struct Fixture {
    project: Project,
}

impl Fixture {
    fn new(org: &str, name: &str, version: &str) -> Self {
        Self {
            project: Project {
                organization: Some(org.to_string()),
                name: Some(name.to_string()),
                version: Some(version.to_string()),
                ..Default::default()
            },
        }
    }

    fn dep(mut self, org: &str, name: &str, version: &str) -> Self {
        self.project.dependencies.push(DeclaredDependency {
            organization: org.to_string(),
            name: name.to_string(),
            version: Some(version.to_string()),
            ..Default::default()
        });
        self
    }

    fn dep_full(mut self, dep: DeclaredDependency) -> Self {
        self.project.dependencies.push(dep);
        self
    }

    fn managed(mut self, dep: DeclaredDependency) -> Self {
        self.project.dependency_management.push(dep);
        self
    }

    fn parent(mut self, org: &str, name: &str, version: &str) -> Self {
        self.project.parent = Some(ParentRef {
            organization: org.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        });
        self
    }

    fn property(mut self, key: &str, value: &str) -> Self {
        self.project.properties.insert(key.to_string(), value.to_string());
        self
    }

    fn seed(self, cache: &Cache) {
        let coordinate = hoist_core::coordinate::Coordinate::new(
            Module::new(
                self.project.organization.clone().unwrap(),
                self.project.name.clone().unwrap(),
            ),
            self.project.version.clone().unwrap(),
        );
        let url = repo().descriptor_url(&coordinate);
        let path = cache.path_for(&url).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serialize_project(&self.project)).unwrap();
    }
}

fn seed_metadata(cache: &Cache, org: &str, name: &str, versions: &[&str]) {
    let url = repo().version_listing_url(org, name);
    let path = cache.path_for(&url).unwrap();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut xml = String::from("<metadata>\n  <versioning>\n    <versions>\n");
    for v in versions {
        xml.push_str(&format!("      <version>{v}</version>\n"));
    }
    xml.push_str("    </versions>\n  </versioning>\n</metadata>\n");
    std::fs::write(&path, xml).unwrap();
}

fn roots(coords: &[&str]) -> Vec<Dependency> {
    coords.iter().map(|c| Dependency::parse(c).unwrap()).collect()
}

async fn run(cache: &Cache, coords: &[&str]) -> Resolution {
    resolve(&roots(coords), &[repo()], cache, &ResolveOptions::default())
        .await
        .unwrap()
}

fn versions_of(resolution: &Resolution) -> BTreeMap<String, String> {
    resolution
        .graph
        .ordered_nodes()
        .iter()
        .map(|n| (n.module.to_string(), n.version.clone()))
        .collect()
}

#[tokio::test]
async fn simple_transitive() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "a", "1.0").dep("org", "b", "1.0").seed(&cache);
    Fixture::new("org", "b", "1.0").seed(&cache);

    let resolution = run(&cache, &["org:a:1.0"]).await;
    let order: Vec<String> = resolution
        .graph
        .ordered_nodes()
        .iter()
        .map(|n| n.to_string())
        .collect();
    assert_eq!(order, vec!["org:a:1.0", "org:b:1.0"]);
    assert!(resolution.conflicts.is_empty());
    assert!(resolution.errors.is_empty());
}

#[tokio::test]
async fn equal_depth_conflict_picks_higher_version() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("x", "x", "1").dep("z", "z", "1.0").seed(&cache);
    Fixture::new("y", "y", "1").dep("z", "z", "2.0").seed(&cache);
    Fixture::new("z", "z", "1.0").seed(&cache);
    Fixture::new("z", "z", "2.0").seed(&cache);

    let resolution = run(&cache, &["x:x:1", "y:y:1"]).await;
    assert_eq!(versions_of(&resolution)["z:z"], "2.0");
    assert_eq!(resolution.conflicts.len(), 1);
}

#[tokio::test]
async fn strict_mode_fails_on_conflict() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("x", "x", "1").dep("z", "z", "1.0").seed(&cache);
    Fixture::new("y", "y", "1").dep("z", "z", "2.0").seed(&cache);
    Fixture::new("z", "z", "1.0").seed(&cache);
    Fixture::new("z", "z", "2.0").seed(&cache);

    let options = ResolveOptions {
        strict: true,
        ..Default::default()
    };
    let err = resolve(&roots(&["x:x:1", "y:y:1"]), &[repo()], &cache, &options)
        .await
        .unwrap_err();
    let msg = format!("{err:?}");
    assert!(msg.contains("version conflict"), "got: {msg}");
    assert!(msg.contains("z:z"));
}

#[tokio::test]
async fn nearest_declaration_wins() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "a", "1.0")
        .dep("org", "b", "1.0")
        .dep("org", "mid", "1.0")
        .seed(&cache);
    Fixture::new("org", "mid", "1.0").dep("org", "b", "2.0").seed(&cache);
    Fixture::new("org", "b", "1.0").seed(&cache);
    Fixture::new("org", "b", "2.0").seed(&cache);

    let resolution = run(&cache, &["org:a:1.0"]).await;
    // depth 1 beats depth 2
    assert_eq!(versions_of(&resolution)["org:b"], "1.0");
}

#[tokio::test]
async fn root_declarations_are_sticky() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "a", "1.0").dep("org", "z", "9.0").seed(&cache);
    Fixture::new("org", "z", "1.0").seed(&cache);
    Fixture::new("org", "z", "9.0").seed(&cache);

    let resolution = run(&cache, &["org:a:1.0", "org:z:1.0"]).await;
    assert_eq!(versions_of(&resolution)["org:z"], "1.0");
}

#[tokio::test]
async fn exclusions_prune_transitively() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("p", "p", "1")
        .dep_full(DeclaredDependency {
            organization: "q".into(),
            name: "q".into(),
            version: Some("1".into()),
            exclusions: vec![Exclusion::new("r", "*")],
            ..Default::default()
        })
        .seed(&cache);
    Fixture::new("q", "q", "1").dep("r", "r", "1").seed(&cache);
    Fixture::new("r", "r", "1").seed(&cache);

    let resolution = run(&cache, &["p:p:1"]).await;
    let versions = versions_of(&resolution);
    assert!(versions.contains_key("p:p"));
    assert!(versions.contains_key("q:q"));
    assert!(!versions.contains_key("r:r"));
}

#[tokio::test]
async fn module_survives_if_any_path_does_not_exclude_it() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "a", "1")
        .dep_full(DeclaredDependency {
            organization: "org".into(),
            name: "c".into(),
            version: Some("1".into()),
            exclusions: vec![Exclusion::new("org", "x")],
            ..Default::default()
        })
        .seed(&cache);
    Fixture::new("org", "b", "1").dep("org", "c", "1").seed(&cache);
    Fixture::new("org", "c", "1").dep("org", "x", "1").seed(&cache);
    Fixture::new("org", "x", "1").seed(&cache);

    let resolution = run(&cache, &["org:a:1", "org:b:1"]).await;
    assert!(versions_of(&resolution).contains_key("org:x"));
}

#[tokio::test]
async fn scope_transitions_follow_the_table() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "a", "1")
        .dep_full(DeclaredDependency {
            organization: "org".into(),
            name: "rt".into(),
            version: Some("1".into()),
            scope: Some("runtime".into()),
            ..Default::default()
        })
        .dep_full(DeclaredDependency {
            organization: "org".into(),
            name: "tests-only".into(),
            version: Some("1".into()),
            scope: Some("test".into()),
            ..Default::default()
        })
        .seed(&cache);
    Fixture::new("org", "rt", "1").dep("org", "deep", "1").seed(&cache);
    Fixture::new("org", "deep", "1").seed(&cache);
    Fixture::new("org", "tests-only", "1").seed(&cache);

    let resolution = run(&cache, &["org:a:1"]).await;
    let versions = versions_of(&resolution);
    assert!(!versions.contains_key("org:tests-only"));
    assert!(versions.contains_key("org:deep"));

    let deep = resolution
        .graph
        .find(&Module::new("org", "deep"))
        .map(|i| resolution.graph.node(i))
        .unwrap();
    // compile under a runtime edge becomes runtime
    assert_eq!(deep.scope, Scope::Runtime);
}

#[tokio::test]
async fn optional_dependencies_are_not_traversed() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "a", "1")
        .dep_full(DeclaredDependency {
            organization: "org".into(),
            name: "maybe".into(),
            version: Some("1".into()),
            optional: true,
            ..Default::default()
        })
        .seed(&cache);
    Fixture::new("org", "maybe", "1").seed(&cache);

    let resolution = run(&cache, &["org:a:1"]).await;
    assert!(!versions_of(&resolution).contains_key("org:maybe"));
}

#[tokio::test]
async fn parent_supplies_managed_version_and_properties() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "parent", "1.0")
        .property("lib.version", "3.3")
        .managed(DeclaredDependency {
            organization: "org".into(),
            name: "lib".into(),
            version: Some("${lib.version}".into()),
            ..Default::default()
        })
        .seed(&cache);
    Fixture::new("org", "child", "1.0")
        .parent("org", "parent", "1.0")
        .dep_full(DeclaredDependency {
            organization: "org".into(),
            name: "lib".into(),
            version: None,
            ..Default::default()
        })
        .seed(&cache);
    Fixture::new("org", "lib", "3.3").seed(&cache);

    let resolution = run(&cache, &["org:child:1.0"]).await;
    assert_eq!(versions_of(&resolution)["org:lib"], "3.3");
    assert!(resolution.errors.is_empty(), "{:?}", resolution.errors);
}

#[tokio::test]
async fn bom_import_pins_versionless_dependencies() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "bom", "1.0")
        .managed(DeclaredDependency {
            organization: "org".into(),
            name: "pinned".into(),
            version: Some("7.7".into()),
            ..Default::default()
        })
        .seed(&cache);
    Fixture::new("org", "app", "1.0")
        .managed(DeclaredDependency {
            organization: "org".into(),
            name: "bom".into(),
            version: Some("1.0".into()),
            scope: Some("import".into()),
            type_: Some("pom".into()),
            ..Default::default()
        })
        .dep_full(DeclaredDependency {
            organization: "org".into(),
            name: "pinned".into(),
            version: None,
            ..Default::default()
        })
        .seed(&cache);
    Fixture::new("org", "pinned", "7.7").seed(&cache);

    let resolution = run(&cache, &["org:app:1.0"]).await;
    let versions = versions_of(&resolution);
    assert_eq!(versions["org:pinned"], "7.7");
    // the BOM itself is not a dependency
    assert!(!versions.contains_key("org:bom"));
}

#[tokio::test]
async fn root_dependency_management_forces_transitive_versions() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "app", "1.0")
        .managed(DeclaredDependency {
            organization: "org".into(),
            name: "deep".into(),
            version: Some("5.0".into()),
            ..Default::default()
        })
        .dep("org", "mid", "1.0")
        .seed(&cache);
    Fixture::new("org", "mid", "1.0").dep("org", "deep", "1.0").seed(&cache);
    Fixture::new("org", "deep", "1.0").seed(&cache);
    Fixture::new("org", "deep", "5.0").seed(&cache);

    let resolution = run(&cache, &["org:app:1.0"]).await;
    assert_eq!(versions_of(&resolution)["org:deep"], "5.0");
}

#[tokio::test]
async fn parent_cycle_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "a", "1.0").parent("org", "b", "1.0").seed(&cache);
    Fixture::new("org", "b", "1.0").parent("org", "a", "1.0").seed(&cache);

    let err = resolve(&roots(&["org:a:1.0"]), &[repo()], &cache, &ResolveOptions::default())
        .await
        .unwrap_err();
    assert!(format!("{err:?}").contains("parent cycle"));
}

#[tokio::test]
async fn property_cycle_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "a", "1.0")
        .property("p1", "${p2}")
        .property("p2", "${p1}")
        .dep("org", "b", "${p1}")
        .seed(&cache);

    let err = resolve(&roots(&["org:a:1.0"]), &[repo()], &cache, &ResolveOptions::default())
        .await
        .unwrap_err();
    assert!(format!("{err:?}").contains("property cycle"));
}

#[tokio::test]
async fn active_profile_contributes_dependencies() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "extra", "1.0").seed(&cache);

    // The canonical serializer does not emit profiles, so this descriptor
    // is written by hand.
    let xml = r#"<project>
  <groupId>org</groupId>
  <artifactId>a</artifactId>
  <version>1.0</version>
  <profiles>
    <profile>
      <id>extras</id>
      <activation><property><name>with-extras</name></property></activation>
      <dependencies>
        <dependency>
          <groupId>org</groupId>
          <artifactId>extra</artifactId>
          <version>1.0</version>
        </dependency>
      </dependencies>
    </profile>
  </profiles>
</project>"#;
    let coordinate = hoist_core::coordinate::Coordinate::new(Module::new("org", "a"), "1.0");
    let path = cache.path_for(&repo().descriptor_url(&coordinate)).unwrap();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, xml).unwrap();

    let mut options = ResolveOptions::default();
    let resolution = resolve(&roots(&["org:a:1.0"]), &[repo()], &cache, &options)
        .await
        .unwrap();
    assert!(!versions_of(&resolution).contains_key("org:extra"));

    options.activation = ActivationContext {
        properties: [("with-extras".to_string(), "true".to_string())].into(),
        ..Default::default()
    };
    let resolution = resolve(&roots(&["org:a:1.0"]), &[repo()], &cache, &options)
        .await
        .unwrap();
    assert!(versions_of(&resolution).contains_key("org:extra"));
}

#[tokio::test]
async fn latest_and_ranges_resolve_from_the_version_listing() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "a", "1.0")
        .dep("org", "latest-dep", "latest")
        .dep("org", "ranged", "[1.0,2.0)")
        .seed(&cache);
    seed_metadata(&cache, "org", "latest-dep", &["0.9", "1.4", "1.2"]);
    seed_metadata(&cache, "org", "ranged", &["0.5", "1.5", "2.0", "2.5"]);
    Fixture::new("org", "latest-dep", "1.4").seed(&cache);
    Fixture::new("org", "ranged", "1.5").seed(&cache);

    let resolution = run(&cache, &["org:a:1.0"]).await;
    let versions = versions_of(&resolution);
    assert_eq!(versions["org:latest-dep"], "1.4");
    assert_eq!(versions["org:ranged"], "1.5");
}

#[tokio::test]
async fn symbolic_version_without_listing_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "a", "1.0")
        .dep("org", "ghost", "latest")
        .dep("org", "b", "1.0")
        .seed(&cache);
    Fixture::new("org", "b", "1.0").seed(&cache);

    let resolution = run(&cache, &["org:a:1.0"]).await;
    // resolution continues; the failure is aggregated
    assert!(versions_of(&resolution).contains_key("org:b"));
    assert!(!versions_of(&resolution).contains_key("org:ghost"));
    assert!(resolution
        .errors
        .iter()
        .any(|e| e.coordinate.contains("org:ghost")));
}

#[tokio::test]
async fn missing_descriptor_leaves_a_leaf_and_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    Fixture::new("org", "a", "1.0").dep("org", "gone", "1.0").seed(&cache);

    let resolution = run(&cache, &["org:a:1.0"]).await;
    // the node exists (it was claimed) but has no expansion
    assert!(versions_of(&resolution).contains_key("org:gone"));
    assert!(!resolution.errors.is_empty());
}

#[tokio::test]
async fn flat_dialect_descriptors_resolve() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    let flat_repo = Repository::new("flat", REPO_URL).with_dialect(Dialect::Flat);

    let a = "organization=org\nname=a\nversion=1.0\n\n[dependencies]\norg:b:1.0\n";
    let b = "organization=org\nname=b\nversion=1.0\n";
    for (name, version, content) in [("a", "1.0", a), ("b", "1.0", b)] {
        let coordinate = hoist_core::coordinate::Coordinate::new(Module::new("org", name), version);
        let path = cache
            .path_for(&flat_repo.descriptor_url(&coordinate))
            .unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
    }

    let resolution = resolve(
        &roots(&["org:a:1.0"]),
        &[flat_repo],
        &cache,
        &ResolveOptions::default(),
    )
    .await
    .unwrap();
    assert!(versions_of(&resolution).contains_key("org:b"));
}

#[tokio::test]
async fn displaced_version_subtree_drops_out() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = offline_cache(tmp.path());
    // b:2.0 (via mid) depends on orphan; b:1.0 (nearer) does not.
    Fixture::new("org", "a", "1.0")
        .dep("org", "mid", "1.0")
        .dep("org", "b", "1.0")
        .seed(&cache);
    Fixture::new("org", "mid", "1.0").dep("org", "b", "2.0").seed(&cache);
    Fixture::new("org", "b", "1.0").seed(&cache);
    Fixture::new("org", "b", "2.0").dep("org", "orphan", "1.0").seed(&cache);
    Fixture::new("org", "orphan", "1.0").seed(&cache);

    let resolution = run(&cache, &["org:a:1.0"]).await;
    let versions = versions_of(&resolution);
    assert_eq!(versions["org:b"], "1.0");
    // orphan was only reachable through the displaced b:2.0
    assert!(!versions.contains_key("org:orphan"));
}
