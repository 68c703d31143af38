//! Operation: resolve a set of coordinates and render the report.

use hoist_cache::Cache;
use hoist_core::coordinate::Dependency;
use hoist_maven::repository::Repository;
use hoist_resolver::resolver::{self, Resolution, ResolveOptions};

/// Resolve the transitive closure of the requested coordinates.
pub async fn resolve(
    roots: &[Dependency],
    repos: &[Repository],
    cache: &Cache,
    options: &ResolveOptions,
) -> miette::Result<Resolution> {
    let resolution = resolver::resolve(roots, repos, cache, options).await?;
    tracing::info!(
        "resolved {} modules with {} conflicts and {} errors",
        resolution.graph.len(),
        resolution.conflicts.len(),
        resolution.errors.len()
    );
    Ok(resolution)
}

/// Render the resolution report: chosen versions, edges, conflicts, and
/// per-coordinate errors.
pub fn render_report(resolution: &Resolution) -> String {
    let mut out = String::new();

    out.push_str(&format!("Resolved {} modules:\n", resolution.graph.len()));
    for node in resolution.graph.ordered_nodes() {
        out.push_str(&format!("  {} ({})\n", node, node.scope));
    }

    let edges = resolution.graph.edges();
    if !edges.is_empty() {
        out.push_str(&format!("\nEdges ({}):\n", edges.len()));
        let mut lines: Vec<String> = edges
            .iter()
            .map(|(from, to, edge)| format!("  {from} -> {to} ({})\n", edge.scope))
            .collect();
        lines.sort();
        for line in lines {
            out.push_str(&line);
        }
    }

    if !resolution.conflicts.is_empty() {
        out.push('\n');
        out.push_str(&resolution.conflicts.to_string());
    }

    if !resolution.errors.is_empty() {
        out.push_str(&format!("\nErrors ({}):\n", resolution.errors.len()));
        for error in &resolution.errors {
            out.push_str(&format!("  {}: {}\n", error.coordinate, error.message));
        }
    }

    out
}

/// Build the repository list for a set of URLs, appending Maven Central
/// when absent.
pub fn build_repos(urls: &[String]) -> Vec<Repository> {
    let mut repos: Vec<Repository> = urls
        .iter()
        .enumerate()
        .map(|(i, url)| Repository::new(format!("repo-{i}"), url.clone()))
        .collect();
    if repos.is_empty() {
        repos.push(Repository::maven_central());
    }
    repos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_repos_defaults_to_central() {
        let repos = build_repos(&[]);
        assert_eq!(repos.len(), 1);
        assert!(repos[0].url.contains("repo.maven.apache.org"));
    }

    #[test]
    fn build_repos_keeps_order() {
        let repos = build_repos(&[
            "https://first.example.com/maven".to_string(),
            "https://second.example.com/maven".to_string(),
        ]);
        assert_eq!(repos.len(), 2);
        assert!(repos[0].url.contains("first"));
        assert!(repos[1].url.contains("second"));
    }
}
