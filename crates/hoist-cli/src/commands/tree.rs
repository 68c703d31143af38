//! `hoist tree`: print the dependency tree.

use miette::Result;

use hoist_cache::Cache;
use hoist_core::coordinate::Dependency;
use hoist_maven::repository::Repository;
use hoist_ops::ops_resolve;
use hoist_resolver::resolver::ResolveOptions;

pub async fn exec(
    roots: &[Dependency],
    repos: &[Repository],
    cache: &Cache,
    options: &ResolveOptions,
    depth: Option<usize>,
) -> Result<()> {
    let resolution = ops_resolve::resolve(roots, repos, cache, options).await?;
    print!("{}", resolution.graph.print_tree(depth));
    Ok(())
}
