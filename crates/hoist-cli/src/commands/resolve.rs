//! `hoist resolve`: print the resolution report.

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
    verbose: bool,
) -> Result<()> {
    let resolution = ops_resolve::resolve(roots, repos, cache, options).await?;
    print!("{}", ops_resolve::render_report(&resolution));
    if verbose && !resolution.conflicts.is_empty() {
        eprintln!("{}", resolution.conflicts);
    }
    Ok(())
}
