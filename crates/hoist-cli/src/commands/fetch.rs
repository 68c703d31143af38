//! `hoist fetch`: materialize all artifact files and print their paths.

use miette::Result;

use hoist_cache::Cache;
use hoist_core::coordinate::Dependency;
use hoist_maven::repository::Repository;
use hoist_ops::{ops_fetch, ops_resolve};
use hoist_resolver::resolver::ResolveOptions;
use hoist_util::errors::HoistError;

pub async fn exec(
    roots: &[Dependency],
    repos: &[Repository],
    cache: &Cache,
    options: &ResolveOptions,
    classpath: bool,
    verbose: bool,
) -> Result<()> {
    let resolution = ops_resolve::resolve(roots, repos, cache, options).await?;
    if verbose && !resolution.conflicts.is_empty() {
        eprintln!("{}", resolution.conflicts);
    }

    let outcome = ops_fetch::fetch_artifacts(&resolution, repos, cache).await;

    if classpath {
        let joined: Vec<String> = outcome
            .files
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        println!("{}", joined.join(if cfg!(windows) { ";" } else { ":" }));
    } else {
        for file in &outcome.files {
            println!("{}", file.display());
        }
    }

    if !outcome.errors.is_empty() {
        for error in &outcome.errors {
            eprintln!("error: {}: {}", error.coordinate, error.message);
        }
        return Err(HoistError::Generic {
            message: format!("{} artifact(s) failed to download", outcome.errors.len()),
        }
        .into());
    }
    Ok(())
}
