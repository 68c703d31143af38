//! Command dispatch and handler modules.

mod fetch;
mod resolve;
mod tree;

use std::sync::Arc;

use miette::Result;

use hoist_cache::{Cache, CacheConfig};
use hoist_core::coordinate::Dependency;
use hoist_maven::repository::Repository;
use hoist_resolver::resolver::ResolveOptions;
use hoist_util::errors::HoistError;

use crate::cli::{Cli, Command};
use crate::progress::ProgressEvents;

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let (cache, repos, options) = setup(&cli)?;
    match cli.command {
        Command::Resolve { ref coordinates } => {
            let roots = parse_roots(coordinates)?;
            resolve::exec(&roots, &repos, &cache, &options, cli.verbose).await
        }
        Command::Fetch {
            ref coordinates,
            classpath,
        } => {
            let roots = parse_roots(coordinates)?;
            fetch::exec(&roots, &repos, &cache, &options, classpath, cli.verbose).await
        }
        Command::Tree {
            ref coordinates,
            depth,
        } => {
            let roots = parse_roots(coordinates)?;
            tree::exec(&roots, &repos, &cache, &options, depth).await
        }
    }
}

/// Build the cache, repository list, and resolver options from flags and
/// the environment. Flags win over environment variables.
fn setup(cli: &Cli) -> Result<(Cache, Vec<Repository>, ResolveOptions)> {
    let mut config = CacheConfig::from_env()?;
    if let Some(ref root) = cli.cache {
        config.root = root.into();
    }
    if let Some(ref mode) = cli.mode {
        config.policies = hoist_cache::policy::parse_mode(mode)?;
    }
    if let Some(ref ttl) = cli.ttl {
        config.ttl = hoist_cache::config::parse_duration(ttl)?;
    }
    if let Some(parallel) = cli.parallel {
        config.parallel = parallel;
    }

    let cache = if console::Term::stderr().is_term() {
        Cache::with_events(config, Arc::new(ProgressEvents::new()))?
    } else {
        Cache::new(config)?
    };

    let repos = hoist_ops::ops_resolve::build_repos(&cli.repository);
    let options = ResolveOptions {
        strict: cli.strict,
        ..Default::default()
    };
    Ok((cache, repos, options))
}

fn parse_roots(coordinates: &[String]) -> Result<Vec<Dependency>> {
    coordinates
        .iter()
        .map(|raw| {
            Dependency::parse(raw).ok_or_else(|| {
                HoistError::Config {
                    message: format!("invalid coordinate {raw:?}, expected org:name:version"),
                }
                .into()
            })
        })
        .collect()
}
