//! Operation: materialize the artifact files of a resolved graph.

use std::path::PathBuf;

use tokio::task::JoinSet;

use hoist_cache::Cache;
use hoist_core::coordinate::Coordinate;
use hoist_maven::repository::Repository;
use hoist_resolver::resolver::Resolution;
use hoist_util::errors::HoistError;

/// One artifact that could not be materialized. A failure never aborts its
/// siblings; everything is collected and reported together.
#[derive(Debug, Clone)]
pub struct ArtifactError {
    pub coordinate: String,
    pub message: String,
}

/// The files of a resolved graph, in the resolver's output order.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub files: Vec<PathBuf>,
    pub errors: Vec<ArtifactError>,
}

/// Download every artifact of the resolved graph through the cache,
/// in parallel on the cache's worker pool. The returned file list keeps
/// the resolver's topological order regardless of download completion
/// order.
pub async fn fetch_artifacts(
    resolution: &Resolution,
    repos: &[Repository],
    cache: &Cache,
) -> FetchOutcome {
    let mut artifacts: Vec<Coordinate> = Vec::new();
    for node in resolution.graph.ordered_nodes() {
        let coordinate = Coordinate::new(node.module.clone(), node.version.clone());
        // Descriptor-only modules (BOM-style packaging) have no file.
        let packaging = resolution
            .descriptor(&coordinate)
            .and_then(|d| d.packaging.clone())
            .unwrap_or_else(|| "jar".to_string());
        if packaging == "pom" {
            continue;
        }
        artifacts.push(coordinate);
    }

    let mut join_set = JoinSet::new();
    for (index, coordinate) in artifacts.iter().enumerate() {
        let coordinate = coordinate.clone();
        let repos = repos.to_vec();
        let cache = cache.clone();
        join_set.spawn(async move {
            let result = fetch_one(&cache, &repos, &coordinate).await;
            (index, coordinate, result)
        });
    }

    let mut slots: Vec<Option<PathBuf>> = vec![None; artifacts.len()];
    let mut errors = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        let Ok((index, coordinate, result)) = joined else {
            continue;
        };
        match result {
            Ok(path) => slots[index] = Some(path),
            Err(e) => errors.push(ArtifactError {
                coordinate: coordinate.to_string(),
                message: format!("{e:?}"),
            }),
        }
    }

    errors.sort_by(|a, b| a.coordinate.cmp(&b.coordinate));
    FetchOutcome {
        files: slots.into_iter().flatten().collect(),
        errors,
    }
}

/// Fetch one artifact from the first repository that has it.
async fn fetch_one(
    cache: &Cache,
    repos: &[Repository],
    coordinate: &Coordinate,
) -> miette::Result<PathBuf> {
    for repo in repos {
        let url = repo.artifact_url(coordinate);
        let changing = repo.is_changing(&coordinate.version);
        match cache.fetch_changing(&url, changing).await {
            Ok(path) => return Ok(path),
            Err(e) => {
                let miss = matches!(
                    e.downcast_ref::<HoistError>(),
                    Some(HoistError::NotFound { .. }) | Some(HoistError::NotInCache { .. })
                );
                if miss {
                    continue;
                }
                return Err(e);
            }
        }
    }
    Err(HoistError::NotFound {
        subject: coordinate.to_string(),
    }
    .into())
}
