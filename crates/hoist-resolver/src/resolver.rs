//! The fixed-point resolution loop.
//!
//! Resolution runs in two phases. The first iterates to a fixed point on
//! the `module -> version` mapping: descriptors are fetched level by level,
//! parents and BOM imports are inherited, profiles activated, properties
//! substituted, and every version claim reconciled. The second phase is a
//! CPU-only walk over the chosen versions that rebuilds the final graph
//! with per-path exclusion and scope context, so subtrees orphaned by a
//! version change drop out.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinSet;

use hoist_cache::Cache;
use hoist_core::coordinate::{excluded, Coordinate, Dependency, Exclusion, Module, Scope};
use hoist_core::version::{Version, VersionConstraint};
use hoist_maven::flat;
use hoist_maven::metadata;
use hoist_maven::project::{parse_project, ActivationContext, DeclaredDependency, Project};
use hoist_maven::repository::{Dialect, Repository};
use hoist_util::errors::{HoistError, HoistResult};

use crate::conflict::{ConflictReport, VersionConflict};
use crate::graph::{DepEdge, ResolutionGraph, ResolvedNode};
use crate::scope;

/// Knobs for one resolution run.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Fail with a version conflict instead of reconciling.
    pub strict: bool,
    /// Outer fixed-point iteration guard.
    pub max_iterations: usize,
    /// Parent chain depth guard.
    pub max_parent_depth: usize,
    /// Environment profiles are evaluated against.
    pub activation: ActivationContext,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_iterations: 200,
            max_parent_depth: 20,
            activation: ActivationContext::default(),
        }
    }
}

/// A per-coordinate failure that did not stop the resolution.
#[derive(Debug, Clone)]
pub struct CoordinateError {
    pub coordinate: String,
    pub message: String,
}

/// The output of a resolution run.
#[derive(Debug)]
pub struct Resolution {
    pub graph: ResolutionGraph,
    pub conflicts: ConflictReport,
    pub errors: Vec<CoordinateError>,
    /// Effective descriptors for every coordinate that was expanded.
    descriptors: HashMap<Coordinate, Arc<Project>>,
}

impl Resolution {
    /// The effective descriptor of a resolved coordinate, if it loaded.
    pub fn descriptor(&self, coordinate: &Coordinate) -> Option<&Arc<Project>> {
        self.descriptors.get(coordinate)
    }
}

/// The version claim currently winning for a module.
#[derive(Debug, Clone)]
struct Chosen {
    version: String,
    depth: usize,
    path: String,
    root: bool,
}

/// One pending expansion.
struct QueueEntry {
    module: Module,
    version: String,
    scope: Scope,
    depth: usize,
    path: String,
    exclusions: BTreeSet<Exclusion>,
}

/// A declared dependency after management and forced-version overrides.
struct EffectiveDep {
    module: Module,
    version: String,
    scope: Scope,
    exclusions: BTreeSet<Exclusion>,
}

/// Resolve the transitive closure of `roots` against `repos`.
pub async fn resolve(
    roots: &[Dependency],
    repos: &[Repository],
    cache: &Cache,
    options: &ResolveOptions,
) -> miette::Result<Resolution> {
    let mut resolver = Resolver {
        repos: repos.to_vec(),
        cache: cache.clone(),
        options: options.clone(),
        raw: HashMap::new(),
        raw_errors: HashMap::new(),
        effective: HashMap::new(),
        listings: HashMap::new(),
        errors: Vec::new(),
    };
    resolver.run(roots).await
}

struct Resolver {
    repos: Vec<Repository>,
    cache: Cache,
    options: ResolveOptions,
    /// Raw descriptors as parsed, before inheritance.
    raw: HashMap<Coordinate, Arc<Project>>,
    raw_errors: HashMap<Coordinate, String>,
    /// Fully inherited, profile-activated, property-substituted descriptors.
    effective: HashMap<Coordinate, Arc<Project>>,
    /// Version listings per module; `None` caches a miss.
    listings: HashMap<Module, Option<Vec<Version>>>,
    errors: Vec<CoordinateError>,
}

impl Resolver {
    async fn run(&mut self, roots: &[Dependency]) -> miette::Result<Resolution> {
        let mut chosen: HashMap<Module, Chosen> = HashMap::new();
        let mut forced: HashMap<Module, String> = HashMap::new();
        let mut conflicts = ConflictReport::new();
        // Expansion is deduplicated per exclusion context, not just per
        // version: a module excluded on one path may still pull its
        // subtree in through another.
        let mut expanded: HashSet<(Module, String, BTreeSet<Exclusion>)> = HashSet::new();
        let mut queue: VecDeque<QueueEntry> = VecDeque::new();

        // Seed the queue with the requested coordinates at depth zero.
        let mut seeds = Vec::new();
        for dep in roots {
            let version = match self.concrete_version(&dep.module, &dep.constraint).await {
                Ok(version) => version,
                Err(e) => {
                    self.record_error(&dep.module.to_string(), &e)?;
                    continue;
                }
            };
            seeds.push((dep, version));
        }
        for (dep, version) in seeds {
            queue.push_back(QueueEntry {
                module: dep.module.clone(),
                version,
                scope: dep.scope,
                depth: 0,
                path: dep.module.to_string(),
                exclusions: dep.exclusions.iter().cloned().collect(),
            });
        }

        let mut iterations = 0usize;
        while !queue.is_empty() {
            iterations += 1;
            if iterations > self.options.max_iterations {
                return Err(HoistError::MaxIterations {
                    limit: self.options.max_iterations,
                }
                .into());
            }

            // Drain one depth level and prefetch its descriptors in parallel.
            let current_depth = queue.front().map(|e| e.depth).unwrap_or(0);
            let mut level: Vec<QueueEntry> = Vec::new();
            while queue.front().is_some_and(|e| e.depth == current_depth) {
                level.push(queue.pop_front().unwrap());
            }
            self.prefetch(&level).await;

            for mut entry in level {
                if let Some(forced_version) = forced.get(&entry.module) {
                    entry.version = forced_version.clone();
                }

                let winner = match self.reconcile(&mut chosen, &mut conflicts, &entry) {
                    Ok(winner) => winner,
                    Err(e) => return Err(e),
                };
                if !winner {
                    continue;
                }
                if !expanded.insert((
                    entry.module.clone(),
                    entry.version.clone(),
                    entry.exclusions.clone(),
                )) {
                    continue;
                }

                let coordinate =
                    Coordinate::new(entry.module.clone(), entry.version.clone());
                let descriptor = match self.effective_descriptor(&coordinate, 0).await {
                    Ok(descriptor) => descriptor,
                    Err(e) => {
                        self.record_error(&coordinate.to_string(), &e)?;
                        continue;
                    }
                };

                // Dependency management of root descriptors is forced on
                // the whole graph; first root wins per module.
                if entry.depth == 0 {
                    for dm in &descriptor.dependency_management {
                        if dm.scope.as_deref() == Some("import") {
                            continue;
                        }
                        if let Some(version) = &dm.version {
                            forced
                                .entry(dm.module())
                                .or_insert_with(|| version.clone());
                        }
                    }
                }

                for dep in &descriptor.dependencies {
                    if dep.optional {
                        continue;
                    }
                    let Some(effective) = effective_dependency(&descriptor, dep, &forced) else {
                        continue;
                    };
                    let Some(edge_scope) = scope::transition(entry.scope, effective.scope) else {
                        continue;
                    };
                    if excluded(&entry.exclusions, &effective.module) {
                        continue;
                    }

                    let constraint = VersionConstraint::parse(&effective.version);
                    let version = match self
                        .concrete_version(&effective.module, &constraint)
                        .await
                    {
                        Ok(version) => version,
                        Err(e) => {
                            self.record_error(&effective.module.to_string(), &e)?;
                            continue;
                        }
                    };

                    let mut child_exclusions = entry.exclusions.clone();
                    child_exclusions.extend(effective.exclusions.iter().cloned());

                    queue.push_back(QueueEntry {
                        module: effective.module.clone(),
                        version,
                        scope: edge_scope,
                        depth: entry.depth + 1,
                        path: format!("{} > {}", entry.path, effective.module),
                        exclusions: child_exclusions,
                    });
                }
            }
        }

        let graph = self.build_graph(roots, &chosen, &forced);
        Ok(Resolution {
            graph,
            conflicts,
            errors: std::mem::take(&mut self.errors),
            descriptors: std::mem::take(&mut self.effective),
        })
    }

    /// Apply the reconciliation policy to one claim. Returns whether the
    /// claim won (and should be expanded).
    fn reconcile(
        &mut self,
        chosen: &mut HashMap<Module, Chosen>,
        conflicts: &mut ConflictReport,
        entry: &QueueEntry,
    ) -> miette::Result<bool> {
        let claim = Chosen {
            version: entry.version.clone(),
            depth: entry.depth,
            path: entry.path.clone(),
            root: entry.depth == 0,
        };

        if !chosen.contains_key(&entry.module) {
            chosen.insert(entry.module.clone(), claim);
            return Ok(true);
        }
        let existing = chosen
            .get_mut(&entry.module)
            .expect("presence checked above");

        let same_version =
            Version::parse(&existing.version) == Version::parse(&entry.version);
        if same_version {
            // Keep the lexicographically smallest requesting path at equal
            // depth so arrival order never shows in the output.
            if entry.depth < existing.depth
                || (entry.depth == existing.depth && entry.path < existing.path)
            {
                existing.depth = entry.depth;
                existing.path = entry.path.clone();
                existing.root = existing.root || claim.root;
            }
            // Same version through a new path still needs its subtree
            // walked with the new exclusion context; re-expansion is
            // prevented separately by the expanded set.
            return Ok(true);
        }

        if self.options.strict {
            return Err(HoistError::VersionConflict {
                module: entry.module.to_string(),
                versions: vec![existing.version.clone(), entry.version.clone()],
            }
            .into());
        }

        let entry_wins = if existing.root {
            false
        } else if claim.root {
            true
        } else if entry.depth != existing.depth {
            entry.depth < existing.depth
        } else {
            Version::parse(&entry.version) > Version::parse(&existing.version)
        };

        if entry_wins {
            conflicts.add(VersionConflict {
                module: entry.module.clone(),
                requested: existing.version.clone(),
                resolved: entry.version.clone(),
                reason: reconcile_reason(&claim, existing),
            });
            *existing = claim;
            Ok(true)
        } else {
            conflicts.add(VersionConflict {
                module: entry.module.clone(),
                requested: entry.version.clone(),
                resolved: existing.version.clone(),
                reason: reconcile_reason(existing, &claim),
            });
            Ok(false)
        }
    }

    /// Fetch the raw descriptors of one level concurrently. Parent and BOM
    /// descriptors load on demand afterwards; the cache deduplicates.
    async fn prefetch(&mut self, level: &[QueueEntry]) {
        let coordinates: HashSet<Coordinate> = level
            .iter()
            .map(|e| Coordinate::new(e.module.clone(), e.version.clone()))
            .filter(|c| !self.raw.contains_key(c) && !self.raw_errors.contains_key(c))
            .collect();
        if coordinates.is_empty() {
            return;
        }

        let mut join_set = JoinSet::new();
        for coordinate in coordinates {
            let cache = self.cache.clone();
            let repos = self.repos.clone();
            join_set.spawn(async move {
                let result = load_raw(&cache, &repos, &coordinate).await;
                (coordinate, result)
            });
        }
        while let Some(joined) = join_set.join_next().await {
            let Ok((coordinate, result)) = joined else {
                continue;
            };
            match result {
                Ok(project) => {
                    self.raw.insert(coordinate, Arc::new(project));
                }
                Err(e) => {
                    self.raw_errors.insert(coordinate, format!("{e:?}"));
                }
            }
        }
    }

    async fn raw_descriptor(&mut self, coordinate: &Coordinate) -> miette::Result<Arc<Project>> {
        if let Some(project) = self.raw.get(coordinate) {
            return Ok(project.clone());
        }
        if let Some(message) = self.raw_errors.get(coordinate) {
            return Err(HoistError::Generic {
                message: message.clone(),
            }
            .into());
        }
        match load_raw(&self.cache, &self.repos, coordinate).await {
            Ok(project) => {
                let project = Arc::new(project);
                self.raw.insert(coordinate.clone(), project.clone());
                Ok(project)
            }
            Err(e) => {
                self.raw_errors
                    .insert(coordinate.clone(), format!("{e:?}"));
                Err(e)
            }
        }
    }

    /// Load a descriptor and apply the full inheritance pipeline: parent
    /// chain, BOM imports, profile activation, property substitution.
    ///
    /// `guard` counts BOM nesting; parents have their own depth limit.
    fn effective_descriptor<'s>(
        &'s mut self,
        coordinate: &Coordinate,
        guard: usize,
    ) -> Pin<Box<dyn Future<Output = miette::Result<Arc<Project>>> + 's>> {
        let coordinate = coordinate.clone();
        Box::pin(async move {
            if let Some(project) = self.effective.get(&coordinate) {
                return Ok(project.clone());
            }
            if guard > self.options.max_parent_depth {
                return Err(HoistError::ParentCycle {
                    coordinate: coordinate.to_string(),
                }
                .into());
            }

            let raw = self.raw_descriptor(&coordinate).await?;
            let mut chain: Vec<Project> = vec![(*raw).clone()];
            let mut visited: HashSet<Coordinate> = [coordinate.clone()].into();

            // Walk the parent chain upwards.
            while let Some(parent_ref) = chain.last().and_then(|p| p.parent.clone()) {
                let parent_coordinate =
                    Coordinate::new(parent_ref.module(), parent_ref.version.clone());
                if !visited.insert(parent_coordinate.clone())
                    || chain.len() > self.options.max_parent_depth
                {
                    return Err(HoistError::ParentCycle {
                        coordinate: parent_coordinate.to_string(),
                    }
                    .into());
                }
                let parent = self.raw_descriptor(&parent_coordinate).await?;
                chain.push((*parent).clone());
            }

            // Fold ancestors down into the leaf descriptor.
            let mut effective = chain.pop().expect("chain starts non-empty");
            while let Some(mut child) = chain.pop() {
                child.apply_parent(&effective);
                effective = child;
            }

            // Splice imported BOMs into dependency management.
            let imports: Vec<(String, String, String)> = effective
                .bom_imports()
                .iter()
                .map(|d| {
                    Ok((
                        effective.interpolate(&d.organization)?,
                        effective.interpolate(&d.name)?,
                        effective.interpolate(d.version.as_deref().unwrap_or_default())?,
                    ))
                })
                .collect::<HoistResult<_>>()?;
            for (organization, name, version) in imports {
                if version.is_empty() {
                    continue;
                }
                let bom_coordinate = Coordinate::new(Module::new(organization, name), version);
                let bom = match self.effective_descriptor(&bom_coordinate, guard + 1).await {
                    Ok(bom) => bom,
                    Err(e) => {
                        if is_fatal(&e) {
                            return Err(e);
                        }
                        self.errors.push(CoordinateError {
                            coordinate: bom_coordinate.to_string(),
                            message: format!("{e:?}"),
                        });
                        continue;
                    }
                };
                for dm in &bom.dependency_management {
                    if dm.scope.as_deref() == Some("import") {
                        continue;
                    }
                    let dominated = effective
                        .dependency_management
                        .iter()
                        .any(|d| d.organization == dm.organization && d.name == dm.name);
                    if !dominated {
                        effective.dependency_management.push(dm.clone());
                    }
                }
            }

            let activated = effective.activate_profiles(&self.options.activation);
            if !activated.is_empty() {
                tracing::debug!("{coordinate}: activated profiles {activated:?}");
            }
            effective.resolve_properties()?;

            let effective = Arc::new(effective);
            self.effective.insert(coordinate, effective.clone());
            Ok(effective)
        })
    }

    /// Turn a constraint into a concrete version, consulting the
    /// repository version listing when the constraint requires one.
    async fn concrete_version(
        &mut self,
        module: &Module,
        constraint: &VersionConstraint,
    ) -> miette::Result<String> {
        if !constraint.needs_listing() {
            if let Some(version) = constraint.preferred() {
                return Ok(version.original.clone());
            }
        }
        let listing = self.version_listing(module).await;
        let selected = listing
            .as_deref()
            .and_then(|versions| constraint.select(versions.iter()));
        match selected {
            Some(version) => Ok(version.original.clone()),
            None => Err(HoistError::UnknownVersion {
                module: format!("{module} ({constraint})"),
            }
            .into()),
        }
    }

    async fn version_listing(&mut self, module: &Module) -> Option<Vec<Version>> {
        if let Some(cached) = self.listings.get(module) {
            return cached.clone();
        }
        let mut found: Option<Vec<Version>> = None;
        for repo in &self.repos {
            let url = repo.version_listing_url(&module.organization, &module.name);
            match self.cache.fetch_bytes(&url, true).await {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    match metadata::parse_version_listing(&text) {
                        Ok(listing) if !listing.versions.is_empty() => {
                            found = Some(listing.parsed_versions());
                            break;
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            tracing::warn!("unusable version listing at {url}: {e:?}");
                            continue;
                        }
                    }
                }
                Err(e) if is_miss(&e) => continue,
                Err(e) => {
                    tracing::warn!("failed to fetch version listing {url}: {e:?}");
                    continue;
                }
            }
        }
        self.listings.insert(module.clone(), found.clone());
        found
    }

    /// Record a non-fatal per-coordinate failure, or abort on a fatal one.
    fn record_error(&mut self, coordinate: &str, error: &miette::Report) -> miette::Result<()> {
        if is_fatal(error) {
            return Err(HoistError::Generic {
                message: format!("{error:?}"),
            }
            .into());
        }
        tracing::warn!("{coordinate}: {error:?}");
        self.errors.push(CoordinateError {
            coordinate: coordinate.to_string(),
            message: format!("{error:?}"),
        });
        Ok(())
    }

    /// Rebuild the final graph from the chosen versions, walking each path
    /// with its own exclusion context. Modules only reachable through a
    /// displaced version drop out here.
    fn build_graph(
        &self,
        roots: &[Dependency],
        chosen: &HashMap<Module, Chosen>,
        forced: &HashMap<Module, String>,
    ) -> ResolutionGraph {
        let mut graph = ResolutionGraph::new();
        let mut visited: HashSet<(Module, BTreeSet<Exclusion>)> = HashSet::new();
        let mut queue: VecDeque<(Module, Scope, usize, BTreeSet<Exclusion>)> = VecDeque::new();

        for dep in roots {
            if !chosen.contains_key(&dep.module) {
                continue;
            }
            let exclusions: BTreeSet<Exclusion> = dep.exclusions.iter().cloned().collect();
            let idx = graph.add_node(ResolvedNode {
                module: dep.module.clone(),
                version: chosen[&dep.module].version.clone(),
                scope: dep.scope,
                depth: 0,
            });
            graph.add_root(idx);
            queue.push_back((dep.module.clone(), dep.scope, 0, exclusions));
        }

        while let Some((module, inherited, depth, exclusions)) = queue.pop_front() {
            if !visited.insert((module.clone(), exclusions.clone())) {
                continue;
            }
            let Some(choice) = chosen.get(&module) else {
                continue;
            };
            let from = graph.add_node(ResolvedNode {
                module: module.clone(),
                version: choice.version.clone(),
                scope: inherited,
                depth,
            });

            let coordinate = Coordinate::new(module.clone(), choice.version.clone());
            let Some(descriptor) = self.effective.get(&coordinate) else {
                continue; // failed descriptors stay as leaves
            };

            for dep in &descriptor.dependencies {
                if dep.optional {
                    continue;
                }
                let Some(effective) = effective_dependency(descriptor, dep, forced) else {
                    continue;
                };
                let Some(edge_scope) = scope::transition(inherited, effective.scope) else {
                    continue;
                };
                if excluded(&exclusions, &effective.module) {
                    continue;
                }
                let Some(child_choice) = chosen.get(&effective.module) else {
                    continue;
                };

                let to = graph.add_node(ResolvedNode {
                    module: effective.module.clone(),
                    version: child_choice.version.clone(),
                    scope: edge_scope,
                    depth: depth + 1,
                });
                graph.add_edge(
                    from,
                    to,
                    DepEdge {
                        scope: edge_scope,
                        exclusions: effective.exclusions.clone(),
                    },
                );

                let mut child_exclusions = exclusions.clone();
                child_exclusions.extend(effective.exclusions.iter().cloned());
                queue.push_back((effective.module.clone(), edge_scope, depth + 1, child_exclusions));
            }
        }

        graph
    }
}

fn reconcile_reason(winner: &Chosen, loser: &Chosen) -> String {
    if winner.root {
        "root declaration is sticky".to_string()
    } else if winner.depth != loser.depth {
        format!("nearest wins (depth {} vs {})", winner.depth, loser.depth)
    } else {
        format!("higher version at equal depth {}", winner.depth)
    }
}

/// Apply dependency-management and forced-version overrides to a declared
/// dependency. `None` when no version can be determined.
fn effective_dependency(
    descriptor: &Project,
    dep: &DeclaredDependency,
    forced: &HashMap<Module, String>,
) -> Option<EffectiveDep> {
    let module = dep.module();
    let managed = descriptor.managed_entry(&module);

    let version = forced
        .get(&module)
        .cloned()
        .or_else(|| managed.and_then(|m| m.version.clone()))
        .or_else(|| dep.version.clone())?;

    let scope_str = dep
        .scope
        .as_deref()
        .or_else(|| managed.and_then(|m| m.scope.as_deref()));
    let scope = scope_str.and_then(Scope::parse).unwrap_or_default();

    let mut exclusions: BTreeSet<Exclusion> = dep.exclusions.iter().cloned().collect();
    if let Some(managed) = managed {
        exclusions.extend(managed.exclusions.iter().cloned());
    }

    Some(EffectiveDep {
        module,
        version,
        scope,
        exclusions,
    })
}

/// Fetch and parse a raw descriptor from the first repository that has it.
async fn load_raw(
    cache: &Cache,
    repos: &[Repository],
    coordinate: &Coordinate,
) -> miette::Result<Project> {
    for repo in repos {
        let url = repo.descriptor_url(coordinate);
        let changing = repo.is_changing(&coordinate.version);
        match cache.fetch_bytes(&url, changing).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let project = match repo.dialect {
                    Dialect::Xml => parse_project(&text)?,
                    Dialect::Flat => flat::parse_flat(&text)?,
                };
                return Ok(project);
            }
            Err(e) if is_miss(&e) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(HoistError::NotFound {
        subject: coordinate.to_string(),
    }
    .into())
}

/// Whether an error just means "this repository does not have it".
fn is_miss(error: &miette::Report) -> bool {
    matches!(
        error.downcast_ref::<HoistError>(),
        Some(HoistError::NotFound { .. }) | Some(HoistError::NotInCache { .. })
    )
}

fn is_fatal(error: &miette::Report) -> bool {
    error
        .downcast_ref::<HoistError>()
        .is_some_and(|e| e.is_fatal())
}
