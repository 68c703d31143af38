//! Scope transitions along transitive dependency edges.

use hoist_core::coordinate::Scope;

/// The scope of a transitive edge, given the scope inherited from the path
/// so far and the scope declared on the dependency. `None` drops the edge
/// from the transitive closure.
///
/// Only compile and runtime survive transitively; provided and test
/// dependencies stay with the module that declared them.
pub fn transition(inherited: Scope, declared: Scope) -> Option<Scope> {
    use Scope::*;
    match (inherited, declared) {
        (Compile, Compile) => Some(Compile),
        (Compile, Runtime) => Some(Runtime),
        (Runtime, Compile) => Some(Runtime),
        (Runtime, Runtime) => Some(Runtime),
        _ => None,
    }
}
