//! The component constraint solver (§4.3): deterministic Transform
//! ordering from declared `provides`/`requires` capability sets, replacing
//! the ad-hoc `priority` integers the original system used (§9). Priorities
//! remain only as a tiebreaker for transforms with no constraints at all.

use crate::error::SpaceError;
use std::collections::HashMap;

/// One Transform's declared capability edges, captured at registration
/// time so the solver never needs to borrow the component trait objects.
#[derive(Debug, Clone)]
pub struct TransformSpec {
    pub index: usize,
    pub name: String,
    pub provides: Vec<String>,
    pub requires: Vec<String>,
}

pub struct ConstraintSolver;

impl ConstraintSolver {
    /// Produces a stable topological order over `specs`: edges run from
    /// providers to requirers, cycles are detected via DFS with a
    /// recursion stack (reporting the offending component), missing
    /// providers are reported by name, and transforms with no constraints
    /// retain their registration order.
    pub fn order(specs: &[TransformSpec]) -> Result<Vec<usize>, SpaceError> {
        let mut provider_of: HashMap<&str, usize> = HashMap::new();
        for spec in specs {
            for cap in &spec.provides {
                provider_of.insert(cap.as_str(), spec.index);
            }
        }

        let mut missing = Vec::new();
        for spec in specs {
            for cap in &spec.requires {
                if !provider_of.contains_key(cap.as_str()) {
                    missing.push((spec.name.clone(), cap.clone()));
                }
            }
        }
        if !missing.is_empty() {
            let msg = missing
                .iter()
                .map(|(name, cap)| format!("'{name}' requires unresolved capability '{cap}' (no transform provides it)"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SpaceError::Structural(msg));
        }

        // edges[i] = set of indices that must run before i (i requires
        // something j provides).
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
        for spec in specs {
            for cap in &spec.requires {
                if let Some(&provider) = provider_of.get(cap.as_str()) {
                    if provider != spec.index {
                        edges[spec.index].push(provider);
                    }
                }
            }
        }

        let mut order = Vec::with_capacity(specs.len());
        let mut visited = vec![false; specs.len()];
        let mut on_stack = vec![false; specs.len()];

        // Visit in registration order so unconstrained transforms keep
        // their registration order in the output.
        for start in 0..specs.len() {
            if !visited[start] {
                Self::visit(start, specs, &edges, &mut visited, &mut on_stack, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit(
        node: usize,
        specs: &[TransformSpec],
        edges: &[Vec<usize>],
        visited: &mut [bool],
        on_stack: &mut [bool],
        order: &mut Vec<usize>,
    ) -> Result<(), SpaceError> {
        on_stack[node] = true;
        for &dep in &edges[node] {
            if on_stack[dep] {
                return Err(SpaceError::Structural(format!(
                    "transform dependency cycle: '{}' and '{}' require each other (directly or transitively)",
                    specs[node].name, specs[dep].name
                )));
            }
            if !visited[dep] {
                Self::visit(dep, specs, edges, visited, on_stack, order)?;
            }
        }
        on_stack[node] = false;
        if !visited[node] {
            visited[node] = true;
            order.push(node);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(index: usize, name: &str, provides: &[&str], requires: &[&str]) -> TransformSpec {
        TransformSpec {
            index,
            name: name.to_string(),
            provides: provides.iter().map(|s| s.to_string()).collect(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn provider_runs_before_requirer() {
        let specs = vec![spec(0, "consumer", &[], &["x"]), spec(1, "producer", &["x"], &[])];
        let order = ConstraintSolver::order(&specs).unwrap();
        let pos_producer = order.iter().position(|&i| i == 1).unwrap();
        let pos_consumer = order.iter().position(|&i| i == 0).unwrap();
        assert!(pos_producer < pos_consumer);
    }

    #[test]
    fn unconstrained_transforms_keep_registration_order() {
        let specs = vec![spec(0, "a", &[], &[]), spec(1, "b", &[], &[]), spec(2, "c", &[], &[])];
        let order = ConstraintSolver::order(&specs).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn cycle_is_rejected_naming_both_components() {
        let specs = vec![spec(0, "a", &["x"], &["y"]), spec(1, "b", &["y"], &["x"])];
        let err = ConstraintSolver::order(&specs).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains('a') && msg.contains('b'));
    }

    #[test]
    fn missing_provider_is_reported_by_capability_and_name() {
        let specs = vec![spec(0, "consumer", &[], &["ghost"])];
        let err = ConstraintSolver::order(&specs).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("consumer"));
        assert!(msg.contains("ghost"));
    }

    #[test]
    fn self_requiring_provider_is_not_a_cycle() {
        let specs = vec![spec(0, "solo", &["x"], &["x"])];
        assert!(ConstraintSolver::order(&specs).is_ok());
    }
}
