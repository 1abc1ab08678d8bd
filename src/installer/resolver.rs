//! Install-order resolution
//!
//! Dependencies install before their dependents. Ties keep the modlist's own
//! order, and a cycle anywhere falls back to that order unchanged.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

use crate::modlist::{Dependency, ModDescriptor};

/// Order `mods` so every dependency precedes its dependents.
///
/// An edge `dep -> mod` exists when `mod` declares a dependency matching
/// another mod of the batch (id first, then normalized name) that is not in
/// `already_installed`. Returns indices into `mods`.
pub fn resolve_install_order(mods: &[ModDescriptor], already_installed: &HashSet<String>) -> Vec<usize> {
    let n = mods.len();
    let installed: HashSet<String> = already_installed.iter().map(|s| s.to_lowercase()).collect();

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree: Vec<usize> = vec![0; n];

    for (dependent, descriptor) in mods.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in &descriptor.dependencies {
            if is_installed(dep, &installed) {
                continue;
            }
            let Some(provider) = mods.iter().position(|m| dep.matches(m)) else {
                continue;
            };
            if mods[provider]
                .id()
                .is_some_and(|id| installed.contains(&id.to_lowercase()))
            {
                continue;
            }
            if seen.insert(provider) {
                successors[provider].push(dependent);
                in_degree[dependent] += 1;
            }
        }
    }

    // FIFO seeded in input order keeps unrelated mods where they were
    let mut ready: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(node) = ready.pop_front() {
        order.push(node);
        for &succ in &successors[node] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                ready.push_back(succ);
            }
        }
    }

    if order.len() < n {
        warn!(
            "Dependency cycle among {} mod(s), keeping modlist order",
            n - order.len()
        );
        return (0..n).collect();
    }

    debug!("Resolved install order for {} mods", n);
    order
}

/// Reorder a batch by [`resolve_install_order`]
pub fn resolve(mods: Vec<ModDescriptor>, already_installed: &HashSet<String>) -> Vec<ModDescriptor> {
    let order = resolve_install_order(&mods, already_installed);
    let mut slots: Vec<Option<ModDescriptor>> = mods.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

fn is_installed(dep: &Dependency, installed: &HashSet<String>) -> bool {
    dep.id
        .as_deref()
        .is_some_and(|id| installed.contains(&id.to_lowercase()))
}
