//! Dependency-chain tracker. Records specifier → importer edges observed
//! during resolution and reconstructs the shortest chain from the synthetic
//! entrypoint to an offending module.

use crate::error::Alternative;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// What kind of resolve attempt produced a [`ResolutionRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    Entry,
    BareRuntime,
    BarePackage,
    Relative,
    Absolute,
    Aliased,
    StubIgnored,
    Forbidden,
}

/// One observed `(specifier, importer, kind)` tuple.
#[derive(Debug, Clone)]
pub struct ResolutionRecord {
    pub specifier: String,
    pub importer: PathBuf,
    pub kind: ResolutionKind,
    pub resolved_path: Option<PathBuf>,
    /// Suggested replacement, present only when `kind` is `Forbidden` and the
    /// policy has one on file for this specifier.
    pub alternative: Option<Alternative>,
}

/// Per-build adjacency multimap (forward) plus a reverse index, so chain
/// reconstruction doesn't depend on the order resolution callbacks occurred
/// in.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    entrypoint: Option<PathBuf>,
    edges: BTreeMap<PathBuf, Vec<ResolutionRecord>>,
    importers: HashMap<PathBuf, Vec<PathBuf>>,
}

impl DependencyTracker {
    pub fn new(entrypoint: PathBuf) -> Self {
        Self { entrypoint: Some(entrypoint), edges: BTreeMap::new(), importers: HashMap::new() }
    }

    pub fn record(&mut self, record: ResolutionRecord) {
        if let Some(resolved) = &record.resolved_path {
            self.importers.entry(resolved.clone()).or_default().push(record.importer.clone());
        }
        self.edges.entry(record.importer.clone()).or_default().push(record);
    }

    /// BFS from `offender` upward through `importers` until the entrypoint is
    /// reached, returning the shortest entrypoint-to-offender chain. Order of
    /// the forward edges never affects this because reconstruction walks the
    /// reverse index.
    pub fn shortest_chain_to(&self, offender: &Path) -> Vec<PathBuf> {
        let Some(entrypoint) = &self.entrypoint else { return vec![offender.to_path_buf()] };

        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut queue: VecDeque<Vec<PathBuf>> = VecDeque::new();
        queue.push_back(vec![offender.to_path_buf()]);
        visited.insert(offender.to_path_buf());

        while let Some(path_so_far) = queue.pop_front() {
            let current = path_so_far.last().unwrap();
            if current == entrypoint {
                let mut chain = path_so_far;
                chain.reverse();
                return chain;
            }
            for importer in self.importers.get(current).into_iter().flatten() {
                if visited.insert(importer.clone()) {
                    let mut next = path_so_far.clone();
                    next.push(importer.clone());
                    queue.push_back(next);
                }
            }
        }

        // Disconnected from the entrypoint (shouldn't happen for a real
        // resolution failure); fall back to entrypoint + offender.
        vec![entrypoint.clone(), offender.to_path_buf()]
    }

    pub fn edges(&self) -> impl Iterator<Item = &ResolutionRecord> {
        self.edges.values().flatten()
    }
}
