use crate::task::{ArcStr, TaskId};

/// Ordered record of the bundles that produced a styles task.
///
/// One registry belongs to one graph construction. Entries are appended in
/// bundle declaration order and never removed, later bundles only read them.
#[derive(Debug, Default)]
pub struct StyleRegistry {
    entries: Vec<(ArcStr, TaskId)>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the styles task of `bundle`. A bundle is recorded at most once,
    /// returns `false` if it was already present.
    pub fn register(&mut self, bundle: &str, task: TaskId) -> bool {
        if self.get(bundle).is_some() {
            return false;
        }
        self.entries.push((bundle.into(), task));
        true
    }

    pub fn get(&self, bundle: &str) -> Option<&TaskId> {
        self.entries
            .iter()
            .find(|(name, _)| &**name == bundle)
            .map(|(_, task)| task)
    }

    /// Styles tasks of the given dependencies that exist, in registry order
    /// rather than in the order the dependencies are listed.
    pub fn upstream<'a>(&'a self, dependencies: &'a [String]) -> impl Iterator<Item = &'a TaskId> + 'a {
        self.entries
            .iter()
            .filter(|(name, _)| dependencies.iter().any(|dep| **dep == **name))
            .map(|(_, task)| task)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
