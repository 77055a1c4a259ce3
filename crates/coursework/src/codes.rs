//! Code Resolution Map: discipline code → store-assigned series id.
//!
//! Built during pass 1 of materialization and consumed by pass 2; it never
//! outlives one run.

use smallvec::SmallVec;
use std::collections::HashMap;
use uuid::Uuid;

/// Resolved prerequisite ids, most disciplines declare only a handful.
pub type PrerequisiteIds = SmallVec<[Uuid; 4]>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Distinct ids in first-declared order.
    pub ids: PrerequisiteIds,
    /// Codes with no entry in the map.
    pub unresolved: Vec<String>,
    /// Codes that resolved to the declaring series itself.
    pub self_references: Vec<String>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct CodeResolutionMap {
    ids: HashMap<String, Uuid>,
}

fn normalize(code: &str) -> &str {
    code.trim()
}

impl CodeResolutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `code → id`.
    ///
    /// The first registration of a code wins; a repeat returns the id already
    /// held so the caller can report the duplicate.
    pub fn register(&mut self, code: &str, id: Uuid) -> Result<(), Uuid> {
        let code = normalize(code);
        match self.ids.get(code) {
            Some(existing) => Err(*existing),
            None => {
                self.ids.insert(code.to_owned(), id);
                Ok(())
            }
        }
    }

    pub fn get(&self, code: &str) -> Option<Uuid> {
        self.ids.get(normalize(code)).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Maps `codes` to ids, dropping unknown codes, repeats and `self_id`.
    pub fn resolve<S: AsRef<str>>(&self, codes: &[S], self_id: Option<Uuid>) -> Resolution {
        let mut resolution = Resolution::default();
        for code in codes {
            let code = normalize(code.as_ref());
            if code.is_empty() {
                continue;
            }
            match self.ids.get(code) {
                None => resolution.unresolved.push(code.to_owned()),
                Some(id) if Some(*id) == self_id => {
                    resolution.self_references.push(code.to_owned())
                }
                Some(id) => {
                    if !resolution.ids.contains(id) {
                        resolution.ids.push(*id);
                    }
                }
            }
        }
        resolution
    }
}
