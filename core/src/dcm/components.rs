//! Partitions live figures into independently-solvable components, so
//! `LOCAL` solves and drag reseats can touch only the figures a change can
//! actually affect.
//!
//! Per `SPEC_FULL.md` §4.6 / §9, components are rebuilt from scratch on
//! every removal rather than maintained incrementally — the original's
//! incremental edge-removal path has an off-by-one for single-object
//! constraints, and a full rebuild sidesteps the bug entirely rather than
//! inheriting it.

use std::collections::{HashMap, HashSet};

use super::id::Identifier;

/// figure id -> component id, plus component id -> member figures.
#[derive(Debug, Clone, Default)]
pub struct ComponentTracker {
    component_of: HashMap<Identifier, usize>,
    members: Vec<HashSet<Identifier>>,
}

impl ComponentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh singleton component for `figure`, then merge it
    /// with every figure it already structurally references.
    pub fn on_figure_created(&mut self, figure: Identifier, structural_refs: &[Identifier]) {
        let cid = self.members.len();
        self.members.push(HashSet::from([figure]));
        self.component_of.insert(figure, cid);
        if !structural_refs.is_empty() {
            let mut ids = vec![figure];
            ids.extend_from_slice(structural_refs);
            self.merge_components(&ids);
        }
    }

    pub fn on_requirement_added(&mut self, object_ids: &[Identifier]) {
        self.merge_components(object_ids);
    }

    /// Union the components containing each id in `ids`: the first id's
    /// component becomes the target, every figure from the others'
    /// components migrates into it, and the emptied components are left
    /// as empty entries (not removed, so existing component ids elsewhere
    /// stay valid).
    pub fn merge_components(&mut self, ids: &[Identifier]) {
        let mut target: Option<usize> = None;
        for id in ids {
            let Some(&cid) = self.component_of.get(id) else { continue };
            match target {
                None => target = Some(cid),
                Some(t) if t == cid => {}
                Some(t) => {
                    let migrated: Vec<Identifier> = self.members[cid].drain().collect();
                    for fid in migrated {
                        self.component_of.insert(fid, t);
                        self.members[t].insert(fid);
                    }
                }
            }
        }
    }

    pub fn component_of(&self, figure: Identifier) -> Option<usize> {
        self.component_of.get(&figure).copied()
    }

    pub fn figures_in_component(&self, cid: usize) -> Vec<Identifier> {
        self.members.get(cid).map(|set| set.iter().copied().collect()).unwrap_or_default()
    }

    /// Number of components with at least one member.
    pub fn active_component_count(&self) -> usize {
        self.members.iter().filter(|m| !m.is_empty()).count()
    }

    pub fn clear(&mut self) {
        self.component_of.clear();
        self.members.clear();
    }

    /// Rebuild the whole partition from scratch: one singleton component
    /// per live figure, then merged by each figure's structural references
    /// and each live constraint's referenced figures, in that order. Used
    /// after any removal.
    pub fn rebuild<'a>(
        &mut self,
        figures: impl Iterator<Item = Identifier>,
        structural_edges: impl Iterator<Item = (Identifier, Identifier)>,
        constraint_edges: impl Iterator<Item = &'a [Identifier]>,
    ) {
        self.clear();
        for figure in figures {
            let cid = self.members.len();
            self.members.push(HashSet::from([figure]));
            self.component_of.insert(figure, cid);
        }
        for (a, b) in structural_edges {
            self.merge_components(&[a, b]);
        }
        for object_ids in constraint_edges {
            self.merge_components(object_ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> Identifier {
        Identifier::from_raw(n)
    }

    #[test]
    fn singleton_components_stay_separate() {
        let mut tracker = ComponentTracker::new();
        tracker.on_figure_created(id(1), &[]);
        tracker.on_figure_created(id(2), &[]);
        assert_ne!(tracker.component_of(id(1)), tracker.component_of(id(2)));
        assert_eq!(tracker.active_component_count(), 2);
    }

    #[test]
    fn structural_reference_merges_on_creation() {
        let mut tracker = ComponentTracker::new();
        tracker.on_figure_created(id(1), &[]);
        tracker.on_figure_created(id(2), &[]);
        tracker.on_figure_created(id(3), &[id(1), id(2)]);
        assert_eq!(tracker.component_of(id(1)), tracker.component_of(id(3)));
        assert_eq!(tracker.component_of(id(2)), tracker.component_of(id(3)));
        assert_eq!(tracker.active_component_count(), 1);
    }

    #[test]
    fn requirement_merges_two_components() {
        let mut tracker = ComponentTracker::new();
        tracker.on_figure_created(id(1), &[]);
        tracker.on_figure_created(id(2), &[]);
        assert_eq!(tracker.active_component_count(), 2);
        tracker.on_requirement_added(&[id(1), id(2)]);
        assert_eq!(tracker.component_of(id(1)), tracker.component_of(id(2)));
        assert_eq!(tracker.active_component_count(), 1);
    }

    #[test]
    fn rebuild_reproduces_same_partition() {
        let mut tracker = ComponentTracker::new();
        let figures = vec![id(1), id(2), id(3), id(4)];
        let structural = vec![(id(3), id(1)), (id(3), id(2))];
        let constraints: Vec<Vec<Identifier>> = vec![];
        let constraint_refs: Vec<&[Identifier]> = constraints.iter().map(|v| v.as_slice()).collect();
        tracker.rebuild(figures.into_iter(), structural.into_iter(), constraint_refs.into_iter());
        assert_eq!(tracker.component_of(id(1)), tracker.component_of(id(3)));
        assert_ne!(tracker.component_of(id(1)), tracker.component_of(id(4)));
        assert_eq!(tracker.active_component_count(), 2);
    }
}
