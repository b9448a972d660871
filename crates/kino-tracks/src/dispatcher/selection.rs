//! Representation selection helpers

use crate::manifest::Representation;
use std::rc::Rc;

/// Sort by ascending bitrate. Stable: equal bitrates keep their order.
pub fn sort_by_bitrate(mut representations: Vec<Rc<Representation>>) -> Vec<Rc<Representation>> {
    representations.sort_by_key(|r| r.bitrate());
    representations
}

/// True if both lists hold the same representation ids in the same order
pub fn has_same_representations(a: &[Rc<Representation>], b: &[Rc<Representation>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.id() == y.id())
}

/// Playable subset of a locked list, lock order preserved
pub fn playable_subset(locked: &[Rc<Representation>]) -> Vec<Rc<Representation>> {
    locked.iter().filter(|r| r.is_playable()).cloned().collect()
}
