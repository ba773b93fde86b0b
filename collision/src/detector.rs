//! Lockable wrapper around a `CollisionTree` that defers insert/remove while
//! a query is iterating, replaying them into the tree on final unlock.

use std::hash::Hash;

use deferred_list::DeferredList;

use crate::error::CollisionError;
use crate::rect::Rect;
use crate::tree::{CollisionSource, CollisionTree};

pub struct CollisionDetector<K: Copy + Eq + Hash> {
    tree: CollisionTree<K>,
    children: DeferredList<K>,
}

impl<K: Copy + Eq + Hash> CollisionDetector<K> {
    pub fn new(root_rect: Rect) -> Result<Self, CollisionError> {
        Ok(Self { tree: CollisionTree::new(root_rect)?, children: DeferredList::new() })
    }

    pub fn insert(&mut self, key: K, source: &impl CollisionSource<K>) {
        if self.children.is_locked() {
            self.children.add(key);
        } else {
            self.children.add(key);
            self.tree.insert(key, source);
        }
    }

    pub fn remove(&mut self, key: K) -> Result<(), CollisionError> {
        if self.children.is_locked() {
            self.children.remove(&key);
            Ok(())
        } else {
            self.children.remove(&key);
            self.tree.remove(key)
        }
    }

    /// Begin an iteration scope: insert/remove calls made before matching
    /// `unlock` are queued instead of applied to the tree immediately.
    pub fn lock(&mut self) {
        self.children.lock();
    }

    /// Ends an iteration scope. On the transition to fully unlocked, replays
    /// every queued insert/remove into the tree.
    pub fn unlock(&mut self, source: &impl CollisionSource<K>) {
        // SAFETY-free note: `tree` can't be touched from inside the closures
        // (they only see `&K`), so we stage ops and apply them afterward.
        let mut added = Vec::new();
        let mut removed = Vec::new();
        self.children.unlock_notify(|k| added.push(*k), |k| removed.push(*k));
        for key in added {
            self.tree.insert(key, source);
        }
        for key in removed {
            let _ = self.tree.remove(key);
        }
    }

    pub fn for_each_collision(&mut self, source: &impl CollisionSource<K>, visit: impl FnMut(K, K)) {
        self.tree.for_each_collision(source, visit);
    }

    pub fn for_each_collision_filtered(&mut self, source: &impl CollisionSource<K>, group1: u32, group2: u32, visit: impl FnMut(K, K)) {
        self.tree.for_each_collision_filtered(source, group1, group2, visit);
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn contains(&self, key: K) -> bool {
        self.tree.contains(key)
    }

    pub fn clear(&mut self) {
        self.tree.clear();
        self.children.clear();
    }
}
