//! Quadtree over entity bounding rectangles.
//!
//! The tree stores only keys; all geometry (bounds, version, group, mesh)
//! is fetched from a `CollisionSource` on demand so the tree itself never
//! goes stale — it is revalidated against the source at the start of every
//! query.

use std::collections::HashMap;
use std::hash::Hash;

use slotmap::{new_key_type, SlotMap};

use crate::error::CollisionError;
use crate::intersect::{mesh_intersects, Triangle};
use crate::rect::{Point, Rect};

/// Leaves with more entries than this are split on the next insert.
pub const SPLIT_THRESHOLD: usize = 15;

new_key_type! {
    struct NodeKey;
}

/// What the tree needs to know about a key, fetched fresh on every query.
pub trait CollisionSource<K> {
    fn bounds(&self, key: K) -> Rect;
    fn version(&self, key: K) -> u64;
    fn group(&self, key: K) -> u32;
    /// Mesh triangles already transformed into absolute space.
    fn triangles(&self, key: K) -> Vec<Triangle>;
}

struct Entry<K> {
    key: K,
    version_at_insert: u64,
}

struct Node<K> {
    rect: Rect,
    entries: Vec<Entry<K>>,
    children: Option<[NodeKey; 4]>,
}

pub struct CollisionTree<K: Copy + Eq + Hash> {
    nodes: SlotMap<NodeKey, Node<K>>,
    root: NodeKey,
    index: HashMap<K, NodeKey>,
}

impl<K: Copy + Eq + Hash> CollisionTree<K> {
    pub fn new(root_rect: Rect) -> Result<Self, CollisionError> {
        if root_rect.width() <= 0.0 || root_rect.height() <= 0.0 {
            return Err(CollisionError::InvalidArgument);
        }
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node { rect: root_rect, entries: Vec::new(), children: None });
        Ok(Self { nodes, root, index: HashMap::new() })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: K) -> bool {
        self.index.contains_key(&key)
    }

    pub fn root_has_children(&self) -> bool {
        self.nodes[self.root].children.is_some()
    }

    pub fn root_entry_count(&self) -> usize {
        self.nodes[self.root].entries.len()
    }

    /// The rectangle of the node an entity currently lives in, for tests that
    /// check promotion to an ancestor after a bounds change.
    pub fn node_rect_for(&self, key: K) -> Option<Rect> {
        self.index.get(&key).map(|node| self.nodes[*node].rect)
    }

    pub fn insert(&mut self, key: K, source: &impl CollisionSource<K>) {
        self.insert_into(self.root, key, source);
    }

    fn insert_into(&mut self, node: NodeKey, key: K, source: &impl CollisionSource<K>) {
        let bounds = source.bounds(key);
        if let Some(children) = self.nodes[node].children {
            for child in children {
                if self.nodes[child].rect.strictly_contains(&bounds) {
                    self.insert_into(child, key, source);
                    return;
                }
            }
        }
        self.nodes[node].entries.push(Entry { key, version_at_insert: source.version(key) });
        self.index.insert(key, node);
        if self.nodes[node].children.is_none() && self.nodes[node].entries.len() > SPLIT_THRESHOLD {
            self.try_split(node, source);
        }
    }

    fn try_split(&mut self, node: NodeKey, source: &impl CollisionSource<K>) {
        let rect = self.nodes[node].rect;
        let entries = &self.nodes[node].entries;
        if entries.is_empty() {
            return;
        }

        let mut sum_min = Point::new(0.0, 0.0);
        let mut sum_max = Point::new(0.0, 0.0);
        let mut bounds_list = Vec::with_capacity(entries.len());
        for entry in entries {
            let b = source.bounds(entry.key);
            sum_min.x += b.min.x;
            sum_min.y += b.min.y;
            sum_max.x += b.max.x;
            sum_max.y += b.max.y;
            bounds_list.push(b);
        }
        let n = entries.len() as f32;
        let center = Point::new((sum_min.x + sum_max.x) / (2.0 * n), (sum_min.y + sum_max.y) / (2.0 * n));
        let quadrants = rect.quadrants(center);

        let mut child_keys = [NodeKey::default(); 4];
        for (i, quadrant) in quadrants.into_iter().enumerate() {
            child_keys[i] = self.nodes.insert(Node { rect: quadrant, entries: Vec::new(), children: None });
        }

        let old_entries = std::mem::take(&mut self.nodes[node].entries);
        let mut remaining = Vec::new();
        for (entry, bounds) in old_entries.into_iter().zip(bounds_list) {
            let mut placed = false;
            for &child in &child_keys {
                if self.nodes[child].rect.strictly_contains(&bounds) {
                    self.index.insert(entry.key, child);
                    self.nodes[child].entries.push(entry);
                    placed = true;
                    break;
                }
            }
            if !placed {
                remaining.push(entry);
            }
        }
        self.nodes[node].entries = remaining;
        self.nodes[node].children = Some(child_keys);
    }

    pub fn remove(&mut self, key: K) -> Result<(), CollisionError> {
        let node = self.index.remove(&key).ok_or(CollisionError::NotTracked)?;
        self.nodes[node].entries.retain(|e| e.key != key);
        Ok(())
    }

    pub fn clear(&mut self) {
        let root_rect = self.nodes[self.root].rect;
        self.nodes.clear();
        self.index.clear();
        self.root = self.nodes.insert(Node { rect: root_rect, entries: Vec::new(), children: None });
    }

    /// Re-settles any entity whose bounds version has drifted since it was
    /// last placed, then prunes empty subtrees. Runs at the start of every
    /// query.
    pub fn validate(&mut self, source: &impl CollisionSource<K>) {
        let mut stale = Vec::new();
        for (&key, &node) in self.index.iter() {
            if let Some(entry) = self.nodes[node].entries.iter().find(|e| e.key == key) {
                if entry.version_at_insert != source.version(key) {
                    stale.push(key);
                }
            }
        }
        for key in stale {
            if let Some(node) = self.index.remove(&key) {
                self.nodes[node].entries.retain(|e| e.key != key);
                self.insert_into(self.root, key, source);
            }
        }
        self.prune(self.root);
    }

    /// Returns true if `node` is, after this call, an empty leaf.
    fn prune(&mut self, node: NodeKey) -> bool {
        let children = self.nodes[node].children;
        if let Some(child_keys) = children {
            let mut all_empty = true;
            for child in child_keys {
                if !self.prune(child) {
                    all_empty = false;
                }
            }
            if all_empty && self.nodes[node].entries.is_empty() {
                for child in child_keys {
                    self.nodes.remove(child);
                }
                self.nodes[node].children = None;
            }
        }
        self.nodes[node].children.is_none() && self.nodes[node].entries.is_empty()
    }

    fn entities_intersect(&self, a: K, b: K, source: &impl CollisionSource<K>) -> bool {
        let ba = source.bounds(a);
        let bb = source.bounds(b);
        if !ba.overlaps(&bb) {
            return false;
        }
        mesh_intersects(&source.triangles(a), &source.triangles(b))
    }

    /// Visits every intersecting unordered pair exactly once.
    pub fn for_each_collision(&mut self, source: &impl CollisionSource<K>, mut visit: impl FnMut(K, K)) {
        self.validate(source);
        self.collision_node(self.root, source, &mut visit);
    }

    fn collision_node(&self, node: NodeKey, source: &impl CollisionSource<K>, visit: &mut impl FnMut(K, K)) {
        let n = &self.nodes[node];
        for i in 0..n.entries.len() {
            let e1 = n.entries[i].key;
            for entry in &n.entries[i + 1..] {
                if self.entities_intersect(e1, entry.key, source) {
                    visit(e1, entry.key);
                }
            }
            if let Some(children) = n.children {
                for child in children {
                    self.descendant_pairs(child, e1, source, visit);
                }
            }
        }
        if let Some(children) = n.children {
            for child in children {
                self.collision_node(child, source, visit);
            }
        }
    }

    fn descendant_pairs(&self, node: NodeKey, e1: K, source: &impl CollisionSource<K>, visit: &mut impl FnMut(K, K)) {
        let n = &self.nodes[node];
        for entry in &n.entries {
            if self.entities_intersect(e1, entry.key, source) {
                visit(e1, entry.key);
            }
        }
        if let Some(children) = n.children {
            for child in children {
                self.descendant_pairs(child, e1, source, visit);
            }
        }
    }

    fn matches_group2(candidate_group: u32, group1: u32, group2: u32) -> bool {
        if group2 == 0 {
            candidate_group != group1
        } else {
            candidate_group == group2
        }
    }

    /// Visits pairs where the first entity has `group1` and the second
    /// matches `group2` (or anything not in `group1`, when `group2 == 0`).
    /// Compares against same-node, descendant, and ancestor entries.
    pub fn for_each_collision_filtered(
        &mut self,
        source: &impl CollisionSource<K>,
        group1: u32,
        group2: u32,
        mut visit: impl FnMut(K, K),
    ) {
        self.validate(source);
        let mut ancestors = Vec::new();
        self.filtered_node(self.root, source, group1, group2, &mut ancestors, &mut visit);
    }

    fn filtered_node(
        &self,
        node: NodeKey,
        source: &impl CollisionSource<K>,
        group1: u32,
        group2: u32,
        ancestors: &mut Vec<NodeKey>,
        visit: &mut impl FnMut(K, K),
    ) {
        let n = &self.nodes[node];
        for entry in &n.entries {
            if source.group(entry.key) != group1 {
                continue;
            }
            let e1 = entry.key;
            for other in &n.entries {
                if other.key == e1 {
                    continue;
                }
                if Self::matches_group2(source.group(other.key), group1, group2) && self.entities_intersect(e1, other.key, source) {
                    visit(e1, other.key);
                }
            }
            if let Some(children) = n.children {
                for child in children {
                    self.filtered_descendants(child, e1, source, group1, group2, visit);
                }
            }
            for &anc in ancestors.iter() {
                for other in &self.nodes[anc].entries {
                    if Self::matches_group2(source.group(other.key), group1, group2) && self.entities_intersect(e1, other.key, source) {
                        visit(e1, other.key);
                    }
                }
            }
        }
        if let Some(children) = n.children {
            ancestors.push(node);
            for child in children {
                self.filtered_node(child, source, group1, group2, ancestors, visit);
            }
            ancestors.pop();
        }
    }

    fn filtered_descendants(
        &self,
        node: NodeKey,
        e1: K,
        source: &impl CollisionSource<K>,
        group1: u32,
        group2: u32,
        visit: &mut impl FnMut(K, K),
    ) {
        let n = &self.nodes[node];
        for entry in &n.entries {
            if Self::matches_group2(source.group(entry.key), group1, group2) && self.entities_intersect(e1, entry.key, source) {
                visit(e1, entry.key);
            }
        }
        if let Some(children) = n.children {
            for child in children {
                self.filtered_descendants(child, e1, source, group1, group2, visit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap as Map;

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    struct Id(u32);

    struct FakeWorld {
        bounds: RefCell<Map<Id, Rect>>,
        version: RefCell<Map<Id, u64>>,
        group: Map<Id, u32>,
    }

    impl FakeWorld {
        fn new() -> Self {
            Self { bounds: RefCell::new(Map::new()), version: RefCell::new(Map::new()), group: Map::new() }
        }

        fn put(&mut self, id: Id, rect: Rect) {
            self.bounds.borrow_mut().insert(id, rect);
            self.version.borrow_mut().insert(id, 1);
        }

        fn move_to(&self, id: Id, rect: Rect) {
            self.bounds.borrow_mut().insert(id, rect);
            *self.version.borrow_mut().get_mut(&id).unwrap() += 1;
        }
    }

    impl CollisionSource<Id> for FakeWorld {
        fn bounds(&self, key: Id) -> Rect {
            self.bounds.borrow()[&key]
        }
        fn version(&self, key: Id) -> u64 {
            self.version.borrow()[&key]
        }
        fn group(&self, key: Id) -> u32 {
            *self.group.get(&key).unwrap_or(&0)
        }
        fn triangles(&self, key: Id) -> Vec<Triangle> {
            let b = self.bounds(key);
            vec![[b.min, Point::new(b.max.x, b.min.y), Point::new(b.min.x, b.max.y)], [b.max, Point::new(b.min.x, b.max.y), Point::new(b.max.x, b.min.y)]]
        }
    }

    fn world_rect() -> Rect {
        Rect::new(Point::new(-1000.0, -1000.0), Point::new(1000.0, 1000.0))
    }

    #[test]
    fn insert_splits_leaf_past_threshold() {
        let mut world = FakeWorld::new();
        let mut tree = CollisionTree::new(world_rect()).unwrap();
        for i in 0..16u32 {
            let id = Id(i);
            let x = -900.0 + i as f32 * 2.0;
            world.put(id, Rect::new(Point::new(x, x), Point::new(x + 1.0, x + 1.0)));
            tree.insert(id, &world);
        }
        assert!(tree.root_has_children());
        assert!(tree.root_entry_count() <= 12);
        assert_eq!(tree.len(), 16);
    }

    #[test]
    fn removing_everything_prunes_back_to_empty_leaf() {
        let mut world = FakeWorld::new();
        let mut tree = CollisionTree::new(world_rect()).unwrap();
        let mut ids = Vec::new();
        for i in 0..16u32 {
            let id = Id(i);
            let x = -900.0 + i as f32 * 2.0;
            world.put(id, Rect::new(Point::new(x, x), Point::new(x + 1.0, x + 1.0)));
            tree.insert(id, &world);
            ids.push(id);
        }
        for id in ids {
            tree.remove(id).unwrap();
        }
        tree.validate(&world);
        assert!(!tree.root_has_children());
        assert!(tree.is_empty());
    }

    #[test]
    fn containment_invariant_holds_after_insert() {
        let mut world = FakeWorld::new();
        let mut tree = CollisionTree::new(world_rect()).unwrap();
        world.put(Id(0), Rect::new(Point::new(0.0, 0.0), Point::new(1.0, 1.0)));
        tree.insert(Id(0), &world);
        let node_rect = tree.node_rect_for(Id(0)).unwrap();
        assert!(node_rect.strictly_contains(&world.bounds(Id(0))) || node_rect == world_rect());
    }

    #[test]
    fn version_change_promotes_entity_to_ancestor() {
        let mut world = FakeWorld::new();
        let mut tree = CollisionTree::new(world_rect()).unwrap();
        for i in 0..16u32 {
            let id = Id(i);
            let x = -900.0 + i as f32 * 2.0;
            world.put(id, Rect::new(Point::new(x, x), Point::new(x + 1.0, x + 1.0)));
            tree.insert(id, &world);
        }
        assert!(tree.root_has_children());
        let moved = Id(0);
        let before_rect = tree.node_rect_for(moved).unwrap();
        // stretch the entity across the whole world so only the root can strictly contain it
        world.move_to(moved, Rect::new(Point::new(-999.0, -999.0), Point::new(999.0, 999.0)));
        tree.validate(&world);
        let after_rect = tree.node_rect_for(moved).unwrap();
        assert_ne!(before_rect, after_rect);
        assert_eq!(after_rect, world_rect());
    }

    #[test]
    fn for_each_collision_reports_each_pair_once() {
        let mut world = FakeWorld::new();
        let mut tree = CollisionTree::new(world_rect()).unwrap();
        world.put(Id(0), Rect::new(Point::new(0.0, 0.0), Point::new(4.0, 4.0)));
        world.put(Id(1), Rect::new(Point::new(1.0, 1.0), Point::new(5.0, 5.0)));
        world.put(Id(2), Rect::new(Point::new(100.0, 100.0), Point::new(101.0, 101.0)));
        tree.insert(Id(0), &world);
        tree.insert(Id(1), &world);
        tree.insert(Id(2), &world);
        let mut pairs = Vec::new();
        tree.for_each_collision(&world, |a, b| pairs.push((a, b)));
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0] == (Id(0), Id(1)) || pairs[0] == (Id(1), Id(0)));
    }
}
