//! Per-tick glue: a stack of layers, each owning an entity graph, a
//! collision detector over that graph, and an opaque per-layer audio state.
//! The audio state type is left generic (`A`) so this crate never needs to
//! know about `audio-system`'s mixer internals — the host wires the two
//! together each tick via `LayerStack::active_audio`.

use collision::{CollisionDetector, Rect};
use tracing::debug;

use crate::entity::{EntityArena, EntityKey, Pose};
use crate::error::EngineError;

pub struct Layer<A> {
    pub entities: EntityArena,
    pub root: EntityKey,
    pub collisions: CollisionDetector<EntityKey>,
    pub audio: A,
}

impl<A> Layer<A> {
    pub fn new(bounds: Rect, audio: A) -> Result<Self, EngineError> {
        let mut entities = EntityArena::new();
        let root = entities.spawn(Pose::default());
        let collisions = CollisionDetector::new(bounds)?;
        Ok(Self { entities, root, collisions, audio })
    }

    pub fn spawn_child(&mut self, parent: EntityKey, pose: Pose) -> EntityKey {
        let child = self.entities.spawn(pose);
        self.entities.add_child(parent, child);
        child
    }

    /// Registers `key` with the collision tree. Queued (not applied until
    /// `run_tick`'s collision phase unlocks) if called while a tick is
    /// already iterating.
    pub fn track(&mut self, key: EntityKey) {
        self.collisions.insert(key, &self.entities);
    }

    pub fn untrack(&mut self, key: EntityKey) -> Result<(), EngineError> {
        self.collisions.remove(key).map_err(Into::into)
    }

    /// Runs one scripted tick: visits the root's children in update order
    /// under lock (so the hook may freely add/remove children without
    /// corrupting the traversal), then resolves this tick's collisions.
    pub fn run_tick<F, C>(&mut self, mut update_hook: F, mut on_collision: C)
    where
        F: FnMut(&mut EntityArena, EntityKey),
        C: FnMut(EntityKey, EntityKey),
    {
        self.entities.lock_children(self.root);
        let order: Vec<EntityKey> = self.entities.children(self.root).collect();
        debug!(count = order.len(), "running entity update hook");
        for key in order {
            update_hook(&mut self.entities, key);
        }
        self.entities.unlock_children(self.root);

        self.collisions.for_each_collision(&self.entities, |a, b| on_collision(a, b));
    }
}

/// A push/pop stack of layers; the top is "active" and is what the mixer and
/// collision queries should drive each tick.
pub struct LayerStack<A> {
    layers: Vec<Layer<A>>,
}

impl<A> Default for LayerStack<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> LayerStack<A> {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn push(&mut self, layer: Layer<A>) {
        self.layers.push(layer);
    }

    pub fn pop(&mut self) -> Option<Layer<A>> {
        self.layers.pop()
    }

    pub fn active(&self) -> Option<&Layer<A>> {
        self.layers.last()
    }

    pub fn active_mut(&mut self) -> Option<&mut Layer<A>> {
        self.layers.last_mut()
    }

    pub fn active_audio(&self) -> Result<&A, EngineError> {
        self.active().map(|l| &l.audio).ok_or(EngineError::NoActiveLayer)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collision::Point;

    fn bounds() -> Rect {
        Rect::new(Point::new(-50.0, -50.0), Point::new(50.0, 50.0))
    }

    #[test]
    fn run_tick_visits_children_and_reports_collisions() {
        let mut layer = Layer::new(bounds(), ()).unwrap();
        let a = layer.spawn_child(layer.root, Pose::default());
        let b = layer.spawn_child(layer.root, Pose { x: 0.2, ..Pose::default() });
        layer.track(a);
        layer.track(b);

        let mut visited = Vec::new();
        let mut collided = Vec::new();
        layer.run_tick(
            |arena, key| {
                visited.push(key);
                let _ = arena.version(key);
            },
            |e1, e2| collided.push((e1, e2)),
        );
        assert_eq!(visited.len(), 2);
        // meshless entities have degenerate (zero-area) bounds and an empty
        // triangle list, so they never report as colliding.
        assert_eq!(collided.len(), 0);
    }

    #[test]
    fn layer_stack_tracks_active_layer() {
        let mut stack: LayerStack<i32> = LayerStack::new();
        assert!(stack.active_audio().is_err());
        stack.push(Layer::new(bounds(), 1).unwrap());
        stack.push(Layer::new(bounds(), 2).unwrap());
        assert_eq!(*stack.active_audio().unwrap(), 2);
        stack.pop();
        assert_eq!(*stack.active_audio().unwrap(), 1);
    }
}
