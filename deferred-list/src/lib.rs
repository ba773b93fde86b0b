//! Ordered container that tolerates mutation during iteration.
//!
//! While the list is locked (iteration in progress), `add`/`remove` queue a
//! pending operation instead of mutating the backing storage immediately.
//! Unlocking back to zero commits every queued operation in one left-to-right
//! pass. This is the single primitive both the entity child list and the
//! collision detector's child list are built on.

use std::cmp::Ordering;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeferredListError {
    #[error("index {0} is out of range")]
    InvalidIndex(usize),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum PendingOp {
    None,
    Add,
    Remove,
}

struct Slot<T> {
    item: T,
    valid: bool,
    op: PendingOp,
}

/// Ordered, lockable sequence of `T`.
///
/// Pass a comparator to `with_comparator` to get the sorted ("z-list")
/// behavior described in the spec; omit one for a plain ordered list.
pub struct DeferredList<T> {
    slots: Vec<Slot<T>>,
    locks: u32,
    comparator: Option<Box<dyn Fn(&T, &T) -> Ordering>>,
}

impl<T> Default for DeferredList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeferredList<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new(), locks: 0, comparator: None }
    }

    pub fn with_comparator(cmp: impl Fn(&T, &T) -> Ordering + 'static) -> Self {
        Self { slots: Vec::new(), locks: 0, comparator: Some(Box::new(cmp)) }
    }

    pub fn is_locked(&self) -> bool {
        self.locks > 0
    }

    pub fn lock(&mut self) {
        self.locks += 1;
    }

    /// Decrements the lock count; commits all pending ops once it reaches zero.
    ///
    /// Calling this without a matching `lock` is a programmer error: it
    /// panics in debug builds and is a saturating no-op in release.
    pub fn unlock(&mut self) {
        self.unlock_notify(|_| {}, |_| {});
    }

    /// Like `unlock`, but calls `on_add`/`on_remove` for every entry that
    /// actually gets committed this call — used by callers (such as the
    /// collision detector) that must replay the same ops into a second
    /// structure once the lock drops to zero.
    pub fn unlock_notify(&mut self, mut on_add: impl FnMut(&T), mut on_remove: impl FnMut(&T)) {
        debug_assert!(self.locks > 0, "unlock() called without a matching lock()");
        self.locks = self.locks.saturating_sub(1);
        if self.locks == 0 {
            self.commit(&mut on_add, &mut on_remove);
        }
    }

    fn commit(&mut self, on_add: &mut impl FnMut(&T), on_remove: &mut impl FnMut(&T)) {
        let old = std::mem::take(&mut self.slots);
        for mut slot in old {
            match slot.op {
                PendingOp::Remove => {
                    on_remove(&slot.item);
                    continue;
                }
                PendingOp::Add => {
                    slot.valid = true;
                    slot.op = PendingOp::None;
                    on_add(&slot.item);
                    self.insert_sorted(slot);
                }
                PendingOp::None => {
                    if slot.valid {
                        self.slots.push(slot);
                    }
                }
            }
        }
    }

    /// Places `slot` at the end, then bubbles it back against the preceding
    /// prefix if a comparator is set; stable for equal keys.
    fn insert_sorted(&mut self, slot: Slot<T>) {
        match &self.comparator {
            None => self.slots.push(slot),
            Some(cmp) => {
                let pos = self.slots.partition_point(|s| cmp(&s.item, &slot.item) != Ordering::Greater);
                self.slots.insert(pos, slot);
            }
        }
    }

    pub fn add(&mut self, item: T) {
        let slot = Slot { item, valid: self.locks == 0, op: if self.locks == 0 { PendingOp::None } else { PendingOp::Add } };
        if self.locks == 0 {
            self.insert_sorted(slot);
        } else {
            self.slots.push(slot);
        }
    }

    /// Index among entries currently visible (valid, including ones already
    /// queued for removal — they stay visible until commit).
    fn physical_index_of_nth_valid(&self, n: usize) -> Option<usize> {
        self.slots.iter().enumerate().filter(|(_, s)| s.valid).nth(n).map(|(i, _)| i)
    }

    pub fn remove_index(&mut self, index: usize) -> Result<(), DeferredListError> {
        let phys = self.physical_index_of_nth_valid(index).ok_or(DeferredListError::InvalidIndex(index))?;
        if self.locks == 0 {
            self.slots.remove(phys);
        } else {
            self.slots[phys].op = PendingOp::Remove;
        }
        Ok(())
    }

    pub fn remove(&mut self, item: &T) -> bool
    where
        T: PartialEq,
    {
        let found = self.slots.iter().position(|s| s.valid && &s.item == item);
        match found {
            Some(phys) => {
                if self.locks == 0 {
                    self.slots.remove(phys);
                } else {
                    self.slots[phys].op = PendingOp::Remove;
                }
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        if self.locks == 0 {
            self.slots.clear();
        } else {
            for slot in self.slots.iter_mut() {
                if slot.valid {
                    slot.op = PendingOp::Remove;
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.valid).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.physical_index_of_nth_valid(index).map(|i| &self.slots[i].item)
    }

    /// Iterates the entries observable right now: valid entries, in order.
    /// A queued add is not yet valid (hidden); a queued remove stays valid
    /// (visible) until the list unlocks and commits.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter(|s| s.valid).map(|s| &s.item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_without_lock_is_immediate() {
        let mut list = DeferredList::new();
        list.add(1);
        list.add(2);
        list.add(3);
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(list.remove(&2));
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn mutation_during_lock_is_deferred() {
        let mut list = DeferredList::new();
        list.add(1);
        list.add(2);
        list.lock();
        list.add(3);
        list.remove(&1);
        // a queued add isn't visible yet; a queued remove stays visible
        // until the list unlocks and commits.
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        list.unlock();
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn nested_locks_only_commit_at_zero() {
        let mut list = DeferredList::new();
        list.add(1);
        list.lock();
        list.lock();
        list.add(2);
        list.unlock();
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![1]);
        list.unlock();
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn sorted_list_keeps_order_stable_for_equal_keys() {
        let mut list: DeferredList<(i32, &'static str)> = DeferredList::with_comparator(|a, b| a.0.cmp(&b.0));
        list.add((2, "b"));
        list.add((1, "a"));
        list.add((1, "c"));
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![(1, "a"), (1, "c"), (2, "b")]);
    }

    #[test]
    fn sorted_deferred_add_bubbles_into_place_on_commit() {
        let mut list: DeferredList<i32> = DeferredList::with_comparator(|a, b| a.cmp(b));
        list.add(5);
        list.add(10);
        list.lock();
        list.add(7);
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![5, 10]);
        list.unlock();
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![5, 7, 10]);
    }

    #[test]
    fn remove_index_out_of_range_errors() {
        let mut list: DeferredList<i32> = DeferredList::new();
        list.add(1);
        assert_eq!(list.remove_index(5), Err(DeferredListError::InvalidIndex(5)));
    }

    #[test]
    fn clear_during_lock_stays_visible_until_commit() {
        let mut list = DeferredList::new();
        list.add(1);
        list.add(2);
        list.lock();
        list.clear();
        assert_eq!(list.len(), 2);
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        list.unlock();
        assert!(list.is_empty());
    }
}
