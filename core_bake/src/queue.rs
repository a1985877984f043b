//! Indexed min-heaps with decrease-key, shared by every shortest-path routine.
//!
//! [`IndexedQueue`] is one binary heap parameterised over two seams:
//!
//! - a [`QueueIndex`] that maps keys to their heap slot and best known cost
//!   ([`HashIndex`] for arbitrary keys, [`DenseIndex`] for flat raster indices);
//! - a [`Heuristic`] added to the stored cost when ordering the heap
//!   ([`NoHeuristic`] for Dijkstra, [`GeodesicHeuristic`] for A*).
//!
//! Costs stay readable after a key is popped, until the next `clear`.

use std::hash::Hash;

use ahash::AHashMap;
use bevy::math::DVec3;
use thiserror::Error;

use crate::geodesic::{sphere_distance, PixelCoord, RasterGrid};

const NO_SLOT: usize = usize::MAX;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("pop on an empty priority queue")]
    Empty,
    #[error("no cost recorded for the requested key")]
    UnknownKey,
}

/// Key to heap-slot and key to cost bookkeeping behind an [`IndexedQueue`].
pub trait QueueIndex<K> {
    fn slot(&self, key: &K) -> Option<usize>;
    fn set_slot(&mut self, key: &K, slot: usize);
    fn clear_slot(&mut self, key: &K);
    fn cost(&self, key: &K) -> Option<f64>;
    fn set_cost(&mut self, key: &K, cost: f64);
    /// Forget every key while keeping allocations.
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    slot: usize,
    cost: f64,
}

/// Hash-map bookkeeping for arbitrary copyable keys.
#[derive(Debug, Clone)]
pub struct HashIndex<K> {
    entries: AHashMap<K, IndexEntry>,
}

impl<K> Default for HashIndex<K> {
    fn default() -> Self {
        Self {
            entries: AHashMap::default(),
        }
    }
}

impl<K: Copy + Eq + Hash> QueueIndex<K> for HashIndex<K> {
    fn slot(&self, key: &K) -> Option<usize> {
        self.entries
            .get(key)
            .map(|entry| entry.slot)
            .filter(|&slot| slot != NO_SLOT)
    }

    fn set_slot(&mut self, key: &K, slot: usize) {
        self.entries
            .entry(*key)
            .or_insert(IndexEntry {
                slot: NO_SLOT,
                cost: f64::INFINITY,
            })
            .slot = slot;
    }

    fn clear_slot(&mut self, key: &K) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.slot = NO_SLOT;
        }
    }

    fn cost(&self, key: &K) -> Option<f64> {
        self.entries
            .get(key)
            .map(|entry| entry.cost)
            .filter(|cost| cost.is_finite())
    }

    fn set_cost(&mut self, key: &K, cost: f64) {
        self.entries
            .entry(*key)
            .or_insert(IndexEntry {
                slot: NO_SLOT,
                cost: f64::INFINITY,
            })
            .cost = cost;
    }

    fn reset(&mut self) {
        self.entries.clear();
    }
}

/// Array bookkeeping for keys that are flat indices into one raster.
///
/// Lookups are plain array reads. Only touched entries are rewound on
/// [`QueueIndex::reset`], so reusing one index for many small searches on a
/// large raster does not pay for a full sweep each time.
#[derive(Debug, Clone)]
pub struct DenseIndex {
    slots: Vec<usize>,
    costs: Vec<f64>,
    touched: Vec<usize>,
}

impl DenseIndex {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![NO_SLOT; len],
            costs: vec![f64::INFINITY; len],
            touched: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn touch(&mut self, key: usize) {
        if self.slots[key] == NO_SLOT && self.costs[key] == f64::INFINITY {
            self.touched.push(key);
        }
    }
}

impl QueueIndex<usize> for DenseIndex {
    fn slot(&self, key: &usize) -> Option<usize> {
        self.slots.get(*key).copied().filter(|&slot| slot != NO_SLOT)
    }

    fn set_slot(&mut self, key: &usize, slot: usize) {
        self.touch(*key);
        self.slots[*key] = slot;
    }

    fn clear_slot(&mut self, key: &usize) {
        if let Some(slot) = self.slots.get_mut(*key) {
            *slot = NO_SLOT;
        }
    }

    fn cost(&self, key: &usize) -> Option<f64> {
        self.costs.get(*key).copied().filter(|cost| cost.is_finite())
    }

    fn set_cost(&mut self, key: &usize, cost: f64) {
        self.touch(*key);
        self.costs[*key] = cost;
    }

    fn reset(&mut self) {
        for key in self.touched.drain(..) {
            self.slots[key] = NO_SLOT;
            self.costs[key] = f64::INFINITY;
        }
    }
}

/// Estimated remaining cost from a key to the search goal.
pub trait Heuristic<K> {
    fn estimate(&self, key: &K) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoHeuristic;

impl<K> Heuristic<K> for NoHeuristic {
    #[inline]
    fn estimate(&self, _key: &K) -> f64 {
        0.0
    }
}

/// Straight great-circle distance to a fixed goal pixel.
#[derive(Debug, Clone, Copy)]
pub struct GeodesicHeuristic {
    grid: RasterGrid,
    goal: DVec3,
}

impl GeodesicHeuristic {
    pub fn new(grid: RasterGrid, goal: PixelCoord) -> Self {
        Self {
            grid,
            goal: grid.pixel_to_sphere(goal),
        }
    }

    pub fn goal(&self) -> DVec3 {
        self.goal
    }
}

impl Heuristic<PixelCoord> for GeodesicHeuristic {
    #[inline]
    fn estimate(&self, key: &PixelCoord) -> f64 {
        sphere_distance(self.grid.pixel_to_sphere(*key), self.goal)
    }
}

impl Heuristic<usize> for GeodesicHeuristic {
    #[inline]
    fn estimate(&self, key: &usize) -> f64 {
        sphere_distance(self.grid.index_to_sphere(*key), self.goal)
    }
}

#[derive(Debug, Clone, Copy)]
struct HeapSlot<K> {
    key: K,
    priority: f64,
}

/// Binary min-heap over keys with O(log n) decrease-key.
///
/// Ties between equal priorities break in heap order, not insertion order.
#[derive(Debug, Clone)]
pub struct IndexedQueue<K, I, H = NoHeuristic> {
    heap: Vec<HeapSlot<K>>,
    index: I,
    heuristic: H,
}

/// Dijkstra queue over arbitrary keys.
pub type PriorityQueue<K> = IndexedQueue<K, HashIndex<K>, NoHeuristic>;
/// A* queue ordered by `g + straight distance to goal`.
pub type AStarQueue<K> = IndexedQueue<K, HashIndex<K>, GeodesicHeuristic>;
/// Dijkstra queue whose keys are flat indices of one raster.
pub type RasterQueue = IndexedQueue<usize, DenseIndex, NoHeuristic>;

impl<K: Copy + Eq + Hash> PriorityQueue<K> {
    pub fn new() -> Self {
        Self::from_parts(HashIndex::default(), NoHeuristic)
    }
}

impl<K: Copy + Eq + Hash> Default for PriorityQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash> AStarQueue<K>
where
    GeodesicHeuristic: Heuristic<K>,
{
    pub fn with_goal(grid: RasterGrid, goal: PixelCoord) -> Self {
        Self::from_parts(HashIndex::default(), GeodesicHeuristic::new(grid, goal))
    }
}

impl RasterQueue {
    pub fn for_grid(grid: RasterGrid) -> Self {
        Self::from_parts(DenseIndex::new(grid.len()), NoHeuristic)
    }
}

impl<K, I, H> IndexedQueue<K, I, H>
where
    K: Copy,
    I: QueueIndex<K>,
    H: Heuristic<K>,
{
    pub fn from_parts(index: I, heuristic: H) -> Self {
        Self {
            heap: Vec::with_capacity(64),
            index,
            heuristic,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.slot(key).is_some()
    }

    pub fn heuristic(&self) -> &H {
        &self.heuristic
    }

    /// Insert a key that is not currently queued.
    pub fn add(&mut self, key: K, cost: f64) {
        debug_assert!(!self.contains(&key), "key already queued");
        debug_assert!(cost.is_finite(), "queue costs must be finite");
        let priority = cost + self.heuristic.estimate(&key);
        let slot = self.heap.len();
        self.heap.push(HeapSlot { key, priority });
        self.index.set_slot(&key, slot);
        self.index.set_cost(&key, cost);
        self.sift_up(slot);
    }

    /// Insert `key`, or lower its cost if `cost` beats the best known cost.
    ///
    /// Returns `true` when the stored cost changed. A cost that does not
    /// improve on the best known one (queued or already popped) is ignored.
    pub fn add_or_update(&mut self, key: K, cost: f64) -> bool {
        if let Some(known) = self.index.cost(&key) {
            if cost >= known {
                return false;
            }
        }
        match self.index.slot(&key) {
            Some(slot) => {
                let priority = cost + self.heuristic.estimate(&key);
                self.heap[slot].priority = priority;
                self.index.set_cost(&key, cost);
                self.sift_up(slot);
            }
            None => self.add(key, cost),
        }
        true
    }

    /// Remove and return the lowest-priority key with its cost.
    pub fn try_pop(&mut self) -> Option<(K, f64)> {
        let last = self.heap.pop()?;
        let top = if self.heap.is_empty() {
            last
        } else {
            let top = std::mem::replace(&mut self.heap[0], last);
            self.index.set_slot(&self.heap[0].key, 0);
            self.sift_down(0);
            top
        };
        self.index.clear_slot(&top.key);
        let cost = self.index.cost(&top.key).unwrap_or(f64::INFINITY);
        Some((top.key, cost))
    }

    pub fn pop(&mut self) -> Result<(K, f64), QueueError> {
        self.try_pop().ok_or(QueueError::Empty)
    }

    pub fn try_get_cost(&self, key: &K) -> Option<f64> {
        self.index.cost(key)
    }

    pub fn get_cost(&self, key: &K) -> Result<f64, QueueError> {
        self.try_get_cost(key).ok_or(QueueError::UnknownKey)
    }

    /// Empty the queue and its bookkeeping, keeping allocations.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.index.reset();
    }

    /// [`IndexedQueue::clear`] and swap in a new heuristic target.
    pub fn clear_with(&mut self, heuristic: H) {
        self.clear();
        self.heuristic = heuristic;
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.index.set_slot(&self.heap[a].key, a);
        self.index.set_slot(&self.heap[b].key, b);
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos].priority < self.heap[parent].priority {
                self.swap(pos, parent);
                pos = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = pos * 2 + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < len && self.heap[left].priority < self.heap[smallest].priority {
                smallest = left;
            }
            if right < len && self.heap[right].priority < self.heap[smallest].priority {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap(pos, smallest);
            pos = smallest;
        }
    }
}
