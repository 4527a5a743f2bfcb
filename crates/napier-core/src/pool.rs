//! Fixed-capacity expression pool with checkpoint/rollback.
//!
//! Every live expression in the process shares one pool. Nodes are stored
//! in preorder: the slots of a node's children immediately follow its own
//! slot, so a subtree is always a contiguous slot range. Trees under
//! construction sit at the tail of the pool as detached roots until a
//! parent adopts them or a mutator splices them into an existing tree.
//!
//! The pool never grows past its construction-time capacity. Exhaustion is
//! reported as [`PoolError::OutOfSpace`] and recovered through checkpoints;
//! every other misuse is a programming error checked by assertions.

use hashbrown::HashMap;

use crate::error::PoolError;
use crate::node::{NodeKind, Slot, SymbolId};

/// A handle to one node, tagged with the pool generation it was minted in.
///
/// Structural mutators and rollback bump the generation; dereferencing a
/// handle from an older generation is caught by `debug_assert` and the
/// caller must re-fetch the handle from a stable ancestor instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// The slot offset of this node.
    #[must_use]
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Re-stamps this handle with the pool's current generation.
    ///
    /// Only valid when the caller knows the node's offset was not moved by
    /// the intervening mutation (mutations strictly inside a node's own
    /// subtree never move the node itself).
    #[must_use]
    pub fn refreshed(self, pool: &Pool) -> NodeId {
        NodeId {
            index: self.index,
            generation: pool.generation,
        }
    }
}

/// A restore point for the pool.
///
/// Obtained from [`Pool::begin`]; must be consumed by exactly one of
/// [`Pool::commit`] or [`Pool::abort`]. Checkpoints nest LIFO.
#[must_use]
#[derive(Debug)]
pub struct Checkpoint {
    mark: u32,
    roots_mark: u32,
    depth: u32,
}

/// The expression pool.
#[derive(Debug)]
pub struct Pool {
    slots: Vec<Slot>,
    capacity: usize,
    generation: u32,
    /// Start offsets of the detached tree regions, ascending. The regions
    /// tile the occupied prefix of the pool exactly.
    roots: Vec<u32>,
    checkpoint_depth: u32,
    /// Symbol interning table. Interned names are metadata, not slots, and
    /// deliberately survive rollback.
    symbols: HashMap<String, SymbolId>,
    symbol_names: Vec<String>,
}

impl Pool {
    /// Creates a pool holding at most `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0 && capacity < u32::MAX as usize);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            generation: 0,
            roots: Vec::new(),
            checkpoint_depth: 0,
            symbols: HashMap::new(),
            symbol_names: Vec::new(),
        }
    }

    /// Number of occupied slots (the high-water mark).
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total slot capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of free slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity - self.slots.len()
    }

    /// The current handle generation.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    fn ensure_room(&self, extra: usize) -> Result<(), PoolError> {
        if self.slots.len() + extra > self.capacity {
            Err(PoolError::OutOfSpace {
                requested: extra,
                available: self.available(),
            })
        } else {
            Ok(())
        }
    }

    fn stamp(&self, index: usize) -> NodeId {
        NodeId {
            index: index as u32,
            generation: self.generation,
        }
    }

    /// The slot of a node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Slot {
        debug_assert_eq!(id.generation, self.generation, "stale expression handle");
        self.slots[id.index()]
    }

    /// The kind of a node.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.get(id).kind
    }

    /// Subtree size of a node, in slots.
    #[must_use]
    pub fn size(&self, id: NodeId) -> usize {
        self.get(id).size as usize
    }

    /// The slots of a node's whole subtree.
    #[must_use]
    pub fn subtree(&self, id: NodeId) -> &[Slot] {
        let n = self.size(id);
        &self.slots[id.index()..id.index() + n]
    }

    /// The `i`-th direct child of a node.
    #[must_use]
    pub fn child_at(&self, id: NodeId, i: usize) -> NodeId {
        let slot = self.get(id);
        assert!(i < slot.kind.child_count(), "child index out of range");
        let mut off = id.index() + 1;
        for _ in 0..i {
            off += self.slots[off].size as usize;
        }
        self.stamp(off)
    }

    /// Returns true if `id` is a detached tree root.
    #[must_use]
    pub fn is_root(&self, id: NodeId) -> bool {
        debug_assert_eq!(id.generation, self.generation, "stale expression handle");
        self.roots.binary_search(&id.index).is_ok()
    }

    fn enclosing_root(&self, index: usize) -> usize {
        debug_assert!(index < self.slots.len());
        let p = self.roots.partition_point(|&r| r as usize <= index);
        self.roots[p - 1] as usize
    }

    /// Offsets of the strict ancestors of `index`, outermost first.
    fn ancestor_chain(&self, index: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut p = self.enclosing_root(index);
        while p != index {
            chain.push(p);
            let mut c = p + 1;
            loop {
                let end = c + self.slots[c].size as usize;
                if index < end {
                    break;
                }
                c = end;
            }
            p = c;
        }
        chain
    }

    /// The parent of a node, or `None` for a detached root.
    ///
    /// This is a traversal lookup, not an ownership edge: it walks down
    /// from the enclosing root.
    #[must_use]
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        debug_assert_eq!(id.generation, self.generation, "stale expression handle");
        let chain = self.ancestor_chain(id.index());
        chain.last().map(|&p| self.stamp(p))
    }

    /// Index of `child` among the direct children of `parent`.
    #[must_use]
    pub fn index_of_child(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        let n = self.kind(parent).child_count();
        let mut off = parent.index() + 1;
        for i in 0..n {
            if off == child.index() {
                return Some(i);
            }
            off += self.slots[off].size as usize;
        }
        None
    }

    /// Rewrites the kind payload of a node in place.
    ///
    /// Only valid for kind changes that preserve the child count (numeral
    /// sign flips and the like); anything else must go through the
    /// structural mutators.
    pub(crate) fn set_kind(&mut self, id: NodeId, kind: NodeKind) -> NodeId {
        debug_assert_eq!(id.generation, self.generation, "stale expression handle");
        let slot = &mut self.slots[id.index()];
        assert_eq!(slot.kind.child_count(), kind.child_count());
        slot.kind = kind;
        id
    }

    fn rebuild_roots(&mut self) {
        self.roots.clear();
        let mut i = 0usize;
        while i < self.slots.len() {
            self.roots.push(i as u32);
            i += self.slots[i].size as usize;
        }
    }

    // === Allocation ===

    /// Allocates a single leaf node as a new detached root.
    pub fn allocate(&mut self, kind: NodeKind) -> Result<NodeId, PoolError> {
        assert!(kind.is_leaf(), "allocate is for leaf kinds; use adopt");
        self.ensure_room(1)?;
        let index = self.slots.len();
        self.slots.push(Slot { kind, size: 1 });
        self.roots.push(index as u32);
        Ok(self.stamp(index))
    }

    /// Builds a compound node over already-built child trees.
    ///
    /// The children must be the most recent detached roots, in order; they
    /// are consumed by the adoption (their handles, and any handle into
    /// their subtrees, are invalidated).
    pub fn adopt(&mut self, kind: NodeKind, children: &[NodeId]) -> Result<NodeId, PoolError> {
        let k = kind.child_count();
        assert_eq!(children.len(), k, "arity mismatch");
        assert!(self.roots.len() >= k, "children must be detached roots");
        let tail = &self.roots[self.roots.len() - k..];
        for (child, &root) in children.iter().zip(tail) {
            debug_assert_eq!(child.generation, self.generation, "stale expression handle");
            assert_eq!(child.index, root, "children must be the last roots, in order");
        }
        self.ensure_room(1)?;
        let first = children.first().map_or(self.slots.len(), |c| c.index());
        let size = (self.slots.len() - first + 1) as u32;
        self.slots.insert(first, Slot { kind, size });
        self.roots.truncate(self.roots.len() - k);
        self.roots.push(first as u32);
        Ok(self.stamp(first))
    }

    /// Deep-copies a subtree to the tail of the pool as a new root.
    pub fn clone_tree(&mut self, src: NodeId) -> Result<NodeId, PoolError> {
        let n = self.size(src);
        self.ensure_room(n)?;
        let index = self.slots.len();
        let start = src.index();
        self.slots.extend_from_within(start..start + n);
        self.roots.push(index as u32);
        Ok(self.stamp(index))
    }

    /// Frees the most recently allocated root region.
    pub fn free(&mut self, root: NodeId) {
        debug_assert_eq!(root.generation, self.generation, "stale expression handle");
        let last = *self.roots.last().expect("free on empty pool");
        assert_eq!(root.index, last, "free is only valid for the most recent root");
        self.slots.truncate(last as usize);
        self.roots.pop();
        self.generation += 1;
    }

    // === Structural mutation ===
    //
    // All three mutators splice slot ranges in place, repack the remaining
    // nodes, fix ancestor subtree sizes, and bump the generation. Handles
    // held across a call must be re-fetched from a stable ancestor.

    /// Replaces the subtree at `target` with the detached tree
    /// `replacement`, discarding the old subtree.
    ///
    /// `replacement` must have been built after `target`'s subtree (it sits
    /// later in the pool); the usual pattern is to build it at the tail and
    /// substitute it immediately.
    pub fn replace_subtree(
        &mut self,
        target: NodeId,
        replacement: NodeId,
    ) -> Result<NodeId, PoolError> {
        debug_assert_eq!(target.generation, self.generation, "stale expression handle");
        assert!(self.is_root(replacement), "replacement must be a detached root");
        let t = target.index();
        let r = replacement.index();
        let old = self.slots[t].size as usize;
        let n = self.slots[r].size as usize;
        assert!(r >= t + old, "replacement must live after the target subtree");
        let chain = self.ancestor_chain(t);
        let moved: Vec<Slot> = self.slots[r..r + n].to_vec();
        self.slots.drain(r..r + n);
        self.slots.splice(t..t + old, moved);
        for a in chain {
            let size = i64::from(self.slots[a].size) + n as i64 - old as i64;
            self.slots[a].size = size as u32;
        }
        self.rebuild_roots();
        self.generation += 1;
        Ok(self.stamp(t))
    }

    /// Inserts the detached tree `child` as the `i`-th child of `parent`.
    ///
    /// Only valid for the variadic kinds; the parent's child count is
    /// updated in place.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        i: usize,
        child: NodeId,
    ) -> Result<NodeId, PoolError> {
        debug_assert_eq!(parent.generation, self.generation, "stale expression handle");
        assert!(self.is_root(child), "child must be a detached root");
        let p = parent.index();
        let psize = self.slots[p].size as usize;
        let c = child.index();
        assert!(c >= p + psize, "child must live after the parent subtree");
        let kind = self.slots[p].kind;
        let widened = widen_variadic(kind, 1);
        assert!(i <= kind.child_count(), "child index out of range");
        let m = self.slots[c].size as usize;
        // Insertion offset of the i-th child within the parent region.
        let mut pos = p + 1;
        for _ in 0..i {
            pos += self.slots[pos].size as usize;
        }
        let mut chain = self.ancestor_chain(p);
        chain.push(p);
        let moved: Vec<Slot> = self.slots[c..c + m].to_vec();
        self.slots.drain(c..c + m);
        self.slots.splice(pos..pos, moved);
        for a in chain {
            self.slots[a].size += m as u32;
        }
        self.slots[p].kind = widened;
        self.rebuild_roots();
        self.generation += 1;
        Ok(self.stamp(p))
    }

    /// Removes and discards the `i`-th child of `parent`.
    ///
    /// Only valid for the variadic kinds. The caller is responsible for
    /// restoring the `n >= 2` invariant afterwards (collapsing a
    /// single-child sum or product).
    pub fn remove_child(&mut self, parent: NodeId, i: usize) -> Result<NodeId, PoolError> {
        debug_assert_eq!(parent.generation, self.generation, "stale expression handle");
        let p = parent.index();
        let kind = self.slots[p].kind;
        let narrowed = widen_variadic(kind, -1);
        assert!(i < kind.child_count(), "child index out of range");
        let mut c = p + 1;
        for _ in 0..i {
            c += self.slots[c].size as usize;
        }
        let m = self.slots[c].size as usize;
        let mut chain = self.ancestor_chain(p);
        chain.push(p);
        self.slots.drain(c..c + m);
        for a in chain {
            self.slots[a].size -= m as u32;
        }
        self.slots[p].kind = narrowed;
        self.rebuild_roots();
        self.generation += 1;
        Ok(self.stamp(p))
    }

    // === Checkpoints ===

    /// Opens a restore point before an operation that may exhaust the pool.
    pub fn begin(&mut self) -> Checkpoint {
        self.checkpoint_depth += 1;
        Checkpoint {
            mark: self.slots.len() as u32,
            roots_mark: self.roots.len() as u32,
            depth: self.checkpoint_depth,
        }
    }

    /// Discards a restore point with no effect on the pool.
    pub fn commit(&mut self, cp: Checkpoint) {
        assert_eq!(cp.depth, self.checkpoint_depth, "checkpoints must nest LIFO");
        self.checkpoint_depth -= 1;
    }

    /// Discards every slot allocated since the matching [`Pool::begin`]
    /// and invalidates all handles minted since.
    ///
    /// Trees that existed before `begin` must not have been structurally
    /// mutated inside the checkpoint scope; mutate clones instead.
    pub fn abort(&mut self, cp: Checkpoint) {
        assert_eq!(cp.depth, self.checkpoint_depth, "checkpoints must nest LIFO");
        self.checkpoint_depth -= 1;
        self.slots.truncate(cp.mark as usize);
        self.roots.truncate(cp.roots_mark as usize);
        self.generation += 1;
    }

    /// Runs `f` inside a checkpoint: commits on `Ok`, aborts and
    /// propagates on `Err`.
    pub fn try_or_rollback<T>(
        &mut self,
        f: impl FnOnce(&mut Pool) -> Result<T, PoolError>,
    ) -> Result<T, PoolError> {
        let cp = self.begin();
        match f(self) {
            Ok(v) => {
                self.commit(cp);
                Ok(v)
            }
            Err(e) => {
                self.abort(cp);
                Err(e)
            }
        }
    }

    // === Symbols ===

    /// Interns a symbol name, returning its stable id.
    pub fn intern_symbol(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.symbols.get(name) {
            return id;
        }
        let id = self.symbol_names.len() as SymbolId;
        self.symbols.insert(name.to_string(), id);
        self.symbol_names.push(name.to_string());
        id
    }

    /// The name of an interned symbol.
    #[must_use]
    pub fn symbol_name(&self, id: SymbolId) -> Option<&str> {
        self.symbol_names.get(id as usize).map(String::as_str)
    }

    // === Diagnostics ===

    /// Verifies the structural invariants of the whole pool: root regions
    /// tile the occupied prefix, and every node's size is one plus the sum
    /// of its children's sizes.
    ///
    /// # Panics
    ///
    /// Panics on any violation. Intended for tests and debugging.
    pub fn check_consistency(&self) {
        let mut i = 0usize;
        for (k, &root) in self.roots.iter().enumerate() {
            assert_eq!(root as usize, i, "root {k} does not tile the pool");
            i += self.check_region(root as usize);
        }
        assert_eq!(i, self.slots.len(), "trailing slots outside any root");
    }

    fn check_region(&self, index: usize) -> usize {
        let slot = self.slots[index];
        let mut occupied = 1usize;
        for _ in 0..slot.kind.child_count() {
            occupied += self.check_region(index + occupied);
        }
        assert_eq!(occupied, slot.size as usize, "subtree size mismatch at {index}");
        occupied
    }
}

fn widen_variadic(kind: NodeKind, delta: i16) -> NodeKind {
    let adjust = |n: u8| -> u8 {
        let n = i16::from(n) + delta;
        assert!(n >= 1 && n <= i16::from(u8::MAX), "variadic arity out of range");
        n as u8
    };
    match kind {
        NodeKind::Addition { n } => NodeKind::Addition { n: adjust(n) },
        NodeKind::Multiplication { n } => NodeKind::Multiplication { n: adjust(n) },
        NodeKind::Call { symbol, n } => NodeKind::Call { symbol, n: adjust(n) },
        _ => panic!("not a variadic kind"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(pool: &mut Pool, v: i64) -> NodeId {
        pool.allocate(NodeKind::Integer(v)).unwrap()
    }

    #[test]
    fn allocate_and_adopt_preorder_layout() {
        let mut pool = Pool::new(64);
        let a = int(&mut pool, 1);
        let b = int(&mut pool, 2);
        let sum = pool.adopt(NodeKind::Addition { n: 2 }, &[a, b]).unwrap();
        pool.check_consistency();

        assert_eq!(pool.size(sum), 3);
        assert_eq!(pool.kind(pool.child_at(sum, 0)), NodeKind::Integer(1));
        assert_eq!(pool.kind(pool.child_at(sum, 1)), NodeKind::Integer(2));
        assert!(pool.is_root(sum));
    }

    #[test]
    fn exhaustion_is_recoverable() {
        let mut pool = Pool::new(4);
        for v in 0..4 {
            int(&mut pool, v);
        }
        let err = pool.allocate(NodeKind::Integer(4)).unwrap_err();
        assert_eq!(err, PoolError::OutOfSpace { requested: 1, available: 0 });
        // The failed allocation left the pool untouched.
        assert_eq!(pool.len(), 4);
        pool.check_consistency();
    }

    #[test]
    fn checkpoint_abort_restores_high_water_mark() {
        let mut pool = Pool::new(10_000);
        int(&mut pool, 7);
        let before = pool.available();

        let cp = pool.begin();
        let mut last = None;
        for v in 0..pool.available() as i64 {
            last = Some(int(&mut pool, v));
        }
        assert!(last.is_some());
        assert!(pool.allocate(NodeKind::Integer(-1)).is_err());
        pool.abort(cp);

        assert_eq!(pool.available(), before);
        pool.check_consistency();

        // The same allocation sequence succeeds again.
        let cp = pool.begin();
        for v in 0..before as i64 {
            int(&mut pool, v);
        }
        assert_eq!(pool.available(), 0);
        pool.abort(cp);
        assert_eq!(pool.available(), before);
    }

    #[test]
    fn nested_checkpoints_are_independent() {
        let mut pool = Pool::new(32);
        int(&mut pool, 1);
        let outer = pool.begin();
        int(&mut pool, 2);
        let mid = pool.len();
        let inner = pool.begin();
        int(&mut pool, 3);
        pool.abort(inner);
        // Aborting the inner checkpoint keeps the outer scope's node.
        assert_eq!(pool.len(), mid);
        pool.commit(outer);
        assert_eq!(pool.len(), mid);
        pool.check_consistency();
    }

    #[test]
    fn replace_subtree_repacks_and_fixes_sizes() {
        let mut pool = Pool::new(64);
        let a = int(&mut pool, 1);
        let b = int(&mut pool, 2);
        let inner = pool.adopt(NodeKind::Addition { n: 2 }, &[a, b]).unwrap();
        let c = int(&mut pool, 3);
        let outer = pool
            .adopt(NodeKind::Multiplication { n: 2 }, &[inner, c])
            .unwrap();
        assert_eq!(pool.size(outer), 5);

        // Replace the inner sum with a single literal.
        let target = pool.child_at(outer, 0);
        let repl = int(&mut pool, 9);
        pool.replace_subtree(target, repl).unwrap();
        let outer = outer.refreshed(&pool);
        pool.check_consistency();

        assert_eq!(pool.size(outer), 3);
        assert_eq!(pool.kind(pool.child_at(outer, 0)), NodeKind::Integer(9));
        assert_eq!(pool.kind(pool.child_at(outer, 1)), NodeKind::Integer(3));
    }

    #[test]
    fn insert_and_remove_child() {
        let mut pool = Pool::new(64);
        let a = int(&mut pool, 1);
        let b = int(&mut pool, 2);
        let sum = pool.adopt(NodeKind::Addition { n: 2 }, &[a, b]).unwrap();

        let c = int(&mut pool, 3);
        let sum = pool.insert_child(sum.refreshed(&pool), 1, c).unwrap();
        pool.check_consistency();
        assert_eq!(pool.kind(sum), NodeKind::Addition { n: 3 });
        assert_eq!(pool.kind(pool.child_at(sum, 1)), NodeKind::Integer(3));

        let sum = pool.remove_child(sum, 0).unwrap();
        pool.check_consistency();
        assert_eq!(pool.kind(sum), NodeKind::Addition { n: 2 });
        assert_eq!(pool.kind(pool.child_at(sum, 0)), NodeKind::Integer(3));
    }

    #[test]
    fn free_most_recent_root() {
        let mut pool = Pool::new(16);
        int(&mut pool, 1);
        let b = int(&mut pool, 2);
        pool.free(b);
        assert_eq!(pool.len(), 1);
        pool.check_consistency();
    }

    #[test]
    fn parent_lookup() {
        let mut pool = Pool::new(64);
        let a = int(&mut pool, 1);
        let b = int(&mut pool, 2);
        let sum = pool.adopt(NodeKind::Addition { n: 2 }, &[a, b]).unwrap();
        let neg = pool.adopt(NodeKind::Opposite, &[sum]).unwrap();

        assert!(pool.parent_of(neg).is_none());
        let sum = pool.child_at(neg, 0);
        assert_eq!(pool.parent_of(sum), Some(neg));
        let lhs = pool.child_at(sum, 0);
        assert_eq!(pool.parent_of(lhs), Some(sum));
        assert_eq!(pool.index_of_child(sum, lhs), Some(0));
    }

    #[test]
    fn symbol_interning() {
        let mut pool = Pool::new(8);
        let x = pool.intern_symbol("x");
        let y = pool.intern_symbol("y");
        assert_eq!(pool.intern_symbol("x"), x);
        assert_ne!(x, y);
        assert_eq!(pool.symbol_name(y), Some("y"));
    }
}
