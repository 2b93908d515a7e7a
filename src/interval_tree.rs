//! Interval tree implemented as an augmented red-black tree.
//!
//! Nodes are kept in a dense vector and edges are stored as offsets into this
//! vector; deleting a node closes the hole by moving the last node into the
//! freed slot. Each node is augmented with `max`, the largest interval high
//! point in its subtree, which lets overlap queries prune entire subtrees.
//!
//! Entries are ordered by the 3-tuple `(low, high, value)`, so `T` must carry
//! a total order. Multiple values can share an interval and one value can
//! appear under several intervals, but inserting the same `(interval, value)`
//! pair twice is a no-op. `T` is usually a discriminated union of event kinds
//! in a timeline; one big tree beats many small ones.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Half-open interval `[low, high)` - up to, but excluding, the high point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Interval {
    pub low: i32,
    pub high: i32,
}

impl Interval {
    pub const fn new(low: i32, high: i32) -> Self {
        Self { low, high }
    }

    pub const fn point(at: i32) -> Self {
        Self::new(at, at + 1)
    }

    pub fn overlap(&self, other: Interval) -> bool {
        // [0, 1) x [1, 2) => false
        // [0, 2) x [1, 2) => true
        // [0, 0) x [0, 0) => false
        self.low < other.high && other.low < self.high
    }

    pub fn empty(&self) -> bool {
        self.low >= self.high
    }
}

pub type Kv<T> = (Interval, T);

const NIL: i32 = -1;
const LEFT: usize = 0;
const RIGHT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Color {
    Red,
    Black,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node<T> {
    parent: i32,
    children: [i32; 2],
    color: Color,
    kv: Kv<T>,
    max: i32,
}

impl<T> Node<T> {
    fn new(interval: Interval, value: T) -> Self {
        Self {
            parent: NIL,
            children: [NIL, NIL],
            color: Color::Red,
            max: interval.high,
            kv: (interval, value),
        }
    }

    fn interval(&self) -> Interval {
        self.kv.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalTree<T> {
    root: i32,
    nodes: Vec<Node<T>>,
}

impl<T> Default for IntervalTree<T> {
    fn default() -> Self {
        Self {
            root: NIL,
            nodes: Vec::new(),
        }
    }
}

impl<T: Ord + Clone> IntervalTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The largest high point held in the tree. Zero for an empty tree.
    pub fn max_point(&self) -> i32 {
        if self.root == NIL {
            0
        } else {
            self.nodes[self.root as usize].max
        }
    }

    /// Inserts the pair, returning false if an equal pair already exists.
    pub fn insert(&mut self, interval: Interval, value: T) -> bool {
        let node = self.bst_insert(interval, value);
        if node != NIL {
            self.fix_insert(node);
            true
        } else {
            false
        }
    }

    /// Inserts the pair, first fusing it with any existing entries of equal
    /// value whose intervals overlap or are adjacent on the low side. The
    /// inserted interval is the union of all fused intervals.
    pub fn merge_insert(&mut self, interval: Interval, value: T) {
        let mut interval = interval;
        let mut absorbed: Vec<Kv<T>> = Vec::new();
        for kv in self.overlap_iter(Interval::new(interval.low - 1, interval.high)) {
            if kv.1 == value {
                absorbed.push(kv.clone());
            }
        }
        for kv in absorbed {
            interval.low = interval.low.min(kv.0.low);
            interval.high = interval.high.max(kv.0.high);
            self.delete(&kv);
        }
        self.insert(interval, value);
    }

    pub fn overlap_point(&self, point: i32, hits: &mut Vec<Kv<T>>) {
        self.overlap(Interval::point(point), hits);
    }

    pub fn overlap(&self, interval: Interval, hits: &mut Vec<Kv<T>>) {
        for kv in self.overlap_iter(interval) {
            hits.push(kv.clone());
        }
    }

    pub fn overlap_values(&self, interval: Interval, hits: &mut Vec<T>) {
        for kv in self.overlap_iter(interval) {
            hits.push(kv.1.clone());
        }
    }

    /// DFS iterator over entries whose interval overlaps the query.
    pub fn overlap_iter(&self, interval: Interval) -> OverlapIter<'_, T> {
        OverlapIter {
            tree: self,
            interval,
            stack: vec![self.root],
        }
    }

    /// The lowest entry, by BST order.
    pub fn min(&self) -> Option<&Kv<T>> {
        if self.root == NIL {
            return None;
        }
        Some(&self.nodes[self.min_node(self.root) as usize].kv)
    }

    /// The highest entry, by BST order.
    pub fn max(&self) -> Option<&Kv<T>> {
        if self.root == NIL {
            return None;
        }
        Some(&self.nodes[self.max_node(self.root) as usize].kv)
    }

    /// Deletes the exact pair, returning whether it was found.
    pub fn delete(&mut self, kv: &Kv<T>) -> bool {
        let mut n = self.root;
        while n != NIL {
            let node_kv = &self.nodes[n as usize].kv;
            if kv < node_kv {
                n = self.nodes[n as usize].children[LEFT];
            } else if kv > node_kv {
                n = self.nodes[n as usize].children[RIGHT];
            } else {
                self.delete_node(n);
                return true;
            }
        }
        false
    }

    fn bst_insert(&mut self, interval: Interval, value: T) -> i32 {
        let mut node = Node::new(interval, value);
        let n = self.nodes.len() as i32;
        if n == 0 {
            self.root = 0;
            node.color = Color::Black;
            self.nodes.push(node);
            return 0;
        }

        let mut p = self.root;
        loop {
            let direction = match node.kv.cmp(&self.nodes[p as usize].kv) {
                std::cmp::Ordering::Less => LEFT,
                std::cmp::Ordering::Greater => RIGHT,
                // The interval already exists with the same value.
                std::cmp::Ordering::Equal => return NIL,
            };

            let c = self.nodes[p as usize].children[direction];
            if c == NIL {
                node.parent = p;
                self.nodes.push(node);
                self.nodes[p as usize].children[direction] = n;
                self.fix_branch_max(n);
                return n;
            }
            p = c;
        }
    }

    fn fix_insert(&mut self, mut n: i32) {
        let mut p = self.nodes[n as usize].parent;

        while n != self.root && self.color(p) == Color::Red {
            // Node and parent are both red, which violates invariant 2.
            // Because parent is red it cannot be root, so it has a non-nil
            // parent.
            let g = self.nodes[p as usize].parent;
            let u = self.sibling(p, g);

            // A red uncle lets us fix the local violation by recoloring, which
            // may introduce another violation further up.
            if u != NIL && self.color(u) == Color::Red {
                self.nodes[u as usize].color = Color::Black;
                self.nodes[p as usize].color = Color::Black;
                self.nodes[g as usize].color = Color::Red;
                n = g;
                p = self.nodes[n as usize].parent;
                continue;
            }

            // The uncle is black: one of four rotation arrangements applies.
            // Rotations preserve the BST invariant because the inclusion
            // conditions for the left and right subtree are mirrored.
            if p == self.nodes[g as usize].children[LEFT] {
                if n == self.nodes[p as usize].children[LEFT] {
                    // Both p and n are left children: rotate right about g.
                    self.rotate(RIGHT, g);
                    self.nodes[g as usize].color = Color::Red;
                    self.nodes[p as usize].color = Color::Black;
                } else {
                    // p left child, n right child: rotate left about p, then
                    // right about g.
                    self.rotate(LEFT, p);
                    self.rotate(RIGHT, g);
                    self.nodes[n as usize].color = Color::Black;
                    self.nodes[g as usize].color = Color::Red;
                }
            } else if n == self.nodes[p as usize].children[RIGHT] {
                // Both p and n are right children: rotate left about g.
                self.rotate(LEFT, g);
                self.nodes[p as usize].color = Color::Black;
                self.nodes[g as usize].color = Color::Red;
            } else {
                // p right child, n left child: rotate right about p, then
                // left about g.
                self.rotate(RIGHT, p);
                self.rotate(LEFT, g);
                self.nodes[n as usize].color = Color::Black;
                self.nodes[g as usize].color = Color::Red;
            }
            break;
        }
        let root = self.root;
        self.nodes[root as usize].color = Color::Black;
    }

    fn delete_node(&mut self, n: i32) -> i32 {
        let l = self.nodes[n as usize].children[LEFT];
        let r = self.nodes[n as usize].children[RIGHT];

        if l != NIL && r != NIL {
            let successor = self.min_node(r);
            let successor_kv = self.nodes[successor as usize].kv.clone();
            self.nodes[n as usize].kv = successor_kv;
            self.fix_branch_max(n);
            self.delete_node(successor)
        } else if l != NIL {
            // A node with exactly one child must be black with a red child
            // (invariant 4): replacing it with the recolored child keeps all
            // invariants.
            self.nodes[l as usize].color = Color::Black;
            self.replace(n, l);
            self.fix_branch_max(l);
            l
        } else if r != NIL {
            self.nodes[r as usize].color = Color::Black;
            self.replace(n, r);
            self.fix_branch_max(r);
            r
        } else {
            // Removing a childless black node lowers the black depth of this
            // subtree, violating invariant 4.
            let p = self.nodes[n as usize].parent;
            if p != NIL {
                // Pretend the node is already deleted while fixing up the max
                // values in its ancestor chain.
                self.nodes[n as usize].max = self.nodes[p as usize].interval().low;
                self.fix_branch_max(p);
            }
            if self.nodes[n as usize].color == Color::Black {
                self.fix_double_black(n);
            }
            self.replace(n, NIL);
            NIL
        }
    }

    fn fix_double_black(&mut self, n: i32) {
        let p = self.nodes[n as usize].parent;
        if p == NIL {
            return;
        }
        let d;
        let mut s;
        if n == self.nodes[p as usize].children[LEFT] {
            d = LEFT;
            s = self.nodes[p as usize].children[RIGHT];
        } else {
            d = RIGHT;
            s = self.nodes[p as usize].children[LEFT];
        }

        // A red sibling has two or zero black children, so a rotation about
        // the parent gives n a black (possibly nil) sibling.
        if self.color(s) == Color::Red {
            self.rotate(d, p);
            self.nodes[s as usize].color = Color::Black;
            self.nodes[p as usize].color = Color::Red;
            s = self.nodes[p as usize].children[1 - d];
        }

        let close_nephew = self.nodes[s as usize].children[d];
        let distant_nephew = self.nodes[s as usize].children[1 - d];

        if distant_nephew != NIL && self.color(distant_nephew) == Color::Red {
            // After a rotation about the parent the sibling roots this
            // subtree; it keeps the parent's color and the others go black,
            // restoring the original black depth.
            self.rotate(d, p);
            self.nodes[s as usize].color = self.nodes[p as usize].color;
            self.nodes[p as usize].color = Color::Black;
            self.nodes[distant_nephew as usize].color = Color::Black;
        } else if close_nephew != NIL && self.color(close_nephew) == Color::Red {
            self.rotate(1 - d, s);
            self.nodes[close_nephew as usize].color = Color::Black;
            self.nodes[s as usize].color = Color::Red;
            // This reduces to the case above: the close nephew is the new
            // sibling and its distant child is red.
            s = close_nephew;
            let distant_nephew = self.nodes[s as usize].children[1 - d];
            self.rotate(d, p);
            self.nodes[s as usize].color = self.nodes[p as usize].color;
            self.nodes[p as usize].color = Color::Black;
            self.nodes[distant_nephew as usize].color = Color::Black;
        } else {
            // Sibling and both its children are black.
            self.nodes[s as usize].color = Color::Red;
            if self.nodes[p as usize].color == Color::Red {
                self.nodes[p as usize].color = Color::Black;
            } else {
                self.fix_double_black(p);
            }
        }
    }

    fn replace(&mut self, node: i32, new_node: i32) {
        let p = self.nodes[node as usize].parent;
        if p != NIL {
            if node == self.nodes[p as usize].children[LEFT] {
                self.nodes[p as usize].children[LEFT] = new_node;
            } else {
                self.nodes[p as usize].children[RIGHT] = new_node;
            }
        } else {
            self.root = new_node;
        }
        if new_node != NIL {
            self.nodes[new_node as usize].parent = p;
        }
        self.delete_storage(node);
    }

    /// Closes the storage hole at `n` by moving the last node into it and
    /// repairing the references of its parent and children.
    fn delete_storage(&mut self, n: i32) {
        let count = self.nodes.len() as i32;
        let Some(moved) = self.nodes.pop() else {
            return;
        };
        if n == count - 1 {
            return;
        }
        self.nodes[n as usize] = moved;
        let p = self.nodes[n as usize].parent;
        let l = self.nodes[n as usize].children[LEFT];
        let r = self.nodes[n as usize].children[RIGHT];

        if p == NIL {
            self.root = n;
        } else {
            let d = self.node_direction(count - 1, p);
            self.nodes[p as usize].children[d] = n;
        }
        if l != NIL {
            self.nodes[l as usize].parent = n;
        }
        if r != NIL {
            self.nodes[r as usize].parent = n;
        }
    }

    /// Rotates the subtree about `n` in the given direction; one of `n`'s
    /// children becomes the subtree root and `n` its child. When rotating
    /// right the left child must not be nil, and vice versa.
    fn rotate(&mut self, dir: usize, n: i32) {
        let parent = self.nodes[n as usize].parent;
        let l = self.nodes[n as usize].children[1 - dir];
        let m = self.nodes[l as usize].children[dir];

        self.nodes[n as usize].children[1 - dir] = m;
        if m != NIL {
            self.nodes[m as usize].parent = n;
        }

        self.nodes[l as usize].children[dir] = n;
        self.nodes[n as usize].parent = l;

        self.nodes[l as usize].parent = parent;
        self.fix_max(n);
        self.fix_max(l);

        if parent == NIL {
            self.root = l;
        } else if self.nodes[parent as usize].children[LEFT] == n {
            self.nodes[parent as usize].children[LEFT] = l;
            self.fix_max(parent);
        } else {
            debug_assert_eq!(self.nodes[parent as usize].children[RIGHT], n);
            self.nodes[parent as usize].children[RIGHT] = l;
            self.fix_max(parent);
        }
    }

    fn fix_branch_max(&mut self, mut n: i32) {
        while n != NIL {
            self.fix_max(n);
            n = self.nodes[n as usize].parent;
        }
    }

    fn fix_max(&mut self, n: i32) {
        let l = self.nodes[n as usize].children[LEFT];
        let r = self.nodes[n as usize].children[RIGHT];
        let mut max = self.nodes[n as usize].interval().high;
        if l != NIL {
            max = max.max(self.nodes[l as usize].max);
        }
        if r != NIL {
            max = max.max(self.nodes[r as usize].max);
        }
        self.nodes[n as usize].max = max;
    }

    fn min_node(&self, mut n: i32) -> i32 {
        while self.nodes[n as usize].children[LEFT] != NIL {
            n = self.nodes[n as usize].children[LEFT];
        }
        n
    }

    fn max_node(&self, mut n: i32) -> i32 {
        while self.nodes[n as usize].children[RIGHT] != NIL {
            n = self.nodes[n as usize].children[RIGHT];
        }
        n
    }

    fn node_direction(&self, node: i32, parent: i32) -> usize {
        debug_assert_ne!(parent, NIL);
        if self.nodes[parent as usize].children[LEFT] == node {
            LEFT
        } else {
            debug_assert_eq!(self.nodes[parent as usize].children[RIGHT], node);
            RIGHT
        }
    }

    fn sibling(&self, node: i32, parent: i32) -> i32 {
        self.nodes[parent as usize].children[1 - self.node_direction(node, parent)]
    }

    fn color(&self, n: i32) -> Color {
        self.nodes[n as usize].color
    }

    /// Checks the BST order, the red-black coloring rules and the `max`
    /// augmentation of every node. Used by tests after each mutation.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Ok(());
        }
        if self.root as usize >= self.nodes.len() {
            return Err(Error::Internal(format!(
                "storage error: root {} is out of range ({} nodes)",
                self.root,
                self.nodes.len()
            )));
        }
        self.validate_node(self.root, 0).map(|_| ())
    }

    fn validate_node(&self, n: i32, mut black_depth: i32) -> Result<i32> {
        if n == NIL {
            return Ok(black_depth + 1);
        }
        let node = &self.nodes[n as usize];
        if node.color == Color::Black {
            black_depth += 1;
        }

        let l = node.children[LEFT];
        let r = node.children[RIGHT];
        if l != NIL && node.kv <= self.nodes[l as usize].kv {
            return Err(Error::Internal(format!("BST violation: node {n}")));
        }
        if r != NIL && node.kv >= self.nodes[r as usize].kv {
            return Err(Error::Internal(format!("BST violation: node {n}")));
        }

        if n == self.root && node.color != Color::Black {
            return Err(Error::Internal(format!("RB violation: node {n} is a red root")));
        }
        let p = node.parent;
        if p != NIL && node.color == Color::Red && self.color(p) == Color::Red {
            return Err(Error::Internal(format!(
                "RB violation: red node {n} has a red parent {p}"
            )));
        }

        let mut max = node.interval().high;
        if l != NIL {
            max = max.max(self.nodes[l as usize].max);
        }
        if r != NIL {
            max = max.max(self.nodes[r as usize].max);
        }
        if node.max != max {
            return Err(Error::Internal(format!(
                "max violation: node {n} has max {} but subtree max is {max}",
                node.max
            )));
        }

        let left_depth = self.validate_node(l, black_depth)?;
        let right_depth = self.validate_node(r, black_depth)?;
        if left_depth != right_depth {
            return Err(Error::Internal(format!(
                "left subtree of node {n} has black depth {left_depth}, right subtree {right_depth}"
            )));
        }
        Ok(left_depth)
    }
}

pub struct OverlapIter<'a, T> {
    tree: &'a IntervalTree<T>,
    interval: Interval,
    stack: Vec<i32>,
}

impl<'a, T> Iterator for OverlapIter<'a, T> {
    type Item = &'a Kv<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            if node == NIL {
                continue;
            }
            let n = &self.tree.nodes[node as usize];
            // A subtree whose max lies below the query cannot overlap it.
            if self.interval.low > n.max {
                continue;
            }
            self.stack.push(n.children[LEFT]);
            if self.interval.high >= n.interval().low {
                self.stack.push(n.children[RIGHT]);
            }
            if self.interval.overlap(n.interval()) {
                return Some(&n.kv);
            }
        }
        None
    }
}
