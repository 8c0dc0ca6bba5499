use crate::model::{Booking, Interval, Ms};

type NodeId = usize;

#[derive(Debug, Clone)]
struct Node {
    booking: Booking,
    left: Option<NodeId>,
    right: Option<NodeId>,
    height: u32,
    /// Largest `interval.end` anywhere in this subtree.
    max_end: Ms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    /// Empty client or an interval whose start is after its end.
    InvalidBooking,
    /// The arena could not grow by one node. The tree is unchanged.
    Allocation,
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::InvalidBooking => write!(f, "invalid booking"),
            IndexError::Allocation => write!(f, "out of memory growing booking index"),
        }
    }
}

impl std::error::Error for IndexError {}

/// Per-vehicle booking index: an AVL tree ordered by `interval.start`,
/// augmented with the maximum `interval.end` of every subtree.
///
/// Nodes live in an arena and refer to each other by slot handle, so rotations
/// only rewrite handles and never allocate. Equal starts are inserted to the
/// right. After every mutation:
///
/// - in-order start times are non-decreasing,
/// - `height` and `max_end` are exact for every node,
/// - left and right heights differ by at most one.
#[derive(Debug, Clone, Default)]
pub struct IntervalIndex {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    len: usize,
}

impl IntervalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of the whole tree (0 when empty).
    pub fn height(&self) -> u32 {
        self.height_of(self.root)
    }

    /// Drop every booking.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.len = 0;
    }

    /// Take ownership of `booking` and link it into the tree.
    ///
    /// No overlap check happens here; call [`is_occupied`](Self::is_occupied)
    /// first when the vehicle must be exclusive.
    pub fn insert(&mut self, booking: Booking) -> Result<(), IndexError> {
        if !booking.is_valid() {
            return Err(IndexError::InvalidBooking);
        }
        if self.free.is_empty() {
            self.nodes
                .try_reserve(1)
                .map_err(|_| IndexError::Allocation)?;
        }
        let new = self.alloc(booking);
        let root = self.insert_at(self.root, new);
        self.root = Some(root);
        self.len += 1;
        Ok(())
    }

    /// Returns true if some stored interval overlaps `query`.
    ///
    /// Follows a single path: the left child is taken whenever its `max_end`
    /// reaches `query.start`, otherwise the right child.
    pub fn is_occupied(&self, query: &Interval) -> bool {
        let mut cur = self.root;
        while let Some(id) = cur {
            let node = self.node(id);
            if node.booking.interval.overlaps(query) {
                return true;
            }
            cur = match node.left {
                Some(left) if self.node(left).max_end >= query.start() => Some(left),
                _ => node.right,
            };
        }
        false
    }

    /// Every stored booking overlapping `query`, in start order.
    pub fn overlapping(&self, query: &Interval) -> Vec<Booking> {
        let mut out = Vec::new();
        self.collect_overlapping(self.root, query, &mut out);
        out
    }

    /// Remove the booking whose interval equals `target.interval`.
    /// Returns `None` and leaves the tree untouched when there is none.
    pub fn remove(&mut self, target: &Booking) -> Option<Booking> {
        self.remove_interval(&target.interval)
    }

    pub fn remove_interval(&mut self, target: &Interval) -> Option<Booking> {
        let (root, removed) = self.remove_at(self.root, target);
        self.root = root;
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// In-order iteration, i.e. chronological by start.
    pub fn iter(&self) -> Iter<'_> {
        let mut iter = Iter {
            index: self,
            stack: Vec::new(),
        };
        iter.push_left(self.root);
        iter
    }

    /// Copies of all bookings sorted by start time.
    pub fn to_sorted_vec(&self) -> Vec<Booking> {
        self.iter().cloned().collect()
    }

    /// Copies of all bookings in preorder (root first), the order used when
    /// printing the tree shape.
    pub fn to_preorder_vec(&self) -> Vec<Booking> {
        let mut out = Vec::with_capacity(self.len);
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            out.push(node.booking.clone());
            stack.extend(node.right);
            stack.extend(node.left);
        }
        out
    }

    /// Walk the whole tree and verify ordering, cached heights, cached
    /// `max_end`, AVL balance and the element count.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut count = 0usize;
        let mut prev_start: Option<Ms> = None;
        self.check_at(self.root, &mut count, &mut prev_start)?;
        if count != self.len {
            return Err(format!("len is {} but tree holds {count} nodes", self.len));
        }
        Ok(())
    }

    // ── Arena ────────────────────────────────────────────────────

    fn alloc(&mut self, booking: Booking) -> NodeId {
        let max_end = booking.interval.end();
        let node = Node {
            booking,
            left: None,
            right: None,
            height: 1,
            max_end,
        };
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn dealloc(&mut self, id: NodeId) -> Node {
        let node = self.nodes[id].take();
        self.free.push(id);
        match node {
            Some(node) => node,
            None => unreachable!("double free of node {id}"),
        }
    }

    fn node(&self, id: NodeId) -> &Node {
        match &self.nodes[id] {
            Some(node) => node,
            None => unreachable!("dangling node handle {id}"),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match &mut self.nodes[id] {
            Some(node) => node,
            None => unreachable!("dangling node handle {id}"),
        }
    }

    // ── Augmentation and balance ─────────────────────────────────

    fn height_of(&self, id: Option<NodeId>) -> u32 {
        id.map_or(0, |id| self.node(id).height)
    }

    fn max_end_of(&self, id: Option<NodeId>) -> Option<Ms> {
        id.map(|id| self.node(id).max_end)
    }

    fn balance(&self, id: NodeId) -> i64 {
        let node = self.node(id);
        i64::from(self.height_of(node.left)) - i64::from(self.height_of(node.right))
    }

    fn update(&mut self, id: NodeId) {
        let node = self.node(id);
        let height = 1 + self.height_of(node.left).max(self.height_of(node.right));
        let max_end = [
            Some(node.booking.interval.end()),
            self.max_end_of(node.left),
            self.max_end_of(node.right),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(node.booking.interval.end());
        let node = self.node_mut(id);
        node.height = height;
        node.max_end = max_end;
    }

    fn rotate_right(&mut self, y: NodeId) -> NodeId {
        let Some(x) = self.node(y).left else {
            return y;
        };
        let t2 = self.node(x).right;
        self.node_mut(y).left = t2;
        self.node_mut(x).right = Some(y);
        self.update(y);
        self.update(x);
        x
    }

    fn rotate_left(&mut self, x: NodeId) -> NodeId {
        let Some(y) = self.node(x).right else {
            return x;
        };
        let t2 = self.node(y).left;
        self.node_mut(x).right = t2;
        self.node_mut(y).left = Some(x);
        self.update(x);
        self.update(y);
        y
    }

    /// Recompute `id` and restore balance. Returns the subtree's new root.
    ///
    /// The rotation kind follows the heavy child's own balance. On insert this
    /// picks the same case as comparing the new start against the child's start.
    fn rebalance(&mut self, id: NodeId) -> NodeId {
        self.update(id);
        let balance = self.balance(id);
        if balance > 1 {
            if let Some(left) = self.node(id).left
                && self.balance(left) < 0
            {
                let new_left = self.rotate_left(left);
                self.node_mut(id).left = Some(new_left);
            }
            return self.rotate_right(id);
        }
        if balance < -1 {
            if let Some(right) = self.node(id).right
                && self.balance(right) > 0
            {
                let new_right = self.rotate_right(right);
                self.node_mut(id).right = Some(new_right);
            }
            return self.rotate_left(id);
        }
        id
    }

    // ── Recursive operations ─────────────────────────────────────

    fn insert_at(&mut self, at: Option<NodeId>, new: NodeId) -> NodeId {
        let Some(id) = at else {
            return new;
        };
        let new_start = self.node(new).booking.interval.start();
        if new_start < self.node(id).booking.interval.start() {
            let left = self.insert_at(self.node(id).left, new);
            self.node_mut(id).left = Some(left);
        } else {
            let right = self.insert_at(self.node(id).right, new);
            self.node_mut(id).right = Some(right);
        }
        self.rebalance(id)
    }

    fn remove_at(
        &mut self,
        at: Option<NodeId>,
        target: &Interval,
    ) -> (Option<NodeId>, Option<Booking>) {
        let Some(id) = at else {
            return (None, None);
        };
        let here = self.node(id).booking.interval;
        if here == *target {
            let (subtree, removed) = self.unlink(id);
            return (subtree, Some(removed));
        }

        let removed = if target.start() < here.start() {
            self.remove_left(id, target)
        } else if target.start() > here.start() {
            self.remove_right(id, target)
        } else {
            // Equal starts: rotations can leave the match on either side.
            let left_reaches = self
                .max_end_of(self.node(id).left)
                .is_some_and(|m| m >= target.start());
            let from_left = if left_reaches {
                self.remove_left(id, target)
            } else {
                None
            };
            from_left.or_else(|| self.remove_right(id, target))
        };

        match removed {
            Some(b) => (Some(self.rebalance(id)), Some(b)),
            None => (Some(id), None),
        }
    }

    fn remove_left(&mut self, id: NodeId, target: &Interval) -> Option<Booking> {
        let (left, removed) = self.remove_at(self.node(id).left, target);
        self.node_mut(id).left = left;
        removed
    }

    fn remove_right(&mut self, id: NodeId, target: &Interval) -> Option<Booking> {
        let (right, removed) = self.remove_at(self.node(id).right, target);
        self.node_mut(id).right = right;
        removed
    }

    /// Detach the booking stored at `id`, returning the replacement subtree.
    fn unlink(&mut self, id: NodeId) -> (Option<NodeId>, Booking) {
        let node = self.node(id);
        match (node.left, node.right) {
            (None, None) => (None, self.dealloc(id).booking),
            (Some(child), None) | (None, Some(child)) => (Some(child), self.dealloc(id).booking),
            (Some(_), Some(right)) => {
                // The in-order successor's value moves into this node; its
                // old node leaves the right subtree.
                let (new_right, successor) = self.take_min(right);
                let node = self.node_mut(id);
                node.right = new_right;
                let removed = std::mem::replace(&mut node.booking, successor);
                (Some(self.rebalance(id)), removed)
            }
        }
    }

    fn take_min(&mut self, id: NodeId) -> (Option<NodeId>, Booking) {
        match self.node(id).left {
            None => {
                let node = self.dealloc(id);
                (node.right, node.booking)
            }
            Some(left) => {
                let (new_left, min) = self.take_min(left);
                self.node_mut(id).left = new_left;
                (Some(self.rebalance(id)), min)
            }
        }
    }

    fn collect_overlapping(&self, at: Option<NodeId>, query: &Interval, out: &mut Vec<Booking>) {
        let Some(id) = at else {
            return;
        };
        let node = self.node(id);
        if node.max_end < query.start() {
            return;
        }
        self.collect_overlapping(node.left, query, out);
        // Right subtree starts no earlier than this node.
        if node.booking.interval.start() > query.end() {
            return;
        }
        if node.booking.interval.overlaps(query) {
            out.push(node.booking.clone());
        }
        self.collect_overlapping(node.right, query, out);
    }

    fn check_at(
        &self,
        at: Option<NodeId>,
        count: &mut usize,
        prev_start: &mut Option<Ms>,
    ) -> Result<(), String> {
        let Some(id) = at else {
            return Ok(());
        };
        let node = self.node(id);
        self.check_at(node.left, count, prev_start)?;

        let start = node.booking.interval.start();
        if prev_start.is_some_and(|p| p > start) {
            return Err(format!("node {id}: start {start} out of order"));
        }
        *prev_start = Some(start);
        *count += 1;

        let lh = self.height_of(node.left);
        let rh = self.height_of(node.right);
        if node.height != 1 + lh.max(rh) {
            return Err(format!("node {id}: cached height {} wrong", node.height));
        }
        if lh.abs_diff(rh) > 1 {
            return Err(format!("node {id}: unbalanced ({lh} vs {rh})"));
        }
        let expected = node
            .booking
            .interval
            .end()
            .max(self.max_end_of(node.left).unwrap_or(Ms::MIN))
            .max(self.max_end_of(node.right).unwrap_or(Ms::MIN));
        if node.max_end != expected {
            return Err(format!(
                "node {id}: max_end {} but subtree max is {expected}",
                node.max_end
            ));
        }

        self.check_at(node.right, count, prev_start)
    }
}

/// In-order iterator over an [`IntervalIndex`].
pub struct Iter<'a> {
    index: &'a IntervalIndex,
    stack: Vec<NodeId>,
}

impl<'a> Iter<'a> {
    fn push_left(&mut self, mut at: Option<NodeId>) {
        while let Some(id) = at {
            self.stack.push(id);
            at = self.index.node(id).left;
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Booking;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let index = self.index;
        let node = index.node(id);
        self.push_left(node.right);
        Some(&node.booking)
    }
}

impl<'a> IntoIterator for &'a IntervalIndex {
    type Item = &'a Booking;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
