//! LSMKV - Ordered Map (Red-Black Tree)
//! Sorted in-memory container keyed by byte strings.
//!
//! Nodes live in an arena (`Vec<Node<V>>`) and refer to each other by
//! index. Slot 0 is a permanently black sentinel (`NIL`) that stands in
//! for every absent child and for the root's parent, so the classic
//! rotation and fix-up algorithms run without null checks. Freed slots
//! are recycled through a free list.
//!
//! The tree tracks `size_bytes`, the sum of `key.len() + value.byte_size()`
//! over all live entries, adjusting it by the delta on in-place updates.

use std::cmp::Ordering;

/// Reserved arena index meaning "no node".
const NIL: usize = 0;

/// Byte footprint of a stored value, used for size accounting.
pub trait ByteSize {
    fn byte_size(&self) -> usize;
}

impl ByteSize for Vec<u8> {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

/// `None` is a tombstone and only costs its key.
impl ByteSize for Option<Vec<u8>> {
    fn byte_size(&self) -> usize {
        self.as_ref().map_or(0, |v| v.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

#[derive(Debug)]
struct Node<V> {
    key: Vec<u8>,
    value: Option<V>,
    left: usize,
    right: usize,
    parent: usize,
    color: Color,
}

impl<V> Node<V> {
    fn sentinel() -> Self {
        Self {
            key: Vec::new(),
            value: None,
            left: NIL,
            right: NIL,
            parent: NIL,
            color: Color::Black,
        }
    }
}

/// Red-black tree mapping byte-string keys to `V`.
#[derive(Debug)]
pub struct RbTree<V> {
    nodes: Vec<Node<V>>,
    free: Vec<usize>,
    root: usize,
    len: usize,
    size_bytes: usize,
}

impl<V: ByteSize> Default for RbTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: ByteSize> RbTree<V> {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::sentinel()],
            free: Vec::new(),
            root: NIL,
            len: 0,
            size_bytes: 0,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sum of key and value sizes over all live entries.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Drop every node and start over with an empty arena.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.nodes.push(Node::sentinel());
        self.free.clear();
        self.root = NIL;
        self.len = 0;
        self.size_bytes = 0;
    }

    /// Insert or update `key`. Returns the previous value when the key existed.
    pub fn put(&mut self, key: Vec<u8>, value: V) -> Option<V> {
        let mut parent = NIL;
        let mut x = self.root;
        let mut went_left = false;
        while x != NIL {
            parent = x;
            match key.as_slice().cmp(&self.nodes[x].key) {
                Ordering::Less => {
                    went_left = true;
                    x = self.nodes[x].left;
                }
                Ordering::Greater => {
                    went_left = false;
                    x = self.nodes[x].right;
                }
                Ordering::Equal => {
                    let new_size = value.byte_size();
                    let old = self.nodes[x].value.replace(value);
                    let old_size = old.as_ref().map_or(0, |v| v.byte_size());
                    self.size_bytes = self.size_bytes - old_size + new_size;
                    return old;
                }
            }
        }

        self.size_bytes += key.len() + value.byte_size();
        let z = self.alloc(key, value, parent);
        if parent == NIL {
            self.root = z;
        } else if went_left {
            self.nodes[parent].left = z;
        } else {
            self.nodes[parent].right = z;
        }
        self.len += 1;
        self.insert_fixup(z);
        None
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let x = self.find(key);
        if x == NIL {
            None
        } else {
            self.nodes[x].value.as_ref()
        }
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.find(key) != NIL
    }

    /// Remove `key`, returning its value when present.
    pub fn del(&mut self, key: &[u8]) -> Option<V> {
        let z = self.find(key);
        if z == NIL {
            return None;
        }
        self.delete_node(z);
        let node = &mut self.nodes[z];
        let value = node.value.take();
        let key_len = node.key.len();
        node.key = Vec::new();
        node.left = NIL;
        node.right = NIL;
        node.parent = NIL;
        self.free.push(z);
        self.len -= 1;
        self.size_bytes -= key_len + value.as_ref().map_or(0, |v| v.byte_size());
        value
    }

    /// Smallest entry.
    pub fn min(&self) -> Option<(&[u8], &V)> {
        if self.root == NIL {
            return None;
        }
        self.entry_at(self.minimum(self.root))
    }

    /// Largest entry.
    pub fn max(&self) -> Option<(&[u8], &V)> {
        if self.root == NIL {
            return None;
        }
        self.entry_at(self.maximum(self.root))
    }

    /// Greatest entry with key `<= key` (exact match or predecessor).
    pub fn get_near_min(&self, key: &[u8]) -> Option<(&[u8], &V)> {
        let mut x = self.root;
        let mut best = NIL;
        while x != NIL {
            match key.cmp(&self.nodes[x].key) {
                Ordering::Equal => return self.entry_at(x),
                Ordering::Less => x = self.nodes[x].left,
                Ordering::Greater => {
                    best = x;
                    x = self.nodes[x].right;
                }
            }
        }
        self.entry_at(best)
    }

    /// Least entry with key `>= key` (exact match or successor).
    pub fn get_near_max(&self, key: &[u8]) -> Option<(&[u8], &V)> {
        let x = self.ceiling(key);
        self.entry_at(x)
    }

    /// Visit every entry in ascending key order until `f` returns false.
    pub fn scan<F>(&self, mut f: F)
    where
        F: FnMut(&[u8], &V) -> bool,
    {
        for (key, value) in self.iter() {
            if !f(key, value) {
                break;
            }
        }
    }

    /// Visit entries with `lo <= key <= hi` in ascending order until `f` returns false.
    pub fn scan_range<F>(&self, lo: &[u8], hi: &[u8], mut f: F)
    where
        F: FnMut(&[u8], &V) -> bool,
    {
        let mut x = self.ceiling(lo);
        while x != NIL {
            let node = &self.nodes[x];
            if node.key.as_slice() > hi {
                break;
            }
            if let Some(value) = node.value.as_ref() {
                if !f(&node.key, value) {
                    break;
                }
            }
            x = self.successor(x);
        }
    }

    /// In-order iterator over all entries.
    pub fn iter(&self) -> Iter<'_, V> {
        let next = if self.root == NIL {
            NIL
        } else {
            self.minimum(self.root)
        };
        Iter { tree: self, next }
    }

    fn entry_at(&self, x: usize) -> Option<(&[u8], &V)> {
        if x == NIL {
            return None;
        }
        let node = &self.nodes[x];
        node.value.as_ref().map(|v| (node.key.as_slice(), v))
    }

    fn alloc(&mut self, key: Vec<u8>, value: V, parent: usize) -> usize {
        let node = Node {
            key,
            value: Some(value),
            left: NIL,
            right: NIL,
            parent,
            color: Color::Red,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn find(&self, key: &[u8]) -> usize {
        let mut x = self.root;
        while x != NIL {
            match key.cmp(&self.nodes[x].key) {
                Ordering::Equal => return x,
                Ordering::Less => x = self.nodes[x].left,
                Ordering::Greater => x = self.nodes[x].right,
            }
        }
        NIL
    }

    fn ceiling(&self, key: &[u8]) -> usize {
        let mut x = self.root;
        let mut best = NIL;
        while x != NIL {
            match key.cmp(&self.nodes[x].key) {
                Ordering::Equal => return x,
                Ordering::Greater => x = self.nodes[x].right,
                Ordering::Less => {
                    best = x;
                    x = self.nodes[x].left;
                }
            }
        }
        best
    }

    fn minimum(&self, mut x: usize) -> usize {
        while self.nodes[x].left != NIL {
            x = self.nodes[x].left;
        }
        x
    }

    fn maximum(&self, mut x: usize) -> usize {
        while self.nodes[x].right != NIL {
            x = self.nodes[x].right;
        }
        x
    }

    fn successor(&self, mut x: usize) -> usize {
        if self.nodes[x].right != NIL {
            return self.minimum(self.nodes[x].right);
        }
        let mut y = self.nodes[x].parent;
        while y != NIL && x == self.nodes[y].right {
            x = y;
            y = self.nodes[y].parent;
        }
        y
    }

    fn left_rotate(&mut self, x: usize) {
        let y = self.nodes[x].right;
        let y_left = self.nodes[y].left;
        self.nodes[x].right = y_left;
        if y_left != NIL {
            self.nodes[y_left].parent = x;
        }
        let xp = self.nodes[x].parent;
        self.nodes[y].parent = xp;
        if xp == NIL {
            self.root = y;
        } else if x == self.nodes[xp].left {
            self.nodes[xp].left = y;
        } else {
            self.nodes[xp].right = y;
        }
        self.nodes[y].left = x;
        self.nodes[x].parent = y;
    }

    fn right_rotate(&mut self, x: usize) {
        let y = self.nodes[x].left;
        let y_right = self.nodes[y].right;
        self.nodes[x].left = y_right;
        if y_right != NIL {
            self.nodes[y_right].parent = x;
        }
        let xp = self.nodes[x].parent;
        self.nodes[y].parent = xp;
        if xp == NIL {
            self.root = y;
        } else if x == self.nodes[xp].right {
            self.nodes[xp].right = y;
        } else {
            self.nodes[xp].left = y;
        }
        self.nodes[y].right = x;
        self.nodes[x].parent = y;
    }

    fn insert_fixup(&mut self, mut z: usize) {
        while self.nodes[self.nodes[z].parent].color == Color::Red {
            let zp = self.nodes[z].parent;
            let zpp = self.nodes[zp].parent;
            if zp == self.nodes[zpp].left {
                let uncle = self.nodes[zpp].right;
                if self.nodes[uncle].color == Color::Red {
                    self.nodes[zp].color = Color::Black;
                    self.nodes[uncle].color = Color::Black;
                    self.nodes[zpp].color = Color::Red;
                    z = zpp;
                } else {
                    if z == self.nodes[zp].right {
                        z = zp;
                        self.left_rotate(z);
                    }
                    let zp = self.nodes[z].parent;
                    let zpp = self.nodes[zp].parent;
                    self.nodes[zp].color = Color::Black;
                    self.nodes[zpp].color = Color::Red;
                    self.right_rotate(zpp);
                }
            } else {
                let uncle = self.nodes[zpp].left;
                if self.nodes[uncle].color == Color::Red {
                    self.nodes[zp].color = Color::Black;
                    self.nodes[uncle].color = Color::Black;
                    self.nodes[zpp].color = Color::Red;
                    z = zpp;
                } else {
                    if z == self.nodes[zp].left {
                        z = zp;
                        self.right_rotate(z);
                    }
                    let zp = self.nodes[z].parent;
                    let zpp = self.nodes[zp].parent;
                    self.nodes[zp].color = Color::Black;
                    self.nodes[zpp].color = Color::Red;
                    self.left_rotate(zpp);
                }
            }
        }
        let root = self.root;
        self.nodes[root].color = Color::Black;
    }

    /// Replace the subtree rooted at `u` with the one rooted at `v`.
    /// `v` may be the sentinel; its parent is still set for the fix-up.
    fn transplant(&mut self, u: usize, v: usize) {
        let up = self.nodes[u].parent;
        if up == NIL {
            self.root = v;
        } else if u == self.nodes[up].left {
            self.nodes[up].left = v;
        } else {
            self.nodes[up].right = v;
        }
        self.nodes[v].parent = up;
    }

    fn delete_node(&mut self, z: usize) {
        let mut y = z;
        let mut y_color = self.nodes[y].color;
        let x;
        if self.nodes[z].left == NIL {
            x = self.nodes[z].right;
            self.transplant(z, x);
        } else if self.nodes[z].right == NIL {
            x = self.nodes[z].left;
            self.transplant(z, x);
        } else {
            y = self.minimum(self.nodes[z].right);
            y_color = self.nodes[y].color;
            x = self.nodes[y].right;
            if self.nodes[y].parent == z {
                self.nodes[x].parent = y;
            } else {
                self.transplant(y, x);
                let zr = self.nodes[z].right;
                self.nodes[y].right = zr;
                self.nodes[zr].parent = y;
            }
            self.transplant(z, y);
            let zl = self.nodes[z].left;
            self.nodes[y].left = zl;
            self.nodes[zl].parent = y;
            self.nodes[y].color = self.nodes[z].color;
        }
        if y_color == Color::Black {
            self.delete_fixup(x);
        }
        // The sentinel may have picked up a parent link above.
        self.nodes[NIL].parent = NIL;
        self.nodes[NIL].color = Color::Black;
    }

    fn delete_fixup(&mut self, mut x: usize) {
        while x != self.root && self.nodes[x].color == Color::Black {
            let xp = self.nodes[x].parent;
            if x == self.nodes[xp].left {
                let mut w = self.nodes[xp].right;
                if self.nodes[w].color == Color::Red {
                    self.nodes[w].color = Color::Black;
                    self.nodes[xp].color = Color::Red;
                    self.left_rotate(xp);
                    w = self.nodes[self.nodes[x].parent].right;
                }
                let (wl, wr) = (self.nodes[w].left, self.nodes[w].right);
                if self.nodes[wl].color == Color::Black && self.nodes[wr].color == Color::Black {
                    self.nodes[w].color = Color::Red;
                    x = self.nodes[x].parent;
                } else {
                    if self.nodes[wr].color == Color::Black {
                        self.nodes[wl].color = Color::Black;
                        self.nodes[w].color = Color::Red;
                        self.right_rotate(w);
                        w = self.nodes[self.nodes[x].parent].right;
                    }
                    let xp = self.nodes[x].parent;
                    self.nodes[w].color = self.nodes[xp].color;
                    self.nodes[xp].color = Color::Black;
                    let wr = self.nodes[w].right;
                    self.nodes[wr].color = Color::Black;
                    self.left_rotate(xp);
                    x = self.root;
                }
            } else {
                let mut w = self.nodes[xp].left;
                if self.nodes[w].color == Color::Red {
                    self.nodes[w].color = Color::Black;
                    self.nodes[xp].color = Color::Red;
                    self.right_rotate(xp);
                    w = self.nodes[self.nodes[x].parent].left;
                }
                let (wl, wr) = (self.nodes[w].left, self.nodes[w].right);
                if self.nodes[wr].color == Color::Black && self.nodes[wl].color == Color::Black {
                    self.nodes[w].color = Color::Red;
                    x = self.nodes[x].parent;
                } else {
                    if self.nodes[wl].color == Color::Black {
                        self.nodes[wr].color = Color::Black;
                        self.nodes[w].color = Color::Red;
                        self.left_rotate(w);
                        w = self.nodes[self.nodes[x].parent].left;
                    }
                    let xp = self.nodes[x].parent;
                    self.nodes[w].color = self.nodes[xp].color;
                    self.nodes[xp].color = Color::Black;
                    let wl = self.nodes[w].left;
                    self.nodes[wl].color = Color::Black;
                    self.right_rotate(xp);
                    x = self.root;
                }
            }
        }
        self.nodes[x].color = Color::Black;
    }

    /// Check the red-black invariants; returns the black height.
    #[cfg(test)]
    fn check_invariants(&self) -> usize {
        fn walk<V>(nodes: &[Node<V>], x: usize, parent: usize) -> usize {
            if x == NIL {
                return 1;
            }
            let node = &nodes[x];
            assert_eq!(node.parent, parent, "broken parent link");
            if node.color == Color::Red {
                assert_eq!(nodes[node.left].color, Color::Black, "red node with red child");
                assert_eq!(nodes[node.right].color, Color::Black, "red node with red child");
            }
            if node.left != NIL {
                assert!(nodes[node.left].key < node.key);
            }
            if node.right != NIL {
                assert!(nodes[node.right].key > node.key);
            }
            let lh = walk(nodes, node.left, x);
            let rh = walk(nodes, node.right, x);
            assert_eq!(lh, rh, "unequal black height");
            lh + usize::from(node.color == Color::Black)
        }
        assert_eq!(self.nodes[self.root].color, Color::Black);
        walk(&self.nodes, self.root, NIL)
    }
}

/// Ascending in-order iterator.
pub struct Iter<'a, V> {
    tree: &'a RbTree<V>,
    next: usize,
}

impl<'a, V: ByteSize> Iterator for Iter<'a, V> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.next != NIL {
            let x = self.next;
            self.next = self.tree.successor(x);
            let node = &self.tree.nodes[x];
            if let Some(value) = node.value.as_ref() {
                return Some((node.key.as_slice(), value));
            }
        }
        None
    }
}
