//! Sorted container over an injected total order.
//!
//! Nodes live in a dense arena and reference each other by index, with parent
//! back-links so that cursors can walk to the in-order successor or
//! predecessor in O(1) amortized time. There is no separate key type: the
//! comparator defines both order and equality.

use std::cmp::Ordering;

/// Total order used by an [`AvlTree`].
pub trait Compare<T> {
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

impl<T, F> Compare<T> for F
where
    F: Fn(&T, &T) -> Ordering,
{
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self(a, b)
    }
}

type Link = Option<usize>;

#[derive(Debug, Clone)]
struct Node<T> {
    value: T,
    parent: Link,
    left: Link,
    right: Link,
    height: i32,
}

#[derive(Clone)]
pub struct AvlTree<T, C> {
    nodes: Vec<Node<T>>,
    root: Link,
    comparator: C,
}

impl<T, C: Compare<T>> AvlTree<T, C> {
    pub fn new(comparator: C) -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            comparator,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Inserts `value` unless an equal value is already present.
    pub fn insert(&mut self, value: T) -> bool {
        let mut current = match self.root {
            Some(root) => root,
            None => {
                self.root = Some(self.allocate(value, None));
                return true;
            }
        };

        loop {
            match self.comparator.compare(&value, &self.nodes[current].value) {
                Ordering::Less => match self.nodes[current].left {
                    Some(left) => current = left,
                    None => {
                        let node = self.allocate(value, Some(current));
                        self.nodes[current].left = Some(node);
                        self.rebalance(current);
                        return true;
                    }
                },
                Ordering::Greater => match self.nodes[current].right {
                    Some(right) => current = right,
                    None => {
                        let node = self.allocate(value, Some(current));
                        self.nodes[current].right = Some(node);
                        self.rebalance(current);
                        return true;
                    }
                },
                Ordering::Equal => return false,
            }
        }
    }

    /// Removes the value equal to `probe` and returns it.
    pub fn remove(&mut self, probe: &T) -> Option<T> {
        let target = self.find(probe)?;
        let Node {
            parent,
            left,
            right,
            ..
        } = self.nodes[target];

        match (left, right) {
            (None, None) => {
                self.replace_child(parent, target, None);
                if let Some(parent) = parent {
                    self.rebalance(parent);
                }
            }
            (Some(child), None) | (None, Some(child)) => {
                self.nodes[child].parent = parent;
                self.replace_child(parent, target, Some(child));
                if let Some(parent) = parent {
                    self.rebalance(parent);
                }
            }
            (Some(_), Some(right)) => {
                let mut successor = right;
                while let Some(next) = self.nodes[successor].left {
                    successor = next;
                }

                // Detach the successor, lifting its right subtree into its place.
                let successor_parent = self.nodes[successor].parent;
                let successor_right = self.nodes[successor].right;
                if let Some(successor_right) = successor_right {
                    self.nodes[successor_right].parent = successor_parent;
                }
                self.replace_child(successor_parent, successor, successor_right);

                // Splice the successor into the removed node's position.
                let Node {
                    parent,
                    left,
                    right,
                    ..
                } = self.nodes[target];
                self.nodes[successor].left = left;
                self.nodes[successor].right = right;
                self.nodes[successor].parent = parent;
                if let Some(left) = left {
                    self.nodes[left].parent = Some(successor);
                }
                if let Some(right) = right {
                    self.nodes[right].parent = Some(successor);
                }
                self.replace_child(parent, target, Some(successor));

                let lowest_changed = match successor_parent {
                    Some(p) if p != target => p,
                    _ => successor,
                };
                self.rebalance(lowest_changed);
            }
        }

        Some(self.release(target))
    }

    pub fn contains(&self, probe: &T) -> bool {
        self.find(probe).is_some()
    }

    pub fn get(&self, probe: &T) -> Option<&T> {
        self.find(probe).map(|idx| &self.nodes[idx].value)
    }

    pub fn first(&self) -> Option<&T> {
        self.root
            .map(|root| &self.nodes[self.leftmost(root)].value)
    }

    pub fn last(&self) -> Option<&T> {
        self.root
            .map(|root| &self.nodes[self.rightmost(root)].value)
    }

    pub fn iter(&self) -> Iter<'_, T, C> {
        Iter {
            tree: self,
            next: self.root.map(|root| self.leftmost(root)),
        }
    }

    pub fn iter_rev(&self) -> RevIter<'_, T, C> {
        RevIter {
            tree: self,
            next: self.root.map(|root| self.rightmost(root)),
        }
    }

    /// Cursor starting at the smallest value `>= probe`. The probe does not
    /// need to be a member.
    pub fn iter_from(&self, probe: &T) -> Iter<'_, T, C> {
        Iter {
            tree: self,
            next: self.ceiling(probe),
        }
    }

    /// Reverse cursor starting at the largest value `<= probe`.
    pub fn iter_rev_from(&self, probe: &T) -> RevIter<'_, T, C> {
        RevIter {
            tree: self,
            next: self.floor(probe),
        }
    }

    /// Smallest value strictly greater than `probe`.
    pub fn first_after(&self, probe: &T) -> Option<&T> {
        let mut candidate = None;
        let mut current = self.root;
        while let Some(idx) = current {
            if self.comparator.compare(probe, &self.nodes[idx].value) == Ordering::Less {
                candidate = Some(idx);
                current = self.nodes[idx].left;
            } else {
                current = self.nodes[idx].right;
            }
        }
        candidate.map(|idx| &self.nodes[idx].value)
    }

    fn find(&self, probe: &T) -> Link {
        let mut current = self.root;
        while let Some(idx) = current {
            current = match self.comparator.compare(probe, &self.nodes[idx].value) {
                Ordering::Less => self.nodes[idx].left,
                Ordering::Greater => self.nodes[idx].right,
                Ordering::Equal => return Some(idx),
            };
        }
        None
    }

    fn ceiling(&self, probe: &T) -> Link {
        let mut candidate = None;
        let mut current = self.root;
        while let Some(idx) = current {
            current = match self.comparator.compare(probe, &self.nodes[idx].value) {
                Ordering::Equal => return Some(idx),
                Ordering::Less => {
                    candidate = Some(idx);
                    self.nodes[idx].left
                }
                Ordering::Greater => self.nodes[idx].right,
            };
        }
        candidate
    }

    fn floor(&self, probe: &T) -> Link {
        let mut candidate = None;
        let mut current = self.root;
        while let Some(idx) = current {
            current = match self.comparator.compare(probe, &self.nodes[idx].value) {
                Ordering::Equal => return Some(idx),
                Ordering::Greater => {
                    candidate = Some(idx);
                    self.nodes[idx].right
                }
                Ordering::Less => self.nodes[idx].left,
            };
        }
        candidate
    }

    fn leftmost(&self, mut idx: usize) -> usize {
        while let Some(left) = self.nodes[idx].left {
            idx = left;
        }
        idx
    }

    fn rightmost(&self, mut idx: usize) -> usize {
        while let Some(right) = self.nodes[idx].right {
            idx = right;
        }
        idx
    }

    fn successor(&self, idx: usize) -> Link {
        if let Some(right) = self.nodes[idx].right {
            return Some(self.leftmost(right));
        }
        let mut current = idx;
        let mut parent = self.nodes[idx].parent;
        while let Some(p) = parent {
            if self.nodes[p].right != Some(current) {
                break;
            }
            current = p;
            parent = self.nodes[p].parent;
        }
        parent
    }

    fn predecessor(&self, idx: usize) -> Link {
        if let Some(left) = self.nodes[idx].left {
            return Some(self.rightmost(left));
        }
        let mut current = idx;
        let mut parent = self.nodes[idx].parent;
        while let Some(p) = parent {
            if self.nodes[p].left != Some(current) {
                break;
            }
            current = p;
            parent = self.nodes[p].parent;
        }
        parent
    }

    fn allocate(&mut self, value: T, parent: Link) -> usize {
        self.nodes.push(Node {
            value,
            parent,
            left: None,
            right: None,
            height: 1,
        });
        self.nodes.len() - 1
    }

    /// Drops a detached node from the arena. The last node moves into the
    /// freed slot and every link pointing at it is redirected.
    fn release(&mut self, idx: usize) -> T {
        let last = self.nodes.len() - 1;
        if idx != last {
            let Node {
                parent,
                left,
                right,
                ..
            } = self.nodes[last];
            match parent {
                Some(p) if self.nodes[p].left == Some(last) => self.nodes[p].left = Some(idx),
                Some(p) => self.nodes[p].right = Some(idx),
                None => self.root = Some(idx),
            }
            if let Some(left) = left {
                self.nodes[left].parent = Some(idx);
            }
            if let Some(right) = right {
                self.nodes[right].parent = Some(idx);
            }
        }
        self.nodes.swap_remove(idx).value
    }

    fn replace_child(&mut self, parent: Link, old: usize, new: Link) {
        match parent {
            None => self.root = new,
            Some(p) => {
                if self.nodes[p].left == Some(old) {
                    self.nodes[p].left = new;
                } else {
                    self.nodes[p].right = new;
                }
            }
        }
    }

    fn height(&self, link: Link) -> i32 {
        link.map_or(0, |idx| self.nodes[idx].height)
    }

    fn balance(&self, idx: usize) -> i32 {
        self.height(self.nodes[idx].right) - self.height(self.nodes[idx].left)
    }

    fn update_height(&mut self, idx: usize) {
        let height = self
            .height(self.nodes[idx].left)
            .max(self.height(self.nodes[idx].right))
            + 1;
        self.nodes[idx].height = height;
    }

    /// Restores heights and balance from `idx` up to the root.
    fn rebalance(&mut self, idx: usize) {
        let mut current = Some(idx);
        while let Some(node) = current {
            self.update_height(node);
            let top = match self.balance(node) {
                -2 => {
                    let Some(left) = self.nodes[node].left else {
                        unreachable!("left-heavy node without a left child")
                    };
                    if self.balance(left) > 0 {
                        self.rotate_left(left);
                    }
                    self.rotate_right(node)
                }
                2 => {
                    let Some(right) = self.nodes[node].right else {
                        unreachable!("right-heavy node without a right child")
                    };
                    if self.balance(right) < 0 {
                        self.rotate_right(right);
                    }
                    self.rotate_left(node)
                }
                _ => node,
            };
            current = self.nodes[top].parent;
        }
    }

    fn rotate_left(&mut self, pivot: usize) -> usize {
        let Some(new_pivot) = self.nodes[pivot].right else {
            unreachable!("left rotation without a right child")
        };
        let parent = self.nodes[pivot].parent;
        self.nodes[new_pivot].parent = parent;
        self.replace_child(parent, pivot, Some(new_pivot));

        let inner = self.nodes[new_pivot].left;
        self.nodes[pivot].right = inner;
        if let Some(inner) = inner {
            self.nodes[inner].parent = Some(pivot);
        }

        self.nodes[new_pivot].left = Some(pivot);
        self.nodes[pivot].parent = Some(new_pivot);
        self.update_height(pivot);
        self.update_height(new_pivot);
        new_pivot
    }

    fn rotate_right(&mut self, pivot: usize) -> usize {
        let Some(new_pivot) = self.nodes[pivot].left else {
            unreachable!("right rotation without a left child")
        };
        let parent = self.nodes[pivot].parent;
        self.nodes[new_pivot].parent = parent;
        self.replace_child(parent, pivot, Some(new_pivot));

        let inner = self.nodes[new_pivot].right;
        self.nodes[pivot].left = inner;
        if let Some(inner) = inner {
            self.nodes[inner].parent = Some(pivot);
        }

        self.nodes[new_pivot].right = Some(pivot);
        self.nodes[pivot].parent = Some(new_pivot);
        self.update_height(pivot);
        self.update_height(new_pivot);
        new_pivot
    }
}

/// In-order cursor. Borrows the tree, so it cannot outlive a mutation.
pub struct Iter<'a, T, C> {
    tree: &'a AvlTree<T, C>,
    next: Link,
}

impl<'a, T, C: Compare<T>> Iterator for Iter<'a, T, C> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let idx = self.next?;
        self.next = self.tree.successor(idx);
        Some(&self.tree.nodes[idx].value)
    }
}

/// Reverse in-order cursor.
pub struct RevIter<'a, T, C> {
    tree: &'a AvlTree<T, C>,
    next: Link,
}

impl<'a, T, C: Compare<T>> Iterator for RevIter<'a, T, C> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let idx = self.next?;
        self.next = self.tree.predecessor(idx);
        Some(&self.tree.nodes[idx].value)
    }
}

impl<'a, T, C: Compare<T>> IntoIterator for &'a AvlTree<T, C> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
