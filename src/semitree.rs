//! Arena-based semi-tree with sibling and inorder iteration.
//!
//! Nodes are leaves or branches. A hidden sentinel branch with id 0
//! roots the tree; its children form the top-level sequence. Inorder
//! iteration visits every branch twice (descending with
//! `visited = false`, ascending with `visited = true`) and every leaf
//! once, which yields pre- and post-order traversals when filtered by
//! the flag.
//!
//! Back-references are ids, never owning pointers; a node's inorder
//! neighbours are derived from its parent and sibling position.

pub type NodeId = usize;

/// Id of the hidden sentinel root branch.
pub const ROOT: NodeId = 0;

struct Node<T> {
    /// `None` only for the sentinel root.
    payload: Option<T>,
    parent: Option<NodeId>,
    /// `Some` for branches (possibly empty), `None` for leaves.
    children: Option<Vec<NodeId>>,
}

pub struct Tree<T> {
    nodes: Vec<Node<T>>,
}

/// A position in the inorder sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InorderPos {
    pub node: NodeId,
    pub visited: bool,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Tree<T> {
    pub fn new() -> Self {
        Tree {
            nodes: vec![Node {
                payload: None,
                parent: None,
                children: Some(Vec::new()),
            }],
        }
    }

    /// Number of nodes, sentinel root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[ROOT]
            .children
            .as_ref()
            .expect("root is a branch")
            .is_empty()
    }

    /// Create an unattached leaf.
    pub fn add_leaf(&mut self, payload: T) -> NodeId {
        self.add_node(payload, None)
    }

    /// Create an unattached empty branch.
    pub fn add_branch(&mut self, payload: T) -> NodeId {
        self.add_node(payload, Some(Vec::new()))
    }

    fn add_node(&mut self, payload: T, children: Option<Vec<NodeId>>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            payload: Some(payload),
            parent: None,
            children,
        });
        id
    }

    pub fn is_branch(&self, id: NodeId) -> bool {
        self.nodes[id].children.is_some()
    }

    /// Promote a leaf to an empty branch.
    pub fn make_branch(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        if node.children.is_none() {
            node.children = Some(Vec::new());
        }
    }

    pub fn payload(&self, id: NodeId) -> &T {
        self.nodes[id].payload.as_ref().expect("sentinel root has no payload")
    }

    pub fn payload_mut(&mut self, id: NodeId) -> &mut T {
        self.nodes[id].payload.as_mut().expect("sentinel root has no payload")
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// Children of a branch; empty for leaves.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id].children {
            Some(c) => c,
            None => &[],
        }
    }

    /// Append `child` as the last child of `parent`.
    pub fn push_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.nodes[child].parent.is_none(), "node already attached");
        self.nodes[child].parent = Some(parent);
        self.nodes[parent]
            .children
            .as_mut()
            .expect("parent must be a branch")
            .push(child);
    }

    /// Insert `child` immediately after `anchor` in the anchor's parent.
    pub fn insert_after(&mut self, anchor: NodeId, child: NodeId) {
        let parent = self.nodes[anchor].parent.expect("anchor must be attached");
        let pos = self.child_position(parent, anchor);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent]
            .children
            .as_mut()
            .expect("parent is a branch")
            .insert(pos + 1, child);
    }

    /// Insert `child` immediately before `anchor` in the anchor's parent.
    pub fn insert_before(&mut self, anchor: NodeId, child: NodeId) {
        let parent = self.nodes[anchor].parent.expect("anchor must be attached");
        let pos = self.child_position(parent, anchor);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent]
            .children
            .as_mut()
            .expect("parent is a branch")
            .insert(pos, child);
    }

    /// Insert before an inorder position. A visited branch position
    /// means "append as its last child"; every other position reduces to
    /// sibling insertion before the pointed-to node.
    pub fn insert_at(&mut self, pos: InorderPos, child: NodeId) {
        if self.is_branch(pos.node) && pos.visited {
            self.push_child(pos.node, child);
        } else {
            self.insert_before(pos.node, child);
        }
    }

    /// Ancestors of `id`, nearest first, stopping before the sentinel.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut cur = self.nodes[id].parent;
        std::iter::from_fn(move || {
            let up = cur?;
            if up == ROOT {
                return None;
            }
            cur = self.nodes[up].parent;
            Some(up)
        })
    }

    /// Positions of the inorder sequence compare equal when they point
    /// at the same node and, for branches, carry the same flag.
    pub fn pos_eq(&self, a: InorderPos, b: InorderPos) -> bool {
        a.node == b.node && (!self.is_branch(a.node) || a.visited == b.visited)
    }

    fn child_position(&self, parent: NodeId, child: NodeId) -> usize {
        self.children(parent)
            .iter()
            .position(|&c| c == child)
            .expect("child not found under its parent")
    }

    /// Successor in the inorder sequence. Must not be called on the
    /// final position of the subtree being walked.
    pub fn inorder_next(&self, pos: InorderPos) -> InorderPos {
        let node = &self.nodes[pos.node];
        if let (Some(children), false) = (&node.children, pos.visited) {
            // unvisited branch: descend, or mark empty self visited
            return match children.first() {
                Some(&first) => InorderPos {
                    node: first,
                    visited: false,
                },
                None => InorderPos {
                    node: pos.node,
                    visited: true,
                },
            };
        }
        // leaf or visited branch: next sibling, or parent (visited)
        let parent = node.parent.expect("inorder_next ran past the root");
        let siblings = self.children(parent);
        let idx = self.child_position(parent, pos.node);
        if idx + 1 == siblings.len() {
            InorderPos {
                node: parent,
                visited: true,
            }
        } else {
            InorderPos {
                node: siblings[idx + 1],
                visited: false,
            }
        }
    }

    /// Predecessor in the inorder sequence; mirrors [`Tree::inorder_next`].
    pub fn inorder_prev(&self, pos: InorderPos) -> InorderPos {
        let node = &self.nodes[pos.node];
        if let (Some(children), true) = (&node.children, pos.visited) {
            // visited branch: ascend from last child, or unmark empty self
            return match children.last() {
                Some(&last) => InorderPos {
                    node: last,
                    visited: true,
                },
                None => InorderPos {
                    node: pos.node,
                    visited: false,
                },
            };
        }
        let parent = node.parent.expect("inorder_prev ran past the root");
        let idx = self.child_position(parent, pos.node);
        if idx == 0 {
            InorderPos {
                node: parent,
                visited: false,
            }
        } else {
            InorderPos {
                node: self.children(parent)[idx - 1],
                visited: true,
            }
        }
    }

    /// Inorder walk of the subtree rooted at `from`, the root position
    /// included on both descent and ascent.
    pub fn inorder(&self, from: NodeId) -> Inorder<'_, T> {
        Inorder {
            tree: self,
            from,
            cur: Some(InorderPos {
                node: from,
                visited: false,
            }),
        }
    }

    /// Reverse inorder walk of the subtree rooted at `from`.
    pub fn inorder_rev(&self, from: NodeId) -> InorderRev<'_, T> {
        let start = if self.is_branch(from) {
            InorderPos {
                node: from,
                visited: true,
            }
        } else {
            InorderPos {
                node: from,
                visited: false,
            }
        };
        InorderRev {
            tree: self,
            from,
            cur: Some(start),
        }
    }
}

pub struct Inorder<'a, T> {
    tree: &'a Tree<T>,
    from: NodeId,
    cur: Option<InorderPos>,
}

impl<T> Iterator for Inorder<'_, T> {
    type Item = InorderPos;

    fn next(&mut self) -> Option<InorderPos> {
        let pos = self.cur?;
        let last_of_subtree = if self.tree.is_branch(self.from) {
            pos.node == self.from && pos.visited
        } else {
            pos.node == self.from
        };
        self.cur = if last_of_subtree {
            None
        } else {
            Some(self.tree.inorder_next(pos))
        };
        Some(pos)
    }
}

pub struct InorderRev<'a, T> {
    tree: &'a Tree<T>,
    from: NodeId,
    cur: Option<InorderPos>,
}

impl<T> Iterator for InorderRev<'_, T> {
    type Item = InorderPos;

    fn next(&mut self) -> Option<InorderPos> {
        let pos = self.cur?;
        let first_of_subtree = pos.node == self.from && !pos.visited;
        self.cur = if first_of_subtree {
            None
        } else {
            Some(self.tree.inorder_prev(pos))
        };
        Some(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // root{1} with children (l1{2}, b1{4}), b1 with children
    // (b2{6}, l2{3}), b2 with child l3{5}.
    fn sample() -> (Tree<i32>, NodeId) {
        let mut t = Tree::new();
        let root = t.add_branch(1);
        t.push_child(ROOT, root);
        let l1 = t.add_leaf(2);
        t.push_child(root, l1);
        let b1 = t.add_branch(4);
        t.push_child(root, b1);
        let b2 = t.add_branch(6);
        t.push_child(b1, b2);
        let l3 = t.add_leaf(5);
        t.push_child(b2, l3);
        let l2 = t.add_leaf(3);
        t.push_child(b1, l2);
        (t, root)
    }

    #[test]
    fn inorder_visits_branches_twice_and_leaves_once() {
        let (t, root) = sample();
        let total: i32 = t.inorder(root).map(|p| *t.payload(p.node)).sum();
        assert_eq!(total, 32);
    }

    #[test]
    fn preorder_and_postorder_sums() {
        let (t, root) = sample();
        let pre: i32 = t
            .inorder(root)
            .filter(|p| !p.visited)
            .map(|p| *t.payload(p.node))
            .sum();
        let post: i32 = t
            .inorder(root)
            .filter(|p| p.visited || !t.is_branch(p.node))
            .map(|p| *t.payload(p.node))
            .sum();
        assert_eq!(pre, 21);
        assert_eq!(post, 21);
    }

    #[test]
    fn reverse_inorder_is_the_mirror_sequence() {
        let (t, root) = sample();
        let forward: Vec<InorderPos> = t.inorder(root).collect();
        let mut backward: Vec<InorderPos> = t.inorder_rev(root).collect();
        backward.reverse();
        assert_eq!(forward.len(), backward.len());
        for (a, b) in forward.iter().zip(backward.iter()) {
            assert!(t.pos_eq(*a, *b), "{a:?} != {b:?}");
        }
    }

    #[test]
    fn leaf_counts_match_structure() {
        let (t, root) = sample();
        let positions: Vec<InorderPos> = t.inorder(root).collect();
        // 3 branches visited twice + 3 leaves visited once
        assert_eq!(positions.len(), 9);
        for p in &positions {
            if !t.is_branch(p.node) {
                assert!(!p.visited);
            }
        }
    }

    #[test]
    fn empty_branch_is_visited_twice_in_a_row() {
        let mut t = Tree::new();
        let b = t.add_branch(7);
        t.push_child(ROOT, b);
        let seq: Vec<InorderPos> = t.inorder(b).collect();
        assert_eq!(seq.len(), 2);
        assert!(!seq[0].visited);
        assert!(seq[1].visited);
    }

    #[test]
    fn single_leaf_subtree_yields_once() {
        let mut t = Tree::new();
        let l = t.add_leaf(9);
        t.push_child(ROOT, l);
        let seq: Vec<InorderPos> = t.inorder(l).collect();
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn insert_at_visited_branch_appends_as_last_child() {
        let (mut t, root) = sample();
        let n = t.add_leaf(10);
        t.insert_at(
            InorderPos {
                node: root,
                visited: true,
            },
            n,
        );
        assert_eq!(t.children(root).last().copied(), Some(n));
        assert_eq!(t.parent(n), Some(root));
    }

    #[test]
    fn insert_at_unvisited_node_is_sibling_insertion() {
        let (mut t, root) = sample();
        let first = t.children(root)[0];
        let n = t.add_leaf(11);
        t.insert_at(
            InorderPos {
                node: first,
                visited: false,
            },
            n,
        );
        assert_eq!(t.children(root)[0], n);
        assert_eq!(t.children(root)[1], first);
    }

    #[test]
    fn insert_after_keeps_sibling_order() {
        let mut t = Tree::new();
        let a = t.add_leaf(1);
        t.push_child(ROOT, a);
        let b = t.add_leaf(2);
        t.push_child(ROOT, b);
        let m = t.add_leaf(3);
        t.insert_after(a, m);
        assert_eq!(t.children(ROOT), &[a, m, b]);
    }

    #[test]
    fn ancestors_walk_stops_before_sentinel() {
        let (t, root) = sample();
        let b1 = t.children(root)[1];
        let b2 = t.children(b1)[0];
        let l3 = t.children(b2)[0];
        let ups: Vec<NodeId> = t.ancestors(l3).collect();
        assert_eq!(ups, vec![b2, b1, root]);
    }

    #[test]
    fn pos_eq_ignores_flag_on_leaves() {
        let (t, root) = sample();
        let l1 = t.children(root)[0];
        let a = InorderPos {
            node: l1,
            visited: false,
        };
        let b = InorderPos {
            node: l1,
            visited: true,
        };
        assert!(t.pos_eq(a, b));
        let c = InorderPos {
            node: root,
            visited: false,
        };
        let d = InorderPos {
            node: root,
            visited: true,
        };
        assert!(!t.pos_eq(c, d));
    }
}
