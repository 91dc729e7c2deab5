//! In-memory tree of filesystem entries, rooted at `/`.
//!
//! Nodes live in an arena (`Vec<Option<TreeNode>>`); a parent link is a
//! plain `NodeId` index, never an owning pointer, per spec.md §9 "Cyclic
//! parent pointers" — ownership of children flows one way, from parent to
//! child, through each directory's `OrderedIndex`.

use crate::index::OrderedIndex;

/// Index into the tree's arena. `NodeId(0)` is always the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

pub const ROOT: NodeId = NodeId(0);

/// Directories carry a children index; files carry their block list.
#[derive(Debug, Clone)]
pub enum EntryKind {
    File { data_blocks: Vec<u32> },
    Directory { children: OrderedIndex<NodeId> },
}

impl EntryKind {
    pub fn is_directory(&self) -> bool {
        matches!(self, EntryKind::Directory { .. })
    }
}

/// The in-memory counterpart of an on-disk `EntryRecord`.
///
/// `name` holds only the basename; the on-disk record holds the full
/// absolute path (spec.md §3).
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    pub kind: EntryKind,
    pub parent: Option<NodeId>,
    pub permissions: u32,
    pub owner: String,
    pub size: u64,
    pub created_at: u64,
    pub modified_at: u64,
}

impl TreeNode {
    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }
}

/// Splits `path` on `/`, skipping empty segments. `parent_path` of a
/// top-level path is `/`.
pub fn parse_path(path: &str) -> (String, String) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        None | Some(0) => ("/".to_string(), trimmed.trim_start_matches('/').to_string()),
        Some(pos) => (trimmed[..pos].to_string(), trimmed[pos + 1..].to_string()),
    }
}

/// Rooted tree of `TreeNode`s, addressed by `NodeId`.
#[derive(Debug)]
pub struct FsTree {
    nodes: Vec<Option<TreeNode>>,
    free_list: Vec<NodeId>,
}

impl FsTree {
    /// Builds a fresh tree containing only the root directory.
    pub fn new(root_owner: impl Into<String>, created_at: u64) -> Self {
        let root = TreeNode {
            name: "/".to_string(),
            kind: EntryKind::Directory {
                children: OrderedIndex::new(),
            },
            parent: None,
            permissions: 0o755,
            owner: root_owner.into(),
            size: 0,
            created_at,
            modified_at: created_at,
        };
        FsTree {
            nodes: vec![Some(root)],
            free_list: Vec::new(),
        }
    }

    /// Builds an empty tree with no root, used while replaying entries
    /// during `container::init` before the root has been synthesized.
    pub fn empty() -> Self {
        FsTree {
            nodes: Vec::new(),
            free_list: Vec::new(),
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0 as usize).and_then(|n| n.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id.0 as usize).and_then(|n| n.as_mut())
    }

    /// Allocates a new node, returning its id.
    pub fn alloc(&mut self, node: TreeNode) -> NodeId {
        if let Some(id) = self.free_list.pop() {
            self.nodes[id.0 as usize] = Some(node);
            id
        } else {
            let id = NodeId(self.nodes.len() as u32);
            self.nodes.push(Some(node));
            id
        }
    }

    /// Frees a previously allocated node. The id must not be reused by the caller.
    pub fn dealloc(&mut self, id: NodeId) {
        self.nodes[id.0 as usize] = None;
        self.free_list.push(id);
    }

    /// Walks `path` segment by segment from the root, returning `None` on
    /// any missing segment.
    pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
        if path == "/" || path.is_empty() {
            return Some(ROOT);
        }
        let mut current = ROOT;
        for segment in path.split('/') {
            if segment.is_empty() {
                continue;
            }
            let node = self.get(current)?;
            let children = match &node.kind {
                EntryKind::Directory { children } => children,
                EntryKind::File { .. } => return None,
            };
            current = *children.find(segment)?;
        }
        Some(current)
    }

    /// Links `child` into `parent`'s children index under `name`. Returns
    /// `false` without mutating if `name` is already taken.
    pub fn link_child(&mut self, parent: NodeId, name: &str, child: NodeId) -> bool {
        match self.get_mut(parent) {
            Some(TreeNode {
                kind: EntryKind::Directory { children },
                ..
            }) => children.insert(name, child),
            _ => false,
        }
    }

    pub fn unlink_child(&mut self, parent: NodeId, name: &str) -> Option<NodeId> {
        match self.get_mut(parent) {
            Some(TreeNode {
                kind: EntryKind::Directory { children },
                ..
            }) => children.remove(name),
            _ => None,
        }
    }

    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        match self.get(parent) {
            Some(TreeNode {
                kind: EntryKind::Directory { children },
                ..
            }) => children.find(name).copied(),
            _ => None,
        }
    }

    pub fn has_child(&self, parent: NodeId, name: &str) -> bool {
        self.find_child(parent, name).is_some()
    }

    pub fn list_children(&self, dir: NodeId) -> Vec<NodeId> {
        match self.get(dir) {
            Some(TreeNode {
                kind: EntryKind::Directory { children },
                ..
            }) => children.list_in_order().map(|(_, id)| *id).collect(),
            _ => Vec::new(),
        }
    }

    /// Pre-order DFS over the root's descendants (root excluded), yielding
    /// each node paired with its absolute path. This is the order `save`
    /// writes entries back to disk in, and the order `init` must be able to
    /// replay parent-before-child.
    pub fn preorder_descendants(&self) -> Vec<(String, NodeId)> {
        let mut out = Vec::new();
        self.collect(ROOT, "/", &mut out);
        out
    }

    fn collect(&self, id: NodeId, path: &str, out: &mut Vec<(String, NodeId)>) {
        let Some(node) = self.get(id) else { return };
        if id != ROOT {
            out.push((path.to_string(), id));
        }
        if let EntryKind::Directory { children } = &node.kind {
            for (name, child_id) in children.list_in_order() {
                let child_path = if path == "/" {
                    format!("/{name}")
                } else {
                    format!("{path}/{name}")
                };
                self.collect(*child_id, &child_path, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(name: &str, parent: NodeId) -> TreeNode {
        TreeNode {
            name: name.to_string(),
            kind: EntryKind::Directory {
                children: OrderedIndex::new(),
            },
            parent: Some(parent),
            permissions: 0o755,
            owner: "admin".to_string(),
            size: 0,
            created_at: 0,
            modified_at: 0,
        }
    }

    #[test]
    fn parse_path_top_level() {
        assert_eq!(parse_path("/a"), ("/".to_string(), "a".to_string()));
        assert_eq!(parse_path("/a/b"), ("/a".to_string(), "b".to_string()));
    }

    #[test]
    fn find_by_path_walks_segments() {
        let mut tree = FsTree::new("admin", 0);
        let a = tree.alloc(dir("a", ROOT));
        tree.link_child(ROOT, "a", a);
        let b = tree.alloc(dir("b", a));
        tree.link_child(a, "b", b);
        assert_eq!(tree.find_by_path("/a/b"), Some(b));
        assert_eq!(tree.find_by_path("/a/missing"), None);
    }

    #[test]
    fn preorder_excludes_root() {
        let mut tree = FsTree::new("admin", 0);
        let a = tree.alloc(dir("a", ROOT));
        tree.link_child(ROOT, "a", a);
        let entries = tree.preorder_descendants();
        assert_eq!(entries, vec![("/a".to_string(), a)]);
    }
}
