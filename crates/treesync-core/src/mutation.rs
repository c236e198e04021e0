//! Pure structural edits over a [`Tree`]
//!
//! Every operation takes a tree by reference and returns a brand new tree plus
//! the [`MutationRecord`]s describing the edit. The input is never touched, so
//! the pre-edit snapshot stays available to the caller, and a rejected edit
//! (validation error, unknown id) leaves nothing half-applied.

use std::collections::{HashMap, HashSet};

use tracing::debug;
use ulid::Ulid;

use crate::config::{MutationOptions, RenameMode};
use crate::error::{TreeSyncError, TreeSyncResult, ValidationError};
use crate::tree::{join_path, rebase_paths, Tree};
use crate::types::{MutationRecord, NodeKind, NodeLevel, RecordPayload, TreeNode};

/// Result of a structural edit
#[derive(Debug, Clone)]
pub struct Mutation {
    pub tree: Tree,
    pub records: Vec<MutationRecord>,
}

impl Mutation {
    fn unchanged(tree: &Tree) -> Self {
        Self {
            tree: tree.clone(),
            records: Vec::new(),
        }
    }
}

/// Description of a node to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    pub kind: NodeKind,
    /// Generated when absent
    pub name: Option<String>,
    pub content: Option<String>,
}

impl NewNode {
    pub fn file() -> Self {
        Self {
            kind: NodeKind::File,
            name: None,
            content: None,
        }
    }

    pub fn directory() -> Self {
        Self {
            kind: NodeKind::Directory,
            name: None,
            content: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Applies move, rename, delete and create to tree values
#[derive(Debug, Clone, Default)]
pub struct MutationEngine {
    options: MutationOptions,
}

impl MutationEngine {
    pub fn new(options: MutationOptions) -> Self {
        Self { options }
    }

    pub fn rename_mode(&self) -> RenameMode {
        self.options.rename_mode
    }

    /// Move subtrees under `dest_parent` (or to the root list) at `dest_index`
    ///
    /// Paths of every moved node and all of its descendants are recomputed
    /// from the destination. One record is emitted per moved subtree root,
    /// except where the path did not change.
    pub fn move_nodes<S: AsRef<str>>(
        &self,
        tree: &Tree,
        dragged_ids: &[S],
        dest_parent: Option<&str>,
        dest_index: usize,
    ) -> TreeSyncResult<Mutation> {
        let ids = dedup_ids(dragged_ids);
        if ids.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }

        // Snapshot before removal; the nodes are gone from their old spot later
        let mut snapshot: HashMap<&str, (String, NodeKind)> = HashMap::new();
        for id in &ids {
            let node = tree
                .find_by_id(id)
                .ok_or_else(|| TreeSyncError::NodeNotFound(id.to_string()))?;
            if let Some(dest) = dest_parent {
                if tree.is_within(id, dest) {
                    return Err(ValidationError::CycleDetected {
                        node: id.to_string(),
                        destination: dest.to_string(),
                    }
                    .into());
                }
            }
            snapshot.insert(id, (node.path.clone(), node.kind));
        }
        let dest_path = tree.parent_path(dest_parent)?;

        let mut next = tree.clone();
        let targets: HashSet<&str> = ids.iter().copied().collect();
        let mut moved = next.take_where(|n| targets.contains(n.id.as_str()));
        let order: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        moved.sort_by_key(|n| order.get(n.id.as_str()).copied().unwrap_or(usize::MAX));

        let siblings = next.children_mut(dest_parent)?;
        let mut landing: HashSet<&str> = HashSet::new();
        for node in &moved {
            let new_path = join_path(&dest_path, &node.name);
            let clash = siblings
                .iter()
                .any(|s| s.name == node.name || s.id == new_path);
            if clash || !landing.insert(node.name.as_str()) {
                return Err(ValidationError::PathConflict(new_path).into());
            }
        }

        let mut records = Vec::new();
        for node in moved.iter_mut() {
            let (source_path, node_kind) = snapshot
                .get(node.id.as_str())
                .cloned()
                .unwrap_or_else(|| (node.path.clone(), node.kind));
            rebase_paths(node, &dest_path);
            if source_path == node.path {
                debug!(path = %node.path, "Skipping no-op move");
                continue;
            }
            records.push(MutationRecord::new(RecordPayload::Move {
                source_path,
                dest_path: node.path.clone(),
                name: node.name.clone(),
                node_kind,
            }));
        }

        let index = dest_index.min(siblings.len());
        let count = moved.len();
        let tail = siblings.split_off(index);
        siblings.extend(moved);
        siblings.extend(tail);

        debug!(
            moved = count,
            records = records.len(),
            dest = %dest_path,
            index,
            "Moved nodes"
        );
        Ok(Mutation {
            tree: next,
            records,
        })
    }

    /// Rename a node
    ///
    /// In [`RenameMode::Strict`] the node and its descendants are re-pathed
    /// the same way a move would. In [`RenameMode::Loose`] only `name`
    /// changes and the node keeps its old `path` and `id`.
    pub fn rename(&self, tree: &Tree, id: &str, new_name: &str) -> TreeSyncResult<Mutation> {
        validate_name(new_name)?;
        let node = tree
            .find_by_id(id)
            .ok_or_else(|| TreeSyncError::NodeNotFound(id.to_string()))?;
        if node.name == new_name {
            return Ok(Mutation::unchanged(tree));
        }
        let old_name = node.name.clone();
        let old_path = node.path.clone();

        let new_path = match self.options.rename_mode {
            RenameMode::Loose => None,
            RenameMode::Strict => {
                let parent = tree.find_parent(id);
                let parent_path = parent.map(|p| p.path.clone()).unwrap_or_default();
                let new_path = join_path(&parent_path, new_name);
                let siblings = parent.map(|p| p.children()).unwrap_or(tree.roots());
                if siblings
                    .iter()
                    .any(|s| s.id != id && (s.name == new_name || s.id == new_path))
                {
                    return Err(ValidationError::PathConflict(new_path).into());
                }
                Some((parent_path, new_path))
            }
        };

        let mut next = tree.clone();
        let target = next
            .find_by_id_mut(id)
            .ok_or_else(|| TreeSyncError::NodeNotFound(id.to_string()))?;
        target.name = new_name.to_string();
        if let Some((parent_path, _)) = &new_path {
            rebase_paths(target, parent_path);
        }

        debug!(%old_path, %new_name, mode = ?self.options.rename_mode, "Renamed node");
        let record = MutationRecord::new(RecordPayload::Rename {
            path: old_path,
            old_name,
            new_name: new_name.to_string(),
            new_path: new_path.map(|(_, path)| path),
        });
        Ok(Mutation {
            tree: next,
            records: vec![record],
        })
    }

    /// Delete nodes and everything below them
    ///
    /// Every listed node and each of its descendants gets a record, in
    /// pre-order, collected before anything is removed.
    pub fn delete<S: AsRef<str>>(&self, tree: &Tree, ids: &[S]) -> TreeSyncResult<Mutation> {
        let ids = dedup_ids(ids);
        if ids.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }

        let mut covered: HashSet<&str> = HashSet::new();
        for id in &ids {
            let node = tree
                .find_by_id(id)
                .ok_or_else(|| TreeSyncError::NodeNotFound(id.to_string()))?;
            let mut stack = vec![node];
            while let Some(n) = stack.pop() {
                covered.insert(n.id.as_str());
                stack.extend(n.children());
            }
        }

        let records: Vec<MutationRecord> = tree
            .flatten()
            .into_iter()
            .filter(|n| covered.contains(n.id.as_str()))
            .map(|n| {
                MutationRecord::new(RecordPayload::Delete {
                    path: n.path.clone(),
                    name: n.name.clone(),
                    node_kind: n.kind,
                })
            })
            .collect();

        let mut next = tree.clone();
        let targets: HashSet<&str> = ids.iter().copied().collect();
        let removed = next.take_where(|n| targets.contains(n.id.as_str()));

        debug!(
            subtrees = removed.len(),
            records = records.len(),
            "Deleted nodes"
        );
        Ok(Mutation {
            tree: next,
            records,
        })
    }

    /// Insert a new node under `parent` (or at the root list) at `index`
    pub fn create(
        &self,
        tree: &Tree,
        parent: Option<&str>,
        index: usize,
        new_node: NewNode,
    ) -> TreeSyncResult<Mutation> {
        let parent_path = tree.parent_path(parent)?;
        let level = match parent {
            Some(id) => tree
                .find_by_id(id)
                .map(|p| p.level.child_level())
                .unwrap_or_default(),
            None => NodeLevel::Collection,
        };

        let name = match new_node.name {
            Some(name) => {
                validate_name(&name)?;
                name
            }
            None => format!("untitled-{}", Ulid::new().to_string().to_lowercase()),
        };
        let path = join_path(&parent_path, &name);

        let mut next = tree.clone();
        let siblings = next.children_mut(parent)?;
        if siblings.iter().any(|s| s.name == name || s.id == path) {
            return Err(ValidationError::PathConflict(path).into());
        }

        let node = TreeNode {
            id: path.clone(),
            name,
            path: path.clone(),
            kind: new_node.kind,
            level,
            children: match new_node.kind {
                NodeKind::Directory => Some(Vec::new()),
                NodeKind::File => None,
            },
            content: new_node.content.clone(),
        };
        let index = index.min(siblings.len());
        siblings.insert(index, node);

        debug!(%path, kind = %new_node.kind, index, "Created node");
        let record = MutationRecord::new(RecordPayload::Create {
            path,
            node_kind: new_node.kind,
            content: new_node.content,
        });
        Ok(Mutation {
            tree: next,
            records: vec![record],
        })
    }
}

fn dedup_ids<S: AsRef<str>>(ids: &[S]) -> Vec<&str> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|s| s.as_ref())
        .filter(|s| seen.insert(*s))
        .collect()
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    Ok(())
}
