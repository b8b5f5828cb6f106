//! Content tree gathering.
//!
//! Walks the content directory and records every subdirectory as a node,
//! except the ones a parent claims as resources.

use std::{
    fs,
    path::{Path, PathBuf},
};

use kiln_core::{
    ConfigParser, CoreError, ItemSpec,
    config::{self, find_config},
    spec::ITEM_FILE,
};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Content tree errors.
#[derive(Debug, Error)]
pub enum TreeError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The content root is not a directory.
    #[error("content directory not found: {}", .0.display())]
    MissingRoot(PathBuf),

    /// An item specification could not be loaded.
    #[error(transparent)]
    Config(#[from] CoreError),
}

/// Result type for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Index of a node in a [`ContentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One directory of the content tree.
#[derive(Debug, Clone)]
pub struct ContentNode {
    /// Directory name; empty for the root.
    pub name: String,

    /// Parent node, `None` for the root.
    pub parent: Option<NodeId>,

    /// Source directory.
    pub source_dir: PathBuf,

    /// The node's `item` specification, if it has one.
    pub spec: Option<ItemSpec>,

    /// Child nodes sorted by name. `None` when there are none, never empty.
    pub children: Option<Vec<NodeId>>,
}

/// Arena of content nodes rooted at the content directory.
#[derive(Debug, Clone)]
pub struct ContentTree {
    nodes: Vec<ContentNode>,
}

impl ContentTree {
    /// Gather the tree below `source`.
    ///
    /// The root stands for `source` itself and never carries a
    /// specification.
    pub fn gather(source: &Path, parser: &dyn ConfigParser) -> Result<Self> {
        if !source.is_dir() {
            return Err(TreeError::MissingRoot(source.to_path_buf()));
        }

        let mut tree = Self {
            nodes: vec![ContentNode {
                name: String::new(),
                parent: None,
                source_dir: source.to_path_buf(),
                spec: None,
                children: None,
            }],
        };
        let root = tree.root();
        tree.nodes[root.0].children = tree.gather_children(root, parser)?;

        info!(
            source = %source.display(),
            nodes = tree.nodes.len() - 1,
            "gathered content tree"
        );
        Ok(tree)
    }

    fn gather_children(
        &mut self,
        parent: NodeId,
        parser: &dyn ConfigParser,
    ) -> Result<Option<Vec<NodeId>>> {
        let dir = self.nodes[parent.0].source_dir.clone();
        let parent_spec = self.nodes[parent.0].spec.as_ref();

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                warn!(path = %entry.path().display(), "skipping directory with a non UTF-8 name");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if parent_spec.is_some_and(|spec| spec.claims_resource(&name)) {
                debug!(dir = %entry.path().display(), "directory claimed as a resource");
                continue;
            }
            names.push(name);
        }
        names.sort();

        let mut children = Vec::with_capacity(names.len());
        for name in names {
            let source_dir = dir.join(&name);
            let spec = match find_config(&source_dir, ITEM_FILE) {
                Some(path) => Some(config::parse::<ItemSpec>(parser, &path)?),
                None => None,
            };

            let id = NodeId(self.nodes.len());
            self.nodes.push(ContentNode {
                name,
                parent: Some(parent),
                source_dir,
                spec,
                children: None,
            });
            self.nodes[id.0].children = self.gather_children(id, parser)?;
            children.push(id);
        }

        Ok((!children.is_empty()).then_some(children))
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Look up a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &ContentNode {
        &self.nodes[id.0]
    }

    /// Children of a node, empty for leaves.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &ContentNode)> {
        self.nodes[id.0]
            .children
            .iter()
            .flatten()
            .map(|&child| (child, &self.nodes[child.0]))
    }

    /// Find a node by its path of directory names below the root.
    #[must_use]
    pub fn find(&self, path: &[&str]) -> Option<NodeId> {
        path.iter().try_fold(self.root(), |id, name| {
            self.children(id)
                .find(|(_, node)| node.name == *name)
                .map(|(child, _)| child)
        })
    }

    /// Number of nodes, the root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds only its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Projection handed to templates as `items`:
    /// `{"children": {name: {"specs": …, "children": …}}}`.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        let mut root = Map::new();
        root.insert("children".to_string(), self.children_value(self.root())?);
        Ok(Value::Object(root))
    }

    fn children_value(&self, id: NodeId) -> serde_json::Result<Value> {
        if self.nodes[id.0].children.is_none() {
            return Ok(Value::Null);
        }
        let mut children = Map::new();
        for (child, node) in self.children(id) {
            let mut entry = Map::new();
            if let Some(spec) = &node.spec {
                entry.insert("specs".to_string(), serde_json::to_value(spec)?);
            }
            if node.children.is_some() {
                entry.insert("children".to_string(), self.children_value(child)?);
            }
            children.insert(node.name.clone(), Value::Object(entry));
        }
        Ok(Value::Object(children))
    }
}
