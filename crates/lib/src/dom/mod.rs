//! Observable in-memory model of the host page's chat render tree.
//!
//! The host framework owns the lifecycle of every node: it inserts message
//! elements as they arrive or scroll into the live buffer and evicts them when
//! the buffer trims. This module mirrors that surface as a shared node arena
//! plus a structural watch: every insertion emits one [`DomEvent`] carrying the
//! batch of added nodes, matching a single mutation record from the host.
//!
//! The engine never creates or destroys nodes. It only reads them and
//! annotates author chips through the dataset (string attribute) API.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde_json::Value;
use tokio::sync::mpsc;

mod error;
mod message;

pub use error::DomError;
pub use message::{AuthorInfo, MessageKind, chip_is_patched, find_author_chip, parse_author_info};

use crate::Result;

/// Opaque handle to a node in the render tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// A structural mutation notification.
#[derive(Debug, Clone)]
pub enum DomEvent {
    /// Nodes added by one mutation record. A single record may carry a whole
    /// batch of nodes, e.g. on fast scroll-back or reflow.
    Inserted { nodes: Vec<NodeId> },
}

/// Blueprint for a subtree to insert into the document.
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    /// Element tag, e.g. `yt-live-chat-text-message-renderer`.
    pub tag: String,
    /// Rendered text content, for leaf text elements.
    pub text: Option<String>,
    /// String attributes (the dataset).
    pub dataset: HashMap<String, String>,
    /// Engine-attached data record (current framework attachment point).
    pub data: Option<Value>,
    /// Engine-attached data record (older framework attachment point).
    pub legacy_data: Option<Value>,
    /// Child subtrees, in document order.
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    /// Create a spec for an element with the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Set the text content.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Attach a data record at the current attachment point.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a data record at the older attachment point.
    pub fn with_legacy_data(mut self, data: Value) -> Self {
        self.legacy_data = Some(data);
        self
    }

    /// Append a child subtree.
    pub fn with_child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug)]
struct NodeData {
    tag: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    text: Option<String>,
    dataset: HashMap<String, String>,
    data: Option<Value>,
    legacy_data: Option<Value>,
}

struct DomInner {
    nodes: HashMap<NodeId, NodeData>,
    /// Top-level nodes in insertion order.
    top_level: Vec<NodeId>,
    next_id: u64,
    events: mpsc::UnboundedSender<DomEvent>,
}

impl DomInner {
    fn alloc(&mut self, parent: Option<NodeId>, spec: NodeSpec) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let data = NodeData {
            tag: spec.tag,
            parent,
            children: Vec::new(),
            text: spec.text,
            dataset: spec.dataset,
            data: spec.data,
            legacy_data: spec.legacy_data,
        };
        self.nodes.insert(id, data);

        for child in spec.children {
            let child_id = self.alloc(Some(id), child);
            self.nodes
                .get_mut(&id)
                .expect("just inserted")
                .children
                .push(child_id);
        }

        id
    }

    fn node(&self, id: NodeId) -> Result<&NodeData> {
        self.nodes
            .get(&id)
            .ok_or_else(|| DomError::NodeNotFound { id }.into())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| DomError::NodeNotFound { id }.into())
    }

    /// Depth-first walk of the subtree below `root`, excluding `root` itself,
    /// collecting nodes whose tag satisfies the predicate. Document order.
    fn collect_descendants(
        &self,
        root: NodeId,
        pred: &dyn Fn(&str) -> bool,
        out: &mut Vec<NodeId>,
    ) {
        let Some(node) = self.nodes.get(&root) else {
            return;
        };
        for &child in &node.children {
            if let Some(data) = self.nodes.get(&child) {
                if pred(&data.tag) {
                    out.push(child);
                }
                self.collect_descendants(child, pred, out);
            }
        }
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.remove(&id) {
            for child in node.children {
                self.detach(child);
            }
        }
    }
}

/// Shared handle to the render tree. Clones refer to the same document.
#[derive(Clone)]
pub struct ChatDom {
    inner: Arc<Mutex<DomInner>>,
    watch: Arc<Mutex<Option<mpsc::UnboundedReceiver<DomEvent>>>>,
}

impl Default for ChatDom {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatDom {
    /// Create an empty document.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Mutex::new(DomInner {
                nodes: HashMap::new(),
                top_level: Vec::new(),
                next_id: 1,
                events: tx,
            })),
            watch: Arc::new(Mutex::new(Some(rx))),
        }
    }

    /// Take the structural watch stream. There is a single consumer; taking it
    /// twice is an error.
    pub fn take_watch(&self) -> Result<mpsc::UnboundedReceiver<DomEvent>> {
        self.watch
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| DomError::WatchAlreadyTaken.into())
    }

    /// Insert one subtree and emit a single-node mutation record.
    ///
    /// `parent = None` inserts at the top level of the document.
    pub fn insert(&self, parent: Option<NodeId>, spec: NodeSpec) -> Result<NodeId> {
        Ok(self.insert_batch(parent, vec![spec])?[0])
    }

    /// Insert several subtrees under one parent and emit ONE mutation record
    /// carrying all of them, the way a busy host delivers batched insertions.
    pub fn insert_batch(&self, parent: Option<NodeId>, specs: Vec<NodeSpec>) -> Result<Vec<NodeId>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(parent) = parent {
            // Validate before allocating anything.
            inner.node(parent)?;
        }

        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            let id = inner.alloc(parent, spec);
            match parent {
                Some(parent) => inner
                    .nodes
                    .get_mut(&parent)
                    .expect("validated above")
                    .children
                    .push(id),
                None => inner.top_level.push(id),
            }
            ids.push(id);
        }

        // Receiver dropped means nobody is watching; insertions still apply.
        let _ = inner.events.send(DomEvent::Inserted { nodes: ids.clone() });
        Ok(ids)
    }

    /// Remove a subtree, as the host does when the chat buffer trims old
    /// messages. Emits no event: the watch reacts to insertions only.
    pub fn remove(&self, id: NodeId) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let parent = inner.node(id)?.parent;
        match parent {
            Some(parent) => {
                if let Ok(node) = inner.node_mut(parent) {
                    node.children.retain(|&c| c != id);
                }
            }
            None => inner.top_level.retain(|&c| c != id),
        }
        inner.detach(id);
        Ok(())
    }

    /// Check whether a node is still part of the document.
    pub fn contains(&self, id: NodeId) -> bool {
        self.inner.lock().unwrap().nodes.contains_key(&id)
    }

    /// Get a node's tag.
    pub fn tag(&self, id: NodeId) -> Result<String> {
        Ok(self.inner.lock().unwrap().node(id)?.tag.clone())
    }

    /// Find the first node in document order with the given tag, anywhere in
    /// the document. This is the root-selector lookup.
    pub fn find_first(&self, tag: &str) -> Option<NodeId> {
        let inner = self.inner.lock().unwrap();
        let mut out = Vec::new();
        for &top in &inner.top_level {
            if let Some(data) = inner.nodes.get(&top)
                && data.tag == tag
            {
                return Some(top);
            }
            inner.collect_descendants(top, &|t| t == tag, &mut out);
            if let Some(&found) = out.first() {
                return Some(found);
            }
        }
        None
    }

    /// Collect descendants of `root` (excluding `root`) with the given tag,
    /// in document order.
    pub fn find_descendants(&self, root: NodeId, tag: &str) -> Result<Vec<NodeId>> {
        let inner = self.inner.lock().unwrap();
        inner.node(root)?;
        let mut out = Vec::new();
        inner.collect_descendants(root, &|t| t == tag, &mut out);
        Ok(out)
    }

    /// First descendant of `root` (excluding `root`) with the given tag.
    pub fn find_descendant(&self, root: NodeId, tag: &str) -> Result<Option<NodeId>> {
        Ok(self.find_descendants(root, tag)?.into_iter().next())
    }

    /// Check whether `node` lies within the subtree rooted at `ancestor`
    /// (inclusive: a node is within itself).
    pub fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let inner = self.inner.lock().unwrap();
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = inner.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    /// Read the engine-attached data record, trying the current attachment
    /// point first and the older one second. Host-framework versions differ in
    /// where they hang the record.
    pub fn attached_data(&self, id: NodeId) -> Result<Option<Value>> {
        let inner = self.inner.lock().unwrap();
        let node = inner.node(id)?;
        Ok(node.data.clone().or_else(|| node.legacy_data.clone()))
    }

    /// Read a dataset attribute.
    pub fn dataset_get(&self, id: NodeId, key: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.node(id)?.dataset.get(key).cloned())
    }

    /// Write a dataset attribute.
    pub fn dataset_set(&self, id: NodeId, key: &str, value: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.node_mut(id)?.dataset.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Read a node's text content.
    pub fn text(&self, id: NodeId) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.node(id)?.text.clone())
    }

    /// Overwrite a node's text content.
    pub fn set_text(&self, id: NodeId, text: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.node_mut(id)?.text = Some(text.into());
        Ok(())
    }
}
