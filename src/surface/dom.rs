//! Arena-backed element tree
//!
//! A minimal document tree: elements with attributes and ordered children,
//! and text leaves. Nodes are addressed by [`NodeRef`] and never reused, so a
//! handle to a removed node stays invalid.

use std::collections::{BTreeMap, HashMap};

use crate::geometry::NodeRef;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
pub struct DomNode {
    pub kind: NodeKind,
    pub parent: Option<NodeRef>,
    pub children: Vec<NodeRef>,
}

#[derive(Debug, Default)]
pub struct Dom {
    nodes: HashMap<NodeRef, DomNode>,
    next_id: u64,
}

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, kind: NodeKind, parent: Option<NodeRef>) -> NodeRef {
        self.next_id += 1;
        let node = NodeRef(self.next_id);
        self.nodes.insert(
            node,
            DomNode {
                kind,
                parent,
                children: Vec::new(),
            },
        );
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.push(node);
        }
        node
    }

    pub fn create_element(&mut self, tag: &str, parent: Option<NodeRef>) -> NodeRef {
        self.insert(
            NodeKind::Element {
                tag: tag.to_string(),
                attributes: BTreeMap::new(),
            },
            parent,
        )
    }

    pub fn create_text(&mut self, text: &str, parent: NodeRef) -> NodeRef {
        self.insert(NodeKind::Text(text.to_string()), Some(parent))
    }

    pub fn set_attribute(&mut self, node: NodeRef, name: &str, value: &str) {
        if let Some(NodeKind::Element { attributes, .. }) = self.nodes.get_mut(&node).map(|n| &mut n.kind) {
            attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn attribute(&self, node: NodeRef, name: &str) -> Option<&str> {
        match &self.nodes.get(&node)?.kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            NodeKind::Text(_) => None,
        }
    }

    pub fn tag(&self, node: NodeRef) -> Option<&str> {
        match &self.nodes.get(&node)?.kind {
            NodeKind::Element { tag, .. } => Some(tag.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn text(&self, node: NodeRef) -> Option<&str> {
        match &self.nodes.get(&node)?.kind {
            NodeKind::Text(text) => Some(text.as_str()),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.nodes.get(&node)?.parent
    }

    pub fn children(&self, node: NodeRef) -> &[NodeRef] {
        self.nodes
            .get(&node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Detach a node and drop its whole subtree; returns the number removed
    pub fn remove(&mut self, node: NodeRef) -> usize {
        let parent = match self.nodes.get(&node) {
            Some(n) => n.parent,
            None => return 0,
        };
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != node);
        }

        let mut removed = 0;
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(n) = self.nodes.remove(&current) {
                removed += 1;
                stack.extend(n.children);
            }
        }
        removed
    }

    /// Text descendants in document order
    pub fn text_descendants(&self, node: NodeRef) -> Vec<NodeRef> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            match self.nodes.get(&current) {
                Some(DomNode {
                    kind: NodeKind::Text(_),
                    ..
                }) => out.push(current),
                Some(n) => stack.extend(n.children.iter().rev()),
                None => {}
            }
        }
        out
    }

    /// First element child with the given class
    pub fn child_with_class(&self, node: NodeRef, class: &str) -> Option<NodeRef> {
        self.children(node)
            .iter()
            .copied()
            .find(|c| self.attribute(*c, "class") == Some(class))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_and_text_order() {
        let mut dom = Dom::new();
        let page = dom.create_element("div", None);
        dom.set_attribute(page, "data-page-number", "1");
        let layer = dom.create_element("div", Some(page));
        dom.set_attribute(layer, "class", "textLayer");
        let a = dom.create_element("span", Some(layer));
        let b = dom.create_element("span", Some(layer));
        let ta = dom.create_text("Hello ", a);
        let tb = dom.create_text("world", b);

        assert_eq!(dom.text_descendants(page), vec![ta, tb]);
        assert_eq!(dom.parent(ta), Some(a));
        assert_eq!(dom.attribute(page, "data-page-number"), Some("1"));
        assert_eq!(dom.child_with_class(page, "textLayer"), Some(layer));
        assert_eq!(dom.text(tb), Some("world"));
    }

    #[test]
    fn test_remove_subtree() {
        let mut dom = Dom::new();
        let root = dom.create_element("div", None);
        let child = dom.create_element("div", Some(root));
        let leaf = dom.create_text("x", child);

        assert_eq!(dom.remove(child), 2);
        assert!(!dom.contains(leaf));
        assert!(dom.children(root).is_empty());
        assert_eq!(dom.remove(child), 0);
        assert_eq!(dom.len(), 1);
    }
}
