//! Property tree backing the XML setting file.
//!
//! The tree stores namespaced name/value nodes with ordered attributes. Nodes
//! are addressed through opaque [`NodeId`] handles backed by an arena, so a
//! handle held across unrelated mutations (e.g. the startup-type node a
//! service record is bound to) never dangles.

/// Opaque handle to a node in a [`PropertyTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A single attribute attached to a tree node.
///
/// Attribute order within a node is insertion order; lookups return the
/// first match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAttribute {
    /// Optional namespace prefix, e.g. the `xsi` of `xsi:type`.
    pub prefix: Option<String>,
    /// Attribute name.
    pub name: String,
    /// Attribute value.
    pub value: String,
}

#[derive(Debug, Clone)]
struct Node {
    ns: Option<String>,
    name: String,
    value: Option<String>,
    attributes: Vec<NodeAttribute>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Mutable tree of namespaced key/value nodes with a unique root.
#[derive(Debug, Clone)]
pub struct PropertyTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl PropertyTree {
    /// Creates a tree consisting of a single root node.
    pub fn new(ns: Option<&str>, name: &str, value: Option<&str>) -> Self {
        let root = Node {
            ns: ns.map(str::to_string),
            name: name.to_string(),
            value: value.map(str::to_string),
            attributes: Vec::new(),
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    /// Handle of the unique root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Appends a child node and returns its handle.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        ns: Option<&str>,
        name: &str,
        value: Option<&str>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            ns: ns.map(str::to_string),
            name: name.to_string(),
            value: value.map(str::to_string),
            attributes: Vec::new(),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Appends an attribute to a node, preserving insertion order.
    pub fn add_attribute(
        &mut self,
        node: NodeId,
        prefix: Option<&str>,
        name: &str,
        value: &str,
    ) {
        self.nodes[node.0].attributes.push(NodeAttribute {
            prefix: prefix.map(str::to_string),
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    /// Node name without the namespace prefix.
    pub fn name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].name
    }

    /// Namespace prefix of a node, if any.
    pub fn ns(&self, node: NodeId) -> Option<&str> {
        self.nodes[node.0].ns.as_deref()
    }

    /// Value carried by a node. Only leaves carry a meaningful value.
    pub fn value(&self, node: NodeId) -> Option<&str> {
        self.nodes[node.0].value.as_deref()
    }

    /// Replaces the value of a node.
    pub fn set_value(&mut self, node: NodeId, value: Option<String>) {
        self.nodes[node.0].value = value;
    }

    /// Appends text to the value of a node, used when character data is
    /// split by intervening markup.
    pub fn append_value(&mut self, node: NodeId, text: &str) {
        match &mut self.nodes[node.0].value {
            Some(existing) => existing.push_str(text),
            slot @ None => *slot = Some(text.to_string()),
        }
    }

    /// First attribute matching the given prefix and name.
    pub fn attribute(
        &self,
        node: NodeId,
        prefix: Option<&str>,
        name: &str,
    ) -> Option<&str> {
        self.nodes[node.0]
            .attributes
            .iter()
            .find(|attr| attr.prefix.as_deref() == prefix && attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// All attributes of a node in insertion order.
    pub fn attributes(&self, node: NodeId) -> &[NodeAttribute] {
        &self.nodes[node.0].attributes
    }

    /// Children of a node in document order.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Parent of a node; `None` for the root.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// Whether a node has no children.
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.nodes[node.0].children.is_empty()
    }

    /// Finds the first node matching a dotted path, resolved from the root.
    ///
    /// The first path segment must match the root. A segment of the form
    /// `ns:name` matches exactly; a prefix-less segment matches the name
    /// regardless of namespace.
    pub fn find_node(&self, path: &str) -> Option<NodeId> {
        self.find_all_nodes(path).into_iter().next()
    }

    /// Finds every node matching a dotted path, in document order.
    pub fn find_all_nodes(&self, path: &str) -> Vec<NodeId> {
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return Vec::new();
        };
        if !self.segment_matches(self.root, first) {
            return Vec::new();
        }

        let mut frontier = vec![self.root];
        for segment in segments {
            let mut next = Vec::new();
            for node in frontier {
                for &child in self.children(node) {
                    if self.segment_matches(child, segment) {
                        next.push(child);
                    }
                }
            }
            if next.is_empty() {
                return Vec::new();
            }
            frontier = next;
        }
        frontier
    }

    /// Finds the first direct child with the given name. A `None` namespace
    /// matches any prefix.
    pub fn find_child(&self, node: NodeId, ns: Option<&str>, name: &str) -> Option<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .find(|&child| {
                self.name(child) == name
                    && (ns.is_none() || self.ns(child) == ns)
            })
    }

    fn segment_matches(&self, node: NodeId, segment: &str) -> bool {
        match segment.split_once(':') {
            Some((prefix, name)) => {
                self.ns(node) == Some(prefix) && self.name(node) == name
            }
            None => self.name(node) == segment,
        }
    }

    fn node_eq(&self, node: NodeId, other: &Self, other_node: NodeId) -> bool {
        let a = &self.nodes[node.0];
        let b = &other.nodes[other_node.0];
        a.ns == b.ns
            && a.name == b.name
            && a.value == b.value
            && a.attributes == b.attributes
            && a.children.len() == b.children.len()
            && a.children
                .iter()
                .zip(&b.children)
                .all(|(&x, &y)| self.node_eq(x, other, y))
    }
}

/// Structural equality from the roots down; node handles are not compared.
impl PartialEq for PropertyTree {
    fn eq(&self, other: &Self) -> bool {
        self.node_eq(self.root, other, other.root)
    }
}

impl Eq for PropertyTree {}
