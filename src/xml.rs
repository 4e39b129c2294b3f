//! XML codec for the property tree.
//!
//! Parsing produces a [`PropertyTree`] plus the document's declaration
//! attributes. Whitespace-only character data between elements is dropped;
//! any other text is kept verbatim, trailing whitespace included. Unknown
//! elements become ordinary tree nodes and therefore survive a write-back.
//!
//! Serialisation walks the tree depth-first with two-space-per-level
//! indentation. Leaves render on a single line: `<name>text</name>`, or
//! `<name></name>` when empty (never the self-closing form). Non-leaf tags
//! get their own line and their value, if any, is ignored. Attributes are
//! written double-quoted in insertion order.

use std::{borrow::Cow, fmt::Write as _, fs, path::Path, str};

use quick_xml::{
    Reader,
    escape::escape,
    events::{BytesDecl, BytesStart, Event},
};

use crate::{
    error::SupervisorError,
    ptree::{NodeId, PropertyTree},
};

/// Attributes captured from the `<?xml ...?>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDecl {
    /// XML version, normally `1.0`.
    pub version: String,
    /// Optional `encoding` attribute.
    pub encoding: Option<String>,
    /// Optional `standalone` attribute.
    pub standalone: Option<String>,
}

impl Default for XmlDecl {
    fn default() -> Self {
        Self {
            version: "1.0".into(),
            encoding: None,
            standalone: None,
        }
    }
}

/// An XML document: declaration plus the parsed property tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    /// Declaration emitted verbatim on write.
    pub decl: XmlDecl,
    /// The element tree.
    pub tree: PropertyTree,
}

/// Reads and parses an XML file.
pub fn parse_file(path: &Path) -> Result<XmlDocument, SupervisorError> {
    let content = fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parses an XML document from a string.
pub fn parse_str(input: &str) -> Result<XmlDocument, SupervisorError> {
    let mut reader = Reader::from_str(input);
    let mut decl = XmlDecl::default();
    let mut tree: Option<PropertyTree> = None;
    let mut stack: Vec<NodeId> = Vec::new();

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Decl(event) => decl = parse_decl(&event)?,
            Event::Start(event) => {
                let id = open_element(&event, &mut tree, &stack)?;
                stack.push(id);
            }
            Event::Empty(event) => {
                // Self-closing tags parse as empty leaves.
                open_element(&event, &mut tree, &stack)?;
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(event) => {
                let text = event.unescape().map_err(malformed)?;
                record_text(&text, tree.as_mut(), &stack);
            }
            Event::CData(event) => {
                let raw = event.into_inner();
                let text = str::from_utf8(&raw)
                    .map_err(|err| SupervisorError::MalformedSetting(err.to_string()))?;
                record_text(text, tree.as_mut(), &stack);
            }
            Event::Eof => break,
            // Comments, processing instructions, and doctypes carry nothing
            // the setting store consumes.
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(SupervisorError::MalformedSetting(
            "unexpected end of document inside an element".into(),
        ));
    }
    let tree = tree.ok_or_else(|| {
        SupervisorError::MalformedSetting("document has no root element".into())
    })?;
    Ok(XmlDocument { decl, tree })
}

/// Serialises a document back to XML text.
pub fn serialize(document: &XmlDocument) -> String {
    let mut out = String::new();
    let decl = &document.decl;
    let _ = write!(out, "<?xml version=\"{}\"", decl.version);
    if let Some(encoding) = &decl.encoding {
        let _ = write!(out, " encoding=\"{encoding}\"");
    }
    if let Some(standalone) = &decl.standalone {
        let _ = write!(out, " standalone=\"{standalone}\"");
    }
    out.push_str("?>\n");
    write_node(&document.tree, document.tree.root(), 0, &mut out);
    out
}

fn malformed(err: quick_xml::Error) -> SupervisorError {
    SupervisorError::MalformedSetting(err.to_string())
}

fn parse_decl(event: &BytesDecl) -> Result<XmlDecl, SupervisorError> {
    let version = decode(event.version().map_err(malformed)?)?;
    let encoding = match event.encoding() {
        Some(value) => Some(decode(value.map_err(malformed)?)?),
        None => None,
    };
    let standalone = match event.standalone() {
        Some(value) => Some(decode(value.map_err(malformed)?)?),
        None => None,
    };
    Ok(XmlDecl {
        version,
        encoding,
        standalone,
    })
}

fn decode(raw: Cow<'_, [u8]>) -> Result<String, SupervisorError> {
    str::from_utf8(&raw)
        .map(str::to_string)
        .map_err(|err| SupervisorError::MalformedSetting(err.to_string()))
}

/// Splits a qualified name into its optional prefix and local part.
fn split_qname(qname: &[u8]) -> Result<(Option<String>, String), SupervisorError> {
    let qname = str::from_utf8(qname)
        .map_err(|err| SupervisorError::MalformedSetting(err.to_string()))?;
    Ok(match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, qname.to_string()),
    })
}

fn open_element(
    event: &BytesStart,
    tree: &mut Option<PropertyTree>,
    stack: &[NodeId],
) -> Result<NodeId, SupervisorError> {
    let (ns, name) = split_qname(event.name().as_ref())?;
    let id = match stack.last() {
        Some(&parent) => {
            let tree = tree.as_mut().ok_or_else(|| {
                SupervisorError::MalformedSetting("element outside the root".into())
            })?;
            tree.add_child(parent, ns.as_deref(), &name, None)
        }
        None => {
            if tree.is_some() {
                return Err(SupervisorError::MalformedSetting(
                    "multiple root elements".into(),
                ));
            }
            let created = PropertyTree::new(ns.as_deref(), &name, None);
            let root = created.root();
            *tree = Some(created);
            root
        }
    };

    let tree = tree.as_mut().ok_or_else(|| {
        SupervisorError::MalformedSetting("element outside the root".into())
    })?;
    for attr in event.attributes() {
        let attr = attr.map_err(|err| SupervisorError::MalformedSetting(err.to_string()))?;
        let (prefix, name) = split_qname(attr.key.as_ref())?;
        let value = attr
            .unescape_value()
            .map_err(malformed)?
            .into_owned();
        tree.add_attribute(id, prefix.as_deref(), &name, &value);
    }
    Ok(id)
}

fn record_text(text: &str, tree: Option<&mut PropertyTree>, stack: &[NodeId]) {
    // Blank runs between elements are formatting, not content.
    if text.trim().is_empty() {
        return;
    }
    if let Some(tree) = tree
        && let Some(&current) = stack.last()
    {
        tree.append_value(current, text);
    }
}

fn write_node(tree: &PropertyTree, node: NodeId, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let tag = match tree.ns(node) {
        Some(ns) => format!("{ns}:{}", tree.name(node)),
        None => tree.name(node).to_string(),
    };
    let mut attrs = String::new();
    for attr in tree.attributes(node) {
        match &attr.prefix {
            Some(prefix) => {
                let _ = write!(
                    attrs,
                    " {prefix}:{}=\"{}\"",
                    attr.name,
                    escape(attr.value.as_str())
                );
            }
            None => {
                let _ = write!(attrs, " {}=\"{}\"", attr.name, escape(attr.value.as_str()));
            }
        }
    }

    if tree.is_leaf(node) {
        let value = tree.value(node).map(escape).unwrap_or(Cow::Borrowed(""));
        let _ = writeln!(out, "{indent}<{tag}{attrs}>{value}</{tag}>");
    } else {
        let _ = writeln!(out, "{indent}<{tag}{attrs}>");
        for &child in tree.children(node) {
            write_node(tree, child, depth + 1, out);
        }
        let _ = writeln!(out, "{indent}</{tag}>");
    }
}
