//! In-memory SOAP envelope construction.
//!
//! A [`SoapMessage`] owns a small element tree rooted at `env:Envelope`.
//! Elements are addressed through copyable [`Element`] handles so that the
//! request factory can append children anywhere without fighting the borrow
//! checker. Serialization is deterministic for a given sequence of calls.

use std::fmt;

use quick_xml::escape::{escape, partial_escape};
use tracing::debug;

use super::header::{HeaderBuilder, HeaderFields};
use super::namespace::{Namespace, MOST_USED, NS_SOAP_ENV};

/// Handle to an element inside a [`SoapMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element(usize);

#[derive(Debug, Clone)]
struct Node {
    ns: Namespace,
    name: String,
    attributes: Vec<(String, String)>,
    content: Option<String>,
    children: Vec<usize>,
}

impl Node {
    fn new(name: &str, ns: Namespace) -> Self {
        Self {
            ns,
            name: name.to_string(),
            attributes: Vec::new(),
            content: None,
            children: Vec::new(),
        }
    }
}

/// A SOAP 1.2 envelope under construction.
#[derive(Debug, Clone)]
pub struct SoapMessage {
    nodes: Vec<Node>,
    header: Option<HeaderFields>,
    header_element: Option<usize>,
    body: Option<usize>,
}

const ENVELOPE: usize = 0;

impl Default for SoapMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl SoapMessage {
    /// Create an empty envelope declaring the commonly used namespaces.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new("Envelope", NS_SOAP_ENV)],
            header: None,
            header_element: None,
            body: None,
        }
    }

    /// The root `env:Envelope` element.
    pub fn envelope(&self) -> Element {
        Element(ENVELOPE)
    }

    /// Start (or continue) configuring the SOAP header.
    pub fn header(&mut self) -> HeaderBuilder<'_> {
        if self.header.is_none() {
            self.header = Some(HeaderFields::default());
        }
        HeaderBuilder::new(self)
    }

    pub(super) fn header_fields_mut(&mut self) -> &mut HeaderFields {
        self.header.get_or_insert_with(HeaderFields::default)
    }

    pub(super) fn header_fields(&self) -> Option<&HeaderFields> {
        self.header.as_ref()
    }

    /// Whether the header has been written into the tree.
    pub fn is_header_built(&self) -> bool {
        self.header_element.is_some()
    }

    /// Create the `env:Header` element. Returns `None` if it already exists.
    pub(super) fn create_header_element(&mut self) -> Option<Element> {
        if self.header_element.is_some() {
            debug!("SOAP header already built, ignoring second build");
            return None;
        }
        let index = self.push(Node::new("Header", NS_SOAP_ENV));
        // The header always precedes the body.
        self.nodes[ENVELOPE].children.insert(0, index);
        self.header_element = Some(index);
        Some(Element(index))
    }

    /// Append a namespace-qualified child element to the body, creating the
    /// body first if needed.
    pub fn create_body_element(&mut self, name: &str, ns: Namespace) -> Element {
        let body = match self.body {
            Some(body) => body,
            None => {
                let body = self.push(Node::new("Body", NS_SOAP_ENV));
                self.nodes[ENVELOPE].children.push(body);
                self.body = Some(body);
                body
            }
        };
        self.create_element(Element(body), name, ns)
    }

    /// Append a namespace-qualified child element to `parent`.
    pub fn create_element(&mut self, parent: Element, name: &str, ns: Namespace) -> Element {
        let index = self.push(Node::new(name, ns));
        self.nodes[parent.0].children.push(index);
        Element(index)
    }

    /// Set (or replace) an attribute. `name` is written verbatim, so qualified
    /// names such as `env:mustUnderstand` or `xml:lang` are allowed.
    pub fn set_attr(&mut self, element: Element, name: &str, value: impl Into<String>) {
        let value = value.into();
        let attributes = &mut self.nodes[element.0].attributes;
        match attributes.iter_mut().find(|(k, _)| k == name) {
            Some(existing) => existing.1 = value,
            None => attributes.push((name.to_string(), value)),
        }
    }

    /// Set the text content of an element.
    pub fn set_content(&mut self, element: Element, content: impl Into<String>) {
        self.nodes[element.0].content = Some(content.into());
    }

    /// Text content previously set on an element.
    pub fn content(&self, element: Element) -> Option<&str> {
        self.nodes[element.0].content.as_deref()
    }

    /// Serialize the envelope to UTF-8 XML text.
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(2048);
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        self.write_node(&mut out, ENVELOPE);
        out
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn write_node(&self, out: &mut String, index: usize) {
        let node = &self.nodes[index];
        let qname = node.ns.qualify(&node.name);

        out.push('<');
        out.push_str(&qname);
        if index == ENVELOPE {
            for ns in MOST_USED {
                write_attribute(out, &ns.xmlns(), ns.uri);
            }
        } else if !MOST_USED.contains(&node.ns) {
            write_attribute(out, &node.ns.xmlns(), node.ns.uri);
        }
        for (name, value) in &node.attributes {
            write_attribute(out, name, value);
        }

        if node.children.is_empty() && node.content.is_none() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        if let Some(content) = &node.content {
            // Only &, < and > are escaped in text. WinRM rejects entity-encoded
            // quotes inside rsp:Command.
            out.push_str(&partial_escape(content));
        }
        for child in &node.children {
            self.write_node(out, *child);
        }
        out.push_str("</");
        out.push_str(&qname);
        out.push('>');
    }
}

fn write_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape(value));
    out.push('"');
}

impl fmt::Display for SoapMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}
