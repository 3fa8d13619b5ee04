//! Read-only view over a parsed SOAP reply.
//!
//! Replies are parsed once with `roxmltree` and queried by namespace URI plus
//! local name, so the prefixes chosen by the server do not matter. The
//! lookups mirror the handful of XPath shapes WinRM replies need:
//! `//ns:Name`, `//ns:Name[@Attr='v']` and `//*[@Attr='v']`.

use roxmltree::Node;

use super::namespace::Namespace;
use crate::error::Result;

/// A parsed XML document.
pub struct Document<'input> {
    doc: roxmltree::Document<'input>,
}

impl<'input> Document<'input> {
    /// Parse `text`. Malformed XML is an error.
    pub fn parse(text: &'input str) -> Result<Self> {
        Ok(Self {
            doc: roxmltree::Document::parse(text)?,
        })
    }

    /// All elements named `ns:local`, in document order (`//ns:local`).
    pub fn elements<'a>(
        &'a self,
        ns: Namespace,
        local: &'a str,
    ) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
        self.doc
            .descendants()
            .filter(move |node| is_element(node, ns, local))
    }

    /// First element named `ns:local`.
    pub fn first(&self, ns: Namespace, local: &str) -> Option<Node<'_, 'input>> {
        self.doc
            .descendants()
            .find(|node| is_element(node, ns, local))
    }

    /// String value of the first element named `ns:local`.
    pub fn first_text(&self, ns: Namespace, local: &str) -> Option<String> {
        self.first(ns, local).map(|node| text_of(&node))
    }

    /// String value of the first `ns:local` element whose `attr` equals `value`.
    pub fn first_text_with_attr(
        &self,
        ns: Namespace,
        local: &str,
        attr: &str,
        value: &str,
    ) -> Option<String> {
        self.doc
            .descendants()
            .find(|node| is_element(node, ns, local) && node.attribute(attr) == Some(value))
            .map(|node| text_of(&node))
    }

    /// Whether any element carries `attr="value"` (`//*[@attr='value']`).
    pub fn any_with_attr(&self, attr: &str, value: &str) -> bool {
        self.doc
            .descendants()
            .any(|node| node.is_element() && node.attribute(attr) == Some(value))
    }

    /// Whether any element named `ns:local` exists.
    pub fn contains(&self, ns: Namespace, local: &str) -> bool {
        self.first(ns, local).is_some()
    }
}

fn is_element(node: &Node<'_, '_>, ns: Namespace, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace() == Some(ns.uri)
}

/// Concatenated text of a node and its descendants.
pub fn text_of(node: &Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}
