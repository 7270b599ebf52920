//! Owned XML tree used for SAML messages and metadata.
//!
//! Documents are parsed with `quick-xml` into [`XmlElement`] trees. The tree
//! keeps prefixes and namespace declarations exactly as written so that
//! signatures can be computed over the same structure that was received.
//!
//! Canonicalization implements Exclusive XML Canonicalization 1.0 without
//! comments and without an `InclusiveNamespaces` prefix list, which is the
//! only transform SAML signatures need in practice.

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};

/// The namespace bound to the `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace declarations in scope, nearest last. `None` is the default namespace.
pub type NamespaceScope = Vec<(Option<String>, String)>;

/// A node in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// A child element.
    Element(XmlElement),
    /// Character data, already unescaped.
    Text(String),
}

/// An attribute as written, prefix included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Qualified attribute name.
    pub name: String,
    /// Unescaped value.
    pub value: String,
}

/// An element with its namespace declarations, attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Namespace prefix, if any.
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Resolved namespace URI.
    pub namespace: Option<String>,
    /// Namespace declarations made on this element.
    pub namespace_decls: Vec<(Option<String>, String)>,
    /// Attributes other than namespace declarations.
    pub attributes: Vec<XmlAttribute>,
    /// Child nodes in document order.
    pub children: Vec<XmlNode>,
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

fn lookup<'a>(scope: &'a [(Option<String>, String)], prefix: Option<&str>) -> Option<&'a str> {
    scope
        .iter()
        .rev()
        .find(|(p, _)| p.as_deref() == prefix)
        .map(|(_, uri)| uri.as_str())
}

impl XmlElement {
    /// Creates an element in `namespace` named by a qualified name such as `saml:Issuer`.
    ///
    /// The prefix is not declared; call [`XmlElement::with_namespace`] on this
    /// element or an ancestor.
    #[must_use]
    pub fn new(qname: &str, namespace: &str) -> Self {
        let (prefix, local) = split_qname(qname);
        Self {
            prefix: prefix.map(String::from),
            local_name: local.to_string(),
            namespace: Some(namespace.to_string()),
            namespace_decls: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Declares a namespace prefix on this element. An empty prefix declares the default namespace.
    #[must_use]
    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
        let prefix = (!prefix.is_empty()).then(|| prefix.to_string());
        self.namespace_decls.push((prefix, uri.to_string()));
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Sets an attribute when a value is present.
    #[must_use]
    pub fn with_opt_attr(mut self, name: &str, value: Option<impl Into<String>>) -> Self {
        if let Some(value) = value {
            self.set_attr(name, value);
        }
        self
    }

    /// Appends a child element.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Appends a child element when present.
    #[must_use]
    pub fn with_opt_child(mut self, child: Option<Self>) -> Self {
        if let Some(child) = child {
            self.children.push(XmlNode::Element(child));
        }
        self
    }

    /// Appends character data.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Sets or replaces an attribute.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(XmlAttribute {
                name: name.to_string(),
                value,
            }),
        }
    }

    /// Inserts a child element at `index` among all child nodes.
    pub fn insert_child(&mut self, index: usize, child: Self) {
        let index = index.min(self.children.len());
        self.children.insert(index, XmlNode::Element(child));
    }

    /// Returns the qualified name.
    #[must_use]
    pub fn qname(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local_name),
            None => self.local_name.clone(),
        }
    }

    /// Returns whether this element is `{ns}local`.
    #[must_use]
    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.local_name == local && self.namespace.as_deref() == Some(ns)
    }

    /// Returns an attribute value by qualified name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Returns an attribute value or a [`SamlError::MissingElement`].
    pub fn required_attr(&self, name: &str) -> SamlResult<&str> {
        self.attr(name)
            .ok_or_else(|| SamlError::MissingElement(format!("{}@{name}", self.qname())))
    }

    /// Returns the first attribute with the given local name and any prefix.
    #[must_use]
    pub fn prefixed_attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| matches!(split_qname(&a.name), (Some(_), l) if l == local))
            .map(|a| a.value.as_str())
    }

    /// Iterates over child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// Iterates over child elements named `{ns}local`.
    pub fn children_named<'a>(
        &'a self,
        ns: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = &'a Self> + 'a {
        self.elements().filter(move |e| e.is(ns, local))
    }

    /// Returns the first child element named `{ns}local`.
    #[must_use]
    pub fn child(&self, ns: &str, local: &str) -> Option<&Self> {
        self.elements().find(|e| e.is(ns, local))
    }

    /// Returns the first child element named `{ns}local` or a [`SamlError::MissingElement`].
    pub fn required_child(&self, ns: &str, local: &str) -> SamlResult<&Self> {
        self.child(ns, local)
            .ok_or_else(|| SamlError::MissingElement(format!("{} in {}", local, self.qname())))
    }

    /// Returns the concatenated character data of direct text children.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Returns the trimmed text content of a child element, if present.
    #[must_use]
    pub fn child_text(&self, ns: &str, local: &str) -> Option<String> {
        self.child(ns, local).map(|e| e.text().trim().to_string())
    }

    /// Returns the index among child nodes of the first element named `{ns}local`.
    #[must_use]
    pub fn position_of(&self, ns: &str, local: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|node| matches!(node, XmlNode::Element(e) if e.is(ns, local)))
    }

    /// Removes direct children named `{ns}local` and returns how many were removed.
    pub fn remove_children(&mut self, ns: &str, local: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|node| !matches!(node, XmlNode::Element(e) if e.is(ns, local)));
        before - self.children.len()
    }

    /// Returns the namespace scope seen by this element's children.
    #[must_use]
    pub fn scope_for_children(&self, inherited: &[(Option<String>, String)]) -> NamespaceScope {
        let mut scope = inherited.to_vec();
        scope.extend(self.namespace_decls.iter().cloned());
        scope
    }

    /// Finds the element whose `ID` attribute equals `id`, with the scope inherited from its ancestors.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<(&Self, NamespaceScope)> {
        let mut scope = Vec::new();
        self.find_by_id_in(id, &mut scope)
    }

    fn find_by_id_in<'a>(
        &'a self,
        id: &str,
        scope: &mut NamespaceScope,
    ) -> Option<(&'a Self, NamespaceScope)> {
        if self.attr("ID") == Some(id) {
            return Some((self, scope.clone()));
        }
        let len = scope.len();
        scope.extend(self.namespace_decls.iter().cloned());
        for child in self.elements() {
            if let Some(found) = child.find_by_id_in(id, scope) {
                return Some(found);
            }
        }
        scope.truncate(len);
        None
    }

    /// Collects every `ID` attribute value in the subtree.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids<'a>(&'a self, ids: &mut Vec<&'a str>) {
        if let Some(id) = self.attr("ID") {
            ids.push(id);
        }
        for child in self.elements() {
            child.collect_ids(ids);
        }
    }

    /// Parses a document and returns its root element.
    ///
    /// Document type declarations are refused.
    pub fn parse(xml: &str) -> SamlResult<Self> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Self> = Vec::new();
        let mut root: Option<Self> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let element = open_element(&start, &stack)?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = open_element(&start, &stack)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| SamlError::XmlParse("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let value = text.unescape()?;
                    push_text(&mut stack, &value)?;
                }
                Event::CData(data) => {
                    let value = std::str::from_utf8(&data)
                        .map_err(|e| SamlError::XmlParse(format!("invalid UTF-8 in CDATA: {e}")))?;
                    push_text(&mut stack, value)?;
                }
                Event::DocType(_) => {
                    return Err(SamlError::XmlParse("DOCTYPE is not allowed".to_string()));
                }
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) => {}
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(SamlError::XmlParse("unclosed element".to_string()));
        }
        root.ok_or_else(|| SamlError::XmlParse("document has no root element".to_string()))
    }

    /// Serializes the element without an XML declaration.
    #[must_use]
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }

    /// Serializes the element as a standalone document.
    #[must_use]
    pub fn to_document(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>{}",
            self.to_xml_string()
        )
    }

    /// Canonicalizes the subtree with exclusive c14n.
    ///
    /// `inherited` holds the namespace declarations of the element's ancestors.
    pub fn canonicalize(&self, inherited: &[(Option<String>, String)]) -> SamlResult<String> {
        let mut out = String::new();
        let mut scope = inherited.to_vec();
        c14n_element(self, &mut scope, &[], &mut out)?;
        Ok(out)
    }
}

fn utf8(bytes: &[u8]) -> SamlResult<&str> {
    std::str::from_utf8(bytes).map_err(|e| SamlError::XmlParse(format!("invalid UTF-8: {e}")))
}

fn open_element(start: &BytesStart<'_>, stack: &[XmlElement]) -> SamlResult<XmlElement> {
    let binding = start.name();
    let qname = utf8(binding.as_ref())?;
    let (prefix, local) = split_qname(qname);
    let mut element = XmlElement {
        prefix: prefix.map(String::from),
        local_name: local.to_string(),
        namespace: None,
        namespace_decls: Vec::new(),
        attributes: Vec::new(),
        children: Vec::new(),
    };

    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = utf8(attr.key.as_ref())?;
        let value = attr.unescape_value()?.into_owned();
        if key == "xmlns" {
            element.namespace_decls.push((None, value));
        } else if let Some(declared) = key.strip_prefix("xmlns:") {
            element
                .namespace_decls
                .push((Some(declared.to_string()), value));
        } else {
            element.attributes.push(XmlAttribute {
                name: key.to_string(),
                value,
            });
        }
    }

    element.namespace = resolve_prefix(element.prefix.as_deref(), &element.namespace_decls, stack)?;
    Ok(element)
}

fn resolve_prefix(
    prefix: Option<&str>,
    own: &[(Option<String>, String)],
    stack: &[XmlElement],
) -> SamlResult<Option<String>> {
    if prefix == Some("xml") {
        return Ok(Some(XML_NS.to_string()));
    }
    let found = lookup(own, prefix).or_else(|| {
        stack
            .iter()
            .rev()
            .find_map(|e| lookup(&e.namespace_decls, prefix))
    });
    match (found, prefix) {
        (Some(""), None) | (None, None) => Ok(None),
        (Some(uri), _) => Ok(Some(uri.to_string())),
        (None, Some(prefix)) => Err(SamlError::XmlParse(format!(
            "namespace prefix '{prefix}' is not bound"
        ))),
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> SamlResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(element));
        return Ok(());
    }
    if root.is_some() {
        return Err(SamlError::XmlParse("multiple root elements".to_string()));
    }
    *root = Some(element);
    Ok(())
}

fn push_text(stack: &mut [XmlElement], value: &str) -> SamlResult<()> {
    let Some(parent) = stack.last_mut() else {
        if value.trim().is_empty() {
            return Ok(());
        }
        return Err(SamlError::XmlParse("text outside the root element".to_string()));
    };
    if let Some(XmlNode::Text(previous)) = parent.children.last_mut() {
        previous.push_str(value);
    } else {
        parent.children.push(XmlNode::Text(value.to_string()));
    }
    Ok(())
}

fn write_element(element: &XmlElement, out: &mut String) {
    let qname = element.qname();
    out.push('<');
    out.push_str(&qname);
    for (prefix, uri) in &element.namespace_decls {
        match prefix {
            Some(prefix) => out.push_str(&format!(" xmlns:{prefix}=\"")),
            None => out.push_str(" xmlns=\""),
        }
        out.push_str(&quick_xml::escape::escape(uri.as_str()));
        out.push('"');
    }
    for attr in &element.attributes {
        out.push(' ');
        out.push_str(&attr.name);
        out.push_str("=\"");
        out.push_str(&quick_xml::escape::escape(attr.value.as_str()));
        out.push('"');
    }
    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &element.children {
        match child {
            XmlNode::Element(child) => write_element(child, out),
            XmlNode::Text(text) => out.push_str(&quick_xml::escape::escape(text.as_str())),
        }
    }
    out.push_str("</");
    out.push_str(&qname);
    out.push('>');
}

fn c14n_element(
    element: &XmlElement,
    scope: &mut NamespaceScope,
    rendered: &[(Option<String>, String)],
    out: &mut String,
) -> SamlResult<()> {
    let scope_len = scope.len();
    scope.extend(element.namespace_decls.iter().cloned());

    let mut utilized: Vec<Option<String>> = vec![element.prefix.clone()];
    for attr in &element.attributes {
        if let (Some(prefix), _) = split_qname(&attr.name) {
            if prefix != "xml" {
                utilized.push(Some(prefix.to_string()));
            }
        }
    }
    utilized.sort();
    utilized.dedup();

    let mut now_rendered = rendered.to_vec();
    let mut namespaces: Vec<(Option<String>, String)> = Vec::new();
    for prefix in utilized {
        let uri = match (lookup(scope, prefix.as_deref()), &prefix) {
            (Some(uri), _) => uri.to_string(),
            (None, None) => String::new(),
            (None, Some(prefix)) => {
                return Err(SamlError::XmlParse(format!(
                    "namespace prefix '{prefix}' is not bound"
                )))
            }
        };
        let already = lookup(&now_rendered, prefix.as_deref())
            .map_or(prefix.is_none() && uri.is_empty(), |r| r == uri);
        if !already {
            namespaces.push((prefix.clone(), uri.clone()));
            now_rendered.push((prefix, uri));
        }
    }

    let mut attributes: Vec<(String, &str, &XmlAttribute)> = Vec::new();
    for attr in &element.attributes {
        let (prefix, local) = split_qname(&attr.name);
        let uri = match prefix {
            None => String::new(),
            Some("xml") => XML_NS.to_string(),
            Some(prefix) => lookup(scope, Some(prefix))
                .map(String::from)
                .ok_or_else(|| {
                    SamlError::XmlParse(format!("namespace prefix '{prefix}' is not bound"))
                })?,
        };
        attributes.push((uri, local, attr));
    }
    attributes.sort_by(|a, b| (a.0.as_str(), a.1).cmp(&(b.0.as_str(), b.1)));

    let qname = element.qname();
    out.push('<');
    out.push_str(&qname);
    for (prefix, uri) in &namespaces {
        match prefix {
            Some(prefix) => out.push_str(&format!(" xmlns:{prefix}=\"")),
            None => out.push_str(" xmlns=\""),
        }
        out.push_str(&c14n_attr_escape(uri));
        out.push('"');
    }
    for (_, _, attr) in &attributes {
        out.push(' ');
        out.push_str(&attr.name);
        out.push_str("=\"");
        out.push_str(&c14n_attr_escape(&attr.value));
        out.push('"');
    }
    out.push('>');

    for child in &element.children {
        match child {
            XmlNode::Element(child) => c14n_element(child, scope, &now_rendered, out)?,
            XmlNode::Text(text) => out.push_str(&c14n_text_escape(text)),
        }
    }

    out.push_str("</");
    out.push_str(&qname);
    out.push('>');
    scope.truncate(scope_len);
    Ok(())
}

fn c14n_text_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out
}

fn c14n_attr_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out
}

/// Formats a timestamp as an `xs:dateTime` in UTC.
#[must_use]
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses an `xs:dateTime` value.
pub fn parse_instant(value: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::InvalidValue(format!("invalid dateTime '{value}': {e}")))
}

/// Parses an `xs:boolean` value.
pub fn parse_bool(value: &str) -> SamlResult<bool> {
    match value.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(SamlError::InvalidValue(format!("invalid boolean '{other}'"))),
    }
}

/// Parses an optional attribute as `xs:boolean`.
pub fn opt_bool(element: &XmlElement, name: &str) -> SamlResult<Option<bool>> {
    element.attr(name).map(parse_bool).transpose()
}

/// Parses an optional attribute as an unsigned integer.
pub fn opt_u16(element: &XmlElement, name: &str) -> SamlResult<Option<u16>> {
    element
        .attr(name)
        .map(|v| {
            v.trim()
                .parse::<u16>()
                .map_err(|e| SamlError::InvalidValue(format!("invalid {name} '{v}': {e}")))
        })
        .transpose()
}

/// Parses an optional attribute as `xs:dateTime`.
pub fn opt_instant(element: &XmlElement, name: &str) -> SamlResult<Option<DateTime<Utc>>> {
    element.attr(name).map(parse_instant).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_resolves_namespaces() {
        let xml = r#"<?xml version="1.0"?>
<md:EntityDescriptor xmlns:md="urn:md" entityID="https://idp.example.org">
  <md:IDPSSODescriptor/>
</md:EntityDescriptor>"#;
        let root = XmlElement::parse(xml).unwrap();

        assert!(root.is("urn:md", "EntityDescriptor"));
        assert_eq!(root.attr("entityID"), Some("https://idp.example.org"));
        assert!(root.child("urn:md", "IDPSSODescriptor").is_some());
    }

    #[test]
    fn doctype_is_refused() {
        let xml = r#"<!DOCTYPE foo [<!ENTITY x "boom">]><foo>&x;</foo>"#;
        assert!(matches!(XmlElement::parse(xml), Err(SamlError::XmlParse(_))));
    }

    #[test]
    fn unbound_prefix_is_refused() {
        assert!(XmlElement::parse("<a:b/>").is_err());
    }

    #[test]
    fn multiple_roots_are_refused() {
        assert!(XmlElement::parse("<a/><b/>").is_err());
    }

    #[test]
    fn text_is_unescaped_and_reescaped() {
        let root = XmlElement::parse("<a>x &amp; y &lt; z</a>").unwrap();
        assert_eq!(root.text(), "x & y < z");
        assert_eq!(root.to_xml_string(), "<a>x &amp; y &lt; z</a>");
    }

    #[test]
    fn serialize_then_parse_is_stable() {
        let element = XmlElement::new("saml:Issuer", "urn:saml")
            .with_namespace("saml", "urn:saml")
            .with_attr("Format", "urn:entity")
            .with_text("https://idp.example.org");
        let reparsed = XmlElement::parse(&element.to_document()).unwrap();
        assert_eq!(reparsed, element);
    }

    #[test]
    fn c14n_sorts_namespaces_and_attributes() {
        let xml = r#"<root xmlns:b="urn:b" xmlns:a="urn:a" z="1" b:y="2" a:x="3"><a:child/></root>"#;
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(
            root.canonicalize(&[]).unwrap(),
            r#"<root xmlns:a="urn:a" xmlns:b="urn:b" z="1" a:x="3" b:y="2"><a:child></a:child></root>"#
        );
    }

    #[test]
    fn c14n_is_exclusive_for_subtrees() {
        let xml = r#"<root xmlns:b="urn:b" xmlns:a="urn:a"><a:child ID="c1">t</a:child></root>"#;
        let root = XmlElement::parse(xml).unwrap();
        let (child, scope) = root.find_by_id("c1").unwrap();
        assert_eq!(
            child.canonicalize(&scope).unwrap(),
            r#"<a:child xmlns:a="urn:a" ID="c1">t</a:child>"#
        );
    }

    #[test]
    fn c14n_default_namespace_handling() {
        let xml = r#"<r xmlns="urn:d"><inner xmlns=""><x/></inner></r>"#;
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(
            root.canonicalize(&[]).unwrap(),
            r#"<r xmlns="urn:d"><inner xmlns=""><x></x></inner></r>"#
        );
    }

    #[test]
    fn c14n_escapes_attribute_whitespace() {
        let element = XmlElement::new("a", "urn:a").with_attr("v", "x\"\ty");
        let c14n = element.canonicalize(&[]).unwrap();
        assert!(c14n.contains(r#"v="x&quot;&#x9;y""#));
    }

    #[test]
    fn ids_are_collected() {
        let root = XmlElement::parse(r#"<a ID="1"><b ID="2"/><c><d ID="1"/></c></a>"#).unwrap();
        assert_eq!(root.ids(), vec!["1", "2", "1"]);
    }

    #[test]
    fn instants_round_trip() {
        let instant = parse_instant("2024-05-01T10:00:00Z").unwrap();
        assert_eq!(format_instant(instant), "2024-05-01T10:00:00Z");
        assert!(parse_instant("yesterday").is_err());
        assert!(parse_bool("1").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
