//! Canonical XML tree construction and serialization.
//!
//! The envelope is assembled as an owned element tree and rendered through a
//! single deterministic writer: namespace declarations sorted by prefix,
//! attributes sorted by resolved namespace URI then local name, C14N text
//! escaping, no self-closing tags. Fragments that declare on themselves
//! every prefix they visibly use therefore serialize to the same bytes
//! in-document and under standalone exclusive canonicalization, which is
//! what keeps the signed digests stable across packaging.

use crate::signer::DS_NS;

/// A child node: nested element or character data.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// A namespaced attribute. `prefix` of `None` means an unqualified
/// attribute (no namespace, per XML rules).
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub prefix: Option<String>,
    pub local: String,
    pub value: String,
}

/// An element in the envelope tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    prefix: Option<String>,
    local: String,
    /// Namespace declarations on this element: (prefix, uri). An empty
    /// prefix declares the default namespace.
    namespaces: Vec<(String, String)>,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(prefix: Option<&str>, local: &str) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local: local.to_string(),
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Declare a namespace on this element. An empty prefix declares the
    /// default namespace.
    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.namespaces.push((prefix.to_string(), uri.to_string()));
        self
    }

    /// Add an unqualified attribute.
    pub fn with_attr(mut self, local: &str, value: &str) -> Self {
        self.attributes.push(Attribute {
            prefix: None,
            local: local.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Add a prefixed attribute.
    pub fn with_attr_ns(mut self, prefix: &str, local: &str, value: &str) -> Self {
        self.attributes.push(Attribute {
            prefix: Some(prefix.to_string()),
            local: local.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(Node::Text(text.to_string()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Set a prefixed attribute, replacing an existing one with the same
    /// prefix and local name.
    pub fn set_attr_ns(&mut self, prefix: &str, local: &str, value: &str) {
        if let Some(attr) = self
            .attributes
            .iter_mut()
            .find(|a| a.prefix.as_deref() == Some(prefix) && a.local == local)
        {
            attr.value = value.to_string();
        } else {
            self.attributes.push(Attribute {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
                value: value.to_string(),
            });
        }
    }

    /// First attribute with the given local name, regardless of prefix.
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.local == local)
            .map(|a| a.value.as_str())
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn namespaces(&self) -> &[(String, String)] {
        &self.namespaces
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Concatenated direct text content.
    pub fn text_content(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// First direct child with the given local name.
    pub fn find_child(&self, local: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.local == local)
    }

    pub fn find_child_mut(&mut self, local: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|e| e.local == local)
    }

    /// First descendant (depth-first, self excluded) with the given local
    /// name.
    pub fn find_descendant(&self, local: &str) -> Option<&Element> {
        for child in self.child_elements() {
            if child.local == local {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(local) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_descendant_mut(&mut self, local: &str) -> Option<&mut Element> {
        for node in self.children.iter_mut() {
            if let Node::Element(child) = node {
                if child.local == local {
                    return Some(child);
                }
                if let Some(found) = child.find_descendant_mut(local) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Serialize the whole tree with no XML declaration.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        let mut scope = NamespaceScope::default();
        write_element(self, &mut scope, &mut out);
        out
    }

    /// Serialize the whole tree in exclusive-C14N form. This is the wire
    /// rendering of the envelope: because canonicalization is used for the
    /// document itself, every signed fragment's bytes appear in the
    /// document exactly as they were digested.
    pub fn to_canonical_xml(&self) -> String {
        exclusive_c14n(self, &[], false)
    }

    /// Serialize as a standalone document with an XML declaration.
    pub fn to_document(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>{}",
            self.to_canonical_xml()
        )
    }
}

/// Prefix-to-URI resolution context, one frame per open element.
#[derive(Debug, Default, Clone)]
struct NamespaceScope {
    frames: Vec<Vec<(String, String)>>,
}

impl NamespaceScope {
    fn push(&mut self, declarations: &[(String, String)]) {
        self.frames.push(declarations.to_vec());
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    fn resolve(&self, prefix: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| {
                frame
                    .iter()
                    .find(|(p, _)| p == prefix)
                    .map(|(_, uri)| uri.as_str())
            })
    }
}

/// Collect the namespace declarations in scope at `target`, walking from
/// `root`. Identity is by address, so `target` must be a node inside
/// `root`'s tree. The target's own declarations are not included.
pub fn inherited_scope(root: &Element, target: &Element) -> Option<Vec<(String, String)>> {
    fn walk(el: &Element, target: &Element, scope: &mut Vec<(String, String)>) -> bool {
        if std::ptr::eq(el, target) {
            return true;
        }
        scope.extend(el.namespaces.iter().cloned());
        for child in el.child_elements() {
            if walk(child, target, scope) {
                return true;
            }
        }
        scope.truncate(scope.len() - el.namespaces.len());
        false
    }

    let mut scope = Vec::new();
    walk(root, target, &mut scope).then_some(scope)
}

/// Exclusive canonicalization of a subtree.
///
/// `inherited` supplies the declarations in scope at the apex (from
/// [`inherited_scope`], or empty for a self-contained fragment). Only
/// visibly-utilized prefixes are emitted, pulled from the nearest
/// declaration. When `strip_signatures` is set, `ds:Signature` descendants
/// are removed from the node set first (the enveloped-signature transform).
pub fn exclusive_c14n(
    el: &Element,
    inherited: &[(String, String)],
    strip_signatures: bool,
) -> String {
    let mut out = String::new();
    let mut scope = NamespaceScope::default();
    scope.push(inherited);
    let mut rendered = NamespaceScope::default();
    c14n_element(el, &mut scope, &mut rendered, &mut out, strip_signatures);
    out
}

fn c14n_element(
    el: &Element,
    scope: &mut NamespaceScope,
    rendered: &mut NamespaceScope,
    out: &mut String,
    strip_signatures: bool,
) {
    scope.push(&el.namespaces);

    // Visibly utilized prefixes: the element's own prefix plus every
    // attribute prefix. Unprefixed elements and attributes carry no
    // namespace in this tree.
    let mut utilized: Vec<&str> = Vec::new();
    if let Some(p) = el.prefix.as_deref() {
        utilized.push(p);
    }
    for attr in &el.attributes {
        if let Some(p) = attr.prefix.as_deref() {
            if !utilized.contains(&p) {
                utilized.push(p);
            }
        }
    }
    utilized.sort_unstable();

    let mut to_declare: Vec<(String, String)> = Vec::new();
    for prefix in &utilized {
        if let Some(uri) = scope.resolve(prefix) {
            if rendered.resolve(prefix) != Some(uri) {
                to_declare.push((prefix.to_string(), uri.to_string()));
            }
        }
    }
    rendered.push(&to_declare);

    out.push('<');
    push_qname(out, el.prefix.as_deref(), &el.local);
    for (prefix, uri) in &to_declare {
        out.push_str(" xmlns");
        if !prefix.is_empty() {
            out.push(':');
            out.push_str(prefix);
        }
        out.push_str("=\"");
        push_attr_escaped(out, uri);
        out.push('"');
    }
    write_sorted_attributes(el, scope, out);
    out.push('>');

    for node in &el.children {
        match node {
            Node::Element(child) => {
                if strip_signatures
                    && child.local == "Signature"
                    && element_namespace(child, scope) == Some(DS_NS)
                {
                    continue;
                }
                c14n_element(child, scope, rendered, out, strip_signatures);
            }
            Node::Text(text) => push_text_escaped(out, text),
        }
    }

    out.push_str("</");
    push_qname(out, el.prefix.as_deref(), &el.local);
    out.push('>');

    rendered.pop();
    scope.pop();
}

/// Plain serialization: declarations emitted exactly where authored, same
/// ordering and escaping rules as canonicalization.
fn write_element(el: &Element, scope: &mut NamespaceScope, out: &mut String) {
    scope.push(&el.namespaces);

    out.push('<');
    push_qname(out, el.prefix.as_deref(), &el.local);

    let mut declarations: Vec<&(String, String)> = el.namespaces.iter().collect();
    declarations.sort_by(|a, b| a.0.cmp(&b.0));
    for (prefix, uri) in declarations {
        out.push_str(" xmlns");
        if !prefix.is_empty() {
            out.push(':');
            out.push_str(prefix);
        }
        out.push_str("=\"");
        push_attr_escaped(out, uri);
        out.push('"');
    }
    write_sorted_attributes(el, scope, out);
    out.push('>');

    for node in &el.children {
        match node {
            Node::Element(child) => write_element(child, scope, out),
            Node::Text(text) => push_text_escaped(out, text),
        }
    }

    out.push_str("</");
    push_qname(out, el.prefix.as_deref(), &el.local);
    out.push('>');

    scope.pop();
}

/// Namespace URI of an element, consulting its own declarations before
/// the surrounding scope.
fn element_namespace<'b>(el: &'b Element, scope: &'b NamespaceScope) -> Option<&'b str> {
    let prefix = el.prefix.as_deref()?;
    el.namespaces
        .iter()
        .rev()
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.as_str())
        .or_else(|| scope.resolve(prefix))
}

/// Attributes in C14N document order: sorted by resolved namespace URI,
/// then local name. Unqualified attributes have the empty URI and sort
/// first.
fn write_sorted_attributes(el: &Element, scope: &NamespaceScope, out: &mut String) {
    let mut attrs: Vec<&Attribute> = el.attributes.iter().collect();
    attrs.sort_by(|a, b| {
        let ua = a
            .prefix
            .as_deref()
            .and_then(|p| scope.resolve(p))
            .unwrap_or("");
        let ub = b
            .prefix
            .as_deref()
            .and_then(|p| scope.resolve(p))
            .unwrap_or("");
        ua.cmp(ub).then_with(|| a.local.cmp(&b.local))
    });
    for attr in attrs {
        out.push(' ');
        push_qname(out, attr.prefix.as_deref(), &attr.local);
        out.push_str("=\"");
        push_attr_escaped(out, &attr.value);
        out.push('"');
    }
}

fn push_qname(out: &mut String, prefix: Option<&str>, local: &str) {
    if let Some(p) = prefix {
        out.push_str(p);
        out.push(':');
    }
    out.push_str(local);
}

fn push_text_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

fn push_attr_escaped(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}
