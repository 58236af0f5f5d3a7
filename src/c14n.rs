//! Provide methods and data structures for Canonical XML and Exclusive XML Canonicalization.
//!
//! - Canonical XML 1.0 (<http://www.w3.org/TR/xml-c14n>)
//! - Canonical XML 1.1 (<http://www.w3.org/TR/xml-c14n11>)
//! - Exclusive XML Canonicalization 1.0 (<http://www.w3.org/TR/xml-exc-c14n>)
//!
//! The input is a tree and an optional [`NodeSet`] that restricts the output
//! to a document subset. Canonical output is always UTF-8 and carries neither
//! an XML declaration nor a document type declaration.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    io::Write,
    rc::Rc,
    str::FromStr,
};

use anyhow::bail;
use const_format::concatcp;

use crate::{
    encoding::XmlCharEncoding,
    error::XmlError,
    io::XmlOutputBuffer,
    tree::{
        ElementRef, NamespaceNode, Node, NodeKey, NodeRef, XML_PREFIX, XML_XML_NAMESPACE,
    },
    uri::{XmlURI, build_uri},
};

pub const CANONICAL_XML: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub const CANONICAL_XML_WITH_COMMENTS: &str = concatcp!(CANONICAL_XML, "#WithComments");
pub const CANONICAL_XML_11: &str = "http://www.w3.org/2006/12/xml-c14n11";
pub const CANONICAL_XML_11_WITH_COMMENTS: &str = concatcp!(CANONICAL_XML_11, "#WithComments");
pub const EXCLUSIVE_XML_CANONICALIZATION: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const EXCLUSIVE_XML_CANONICALIZATION_WITH_COMMENTS: &str =
    concatcp!(EXCLUSIVE_XML_CANONICALIZATION, "WithComments");

// Predefined values for C14N modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14NMode {
    /// Original C14N 1.0 spec
    C14N1_0,
    /// Exclusive C14N 1.0 spec
    Exclusive1_0,
    /// C14N 1.1 spec
    C14N1_1,
}

/// A canonicalization algorithm, identified by its URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanonicalAlgorithm {
    #[default]
    CanonicalXml,
    CanonicalXmlWithComments,
    CanonicalXml11,
    CanonicalXml11WithComments,
    ExclusiveXmlCanonicalization,
    ExclusiveXmlCanonicalizationWithComments,
}

impl CanonicalAlgorithm {
    pub fn uri(&self) -> &'static str {
        match self {
            Self::CanonicalXml => CANONICAL_XML,
            Self::CanonicalXmlWithComments => CANONICAL_XML_WITH_COMMENTS,
            Self::CanonicalXml11 => CANONICAL_XML_11,
            Self::CanonicalXml11WithComments => CANONICAL_XML_11_WITH_COMMENTS,
            Self::ExclusiveXmlCanonicalization => EXCLUSIVE_XML_CANONICALIZATION,
            Self::ExclusiveXmlCanonicalizationWithComments => {
                EXCLUSIVE_XML_CANONICALIZATION_WITH_COMMENTS
            }
        }
    }

    pub fn mode(&self) -> C14NMode {
        match self {
            Self::CanonicalXml | Self::CanonicalXmlWithComments => C14NMode::C14N1_0,
            Self::CanonicalXml11 | Self::CanonicalXml11WithComments => C14NMode::C14N1_1,
            Self::ExclusiveXmlCanonicalization
            | Self::ExclusiveXmlCanonicalizationWithComments => C14NMode::Exclusive1_0,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(
            self,
            Self::CanonicalXmlWithComments
                | Self::CanonicalXml11WithComments
                | Self::ExclusiveXmlCanonicalizationWithComments
        )
    }
}

impl fmt::Display for CanonicalAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

impl FromStr for CanonicalAlgorithm {
    type Err = anyhow::Error;

    /// Accept either the algorithm URI or its short name, such as `c14n11-comments`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            CANONICAL_XML | "c14n" => Ok(Self::CanonicalXml),
            CANONICAL_XML_WITH_COMMENTS | "c14n-comments" => Ok(Self::CanonicalXmlWithComments),
            CANONICAL_XML_11 | "c14n11" => Ok(Self::CanonicalXml11),
            CANONICAL_XML_11_WITH_COMMENTS | "c14n11-comments" => {
                Ok(Self::CanonicalXml11WithComments)
            }
            EXCLUSIVE_XML_CANONICALIZATION | "exc-c14n" => Ok(Self::ExclusiveXmlCanonicalization),
            EXCLUSIVE_XML_CANONICALIZATION_WITH_COMMENTS | "exc-c14n-comments" => {
                Ok(Self::ExclusiveXmlCanonicalizationWithComments)
            }
            _ => bail!("Unknown canonicalization algorithm: {s}"),
        }
    }
}

impl TryFrom<&str> for CanonicalAlgorithm {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// An ordered set of nodes without duplicates.
///
/// This is the form in which a path-query evaluator hands a document subset
/// to the canonicalizer. Namespace nodes are compared by their parent element
/// and prefix.
#[derive(Clone, Default)]
pub struct NodeSet {
    nodes: Vec<NodeRef>,
    keys: HashSet<NodeKey>,
    namespace_nodes: usize,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect `node` and all of its descendants, attributes and namespace nodes.
    ///
    /// This is the node-set `(.//. | .//@* | .//namespace::*)` evaluated at `node`.
    pub fn from_subtree(node: &NodeRef) -> Self {
        let mut set = Self::new();
        set.add_subtree(node);
        set
    }

    fn add_subtree(&mut self, node: &NodeRef) {
        self.add(node.clone());
        match node {
            NodeRef::Element(elem) => {
                for ns in elem.namespace_nodes() {
                    self.add(ns);
                }
                for attr in elem.attributes() {
                    self.add(attr);
                }
                for child in elem.children() {
                    self.add_subtree(&child);
                }
            }
            NodeRef::Document(doc) => {
                for child in doc.children() {
                    self.add_subtree(&child);
                }
            }
            _ => {}
        }
    }

    /// Add `node` to the end of this set.
    ///
    /// Returns `false` if the node is already contained.
    pub fn add(&mut self, node: impl Into<NodeRef>) -> bool {
        let node = node.into();
        if !self.keys.insert(node.key()) {
            return false;
        }
        if matches!(node, NodeRef::Namespace(_)) {
            self.namespace_nodes += 1;
        }
        self.nodes.push(node);
        true
    }

    /// Remove `node` from this set.
    ///
    /// Returns `false` if the node is not contained.
    pub fn remove(&mut self, node: &NodeRef) -> bool {
        let key = node.key();
        if !self.keys.remove(&key) {
            return false;
        }
        self.nodes.retain(|n| n.key() != key);
        if matches!(node, NodeRef::Namespace(_)) {
            self.namespace_nodes -= 1;
        }
        true
    }

    pub fn contains(&self, node: &NodeRef) -> bool {
        self.keys.contains(&node.key())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeRef> {
        self.nodes.iter()
    }

    fn has_namespace_nodes(&self) -> bool {
        self.namespace_nodes > 0
    }
}

impl FromIterator<NodeRef> for NodeSet {
    fn from_iter<T: IntoIterator<Item = NodeRef>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<NodeRef> for NodeSet {
    fn extend<T: IntoIterator<Item = NodeRef>>(&mut self, iter: T) {
        for node in iter {
            self.add(node);
        }
    }
}

impl fmt::Debug for NodeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.nodes.iter()).finish()
    }
}

/// Writes the canonical form of trees.
///
/// # Example
/// ```
/// use exom::{
///     c14n::{CanonicalAlgorithm, Canonicalizer},
///     tree::{DocumentRef, ElementRef, NodeRef},
/// };
///
/// let root = ElementRef::with_namespace("root", "http://www.ietf.org").unwrap();
/// root.append_child(ElementRef::new("child").unwrap()).unwrap();
/// let doc = DocumentRef::new(root).unwrap();
///
/// let c14n = Canonicalizer::new(CanonicalAlgorithm::CanonicalXml);
/// let out = c14n.canonicalize_to_string(&NodeRef::Document(doc), None).unwrap();
/// assert_eq!(
///     out,
///     r#"<root xmlns="http://www.ietf.org"><child xmlns=""></child></root>"#
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct Canonicalizer {
    algorithm: CanonicalAlgorithm,
    inclusive_ns_prefixes: Vec<String>,
}

impl Canonicalizer {
    pub fn new(algorithm: CanonicalAlgorithm) -> Self {
        Self {
            algorithm,
            inclusive_ns_prefixes: vec![],
        }
    }

    /// Set the InclusiveNamespaces PrefixList of Exclusive XML Canonicalization.
    ///
    /// `#default` or an empty string means the default namespace.
    /// The list is ignored by the other algorithms.
    pub fn with_inclusive_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inclusive_ns_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn algorithm(&self) -> CanonicalAlgorithm {
        self.algorithm
    }

    /// Write the canonical form of `node` into `writer`.
    ///
    /// If `node_set` is given, only the nodes it contains are rendered. Otherwise,
    /// every node of the tree rooted at `node` is rendered.
    ///
    /// # Errors
    /// - `Canonicalization` if a namespace URI in the tree is relative, or if `node`
    ///   is an attribute or a namespace node.
    /// - `Io` if `writer` fails.
    pub fn canonicalize(
        &self,
        node: &NodeRef,
        node_set: Option<&NodeSet>,
        writer: impl Write,
    ) -> Result<(), XmlError> {
        if matches!(node, NodeRef::Attribute(_) | NodeRef::Namespace(_)) {
            return Err(XmlError::canonicalization(format!(
                "{} cannot be the origin of canonicalization",
                node.describe()
            )));
        }
        check_for_relative_namespaces(node)?;

        let mut ctx = C14NCtx {
            buf: XmlOutputBuffer::from_writer(writer, XmlCharEncoding::UTF8),
            node_set,
            with_comments: self.algorithm.with_comments(),
            mode: self.algorithm.mode(),
            inclusive_ns_prefixes: &self.inclusive_ns_prefixes,
            pos: C14NPosition::InsideDocumentElement,
            ns_rendered: VisibleNsStack::default(),
        };
        ctx.process_node(node)?;
        ctx.buf.flush()?;
        Ok(())
    }

    /// Write the canonical form of the whole document containing `node`, restricted to
    /// the subtree rooted at `node`.
    ///
    /// Inherited namespaces and `xml:` attributes of the ancestors are rendered as
    /// the selected algorithm prescribes.
    pub fn canonicalize_subtree(&self, node: &NodeRef, writer: impl Write) -> Result<(), XmlError> {
        let node_set = NodeSet::from_subtree(node);
        let mut top = node.clone();
        while let Some(parent) = top.parent() {
            top = parent;
        }
        self.canonicalize(&top, Some(&node_set), writer)
    }

    pub fn canonicalize_to_vec(
        &self,
        node: &NodeRef,
        node_set: Option<&NodeSet>,
    ) -> Result<Vec<u8>, XmlError> {
        let mut out = vec![];
        self.canonicalize(node, node_set, &mut out)?;
        Ok(out)
    }

    pub fn canonicalize_to_string(
        &self,
        node: &NodeRef,
        node_set: Option<&NodeSet>,
    ) -> Result<String, XmlError> {
        let out = self.canonicalize_to_vec(node, node_set)?;
        String::from_utf8(out).map_err(|err| XmlError::Io {
            message: err.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum C14NPosition {
    BeforeDocumentElement,
    InsideDocumentElement,
    AfterDocumentElement,
}

#[derive(Debug, Clone, Copy)]
struct VisibleNsState {
    ns_cur_end: usize,
    ns_prev_start: usize,
    ns_prev_end: usize,
}

/// Namespaces rendered by the output ancestors of the current element.
///
/// `ns_prev_start..ns_prev_end` is the range pushed by the nearest output ancestor.
#[derive(Default)]
struct VisibleNsStack {
    ns_cur_end: usize,
    ns_prev_start: usize,
    ns_prev_end: usize,
    ns_tab: Vec<(Rc<str>, Rc<str>)>,
}

impl VisibleNsStack {
    fn save(&self) -> VisibleNsState {
        VisibleNsState {
            ns_cur_end: self.ns_cur_end,
            ns_prev_start: self.ns_prev_start,
            ns_prev_end: self.ns_prev_end,
        }
    }

    fn restore(&mut self, state: VisibleNsState) {
        self.ns_cur_end = state.ns_cur_end;
        self.ns_prev_start = state.ns_prev_start;
        self.ns_prev_end = state.ns_prev_end;
        self.ns_tab.truncate(self.ns_cur_end);
    }

    fn add(&mut self, prefix: Rc<str>, uri: Rc<str>) {
        self.ns_tab.truncate(self.ns_cur_end);
        self.ns_tab.push((prefix, uri));
        self.ns_cur_end += 1;
    }

    fn shift(&mut self) {
        self.ns_prev_start = self.ns_prev_end;
        self.ns_prev_end = self.ns_cur_end;
    }

    /// Check whether the binding was rendered by the nearest output ancestor.
    ///
    /// An undeclared default namespace is treated as rendered.
    fn find(&self, prefix: &str, uri: &str) -> bool {
        let has_empty_ns = prefix.is_empty() && uri.is_empty();
        let start = if has_empty_ns { 0 } else { self.ns_prev_start };
        self.lookup(start, prefix)
            .map_or(has_empty_ns, |rendered| **rendered == *uri)
    }

    /// Check whether the binding was rendered by any output ancestor.
    fn find_exclusive(&self, prefix: &str, uri: &str) -> bool {
        let has_empty_ns = prefix.is_empty() && uri.is_empty();
        self.lookup(0, prefix)
            .map_or(has_empty_ns, |rendered| **rendered == *uri)
    }

    fn lookup(&self, start: usize, prefix: &str) -> Option<&Rc<str>> {
        self.ns_tab[start.min(self.ns_cur_end)..self.ns_cur_end]
            .iter()
            .rev()
            .find(|(p, _)| **p == *prefix)
            .map(|(_, uri)| uri)
    }
}

/// An attribute ready to be rendered, sorted by (namespace URI, local name).
type AttrList = BTreeMap<(Rc<str>, Rc<str>), (String, String)>;

struct C14NCtx<'a, 'b> {
    buf: XmlOutputBuffer<'a>,
    node_set: Option<&'b NodeSet>,
    with_comments: bool,
    mode: C14NMode,
    inclusive_ns_prefixes: &'b [String],
    pos: C14NPosition,
    ns_rendered: VisibleNsStack,
}

impl C14NCtx<'_, '_> {
    fn is_visible(&self, node: &NodeRef) -> bool {
        self.node_set.is_none_or(|set| set.contains(node))
    }

    fn is_element_visible(&self, elem: &ElementRef) -> bool {
        self.is_visible(&NodeRef::Element(elem.clone()))
    }

    /// If the node-set has no namespace nodes, every namespace in scope is selected.
    fn is_namespace_visible(&self, elem: &ElementRef, prefix: &Rc<str>, uri: &Rc<str>) -> bool {
        self.node_set.is_none_or(|set| {
            !set.has_namespace_nodes()
                || set.contains(&NodeRef::Namespace(NamespaceNode::new(
                    prefix.clone(),
                    uri.clone(),
                    elem.clone(),
                )))
        })
    }

    fn is_exclusive(&self) -> bool {
        matches!(self.mode, C14NMode::Exclusive1_0)
    }

    fn write(&mut self, s: &str) -> Result<(), XmlError> {
        self.buf.write_str(s)?;
        Ok(())
    }

    fn print_namespace(&mut self, prefix: &str, uri: &str) -> Result<(), XmlError> {
        if prefix.is_empty() {
            self.write(" xmlns=\"")?;
        } else {
            self.write(" xmlns:")?;
            self.write(prefix)?;
            self.write("=\"")?;
        }
        self.write(&normalize_attr(uri))?;
        self.write("\"")
    }

    /// # Namespace Axis
    /// Consider a list L containing only namespace nodes in the axis and in the
    /// node-set in lexicographic order (ascending). If the first node is not the
    /// default namespace node, generate `xmlns=""` if and only if the nearest
    /// output ancestor of the element has a non-empty default namespace in the
    /// node-set. Then process every namespace node in L, omitting those already
    /// rendered by the nearest output ancestor and the one of `xml`.
    fn process_namespaces_axis(&mut self, cur: &ElementRef) -> Result<(), XmlError> {
        let mut has_empty_ns = false;
        let mut list = vec![];
        for (prefix, uri) in cur.in_scope_namespaces() {
            if !self.is_namespace_visible(cur, &prefix, &uri) {
                continue;
            }
            let already_rendered = self.ns_rendered.find(&prefix, &uri);
            self.ns_rendered.add(prefix.clone(), uri.clone());
            if prefix.is_empty() {
                has_empty_ns = true;
            }
            if !already_rendered {
                list.push((prefix, uri));
            }
        }

        if !has_empty_ns && !self.ns_rendered.find("", "") {
            self.print_namespace("", "")?;
            self.ns_rendered.add("".into(), "".into());
        }
        // in_scope_namespaces is sorted by prefix
        for (prefix, uri) in list {
            self.print_namespace(&prefix, &uri)?;
        }
        Ok(())
    }

    /// Render each namespace node iff it is visibly utilized by the element or one
    /// of its attributes, or its prefix is in the InclusiveNamespaces PrefixList,
    /// and the same binding was not rendered by an output ancestor.
    fn exc_c14n_process_namespaces_axis(&mut self, cur: &ElementRef) -> Result<(), XmlError> {
        let mut list = BTreeMap::<Rc<str>, Rc<str>>::new();

        for prefix in self.inclusive_ns_prefixes {
            let prefix: &str = if prefix == "#default" { "" } else { prefix };
            if prefix == XML_PREFIX {
                continue;
            }
            if let Some(uri) = cur.namespace_uri_for_prefix(prefix) {
                let prefix: Rc<str> = prefix.into();
                if uri.is_empty() || self.is_namespace_visible(cur, &prefix, &uri) {
                    list.insert(prefix, uri);
                }
            }
        }

        let prefix = cur.namespace_prefix();
        if *prefix != *XML_PREFIX {
            let uri = cur.namespace_uri();
            if uri.is_empty() || self.is_namespace_visible(cur, &prefix, &uri) {
                list.insert(prefix, uri);
            }
        }

        for attr in cur.attributes() {
            let prefix = attr.namespace_prefix();
            if prefix.is_empty() || *prefix == *XML_PREFIX {
                continue;
            }
            let uri = attr.namespace_uri();
            if self.is_visible(&NodeRef::Attribute(attr))
                && self.is_namespace_visible(cur, &prefix, &uri)
            {
                list.insert(prefix, uri);
            }
        }

        for (prefix, uri) in list {
            if !self.ns_rendered.find_exclusive(&prefix, &uri) {
                self.print_namespace(&prefix, &uri)?;
                self.ns_rendered.add(prefix, uri);
            }
        }
        Ok(())
    }

    /// Find the nearest `xml:{name}` attribute held by the ancestors that are not in
    /// the node-set, starting from `cur`.
    fn find_hidden_parent_attr(
        &self,
        mut cur: Option<ElementRef>,
        name: &str,
    ) -> Option<(ElementRef, String)> {
        while let Some(elem) = cur.filter(|elem| !self.is_element_visible(elem)) {
            if let Some(value) = elem.attribute_value_ns(name, XML_XML_NAMESPACE) {
                return Some((elem, value));
            }
            cur = elem.parent_element();
        }
        None
    }

    /// Combine `value` with the `xml:base` attributes of the hidden ancestors starting
    /// from `cur`.
    fn fixup_base_attr(
        &self,
        value: &str,
        mut cur: Option<ElementRef>,
    ) -> Result<String, XmlError> {
        let mut res = value.to_owned();
        while let Some(elem) = cur.filter(|elem| !self.is_element_visible(elem)) {
            if let Some(mut base) = elem.attribute_value_ns("base", XML_XML_NAMESPACE) {
                // force to go "up" when the base ends with '.' or '..'
                if base
                    .rsplit('/')
                    .next()
                    .is_some_and(|last| last == "." || last == "..")
                {
                    base.push('/');
                }
                res = build_uri(&res, &base).ok_or_else(|| {
                    XmlError::canonicalization(format!(
                        "cannot join xml:base '{res}' with the inherited base '{base}'"
                    ))
                })?;
            }
            cur = elem.parent_element();
        }
        Ok(res)
    }

    /// # Attribute Axis
    /// In lexicographic order (ascending), process each node that is in the element's
    /// attribute axis and in the node-set.
    ///
    /// When the parent of the element is omitted from the node-set, C14N 1.0 merges the
    /// nearest `xml:` attributes of all ancestors that the element does not hold itself.
    /// C14N 1.1 does the same only for `xml:lang` and `xml:space`, and joins `xml:base`
    /// with the values held by the omitted ancestors. Exclusive canonicalization merges
    /// nothing.
    fn process_attrs_axis(&mut self, cur: &ElementRef) -> Result<(), XmlError> {
        let mut list = AttrList::new();
        let parent = cur.parent_element();

        match self.mode {
            C14NMode::C14N1_0 => {
                self.add_visible_attrs(cur, &mut list, |_| false);
                if parent
                    .as_ref()
                    .is_some_and(|parent| !self.is_element_visible(parent))
                {
                    let mut tmp = parent;
                    while let Some(elem) = tmp {
                        for attr in elem.attributes() {
                            if *attr.namespace_uri() != *XML_XML_NAMESPACE
                                || cur
                                    .get_attribute_ns(&attr.local_name(), XML_XML_NAMESPACE)
                                    .is_some()
                            {
                                continue;
                            }
                            list.entry((attr.namespace_uri(), attr.local_name()))
                                .or_insert_with(|| (attr.qualified_name(), attr.value()));
                        }
                        tmp = elem.parent_element();
                    }
                }
            }
            C14NMode::Exclusive1_0 => {
                self.add_visible_attrs(cur, &mut list, |_| false);
            }
            C14NMode::C14N1_1 => {
                self.add_visible_attrs(cur, &mut list, |local| local == "base");

                for name in ["lang", "space"] {
                    if cur.get_attribute_ns(name, XML_XML_NAMESPACE).is_none() {
                        if let Some((_, value)) = self.find_hidden_parent_attr(parent.clone(), name)
                        {
                            insert_xml_attr(&mut list, name, value);
                        }
                    }
                }

                match cur.get_attribute_ns("base", XML_XML_NAMESPACE) {
                    Some(attr) => {
                        if self.is_visible(&NodeRef::Attribute(attr.clone())) {
                            let base = self.fixup_base_attr(&attr.value(), parent)?;
                            insert_xml_attr(&mut list, "base", base);
                        }
                    }
                    None => {
                        if let Some((owner, value)) = self.find_hidden_parent_attr(parent, "base")
                        {
                            let base = self.fixup_base_attr(&value, owner.parent_element())?;
                            if !base.is_empty() {
                                insert_xml_attr(&mut list, "base", base);
                            }
                        }
                    }
                }
            }
        }

        for (name, value) in list.values() {
            self.write(" ")?;
            self.write(name)?;
            self.write("=\"")?;
            self.write(&normalize_attr(value))?;
            self.write("\"")?;
        }
        Ok(())
    }

    /// Add the attributes of `cur` in the node-set, except `xml:` attributes whose local
    /// name matches `special`.
    fn add_visible_attrs(
        &self,
        cur: &ElementRef,
        list: &mut AttrList,
        special: impl Fn(&str) -> bool,
    ) {
        for attr in cur.attributes() {
            if *attr.namespace_uri() == *XML_XML_NAMESPACE && special(&attr.local_name()) {
                continue;
            }
            if self.is_visible(&NodeRef::Attribute(attr.clone())) {
                list.insert(
                    (attr.namespace_uri(), attr.local_name()),
                    (attr.qualified_name(), attr.value()),
                );
            }
        }
    }

    /// # Element Nodes
    /// If the element is not in the node-set, then the result is obtained by processing
    /// the child nodes of the element that are in the node-set (in document order).
    /// If the element is in the node-set, then the result is an open angle bracket (<),
    /// the element QName, the result of processing the namespace axis, the result of
    /// processing the attribute axis, a close angle bracket (>), the result of processing
    /// the child nodes of the element that are in the node-set (in document order), an
    /// open angle bracket, a forward slash (/), the element QName, and a close angle bracket.
    fn process_element_node(&mut self, cur: &ElementRef, visible: bool) -> Result<(), XmlError> {
        let state = self.ns_rendered.save();
        let name = cur.qualified_name();

        if visible {
            self.write("<")?;
            self.write(&name)?;
            if self.is_exclusive() {
                self.exc_c14n_process_namespaces_axis(cur)?;
            } else {
                self.process_namespaces_axis(cur)?;
            }
            self.ns_rendered.shift();
            self.process_attrs_axis(cur)?;
            self.write(">")?;
        }

        for child in cur.children() {
            self.process_node(&child)?;
        }

        if visible {
            self.write("</")?;
            self.write(&name)?;
            self.write(">")?;
        }

        self.ns_rendered.restore(state);
        Ok(())
    }

    fn process_node(&mut self, cur: &NodeRef) -> Result<(), XmlError> {
        let visible = self.is_visible(cur);
        match cur {
            NodeRef::Document(doc) => {
                let root_index = doc.root_index();
                for (i, child) in doc.children().iter().enumerate() {
                    self.pos = match i.cmp(&root_index) {
                        std::cmp::Ordering::Less => C14NPosition::BeforeDocumentElement,
                        std::cmp::Ordering::Equal => C14NPosition::InsideDocumentElement,
                        std::cmp::Ordering::Greater => C14NPosition::AfterDocumentElement,
                    };
                    self.process_node(child)?;
                }
                self.pos = C14NPosition::InsideDocumentElement;
            }
            NodeRef::Element(elem) => self.process_element_node(elem, visible)?,
            // Text Nodes
            // the string value, except all ampersands are replaced by &amp;, all open
            // angle brackets (<) are replaced by &lt;, all closing angle brackets (>)
            // are replaced by &gt;, and all #xD characters are replaced by &#xD;.
            NodeRef::Text(text) => {
                if visible {
                    self.write(&normalize_text(&text.value()))?;
                }
            }
            // Processing Instruction (PI) Nodes
            // The opening PI symbol (<?), the PI target name of the node, a leading space
            // and the string value if it is not empty, and the closing PI symbol (?>).
            NodeRef::ProcessingInstruction(pi) => {
                if visible {
                    self.write_document_level_prefix()?;
                    self.write("<?")?;
                    self.write(&pi.target())?;
                    let data = pi.data();
                    if !data.is_empty() {
                        self.write(" ")?;
                        self.write(&normalize_pi(&data))?;
                    }
                    self.write("?>")?;
                    self.write_document_level_suffix()?;
                }
            }
            // Comment Nodes
            // Nothing if generating canonical XML without comments. For canonical XML
            // with comments, generate the opening comment symbol (<!--), the string value
            // of the node, and the closing comment symbol (-->).
            NodeRef::Comment(comment) => {
                if visible && self.with_comments {
                    self.write_document_level_prefix()?;
                    self.write("<!--")?;
                    self.write(&normalize_comment(&comment.value()))?;
                    self.write("-->")?;
                    self.write_document_level_suffix()?;
                }
            }
            // should be ignored according to "W3C Canonical XML"
            NodeRef::DocType(_) => {}
            NodeRef::Attribute(_) | NodeRef::Namespace(_) => {
                return Err(XmlError::canonicalization(format!(
                    "{} cannot be processed as a child",
                    cur.describe()
                )));
            }
        }
        Ok(())
    }

    /// A leading #xA is rendered before the children of the root node with a greater
    /// document order than the document element.
    fn write_document_level_prefix(&mut self) -> Result<(), XmlError> {
        if self.pos == C14NPosition::AfterDocumentElement {
            self.write("\n")?;
        }
        Ok(())
    }

    /// A trailing #xA is rendered after the children of the root node with a lesser
    /// document order than the document element.
    fn write_document_level_suffix(&mut self) -> Result<(), XmlError> {
        if self.pos == C14NPosition::BeforeDocumentElement {
            self.write("\n")?;
        }
        Ok(())
    }
}

fn insert_xml_attr(list: &mut AttrList, local_name: &str, value: String) {
    list.insert(
        (XML_XML_NAMESPACE.into(), local_name.into()),
        (format!("{XML_PREFIX}:{local_name}"), value),
    );
}

/// Implementations of XML canonicalization MUST report an operation failure on
/// documents containing relative namespace URIs.
fn check_for_relative_namespaces(node: &NodeRef) -> Result<(), XmlError> {
    match node {
        NodeRef::Document(doc) => {
            for child in doc.children() {
                check_for_relative_namespaces(&child)?;
            }
        }
        NodeRef::Element(elem) => {
            for (_, uri) in elem.local_namespace_bindings() {
                if uri.is_empty() {
                    continue;
                }
                let Some(parsed) = XmlURI::parse(&uri) else {
                    return Err(XmlError::canonicalization(format!(
                        "cannot parse namespace URI '{uri}'"
                    )));
                };
                if !parsed.is_absolute() {
                    return Err(XmlError::canonicalization(format!(
                        "relative namespace URI is invalid here: '{uri}'"
                    )));
                }
            }
            for child in elem.children() {
                check_for_relative_namespaces(&child)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum C14NNormalizationMode {
    Attr,
    Comment,
    PI,
    Text,
}

/// Converts a string to a canonical (normalized) format.
fn normalize_string(input: &str, mode: C14NNormalizationMode) -> String {
    use C14NNormalizationMode::*;

    let mut out = String::with_capacity(input.len());
    for cur in input.chars() {
        match cur {
            '<' if matches!(mode, Attr | Text) => out.push_str("&lt;"),
            '>' if mode == Text => out.push_str("&gt;"),
            '&' if matches!(mode, Attr | Text) => out.push_str("&amp;"),
            '"' if mode == Attr => out.push_str("&quot;"),
            '\x09' if mode == Attr => out.push_str("&#x9;"),
            '\x0A' if mode == Attr => out.push_str("&#xA;"),
            '\x0D' => out.push_str("&#xD;"),
            _ => out.push(cur),
        }
    }
    out
}

fn normalize_attr(a: &str) -> String {
    normalize_string(a, C14NNormalizationMode::Attr)
}

fn normalize_text(a: &str) -> String {
    normalize_string(a, C14NNormalizationMode::Text)
}

fn normalize_comment(a: &str) -> String {
    normalize_string(a, C14NNormalizationMode::Comment)
}

fn normalize_pi(a: &str) -> String {
    normalize_string(a, C14NNormalizationMode::PI)
}

#[cfg(test)]
mod tests {
    use crate::{
        error::XmlErrorKind,
        tree::{AttrRef, CommentRef, DocumentRef, ProcessingInstructionRef, TextRef},
    };

    use super::*;

    fn c14n(algorithm: CanonicalAlgorithm, node: &NodeRef, set: Option<&NodeSet>) -> String {
        Canonicalizer::new(algorithm)
            .canonicalize_to_string(node, set)
            .unwrap()
    }

    fn subtree(algorithm: CanonicalAlgorithm, node: &NodeRef) -> String {
        let mut out = vec![];
        Canonicalizer::new(algorithm)
            .canonicalize_subtree(node, &mut out)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn algorithm_identifiers() {
        const CASES: &[(&str, CanonicalAlgorithm, C14NMode, bool)] = &[
            (
                "http://www.w3.org/TR/2001/REC-xml-c14n-20010315",
                CanonicalAlgorithm::CanonicalXml,
                C14NMode::C14N1_0,
                false,
            ),
            (
                "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments",
                CanonicalAlgorithm::CanonicalXmlWithComments,
                C14NMode::C14N1_0,
                true,
            ),
            (
                "http://www.w3.org/2006/12/xml-c14n11",
                CanonicalAlgorithm::CanonicalXml11,
                C14NMode::C14N1_1,
                false,
            ),
            (
                "http://www.w3.org/2006/12/xml-c14n11#WithComments",
                CanonicalAlgorithm::CanonicalXml11WithComments,
                C14NMode::C14N1_1,
                true,
            ),
            (
                "http://www.w3.org/2001/10/xml-exc-c14n#",
                CanonicalAlgorithm::ExclusiveXmlCanonicalization,
                C14NMode::Exclusive1_0,
                false,
            ),
            (
                "http://www.w3.org/2001/10/xml-exc-c14n#WithComments",
                CanonicalAlgorithm::ExclusiveXmlCanonicalizationWithComments,
                C14NMode::Exclusive1_0,
                true,
            ),
        ];
        for &(uri, algorithm, mode, with_comments) in CASES {
            let parsed = CanonicalAlgorithm::try_from(uri).unwrap();
            assert_eq!(parsed, algorithm);
            assert_eq!(parsed.uri(), uri);
            assert_eq!(parsed.mode(), mode);
            assert_eq!(parsed.with_comments(), with_comments);
        }
        assert_eq!(
            "c14n11-comments".parse::<CanonicalAlgorithm>().unwrap(),
            CanonicalAlgorithm::CanonicalXml11WithComments
        );
        assert!("http://example.com/c14n".parse::<CanonicalAlgorithm>().is_err());
    }

    #[test]
    fn empty_default_namespace_is_undeclared() {
        let root = ElementRef::with_namespace("root", "http://www.ietf.org").unwrap();
        root.append_child(ElementRef::new("child").unwrap()).unwrap();
        let doc = DocumentRef::new(root).unwrap();
        assert_eq!(
            c14n(
                CanonicalAlgorithm::CanonicalXml,
                &NodeRef::Document(doc),
                None
            ),
            r#"<root xmlns="http://www.ietf.org"><child xmlns=""></child></root>"#
        );
    }

    #[test]
    fn undeclared_default_namespace_is_inherited() {
        // <root xmlns="http://www.ietf.org"><child xmlns=""><g/></child></root>
        let root = ElementRef::with_namespace("root", "http://www.ietf.org").unwrap();
        let child = ElementRef::new("child").unwrap();
        child.append_child(ElementRef::new("g").unwrap()).unwrap();
        root.append_child(child).unwrap();
        let doc = NodeRef::Document(DocumentRef::new(root).unwrap());

        const ALGORITHMS: &[CanonicalAlgorithm] = &[
            CanonicalAlgorithm::CanonicalXml,
            CanonicalAlgorithm::CanonicalXml11,
            CanonicalAlgorithm::ExclusiveXmlCanonicalization,
        ];
        for &algorithm in ALGORITHMS {
            let result = c14n(algorithm, &doc, None);
            assert_eq!(
                result,
                r#"<root xmlns="http://www.ietf.org"><child xmlns=""><g></g></child></root>"#,
                "{algorithm}"
            );
            assert_eq!(result.matches(r#"xmlns="""#).count(), 1, "{algorithm}");
        }
    }

    #[test]
    fn attribute_order_and_escaping() {
        let elem = ElementRef::new("e").unwrap();
        elem.add_attribute(AttrRef::new("b", "x").unwrap()).unwrap();
        elem.add_attribute(AttrRef::new("a", "\"<>&\t\n\r").unwrap())
            .unwrap();
        elem.add_attribute(AttrRef::with_namespace("p:z", "http://b", "1").unwrap())
            .unwrap();
        elem.add_attribute(AttrRef::with_namespace("q:y", "http://a", "2").unwrap())
            .unwrap();
        elem.append_child(TextRef::new("&<>\r\"'").unwrap()).unwrap();
        assert_eq!(
            c14n(
                CanonicalAlgorithm::CanonicalXml,
                &NodeRef::Element(elem),
                None
            ),
            concat!(
                r#"<e xmlns:p="http://b" xmlns:q="http://a" a="&quot;&lt;>&amp;&#x9;&#xA;&#xD;" b="x" q:y="2" p:z="1">"#,
                "&amp;&lt;&gt;&#xD;\"'</e>"
            )
        );
    }

    #[test]
    fn document_level_nodes() {
        let root = ElementRef::new("r").unwrap();
        root.append_child(CommentRef::new("inner").unwrap()).unwrap();
        let doc = DocumentRef::new(root).unwrap();
        doc.insert_child(CommentRef::new("before").unwrap(), 0)
            .unwrap();
        doc.append_child(ProcessingInstructionRef::new("pi", "data\r").unwrap())
            .unwrap();
        doc.append_child(CommentRef::new("after").unwrap()).unwrap();
        let doc = NodeRef::Document(doc);

        const DOCUMENT_AND_RESULT: &[(CanonicalAlgorithm, &str)] = &[
            (
                CanonicalAlgorithm::CanonicalXml,
                "<r></r>\n<?pi data&#xD;?>",
            ),
            (
                CanonicalAlgorithm::CanonicalXmlWithComments,
                "<!--before-->\n<r><!--inner--></r>\n<?pi data&#xD;?>\n<!--after-->",
            ),
            (
                CanonicalAlgorithm::ExclusiveXmlCanonicalizationWithComments,
                "<!--before-->\n<r><!--inner--></r>\n<?pi data&#xD;?>\n<!--after-->",
            ),
        ];
        for &(algorithm, result) in DOCUMENT_AND_RESULT {
            assert_eq!(c14n(algorithm, &doc, None), result, "{algorithm}");
        }
    }

    #[test]
    fn relative_namespace_fails() {
        let root = ElementRef::new("r").unwrap();
        let child = ElementRef::with_namespace("c", "relative/ns").unwrap();
        root.append_child(child).unwrap();
        let doc = NodeRef::Document(DocumentRef::new(root).unwrap());
        let err = Canonicalizer::default()
            .canonicalize_to_vec(&doc, None)
            .unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::Canonicalization);
        assert!(err.to_string().contains("relative/ns"));
    }

    fn orphan_fixture() -> (ElementRef, ElementRef) {
        // <p xml:lang="en" xml:id="p1" xmlns:a="http://a" xmlns:b="http://b">
        //   <c a:x="1"/>
        // </p>
        let parent = ElementRef::new("p").unwrap();
        parent
            .add_attribute(AttrRef::with_namespace("xml:lang", XML_XML_NAMESPACE, "en").unwrap())
            .unwrap();
        parent
            .add_attribute(AttrRef::with_namespace("xml:id", XML_XML_NAMESPACE, "p1").unwrap())
            .unwrap();
        parent.add_namespace_declaration("a", "http://a").unwrap();
        parent.add_namespace_declaration("b", "http://b").unwrap();
        let child = ElementRef::new("c").unwrap();
        child
            .add_attribute(AttrRef::with_namespace("a:x", "http://a", "1").unwrap())
            .unwrap();
        parent.append_child(child.clone()).unwrap();
        (parent, child)
    }

    #[test]
    fn orphan_element_inheritance() {
        let (_parent, child) = orphan_fixture();
        let child = NodeRef::Element(child);

        const DOCUMENT_AND_RESULT: &[(CanonicalAlgorithm, &str)] = &[
            (
                CanonicalAlgorithm::CanonicalXml,
                r#"<c xmlns:a="http://a" xmlns:b="http://b" a:x="1" xml:id="p1" xml:lang="en"></c>"#,
            ),
            (
                CanonicalAlgorithm::CanonicalXml11,
                r#"<c xmlns:a="http://a" xmlns:b="http://b" a:x="1" xml:lang="en"></c>"#,
            ),
            (
                CanonicalAlgorithm::ExclusiveXmlCanonicalization,
                r#"<c xmlns:a="http://a" a:x="1"></c>"#,
            ),
        ];
        for &(algorithm, result) in DOCUMENT_AND_RESULT {
            assert_eq!(subtree(algorithm, &child), result, "{algorithm}");
        }
    }

    #[test]
    fn exclusive_inclusive_prefixes() {
        let (_parent, child) = orphan_fixture();
        let child = NodeRef::Element(child);
        let mut out = vec![];
        Canonicalizer::new(CanonicalAlgorithm::ExclusiveXmlCanonicalization)
            .with_inclusive_prefixes(["b"])
            .canonicalize_subtree(&child, &mut out)
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<c xmlns:a="http://a" xmlns:b="http://b" a:x="1"></c>"#
        );
    }

    #[test]
    fn exclusive_renders_only_utilized_namespaces() {
        // <a:r xmlns:a="http://a" xmlns:b="http://b"><b:c/><d xmlns:a="http://a"/></a:r>
        let root = ElementRef::with_namespace("a:r", "http://a").unwrap();
        root.add_namespace_declaration("b", "http://b").unwrap();
        root.append_child(ElementRef::with_namespace("b:c", "http://b").unwrap())
            .unwrap();
        let d = ElementRef::new("d").unwrap();
        d.add_namespace_declaration("a", "http://a").unwrap();
        root.append_child(d).unwrap();
        let doc = NodeRef::Document(DocumentRef::new(root).unwrap());
        assert_eq!(
            c14n(CanonicalAlgorithm::ExclusiveXmlCanonicalization, &doc, None),
            r#"<a:r xmlns:a="http://a"><b:c xmlns:b="http://b"></b:c><d></d></a:r>"#
        );
        assert_eq!(
            c14n(CanonicalAlgorithm::CanonicalXml, &doc, None),
            r#"<a:r xmlns:a="http://a" xmlns:b="http://b"><b:c></b:c><d></d></a:r>"#
        );
    }

    #[test]
    fn xml_base_fixup() {
        // <a xml:base="http://www.example.com/p/q/"><b xml:base=".."><c xml:base="r"/></b></a>
        let a = ElementRef::new("a").unwrap();
        a.add_attribute(
            AttrRef::with_namespace("xml:base", XML_XML_NAMESPACE, "http://www.example.com/p/q/")
                .unwrap(),
        )
        .unwrap();
        let b = ElementRef::new("b").unwrap();
        b.add_attribute(AttrRef::with_namespace("xml:base", XML_XML_NAMESPACE, "..").unwrap())
            .unwrap();
        let c = ElementRef::new("c").unwrap();
        c.add_attribute(AttrRef::with_namespace("xml:base", XML_XML_NAMESPACE, "r").unwrap())
            .unwrap();
        let d = ElementRef::new("d").unwrap();
        b.append_child(c.clone()).unwrap();
        b.append_child(d.clone()).unwrap();
        a.append_child(b).unwrap();

        let c = NodeRef::Element(c);
        assert_eq!(
            subtree(CanonicalAlgorithm::CanonicalXml11, &c),
            r#"<c xml:base="http://www.example.com/p/r"></c>"#
        );
        assert_eq!(
            subtree(CanonicalAlgorithm::CanonicalXml, &c),
            r#"<c xml:base="r"></c>"#
        );
        let d = NodeRef::Element(d);
        assert_eq!(
            subtree(CanonicalAlgorithm::CanonicalXml11, &d),
            r#"<d xml:base="http://www.example.com/p/"></d>"#
        );
        assert_eq!(
            subtree(CanonicalAlgorithm::CanonicalXml, &d),
            r#"<d xml:base=".."></d>"#
        );
    }

    #[test]
    fn attributes_must_be_selected() {
        let elem = ElementRef::new("e").unwrap();
        let kept = AttrRef::new("kept", "1").unwrap();
        elem.add_attribute(kept.clone()).unwrap();
        elem.add_attribute(AttrRef::new("dropped", "2").unwrap())
            .unwrap();
        elem.append_child(TextRef::new("text").unwrap()).unwrap();
        let doc = NodeRef::Document(DocumentRef::new(elem.clone()).unwrap());

        let set = [NodeRef::Element(elem), NodeRef::Attribute(kept)]
            .into_iter()
            .collect::<NodeSet>();
        assert_eq!(
            c14n(CanonicalAlgorithm::CanonicalXml, &doc, Some(&set)),
            r#"<e kept="1"></e>"#
        );
    }

    #[test]
    fn node_set_identity() {
        let elem = ElementRef::new("e").unwrap();
        elem.add_namespace_declaration("p", "http://p").unwrap();
        let mut set = NodeSet::from_subtree(&NodeRef::Element(elem.clone()));
        // element, namespace nodes of 'p' and 'xml'
        assert_eq!(set.len(), 3);
        assert!(!set.add(elem.namespace_nodes()[0].clone()));
        assert!(set.remove(&NodeRef::Element(elem.clone())));
        assert!(!set.contains(&NodeRef::Element(elem)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn attribute_origin_is_rejected() {
        let attr = AttrRef::new("a", "1").unwrap();
        let err = Canonicalizer::default()
            .canonicalize_to_vec(&NodeRef::Attribute(attr), None)
            .unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::Canonicalization);
    }
}
