//! Namespace resolution and namespace declarations.

use std::{collections::BTreeMap, fmt, rc::Rc};

use crate::{error::XmlError, uri::validate_uri};

use super::{
    ElementRef, Node, NodeRef, NodeType, XML_XML_NAMESPACE, XMLNS_PREFIX, XML_PREFIX,
    validate_ncname,
};

/// A namespace node of the XPath data model.
///
/// Namespace nodes are not stored in the tree. They are created on demand by
/// [`ElementRef::namespace_nodes`] and are identified by their parent element and prefix.
#[derive(Clone)]
pub struct NamespaceNode {
    prefix: Rc<str>,
    uri: Rc<str>,
    parent: ElementRef,
}

impl NamespaceNode {
    pub(crate) fn new(prefix: Rc<str>, uri: Rc<str>, parent: ElementRef) -> Self {
        Self {
            prefix,
            uri,
            parent,
        }
    }

    /// Return the prefix. The default namespace has an empty prefix.
    pub fn prefix(&self) -> Rc<str> {
        self.prefix.clone()
    }

    pub fn namespace_uri(&self) -> Rc<str> {
        self.uri.clone()
    }

    pub fn parent_element(&self) -> ElementRef {
        self.parent.clone()
    }
}

impl Node for NamespaceNode {
    fn node_type(&self) -> NodeType {
        NodeType::Namespace
    }

    fn to_node_ref(&self) -> NodeRef {
        NodeRef::Namespace(self.clone())
    }

    fn parent(&self) -> Option<NodeRef> {
        Some(NodeRef::Element(self.parent.clone()))
    }

    fn value(&self) -> String {
        self.uri.to_string()
    }

    fn detach(&self) -> Result<(), XmlError> {
        Ok(())
    }

    fn copy_node(&self) -> NodeRef {
        NodeRef::Namespace(self.clone())
    }
}

impl fmt::Debug for NamespaceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamespaceNode({}={})", self.prefix, self.uri)
    }
}

impl ElementRef {
    /// Return the namespace URI bound to `prefix` on this element itself.
    ///
    /// The name of the element, its attributes and its additional declarations are
    /// looked up in this order.
    pub fn local_namespace_uri(&self, prefix: &str) -> Option<Rc<str>> {
        let elem = self.0.borrow();
        if *elem.prefix == *prefix {
            return Some(elem.namespace_uri.clone());
        }
        if !prefix.is_empty() {
            if let Some(attr) = elem
                .attributes
                .iter()
                .find(|attr| *attr.namespace_prefix() == *prefix)
            {
                return Some(attr.namespace_uri());
            }
        }
        elem.namespaces
            .iter()
            .find(|(p, _)| **p == *prefix)
            .map(|(_, uri)| uri.clone())
    }

    /// Resolve `prefix` in the scope of this element.
    ///
    /// `xml` is always bound to the XML namespace. `xmlns` resolves to an empty string.  
    /// An undeclared default namespace resolves to an empty string.  
    /// If `prefix` is not bound, return `None`.
    pub fn namespace_uri_for_prefix(&self, prefix: &str) -> Option<Rc<str>> {
        if prefix == XML_PREFIX {
            return Some(XML_XML_NAMESPACE.into());
        }
        if prefix == XMLNS_PREFIX {
            return Some("".into());
        }
        let mut cur = Some(self.clone());
        while let Some(elem) = cur {
            if let Some(uri) = elem.local_namespace_uri(prefix) {
                return Some(uri);
            }
            cur = elem.parent_element();
        }
        prefix.is_empty().then(|| "".into())
    }

    /// Return the prefixes bound on this element without duplicates.
    ///
    /// The prefix of the element comes first, followed by the prefixes of the attributes
    /// and the additional declarations. The `xml` prefix is never counted.
    fn local_prefixes(&self) -> Vec<Rc<str>> {
        let elem = self.0.borrow();
        let mut prefixes = vec![];
        if *elem.prefix != *XML_PREFIX {
            prefixes.push(elem.prefix.clone());
        }
        let attrs = elem
            .attributes
            .iter()
            .map(|attr| attr.namespace_prefix())
            .filter(|prefix| !prefix.is_empty() && **prefix != *XML_PREFIX);
        for prefix in attrs.chain(elem.namespaces.iter().map(|(p, _)| p.clone())) {
            if !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }
        prefixes
    }

    /// Return the number of distinct prefixes bound on this element.
    pub fn namespace_declaration_count(&self) -> usize {
        self.local_prefixes().len()
    }

    /// Return the `index`-th prefix bound on this element.
    ///
    /// The order is the one of [`ElementRef::namespace_declaration_count`].
    pub fn namespace_prefix_at(&self, index: usize) -> Result<Rc<str>, XmlError> {
        let prefixes = self.local_prefixes();
        let len = prefixes.len();
        prefixes
            .into_iter()
            .nth(index)
            .ok_or(XmlError::IndexOutOfBounds { index, len })
    }

    /// Return the bindings made on this element, except the one of `xml`.
    ///
    /// The binding of the element name is always included, even if it is the empty
    /// default namespace.
    pub fn local_namespace_bindings(&self) -> Vec<(Rc<str>, Rc<str>)> {
        self.local_prefixes()
            .into_iter()
            .filter(|prefix| **prefix != *XML_PREFIX)
            .filter_map(|prefix| {
                let uri = self.local_namespace_uri(&prefix)?;
                Some((prefix, uri))
            })
            .collect()
    }

    /// Return the additional namespace declarations.
    pub fn additional_namespace_declarations(&self) -> Vec<(Rc<str>, Rc<str>)> {
        self.0.borrow().namespaces.clone()
    }

    /// Return all namespaces in scope on this element, except the one of `xml`.
    ///
    /// An empty default namespace is not included.
    pub fn in_scope_namespaces(&self) -> BTreeMap<Rc<str>, Rc<str>> {
        let mut chain = vec![];
        let mut cur = Some(self.clone());
        while let Some(elem) = cur {
            cur = elem.parent_element();
            chain.push(elem);
        }
        let mut scope = BTreeMap::new();
        for elem in chain.iter().rev() {
            for (prefix, uri) in elem.local_namespace_bindings() {
                scope.insert(prefix, uri);
            }
        }
        scope.retain(|prefix, uri| !prefix.is_empty() || !uri.is_empty());
        scope
    }

    /// Return the namespace nodes of this element, sorted by prefix.
    ///
    /// The node of the `xml` prefix is included.
    pub fn namespace_nodes(&self) -> Vec<NamespaceNode> {
        let mut scope = self.in_scope_namespaces();
        scope.insert(XML_PREFIX.into(), XML_XML_NAMESPACE.into());
        scope
            .into_iter()
            .map(|(prefix, uri)| NamespaceNode::new(prefix, uri, self.clone()))
            .collect()
    }

    /// Declare that `prefix` is bound to `uri` on this element.
    ///
    /// Declaring `xml` for the XML namespace has no effect.  
    /// A declaration that repeats the binding of the element name is not stored.
    ///
    /// # Errors
    /// - `IllegalName` if `prefix` is neither empty nor an NCName.
    /// - `MalformedUri` if `uri` is not a URI reference.
    /// - `NamespaceConflict` if `prefix` is already bound to another URI on this element,
    ///   or if the declaration breaks the rules of `xml` and `xmlns`.
    pub fn add_namespace_declaration(&self, prefix: &str, uri: &str) -> Result<(), XmlError> {
        if prefix == XML_PREFIX {
            if uri == XML_XML_NAMESPACE {
                return Ok(());
            }
            return Err(XmlError::namespace_conflict(format!(
                "The xml prefix must be bound to {XML_XML_NAMESPACE}, not '{uri}'"
            )));
        }
        if prefix == XMLNS_PREFIX {
            return Err(XmlError::namespace_conflict(
                "The xmlns prefix cannot be declared",
            ));
        }
        if uri == XML_XML_NAMESPACE {
            return Err(XmlError::namespace_conflict(format!(
                "The XML namespace can be bound only to the xml prefix, not '{prefix}'"
            )));
        }
        if !prefix.is_empty() {
            validate_ncname(prefix)?;
            if uri.is_empty() {
                return Err(XmlError::namespace_conflict(format!(
                    "The prefix '{prefix}' cannot be undeclared"
                )));
            }
        }
        if !uri.is_empty() {
            validate_uri(uri)?;
        }
        if let Some(bound) = self.local_namespace_uri(prefix) {
            if *bound != *uri {
                return Err(XmlError::namespace_conflict(format!(
                    "The prefix '{prefix}' is already bound to '{bound}' on the element '{}'",
                    self.qualified_name()
                )));
            }
        }

        let mut elem = self.0.borrow_mut();
        if *elem.prefix == *prefix || elem.namespaces.iter().any(|(p, _)| **p == *prefix) {
            return Ok(());
        }
        elem.namespaces.push((prefix.into(), uri.into()));
        Ok(())
    }

    /// Remove the additional declaration of `prefix`.
    ///
    /// Removing a prefix that is not declared has no effect.
    pub fn remove_namespace_declaration(&self, prefix: &str) {
        self.0
            .borrow_mut()
            .namespaces
            .retain(|(p, _)| **p != *prefix);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::XmlErrorKind, tree::AttrRef};

    #[test]
    fn resolve_prefix_walks_ancestors() {
        let root = ElementRef::with_namespace("root", "http://default.example/").unwrap();
        root.add_namespace_declaration("a", "http://a.example/").unwrap();
        let child = ElementRef::new("child").unwrap();
        root.append_child(child.clone()).unwrap();

        assert_eq!(
            child.namespace_uri_for_prefix("a").as_deref(),
            Some("http://a.example/")
        );
        assert_eq!(child.namespace_uri_for_prefix("").as_deref(), Some(""));
        assert_eq!(
            root.namespace_uri_for_prefix("").as_deref(),
            Some("http://default.example/")
        );
        assert_eq!(
            child.namespace_uri_for_prefix("xml").as_deref(),
            Some(XML_XML_NAMESPACE)
        );
        assert_eq!(child.namespace_uri_for_prefix("xmlns").as_deref(), Some(""));
        assert_eq!(child.namespace_uri_for_prefix("b"), None);
    }

    #[test]
    fn undeclare_default_namespace() {
        let root = ElementRef::with_namespace("root", "http://default.example/").unwrap();
        let child = ElementRef::new("child").unwrap();
        root.append_child(child.clone()).unwrap();
        child.add_namespace_declaration("", "").unwrap();
        assert_eq!(child.namespace_uri_for_prefix("").as_deref(), Some(""));

        let qualified = ElementRef::with_namespace("inner", "http://other.example/").unwrap();
        root.append_child(qualified.clone()).unwrap();
        let err = qualified.add_namespace_declaration("", "").unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::NamespaceConflict);
    }

    #[test]
    fn declaration_rules() {
        let elem = ElementRef::new("e").unwrap();
        elem.add_namespace_declaration("xml", XML_XML_NAMESPACE).unwrap();
        assert_eq!(elem.additional_namespace_declarations().len(), 0);

        let cases = [
            ("xml", "http://a.example/", XmlErrorKind::NamespaceConflict),
            ("xmlns", "http://a.example/", XmlErrorKind::NamespaceConflict),
            ("p", XML_XML_NAMESPACE, XmlErrorKind::NamespaceConflict),
            ("p", "", XmlErrorKind::NamespaceConflict),
            ("1p", "http://a.example/", XmlErrorKind::IllegalName),
            ("p", "http://a example/", XmlErrorKind::MalformedUri),
        ];
        for (prefix, uri, kind) in cases {
            let err = elem.add_namespace_declaration(prefix, uri).unwrap_err();
            assert_eq!(err.kind(), kind, "{prefix} {uri}");
        }

        elem.add_namespace_declaration("p", "http://p.example/").unwrap();
        elem.add_namespace_declaration("p", "http://p.example/").unwrap();
        let err = elem
            .add_namespace_declaration("p", "http://q.example/")
            .unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::NamespaceConflict);
        elem.remove_namespace_declaration("p");
        elem.remove_namespace_declaration("unknown");
        elem.add_namespace_declaration("p", "http://q.example/").unwrap();
    }

    #[test]
    fn count_declarations() {
        let elem = ElementRef::with_namespace("a:e", "http://a.example/").unwrap();
        assert_eq!(elem.namespace_declaration_count(), 1);
        elem.add_attribute(AttrRef::with_namespace("b:x", "http://b.example/", "1").unwrap())
            .unwrap();
        elem.add_attribute(AttrRef::with_namespace("a:y", "http://a.example/", "1").unwrap())
            .unwrap();
        elem.add_attribute(AttrRef::new("xml:lang", "en").unwrap())
            .unwrap();
        elem.add_namespace_declaration("b", "http://b.example/").unwrap();
        elem.add_namespace_declaration("c", "http://c.example/").unwrap();
        assert_eq!(elem.namespace_declaration_count(), 3);
        assert_eq!(&*elem.namespace_prefix_at(0).unwrap(), "a");
        assert_eq!(&*elem.namespace_prefix_at(1).unwrap(), "b");
        assert_eq!(&*elem.namespace_prefix_at(2).unwrap(), "c");
        let err = elem.namespace_prefix_at(3).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IndexOutOfBounds);

        let elem = ElementRef::with_namespace("xml:base", XML_XML_NAMESPACE).unwrap();
        assert_eq!(elem.namespace_declaration_count(), 0);
        elem.add_namespace_declaration("d", "http://d.example/").unwrap();
        assert_eq!(elem.namespace_declaration_count(), 1);
        assert_eq!(&*elem.namespace_prefix_at(0).unwrap(), "d");
    }

    #[test]
    fn namespace_nodes_are_in_scope() {
        let root = ElementRef::with_namespace("root", "http://default.example/").unwrap();
        root.add_namespace_declaration("a", "http://a.example/").unwrap();
        let child = ElementRef::new("child").unwrap();
        root.append_child(child.clone()).unwrap();
        let nodes = child.namespace_nodes();
        let prefixes = nodes.iter().map(|ns| ns.prefix()).collect::<Vec<_>>();
        assert_eq!(prefixes, [Rc::from("a"), Rc::from("xml")]);
        assert_eq!(nodes[0].parent_element(), child);
        assert_eq!(nodes[0].to_node_ref(), child.namespace_nodes()[0].to_node_ref());
    }
}
