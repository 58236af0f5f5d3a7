use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use crate::{
    error::{XmlError, XmlErrorLevel, report_diagnostic},
    uri::{XmlURI, build_uri, validate_iri, validate_uri},
};

use super::{
    AttrRef, Node, NodeRef, NodeType, ParentWeakRef, XML_XML_NAMESPACE,
    XMLNS_PREFIX, XML_PREFIX,
    node::collect_text,
    validate_ncname, validate_qname,
};

/// Element node.
///
/// Attributes are keyed by the pair of local name and namespace URI.  
/// Additional namespace declarations are the bindings that are not implied by
/// the qualified name of the element.
pub struct Element {
    pub(super) parent: Option<ParentWeakRef>,
    pub(super) local_name: Rc<str>,
    pub(super) prefix: Rc<str>,
    pub(super) namespace_uri: Rc<str>,
    pub(super) namespaces: Vec<(Rc<str>, Rc<str>)>,
    pub(super) attributes: Vec<AttrRef>,
    pub(super) children: Vec<NodeRef>,
    /// The base URI of the entity this element was read from.
    pub(super) actual_base_uri: Option<Rc<str>>,
}

/// Wrapper of `Rc<RefCell<Element>>`.
#[derive(Clone)]
pub struct ElementRef(pub(super) Rc<RefCell<Element>>);

/// Wrapper of `Weak<RefCell<Element>>`.
#[derive(Clone)]
pub struct ElementWeakRef(Weak<RefCell<Element>>);

impl ElementWeakRef {
    /// Generate [`ElementRef`] from `self`.  
    /// Success conditions are the same as for [`std::rc::Weak::upgrade`].
    pub fn upgrade(&self) -> Option<ElementRef> {
        self.0.upgrade().map(ElementRef)
    }
}

/// Check the namespace constraints that an element name must satisfy by itself.
pub(super) fn check_element_namespace(prefix: &str, uri: &str) -> Result<(), XmlError> {
    if prefix == XMLNS_PREFIX {
        return Err(XmlError::namespace_conflict(
            "The xmlns prefix cannot be used as an element prefix",
        ));
    }
    if prefix == XML_PREFIX && uri != XML_XML_NAMESPACE {
        return Err(XmlError::namespace_conflict(format!(
            "The xml prefix must be bound to {XML_XML_NAMESPACE}, not '{uri}'"
        )));
    }
    if prefix != XML_PREFIX && uri == XML_XML_NAMESPACE {
        return Err(XmlError::namespace_conflict(format!(
            "The XML namespace can be bound only to the xml prefix, not '{prefix}'"
        )));
    }
    if !prefix.is_empty() && uri.is_empty() {
        return Err(XmlError::namespace_conflict(format!(
            "The prefix '{prefix}' must be bound to a non-empty namespace URI"
        )));
    }
    if !uri.is_empty() {
        validate_uri(uri)?;
    }
    Ok(())
}

impl ElementRef {
    /// Create a new element in no namespace.
    pub fn new(name: &str) -> Result<Self, XmlError> {
        Self::with_namespace(name, "")
    }

    /// Create a new element.
    ///
    /// `name` may be a qualified name. If it has a prefix, `namespace_uri` must not be empty.
    pub fn with_namespace(name: &str, namespace_uri: &str) -> Result<Self, XmlError> {
        let (prefix, local_name) = validate_qname(name)?;
        check_element_namespace(prefix, namespace_uri)?;
        Ok(Self::new_unchecked(
            local_name.into(),
            prefix.into(),
            namespace_uri.into(),
        ))
    }

    fn new_unchecked(local_name: Rc<str>, prefix: Rc<str>, namespace_uri: Rc<str>) -> Self {
        Self(Rc::new(RefCell::new(Element {
            parent: None,
            local_name,
            prefix,
            namespace_uri,
            namespaces: vec![],
            attributes: vec![],
            children: vec![],
            actual_base_uri: None,
        })))
    }

    /// Generate [`ElementWeakRef`] from `self`.
    pub fn downgrade(&self) -> ElementWeakRef {
        ElementWeakRef(Rc::downgrade(&self.0))
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }

    pub(super) fn set_parent(&self, parent: Option<ParentWeakRef>) {
        self.0.borrow_mut().parent = parent;
    }

    pub fn local_name(&self) -> Rc<str> {
        self.0.borrow().local_name.clone()
    }

    pub fn namespace_prefix(&self) -> Rc<str> {
        self.0.borrow().prefix.clone()
    }

    pub fn namespace_uri(&self) -> Rc<str> {
        self.0.borrow().namespace_uri.clone()
    }

    /// Return `prefix:local-name`, or `local-name` if this element has no prefix.
    pub fn qualified_name(&self) -> String {
        let elem = self.0.borrow();
        if elem.prefix.is_empty() {
            elem.local_name.to_string()
        } else {
            format!("{}:{}", elem.prefix, elem.local_name)
        }
    }

    /// Return the parent element, if the parent is an element.
    pub fn parent_element(&self) -> Option<ElementRef> {
        self.parent().and_then(|parent| parent.as_element())
    }

    /// Change the local name.
    pub fn set_local_name(&self, local_name: &str) -> Result<(), XmlError> {
        validate_ncname(local_name)?;
        self.0.borrow_mut().local_name = local_name.into();
        Ok(())
    }

    /// Change the namespace prefix.
    ///
    /// The new prefix must be bound to the current namespace URI without conflicting
    /// with the bindings made by the attributes and the additional declarations.
    pub fn set_namespace_prefix(&self, prefix: &str) -> Result<(), XmlError> {
        if !prefix.is_empty() {
            validate_ncname(prefix)?;
        }
        let uri = self.namespace_uri();
        check_element_namespace(prefix, &uri)?;
        self.check_binding_excluding_name(prefix, &uri)?;
        self.0.borrow_mut().prefix = prefix.into();
        Ok(())
    }

    /// Change the namespace URI.
    pub fn set_namespace_uri(&self, namespace_uri: &str) -> Result<(), XmlError> {
        let prefix = self.namespace_prefix();
        check_element_namespace(&prefix, namespace_uri)?;
        self.check_binding_excluding_name(&prefix, namespace_uri)?;
        self.0.borrow_mut().namespace_uri = namespace_uri.into();
        Ok(())
    }

    fn check_binding_excluding_name(&self, prefix: &str, uri: &str) -> Result<(), XmlError> {
        let elem = self.0.borrow();
        if !prefix.is_empty() {
            for attr in &elem.attributes {
                if *attr.namespace_prefix() == *prefix && *attr.namespace_uri() != *uri {
                    return Err(XmlError::namespace_conflict(format!(
                        "The prefix '{prefix}' is bound to '{}' by the attribute '{}'",
                        attr.namespace_uri(),
                        attr.qualified_name()
                    )));
                }
            }
        }
        if let Some((_, bound)) = elem.namespaces.iter().find(|(p, _)| **p == *prefix) {
            if **bound != *uri {
                return Err(XmlError::namespace_conflict(format!(
                    "The prefix '{prefix}' is declared for '{bound}' on this element"
                )));
            }
        }
        Ok(())
    }

    /// Return the number of attributes.
    pub fn attribute_count(&self) -> usize {
        self.0.borrow().attributes.len()
    }

    /// Return the attribute at `index`.
    pub fn attribute(&self, index: usize) -> Option<AttrRef> {
        self.0.borrow().attributes.get(index).cloned()
    }

    /// Return all attributes.
    pub fn attributes(&self) -> Vec<AttrRef> {
        self.0.borrow().attributes.clone()
    }

    /// Find the attribute in no namespace whose local name is `name`.
    pub fn get_attribute(&self, name: &str) -> Option<AttrRef> {
        self.get_attribute_ns(name, "")
    }

    /// Find the attribute whose local name is `local_name` in `namespace_uri`.
    pub fn get_attribute_ns(&self, local_name: &str, namespace_uri: &str) -> Option<AttrRef> {
        self.0
            .borrow()
            .attributes
            .iter()
            .find(|attr| {
                *attr.local_name() == *local_name && *attr.namespace_uri() == *namespace_uri
            })
            .cloned()
    }

    pub fn attribute_value(&self, name: &str) -> Option<String> {
        self.get_attribute(name).map(|attr| attr.value())
    }

    pub fn attribute_value_ns(&self, local_name: &str, namespace_uri: &str) -> Option<String> {
        self.get_attribute_ns(local_name, namespace_uri)
            .map(|attr| attr.value())
    }

    /// Add `attr` to this element.
    ///
    /// If this element already has an attribute with the same local name and namespace URI,
    /// that attribute is replaced and detached.
    ///
    /// # Errors
    /// - `MultipleParent` if `attr` already belongs to an element.
    /// - `NamespaceConflict` if the prefix of `attr` is bound to a different namespace URI
    ///   on this element.
    pub fn add_attribute(&self, attr: AttrRef) -> Result<(), XmlError> {
        if attr.owner_element().is_some() {
            return Err(XmlError::multiple_parent(format!(
                "The attribute '{}' already belongs to an element",
                attr.qualified_name()
            )));
        }
        let prefix = attr.namespace_prefix();
        let local_name = attr.local_name();
        let uri = attr.namespace_uri();
        let mut replaced = None;
        {
            let elem = self.0.borrow();
            if !prefix.is_empty() && *prefix != *XML_PREFIX {
                if elem.prefix == prefix && elem.namespace_uri != uri {
                    return Err(XmlError::namespace_conflict(format!(
                        "The prefix '{prefix}' of the attribute '{}' is bound to '{}' by the element name",
                        attr.qualified_name(),
                        elem.namespace_uri
                    )));
                }
                if let Some((_, bound)) = elem
                    .namespaces
                    .iter()
                    .find(|(p, u)| *p == prefix && *u != uri)
                {
                    return Err(XmlError::namespace_conflict(format!(
                        "The prefix '{prefix}' of the attribute '{}' is declared for '{bound}'",
                        attr.qualified_name()
                    )));
                }
            }
            for (i, other) in elem.attributes.iter().enumerate() {
                if other.local_name() == local_name && other.namespace_uri() == uri {
                    replaced = Some(i);
                } else if !prefix.is_empty()
                    && other.namespace_prefix() == prefix
                    && other.namespace_uri() != uri
                {
                    return Err(XmlError::namespace_conflict(format!(
                        "The prefix '{prefix}' of the attribute '{}' is bound to '{}' by the attribute '{}'",
                        attr.qualified_name(),
                        other.namespace_uri(),
                        other.qualified_name()
                    )));
                }
            }
        }

        attr.set_owner(Some(self.downgrade()));
        let mut elem = self.0.borrow_mut();
        if let Some(i) = replaced {
            let old = std::mem::replace(&mut elem.attributes[i], attr);
            old.set_owner(None);
        } else {
            elem.attributes.push(attr);
        }
        Ok(())
    }

    /// Remove `attr` from this element.
    pub fn remove_attribute(&self, attr: &AttrRef) -> Result<AttrRef, XmlError> {
        let mut elem = self.0.borrow_mut();
        let Some(pos) = elem.attributes.iter().position(|a| a == attr) else {
            return Err(XmlError::NoSuchAttribute {
                name: attr.qualified_name(),
            });
        };
        let removed = elem.attributes.remove(pos);
        removed.set_owner(None);
        Ok(removed)
    }

    /// Check if an attribute other than `exclude` has `local_name` in `namespace_uri`.
    pub(super) fn has_other_attribute(
        &self,
        exclude: &AttrRef,
        local_name: &str,
        namespace_uri: &str,
    ) -> bool {
        self.0.borrow().attributes.iter().any(|attr| {
            attr != exclude
                && *attr.local_name() == *local_name
                && *attr.namespace_uri() == *namespace_uri
        })
    }

    /// Return the index of `child`, if `child` is a child of this element.
    pub fn index_of(&self, child: &NodeRef) -> Option<usize> {
        let key = child.key();
        self.0
            .borrow()
            .children
            .iter()
            .position(|node| node.key() == key)
    }

    fn check_insertable(&self, node: &NodeRef) -> Result<(), XmlError> {
        match node {
            NodeRef::Document(_) => {
                return Err(XmlError::illegal_add(
                    "A document cannot be a child of an element",
                ));
            }
            NodeRef::DocType(_) => {
                return Err(XmlError::illegal_add(
                    "A document type declaration cannot be a child of an element",
                ));
            }
            NodeRef::Attribute(attr) => {
                return Err(XmlError::illegal_add(format!(
                    "The attribute '{}' cannot be added as a child; use add_attribute",
                    attr.qualified_name()
                )));
            }
            NodeRef::Namespace(_) => {
                return Err(XmlError::illegal_add(
                    "A namespace node cannot be a child of an element",
                ));
            }
            _ => {}
        }
        if let NodeRef::Element(child) = node {
            let mut cur = Some(self.clone());
            while let Some(elem) = cur {
                if elem == *child {
                    return Err(XmlError::illegal_add(format!(
                        "Cannot add the element '{}' to itself or to one of its descendants",
                        child.qualified_name()
                    )));
                }
                cur = elem.parent_element();
            }
        }
        if node.has_parent() {
            return Err(XmlError::multiple_parent(format!(
                "The {} already has a parent",
                node.describe()
            )));
        }
        Ok(())
    }

    /// Insert `child` at `index`.
    pub fn insert_child(&self, child: impl Into<NodeRef>, index: usize) -> Result<(), XmlError> {
        let child = child.into();
        let len = self.child_count();
        if index > len {
            return Err(XmlError::IndexOutOfBounds { index, len });
        }
        self.check_insertable(&child)?;
        child.set_parent(Some(ParentWeakRef::Element(self.downgrade())));
        self.0.borrow_mut().children.insert(index, child);
        Ok(())
    }

    /// Append `child` as the last child.
    pub fn append_child(&self, child: impl Into<NodeRef>) -> Result<(), XmlError> {
        self.insert_child(child, self.child_count())
    }

    /// Remove the child at `index` and return it.
    pub fn remove_child(&self, index: usize) -> Result<NodeRef, XmlError> {
        let mut elem = self.0.borrow_mut();
        let len = elem.children.len();
        if index >= len {
            return Err(XmlError::IndexOutOfBounds { index, len });
        }
        let removed = elem.children.remove(index);
        drop(elem);
        removed.set_parent(None);
        Ok(removed)
    }

    /// Remove `child` and return it.
    pub fn remove_child_node(&self, child: &NodeRef) -> Result<NodeRef, XmlError> {
        let Some(index) = self.index_of(child) else {
            return Err(XmlError::NoSuchChild {
                message: format!("The {} is not a child of this element", child.describe())
                    .into(),
            });
        };
        self.remove_child(index)
    }

    /// Replace `old` with `new`.
    pub fn replace_child(&self, old: &NodeRef, new: impl Into<NodeRef>) -> Result<(), XmlError> {
        let new = new.into();
        let Some(index) = self.index_of(old) else {
            return Err(XmlError::NoSuchChild {
                message: format!("The {} is not a child of this element", old.describe()).into(),
            });
        };
        if old.key() == new.key() {
            return Ok(());
        }
        self.check_insertable(&new)?;
        new.set_parent(Some(ParentWeakRef::Element(self.downgrade())));
        let old = std::mem::replace(&mut self.0.borrow_mut().children[index], new);
        old.set_parent(None);
        Ok(())
    }

    /// Remove all children and return them in document order.
    pub fn remove_children(&self) -> Vec<NodeRef> {
        let removed = std::mem::take(&mut self.0.borrow_mut().children);
        for child in &removed {
            child.set_parent(None);
        }
        removed
    }

    /// Return the child elements.
    pub fn child_elements(&self) -> Vec<ElementRef> {
        self.0
            .borrow()
            .children
            .iter()
            .filter_map(|child| child.as_element())
            .collect()
    }

    /// Return the child elements whose local name is `local_name` in `namespace_uri`.
    pub fn child_elements_named(&self, local_name: &str, namespace_uri: &str) -> Vec<ElementRef> {
        self.child_elements()
            .into_iter()
            .filter(|elem| {
                *elem.local_name() == *local_name && *elem.namespace_uri() == *namespace_uri
            })
            .collect()
    }

    /// Return the first child element whose local name is `local_name` in `namespace_uri`.
    pub fn first_child_element(&self, local_name: &str, namespace_uri: &str) -> Option<ElementRef> {
        self.child_elements().into_iter().find(|elem| {
            *elem.local_name() == *local_name && *elem.namespace_uri() == *namespace_uri
        })
    }

    /// Set the base URI of the entity this element was read from.
    ///
    /// This base takes precedence over the ancestors, and the `xml:base` attribute of this
    /// element is resolved against it. `None` or an empty string removes it.
    pub fn set_base_uri(&self, base_uri: Option<&str>) -> Result<(), XmlError> {
        let base_uri = match base_uri.filter(|uri| !uri.is_empty()) {
            Some(uri) => Some(check_absolute_base(uri)?),
            None => None,
        };
        self.0.borrow_mut().actual_base_uri = base_uri;
        Ok(())
    }

    /// Return the base URI set by [`ElementRef::set_base_uri`].
    pub fn explicit_base_uri(&self) -> Option<Rc<str>> {
        self.0.borrow().actual_base_uri.clone()
    }

    /// Create a deep copy of this element.
    ///
    /// The copy has no parent.
    pub fn copy(&self) -> ElementRef {
        let elem = self.0.borrow();
        let new = Self::new_unchecked(
            elem.local_name.clone(),
            elem.prefix.clone(),
            elem.namespace_uri.clone(),
        );
        {
            let mut dst = new.0.borrow_mut();
            dst.namespaces = elem.namespaces.clone();
            dst.actual_base_uri = elem.actual_base_uri.clone();
            for attr in &elem.attributes {
                let attr = attr.copy();
                attr.set_owner(Some(new.downgrade()));
                dst.attributes.push(attr);
            }
            for child in &elem.children {
                let child = child.copy_node();
                child.set_parent(Some(ParentWeakRef::Element(new.downgrade())));
                dst.children.push(child);
            }
        }
        new
    }
}

/// Validate an absolute base URI.
pub(super) fn check_absolute_base(uri: &str) -> Result<Rc<str>, XmlError> {
    validate_iri(uri)?;
    if !XmlURI::parse_iri(uri).is_some_and(|uri| uri.is_absolute()) {
        return Err(XmlError::malformed_uri(uri, "A base URI must be absolute"));
    }
    Ok(uri.into())
}

impl Node for ElementRef {
    fn node_type(&self) -> NodeType {
        NodeType::Element
    }

    fn to_node_ref(&self) -> NodeRef {
        NodeRef::Element(self.clone())
    }

    fn parent(&self) -> Option<NodeRef> {
        self.0
            .borrow()
            .parent
            .as_ref()
            .and_then(|parent| parent.upgrade())
    }

    fn value(&self) -> String {
        let mut buf = String::new();
        collect_text(&self.to_node_ref(), &mut buf);
        buf
    }

    fn child_count(&self) -> usize {
        self.0.borrow().children.len()
    }

    fn child(&self, index: usize) -> Option<NodeRef> {
        self.0.borrow().children.get(index).cloned()
    }

    fn children(&self) -> Vec<NodeRef> {
        self.0.borrow().children.clone()
    }

    /// Resolve the base URI of this element.
    ///
    /// `xml:base` attributes of this element and its ancestors are combined until an
    /// absolute base is found: an absolute `xml:base`, an explicitly set base URI, or
    /// the base URI of the document. If an `xml:base` on the way is malformed, the
    /// failure is reported as a warning and `None` is returned.
    fn base_uri(&self) -> Option<String> {
        let mut relatives = vec![];
        let mut absolute = None;
        let mut cur = Some(self.to_node_ref());
        while let Some(node) = cur {
            match &node {
                NodeRef::Element(elem) => {
                    if let Some(value) = elem.attribute_value_ns("base", XML_XML_NAMESPACE) {
                        match XmlURI::parse_iri(&value) {
                            Some(uri) if uri.is_absolute() => {
                                absolute = Some(value);
                                break;
                            }
                            Some(_) => relatives.push(value),
                            None => {
                                if let Err(err) = validate_iri(&value) {
                                    report_diagnostic(XmlErrorLevel::Warning, err);
                                }
                                return None;
                            }
                        }
                    }
                    if let Some(base) = elem.explicit_base_uri() {
                        absolute = Some(base.to_string());
                        break;
                    }
                    cur = elem.parent();
                }
                NodeRef::Document(doc) => {
                    absolute = doc.base_uri();
                    break;
                }
                _ => break,
            }
        }

        let mut base = absolute?;
        for relative in relatives.iter().rev() {
            base = build_uri(relative, &base)?;
        }
        Some(base)
    }

    fn copy_node(&self) -> NodeRef {
        NodeRef::Element(self.copy())
    }
}

impl PartialEq for ElementRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementRef({})", self.qualified_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::XmlErrorKind,
        tree::{CommentRef, DocumentRef, TextRef},
    };

    #[test]
    fn element_name_rules() {
        let elem = ElementRef::with_namespace("xml:base", XML_XML_NAMESPACE).unwrap();
        assert_eq!(&*elem.local_name(), "base");
        assert_eq!(&*elem.namespace_prefix(), "xml");

        let cases = [
            ("xml:base", "http://www.example.org/", XmlErrorKind::NamespaceConflict),
            ("pre:base", XML_XML_NAMESPACE, XmlErrorKind::NamespaceConflict),
            ("xmlns:a", "http://www.example.org/", XmlErrorKind::NamespaceConflict),
            ("pre:a", "", XmlErrorKind::NamespaceConflict),
            ("1a", "", XmlErrorKind::IllegalName),
            ("a:b:c", "http://www.example.org/", XmlErrorKind::IllegalName),
            ("a", "http://exa mple.org/", XmlErrorKind::MalformedUri),
        ];
        for (name, uri, kind) in cases {
            let err = ElementRef::with_namespace(name, uri).unwrap_err();
            assert_eq!(err.kind(), kind, "{name} {uri}");
        }
    }

    #[test]
    fn insert_and_remove_children() {
        let root = ElementRef::new("root").unwrap();
        let child = ElementRef::new("child").unwrap();
        let text = TextRef::new("text").unwrap();
        root.append_child(child.clone()).unwrap();
        root.insert_child(text.clone(), 0).unwrap();
        assert_eq!(root.child_count(), 2);
        assert_eq!(root.index_of(&child.to_node_ref()), Some(1));
        assert_eq!(child.parent_element(), Some(root.clone()));

        let err = root.insert_child(CommentRef::new("c").unwrap(), 3).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IndexOutOfBounds);

        let other = ElementRef::new("other").unwrap();
        let err = other.append_child(child.clone()).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::MultipleParent);
        assert_eq!(other.child_count(), 0);

        let err = child.append_child(root.clone()).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalAdd);
        let err = child.append_child(child.clone()).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalAdd);

        let removed = root.remove_child(1).unwrap();
        assert!(removed.parent().is_none());
        assert!(child.parent().is_none());
        let err = root.remove_child_node(&removed).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::NoSuchChild);

        let grand = ElementRef::new("grand").unwrap();
        child.append_child(grand.clone()).unwrap();
        other.append_child(child.clone()).unwrap();
        assert_eq!(grand.parent_element(), Some(child.clone()));
        text.detach().unwrap();
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn illegal_children() {
        let root = ElementRef::new("root").unwrap();
        let doc = DocumentRef::new(ElementRef::new("r").unwrap()).unwrap();
        let err = root.append_child(doc).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalAdd);
        let attr = AttrRef::new("a", "v").unwrap();
        let err = root.append_child(attr).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalAdd);
    }

    #[test]
    fn replace_child() {
        let root = ElementRef::new("root").unwrap();
        let a = TextRef::new("a").unwrap();
        let b = CommentRef::new("b").unwrap();
        root.append_child(a.clone()).unwrap();
        root.replace_child(&a.to_node_ref(), b.clone()).unwrap();
        assert!(a.parent().is_none());
        assert_eq!(root.child(0), Some(b.to_node_ref()));
    }

    #[test]
    fn duplicate_attribute_is_replaced() {
        let elem = ElementRef::new("e").unwrap();
        let first = AttrRef::new("name", "first").unwrap();
        let second = AttrRef::new("name", "second").unwrap();
        elem.add_attribute(first.clone()).unwrap();
        elem.add_attribute(second.clone()).unwrap();
        assert_eq!(elem.attribute_count(), 1);
        assert_eq!(elem.attribute_value("name").as_deref(), Some("second"));
        assert!(first.owner_element().is_none());
        assert_eq!(second.owner_element(), Some(elem.clone()));

        let err = ElementRef::new("x")
            .unwrap()
            .add_attribute(second.clone())
            .unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::MultipleParent);
    }

    #[test]
    fn attribute_namespace_conflicts() {
        let elem = ElementRef::with_namespace("p:e", "http://a.example/").unwrap();
        let attr = AttrRef::with_namespace("p:x", "http://b.example/", "v").unwrap();
        let err = elem.add_attribute(attr).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::NamespaceConflict);
        assert_eq!(elem.attribute_count(), 0);

        elem.add_attribute(AttrRef::with_namespace("q:x", "http://q.example/", "v").unwrap())
            .unwrap();
        let attr = AttrRef::with_namespace("q:y", "http://r.example/", "v").unwrap();
        let err = elem.add_attribute(attr).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::NamespaceConflict);

        let err = elem.set_namespace_prefix("q").unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::NamespaceConflict);
        assert_eq!(&*elem.namespace_prefix(), "p");

        elem.add_namespace_declaration("d", "http://d.example/").unwrap();
        let attr = AttrRef::with_namespace("d:z", "http://e.example/", "v").unwrap();
        let err = elem.add_attribute(attr).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::NamespaceConflict);
    }

    #[test]
    fn remove_attribute() {
        let elem = ElementRef::new("e").unwrap();
        let attr = AttrRef::new("a", "v").unwrap();
        let err = elem.remove_attribute(&attr).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::NoSuchAttribute);
        elem.add_attribute(attr.clone()).unwrap();
        elem.remove_attribute(&attr).unwrap();
        assert!(attr.owner_element().is_none());
        assert_eq!(elem.attribute_count(), 0);
    }

    #[test]
    fn base_uri_resolution() {
        let root = ElementRef::new("root").unwrap();
        let doc = DocumentRef::new(root.clone()).unwrap();
        doc.set_base_uri(Some("http://www.base1.com/")).unwrap();
        let child = ElementRef::new("child").unwrap();
        root.append_child(child.clone()).unwrap();
        child
            .add_attribute(AttrRef::new("xml:base", "base3.html").unwrap())
            .unwrap();
        assert_eq!(
            child.base_uri().as_deref(),
            Some("http://www.base1.com/base3.html")
        );
        assert_eq!(root.base_uri().as_deref(), Some("http://www.base1.com/"));

        let inner = ElementRef::new("inner").unwrap();
        child.append_child(inner.clone()).unwrap();
        inner.set_base_uri(Some("http://entity.example/dir/")).unwrap();
        inner
            .add_attribute(AttrRef::new("xml:base", "sub/").unwrap())
            .unwrap();
        assert_eq!(
            inner.base_uri().as_deref(),
            Some("http://entity.example/dir/sub/")
        );

        let err = root.set_base_uri(Some("relative/")).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::MalformedUri);
    }

    #[test]
    fn malformed_base_uri_is_isolated() {
        let root = ElementRef::new("root").unwrap();
        let doc = DocumentRef::new(root.clone()).unwrap();
        doc.set_base_uri(Some("http://www.example.com/")).unwrap();
        let child = ElementRef::new("child").unwrap();
        root.append_child(child.clone()).unwrap();
        child
            .add_attribute(AttrRef::new("xml:base", "%GG").unwrap())
            .unwrap();
        assert_eq!(child.base_uri(), None);
        assert_eq!(root.base_uri().as_deref(), Some("http://www.example.com/"));
    }

    #[test]
    fn copy_is_deep_and_detached() {
        let root = ElementRef::with_namespace("p:root", "http://p.example/").unwrap();
        root.add_attribute(AttrRef::new("a", "1").unwrap()).unwrap();
        root.append_child(TextRef::new("hello").unwrap()).unwrap();
        let copy = root.copy();
        assert!(copy.parent().is_none());
        assert_ne!(copy, root);
        assert_eq!(copy.qualified_name(), "p:root");
        assert_eq!(copy.value(), "hello");
        assert_eq!(copy.attribute(0).unwrap().owner_element(), Some(copy.clone()));
        assert_ne!(copy.child(0), root.child(0));
    }
}
