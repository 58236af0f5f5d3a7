use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use crate::error::XmlError;

use super::{
    DocTypeRef, ElementRef, Node, NodeRef, NodeType, ParentWeakRef,
    element::check_absolute_base,
};

/// Document node.
///
/// A document always has exactly one root element. Comments, processing instructions
/// and at most one document type declaration may precede or follow it, but the document
/// type declaration must precede the root element.
pub struct Document {
    children: Vec<NodeRef>,
    root: ElementRef,
    base_uri: Option<Rc<str>>,
}

/// Wrapper of `Rc<RefCell<Document>>`.
#[derive(Clone)]
pub struct DocumentRef(Rc<RefCell<Document>>);

/// Wrapper of `Weak<RefCell<Document>>`.
#[derive(Clone)]
pub struct DocumentWeakRef(Weak<RefCell<Document>>);

impl DocumentWeakRef {
    pub fn upgrade(&self) -> Option<DocumentRef> {
        self.0.upgrade().map(DocumentRef)
    }
}

impl DocumentRef {
    /// Create a document whose root element is `root`.
    ///
    /// # Errors
    /// - `MultipleParent` if `root` already has a parent.
    pub fn new(root: ElementRef) -> Result<Self, XmlError> {
        if root.parent().is_some() {
            return Err(XmlError::multiple_parent(format!(
                "The element '{}' already has a parent",
                root.qualified_name()
            )));
        }
        let doc = Self(Rc::new(RefCell::new(Document {
            children: vec![NodeRef::Element(root.clone())],
            root: root.clone(),
            base_uri: None,
        })));
        root.set_parent(Some(ParentWeakRef::Document(doc.downgrade())));
        Ok(doc)
    }

    pub fn downgrade(&self) -> DocumentWeakRef {
        DocumentWeakRef(Rc::downgrade(&self.0))
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }

    pub fn root_element(&self) -> ElementRef {
        self.0.borrow().root.clone()
    }

    /// Replace the root element.
    ///
    /// The old root element is detached.
    pub fn set_root_element(&self, root: ElementRef) -> Result<(), XmlError> {
        let old = self.root_element();
        if old == root {
            return Ok(());
        }
        if root.parent().is_some() {
            return Err(XmlError::multiple_parent(format!(
                "The element '{}' already has a parent",
                root.qualified_name()
            )));
        }
        root.set_parent(Some(ParentWeakRef::Document(self.downgrade())));
        let mut doc = self.0.borrow_mut();
        let old_node = NodeRef::Element(old.clone());
        if let Some(slot) = doc.children.iter_mut().find(|child| **child == old_node) {
            *slot = NodeRef::Element(root.clone());
        }
        doc.root = root;
        drop(doc);
        old.set_parent(None);
        Ok(())
    }

    /// Return the index of the root element among the children.
    pub fn root_index(&self) -> usize {
        let doc = self.0.borrow();
        let root = NodeRef::Element(doc.root.clone());
        doc.children
            .iter()
            .position(|child| *child == root)
            .unwrap_or_default()
    }

    pub fn doc_type(&self) -> Option<DocTypeRef> {
        self.0
            .borrow()
            .children
            .iter()
            .find_map(|child| child.as_doc_type())
    }

    /// Set the document type declaration.
    ///
    /// An existing declaration is replaced, otherwise `doctype` becomes the first child.
    pub fn set_doc_type(&self, doctype: DocTypeRef) -> Result<(), XmlError> {
        let old = self.doc_type();
        if old.as_ref() == Some(&doctype) {
            return Ok(());
        }
        if doctype.parent().is_some() {
            return Err(XmlError::multiple_parent(
                "The document type declaration already has a parent",
            ));
        }
        doctype.set_parent(Some(ParentWeakRef::Document(self.downgrade())));
        let new = NodeRef::DocType(doctype);
        let mut doc = self.0.borrow_mut();
        match old {
            Some(old) => {
                let old = NodeRef::DocType(old);
                if let Some(slot) = doc.children.iter_mut().find(|child| **child == old) {
                    *slot = new;
                }
                drop(doc);
                old.set_parent(None);
            }
            None => doc.children.insert(0, new),
        }
        Ok(())
    }

    pub fn index_of(&self, child: &NodeRef) -> Option<usize> {
        self.0.borrow().children.iter().position(|c| c == child)
    }

    fn check_insertable(&self, node: &NodeRef, index: usize) -> Result<(), XmlError> {
        match node {
            NodeRef::Element(_) => {
                return Err(XmlError::illegal_add(
                    "A document has exactly one root element; use set_root_element",
                ));
            }
            NodeRef::Text(_) => {
                return Err(XmlError::illegal_add(
                    "Text cannot be a child of a document",
                ));
            }
            NodeRef::Document(_) | NodeRef::Attribute(_) | NodeRef::Namespace(_) => {
                return Err(XmlError::illegal_add(format!(
                    "The {} cannot be a child of a document",
                    node.describe()
                )));
            }
            NodeRef::DocType(_) => {
                if self.doc_type().is_some() {
                    return Err(XmlError::illegal_add(
                        "The document already has a document type declaration",
                    ));
                }
                if index > self.root_index() {
                    return Err(XmlError::illegal_add(
                        "A document type declaration must precede the root element",
                    ));
                }
            }
            NodeRef::Comment(_) | NodeRef::ProcessingInstruction(_) => {}
        }
        if node.has_parent() {
            return Err(XmlError::multiple_parent(format!(
                "The {} already has a parent",
                node.describe()
            )));
        }
        Ok(())
    }

    /// Insert a comment, a processing instruction or a document type declaration at `index`.
    pub fn insert_child(&self, child: impl Into<NodeRef>, index: usize) -> Result<(), XmlError> {
        let child = child.into();
        let len = self.child_count();
        if index > len {
            return Err(XmlError::IndexOutOfBounds { index, len });
        }
        self.check_insertable(&child, index)?;
        child.set_parent(Some(ParentWeakRef::Document(self.downgrade())));
        self.0.borrow_mut().children.insert(index, child);
        Ok(())
    }

    pub fn append_child(&self, child: impl Into<NodeRef>) -> Result<(), XmlError> {
        self.insert_child(child, self.child_count())
    }

    /// Remove the child at `index`.
    ///
    /// # Errors
    /// - `IllegalAdd` if the child is the root element.
    pub fn remove_child(&self, index: usize) -> Result<NodeRef, XmlError> {
        let len = self.child_count();
        if index >= len {
            return Err(XmlError::IndexOutOfBounds { index, len });
        }
        if index == self.root_index() {
            return Err(XmlError::illegal_add(
                "The root element cannot be removed; use set_root_element",
            ));
        }
        let removed = self.0.borrow_mut().children.remove(index);
        removed.set_parent(None);
        Ok(removed)
    }

    pub fn remove_child_node(&self, child: &NodeRef) -> Result<NodeRef, XmlError> {
        let Some(index) = self.index_of(child) else {
            return Err(XmlError::NoSuchChild {
                message: format!("The {} is not a child of this document", child.describe())
                    .into(),
            });
        };
        self.remove_child(index)
    }

    /// Replace `old` with `new`.
    ///
    /// Replacing the root element with another element is the same as
    /// [`DocumentRef::set_root_element`].
    pub fn replace_child(&self, old: &NodeRef, new: impl Into<NodeRef>) -> Result<(), XmlError> {
        let new = new.into();
        let Some(index) = self.index_of(old) else {
            return Err(XmlError::NoSuchChild {
                message: format!("The {} is not a child of this document", old.describe()).into(),
            });
        };
        if *old == new {
            return Ok(());
        }
        match (old, &new) {
            (NodeRef::Element(_), NodeRef::Element(root)) => {
                return self.set_root_element(root.clone());
            }
            (NodeRef::Element(_), _) => {
                return Err(XmlError::illegal_add(
                    "The root element can only be replaced by an element",
                ));
            }
            (NodeRef::DocType(_), NodeRef::DocType(doctype)) => {
                return self.set_doc_type(doctype.clone());
            }
            _ => {}
        }
        // The slot of `old` is checked as if it were already empty.
        let removed = self.remove_child(index)?;
        if let Err(err) = self.insert_child(new, index) {
            removed.set_parent(Some(ParentWeakRef::Document(self.downgrade())));
            self.0.borrow_mut().children.insert(index, removed);
            return Err(err);
        }
        Ok(())
    }

    /// Set the base URI of this document.
    ///
    /// The base URI must be absolute. `None` or an empty string removes it.
    pub fn set_base_uri(&self, base_uri: Option<&str>) -> Result<(), XmlError> {
        let base_uri = match base_uri.filter(|uri| !uri.is_empty()) {
            Some(uri) => Some(check_absolute_base(uri)?),
            None => None,
        };
        self.0.borrow_mut().base_uri = base_uri;
        Ok(())
    }

    /// Create a deep copy of this document.
    pub fn copy(&self) -> DocumentRef {
        let doc = self.0.borrow();
        let root = doc.root.copy();
        let new = Self(Rc::new(RefCell::new(Document {
            children: vec![],
            root: root.clone(),
            base_uri: doc.base_uri.clone(),
        })));
        let parent = ParentWeakRef::Document(new.downgrade());
        let children = doc
            .children
            .iter()
            .map(|child| {
                let copied = if matches!(child, NodeRef::Element(_)) {
                    NodeRef::Element(root.clone())
                } else {
                    child.copy_node()
                };
                copied.set_parent(Some(parent.clone()));
                copied
            })
            .collect();
        new.0.borrow_mut().children = children;
        new
    }
}

impl Node for DocumentRef {
    fn node_type(&self) -> NodeType {
        NodeType::Document
    }

    fn to_node_ref(&self) -> NodeRef {
        NodeRef::Document(self.clone())
    }

    fn value(&self) -> String {
        self.root_element().value()
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

    fn document(&self) -> Option<DocumentRef> {
        Some(self.clone())
    }

    fn base_uri(&self) -> Option<String> {
        self.0.borrow().base_uri.as_deref().map(|s| s.to_owned())
    }

    fn copy_node(&self) -> NodeRef {
        NodeRef::Document(self.copy())
    }
}

impl PartialEq for DocumentRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentRef({:?})", self.root_element())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::XmlErrorKind,
        tree::{CommentRef, ProcessingInstructionRef, TextRef},
    };

    #[test]
    fn document_children() {
        let root = ElementRef::new("root").unwrap();
        let doc = DocumentRef::new(root.clone()).unwrap();
        assert_eq!(root.document(), Some(doc.clone()));
        doc.insert_child(CommentRef::new("before").unwrap(), 0).unwrap();
        doc.append_child(ProcessingInstructionRef::new("after", "").unwrap())
            .unwrap();
        assert_eq!(doc.child_count(), 3);
        assert_eq!(doc.root_index(), 1);

        let doctype = DocTypeRef::new("root").unwrap();
        let err = doc.append_child(doctype.clone()).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalAdd);
        doc.insert_child(doctype.clone(), 0).unwrap();
        let err = doc.insert_child(DocTypeRef::new("root").unwrap(), 0).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalAdd);
        assert_eq!(doc.doc_type(), Some(doctype));

        let err = doc.append_child(TextRef::new("text").unwrap()).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalAdd);
        let err = doc.append_child(ElementRef::new("second").unwrap()).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalAdd);
    }

    #[test]
    fn root_element_cannot_be_removed() {
        let root = ElementRef::new("root").unwrap();
        let doc = DocumentRef::new(root.clone()).unwrap();
        let err = doc.remove_child(0).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalAdd);
        let err = root.detach().unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalAdd);

        let new_root = ElementRef::new("new").unwrap();
        doc.set_root_element(new_root.clone()).unwrap();
        assert!(root.parent().is_none());
        assert_eq!(doc.root_element(), new_root);
        assert_eq!(doc.child(0), Some(new_root.to_node_ref()));

        let err = DocumentRef::new(new_root).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::MultipleParent);
    }

    #[test]
    fn document_base_uri() {
        let doc = DocumentRef::new(ElementRef::new("root").unwrap()).unwrap();
        doc.set_base_uri(Some("http://www.example.com/doc.xml")).unwrap();
        assert_eq!(
            doc.root_element().base_uri().as_deref(),
            Some("http://www.example.com/doc.xml")
        );
        let err = doc.set_base_uri(Some("doc.xml")).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::MalformedUri);
        doc.set_base_uri(Some("")).unwrap();
        assert_eq!(doc.base_uri(), None);
    }

    #[test]
    fn copy_document() {
        let root = ElementRef::new("root").unwrap();
        let doc = DocumentRef::new(root).unwrap();
        doc.insert_child(CommentRef::new("c").unwrap(), 0).unwrap();
        let copy = doc.copy();
        assert_eq!(copy.child_count(), 2);
        assert_eq!(copy.root_index(), 1);
        assert_eq!(copy.root_element().document(), Some(copy.clone()));
        assert_ne!(copy.root_element(), doc.root_element());
    }
}
