use std::{fmt, rc::Rc};

use crate::error::XmlError;

use super::{
    AttrRef, CommentRef, DocTypeRef, DocumentRef, DocumentWeakRef, ElementRef, ElementWeakRef,
    NamespaceNode, NodeType, ProcessingInstructionRef, TextRef,
};

/// Capabilities shared by every kind of node.
pub trait Node {
    /// Return the kind of this node.
    fn node_type(&self) -> NodeType;

    /// Wrap a clone of this handle into a [`NodeRef`].
    fn to_node_ref(&self) -> NodeRef;

    /// Return the parent of this node.
    ///
    /// The parent of a child node is either an element or a document.  
    /// Attributes report their owner element.
    fn parent(&self) -> Option<NodeRef> {
        None
    }

    /// Return the XPath string-value of this node.
    fn value(&self) -> String;

    /// Return the number of children.
    fn child_count(&self) -> usize {
        0
    }

    /// Return the child at `index`.
    fn child(&self, index: usize) -> Option<NodeRef> {
        let _ = index;
        None
    }

    /// Return the children of this node in document order.
    fn children(&self) -> Vec<NodeRef> {
        (0..self.child_count())
            .filter_map(|i| self.child(i))
            .collect()
    }

    /// Return the absolute base URI of this node, if any.
    fn base_uri(&self) -> Option<String> {
        self.parent().and_then(|parent| parent.base_uri())
    }

    /// Return the document containing this node.
    fn document(&self) -> Option<DocumentRef> {
        let mut cur = self.parent();
        while let Some(node) = cur {
            if let NodeRef::Document(doc) = node {
                return Some(doc);
            }
            cur = node.parent();
        }
        None
    }

    /// Remove this node from its parent.
    ///
    /// Detaching a node that has no parent does nothing.  
    /// The root element of a document cannot be detached.
    fn detach(&self) -> Result<(), XmlError> {
        let node = self.to_node_ref();
        match self.parent() {
            Some(NodeRef::Element(elem)) => elem.remove_child_node(&node).map(|_| ()),
            Some(NodeRef::Document(doc)) => doc.remove_child_node(&node).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Create a deep copy of this node.
    ///
    /// The copy has no parent.
    fn copy_node(&self) -> NodeRef;

    /// Check if `other` refers to the same node as `self`.
    fn is_same_node(&self, other: &NodeRef) -> bool {
        self.to_node_ref().key() == other.key()
    }

    /// Serialize this node.
    ///
    /// Documents start with an XML declaration.
    #[cfg(feature = "output")]
    fn to_xml(&self) -> Result<String, XmlError> {
        crate::save::node_to_xml(&self.to_node_ref())
    }
}

/// A handle to any kind of node.
#[derive(Clone)]
pub enum NodeRef {
    Document(DocumentRef),
    Element(ElementRef),
    Attribute(AttrRef),
    Text(TextRef),
    Comment(CommentRef),
    ProcessingInstruction(ProcessingInstructionRef),
    DocType(DocTypeRef),
    Namespace(NamespaceNode),
}

macro_rules! impl_node_trait_to_noderef {
    ( $( fn $fn:ident($( $arg_name:ident : $arg_type:ty ),*) -> $ret:ty ),* ) => {
        impl Node for NodeRef {
            fn to_node_ref(&self) -> NodeRef {
                self.clone()
            }
            $(
                fn $fn(&self, $( $arg_name: $arg_type ),* ) -> $ret {
                    match self {
                        NodeRef::Document(doc) => <DocumentRef as Node>::$fn(doc, $( $arg_name ),* ),
                        NodeRef::Element(elem) => <ElementRef as Node>::$fn(elem, $( $arg_name ),* ),
                        NodeRef::Attribute(attr) => <AttrRef as Node>::$fn(attr, $( $arg_name ),* ),
                        NodeRef::Text(text) => <TextRef as Node>::$fn(text, $( $arg_name ),* ),
                        NodeRef::Comment(comment) => <CommentRef as Node>::$fn(comment, $( $arg_name ),* ),
                        NodeRef::ProcessingInstruction(pi) => {
                            <ProcessingInstructionRef as Node>::$fn(pi, $( $arg_name ),* )
                        }
                        NodeRef::DocType(doctype) => <DocTypeRef as Node>::$fn(doctype, $( $arg_name ),* ),
                        NodeRef::Namespace(ns) => <NamespaceNode as Node>::$fn(ns, $( $arg_name ),* ),
                    }
                }
            )*
        }
    };
}

impl_node_trait_to_noderef! {
    fn node_type() -> NodeType,
    fn parent() -> Option<NodeRef>,
    fn value() -> String,
    fn child_count() -> usize,
    fn child(index: usize) -> Option<NodeRef>,
    fn base_uri() -> Option<String>,
    fn detach() -> Result<(), XmlError>,
    fn copy_node() -> NodeRef
}

macro_rules! impl_node_conversion {
    ( $( ( $fn:ident, $var:ident, $t:ty ) ),* ) => {
        impl NodeRef {
            $(
                pub fn $fn (&self) -> Option<$t> {
                    match self {
                        NodeRef:: $var (node) => Some(node.clone()),
                        _ => None
                    }
                }
            )*
        }
        $(
            impl From<$t> for NodeRef {
                fn from(value: $t) -> Self {
                    NodeRef:: $var (value)
                }
            }
        )*
    };
}

impl_node_conversion! {
    ( as_document, Document, DocumentRef ),
    ( as_element, Element, ElementRef ),
    ( as_attribute, Attribute, AttrRef ),
    ( as_text, Text, TextRef ),
    ( as_comment, Comment, CommentRef ),
    ( as_processing_instruction, ProcessingInstruction, ProcessingInstructionRef ),
    ( as_doc_type, DocType, DocTypeRef ),
    ( as_namespace, Namespace, NamespaceNode )
}

impl NodeRef {
    /// Return the identity of the node referred by this handle.
    pub(crate) fn key(&self) -> NodeKey {
        match self {
            NodeRef::Document(node) => NodeKey::new(node.as_ptr(), None),
            NodeRef::Element(node) => NodeKey::new(node.as_ptr(), None),
            NodeRef::Attribute(node) => NodeKey::new(node.as_ptr(), None),
            NodeRef::Text(node) => NodeKey::new(node.as_ptr(), None),
            NodeRef::Comment(node) => NodeKey::new(node.as_ptr(), None),
            NodeRef::ProcessingInstruction(node) => NodeKey::new(node.as_ptr(), None),
            NodeRef::DocType(node) => NodeKey::new(node.as_ptr(), None),
            NodeRef::Namespace(node) => {
                NodeKey::new(node.parent_element().as_ptr(), Some(node.prefix()))
            }
        }
    }

    pub(crate) fn set_parent(&self, parent: Option<ParentWeakRef>) {
        match self {
            NodeRef::Element(node) => node.set_parent(parent),
            NodeRef::Text(node) => node.set_parent(parent),
            NodeRef::Comment(node) => node.set_parent(parent),
            NodeRef::ProcessingInstruction(node) => node.set_parent(parent),
            NodeRef::DocType(node) => node.set_parent(parent),
            NodeRef::Document(_) | NodeRef::Attribute(_) | NodeRef::Namespace(_) => {}
        }
    }

    /// Check if this node has a parent.
    pub(crate) fn has_parent(&self) -> bool {
        match self {
            NodeRef::Attribute(attr) => attr.owner_element().is_some(),
            NodeRef::Namespace(_) => true,
            node => node.parent().is_some(),
        }
    }

    /// Return a short description used in error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            NodeRef::Document(_) => "document".to_owned(),
            NodeRef::Element(elem) => format!("element '{}'", elem.qualified_name()),
            NodeRef::Attribute(attr) => format!("attribute '{}'", attr.qualified_name()),
            NodeRef::Text(_) => "text".to_owned(),
            NodeRef::Comment(_) => "comment".to_owned(),
            NodeRef::ProcessingInstruction(pi) => {
                format!("processing instruction '{}'", pi.target())
            }
            NodeRef::DocType(_) => "document type declaration".to_owned(),
            NodeRef::Namespace(ns) => format!("namespace node '{}'", ns.prefix()),
        }
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({})", self.describe())
    }
}

/// Identity of a node.
///
/// Namespace nodes are synthetic, so they are identified by their parent element
/// and their prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct NodeKey {
    addr: usize,
    prefix: Option<Rc<str>>,
}

impl NodeKey {
    fn new(addr: *const (), prefix: Option<Rc<str>>) -> Self {
        Self {
            addr: addr as usize,
            prefix,
        }
    }
}

/// Non-owning reference from a child to its parent.
#[derive(Clone)]
pub(crate) enum ParentWeakRef {
    Document(DocumentWeakRef),
    Element(ElementWeakRef),
}

impl ParentWeakRef {
    pub(crate) fn upgrade(&self) -> Option<NodeRef> {
        match self {
            ParentWeakRef::Document(doc) => doc.upgrade().map(NodeRef::Document),
            ParentWeakRef::Element(elem) => elem.upgrade().map(NodeRef::Element),
        }
    }
}

/// Append the string-value of `node` into `buf`.
pub(crate) fn collect_text(node: &NodeRef, buf: &mut String) {
    match node {
        NodeRef::Text(text) => buf.push_str(&text.value()),
        NodeRef::Element(elem) => {
            for child in elem.children() {
                collect_text(&child, buf);
            }
        }
        _ => {}
    }
}
