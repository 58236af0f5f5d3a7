//! Construction protocol between an event source and the tree.
//!
//! An event source drives a [`TreeBuilder`] with start/end calls in document order.
//! Every node is created through a [`NodeFactory`], which may substitute, suppress
//! or redirect it before it is attached.

use crate::{
    error::XmlError,
    tree::{
        AttrRef, AttributeType, CommentRef, DocTypeRef, DocumentRef, ElementRef, Node, NodeRef,
        ProcessingInstructionRef, TextRef,
    },
};

/// Hooks called while a document is built.
///
/// Every hook constructs the node normally by default, so an implementation
/// overrides only the hooks it needs.
///
/// Hooks returning a list of nodes may return an empty list to drop the node, or
/// several nodes to put in its place. Attributes in a returned list are added to the
/// element being built, other nodes become children of it.
pub trait NodeFactory {
    /// Called once before any other hook.
    fn start_making_document(&mut self) {}

    /// Called once the document is complete.
    fn finish_making_document(&mut self, document: &DocumentRef) -> Result<(), XmlError> {
        let _ = document;
        Ok(())
    }

    /// Create the root element.
    ///
    /// The root element cannot be suppressed.
    fn make_root_element(&mut self, name: &str, namespace_uri: &str) -> Result<ElementRef, XmlError> {
        ElementRef::with_namespace(name, namespace_uri)
    }

    /// Create a non-root element.
    ///
    /// If `None` is returned, the element is not built, but its content still is.
    /// Children are attached to the nearest ancestor that was built.
    fn start_making_element(
        &mut self,
        name: &str,
        namespace_uri: &str,
    ) -> Result<Option<ElementRef>, XmlError> {
        ElementRef::with_namespace(name, namespace_uri).map(Some)
    }

    /// Called when the end tag of `element` is seen.
    ///
    /// The returned nodes replace `element` in its parent. For the root element,
    /// the result must be exactly one element.
    fn finish_making_element(&mut self, element: ElementRef) -> Result<Vec<NodeRef>, XmlError> {
        Ok(vec![element.into()])
    }

    fn make_attribute(
        &mut self,
        name: &str,
        namespace_uri: &str,
        value: &str,
        atype: AttributeType,
    ) -> Result<Vec<NodeRef>, XmlError> {
        Ok(vec![AttrRef::with_type(name, namespace_uri, value, atype)?.into()])
    }

    fn make_text(&mut self, data: &str) -> Result<Vec<NodeRef>, XmlError> {
        Ok(vec![TextRef::new(data)?.into()])
    }

    /// Create a text node for white space that the DTD declares ignorable.
    fn make_white_space_in_element_content(
        &mut self,
        data: &str,
    ) -> Result<Vec<NodeRef>, XmlError> {
        self.make_text(data)
    }

    fn make_comment(&mut self, data: &str) -> Result<Vec<NodeRef>, XmlError> {
        Ok(vec![CommentRef::new(data)?.into()])
    }

    fn make_processing_instruction(
        &mut self,
        target: &str,
        data: &str,
    ) -> Result<Vec<NodeRef>, XmlError> {
        Ok(vec![ProcessingInstructionRef::new(target, data)?.into()])
    }

    fn make_doc_type(
        &mut self,
        root_element_name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<Vec<NodeRef>, XmlError> {
        Ok(vec![
            DocTypeRef::with_ids(root_element_name, public_id, system_id)?.into(),
        ])
    }
}

/// A factory that builds every node as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNodeFactory;

impl NodeFactory for DefaultNodeFactory {}

/// One open element.
struct Frame {
    /// `None` if the factory suppressed the element.
    element: Option<ElementRef>,
    /// White space directly inside this element is ignorable.
    element_content: bool,
}

/// Build a tree from construction events.
///
/// Calls must follow document order: everything before the root element, the root
/// element and its content, then everything after the root element.
pub struct TreeBuilder<'a> {
    factory: &'a mut dyn NodeFactory,
    document: Option<DocumentRef>,
    base_uri: Option<String>,
    /// Nodes seen before the root element.
    prolog: Vec<NodeRef>,
    stack: Vec<Frame>,
    pending_text: String,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(factory: &'a mut dyn NodeFactory) -> Self {
        Self {
            factory,
            document: None,
            base_uri: None,
            prolog: vec![],
            stack: vec![],
            pending_text: String::new(),
        }
    }

    /// Set the base URI of the document that will be built.
    pub fn set_base_uri(&mut self, base_uri: Option<&str>) {
        self.base_uri = base_uri.map(|s| s.to_owned());
    }

    pub fn start_document(&mut self) {
        self.factory.start_making_document();
    }

    /// Return the element that receives content now.
    ///
    /// Returns `None` before the root element, after it, or while the innermost open
    /// element was suppressed.
    pub fn current_element(&self) -> Option<ElementRef> {
        self.stack.last().and_then(|frame| frame.element.clone())
    }

    fn nearest_element(&self) -> Option<ElementRef> {
        self.stack.iter().rev().find_map(|frame| frame.element.clone())
    }

    /// Attach nodes returned by the factory at the current position.
    fn attach(&mut self, nodes: Vec<NodeRef>) -> Result<(), XmlError> {
        for node in nodes {
            if self.stack.is_empty() {
                if let NodeRef::Attribute(attr) = &node {
                    return Err(XmlError::illegal_add(format!(
                        "The attribute '{}' cannot be a child of the document",
                        attr.qualified_name()
                    )));
                }
                match &self.document {
                    Some(doc) => doc.append_child(node)?,
                    None => {
                        if node.has_parent() || self.prolog.contains(&node) {
                            return Err(XmlError::multiple_parent(format!(
                                "The {} already has a parent",
                                node.describe()
                            )));
                        }
                        self.prolog.push(node);
                    }
                }
            } else if let Some(parent) = self.nearest_element() {
                match node {
                    NodeRef::Attribute(attr) => parent.add_attribute(attr)?,
                    node => parent.append_child(node)?,
                }
            }
        }
        Ok(())
    }

    fn flush_text(&mut self) -> Result<(), XmlError> {
        if self.pending_text.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.pending_text);
        let Some(frame) = self.stack.last() else {
            // Character data outside of the root element is not kept.
            return Ok(());
        };
        let nodes = if frame.element_content
            && text.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
        {
            self.factory.make_white_space_in_element_content(&text)?
        } else {
            self.factory.make_text(&text)?
        };
        self.attach(nodes)
    }

    /// Report the document type declaration.
    ///
    /// `internal_subset` is set on every document type declaration the factory returns.
    pub fn doc_type(
        &mut self,
        root_element_name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
        internal_subset: &str,
    ) -> Result<(), XmlError> {
        self.flush_text()?;
        let nodes = self
            .factory
            .make_doc_type(root_element_name, public_id, system_id)?;
        for node in &nodes {
            if let NodeRef::DocType(doctype) = node {
                doctype.set_internal_subset(internal_subset)?;
            }
        }
        self.attach(nodes)
    }

    pub fn start_element(
        &mut self,
        name: &str,
        namespace_uri: &str,
        element_content: bool,
    ) -> Result<(), XmlError> {
        self.flush_text()?;
        if self.stack.is_empty() {
            if self.document.is_some() {
                return Err(XmlError::illegal_add(format!(
                    "The document already has a root element, '{name}' cannot be added"
                )));
            }
            let root = self.factory.make_root_element(name, namespace_uri)?;
            let doc = DocumentRef::new(root.clone())?;
            for (i, node) in std::mem::take(&mut self.prolog).into_iter().enumerate() {
                doc.insert_child(node, i)?;
            }
            if let Some(base_uri) = self.base_uri.as_deref() {
                doc.set_base_uri(Some(base_uri))?;
            }
            self.document = Some(doc);
            self.stack.push(Frame {
                element: Some(root),
                element_content,
            });
            return Ok(());
        }

        let element = self.factory.start_making_element(name, namespace_uri)?;
        if let Some(element) = element.as_ref() {
            if let Some(parent) = self.nearest_element() {
                parent.append_child(element.clone())?;
            }
        }
        self.stack.push(Frame {
            element,
            element_content,
        });
        Ok(())
    }

    /// Declare a namespace on the current element.
    pub fn namespace_declaration(&mut self, prefix: &str, uri: &str) -> Result<(), XmlError> {
        if let Some(elem) = self.current_element() {
            elem.add_namespace_declaration(prefix, uri)?;
        }
        Ok(())
    }

    /// Add an attribute to the current element.
    ///
    /// If the current element was suppressed, the attribute is dropped.
    pub fn attribute(
        &mut self,
        name: &str,
        namespace_uri: &str,
        value: &str,
        atype: AttributeType,
    ) -> Result<(), XmlError> {
        let nodes = self
            .factory
            .make_attribute(name, namespace_uri, value, atype)?;
        let current = self.current_element();
        for node in nodes {
            match (node, current.as_ref()) {
                (NodeRef::Attribute(attr), Some(elem)) => elem.add_attribute(attr)?,
                (NodeRef::Attribute(_), None) => {}
                (node, _) => self.attach(vec![node])?,
            }
        }
        Ok(())
    }

    /// Add character data to the current element.
    ///
    /// Adjacent character data is merged into one text node.
    pub fn text(&mut self, data: &str) {
        self.pending_text.push_str(data);
    }

    pub fn comment(&mut self, data: &str) -> Result<(), XmlError> {
        self.flush_text()?;
        let nodes = self.factory.make_comment(data)?;
        self.attach(nodes)
    }

    pub fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), XmlError> {
        self.flush_text()?;
        let nodes = self.factory.make_processing_instruction(target, data)?;
        self.attach(nodes)
    }

    pub fn end_element(&mut self) -> Result<(), XmlError> {
        self.flush_text()?;
        let Some(frame) = self.stack.pop() else {
            return Err(XmlError::illegal_add("No element is open"));
        };
        let Some(element) = frame.element else {
            return Ok(());
        };
        let mut nodes = self.factory.finish_making_element(element.clone())?;

        if self.stack.is_empty() {
            let root = match nodes.pop() {
                Some(NodeRef::Element(root)) if nodes.is_empty() => root,
                _ => {
                    return Err(XmlError::illegal_add(
                        "The root element must be replaced by exactly one element",
                    ));
                }
            };
            if let Some(doc) = self.document.as_ref() {
                doc.set_root_element(root)?;
            }
            return Ok(());
        }

        if let [NodeRef::Element(same)] = nodes.as_slice() {
            if *same == element {
                return Ok(());
            }
        }
        let Some(parent) = element.parent_element() else {
            return Ok(());
        };
        let node = NodeRef::Element(element);
        let Some(mut index) = parent.index_of(&node) else {
            return Ok(());
        };
        parent.remove_child(index)?;
        for node in nodes {
            match node {
                NodeRef::Attribute(attr) => parent.add_attribute(attr)?,
                node => {
                    parent.insert_child(node, index)?;
                    index += 1;
                }
            }
        }
        Ok(())
    }

    /// Complete the document.
    ///
    /// # Errors
    /// - `IllegalAdd` if no root element was seen or an element is still open.
    pub fn end_document(mut self) -> Result<DocumentRef, XmlError> {
        self.flush_text()?;
        if !self.stack.is_empty() {
            return Err(XmlError::illegal_add("Some elements are not closed"));
        }
        let Some(doc) = self.document.take() else {
            return Err(XmlError::illegal_add("The document has no root element"));
        };
        self.factory.finish_making_document(&doc)?;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::XmlErrorKind;

    fn build(factory: &mut dyn NodeFactory) -> Result<DocumentRef, XmlError> {
        let mut builder = TreeBuilder::new(factory);
        builder.start_document();
        builder.comment(" prolog ")?;
        builder.start_element("root", "", false)?;
        builder.attribute("a", "", "1", AttributeType::Undeclared)?;
        builder.text("one ");
        builder.text("two");
        builder.start_element("child", "", false)?;
        builder.comment("inner")?;
        builder.text("text");
        builder.end_element()?;
        builder.processing_instruction("pi", "data")?;
        builder.end_element()?;
        builder.comment(" epilog ")?;
        builder.end_document()
    }

    #[test]
    fn default_factory_builds_everything() {
        let doc = build(&mut DefaultNodeFactory).unwrap();
        assert_eq!(doc.child_count(), 3);
        assert_eq!(doc.root_index(), 1);
        let root = doc.root_element();
        assert_eq!(root.attribute_value("a").as_deref(), Some("1"));
        assert_eq!(root.child_count(), 3);
        assert_eq!(root.child(0).unwrap().value(), "one two");
        assert_eq!(root.value(), "one twotext");
    }

    struct NoComments;

    impl NodeFactory for NoComments {
        fn make_comment(&mut self, _: &str) -> Result<Vec<NodeRef>, XmlError> {
            Ok(vec![])
        }
    }

    #[test]
    fn suppressed_comments_are_dropped() {
        let doc = build(&mut NoComments).unwrap();
        assert_eq!(doc.child_count(), 1);
        let child = doc.root_element().child_elements()[0].clone();
        assert_eq!(child.child_count(), 1);
    }

    struct Flatten;

    impl NodeFactory for Flatten {
        fn start_making_element(
            &mut self,
            _: &str,
            _: &str,
        ) -> Result<Option<ElementRef>, XmlError> {
            Ok(None)
        }
    }

    #[test]
    fn content_of_suppressed_elements_moves_up() {
        let doc = build(&mut Flatten).unwrap();
        let root = doc.root_element();
        assert!(root.child_elements().is_empty());
        assert_eq!(root.child_count(), 4);
        assert_eq!(root.value(), "one twotext");
    }

    struct Reuse(Option<ElementRef>);

    impl NodeFactory for Reuse {
        fn start_making_element(
            &mut self,
            name: &str,
            uri: &str,
        ) -> Result<Option<ElementRef>, XmlError> {
            if self.0.is_none() {
                self.0 = Some(ElementRef::with_namespace(name, uri)?);
            }
            Ok(self.0.clone())
        }
    }

    #[test]
    fn reused_element_is_multiple_parent() {
        let mut factory = Reuse(None);
        let mut builder = TreeBuilder::new(&mut factory);
        builder.start_element("root", "", false).unwrap();
        builder.start_element("a", "", false).unwrap();
        builder.end_element().unwrap();
        let err = builder.start_element("b", "", false).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::MultipleParent);
    }

    struct Rename;

    impl NodeFactory for Rename {
        fn finish_making_element(&mut self, element: ElementRef) -> Result<Vec<NodeRef>, XmlError> {
            if &*element.local_name() == "child" {
                let text = TextRef::new("[child]")?;
                return Ok(vec![text.into(), AttrRef::new("seen", "yes")?.into()]);
            }
            if element.parent_element().is_none() {
                let root = ElementRef::new("renamed")?;
                for child in element.remove_children() {
                    root.append_child(child)?;
                }
                return Ok(vec![root.into()]);
            }
            Ok(vec![element.into()])
        }
    }

    #[test]
    fn finished_elements_can_be_replaced() {
        let doc = build(&mut Rename).unwrap();
        let root = doc.root_element();
        assert_eq!(&*root.local_name(), "renamed");
        assert_eq!(root.value(), "one two[child]");
        assert!(root.attribute_value("seen").is_none());
        assert_eq!(doc.child_count(), 3);
    }
}
