use std::{cell::RefCell, fmt, rc::Rc};

use crate::{chvalid::xml_is_pubid_char, error::XmlError};

use super::{Node, NodeRef, NodeType, ParentWeakRef, validate_character_data, validate_name};

/// Document type declaration.
///
/// The internal subset is kept as text. Parameter entity declarations are not part of it.
pub struct DocType {
    parent: Option<ParentWeakRef>,
    root_name: Rc<str>,
    public_id: Option<String>,
    system_id: Option<String>,
    internal_subset: String,
}

/// Wrapper of `Rc<RefCell<DocType>>`.
#[derive(Clone)]
pub struct DocTypeRef(Rc<RefCell<DocType>>);

/// # Specification
/// ```text
/// [12] PubidLiteral ::= '"' PubidChar* '"' | "'" (PubidChar - "'")* "'"
/// ```
fn validate_public_id(public_id: &str) -> Result<(), XmlError> {
    if let Some(c) = public_id.chars().find(|&c| !xml_is_pubid_char(c as u32)) {
        return Err(XmlError::illegal_data(
            public_id,
            format!("U+{:04X} is not allowed in a public ID", c as u32),
        ));
    }
    Ok(())
}

/// # Specification
/// ```text
/// [11] SystemLiteral ::= ('"' [^"]* '"') | ("'" [^']* "'")
/// ```
fn validate_system_id(system_id: &str) -> Result<(), XmlError> {
    validate_character_data(system_id)?;
    if system_id.contains('"') && system_id.contains('\'') {
        return Err(XmlError::illegal_data(
            system_id,
            "A system ID cannot contain both single and double quotes",
        ));
    }
    if system_id.contains('#') {
        return Err(XmlError::malformed_uri(
            system_id,
            "A system ID must not have a fragment identifier",
        ));
    }
    Ok(())
}

impl DocTypeRef {
    pub fn new(root_name: &str) -> Result<Self, XmlError> {
        Self::with_ids(root_name, None, None)
    }

    /// Create a document type declaration with external identifiers.
    ///
    /// A public ID requires a system ID.
    pub fn with_ids(
        root_name: &str,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<Self, XmlError> {
        validate_name(root_name)?;
        if let Some(public_id) = public_id {
            validate_public_id(public_id)?;
            if system_id.is_none() {
                return Err(XmlError::illegal_data(
                    public_id,
                    "A public ID requires a system ID",
                ));
            }
        }
        if let Some(system_id) = system_id {
            validate_system_id(system_id)?;
        }
        Ok(Self(Rc::new(RefCell::new(DocType {
            parent: None,
            root_name: root_name.into(),
            public_id: public_id.map(|s| s.to_owned()),
            system_id: system_id.map(|s| s.to_owned()),
            internal_subset: String::new(),
        }))))
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }

    pub(super) fn set_parent(&self, parent: Option<ParentWeakRef>) {
        self.0.borrow_mut().parent = parent;
    }

    pub fn root_element_name(&self) -> Rc<str> {
        self.0.borrow().root_name.clone()
    }

    pub fn set_root_element_name(&self, name: &str) -> Result<(), XmlError> {
        validate_name(name)?;
        self.0.borrow_mut().root_name = name.into();
        Ok(())
    }

    pub fn public_id(&self) -> Option<String> {
        self.0.borrow().public_id.clone()
    }

    pub fn set_public_id(&self, public_id: Option<&str>) -> Result<(), XmlError> {
        if let Some(id) = public_id {
            validate_public_id(id)?;
            if self.0.borrow().system_id.is_none() {
                return Err(XmlError::illegal_data(id, "A public ID requires a system ID"));
            }
        }
        self.0.borrow_mut().public_id = public_id.map(|s| s.to_owned());
        Ok(())
    }

    pub fn system_id(&self) -> Option<String> {
        self.0.borrow().system_id.clone()
    }

    pub fn set_system_id(&self, system_id: Option<&str>) -> Result<(), XmlError> {
        match system_id {
            Some(id) => validate_system_id(id)?,
            None => {
                if let Some(public_id) = self.0.borrow().public_id.as_deref() {
                    return Err(XmlError::illegal_data(
                        public_id,
                        "A public ID requires a system ID",
                    ));
                }
            }
        }
        self.0.borrow_mut().system_id = system_id.map(|s| s.to_owned());
        Ok(())
    }

    pub fn internal_subset(&self) -> String {
        self.0.borrow().internal_subset.clone()
    }

    pub fn set_internal_subset(&self, subset: &str) -> Result<(), XmlError> {
        validate_character_data(subset)?;
        self.0.borrow_mut().internal_subset = subset.to_owned();
        Ok(())
    }

    pub fn copy(&self) -> Self {
        let doctype = self.0.borrow();
        Self(Rc::new(RefCell::new(DocType {
            parent: None,
            root_name: doctype.root_name.clone(),
            public_id: doctype.public_id.clone(),
            system_id: doctype.system_id.clone(),
            internal_subset: doctype.internal_subset.clone(),
        })))
    }
}

impl Node for DocTypeRef {
    fn node_type(&self) -> NodeType {
        NodeType::DocumentType
    }

    fn to_node_ref(&self) -> NodeRef {
        NodeRef::DocType(self.clone())
    }

    fn parent(&self) -> Option<NodeRef> {
        self.0
            .borrow()
            .parent
            .as_ref()
            .and_then(|parent| parent.upgrade())
    }

    fn value(&self) -> String {
        String::new()
    }

    fn copy_node(&self) -> NodeRef {
        NodeRef::DocType(self.copy())
    }
}

impl PartialEq for DocTypeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DocTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocTypeRef({})", self.root_element_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::XmlErrorKind;

    #[test]
    fn external_identifiers() {
        let doctype = DocTypeRef::with_ids(
            "html",
            Some("-//W3C//DTD XHTML 1.0 Strict//EN"),
            Some("http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd"),
        )
        .unwrap();
        assert_eq!(&*doctype.root_element_name(), "html");

        let err = DocTypeRef::with_ids("html", Some("pub"), None).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalData);
        let err = DocTypeRef::with_ids("html", Some("{pub}"), Some("a.dtd")).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalData);
        let err = DocTypeRef::with_ids("html", None, Some("a\"'.dtd")).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalData);
        let err = DocTypeRef::with_ids("html", None, Some("a.dtd#frag")).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::MalformedUri);
        let err = DocTypeRef::new("1html").unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalName);

        let err = doctype.set_system_id(None).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalData);
        doctype.set_public_id(None).unwrap();
        doctype.set_system_id(None).unwrap();
        assert_eq!(doctype.system_id(), None);
    }
}
