use std::{cell::RefCell, fmt, rc::Rc};

use crate::{chvalid::xml_is_blank_char, error::XmlError};

use super::{Node, NodeRef, NodeType, ParentWeakRef, validate_character_data, validate_name};

pub struct ProcessingInstruction {
    parent: Option<ParentWeakRef>,
    target: Rc<str>,
    data: String,
}

/// Wrapper of `Rc<RefCell<ProcessingInstruction>>`.
#[derive(Clone)]
pub struct ProcessingInstructionRef(Rc<RefCell<ProcessingInstruction>>);

/// # Specification
/// ```text
/// [17] PITarget ::= Name - (('X' | 'x') ('M' | 'm') ('L' | 'l'))
/// ```
fn validate_target(target: &str) -> Result<(), XmlError> {
    validate_name(target)?;
    if target.eq_ignore_ascii_case("xml") {
        return Err(XmlError::illegal_name(
            target,
            "The target of a processing instruction must not be 'xml'",
        ));
    }
    Ok(())
}

fn validate_data(data: &str) -> Result<(), XmlError> {
    validate_character_data(data)?;
    if data.contains("?>") {
        return Err(XmlError::illegal_data(
            data,
            "Processing instruction data must not contain '?>'",
        ));
    }
    if data.starts_with(|c: char| xml_is_blank_char(c as u32)) {
        return Err(XmlError::illegal_data(
            data,
            "Processing instruction data must not start with white space",
        ));
    }
    Ok(())
}

impl ProcessingInstructionRef {
    pub fn new(target: &str, data: &str) -> Result<Self, XmlError> {
        validate_target(target)?;
        validate_data(data)?;
        Ok(Self(Rc::new(RefCell::new(ProcessingInstruction {
            parent: None,
            target: target.into(),
            data: data.to_owned(),
        }))))
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }

    pub(super) fn set_parent(&self, parent: Option<ParentWeakRef>) {
        self.0.borrow_mut().parent = parent;
    }

    pub fn target(&self) -> Rc<str> {
        self.0.borrow().target.clone()
    }

    pub fn data(&self) -> String {
        self.0.borrow().data.clone()
    }

    pub fn set_target(&self, target: &str) -> Result<(), XmlError> {
        validate_target(target)?;
        self.0.borrow_mut().target = target.into();
        Ok(())
    }

    pub fn set_data(&self, data: &str) -> Result<(), XmlError> {
        validate_data(data)?;
        self.0.borrow_mut().data = data.to_owned();
        Ok(())
    }

    pub fn copy(&self) -> Self {
        let pi = self.0.borrow();
        Self(Rc::new(RefCell::new(ProcessingInstruction {
            parent: None,
            target: pi.target.clone(),
            data: pi.data.clone(),
        })))
    }
}

impl Node for ProcessingInstructionRef {
    fn node_type(&self) -> NodeType {
        NodeType::ProcessingInstruction
    }

    fn to_node_ref(&self) -> NodeRef {
        NodeRef::ProcessingInstruction(self.clone())
    }

    fn parent(&self) -> Option<NodeRef> {
        self.0
            .borrow()
            .parent
            .as_ref()
            .and_then(|parent| parent.upgrade())
    }

    /// Return the data of this processing instruction.
    fn value(&self) -> String {
        self.0.borrow().data.clone()
    }

    fn copy_node(&self) -> NodeRef {
        NodeRef::ProcessingInstruction(self.copy())
    }
}

impl PartialEq for ProcessingInstructionRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ProcessingInstructionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessingInstructionRef({})", self.target())
    }
}
