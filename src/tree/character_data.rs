use std::{cell::RefCell, fmt, rc::Rc};

use crate::error::XmlError;

use super::{
    Node, NodeRef, NodeType, ParentWeakRef, decode_utf16_data, validate_character_data,
};

macro_rules! impl_character_data {
    ( $( ( $node:ident, $handle:ident, $variant:ident, $validate:path ) ),* ) => {
        $(
            pub struct $node {
                parent: Option<ParentWeakRef>,
                value: String,
            }

            #[derive(Clone)]
            pub struct $handle(Rc<RefCell<$node>>);

            impl $handle {
                pub fn new(value: &str) -> Result<Self, XmlError> {
                    $validate(value)?;
                    Ok(Self(Rc::new(RefCell::new($node {
                        parent: None,
                        value: value.to_owned(),
                    }))))
                }

                /// Create a node from UTF-16 code units.
                ///
                /// Unpaired surrogates are rejected.
                pub fn from_utf16(value: &[u16]) -> Result<Self, XmlError> {
                    Self::new(&decode_utf16_data(value)?)
                }

                pub fn set_value(&self, value: &str) -> Result<(), XmlError> {
                    $validate(value)?;
                    self.0.borrow_mut().value = value.to_owned();
                    Ok(())
                }

                pub fn copy(&self) -> Self {
                    Self(Rc::new(RefCell::new($node {
                        parent: None,
                        value: self.0.borrow().value.clone(),
                    })))
                }

                pub(crate) fn as_ptr(&self) -> *const () {
                    Rc::as_ptr(&self.0) as *const ()
                }

                pub(super) fn set_parent(&self, parent: Option<ParentWeakRef>) {
                    self.0.borrow_mut().parent = parent;
                }
            }

            impl Node for $handle {
                fn node_type(&self) -> NodeType {
                    NodeType::$variant
                }

                fn to_node_ref(&self) -> NodeRef {
                    NodeRef::$variant(self.clone())
                }

                fn parent(&self) -> Option<NodeRef> {
                    self.0.borrow().parent.as_ref().and_then(|parent| parent.upgrade())
                }

                fn value(&self) -> String {
                    self.0.borrow().value.clone()
                }

                fn copy_node(&self) -> NodeRef {
                    NodeRef::$variant(self.copy())
                }
            }

            impl PartialEq for $handle {
                fn eq(&self, other: &Self) -> bool {
                    Rc::ptr_eq(&self.0, &other.0)
                }
            }

            impl fmt::Debug for $handle {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}({:?})", stringify!($handle), self.0.borrow().value)
                }
            }
        )*
    };
}

impl_character_data! {
    (Text, TextRef, Text, validate_character_data),
    (Comment, CommentRef, Comment, validate_comment)
}

/// Check that `value` can be the content of a comment.
///
/// # Specification
/// ```text
/// [15] Comment ::= '<!--' ((Char - '-') | ('-' (Char - '-')))* '-->'
/// ```
fn validate_comment(value: &str) -> Result<(), XmlError> {
    validate_character_data(value)?;
    if value.contains("--") {
        return Err(XmlError::illegal_data(
            value,
            "A comment must not contain '--'",
        ));
    }
    if value.ends_with('-') {
        return Err(XmlError::illegal_data(
            value,
            "A comment must not end with '-'",
        ));
    }
    Ok(())
}
