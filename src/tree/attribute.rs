use std::{
    any::type_name,
    cell::RefCell,
    fmt,
    rc::Rc,
    str::FromStr,
};

use anyhow::bail;

use crate::{error::XmlError, uri::validate_uri};

use super::{
    ElementRef, ElementWeakRef, Node, NodeRef, NodeType, XML_XML_NAMESPACE, XMLNS_PREFIX,
    XML_PREFIX, collapse_white_space, decode_utf16_data, validate_character_data,
    validate_ncname, validate_qname,
};

/// The type of an attribute, as declared in a DTD.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttributeType {
    #[default]
    Undeclared = 0,
    Cdata = 1,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Enumeration,
    Notation,
}

impl AttributeType {
    /// Check if values of this type are normalized by collapsing white spaces.
    pub fn is_tokenized(self) -> bool {
        !matches!(self, Self::Undeclared | Self::Cdata)
    }
}

impl TryFrom<i32> for AttributeType {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if value == Self::Undeclared as i32 {
            Ok(Self::Undeclared)
        } else if value == Self::Cdata as i32 {
            Ok(Self::Cdata)
        } else if value == Self::Id as i32 {
            Ok(Self::Id)
        } else if value == Self::IdRef as i32 {
            Ok(Self::IdRef)
        } else if value == Self::IdRefs as i32 {
            Ok(Self::IdRefs)
        } else if value == Self::Entity as i32 {
            Ok(Self::Entity)
        } else if value == Self::Entities as i32 {
            Ok(Self::Entities)
        } else if value == Self::NmToken as i32 {
            Ok(Self::NmToken)
        } else if value == Self::NmTokens as i32 {
            Ok(Self::NmTokens)
        } else if value == Self::Enumeration as i32 {
            Ok(Self::Enumeration)
        } else if value == Self::Notation as i32 {
            Ok(Self::Notation)
        } else {
            bail!(
                "Invalid convert from value '{value}' to {}",
                type_name::<Self>()
            )
        }
    }
}

impl FromStr for AttributeType {
    type Err = anyhow::Error;

    /// Parse the attribute type of an `<!ATTLIST ...>` declaration.
    ///
    /// # Specification
    /// ```text
    /// [54] AttType        ::= StringType | TokenizedType | EnumeratedType
    /// [55] StringType     ::= 'CDATA'
    /// [56] TokenizedType  ::= 'ID' | 'IDREF' | 'IDREFS' | 'ENTITY' | 'ENTITIES'
    ///                       | 'NMTOKEN' | 'NMTOKENS'
    /// [57] EnumeratedType ::= NotationType | Enumeration
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CDATA" => Ok(Self::Cdata),
            "ID" => Ok(Self::Id),
            "IDREF" => Ok(Self::IdRef),
            "IDREFS" => Ok(Self::IdRefs),
            "ENTITY" => Ok(Self::Entity),
            "ENTITIES" => Ok(Self::Entities),
            "NMTOKEN" => Ok(Self::NmToken),
            "NMTOKENS" => Ok(Self::NmTokens),
            s if s.starts_with("NOTATION") => Ok(Self::Notation),
            s if s.starts_with('(') => Ok(Self::Enumeration),
            _ => bail!("Unknown attribute type '{s}'"),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Undeclared => "UNDECLARED",
            Self::Cdata => "CDATA",
            Self::Id => "ID",
            Self::IdRef => "IDREF",
            Self::IdRefs => "IDREFS",
            Self::Entity => "ENTITY",
            Self::Entities => "ENTITIES",
            Self::NmToken => "NMTOKEN",
            Self::NmTokens => "NMTOKENS",
            Self::Enumeration => "ENUMERATION",
            Self::Notation => "NOTATION",
        };
        f.write_str(s)
    }
}

pub struct Attr {
    owner: Option<ElementWeakRef>,
    local_name: Rc<str>,
    prefix: Rc<str>,
    namespace_uri: Rc<str>,
    value: Rc<str>,
    atype: AttributeType,
}

/// Wrapper of `Rc<RefCell<Attr>>`.
#[derive(Clone)]
pub struct AttrRef(Rc<RefCell<Attr>>);

fn check_attribute_namespace(prefix: &str, uri: &str) -> Result<(), XmlError> {
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
            "The prefixed attribute must be in a namespace, but '{prefix}' has no URI"
        )));
    }
    if prefix.is_empty() && !uri.is_empty() {
        return Err(XmlError::namespace_conflict(format!(
            "An unprefixed attribute cannot be in the namespace '{uri}'"
        )));
    }
    if !uri.is_empty() {
        validate_uri(uri)?;
    }
    Ok(())
}

fn is_xml_id(local_name: &str, uri: &str) -> bool {
    local_name == "id" && uri == XML_XML_NAMESPACE
}

/// Validate `value` as a value of `atype` and return the value to be stored.
///
/// ID values are normalized and must be NCNames.
fn prepare_value(value: &str, atype: AttributeType) -> Result<Rc<str>, XmlError> {
    validate_character_data(value)?;
    if atype == AttributeType::Id {
        let normalized = collapse_white_space(value);
        if validate_ncname(&normalized).is_err() {
            return Err(XmlError::illegal_data(
                &normalized,
                "An ID must be an NCName",
            ));
        }
        return Ok(normalized.into());
    }
    Ok(value.into())
}

impl AttrRef {
    /// Create an attribute in no namespace.
    pub fn new(name: &str, value: &str) -> Result<Self, XmlError> {
        Self::with_type(name, "", value, AttributeType::Undeclared)
    }

    /// Create an attribute in `namespace_uri`.
    ///
    /// If the prefix of `name` is `xml`, `namespace_uri` may be empty.
    pub fn with_namespace(name: &str, namespace_uri: &str, value: &str) -> Result<Self, XmlError> {
        Self::with_type(name, namespace_uri, value, AttributeType::Undeclared)
    }

    /// Create an attribute with a declared type.
    ///
    /// `xml:id` is always an ID regardless of `atype`.
    ///
    /// # Errors
    /// - `IllegalName` if `name` is not a QName or is a namespace declaration.
    /// - `IllegalData` if `value` contains characters that are not allowed.
    /// - `NamespaceConflict` or `MalformedUri` if the prefix and `namespace_uri` do not fit.
    pub fn with_type(
        name: &str,
        namespace_uri: &str,
        value: &str,
        atype: AttributeType,
    ) -> Result<Self, XmlError> {
        if name == XMLNS_PREFIX || name.starts_with("xmlns:") {
            return Err(XmlError::illegal_name(
                name,
                "Namespace declarations are not attributes",
            ));
        }
        let (prefix, local_name) = validate_qname(name)?;
        let namespace_uri = if prefix == XML_PREFIX && namespace_uri.is_empty() {
            XML_XML_NAMESPACE
        } else {
            namespace_uri
        };
        check_attribute_namespace(prefix, namespace_uri)?;
        let atype = if is_xml_id(local_name, namespace_uri) {
            AttributeType::Id
        } else {
            atype
        };
        let value = prepare_value(value, atype)?;
        Ok(Self(Rc::new(RefCell::new(Attr {
            owner: None,
            local_name: local_name.into(),
            prefix: prefix.into(),
            namespace_uri: namespace_uri.into(),
            value,
            atype,
        }))))
    }

    /// Create an attribute from a value given as UTF-16 code units.
    pub fn from_utf16(name: &str, namespace_uri: &str, value: &[u16]) -> Result<Self, XmlError> {
        let value = decode_utf16_data(value)?;
        Self::with_namespace(name, namespace_uri, &value)
    }

    pub(crate) fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }

    pub(super) fn set_owner(&self, owner: Option<ElementWeakRef>) {
        self.0.borrow_mut().owner = owner;
    }

    /// Return the element this attribute belongs to.
    pub fn owner_element(&self) -> Option<ElementRef> {
        self.0.borrow().owner.as_ref().and_then(|owner| owner.upgrade())
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

    pub fn qualified_name(&self) -> String {
        let attr = self.0.borrow();
        if attr.prefix.is_empty() {
            attr.local_name.to_string()
        } else {
            format!("{}:{}", attr.prefix, attr.local_name)
        }
    }

    pub fn attribute_type(&self) -> AttributeType {
        self.0.borrow().atype
    }

    /// Change the value.
    ///
    /// If this attribute is an ID, the value is normalized and must be an NCName.
    pub fn set_value(&self, value: &str) -> Result<(), XmlError> {
        let value = prepare_value(value, self.attribute_type())?;
        self.0.borrow_mut().value = value;
        Ok(())
    }

    /// Change the type.
    ///
    /// `xml:id` stays an ID. Changing the type to ID normalizes the current value,
    /// which must then be an NCName.
    pub fn set_attribute_type(&self, atype: AttributeType) -> Result<(), XmlError> {
        if is_xml_id(&self.local_name(), &self.namespace_uri()) {
            return Ok(());
        }
        let value = prepare_value(&self.value(), atype)?;
        let mut attr = self.0.borrow_mut();
        attr.value = value;
        attr.atype = atype;
        Ok(())
    }

    /// Change the local name.
    pub fn set_local_name(&self, local_name: &str) -> Result<(), XmlError> {
        if self.namespace_prefix().is_empty() && local_name == XMLNS_PREFIX {
            return Err(XmlError::illegal_name(
                local_name,
                "Namespace declarations are not attributes",
            ));
        }
        validate_ncname(local_name)?;
        let uri = self.namespace_uri();
        self.check_owner_duplicate(local_name, &uri)?;
        self.commit_name(local_name.into(), self.namespace_prefix(), uri)
    }

    /// Change the prefix and the namespace URI together.
    ///
    /// # Errors
    /// - `NamespaceConflict` if the binding conflicts with the owner element.
    pub fn set_namespace(&self, prefix: &str, namespace_uri: &str) -> Result<(), XmlError> {
        if prefix == XMLNS_PREFIX {
            return Err(XmlError::illegal_name(
                prefix,
                "Namespace declarations are not attributes",
            ));
        }
        if !prefix.is_empty() {
            validate_ncname(prefix)?;
        }
        let namespace_uri = if prefix == XML_PREFIX && namespace_uri.is_empty() {
            XML_XML_NAMESPACE
        } else {
            namespace_uri
        };
        check_attribute_namespace(prefix, namespace_uri)?;
        let local_name = self.local_name();
        self.check_owner_duplicate(&local_name, namespace_uri)?;
        if let Some(owner) = self.owner_element() {
            if !prefix.is_empty() && prefix != XML_PREFIX {
                let conflict = owner.attributes().into_iter().any(|other| {
                    other != *self
                        && *other.namespace_prefix() == *prefix
                        && *other.namespace_uri() != *namespace_uri
                });
                let bound = if conflict {
                    None
                } else {
                    let elem = owner.0.borrow();
                    if *elem.prefix == *prefix {
                        Some(elem.namespace_uri.clone())
                    } else {
                        elem.namespaces
                            .iter()
                            .find(|(p, _)| **p == *prefix)
                            .map(|(_, uri)| uri.clone())
                    }
                };
                if conflict || bound.is_some_and(|bound| *bound != *namespace_uri) {
                    return Err(XmlError::namespace_conflict(format!(
                        "The prefix '{prefix}' is bound to another namespace on the element '{}'",
                        owner.qualified_name()
                    )));
                }
            }
        }
        self.commit_name(local_name, prefix.into(), namespace_uri.into())
    }

    fn check_owner_duplicate(&self, local_name: &str, uri: &str) -> Result<(), XmlError> {
        if let Some(owner) = self.owner_element() {
            if owner.has_other_attribute(self, local_name, uri) {
                return Err(XmlError::illegal_name(
                    local_name,
                    format!(
                        "The element '{}' already has an attribute with the same name",
                        owner.qualified_name()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn commit_name(
        &self,
        local_name: Rc<str>,
        prefix: Rc<str>,
        namespace_uri: Rc<str>,
    ) -> Result<(), XmlError> {
        let was_xml_id = is_xml_id(&self.local_name(), &self.namespace_uri());
        let atype = if is_xml_id(&local_name, &namespace_uri) {
            AttributeType::Id
        } else if was_xml_id {
            AttributeType::Undeclared
        } else {
            self.attribute_type()
        };
        let value = prepare_value(&self.value(), atype)?;
        let mut attr = self.0.borrow_mut();
        attr.local_name = local_name;
        attr.prefix = prefix;
        attr.namespace_uri = namespace_uri;
        attr.value = value;
        attr.atype = atype;
        Ok(())
    }

    /// Create a copy of this attribute that has no owner.
    pub fn copy(&self) -> AttrRef {
        let attr = self.0.borrow();
        Self(Rc::new(RefCell::new(Attr {
            owner: None,
            local_name: attr.local_name.clone(),
            prefix: attr.prefix.clone(),
            namespace_uri: attr.namespace_uri.clone(),
            value: attr.value.clone(),
            atype: attr.atype,
        })))
    }
}

impl Node for AttrRef {
    fn node_type(&self) -> NodeType {
        NodeType::Attribute
    }

    fn to_node_ref(&self) -> NodeRef {
        NodeRef::Attribute(self.clone())
    }

    fn parent(&self) -> Option<NodeRef> {
        self.owner_element().map(NodeRef::Element)
    }

    fn value(&self) -> String {
        self.0.borrow().value.to_string()
    }

    fn detach(&self) -> Result<(), XmlError> {
        if let Some(owner) = self.owner_element() {
            owner.remove_attribute(self)?;
        }
        Ok(())
    }

    fn copy_node(&self) -> NodeRef {
        NodeRef::Attribute(self.copy())
    }
}

impl PartialEq for AttrRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttrRef({}=\"{}\")", self.qualified_name(), self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::XmlErrorKind;

    #[test]
    fn namespace_declarations_are_not_attributes() {
        for name in ["xmlns", "xmlns:prefix"] {
            let err = AttrRef::new(name, "http://www.example.org/").unwrap_err();
            assert_eq!(err.kind(), XmlErrorKind::IllegalName, "{name}");
        }
        let attr = AttrRef::new("a", "v").unwrap();
        let err = attr.set_local_name("xmlns").unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalName);
        assert_eq!(&*attr.local_name(), "a");
    }

    #[test]
    fn attribute_namespace_rules() {
        let attr = AttrRef::new("xml:space", "preserve").unwrap();
        assert_eq!(&*attr.namespace_uri(), XML_XML_NAMESPACE);

        let cases = [
            ("p:a", "", XmlErrorKind::NamespaceConflict),
            ("a", "http://a.example/", XmlErrorKind::NamespaceConflict),
            ("xml:a", "http://a.example/", XmlErrorKind::NamespaceConflict),
            ("p:a", XML_XML_NAMESPACE, XmlErrorKind::NamespaceConflict),
            ("p:a", "http://a example/", XmlErrorKind::MalformedUri),
            ("p:", "http://a.example/", XmlErrorKind::IllegalName),
        ];
        for (name, uri, kind) in cases {
            let err = AttrRef::with_namespace(name, uri, "v").unwrap_err();
            assert_eq!(err.kind(), kind, "{name} {uri}");
        }
    }

    #[test]
    fn xml_id_is_normalized() {
        let attr = AttrRef::new("xml:id", "  p1  ").unwrap();
        assert_eq!(attr.attribute_type(), AttributeType::Id);
        assert_eq!(attr.value(), "p1");

        let err = attr.set_value("not an id").unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalData);
        assert_eq!(attr.value(), "p1");

        attr.set_attribute_type(AttributeType::Cdata).unwrap();
        assert_eq!(attr.attribute_type(), AttributeType::Id);

        let err = AttrRef::new("xml:id", "1st").unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalData);
    }

    #[test]
    fn id_type_change_validates_value() {
        let attr = AttrRef::new("key", " a b ").unwrap();
        let err = attr.set_attribute_type(AttributeType::Id).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalData);
        assert_eq!(attr.attribute_type(), AttributeType::Undeclared);
        assert_eq!(attr.value(), " a b ");

        attr.set_value(" ab ").unwrap();
        attr.set_attribute_type(AttributeType::Id).unwrap();
        assert_eq!(attr.value(), "ab");
    }

    #[test]
    fn unpaired_surrogates() {
        let err = AttrRef::from_utf16("a", "", &[0x61, 0xD800, 0x62]).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalData);
        assert!(err.to_string().contains("\\uD800"), "{err}");
        let err = AttrRef::from_utf16("a", "", &[0xDC00]).unwrap_err();
        assert!(err.to_string().contains("low surrogate"), "{err}");
        let attr = AttrRef::from_utf16("a", "", &[0xD83D, 0xDE00]).unwrap();
        assert_eq!(attr.value(), "\u{1F600}");
    }

    #[test]
    fn rename_checks_owner() {
        let elem = ElementRef::with_namespace("p:e", "http://p.example/").unwrap();
        let a = AttrRef::new("a", "1").unwrap();
        let b = AttrRef::new("b", "2").unwrap();
        elem.add_attribute(a.clone()).unwrap();
        elem.add_attribute(b.clone()).unwrap();
        let err = b.set_local_name("a").unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalName);
        assert_eq!(&*b.local_name(), "b");

        let err = b.set_namespace("p", "http://other.example/").unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::NamespaceConflict);
        b.set_namespace("p", "http://p.example/").unwrap();
        assert_eq!(b.qualified_name(), "p:b");

        b.set_namespace("xml", "").unwrap();
        b.set_local_name("id").unwrap_err();
        assert_eq!(&*b.local_name(), "b");
    }

    #[test]
    fn attribute_type_conversions() {
        assert_eq!(AttributeType::try_from(2).unwrap(), AttributeType::Id);
        assert!(AttributeType::try_from(42).is_err());
        assert_eq!("IDREFS".parse::<AttributeType>().unwrap(), AttributeType::IdRefs);
        assert_eq!("(a|b)".parse::<AttributeType>().unwrap(), AttributeType::Enumeration);
        assert!("STRING".parse::<AttributeType>().is_err());
        assert_eq!(AttributeType::NmTokens.to_string(), "NMTOKENS");
    }
}
