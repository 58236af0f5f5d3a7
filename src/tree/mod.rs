//! Node hierarchy of the object model.
//!
//! Every node is a reference counted handle (`XxxRef`) to a shared, interior-mutable
//! node body. Children are owned by their parent; the link from a child to its parent
//! is a weak reference. Every mutating method validates its input and re-checks the
//! namespace constraints of the affected element before committing anything, so a
//! failed call leaves the tree untouched.

mod attribute;
mod character_data;
mod document;
mod document_type;
mod element;
mod namespace;
mod node;
mod pi;

use crate::{
    chvalid::{xml_is_char, xml_is_ncname_char, xml_is_ncname_start_char},
    error::XmlError,
};

pub use attribute::{AttrRef, AttributeType};
pub use character_data::{CommentRef, TextRef};
pub use document::{DocumentRef, DocumentWeakRef};
pub use document_type::DocTypeRef;
pub use element::{ElementRef, ElementWeakRef};
pub use namespace::NamespaceNode;
pub use node::{Node, NodeRef};
pub use pi::ProcessingInstructionRef;

pub(crate) use node::{NodeKey, ParentWeakRef};

/// This is the namespace for the special xml: prefix predefined in the
/// XML Namespace specification.
pub const XML_XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
/// The namespace bound to the `xmlns` prefix.
pub const XML_NS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";
pub const XML_PREFIX: &str = "xml";
pub const XMLNS_PREFIX: &str = "xmlns";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Element = 1,
    Attribute = 2,
    Text = 3,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
    DocumentType = 10,
    Namespace = 13,
}

fn illegal_char_message(c: char, position: usize, what: &str) -> String {
    format!(
        "'{}' (U+{:04X}) is not allowed at position {position} of {what}",
        c.escape_default(),
        c as u32
    )
}

/// Check that a value conforms to the lexical space of NCName.
///
/// # Specification
/// ```text
/// [4] NCName ::= Name - (Char* ':' Char*)
/// ```
pub fn validate_ncname(value: &str) -> Result<(), XmlError> {
    // First quick algorithm for ASCII range
    if let Some(rem) = value.strip_prefix(|c: char| c.is_ascii_alphabetic() || c == '_') {
        if rem
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
        {
            return Ok(());
        }
    }

    // Second check for chars outside the ASCII range
    if value.is_empty() {
        return Err(XmlError::illegal_name(value, "An NCName must not be empty"));
    }
    for (i, c) in value.chars().enumerate() {
        let ok = if i == 0 {
            xml_is_ncname_start_char(c as u32)
        } else {
            xml_is_ncname_char(c as u32)
        };
        if !ok {
            return Err(XmlError::illegal_name(
                value,
                illegal_char_message(c, i, "an NCName"),
            ));
        }
    }
    Ok(())
}

/// Check that a value conforms to the lexical space of Name.
///
/// # Specification
/// ```text
/// [5] Name ::= NameStartChar (NameChar)*
/// ```
pub fn validate_name(value: &str) -> Result<(), XmlError> {
    if value.is_empty() {
        return Err(XmlError::illegal_name(value, "A Name must not be empty"));
    }
    for (i, c) in value.chars().enumerate() {
        let ok = c == ':'
            || if i == 0 {
                xml_is_ncname_start_char(c as u32)
            } else {
                xml_is_ncname_char(c as u32)
            };
        if !ok {
            return Err(XmlError::illegal_name(
                value,
                illegal_char_message(c, i, "a Name"),
            ));
        }
    }
    Ok(())
}

/// Check that every character of `value` matches the `Char` production.
pub fn validate_character_data(value: &str) -> Result<(), XmlError> {
    if let Some((i, c)) = value
        .chars()
        .enumerate()
        .find(|&(_, c)| !xml_is_char(c as u32))
    {
        return Err(XmlError::illegal_data(
            value,
            format!(
                "U+{:04X} is not a legal XML character (at position {i})",
                c as u32
            ),
        ));
    }
    Ok(())
}

/// Decode UTF-16 code units into a string of legal XML characters.
///
/// Unpaired surrogates are reported with the offending code unit.
pub fn decode_utf16_data(units: &[u16]) -> Result<String, XmlError> {
    let mut res = String::with_capacity(units.len());
    let mut index = 0;
    for c in char::decode_utf16(units.iter().copied()) {
        match c {
            Ok(c) => {
                res.push(c);
                index += c.len_utf16();
            }
            Err(err) => {
                let unit = err.unpaired_surrogate();
                let kind = if (0xD800..0xDC00).contains(&unit) {
                    "high"
                } else {
                    "low"
                };
                let lossy = String::from_utf16_lossy(units);
                return Err(XmlError::illegal_data(
                    &lossy,
                    format!("unpaired {kind} surrogate \\u{unit:04X} at index {index}"),
                ));
            }
        }
    }
    validate_character_data(&res)?;
    Ok(res)
}

/// Split `name` into prefix and local part.
///
/// Returns `None` if `name` has no prefix.
pub fn split_qname2(name: &str) -> Option<(&str, &str)> {
    // nasty but valid
    if name.starts_with(':') {
        return None;
    }
    name.split_once(':')
}

/// Validate a qualified name and split it into prefix and local part.
///
/// The prefix is empty if `name` has no colon.
pub(crate) fn validate_qname(name: &str) -> Result<(&str, &str), XmlError> {
    match split_qname2(name) {
        Some((prefix, local)) => {
            validate_ncname(prefix).map_err(|_| {
                XmlError::illegal_name(name, format!("'{prefix}' is not a legal prefix"))
            })?;
            validate_ncname(local).map_err(|_| {
                XmlError::illegal_name(name, format!("'{local}' is not a legal local name"))
            })?;
            Ok((prefix, local))
        }
        None => {
            validate_ncname(name)?;
            Ok(("", name))
        }
    }
}

/// Collapse sequences of white spaces into a single space and strip both ends.
pub(crate) fn collapse_white_space(value: &str) -> String {
    value
        .split([' ', '\t', '\r', '\n'])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::XmlErrorKind;

    #[test]
    fn ncname_validation() {
        const VALID: &[&str] = &["a", "_", "abc-def.ghi_0", "é", "日本語", "a\u{300}", "x\u{10000}"];
        for name in VALID {
            assert!(validate_ncname(name).is_ok(), "{name}");
        }
        const INVALID: &[&str] = &["", "1a", "-a", ".a", "a:b", ":", "a b", "a\u{0}", "\u{300}a"];
        for name in INVALID {
            let err = validate_ncname(name).unwrap_err();
            assert_eq!(err.kind(), XmlErrorKind::IllegalName, "{name}");
            assert!(err.to_string().contains(name), "{name}");
        }
    }

    #[test]
    fn name_validation() {
        for name in ["a:b", ":a", "a:", "xml:lang", "a:b:c"] {
            assert!(validate_name(name).is_ok(), "{name}");
        }
        for name in ["", "1:a", "a b", "-"] {
            assert!(validate_name(name).is_err(), "{name}");
        }
    }

    #[test]
    fn qname_splitting() {
        assert_eq!(validate_qname("a").unwrap(), ("", "a"));
        assert_eq!(validate_qname("p:a").unwrap(), ("p", "a"));
        for name in ["p:", ":a", "p:a:b", "1:a"] {
            assert!(validate_qname(name).is_err(), "{name}");
        }
    }

    #[test]
    fn character_data_validation() {
        for data in ["", "plain", "\t\r\n", "\u{D7FF}\u{E000}\u{FFFD}\u{10000}\u{10FFFF}"] {
            assert!(validate_character_data(data).is_ok(), "{data:?}");
        }
        for data in ["\u{0}", "a\u{1}b", "\u{B}", "\u{1F}", "\u{FFFE}", "\u{FFFF}"] {
            let err = validate_character_data(data).unwrap_err();
            assert_eq!(err.kind(), XmlErrorKind::IllegalData);
        }
        let err = validate_character_data("ab\u{1}").unwrap_err();
        assert!(err.to_string().contains("U+0001"), "{err}");
    }

    #[test]
    fn unpaired_surrogates() {
        let high = [0x61, 0xD800, 0x62];
        let err = decode_utf16_data(&high).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IllegalData);
        assert!(err.to_string().contains("high surrogate \\uD800"), "{err}");

        let low = [0xDC00];
        let err = decode_utf16_data(&low).unwrap_err();
        assert!(err.to_string().contains("low surrogate \\uDC00"), "{err}");

        let reversed = [0xDC00, 0xD800];
        assert!(decode_utf16_data(&reversed).is_err());

        let pair = [0xD800, 0xDC00];
        assert_eq!(decode_utf16_data(&pair).unwrap(), "\u{10000}");
    }

    #[test]
    fn white_space_collapsing() {
        assert_eq!(collapse_white_space("  a \t b\n\nc  "), "a b c");
        assert_eq!(collapse_white_space(""), "");
    }
}
