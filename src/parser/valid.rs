//! DTD validity checks over a built document.
//!
//! Only the checks that need no content model automaton are performed: the root
//! element name, declared elements and attributes, required and fixed attributes,
//! attribute value syntax, ID uniqueness and IDREF(S) and ENTITY resolution.

use std::collections::{HashMap, HashSet};

use crate::{
    chvalid::xml_is_ncname_char,
    error::{ValidityErrors, ValidityIssue, XmlError, XmlErrorLevel, report_diagnostic},
    tree::{AttributeType, DocumentRef, ElementRef, Node, NodeKey, NodeRef, validate_name},
};

use super::dtd::{AttributeDefault, ContentKind, Dtd};

pub(crate) type Positions = HashMap<NodeKey, (usize, usize)>;

struct ValidCtxt<'a> {
    dtd: &'a Dtd,
    positions: &'a Positions,
    issues: Vec<ValidityIssue>,
    ids: HashSet<String>,
    /// Referenced IDs, with the referencing attribute and the position of its element.
    refs: Vec<(String, String, (usize, usize))>,
}

impl ValidCtxt<'_> {
    fn error(&mut self, position: (usize, usize), message: String) {
        self.issues.push(ValidityIssue {
            message,
            line: position.0,
            column: position.1,
        });
    }

    fn position(&self, elem: &ElementRef) -> (usize, usize) {
        self.positions
            .get(&NodeRef::Element(elem.clone()).key())
            .copied()
            .unwrap_or_default()
    }

    /// Validate the root element name.
    ///
    /// `[ VC: Root Element Type ]`
    /// The Name in the document type declaration must match the element type of the
    /// root element.
    fn validate_root(&mut self, root: &ElementRef) {
        let name = root.qualified_name();
        if name != self.dtd.root_name {
            let pos = self.position(root);
            self.error(
                pos,
                format!(
                    "root and DTD name do not match '{name}' and '{}'",
                    self.dtd.root_name
                ),
            );
        }
    }

    fn validate_element(&mut self, elem: &ElementRef) {
        let pos = self.position(elem);
        let name = elem.qualified_name();
        let declared = !self.dtd.elements.is_empty();
        match self.dtd.elements.get(&name) {
            None if declared => self.error(pos, format!("No declaration for element {name}")),
            Some(ContentKind::Empty) if elem.child_count() > 0 => self.error(
                pos,
                format!("Element {name} was declared EMPTY this one has content"),
            ),
            Some(ContentKind::Children) => {
                let has_data = elem.children().iter().any(|child| {
                    matches!(child, NodeRef::Text(text)
                        if !text.value().bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r')))
                });
                if has_data {
                    self.error(
                        pos,
                        format!("Element {name} is not declared to contain character data"),
                    );
                }
            }
            _ => {}
        }

        for attr in elem.attributes() {
            let attr_name = attr.qualified_name();
            let Some(decl) = self.dtd.attribute_decl(&name, &attr_name) else {
                if declared {
                    self.error(
                        pos,
                        format!("No declaration for attribute {attr_name} of element {name}"),
                    );
                }
                continue;
            };
            let value = attr.value();
            if let AttributeDefault::Fixed(fixed) = &decl.default {
                if *fixed != value {
                    self.error(
                        pos,
                        format!(
                            "Value for attribute {attr_name} of {name} is different from default \"{fixed}\""
                        ),
                    );
                }
            }
            if !validate_attribute_value(decl.atype, &value) {
                self.error(
                    pos,
                    format!(
                        "Syntax of value for attribute {attr_name} of {name} is not valid"
                    ),
                );
                continue;
            }
            match decl.atype {
                AttributeType::Enumeration | AttributeType::Notation
                    if !decl.enumeration.contains(&value) =>
                {
                    self.error(
                        pos,
                        format!(
                            "Value \"{value}\" for attribute {attr_name} of {name} is not among the enumerated set"
                        ),
                    );
                }
                AttributeType::Id => {
                    if !self.ids.insert(value.clone()) {
                        self.error(pos, format!("ID {value} already defined"));
                    }
                }
                AttributeType::IdRef | AttributeType::IdRefs => {
                    for id in value.split(' ').filter(|s| !s.is_empty()) {
                        self.refs.push((id.to_owned(), attr_name.clone(), pos));
                    }
                }
                AttributeType::Entity | AttributeType::Entities => {
                    for entity in value.split(' ').filter(|s| !s.is_empty()) {
                        if !self.dtd.is_unparsed_entity(entity) {
                            self.error(
                                pos,
                                format!(
                                    "ENTITY attribute {attr_name} reference an unknown entity \"{entity}\""
                                ),
                            );
                        }
                    }
                }
                _ => {}
            }
        }

        let missing = self
            .dtd
            .attribute_decls(&name)
            .filter(|decl| decl.default == AttributeDefault::Required)
            .filter(|decl| elem.attributes().iter().all(|a| a.qualified_name() != decl.name))
            .map(|decl| decl.name.clone())
            .collect::<Vec<_>>();
        for attr_name in missing {
            self.error(
                pos,
                format!("Element {name} does not carry attribute {attr_name}"),
            );
        }

        for child in elem.child_elements() {
            self.validate_element(&child);
        }
    }

    /// `[ VC: IDREF ]`
    /// Each IDREF Name must match the value of an ID attribute on some element in
    /// the XML document.
    fn validate_refs(&mut self) {
        for (id, attr_name, pos) in std::mem::take(&mut self.refs) {
            if !self.ids.contains(&id) {
                self.error(
                    pos,
                    format!("IDREF attribute {attr_name} references an unknown ID \"{id}\""),
                );
            }
        }
    }
}

fn is_nmtoken(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c == ':' || xml_is_ncname_char(c as u32))
}

/// Check that `value` matches the production of `atype`.
///
/// `[ VC: ID ]`, `[ VC: IDREF ]`, `[ VC: Entity Name ]`, `[ VC: Name Token ]`
pub(crate) fn validate_attribute_value(atype: AttributeType, value: &str) -> bool {
    match atype {
        AttributeType::Id
        | AttributeType::IdRef
        | AttributeType::Entity
        | AttributeType::Notation => validate_name(value).is_ok(),
        AttributeType::IdRefs | AttributeType::Entities => {
            !value.is_empty() && value.split(' ').all(|name| validate_name(name).is_ok())
        }
        AttributeType::NmToken | AttributeType::Enumeration => is_nmtoken(value),
        AttributeType::NmTokens => {
            !value.is_empty() && value.split(' ').all(is_nmtoken)
        }
        AttributeType::Cdata | AttributeType::Undeclared => true,
    }
}

/// Validate `doc` against `dtd`.
///
/// `issues` are problems already found while building. Every issue is reported
/// through the diagnostic handlers before the error is returned.
///
/// # Errors
/// - `Validity` carrying every issue if any issue is found.
pub(crate) fn validate_document(
    doc: &DocumentRef,
    dtd: Option<&Dtd>,
    positions: &Positions,
    mut issues: Vec<ValidityIssue>,
) -> Result<(), XmlError> {
    match dtd {
        Some(dtd) => {
            let mut ctxt = ValidCtxt {
                dtd,
                positions,
                issues,
                ids: HashSet::new(),
                refs: vec![],
            };
            let root = doc.root_element();
            ctxt.validate_root(&root);
            ctxt.validate_element(&root);
            ctxt.validate_refs();
            issues = ctxt.issues;
        }
        None => issues.push(ValidityIssue {
            message: "Validation failed: no DTD found !".to_owned(),
            line: 1,
            column: 1,
        }),
    }
    if issues.is_empty() {
        return Ok(());
    }
    issues.sort_by_key(|issue| (issue.line, issue.column));
    for issue in &issues {
        report_diagnostic(
            XmlErrorLevel::Error,
            XmlError::Validity(Box::new(ValidityErrors {
                errors: vec![issue.clone()],
            })),
        );
    }
    Err(XmlError::Validity(Box::new(ValidityErrors { errors: issues })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_value_syntax() {
        const CASES: &[(AttributeType, &str, bool)] = &[
            (AttributeType::Id, "a1", true),
            (AttributeType::Id, "1a", false),
            (AttributeType::IdRefs, "a b c", true),
            (AttributeType::IdRefs, "", false),
            (AttributeType::NmToken, "1a", true),
            (AttributeType::NmToken, "a b", false),
            (AttributeType::NmTokens, "1a 2b", true),
            (AttributeType::Entity, "pic", true),
            (AttributeType::Cdata, "any thing <>", true),
        ];
        for &(atype, value, valid) in CASES {
            assert_eq!(
                validate_attribute_value(atype, value),
                valid,
                "{atype}: {value:?}"
            );
        }
    }
}
