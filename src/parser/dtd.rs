//! Scanner for the document type declaration and its internal subset.
//!
//! Only the internal subset is read. External subsets and external entities are never
//! fetched.

use std::collections::HashMap;

use crate::tree::{AttributeType, collapse_white_space};

/// Content specification of an `<!ELEMENT ...>` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContentKind {
    Empty,
    Any,
    Mixed,
    Children,
}

/// Default declaration of an attribute.
///
/// # Specification
/// ```text
/// [60] DefaultDecl ::= '#REQUIRED' | '#IMPLIED' | (('#FIXED' S)? AttValue)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttributeDefault {
    Required,
    Implied,
    Fixed(String),
    Value(String),
}

impl AttributeDefault {
    pub(crate) fn value(&self) -> Option<&str> {
        match self {
            Self::Fixed(value) | Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AttributeDecl {
    pub(crate) element: String,
    pub(crate) name: String,
    pub(crate) atype: AttributeType,
    pub(crate) enumeration: Vec<String>,
    pub(crate) default: AttributeDefault,
}

#[derive(Debug, Clone)]
enum EntityDecl {
    Internal(String),
    External { unparsed: bool },
}

/// A scanning failure, located by its byte offset in the scanned text.
#[derive(Debug, Clone)]
pub(crate) struct DtdError {
    pub(crate) message: String,
    pub(crate) offset: usize,
}

/// Replacement of a general entity reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EntityReplacement<'a> {
    Text(&'a str),
    /// An external parsed entity. Its text is not available.
    External,
    /// An unparsed entity, which must not be referenced from content.
    Unparsed,
}

/// Declarations gathered from a `<!DOCTYPE ...>`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Dtd {
    pub(crate) root_name: String,
    pub(crate) public_id: Option<String>,
    pub(crate) system_id: Option<String>,
    /// Kept declarations, one per line.
    pub(crate) internal_subset: String,
    pub(crate) elements: HashMap<String, ContentKind>,
    pub(crate) attributes: Vec<AttributeDecl>,
    entities: HashMap<String, EntityDecl>,
    replacement: HashMap<String, String>,
    /// Replacement texts with white spaces replaced by `#x20`, for attribute values.
    attribute_replacement: HashMap<String, String>,
}

impl Dtd {
    /// Parse the content of a document type declaration, that is the text between
    /// `<!DOCTYPE` and the closing `>`.
    ///
    /// # Specification
    /// ```text
    /// [28] doctypedecl ::= '<!DOCTYPE' S Name (S ExternalID)? S? ('[' intSubset ']' S?)? '>'
    /// [75] ExternalID  ::= 'SYSTEM' S SystemLiteral | 'PUBLIC' S PubidLiteral S SystemLiteral
    /// ```
    pub(crate) fn parse(content: &str) -> Result<Self, DtdError> {
        let mut ctxt = DtdScanner::new(content);
        ctxt.skip_blanks();
        let Some(root_name) = ctxt.parse_name() else {
            return Err(ctxt.error("DOCTYPE: no name for the root element"));
        };
        let mut dtd = Dtd {
            root_name: root_name.to_owned(),
            ..Default::default()
        };
        ctxt.skip_blanks();
        if ctxt.content().starts_with("SYSTEM") {
            ctxt.advance(6);
            ctxt.require_blanks("SYSTEM")?;
            dtd.system_id = Some(ctxt.parse_literal()?.to_owned());
        } else if ctxt.content().starts_with("PUBLIC") {
            ctxt.advance(6);
            ctxt.require_blanks("PUBLIC")?;
            dtd.public_id = Some(normalize_public_id(ctxt.parse_literal()?));
            ctxt.require_blanks("the public ID")?;
            dtd.system_id = Some(ctxt.parse_literal()?.to_owned());
        }
        ctxt.skip_blanks();
        if ctxt.content().starts_with('[') {
            ctxt.advance(1);
            dtd.parse_internal_subset(&mut ctxt)?;
            ctxt.skip_blanks();
        }
        if !ctxt.content().is_empty() {
            return Err(ctxt.error("DOCTYPE improperly terminated"));
        }
        dtd.resolve_entities().map_err(|message| DtdError {
            message,
            offset: content.len(),
        })?;
        Ok(dtd)
    }

    /// # Specification
    /// ```text
    /// [28b] intSubset  ::= (markupdecl | DeclSep)*
    /// [29]  markupdecl ::= elementdecl | AttlistDecl | EntityDecl | NotationDecl | PI | Comment
    /// ```
    fn parse_internal_subset(&mut self, ctxt: &mut DtdScanner) -> Result<(), DtdError> {
        loop {
            ctxt.skip_blanks();
            let content = ctxt.content();
            if content.starts_with(']') {
                ctxt.advance(1);
                return Ok(());
            } else if content.is_empty() {
                return Err(ctxt.error("The internal subset is not terminated"));
            } else if content.starts_with("<!--") {
                ctxt.skip_until("-->")?;
            } else if content.starts_with("<?") {
                ctxt.skip_until("?>")?;
            } else if content.starts_with('%') {
                // Parameter entity references are not expanded.
                ctxt.advance(1);
                if ctxt.parse_name().is_none() || !ctxt.content().starts_with(';') {
                    return Err(ctxt.error("PEReference: expecting ';'"));
                }
                ctxt.advance(1);
            } else if content.starts_with("<!") {
                let start = ctxt.cur;
                let decl = ctxt.take_markup_decl()?;
                let keep = self
                    .parse_markup_decl(decl)
                    .map_err(|err| DtdError {
                        message: err.message,
                        offset: start + err.offset,
                    })?;
                if keep {
                    self.internal_subset.push_str("  ");
                    self.internal_subset.push_str(decl);
                    self.internal_subset.push('\n');
                }
            } else {
                return Err(ctxt.error("Unexpected content in the internal subset"));
            }
        }
    }

    /// Record one markup declaration.
    ///
    /// Return `false` if the declaration is not kept in the internal subset.
    fn parse_markup_decl(&mut self, decl: &str) -> Result<bool, DtdError> {
        let mut ctxt = DtdScanner::new(decl);
        ctxt.advance(2);
        if ctxt.content().starts_with("ELEMENT") {
            ctxt.advance(7);
            self.parse_element_decl(&mut ctxt)?;
            Ok(true)
        } else if ctxt.content().starts_with("ATTLIST") {
            ctxt.advance(7);
            self.parse_attribute_list_decl(&mut ctxt)?;
            Ok(true)
        } else if ctxt.content().starts_with("ENTITY") {
            ctxt.advance(6);
            self.parse_entity_decl(&mut ctxt)
        } else if ctxt.content().starts_with("NOTATION") {
            ctxt.advance(8);
            ctxt.require_blanks("'<!NOTATION'")?;
            if ctxt.parse_name().is_none() {
                return Err(ctxt.error("NOTATION: Name expected here"));
            }
            Ok(true)
        } else {
            Err(ctxt.error("Unknown markup declaration"))
        }
    }

    /// # Specification
    /// ```text
    /// [45] elementdecl ::= '<!ELEMENT' S Name S contentspec S? '>'
    /// [46] contentspec ::= 'EMPTY' | 'ANY' | Mixed | children
    /// ```
    fn parse_element_decl(&mut self, ctxt: &mut DtdScanner) -> Result<(), DtdError> {
        ctxt.require_blanks("'<!ELEMENT'")?;
        let Some(name) = ctxt.parse_name() else {
            return Err(ctxt.error("ELEMENT: no name for the element"));
        };
        ctxt.require_blanks("the element name")?;
        let spec = ctxt.content();
        let kind = if spec.starts_with("EMPTY") {
            ContentKind::Empty
        } else if spec.starts_with("ANY") {
            ContentKind::Any
        } else if let Some(model) = spec.strip_prefix('(') {
            if model.trim_start().starts_with("#PCDATA") {
                ContentKind::Mixed
            } else {
                ContentKind::Children
            }
        } else {
            return Err(ctxt.error("ELEMENT: 'EMPTY', 'ANY' or '(' expected"));
        };
        self.elements.entry(name.to_owned()).or_insert(kind);
        Ok(())
    }

    /// # Specification
    /// ```text
    /// [52] AttlistDecl ::= '<!ATTLIST' S Name AttDef* S? '>'
    /// [53] AttDef      ::= S Name S AttType S DefaultDecl
    /// ```
    fn parse_attribute_list_decl(&mut self, ctxt: &mut DtdScanner) -> Result<(), DtdError> {
        ctxt.require_blanks("'<!ATTLIST'")?;
        let Some(elem_name) = ctxt.parse_name() else {
            return Err(ctxt.error("ATTLIST: no name for Element"));
        };
        loop {
            ctxt.skip_blanks();
            if ctxt.content().starts_with('>') {
                return Ok(());
            }
            let Some(attr_name) = ctxt.parse_name() else {
                return Err(ctxt.error("ATTLIST: no name for Attribute"));
            };
            ctxt.require_blanks("the attribute name")?;
            let (atype, enumeration) = parse_attribute_type(ctxt)?;
            ctxt.require_blanks("the attribute type")?;
            let default = parse_default_decl(ctxt)?;
            // The first declaration is binding.
            if !self
                .attributes
                .iter()
                .any(|decl| decl.element == elem_name && decl.name == attr_name)
            {
                self.attributes.push(AttributeDecl {
                    element: elem_name.to_owned(),
                    name: attr_name.to_owned(),
                    atype,
                    enumeration,
                    default,
                });
            }
        }
    }

    /// Parse an entity declaration.
    ///
    /// Return `false` for parameter entities, which are not kept.
    ///
    /// # Specification
    /// ```text
    /// [70] EntityDecl ::= GEDecl | PEDecl
    /// [71] GEDecl     ::= '<!ENTITY' S Name S EntityDef S? '>'
    /// [72] PEDecl     ::= '<!ENTITY' S '%' S Name S PEDef S? '>'
    /// [73] EntityDef  ::= EntityValue | (ExternalID NDataDecl?)
    /// [76] NDataDecl  ::= S 'NDATA' S Name
    /// ```
    fn parse_entity_decl(&mut self, ctxt: &mut DtdScanner) -> Result<bool, DtdError> {
        ctxt.require_blanks("'<!ENTITY'")?;
        let parameter = ctxt.content().starts_with('%');
        if parameter {
            ctxt.advance(1);
            ctxt.require_blanks("'%'")?;
        }
        let Some(name) = ctxt.parse_name() else {
            return Err(ctxt.error("ENTITY: no name for the entity"));
        };
        ctxt.require_blanks("the entity name")?;
        let decl = if ctxt.content().starts_with(['"', '\'']) {
            EntityDecl::Internal(ctxt.parse_literal()?.to_owned())
        } else {
            if ctxt.content().starts_with("SYSTEM") {
                ctxt.advance(6);
                ctxt.require_blanks("SYSTEM")?;
                ctxt.parse_literal()?;
            } else if ctxt.content().starts_with("PUBLIC") {
                ctxt.advance(6);
                ctxt.require_blanks("PUBLIC")?;
                ctxt.parse_literal()?;
                ctxt.require_blanks("the public ID")?;
                ctxt.parse_literal()?;
            } else {
                return Err(ctxt.error("ENTITY: an entity value or an external ID is expected"));
            }
            let had_blanks = ctxt.skip_blanks() > 0;
            let unparsed = had_blanks && ctxt.content().starts_with("NDATA");
            if unparsed {
                ctxt.advance(5);
                ctxt.require_blanks("NDATA")?;
                if ctxt.parse_name().is_none() {
                    return Err(ctxt.error("ENTITY: notation name expected after NDATA"));
                }
            }
            EntityDecl::External { unparsed }
        };
        if parameter {
            return Ok(false);
        }
        self.entities.entry(name.to_owned()).or_insert(decl);
        Ok(true)
    }

    /// Compute the replacement text of every internal general entity.
    ///
    /// Character references are expanded first, then references to other entities.
    fn resolve_entities(&mut self) -> Result<(), String> {
        let names = self
            .entities
            .iter()
            .filter(|(_, decl)| matches!(decl, EntityDecl::Internal(_)))
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        for name in names {
            let mut stack = vec![];
            self.resolve_entity(&name, &mut stack)?;
        }
        self.attribute_replacement = self
            .replacement
            .iter()
            .map(|(name, text)| (name.clone(), text.replace(['\t', '\n', '\r'], " ")))
            .collect();
        Ok(())
    }

    fn resolve_entity(&mut self, name: &str, stack: &mut Vec<String>) -> Result<String, String> {
        if let Some(text) = self.replacement.get(name) {
            return Ok(text.clone());
        }
        if stack.iter().any(|n| n == name) {
            return Err(format!("Entity '{name}' references itself"));
        }
        let literal = match self.entities.get(name) {
            Some(EntityDecl::Internal(literal)) => expand_char_refs(literal)?,
            Some(EntityDecl::External { unparsed: false }) => return Ok(String::new()),
            Some(EntityDecl::External { unparsed: true }) => {
                return Err(format!("Unparsed entity '{name}' cannot be referenced"));
            }
            None => {
                return predefined_entity(name)
                    .map(|text| text.to_owned())
                    .ok_or_else(|| format!("Entity '{name}' not defined"));
            }
        };
        stack.push(name.to_owned());
        let mut text = String::with_capacity(literal.len());
        let mut rest = literal.as_str();
        while let Some(pos) = rest.find('&') {
            text.push_str(&rest[..pos]);
            rest = &rest[pos + 1..];
            let Some(end) = rest.find(';') else {
                return Err(format!("Entity '{name}': EntityRef: expecting ';'"));
            };
            let reference = &rest[..end];
            rest = &rest[end + 1..];
            if let Some(c) = parse_char_ref(reference)? {
                text.push(c);
            } else if let Some(predefined) = predefined_entity(reference) {
                text.push_str(predefined);
            } else {
                text.push_str(&self.resolve_entity(reference, stack)?);
            }
        }
        text.push_str(rest);
        stack.pop();
        self.replacement.insert(name.to_owned(), text.clone());
        Ok(text)
    }

    /// Look up the replacement of the general entity `name`.
    ///
    /// Return `None` if no entity named `name` is declared.
    pub(crate) fn entity(&self, name: &str) -> Option<EntityReplacement<'_>> {
        match self.entities.get(name)? {
            EntityDecl::Internal(_) => self
                .replacement
                .get(name)
                .map(|text| EntityReplacement::Text(text)),
            EntityDecl::External { unparsed: false } => Some(EntityReplacement::External),
            EntityDecl::External { unparsed: true } => Some(EntityReplacement::Unparsed),
        }
    }

    /// Look up the replacement of the general entity `name` referenced from an
    /// attribute value.
    ///
    /// # Specification
    /// [3.3.3 Attribute-Value Normalization](https://www.w3.org/TR/xml/#AVNormalize)
    pub(crate) fn attribute_entity(&self, name: &str) -> Option<EntityReplacement<'_>> {
        match self.entities.get(name)? {
            EntityDecl::Internal(_) => self
                .attribute_replacement
                .get(name)
                .map(|text| EntityReplacement::Text(text)),
            _ => self.entity(name),
        }
    }

    /// Check if `name` is declared as an unparsed entity.
    pub(crate) fn is_unparsed_entity(&self, name: &str) -> bool {
        matches!(
            self.entities.get(name),
            Some(EntityDecl::External { unparsed: true })
        )
    }

    /// Return the declaration of the attribute `name` of the element `element`.
    pub(crate) fn attribute_decl(&self, element: &str, name: &str) -> Option<&AttributeDecl> {
        self.attributes
            .iter()
            .find(|decl| decl.element == element && decl.name == name)
    }

    /// Iterate the attribute declarations of the element `element`.
    pub(crate) fn attribute_decls<'a>(
        &'a self,
        element: &'a str,
    ) -> impl Iterator<Item = &'a AttributeDecl> + 'a {
        self.attributes
            .iter()
            .filter(move |decl| decl.element == element)
    }

    /// Check if white space directly inside `element` is ignorable.
    pub(crate) fn has_element_content(&self, element: &str) -> bool {
        self.elements.get(element) == Some(&ContentKind::Children)
    }
}

/// # Specification
/// ```text
/// [54] AttType         ::= StringType | TokenizedType | EnumeratedType
/// [57] EnumeratedType  ::= NotationType | Enumeration
/// [58] NotationType    ::= 'NOTATION' S '(' S? Name (S? '|' S? Name)* S? ')'
/// [59] Enumeration     ::= '(' S? Nmtoken (S? '|' S? Nmtoken)* S? ')'
/// ```
fn parse_attribute_type(
    ctxt: &mut DtdScanner,
) -> Result<(AttributeType, Vec<String>), DtdError> {
    if ctxt.content().starts_with('(') {
        return Ok((AttributeType::Enumeration, parse_enumeration(ctxt)?));
    }
    if ctxt.content().starts_with("NOTATION") {
        ctxt.advance(8);
        ctxt.require_blanks("'NOTATION'")?;
        if !ctxt.content().starts_with('(') {
            return Err(ctxt.error("'(' required to start 'NOTATION'"));
        }
        return Ok((AttributeType::Notation, parse_enumeration(ctxt)?));
    }
    let Some(keyword) = ctxt.parse_name() else {
        return Err(ctxt.error("ATTLIST: attribute type expected"));
    };
    match keyword.parse::<AttributeType>() {
        Ok(atype) => Ok((atype, vec![])),
        Err(err) => Err(ctxt.error(err.to_string())),
    }
}

fn parse_enumeration(ctxt: &mut DtdScanner) -> Result<Vec<String>, DtdError> {
    let Some(end) = ctxt.content().find(')') else {
        return Err(ctxt.error("AttributeType: ')' required"));
    };
    let list = &ctxt.content()[1..end];
    let values = list
        .split('|')
        .map(|token| token.trim_matches([' ', '\t', '\n', '\r']).to_owned())
        .collect::<Vec<_>>();
    if values.iter().any(|v| v.is_empty()) {
        return Err(ctxt.error("AttributeType: empty enumeration value"));
    }
    ctxt.advance(end + 1);
    Ok(values)
}

fn parse_default_decl(ctxt: &mut DtdScanner) -> Result<AttributeDefault, DtdError> {
    if ctxt.content().starts_with("#REQUIRED") {
        ctxt.advance(9);
        return Ok(AttributeDefault::Required);
    }
    if ctxt.content().starts_with("#IMPLIED") {
        ctxt.advance(8);
        return Ok(AttributeDefault::Implied);
    }
    if ctxt.content().starts_with("#FIXED") {
        ctxt.advance(6);
        ctxt.require_blanks("'#FIXED'")?;
        return Ok(AttributeDefault::Fixed(ctxt.parse_literal()?.to_owned()));
    }
    Ok(AttributeDefault::Value(ctxt.parse_literal()?.to_owned()))
}

struct DtdScanner<'a> {
    src: &'a str,
    cur: usize,
}

impl<'a> DtdScanner<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, cur: 0 }
    }

    fn content(&self) -> &'a str {
        &self.src[self.cur..]
    }

    fn advance(&mut self, len: usize) {
        self.cur = (self.cur + len).min(self.src.len());
    }

    fn error(&self, message: impl Into<String>) -> DtdError {
        DtdError {
            message: message.into(),
            offset: self.cur,
        }
    }

    fn skip_blanks(&mut self) -> usize {
        let content = self.content();
        let len = content.len() - content.trim_start_matches([' ', '\t', '\n', '\r']).len();
        self.advance(len);
        len
    }

    fn require_blanks(&mut self, after: &str) -> Result<(), DtdError> {
        if self.skip_blanks() == 0 {
            return Err(self.error(format!("Space required after {after}")));
        }
        Ok(())
    }

    fn parse_name(&mut self) -> Option<&'a str> {
        let content = self.content();
        let len = content
            .find(|c: char| {
                matches!(
                    c,
                    ' ' | '\t' | '\n' | '\r' | '>' | '[' | ']' | '"' | '\'' | '%' | ';' | '('
                        | ')' | '|' | ','
                )
            })
            .unwrap_or(content.len());
        if len == 0 {
            return None;
        }
        self.advance(len);
        Some(&content[..len])
    }

    fn parse_literal(&mut self) -> Result<&'a str, DtdError> {
        let content = self.content();
        let Some(quote) = content.chars().next().filter(|&c| c == '"' || c == '\'') else {
            return Err(self.error("String not started expecting ' or \""));
        };
        let Some(end) = content[1..].find(quote) else {
            return Err(self.error("String not closed"));
        };
        self.advance(end + 2);
        Ok(&content[1..end + 1])
    }

    fn skip_until(&mut self, end: &str) -> Result<(), DtdError> {
        match self.content().find(end) {
            Some(pos) => {
                self.advance(pos + end.len());
                Ok(())
            }
            None => Err(self.error(format!("'{end}' expected"))),
        }
    }

    /// Consume one `<!...>` declaration and return it.
    ///
    /// A `>` inside a quoted literal does not end the declaration.
    fn take_markup_decl(&mut self) -> Result<&'a str, DtdError> {
        let content = self.content();
        let mut quote = None;
        for (i, c) in content.char_indices() {
            match (quote, c) {
                (None, '"' | '\'') => quote = Some(c),
                (Some(q), c) if q == c => quote = None,
                (None, '>') => {
                    self.advance(i + 1);
                    return Ok(&content[..=i]);
                }
                _ => {}
            }
        }
        Err(self.error("Markup declaration is not terminated"))
    }
}

/// Normalize a public ID literal.
///
/// Runs of white spaces become a single space, and both ends are stripped.
fn normalize_public_id(literal: &str) -> String {
    collapse_white_space(literal)
}

pub(crate) fn predefined_entity(name: &str) -> Option<&'static str> {
    match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    }
}

/// Parse the body of a character reference, `#N` or `#xN`.
///
/// Return `None` if `reference` is not a character reference.
fn parse_char_ref(reference: &str) -> Result<Option<char>, String> {
    let Some(num) = reference.strip_prefix('#') else {
        return Ok(None);
    };
    let code = match num.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => num.parse::<u32>(),
    }
    .map_err(|_| format!("Invalid character reference '&{reference};'"))?;
    char::from_u32(code)
        .filter(|&c| crate::chvalid::xml_is_char(c as u32))
        .map(Some)
        .ok_or_else(|| format!("xmlParseCharRef: invalid xmlChar value {code}"))
}

/// Expand the character references of an entity value, keeping entity references.
fn expand_char_refs(literal: &str) -> Result<String, String> {
    let mut res = String::with_capacity(literal.len());
    let mut rest = literal;
    while let Some(pos) = rest.find("&#") {
        res.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];
        let Some(end) = rest.find(';') else {
            return Err("CharRef: invalid decimal value".to_owned());
        };
        if let Some(c) = parse_char_ref(&rest[..end])? {
            res.push(c);
        }
        rest = &rest[end + 1..];
    }
    res.push_str(rest);
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_identifiers() {
        let dtd = Dtd::parse(" doc").unwrap();
        assert_eq!(dtd.root_name, "doc");
        assert_eq!(dtd.system_id, None);

        let dtd = Dtd::parse(" doc SYSTEM 'doc.dtd'").unwrap();
        assert_eq!(dtd.system_id.as_deref(), Some("doc.dtd"));

        let dtd = Dtd::parse(" doc PUBLIC \"-//A//B  C//EN\"\n\"http://x/doc.dtd\" ").unwrap();
        assert_eq!(dtd.public_id.as_deref(), Some("-//A//B C//EN"));
        assert_eq!(dtd.system_id.as_deref(), Some("http://x/doc.dtd"));

        for content in ["", " doc PUBLIC 'a'", " doc SYSTEM", " doc [", " doc junk"] {
            assert!(Dtd::parse(content).is_err(), "{content:?}");
        }
    }

    #[test]
    fn internal_subset_is_captured_without_parameter_entities() {
        let dtd = Dtd::parse(
            r#" doc [
  <!-- a comment -->
  <!ENTITY % pe "<!ELEMENT x ANY>">
  %pe;
  <!ELEMENT doc (e1, e2)>
  <!ATTLIST e1 attr CDATA "a > b">
  <?pi data?>
]"#,
        )
        .unwrap();
        assert_eq!(
            dtd.internal_subset,
            "  <!ELEMENT doc (e1, e2)>\n  <!ATTLIST e1 attr CDATA \"a > b\">\n"
        );
        assert!(dtd.has_element_content("doc"));
        assert!(!dtd.has_element_content("e1"));
    }

    #[test]
    fn attribute_declarations() {
        let dtd = Dtd::parse(
            r#" doc [
  <!ATTLIST doc
      id ID #IMPLIED
      kind (a | b|c) "b"
      ref IDREF #REQUIRED
      version CDATA #FIXED "1.0"
      note NOTATION (gif) #IMPLIED>
  <!ATTLIST doc id CDATA "ignored">
]"#,
        )
        .unwrap();
        let id = dtd.attribute_decl("doc", "id").unwrap();
        assert_eq!(id.atype, AttributeType::Id);
        assert_eq!(id.default, AttributeDefault::Implied);
        let kind = dtd.attribute_decl("doc", "kind").unwrap();
        assert_eq!(kind.atype, AttributeType::Enumeration);
        assert_eq!(kind.enumeration, ["a", "b", "c"]);
        assert_eq!(kind.default.value(), Some("b"));
        let version = dtd.attribute_decl("doc", "version").unwrap();
        assert_eq!(version.default, AttributeDefault::Fixed("1.0".to_owned()));
        assert_eq!(
            dtd.attribute_decl("doc", "note").unwrap().atype,
            AttributeType::Notation
        );
        assert_eq!(dtd.attribute_decls("doc").count(), 5);

        assert!(Dtd::parse(" doc [<!ATTLIST doc a BOGUS #IMPLIED>]").is_err());
    }

    #[test]
    fn entity_replacement_text() {
        let dtd = Dtd::parse(
            r#" doc [
  <!ENTITY name "World">
  <!ENTITY greeting "Hello, &name;&#33;">
  <!ENTITY amp2 "&#38;#38;">
  <!ENTITY ext SYSTEM "ext.xml">
  <!ENTITY pic SYSTEM "pic.gif" NDATA gif>
  <!ENTITY name "ignored">
]"#,
        )
        .unwrap();
        assert_eq!(
            dtd.entity("greeting"),
            Some(EntityReplacement::Text("Hello, World!"))
        );
        assert_eq!(dtd.entity("amp2"), Some(EntityReplacement::Text("&")));
        assert_eq!(dtd.entity("ext"), Some(EntityReplacement::External));
        assert_eq!(dtd.entity("pic"), Some(EntityReplacement::Unparsed));
        assert!(dtd.is_unparsed_entity("pic"));
        assert_eq!(dtd.entity("undeclared"), None);
    }

    #[test]
    fn recursive_entities_are_rejected() {
        let err = Dtd::parse(" doc [<!ENTITY a \"&b;\"><!ENTITY b \"&a;\">]").unwrap_err();
        assert!(err.message.contains("references itself"), "{}", err.message);
        let err = Dtd::parse(" doc [<!ENTITY a \"&missing;\">]").unwrap_err();
        assert!(err.message.contains("missing"), "{}", err.message);
    }
}
