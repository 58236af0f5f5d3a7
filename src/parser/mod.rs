//! Build trees from XML text.
//!
//! [`quick_xml`] tokenizes the input. This module adds what the object model needs on
//! top of it: namespace processing, line-ending and attribute-value normalization,
//! the internal subset of the document type declaration (general entities, attribute
//! types and defaults), encoding detection for byte input, and optional DTD validation.
//! Nodes are created through a [`NodeFactory`].
//!
//! ```
//! use exom::{parser::parse_str, tree::Node};
//!
//! let doc = parse_str(r#"<p:root xmlns:p="http://example.com/"><a>text</a></p:root>"#).unwrap();
//! let root = doc.root_element();
//! assert_eq!(&*root.namespace_uri(), "http://example.com/");
//! assert_eq!(root.value(), "text");
//! ```

mod builder;
mod dtd;
mod valid;

use std::{borrow::Cow, collections::HashSet, path::Path};

use quick_xml::{
    Reader,
    escape::{resolve_predefined_entity, unescape_with},
    events::{BytesPI, BytesStart, BytesText, Event},
};

use crate::{
    encoding::{EncodingError, XmlCharEncoding, detect_encoding},
    error::{ValidityIssue, XmlError, XmlErrorLevel, report_diagnostic},
    tree::{
        AttributeType, DocumentRef, NodeRef, XML_PREFIX, XML_XML_NAMESPACE, XMLNS_PREFIX,
        split_qname2, validate_character_data, validate_name,
        validate_ncname, validate_qname,
    },
    uri::file_uri_from_path,
};

pub use builder::{DefaultNodeFactory, NodeFactory, TreeBuilder};

use dtd::{Dtd, EntityReplacement};
use valid::{Positions, validate_document};

/// Options of [`Parser`].
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    base_uri: Option<String>,
    validate: bool,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URI of built documents.
    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    /// Validate built documents against their DTD.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    pub fn validate(&self) -> bool {
        self.validate
    }
}

/// A reusable parser.
pub struct Parser<'f> {
    options: ParseOptions,
    factory: Box<dyn NodeFactory + 'f>,
    invalid_document: Option<DocumentRef>,
}

impl Default for Parser<'static> {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}

impl Parser<'static> {
    /// Create a parser that builds every node with [`DefaultNodeFactory`].
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            factory: Box::new(DefaultNodeFactory),
            invalid_document: None,
        }
    }
}

impl<'f> Parser<'f> {
    /// Create a parser that builds nodes through `factory`.
    pub fn with_factory(options: ParseOptions, factory: impl NodeFactory + 'f) -> Self {
        Self {
            options,
            factory: Box::new(factory),
            invalid_document: None,
        }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Take the document built by the last parse if that parse failed with `Validity`.
    ///
    /// The document is well-formed but not valid against its DTD.
    pub fn take_invalid_document(&mut self) -> Option<DocumentRef> {
        self.invalid_document.take()
    }

    /// Parse a document held in a string.
    ///
    /// An encoding declaration in the text is ignored.
    ///
    /// # Errors
    /// - `Parsing` if the text is not a namespace well-formed document.
    /// - `Validity` if validation is enabled and the document is not valid. The built
    ///   document is kept for [`Parser::take_invalid_document`].
    /// - Any error returned by the node factory.
    pub fn parse_str(&mut self, src: &str) -> Result<DocumentRef, XmlError> {
        let base_uri = self.options.base_uri.clone();
        self.parse_text(src, base_uri.as_deref())
    }

    /// Parse a document held in bytes.
    ///
    /// The encoding is detected from the byte order mark, then from the encoding
    /// declaration. UTF-8 is assumed otherwise.
    pub fn parse_bytes(&mut self, src: &[u8]) -> Result<DocumentRef, XmlError> {
        let base_uri = self.options.base_uri.clone();
        let text = decode_input(src)?;
        self.parse_text(&text, base_uri.as_deref())
    }

    /// Parse a document stored in a file.
    ///
    /// If no base URI is set in the options, the `file` URI of `path` is used.
    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> Result<DocumentRef, XmlError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let base_uri = self
            .options
            .base_uri
            .clone()
            .or_else(|| file_uri_from_path(path));
        let text = decode_input(&bytes)?;
        self.parse_text(&text, base_uri.as_deref())
    }

    fn parse_text(&mut self, src: &str, base_uri: Option<&str>) -> Result<DocumentRef, XmlError> {
        self.invalid_document = None;
        let src = src.strip_prefix('\u{FEFF}').unwrap_or(src);
        let src = normalize_line_endings(src);
        let mut builder = TreeBuilder::new(&mut *self.factory);
        builder.set_base_uri(base_uri);
        let ctxt = XmlParserCtxt::new(&src, builder, self.options.validate);
        let (doc, validity) = ctxt.parse_document()?;
        if let Err(err) = validity {
            self.invalid_document = Some(doc);
            return Err(err);
        }
        Ok(doc)
    }
}

/// Parse a document held in a string with the default options.
pub fn parse_str(src: &str) -> Result<DocumentRef, XmlError> {
    Parser::default().parse_str(src)
}

/// Parse a document held in bytes with the default options.
pub fn parse_bytes(src: &[u8]) -> Result<DocumentRef, XmlError> {
    Parser::default().parse_bytes(src)
}

/// Parse a document stored in a file with the default options.
pub fn parse_file(path: impl AsRef<Path>) -> Result<DocumentRef, XmlError> {
    Parser::default().parse_file(path)
}

/// Replace `\r\n` and lone `\r` with `\n`.
///
/// # Specification
/// [2.11 End-of-Line Handling](https://www.w3.org/TR/xml/#sec-line-ends)
fn normalize_line_endings(src: &str) -> Cow<'_, str> {
    if !src.contains('\r') {
        return Cow::Borrowed(src);
    }
    Cow::Owned(src.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Strip leading and trailing spaces, and replace runs of spaces with one space.
///
/// Only `#x20` is a space here. Other white spaces come from character references.
fn collapse_spaces(value: &str) -> String {
    value
        .split(' ')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract the label of the encoding declaration of an ASCII compatible input.
fn declared_encoding(src: &[u8]) -> Option<&str> {
    let head = src.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(src);
    let head = head.strip_prefix(b"<?xml")?;
    let end = head.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&head[..end]).ok()?;
    let rest = &decl[decl.find("encoding")? + 8..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|&c| c == '"' || c == '\'')?;
    let rest = &rest[1..];
    Some(&rest[..rest.find(quote)?])
}

fn decode_input(src: &[u8]) -> Result<Cow<'_, str>, XmlError> {
    let encoding = match detect_encoding(src) {
        Some(
            enc @ (XmlCharEncoding::UTF16 | XmlCharEncoding::UTF16LE | XmlCharEncoding::UTF16BE),
        ) => enc,
        _ => match declared_encoding(src) {
            Some(label) => label.parse::<XmlCharEncoding>().map_err(|err| XmlError::Parsing {
                message: format!("Unsupported encoding {label}: {err}"),
                line: 1,
                column: 1,
            })?,
            None => XmlCharEncoding::UTF8,
        },
    };
    encoding.decode(src).map_err(|err| {
        let (line, column) = match err {
            EncodingError::Malformed { offset } => {
                let head = &src[..offset.min(src.len())];
                let line = head.iter().filter(|&&b| b == b'\n').count() + 1;
                let column = head.len() - head.iter().rposition(|&b| b == b'\n').map_or(0, |p| p + 1) + 1;
                (line, column)
            }
            _ => (1, 1),
        };
        XmlError::Parsing {
            message: format!("Input is not proper {encoding}: {err}"),
            line,
            column,
        }
    })
}

/// Convert byte offsets into lines and columns.
///
/// Offsets are usually requested in increasing order, so the scan resumes from
/// the previous offset.
struct Locator {
    offset: usize,
    line: usize,
    column: usize,
}

impl Default for Locator {
    fn default() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

impl Locator {
    fn locate(&mut self, src: &str, offset: usize) -> (usize, usize) {
        let mut offset = offset.min(src.len());
        while !src.is_char_boundary(offset) {
            offset -= 1;
        }
        if offset < self.offset {
            *self = Self::default();
        }
        for c in src[self.offset..offset].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset = offset;
        (self.line, self.column)
    }
}

/// An attribute of a start tag after normalization.
struct RawAttr {
    name: String,
    value: String,
    atype: AttributeType,
}

/// Parsing state of one document.
struct XmlParserCtxt<'a, 'b> {
    src: &'a str,
    reader: Reader<&'a [u8]>,
    builder: TreeBuilder<'b>,
    dtd: Option<Dtd>,
    /// In-scope namespace bindings. `ns_marks` holds the length of `ns_tab` at each
    /// open element.
    ns_tab: Vec<(String, String)>,
    ns_marks: Vec<usize>,
    depth: usize,
    root_seen: bool,
    root_closed: bool,
    locator: Locator,
    validate: bool,
    positions: Positions,
    issues: Vec<ValidityIssue>,
}

impl<'a, 'b> XmlParserCtxt<'a, 'b> {
    fn new(src: &'a str, builder: TreeBuilder<'b>, validate: bool) -> Self {
        let mut reader = Reader::from_str(src);
        let config = reader.config_mut();
        config.expand_empty_elements = true;
        config.check_end_names = true;
        config.check_comments = true;
        config.trim_text_start = false;
        config.trim_text_end = false;
        Self {
            src,
            reader,
            builder,
            dtd: None,
            ns_tab: vec![],
            ns_marks: vec![],
            depth: 0,
            root_seen: false,
            root_closed: false,
            locator: Locator::default(),
            validate,
            positions: Positions::new(),
            issues: vec![],
        }
    }

    fn locate(&mut self, offset: usize) -> (usize, usize) {
        self.locator.locate(self.src, offset)
    }

    fn error(&self, (line, column): (usize, usize), message: impl Into<String>) -> XmlError {
        XmlError::Parsing {
            message: message.into(),
            line,
            column,
        }
    }

    fn utf8<'t>(&self, bytes: &'t [u8], pos: (usize, usize)) -> Result<&'t str, XmlError> {
        std::str::from_utf8(bytes)
            .map_err(|err| self.error(pos, format!("Input is not proper UTF-8: {err}")))
    }

    fn check_chars(&self, data: &str, pos: (usize, usize)) -> Result<(), XmlError> {
        validate_character_data(data).map_err(|err| self.error(pos, err.to_string()))
    }

    /// Build the document, then validate it if requested.
    ///
    /// The outer error is a well-formedness or construction failure. The inner result
    /// is the outcome of validation.
    fn parse_document(mut self) -> Result<(DocumentRef, Result<(), XmlError>), XmlError> {
        self.builder.start_document();
        let mut first = true;
        loop {
            let start = self.reader.buffer_position() as usize;
            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(err) => {
                    let pos = self.locate(self.reader.error_position() as usize);
                    return Err(self.error(pos, err.to_string()));
                }
            };
            let pos = self.locate(start);
            match event {
                Event::Decl(_) => {
                    if !first {
                        return Err(self.error(
                            pos,
                            "XML declaration allowed only at the start of the document",
                        ));
                    }
                }
                Event::DocType(doctype) => self.parse_doc_type(start, pos, &doctype)?,
                Event::Start(elem) => self.start_element(pos, &elem)?,
                Event::Empty(elem) => {
                    self.start_element(pos, &elem)?;
                    self.end_element(pos)?;
                }
                Event::End(_) => self.end_element(pos)?,
                Event::Text(text) => self.characters(pos, &text)?,
                Event::CData(cdata) => {
                    let data = self.utf8(&cdata, pos)?;
                    if self.depth == 0 {
                        return Err(self.error(pos, "CDATA section outside the root element"));
                    }
                    self.check_chars(data, pos)?;
                    self.builder.text(data);
                }
                Event::Comment(comment) => {
                    let data = self.utf8(&comment, pos)?;
                    self.check_chars(data, pos)?;
                    self.builder.comment(data)?;
                }
                Event::PI(pi) => self.processing_instruction(pos, &pi)?,
                Event::Eof => break,
            }
            first = false;
        }

        let end = self.locate(self.src.len());
        if self.depth > 0 {
            return Err(self.error(end, "Premature end of data: some elements are not closed"));
        }
        if !self.root_seen {
            return Err(self.error(end, "Start tag expected, the document is empty"));
        }
        let doc = self.builder.end_document()?;
        let validity = if self.validate {
            validate_document(&doc, self.dtd.as_ref(), &self.positions, self.issues)
        } else {
            Ok(())
        };
        Ok((doc, validity))
    }

    /// Parse the document type declaration.
    ///
    /// `start` is the offset of `<!DOCTYPE`.
    fn parse_doc_type(
        &mut self,
        start: usize,
        pos: (usize, usize),
        doctype: &BytesText,
    ) -> Result<(), XmlError> {
        if self.root_seen {
            return Err(self.error(pos, "DOCTYPE must be declared before the root element"));
        }
        if self.dtd.is_some() {
            return Err(self.error(pos, "Only one DOCTYPE declaration is allowed"));
        }
        let content = self.utf8(doctype, pos)?;
        let dtd = match Dtd::parse(content) {
            Ok(dtd) => dtd,
            Err(err) => {
                let pos = self.locate(start + "<!DOCTYPE".len() + err.offset);
                return Err(self.error(pos, err.message));
            }
        };
        self.builder.doc_type(
            &dtd.root_name,
            dtd.public_id.as_deref(),
            dtd.system_id.as_deref(),
            &dtd.internal_subset,
        )?;
        self.dtd = Some(dtd);
        Ok(())
    }

    /// Resolve `prefix` with the in-scope bindings.
    ///
    /// The empty prefix resolves to the default namespace, or to the empty string.
    fn lookup_namespace(&self, prefix: &str) -> Option<&str> {
        if prefix == XML_PREFIX {
            return Some(XML_XML_NAMESPACE);
        }
        let found = self
            .ns_tab
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str());
        match found {
            None if prefix.is_empty() => Some(""),
            found => found,
        }
    }

    /// Expand character and entity references.
    ///
    /// In an attribute value, white spaces of replacement texts become spaces and
    /// a replacement text must not contain `<`.
    fn expand_references(
        &self,
        raw: &str,
        in_attribute: bool,
        pos: (usize, usize),
    ) -> Result<String, XmlError> {
        let mut undefined = None;
        let mut unparsed = None;
        let mut markup = None;
        let mut external = vec![];
        let res = unescape_with(raw, |name| {
            if let Some(predefined) = resolve_predefined_entity(name) {
                return Some(predefined);
            }
            let entity = self.dtd.as_ref().and_then(|dtd| {
                if in_attribute {
                    dtd.attribute_entity(name)
                } else {
                    dtd.entity(name)
                }
            });
            match entity {
                Some(EntityReplacement::Text(text)) => {
                    if in_attribute && text.contains('<') {
                        markup = Some(name.to_owned());
                    }
                    Some(text)
                }
                Some(EntityReplacement::External) => {
                    external.push(name.to_owned());
                    Some("")
                }
                Some(EntityReplacement::Unparsed) => {
                    unparsed = Some(name.to_owned());
                    Some("")
                }
                None => {
                    undefined = Some(name.to_owned());
                    None
                }
            }
        });
        if let Some(name) = unparsed {
            return Err(self.error(pos, format!("Entity reference to unparsed entity {name}")));
        }
        if let Some(name) = markup {
            return Err(self.error(
                pos,
                format!("'<' in entity '{name}' is not allowed in attributes values"),
            ));
        }
        let text = match res {
            Ok(text) => text.into_owned(),
            Err(err) => {
                let message = match undefined {
                    Some(name) => format!("Entity '{name}' not defined"),
                    None => err.to_string(),
                };
                return Err(self.error(pos, message));
            }
        };
        for name in external {
            report_diagnostic(
                XmlErrorLevel::Warning,
                self.error(pos, format!("External entity '{name}' is not loaded")),
            );
        }
        Ok(text)
    }

    /// Normalize an attribute value.
    ///
    /// # Specification
    /// [3.3.3 Attribute-Value Normalization](https://www.w3.org/TR/xml/#AVNormalize)
    fn attribute_value(
        &self,
        raw: &str,
        atype: AttributeType,
        pos: (usize, usize),
    ) -> Result<String, XmlError> {
        if raw.contains('<') {
            return Err(self.error(pos, "Unescaped '<' not allowed in attributes values"));
        }
        let raw = raw.replace(['\t', '\n'], " ");
        let value = self.expand_references(&raw, true, pos)?;
        self.check_chars(&value, pos)?;
        if atype.is_tokenized() {
            Ok(collapse_spaces(&value))
        } else {
            Ok(value)
        }
    }

    fn start_element(&mut self, pos: (usize, usize), elem: &BytesStart) -> Result<(), XmlError> {
        if self.depth == 0 && self.root_closed {
            return Err(self.error(pos, "Extra content at the end of the document"));
        }
        let qname = self.utf8(elem.name().into_inner(), pos)?.to_owned();
        validate_qname(&qname).map_err(|err| self.error(pos, err.to_string()))?;

        let mut attrs = vec![];
        let mut specified = HashSet::new();
        for attr in elem.attributes() {
            let attr = attr.map_err(|err| self.error(pos, err.to_string()))?;
            let name = self.utf8(attr.key.into_inner(), pos)?.to_owned();
            let raw = self.utf8(&attr.value, pos)?;
            let atype = self
                .dtd
                .as_ref()
                .and_then(|dtd| dtd.attribute_decl(&qname, &name))
                .map_or(AttributeType::Undeclared, |decl| decl.atype);
            let value = self.attribute_value(raw, atype, pos)?;
            if !specified.insert(name.clone()) {
                return Err(self.error(pos, format!("Attribute {name} redefined")));
            }
            attrs.push(RawAttr { name, value, atype });
        }
        if let Some(dtd) = self.dtd.as_ref() {
            for decl in dtd.attribute_decls(&qname) {
                let Some(default) = decl.default.value() else {
                    continue;
                };
                if !specified.contains(&decl.name) {
                    attrs.push(RawAttr {
                        name: decl.name.clone(),
                        value: self.attribute_value(default, decl.atype, pos)?,
                        atype: decl.atype,
                    });
                }
            }
        }

        let mut decls = vec![];
        attrs.retain(|attr| {
            if attr.name == XMLNS_PREFIX {
                decls.push((String::new(), attr.value.clone()));
                false
            } else if let Some(prefix) = attr.name.strip_prefix("xmlns:") {
                decls.push((prefix.to_owned(), attr.value.clone()));
                false
            } else {
                true
            }
        });
        self.ns_marks.push(self.ns_tab.len());
        for (prefix, uri) in &decls {
            self.check_namespace_declaration(prefix, uri, pos)?;
            if prefix != XML_PREFIX {
                self.ns_tab.push((prefix.clone(), uri.clone()));
            }
        }

        let (prefix, local_name) = split_qname2(&qname).unwrap_or(("", &qname));
        let Some(namespace_uri) = self.lookup_namespace(prefix).map(|uri| uri.to_owned()) else {
            return Err(self.error(
                pos,
                format!("Namespace prefix {prefix} on {local_name} is not defined"),
            ));
        };
        let element_content = self
            .dtd
            .as_ref()
            .is_some_and(|dtd| dtd.has_element_content(&qname));
        self.builder
            .start_element(&qname, &namespace_uri, element_content)?;
        if let Some(elem) = self.builder.current_element() {
            self.positions.insert(NodeRef::Element(elem).key(), pos);
        }
        for (prefix, uri) in &decls {
            self.builder.namespace_declaration(prefix, uri)?;
        }

        let mut seen = HashSet::new();
        for attr in attrs {
            let (prefix, local_name) = split_qname2(&attr.name).unwrap_or(("", &attr.name));
            let namespace_uri = match prefix {
                "" => String::new(),
                prefix => match self.lookup_namespace(prefix) {
                    Some(uri) => uri.to_owned(),
                    None => {
                        return Err(self.error(
                            pos,
                            format!(
                                "Namespace prefix {prefix} for {local_name} on {qname} is not defined"
                            ),
                        ));
                    }
                },
            };
            if !seen.insert((local_name.to_owned(), namespace_uri.clone())) {
                return Err(self.error(
                    pos,
                    format!("Namespaced Attribute {local_name} in '{namespace_uri}' redefined"),
                ));
            }
            let mut atype = attr.atype;
            let is_xml_id = prefix == XML_PREFIX && local_name == "id";
            let value = if is_xml_id {
                collapse_spaces(&attr.value)
            } else {
                attr.value
            };
            if (is_xml_id || atype == AttributeType::Id) && validate_ncname(&value).is_err() {
                if is_xml_id {
                    return Err(self.error(pos, format!("xml:id value '{value}' is not an NCName")));
                }
                let message = format!(
                    "Syntax of value for attribute {} of {qname} is not valid",
                    attr.name
                );
                report_diagnostic(
                    XmlErrorLevel::Warning,
                    XmlError::illegal_data(&value, message.clone()),
                );
                if self.validate {
                    self.issues.push(ValidityIssue {
                        message,
                        line: pos.0,
                        column: pos.1,
                    });
                }
                atype = AttributeType::Cdata;
            }
            self.builder
                .attribute(&attr.name, &namespace_uri, &value, atype)?;
        }

        self.depth += 1;
        self.root_seen = true;
        Ok(())
    }

    /// # Specification
    /// [Namespace constraint: Reserved Prefixes and Namespace Names](https://www.w3.org/TR/xml-names/#xmlReserved)
    fn check_namespace_declaration(
        &self,
        prefix: &str,
        uri: &str,
        pos: (usize, usize),
    ) -> Result<(), XmlError> {
        if prefix == XMLNS_PREFIX {
            return Err(self.error(pos, "xmlns: the prefix xmlns must not be declared"));
        }
        if prefix == XML_PREFIX && uri != XML_XML_NAMESPACE {
            return Err(self.error(pos, "xml namespace prefix mapped to wrong URI"));
        }
        if prefix != XML_PREFIX && uri == XML_XML_NAMESPACE {
            return Err(self.error(
                pos,
                format!("xmlns:{prefix}: reuse of the xml namespace name is forbidden"),
            ));
        }
        if !prefix.is_empty() {
            validate_ncname(prefix).map_err(|err| self.error(pos, err.to_string()))?;
            if uri.is_empty() {
                return Err(self.error(
                    pos,
                    format!("xmlns:{prefix}: Empty XML namespace is not allowed"),
                ));
            }
        }
        Ok(())
    }

    fn end_element(&mut self, pos: (usize, usize)) -> Result<(), XmlError> {
        if self.depth == 0 {
            return Err(self.error(pos, "Unexpected end tag"));
        }
        self.builder.end_element()?;
        if let Some(mark) = self.ns_marks.pop() {
            self.ns_tab.truncate(mark);
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.root_closed = true;
        }
        Ok(())
    }

    fn characters(&mut self, pos: (usize, usize), text: &BytesText) -> Result<(), XmlError> {
        let raw = self.utf8(text, pos)?;
        if self.depth == 0 {
            if raw.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r')) {
                return Ok(());
            }
            return Err(self.error(pos, "Content is not allowed outside the root element"));
        }
        if raw.contains("]]>") {
            return Err(self.error(pos, "Sequence ']]>' not allowed in content"));
        }
        let data = self.expand_references(raw, false, pos)?;
        self.check_chars(&data, pos)?;
        self.builder.text(&data);
        Ok(())
    }

    fn processing_instruction(&mut self, pos: (usize, usize), pi: &BytesPI) -> Result<(), XmlError> {
        let target = self.utf8(pi.target(), pos)?;
        let data = self
            .utf8(pi.content(), pos)?
            .trim_start_matches([' ', '\t', '\n', '\r']);
        validate_name(target).map_err(|err| self.error(pos, err.to_string()))?;
        if target.eq_ignore_ascii_case(XML_PREFIX) {
            return Err(self.error(pos, "XML declaration allowed only at the start of the document"));
        }
        self.check_chars(data, pos)?;
        self.builder.processing_instruction(target, data)
    }
}
