//! Serialization of trees into XML text.
//!
//! The output of [`Serializer`] round-trips through a conforming parser unless
//! indentation or line wrapping is enabled.

use std::{collections::BTreeMap, io::Write, rc::Rc};

use anyhow::bail;

use crate::{
    encoding::XmlCharEncoding,
    error::XmlError,
    globals::get_tree_indent_string,
    io::XmlOutputBuffer,
    tree::{
        AttrRef, CommentRef, DocTypeRef, DocumentRef, ElementRef, NamespaceNode, Node, NodeRef,
        ProcessingInstructionRef, XML_XML_NAMESPACE,
    },
};

/// The line separator written by [`Serializer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineSeparator {
    #[default]
    Lf,
    Cr,
    CrLf,
}

impl LineSeparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::Cr => "\r",
            Self::CrLf => "\r\n",
        }
    }

    /// Return the separator written as character references.
    fn escaped(&self) -> &'static str {
        match self {
            Self::Lf => "&#x0A;",
            Self::Cr => "&#x0D;",
            Self::CrLf => "&#x0D;&#x0A;",
        }
    }
}

impl TryFrom<&str> for LineSeparator {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "\n" => Ok(Self::Lf),
            "\r" => Ok(Self::Cr),
            "\r\n" => Ok(Self::CrLf),
            _ => bail!("Line separator must be \\n, \\r or \\r\\n, but {value:?} is given"),
        }
    }
}

/// Options of [`Serializer`].
#[derive(Debug, Clone)]
pub struct SerializeOptions {
    pub encoding: XmlCharEncoding,
    /// The number of spaces per nesting level. `0` disables indentation.
    pub indent: usize,
    /// The preferred maximum line length. `0` disables wrapping.
    pub max_length: usize,
    /// The line separator. If `None`, `\n` is used, and line breaks in text
    /// and attribute values are written as they are stored.
    pub line_separator: Option<LineSeparator>,
    /// Write `xml:base` attributes where the base URI changes.
    pub preserve_base_uri: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            encoding: XmlCharEncoding::UTF8,
            indent: 0,
            max_length: 0,
            line_separator: None,
            preserve_base_uri: false,
        }
    }
}

impl SerializeOptions {
    /// Return options that indent by the global indent string.
    pub fn formatted() -> Self {
        Self {
            indent: get_tree_indent_string().len().max(1),
            ..Self::default()
        }
    }

    /// Set the output encoding by its label.
    pub fn with_encoding(mut self, label: &str) -> anyhow::Result<Self> {
        self.encoding = label.parse()?;
        Ok(self)
    }

    /// Set the line separator. Only `\n`, `\r` and `\r\n` are accepted.
    pub fn with_line_separator(mut self, separator: &str) -> anyhow::Result<Self> {
        self.line_separator = Some(LineSeparator::try_from(separator)?);
        Ok(self)
    }

    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_preserve_base_uri(mut self, preserve: bool) -> Self {
        self.preserve_base_uri = preserve;
        self
    }
}

/// Writes nodes as XML text into a byte sink.
pub struct Serializer<'a> {
    out: XmlOutputBuffer<'a>,
    options: SerializeOptions,
    column: usize,
    /// Namespace bindings already written by the enclosing elements.
    namespaces: Vec<BTreeMap<Rc<str>, Rc<str>>>,
}

impl<'a> Serializer<'a> {
    pub fn new(writer: impl Write + 'a, options: SerializeOptions) -> Self {
        let out = XmlOutputBuffer::from_writer(writer, options.encoding);
        Self {
            out,
            options,
            column: 0,
            namespaces: vec![],
        }
    }

    pub fn options(&self) -> &SerializeOptions {
        &self.options
    }

    fn separator(&self) -> &'static str {
        self.options.line_separator.unwrap_or_default().as_str()
    }

    fn write_raw(&mut self, s: &str) -> Result<(), XmlError> {
        if self.options.max_length > 0 {
            match s.rfind(['\n', '\r']) {
                Some(pos) => self.column = s[pos + 1..].chars().count(),
                None => self.column += s.chars().count(),
            }
        }
        self.out.write_str(s)?;
        Ok(())
    }

    fn break_line(&mut self, depth: usize) -> Result<(), XmlError> {
        self.write_raw(self.separator())?;
        let indent = " ".repeat(self.options.indent * depth);
        self.write_raw(&indent)
    }

    /// Write `doc` with an XML declaration and flush the sink.
    pub fn write_document(&mut self, doc: &DocumentRef) -> Result<(), XmlError> {
        let decl = format!(
            "<?xml version=\"1.0\" encoding=\"{}\"?>",
            self.options.encoding.get_name()
        );
        self.write_raw(&decl)?;
        self.write_raw(self.separator())?;
        for child in doc.children() {
            self.write_node(&child)?;
            self.write_raw(self.separator())?;
        }
        self.flush()
    }

    /// Write `node` without an XML declaration.
    ///
    /// Documents are written as the sequence of their children.
    pub fn write_node(&mut self, node: &NodeRef) -> Result<(), XmlError> {
        match node {
            NodeRef::Document(doc) => {
                for child in doc.children() {
                    self.write_node(&child)?;
                    self.write_raw(self.separator())?;
                }
                Ok(())
            }
            NodeRef::Element(elem) => {
                let preserve = elem
                    .parent_element()
                    .is_some_and(|parent| preserves_space(&parent));
                self.write_element(elem, 0, preserve)
            }
            NodeRef::Attribute(attr) => self.write_attribute(attr),
            NodeRef::Text(text) => self.write_text(&text.value(), true),
            NodeRef::Comment(comment) => self.write_comment(comment),
            NodeRef::ProcessingInstruction(pi) => self.write_processing_instruction(pi),
            NodeRef::DocType(doctype) => self.write_doc_type(doctype),
            NodeRef::Namespace(ns) => self.write_namespace_node(ns),
        }
    }

    pub fn flush(&mut self) -> Result<(), XmlError> {
        self.out.flush()?;
        Ok(())
    }

    fn write_element(
        &mut self,
        elem: &ElementRef,
        depth: usize,
        inherited_preserve: bool,
    ) -> Result<(), XmlError> {
        let name = elem.qualified_name();
        self.write_raw("<")?;
        self.write_raw(&name)?;
        self.write_namespace_declarations(elem)?;
        for attr in elem.attributes() {
            self.write_raw(" ")?;
            self.write_attribute(&attr)?;
        }
        if self.options.preserve_base_uri {
            self.write_base_uri(elem)?;
        }

        let children = elem.children();
        if children.is_empty() {
            self.write_raw("/>")?;
        } else {
            self.write_raw(">")?;
            let preserve = match elem.attribute_value_ns("space", XML_XML_NAMESPACE).as_deref() {
                Some("preserve") => true,
                Some("default") => false,
                _ => inherited_preserve,
            };
            let format = self.options.indent > 0 && !preserve && is_element_content(&children);
            for child in &children {
                if format {
                    if child.as_text().is_some() {
                        continue;
                    }
                    self.break_line(depth + 1)?;
                }
                match child {
                    NodeRef::Element(child) => self.write_element(child, depth + 1, preserve)?,
                    NodeRef::Text(text) => self.write_text(&text.value(), preserve)?,
                    other => self.write_node(other)?,
                }
            }
            if format {
                self.break_line(depth)?;
            }
            self.write_raw("</")?;
            self.write_raw(&name)?;
            self.write_raw(">")?;
        }
        self.namespaces.pop();
        Ok(())
    }

    /// Write the namespace declarations that are not in scope from the enclosing
    /// elements, and push the new scope.
    fn write_namespace_declarations(&mut self, elem: &ElementRef) -> Result<(), XmlError> {
        let mut scope = self.namespaces.last().cloned().unwrap_or_default();
        for (prefix, uri) in elem.local_namespace_bindings() {
            let current = scope.get(&prefix).map(|uri| &**uri);
            let declared = if prefix.is_empty() {
                current.unwrap_or("") == &*uri
            } else {
                current == Some(&*uri)
            };
            if declared {
                continue;
            }
            self.write_raw(" xmlns")?;
            if !prefix.is_empty() {
                self.write_raw(":")?;
                self.write_raw(&prefix)?;
            }
            self.write_raw("=\"")?;
            let escaped = self.escape_attribute_value(&uri);
            self.write_raw(&escaped)?;
            self.write_raw("\"")?;
            scope.insert(prefix, uri);
        }
        self.namespaces.push(scope);
        Ok(())
    }

    fn write_base_uri(&mut self, elem: &ElementRef) -> Result<(), XmlError> {
        if elem.get_attribute_ns("base", XML_XML_NAMESPACE).is_some() {
            return Ok(());
        }
        let Some(base) = elem.base_uri().filter(|base| !base.is_empty()) else {
            return Ok(());
        };
        let needed = match elem.parent() {
            Some(NodeRef::Element(parent)) => parent.base_uri().as_deref() != Some(&*base),
            _ => true,
        };
        if needed {
            self.write_raw(" xml:base=\"")?;
            let escaped = self.escape_attribute_value(&base);
            self.write_raw(&escaped)?;
            self.write_raw("\"")?;
        }
        Ok(())
    }

    fn write_attribute(&mut self, attr: &AttrRef) -> Result<(), XmlError> {
        self.write_raw(&attr.qualified_name())?;
        self.write_raw("=\"")?;
        let escaped = self.escape_attribute_value(&attr.value());
        self.write_raw(&escaped)?;
        self.write_raw("\"")
    }

    fn write_namespace_node(&mut self, ns: &NamespaceNode) -> Result<(), XmlError> {
        let prefix = ns.prefix();
        if prefix.is_empty() {
            self.write_raw("xmlns=\"")?;
        } else {
            self.write_raw("xmlns:")?;
            self.write_raw(&prefix)?;
            self.write_raw("=\"")?;
        }
        let escaped = self.escape_attribute_value(&ns.namespace_uri());
        self.write_raw(&escaped)?;
        self.write_raw("\"")
    }

    fn write_text(&mut self, text: &str, preserve: bool) -> Result<(), XmlError> {
        let escaped = self.escape_text(text);
        if self.options.max_length == 0 || preserve {
            return self.write_raw(&escaped);
        }
        for (i, word) in escaped.split(' ').enumerate() {
            if i > 0 {
                let len = word.chars().count();
                if self.column > 0 && self.column + 1 + len > self.options.max_length {
                    self.write_raw(self.separator())?;
                } else {
                    self.write_raw(" ")?;
                }
            }
            self.write_raw(word)?;
        }
        Ok(())
    }

    fn write_comment(&mut self, comment: &CommentRef) -> Result<(), XmlError> {
        self.write_raw("<!--")?;
        let value = self.normalize_line_breaks(&comment.value());
        self.write_raw(&value)?;
        self.write_raw("-->")
    }

    fn write_processing_instruction(
        &mut self,
        pi: &ProcessingInstructionRef,
    ) -> Result<(), XmlError> {
        self.write_raw("<?")?;
        self.write_raw(&pi.target())?;
        let data = pi.data();
        if !data.is_empty() {
            self.write_raw(" ")?;
            let data = self.normalize_line_breaks(&data);
            self.write_raw(&data)?;
        }
        self.write_raw("?>")
    }

    fn write_doc_type(&mut self, doctype: &DocTypeRef) -> Result<(), XmlError> {
        self.write_raw("<!DOCTYPE ")?;
        self.write_raw(&doctype.root_element_name())?;
        match (doctype.public_id(), doctype.system_id()) {
            (Some(public_id), Some(system_id)) => {
                self.write_raw(" PUBLIC \"")?;
                self.write_raw(&public_id)?;
                self.write_raw("\" ")?;
                self.write_system_literal(&system_id)?;
            }
            (_, Some(system_id)) => {
                self.write_raw(" SYSTEM ")?;
                self.write_system_literal(&system_id)?;
            }
            _ => {}
        }
        let subset = doctype.internal_subset();
        if !subset.is_empty() {
            self.write_raw(" [")?;
            self.write_raw(self.separator())?;
            let subset = self.normalize_line_breaks(&subset);
            self.write_raw(&subset)?;
            if !subset.ends_with(['\n', '\r']) {
                self.write_raw(self.separator())?;
            }
            self.write_raw("]")?;
        }
        self.write_raw(">")
    }

    fn write_system_literal(&mut self, literal: &str) -> Result<(), XmlError> {
        let quote = if literal.contains('"') { "'" } else { "\"" };
        self.write_raw(quote)?;
        self.write_raw(literal)?;
        self.write_raw(quote)
    }

    fn normalize_line_breaks(&self, s: &str) -> String {
        match self.options.line_separator {
            Some(separator) if separator != LineSeparator::Lf => {
                s.replace('\n', separator.as_str())
            }
            _ => s.to_owned(),
        }
    }

    /// Escape text content.
    ///
    /// `>` is escaped only after `]]`. Line feeds become the line separator if one is set.
    fn escape_text(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for (i, c) in text.char_indices() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' if text[..i].ends_with("]]") => out.push_str("&gt;"),
                '\n' => match self.options.line_separator {
                    Some(separator) => out.push_str(separator.as_str()),
                    None => out.push('\n'),
                },
                '\r' if self.options.line_separator == Some(LineSeparator::Cr) => out.push('\r'),
                '\r' => out.push_str("&#x0D;"),
                c => out.push(c),
            }
        }
        out
    }

    fn escape_attribute_value(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\t' => out.push_str("&#x09;"),
                '\r' => out.push_str("&#x0D;"),
                '\n' => match self.options.line_separator {
                    Some(separator) => out.push_str(separator.escaped()),
                    None => out.push_str("&#x0A;"),
                },
                c => out.push(c),
            }
        }
        out
    }
}

/// Check if `children` contain no text other than white spaces.
fn is_element_content(children: &[NodeRef]) -> bool {
    children.iter().all(|child| {
        child.as_text().is_none_or(|text| {
            text.value()
                .chars()
                .all(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
        })
    })
}

/// Check if white spaces in `elem` are significant because of `xml:space`.
fn preserves_space(elem: &ElementRef) -> bool {
    let mut cur = Some(elem.clone());
    while let Some(elem) = cur {
        match elem.attribute_value_ns("space", XML_XML_NAMESPACE).as_deref() {
            Some("preserve") => return true,
            Some("default") => return false,
            _ => cur = elem.parent_element(),
        }
    }
    false
}

/// Serialize `node` into a string.
///
/// A document starts with `<?xml version="1.0"?>` and every top-level node is followed
/// by a line feed. Other nodes are written without an XML declaration.
///
/// # Errors
/// - Any error returned by [`Serializer::write_node`].
pub fn node_to_xml(node: &NodeRef) -> Result<String, XmlError> {
    let mut buf = vec![];
    let mut serializer = Serializer::new(&mut buf, SerializeOptions::default());
    if let NodeRef::Document(_) = node {
        serializer.write_raw("<?xml version=\"1.0\"?>\n")?;
    }
    serializer.write_node(node)?;
    serializer.flush()?;
    drop(serializer);
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TextRef;

    fn serialize(doc: &DocumentRef, options: SerializeOptions) -> String {
        let mut out = vec![];
        Serializer::new(&mut out, options)
            .write_document(doc)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn attribute_escaping() {
        let attr = AttrRef::new("test", "value contains a \"").unwrap();
        assert_eq!(attr.to_xml().unwrap(), "test=\"value contains a &quot;\"");
        let attr = AttrRef::new("ws", "a\tb\rc\nd<&>").unwrap();
        assert_eq!(attr.to_xml().unwrap(), "ws=\"a&#x09;b&#x0D;c&#x0A;d&lt;&amp;&gt;\"");
    }

    #[test]
    fn text_escaping() {
        const CASES: &[(&str, &str)] = &[
            ("a < b & c", "a &lt; b &amp; c"),
            ("x > y", "x > y"),
            ("]]>", "]]&gt;"),
            ("a\rb", "a&#x0D;b"),
        ];
        for &(text, expected) in CASES {
            assert_eq!(TextRef::new(text).unwrap().to_xml().unwrap(), expected);
        }
    }

    #[test]
    fn document_output() {
        let root = ElementRef::with_namespace("root", "http://www.example.org/").unwrap();
        let child = ElementRef::new("child").unwrap();
        let inner = ElementRef::with_namespace("inner", "http://www.example.org/").unwrap();
        root.append_child(child.clone()).unwrap();
        child.append_child(inner).unwrap();
        let doc = DocumentRef::new(root).unwrap();
        doc.insert_child(CommentRef::new(" c ").unwrap(), 0).unwrap();
        assert_eq!(
            serialize(&doc, SerializeOptions::default()),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!-- c -->\n<root xmlns=\"http://www.example.org/\"><child xmlns=\"\"><inner xmlns=\"http://www.example.org/\"/></child></root>\n"
        );
        assert_eq!(
            doc.to_xml().unwrap(),
            "<?xml version=\"1.0\"?>\n<!-- c -->\n<root xmlns=\"http://www.example.org/\"><child xmlns=\"\"><inner xmlns=\"http://www.example.org/\"/></child></root>\n"
        );
    }

    #[test]
    fn no_redundant_default_undeclaration() {
        let root = ElementRef::new("root").unwrap();
        root.append_child(ElementRef::new("child").unwrap()).unwrap();
        assert_eq!(root.to_xml().unwrap(), "<root><child/></root>");
    }

    #[test]
    fn line_separators() {
        assert!(LineSeparator::try_from("\n\n").is_err());
        let root = ElementRef::new("root").unwrap();
        root.add_attribute(AttrRef::new("a", "1\n2").unwrap()).unwrap();
        root.append_child(TextRef::new("x\ny\rz").unwrap()).unwrap();
        let doc = DocumentRef::new(root).unwrap();
        let options = SerializeOptions::default()
            .with_line_separator("\r\n")
            .unwrap();
        assert_eq!(
            serialize(&doc, options),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n<root a=\"1&#x0D;&#x0A;2\">x\r\ny&#x0D;z</root>\r\n"
        );
    }

    #[test]
    fn indentation() {
        let root = ElementRef::new("root").unwrap();
        let a = ElementRef::new("a").unwrap();
        a.append_child(TextRef::new("text").unwrap()).unwrap();
        root.append_child(TextRef::new("\n  ").unwrap()).unwrap();
        root.append_child(a).unwrap();
        let pre = ElementRef::new("pre").unwrap();
        pre.add_attribute(AttrRef::new("xml:space", "preserve").unwrap())
            .unwrap();
        let b = ElementRef::new("b").unwrap();
        pre.append_child(b).unwrap();
        pre.append_child(TextRef::new("  ").unwrap()).unwrap();
        root.append_child(pre).unwrap();
        let doc = DocumentRef::new(root).unwrap();
        assert_eq!(
            serialize(&doc, SerializeOptions::default().with_indent(2)),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root>\n  <a>text</a>\n  <pre xml:space=\"preserve\"><b/>  </pre>\n</root>\n"
        );
    }

    #[test]
    fn wrapping() {
        let root = ElementRef::new("p").unwrap();
        root.append_child(TextRef::new("aaa bbb ccc ddd").unwrap()).unwrap();
        let doc = DocumentRef::new(root).unwrap();
        let out = serialize(&doc, SerializeOptions::default().with_max_length(10));
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<p>aaa bbb\nccc ddd</p>\n"
        );
    }

    #[test]
    fn preserve_base_uri() {
        let root = ElementRef::new("root").unwrap();
        let child = ElementRef::new("child").unwrap();
        root.append_child(child.clone()).unwrap();
        child.set_base_uri(Some("http://other.example/")).unwrap();
        let doc = DocumentRef::new(root).unwrap();
        doc.set_base_uri(Some("http://www.example.com/")).unwrap();
        let out = serialize(&doc, SerializeOptions::default().with_preserve_base_uri(true));
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<root xml:base=\"http://www.example.com/\"><child xml:base=\"http://other.example/\"/></root>\n"
        );
    }

    #[test]
    fn encoded_output() {
        let root = ElementRef::new("root").unwrap();
        root.append_child(TextRef::new("caf\u{e9} \u{20AC}").unwrap()).unwrap();
        let doc = DocumentRef::new(root).unwrap();
        let mut out = vec![];
        let options = SerializeOptions::default()
            .with_encoding("ISO-8859-1")
            .unwrap();
        Serializer::new(&mut out, options)
            .write_document(&doc)
            .unwrap();
        assert_eq!(
            out,
            b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<root>caf\xE9 &#x20AC;</root>\n"
        );
    }

    #[test]
    fn sink_failure_is_propagated() {
        struct BrokenSink;

        impl Write for BrokenSink {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk full"))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let doc = DocumentRef::new(ElementRef::new("root").unwrap()).unwrap();
        let err = Serializer::new(BrokenSink, SerializeOptions::default())
            .write_document(&doc)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::XmlErrorKind::Io);
        assert!(err.to_string().contains("disk full"));

        let doc = NodeRef::Document(doc);
        assert_eq!(
            node_to_xml(&doc).unwrap(),
            "<?xml version=\"1.0\"?>\n<root/>\n"
        );
    }
}
