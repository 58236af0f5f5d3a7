//! Serialization round-trip tests.
//!
//! A serialized document must parse back to the same tree, and canonicalization must
//! be a fixed point of parse-then-canonicalize.

use std::path::PathBuf;

use exom::{
    c14n::{CanonicalAlgorithm, Canonicalizer},
    parser::{parse_bytes, parse_file, parse_str},
    save::{SerializeOptions, Serializer},
    tree::{
        AttrRef, CommentRef, DocumentRef, ElementRef, Node, NodeRef, ProcessingInstructionRef,
        TextRef,
    },
};

fn canonical(doc: &DocumentRef, algorithm: CanonicalAlgorithm) -> String {
    Canonicalizer::new(algorithm)
        .canonicalize_to_string(&NodeRef::Document(doc.clone()), None)
        .unwrap()
}

fn serialize(doc: &DocumentRef, options: SerializeOptions) -> Vec<u8> {
    let mut out = vec![];
    let mut serializer = Serializer::new(&mut out, options);
    serializer.write_document(doc).unwrap();
    serializer.flush().unwrap();
    drop(serializer);
    out
}

fn test_files() -> Vec<PathBuf> {
    glob::glob("./test/c14n/*/*.xml")
        .expect("Failed to read glob pattern")
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn serialized_documents_parse_back() {
    const ENCODINGS: &[&str] = &["UTF-8", "UTF-16", "ISO-8859-1", "US-ASCII"];
    for file in test_files() {
        let doc = parse_file(&file).unwrap();
        let expected = canonical(&doc, CanonicalAlgorithm::CanonicalXmlWithComments);
        for &encoding in ENCODINGS {
            let options = SerializeOptions::default().with_encoding(encoding).unwrap();
            let bytes = serialize(&doc, options);
            let reparsed = parse_bytes(&bytes)
                .unwrap_or_else(|err| panic!("{} ({encoding}): {err}", file.display()));
            assert_eq!(
                canonical(&reparsed, CanonicalAlgorithm::CanonicalXmlWithComments),
                expected,
                "{} ({encoding})",
                file.display()
            );
            assert_eq!(
                reparsed.doc_type().map(|doctype| doctype.internal_subset()),
                doc.doc_type().map(|doctype| doctype.internal_subset()),
                "{}",
                file.display()
            );
        }
    }
}

#[test]
fn canonical_form_is_a_fixed_point() {
    const ALGORITHMS: &[CanonicalAlgorithm] = &[
        CanonicalAlgorithm::CanonicalXml,
        CanonicalAlgorithm::CanonicalXmlWithComments,
        CanonicalAlgorithm::CanonicalXml11,
        CanonicalAlgorithm::ExclusiveXmlCanonicalization,
    ];
    for file in test_files() {
        let doc = parse_file(&file).unwrap();
        for &algorithm in ALGORITHMS {
            let first = canonical(&doc, algorithm);
            let reparsed = parse_str(&first)
                .unwrap_or_else(|err| panic!("{} ({algorithm}): {err}", file.display()));
            assert_eq!(
                canonical(&reparsed, algorithm),
                first,
                "{} ({algorithm})",
                file.display()
            );
        }
    }
}

#[test]
fn special_characters_survive_round_trip() {
    let root = ElementRef::with_namespace("p:root", "http://example.com/p").unwrap();
    root.add_namespace_declaration("q", "http://example.com/q")
        .unwrap();
    root.add_attribute(AttrRef::new("plain", "a\tb\nc\rd \"e\" <f> & 'g'").unwrap())
        .unwrap();
    root.add_attribute(AttrRef::with_namespace("q:attr", "http://example.com/q", "v").unwrap())
        .unwrap();
    root.append_child(TextRef::new("x ]]> y\r\nz < & >").unwrap())
        .unwrap();
    root.append_child(CommentRef::new(" - comment - ").unwrap())
        .unwrap();
    let child = ElementRef::new("child").unwrap();
    child
        .append_child(ProcessingInstructionRef::new("target", "some ?data").unwrap())
        .unwrap();
    root.append_child(child).unwrap();
    let doc = DocumentRef::new(root).unwrap();

    let bytes = serialize(&doc, SerializeOptions::default());
    let reparsed = parse_bytes(&bytes).unwrap();
    let root = reparsed.root_element();
    assert_eq!(&*root.namespace_uri(), "http://example.com/p");
    assert_eq!(
        root.attribute_value("plain").as_deref(),
        Some("a\tb\nc\rd \"e\" <f> & 'g'")
    );
    assert_eq!(
        root.attribute_value_ns("attr", "http://example.com/q")
            .as_deref(),
        Some("v")
    );
    assert_eq!(
        root.namespace_uri_for_prefix("q").as_deref(),
        Some("http://example.com/q")
    );
    let Some(NodeRef::Text(text)) = root.child(0) else {
        panic!("text is expected");
    };
    assert_eq!(text.value(), "x ]]> y\r\nz < & >");
    let Some(NodeRef::Comment(comment)) = root.child(1) else {
        panic!("a comment is expected");
    };
    assert_eq!(comment.value(), " - comment - ");
    assert_eq!(root.value(), doc.root_element().value());
    assert_eq!(
        canonical(&reparsed, CanonicalAlgorithm::CanonicalXmlWithComments),
        canonical(&doc, CanonicalAlgorithm::CanonicalXmlWithComments)
    );
}
