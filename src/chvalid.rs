//! Character classes of XML 1.0 (Fifth Edition) and Namespaces in XML.

/// Check whether `c` matches the `Char` production.
///
/// # Specification
/// ```text
/// [2] Char ::= #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
/// ```
pub fn xml_is_char(c: u32) -> bool {
    matches!(c, 0x9 | 0xA | 0xD | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF)
}

/// Check whether `c` matches the `S` production.
pub fn xml_is_blank_char(c: u32) -> bool {
    matches!(c, 0x20 | 0x9 | 0xA | 0xD)
}

/// Check whether `c` matches the `PubidChar` production.
///
/// # Specification
/// ```text
/// [13] PubidChar ::= #x20 | #xD | #xA | [a-zA-Z0-9] | [-'()+,./:=?;!*#@$_%]
/// ```
pub fn xml_is_pubid_char(c: u32) -> bool {
    let Some(c) = char::from_u32(c) else {
        return false;
    };
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '\r' | '\n') || "-'()+,./:=?;!*#@$_%".contains(c)
}

/// Check whether `c` matches the `NameStartChar` production except for ':'.
///
/// # Specification
/// ```text
/// [4] NameStartChar ::= ":" | [A-Z] | "_" | [a-z] | [#xC0-#xD6] | [#xD8-#xF6]
///                     | [#xF8-#x2FF] | [#x370-#x37D] | [#x37F-#x1FFF] | [#x200C-#x200D]
///                     | [#x2070-#x218F] | [#x2C00-#x2FEF] | [#x3001-#xD7FF]
///                     | [#xF900-#xFDCF] | [#xFDF0-#xFFFD] | [#x10000-#xEFFFF]
/// ```
pub fn xml_is_ncname_start_char(c: u32) -> bool {
    matches!(
        c,
        0x41..=0x5A
            | 0x5F
            | 0x61..=0x7A
            | 0xC0..=0xD6
            | 0xD8..=0xF6
            | 0xF8..=0x2FF
            | 0x370..=0x37D
            | 0x37F..=0x1FFF
            | 0x200C..=0x200D
            | 0x2070..=0x218F
            | 0x2C00..=0x2FEF
            | 0x3001..=0xD7FF
            | 0xF900..=0xFDCF
            | 0xFDF0..=0xFFFD
            | 0x10000..=0xEFFFF
    )
}

/// Check whether `c` matches the `NameChar` production except for ':'.
///
/// # Specification
/// ```text
/// [4a] NameChar ::= NameStartChar | "-" | "." | [0-9] | #xB7 | [#x0300-#x036F]
///                 | [#x203F-#x2040]
/// ```
pub fn xml_is_ncname_char(c: u32) -> bool {
    xml_is_ncname_start_char(c)
        || matches!(
            c,
            0x2D | 0x2E | 0x30..=0x39 | 0xB7 | 0x300..=0x36F | 0x203F..=0x2040
        )
}

/// Check whether `c` matches the `ucschar` production of RFC 3987.
pub fn xml_is_ucschar(c: u32) -> bool {
    matches!(
        c,
        0xA0..=0xD7FF
            | 0xF900..=0xFDCF
            | 0xFDF0..=0xFFEF
            | 0x10000..=0x1FFFD
            | 0x20000..=0x2FFFD
            | 0x30000..=0x3FFFD
            | 0x40000..=0x4FFFD
            | 0x50000..=0x5FFFD
            | 0x60000..=0x6FFFD
            | 0x70000..=0x7FFFD
            | 0x80000..=0x8FFFD
            | 0x90000..=0x9FFFD
            | 0xA0000..=0xAFFFD
            | 0xB0000..=0xBFFFD
            | 0xC0000..=0xCFFFD
            | 0xD0000..=0xDFFFD
            | 0xE1000..=0xEFFFD
    )
}

/// Check whether `c` matches the `iprivate` production of RFC 3987.
pub fn xml_is_iprivate(c: u32) -> bool {
    matches!(c, 0xE000..=0xF8FF | 0xF0000..=0xFFFFD | 0x100000..=0x10FFFD)
}
