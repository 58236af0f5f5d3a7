//! Character encodings for input decoding and serialized output.
//!
//! UTF-8, UTF-16, ISO-8859-1 and US-ASCII are handled here directly.
//! Every other label is resolved through `encoding_rs`.

use std::{borrow::Cow, fmt, str::FromStr};

use encoding_rs::{DecoderResult, Encoding, UTF_16BE, UTF_16LE, mem::decode_latin1};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlCharEncoding {
    UTF8,
    /// UTF-16 with a byte order mark. Output is big endian.
    UTF16,
    UTF16LE,
    UTF16BE,
    ISO8859_1,
    ASCII,
    Other(&'static Encoding),
}

impl XmlCharEncoding {
    /// Return the name written into an XML declaration.
    pub fn get_name(&self) -> &'static str {
        match self {
            Self::UTF8 => "UTF-8",
            Self::UTF16 => "UTF-16",
            Self::UTF16LE => "UTF-16LE",
            Self::UTF16BE => "UTF-16BE",
            Self::ISO8859_1 => "ISO-8859-1",
            Self::ASCII => "US-ASCII",
            Self::Other(enc) => enc.name(),
        }
    }

    /// Return the largest code point that is always representable, if any.
    fn max_char(&self) -> Option<u32> {
        match self {
            Self::ISO8859_1 => Some(0xFF),
            Self::ASCII => Some(0x7F),
            _ => None,
        }
    }

    /// Check if `c` can be written without a character reference.
    pub fn can_encode(&self, c: char) -> bool {
        match self {
            Self::UTF8 | Self::UTF16 | Self::UTF16LE | Self::UTF16BE => true,
            Self::ISO8859_1 | Self::ASCII => self.max_char().is_some_and(|max| c as u32 <= max),
            Self::Other(enc) => {
                let mut buf = [0; 4];
                let (_, _, unmappable) = enc.encode(c.encode_utf8(&mut buf));
                !unmappable
            }
        }
    }

    /// Encode `src` and append the result to `out`.
    ///
    /// Characters that cannot be represented are written as character references.
    /// Return `true` if such a replacement happened.
    pub fn encode_into(&self, src: &str, out: &mut Vec<u8>) -> bool {
        match self {
            Self::UTF8 => {
                out.extend_from_slice(src.as_bytes());
                false
            }
            Self::UTF16 | Self::UTF16BE => {
                out.extend(src.encode_utf16().flat_map(|u| u.to_be_bytes()));
                false
            }
            Self::UTF16LE => {
                out.extend(src.encode_utf16().flat_map(|u| u.to_le_bytes()));
                false
            }
            Self::ISO8859_1 | Self::ASCII => {
                let max = self.max_char().unwrap_or(0x7F);
                let mut replaced = false;
                for c in src.chars() {
                    if c as u32 <= max {
                        out.push(c as u8);
                    } else {
                        out.extend_from_slice(format!("&#x{:X};", c as u32).as_bytes());
                        replaced = true;
                    }
                }
                replaced
            }
            Self::Other(enc) => {
                // `encoding_rs` writes decimal character references for unmappable characters.
                let (bytes, _, unmappable) = enc.encode(src);
                out.extend_from_slice(&bytes);
                unmappable
            }
        }
    }

    /// Return the bytes written before any content.
    pub fn bom(&self) -> &'static [u8] {
        match self {
            Self::UTF16 => &[0xFE, 0xFF],
            _ => &[],
        }
    }

    /// Decode `src` into a string.
    ///
    /// A byte order mark matching this encoding is skipped.
    pub fn decode<'a>(&self, src: &'a [u8]) -> Result<Cow<'a, str>, EncodingError> {
        match self {
            Self::UTF8 => {
                let src = src.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(src);
                std::str::from_utf8(src)
                    .map(Cow::Borrowed)
                    .map_err(|err| EncodingError::Malformed {
                        offset: err.valid_up_to(),
                    })
            }
            Self::UTF16 => match src {
                [0xFF, 0xFE, rem @ ..] => decode_with(UTF_16LE, rem),
                [0xFE, 0xFF, rem @ ..] => decode_with(UTF_16BE, rem),
                _ => decode_with(UTF_16BE, src),
            },
            Self::UTF16LE => decode_with(UTF_16LE, src.strip_prefix(&[0xFF, 0xFE]).unwrap_or(src)),
            Self::UTF16BE => decode_with(UTF_16BE, src.strip_prefix(&[0xFE, 0xFF]).unwrap_or(src)),
            Self::ISO8859_1 => Ok(decode_latin1(src)),
            Self::ASCII => match src.iter().position(|b| !b.is_ascii()) {
                Some(offset) => Err(EncodingError::Malformed { offset }),
                None => Ok(String::from_utf8_lossy(src)),
            },
            Self::Other(enc) => decode_with(*enc, src),
        }
    }
}

fn decode_with<'a>(
    encoding: &'static Encoding,
    src: &[u8],
) -> Result<Cow<'a, str>, EncodingError> {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let capacity = decoder
        .max_utf8_buffer_length_without_replacement(src.len())
        .ok_or(EncodingError::Other {
            msg: "the input is too large".into(),
        })?;
    let mut dst = String::with_capacity(capacity);
    let (res, read) = decoder.decode_to_string_without_replacement(src, &mut dst, true);
    match res {
        DecoderResult::InputEmpty => Ok(Cow::Owned(dst)),
        DecoderResult::Malformed(length, extra) => Err(EncodingError::Malformed {
            offset: read - length as usize - extra as usize,
        }),
        DecoderResult::OutputFull => Err(EncodingError::Other {
            msg: "the output buffer is too short".into(),
        }),
    }
}

impl FromStr for XmlCharEncoding {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_uppercase();
        match name.as_str() {
            "UTF-8" | "UTF8" => Ok(Self::UTF8),
            "UTF-16" | "UTF16" => Ok(Self::UTF16),
            "UTF-16LE" => Ok(Self::UTF16LE),
            "UTF-16BE" => Ok(Self::UTF16BE),
            "ISO-8859-1" | "ISO_8859-1" | "ISO-LATIN-1" | "LATIN1" | "L1" => Ok(Self::ISO8859_1),
            "US-ASCII" | "ASCII" => Ok(Self::ASCII),
            _ => Encoding::for_label(name.as_bytes())
                .map(Self::Other)
                .ok_or(EncodingError::Unsupported { name: s.to_owned() }),
        }
    }
}

impl fmt::Display for XmlCharEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.get_name())
    }
}

#[derive(Debug, Clone)]
pub enum EncodingError {
    /// Malformed byte sequence is found at `offset`.
    Malformed { offset: usize },
    /// No encoding matches the label.
    Unsupported { name: String },
    /// Other errors.
    Other { msg: Cow<'static, str> },
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { offset } => write!(f, "malformed byte sequence at offset {offset}"),
            Self::Unsupported { name } => write!(f, "unsupported encoding '{name}'"),
            Self::Other { msg } => f.write_str(msg),
        }
    }
}

impl std::error::Error for EncodingError {}

/// Guess the encoding of `input` from its first bytes.
///
/// Return `None` if `input` starts with neither a byte order mark nor `<?`.
pub fn detect_encoding(input: &[u8]) -> Option<XmlCharEncoding> {
    match input {
        [0xEF, 0xBB, 0xBF, ..] => Some(XmlCharEncoding::UTF8),
        [0xFE, 0xFF, ..] | [0xFF, 0xFE, ..] => Some(XmlCharEncoding::UTF16),
        [0x3C, 0x00, 0x3F, 0x00, ..] => Some(XmlCharEncoding::UTF16LE),
        [0x00, 0x3C, 0x00, 0x3F, ..] => Some(XmlCharEncoding::UTF16BE),
        [0x3C, 0x3F, 0x78, 0x6D, ..] => Some(XmlCharEncoding::UTF8),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_with_character_references() {
        const CASES: &[(&str, &str, &[u8])] = &[
            ("UTF-8", "é", "é".as_bytes()),
            ("ISO-8859-1", "é€", b"\xE9&#x20AC;"),
            ("US-ASCII", "aé", b"a&#xE9;"),
            ("UTF-16", "a", b"\x00a"),
            ("UTF-16LE", "a", b"a\x00"),
            ("ISO-8859-2", "\u{0159}\u{3042}", b"\xF8&#12354;"),
        ];
        for &(label, src, expected) in CASES {
            let enc = label.parse::<XmlCharEncoding>().unwrap();
            let mut out = vec![];
            enc.encode_into(src, &mut out);
            assert_eq!(out, expected, "{label}");
        }
        assert!("x-unknown".parse::<XmlCharEncoding>().is_err());
    }

    #[test]
    fn decode_input() {
        let enc = detect_encoding(b"\xFF\xFE<\x00?\x00").unwrap();
        assert_eq!(enc.decode(b"\xFF\xFE<\x00?\x00").unwrap(), "<?");
        assert_eq!(XmlCharEncoding::ISO8859_1.decode(b"\xE9").unwrap(), "é");
        assert!(matches!(
            XmlCharEncoding::UTF8.decode(b"ab\xFF"),
            Err(EncodingError::Malformed { offset: 2 })
        ));
        assert!(XmlCharEncoding::ASCII.decode(b"\x80").is_err());
    }
}
