//! Error taxonomy shared by every fallible operation of the crate.
//!
//! Each variant corresponds to one kind of failure. Variants that are caused by a
//! caller-supplied name, URI or piece of character data carry that value verbatim.

use std::{borrow::Cow, fmt, io::Write};

/// Plain error code corresponding to each variant of [`XmlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XmlErrorKind {
    /// A name fails the NCName or Name production.
    IllegalName,
    /// Character data contains a disallowed code point or an unpaired surrogate.
    IllegalData,
    /// A namespace URI or base URI fails RFC 3986/IRI grammar.
    MalformedUri,
    /// A prefix/URI binding collision or a misuse of a reserved prefix.
    NamespaceConflict,
    /// A structural violation of the tree.
    IllegalAdd,
    /// An already attached node is inserted elsewhere.
    MultipleParent,
    /// The attribute is not held by the element.
    NoSuchAttribute,
    /// The node is not a child of the parent.
    NoSuchChild,
    /// An index is outside of the valid range.
    IndexOutOfBounds,
    /// A well-formedness violation reported by the parser.
    Parsing,
    /// The document was built but is not valid against its DTD.
    Validity,
    /// The tree cannot be canonicalized.
    Canonicalization,
    /// The output sink failed.
    Io,
}

/// One DTD validity violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityIssue {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for ValidityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

/// Failure of DTD validation.
///
/// Validation runs after the tree was successfully built. The parser keeps the
/// best-effort document, and `Parser::take_invalid_document` hands it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityErrors {
    pub errors: Vec<ValidityIssue>,
}

#[derive(Debug, Clone)]
pub enum XmlError {
    IllegalName {
        name: String,
        message: Cow<'static, str>,
    },
    IllegalData {
        data: String,
        message: Cow<'static, str>,
    },
    MalformedUri {
        uri: String,
        message: Cow<'static, str>,
    },
    NamespaceConflict {
        message: Cow<'static, str>,
    },
    IllegalAdd {
        message: Cow<'static, str>,
    },
    MultipleParent {
        message: Cow<'static, str>,
    },
    NoSuchAttribute {
        name: String,
    },
    NoSuchChild {
        message: Cow<'static, str>,
    },
    IndexOutOfBounds {
        index: usize,
        len: usize,
    },
    Parsing {
        message: String,
        line: usize,
        column: usize,
    },
    Validity(Box<ValidityErrors>),
    Canonicalization {
        message: Cow<'static, str>,
    },
    Io {
        message: String,
    },
}

impl XmlError {
    pub(crate) fn illegal_name(name: &str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::IllegalName {
            name: name.to_owned(),
            message: message.into(),
        }
    }

    pub(crate) fn illegal_data(data: &str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::IllegalData {
            data: data.to_owned(),
            message: message.into(),
        }
    }

    pub(crate) fn malformed_uri(uri: &str, message: impl Into<Cow<'static, str>>) -> Self {
        Self::MalformedUri {
            uri: uri.to_owned(),
            message: message.into(),
        }
    }

    pub(crate) fn namespace_conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::NamespaceConflict {
            message: message.into(),
        }
    }

    pub(crate) fn illegal_add(message: impl Into<Cow<'static, str>>) -> Self {
        Self::IllegalAdd {
            message: message.into(),
        }
    }

    pub(crate) fn multiple_parent(message: impl Into<Cow<'static, str>>) -> Self {
        Self::MultipleParent {
            message: message.into(),
        }
    }

    pub(crate) fn canonicalization(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Canonicalization {
            message: message.into(),
        }
    }

    /// Return the error code of this error.
    pub fn kind(&self) -> XmlErrorKind {
        match self {
            Self::IllegalName { .. } => XmlErrorKind::IllegalName,
            Self::IllegalData { .. } => XmlErrorKind::IllegalData,
            Self::MalformedUri { .. } => XmlErrorKind::MalformedUri,
            Self::NamespaceConflict { .. } => XmlErrorKind::NamespaceConflict,
            Self::IllegalAdd { .. } => XmlErrorKind::IllegalAdd,
            Self::MultipleParent { .. } => XmlErrorKind::MultipleParent,
            Self::NoSuchAttribute { .. } => XmlErrorKind::NoSuchAttribute,
            Self::NoSuchChild { .. } => XmlErrorKind::NoSuchChild,
            Self::IndexOutOfBounds { .. } => XmlErrorKind::IndexOutOfBounds,
            Self::Parsing { .. } => XmlErrorKind::Parsing,
            Self::Validity(_) => XmlErrorKind::Validity,
            Self::Canonicalization { .. } => XmlErrorKind::Canonicalization,
            Self::Io { .. } => XmlErrorKind::Io,
        }
    }
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalName { name, message } => write!(f, "{message}: '{name}'"),
            Self::IllegalData { data, message } => write!(f, "{message}: '{data}'"),
            Self::MalformedUri { uri, message } => write!(f, "{message}: '{uri}'"),
            Self::NamespaceConflict { message }
            | Self::IllegalAdd { message }
            | Self::MultipleParent { message }
            | Self::NoSuchChild { message }
            | Self::Canonicalization { message } => f.write_str(message),
            Self::NoSuchAttribute { name } => {
                write!(f, "the attribute '{name}' is not held by this element")
            }
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} is out of bounds (length {len})")
            }
            Self::Parsing {
                message,
                line,
                column,
            } => write!(f, "{line}:{column}: {message}"),
            Self::Validity(errors) => {
                write!(f, "the document is not valid")?;
                for err in &errors.errors {
                    write!(f, "\n{err}")?;
                }
                Ok(())
            }
            Self::Io { message } => write!(f, "I/O error: {message}"),
        }
    }
}

impl std::error::Error for XmlError {}

impl From<std::io::Error> for XmlError {
    fn from(value: std::io::Error) -> Self {
        Self::Io {
            message: value.to_string(),
        }
    }
}

/// Severity of a diagnostic reported through the global error handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum XmlErrorLevel {
    Warning,
    Error,
}

/// A recoverable diagnostic.
#[derive(Debug, Clone)]
pub struct XmlDiagnostic {
    pub level: XmlErrorLevel,
    pub error: XmlError,
}

impl fmt::Display for XmlDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            XmlErrorLevel::Warning => write!(f, "warning: {}", self.error),
            XmlErrorLevel::Error => write!(f, "error: {}", self.error),
        }
    }
}

/// Default generic error function.
///
/// Write `msg` to `out` if a context is set, to the standard error otherwise.
pub fn generic_error_default(out: Option<&mut (dyn Write + 'static)>, msg: &str) {
    if let Some(out) = out {
        write!(out, "{msg}").ok();
    } else {
        eprint!("{msg}");
    }
}

/// Report a recoverable diagnostic.
///
/// The diagnostic becomes the last error of this thread. If a structured error
/// handler is registered, it receives the diagnostic. Otherwise, the formatted message
/// is passed to the generic error function.
pub(crate) fn report_diagnostic(level: XmlErrorLevel, error: XmlError) {
    use crate::globals::GLOBAL_STATE;

    let diagnostic = XmlDiagnostic { level, error };
    let structured = GLOBAL_STATE.with_borrow_mut(|state| {
        state.last_error = Some(diagnostic.clone());
        state.structured_error
    });
    if let Some(handler) = structured {
        handler(&diagnostic);
        return;
    }
    let msg = format!("{diagnostic}\n");
    GLOBAL_STATE.with_borrow_mut(|state| {
        let func = state.generic_error;
        func(state.generic_error_context.as_deref_mut(), &msg);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_offending_values() {
        let err = XmlError::illegal_name("1abc", "Invalid NCName");
        assert_eq!(err.kind(), XmlErrorKind::IllegalName);
        assert!(err.to_string().contains("1abc"));

        let err = XmlError::malformed_uri("http://a b", "illegal character ' '");
        assert!(err.to_string().contains("http://a b"));

        let err = XmlError::IndexOutOfBounds { index: 3, len: 1 };
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn errors_convert_into_anyhow() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<XmlError>();

        let err = XmlError::Validity(Box::new(ValidityErrors {
            errors: vec![ValidityIssue {
                message: "No declaration for element a".to_owned(),
                line: 2,
                column: 5,
            }],
        }));
        let err = anyhow::Error::from(err);
        let err = err.downcast_ref::<XmlError>().unwrap();
        assert_eq!(err.kind(), XmlErrorKind::Validity);
        assert!(err.to_string().contains("2:5: No declaration for element a"));
    }
}
