//! Per-thread global state.
//!
//! The tree itself is single-threaded, so the handlers that receive diagnostics
//! live in a thread local storage rather than behind a lock.

use std::{borrow::Cow, cell::RefCell, io::Write};

use const_format::concatcp;

use crate::error::{XmlDiagnostic, generic_error_default};

pub type GenericError = for<'a> fn(Option<&mut (dyn Write + 'static)>, &str);
pub type StructuredError = fn(&XmlDiagnostic);

pub struct XmlGlobalState {
    version: Cow<'static, str>,
    pub(crate) generic_error: GenericError,
    pub(crate) generic_error_context: Option<Box<dyn Write>>,
    pub(crate) structured_error: Option<StructuredError>,
    pub(crate) last_error: Option<XmlDiagnostic>,
    pub(crate) tree_indent_string: Cow<'static, str>,
}

impl XmlGlobalState {
    fn new() -> Self {
        const VERSION_STRING: &str = concatcp!(
            env!("CARGO_PKG_VERSION_MAJOR"),
            ".",
            env!("CARGO_PKG_VERSION_MINOR"),
            ".",
            env!("CARGO_PKG_VERSION_PATCH")
        );
        Self {
            version: Cow::Borrowed(VERSION_STRING),
            generic_error: generic_error_default,
            generic_error_context: None,
            structured_error: None,
            last_error: None,
            tree_indent_string: Cow::Borrowed("  "),
        }
    }
}

thread_local! {
    pub static GLOBAL_STATE: RefCell<XmlGlobalState> = RefCell::new(XmlGlobalState::new());
}

/// Return the version string of this library.
pub fn get_version() -> Cow<'static, str> {
    GLOBAL_STATE.with_borrow(|state| state.version.clone())
}

/// Set new generic error function and generic error context.
///
/// If `func` is `None`, set `generic_error_default`.  
/// If `context` is `None`, current context is clear and no context is set.  
pub fn set_generic_error(func: Option<GenericError>, context: Option<impl Write + 'static>) {
    GLOBAL_STATE.with_borrow_mut(|state| {
        state.generic_error = func.unwrap_or(generic_error_default);
        state.generic_error_context = context.map(|context| {
            let boxed: Box<dyn Write + 'static> = Box::new(context);
            boxed
        });
    });
}

/// Set new structured error handler.
///
/// While a structured handler is set, the generic error function is not called.
pub fn set_structured_error(func: Option<StructuredError>) {
    GLOBAL_STATE.with_borrow_mut(|state| state.structured_error = func);
}

/// Get the last diagnostic reported on this thread.
pub fn get_last_error() -> Option<XmlDiagnostic> {
    GLOBAL_STATE.with_borrow(|state| state.last_error.clone())
}

/// Clear the last diagnostic.
pub fn reset_last_error() {
    GLOBAL_STATE.with_borrow_mut(|state| state.last_error = None);
}

/// Set the string used for one level of indentation when `indent` is not given
/// explicitly to the serializer.
///
/// Only runs of spaces are accepted. Otherwise, the current setting is kept.
pub fn set_tree_indent_string(indent: impl Into<Cow<'static, str>>) {
    let indent = indent.into();
    if indent.bytes().all(|b| b == b' ') {
        GLOBAL_STATE.with_borrow_mut(|state| state.tree_indent_string = indent);
    }
}

/// Get the string used for one level of indentation.
pub fn get_tree_indent_string() -> Cow<'static, str> {
    GLOBAL_STATE.with_borrow(|state| state.tree_indent_string.clone())
}
