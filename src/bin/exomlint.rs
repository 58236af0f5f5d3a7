//! A small tester program for XML input.
//!
//! Each file is parsed, optionally validated, then written back either with the
//! serializer or in a canonical form.

use std::{
    fs::File,
    io::{BufWriter, Write, stdout},
    process::ExitCode,
};

use anyhow::{Context, bail};
use clap::Parser;
use exom::{
    XmlError,
    c14n::{CanonicalAlgorithm, Canonicalizer},
    globals::{get_version, set_tree_indent_string},
    parser::{ParseOptions, Parser as XmlParser},
    save::{SerializeOptions, Serializer},
    tree::{DocumentRef, NodeRef},
};

// Return codes.
const RETURN_OK: u8 = 0;
const ERR_UNCLASS: u8 = 1;
const ERR_VALID: u8 = 3;
const ERR_RDFILE: u8 = 4;
const ERR_OUT: u8 = 6;

#[derive(clap::Parser)]
#[command(version, name = "exomlint", arg_required_else_help = true)]
struct CmdArgs {
    #[clap(required = true)]
    xml_files: Vec<String>,
    /// validate the document against its internal DTD subset
    #[arg(long)]
    valid: bool,
    /// don't output the result tree
    #[arg(long)]
    noout: bool,
    /// save to a given file
    #[arg(short, long, value_name = "file")]
    output: Option<String>,
    /// format the output with the default indentation
    #[arg(long)]
    format: bool,
    /// number of spaces per nesting level, implies --format
    #[arg(long, value_name = "n")]
    indent: Option<usize>,
    /// preferred maximum line length
    #[arg(long = "max-length", value_name = "n", default_value_t = 0)]
    max_length: usize,
    /// line separator written between lines
    #[arg(long = "line-separator", value_name = "sep", value_parser = ["lf", "cr", "crlf"])]
    line_separator: Option<String>,
    /// output in the given encoding
    #[arg(long, value_name = "encoding")]
    encode: Option<String>,
    /// write xml:base attributes where the base URI changes
    #[arg(long = "preserve-base")]
    preserve_base: bool,
    /// base URI of the input documents
    #[arg(long = "base-uri", value_name = "URI")]
    base_uri: Option<String>,
    /// save in canonical form: c14n, c14n-comments, c14n11, c14n11-comments,
    /// exc-c14n or exc-c14n-comments
    #[arg(long, value_name = "algorithm")]
    c14n: Option<CanonicalAlgorithm>,
    /// prefixes treated as in inclusive canonicalization, with exc-c14n
    #[arg(long = "inclusive-prefixes", value_name = "prefix", num_args = 1.., value_delimiter = ',')]
    inclusive_prefixes: Vec<String>,
    /// be quiet when succeeded
    #[arg(long)]
    quiet: bool,
}

impl CmdArgs {
    fn serialize_options(&self) -> anyhow::Result<SerializeOptions> {
        let mut options = if self.format {
            SerializeOptions::formatted()
        } else {
            SerializeOptions::default()
        };
        if let Some(indent) = self.indent {
            set_tree_indent_string(" ".repeat(indent));
            options = options.with_indent(indent);
        }
        if let Some(label) = self.encode.as_deref() {
            options = options.with_encoding(label)?;
        }
        if let Some(separator) = self.line_separator.as_deref() {
            let separator = match separator {
                "cr" => "\r",
                "crlf" => "\r\n",
                _ => "\n",
            };
            options = options.with_line_separator(separator)?;
        }
        Ok(options
            .with_max_length(self.max_length)
            .with_preserve_base_uri(self.preserve_base))
    }

    fn canonicalizer(&self) -> anyhow::Result<Option<Canonicalizer>> {
        let Some(algorithm) = self.c14n else {
            if !self.inclusive_prefixes.is_empty() {
                bail!("--inclusive-prefixes requires --c14n");
            }
            return Ok(None);
        };
        Ok(Some(
            Canonicalizer::new(algorithm).with_inclusive_prefixes(&self.inclusive_prefixes),
        ))
    }
}

fn write_document(
    doc: &DocumentRef,
    args: &CmdArgs,
    canonicalizer: Option<&Canonicalizer>,
    out: impl Write,
) -> anyhow::Result<()> {
    match canonicalizer {
        Some(canonicalizer) => {
            canonicalizer.canonicalize(&NodeRef::Document(doc.clone()), None, out)?;
        }
        None => {
            let mut serializer = Serializer::new(out, args.serialize_options()?);
            serializer.write_document(doc)?;
            serializer.flush()?;
        }
    }
    Ok(())
}

fn process_file(
    file: &str,
    args: &CmdArgs,
    canonicalizer: Option<&Canonicalizer>,
    out: &mut dyn Write,
) -> u8 {
    let mut options = ParseOptions::new().with_validation(args.valid);
    if let Some(base_uri) = args.base_uri.as_deref() {
        options = options.with_base_uri(base_uri);
    }
    let mut parser = XmlParser::new(options);
    let doc = match parser.parse_file(file) {
        Ok(doc) => doc,
        Err(XmlError::Parsing {
            message,
            line,
            column,
        }) => {
            eprintln!("{file}:{line}:{column}: parser error : {message}");
            return ERR_UNCLASS;
        }
        Err(XmlError::Validity(_)) => {
            // Every issue was already reported through the error handlers.
            eprintln!("{file} fails to validate");
            if let Some(doc) = parser.take_invalid_document().filter(|_| !args.noout) {
                if let Err(err) = write_document(&doc, args, canonicalizer, out) {
                    eprintln!("{file}: failed to save: {err:#}");
                    return ERR_OUT;
                }
            }
            return ERR_VALID;
        }
        Err(XmlError::Io { message }) => {
            eprintln!("{file}: failed to load: {message}");
            return ERR_RDFILE;
        }
        Err(err) => {
            eprintln!("{file}: {err}");
            return ERR_UNCLASS;
        }
    };

    if args.valid && !args.quiet {
        eprintln!("{file} validates");
    }
    if !args.noout {
        if let Err(err) = write_document(&doc, args, canonicalizer, out) {
            eprintln!("{file}: failed to save: {err:#}");
            return ERR_OUT;
        }
    }
    RETURN_OK
}

fn run(args: &CmdArgs) -> anyhow::Result<u8> {
    let canonicalizer = args.canonicalizer()?;
    // Check the options once before any file is read.
    args.serialize_options()?;

    let mut out: Box<dyn Write> = match args.output.as_deref() {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to open {path}"))?,
        )),
        None => Box::new(stdout().lock()),
    };
    let mut progresult = RETURN_OK;
    for file in &args.xml_files {
        let ret = process_file(file, args, canonicalizer.as_ref(), &mut out);
        if ret != RETURN_OK {
            progresult = ret;
        }
    }
    out.flush()?;
    Ok(progresult)
}

fn main() -> ExitCode {
    let args = CmdArgs::parse();
    match run(&args) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("exomlint {}: {err:#}", get_version());
            ExitCode::from(ERR_UNCLASS)
        }
    }
}
