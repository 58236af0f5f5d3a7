//! Encoded output buffer.

use std::io::{self, Write};

use crate::{
    encoding::XmlCharEncoding,
    error::{XmlError, XmlErrorLevel, report_diagnostic},
};

const FLUSH_THRESHOLD: usize = 4000;

/// A buffer that encodes UTF-8 text into the output encoding and writes it to a sink.
pub struct XmlOutputBuffer<'a> {
    context: Box<dyn Write + 'a>,
    encoding: XmlCharEncoding,
    buffer: String,
    conv: Vec<u8>,
    written: usize,
    started: bool,
    reported_unmappable: bool,
}

impl<'a> XmlOutputBuffer<'a> {
    pub fn from_writer(writer: impl Write + 'a, encoding: XmlCharEncoding) -> Self {
        Self {
            context: Box::new(writer),
            encoding,
            buffer: String::new(),
            conv: vec![],
            written: 0,
            started: false,
            reported_unmappable: false,
        }
    }

    pub fn encoding(&self) -> XmlCharEncoding {
        self.encoding
    }

    /// Append `s` to the buffer.
    pub fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.buffer.push_str(s);
        if self.buffer.len() > FLUSH_THRESHOLD {
            self.encode_and_write()?;
        }
        Ok(())
    }

    fn encode_and_write(&mut self) -> io::Result<()> {
        if !self.started {
            self.started = true;
            self.conv.extend_from_slice(self.encoding.bom());
        }
        if self.encoding.encode_into(&self.buffer, &mut self.conv) && !self.reported_unmappable {
            self.reported_unmappable = true;
            report_diagnostic(
                XmlErrorLevel::Warning,
                XmlError::Io {
                    message: format!(
                        "some characters cannot be represented in {} and are written as character references",
                        self.encoding
                    ),
                },
            );
        }
        self.buffer.clear();
        self.context.write_all(&self.conv)?;
        self.written += self.conv.len();
        self.conv.clear();
        Ok(())
    }

    /// Write all pending data to the sink and flush it.
    pub fn flush(&mut self) -> io::Result<()> {
        self.encode_and_write()?;
        self.context.flush()
    }

    /// Return the number of bytes written to the sink.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl Write for XmlOutputBuffer<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = std::str::from_utf8(buf)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        self.write_str(s)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        XmlOutputBuffer::flush(self)
    }
}
