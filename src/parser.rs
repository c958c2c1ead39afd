//
// parser.rs
// Bundle-Pseudonymizer-rs
//
// Event-driven single pass over a bundle: root tags are forwarded directly, each top-level entry is
// accumulated on its own and handed over as soon as it closes.
//
// Thales Matheus Mendonça Santos - November 2025

use std::io::BufRead;

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, trace, warn};

use crate::error::{PseudonymError, Result};
use crate::record::{Element, RecordBuilder};

/// Receives the document in order. Only one entry is ever alive at a time.
pub trait BundleVisitor {
    fn start_document(&mut self) -> Result<()>;
    /// Root element with its attributes; children arrive as `record` calls.
    fn open_root(&mut self, root: &Element) -> Result<()>;
    fn record(&mut self, index: usize, record: Element) -> Result<()>;
    fn close_root(&mut self, name: &str) -> Result<()>;
}

pub struct StreamParser<R: BufRead> {
    reader: Reader<R>,
    builder: RecordBuilder,
    depth: usize,
    root_seen: bool,
    records: usize,
}

impl<R: BufRead> StreamParser<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: Reader::from_reader(input),
            builder: RecordBuilder::new(),
            depth: 0,
            root_seen: false,
            records: 0,
        }
    }

    /// Drives the whole document through `visitor`. Returns the number of entries seen.
    pub fn run<V: BundleVisitor>(mut self, visitor: &mut V) -> Result<usize> {
        visitor.start_document()?;
        let mut buf = Vec::new();
        loop {
            let event = match self.reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(err) => {
                    return Err(PseudonymError::malformed(
                        self.reader.error_position() as u64,
                        err.to_string(),
                    ))
                }
            };
            let position = self.reader.buffer_position() as u64;
            match event {
                Event::Start(start) => {
                    let element = element_from(&start, position)?;
                    self.open(element, visitor, position)?;
                }
                Event::Empty(start) => {
                    let element = element_from(&start, position)?;
                    let name = element.name.clone();
                    self.open(element, visitor, position)?;
                    self.close(&name, visitor, position)?;
                }
                Event::End(end) => {
                    let name = utf8(end.name().as_ref(), position)?.to_string();
                    self.close(&name, visitor, position)?;
                }
                Event::Text(text) => {
                    let text = utf8(&text, position)?.to_string();
                    self.text(&text, position)?;
                }
                Event::CData(cdata) => {
                    let text = utf8(&cdata, position)?.to_string();
                    self.text(&text, position)?;
                }
                Event::GeneralRef(reference) => {
                    let text = resolve_reference(&reference, position)?;
                    self.text(&text, position)?;
                }
                Event::Eof => break,
                other => trace!(event = ?other, "skipping non-content event"),
            }
            buf.clear();
        }

        if self.depth != 0 {
            return Err(PseudonymError::malformed(
                self.reader.buffer_position() as u64,
                format!("document ended with {} unclosed element(s)", self.depth),
            ));
        }
        if !self.root_seen {
            return Err(PseudonymError::malformed(0, "document has no root element"));
        }
        debug!(records = self.records, "finished reading bundle");
        Ok(self.records)
    }

    fn open<V: BundleVisitor>(&mut self, element: Element, visitor: &mut V, position: u64) -> Result<()> {
        if self.depth == 0 {
            if self.root_seen {
                return Err(PseudonymError::malformed(position, "more than one root element"));
            }
            self.root_seen = true;
            visitor.open_root(&element)?;
        } else {
            self.builder.open(element);
        }
        self.depth += 1;
        Ok(())
    }

    fn close<V: BundleVisitor>(&mut self, name: &str, visitor: &mut V, position: u64) -> Result<()> {
        match self.depth {
            0 => {
                return Err(PseudonymError::malformed(
                    position,
                    format!("unexpected closing tag </{name}>"),
                ))
            }
            1 => visitor.close_root(name)?,
            _ => {
                if let Some(record) = self.builder.close() {
                    let index = self.records;
                    self.records += 1;
                    visitor.record(index, record)?;
                }
            }
        }
        self.depth -= 1;
        Ok(())
    }

    fn text(&mut self, text: &str, position: u64) -> Result<()> {
        if self.builder.is_building() {
            self.builder.text(text);
        } else if !text.trim().is_empty() {
            if self.depth == 0 {
                return Err(PseudonymError::malformed(position, "text outside of the root element"));
            }
            warn!(position, "dropping text outside of any entry");
        }
        Ok(())
    }
}

fn utf8(bytes: &[u8], position: u64) -> Result<&str> {
    std::str::from_utf8(bytes)
        .map_err(|err| PseudonymError::malformed(position, format!("invalid UTF-8: {err}")))
}

fn element_from(start: &BytesStart<'_>, position: u64) -> Result<Element> {
    let mut element = Element::new(utf8(start.name().as_ref(), position)?);
    for attr in start.attributes() {
        let attr = attr.map_err(|err| PseudonymError::malformed(position, err.to_string()))?;
        let key = utf8(attr.key.as_ref(), position)?.to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| PseudonymError::malformed(position, err.to_string()))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn resolve_reference(reference: &BytesRef<'_>, position: u64) -> Result<String> {
    if let Some(ch) = reference
        .resolve_char_ref()
        .map_err(|err| PseudonymError::malformed(position, err.to_string()))?
    {
        return Ok(ch.to_string());
    }
    let name = utf8(reference, position)?;
    resolve_predefined_entity(name)
        .map(str::to_string)
        .ok_or_else(|| PseudonymError::malformed(position, format!("unknown entity &{name};")))
}
