//
// emitter.rs
// Bundle-Pseudonymizer-rs
//
// Output side of the stream: writes the preamble, the root tags, and each finished entry as soon as it is ready.
//
// Thales Matheus Mendonça Santos - November 2025

use std::borrow::Cow;
use std::io::Write;

use quick_xml::escape::escape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::Writer;

use crate::error::{PseudonymError, Result};
use crate::record::{Element, Node};

/// Synchronous sink for a rebuilt bundle. Each call is written through immediately.
pub trait BundleSink {
    fn write_preamble(&mut self) -> Result<()>;
    fn write_open(&mut self, root: &Element) -> Result<()>;
    fn write_record(&mut self, record: &Element) -> Result<()>;
    fn write_close(&mut self, name: &str) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// Serializes XML onto any writer, one line per root tag and per entry.
pub struct XmlSink<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> XmlSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: Writer::new(inner),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn event<'a>(&mut self, event: Event<'a>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(PseudonymError::output)
    }

    fn newline(&mut self) -> Result<()> {
        self.writer
            .get_mut()
            .write_all(b"\n")
            .map_err(PseudonymError::output)
    }

    fn element(&mut self, element: &Element) -> Result<()> {
        let start = start_tag(element);
        if element.children.is_empty() {
            return self.event(Event::Empty(start));
        }
        self.event(Event::Start(start))?;
        for child in &element.children {
            match child {
                Node::Element(el) => self.element(el)?,
                Node::Text(text) => self.event(Event::Text(BytesText::new(text)))?,
            }
        }
        self.event(Event::End(BytesEnd::new(element.name.as_str())))
    }
}

fn start_tag(element: &Element) -> BytesStart<'_> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute(Attribute {
            key: QName(key.as_bytes()),
            value: Cow::Owned(escape_attribute(value).into_bytes()),
        });
    }
    start
}

// Literal whitespace controls would be normalized to spaces by the next reader.
fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in escape(value).chars() {
        match ch {
            '\n' => escaped.push_str("&#10;"),
            '\r' => escaped.push_str("&#13;"),
            '\t' => escaped.push_str("&#9;"),
            other => escaped.push(other),
        }
    }
    escaped
}

impl<W: Write> BundleSink for XmlSink<W> {
    fn write_preamble(&mut self) -> Result<()> {
        self.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.newline()
    }

    fn write_open(&mut self, root: &Element) -> Result<()> {
        self.event(Event::Start(start_tag(root)))?;
        self.newline()
    }

    fn write_record(&mut self, record: &Element) -> Result<()> {
        self.element(record)?;
        self.newline()
    }

    fn write_close(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))?;
        self.newline()
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.get_mut().flush().map_err(PseudonymError::output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(f: impl FnOnce(&mut XmlSink<Vec<u8>>) -> Result<()>) -> String {
        let mut sink = XmlSink::new(Vec::new());
        f(&mut sink).unwrap();
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn writes_document_frame_in_order() {
        let root = Element::new("Bundle").with_attribute("xmlns", "http://hl7.org/fhir");
        let out = render(|sink| {
            sink.write_preamble()?;
            sink.write_open(&root)?;
            sink.write_record(&Element::new("entry"))?;
            sink.write_close("Bundle")?;
            sink.finish()
        });
        assert_eq!(
            out,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Bundle xmlns=\"http://hl7.org/fhir\">\n<entry/>\n</Bundle>\n"
        );
    }

    #[test]
    fn escapes_text_and_attributes() {
        let mut note = Element::new("note").with_attribute("value", "a \"b\" & <c>");
        note.children.push(Node::Text("1 < 2".into()));
        let out = render(|sink| sink.write_record(&Element::new("entry").with_child(note)));
        assert!(out.starts_with("<entry><note value=\""));
        assert!(out.contains("&quot;b&quot;"));
        assert!(out.contains(" &amp; &lt;c"));
        assert!(!out.contains("<c>"));
        assert!(out.ends_with(">1 &lt; 2</note></entry>\n"));
    }

    #[test]
    fn attribute_whitespace_controls_survive_reparsing() {
        let note = Element::new("note").with_attribute("value", "a\nb\tc\r");
        let out = render(|sink| sink.write_record(&note));
        assert_eq!(out, "<note value=\"a&#10;b&#9;c&#13;\"/>\n");

        let mut reader = quick_xml::Reader::from_str(&out);
        let Event::Empty(start) = reader.read_event().unwrap() else {
            panic!("expected an empty element");
        };
        let attr = start.attributes().next().unwrap().unwrap();
        assert_eq!(attr.unescape_value().unwrap(), "a\nb\tc\r");
    }
}
