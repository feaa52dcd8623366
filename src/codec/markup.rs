// Markup tree
// Minimal attributed element tree over quick-xml for annotation info files

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;
use std::fmt::Write as _;
use std::path::Path;

use super::error::{CodecError, CodecResult};

/// An element with ordered attributes and child elements.
/// Text content is not kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Element {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Builder form of [`Element::set_attribute`]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Set an attribute, replacing an existing value
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl ToString) {
        let name = name.into();
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Required attribute, or a missing-attribute error naming this element
    pub fn require_attribute(&self, name: &str) -> CodecResult<&str> {
        self.attribute(name).ok_or_else(|| {
            log::warn!("attribute <{}> missing in <{}>", name, self.tag);
            CodecError::MissingAttribute {
                element: self.tag.clone(),
                attribute: name.to_string(),
            }
        })
    }

    /// Required attribute parsed into `T`
    pub fn parse_attribute<T: std::str::FromStr>(&self, name: &str) -> CodecResult<T> {
        let value = self.require_attribute(name)?;
        value.trim().parse().map_err(|_| {
            log::warn!("attribute <{}> has invalid value '{}' in <{}>", name, value, self.tag);
            CodecError::InvalidAttribute {
                element: self.tag.clone(),
                attribute: name.to_string(),
                value: value.to_string(),
            }
        })
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn first_child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// All children with the given tag, in document order
    pub fn children(&self, tag: &str) -> impl Iterator<Item = &Element> + '_ {
        let tag = tag.to_string();
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Serialize with one tab per nesting level
    pub fn render(&self, depth: usize) -> String {
        let mut out = String::new();
        self.render_into(&mut out, depth);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let indent = "\t".repeat(depth);
        let _ = write!(out, "{}<{}", indent, self.tag);
        for (name, value) in &self.attributes {
            let _ = write!(out, " {}=\"{}\"", name, escape(value.as_str()));
        }

        if self.children.is_empty() {
            out.push_str(" />");
            return;
        }

        out.push('>');
        for child in &self.children {
            out.push('\n');
            child.render_into(out, depth + 1);
        }
        let _ = write!(out, "\n{}</{}>", indent, self.tag);
    }

    /// Parse a document and return its root element
    pub fn parse(xml: &str) -> CodecResult<Element> {
        let mut reader = XmlReader::from_str(xml);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => stack.push(element_from(&e)?),
                Event::Empty(e) => {
                    let element = element_from(&e)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    if let Some(element) = stack.pop() {
                        attach(&mut stack, &mut root, element);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(CodecError::Malformed("unclosed element".to_string()));
        }
        root.ok_or_else(|| CodecError::Malformed("document has no root element".to_string()))
    }

    /// Read and parse a document from disk
    pub fn load(path: impl AsRef<Path>) -> CodecResult<Element> {
        let xml = std::fs::read_to_string(path)?;
        Element::parse(&xml)
    }
}

fn element_from(start: &BytesStart<'_>) -> CodecResult<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((name, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}
