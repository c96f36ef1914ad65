//! Load catalog service XML responses into an owned element tree using quick-xml.

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::trace;

/// Error type produced while loading a response document.
#[derive(Debug, Error)]
pub enum XmlError {
    /// The underlying reader rejected the markup.
    #[error("xml syntax: {0}")]
    Syntax(#[from] quick_xml::Error),
    /// An attribute could not be decoded.
    #[error("xml attribute: {0}")]
    Attribute(#[from] AttrError),
    /// The document ended while elements were still open.
    #[error("unexpected end of document")]
    Truncated,
    /// The document contains no root element.
    #[error("document has no root element")]
    Empty,
    /// Markup found after the root element was closed.
    #[error("content after document root")]
    TrailingContent,
    /// Element nesting exceeded the configured bound.
    #[error("nesting depth exceeds {0} levels")]
    TooDeep(usize),
}

/// Options controlling document loading.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Maximum element nesting accepted, the root counting as level one.
    ///
    /// Unbounded when unset. Normalization recurses once per level, so
    /// callers accepting externally supplied documents should set a limit.
    pub max_depth: Option<usize>,
}

/// Owned XML element: tag, attributes and children in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Element name, kept verbatim including any namespace prefix.
    pub tag: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Child elements in document order.
    pub children: Vec<Element>,
    /// Character data runs. A leaf usually carries zero or one run; comments
    /// or CDATA sections inside an element split the data into several.
    pub texts: Vec<String>,
}

impl Element {
    /// Whether this element has child elements of its own.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// All character data runs concatenated.
    pub fn text(&self) -> String {
        self.texts.concat()
    }

    /// Look up an attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Parse a complete XML document into an element tree.
pub fn parse(xml: &str) -> Result<Element, XmlError> {
    parse_with(xml, &ParseOptions::default())
}

/// Parse a complete XML document, honouring the supplied options.
///
/// Comments, processing instructions, doctype declarations and the XML
/// declaration are skipped. Whitespace-only character data is dropped.
pub fn parse_with(xml: &str, options: &ParseOptions) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => {
                check_depth(stack.len() + 1, options)?;
                stack.push(element_from_start(&start)?);
            }
            Event::Empty(start) => {
                check_depth(stack.len() + 1, options)?;
                let element = element_from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or(XmlError::Truncated)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let run = text.unescape()?;
                    if !run.is_empty() {
                        current.texts.push(run.into_owned());
                    }
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    let run = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    if !run.is_empty() {
                        current.texts.push(run);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(XmlError::Truncated);
    }
    root.ok_or(XmlError::Empty)
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, XmlError> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((name, value));
    }
    Ok(Element {
        tag,
        attributes,
        children: Vec::new(),
        texts: Vec::new(),
    })
}

fn attach(
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_some() {
                return Err(XmlError::TrailingContent);
            }
            trace!(tag = %element.tag, "document root closed");
            *root = Some(element);
        }
    }
    Ok(())
}

fn check_depth(depth: usize, options: &ParseOptions) -> Result<(), XmlError> {
    match options.max_depth {
        Some(limit) if depth > limit => Err(XmlError::TooDeep(limit)),
        _ => Ok(()),
    }
}
