//! Small tree parser for control responses (submission ids, status lists,
//! error bodies). Large processing reports go through `result_parser`.

use crate::types::{MwsError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::io::Read;

/// Turns default and prefixed namespace declarations into plain attributes so
/// that element names can be matched without namespace handling.
pub fn rewrite_namespaces(raw: &str) -> String {
    raw.replace("xmlns=", "ns=").replace("xmlns:", "ns:")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Follows `path` below this element, taking the first match at each step.
    pub fn find(&self, path: &[&str]) -> Option<&XmlElement> {
        path.iter().try_fold(self, |node, name| node.child(name))
    }

    /// All elements reached through `path`, fanning out at the last step.
    pub fn find_all<'a>(&'a self, path: &[&'a str]) -> Vec<&'a XmlElement> {
        match path.split_last() {
            None => vec![self],
            Some((last, parents)) => match self.find(parents) {
                Some(parent) => parent.children(last).collect(),
                None => Vec::new(),
            },
        }
    }

    /// Trimmed text at `path`; empty text counts as absent.
    pub fn text_at(&self, path: &[&str]) -> Option<String> {
        self.find(path)
            .map(|node| node.text.trim().to_string())
            .filter(|text| !text.is_empty())
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

pub fn read_document<R: Read>(mut source: R) -> Result<XmlElement> {
    let mut raw = String::new();
    source.read_to_string(&mut raw)?;
    parse_document(&raw)
}

/// Parses a whole document, after namespace rewriting, into its root element.
pub fn parse_document(raw: &str) -> Result<XmlElement> {
    let content = rewrite_namespaces(raw);
    let mut reader = Reader::from_str(&content);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let position = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| parse_error(&content, reader.buffer_position() as usize, e))?;
        match event {
            Event::Start(start) => {
                stack.push(element_from(&start, &content, position)?);
            }
            Event::Empty(start) => {
                let element = element_from(&start, &content, position)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|e| parse_error(&content, position, e))?;
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(MwsError::XmlParse {
            line: line_at(&content, content.len()),
            message: format!("Unclosed element <{}>", open.name),
        });
    }
    root.ok_or_else(|| MwsError::XmlParse {
        line: line_at(&content, content.len()),
        message: "Document has no root element".to_string(),
    })
}

/// Code and message of an `<Error>` response body, when there is one.
pub fn error_details(raw: &str) -> (Option<String>, Option<String>) {
    let Ok(document) = parse_document(raw) else {
        return (None, None);
    };
    let error = if document.name == "Error" {
        Some(&document)
    } else {
        document.child("Error")
    };
    match error {
        Some(error) => (error.text_at(&["Code"]), error.text_at(&["Message"])),
        None => (None, None),
    }
}

fn element_from(start: &BytesStart<'_>, content: &str, position: usize) -> Result<XmlElement> {
    let mut element = XmlElement {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ..Default::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(|e| parse_error(content, position, e))?;
        let value = attr
            .unescape_value()
            .map_err(|e| parse_error(content, position, e))?;
        element.attributes.push((
            String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            value.into_owned(),
        ));
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

pub(crate) fn line_at(content: &str, position: usize) -> u64 {
    let end = position.min(content.len());
    content.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() as u64 + 1
}

fn parse_error(content: &str, position: usize, e: impl std::fmt::Display) -> MwsError {
    MwsError::XmlParse {
        line: line_at(content, position),
        message: e.to_string(),
    }
}
