//! Builds XML fragments from flat `path => value` pairs.
//!
//! A path is a list of `/` separated element names. Each segment may carry an
//! attribute predicate, `Name[@attr="value", @other="x"]`, which is both used
//! to find an existing sibling and written onto a newly created one. Two
//! attribute names are markers and never reach the output:
//!
//! * `_cdata_` makes every text written to the element a CDATA section;
//! * `_ignore_me_` only serves to force a new sibling, e.g.
//!   `Bullet[@_ignore_me_="1"]`, `Bullet[@_ignore_me_="2"]`.

use quick_xml::escape::{escape, partial_escape};

const CDATA_MARKER: &str = "_cdata_";
const IGNORE_MARKER: &str = "_ignore_me_";

#[derive(Debug, Clone)]
enum Content {
    Element(usize),
    Text(String),
    CData(String),
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    attributes: Vec<(String, String)>,
    content: Vec<Content>,
    cdata: bool,
}

#[derive(Debug, Clone)]
pub struct FeedBuilder {
    // Index 0 is an unnamed root holding the top-level elements.
    nodes: Vec<Node>,
}

impl Default for FeedBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedBuilder {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                name: String::new(),
                attributes: Vec::new(),
                content: Vec::new(),
                cdata: false,
            }],
        }
    }

    pub fn from_pairs<I, P, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, V)>,
        P: AsRef<str>,
        V: AsRef<str>,
    {
        let mut builder = Self::new();
        for (path, value) in pairs {
            builder.set(path.as_ref(), value.as_ref());
        }
        builder
    }

    /// Writes `value` at `path`, creating missing elements on the way. Writing
    /// to an existing leaf replaces its text.
    pub fn set(&mut self, path: &str, value: &str) {
        let segments = split_path(path);
        let mut parent = 0;
        for (i, segment) in segments.iter().enumerate() {
            let (name, attributes) = parse_segment(segment);
            if name.is_empty() {
                continue;
            }
            let node = match self.find_child(parent, &name, &attributes) {
                Some(node) => node,
                None => self.append_child(parent, name, attributes),
            };
            if i + 1 == segments.len() {
                self.replace_text(node, value);
            }
            parent = node;
        }
    }

    /// Serialized top-level elements, concatenated, without a prolog.
    pub fn build(&self) -> String {
        let mut out = String::new();
        for content in &self.nodes[0].content {
            if let Content::Element(index) = content {
                self.write_node(*index, &mut out);
            }
        }
        out
    }

    fn find_child(&self, parent: usize, name: &str, attributes: &[(String, String)]) -> Option<usize> {
        self.nodes[parent].content.iter().find_map(|content| match content {
            Content::Element(index) => {
                let node = &self.nodes[*index];
                let matches = node.name == name
                    && attributes
                        .iter()
                        .all(|wanted| node.attributes.iter().any(|have| have == wanted));
                matches.then_some(*index)
            }
            _ => None,
        })
    }

    fn append_child(&mut self, parent: usize, name: String, attributes: Vec<(String, String)>) -> usize {
        let cdata = attributes.iter().any(|(key, _)| key == CDATA_MARKER);
        let index = self.nodes.len();
        self.nodes.push(Node {
            name,
            attributes,
            content: Vec::new(),
            cdata,
        });
        self.nodes[parent].content.push(Content::Element(index));
        index
    }

    fn replace_text(&mut self, index: usize, value: &str) {
        let node = &mut self.nodes[index];
        if node.cdata {
            node.content.retain(|content| !matches!(content, Content::CData(_)));
            if !value.is_empty() {
                node.content.push(Content::CData(value.to_string()));
            }
        } else {
            node.content.retain(|content| !matches!(content, Content::Text(_)));
            if !value.is_empty() {
                node.content.push(Content::Text(value.to_string()));
            }
        }
    }

    fn write_node(&self, index: usize, out: &mut String) {
        let node = &self.nodes[index];
        out.push('<');
        out.push_str(&node.name);
        for (key, value) in &node.attributes {
            if key == CDATA_MARKER || key == IGNORE_MARKER {
                continue;
            }
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if node.content.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for content in &node.content {
            match content {
                Content::Element(child) => self.write_node(*child, out),
                Content::Text(text) => out.push_str(&partial_escape(text.as_str())),
                Content::CData(text) => write_cdata(text, out),
            }
        }
        out.push_str("</");
        out.push_str(&node.name);
        out.push('>');
    }
}

/// Shortcut for a one-off fragment.
pub fn build_fragment<I, P, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (P, V)>,
    P: AsRef<str>,
    V: AsRef<str>,
{
    FeedBuilder::from_pairs(pairs).build()
}

fn write_cdata(text: &str, out: &mut String) {
    out.push_str("<![CDATA[");
    out.push_str(&text.replace("]]>", "]]]]><![CDATA[>"));
    out.push_str("]]>");
}

/// Splits on `/` outside of `[...]` predicates.
fn split_path(path: &str) -> Vec<&str> {
    let path = path.trim().trim_matches('/');
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in path.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => {
                segments.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&path[start..]);
    segments.retain(|segment| !segment.trim().is_empty());
    segments
}

fn parse_segment(segment: &str) -> (String, Vec<(String, String)>) {
    match segment.find('[') {
        Some(open) => (
            segment[..open].trim().to_string(),
            parse_attributes(&segment[open..]),
        ),
        None => (segment.trim().to_string(), Vec::new()),
    }
}

/// `[@a="1", @b=2]` to `[(a, 1), (b, 2)]`.
fn parse_attributes(predicate: &str) -> Vec<(String, String)> {
    let body = predicate
        .trim_matches(|c| c == ' ' || c == '[' || c == ']')
        .trim_start_matches(|c| c == ' ' || c == '@');
    if body.is_empty() {
        return Vec::new();
    }

    split_attribute_list(body)
        .into_iter()
        .map(|part| match part.split_once('=') {
            Some((name, value)) => (
                name.trim().to_string(),
                value.trim_matches(|c| c == ' ' || c == '"').replace("\\\"", "\""),
            ),
            None => (part.trim().to_string(), String::new()),
        })
        .collect()
}

/// Splits on `,` followed by optional whitespace and `@`.
fn split_attribute_list(body: &str) -> Vec<&str> {
    let bytes = body.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b',' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'@' {
                parts.push(&body[start..i]);
                start = j + 1;
                i = j + 1;
                continue;
            }
        }
        i += 1;
    }
    parts.push(&body[start..]);
    parts
}
