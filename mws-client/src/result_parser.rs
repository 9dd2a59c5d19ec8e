//! Streaming parser for processing reports. Reads the response in small
//! chunks and folds every `<Result>` element into a disk-backed store.

use crate::store::KeyedDiskStore;
use crate::types::{FeedItem, MwsError, ResultRecord, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::BTreeMap;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

pub const CHUNK_SIZE: usize = 1024;

/// Parse state: the record being assembled, the text of the innermost open
/// element and the saved text of its ancestors.
#[derive(Debug, Default)]
struct ResultReducer {
    row: Option<BTreeMap<String, String>>,
    value: String,
    stack: Vec<String>,
}

impl ResultReducer {
    fn start(&mut self, name: &str) {
        if name.eq_ignore_ascii_case("result") {
            self.row = Some(BTreeMap::new());
            self.value.clear();
            self.stack.clear();
        } else if self.row.is_some() {
            self.stack.push(std::mem::take(&mut self.value));
        }
    }

    fn text(&mut self, text: &str) {
        self.value.push_str(text);
    }

    /// Returns the finished record when `name` closes a `<Result>`.
    fn end(&mut self, name: &str) -> Option<BTreeMap<String, String>> {
        if name.eq_ignore_ascii_case("result") {
            self.value.clear();
            return self.row.take();
        }
        if let Some(row) = self.row.as_mut() {
            row.insert(name.to_string(), std::mem::take(&mut self.value));
            self.value = self.stack.pop().unwrap_or_default();
        }
        None
    }
}

/// Folds `<Result>` records of a processing report into a store, optionally
/// attaching the queued item each record refers to.
#[derive(Debug, Default)]
pub struct StreamingResultParser<'a> {
    queue: Option<&'a BTreeMap<u64, FeedItem>>,
}

impl<'a> StreamingResultParser<'a> {
    pub fn new() -> Self {
        Self { queue: None }
    }

    /// Records whose `MessageID` matches an entry of `queue` get it as `original`.
    pub fn with_queue(queue: &'a BTreeMap<u64, FeedItem>) -> Self {
        Self { queue: Some(queue) }
    }

    /// Parses `source` into a fresh temporary store under `tmp_dir`. On a
    /// parse error the partially filled store is discarded.
    pub fn parse<R: Read>(&self, source: R, tmp_dir: &Path) -> Result<KeyedDiskStore<ResultRecord>> {
        let mut store = KeyedDiskStore::temporary_in(tmp_dir)?;
        match self.fold(source, &mut store) {
            Ok(count) => {
                debug!("Parsed {} result records", count);
                Ok(store)
            }
            Err(e) => {
                warn!("Discarding {} parsed result records: {}", store.len(), e);
                Err(e)
            }
        }
    }

    fn fold<R: Read>(&self, source: R, store: &mut KeyedDiskStore<ResultRecord>) -> Result<usize> {
        let mut reader = Reader::from_reader(BufReader::with_capacity(CHUNK_SIZE, source));
        let mut reducer = ResultReducer::default();
        let mut buf = Vec::new();
        let mut line = 1u64;
        let mut count = 0;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| MwsError::XmlParse { line, message: e.to_string() })?;
            match event {
                Event::Start(start) => {
                    line += newlines(&start);
                    reducer.start(&String::from_utf8_lossy(start.name().as_ref()));
                }
                Event::Empty(start) => {
                    line += newlines(&start);
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    reducer.start(&name);
                    if let Some(fields) = reducer.end(&name) {
                        self.emit(fields, store)?;
                        count += 1;
                    }
                }
                Event::End(end) => {
                    if let Some(fields) = reducer.end(&String::from_utf8_lossy(end.name().as_ref())) {
                        self.emit(fields, store)?;
                        count += 1;
                    }
                }
                Event::Text(text) => {
                    line += newlines(&text);
                    let text = text
                        .unescape()
                        .map_err(|e| MwsError::XmlParse { line, message: e.to_string() })?;
                    reducer.text(&text);
                }
                Event::CData(data) => {
                    line += newlines(&data);
                    reducer.text(&String::from_utf8_lossy(&data));
                }
                Event::Comment(comment) => line += newlines(&comment),
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(count)
    }

    fn emit(&self, fields: BTreeMap<String, String>, store: &mut KeyedDiskStore<ResultRecord>) -> Result<()> {
        let mut record = ResultRecord { fields, original: None };
        if let (Some(queue), Some(id)) = (self.queue, record.message_id()) {
            record.original = queue.get(&id).cloned();
        }
        store.push(&record)?;
        Ok(())
    }
}

fn newlines(bytes: &[u8]) -> u64 {
    bytes.iter().filter(|&&b| b == b'\n').count() as u64
}
