/// Streaming record decoders.
///
/// `Records` reads a concatenated JSON stream (values separated by optional
/// whitespace); `LineRecords` reads NDJSON, one document per line. Both
/// yield `Result<Record>` lazily and stop after the first error.
use std::io::{BufRead, ErrorKind};
use std::iter::FusedIterator;

use serde_json::de::IoRead;
use serde_json::{Deserializer, StreamDeserializer};
use tracing::debug;

use crate::error::{Error, Result};
use crate::value::{Record, Value};

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Consume a UTF-8 byte order mark if the stream starts with one.
fn skip_bom<R: BufRead>(reader: &mut R) -> std::io::Result<()> {
    let buf = loop {
        match reader.fill_buf() {
            Ok(buf) => break buf,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    };
    if buf.starts_with(BOM) {
        reader.consume(BOM.len());
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Int(_) | Value::Uint(_) | Value::Double(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn into_record(value: Value, record: u64) -> Result<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::Decode {
            record,
            message: format!("expected a JSON object, found {}", json_kind(&other)),
        }),
    }
}

/// Records from a concatenated JSON stream.
pub struct Records<R: BufRead> {
    inner: Option<StreamDeserializer<'static, IoRead<R>, Value>>,
    pending: Option<Error>,
    count: u64,
}

impl<R: BufRead> Records<R> {
    pub fn new(mut reader: R) -> Self {
        let pending = skip_bom(&mut reader).err().map(|e| Error::Decode {
            record: 1,
            message: e.to_string(),
        });
        Records {
            inner: Some(Deserializer::from_reader(reader).into_iter::<Value>()),
            pending,
            count: 0,
        }
    }

    /// Records yielded so far.
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<R: BufRead> Iterator for Records<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending.take() {
            self.inner = None;
            return Some(Err(e));
        }
        let stream = self.inner.as_mut()?;
        let index = self.count + 1;
        let item = match stream.next() {
            None => {
                debug!(records = self.count, "end of input stream");
                self.inner = None;
                return None;
            }
            Some(Ok(value)) => into_record(value, index),
            Some(Err(e)) => Err(Error::Decode {
                record: index,
                message: e.to_string(),
            }),
        };
        match &item {
            Ok(_) => self.count = index,
            Err(_) => self.inner = None,
        }
        Some(item)
    }
}

impl<R: BufRead> FusedIterator for Records<R> {}

/// Records from newline-delimited JSON. Blank lines are skipped; errors
/// carry the 1-based line number.
pub struct LineRecords<R: BufRead> {
    reader: Option<R>,
    line: Vec<u8>,
    line_no: u64,
    count: u64,
}

impl<R: BufRead> LineRecords<R> {
    pub fn new(reader: R) -> Self {
        LineRecords {
            reader: Some(reader),
            line: Vec::with_capacity(1024),
            line_no: 0,
            count: 0,
        }
    }

    /// Records yielded so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    fn fail(&mut self, message: String) -> Option<Result<Record>> {
        self.reader = None;
        Some(Err(Error::Decode {
            record: self.line_no,
            message,
        }))
    }
}

impl<R: BufRead> Iterator for LineRecords<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let reader = self.reader.as_mut()?;
            self.line.clear();
            self.line_no += 1;
            match reader.read_until(b'\n', &mut self.line) {
                Ok(0) => {
                    debug!(records = self.count, lines = self.line_no - 1, "end of input stream");
                    self.reader = None;
                    return None;
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    self.line_no -= 1;
                    continue;
                }
                Err(e) => return self.fail(e.to_string()),
            }

            let mut bytes = self.line.as_slice();
            if self.line_no == 1 {
                bytes = bytes.strip_prefix(BOM).unwrap_or(bytes);
            }
            let bytes = bytes.trim_ascii();
            if bytes.is_empty() {
                continue;
            }
            let item = match serde_json::from_slice::<Value>(bytes) {
                Ok(value) => into_record(value, self.line_no),
                Err(e) => Err(Error::Decode {
                    record: self.line_no,
                    message: e.to_string(),
                }),
            };
            match item {
                Ok(record) => {
                    self.count += 1;
                    return Some(Ok(record));
                }
                Err(e) => {
                    self.reader = None;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<R: BufRead> FusedIterator for LineRecords<R> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::map_get;
    use std::io::Cursor;

    fn records(input: &str) -> Vec<Result<Record>> {
        Records::new(Cursor::new(input.as_bytes().to_vec())).collect()
    }

    fn lines(input: &str) -> Vec<Result<Record>> {
        LineRecords::new(Cursor::new(input.as_bytes().to_vec())).collect()
    }

    #[test]
    fn concatenated_objects() {
        let out = records("{\"a\":1} {\"a\":2}\n\n{\"a\":3}");
        assert_eq!(out.len(), 3);
        let a: Vec<_> = out
            .into_iter()
            .map(|r| map_get(&r.unwrap(), "a").cloned().unwrap())
            .collect();
        assert_eq!(a, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn adjacent_objects_without_whitespace() {
        assert_eq!(records("{}{}").len(), 2);
    }

    #[test]
    fn empty_input_is_empty_stream() {
        assert!(records("").is_empty());
        assert!(records("  \n\t ").is_empty());
    }

    #[test]
    fn bom_is_skipped() {
        let out = records("\u{feff}{\"a\":1}");
        assert_eq!(out.len(), 1);
        assert!(out[0].is_ok());
    }

    #[test]
    fn malformed_input_stops_stream() {
        let out = records("{\"a\":1} {\"a\": } {\"a\":3}");
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        match &out[1] {
            Err(Error::Decode { record, .. }) => assert_eq!(*record, 2),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn non_object_is_an_error() {
        let out = records("{\"a\":1} [1,2] {\"a\":3}");
        assert_eq!(out.len(), 2);
        let err = out[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("found array"), "{err}");
    }

    #[test]
    fn truncated_document() {
        let out = records("{\"a\":1");
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(Error::Decode { record: 1, .. })));
    }

    #[test]
    fn count_tracks_yielded_records() {
        let mut it = Records::new(Cursor::new(b"{} {}".to_vec()));
        assert_eq!(Records::count(&it), 0);
        it.next();
        it.next();
        assert!(it.next().is_none());
        assert!(it.next().is_none());
        assert_eq!(Records::count(&it), 2);
    }

    #[test]
    fn lines_skip_blank() {
        let out = lines("{\"a\":1}\n\n   \n{\"a\":2}\r\n");
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn lines_report_line_number() {
        let out = lines("{\"a\":1}\n\nnot json\n{\"a\":2}\n");
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Err(Error::Decode { record: 3, .. })));
    }

    #[test]
    fn lines_reject_two_documents_on_one_line() {
        let out = lines("{\"a\":1} {\"a\":2}\n");
        assert_eq!(out.len(), 1);
        assert!(out[0].is_err());
    }

    #[test]
    fn lines_without_trailing_newline_and_bom() {
        let out = lines("\u{feff}{\"a\":1}\n{\"a\":2}");
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn duplicate_keys_keep_last_value() {
        let out = records("{\"a\":1,\"b\":2,\"a\":3}");
        let rec = out[0].as_ref().unwrap();
        assert_eq!(rec.len(), 2);
        assert_eq!(rec[0], ("a".to_string(), Value::Int(3)));
    }
}
