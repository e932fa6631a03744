/// Record encoder: one compact JSON document per line.
use std::io::Write;

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::output::{OutputConfig, write_value};
use crate::value::{Record, Value};

pub struct Encoder<W: Write> {
    out: W,
    config: OutputConfig,
}

impl<W: Write> Encoder<W> {
    pub fn new(out: W, config: OutputConfig) -> Self {
        Encoder { out, config }
    }

    /// Write every record of `records`, then flush. Stops at the first error
    /// in the sequence, on cancellation, or when the sink fails. Returns the
    /// number of records written.
    pub fn write_all<I>(&mut self, cancel: &CancellationToken, records: I) -> Result<u64>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        let mut written = 0u64;
        for item in records {
            let record = item?;
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.write_record(record)?;
            written += 1;
        }
        self.out.flush().map_err(Error::Write)?;
        Ok(written)
    }

    fn write_record(&mut self, record: Record) -> Result<()> {
        write_value(&mut self.out, &Value::Object(record), &self.config).map_err(Error::Write)?;
        self.out.write_all(b"\n").map_err(Error::Write)
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;

    fn rec(json: &str) -> Record {
        match serde_json::from_str::<Value>(json).unwrap() {
            Value::Object(map) => map,
            other => panic!("not an object: {other:?}"),
        }
    }

    fn encode(records: Vec<Result<Record>>) -> (Result<u64>, String) {
        let mut enc = Encoder::new(Vec::new(), OutputConfig::default());
        let res = enc.write_all(&CancellationToken::new(), records);
        (res, String::from_utf8(enc.into_inner()).unwrap())
    }

    #[test]
    fn writes_compact_lines() {
        let (res, out) = encode(vec![Ok(rec(r#"{ "a" : 1 }"#)), Ok(rec(r#"{"b": [1, 2]}"#))]);
        assert_eq!(res.unwrap(), 2);
        assert_eq!(out, "{\"a\":1}\n{\"b\":[1,2]}\n");
    }

    #[test]
    fn empty_sequence_writes_nothing() {
        let (res, out) = encode(Vec::new());
        assert_eq!(res.unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn stops_at_first_error() {
        let (res, out) = encode(vec![
            Ok(rec(r#"{"a":1}"#)),
            Err(Error::Decode {
                record: 2,
                message: "bad".into(),
            }),
            Ok(rec(r#"{"a":3}"#)),
        ]);
        assert!(matches!(res, Err(Error::Decode { record: 2, .. })));
        assert_eq!(out, "{\"a\":1}\n");
    }

    #[test]
    fn cancelled_token_drops_pending_record() {
        let token = CancellationToken::new();
        token.cancel();
        let mut enc = Encoder::new(Vec::new(), OutputConfig::default());
        let err = enc.write_all(&token, vec![Ok(rec("{}"))]).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(enc.get_ref().is_empty());
    }

    #[test]
    fn sort_keys_option() {
        let config = OutputConfig {
            sort_keys: true,
            ..Default::default()
        };
        let mut enc = Encoder::new(Vec::new(), config);
        enc.write_all(&CancellationToken::new(), vec![Ok(rec(r#"{"b":1,"a":2}"#))])
            .unwrap();
        assert_eq!(enc.get_ref().as_slice(), b"{\"a\":2,\"b\":1}\n");
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_failure_is_a_write_error() {
        let mut enc = Encoder::new(FailingWriter, OutputConfig::default());
        let err = enc
            .write_all(&CancellationToken::new(), vec![Ok(Arc::new(Vec::new()))])
            .unwrap_err();
        assert!(matches!(err, Error::Write(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    }
}
