/// JSON output formatting.
///
/// Writes `Value` directly to a `Write` sink with no intermediate `String`
/// allocation. Uses `itoa` for integers and `ryu` for floats. Output is
/// always compact: one document, no insignificant whitespace.
use std::io::{self, Write};

use crate::value::{Map, Value};

/// Configuration for output formatting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Sort object keys at every level (`-S`).
    pub sort_keys: bool,
    /// Escape every non-ASCII character as `\uXXXX` (`-a`).
    pub ascii_output: bool,
}

/// Format a value as a compact JSON string.
pub fn format_compact(value: &Value) -> String {
    let mut buf = Vec::new();
    // Writing to a Vec<u8> cannot fail.
    let _ = write_value(&mut buf, value, &OutputConfig::default());
    // Every byte written is either ASCII or copied from a valid &str.
    String::from_utf8(buf).unwrap_or_default()
}

/// Render a double the way it appears in output, for `string(x)`.
pub fn double_to_string(f: f64) -> String {
    let mut buf = Vec::new();
    let _ = write_double(&mut buf, f);
    String::from_utf8(buf).unwrap_or_default()
}

/// Write a value as compact JSON (no trailing newline).
pub fn write_value<W: Write>(w: &mut W, value: &Value, config: &OutputConfig) -> io::Result<()> {
    match value {
        Value::Null => w.write_all(b"null"),
        Value::Bool(true) => w.write_all(b"true"),
        Value::Bool(false) => w.write_all(b"false"),
        Value::Int(n) => {
            let mut buf = itoa::Buffer::new();
            w.write_all(buf.format(*n).as_bytes())
        }
        Value::Uint(n) => {
            let mut buf = itoa::Buffer::new();
            w.write_all(buf.format(*n).as_bytes())
        }
        Value::Double(f) => write_double(w, *f),
        Value::String(s) => write_string(w, s, config),
        Value::Array(items) => {
            w.write_all(b"[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    w.write_all(b",")?;
                }
                write_value(w, item, config)?;
            }
            w.write_all(b"]")
        }
        Value::Object(map) => write_object(w, map, config),
    }
}

fn write_object<W: Write>(w: &mut W, map: &Map, config: &OutputConfig) -> io::Result<()> {
    w.write_all(b"{")?;
    if config.sort_keys {
        let mut entries: Vec<&(String, Value)> = map.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (i, (k, v)) in entries.into_iter().enumerate() {
            write_entry(w, i, k, v, config)?;
        }
    } else {
        for (i, (k, v)) in map.iter().enumerate() {
            write_entry(w, i, k, v, config)?;
        }
    }
    w.write_all(b"}")
}

#[inline]
fn write_entry<W: Write>(
    w: &mut W,
    i: usize,
    key: &str,
    value: &Value,
    config: &OutputConfig,
) -> io::Result<()> {
    if i > 0 {
        w.write_all(b",")?;
    }
    write_string(w, key, config)?;
    w.write_all(b":")?;
    write_value(w, value, config)
}

#[inline]
fn write_string<W: Write>(w: &mut W, s: &str, config: &OutputConfig) -> io::Result<()> {
    if config.ascii_output {
        write_json_string_ascii(w, s)
    } else {
        write_json_string(w, s)
    }
}

/// Write a JSON-escaped string (with quotes).
pub fn write_json_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_all(b"\"")?;
    let bytes = s.as_bytes();
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        let escape: &[u8] = match b {
            b'"' => b"\\\"",
            b'\\' => b"\\\\",
            b'\n' => b"\\n",
            b'\r' => b"\\r",
            b'\t' => b"\\t",
            b'\x08' => b"\\b",
            b'\x0c' => b"\\f",
            0..=0x1f => {
                if start < i {
                    w.write_all(&bytes[start..i])?;
                }
                write!(w, "\\u{:04x}", b)?;
                start = i + 1;
                continue;
            }
            _ => continue,
        };
        if start < i {
            w.write_all(&bytes[start..i])?;
        }
        w.write_all(escape)?;
        start = i + 1;
    }
    if start < bytes.len() {
        w.write_all(&bytes[start..])?;
    }
    w.write_all(b"\"")
}

fn write_json_string_ascii<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_all(b"\"")?;
    for ch in s.chars() {
        match ch {
            '"' => w.write_all(b"\\\"")?,
            '\\' => w.write_all(b"\\\\")?,
            '\n' => w.write_all(b"\\n")?,
            '\r' => w.write_all(b"\\r")?,
            '\t' => w.write_all(b"\\t")?,
            '\x08' => w.write_all(b"\\b")?,
            '\x0c' => w.write_all(b"\\f")?,
            c if (c as u32) < 0x20 => write!(w, "\\u{:04x}", c as u32)?,
            c if c.is_ascii() => w.write_all(&[c as u8])?,
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(w, "\\u{:04x}", unit)?;
                }
            }
        }
    }
    w.write_all(b"\"")
}

/// Shortest round-trip form. Integral values drop the `.0`, large ones
/// switch to exponent form past 15 trailing zeros. NaN and infinities have
/// no JSON form and print as `null`.
fn write_double<W: Write>(w: &mut W, f: f64) -> io::Result<()> {
    if !f.is_finite() {
        return w.write_all(b"null");
    }
    let f = if f == 0.0 { 0.0 } else { f };
    let mut buf = ryu::Buffer::new();
    let s = buf.format_finite(f);
    if f.fract() == 0.0 {
        if let Some(e_pos) = s.find('e') {
            let exp: usize = s[e_pos + 1..].parse().unwrap_or(0);
            let mantissa = &s[..e_pos];
            let (int_part, frac_part) = match mantissa.find('.') {
                Some(d) => (&mantissa[..d], &mantissa[d + 1..]),
                None => (mantissa, ""),
            };
            if exp >= frac_part.len() && exp - frac_part.len() <= 15 {
                w.write_all(int_part.as_bytes())?;
                w.write_all(frac_part.as_bytes())?;
                for _ in 0..exp - frac_part.len() {
                    w.write_all(b"0")?;
                }
                return Ok(());
            }
        }
        if let Some(stripped) = s.strip_suffix(".0") {
            return w.write_all(stripped.as_bytes());
        }
    }
    if let Some(e_pos) = s.find('e') {
        w.write_all(&s.as_bytes()[..e_pos])?;
        w.write_all(b"e")?;
        let exp_str = &s[e_pos + 1..];
        if !exp_str.starts_with('-') {
            w.write_all(b"+")?;
        }
        return w.write_all(exp_str.as_bytes());
    }
    w.write_all(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn compact(v: &Value) -> String {
        format_compact(v)
    }

    fn with(v: &Value, config: OutputConfig) -> String {
        let mut buf = Vec::new();
        write_value(&mut buf, v, &config).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn obj(pairs: &[(&str, Value)]) -> Value {
        Value::Object(Arc::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        ))
    }

    #[test]
    fn compact_scalars() {
        assert_eq!(compact(&Value::Null), "null");
        assert_eq!(compact(&Value::Bool(true)), "true");
        assert_eq!(compact(&Value::Int(-42)), "-42");
        assert_eq!(compact(&Value::Uint(u64::MAX)), "18446744073709551615");
    }

    #[test]
    fn compact_double() {
        assert_eq!(compact(&Value::Double(1.5)), "1.5");
        assert_eq!(compact(&Value::Double(2.0)), "2");
        assert_eq!(compact(&Value::Double(-0.0)), "0");
        assert_eq!(compact(&Value::Double(1e15)), "1000000000000000");
        assert_eq!(compact(&Value::Double(1e17)), "1e+17");
        assert_eq!(compact(&Value::Double(1e300)), "1e+300");
        assert_eq!(compact(&Value::Double(1.5e-7)), "1.5e-7");
    }

    #[test]
    fn non_finite_doubles_are_null() {
        assert_eq!(compact(&Value::Double(f64::NAN)), "null");
        assert_eq!(compact(&Value::Double(f64::INFINITY)), "null");
        assert_eq!(compact(&Value::Double(f64::NEG_INFINITY)), "null");
    }

    #[test]
    fn string_escaping() {
        assert_eq!(compact(&Value::from("a\"b\\c\n")), r#""a\"b\\c\n""#);
        assert_eq!(compact(&Value::from("\x01\x1f")), r#""\u0001\u001f""#);
        assert_eq!(compact(&Value::from("héllo")), "\"héllo\"");
    }

    #[test]
    fn ascii_output_escapes_non_ascii() {
        let config = OutputConfig {
            ascii_output: true,
            ..Default::default()
        };
        assert_eq!(with(&Value::from("héllo"), config), r#""h\u00e9llo""#);
        assert_eq!(with(&Value::from("😀"), config), r#""\ud83d\ude00""#);
    }

    #[test]
    fn containers_preserve_order() {
        let v = obj(&[
            ("b", Value::Int(1)),
            ("a", Value::from(vec![Value::Null, Value::Bool(false)])),
        ]);
        assert_eq!(compact(&v), r#"{"b":1,"a":[null,false]}"#);
        assert_eq!(compact(&obj(&[])), "{}");
        assert_eq!(compact(&Value::from(Vec::<Value>::new())), "[]");
    }

    #[test]
    fn sort_keys_applies_recursively() {
        let inner = obj(&[("z", Value::Int(1)), ("y", Value::Int(2))]);
        let v = obj(&[("b", inner), ("a", Value::Int(0))]);
        let config = OutputConfig {
            sort_keys: true,
            ..Default::default()
        };
        assert_eq!(with(&v, config), r#"{"a":0,"b":{"y":2,"z":1}}"#);
    }

    #[test]
    fn double_to_string_matches_output() {
        assert_eq!(double_to_string(3.0), "3");
        assert_eq!(double_to_string(0.25), "0.25");
    }
}
