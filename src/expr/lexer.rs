/// Predicate language tokenizer.
use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Dot,      // .
    LBrack,   // [
    RBrack,   // ]
    LBrace,   // {
    RBrace,   // }
    LParen,   // (
    RParen,   // )
    Comma,    // ,
    Colon,    // :
    Question, // ?
    // Comparison operators
    Eq, // ==
    Ne, // !=
    Lt, // <
    Le, // <=
    Gt, // >
    Ge, // >=
    // Arithmetic
    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %
    // Logical
    Bang,   // !
    AndAnd, // &&
    OrOr,   // ||
    // Literals and identifiers
    Ident(String),
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    /// `9223372036854775808` with no suffix: valid only as the operand of
    /// a unary minus.
    IntMinMagnitude,
    // Keywords
    True,
    False,
    Null,
    In,
}

/// A token plus the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub(crate) fn syntax_error(offset: usize, message: impl Into<String>) -> CompileError {
    CompileError::Syntax {
        offset,
        message: message.into(),
    }
}

pub fn lex(input: &str) -> Result<Vec<Spanned>, CompileError> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }

        // Line comment
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        let start = i;
        let mut push = |tok: Token| tokens.push(Spanned { token: tok, offset: start });

        // Two-char operators
        if i + 1 < bytes.len() {
            let two = match (bytes[i], bytes[i + 1]) {
                (b'=', b'=') => Some(Token::Eq),
                (b'!', b'=') => Some(Token::Ne),
                (b'<', b'=') => Some(Token::Le),
                (b'>', b'=') => Some(Token::Ge),
                (b'&', b'&') => Some(Token::AndAnd),
                (b'|', b'|') => Some(Token::OrOr),
                _ => None,
            };
            if let Some(tok) = two {
                push(tok);
                i += 2;
                continue;
            }
        }

        let single = match bytes[i] {
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b'[' => Some(Token::LBrack),
            b']' => Some(Token::RBrack),
            b'{' => Some(Token::LBrace),
            b'}' => Some(Token::RBrace),
            b',' => Some(Token::Comma),
            b':' => Some(Token::Colon),
            b'?' => Some(Token::Question),
            b'+' => Some(Token::Plus),
            b'-' => Some(Token::Minus),
            b'*' => Some(Token::Star),
            b'/' => Some(Token::Slash),
            b'%' => Some(Token::Percent),
            b'!' => Some(Token::Bang),
            b'<' => Some(Token::Lt),
            b'>' => Some(Token::Gt),
            _ => None,
        };
        if let Some(tok) = single {
            push(tok);
            i += 1;
            continue;
        }

        // Dot, or a float like .5
        if bytes[i] == b'.' {
            if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                let (tok, consumed) = lex_number(bytes, i)?;
                push(tok);
                i += consumed;
                continue;
            }
            push(Token::Dot);
            i += 1;
            continue;
        }

        // Quoted string, optionally raw (r"..." / R'...')
        if bytes[i] == b'"' || bytes[i] == b'\'' {
            let (s, consumed) = lex_string(input, i, false)?;
            push(Token::Str(s));
            i += consumed;
            continue;
        }
        if matches!(bytes[i], b'r' | b'R') && matches!(bytes.get(i + 1), Some(b'"' | b'\'')) {
            let (s, consumed) = lex_string(input, i + 1, true)?;
            push(Token::Str(s));
            i += consumed + 1;
            continue;
        }

        if bytes[i].is_ascii_digit() {
            let (tok, consumed) = lex_number(bytes, i)?;
            push(tok);
            i += consumed;
            continue;
        }

        // Identifier or keyword
        if bytes[i].is_ascii_alphabetic() || bytes[i] == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let word = &input[start..i];
            let tok = match word {
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                "in" => Token::In,
                _ => Token::Ident(word.to_string()),
            };
            push(tok);
            continue;
        }

        let ch = input[i..].chars().next().unwrap_or('\u{fffd}');
        return Err(syntax_error(i, format!("unexpected character '{ch}'")));
    }

    Ok(tokens)
}

/// Lex a quoted string starting at the opening quote. Returns the decoded
/// text and the number of bytes consumed (quotes included).
fn lex_string(input: &str, start: usize, raw: bool) -> Result<(String, usize), CompileError> {
    let bytes = input.as_bytes();
    let quote = bytes[start];
    let triple = bytes.get(start + 1) == Some(&quote) && bytes.get(start + 2) == Some(&quote);
    let delim_len = if triple { 3 } else { 1 };
    let mut i = start + delim_len;
    let mut s = String::new();

    let closes_at = |i: usize| {
        if triple {
            bytes[i..].starts_with(&[quote, quote, quote])
        } else {
            bytes[i] == quote
        }
    };

    while i < bytes.len() {
        if closes_at(i) {
            return Ok((s, i + delim_len - start));
        }
        match bytes[i] {
            b'\n' | b'\r' if !triple => {
                return Err(syntax_error(i, "newline in string literal"));
            }
            b'\\' if !raw => {
                let (decoded, consumed) = lex_escape(input, i)?;
                s.push(decoded);
                i += consumed;
            }
            _ => {
                // Copy a run of plain bytes at once; stops on ASCII bytes only,
                // so the slice always ends on a char boundary.
                let chunk_start = i;
                i += 1;
                while i < bytes.len()
                    && bytes[i] != quote
                    && bytes[i] != b'\\'
                    && bytes[i] != b'\n'
                    && bytes[i] != b'\r'
                {
                    i += 1;
                }
                s.push_str(&input[chunk_start..i]);
            }
        }
    }
    Err(syntax_error(start, "unterminated string literal"))
}

/// Decode one backslash escape at `at`. Returns the char and bytes consumed.
fn lex_escape(input: &str, at: usize) -> Result<(char, usize), CompileError> {
    let bytes = input.as_bytes();
    let Some(&c) = bytes.get(at + 1) else {
        return Err(syntax_error(at, "unterminated string escape"));
    };
    let simple = match c {
        b'\\' => Some('\\'),
        b'\'' => Some('\''),
        b'"' => Some('"'),
        b'`' => Some('`'),
        b'?' => Some('?'),
        b'a' => Some('\x07'),
        b'b' => Some('\x08'),
        b'f' => Some('\x0c'),
        b'n' => Some('\n'),
        b'r' => Some('\r'),
        b't' => Some('\t'),
        b'v' => Some('\x0b'),
        _ => None,
    };
    if let Some(ch) = simple {
        return Ok((ch, 2));
    }
    let digits = match c {
        b'x' | b'X' => 2,
        b'u' => 4,
        b'U' => 8,
        _ => return Err(syntax_error(at, format!("unknown escape '\\{}'", c as char))),
    };
    let hex = input
        .get(at + 2..at + 2 + digits)
        .ok_or_else(|| syntax_error(at, "incomplete escape sequence"))?;
    let cp = u32::from_str_radix(hex, 16)
        .map_err(|_| syntax_error(at, format!("invalid hex escape '{hex}'")))?;
    let ch = char::from_u32(cp)
        .ok_or_else(|| syntax_error(at, format!("invalid code point U+{cp:04X}")))?;
    Ok((ch, 2 + digits))
}

fn lex_number(bytes: &[u8], start: usize) -> Result<(Token, usize), CompileError> {
    let mut i = start;

    // Hex integer
    if bytes[i] == b'0' && matches!(bytes.get(i + 1), Some(b'x' | b'X')) {
        i += 2;
        let digits_start = i;
        while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
            i += 1;
        }
        let text = std::str::from_utf8(&bytes[digits_start..i]).unwrap_or_default();
        let n = u64::from_str_radix(text, 16)
            .map_err(|_| syntax_error(start, "invalid hex literal"))?;
        return int_token(n, bytes, start, i);
    }

    let mut is_float = false;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
        is_float = true;
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if bytes.get(j).is_some_and(u8::is_ascii_digit) {
            is_float = true;
            i = j;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let text = std::str::from_utf8(&bytes[start..i]).unwrap_or_default();
    if is_float {
        let f: f64 = text
            .parse()
            .map_err(|_| syntax_error(start, format!("invalid float literal '{text}'")))?;
        return Ok((Token::Float(f), i - start));
    }
    let n: u64 = text
        .parse()
        .map_err(|_| syntax_error(start, format!("integer literal '{text}' out of range")))?;
    int_token(n, bytes, start, i)
}

/// Finish an integer literal: an optional `u`/`U` suffix makes it unsigned.
fn int_token(n: u64, bytes: &[u8], start: usize, end: usize) -> Result<(Token, usize), CompileError> {
    if matches!(bytes.get(end), Some(b'u' | b'U')) {
        return Ok((Token::Uint(n), end + 1 - start));
    }
    if n == i64::MIN.unsigned_abs() {
        return Ok((Token::IntMinMagnitude, end - start));
    }
    let n = i64::try_from(n)
        .map_err(|_| syntax_error(start, "integer literal out of range"))?;
    Ok((Token::Int(n), end - start))
}
