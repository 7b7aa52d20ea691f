use glam::{Vec2, Vec3};

use crate::error::MD5Error;

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Literal(String),
    Int,
    Float,
    Str,
}

/// A positional record template, e.g. `vert %d ( %f %f ) %d %d`
///
/// Tokens are separated by whitespace. `%d` converts an integer, `%f` a float and `%s` a string (double quotes
/// stripped); anything else is a literal which must appear verbatim. Whitespace in the input is skipped before
/// every token, so `(0` and `( 0` both match `( %f`.
#[derive(Clone, Debug)]
pub struct RecordPattern {
    tokens: Vec<Token>,
    arity: usize,
}

/// Fields converted by a successful scan, grouped by type in template order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    ints: Vec<i64>,
    floats: Vec<f32>,
    strings: Vec<String>,
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn skip_blanks(self: &mut Self) {
        let rest = &self.src[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn rest(self: &Self) -> &'a str {
        &self.src[self.pos..]
    }

    fn literal(self: &mut Self, lit: &str) -> bool {
        let rest = self.rest();
        if !rest.starts_with(lit) {
            return false;
        }

        // keywords must not run into an identifier (`frame` vs `frameRate`)
        let ends_word = lit.chars().last().map_or(false, |c| c.is_ascii_alphanumeric());
        let next = rest[lit.len()..].chars().next();
        if ends_word && next.map_or(false, |c| c.is_ascii_alphanumeric() || c == '_') {
            return false;
        }

        self.pos += lit.len();
        true
    }

    fn int(self: &mut Self) -> Option<i64> {
        let bytes = self.rest().as_bytes();
        let mut len = 0;
        while len < bytes.len() && (bytes[len].is_ascii_digit() || (len == 0 && (bytes[len] == b'-' || bytes[len] == b'+'))) {
            len += 1;
        }

        match self.rest()[..len].parse::<i64>() {
            Ok(v) => {
                self.pos += len;
                Some(v)
            }
            Err(_) => None
        }
    }

    fn float(self: &mut Self) -> Option<f32> {
        let start = self.pos;
        let bytes = self.rest().as_bytes();
        let mut len = 0;

        if len < bytes.len() && (bytes[len] == b'-' || bytes[len] == b'+') {
            len += 1;
        }

        let mut digits = 0;
        while len < bytes.len() && bytes[len].is_ascii_digit() {
            len += 1;
            digits += 1;
        }
        if len < bytes.len() && bytes[len] == b'.' {
            len += 1;
            while len < bytes.len() && bytes[len].is_ascii_digit() {
                len += 1;
                digits += 1;
            }
        }
        if digits == 0 {
            return None;
        }

        // exponent only counts if it has digits
        if len < bytes.len() && (bytes[len] == b'e' || bytes[len] == b'E') {
            let mut exp = len + 1;
            if exp < bytes.len() && (bytes[exp] == b'-' || bytes[exp] == b'+') {
                exp += 1;
            }
            if exp < bytes.len() && bytes[exp].is_ascii_digit() {
                while exp < bytes.len() && bytes[exp].is_ascii_digit() {
                    exp += 1;
                }
                len = exp;
            }
        }

        match self.src[start..start + len].parse::<f32>() {
            Ok(v) => {
                self.pos += len;
                Some(v)
            }
            Err(_) => None
        }
    }

    fn string(self: &mut Self) -> Option<String> {
        let rest = self.rest();
        if rest.is_empty() {
            return None;
        }

        let word_len = rest.find(|c: char| c.is_ascii_whitespace()).unwrap_or(rest.len());

        // quoted names may contain blanks
        let len = if rest.starts_with('"') {
            match rest[1..].find('"') {
                Some(end) => end + 2,
                None => word_len
            }
        } else {
            word_len
        };

        self.pos += len;
        Some(strip_quotes(&rest[..len]))
    }
}

impl RecordPattern {
    pub fn new(template: &str) -> RecordPattern {
        let tokens: Vec<Token> = template.split_whitespace().map(|t| {
            match t {
                "%d" => Token::Int,
                "%f" => Token::Float,
                "%s" => Token::Str,
                _ => Token::Literal(t.to_owned())
            }
        }).collect();

        let arity = tokens.iter().filter(|t| !matches!(t, Token::Literal(_))).count();

        RecordPattern {
            tokens,
            arity
        }
    }

    /// Number of fields this pattern converts
    pub fn arity(self: &Self) -> usize {
        self.arity
    }

    /// Whether `line` is meant for this pattern: its leading keyword matches.
    /// Patterns which start with a conversion claim every non-empty line.
    pub fn claims(self: &Self, line: &str) -> bool {
        let mut cursor = Cursor { src: line, pos: 0 };
        cursor.skip_blanks();

        if cursor.rest().is_empty() {
            return false;
        }

        match self.tokens.first() {
            Some(Token::Literal(lit)) => cursor.literal(lit),
            Some(_) => true,
            None => false
        }
    }

    /// Match `line` against the pattern. Partial matches are `None`.
    pub fn scan(self: &Self, line: &str) -> Option<Record> {
        let mut cursor = Cursor { src: line, pos: 0 };
        let mut record = Record::default();

        for token in &self.tokens {
            cursor.skip_blanks();

            match token {
                Token::Literal(lit) => {
                    if !cursor.literal(lit) {
                        return None;
                    }
                }
                Token::Int => {
                    record.ints.push(cursor.int()?);
                }
                Token::Float => {
                    record.floats.push(cursor.float()?);
                }
                Token::Str => {
                    record.strings.push(cursor.string()?);
                }
            }
        }

        if record.len() != self.arity {
            return None;
        }

        Some(record)
    }
}

impl Record {
    pub fn len(self: &Self) -> usize {
        self.ints.len() + self.floats.len() + self.strings.len()
    }

    pub fn is_empty(self: &Self) -> bool {
        self.len() == 0
    }

    /// `idx`-th integer field
    pub fn int(self: &Self, idx: usize) -> i64 {
        self.ints[idx]
    }

    /// `idx`-th float field
    pub fn float(self: &Self, idx: usize) -> f32 {
        self.floats[idx]
    }

    /// `idx`-th string field
    pub fn string(self: &Self, idx: usize) -> &str {
        &self.strings[idx]
    }

    /// Float fields `idx..idx + 2`
    pub fn vec2(self: &Self, idx: usize) -> Vec2 {
        Vec2::new(self.floats[idx], self.floats[idx + 1])
    }

    /// Float fields `idx..idx + 3`
    pub fn vec3(self: &Self, idx: usize) -> Vec3 {
        Vec3::new(self.floats[idx], self.floats[idx + 1], self.floats[idx + 2])
    }

    pub fn take_string(self: &mut Self, idx: usize) -> String {
        std::mem::take(&mut self.strings[idx])
    }
}

/// Allocate room for exactly `count` elements of a declared array
pub fn alloc_exact<T>(count: i64, what: &'static str, line: usize) -> Result<Vec<T>, MD5Error> {
    let err = MD5Error::AllocationError { line, what, count };

    let len = match usize::try_from(count) {
        Ok(v) => v,
        Err(_) => return Err(err)
    };

    let mut v = Vec::new();
    match v.try_reserve_exact(len) {
        Ok(_) => Ok(v),
        Err(_) => Err(err)
    }
}

/// Closing line of a `{ ... }` block
pub fn is_block_end(line: &str) -> bool {
    line.starts_with('}')
}

pub fn strip_quotes(src: &str) -> String {
    src.chars().filter(|c| *c != '"').collect()
}

/// Parse one float with the same syntax as a `%f` record field
pub fn parse_float(token: &str) -> Option<f32> {
    let mut cursor = Cursor { src: token, pos: 0 };
    match cursor.float() {
        Some(v) if cursor.pos == token.len() => Some(v),
        _ => None
    }
}

/// Parse every whitespace separated token of `src` as a float. On failure, returns the offending token.
pub fn parse_floats(src: &str) -> Result<Vec<f32>, &str> {
    let mut values = Vec::new();
    for token in src.split_whitespace() {
        match parse_float(token) {
            Some(v) => values.push(v),
            None => return Err(token)
        }
    }
    Ok(values)
}
