//! Media type parsing
//!
//! Parses wire-format content types such as
//! `text/plain; charset="UTF-8"; format=flowed`. Only the first element
//! of a comma separated list is considered. The `charset` parameter, if
//! present and non-blank, must name a supported [`Charset`].

use core::fmt;
use std::str::FromStr;

use crate::error::ContentTypeError;

/// Character encodings the core can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    UsAscii,
    Iso8859_1,
    /// UTF-16 with optional byte order mark, big endian otherwise
    Utf16,
    Utf16Be,
    Utf16Le,
}

impl Charset {
    /// Look up a charset by its IANA name or a common alias.
    pub fn for_label(label: &str) -> Option<Charset> {
        let label = label.trim().to_ascii_lowercase();
        let charset = match label.as_str() {
            "utf-8" | "utf8" | "unicode-1-1-utf-8" => Charset::Utf8,
            "us-ascii" | "ascii" | "iso646-us" | "ansi_x3.4-1968" => Charset::UsAscii,
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "l1" | "cp819" => {
                Charset::Iso8859_1
            }
            "utf-16" | "utf16" => Charset::Utf16,
            "utf-16be" | "utf16be" => Charset::Utf16Be,
            "utf-16le" | "utf16le" => Charset::Utf16Le,
            _ => return None,
        };
        Some(charset)
    }

    /// Canonical name.
    pub const fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::UsAscii => "US-ASCII",
            Charset::Iso8859_1 => "ISO-8859-1",
            Charset::Utf16 => "UTF-16",
            Charset::Utf16Be => "UTF-16BE",
            Charset::Utf16Le => "UTF-16LE",
        }
    }

    /// Decode `bytes`, replacing malformed input with U+FFFD.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::UsAscii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
                .collect(),
            Charset::Iso8859_1 => bytes.iter().map(|&b| b as char).collect(),
            Charset::Utf16 => match bytes {
                [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
                [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
                _ => decode_utf16(bytes, u16::from_be_bytes),
            },
            Charset::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
            Charset::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let chunks = bytes.chunks_exact(2);
    let trailing = !chunks.remainder().is_empty();
    let units = chunks.map(|c| unit([c[0], c[1]]));
    let mut out: String = char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    if trailing {
        out.push(char::REPLACEMENT_CHARACTER);
    }
    out
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    mime_type: String,
    charset: Option<Charset>,
    params: Vec<(String, String)>,
}

impl ContentType {
    /// Create a content type without parameters.
    pub fn new(mime_type: impl Into<String>, charset: Option<Charset>) -> Self {
        Self {
            mime_type: mime_type.into(),
            charset,
            params: Vec::new(),
        }
    }

    /// Parse an optional declared content type.
    ///
    /// `None` or a blank string means no content type was declared.
    pub fn parse_optional(s: Option<&str>) -> Result<Option<ContentType>, ContentTypeError> {
        match s {
            Some(s) if !s.trim().is_empty() => s.parse().map(Some),
            _ => Ok(None),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn charset(&self) -> Option<Charset> {
        self.charset
    }

    /// Parameter value by case-insensitive name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ContentTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let element = split_unquoted(s, ',').into_iter().next().unwrap_or_default();
        let mut parts = split_unquoted(&element, ';').into_iter();

        let mime_type = parts.next().unwrap_or_default().trim().to_string();
        if mime_type.is_empty() || mime_type.contains('=') {
            return Err(ContentTypeError::Invalid(s.to_string()));
        }

        let mut params = Vec::new();
        for part in parts {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, value) = match part.split_once('=') {
                Some((n, v)) => (n.trim(), unquote(v.trim())),
                None => (part, String::new()),
            };
            if name.is_empty() {
                return Err(ContentTypeError::Invalid(s.to_string()));
            }
            params.push((name.to_string(), value));
        }

        let charset = match params.iter().find(|(n, _)| n.eq_ignore_ascii_case("charset")) {
            Some((_, v)) if !v.trim().is_empty() => Some(
                Charset::for_label(v)
                    .ok_or_else(|| ContentTypeError::UnsupportedCharset(v.clone()))?,
            ),
            _ => None,
        };

        Ok(ContentType {
            mime_type,
            charset,
            params,
        })
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mime_type)?;
        for (name, value) in &self.params {
            if value.is_empty() {
                write!(f, "; {}", name)?;
            } else if value.bytes().all(|b| b.is_ascii_alphanumeric() || b"-_.+".contains(&b)) {
                write!(f, "; {}={}", name, value)?;
            } else {
                write!(f, "; {}=\"{}\"", name, value.replace('\\', "\\\\").replace('"', "\\\""))?;
            }
        }
        if self.charset.is_some() && self.param("charset").is_none() {
            write!(f, "; charset={}", self.charset.map(|c| c.name()).unwrap_or_default())?;
        }
        Ok(())
    }
}

/// Split on `sep` outside of double quotes.
fn split_unquoted(s: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            cur.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => {
                cur.push(c);
                escaped = true;
            }
            '"' => {
                cur.push(c);
                quoted = !quoted;
            }
            c if c == sep && !quoted => out.push(std::mem::take(&mut cur)),
            c => cur.push(c),
        }
    }
    out.push(cur);
    out
}

fn unquote(v: &str) -> String {
    match v.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => {
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else {
                    out.push(c);
                }
            }
            out
        }
        None => v.to_string(),
    }
}
