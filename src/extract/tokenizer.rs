//! Incremental HTML tokenizer.
//!
//! [`Tokenizer`] walks a byte slice once, front to back, and yields one
//! [`Token`] per call to `next`. Nothing but the current token is allocated,
//! so scanning a large page for an anchor costs memory proportional to the
//! largest single token, not to the page.
//!
//! The tokenizer is lenient: stray `<` characters become text,
//! attribute syntax is accepted loosely, and void elements (`<br>`, `<img>`,
//! ...) are reported as self-closing so tree construction never waits for an
//! end tag that will not come. `script`/`style` contents are raw text;
//! `title`/`textarea` contents are text with character references resolved.

use std::borrow::Cow;

/// One attribute of a start tag, in source order. Duplicate names are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    StartTag {
        name: String,
        attrs: Vec<Attribute>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
    Text(String),
    Comment(String),
    Doctype(String),
}

/// The input ended inside a construct that needs a terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    UnterminatedTag { offset: usize },
    UnterminatedComment { offset: usize },
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is not markup.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Elements whose content is not markup but may hold character references.
const RCDATA_ELEMENTS: &[&str] = &["textarea", "title"];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

struct RawText {
    /// Closing sequence, e.g. `</script`.
    end: Vec<u8>,
    rcdata: bool,
}

pub struct Tokenizer<'a> {
    input: &'a [u8],
    pos: usize,
    /// Set while inside a raw text or RCDATA element.
    raw_text: Option<RawText>,
    failed: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            raw_text: None,
            failed: false,
        }
    }

    /// Byte offset of the next unread input byte.
    pub fn offset(&self) -> usize {
        self.pos
    }

    fn rest(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    fn fail(&mut self, err: TokenizeError) -> Option<Result<Token, TokenizeError>> {
        self.failed = true;
        Some(Err(err))
    }

    fn next_token(&mut self) -> Option<Result<Token, TokenizeError>> {
        loop {
            if self.failed || self.pos >= self.input.len() {
                return None;
            }

            if let Some(raw) = self.raw_text.take() {
                let rest = self.rest();
                let len = find_ignore_case(rest, &raw.end).unwrap_or(rest.len());
                self.pos += len;
                if len > 0 {
                    let text = if raw.rcdata {
                        decode_entities(&rest[..len]).into_owned()
                    } else {
                        String::from_utf8_lossy(&rest[..len]).into_owned()
                    };
                    return Some(Ok(Token::Text(text)));
                }
                continue;
            }

            let rest = self.rest();
            if rest[0] != b'<' {
                let len = rest.iter().position(|&b| b == b'<').unwrap_or(rest.len());
                self.pos += len;
                return Some(Ok(Token::Text(decode_entities(&rest[..len]).into_owned())));
            }

            if rest.starts_with(b"<!--") {
                let start = self.pos;
                let Some(end) = find(&rest[4..], b"-->") else {
                    return self.fail(TokenizeError::UnterminatedComment { offset: start });
                };
                self.pos += 4 + end + 3;
                let body = String::from_utf8_lossy(&rest[4..4 + end]).into_owned();
                return Some(Ok(Token::Comment(body)));
            }

            if rest.starts_with(b"<!") || rest.starts_with(b"<?") {
                let start = self.pos;
                let Some(end) = rest.iter().position(|&b| b == b'>') else {
                    return self.fail(TokenizeError::UnterminatedTag { offset: start });
                };
                self.pos += end + 1;
                let body = String::from_utf8_lossy(&rest[2..end]).into_owned();
                if rest.len() >= 9 && rest[2..9].eq_ignore_ascii_case(b"doctype") {
                    return Some(Ok(Token::Doctype(body[7..].trim().to_string())));
                }
                return Some(Ok(Token::Comment(body)));
            }

            if rest.starts_with(b"</") {
                return Some(self.end_tag());
            }

            if rest.len() > 1 && rest[1].is_ascii_alphabetic() {
                return Some(self.start_tag());
            }

            // A lone '<' is text.
            let len = 1 + rest[1..].iter().position(|&b| b == b'<').unwrap_or(rest.len() - 1);
            self.pos += len;
            return Some(Ok(Token::Text(decode_entities(&rest[..len]).into_owned())));
        }
    }

    fn end_tag(&mut self) -> Result<Token, TokenizeError> {
        let start = self.pos;
        let rest = self.rest();
        let Some(end) = rest.iter().position(|&b| b == b'>') else {
            self.failed = true;
            return Err(TokenizeError::UnterminatedTag { offset: start });
        };
        self.pos += end + 1;

        let inner = &rest[2..end];
        let name_len = inner
            .iter()
            .position(|b| b.is_ascii_whitespace() || *b == b'/')
            .unwrap_or(inner.len());
        let name = String::from_utf8_lossy(&inner[..name_len]).to_ascii_lowercase();
        if name.is_empty() || !inner[0].is_ascii_alphabetic() {
            return Ok(Token::Comment(String::from_utf8_lossy(inner).into_owned()));
        }
        Ok(Token::EndTag { name })
    }

    fn unterminated(&mut self, offset: usize) -> Result<Token, TokenizeError> {
        self.failed = true;
        Err(TokenizeError::UnterminatedTag { offset })
    }

    fn start_tag(&mut self) -> Result<Token, TokenizeError> {
        let start = self.pos;
        let input = self.input;

        let mut i = start + 1;
        while i < input.len() && !is_tag_name_end(input[i]) {
            i += 1;
        }
        let name = String::from_utf8_lossy(&input[start + 1..i]).to_ascii_lowercase();

        let mut attrs = Vec::new();
        let mut self_closing = false;
        loop {
            while i < input.len() && input[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= input.len() {
                return self.unterminated(start);
            }
            match input[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' if input.get(i + 1) == Some(&b'>') => {
                    self_closing = true;
                    i += 2;
                    break;
                }
                b'/' => {
                    i += 1;
                    continue;
                }
                _ => {}
            }

            let name_start = i;
            while i < input.len() && !is_attr_name_end(input[i]) {
                i += 1;
            }
            if i == name_start {
                // Junk such as a stray '='; skip it.
                i += 1;
                continue;
            }
            let attr_name = String::from_utf8_lossy(&input[name_start..i]).to_ascii_lowercase();

            while i < input.len() && input[i].is_ascii_whitespace() {
                i += 1;
            }
            let mut value = String::new();
            if input.get(i) == Some(&b'=') {
                i += 1;
                while i < input.len() && input[i].is_ascii_whitespace() {
                    i += 1;
                }
                match input.get(i) {
                    Some(&quote) if quote == b'"' || quote == b'\'' => {
                        let Some(len) = input[i + 1..].iter().position(|&b| b == quote) else {
                            return self.unterminated(start);
                        };
                        value = decode_entities(&input[i + 1..i + 1 + len]).into_owned();
                        i += len + 2;
                    }
                    Some(_) => {
                        let value_start = i;
                        while i < input.len() && !input[i].is_ascii_whitespace() && input[i] != b'>' {
                            i += 1;
                        }
                        value = decode_entities(&input[value_start..i]).into_owned();
                    }
                    None => return self.unterminated(start),
                }
            }
            attrs.push(Attribute::new(attr_name, value));
        }

        self.pos = i;
        if is_void_element(&name) {
            self_closing = true;
        }
        let raw = RAW_TEXT_ELEMENTS.contains(&name.as_str());
        let rcdata = RCDATA_ELEMENTS.contains(&name.as_str());
        if !self_closing && (raw || rcdata) {
            let mut end = b"</".to_vec();
            end.extend_from_slice(name.as_bytes());
            self.raw_text = Some(RawText {
                end,
                rcdata,
            });
        }

        Ok(Token::StartTag {
            name,
            attrs,
            self_closing,
        })
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token, TokenizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

fn is_tag_name_end(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'/' || b == b'>'
}

fn is_attr_name_end(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'=' || b == b'>' || b == b'/'
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn find_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

/// Resolve character references in text or attribute values.
///
/// Numeric references and a small set of named ones are decoded; anything
/// else is left as written.
pub fn decode_entities(raw: &[u8]) -> Cow<'_, str> {
    let text = String::from_utf8_lossy(raw);
    if !text.contains('&') {
        return text;
    }

    let mut out = String::with_capacity(text.len());
    let mut rest: &str = &text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let resolved = rest[1..]
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| resolve_entity(&rest[1..1 + semi]).map(|c| (c, semi + 2)));
        match resolved {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn resolve_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "auml" => 'ä',
        "ouml" => 'ö',
        "uuml" => 'ü',
        "Auml" => 'Ä',
        "Ouml" => 'Ö',
        "Uuml" => 'Ü',
        "szlig" => 'ß',
        "eacute" => 'é',
        "egrave" => 'è',
        "agrave" => 'à',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "laquo" => '«',
        "raquo" => '»',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "bdquo" => '„',
        "copy" => '©',
        _ => return None,
    };
    Some(c)
}
