//! Inline markup parsing: color spans, emphasis, strikethrough, code, links.
//!
//! Parsing is fail-soft. Any opening marker without a matching closer is kept
//! as literal text and the rest of the block keeps the surrounding style.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::color::{parse_color, Rgb};

/// Contiguous text sharing one set of visual attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledRun {
    /// Visible text. Never empty in parser output.
    pub text: String,
    /// Explicit color from a span; `None` means the theme default.
    pub color: Option<Rgb>,
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    /// Inline code, drawn in the monospace face.
    pub code: bool,
}

impl StyledRun {
    /// Unstyled run.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// True when both runs would render with identical attributes.
    pub fn same_style(&self, other: &Self) -> bool {
        self.color == other.color
            && self.bold == other.bold
            && self.italic == other.italic
            && self.strikethrough == other.strikethrough
            && self.code == other.code
    }
}

/// Concatenate run text, ignoring style.
pub fn plain_text(runs: &[StyledRun]) -> String {
    let mut out = String::with_capacity(runs.iter().map(|run| run.text.len()).sum());
    for run in runs {
        out.push_str(&run.text);
    }
    out
}

/// Parse one block's raw text into flattened styled runs.
pub fn parse_inline(text: &str) -> Vec<StyledRun> {
    let tokens = Lexer::new(text).run();
    let roles = match_markers(&tokens);
    build_runs(&tokens, &roles)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Marker {
    Strong,
    Emphasis,
    Strike,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tag {
    Span,
    Bold,
    Italic,
    Strike,
}

impl Tag {
    fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "span" | "font" => Some(Self::Span),
            "b" | "strong" => Some(Self::Bold),
            "i" | "em" => Some(Self::Italic),
            "s" | "del" | "strike" => Some(Self::Strike),
            _ => None,
        }
    }
}

/// Color declared by a span frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SpanColor {
    /// No color declaration; the outer color shows through.
    Inherit,
    /// Declared but unrecognized; resolves to the theme default.
    Default,
    Color(Rgb),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Text(String),
    Code(String),
    Delim {
        marker: Marker,
        raw: &'static str,
        can_open: bool,
        can_close: bool,
    },
    TagOpen {
        tag: Tag,
        color: SpanColor,
        raw: String,
    },
    TagClose {
        tag: Tag,
        raw: String,
    },
}

impl Token {
    fn raw(&self) -> &str {
        match self {
            Self::Text(text) | Self::Code(text) => text,
            Self::Delim { raw, .. } => raw,
            Self::TagOpen { raw, .. } | Self::TagClose { raw, .. } => raw,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Literal,
    Open,
    Close,
}

const ESCAPABLE: &[u8] = b"\\`*_~[]()<>#|!-+.{}";

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    tokens: Vec<Token>,
    text: String,
    // (label end, position after the closing paren) for open link labels.
    links: SmallVec<[(usize, usize); 2]>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            tokens: Vec::with_capacity(8),
            text: String::with_capacity(src.len()),
            links: SmallVec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() {
            if let Some(&(label_end, after)) = self.links.last() {
                if self.pos == label_end {
                    self.links.pop();
                    self.pos = after;
                    continue;
                }
                if self.pos > label_end {
                    self.links.pop();
                    continue;
                }
            }
            let b = bytes[self.pos];
            let consumed = match b {
                b'\\' => self.lex_escape(),
                b'`' => self.lex_code(),
                b'*' | b'_' => self.lex_emphasis(b),
                b'~' => self.lex_strike(),
                b'<' => self.lex_tag(),
                b'&' => self.lex_entity(),
                b'!' if bytes.get(self.pos + 1) == Some(&b'[') => self.lex_link(self.pos + 1),
                b'[' => self.lex_link(self.pos),
                b'\n' | b'\r' | b'\t' => {
                    self.text.push(' ');
                    self.pos += 1;
                    true
                }
                _ => false,
            };
            if !consumed {
                self.push_char_at_pos();
            }
        }
        self.flush_text();
        self.tokens
    }

    fn push_char_at_pos(&mut self) {
        if let Some(ch) = self.src[self.pos..].chars().next() {
            self.text.push(ch);
            self.pos += ch.len_utf8();
        } else {
            self.pos = self.src.len();
        }
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = core::mem::take(&mut self.text);
            self.tokens.push(Token::Text(text));
        }
    }

    fn push_token(&mut self, token: Token) {
        self.flush_text();
        self.tokens.push(token);
    }

    fn prev_char(&self, at: usize) -> Option<char> {
        self.src[..at].chars().next_back()
    }

    fn next_char(&self, at: usize) -> Option<char> {
        self.src.get(at..).and_then(|rest| rest.chars().next())
    }

    fn lex_escape(&mut self) -> bool {
        let Some(&next) = self.src.as_bytes().get(self.pos + 1) else {
            return false;
        };
        if !ESCAPABLE.contains(&next) {
            return false;
        }
        self.text.push(next as char);
        self.pos += 2;
        true
    }

    fn lex_code(&mut self) -> bool {
        let bytes = self.src.as_bytes();
        let start = self.pos;
        let ticks = bytes[start..].iter().take_while(|b| **b == b'`').count();
        let content_start = start + ticks;
        let mut search = content_start;
        while search < bytes.len() {
            if bytes[search] != b'`' {
                search += 1;
                continue;
            }
            let run = bytes[search..].iter().take_while(|b| **b == b'`').count();
            if run == ticks {
                let mut content = &self.src[content_start..search];
                if content.len() >= 2 && content.starts_with(' ') && content.ends_with(' ') {
                    content = &content[1..content.len() - 1];
                }
                let content = content.replace(['\n', '\r'], " ");
                if content.is_empty() {
                    log::debug!("empty inline code span dropped");
                } else {
                    self.push_token(Token::Code(content));
                }
                self.pos = search + run;
                return true;
            }
            search += run;
        }
        log::debug!("unterminated inline code marker kept as literal text");
        self.text.push_str(&self.src[start..content_start]);
        self.pos = content_start;
        true
    }

    fn lex_emphasis(&mut self, marker: u8) -> bool {
        let bytes = self.src.as_bytes();
        let start = self.pos;
        let len = bytes[start..].iter().take_while(|b| **b == marker).count();
        let end = start + len;
        if len > 3 {
            self.text.push_str(&self.src[start..end]);
            self.pos = end;
            return true;
        }

        let prev = self.prev_char(start);
        let next = self.next_char(end);
        let prev_ws = prev.is_none_or(char::is_whitespace);
        let next_ws = next.is_none_or(char::is_whitespace);
        let mut can_open = !next_ws;
        let mut can_close = !prev_ws;
        if marker == b'_' {
            // snake_case stays literal.
            can_open &= !prev.is_some_and(char::is_alphanumeric);
            can_close &= !next.is_some_and(char::is_alphanumeric);
        }
        if !can_open && !can_close {
            self.text.push_str(&self.src[start..end]);
            self.pos = end;
            return true;
        }

        let (strong, emphasis) = if marker == b'*' {
            ("**", "*")
        } else {
            ("__", "_")
        };
        let delim = |marker: Marker, raw: &'static str| Token::Delim {
            marker,
            raw,
            can_open,
            can_close,
        };
        match len {
            1 => self.push_token(delim(Marker::Emphasis, emphasis)),
            2 => self.push_token(delim(Marker::Strong, strong)),
            _ => {
                if can_close && !can_open {
                    self.push_token(delim(Marker::Emphasis, emphasis));
                    self.push_token(delim(Marker::Strong, strong));
                } else {
                    self.push_token(delim(Marker::Strong, strong));
                    self.push_token(delim(Marker::Emphasis, emphasis));
                }
            }
        }
        self.pos = end;
        true
    }

    fn lex_strike(&mut self) -> bool {
        let bytes = self.src.as_bytes();
        let start = self.pos;
        let len = bytes[start..].iter().take_while(|b| **b == b'~').count();
        let end = start + len;
        if len != 2 {
            self.text.push_str(&self.src[start..end]);
            self.pos = end;
            return true;
        }
        let can_open = !self.next_char(end).is_none_or(char::is_whitespace);
        let can_close = !self.prev_char(start).is_none_or(char::is_whitespace);
        if !can_open && !can_close {
            self.text.push_str("~~");
        } else {
            self.push_token(Token::Delim {
                marker: Marker::Strike,
                raw: "~~",
                can_open,
                can_close,
            });
        }
        self.pos = end;
        true
    }

    fn lex_tag(&mut self) -> bool {
        let rest = &self.src[self.pos..];
        let Some(close) = rest.find('>') else {
            return false;
        };
        let raw = &rest[..=close];
        let inner = raw[1..raw.len() - 1].trim();
        if inner.is_empty() || inner.contains('<') {
            return false;
        }

        if let Some(name) = inner.strip_prefix('/') {
            let Some(tag) = Tag::from_name(name.trim()) else {
                return false;
            };
            self.push_token(Token::TagClose {
                tag,
                raw: raw.to_string(),
            });
            self.pos += raw.len();
            return true;
        }

        let inner = inner.trim_end_matches('/').trim_end();
        if inner.eq_ignore_ascii_case("br") {
            self.text.push(' ');
            self.pos += raw.len();
            return true;
        }
        let name_end = inner
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(inner.len());
        let Some(tag) = Tag::from_name(&inner[..name_end]) else {
            return false;
        };
        let color = if tag == Tag::Span {
            span_color(&inner[name_end..])
        } else {
            SpanColor::Inherit
        };
        self.push_token(Token::TagOpen {
            tag,
            color,
            raw: raw.to_string(),
        });
        self.pos += raw.len();
        true
    }

    fn lex_entity(&mut self) -> bool {
        const ENTITIES: &[(&str, char)] = &[
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&amp;", '&'),
            ("&quot;", '"'),
            ("&#39;", '\''),
            ("&nbsp;", ' '),
        ];
        let rest = &self.src[self.pos..];
        for (entity, ch) in ENTITIES {
            if rest.starts_with(entity) {
                self.text.push(*ch);
                self.pos += entity.len();
                return true;
            }
        }
        false
    }

    fn lex_link(&mut self, open: usize) -> bool {
        let bytes = self.src.as_bytes();
        let mut depth = 0usize;
        let mut label_end = None;
        for (idx, b) in bytes.iter().enumerate().skip(open) {
            match b {
                b'[' => depth += 1,
                b']' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        label_end = Some(idx);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(label_end) = label_end else {
            return false;
        };
        if bytes.get(label_end + 1) != Some(&b'(') {
            return false;
        }
        let mut parens = 0usize;
        let mut after = None;
        for (idx, b) in bytes.iter().enumerate().skip(label_end + 1) {
            match b {
                b'(' => parens += 1,
                b')' => {
                    parens = parens.saturating_sub(1);
                    if parens == 0 {
                        after = Some(idx + 1);
                        break;
                    }
                }
                b'\n' => break,
                _ => {}
            }
        }
        let Some(after) = after else {
            return false;
        };
        self.links.push((label_end, after));
        self.pos = open + 1;
        true
    }
}

fn span_color(attrs: &str) -> SpanColor {
    let lower = attrs.to_ascii_lowercase();
    let Some(style_at) = lower.find("style") else {
        return legacy_font_color(attrs, &lower);
    };
    let after = attrs[style_at + "style".len()..].trim_start();
    let Some(after) = after.strip_prefix('=') else {
        return SpanColor::Inherit;
    };
    let value = attribute_value(after.trim_start());
    for declaration in value.split(';') {
        let Some((property, color)) = declaration.split_once(':') else {
            continue;
        };
        if property.trim().eq_ignore_ascii_case("color") {
            return match parse_color(color) {
                Some(rgb) => SpanColor::Color(rgb),
                None => {
                    log::debug!("unknown span color {:?}; using theme default", color.trim());
                    SpanColor::Default
                }
            };
        }
    }
    SpanColor::Inherit
}

// `<font color="red">`
fn legacy_font_color(attrs: &str, lower: &str) -> SpanColor {
    let Some(at) = lower.find("color") else {
        return SpanColor::Inherit;
    };
    let after = attrs[at + "color".len()..].trim_start();
    let Some(after) = after.strip_prefix('=') else {
        return SpanColor::Inherit;
    };
    match parse_color(attribute_value(after.trim_start())) {
        Some(rgb) => SpanColor::Color(rgb),
        None => SpanColor::Default,
    }
}

fn attribute_value(src: &str) -> &str {
    let mut chars = src.chars();
    match chars.next() {
        Some(quote @ ('"' | '\'')) => {
            let body = &src[1..];
            body.find(quote).map_or(body, |end| &body[..end])
        }
        _ => src
            .find(|c: char| c.is_ascii_whitespace() || c == '>')
            .map_or(src, |end| &src[..end]),
    }
}

fn match_markers(tokens: &[Token]) -> Vec<Role> {
    let mut roles = vec![Role::Literal; tokens.len()];
    let mut openers: SmallVec<[usize; 8]> = SmallVec::new();

    for (idx, token) in tokens.iter().enumerate() {
        match token {
            Token::Delim {
                raw,
                can_open,
                can_close,
                ..
            } => {
                if *can_close {
                    let found = openers.iter().rposition(|&open| {
                        matches!(&tokens[open], Token::Delim { raw: open_raw, .. } if open_raw == raw)
                    });
                    if let Some(at) = found {
                        roles[openers[at]] = Role::Open;
                        roles[idx] = Role::Close;
                        openers.truncate(at);
                        continue;
                    }
                }
                if *can_open {
                    openers.push(idx);
                }
            }
            Token::TagOpen { .. } => openers.push(idx),
            Token::TagClose { tag, .. } => {
                let found = openers.iter().rposition(|&open| {
                    matches!(&tokens[open], Token::TagOpen { tag: open_tag, .. } if open_tag == tag)
                });
                if let Some(at) = found {
                    roles[openers[at]] = Role::Open;
                    roles[idx] = Role::Close;
                    openers.truncate(at);
                }
            }
            Token::Text(_) | Token::Code(_) => {}
        }
    }

    for open in openers {
        log::debug!(
            "unterminated inline marker {:?} kept as literal text",
            tokens[open].raw()
        );
    }
    roles
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Frame {
    Marker(Marker),
    Tag(Tag, SpanColor),
}

#[derive(Default)]
struct RunBuilder {
    runs: Vec<StyledRun>,
    frames: SmallVec<[Frame; 8]>,
}

impl RunBuilder {
    fn current_style(&self, code: bool) -> StyledRun {
        let has = |marker: Marker, tag: Tag| {
            self.frames.iter().any(|frame| match frame {
                Frame::Marker(m) => *m == marker,
                Frame::Tag(t, _) => *t == tag,
            })
        };
        let color = self
            .frames
            .iter()
            .rev()
            .find_map(|frame| match frame {
                Frame::Tag(Tag::Span, SpanColor::Color(rgb)) => Some(Some(*rgb)),
                Frame::Tag(Tag::Span, SpanColor::Default) => Some(None),
                _ => None,
            })
            .flatten();
        StyledRun {
            text: String::new(),
            color,
            bold: has(Marker::Strong, Tag::Bold),
            italic: has(Marker::Emphasis, Tag::Italic),
            strikethrough: has(Marker::Strike, Tag::Strike),
            code,
        }
    }

    fn push_text(&mut self, text: &str, code: bool) {
        if text.is_empty() {
            return;
        }
        let style = self.current_style(code);
        if let Some(last) = self.runs.last_mut() {
            if last.same_style(&style) {
                last.text.push_str(text);
                return;
            }
        }
        self.runs.push(StyledRun {
            text: text.to_string(),
            ..style
        });
    }

    fn pop(&mut self, frame: Frame) {
        let found = self.frames.iter().rposition(|open| match (open, &frame) {
            (Frame::Marker(a), Frame::Marker(b)) => a == b,
            (Frame::Tag(a, _), Frame::Tag(b, _)) => a == b,
            _ => false,
        });
        if let Some(at) = found {
            self.frames.remove(at);
        }
    }
}

fn build_runs(tokens: &[Token], roles: &[Role]) -> Vec<StyledRun> {
    let mut builder = RunBuilder::default();
    for (token, role) in tokens.iter().zip(roles.iter().copied()) {
        match (token, role) {
            (Token::Text(text), _) => builder.push_text(text, false),
            (Token::Code(text), _) => builder.push_text(text, true),
            (Token::Delim { marker, .. }, Role::Open) => builder.frames.push(Frame::Marker(*marker)),
            (Token::Delim { marker, .. }, Role::Close) => builder.pop(Frame::Marker(*marker)),
            (Token::TagOpen { tag, color, .. }, Role::Open) => {
                builder.frames.push(Frame::Tag(*tag, *color))
            }
            (Token::TagClose { tag, .. }, Role::Close) => {
                builder.pop(Frame::Tag(*tag, SpanColor::Inherit))
            }
            (other, _) => builder.push_text(other.raw(), false),
        }
    }
    builder.runs
}
