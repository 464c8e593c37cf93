//! Line-oriented structured-document reader.
//!
//! Rule files are YAML-shaped but the rule parser needs exact source
//! positions for every node, which serde-based loaders do not expose, so
//! this module reads the subset of the format that rule files actually use
//! directly from the raw lines: block mappings and sequences by
//! indentation, inline `- key: value` sequence items, plain and quoted
//! scalars, literal `|` and folded `>` block scalars, scalar anchors and
//! aliases, empty and simple one-line flow collections, and quote-aware
//! comment stripping.
//!
//! Line numbering is 1-based and shifted by a caller-supplied offset so
//! rule blocks embedded in larger documents keep their true positions.
//!
//! Position rule for scalars: a literal/folded block scalar starts on the
//! line after its style marker, anything else on its own line; the last
//! line adds the number of newlines embedded in the trimmed value.

use std::collections::HashMap;

use crate::lines::LineRange;

/// A scalar with its computed position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Scalar {
    pub value: String,
    pub lines: LineRange,
}

impl Scalar {
    fn single(value: impl Into<String>, line: usize) -> Self {
        Self {
            value: value.into(),
            lines: LineRange::single(line),
        }
    }
}

/// One node of the document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DocValue {
    Scalar(Scalar),
    Mapping(Mapping),
    Sequence(Sequence),
}

impl DocValue {
    pub(crate) fn lines(&self) -> LineRange {
        match self {
            Self::Scalar(s) => s.lines,
            Self::Mapping(m) => m.lines(),
            Self::Sequence(s) => s.lines(),
        }
    }
}

/// A block or flow mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Mapping {
    pub entries: Vec<(Scalar, DocValue)>,
    pub line: usize,
}

impl Mapping {
    pub(crate) fn get(&self, key: &str) -> Option<&DocValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.value == key)
            .map(|(_, v)| v)
    }

    pub(crate) fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub(crate) fn lines(&self) -> LineRange {
        let mut lines = LineRange::single(self.line);
        for (key, value) in &self.entries {
            lines = lines.cover(key.lines).cover(value.lines());
        }
        lines
    }
}

/// A block or flow sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Sequence {
    pub items: Vec<DocValue>,
    pub line: usize,
}

impl Sequence {
    pub(crate) fn lines(&self) -> LineRange {
        let mut lines = LineRange::single(self.line);
        for item in &self.items {
            lines = lines.cover(item.lines());
        }
        lines
    }
}

/// A comment found anywhere in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileComment {
    pub line: usize,
    /// Text after the `#` marker, trimmed.
    pub text: String,
    /// True when the comment had a line of its own.
    pub own_line: bool,
}

/// A structural failure; the whole file is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocError {
    pub line: usize,
    pub message: String,
}

/// The parsed file: one root per document plus every comment.
#[derive(Debug, Clone, Default)]
pub(crate) struct Document {
    pub roots: Vec<DocValue>,
    pub comments: Vec<FileComment>,
}

/// Reads a document, shifting all line numbers by `offset`.
pub(crate) fn read(input: &str, offset: usize) -> Result<Document, DocError> {
    let mut reader = Reader {
        lines: input
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
            .collect(),
        pos: 0,
        offset,
        comments: Vec::new(),
        anchors: HashMap::new(),
    };
    reader.read_document()
}

struct Reader {
    lines: Vec<String>,
    pos: usize,
    offset: usize,
    comments: Vec<FileComment>,
    anchors: HashMap<String, String>,
}

impl Reader {
    fn line_no(&self, idx: usize) -> usize {
        idx + 1 + self.offset
    }

    fn read_document(&mut self) -> Result<Document, DocError> {
        let mut roots = Vec::new();
        loop {
            self.skip_inert_lines()?;
            let Some(idx) = self.peek_content()? else {
                break;
            };
            if is_document_marker(self.lines[idx].trim()) {
                self.pos = idx + 1;
                continue;
            }
            match self.parse_block(0)? {
                Some(value) => roots.push(value),
                None => break,
            }
        }
        Ok(Document {
            roots,
            comments: std::mem::take(&mut self.comments),
        })
    }

    // Consumes blank and comment-only lines, stopping before content or a
    // document marker.
    fn skip_inert_lines(&mut self) -> Result<(), DocError> {
        while self.pos < self.lines.len() {
            let raw = self.lines[self.pos].clone();
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                self.pos += 1;
                continue;
            }
            if let Some(text) = trimmed.strip_prefix('#') {
                self.comments.push(FileComment {
                    line: self.line_no(self.pos),
                    text: text.trim().to_string(),
                    own_line: true,
                });
                self.pos += 1;
                continue;
            }
            indent_of(&raw).map_err(|message| DocError {
                line: self.line_no(self.pos),
                message,
            })?;
            break;
        }
        Ok(())
    }

    // Index of the next content line, without consuming it.
    fn peek_content(&mut self) -> Result<Option<usize>, DocError> {
        self.skip_inert_lines()?;
        if self.pos < self.lines.len() {
            Ok(Some(self.pos))
        } else {
            Ok(None)
        }
    }

    // Strips the trailing comment of the line at `idx`, recording it. A
    // line can be inspected more than once while deciding block shapes, so
    // recording is keyed by line number.
    fn code_of(&mut self, idx: usize) -> String {
        let raw = self.lines[idx].clone();
        let (code, comment) = split_comment(&raw);
        if let Some(text) = comment {
            let line = self.line_no(idx);
            if !self.comments.iter().any(|c| c.line == line && !c.own_line) {
                self.comments.push(FileComment {
                    line,
                    text,
                    own_line: false,
                });
            }
        }
        code.trim_end().to_string()
    }

    fn error(&self, idx: usize, message: impl Into<String>) -> DocError {
        DocError {
            line: self.line_no(idx),
            message: message.into(),
        }
    }

    // Parses the block starting at the next content line, provided it is
    // indented at least `min_indent`.
    fn parse_block(&mut self, min_indent: usize) -> Result<Option<DocValue>, DocError> {
        let Some(idx) = self.peek_content()? else {
            return Ok(None);
        };
        let raw = self.lines[idx].clone();
        if is_document_marker(raw.trim()) {
            return Ok(None);
        }
        let indent = indent_of(&raw).map_err(|m| self.error(idx, m))?;
        if indent < min_indent {
            return Ok(None);
        }
        let code = self.code_of(idx);
        if code.is_empty() {
            // The whole line was a comment; try again past it.
            self.pos = idx + 1;
            return self.parse_block(min_indent);
        }
        let content = &code[indent..];
        if content == "-" || content.starts_with("- ") {
            return Ok(Some(DocValue::Sequence(self.parse_sequence(indent)?)));
        }
        if find_key_separator(content).is_some() {
            return Ok(Some(DocValue::Mapping(self.parse_mapping(indent)?)));
        }
        let scalar = self.parse_plain_scalar(idx, indent, content)?;
        Ok(Some(DocValue::Scalar(scalar)))
    }

    fn parse_mapping(&mut self, indent: usize) -> Result<Mapping, DocError> {
        let mut entries: Vec<(Scalar, DocValue)> = Vec::new();
        let line = self.line_no(self.pos);
        loop {
            let Some(idx) = self.peek_content()? else {
                break;
            };
            let raw = self.lines[idx].clone();
            if is_document_marker(raw.trim()) {
                break;
            }
            let this_indent = indent_of(&raw).map_err(|m| self.error(idx, m))?;
            if this_indent < indent {
                break;
            }
            if this_indent > indent {
                return Err(self.error(idx, "invalid indentation"));
            }
            let code = self.code_of(idx);
            if code.is_empty() {
                self.pos = idx + 1;
                continue;
            }
            let content = code[indent..].to_string();
            if content == "-" || content.starts_with("- ") {
                return Err(self.error(idx, "did not find expected key"));
            }
            let Some(sep) = find_key_separator(&content) else {
                return Err(self.error(idx, "did not find expected key"));
            };
            let key_text = content[..sep].trim();
            let key = Scalar::single(unquote(key_text), self.line_no(idx));
            let rest = content[sep + 1..].trim().to_string();
            self.pos = idx + 1;
            let value = self.parse_entry_value(&rest, idx, indent)?;
            entries.push((key, value));
        }
        Ok(Mapping { entries, line })
    }

    fn parse_sequence(&mut self, indent: usize) -> Result<Sequence, DocError> {
        let mut items = Vec::new();
        let line = self.line_no(self.pos);
        loop {
            let Some(idx) = self.peek_content()? else {
                break;
            };
            let raw = self.lines[idx].clone();
            if is_document_marker(raw.trim()) {
                break;
            }
            let this_indent = indent_of(&raw).map_err(|m| self.error(idx, m))?;
            if this_indent != indent {
                break;
            }
            let code = self.code_of(idx);
            if code.is_empty() {
                self.pos = idx + 1;
                continue;
            }
            let content = &code[indent..];
            if !(content == "-" || content.starts_with("- ")) {
                break;
            }
            let after_dash = &content[1..];
            let inner = after_dash.trim_start();
            if inner.is_empty() {
                // Item body on the following, deeper-indented lines.
                self.pos = idx + 1;
                match self.parse_block(indent + 1)? {
                    Some(value) => items.push(value),
                    None => items.push(DocValue::Scalar(Scalar::single(
                        "",
                        self.line_no(idx),
                    ))),
                }
                continue;
            }
            // Rewrite the line without the dash so the item parses as a
            // normal block starting at the content column.
            let item_indent = indent + 1 + (after_dash.len() - inner.len());
            let raw_after_dash = self.lines[idx][indent + 1..].to_string();
            self.lines[idx] = format!("{}{}", " ".repeat(item_indent), raw_after_dash.trim_start());
            match self.parse_block(item_indent)? {
                Some(value) => items.push(value),
                None => items.push(DocValue::Scalar(Scalar::single("", self.line_no(idx)))),
            }
        }
        Ok(Sequence { items, line })
    }

    // Parses the value part of `key: <rest>`; the key line is already
    // consumed.
    fn parse_entry_value(
        &mut self,
        rest: &str,
        key_idx: usize,
        parent_indent: usize,
    ) -> Result<DocValue, DocError> {
        if rest.is_empty() {
            return self.parse_nested_value(key_idx, parent_indent);
        }
        if let Some(style) = block_scalar_marker(rest) {
            return Ok(DocValue::Scalar(self.parse_block_scalar(
                key_idx,
                parent_indent,
                style,
            )?));
        }
        if let Some(name) = rest.strip_prefix('*') {
            let name = name.trim();
            let Some(value) = self.anchors.get(name).cloned() else {
                return Err(self.error(key_idx, format!("unknown anchor '{name}'")));
            };
            return Ok(DocValue::Scalar(Scalar::single(value, self.line_no(key_idx))));
        }
        if let Some(after) = rest.strip_prefix('&') {
            let (name, tail) = match after.split_once(char::is_whitespace) {
                Some((n, t)) => (n.trim(), t.trim()),
                None => (after.trim(), ""),
            };
            if name.is_empty() {
                return Err(self.error(key_idx, "empty anchor name"));
            }
            if tail.is_empty() {
                // Anchor on a nested value; only scalar anchors are
                // dereferenced later.
                return self.parse_nested_value(key_idx, parent_indent);
            }
            let value = self.scalar_text(tail, key_idx, parent_indent)?;
            self.anchors.insert(name.to_string(), value.value.clone());
            return Ok(DocValue::Scalar(value));
        }
        if rest == "{}" {
            return Ok(DocValue::Mapping(Mapping {
                entries: Vec::new(),
                line: self.line_no(key_idx),
            }));
        }
        if rest == "[]" {
            return Ok(DocValue::Sequence(Sequence {
                items: Vec::new(),
                line: self.line_no(key_idx),
            }));
        }
        if rest.starts_with('{') {
            return self.parse_flow_mapping(rest, key_idx);
        }
        if rest.starts_with('[') {
            return self.parse_flow_sequence(rest, key_idx);
        }
        Ok(DocValue::Scalar(self.scalar_text(rest, key_idx, parent_indent)?))
    }

    // Value on the lines after the key: a deeper block, a sequence at the
    // key's own indent, or nothing (empty scalar at the key line).
    fn parse_nested_value(
        &mut self,
        key_idx: usize,
        parent_indent: usize,
    ) -> Result<DocValue, DocError> {
        if let Some(idx) = self.peek_content()? {
            let raw = self.lines[idx].clone();
            if !is_document_marker(raw.trim()) {
                let indent = indent_of(&raw).map_err(|m| self.error(idx, m))?;
                let code = self.code_of(idx);
                let content = if code.len() > indent { &code[indent..] } else { "" };
                let is_item = content == "-" || content.starts_with("- ");
                if indent == parent_indent && is_item {
                    return Ok(DocValue::Sequence(self.parse_sequence(indent)?));
                }
                if indent > parent_indent {
                    if let Some(value) = self.parse_block(parent_indent + 1)? {
                        return Ok(value);
                    }
                }
            }
        }
        Ok(DocValue::Scalar(Scalar::single("", self.line_no(key_idx))))
    }

    // A plain or quoted scalar starting on the key's line, folding any
    // deeper-indented continuation lines with spaces.
    fn scalar_text(
        &mut self,
        first: &str,
        key_idx: usize,
        parent_indent: usize,
    ) -> Result<Scalar, DocError> {
        let mut value = unquote(first);
        let quoted = first.starts_with('"') || first.starts_with('\'');
        if !quoted {
            while self.pos < self.lines.len() {
                let raw = self.lines[self.pos].clone();
                let trimmed = raw.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') || is_document_marker(trimmed) {
                    break;
                }
                let indent = indent_of(&raw).map_err(|m| self.error(self.pos, m))?;
                if indent <= parent_indent {
                    break;
                }
                let code = self.code_of(self.pos);
                let content = code[indent.min(code.len())..].trim();
                if content.is_empty()
                    || content == "-"
                    || content.starts_with("- ")
                    || find_key_separator(content).is_some()
                {
                    break;
                }
                value.push(' ');
                value.push_str(content);
                self.pos += 1;
            }
        }
        Ok(Scalar::single(value, self.line_no(key_idx)))
    }

    fn parse_plain_scalar(
        &mut self,
        idx: usize,
        indent: usize,
        content: &str,
    ) -> Result<Scalar, DocError> {
        self.pos = idx + 1;
        let mut scalar = self.scalar_text(content, idx, indent)?;
        scalar.lines = LineRange::single(self.line_no(idx));
        Ok(scalar)
    }

    fn parse_block_scalar(
        &mut self,
        marker_idx: usize,
        parent_indent: usize,
        style: BlockStyle,
    ) -> Result<Scalar, DocError> {
        let mut raw_lines: Vec<String> = Vec::new();
        let mut block_indent: Option<usize> = None;
        while self.pos < self.lines.len() {
            let raw = self.lines[self.pos].clone();
            if raw.trim().is_empty() {
                raw_lines.push(String::new());
                self.pos += 1;
                continue;
            }
            let indent = indent_of(&raw).map_err(|m| self.error(self.pos, m))?;
            if indent <= parent_indent {
                break;
            }
            let block = *block_indent.get_or_insert(indent);
            let keep_from = block.min(indent);
            raw_lines.push(raw[keep_from..].to_string());
            self.pos += 1;
        }
        while raw_lines.last().is_some_and(String::is_empty) {
            raw_lines.pop();
        }
        let value = match style {
            BlockStyle::Literal => raw_lines.join("\n"),
            BlockStyle::Folded => fold_lines(&raw_lines),
        };
        let marker_line = self.line_no(marker_idx);
        let lines = if value.is_empty() {
            LineRange::single(marker_line)
        } else {
            let first = marker_line + 1;
            let last = first + value.trim_end_matches('\n').matches('\n').count();
            LineRange::new(first, last)
        };
        Ok(Scalar { value, lines })
    }

    fn parse_flow_mapping(&mut self, rest: &str, key_idx: usize) -> Result<DocValue, DocError> {
        let Some(inner) = rest.strip_prefix('{').and_then(|r| r.strip_suffix('}')) else {
            return Err(self.error(key_idx, "unterminated flow mapping"));
        };
        let line = self.line_no(key_idx);
        let mut entries = Vec::new();
        for part in split_flow_items(inner) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let Some(sep) = find_key_separator(part).or_else(|| part.find(':')) else {
                return Err(self.error(key_idx, format!("invalid flow mapping entry: {part}")));
            };
            let key = Scalar::single(unquote(part[..sep].trim()), line);
            let value = Scalar::single(unquote(part[sep + 1..].trim()), line);
            entries.push((key, DocValue::Scalar(value)));
        }
        Ok(DocValue::Mapping(Mapping { entries, line }))
    }

    fn parse_flow_sequence(&mut self, rest: &str, key_idx: usize) -> Result<DocValue, DocError> {
        let Some(inner) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) else {
            return Err(self.error(key_idx, "unterminated flow sequence"));
        };
        let line = self.line_no(key_idx);
        let items = split_flow_items(inner)
            .into_iter()
            .map(|part| DocValue::Scalar(Scalar::single(unquote(part.trim()), line)))
            .collect();
        Ok(DocValue::Sequence(Sequence { items, line }))
    }
}

#[derive(Debug, Clone, Copy)]
enum BlockStyle {
    Literal,
    Folded,
}

fn block_scalar_marker(rest: &str) -> Option<BlockStyle> {
    let style = match rest.chars().next()? {
        '|' => BlockStyle::Literal,
        '>' => BlockStyle::Folded,
        _ => return None,
    };
    rest[1..]
        .chars()
        .all(|c| c == '+' || c == '-' || c.is_ascii_digit())
        .then_some(style)
}

fn fold_lines(lines: &[String]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            out.push_str(line);
        } else if line.is_empty() {
            out.push('\n');
        } else if out.ends_with('\n') || out.is_empty() {
            out.push_str(line);
        } else {
            out.push(' ');
            out.push_str(line);
        }
    }
    out
}

fn is_document_marker(trimmed: &str) -> bool {
    trimmed == "---" || trimmed == "..."
}

fn indent_of(raw: &str) -> Result<usize, String> {
    let mut count = 0;
    for c in raw.chars() {
        match c {
            ' ' => count += 1,
            '\t' => return Err("found a tab character that violates indentation".to_string()),
            _ => break,
        }
    }
    Ok(count)
}

// Splits a raw line into code and trailing comment text. A `#` starts a
// comment when it sits outside quotes at the start of the line or after
// whitespace.
fn split_comment(raw: &str) -> (String, Option<String>) {
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;
    let mut prev: Option<char> = None;
    for (i, c) in raw.char_indices() {
        match c {
            '\\' if in_double && !escaped => {
                escaped = true;
                prev = Some(c);
                continue;
            }
            '"' if !in_single && !escaped => in_double = !in_double,
            '\'' if !in_double => in_single = !in_single,
            '#' if !in_single && !in_double => {
                let boundary = prev.map_or(true, char::is_whitespace);
                if boundary {
                    let text = raw[i + 1..].trim().to_string();
                    return (raw[..i].to_string(), Some(text));
                }
            }
            _ => {}
        }
        escaped = false;
        prev = Some(c);
    }
    (raw.to_string(), None)
}

// Position of the colon separating a mapping key from its value: the
// first `:` outside quotes followed by whitespace or end of line.
fn find_key_separator(content: &str) -> Option<usize> {
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;
    let bytes = content.as_bytes();
    for (i, c) in content.char_indices() {
        match c {
            '\\' if in_double && !escaped => {
                escaped = true;
                continue;
            }
            '"' if !in_single && !escaped => in_double = !in_double,
            '\'' if !in_double => in_single = !in_single,
            ':' if !in_single && !in_double => {
                let at_end = i + 1 == bytes.len();
                if at_end || bytes[i + 1].is_ascii_whitespace() {
                    return Some(i);
                }
            }
            _ => {}
        }
        escaped = false;
    }
    None
}

fn unquote(text: &str) -> String {
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        let inner = &text[1..text.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                }
            } else {
                out.push(c);
            }
        }
        return out;
    }
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        return text[1..text.len() - 1].replace("''", "'");
    }
    text.to_string()
}

fn split_flow_items(inner: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;
    for c in inner.chars() {
        match c {
            '\\' if in_double && !escaped => {
                escaped = true;
                current.push(c);
                continue;
            }
            '"' if !in_single && !escaped => in_double = !in_double,
            '\'' if !in_double => in_single = !in_single,
            ',' if !in_single && !in_double => {
                items.push(std::mem::take(&mut current));
                escaped = false;
                continue;
            }
            _ => {}
        }
        escaped = false;
        current.push(c);
    }
    if !current.trim().is_empty() {
        items.push(current);
    }
    items
}
