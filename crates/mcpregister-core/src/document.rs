use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

/// Byte range into the original document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A single localized replacement against the original text. Edits produced
/// by one operation never overlap and are applied back-to-front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub span: Span,
    pub replacement: String,
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("cannot edit '{path}': {message}")]
    Edit { path: String, message: String },
}

#[derive(Debug, Clone)]
pub enum NodeValue {
    Null,
    Bool(bool),
    /// Raw source text of the number, kept verbatim.
    Number(String),
    String(String),
    Array(Vec<Node>),
    Object(Vec<Member>),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub value: NodeValue,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub key: String,
    pub key_span: Span,
    pub value: Node,
}

/// One tool config held in memory: the original raw text plus a span tree
/// over it. Mutations are expressed as [`TextEdit`]s against the raw text so
/// comments and formatting outside the edited key survive byte-for-byte.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    text: String,
    root: Node,
    indent_unit: String,
}

impl ConfigDocument {
    /// Parses JSON extended with `//` and `/* */` comments and trailing
    /// commas. The file is never rewritten from this tree; the tree only
    /// locates spans for edits.
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let mut parser = Parser { text, pos: 0 };
        let root = parser.parse_document()?;
        Ok(Self {
            text: text.to_string(),
            root,
            indent_unit: detect_indent(text),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn indent_unit(&self) -> &str {
        &self.indent_unit
    }

    pub fn get_path(&self, path: &[&str]) -> Option<&Node> {
        let mut node = &self.root;
        for key in path {
            let NodeValue::Object(members) = &node.value else {
                return None;
            };
            node = &members.iter().find(|member| member.key == *key)?.value;
        }
        Some(node)
    }

    /// Produces the minimal edits that make `path` hold `value`. Returns an
    /// empty list when the document already holds an equal value, so a
    /// repeated apply leaves the file byte-identical.
    pub fn set_path(
        &self,
        path: &[&str],
        value: &JsonValue,
    ) -> Result<Vec<TextEdit>, DocumentError> {
        if path.is_empty() {
            return Err(DocumentError::Edit {
                path: String::new(),
                message: String::from("empty key path"),
            });
        }

        let mut current = &self.root;
        for (index, key) in path.iter().enumerate() {
            let NodeValue::Object(members) = &current.value else {
                return Err(DocumentError::Edit {
                    path: path[..index].join("."),
                    message: String::from("existing value is not an object"),
                });
            };

            match members.iter().find(|member| member.key == *key) {
                Some(member) if index + 1 == path.len() => {
                    if node_to_value(&member.value) == *value {
                        return Ok(Vec::new());
                    }
                    let base = self.line_indent(member.key_span.start).to_string();
                    return Ok(vec![TextEdit {
                        span: member.value.span,
                        replacement: render_value(value, &base, &self.indent_unit),
                    }]);
                }
                Some(member) => {
                    current = &member.value;
                }
                None => {
                    let mut wrapped = value.clone();
                    for tail_key in path[index + 1..].iter().rev() {
                        let mut object = JsonMap::new();
                        object.insert((*tail_key).to_string(), wrapped);
                        wrapped = JsonValue::Object(object);
                    }
                    return self.insert_member(current, key, &wrapped);
                }
            }
        }

        // Every arm of the final iteration returns.
        Err(DocumentError::Edit {
            path: path.join("."),
            message: String::from("empty key path"),
        })
    }

    /// Edits that delete the member at `path`, its separating comma and the
    /// line whitespace it occupied.
    pub fn remove_path(&self, path: &[&str]) -> Result<Vec<TextEdit>, DocumentError> {
        let Some((last, parent_path)) = path.split_last() else {
            return Err(DocumentError::Edit {
                path: String::new(),
                message: String::from("empty key path"),
            });
        };

        let Some(parent) = self.get_path(parent_path) else {
            return Err(DocumentError::Edit {
                path: parent_path.join("."),
                message: String::from("no such key"),
            });
        };
        let NodeValue::Object(members) = &parent.value else {
            return Err(DocumentError::Edit {
                path: parent_path.join("."),
                message: String::from("existing value is not an object"),
            });
        };
        let Some(position) = members.iter().position(|member| member.key == *last) else {
            return Err(DocumentError::Edit {
                path: path.join("."),
                message: String::from("no such key"),
            });
        };

        let member = &members[position];
        let span = self.removal_span(
            member.key_span.start,
            member.value.span.end,
            position == 0,
            position + 1 == members.len(),
        );
        Ok(vec![TextEdit {
            span,
            replacement: String::new(),
        }])
    }

    /// Appends items to the array at `path`; the array must already exist.
    pub fn append_array_items(
        &self,
        path: &[&str],
        items: &[JsonValue],
    ) -> Result<Vec<TextEdit>, DocumentError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let Some(node) = self.get_path(path) else {
            return Err(DocumentError::Edit {
                path: path.join("."),
                message: String::from("no such key"),
            });
        };
        let NodeValue::Array(elements) = &node.value else {
            return Err(DocumentError::Edit {
                path: path.join("."),
                message: String::from("existing value is not an array"),
            });
        };

        if let Some(last) = elements.last() {
            let insert_at = last.span.end;
            let replacement = if self.span_is_single_line(node.span) {
                items
                    .iter()
                    .map(|item| format!(", {}", render_compact(item)))
                    .collect::<String>()
            } else {
                let base = self.line_indent(last.span.start).to_string();
                items
                    .iter()
                    .map(|item| {
                        format!(",\n{base}{}", render_value(item, &base, &self.indent_unit))
                    })
                    .collect::<String>()
            };
            return Ok(vec![TextEdit {
                span: Span {
                    start: insert_at,
                    end: insert_at,
                },
                replacement,
            }]);
        }

        // Empty array: rebuild the interior between the brackets.
        let base = self.line_indent(node.span.start).to_string();
        let item_indent = format!("{base}{}", self.indent_unit);
        let rendered = items
            .iter()
            .map(|item| {
                format!(
                    "{item_indent}{}",
                    render_value(item, &item_indent, &self.indent_unit)
                )
            })
            .collect::<Vec<_>>()
            .join(",\n");
        Ok(vec![TextEdit {
            span: Span {
                start: node.span.start + 1,
                end: node.span.end - 1,
            },
            replacement: format!("\n{rendered}\n{base}"),
        }])
    }

    /// Removes every array element at `path` for which `remove` returns true.
    pub fn remove_array_items<F>(
        &self,
        path: &[&str],
        mut remove: F,
    ) -> Result<Vec<TextEdit>, DocumentError>
    where
        F: FnMut(&JsonValue) -> bool,
    {
        let Some(node) = self.get_path(path) else {
            return Ok(Vec::new());
        };
        let NodeValue::Array(elements) = &node.value else {
            return Err(DocumentError::Edit {
                path: path.join("."),
                message: String::from("existing value is not an array"),
            });
        };

        let doomed: Vec<usize> = elements
            .iter()
            .enumerate()
            .filter(|(_, element)| remove(&node_to_value(element)))
            .map(|(index, _)| index)
            .collect();

        let mut edits = Vec::new();
        for &index in &doomed {
            let element = &elements[index];
            let is_last = index + 1 == elements.len();
            // When the previous element is also being removed, its edit
            // already consumed the comma between the two.
            let previous_removed = index > 0 && doomed.contains(&(index - 1));
            let span = self.removal_span(
                element.span.start,
                element.span.end,
                index == 0 || previous_removed,
                is_last,
            );
            edits.push(TextEdit {
                span,
                replacement: String::new(),
            });
        }
        Ok(edits)
    }

    /// True when the document carries no entries at all: the root object has
    /// no members, or only members whose values are empty objects/arrays.
    pub fn is_semantically_empty(&self) -> bool {
        let NodeValue::Object(members) = &self.root.value else {
            return false;
        };
        members.iter().all(|member| match &member.value.value {
            NodeValue::Object(inner) => inner.is_empty(),
            NodeValue::Array(inner) => inner.is_empty(),
            _ => false,
        })
    }

    /// Splices edits into `text` back-to-front.
    pub fn apply_edits(text: &str, edits: &[TextEdit]) -> String {
        let mut sorted: Vec<&TextEdit> = edits.iter().collect();
        sorted.sort_by(|lhs, rhs| rhs.span.start.cmp(&lhs.span.start));
        let mut result = text.to_string();
        for edit in sorted {
            result.replace_range(edit.span.start..edit.span.end, &edit.replacement);
        }
        result
    }

    /// Renders a brand-new document for a file that does not exist yet.
    pub fn render_new(value: &JsonValue) -> String {
        let mut rendered = render_value(value, "", "  ");
        rendered.push('\n');
        rendered
    }

    fn insert_member(
        &self,
        object: &Node,
        key: &str,
        value: &JsonValue,
    ) -> Result<Vec<TextEdit>, DocumentError> {
        let NodeValue::Object(members) = &object.value else {
            return Err(DocumentError::Edit {
                path: key.to_string(),
                message: String::from("existing value is not an object"),
            });
        };
        let key_json = JsonValue::String(key.to_string()).to_string();

        if let Some(last) = members.last() {
            let insert_at = last.value.span.end;
            let replacement = if self.span_is_single_line(object.span) {
                format!(", {key_json}: {}", render_compact(value))
            } else {
                let base = self.line_indent(last.key_span.start).to_string();
                format!(
                    ",\n{base}{key_json}: {}",
                    render_value(value, &base, &self.indent_unit)
                )
            };
            return Ok(vec![TextEdit {
                span: Span {
                    start: insert_at,
                    end: insert_at,
                },
                replacement,
            }]);
        }

        let base = self.line_indent(object.span.start).to_string();
        let member_indent = format!("{base}{}", self.indent_unit);
        let rendered = format!(
            "{member_indent}{key_json}: {}",
            render_value(value, &member_indent, &self.indent_unit)
        );
        let interior = Span {
            start: object.span.start + 1,
            end: object.span.end - 1,
        };
        if self.text[interior.start..interior.end]
            .chars()
            .all(char::is_whitespace)
        {
            Ok(vec![TextEdit {
                span: interior,
                replacement: format!("\n{rendered}\n{base}"),
            }])
        } else {
            // Comments live between the braces; insert ahead of them.
            Ok(vec![TextEdit {
                span: Span {
                    start: interior.start,
                    end: interior.start,
                },
                replacement: format!("\n{rendered}"),
            }])
        }
    }

    fn removal_span(&self, start: usize, end: usize, is_first: bool, is_last: bool) -> Span {
        let bytes = self.text.as_bytes();

        // Take the whole line when only whitespace precedes the member.
        let line_start = self.text[..start]
            .rfind('\n')
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let whole_line = self.text[line_start..start]
            .chars()
            .all(|c| c == ' ' || c == '\t');
        let mut span_start = if whole_line { line_start } else { start };
        let mut span_end = end;

        // Consume the trailing comma, or for a comma-less last member the
        // comma that preceded it.
        let trailing_comma = scan_forward_for_comma(&self.text, end);
        if let Some(comma) = trailing_comma {
            span_end = comma + 1;
            if whole_line {
                let mut cursor = span_end;
                while cursor < bytes.len() && (bytes[cursor] == b' ' || bytes[cursor] == b'\t') {
                    cursor += 1;
                }
                if cursor < bytes.len() && bytes[cursor] == b'\n' {
                    span_end = cursor + 1;
                    span_start = span_start.min(line_start);
                }
            }
        } else if is_last && !is_first {
            if let Some(comma) = scan_backward_for_comma(&self.text, span_start) {
                span_start = comma;
            }
        }

        Span {
            start: span_start,
            end: span_end,
        }
    }

    fn line_indent(&self, offset: usize) -> &str {
        let line_start = self.text[..offset]
            .rfind('\n')
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let line = &self.text[line_start..offset];
        let indent_len = line
            .char_indices()
            .find(|(_, c)| *c != ' ' && *c != '\t')
            .map(|(index, _)| index)
            .unwrap_or(line.len());
        &line[..indent_len]
    }

    fn span_is_single_line(&self, span: Span) -> bool {
        !self.text[span.start..span.end].contains('\n')
    }
}

/// Converts a span node into a plain value for comparisons and reads.
pub fn node_to_value(node: &Node) -> JsonValue {
    match &node.value {
        NodeValue::Null => JsonValue::Null,
        NodeValue::Bool(value) => JsonValue::Bool(*value),
        NodeValue::Number(raw) => raw
            .parse::<serde_json::Number>()
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        NodeValue::String(value) => JsonValue::String(value.clone()),
        NodeValue::Array(elements) => {
            JsonValue::Array(elements.iter().map(node_to_value).collect())
        }
        NodeValue::Object(members) => {
            let mut object = JsonMap::new();
            for member in members {
                object.insert(member.key.clone(), node_to_value(&member.value));
            }
            JsonValue::Object(object)
        }
    }
}

fn scan_forward_for_comma(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut pos = from;
    while pos < bytes.len() {
        match bytes[pos] {
            b' ' | b'\t' | b'\r' | b'\n' => pos += 1,
            b',' => return Some(pos),
            b'/' if bytes.get(pos + 1) == Some(&b'/') => {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                match text[pos + 2..].find("*/") {
                    Some(found) => pos = pos + 2 + found + 2,
                    None => return None,
                }
            }
            _ => return None,
        }
    }
    None
}

fn scan_backward_for_comma(text: &str, until: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut pos = until;
    while pos > 0 {
        pos -= 1;
        match bytes[pos] {
            b' ' | b'\t' | b'\r' | b'\n' => {}
            b',' => return Some(pos),
            _ => return None,
        }
    }
    None
}

fn detect_indent(text: &str) -> String {
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.len() == line.len() {
            continue;
        }
        let leading = &line[..line.len() - trimmed.len()];
        if leading.starts_with('\t') {
            return String::from("\t");
        }
        let spaces = leading.chars().take_while(|c| *c == ' ').count();
        if spaces > 0 {
            return " ".repeat(spaces.min(8));
        }
    }
    String::from("  ")
}

fn render_compact(value: &JsonValue) -> String {
    value.to_string()
}

/// Pretty-prints `value` for insertion at `base_indent`. The first line is
/// not indented since it continues an existing line; short scalar arrays are
/// kept inline the way hand-written configs usually have them.
fn render_value(value: &JsonValue, base_indent: &str, unit: &str) -> String {
    match value {
        JsonValue::Null | JsonValue::Bool(_) | JsonValue::Number(_) | JsonValue::String(_) => {
            value.to_string()
        }
        JsonValue::Array(items) => {
            if items.is_empty() {
                return String::from("[]");
            }
            let all_scalar = items.iter().all(|item| !item.is_array() && !item.is_object());
            if all_scalar {
                let compact = render_compact(value);
                if compact.len() <= 60 {
                    return compact;
                }
            }
            let child_indent = format!("{base_indent}{unit}");
            let rendered: Vec<String> = items
                .iter()
                .map(|item| {
                    format!("{child_indent}{}", render_value(item, &child_indent, unit))
                })
                .collect();
            format!("[\n{}\n{base_indent}]", rendered.join(",\n"))
        }
        JsonValue::Object(entries) => {
            if entries.is_empty() {
                return String::from("{}");
            }
            let child_indent = format!("{base_indent}{unit}");
            let rendered: Vec<String> = entries
                .iter()
                .map(|(key, item)| {
                    format!(
                        "{child_indent}{}: {}",
                        JsonValue::String(key.clone()),
                        render_value(item, &child_indent, unit)
                    )
                })
                .collect();
            format!("{{\n{}\n{base_indent}}}", rendered.join(",\n"))
        }
    }
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse_document(&mut self) -> Result<Node, DocumentError> {
        self.skip_trivia()?;
        let node = self.parse_value()?;
        self.skip_trivia()?;
        if self.pos != self.text.len() {
            return Err(self.fail("unexpected trailing content"));
        }
        Ok(node)
    }

    fn parse_value(&mut self) -> Result<Node, DocumentError> {
        match self.peek() {
            Some(b'{') => self.parse_object(),
            Some(b'[') => self.parse_array(),
            Some(b'"') => {
                let (value, span) = self.parse_string()?;
                Ok(Node {
                    value: NodeValue::String(value),
                    span,
                })
            }
            Some(b't') => self.parse_literal("true", NodeValue::Bool(true)),
            Some(b'f') => self.parse_literal("false", NodeValue::Bool(false)),
            Some(b'n') => self.parse_literal("null", NodeValue::Null),
            Some(b'-') | Some(b'0'..=b'9') => self.parse_number(),
            _ => Err(self.fail("expected a value")),
        }
    }

    fn parse_object(&mut self) -> Result<Node, DocumentError> {
        let start = self.pos;
        self.pos += 1;
        let mut members = Vec::new();

        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                Some(b'"') => {
                    let (key, key_span) = self.parse_string()?;
                    self.skip_trivia()?;
                    if self.peek() != Some(b':') {
                        return Err(self.fail("expected ':' after object key"));
                    }
                    self.pos += 1;
                    self.skip_trivia()?;
                    let value = self.parse_value()?;
                    members.push(Member {
                        key,
                        key_span,
                        value,
                    });
                    self.skip_trivia()?;
                    match self.peek() {
                        Some(b',') => {
                            self.pos += 1;
                        }
                        Some(b'}') => {}
                        _ => return Err(self.fail("expected ',' or '}' in object")),
                    }
                }
                _ => return Err(self.fail("expected '\"' or '}' in object")),
            }
        }

        Ok(Node {
            value: NodeValue::Object(members),
            span: Span {
                start,
                end: self.pos,
            },
        })
    }

    fn parse_array(&mut self) -> Result<Node, DocumentError> {
        let start = self.pos;
        self.pos += 1;
        let mut elements = Vec::new();

        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    elements.push(self.parse_value()?);
                    self.skip_trivia()?;
                    match self.peek() {
                        Some(b',') => {
                            self.pos += 1;
                        }
                        Some(b']') => {}
                        _ => return Err(self.fail("expected ',' or ']' in array")),
                    }
                }
                None => return Err(self.fail("unterminated array")),
            }
        }

        Ok(Node {
            value: NodeValue::Array(elements),
            span: Span {
                start,
                end: self.pos,
            },
        })
    }

    fn parse_string(&mut self) -> Result<(String, Span), DocumentError> {
        let start = self.pos;
        self.pos += 1;
        let bytes = self.text.as_bytes();
        let mut decoded = String::new();

        loop {
            let Some(&byte) = bytes.get(self.pos) else {
                return Err(self.fail("unterminated string"));
            };
            match byte {
                b'"' => {
                    self.pos += 1;
                    return Ok((
                        decoded,
                        Span {
                            start,
                            end: self.pos,
                        },
                    ));
                }
                b'\\' => {
                    self.pos += 1;
                    let Some(&escape) = bytes.get(self.pos) else {
                        return Err(self.fail("unterminated escape"));
                    };
                    self.pos += 1;
                    match escape {
                        b'"' => decoded.push('"'),
                        b'\\' => decoded.push('\\'),
                        b'/' => decoded.push('/'),
                        b'b' => decoded.push('\u{0008}'),
                        b'f' => decoded.push('\u{000C}'),
                        b'n' => decoded.push('\n'),
                        b'r' => decoded.push('\r'),
                        b't' => decoded.push('\t'),
                        b'u' => {
                            let unit = self.parse_hex4()?;
                            let ch = if (0xD800..0xDC00).contains(&unit) {
                                // High surrogate; a \uXXXX low surrogate must follow.
                                if bytes.get(self.pos) == Some(&b'\\')
                                    && bytes.get(self.pos + 1) == Some(&b'u')
                                {
                                    self.pos += 2;
                                    let low = self.parse_hex4()?;
                                    let combined = 0x10000
                                        + ((unit - 0xD800) << 10)
                                        + (low.checked_sub(0xDC00).ok_or_else(|| {
                                            self.fail("invalid low surrogate")
                                        })?);
                                    char::from_u32(combined)
                                } else {
                                    None
                                }
                            } else {
                                char::from_u32(unit)
                            };
                            match ch {
                                Some(ch) => decoded.push(ch),
                                None => return Err(self.fail("invalid unicode escape")),
                            }
                        }
                        _ => return Err(self.fail("invalid escape sequence")),
                    }
                }
                b'\n' => return Err(self.fail("unterminated string")),
                _ => {
                    // Copy one UTF-8 scalar, however many bytes it takes.
                    let ch_start = self.pos;
                    let ch = self.text[ch_start..]
                        .chars()
                        .next()
                        .ok_or_else(|| self.fail("invalid UTF-8"))?;
                    self.pos += ch.len_utf8();
                    decoded.push(ch);
                }
            }
        }
    }

    fn parse_hex4(&mut self) -> Result<u32, DocumentError> {
        let slice = self
            .text
            .get(self.pos..self.pos + 4)
            .ok_or_else(|| self.fail("truncated unicode escape"))?;
        let unit = u32::from_str_radix(slice, 16)
            .map_err(|_| self.fail("invalid unicode escape"))?;
        self.pos += 4;
        Ok(unit)
    }

    fn parse_number(&mut self) -> Result<Node, DocumentError> {
        let start = self.pos;
        let bytes = self.text.as_bytes();
        while let Some(&byte) = bytes.get(self.pos) {
            match byte {
                b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E' => self.pos += 1,
                _ => break,
            }
        }
        let raw = &self.text[start..self.pos];
        if raw.parse::<f64>().is_err() {
            return Err(self.fail("invalid number"));
        }
        Ok(Node {
            value: NodeValue::Number(raw.to_string()),
            span: Span {
                start,
                end: self.pos,
            },
        })
    }

    fn parse_literal(&mut self, keyword: &str, value: NodeValue) -> Result<Node, DocumentError> {
        let start = self.pos;
        if self.text[self.pos..].starts_with(keyword) {
            self.pos += keyword.len();
            Ok(Node {
                value,
                span: Span {
                    start,
                    end: self.pos,
                },
            })
        } else {
            Err(self.fail("expected a value"))
        }
    }

    fn skip_trivia(&mut self) -> Result<(), DocumentError> {
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'/' if bytes.get(self.pos + 1) == Some(&b'/') => {
                    while self.pos < bytes.len() && bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if bytes.get(self.pos + 1) == Some(&b'*') => {
                    match self.text[self.pos + 2..].find("*/") {
                        Some(found) => self.pos = self.pos + 2 + found + 2,
                        None => return Err(self.fail("unterminated block comment")),
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn fail(&self, message: &str) -> DocumentError {
        let consumed = &self.text[..self.pos.min(self.text.len())];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed
            .rfind('\n')
            .map(|pos| self.pos - pos)
            .unwrap_or(self.pos + 1);
        DocumentError::Parse {
            line,
            column,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigDocument, node_to_value};
    use serde_json::json;

    const SAMPLE: &str = r#"{
  // managed by hand, do not sort
  "mcpServers": {
    "existing": {
      "command": "deno",
      "args": ["run", "main.ts"], // entry point
    },
  },
  /* trailing settings */
  "theme": "dark"
}
"#;

    fn apply(doc: &ConfigDocument, edits: &[super::TextEdit]) -> String {
        ConfigDocument::apply_edits(doc.text(), edits)
    }

    #[test]
    fn parses_comments_and_trailing_commas() {
        let doc = ConfigDocument::parse(SAMPLE).expect("parse");
        let node = doc
            .get_path(&["mcpServers", "existing", "command"])
            .expect("path");
        assert_eq!(node_to_value(node), json!("deno"));
    }

    #[test]
    fn parse_error_reports_line_and_column() {
        let error = ConfigDocument::parse("{\n  \"a\": ?\n}").expect_err("must fail");
        let message = error.to_string();
        assert!(message.contains("line 2"), "{message}");
    }

    #[test]
    fn set_existing_value_replaces_only_that_span() {
        let doc = ConfigDocument::parse(SAMPLE).expect("parse");
        let edits = doc
            .set_path(&["theme"], &json!("light"))
            .expect("edits");
        let updated = apply(&doc, &edits);
        assert!(updated.contains("\"theme\": \"light\""));
        assert!(updated.contains("// managed by hand, do not sort"));
        assert!(updated.contains("/* trailing settings */"));
        assert!(updated.contains("// entry point"));
    }

    #[test]
    fn set_equal_value_produces_no_edits() {
        let doc = ConfigDocument::parse(SAMPLE).expect("parse");
        let edits = doc
            .set_path(
                &["mcpServers", "existing", "args"],
                &json!(["run", "main.ts"]),
            )
            .expect("edits");
        assert!(edits.is_empty());
    }

    #[test]
    fn insert_new_member_preserves_siblings_and_trailing_comma() {
        let doc = ConfigDocument::parse(SAMPLE).expect("parse");
        let edits = doc
            .set_path(
                &["mcpServers", "demo"],
                &json!({"command": "node", "args": ["x.js"]}),
            )
            .expect("edits");
        let updated = apply(&doc, &edits);
        let reparsed = ConfigDocument::parse(&updated).expect("reparse");
        assert_eq!(
            node_to_value(reparsed.get_path(&["mcpServers", "demo", "command"]).expect("new")),
            json!("node")
        );
        assert_eq!(
            node_to_value(
                reparsed
                    .get_path(&["mcpServers", "existing", "command"])
                    .expect("old")
            ),
            json!("deno")
        );
        assert!(updated.contains("// entry point"));
    }

    #[test]
    fn insert_creates_missing_parent_objects() {
        let doc = ConfigDocument::parse("{\n  \"theme\": \"dark\"\n}\n").expect("parse");
        let edits = doc
            .set_path(&["servers", "demo", "command"], &json!("node"))
            .expect("edits");
        let updated = apply(&doc, &edits);
        let reparsed = ConfigDocument::parse(&updated).expect("reparse");
        assert_eq!(
            node_to_value(reparsed.get_path(&["servers", "demo", "command"]).expect("path")),
            json!("node")
        );
        assert_eq!(
            node_to_value(reparsed.get_path(&["theme"]).expect("theme")),
            json!("dark")
        );
    }

    #[test]
    fn insert_into_empty_object_document() {
        let doc = ConfigDocument::parse("{}\n").expect("parse");
        let edits = doc
            .set_path(&["mcpServers", "demo"], &json!({"command": "node"}))
            .expect("edits");
        let updated = apply(&doc, &edits);
        let reparsed = ConfigDocument::parse(&updated).expect("reparse");
        assert_eq!(
            node_to_value(reparsed.get_path(&["mcpServers", "demo", "command"]).expect("path")),
            json!("node")
        );
    }

    #[test]
    fn remove_member_takes_comma_and_line() {
        let doc = ConfigDocument::parse(SAMPLE).expect("parse");
        let edits = doc
            .remove_path(&["mcpServers", "existing"])
            .expect("edits");
        let updated = apply(&doc, &edits);
        let reparsed = ConfigDocument::parse(&updated).expect("reparse");
        assert!(reparsed.get_path(&["mcpServers", "existing"]).is_none());
        assert_eq!(
            node_to_value(reparsed.get_path(&["theme"]).expect("theme")),
            json!("dark")
        );
    }

    #[test]
    fn remove_last_member_takes_preceding_comma() {
        let text = "{\n  \"a\": 1,\n  \"b\": 2\n}\n";
        let doc = ConfigDocument::parse(text).expect("parse");
        let edits = doc.remove_path(&["b"]).expect("edits");
        let updated = apply(&doc, &edits);
        assert_eq!(updated, "{\n  \"a\": 1\n}\n");
    }

    #[test]
    fn merge_then_remove_restores_original_text() {
        let doc = ConfigDocument::parse(SAMPLE).expect("parse");
        let edits = doc
            .set_path(&["mcpServers", "demo"], &json!({"command": "node"}))
            .expect("merge edits");
        let merged = apply(&doc, &edits);

        let merged_doc = ConfigDocument::parse(&merged).expect("reparse");
        let removal = merged_doc
            .remove_path(&["mcpServers", "demo"])
            .expect("remove edits");
        let restored = ConfigDocument::apply_edits(&merged, &removal);
        assert_eq!(restored, SAMPLE);
    }

    #[test]
    fn append_and_remove_array_items() {
        let text = "{\n  \"inputs\": [\n    {\n      \"id\": \"keep\"\n    }\n  ]\n}\n";
        let doc = ConfigDocument::parse(text).expect("parse");
        let edits = doc
            .append_array_items(&["inputs"], &[json!({"id": "demo-token"})])
            .expect("append");
        let appended = apply(&doc, &edits);

        let appended_doc = ConfigDocument::parse(&appended).expect("reparse");
        let removal = appended_doc
            .remove_array_items(&["inputs"], |item| {
                item.get("id").and_then(|id| id.as_str()) == Some("demo-token")
            })
            .expect("remove");
        let restored = ConfigDocument::apply_edits(&appended, &removal);
        assert_eq!(restored, text);
    }

    #[test]
    fn detects_tab_indentation() {
        let text = "{\n\t\"a\": {\n\t\t\"b\": 1\n\t}\n}\n";
        let doc = ConfigDocument::parse(text).expect("parse");
        assert_eq!(doc.indent_unit(), "\t");
        let edits = doc.set_path(&["a", "c"], &serde_json::json!(2)).expect("edits");
        let updated = apply(&doc, &edits);
        assert!(updated.contains("\n\t\t\"c\": 2"));
    }

    #[test]
    fn semantically_empty_detection() {
        let empty = ConfigDocument::parse("{\n  \"mcpServers\": {}\n}\n").expect("parse");
        assert!(empty.is_semantically_empty());
        let full =
            ConfigDocument::parse("{\n  \"mcpServers\": {\"a\": {}}\n}\n").expect("parse");
        assert!(!full.is_semantically_empty());
    }
}
