//! BibTeX bibliography model.
//!
//! A [`Bibliography`] is an ordered list of [`Block`]s: entries, which are
//! parsed into fields, and `@string` / `@preamble` / `@comment` blocks, which
//! are carried through verbatim. Text outside of blocks is not preserved.
//!
//! Rendering is canonical (two-space indent, brace-delimited values, one blank
//! line between blocks) so that rewriting an unchanged bibliography is stable.

use thiserror::Error;

use crate::identifiers::CitationKey;

/// Errors produced while reading, parsing, or writing a bibliography.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BibliographyError {
    /// A block was opened but never closed.
    #[error("line {line}: unterminated @{kind} block")]
    Unterminated {
        /// 1-based line of the `@` that opened the block.
        line: usize,
        /// Block kind as written (e.g. `article`, `string`).
        kind: String,
    },

    /// An entry has no citation key, or the key contains invalid characters.
    #[error("line {line}: entry has no valid citation key")]
    MissingKey {
        /// 1-based line of the entry.
        line: usize,
    },

    /// The input does not follow BibTeX syntax at this point.
    #[error("line {line}: expected {expected}")]
    Syntax {
        /// 1-based line of the offending character.
        line: usize,
        /// What the parser was looking for.
        expected: String,
    },

    /// The bibliography file could not be read or written.
    #[error("{path}: {message}")]
    Io {
        /// Path of the bibliography file.
        path: String,
        /// Underlying I/O error text.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// The value of one entry field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A single delimited value (`{...}` or `"..."`) or a bare number. Holds
    /// the text between the delimiters.
    Text(String),
    /// Macro references and `#` concatenations, kept exactly as written.
    Raw(String),
}

impl FieldValue {
    /// Builds a text value from arbitrary input, dropping all braces when they
    /// are unbalanced so the rendered value stays well-formed.
    pub fn from_text(value: impl Into<String>) -> Self {
        let value = value.into();
        if braces_balanced(&value) {
            FieldValue::Text(value)
        } else {
            FieldValue::Text(value.chars().filter(|c| !matches!(c, '{' | '}')).collect())
        }
    }

    /// The textual content, without delimiters for [`FieldValue::Text`].
    pub fn as_str(&self) -> &str {
        match self {
            FieldValue::Text(s) | FieldValue::Raw(s) => s,
        }
    }

    fn render_into(&self, out: &mut String) {
        match self {
            FieldValue::Text(s) => {
                out.push('{');
                out.push_str(s);
                out.push('}');
            }
            FieldValue::Raw(s) => out.push_str(s),
        }
    }
}

fn braces_balanced(value: &str) -> bool {
    let mut depth: i64 = 0;
    for c in value.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// A named field of an [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Lower-cased field name.
    pub name: String,
    /// Field value.
    pub value: FieldValue,
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One `@type{key, ...}` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    entry_type: String,
    key: CitationKey,
    fields: Vec<Field>,
}

impl Entry {
    /// Creates an entry with no fields. The type is lower-cased.
    pub fn new(entry_type: impl Into<String>, key: CitationKey) -> Self {
        Self {
            entry_type: entry_type.into().to_ascii_lowercase(),
            key,
            fields: Vec::new(),
        }
    }

    /// Builder form of [`Entry::set`].
    #[must_use]
    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.set(name, value);
        self
    }

    /// Lower-cased entry type (`article`, `misc`, ...).
    pub fn entry_type(&self) -> &str {
        &self.entry_type
    }

    /// Changes the entry type.
    pub fn set_entry_type(&mut self, entry_type: impl Into<String>) {
        self.entry_type = entry_type.into().to_ascii_lowercase();
    }

    /// Citation key.
    pub fn key(&self) -> &CitationKey {
        &self.key
    }

    /// Fields in source order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up a field by (case-insensitive) name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| &f.value)
    }

    /// Sets a field, replacing an existing value in place or appending.
    pub fn set(&mut self, name: &str, value: FieldValue) {
        let name = name.to_ascii_lowercase();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value,
            None => self.fields.push(Field { name, value }),
        }
    }

    /// Returns `true` if both entries carry the same type and field set,
    /// ignoring field order and key spelling.
    pub fn same_content(&self, other: &Entry) -> bool {
        self.entry_type == other.entry_type
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|f| other.get(&f.name) == Some(&f.value))
    }

    fn render_into(&self, out: &mut String) {
        out.push('@');
        out.push_str(&self.entry_type);
        out.push('{');
        out.push_str(self.key.as_str());
        out.push_str(",\n");
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push_str(",\n");
            }
            out.push_str("  ");
            out.push_str(&field.name);
            out.push_str(" = ");
            field.value.render_into(out);
        }
        if !self.fields.is_empty() {
            out.push('\n');
        }
        out.push('}');
    }
}

// ---------------------------------------------------------------------------
// Bibliography
// ---------------------------------------------------------------------------

/// A top-level bibliography block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// A parsed entry.
    Entry(Entry),
    /// An `@string`, `@preamble`, or `@comment` block, verbatim.
    Verbatim(String),
}

/// An ordered BibTeX database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bibliography {
    blocks: Vec<Block>,
}

impl Bibliography {
    /// Creates an empty bibliography.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses BibTeX source.
    pub fn parse(source: &str) -> Result<Self, BibliographyError> {
        Parser::new(source).parse()
    }

    /// Renders the bibliography in canonical form. An empty bibliography
    /// renders as the empty string.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            match block {
                Block::Entry(entry) => entry.render_into(&mut out),
                Block::Verbatim(text) => out.push_str(text),
            }
            out.push('\n');
        }
        out
    }

    /// All blocks in order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Entries in order, skipping verbatim blocks.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Entry(e) => Some(e),
            Block::Verbatim(_) => None,
        })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries().count()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First entry with the given key.
    pub fn find(&self, key: &CitationKey) -> Option<&Entry> {
        self.entries().find(|e| e.key() == key)
    }

    /// Appends an entry.
    pub fn push(&mut self, entry: Entry) {
        self.blocks.push(Block::Entry(entry));
    }

    /// Replaces the first entry with the same key, keeping its position.
    /// Returns the previous entry, or `None` (and does nothing) if absent.
    pub fn replace(&mut self, entry: Entry) -> Option<Entry> {
        let slot = self.blocks.iter_mut().find_map(|b| match b {
            Block::Entry(e) if e.key() == entry.key() => Some(e),
            _ => None,
        })?;
        Some(std::mem::replace(slot, entry))
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Byte-oriented BibTeX scanner. All syntax characters are ASCII, so every
/// slice boundary it produces falls on a UTF-8 character boundary.
struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, bytes: src.as_bytes(), pos: 0 }
    }

    fn parse(mut self) -> Result<Bibliography, BibliographyError> {
        let mut bib = Bibliography::new();
        while let Some(offset) = self.src[self.pos..].find('@') {
            let start = self.pos + offset;
            self.pos = start + 1;
            let kind = self.identifier();
            if kind.is_empty() {
                continue;
            }
            self.skip_ws();
            let close = match self.peek() {
                Some(b'{') => b'}',
                Some(b'(') => b')',
                // Stray `@` in free text (e.g. an email address).
                _ => continue,
            };
            self.pos += 1;

            let kind_lower = kind.to_ascii_lowercase();
            if matches!(kind_lower.as_str(), "comment" | "string" | "preamble") {
                self.skip_balanced(close, start, kind)?;
                bib.blocks.push(Block::Verbatim(self.src[start..self.pos].to_string()));
            } else {
                let entry = self.entry(kind_lower, close, start, kind)?;
                bib.push(entry);
            }
        }
        Ok(bib)
    }

    fn entry(
        &mut self,
        entry_type: String,
        close: u8,
        start: usize,
        kind: &str,
    ) -> Result<Entry, BibliographyError> {
        self.skip_ws();
        let key_start = self.pos;
        while let Some(b) = self.peek() {
            if b == b',' || b == close {
                break;
            }
            self.pos += 1;
        }
        if self.peek().is_none() {
            return Err(self.unterminated(start, kind));
        }
        let key = CitationKey::new(self.src[key_start..self.pos].trim())
            .ok_or(BibliographyError::MissingKey { line: self.line_at(start) })?;
        let mut entry = Entry::new(entry_type, key);

        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(self.unterminated(start, kind)),
                Some(b) if b == close => {
                    self.pos += 1;
                    return Ok(entry);
                }
                Some(b',') => {
                    self.pos += 1;
                    continue;
                }
                Some(_) => {}
            }

            let name = self.identifier();
            if name.is_empty() {
                return Err(self.syntax("field name"));
            }
            let name = name.to_ascii_lowercase();
            self.skip_ws();
            if self.peek() != Some(b'=') {
                return Err(self.syntax("'=' after field name"));
            }
            self.pos += 1;
            self.skip_ws();
            let value = self.value(close, start, kind)?;
            entry.fields.push(Field { name, value });
        }
    }

    /// Parses `piece (# piece)*` where a piece is braced, quoted, a number,
    /// or a macro name.
    fn value(
        &mut self,
        close: u8,
        start: usize,
        kind: &str,
    ) -> Result<FieldValue, BibliographyError> {
        let value_start = self.pos;
        let mut pieces = 0;
        let mut single_text = None;
        loop {
            self.skip_ws();
            let piece = match self.peek() {
                Some(b'{') => {
                    let open = self.pos;
                    self.pos += 1;
                    self.skip_balanced(b'}', start, kind)?;
                    Some(self.src[open + 1..self.pos - 1].to_string())
                }
                Some(b'"') => {
                    let open = self.pos;
                    self.pos += 1;
                    self.skip_quoted(start, kind)?;
                    Some(self.src[open + 1..self.pos - 1].to_string())
                }
                Some(b) if b.is_ascii_digit() => {
                    let open = self.pos;
                    while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                        self.pos += 1;
                    }
                    Some(self.src[open..self.pos].to_string())
                }
                Some(_) => {
                    if self.identifier().is_empty() {
                        return Err(self.syntax("field value"));
                    }
                    None
                }
                None => return Err(self.unterminated(start, kind)),
            };
            pieces += 1;
            single_text = piece;
            let value_end = self.pos;

            self.skip_ws();
            match self.peek() {
                Some(b'#') => self.pos += 1,
                Some(b) if b == b',' || b == close => {
                    return Ok(match (pieces, single_text) {
                        (1, Some(text)) => FieldValue::Text(text),
                        _ => FieldValue::Raw(self.src[value_start..value_end].trim().to_string()),
                    });
                }
                None => return Err(self.unterminated(start, kind)),
                Some(_) => return Err(self.syntax("',' or end of entry after field value")),
            }
        }
    }

    /// Advances past the matching `close`, honouring nested braces. Expects
    /// the opening delimiter to have been consumed already.
    fn skip_balanced(
        &mut self,
        close: u8,
        start: usize,
        kind: &str,
    ) -> Result<(), BibliographyError> {
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'{' => depth += 1,
                b'}' if depth > 0 => depth -= 1,
                _ if b == close && depth == 0 => return Ok(()),
                _ => {}
            }
        }
        Err(self.unterminated(start, kind))
    }

    /// Advances past the closing `"`. Braces inside must balance, since the
    /// value is rendered brace-delimited.
    fn skip_quoted(&mut self, start: usize, kind: &str) -> Result<(), BibliographyError> {
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            match b {
                b'{' => depth += 1,
                b'}' if depth == 0 => return Err(self.syntax("balanced braces in quoted value")),
                b'}' => depth -= 1,
                b'"' if depth == 0 => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(self.unterminated(start, kind))
    }

    fn identifier(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(is_identifier_byte) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn line_at(&self, pos: usize) -> usize {
        let end = pos.min(self.bytes.len());
        self.bytes[..end].iter().filter(|&&b| b == b'\n').count() + 1
    }

    fn unterminated(&self, start: usize, kind: &str) -> BibliographyError {
        BibliographyError::Unterminated { line: self.line_at(start), kind: kind.to_string() }
    }

    fn syntax(&self, expected: &str) -> BibliographyError {
        BibliographyError::Syntax { line: self.line_at(self.pos), expected: expected.to_string() }
    }
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':' | b'.' | b'+')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> CitationKey {
        CitationKey::new(k).unwrap()
    }

    #[test]
    fn parses_entries_with_mixed_value_forms() {
        let src = r#"
Some leading notes that are not part of any block.

@Article{Smith2020,
  Title = {A {Study} of Things},
  author = "Smith, Jane and Doe, John",
  year = 2020,
  month = jan,
  journal = "Journal of " # jname,
}
"#;
        let bib = Bibliography::parse(src).unwrap();
        assert_eq!(bib.len(), 1);
        let entry = bib.find(&key("smith2020")).unwrap();
        assert_eq!(entry.entry_type(), "article");
        assert_eq!(entry.key().as_str(), "Smith2020");
        assert_eq!(entry.get("title"), Some(&FieldValue::Text("A {Study} of Things".into())));
        assert_eq!(entry.get("AUTHOR").map(FieldValue::as_str), Some("Smith, Jane and Doe, John"));
        assert_eq!(entry.get("year"), Some(&FieldValue::Text("2020".into())));
        assert_eq!(entry.get("month"), Some(&FieldValue::Raw("jan".into())));
        assert_eq!(entry.get("journal"), Some(&FieldValue::Raw(r#""Journal of " # jname"#.into())));
    }

    #[test]
    fn keeps_string_and_comment_blocks_verbatim() {
        let src = "@string{jname = {Nature}}\n\n@comment{ignore {this} }\n\n@misc(k1, title = {T})";
        let bib = Bibliography::parse(src).unwrap();
        assert_eq!(bib.blocks().len(), 3);
        assert_eq!(bib.blocks()[0], Block::Verbatim("@string{jname = {Nature}}".into()));
        assert_eq!(bib.blocks()[1], Block::Verbatim("@comment{ignore {this} }".into()));
        assert_eq!(bib.len(), 1);
    }

    #[test]
    fn stray_at_signs_in_free_text_are_ignored() {
        let bib = Bibliography::parse("contact me@example.org\n@misc{k, note = {x}}").unwrap();
        assert_eq!(bib.len(), 1);
    }

    #[test]
    fn entries_without_fields_parse() {
        let bib = Bibliography::parse("@misc{lonely}").unwrap();
        assert!(bib.find(&key("lonely")).unwrap().fields().is_empty());
        assert_eq!(bib.render(), "@misc{lonely,\n}\n");
    }

    #[test]
    fn reports_unterminated_entries_with_line() {
        let err = Bibliography::parse("\n\n@article{a,\n title = {open").unwrap_err();
        assert_eq!(err, BibliographyError::Unterminated { line: 3, kind: "article".into() });
    }

    #[test]
    fn reports_missing_key() {
        let err = Bibliography::parse("@article{, title = {x}}").unwrap_err();
        assert_eq!(err, BibliographyError::MissingKey { line: 1 });
    }

    #[test]
    fn reports_missing_equals() {
        let err = Bibliography::parse("@article{a,\n title {x}}").unwrap_err();
        assert!(matches!(err, BibliographyError::Syntax { line: 2, .. }));
    }

    #[test]
    fn renders_canonical_form() {
        let mut bib = Bibliography::new();
        bib.push(
            Entry::new("Article", key("a"))
                .with_field("title", FieldValue::Text("First".into()))
                .with_field("month", FieldValue::Raw("jan".into())),
        );
        bib.push(Entry::new("misc", key("b")).with_field("note", FieldValue::Text("x".into())));
        assert_eq!(
            bib.render(),
            "@article{a,\n  title = {First},\n  month = jan\n}\n\n@misc{b,\n  note = {x}\n}\n"
        );
    }

    #[test]
    fn rendering_is_stable_after_reparse() {
        let src = "@string{j = {J}}\n@book{k, title=\"T\", publisher = j # { Press}}";
        let once = Bibliography::parse(src).unwrap().render();
        let twice = Bibliography::parse(&once).unwrap().render();
        assert_eq!(once, twice);
    }

    #[test]
    fn quoted_values_with_nested_braces_survive_a_rewrite() {
        let src = "@misc{k, title = \"The {RNA} world\", note = \"x {\\\"o} y\"}";
        let once = Bibliography::parse(src).unwrap().render();
        assert_eq!(once, "@misc{k,\n  title = {The {RNA} world},\n  note = {x {\\\"o} y}\n}\n");
        let twice = Bibliography::parse(&once).unwrap().render();
        assert_eq!(once, twice);
    }

    #[test]
    fn stray_closing_brace_in_quoted_value_is_rejected() {
        let err = Bibliography::parse("@misc{k,\n  title = \"a } b\"}").unwrap_err();
        assert_eq!(
            err,
            BibliographyError::Syntax {
                line: 2,
                expected: "balanced braces in quoted value".into()
            }
        );
    }

    #[test]
    fn replace_keeps_position() {
        let mut bib = Bibliography::new();
        bib.push(Entry::new("misc", key("a")));
        bib.push(Entry::new("misc", key("b")));
        let old = bib.replace(Entry::new("book", key("A")));
        assert_eq!(old.map(|e| e.entry_type().to_string()), Some("misc".into()));
        assert_eq!(bib.entries().next().unwrap().entry_type(), "book");
        assert!(bib.replace(Entry::new("misc", key("zzz"))).is_none());
    }

    #[test]
    fn same_content_ignores_field_order() {
        let a = Entry::new("misc", key("k"))
            .with_field("a", FieldValue::Text("1".into()))
            .with_field("b", FieldValue::Text("2".into()));
        let b = Entry::new("misc", key("K"))
            .with_field("b", FieldValue::Text("2".into()))
            .with_field("a", FieldValue::Text("1".into()));
        assert!(a.same_content(&b));
        let c = b.clone().with_field("a", FieldValue::Text("3".into()));
        assert!(!a.same_content(&c));
    }

    #[test]
    fn unbalanced_braces_are_dropped_from_text() {
        assert_eq!(FieldValue::from_text("a {b} c"), FieldValue::Text("a {b} c".into()));
        assert_eq!(FieldValue::from_text("a {b c"), FieldValue::Text("a b c".into()));
        assert_eq!(FieldValue::from_text("}a{"), FieldValue::Text("a".into()));
    }
}
