//! The manifest of a model or world directory.
//!
//! Two on-disk formats describe the same record: `metadata.pbtxt`, written in
//! protobuf text format, and the older `model.config` XML file. The pbtxt file
//! wins when both are present.

use crate::error::MetadataError;

use quick_xml::Reader;
use quick_xml::events::Event;
use std::fmt::Write;
use std::path::{Path, PathBuf};

pub const METADATA_PBTXT: &str = "metadata.pbtxt";
pub const MODEL_CONFIG: &str = "model.config";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Categories {
    pub first: String,
    pub second: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuelMetadata {
    pub name: String,
    pub description: String,
    pub version: Option<u32>,
    pub authors: Vec<Author>,
    pub license: Option<String>,
    pub tags: Vec<String>,
    pub categories: Option<Categories>,
    /// Free-form key/value pairs, in file order.
    pub annotations: Vec<(String, String)>,
    /// Fuel urls of the models this one needs.
    pub dependencies: Vec<String>,
    pub model_file: Option<String>,
    pub world_file: Option<String>,
}

impl FuelMetadata {
    /// Reads `metadata.pbtxt`, or `model.config` when there is no pbtxt file.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, MetadataError> {
        let dir = dir.as_ref();
        match Self::manifest_path(dir) {
            Some(path) if path.ends_with(METADATA_PBTXT) => {
                Self::from_pbtxt(&std::fs::read_to_string(path)?)
            }
            Some(path) => Self::from_model_config(&std::fs::read_to_string(path)?),
            None => Err(MetadataError::NotFound(dir.to_path_buf())),
        }
    }

    /// The manifest file of `dir`, if it has one.
    pub fn manifest_path(dir: &Path) -> Option<PathBuf> {
        [METADATA_PBTXT, MODEL_CONFIG]
            .into_iter()
            .map(|file| dir.join(file))
            .find(|path| path.is_file())
    }

    /// The main SDF file named by the manifest.
    pub fn main_file(&self) -> Option<&str> {
        self.model_file
            .as_deref()
            .or(self.world_file.as_deref())
            .filter(|file| !file.is_empty())
    }

    pub fn from_pbtxt(text: &str) -> Result<Self, MetadataError> {
        let fields = pbtxt::parse(text)?;
        let mut meta = Self::default();

        for (key, value) in &fields {
            match (key.as_str(), value) {
                ("name", pbtxt::Node::Scalar(v)) => meta.name = v.clone(),
                ("description", pbtxt::Node::Scalar(v)) => meta.description = v.clone(),
                ("version", pbtxt::Node::Scalar(v)) => meta.version = v.parse().ok(),
                ("tags", pbtxt::Node::Scalar(v)) => meta.tags.push(v.clone()),
                ("authors", pbtxt::Node::Message(m)) => meta.authors.push(Author {
                    name: pbtxt::scalar(m, "name"),
                    email: pbtxt::scalar(m, "email"),
                }),
                ("legal", pbtxt::Node::Message(m)) => {
                    let license = pbtxt::scalar(m, "license");
                    if !license.is_empty() {
                        meta.license = Some(license);
                    }
                }
                ("categories", pbtxt::Node::Message(m)) => {
                    meta.categories = Some(Categories {
                        first: pbtxt::scalar(m, "first"),
                        second: pbtxt::scalar(m, "second"),
                    })
                }
                ("annotations", pbtxt::Node::Message(m)) => meta
                    .annotations
                    .push((pbtxt::scalar(m, "key"), pbtxt::scalar(m, "value"))),
                ("dependencies", pbtxt::Node::Message(m)) => {
                    meta.dependencies.push(pbtxt::scalar(m, "uri"))
                }
                ("model", pbtxt::Node::Message(m)) => meta.model_file = Some(pbtxt::scalar(m, "file")),
                ("world", pbtxt::Node::Message(m)) => meta.world_file = Some(pbtxt::scalar(m, "file")),
                _ => {}
            }
        }

        Ok(meta)
    }

    pub fn to_pbtxt(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "name: {}", pbtxt::quote(&self.name));
        if !self.description.is_empty() {
            let _ = writeln!(out, "description: {}", pbtxt::quote(&self.description));
        }
        if let Some(version) = self.version {
            let _ = writeln!(out, "version: {version}");
        }
        if let Some(file) = &self.model_file {
            let _ = writeln!(out, "model {{\n  file: {}\n}}", pbtxt::quote(file));
        }
        if let Some(file) = &self.world_file {
            let _ = writeln!(out, "world {{\n  file: {}\n}}", pbtxt::quote(file));
        }
        for author in &self.authors {
            let _ = writeln!(
                out,
                "authors {{\n  name: {}\n  email: {}\n}}",
                pbtxt::quote(&author.name),
                pbtxt::quote(&author.email)
            );
        }
        if let Some(license) = &self.license {
            let _ = writeln!(out, "legal {{\n  license: {}\n}}", pbtxt::quote(license));
        }
        for tag in &self.tags {
            let _ = writeln!(out, "tags: {}", pbtxt::quote(tag));
        }
        if let Some(categories) = &self.categories {
            let _ = writeln!(
                out,
                "categories {{\n  first: {}\n  second: {}\n}}",
                pbtxt::quote(&categories.first),
                pbtxt::quote(&categories.second)
            );
        }
        for (key, value) in &self.annotations {
            let _ = writeln!(
                out,
                "annotations {{\n  key: {}\n  value: {}\n}}",
                pbtxt::quote(key),
                pbtxt::quote(value)
            );
        }
        for uri in &self.dependencies {
            let _ = writeln!(out, "dependencies {{\n  uri: {}\n}}", pbtxt::quote(uri));
        }
        out
    }

    /// Reads a `model.config` document.
    ///
    /// When several `<sdf>` elements are listed, the one with the highest
    /// `version` attribute is the model file.
    pub fn from_model_config(xml: &str) -> Result<Self, MetadataError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut meta = Self::default();
        let mut path: Vec<String> = Vec::new();
        let mut saw_model = false;
        let mut sdf_version = 0.0_f64;
        let mut best_sdf_version = f64::MIN;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    match (path.len(), name.as_str()) {
                        (0, "model") => saw_model = true,
                        (1, "author") => meta.authors.push(Author::default()),
                        (1, "sdf") => {
                            sdf_version = start
                                .try_get_attribute("version")
                                .map_err(quick_xml::Error::from)?
                                .and_then(|attr| String::from_utf8_lossy(&attr.value).parse().ok())
                                .unwrap_or(0.0);
                        }
                        _ => {}
                    }
                    path.push(name);
                }
                Event::End(_) => {
                    path.pop();
                }
                Event::Text(text) => {
                    let text = text.unescape()?.into_owned();
                    assign_config_text(&mut meta, &path, text, sdf_version, &mut best_sdf_version);
                }
                Event::CData(data) => {
                    let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    assign_config_text(&mut meta, &path, text, sdf_version, &mut best_sdf_version);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_model {
            return Err(MetadataError::MissingModelElement);
        }
        Ok(meta)
    }
}

fn assign_config_text(
    meta: &mut FuelMetadata,
    path: &[String],
    text: String,
    sdf_version: f64,
    best_sdf_version: &mut f64,
) {
    let path: Vec<&str> = path.iter().map(String::as_str).collect();
    match path.as_slice() {
        ["model", "name"] => meta.name = text,
        ["model", "description"] => meta.description = text,
        ["model", "version"] => meta.version = text.trim().parse().ok(),
        ["model", "sdf"] => {
            if sdf_version >= *best_sdf_version {
                *best_sdf_version = sdf_version;
                meta.model_file = Some(text);
            }
        }
        ["model", "author", "name"] => {
            if let Some(author) = meta.authors.last_mut() {
                author.name = text;
            }
        }
        ["model", "author", "email"] => {
            if let Some(author) = meta.authors.last_mut() {
                author.email = text;
            }
        }
        ["model", "depend", "model", "uri"] => meta.dependencies.push(text),
        _ => {}
    }
}

/// A small reader for the subset of protobuf text format manifests use.
mod pbtxt {
    use crate::error::MetadataError;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Node {
        Scalar(String),
        Message(Vec<(String, Node)>),
    }

    /// First scalar named `key` in `fields`, or an empty string.
    pub fn scalar(fields: &[(String, Node)], key: &str) -> String {
        fields
            .iter()
            .find_map(|(k, v)| match v {
                Node::Scalar(s) if k == key => Some(s.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn quote(value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('"');
        for c in value.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                c => out.push(c),
            }
        }
        out.push('"');
        out
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Token {
        Ident(String),
        Str(String),
        Colon,
        Comma,
        Open(char),
        Close(char),
    }

    struct Lexer<'a> {
        chars: std::iter::Peekable<std::str::Chars<'a>>,
        line: usize,
    }

    impl Lexer<'_> {
        fn error(&self, message: impl Into<String>) -> MetadataError {
            MetadataError::Pbtxt {
                line: self.line,
                message: message.into(),
            }
        }

        fn next_token(&mut self) -> Result<Option<(Token, usize)>, MetadataError> {
            loop {
                match self.chars.peek().copied() {
                    None => return Ok(None),
                    Some('\n') => {
                        self.line += 1;
                        self.chars.next();
                    }
                    Some(c) if c.is_whitespace() => {
                        self.chars.next();
                    }
                    Some('#') => {
                        while self.chars.next_if(|c| *c != '\n').is_some() {}
                    }
                    Some(_) => break,
                }
            }

            let line = self.line;
            let Some(c) = self.chars.next() else {
                return Ok(None);
            };
            let token = match c {
                ':' => Token::Colon,
                ',' | ';' => Token::Comma,
                '{' | '<' | '[' => Token::Open(c),
                '}' | '>' | ']' => Token::Close(c),
                '"' | '\'' => Token::Str(self.string(c)?),
                c if c.is_alphanumeric() || matches!(c, '_' | '-' | '+' | '.') => {
                    let mut word = String::from(c);
                    while let Some(c) = self
                        .chars
                        .next_if(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '+' | '.'))
                    {
                        word.push(c);
                    }
                    Token::Ident(word)
                }
                other => return Err(self.error(format!("unexpected character '{other}'"))),
            };
            Ok(Some((token, line)))
        }

        fn string(&mut self, quote: char) -> Result<String, MetadataError> {
            let mut out = String::new();
            loop {
                match self.chars.next() {
                    None | Some('\n') => return Err(self.error("unterminated string")),
                    Some(c) if c == quote => return Ok(out),
                    Some('\\') => match self.chars.next() {
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        Some('r') => out.push('\r'),
                        Some(c) => out.push(c),
                        None => return Err(self.error("unterminated string")),
                    },
                    Some(c) => out.push(c),
                }
            }
        }
    }

    /// Deepest nesting of messages and lists accepted.
    const MAX_NESTING: usize = 64;

    struct Parser {
        tokens: Vec<(Token, usize)>,
        pos: usize,
        depth: usize,
    }

    impl Parser {
        fn line(&self) -> usize {
            self.tokens
                .get(self.pos)
                .or(self.tokens.last())
                .map(|(_, line)| *line)
                .unwrap_or(1)
        }

        fn error(&self, message: impl Into<String>) -> MetadataError {
            MetadataError::Pbtxt {
                line: self.line(),
                message: message.into(),
            }
        }

        fn peek(&self) -> Option<&Token> {
            self.tokens.get(self.pos).map(|(token, _)| token)
        }

        fn bump(&mut self) -> Option<Token> {
            let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
            self.pos += 1;
            token
        }

        fn message(&mut self, close: Option<char>) -> Result<Vec<(String, Node)>, MetadataError> {
            if self.depth == MAX_NESTING {
                return Err(self.error("nesting too deep"));
            }
            self.depth += 1;
            let fields = self.body(close);
            self.depth -= 1;
            fields
        }

        fn body(&mut self, close: Option<char>) -> Result<Vec<(String, Node)>, MetadataError> {
            let mut fields = Vec::new();
            loop {
                match self.bump() {
                    None if close.is_none() => return Ok(fields),
                    None => return Err(self.error("unexpected end of input")),
                    Some(Token::Close(c)) if Some(c) == close => return Ok(fields),
                    Some(Token::Comma) => continue,
                    Some(Token::Ident(key)) => self.field(key, &mut fields)?,
                    Some(other) => return Err(self.error(format!("unexpected {other:?}"))),
                }
            }
        }

        fn field(&mut self, key: String, fields: &mut Vec<(String, Node)>) -> Result<(), MetadataError> {
            if self.peek() == Some(&Token::Colon) {
                self.pos += 1;
            }
            match self.bump() {
                Some(Token::Open('[')) => loop {
                    match self.bump() {
                        Some(Token::Close(']')) => return Ok(()),
                        Some(Token::Comma) => {}
                        Some(Token::Open(c @ ('{' | '<'))) => {
                            let message = self.message(Some(closing(c)))?;
                            fields.push((key.clone(), Node::Message(message)));
                        }
                        Some(token) => {
                            let value = self.scalar(token)?;
                            fields.push((key.clone(), Node::Scalar(value)));
                        }
                        None => return Err(self.error("unterminated list")),
                    }
                },
                Some(Token::Open(c)) => {
                    let message = self.message(Some(closing(c)))?;
                    fields.push((key, Node::Message(message)));
                    Ok(())
                }
                Some(token) => {
                    let value = self.scalar(token)?;
                    fields.push((key, Node::Scalar(value)));
                    Ok(())
                }
                None => Err(self.error(format!("missing value for '{key}'"))),
            }
        }

        /// Adjacent string literals are concatenated.
        fn scalar(&mut self, token: Token) -> Result<String, MetadataError> {
            match token {
                Token::Ident(word) => Ok(word),
                Token::Str(mut value) => {
                    while let Some(Token::Str(next)) = self.peek() {
                        value.push_str(next);
                        self.pos += 1;
                    }
                    Ok(value)
                }
                other => Err(self.error(format!("expected a value, found {other:?}"))),
            }
        }
    }

    fn closing(open: char) -> char {
        match open {
            '<' => '>',
            '[' => ']',
            _ => '}',
        }
    }

    pub fn parse(text: &str) -> Result<Vec<(String, Node)>, MetadataError> {
        let mut lexer = Lexer {
            chars: text.chars().peekable(),
            line: 1,
        };
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next_token()? {
            tokens.push(token);
        }
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
        .message(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PBTXT: &str = r#"
# A test model
name: "Box"
description: "A box " "with two parts"
version: 2
authors {
  name: "Alice"
  email: "alice@example.org"
}
legal {
  license: "Creative Commons - Attribution"
}
tags: "red"
tags: ["cube", "simple"]
categories {
  first: "Furniture"
  second: "Kitchen"
}
annotations { key: "color" value: "red" }
annotations: { key: "mass", value: "1" }
dependencies {
  uri: "https://fuel.example.org/1.0/alice/models/Wheel"
}
model {
  file: "model.sdf"
  file_format { name: "sdformat" version { major: 1 minor: 8 } }
}
"#;

    #[test]
    fn parses_pbtxt_fields() {
        let meta = FuelMetadata::from_pbtxt(PBTXT).unwrap();
        assert_eq!(meta.name, "Box");
        assert_eq!(meta.description, "A box with two parts");
        assert_eq!(meta.version, Some(2));
        assert_eq!(meta.authors.len(), 1);
        assert_eq!(meta.authors[0].email, "alice@example.org");
        assert_eq!(meta.license.as_deref(), Some("Creative Commons - Attribution"));
        assert_eq!(meta.tags, vec!["red", "cube", "simple"]);
        assert_eq!(
            meta.categories,
            Some(Categories {
                first: "Furniture".into(),
                second: "Kitchen".into()
            })
        );
        assert_eq!(
            meta.annotations,
            vec![
                ("color".to_string(), "red".to_string()),
                ("mass".to_string(), "1".to_string())
            ]
        );
        assert_eq!(
            meta.dependencies,
            vec!["https://fuel.example.org/1.0/alice/models/Wheel"]
        );
        assert_eq!(meta.main_file(), Some("model.sdf"));
    }

    #[test]
    fn pbtxt_written_back_reads_the_same() {
        let meta = FuelMetadata::from_pbtxt(PBTXT).unwrap();
        let again = FuelMetadata::from_pbtxt(&meta.to_pbtxt()).unwrap();
        assert_eq!(meta, again);
    }

    #[test]
    fn pbtxt_errors_report_the_line() {
        let err = FuelMetadata::from_pbtxt("name: \"Box\"\nlegal {\n  license: \"x\"\n").unwrap_err();
        assert!(matches!(err, MetadataError::Pbtxt { .. }), "{err}");

        let err = FuelMetadata::from_pbtxt("name: \"Box\n").unwrap_err();
        assert!(matches!(err, MetadataError::Pbtxt { line: 1, .. }), "{err}");
    }

    #[test]
    fn deeply_nested_pbtxt_is_rejected() {
        let err = FuelMetadata::from_pbtxt(&"a {".repeat(200_000)).unwrap_err();
        match err {
            MetadataError::Pbtxt { message, .. } => assert_eq!(message, "nesting too deep"),
            other => panic!("unexpected error: {other}"),
        }

        let shallow = format!("{}{}", "a {".repeat(10), "}".repeat(10));
        assert!(FuelMetadata::from_pbtxt(&shallow).is_ok());
    }

    #[test]
    fn parses_model_config() {
        let xml = r#"<?xml version="1.0"?>
<model>
  <name>Wheel</name>
  <version>1.0</version>
  <sdf version="1.5">model-1_5.sdf</sdf>
  <sdf version="1.6">model.sdf</sdf>
  <author>
    <name>Bob</name>
    <email>bob@example.org</email>
  </author>
  <description>A &amp; B</description>
  <depend>
    <model><uri>https://fuel.example.org/1.0/bob/models/Hub</uri></model>
  </depend>
</model>"#;
        let meta = FuelMetadata::from_model_config(xml).unwrap();
        assert_eq!(meta.name, "Wheel");
        assert_eq!(meta.description, "A & B");
        assert_eq!(meta.model_file.as_deref(), Some("model.sdf"));
        assert_eq!(meta.authors[0].name, "Bob");
        assert_eq!(meta.dependencies, vec!["https://fuel.example.org/1.0/bob/models/Hub"]);
    }

    #[test]
    fn model_config_needs_a_model_element() {
        let err = FuelMetadata::from_model_config("<world><name>x</name></world>").unwrap_err();
        assert!(matches!(err, MetadataError::MissingModelElement));
    }

    #[test]
    fn load_prefers_pbtxt() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(MODEL_CONFIG),
            "<model><name>from-config</name></model>",
        )
        .unwrap();
        assert_eq!(
            FuelMetadata::load_from_dir(dir.path()).unwrap().name,
            "from-config"
        );

        std::fs::write(dir.path().join(METADATA_PBTXT), "name: \"from-pbtxt\"").unwrap();
        assert_eq!(
            FuelMetadata::load_from_dir(dir.path()).unwrap().name,
            "from-pbtxt"
        );
    }

    #[test]
    fn load_without_manifest_fails() {
        let dir = TempDir::new().unwrap();
        let err = FuelMetadata::load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    }
}
