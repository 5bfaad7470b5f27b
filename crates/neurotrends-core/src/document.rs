use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Node};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Error, Result};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Unterminated tag at byte {0}")]
    UnterminatedTag(usize),
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Html,
    Pdf,
}

impl DocumentType {
    pub const ALL: [Self; 2] = [Self::Html, Self::Pdf];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "html" => Ok(Self::Html),
            "pdf" => Ok(Self::Pdf),
            _ => Err(Error::UnknownDocumentType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentLoad {
    /// Never fetched, or not available for this article.
    Missing,
    /// Fetched but unreadable.
    Malformed(String),
    Parsed(String),
}

impl DocumentLoad {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Parsed(text) => Some(text),
            Self::Missing | Self::Malformed(_) => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Parsed(text) => Some(text),
            Self::Missing | Self::Malformed(_) => None,
        }
    }
}

impl From<ParseResult<String>> for DocumentLoad {
    fn from(result: ParseResult<String>) -> Self {
        match result {
            Ok(text) => Self::Parsed(text),
            Err(e) => Self::Malformed(e.to_string()),
        }
    }
}

#[async_trait::async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, article_id: &str, doc_type: DocumentType) -> Result<DocumentLoad>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentLoader {
    documents: HashMap<(String, DocumentType), DocumentLoad>,
}

impl MemoryDocumentLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_text(
        mut self,
        article_id: impl Into<String>,
        doc_type: DocumentType,
        text: impl Into<String>,
    ) -> Self {
        self.insert(article_id, doc_type, DocumentLoad::Parsed(text.into()));
        self
    }

    pub fn insert(&mut self, article_id: impl Into<String>, doc_type: DocumentType, load: DocumentLoad) {
        self.documents.insert((article_id.into(), doc_type), load);
    }
}

#[async_trait::async_trait]
impl DocumentLoader for MemoryDocumentLoader {
    async fn load(&self, article_id: &str, doc_type: DocumentType) -> Result<DocumentLoad> {
        Ok(self
            .documents
            .get(&(article_id.to_string(), doc_type))
            .cloned()
            .unwrap_or(DocumentLoad::Missing))
    }
}

/// Loader over a directory of scraped files:
/// `<root>/html/<id>.html` and `<root>/pdf/<id>.txt`.
#[derive(Debug, Clone)]
pub struct DirectoryDocumentLoader {
    root: PathBuf,
}

impl DirectoryDocumentLoader {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, article_id: &str, doc_type: DocumentType) -> PathBuf {
        match doc_type {
            DocumentType::Html => self.root.join("html").join(format!("{article_id}.html")),
            DocumentType::Pdf => self.root.join("pdf").join(format!("{article_id}.txt")),
        }
    }

    async fn read(path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl DocumentLoader for DirectoryDocumentLoader {
    async fn load(&self, article_id: &str, doc_type: DocumentType) -> Result<DocumentLoad> {
        let path = self.path_for(article_id, doc_type);
        let Some(data) = Self::read(&path).await? else {
            return Ok(DocumentLoad::Missing);
        };

        let text = decode(&data);
        let load = match doc_type {
            DocumentType::Html => text.and_then(|raw| html_to_text(&raw)),
            DocumentType::Pdf => text.map(|raw| join_pdf_lines(&raw)),
        };
        Ok(load.into())
    }
}

fn decode(data: &[u8]) -> ParseResult<String> {
    String::from_utf8(data.to_vec()).map_err(|e| ParseError::Encoding(e.to_string()))
}

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(?:script|style)\b[^>]*>.*?</(?:script|style)\s*>").unwrap());
static CELL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<td([^>]*)>(.*?)</td>").unwrap());
static UNTERMINATED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[A-Za-z/!][^>]*$").unwrap());

/// Plain text content of an HTML page, with character references decoded.
///
/// Table cells are padded with spaces so adjacent cell values do not run
/// together once the markup is gone.
pub fn html_to_text(html: &str) -> ParseResult<String> {
    let html = COMMENT_RE.replace_all(html, "");
    let html = SCRIPT_RE.replace_all(&html, "");

    if let Some(m) = UNTERMINATED_RE.find(&html) {
        return Err(ParseError::UnterminatedTag(m.start()));
    }

    let html = CELL_RE.replace_all(&html, "<td${1}> ${2} </td>");
    let document = Html::parse_document(&html);

    let mut text = String::with_capacity(html.len());
    for node in document.root_element().descendants() {
        let Node::Text(chunk) = node.value() else {
            continue;
        };
        let in_script = node.ancestors().any(|parent| {
            parent
                .value()
                .as_element()
                .is_some_and(|el| matches!(el.name(), "script" | "style"))
        });
        if !in_script {
            text.push_str(chunk);
        }
    }
    Ok(text)
}

/// Joins extracted PDF lines; a trailing hyphen continues the word on the
/// next line.
pub fn join_pdf_lines(text: &str) -> String {
    let mut joined = String::with_capacity(text.len());
    for line in text.lines() {
        match line.strip_suffix('-') {
            Some(head) => joined.push_str(head),
            None => {
                joined.push_str(line);
                joined.push(' ');
            }
        }
    }
    joined
}
