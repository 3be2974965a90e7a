//! NLM-XML and HTML rendering of extracted document metadata.

use std::collections::BTreeMap;
use std::fmt::Display;

use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::ExtractionError;
use crate::task::fields;

/// Everything an engine learned about a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub keywords: Vec<String>,
    pub subject: Option<String>,
    pub page_count: usize,
    /// Body text, one entry per paragraph.
    pub paragraphs: Vec<String>,
}

impl DocumentMetadata {
    /// Flattens into the field map stored on an extraction result.
    pub fn to_field_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(title) = &self.title {
            map.insert(fields::TITLE.to_string(), title.clone());
        }
        if !self.authors.is_empty() {
            map.insert(fields::AUTHORS.to_string(), self.authors.join("; "));
        }
        if let Some(abstract_text) = &self.abstract_text {
            map.insert(fields::ABSTRACT.to_string(), abstract_text.clone());
        }
        if !self.keywords.is_empty() {
            map.insert(fields::KEYWORDS.to_string(), self.keywords.join(", "));
        }
        if let Some(subject) = &self.subject {
            map.insert(fields::SUBJECT.to_string(), subject.clone());
        }
        map.insert(fields::PAGES.to_string(), self.page_count.to_string());
        map
    }
}

fn xml_error(e: impl Display) -> ExtractionError {
    ExtractionError::XmlWriting(e.to_string())
}

/// Renders [`DocumentMetadata`] as an NLM `<article>`.
pub struct NlmWriter {
    writer: Writer<Vec<u8>>,
}

impl NlmWriter {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    pub fn render(meta: &DocumentMetadata) -> Result<String, ExtractionError> {
        let mut out = Self::new();
        out.write(meta)?;
        String::from_utf8(out.writer.into_inner()).map_err(xml_error)
    }

    fn write(&mut self, meta: &DocumentMetadata) -> Result<(), ExtractionError> {
        self.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.start_with("article", &[("xmlns:xlink", "http://www.w3.org/1999/xlink")])?;

        self.start("front")?;
        self.start("article-meta")?;

        if let Some(title) = &meta.title {
            self.start("title-group")?;
            self.text_element("article-title", title)?;
            self.end("title-group")?;
        }

        if !meta.authors.is_empty() {
            self.start("contrib-group")?;
            for author in &meta.authors {
                self.start_with("contrib", &[("contrib-type", "author")])?;
                self.text_element("string-name", author)?;
                self.end("contrib")?;
            }
            self.end("contrib-group")?;
        }

        if let Some(abstract_text) = &meta.abstract_text {
            self.start("abstract")?;
            self.text_element("p", abstract_text)?;
            self.end("abstract")?;
        }

        if !meta.keywords.is_empty() {
            self.start("kwd-group")?;
            for keyword in &meta.keywords {
                self.text_element("kwd", keyword)?;
            }
            self.end("kwd-group")?;
        }

        self.start("counts")?;
        let count = meta.page_count.to_string();
        self.event(Event::Empty(
            BytesStart::new("page-count").with_attributes([("count", count.as_str())]),
        ))?;
        self.end("counts")?;

        self.end("article-meta")?;
        self.end("front")?;

        self.start("body")?;
        if !meta.paragraphs.is_empty() {
            self.start("sec")?;
            for paragraph in &meta.paragraphs {
                self.text_element("p", paragraph)?;
            }
            self.end("sec")?;
        }
        self.end("body")?;

        self.end("article")
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), ExtractionError> {
        self.writer.write_event(event).map_err(xml_error)
    }

    fn start(&mut self, name: &str) -> Result<(), ExtractionError> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn start_with(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), ExtractionError> {
        self.event(Event::Start(
            BytesStart::new(name).with_attributes(attributes.iter().copied()),
        ))
    }

    fn end(&mut self, name: &str) -> Result<(), ExtractionError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<(), ExtractionError> {
        self.start(name)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    /// Human-readable HTML fragment for the presentation layer.
    pub fn render_html(meta: &DocumentMetadata) -> String {
        let mut html = String::from("<div class=\"document\">\n");

        if let Some(title) = &meta.title {
            html.push_str(&format!("  <h1>{}</h1>\n", escape(title.as_str())));
        }
        if !meta.authors.is_empty() {
            html.push_str(&format!(
                "  <p class=\"authors\">{}</p>\n",
                escape(meta.authors.join(", ").as_str())
            ));
        }
        if let Some(abstract_text) = &meta.abstract_text {
            html.push_str("  <h2>Abstract</h2>\n");
            html.push_str(&format!("  <p class=\"abstract\">{}</p>\n", escape(abstract_text.as_str())));
        }
        if !meta.keywords.is_empty() {
            html.push_str(&format!(
                "  <p class=\"keywords\">{}</p>\n",
                escape(meta.keywords.join(", ").as_str())
            ));
        }

        html.push_str("</div>\n");
        html
    }
}
