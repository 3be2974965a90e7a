use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TaskError;

/// Metadata field names shared by engines and views.
pub mod fields {
    pub const TITLE: &str = "title";
    pub const AUTHORS: &str = "authors";
    pub const ABSTRACT: &str = "abstract";
    pub const KEYWORDS: &str = "keywords";
    pub const SUBJECT: &str = "subject";
    pub const PAGES: &str = "pages";
}

/// Output of a successful extraction. Never modified after it is attached
/// to a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    /// Structured document in NLM-XML.
    pub xml_document: String,
    /// HTML rendering of the document.
    pub html_view: String,
    /// Field name to value, e.g. `title`, `authors`, `abstract`.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ExtractionResult {
    pub fn new(xml_document: impl Into<String>, html_view: impl Into<String>) -> Self {
        Self {
            xml_document: xml_document.into(),
            html_view: html_view.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(field.into(), value.into());
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.get(fields::TITLE).map(String::as_str)
    }

    /// Returns the payload for a download of the given type.
    pub fn payload(&self, result_type: ResultType) -> &str {
        match result_type {
            ResultType::Nlm => &self.xml_document,
            ResultType::Html => &self.html_view,
        }
    }
}

/// Downloadable representations of a finished task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Nlm,
    Html,
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultType::Nlm => write!(f, "nlm"),
            ResultType::Html => write!(f, "html"),
        }
    }
}

impl FromStr for ResultType {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nlm" => Ok(ResultType::Nlm),
            "html" => Ok(ResultType::Html),
            other => Err(TaskError::UnknownResultType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_builder_and_title() {
        let result = ExtractionResult::new("<article/>", "<html/>")
            .with_metadata(fields::TITLE, "Deep Things")
            .with_metadata(fields::AUTHORS, "A. Author");

        assert_eq!(result.title(), Some("Deep Things"));
        assert_eq!(result.metadata.len(), 2);
        assert_eq!(result.payload(ResultType::Nlm), "<article/>");
        assert_eq!(result.payload(ResultType::Html), "<html/>");
    }

    #[test]
    fn test_result_type_parsing() {
        assert_eq!("nlm".parse::<ResultType>().unwrap(), ResultType::Nlm);
        assert_eq!("html".parse::<ResultType>().unwrap(), ResultType::Html);

        match "pdf".parse::<ResultType>() {
            Err(TaskError::UnknownResultType(kind)) => assert_eq!(kind, "pdf"),
            other => panic!("Expected UnknownResultType, got {:?}", other),
        }
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = ExtractionResult::new("<nlm/>", "");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["xmlDocument"], "<nlm/>");
        assert!(json.get("htmlView").is_some());
    }
}
