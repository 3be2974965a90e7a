//! Builders for test documents and configurations.

#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, Stream};

use nlmex::{RetentionPolicy, ServiceConfig};

/// Config with `workers` threads and no timeout.
pub fn config_with_workers(workers: usize) -> ServiceConfig {
    ServiceConfig {
        worker_count: workers,
        ..ServiceConfig::default()
    }
}

pub fn config_keep_finished(workers: usize, max_finished: usize) -> ServiceConfig {
    ServiceConfig {
        worker_count: workers,
        retention: RetentionPolicy::KeepFinished { max_finished },
        ..ServiceConfig::default()
    }
}

/// Single page PDF with the given info entries and page text.
pub struct PdfBuilder {
    info: Vec<(&'static str, String)>,
    text: String,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            info: Vec::new(),
            text: "Hello".to_string(),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.info.push(("Title", title.to_string()));
        self
    }

    pub fn author(mut self, author: &str) -> Self {
        self.info.push(("Author", author.to_string()));
        self
    }

    pub fn keywords(mut self, keywords: &str) -> Self {
        self.info.push(("Keywords", keywords.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let content = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", self.text);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        if !self.info.is_empty() {
            let mut info = lopdf::Dictionary::new();
            for (key, value) in self.info {
                info.set(key, Object::string_literal(value));
            }
            let info_id = doc.add_object(info);
            doc.trailer.set("Info", info_id);
        }

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("Failed to serialize test PDF");
        bytes
    }
}
