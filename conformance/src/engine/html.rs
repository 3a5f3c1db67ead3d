//! HTML documents backed by `scraper`.

use std::rc::Rc;

use scraper::{Html, Selector};

use super::{Document, Element, Engine, EngineError, Processed};

/// Parses sources as HTML5 documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlEngine;

impl Engine for HtmlEngine {
    fn process(&self, src: &str, done: Box<dyn FnOnce(Processed)>) {
        let document: Rc<dyn Document> = Rc::new(HtmlDocument::parse(src));
        done(Ok(document));
    }
}

/// A parsed HTML tree. Parsing never fails; malformed markup is repaired.
#[derive(Debug)]
pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    /// Parses `src` as a complete document.
    pub fn parse(src: &str) -> Self {
        Self {
            html: Html::parse_document(src),
        }
    }
}

impl Document for HtmlDocument {
    fn find(&self, selector: &str) -> Result<Vec<Element>, EngineError> {
        let parsed = Selector::parse(selector)
            .map_err(|_| EngineError::InvalidSelector(selector.to_string()))?;
        Ok(self
            .html
            .select(&parsed)
            .map(|node| {
                let attrs = node
                    .value()
                    .attrs()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect();
                Element::new(
                    node.value().name(),
                    attrs,
                    node.html(),
                    node.inner_html(),
                    node.text().collect::<String>(),
                )
            })
            .collect())
    }
}
