//! Document engines: parse a source once, then answer selector queries.
//!
//! An [`Engine`] turns source text into a [`Document`]. Rules query documents
//! through [`Document::find`] and never see the underlying parser. The
//! built-in engines are [`HtmlEngine`] (scraper over html5ever) and
//! [`CssEngine`] (cssparser).

mod css;
mod html;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::source::SrcType;

pub use css::{CssDocument, CssEngine};
pub use html::{HtmlDocument, HtmlEngine};

/// Errors raised by engines and document queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The selector could not be parsed.
    #[error("invalid selector `{0}`")]
    InvalidSelector(String),
    /// The source could not be processed into a document.
    #[error("{0}")]
    Process(String),
}

/// One node matched by a selector query.
///
/// For HTML this is an element; for CSS it is a qualified rule whose name is
/// its selector list and whose attributes are its declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    outer_html: String,
    inner_html: String,
    text: String,
}

impl Element {
    /// Builds an element from its parts.
    pub fn new(
        name: impl Into<String>,
        attrs: Vec<(String, String)>,
        outer_html: impl Into<String>,
        inner_html: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            attrs,
            outer_html: outer_html.into(),
            inner_html: inner_html.into(),
            text: text.into(),
        }
    }

    /// Tag name (HTML) or selector list (CSS).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of the first attribute called `name`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All attributes in source order.
    pub fn attrs(&self) -> &[(String, String)] {
        &self.attrs
    }

    /// Serialized markup of the node itself.
    pub fn outer_html(&self) -> &str {
        &self.outer_html
    }

    /// Serialized markup of the node's children.
    pub fn inner_html(&self) -> &str {
        &self.inner_html
    }

    /// Concatenated text content.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A parsed source that answers selector queries.
pub trait Document {
    /// Returns every node matching `selector`, in document order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidSelector`] if the selector is malformed.
    fn find(&self, selector: &str) -> Result<Vec<Element>, EngineError>;

    /// Returns an attribute of a node found by this document.
    fn attr<'e>(&self, element: &'e Element, name: &str) -> Option<&'e str> {
        element.attr(name)
    }

    /// Trims whitespace the way this document's format defines it.
    fn trim<'s>(&self, text: &'s str) -> &'s str {
        text.trim()
    }
}

/// The outcome handed to an [`Engine::process`] callback.
pub type Processed = Result<Rc<dyn Document>, EngineError>;

/// Turns source text into a [`Document`].
///
/// Processing is callback based so an engine may finish on a later tick.
pub trait Engine {
    /// Parses `src` and hands the outcome to `done` exactly once.
    fn process(&self, src: &str, done: Box<dyn FnOnce(Processed)>);
}

/// Engines keyed by the source type they handle.
#[derive(Clone, Default)]
pub struct Engines {
    engines: HashMap<SrcType, Rc<dyn Engine>>,
}

impl Engines {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the HTML and CSS engines.
    pub fn with_defaults() -> Self {
        let mut engines = Self::new();
        engines
            .register(SrcType::Html, HtmlEngine)
            .register(SrcType::Css, CssEngine);
        engines
    }

    /// Registers `engine` for `src_type`, replacing any previous one.
    pub fn register(&mut self, src_type: SrcType, engine: impl Engine + 'static) -> &mut Self {
        self.engines.insert(src_type, Rc::new(engine));
        self
    }

    /// Returns the engine for `src_type`.
    pub fn get(&self, src_type: SrcType) -> Option<Rc<dyn Engine>> {
        self.engines.get(&src_type).cloned()
    }
}

impl fmt::Debug for Engines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&'static str> = self.engines.keys().map(|kind| kind.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("Engines").field("types", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn parse(engine: &dyn Engine, src: &str) -> Option<Rc<dyn Document>> {
        let slot = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&slot);
        engine.process(src, Box::new(move |processed| *sink.borrow_mut() = processed.ok()));
        let document = slot.borrow_mut().take();
        document
    }

    #[test]
    fn defaults_cover_both_types() {
        let engines = Engines::with_defaults();
        assert!(engines.get(SrcType::Html).is_some());
        assert!(engines.get(SrcType::Css).is_some());
        assert!(Engines::new().get(SrcType::Html).is_none());
    }

    #[test]
    fn html_engine_finds_images() {
        let document = parse(&HtmlEngine, r#"<p><img src="a.png" alt="A"><img src="b.png"></p>"#);
        let images = document.map(|doc| doc.find("img")).and_then(Result::ok);
        let images = images.unwrap_or_default();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].attr("alt"), Some("A"));
        assert_eq!(images[1].attr("alt"), None);
        assert_eq!(images[1].attr("src"), Some("b.png"));
        assert!(images[0].outer_html().starts_with("<img"));
    }

    #[test]
    fn html_engine_rejects_bad_selectors() {
        let document = parse(&HtmlEngine, "<p>hi</p>");
        let result = document.map(|doc| doc.find("p[").is_err());
        assert_eq!(result, Some(true));
    }

    #[test]
    fn css_engine_lists_rules_and_declarations() {
        let src = "a { color: red; margin: 0 auto }\n@media print { h1, h2 { display: none } }";
        let document = parse(&CssEngine, src);
        let rules = document.map(|doc| doc.find("*")).and_then(Result::ok);
        let rules = rules.unwrap_or_default();
        let names: Vec<&str> = rules.iter().map(Element::name).collect();
        assert_eq!(names, vec!["a", "h1, h2"]);
        assert_eq!(rules[0].attr("color"), Some("red"));
        assert_eq!(rules[0].attr("margin"), Some("0 auto"));
        assert_eq!(rules[1].attr("display"), Some("none"));
    }

    #[test]
    fn css_find_matches_any_selector_in_list() {
        let document = parse(&CssEngine, "h1, h2 { display: none } p { color: blue }");
        let found = document.map(|doc| doc.find("h2")).and_then(Result::ok);
        let found = found.unwrap_or_default();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "h1, h2");
    }

    #[test]
    fn css_stray_semicolons_do_not_swallow_declarations() {
        let document = CssDocument::parse("a { ; color: red;; margin: 0 ;}");
        let rules = document.rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].attr("color"), Some("red"));
        assert_eq!(rules[0].attr("margin"), Some("0"));
        assert_eq!(rules[0].attrs().len(), 2);
    }
}
