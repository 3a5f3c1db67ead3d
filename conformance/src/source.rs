//! Source documents, their inferred type, and the parsed-document cache.

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::engine::Document;

static HTML_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]*>").ok());
static CSS_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\S+\s*\{[^}]*\}").ok());

/// Content kind of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SrcType {
    /// HTML markup.
    Html,
    /// A CSS stylesheet.
    Css,
}

impl SrcType {
    /// Every known source type, in inference order.
    pub const ALL: [SrcType; 2] = [SrcType::Html, SrcType::Css];

    /// Returns the lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            SrcType::Html => "html",
            SrcType::Css => "css",
        }
    }

    /// Guesses the type of `src` from its content. HTML wins over CSS.
    pub fn infer(src: &str) -> Option<SrcType> {
        SrcType::ALL.into_iter().find(|kind| kind.matches(src))
    }

    /// Returns true if `src` looks like this type.
    pub fn matches(self, src: &str) -> bool {
        let pattern: &Option<Regex> = match self {
            SrcType::Html => &HTML_PATTERN,
            SrcType::Css => &CSS_PATTERN,
        };
        pattern.as_ref().is_some_and(|re| re.is_match(src))
    }
}

impl fmt::Display for SrcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SrcType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SrcType::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown source type `{s}`"))
    }
}

/// The source types a rule applies to. Written as `"*"`, a single type name,
/// or a list of type names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SrcTypes {
    /// Every source, including sources of unknown type.
    #[default]
    Any,
    /// Exactly one type.
    One(SrcType),
    /// Any of the listed types.
    Many(Vec<SrcType>),
}

impl SrcTypes {
    /// Returns true if a source of type `src_type` should be checked.
    pub fn supports(&self, src_type: Option<SrcType>) -> bool {
        match (self, src_type) {
            (SrcTypes::Any, _) => true,
            (_, None) => false,
            (SrcTypes::One(kind), Some(src_type)) => *kind == src_type,
            (SrcTypes::Many(kinds), Some(src_type)) => kinds.contains(&src_type),
        }
    }
}

impl Serialize for SrcTypes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SrcTypes::Any => serializer.serialize_str("*"),
            SrcTypes::One(kind) => kind.serialize(serializer),
            SrcTypes::Many(kinds) => kinds.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SrcTypes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            One(String),
            Many(Vec<String>),
        }

        match Shape::deserialize(deserializer)? {
            Shape::One(name) if name == "*" => Ok(SrcTypes::Any),
            Shape::One(name) => name.parse().map(SrcTypes::One).map_err(de::Error::custom),
            Shape::Many(names) => names
                .iter()
                .map(|name| name.parse())
                .collect::<Result<Vec<SrcType>, _>>()
                .map(SrcTypes::Many)
                .map_err(de::Error::custom),
        }
    }
}

/// A source document shared by every rule of a run.
///
/// Cloning is cheap and clones share the inferred type and the parsed
/// document, so a source is parsed at most once per engine.
#[derive(Clone)]
pub struct Source {
    inner: Rc<SourceInner>,
}

struct SourceInner {
    src: String,
    id: Option<String>,
    src_type: OnceCell<Option<SrcType>>,
    engine: RefCell<Option<Rc<dyn Document>>>,
}

impl Source {
    /// Creates a source whose type will be inferred from `src`.
    pub fn new(src: impl Into<String>) -> Self {
        Self::build(src.into(), None, OnceCell::new())
    }

    fn build(src: String, id: Option<String>, src_type: OnceCell<Option<SrcType>>) -> Self {
        Self {
            inner: Rc::new(SourceInner {
                src,
                id,
                src_type,
                engine: RefCell::new(None),
            }),
        }
    }

    /// Returns a copy of this source with an explicit type.
    pub fn with_src_type(self, src_type: SrcType) -> Self {
        let kind = OnceCell::new();
        let _ = kind.set(Some(src_type));
        Self::build(self.inner.src.clone(), self.inner.id.clone(), kind)
    }

    /// Returns a copy of this source with an identity (usually its path).
    pub fn with_id(self, id: impl Into<String>) -> Self {
        Self::build(
            self.inner.src.clone(),
            Some(id.into()),
            self.inner.src_type.clone(),
        )
    }

    /// Returns the document text.
    pub fn src(&self) -> &str {
        &self.inner.src
    }

    /// Returns the identity given with [`Source::with_id`].
    pub fn id(&self) -> Option<&str> {
        self.inner.id.as_deref()
    }

    /// Returns the explicit type, or infers and caches one.
    pub fn src_type(&self) -> Option<SrcType> {
        *self
            .inner
            .src_type
            .get_or_init(|| SrcType::infer(&self.inner.src))
    }

    /// Returns the cached parsed document, if an engine has processed it.
    pub fn engine(&self) -> Option<Rc<dyn Document>> {
        self.inner.engine.borrow().clone()
    }

    /// Caches a parsed document for later rules.
    pub fn set_engine(&self, document: Rc<dyn Document>) {
        *self.inner.engine.borrow_mut() = Some(document);
    }

    /// Returns true for an empty document.
    pub fn is_blank(&self) -> bool {
        self.inner.src.is_empty()
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.inner.id)
            .field("len", &self.inner.src.len())
            .field("src_type", &self.inner.src_type.get())
            .field("parsed", &self.inner.engine.borrow().is_some())
            .finish()
    }
}

impl From<&str> for Source {
    fn from(src: &str) -> Self {
        Source::new(src)
    }
}

impl From<String> for Source {
    fn from(src: String) -> Self {
        Source::new(src)
    }
}

/// The ordered set of sources handed to a run.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    items: Vec<Source>,
}

impl Sources {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a source.
    pub fn push(&mut self, source: impl Into<Source>) {
        self.items.push(source.into());
    }

    /// Returns the sources in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Source> {
        self.items.iter()
    }

    /// Returns the number of sources, blank ones included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if there is no non-blank source.
    pub fn is_empty(&self) -> bool {
        self.items.iter().all(Source::is_blank)
    }
}

impl From<Source> for Sources {
    fn from(source: Source) -> Self {
        Self {
            items: vec![source],
        }
    }
}

impl From<&str> for Sources {
    fn from(src: &str) -> Self {
        Source::new(src).into()
    }
}

impl From<String> for Sources {
    fn from(src: String) -> Self {
        Source::new(src).into()
    }
}

impl From<Vec<Source>> for Sources {
    fn from(items: Vec<Source>) -> Self {
        Self { items }
    }
}

impl From<Vec<String>> for Sources {
    fn from(items: Vec<String>) -> Self {
        items.into_iter().collect()
    }
}

impl From<&[&str]> for Sources {
    fn from(items: &[&str]) -> Self {
        items.iter().copied().collect()
    }
}

impl<S: Into<Source>> FromIterator<S> for Sources {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Sources {
    type Item = &'a Source;
    type IntoIter = std::slice::Iter<'a, Source>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_detection() {
        let cases = [
            ("<a></a>", true),
            ("hello <test><test/>", true),
            ("no html at all", false),
            ("a {some stuff: hello}", false),
            ("<p/>testing", true),
        ];
        for (src, expected) in cases {
            assert_eq!(SrcType::Html.matches(src), expected, "{src}");
        }
    }

    #[test]
    fn css_detection() {
        let cases = [
            ("a {}", true),
            ("you you {test: hello}", true),
            ("hello", false),
            ("a {some stuff: hello}\nb {some other: works}", true),
            ("a {} <p/>testing", true),
            ("<a></a>", false),
            ("<a>hello</a>", false),
        ];
        for (src, expected) in cases {
            assert_eq!(SrcType::Css.matches(src), expected, "{src}");
        }
    }

    #[test]
    fn type_inference_prefers_html() {
        let cases = [
            ("<a></a>", Some(SrcType::Html)),
            ("no html at all", None),
            ("a {some stuff: hello}", Some(SrcType::Css)),
            ("a {} <p/>testing", Some(SrcType::Html)),
            ("hello", None),
        ];
        for (src, expected) in cases {
            assert_eq!(SrcType::infer(src), expected, "{src}");
        }
    }

    #[test]
    fn supports_truth_table() {
        assert!(SrcTypes::Any.supports(Some(SrcType::Css)));
        assert!(SrcTypes::Any.supports(None));
        assert!(SrcTypes::One(SrcType::Html).supports(Some(SrcType::Html)));
        assert!(!SrcTypes::One(SrcType::Html).supports(Some(SrcType::Css)));
        assert!(!SrcTypes::One(SrcType::Html).supports(None));
        assert!(!SrcTypes::Many(vec![SrcType::Html]).supports(Some(SrcType::Css)));
        assert!(SrcTypes::Many(vec![SrcType::Html, SrcType::Css]).supports(Some(SrcType::Css)));
    }

    #[test]
    fn src_types_serde_forms() {
        let any: Result<SrcTypes, _> = serde_json::from_str(r#""*""#);
        assert_eq!(any.ok(), Some(SrcTypes::Any));
        let one: Result<SrcTypes, _> = serde_json::from_str(r#""html""#);
        assert_eq!(one.ok(), Some(SrcTypes::One(SrcType::Html)));
        let many: Result<SrcTypes, _> = serde_json::from_str(r#"["html", "css"]"#);
        assert_eq!(
            many.ok(),
            Some(SrcTypes::Many(vec![SrcType::Html, SrcType::Css]))
        );
        assert!(serde_json::from_str::<SrcTypes>(r#""js""#).is_err());
        assert_eq!(
            serde_json::to_value(SrcTypes::Any).ok(),
            Some(serde_json::json!("*"))
        );
    }

    #[test]
    fn explicit_type_overrides_inference() {
        let source = Source::new("plain words").with_src_type(SrcType::Css);
        assert_eq!(source.src_type(), Some(SrcType::Css));
        assert_eq!(Source::new("plain words").src_type(), None);
    }

    #[test]
    fn blank_sources_count_as_missing() {
        assert!(Sources::from("").is_empty());
        assert!(Sources::new().is_empty());
        assert!(!Sources::from(vec![String::new(), "<p></p>".to_string()]).is_empty());
    }
}
