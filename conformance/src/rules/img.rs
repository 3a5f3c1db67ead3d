//! `wai-img`: every image needs a meaningful text alternative.
//!
//! Options:
//!
//! - `minWidth`: alt texts shorter than this many characters are reported.
//! - `maxWidth`: alt texts longer than this many characters are reported.

use serde_json::{Map, Value};

use crate::engine::{Document, Element};
use crate::registry::RuleEntry;
use crate::report::{Message, Report};
use crate::rule::{RuleContext, RuleError};

/// Registered name.
pub const NAME: &str = "wai-img";

/// Registered description.
pub const DESCRIPTION: &str = "Basic accessibility image tests according to WCAG version 2.0";

/// The registry entry, restricted to HTML sources.
pub fn entry() -> RuleEntry {
    let mut options = Map::new();
    options.insert("srcTypes".to_string(), Value::from("html"));
    RuleEntry::from_fn(NAME, check)
        .with_description(DESCRIPTION)
        .with_options(options)
}

/// Logs one message per offending image, then completes.
///
/// # Errors
///
/// Returns an error if the source was not parsed as HTML or an option has
/// the wrong type.
pub fn check(_src: &str, cx: RuleContext) -> Result<(), RuleError> {
    let document = cx.document()?;
    let images = document.find("img")?;
    if images.is_empty() {
        cx.complete(Message::info("No images found in the source."));
        return Ok(());
    }

    let widths = Widths {
        min: cx.option::<usize>("minWidth")?.filter(|n| *n > 0),
        max: cx.option::<usize>("maxWidth")?.filter(|n| *n > 0),
    };
    let report: Report = images
        .iter()
        .filter_map(|image| check_alt(document, image, widths))
        .collect();
    if !report.is_empty() {
        cx.log(report);
    }
    cx.complete(Message::info("Complete."));
    Ok(())
}

#[derive(Clone, Copy)]
struct Widths {
    min: Option<usize>,
    max: Option<usize>,
}

fn check_alt(document: &dyn Document, image: &Element, widths: Widths) -> Option<Message> {
    let outer = image.outer_html();
    let alt = match document.attr(image, "alt") {
        None | Some("") => {
            return Some(Message::error(format!(
                "Image {outer}: does not have an \"alt\" attribute"
            )))
        }
        Some(alt) => alt,
    };
    if document.trim(alt).is_empty() {
        return Some(Message::error(format!(
            "Image {outer}: has an invalid \"alt\" attribute"
        )));
    }
    if document.attr(image, "src") == Some(alt) {
        return Some(Message::warning(format!(
            "Image {outer}: has an \"alt\" attribute same as its \"src\""
        )));
    }
    let length = alt.chars().count();
    if let Some(min) = widths.min.filter(|min| *min > length) {
        return Some(Message::warning(format!(
            "Image {outer}: has a short \"alt\" attribute which is less than {min} characters."
        )));
    }
    if let Some(max) = widths.max.filter(|max| *max < length) {
        return Some(Message::warning(format!(
            "Image {outer}: has a long \"alt\" attribute which is bigger than {max} characters."
        )));
    }
    None
}
