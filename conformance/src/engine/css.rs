//! CSS stylesheets tokenized with `cssparser`.
//!
//! A stylesheet becomes a flat list of qualified rules. Rules nested in
//! conditional at-rules (`@media`, `@supports`, `@document`, `@layer`) are
//! flattened into the list; other at-rules are kept as rules named by their
//! full prelude.

use std::rc::Rc;

use cssparser::{ParseError, Parser, ParserInput, SourcePosition, Token};

use super::{Document, Element, Engine, EngineError, Processed};

const GROUPING_RULES: [&str; 4] = ["@media", "@supports", "@document", "@layer"];

/// Parses sources as CSS stylesheets.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssEngine;

impl Engine for CssEngine {
    fn process(&self, src: &str, done: Box<dyn FnOnce(Processed)>) {
        let document: Rc<dyn Document> = Rc::new(CssDocument::parse(src));
        done(Ok(document));
    }
}

/// A stylesheet as a list of rules.
#[derive(Debug, Clone, Default)]
pub struct CssDocument {
    rules: Vec<Element>,
}

impl CssDocument {
    /// Parses `src`, recovering from malformed rules.
    pub fn parse(src: &str) -> Self {
        let mut input = ParserInput::new(src);
        let mut parser = Parser::new(&mut input);
        let mut rules = Vec::new();
        parse_rules(&mut parser, &mut rules);
        Self { rules }
    }

    /// Every rule in source order.
    pub fn rules(&self) -> &[Element] {
        &self.rules
    }
}

impl Document for CssDocument {
    /// Matches rules whose selector list contains `selector` verbatim.
    /// `*` matches every rule.
    fn find(&self, selector: &str) -> Result<Vec<Element>, EngineError> {
        let wanted = selector.trim();
        if wanted.is_empty() {
            return Err(EngineError::InvalidSelector(selector.to_string()));
        }
        Ok(self
            .rules
            .iter()
            .filter(|rule| wanted == "*" || rule.name().split(',').any(|part| part.trim() == wanted))
            .cloned()
            .collect())
    }
}

enum Stop {
    Block(SourcePosition),
    Statement,
    End,
}

fn parse_rules<'i>(input: &mut Parser<'i, '_>, rules: &mut Vec<Element>) {
    loop {
        input.skip_whitespace();
        let start = input.position();
        let stop = loop {
            let before = input.position();
            match input.next() {
                Ok(Token::CurlyBracketBlock) => break Stop::Block(before),
                Ok(Token::Semicolon) => break Stop::Statement,
                Ok(_) => {}
                Err(_) => break Stop::End,
            }
        };
        let before = match stop {
            Stop::Block(before) => before,
            Stop::Statement => continue,
            Stop::End => return,
        };

        let prelude = input.slice(start..before).trim().to_string();
        let grouping = GROUPING_RULES
            .iter()
            .any(|name| prelude.starts_with(name));

        if grouping {
            let _ = input.parse_nested_block(|nested| {
                parse_rules(nested, rules);
                Ok::<_, ParseError<'i, ()>>(())
            });
            continue;
        }

        let block_start = input.position();
        let declarations = input
            .parse_nested_block(|nested| Ok::<_, ParseError<'i, ()>>(parse_declarations(nested)))
            .unwrap_or_default();
        let inner = input
            .slice_from(block_start)
            .trim_end_matches('}')
            .trim()
            .to_string();
        let outer = input.slice_from(start).trim().to_string();
        rules.push(Element::new(prelude, declarations, outer, inner.clone(), inner));
    }
}

fn parse_declarations(input: &mut Parser<'_, '_>) -> Vec<(String, String)> {
    let mut declarations = Vec::new();
    loop {
        let name = match input.next() {
            Ok(Token::Ident(name)) => Some(name.to_string()),
            Ok(Token::Semicolon) => continue,
            Ok(_) => None,
            Err(_) => break,
        };
        let valid = name.is_some() && input.expect_colon().is_ok();
        let start = input.position();
        let (end, finished) = loop {
            let before = input.position();
            match input.next() {
                Ok(Token::Semicolon) => break (before, false),
                Ok(_) => {}
                Err(_) => break (input.position(), true),
            }
        };
        if let (true, Some(name)) = (valid, name) {
            let value = input.slice(start..end).trim().to_string();
            declarations.push((name, value));
        }
        if finished {
            break;
        }
    }
    declarations
}
