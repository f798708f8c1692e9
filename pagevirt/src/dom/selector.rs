//! Structural rules: a CSS selector subset.
//!
//! Supported: type and universal selectors, `#id`, `.class`, attribute selectors with
//! `=`, `~=`, `|=`, `^=`, `$=`, `*=` (quoted or bare values), descendant and child (`>`)
//! combinators, and comma-separated lists.

use super::{Document, NodeId};
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttrOp {
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    test: Option<(AttrOp, String)>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Complex {
    compounds: Vec<Compound>,
    // combinators[i] joins compounds[i] and compounds[i + 1]
    combinators: Vec<Combinator>,
}

/// A parsed selector list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<Complex>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self> {
        Parser::new(source).parse_list()
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.alternatives
            .iter()
            .any(|c| matches_complex(doc, c, c.compounds.len() - 1, node))
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::invalid_rule(self.source, reason)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn ident(&mut self) -> Result<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error(format!("expected identifier at {start}")));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_list(&mut self) -> Result<Selector> {
        let mut alternatives = Vec::new();
        loop {
            self.skip_ws();
            alternatives.push(self.parse_complex()?);
            self.skip_ws();
            match self.bump() {
                None => break,
                Some(',') => continue,
                Some(c) => return Err(self.error(format!("unexpected `{c}`"))),
            }
        }
        Ok(Selector { alternatives })
    }

    fn parse_complex(&mut self) -> Result<Complex> {
        let mut compounds = vec![self.parse_compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_ws = self.skip_ws();
            match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_ws();
                    combinators.push(Combinator::Child);
                }
                Some(_) if had_ws => combinators.push(Combinator::Descendant),
                Some(c) => return Err(self.error(format!("unexpected `{c}`"))),
            }
            compounds.push(self.parse_compound()?);
        }
        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound> {
        let start = self.pos;
        let mut compound = Compound::default();

        if self.eat('*') {
            // universal: no tag constraint
        } else if self.peek().is_some_and(is_ident_char) {
            compound.tag = Some(self.ident()?.to_ascii_lowercase());
        }

        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                Some('#') => {
                    self.pos += 1;
                    compound.ids.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.parse_attr()?);
                }
                _ => break,
            }
        }

        if self.pos == start {
            return Err(self.error(format!("expected selector at {start}")));
        }
        Ok(compound)
    }

    fn parse_attr(&mut self) -> Result<AttrSelector> {
        self.skip_ws();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_ws();
        if self.eat(']') {
            return Ok(AttrSelector { name, test: None });
        }

        let op = match self.bump() {
            Some('=') => AttrOp::Equals,
            Some(c @ ('~' | '|' | '^' | '$' | '*')) => {
                if !self.eat('=') {
                    return Err(self.error(format!("expected `=` after `{c}`")));
                }
                match c {
                    '~' => AttrOp::Includes,
                    '|' => AttrOp::DashMatch,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    _ => AttrOp::Substring,
                }
            }
            Some(c) => return Err(self.error(format!("unexpected `{c}` in attribute selector"))),
            None => return Err(self.error("unterminated attribute selector")),
        };

        self.skip_ws();
        let value = match self.peek() {
            Some(q @ ('\'' | '"')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != q) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(self.error("unterminated string"));
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                value
            }
            _ => self.ident()?,
        };
        self.skip_ws();
        if !self.eat(']') {
            return Err(self.error("expected `]`"));
        }
        Ok(AttrSelector {
            name,
            test: Some((op, value)),
        })
    }
}

fn attr_matches(actual: &str, op: AttrOp, expected: &str) -> bool {
    match op {
        AttrOp::Equals => actual == expected,
        AttrOp::Includes => actual.split_whitespace().any(|w| w == expected),
        AttrOp::DashMatch => {
            actual == expected
                || actual
                    .strip_prefix(expected)
                    .is_some_and(|rest| rest.starts_with('-'))
        }
        AttrOp::Prefix => !expected.is_empty() && actual.starts_with(expected),
        AttrOp::Suffix => !expected.is_empty() && actual.ends_with(expected),
        AttrOp::Substring => !expected.is_empty() && actual.contains(expected),
    }
}

fn matches_compound(doc: &Document, compound: &Compound, node: NodeId) -> bool {
    let Some(tag) = doc.tag(node) else {
        return false;
    };
    if compound
        .tag
        .as_deref()
        .is_some_and(|t| !t.eq_ignore_ascii_case(tag))
    {
        return false;
    }
    if !compound.ids.iter().all(|id| doc.attribute(node, "id") == Some(id.as_str())) {
        return false;
    }
    if !compound.classes.is_empty() {
        let class = doc.attribute(node, "class").unwrap_or("");
        if !compound
            .classes
            .iter()
            .all(|c| class.split_whitespace().any(|w| w == c))
        {
            return false;
        }
    }
    compound.attrs.iter().all(|a| match doc.attribute(node, &a.name) {
        None => false,
        Some(actual) => match &a.test {
            None => true,
            Some((op, expected)) => attr_matches(actual, *op, expected),
        },
    })
}

fn matches_complex(doc: &Document, complex: &Complex, idx: usize, node: NodeId) -> bool {
    if !matches_compound(doc, &complex.compounds[idx], node) {
        return false;
    }
    if idx == 0 {
        return true;
    }
    match complex.combinators[idx - 1] {
        Combinator::Child => doc
            .parent(node)
            .is_some_and(|p| matches_complex(doc, complex, idx - 1, p)),
        Combinator::Descendant => {
            let mut cur = doc.parent(node);
            while let Some(p) = cur {
                if matches_complex(doc, complex, idx - 1, p) {
                    return true;
                }
                cur = doc.parent(p);
            }
            false
        }
    }
}
