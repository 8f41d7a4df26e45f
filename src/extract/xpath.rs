//! Path-expression (XPath subset) evaluation over parsed HTML
//!
//! Supported: absolute and relative location paths with `/` and `//` steps,
//! the `child::`, `descendant::` and `following-sibling::` axes, element name
//! tests and `*`, a final `text()` or `@attr` step, and the predicates `[N]`,
//! `[last()]`, `[x]`, `[x='v']`, `[contains(x, 'v')]` and
//! `[starts-with(x, 'v')]` joined by `and`, where `x` is `@a`, `text()`, `.`
//! or `normalize-space(...)` of one of those.
//!
//! Anything else (other axes, unions, grouping, arithmetic) is rejected at
//! parse time instead of silently matching nothing.

use std::collections::HashSet;

use scraper::{ElementRef, Html};

use crate::extract::error::ExtractionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    FollowingSibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Name(String),
    AnyElement,
    Text,
    Attribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Attribute(String),
    Text,
    Context,
    NormalizeSpace(Box<Operand>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Equals,
    Contains,
    StartsWith,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    Last,
    HasAttribute(String),
    NonEmpty(Operand),
    Compare {
        operand: Operand,
        comparison: Comparison,
        literal: String,
    },
    All(Vec<Predicate>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

/// A compiled path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPath {
    steps: Vec<Step>,
}

impl XPath {
    pub fn parse(expression: &str) -> Result<Self, ExtractionError> {
        let invalid = |reason: String| ExtractionError::InvalidXPath {
            xpath: expression.to_string(),
            reason,
        };

        let mut rest = expression.trim();
        if rest.is_empty() {
            return Err(invalid("expression is empty".to_string()));
        }
        if rest.starts_with('(') {
            return Err(invalid("grouped expressions are not supported".to_string()));
        }

        let mut steps = Vec::new();
        let mut first = true;
        while !rest.is_empty() {
            let axis = if let Some(after) = rest.strip_prefix("//") {
                rest = after;
                Axis::Descendant
            } else if let Some(after) = rest.strip_prefix('/') {
                rest = after;
                Axis::Child
            } else if first {
                Axis::Child
            } else {
                return Err(invalid(format!("expected '/' before {rest:?}")));
            };
            first = false;

            let end = step_end(rest);
            let step = parse_step(axis, &rest[..end]).map_err(invalid)?;
            rest = &rest[end..];

            let terminal = matches!(step.test, NodeTest::Text | NodeTest::Attribute(_));
            steps.push(step);
            if terminal && !rest.is_empty() {
                return Err(invalid("text() and @attr must be the last step".to_string()));
            }
        }

        Ok(Self { steps })
    }

    /// Trimmed, non-empty string values of the selected nodes in document order.
    ///
    /// Elements yield their full text content, `text()` yields text nodes and
    /// `@attr` yields attribute values.
    pub fn evaluate(&self, document: &Html) -> Vec<String> {
        let Some((last, element_steps)) = self.steps.split_last() else {
            return Vec::new();
        };

        let (element_steps, terminal) = match last.test {
            NodeTest::Text | NodeTest::Attribute(_) => (element_steps, Some(last)),
            _ => (self.steps.as_slice(), None),
        };

        let mut context: Option<Vec<ElementRef<'_>>> = None;
        for step in element_steps {
            context = Some(apply_step(document, context.as_deref(), step));
        }

        match terminal {
            None => context
                .unwrap_or_default()
                .into_iter()
                .map(|element| element.text().collect::<String>())
                .filter_map(non_empty_trimmed)
                .collect(),
            Some(step) => terminal_values(document, context.as_deref(), step),
        }
    }
}

/// Byte offset of the next `/` outside brackets and quotes
fn step_end(s: &str) -> usize {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, '/') if depth == 0 => return i,
            _ => {}
        }
    }
    s.len()
}

fn parse_step(axis: Axis, raw: &str) -> Result<Step, String> {
    let raw = raw.trim();
    let (test_part, mut predicates_part) = match raw.find('[') {
        Some(i) => (raw[..i].trim(), &raw[i..]),
        None => (raw, ""),
    };

    let (axis, test_part) = match test_part.split_once("::") {
        None => (axis, test_part),
        Some((name, test)) => (explicit_axis(axis, name.trim())?, test.trim()),
    };

    let test = match test_part {
        "" => return Err("empty step".to_string()),
        "*" => NodeTest::AnyElement,
        "text()" => NodeTest::Text,
        attr if attr.starts_with('@') => {
            let name = attr[1..].trim();
            if !is_name(name) {
                return Err(format!("invalid attribute name {name:?}"));
            }
            NodeTest::Attribute(name.to_string())
        }
        name if is_name(name) => NodeTest::Name(name.to_ascii_lowercase()),
        other => return Err(format!("unsupported step {other:?}")),
    };

    let mut predicates = Vec::new();
    while !predicates_part.is_empty() {
        let inner_start = predicates_part
            .strip_prefix('[')
            .ok_or_else(|| format!("unexpected {predicates_part:?}"))?;
        let close = closing_bracket(inner_start).ok_or("unclosed predicate")?;
        predicates.push(parse_predicate(inner_start[..close].trim())?);
        predicates_part = inner_start[close + 1..].trim_start();
    }

    let terminal = matches!(test, NodeTest::Text | NodeTest::Attribute(_));
    if terminal && !predicates.is_empty() {
        return Err("predicates on text() or @attr are not supported".to_string());
    }
    if terminal && axis == Axis::FollowingSibling {
        return Err("text() and @attr are not supported on following-sibling".to_string());
    }

    Ok(Step {
        axis,
        test,
        predicates,
    })
}

/// Axis named by `name::`, combined with the `/` or `//` before it
fn explicit_axis(separator: Axis, name: &str) -> Result<Axis, String> {
    match (name, separator) {
        ("child", axis) => Ok(axis),
        ("descendant", _) => Ok(Axis::Descendant),
        ("following-sibling", Axis::Child) => Ok(Axis::FollowingSibling),
        ("following-sibling", _) => {
            Err("following-sibling must follow a single '/'".to_string())
        }
        (other, _) => Err(format!("unsupported axis {other:?}")),
    }
}

fn closing_bracket(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn is_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !s.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.')
}

fn parse_predicate(inner: &str) -> Result<Predicate, String> {
    let clauses = split_and(inner);
    if clauses.len() > 1 {
        return clauses
            .into_iter()
            .map(|clause| match parse_predicate(clause.trim())? {
                Predicate::Position(_) | Predicate::Last => {
                    Err("positions cannot be combined with 'and'".to_string())
                }
                predicate => Ok(predicate),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Predicate::All);
    }

    if !inner.is_empty() && inner.bytes().all(|b| b.is_ascii_digit()) {
        let position: usize = inner.parse().map_err(|_| "position out of range")?;
        if position == 0 {
            return Err("positions start at 1".to_string());
        }
        return Ok(Predicate::Position(position));
    }

    if inner == "last()" {
        return Ok(Predicate::Last);
    }

    for (function, comparison) in [
        ("contains(", Comparison::Contains),
        ("starts-with(", Comparison::StartsWith),
    ] {
        if let Some(args) = inner.strip_prefix(function) {
            let args = args
                .strip_suffix(')')
                .ok_or_else(|| format!("unclosed {function}"))?;
            let (operand, literal) = args
                .split_once(',')
                .ok_or_else(|| format!("{function}) takes two arguments"))?;
            return Ok(Predicate::Compare {
                operand: parse_operand(operand.trim())?,
                comparison,
                literal: parse_literal(literal.trim())?,
            });
        }
    }

    if let Some((operand, literal)) = inner.split_once('=') {
        return Ok(Predicate::Compare {
            operand: parse_operand(operand.trim())?,
            comparison: Comparison::Equals,
            literal: parse_literal(literal.trim())?,
        });
    }

    match parse_operand(inner)? {
        Operand::Attribute(name) => Ok(Predicate::HasAttribute(name)),
        operand => Ok(Predicate::NonEmpty(operand)),
    }
}

/// Splits on ` and ` outside quotes and parentheses
fn split_and(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ' ') if depth == 0 && i >= start && s[i..].starts_with(" and ") => {
                parts.push(&s[start..i]);
                start = i + " and ".len();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn parse_operand(s: &str) -> Result<Operand, String> {
    match s {
        "text()" => Ok(Operand::Text),
        "." => Ok(Operand::Context),
        attr if attr.starts_with('@') && is_name(&attr[1..]) => {
            Ok(Operand::Attribute(attr[1..].to_string()))
        }
        call if call.starts_with("normalize-space(") && call.ends_with(')') => {
            let argument = call["normalize-space(".len()..call.len() - 1].trim();
            let inner = if argument.is_empty() {
                Operand::Context
            } else {
                parse_operand(argument)?
            };
            Ok(Operand::NormalizeSpace(Box::new(inner)))
        }
        other => Err(format!("unsupported operand {other:?}")),
    }
}

fn parse_literal(s: &str) -> Result<String, String> {
    let quoted = s.len() >= 2
        && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"')));
    if quoted {
        Ok(s[1..s.len() - 1].to_string())
    } else {
        Err(format!("expected quoted string, got {s:?}"))
    }
}

fn element_children<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}

fn element_descendants_or_self<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.descendants().filter_map(ElementRef::wrap)
}

/// Parents whose children a step examines. `None` context is the document node.
fn parents<'a>(document: &'a Html, context: Option<&[ElementRef<'a>]>, axis: Axis) -> Vec<Option<ElementRef<'a>>> {
    match (context, axis) {
        (None, Axis::Child) => vec![None],
        (None, Axis::Descendant) => std::iter::once(None)
            .chain(element_descendants_or_self(document.root_element()).map(Some))
            .collect(),
        (Some(context), Axis::Child) => context.iter().copied().map(Some).collect(),
        (Some(context), Axis::Descendant) => context
            .iter()
            .flat_map(|element| element_descendants_or_self(*element))
            .map(Some)
            .collect(),
        (_, Axis::FollowingSibling) => Vec::new(),
    }
}

/// Candidate elements per context node, each group in axis order
fn candidates<'a>(
    document: &'a Html,
    context: Option<&[ElementRef<'a>]>,
    axis: Axis,
) -> Vec<Vec<ElementRef<'a>>> {
    if axis == Axis::FollowingSibling {
        return context
            .unwrap_or_default()
            .iter()
            .map(|element| element.next_siblings().filter_map(ElementRef::wrap).collect())
            .collect();
    }

    parents(document, context, axis)
        .into_iter()
        .map(|parent| match parent {
            None => vec![document.root_element()],
            Some(parent) => element_children(parent).collect(),
        })
        .collect()
}

fn apply_step<'a>(document: &'a Html, context: Option<&[ElementRef<'a>]>, step: &Step) -> Vec<ElementRef<'a>> {
    let mut selected = Vec::new();

    for group in candidates(document, context, step.axis) {
        let mut matched: Vec<ElementRef<'a>> = group
            .into_iter()
            .filter(|child| match &step.test {
                NodeTest::Name(name) => child.value().name().eq_ignore_ascii_case(name),
                _ => true,
            })
            .collect();

        for predicate in &step.predicates {
            matched = apply_predicate(matched, predicate);
        }
        selected.extend(matched);
    }

    in_document_order(document, selected)
}

fn apply_predicate<'a>(nodes: Vec<ElementRef<'a>>, predicate: &Predicate) -> Vec<ElementRef<'a>> {
    match predicate {
        Predicate::Position(n) => nodes.into_iter().nth(n - 1).into_iter().collect(),
        Predicate::Last => nodes.into_iter().last().into_iter().collect(),
        filter => nodes
            .into_iter()
            .filter(|node| matches_filter(*node, filter))
            .collect(),
    }
}

fn matches_filter(element: ElementRef<'_>, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Position(_) | Predicate::Last => true,
        Predicate::HasAttribute(name) => element.value().attr(name).is_some(),
        Predicate::NonEmpty(operand) => {
            operand_value(element, operand).is_some_and(|value| !value.is_empty())
        }
        Predicate::Compare {
            operand,
            comparison,
            literal,
        } => {
            let Some(value) = operand_value(element, operand) else {
                return false;
            };
            match comparison {
                Comparison::Equals => value.trim() == literal,
                Comparison::Contains => value.contains(literal.as_str()),
                Comparison::StartsWith => value.trim_start().starts_with(literal.as_str()),
            }
        }
        Predicate::All(clauses) => clauses.iter().all(|clause| matches_filter(element, clause)),
    }
}

fn operand_value(element: ElementRef<'_>, operand: &Operand) -> Option<String> {
    match operand {
        Operand::Attribute(name) => element.value().attr(name).map(str::to_string),
        Operand::Text => Some(direct_text(element).collect()),
        Operand::Context => Some(element.text().collect()),
        Operand::NormalizeSpace(inner) => operand_value(element, inner)
            .map(|value| value.split_whitespace().collect::<Vec<_>>().join(" ")),
    }
}

fn direct_text<'a>(element: ElementRef<'a>) -> impl Iterator<Item = &'a str> {
    element
        .children()
        .filter_map(|node| node.value().as_text().map(|text| &**text))
}

/// Deduplicates and sorts elements by their position in the document
fn in_document_order<'a>(document: &'a Html, elements: Vec<ElementRef<'a>>) -> Vec<ElementRef<'a>> {
    if elements.len() < 2 {
        return elements;
    }
    let wanted: HashSet<_> = elements.iter().map(|element| element.id()).collect();
    element_descendants_or_self(document.root_element())
        .filter(|element| wanted.contains(&element.id()))
        .collect()
}

fn terminal_values(document: &Html, context: Option<&[ElementRef<'_>]>, step: &Step) -> Vec<String> {
    let scope: Vec<ElementRef<'_>> = match (context, step.axis) {
        (None, Axis::Child) => Vec::new(),
        (None, Axis::Descendant) => element_descendants_or_self(document.root_element()).collect(),
        (Some(context), Axis::Child) => context.to_vec(),
        (Some(context), Axis::Descendant) => in_document_order(
            document,
            context
                .iter()
                .flat_map(|element| element_descendants_or_self(*element))
                .collect(),
        ),
        (_, Axis::FollowingSibling) => Vec::new(),
    };

    let values = scope.into_iter().flat_map(|element| -> Vec<String> {
        match &step.test {
            NodeTest::Text => direct_text(element).map(str::to_string).collect(),
            NodeTest::Attribute(name) => element
                .value()
                .attr(name)
                .map(str::to_string)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    });

    values.filter_map(non_empty_trimmed).collect()
}

fn non_empty_trimmed(s: String) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
