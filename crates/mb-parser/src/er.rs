use chumsky::prelude::*;
use mb_core::metadata::SideChannel;
use mb_core::{
    ArrowKind, Diagram, Dialect, DialectTheme, EntityAttribute, ErRelationship, NodeShape,
};

use crate::builder::DiagramBuilder;
use crate::flowchart::{Extra, identifier, inline_ws, required_ws};
use crate::text::{clean_label, first_word, significant_lines, strip_inline_comment};

#[derive(Debug, Clone, PartialEq)]
struct Relationship<'a> {
    source: &'a str,
    token: &'a str,
    target: &'a str,
    label: Option<String>,
}

/// `SOURCE <token> TARGET [: label]` where the token is one of the sixteen
/// crow's-foot connectors, solid (`--`) or dashed (`..`).
fn relationship_parser<'a>() -> impl Parser<'a, &'a str, Relationship<'a>, Extra<'a>> {
    let token = one_of("|}")
        .then(one_of("o|"))
        .then(just("--").or(just("..")))
        .then(one_of("o|"))
        .then(one_of("|{"))
        .to_slice();
    let label = inline_ws()
        .ignore_then(just(':'))
        .ignore_then(any().repeated().to_slice())
        .map(clean_label);

    identifier()
        .then_ignore(inline_ws())
        .then(token)
        .then_ignore(inline_ws())
        .then(identifier())
        .then(label.or_not())
        .then_ignore(inline_ws())
        .then_ignore(end())
        .map(|(((source, token), target), label)| Relationship {
            source,
            token,
            target,
            label: label.flatten(),
        })
}

/// `type name [PK|FK|UK[, ..]] ["comment"]`
fn attribute_parser<'a>() -> impl Parser<'a, &'a str, EntityAttribute, Extra<'a>> {
    let word = any()
        .filter(|c: &char| !c.is_whitespace() && *c != '"')
        .repeated()
        .at_least(1)
        .to_slice();
    let key = choice((just("PK"), just("FK"), just("UK")));
    let keys = key
        .separated_by(inline_ws().then(just(',')).then(inline_ws()))
        .at_least(1)
        .collect::<Vec<&str>>();
    let comment = just('"')
        .ignore_then(any().filter(|c: &char| *c != '"').repeated().to_slice())
        .then_ignore(just('"'));

    word.clone()
        .then_ignore(required_ws())
        .then(word)
        .then(required_ws().ignore_then(keys).or_not())
        .then(inline_ws().ignore_then(comment).or_not())
        .then_ignore(inline_ws())
        .then_ignore(end())
        .map(|(((data_type, name), keys), comment)| EntityAttribute {
            data_type: data_type.to_string(),
            name: name.to_string(),
            constraint: keys.map(|keys| keys.join(", ")),
            comment: comment.map(str::to_string),
        })
}

/// Split `HEAD { [BODY] [}]` into the entity id, optional display label,
/// the inline body and whether the block closed on the same line.
fn entity_open(line: &str) -> Option<(&str, Option<String>, &str, bool)> {
    let (head, tail) = line.split_once('{')?;
    let head = head.trim();
    let (id, label) = match head.find('[') {
        Some(open) if head.ends_with(']') => (
            head[..open].trim(),
            clean_label(&head[open + 1..head.len() - 1]),
        ),
        _ => (head, None),
    };
    if id.is_empty() || id.contains(char::is_whitespace) {
        return None;
    }
    match tail.split_once('}') {
        Some((body, after)) if after.trim().is_empty() => Some((id, label, body.trim(), true)),
        Some(_) => None,
        None => Some((id, label, tail.trim(), false)),
    }
}

pub(crate) fn parse(
    input: &str,
    palette: &DialectTheme,
    channel: &SideChannel,
) -> (Diagram, Vec<String>) {
    let mut builder = DiagramBuilder::new(
        Dialect::EntityRelationship,
        palette,
        channel,
        NodeShape::entity(),
    );
    let relationship = relationship_parser();
    let attribute = attribute_parser();
    let mut open_entity: Option<String> = None;

    for (line_number, line) in significant_lines(input) {
        let line = strip_inline_comment(line);
        if open_entity.is_none() && first_word(line).eq_ignore_ascii_case("erdiagram") {
            continue;
        }

        if let Some(entity) = open_entity.clone() {
            let (row, closes) = match line.strip_suffix('}') {
                Some(row) => (row.trim(), true),
                None => (line, false),
            };
            if !row.is_empty() {
                push_attribute(&mut builder, &attribute, &entity, row, line_number);
            }
            if closes {
                open_entity = None;
            }
            continue;
        }

        if let Ok(parsed) = relationship.parse(line).into_result() {
            let Some(kind) = ErRelationship::parse(parsed.token) else {
                builder.warn(line_number, format!("unknown relationship `{}`", parsed.token));
                continue;
            };
            builder.intern_node(parsed.source, None, None);
            builder.intern_node(parsed.target, None, None);
            builder.push_edge(
                parsed.source,
                parsed.target,
                ArrowKind::Relationship(kind),
                parsed.label,
            );
            continue;
        }

        if let Some((id, label, body, closed)) = entity_open(line) {
            if let Some(node) = builder.intern_node(id, None, None)
                && let Some(label) = label
            {
                node.label = label;
            }
            if !body.is_empty() {
                push_attribute(&mut builder, &attribute, id, body, line_number);
            }
            if !closed {
                open_entity = Some(id.to_string());
            }
            continue;
        }

        if first_word(line) == "direction" {
            continue;
        }
        builder.warn(line_number, format!("unsupported erDiagram syntax: {line}"));
    }

    if let Some(entity) = open_entity {
        builder.warn_unnumbered(format!("erDiagram ended inside entity block `{entity}`"));
    }

    builder.finish()
}

fn push_attribute<'a>(
    builder: &mut DiagramBuilder<'_>,
    attribute: &impl Parser<'a, &'a str, EntityAttribute, Extra<'a>>,
    entity: &str,
    row: &'a str,
    line_number: usize,
) {
    match attribute.parse(row).into_result() {
        Ok(parsed) => {
            if let Some(node) = builder.node_mut(entity)
                && let NodeShape::Entity { attributes } = &mut node.shape
            {
                attributes.push(parsed);
            }
        }
        Err(_) => builder.warn(line_number, format!("malformed attribute row: {row}")),
    }
}
