use chumsky::prelude::*;
use mb_core::metadata::SideChannel;
use mb_core::{ArrowKind, Diagram, Dialect, DialectTheme, Direction, NodeShape, StrokeStyle};

use crate::builder::DiagramBuilder;
use crate::text::{
    clean_label, first_word, normalize_identifier, significant_lines, split_statements,
    strip_inline_comment,
};

pub(crate) type Extra<'a> = extra::Err<Rich<'a, char>>;

// ---------------------------------------------------------------------------
// Statement AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct NodeRef {
    id: String,
    /// Present when the reference carries a bracketed shape.
    definition: Option<(NodeShape, Option<String>)>,
}

#[derive(Debug, Clone, PartialEq)]
struct Hop {
    arrow: ArrowKind,
    label: Option<String>,
    target: NodeRef,
}

#[derive(Debug, Clone, PartialEq)]
enum FlowStatement {
    Node(NodeRef),
    Chain {
        source: NodeRef,
        hops: Vec<Hop>,
        trailing_label: Option<String>,
    },
    Style {
        id: String,
        declarations: String,
    },
}

// ---------------------------------------------------------------------------
// Grammar
// ---------------------------------------------------------------------------
// One `;`-free statement at a time; headers, subgraph markers and comments
// are handled by the line loop.

pub(crate) fn inline_ws<'a>() -> impl Parser<'a, &'a str, (), Extra<'a>> + Clone {
    any()
        .filter(|c: &char| *c == ' ' || *c == '\t')
        .repeated()
        .ignored()
}

pub(crate) fn required_ws<'a>() -> impl Parser<'a, &'a str, (), Extra<'a>> + Clone {
    any()
        .filter(|c: &char| *c == ' ' || *c == '\t')
        .repeated()
        .at_least(1)
        .ignored()
}

/// Word characters with single `-` or `.` separators. A separator must be
/// followed by a word character, so `A-->B` stops before the arrow.
pub(crate) fn identifier<'a>() -> impl Parser<'a, &'a str, &'a str, Extra<'a>> + Clone {
    let word = any().filter(|c: &char| c.is_alphanumeric() || *c == '_');
    word.clone()
        .then(one_of("-.").or_not().then(word).repeated())
        .to_slice()
}

/// `open` label `close`, where the label may be quoted to contain `close`.
fn shape_body<'a>(
    open: &'static str,
    close: &'static str,
) -> impl Parser<'a, &'a str, &'a str, Extra<'a>> + Clone {
    let quoted = just('"')
        .ignore_then(any().filter(|c: &char| *c != '"').repeated().to_slice())
        .then_ignore(just('"'))
        .padded_by(inline_ws());
    let bare = any().and_is(just(close).not()).repeated().to_slice();
    just(open).ignore_then(choice((
        quoted.then_ignore(just(close)),
        bare.then_ignore(just(close)),
    )))
}

fn node_ref<'a>() -> impl Parser<'a, &'a str, NodeRef, Extra<'a>> + Clone {
    // Two-character delimiters first.
    let shape = choice((
        shape_body("((", "))").map(|label| (NodeShape::Circle, label)),
        shape_body("[(", ")]").map(|label| (NodeShape::Cylinder, label)),
        shape_body("[", "]").map(|label| (NodeShape::Rectangle, label)),
        shape_body("(", ")").map(|label| (NodeShape::Rounded, label)),
        shape_body("{", "}").map(|label| (NodeShape::Diamond, label)),
    ));

    identifier()
        .then(shape.or_not())
        .map(|(id, definition): (&str, Option<(NodeShape, &str)>)| NodeRef {
            id: id.to_string(),
            definition: definition.map(|(shape, label)| (shape, clean_label(label))),
        })
}

fn statement_parser<'a>() -> impl Parser<'a, &'a str, FlowStatement, Extra<'a>> {
    let arrow = choice((
        just("-.->").to(ArrowKind::Dotted),
        just("==>").to(ArrowKind::Thick),
        just("-->").to(ArrowKind::Solid),
        just("---").to(ArrowKind::Open),
    ));

    let pipe_label = shape_body("|", "|").map(clean_label);

    let hop = inline_ws()
        .ignore_then(arrow)
        .then_ignore(inline_ws())
        .then(pipe_label.or_not())
        .then_ignore(inline_ws())
        .then(node_ref())
        .map(|((arrow, label), target)| Hop {
            arrow,
            label: label.flatten(),
            target,
        });

    let trailing_label = inline_ws()
        .ignore_then(just(':'))
        .ignore_then(any().repeated().to_slice())
        .map(clean_label);

    let chain = node_ref()
        .then(hop.repeated().at_least(1).collect::<Vec<_>>())
        .then(trailing_label.or_not())
        .then_ignore(inline_ws())
        .then_ignore(end())
        .map(|((source, hops), trailing)| FlowStatement::Chain {
            source,
            hops,
            trailing_label: trailing.flatten(),
        });

    let style = just("style")
        .ignore_then(required_ws())
        .ignore_then(identifier())
        .then_ignore(required_ws())
        .then(any().repeated().at_least(1).to_slice())
        .then_ignore(end())
        .map(|(id, declarations): (&str, &str)| FlowStatement::Style {
            id: id.to_string(),
            declarations: declarations.trim().to_string(),
        });

    let node = node_ref()
        .then_ignore(inline_ws())
        .then_ignore(end())
        .map(FlowStatement::Node);

    choice((style, chain, node))
}

// ---------------------------------------------------------------------------
// Document loop and lowering
// ---------------------------------------------------------------------------

pub(crate) fn is_header(line: &str) -> bool {
    let word = first_word(line);
    word.eq_ignore_ascii_case("flowchart") || word.eq_ignore_ascii_case("graph")
}

/// `subgraph` forms: `id`, `id[label]`, `id [label]`, `id "label"`,
/// `"label"` and bare title words (id derived from the words).
fn subgraph_header(rest: &str) -> Option<(String, Option<String>)> {
    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }

    if let Some(open) = rest.find('[')
        && rest.ends_with(']')
    {
        let id = rest[..open].trim();
        if !id.is_empty() && !id.contains(char::is_whitespace) {
            return Some((id.to_string(), clean_label(&rest[open + 1..rest.len() - 1])));
        }
    }

    if rest.starts_with('"') {
        let label = clean_label(rest);
        let id = normalize_identifier(label.as_deref().unwrap_or_default());
        return (!id.is_empty()).then_some((id, label));
    }

    match rest.split_once(char::is_whitespace) {
        None => Some((rest.to_string(), None)),
        Some((id, tail)) if tail.trim_start().starts_with('"') => {
            Some((id.to_string(), clean_label(tail)))
        }
        Some(_) => {
            let id = normalize_identifier(rest);
            (!id.is_empty()).then(|| (id, clean_label(rest)))
        }
    }
}

fn subgraph_rest(statement: &str) -> Option<&str> {
    let rest = statement.strip_prefix("subgraph")?;
    (rest.is_empty() || rest.starts_with(char::is_whitespace)).then_some(rest)
}

struct PendingStyle {
    line_number: usize,
    id: String,
    declarations: String,
}

pub(crate) fn parse(
    input: &str,
    palette: &DialectTheme,
    channel: &SideChannel,
) -> (Diagram, Vec<String>) {
    let mut builder = DiagramBuilder::new(Dialect::Flowchart, palette, channel, NodeShape::Rectangle);
    let grammar = statement_parser();
    let mut open_group: Option<String> = None;
    let mut styles: Vec<PendingStyle> = Vec::new();
    let mut header_seen = false;

    for (line_number, line) in significant_lines(input) {
        if !header_seen && is_header(line) {
            header_seen = true;
            if let Some(direction) = line
                .split_whitespace()
                .nth(1)
                .map(|word| word.trim_end_matches(';'))
                .and_then(Direction::parse)
            {
                builder.set_direction(direction);
            }
            continue;
        }

        for statement in split_statements(strip_inline_comment(line)) {
            if let Some(rest) = subgraph_rest(statement) {
                let Some((id, label)) = subgraph_header(rest) else {
                    builder.warn(line_number, "subgraph without a name");
                    continue;
                };
                if let Some(outer) = open_group.take() {
                    builder.warn(
                        line_number,
                        format!("nested subgraph `{id}` closes `{outer}`"),
                    );
                }
                if let Some(group) = builder.intern_node(&id, Some(NodeShape::group()), label) {
                    group.parent = None;
                }
                open_group = Some(id);
                continue;
            }

            if statement == "end" {
                if open_group.take().is_none() {
                    builder.warn(line_number, "'end' without matching 'subgraph'");
                }
                continue;
            }

            // Per-subgraph direction is not modeled.
            if first_word(statement) == "direction" {
                continue;
            }

            let (ast, errors) = grammar.parse(statement).into_output_errors();
            match ast {
                Some(ast) if errors.is_empty() => lower(
                    ast,
                    line_number,
                    &mut builder,
                    open_group.as_deref(),
                    &mut styles,
                ),
                _ => builder.warn(
                    line_number,
                    format!("unsupported flowchart syntax: {statement}"),
                ),
            }
        }
    }

    if let Some(group) = open_group {
        builder.warn_unnumbered(format!("Flowchart ended with unclosed subgraph `{group}`"));
    }

    // Directives run last so they win over side-channel styles.
    for pending in styles {
        apply_style(&mut builder, &pending);
    }

    builder.finish()
}

fn intern_ref(builder: &mut DiagramBuilder<'_>, node: &NodeRef, group: Option<&str>) {
    let (shape, label) = match &node.definition {
        Some((shape, label)) => (Some(shape.clone()), label.clone()),
        None => (None, None),
    };
    builder.intern_node(&node.id, shape, label);
    if let Some(group) = group {
        builder.set_parent(&node.id, group);
    }
}

fn lower(
    statement: FlowStatement,
    line_number: usize,
    builder: &mut DiagramBuilder<'_>,
    group: Option<&str>,
    styles: &mut Vec<PendingStyle>,
) {
    match statement {
        FlowStatement::Node(node) => intern_ref(builder, &node, group),
        FlowStatement::Chain {
            source,
            hops,
            mut trailing_label,
        } => {
            intern_ref(builder, &source, group);
            let last = hops.len().saturating_sub(1);
            let mut previous = source.id;
            for (index, hop) in hops.into_iter().enumerate() {
                intern_ref(builder, &hop.target, group);
                let label = if index == last {
                    hop.label.or_else(|| trailing_label.take())
                } else {
                    hop.label
                };
                builder.push_edge(&previous, &hop.target.id, hop.arrow, label);
                previous = hop.target.id;
            }
        }
        FlowStatement::Style { id, declarations } => styles.push(PendingStyle {
            line_number,
            id,
            declarations,
        }),
    }
}

fn apply_style(builder: &mut DiagramBuilder<'_>, pending: &PendingStyle) {
    let Some(node) = builder.node_mut(&pending.id) else {
        builder.warn(
            pending.line_number,
            format!("style targets unknown node `{}`", pending.id),
        );
        return;
    };

    for declaration in pending.declarations.split(',') {
        let Some((key, value)) = declaration.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "fill" => node.style.fill = value.to_string(),
            "stroke" => node.style.stroke = value.to_string(),
            "color" => node.style.text_color = value.to_string(),
            "stroke-width" => {
                if let Ok(width) = value.trim_end_matches("px").trim().parse::<f64>() {
                    node.style.stroke_width = width;
                }
            }
            "stroke-dasharray" => node.style.stroke_style = StrokeStyle::from_dasharray(value),
            _ => {}
        }
    }
}
