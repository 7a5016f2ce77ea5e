use chumsky::prelude::*;
use mb_core::metadata::SideChannel;
use mb_core::{
    ArrowKind, Diagram, DialectTheme, NodeKind, SequenceMessage, SequenceParticipant,
    SequenceScript,
};
use mb_layout::{SequenceLayoutConfig, layout_sequence};
use tracing::debug;

use crate::LayoutOutcome;
use crate::flowchart::{Extra, inline_ws};
use crate::text::{clean_label, first_word, inline_comment_start, significant_lines};

#[derive(Debug, Clone, PartialEq)]
struct MessageLine<'a> {
    from: &'a str,
    arrow: ArrowKind,
    to: &'a str,
    label: Option<String>,
}

/// Participant names stop at arrow, activation and label characters, so
/// `A-xB` splits into `A`, `-x` and `B`.
fn participant<'a>() -> impl Parser<'a, &'a str, &'a str, Extra<'a>> + Clone {
    any()
        .filter(|c: &char| !c.is_whitespace() && !"+->:,;\"".contains(*c))
        .repeated()
        .at_least(1)
        .to_slice()
}

/// `FROM <arrow> [+|-]TO [: label]`. Longer arrows are tried first so
/// `-->>` is never read as `-->` followed by `>`.
fn message_parser<'a>() -> impl Parser<'a, &'a str, MessageLine<'a>, Extra<'a>> {
    let arrow = choice((
        just("-->>").to(ArrowKind::Dotted),
        just("--x").to(ArrowKind::Dotted),
        just("-->").to(ArrowKind::Dotted),
        just("->>").to(ArrowKind::Solid),
        just("-x").to(ArrowKind::Solid),
        just("->").to(ArrowKind::Open),
    ));
    let label = inline_ws()
        .ignore_then(just(':'))
        .ignore_then(any().repeated().to_slice())
        .map(clean_label);

    participant()
        .then_ignore(inline_ws())
        .then(arrow)
        .then_ignore(inline_ws())
        .then_ignore(one_of("+-").or_not())
        .then_ignore(inline_ws())
        .then(participant())
        .then(label.or_not())
        .then_ignore(inline_ws())
        .then_ignore(end())
        .map(|(((from, arrow), to), label)| MessageLine {
            from,
            arrow,
            to,
            label: label.flatten(),
        })
}

/// Message text after the first `:` is label text, `%%` included; a comment
/// can only trail the part before it.
fn strip_statement_comment(line: &str) -> &str {
    let head = line.find(':').map_or(line, |colon| &line[..colon]);
    match inline_comment_start(head) {
        Some(index) => line[..index].trim_end(),
        None => line,
    }
}

/// `participant ID [as Alias]` or `actor ID [as Alias]`.
fn declaration(line: &str) -> Option<(bool, &str, Option<String>)> {
    let keyword = first_word(line);
    let actor = match keyword {
        "participant" => false,
        "actor" => true,
        _ => return None,
    };
    let rest = line[keyword.len()..].trim();
    let (id, alias) = match rest.split_once(" as ") {
        Some((id, alias)) => (id.trim(), clean_label(alias)),
        None => (rest, None),
    };
    let id = id.trim_matches('"');
    (!id.is_empty()).then_some((actor, id, alias))
}

struct Roster<'a> {
    palette: &'a DialectTheme,
    participants: Vec<SequenceParticipant>,
}

impl Roster<'_> {
    fn declare(&mut self, id: &str, label: Option<String>, actor: bool) {
        if let Some(existing) = self.participants.iter_mut().find(|p| p.id == id) {
            existing.actor = actor;
            if let Some(label) = label {
                existing.label = label;
            }
            return;
        }
        self.participants.push(SequenceParticipant {
            id: id.to_string(),
            label: label.unwrap_or_else(|| id.to_string()),
            actor,
            style: self.palette.node_style(NodeKind::Rectangle).clone(),
        });
    }

    fn mention(&mut self, id: &str) {
        if !self.participants.iter().any(|p| p.id == id) {
            self.declare(id, None, false);
        }
    }
}

pub(crate) fn parse(
    input: &str,
    palette: &DialectTheme,
    channel: &SideChannel,
) -> (Diagram, Vec<String>, LayoutOutcome) {
    let mut warnings = Vec::new();
    let mut roster = Roster {
        palette,
        participants: Vec::new(),
    };

    // Declarations fix participant order even when they follow a message.
    let mut statements = Vec::new();
    for (line_number, line) in significant_lines(input) {
        let line = strip_statement_comment(line);
        if first_word(line).eq_ignore_ascii_case("sequencediagram") {
            continue;
        }
        match declaration(line) {
            Some((actor, id, alias)) => roster.declare(id, alias, actor),
            None => statements.push((line_number, line)),
        }
    }

    let grammar = message_parser();
    let mut messages = Vec::new();
    for (line_number, line) in statements {
        match grammar.parse(line).into_result() {
            Ok(parsed) => {
                roster.mention(parsed.from);
                roster.mention(parsed.to);
                messages.push(SequenceMessage {
                    from: parsed.from.to_string(),
                    to: parsed.to.to_string(),
                    label: parsed.label,
                    arrow: parsed.arrow,
                });
            }
            Err(_) => warnings.push(format!(
                "Line {line_number}: unsupported sequenceDiagram syntax: {line}"
            )),
        }
    }

    let script = SequenceScript {
        participants: roster.participants,
        messages,
    };
    let mut layout = layout_sequence(&script, &SequenceLayoutConfig::default(), palette);
    let outcome = LayoutOutcome::Lifelines {
        participants: layout.stats.participants,
        messages: layout.stats.messages,
    };

    for node in &mut layout.nodes {
        if let Some(overrides) = channel.styles.get(&node.id) {
            overrides.apply(node);
        }
    }
    let mut queue = channel.edge_queue();
    for edge in &mut layout.edges {
        if let Some(extra) = queue.take(&edge.source, &edge.target) {
            extra.apply(edge);
        }
    }
    debug!(
        participants = script.participants.len(),
        messages = script.messages.len(),
        "parsed sequence diagram"
    );

    (layout.into_diagram(), warnings, outcome)
}

#[cfg(test)]
mod tests {
    use chumsky::Parser;
    use mb_core::metadata::SideChannel;
    use mb_core::{ArrowKind, Diagram, MessagePart, NodeKind, NodeShape, Theme};

    use super::{declaration, message_parser, parse};
    use crate::LayoutOutcome;

    fn parse_text(input: &str) -> (Diagram, Vec<String>, LayoutOutcome) {
        let theme = Theme::default();
        parse(input, &theme.sequence, &SideChannel::from_text(input))
    }

    fn participants(diagram: &Diagram) -> Vec<&str> {
        diagram
            .nodes
            .iter()
            .filter(|node| node.kind() != NodeKind::Anchor)
            .map(|node| node.id.as_str())
            .collect()
    }

    #[test]
    fn arrows_map_to_kinds() {
        let cases = [
            ("A->>B", ArrowKind::Solid),
            ("A-->>B", ArrowKind::Dotted),
            ("A->B", ArrowKind::Open),
            ("A-->B", ArrowKind::Dotted),
            ("A-xB", ArrowKind::Solid),
            ("A--xB", ArrowKind::Dotted),
        ];
        for (line, expected) in cases {
            let parsed = message_parser().parse(line).into_result();
            let parsed = parsed.unwrap_or_else(|err| panic!("{line}: {err:?}"));
            assert_eq!(parsed.arrow, expected, "{line}");
            assert_eq!((parsed.from, parsed.to), ("A", "B"));
        }
    }

    #[test]
    fn labels_and_activation_markers() {
        let parsed = message_parser()
            .parse("web_app ->>+ api : GET /users<br/>page 2")
            .into_result()
            .expect("message");
        assert_eq!(parsed.from, "web_app");
        assert_eq!(parsed.to, "api");
        assert_eq!(parsed.label.as_deref(), Some("GET /users\npage 2"));

        let bare = message_parser().parse("A->>B").into_result().expect("message");
        assert_eq!(bare.label, None);
    }

    #[test]
    fn declarations_with_aliases() {
        assert_eq!(declaration("participant A as Alice"), Some((false, "A", Some("Alice".to_string()))));
        assert_eq!(declaration("actor U"), Some((true, "U", None)));
        assert_eq!(declaration("Alice->>Bob: hi"), None);
    }

    #[test]
    fn hello_hi_exchange() {
        let (diagram, warnings, outcome) =
            parse_text("sequenceDiagram\n Alice->>Bob: Hello\n Bob-->>Alice: Hi");
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(
            outcome,
            LayoutOutcome::Lifelines {
                participants: 2,
                messages: 2
            }
        );
        assert_eq!(participants(&diagram), vec!["Alice", "Bob"]);

        let labels: Vec<_> = diagram
            .edges
            .iter()
            .filter_map(|edge| edge.sequence.as_ref().map(|link| (edge, link)))
            .filter(|(_, link)| link.part == MessagePart::Label)
            .map(|(edge, link)| (link.order, edge.label.clone()))
            .collect();
        assert_eq!(
            labels,
            vec![(0, Some("Hello".to_string())), (1, Some("Hi".to_string()))]
        );
    }

    #[test]
    fn declarations_fix_order_and_labels() {
        let (diagram, _, _) = parse_text(
            "sequenceDiagram\nB->>A: first\nparticipant A as Alice\nactor B as Bob",
        );
        assert_eq!(participants(&diagram), vec!["A", "B"]);
        let bob = diagram.find_node("B").expect("B");
        assert_eq!(bob.label, "Bob");
        assert_eq!(bob.shape, NodeShape::Circle);
        assert_eq!(diagram.find_node("A").map(|n| n.label.as_str()), Some("Alice"));
    }

    #[test]
    fn unsupported_lines_warn() {
        let (diagram, warnings, _) =
            parse_text("sequenceDiagram\nA->>B: ok\nloop every minute\nend");
        assert_eq!(warnings.len(), 2, "{warnings:?}");
        assert!(warnings[0].starts_with("Line 3: unsupported sequenceDiagram syntax"));
        assert_eq!(participants(&diagram), vec!["A", "B"]);
    }

    #[test]
    fn percent_signs_after_the_colon_are_label_text() {
        let (diagram, warnings, _) = parse_text(
            "sequenceDiagram\nparticipant A as \"Ops %% EU\" %% note\nA->>B: 50 %% off\nB->>A %% reply\n",
        );
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(diagram.find_node("A").map(|n| n.label.as_str()), Some("Ops %% EU"));
        let labels: Vec<Option<&str>> = diagram
            .edges
            .iter()
            .filter(|edge| edge.sequence.as_ref().is_some_and(|link| link.part == MessagePart::Label))
            .map(|edge| edge.label.as_deref())
            .collect();
        assert_eq!(labels, vec![Some("50 %% off"), None]);
    }

    #[test]
    fn side_channel_styles_reach_participants() {
        let input = "sequenceDiagram\nA->>B: ok\n%% styles: {\"version\":1,\"entries\":{\"B\":{\"fill\":\"#123456\"}}}";
        let (diagram, _, _) = parse_text(input);
        assert_eq!(diagram.find_node("B").map(|n| n.style.fill.as_str()), Some("#123456"));
    }
}
