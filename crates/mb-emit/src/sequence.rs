use std::fmt::Write as _;

use mb_core::{Diagram, SequenceScript};

use crate::{INDENT, escape_label};

/// Participants are declared explicitly so their left-to-right order
/// survives a reparse; aliases are quoted. Each message's edge pair becomes
/// one line.
pub(crate) fn emit(diagram: &Diagram) -> String {
    let script = SequenceScript::from_diagram(diagram);
    let mut output = String::from("sequenceDiagram\n");

    for participant in &script.participants {
        let keyword = if participant.actor { "actor" } else { "participant" };
        if participant.label == participant.id {
            let _ = writeln!(output, "{INDENT}{keyword} {}", participant.id);
        } else {
            let _ = writeln!(
                output,
                "{INDENT}{keyword} {} as \"{}\"",
                participant.id,
                escape_label(&participant.label)
            );
        }
    }

    for message in &script.messages {
        let _ = write!(
            output,
            "{INDENT}{}{}{}",
            message.from,
            message.arrow.sequence_token(),
            message.to
        );
        if let Some(label) = &message.label {
            let _ = write!(output, ": {}", escape_label(label));
        }
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use mb_core::{
        ArrowKind, Dialect, SequenceMessage, SequenceParticipant, SequenceScript, Theme,
    };
    use mb_layout::{SequenceLayoutConfig, layout_sequence};

    use crate::emit;

    fn participant(id: &str, label: &str, actor: bool) -> SequenceParticipant {
        let theme = Theme::default();
        SequenceParticipant {
            id: id.to_string(),
            label: label.to_string(),
            actor,
            style: theme.sequence.node.clone(),
        }
    }

    fn message(from: &str, to: &str, arrow: ArrowKind, label: Option<&str>) -> SequenceMessage {
        SequenceMessage {
            from: from.to_string(),
            to: to.to_string(),
            label: label.map(str::to_string),
            arrow,
        }
    }

    #[test]
    fn messages_collapse_to_one_line_each() {
        let theme = Theme::default();
        let script = SequenceScript {
            participants: vec![
                participant("Alice", "Alice", false),
                participant("U", "End User", true),
            ],
            messages: vec![
                message("Alice", "U", ArrowKind::Solid, Some("Hello")),
                message("U", "Alice", ArrowKind::Dotted, Some("Hi\nthere")),
                message("U", "U", ArrowKind::Open, None),
            ],
        };
        let diagram = layout_sequence(
            &script,
            &SequenceLayoutConfig::default(),
            theme.dialect(Dialect::Sequence),
        )
        .into_diagram();

        let text = emit(&diagram).expect("emit");
        assert_eq!(
            text,
            "sequenceDiagram\n    participant Alice\n    actor U as \"End User\"\n    Alice->>U: Hello\n    U-->>Alice: Hi<br/>there\n    U->U\n"
        );
    }
}
