#![forbid(unsafe_code)]

//! mb-cli: convert flowchart, ER and sequence diagram text to graphs and back.
//!
//! # Commands
//!
//! - `parse`: Text to graph JSON
//! - `emit`: Graph JSON to text with metadata lines
//! - `format`: Parse and emit again, normalizing the text
//! - `layout`: Parse, discard saved positions, lay out and emit
//! - `detect`: Show the detected dialect and how it was chosen
//! - `validate`: Report parse warnings and graph errors

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mb_core::{Diagram, GraphError, Theme};
use mb_emit::emit_with_theme;
use mb_parser::{ParseResult, detect, parse_with_theme, relayout, summary_json};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Convert Mermaid-like diagram text to graphs and back.
#[derive(Debug, Parser)]
#[command(
    name = "mb-cli",
    version,
    about = "Convert Mermaid-like diagram text to graphs and back",
    long_about = "Parses flowchart, erDiagram and sequenceDiagram text into a positioned graph\n\
        and emits graphs back as text. Positions, styles and edge extras that the\n\
        grammar cannot express travel in `%% layout:`, `%% styles:` and `%% edges:` lines."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging (can be repeated for more detail: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Theme preset (default, light, dark) or a JSON/TOML theme file.
    #[arg(long, global = true)]
    theme: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a diagram and output the graph as JSON.
    Parse {
        /// Input file path, "-" for stdin, or inline diagram text.
        #[arg(default_value = "-")]
        input: String,

        /// Output counts and warnings instead of the full graph
        #[arg(long)]
        summary: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Emit diagram text from graph JSON (a graph or a `parse` result).
    Emit {
        /// Graph JSON file path or "-" for stdin.
        #[arg(default_value = "-")]
        input: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Parse and emit again, writing normalized text with metadata.
    Format {
        /// Input file path, "-" for stdin, or inline diagram text.
        #[arg(default_value = "-")]
        input: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Ignore saved positions, lay the graph out again and emit it.
    Layout {
        /// Input file path, "-" for stdin, or inline diagram text.
        #[arg(default_value = "-")]
        input: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Detect the dialect and show how it was chosen.
    Detect {
        /// Input file path, "-" for stdin, or inline diagram text.
        #[arg(default_value = "-")]
        input: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a diagram and report diagnostics.
    Validate {
        /// Input file path, "-" for stdin, or inline diagram text.
        #[arg(default_value = "-")]
        input: String,

        /// Output as JSON (structured diagnostics)
        #[arg(long)]
        json: bool,

        /// Exit with non-zero status on warnings (not just errors)
        #[arg(long)]
        strict: bool,
    },
}

/// Result of detecting the dialect.
#[derive(Debug, Serialize)]
struct DetectResult {
    dialect: String,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    first_line: String,
    warnings: Vec<String>,
}

/// Result of validating a diagram.
#[derive(Debug, Serialize)]
struct ValidateResult {
    valid: bool,
    dialect: String,
    node_count: usize,
    edge_count: usize,
    warnings: Vec<ValidationWarning>,
    errors: Vec<ValidationError>,
}

#[derive(Debug, Serialize)]
struct ValidationWarning {
    code: String,
    message: String,
    line: Option<usize>,
    suggestion: Option<String>,
}

#[derive(Debug, Serialize)]
struct ValidationError {
    code: String,
    message: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);
    let theme = load_theme(cli.theme.as_deref())?;

    match cli.command {
        Command::Parse {
            input,
            summary,
            pretty,
        } => cmd_parse(&input, &theme, summary, pretty),

        Command::Emit { input, output } => cmd_emit(&input, &theme, output.as_deref()),

        Command::Format { input, output } => cmd_format(&input, &theme, output.as_deref()),

        Command::Layout { input, output } => cmd_layout(&input, &theme, output.as_deref()),

        Command::Detect { input, json } => cmd_detect(&input, json),

        Command::Validate {
            input,
            json,
            strict,
        } => cmd_validate(&input, &theme, json, strict),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .try_init();
}

/// A preset name, or a theme file decoded by its extension.
fn load_theme(theme: Option<&str>) -> Result<Theme> {
    let Some(theme) = theme else {
        return Ok(Theme::default());
    };

    let path = Path::new(theme);
    if !path.is_file() {
        return Theme::preset(theme).context(format!("Not a theme file or preset: {theme}"));
    }

    let text =
        std::fs::read_to_string(path).context(format!("Failed to read theme: {theme}"))?;
    let decoded: Theme = match path.extension().and_then(|extension| extension.to_str()) {
        Some("toml") => {
            toml::from_str(&text).context(format!("Failed to decode TOML theme: {theme}"))?
        }
        _ => Theme::from_json(&text).context(format!("Failed to decode JSON theme: {theme}"))?,
    };
    debug!(path = theme, "loaded theme file");
    Ok(decoded)
}

fn load_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        Ok(buffer)
    } else if Path::new(input).exists() {
        std::fs::read_to_string(input).context(format!("Failed to read file: {input}"))
    } else {
        // Treat as inline diagram text
        Ok(input.to_string())
    }
}

fn write_output(output: Option<&str>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content).context(format!("Failed to write to: {path}"))?;
            info!("Wrote output to: {path}");
        }
        None => {
            io::stdout()
                .write_all(content.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

fn parse_source(source: &str, theme: &Theme) -> ParseResult {
    let started = Instant::now();
    let parsed = parse_with_theme(source, theme);
    for warning in &parsed.warnings {
        warn!("{warning}");
    }
    info!(
        dialect = parsed.diagram.dialect.as_str(),
        nodes = parsed.diagram.nodes.len(),
        edges = parsed.diagram.edges.len(),
        layout = ?parsed.layout,
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "parsed input"
    );
    parsed
}

// =============================================================================
// Command: parse
// =============================================================================

fn cmd_parse(input: &str, theme: &Theme, summary: bool, pretty: bool) -> Result<()> {
    let source = load_input(input)?;
    let parsed = parse_source(&source, theme);

    let json = if summary {
        summary_json(&parsed)
    } else if pretty {
        serde_json::to_string_pretty(&parsed)?
    } else {
        serde_json::to_string(&parsed)?
    };
    println!("{json}");
    Ok(())
}

// =============================================================================
// Commands: emit, format, layout
// =============================================================================

fn cmd_emit(input: &str, theme: &Theme, output: Option<&str>) -> Result<()> {
    let source = load_input(input)?;
    let mut document: serde_json::Value =
        serde_json::from_str(&source).context("Input is not JSON")?;
    // `parse` output nests the graph under `diagram`.
    if let Some(diagram) = document.get_mut("diagram") {
        document = diagram.take();
    }
    let diagram: Diagram =
        serde_json::from_value(document).context("Input is not a graph document")?;

    let text = emit_with_theme(&diagram, theme)?;
    write_output(output, &text)
}

fn cmd_format(input: &str, theme: &Theme, output: Option<&str>) -> Result<()> {
    let source = load_input(input)?;
    let parsed = parse_source(&source, theme);
    let text = emit_with_theme(&parsed.diagram, theme)?;
    write_output(output, &text)
}

fn cmd_layout(input: &str, theme: &Theme, output: Option<&str>) -> Result<()> {
    let source = load_input(input)?;
    let mut parsed = parse_source(&source, theme);

    let started = Instant::now();
    let outcome = relayout(&mut parsed.diagram, theme);
    info!(
        outcome = ?outcome,
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "laid out diagram"
    );

    let text = emit_with_theme(&parsed.diagram, theme)?;
    write_output(output, &text)
}

// =============================================================================
// Command: detect
// =============================================================================

fn cmd_detect(input: &str, json_output: bool) -> Result<()> {
    let source = load_input(input)?;
    let detection = detect(&source);

    let first_line = source
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("%%"))
        .unwrap_or("");

    let result = DetectResult {
        dialect: detection.dialect.as_str().to_string(),
        method: detection.method.as_str().to_string(),
        line: detection.line,
        first_line: first_line.chars().take(100).collect(),
        warnings: detection.warnings,
    };

    if json_output {
        let output = serde_json::to_string_pretty(&result)?;
        println!("{output}");
    } else {
        println!("Dialect:      {}", result.dialect);
        println!("Method:       {}", result.method);
        if let Some(line) = result.line {
            println!("Line:         {line}");
        }
        if !result.first_line.is_empty() {
            println!(
                "First line:   {}",
                result.first_line.chars().take(60).collect::<String>()
            );
        }
        for warning in &result.warnings {
            println!("Warning:      {warning}");
        }
    }

    Ok(())
}

// =============================================================================
// Command: validate
// =============================================================================

fn cmd_validate(input: &str, theme: &Theme, json_output: bool, strict: bool) -> Result<()> {
    let source = load_input(input)?;
    let parsed = parse_with_theme(&source, theme);

    let warnings: Vec<ValidationWarning> = parsed
        .warnings
        .iter()
        .map(|message| ValidationWarning {
            code: categorize_warning(message).to_string(),
            message: message.clone(),
            line: warning_line(message),
            suggestion: suggest_fix(message),
        })
        .collect();

    let mut errors = Vec::new();
    if let Err(error) = parsed.diagram.validate() {
        errors.push(ValidationError {
            code: graph_error_code(&error).to_string(),
            message: error.to_string(),
        });
    }
    if parsed.diagram.nodes.is_empty() {
        errors.push(ValidationError {
            code: "E005".to_string(),
            message: "Diagram has no nodes".to_string(),
        });
    }

    let valid = errors.is_empty() && (!strict || warnings.is_empty());

    let result = ValidateResult {
        valid,
        dialect: parsed.diagram.dialect.as_str().to_string(),
        node_count: parsed.diagram.nodes.len(),
        edge_count: parsed.diagram.edges.len(),
        warnings,
        errors,
    };

    if json_output {
        let output = serde_json::to_string_pretty(&result)?;
        println!("{output}");
    } else {
        if result.valid {
            println!("Valid {} diagram", result.dialect);
        } else {
            println!("Invalid diagram");
        }

        println!("  Nodes: {}", result.node_count);
        println!("  Edges: {}", result.edge_count);

        if !result.errors.is_empty() {
            println!("\nErrors:");
            for err in &result.errors {
                println!("  [{}] {}", err.code, err.message);
            }
        }

        if !result.warnings.is_empty() {
            println!("\nWarnings:");
            for warning in &result.warnings {
                println!("  [{}] {}", warning.code, warning.message);
                if let Some(suggestion) = &warning.suggestion {
                    println!("       hint: {suggestion}");
                }
            }
        }
    }

    if !result.valid {
        std::process::exit(1);
    }

    Ok(())
}

fn categorize_warning(message: &str) -> &'static str {
    let lower = message.to_lowercase();

    if lower.contains("unsupported") {
        "W001"
    } else if lower.contains("malformed") || lower.contains("unknown relationship") {
        "W002"
    } else if lower.contains("misspelled") {
        "W003"
    } else if lower.contains("subgraph") || lower.contains("ended") {
        "W004"
    } else if lower.contains("unknown node") {
        "W005"
    } else {
        "W000"
    }
}

/// The `N` of a `Line N: ...` diagnostic.
fn warning_line(message: &str) -> Option<usize> {
    let rest = message.strip_prefix("Line ")?;
    let (number, _) = rest.split_once(':')?;
    number.parse().ok()
}

fn suggest_fix(message: &str) -> Option<String> {
    let lower = message.to_lowercase();

    if lower.contains("misspelled") {
        Some("Correct the header keyword on the first line".to_string())
    } else if lower.contains("unclosed subgraph") || lower.contains("without matching") {
        Some("Pair every 'subgraph' with one 'end'".to_string())
    } else if lower.contains("inside entity block") {
        Some("Close the entity block with '}'".to_string())
    } else if lower.contains("malformed attribute") {
        Some("Attribute rows read `type name [PK|FK|UK] [\"comment\"]`".to_string())
    } else if lower.contains("unknown node") {
        Some("Declare the node before styling it".to_string())
    } else {
        None
    }
}

const fn graph_error_code(error: &GraphError) -> &'static str {
    match error {
        GraphError::DuplicateNode { .. } => "E001",
        GraphError::DanglingEdge { .. } => "E002",
        GraphError::UnknownParent { .. } => "E003",
        GraphError::ParentNotGroup { .. } => "E004",
    }
}

#[cfg(test)]
mod tests {
    use super::{categorize_warning, load_theme, suggest_fix, warning_line};
    use mb_core::Theme;

    #[test]
    fn warning_lines_come_from_the_prefix() {
        assert_eq!(warning_line("Line 12: unsupported flowchart syntax: ???"), Some(12));
        assert_eq!(warning_line("Flowchart ended with unclosed subgraph `G`"), None);
        assert_eq!(warning_line("Line x: nope"), None);
    }

    #[test]
    fn warnings_are_categorized() {
        assert_eq!(categorize_warning("Line 2: unsupported flowchart syntax: ?"), "W001");
        assert_eq!(categorize_warning("Line 4: malformed attribute row: x"), "W002");
        assert_eq!(
            categorize_warning("Line 1: `flowchrt` looks like a misspelled `flowchart` header (flowchart); reading as flowchart"),
            "W003"
        );
        assert_eq!(categorize_warning("Line 3: style targets unknown node `Z`"), "W005");
        assert!(suggest_fix("Line 3: style targets unknown node `Z`").is_some());
        assert_eq!(suggest_fix("something else"), None);
    }

    #[test]
    fn themes_resolve_presets() {
        assert_eq!(load_theme(None).ok(), Some(Theme::default()));
        assert_eq!(load_theme(Some("dark")).ok(), Some(Theme::dark()));
        assert!(load_theme(Some("neon")).is_err());
    }
}
