//! Line-level helpers shared by the dialect parsers.

use unicode_segmentation::UnicodeSegmentation;

/// Trimmed, numbered lines that carry content. Blank lines and `%%`
/// comments (metadata included) are skipped. Line numbers are 1-based.
pub(crate) fn significant_lines(input: &str) -> impl Iterator<Item = (usize, &str)> {
    input
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !is_comment(line))
}

pub(crate) fn is_comment(line: &str) -> bool {
    line.starts_with("%%")
}

/// First whitespace-delimited word of `line`.
pub(crate) fn first_word(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

#[derive(Default)]
struct Nesting {
    quote: Option<char>,
    square: usize,
    paren: usize,
    brace: usize,
}

impl Nesting {
    /// Feed one character; returns true when it was consumed by a quote.
    fn feed(&mut self, ch: char) -> bool {
        if let Some(quote) = self.quote {
            if ch == quote {
                self.quote = None;
            }
            return true;
        }
        match ch {
            '"' => self.quote = Some(ch),
            '[' => self.square += 1,
            ']' => self.square = self.square.saturating_sub(1),
            '(' => self.paren += 1,
            ')' => self.paren = self.paren.saturating_sub(1),
            '{' => self.brace += 1,
            '}' => self.brace = self.brace.saturating_sub(1),
            _ => {}
        }
        false
    }

    fn is_top_level(&self) -> bool {
        self.quote.is_none() && self.square == 0 && self.paren == 0 && self.brace == 0
    }
}

/// Byte offset of a trailing `%%` comment that starts at top level after
/// whitespace.
pub(crate) fn inline_comment_start(line: &str) -> Option<usize> {
    let mut nesting = Nesting::default();
    let mut previous: Option<char> = None;
    for (index, ch) in line.char_indices() {
        if ch == '%'
            && nesting.is_top_level()
            && previous.is_none_or(char::is_whitespace)
            && line[index..].starts_with("%%")
        {
            return Some(index);
        }
        nesting.feed(ch);
        previous = Some(ch);
    }
    None
}

/// Drop a trailing `%%` comment that starts at top level after whitespace.
pub(crate) fn strip_inline_comment(line: &str) -> &str {
    match inline_comment_start(line) {
        Some(index) => line[..index].trim_end(),
        None => line,
    }
}

/// Split on `;` outside quotes and brackets, dropping empty segments.
pub(crate) fn split_statements(line: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut nesting = Nesting::default();
    let mut start = 0;
    for (index, ch) in line.char_indices() {
        if nesting.feed(ch) {
            continue;
        }
        if ch == ';' && nesting.is_top_level() {
            let segment = line[start..index].trim();
            if !segment.is_empty() {
                statements.push(segment);
            }
            start = index + ch.len_utf8();
        }
    }
    let remainder = line[start..].trim();
    if !remainder.is_empty() {
        statements.push(remainder);
    }
    statements
}

/// Label text as stored on the model: outer quotes stripped, `<br>` line
/// breaks and `#quot;` entities decoded. Blank labels are `None`.
pub(crate) fn clean_label(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(trimmed);
    let decoded = unquoted
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("<br>", "\n")
        .replace("#quot;", "\"");
    let decoded = decoded.trim();
    (!decoded.is_empty()).then(|| decoded.to_string())
}

/// Derive an id from free text such as a multi-word subgraph title.
pub(crate) fn normalize_identifier(raw: &str) -> String {
    let mut id = String::with_capacity(raw.len());
    for grapheme in raw.trim().graphemes(true) {
        if grapheme
            .chars()
            .all(|ch| ch.is_alphanumeric() || matches!(ch, '_' | '-'))
        {
            id.push_str(grapheme);
        } else if !id.ends_with('_') {
            id.push('_');
        }
    }
    id.trim_matches('_').to_string()
}

/// Edit distance, used to hint at misspelled dialect headers.
pub(crate) fn levenshtein(left: &str, right: &str) -> usize {
    let right: Vec<char> = right.chars().collect();
    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0; right.len() + 1];
    for (row, left_char) in left.chars().enumerate() {
        current[0] = row + 1;
        for (column, right_char) in right.iter().enumerate() {
            let substitution = previous[column] + usize::from(left_char != *right_char);
            current[column + 1] = substitution
                .min(previous[column + 1] + 1)
                .min(current[column] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}
