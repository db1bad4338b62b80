use crate::detector::Candidate;

const TRUNCATION_MARKER: &str = "# ...";

/// Builds the input side of a pair record: the candidate excerpt plus any
/// documentation comments and decorators immediately above the definition,
/// bounded to `max_bytes`. Pure text slicing; nothing here executes.
pub fn extract(candidate: &Candidate, source: &str, max_bytes: usize) -> String {
    let docs = leading_docs(source, candidate.span.start_line);
    let text = if docs.is_empty() {
        candidate.excerpt.clone()
    } else {
        splice_docs(candidate, source, &docs)
    };
    truncate_closed(&text, max_bytes)
}

/// Comment and decorator lines contiguously preceding `start_line` (1-based).
fn leading_docs(source: &str, start_line: usize) -> Vec<&str> {
    let lines: Vec<&str> = source.lines().collect();
    let mut first = start_line;
    while first > 1 {
        let previous = lines[first - 2].trim_start();
        if previous.starts_with('#') || previous.starts_with('@') {
            first -= 1;
        } else {
            break;
        }
    }
    lines[first - 1..start_line - 1].to_vec()
}

/// The excerpt always ends with the span text, so the doc lines slot in
/// right before it.
fn splice_docs(candidate: &Candidate, source: &str, docs: &[&str]) -> String {
    let span = candidate.span;
    let span_text = &source[span.start_byte..span.end_byte];
    let prefix = candidate
        .excerpt
        .strip_suffix(span_text)
        .unwrap_or_default();
    format!("{}{}\n{}", prefix, docs.join("\n"), span_text)
}

/// Truncates at the last line boundary that fits the budget and leaves no
/// bracket open, then appends a marker line. Bracket depth is a plain
/// character count; string literals containing brackets can fool it, which
/// only ever makes the cut more conservative than needed.
fn truncate_closed(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let budget = max_bytes.saturating_sub(TRUNCATION_MARKER.len() + 1);
    let mut kept = 0;
    let mut depth: i64 = 0;
    let mut cut = 0;
    for line in text.split_inclusive('\n') {
        if kept + line.len() > budget {
            break;
        }
        kept += line.len();
        depth += bracket_delta(line);
        if depth <= 0 {
            cut = kept;
        }
    }

    let mut truncated = text[..cut].trim_end().to_string();
    if !truncated.is_empty() {
        truncated.push('\n');
    }
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

fn bracket_delta(line: &str) -> i64 {
    line.bytes().fold(0, |delta, byte| match byte {
        b'(' | b'[' | b'{' => delta + 1,
        b')' | b']' | b'}' => delta - 1,
        _ => delta,
    })
}
