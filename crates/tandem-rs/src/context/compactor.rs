//! Head-and-tail text compaction.
//!
//! [`compact`] shrinks text to a character budget, keeping whole lines from
//! the top (about 40% of the budget) and from the bottom (about 30%) and
//! replacing the middle with a single marker line. The top of a file holds
//! its structure and imports; the bottom is usually what was edited last.
//!
//! Results never exceed the budget once the budget can hold the marker, so
//! compacting twice gives the same text as compacting once.

/// Marker line replacing the omitted middle.
pub const TRUNCATION_MARKER: &str = "[... truncated ...]";

/// Marker appended when only a hard cut fits.
pub const HARD_TRUNCATION_MARKER: &str = "[truncated]";

/// Characters the middle marker adds: the marker and its two newlines.
pub const MARKER_OVERHEAD: usize = TRUNCATION_MARKER.len() + 2;

/// Content characters needed beside the marker for head/tail compaction.
const MIN_CONTENT_CHARS: usize = 2;

/// Shrink `text` to at most `max_chars` characters.
pub fn compact(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    if max_chars < MARKER_OVERHEAD + MIN_CONTENT_CHARS {
        return hard_truncate(text, max_chars);
    }

    let available = max_chars - MARKER_OVERHEAD;
    let head_budget = (max_chars * 2 / 5).min(available * 4 / 7);
    let tail_budget = (max_chars * 3 / 10).min(available - head_budget);

    let lines: Vec<&str> = text.split('\n').collect();
    let (head, head_lines) = take_head(&lines, head_budget);
    let tail = take_tail(&lines[head_lines..], tail_budget);

    let compacted = format!("{head}\n{TRUNCATION_MARKER}\n{tail}");
    if compacted.chars().count() > max_chars {
        return hard_truncate(text, max_chars);
    }
    compacted
}

/// Cut `text` to `max_chars`, ending with [`HARD_TRUNCATION_MARKER`] when
/// there is room for it.
pub fn hard_truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let marker_len = HARD_TRUNCATION_MARKER.len();
    if max_chars <= marker_len {
        return text.chars().take(max_chars).collect();
    }
    let mut out: String = text.chars().take(max_chars - marker_len).collect();
    out.push_str(HARD_TRUNCATION_MARKER);
    out
}

/// Greedily keep leading lines within `budget`. Falls back to a prefix of
/// the first line when no whole line fits. Returns the text and the number
/// of whole lines consumed.
fn take_head(lines: &[&str], budget: usize) -> (String, usize) {
    let mut out = String::new();
    let mut used = 0;
    let mut count = 0;
    for line in lines {
        let cost = line.chars().count() + usize::from(count > 0);
        if used + cost > budget {
            break;
        }
        if count > 0 {
            out.push('\n');
        }
        out.push_str(line);
        used += cost;
        count += 1;
    }
    if count == 0
        && let Some(first) = lines.first()
    {
        out = first.chars().take(budget).collect();
    }
    (out, count)
}

/// Greedily keep trailing lines within `budget`. Falls back to a suffix of
/// the last line when no whole line fits.
fn take_tail(lines: &[&str], budget: usize) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut used = 0;
    for line in lines.iter().rev() {
        let cost = line.chars().count() + usize::from(!kept.is_empty());
        if used + cost > budget {
            break;
        }
        kept.push(line);
        used += cost;
    }
    if kept.is_empty() {
        let Some(last) = lines.last() else {
            return String::new();
        };
        let skip = last.chars().count().saturating_sub(budget);
        return last.chars().skip(skip).collect();
    }
    kept.reverse();
    kept.join("\n")
}
