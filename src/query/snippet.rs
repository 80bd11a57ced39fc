//! Snippet assembly from verified match spans.
//!
//! Verification produces byte spans into the file; this module turns
//! them into line-oriented snippets: each matching line carries its
//! 1-based line number, the byte offset of the line start, the line text,
//! and the match spans relative to the line. Matches on nearby lines
//! merge into one contiguous snippet padded with context lines.

use memchr::memchr_iter;

/// One line inside a snippet. Context lines carry no spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetLine {
    /// 1-based; 0 marks the synthetic path-match line.
    pub line_number: u32,
    /// Byte offset of the line start within the file.
    pub byte_offset: u64,
    pub text: String,
    /// (start, end) byte ranges of matches within this line.
    pub spans: Vec<(u32, u32)>,
}

/// A contiguous block of lines around one or more matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub lines: Vec<SnippetLine>,
}

impl Snippet {
    /// The synthetic snippet for a query that matches the file path
    /// itself rather than its contents.
    pub fn for_path(path: &str, span: (u32, u32)) -> Self {
        Self {
            lines: vec![SnippetLine {
                line_number: 0,
                byte_offset: 0,
                text: path.to_string(),
                spans: vec![span],
            }],
        }
    }

    /// Number of match spans across all lines.
    pub fn match_count(&self) -> usize {
        self.lines.iter().map(|l| l.spans.len()).sum()
    }
}

/// (start, end) byte ranges of every line, excluding the terminator.
fn line_table(content: &[u8]) -> Vec<(usize, usize)> {
    let mut lines = Vec::new();
    let mut start = 0;
    for nl in memchr_iter(b'\n', content) {
        lines.push((start, nl));
        start = nl + 1;
    }
    if start < content.len() {
        lines.push((start, content.len()));
    }
    lines
}

/// Build snippets for match spans within `content`.
///
/// A match spanning a line break is attributed to its first line. Matches
/// whose context windows touch are merged into one snippet; at most
/// `max_snippets` snippets are returned.
pub fn build_snippets(
    content: &[u8],
    matches: &[(usize, usize)],
    context_lines: usize,
    max_snippets: usize,
) -> Vec<Snippet> {
    if matches.is_empty() || max_snippets == 0 {
        return Vec::new();
    }

    let lines = line_table(content);
    if lines.is_empty() {
        return Vec::new();
    }

    // Attribute each span to the line holding its first byte
    let mut per_line: Vec<(usize, (u32, u32))> = Vec::with_capacity(matches.len());
    for &(start, end) in matches {
        let line_idx = match lines.partition_point(|&(s, _)| s <= start) {
            0 => 0,
            n => n - 1,
        };
        let (line_start, line_end) = lines[line_idx];
        let span_start = start.saturating_sub(line_start) as u32;
        let span_end = (end.min(line_end)).saturating_sub(line_start) as u32;
        per_line.push((line_idx, (span_start, span_end.max(span_start))));
    }
    per_line.sort_by_key(|&(idx, span)| (idx, span));

    // Group matching lines whose context windows touch
    let mut groups: Vec<Vec<(usize, (u32, u32))>> = Vec::new();
    for entry in per_line {
        match groups.last_mut() {
            Some(group)
                if entry.0 - group.last().unwrap().0 <= 2 * context_lines + 1 =>
            {
                group.push(entry);
            }
            _ => groups.push(vec![entry]),
        }
    }
    groups.truncate(max_snippets);

    let mut snippets = Vec::with_capacity(groups.len());
    for group in groups {
        let first_match = group.first().unwrap().0;
        let last_match = group.last().unwrap().0;
        let block_start = first_match.saturating_sub(context_lines);
        let block_end = (last_match + context_lines).min(lines.len() - 1);

        let mut snippet_lines = Vec::with_capacity(block_end - block_start + 1);
        for idx in block_start..=block_end {
            let (start, end) = lines[idx];
            let spans: Vec<(u32, u32)> = group
                .iter()
                .filter(|&&(line_idx, _)| line_idx == idx)
                .map(|&(_, span)| span)
                .collect();
            snippet_lines.push(SnippetLine {
                line_number: idx as u32 + 1,
                byte_offset: start as u64,
                text: String::from_utf8_lossy(&content[start..end]).into_owned(),
                spans,
            });
        }
        snippets.push(Snippet { lines: snippet_lines });
    }

    snippets
}
