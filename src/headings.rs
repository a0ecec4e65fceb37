//! Heading-path indexing for chunk metadata.
//!
//! Given a normalized Markdown document and a chunk of it, computes the
//! stack of headings enclosing the chunk — the outermost heading first.
//! The path gives retrieval results enough structural context to cite
//! (e.g. `# API Reference > ## Authentication`).

use std::sync::LazyLock;

use regex::Regex;

/// Matches a complete fenced code block: an opening and a closing
/// fence within the same text. A fence opened in one chunk and closed
/// in the next is reported as no-code in both; see [`has_code`].
static FENCE_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*```").unwrap());

/// Compute the heading path enclosing `chunk` within `document`.
///
/// Scans every line before the chunk's first occurrence for ATX
/// headings (`#` through `######` followed by a space and text) and
/// maintains a stack: a heading at level L pops all entries at level
/// >= L before being pushed. The returned path is the final stack,
/// outermost heading first, each entry formatted as the marker plus
/// its text (`"## Usage"`).
///
/// Returns an empty path when `chunk` does not occur verbatim in
/// `document` — a recoverable data-quality condition (normalization
/// drift), never an error. The computation is a pure function of its
/// inputs, so re-chunking a page reproduces identical paths.
pub fn heading_path(document: &str, chunk: &str) -> Vec<String> {
    let Some(pos) = document.find(chunk) else {
        return Vec::new();
    };

    let before = &document[..pos];

    let mut levels: Vec<usize> = Vec::new();
    let mut path: Vec<String> = Vec::new();

    for line in before.lines() {
        let trimmed = line.trim();
        let Some((level, text)) = parse_heading(trimmed) else {
            continue;
        };

        // A heading closes every section at its own level or deeper.
        while levels.last().is_some_and(|&l| l >= level) {
            levels.pop();
            path.pop();
        }

        levels.push(level);
        path.push(format!("{} {}", "#".repeat(level), text));
    }

    path
}

/// Parse an ATX heading line into (level, text). Levels run 1–6; the
/// marker must be followed by a space and non-empty text.
fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let level = line.bytes().take_while(|&b| b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }

    let rest = line[level..].strip_prefix(' ')?;
    let text = rest.trim();
    if text.is_empty() {
        return None;
    }

    Some((level, text))
}

/// Whether `chunk` contains a complete fenced code block.
///
/// Deliberately conservative: only a fence *pair* within the chunk
/// counts, so a block split across adjacent chunks by the splitter is
/// reported as no-code on both sides. Tracking fence state across the
/// whole document was considered and rejected — window boundaries come
/// from the external splitter, so document-level parity would still
/// mis-attribute the block body.
pub fn has_code(chunk: &str) -> bool {
    FENCE_PAIR.is_match(chunk)
}
