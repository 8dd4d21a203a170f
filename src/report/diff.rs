//! Revision diff over rendered report HTML.
//!
//! HTML is lexed into tags and text, the token sequences are diffed, and
//! changes are wrapped in `<span class="add">` / `<span class="remove">`.
//! A replaced stretch of text is refined to word level so a one-word edit
//! does not highlight the whole paragraph.

/// Above this many LCS table cells the changed middle is reported as one
/// removal plus one addition instead of being aligned.
const MAX_LCS_CELLS: usize = 4_000_000;

const ADD_CLASS: &str = "add";
const REMOVE_CLASS: &str = "remove";

/// One lexical unit of HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// `<` followed by one or more non-`>` characters and `>`.
    Tag(&'a str),
    Text(&'a str),
}

impl<'a> Token<'a> {
    pub fn as_str(&self) -> &'a str {
        match self {
            Token::Tag(s) | Token::Text(s) => s,
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, Token::Tag(_))
    }
}

/// Split HTML into maximal text runs and tags.
///
/// A `<` that does not open a well-formed tag is ordinary text.
pub fn tokenize(html: &str) -> Vec<Token<'_>> {
    let bytes = html.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'<'
            && let Some(offset) = bytes[i + 1..].iter().position(|&b| b == b'>')
            && offset > 0
        {
            let end = i + 1 + offset;
            if text_start < i {
                tokens.push(Token::Text(&html[text_start..i]));
            }
            tokens.push(Token::Tag(&html[i..=end]));
            i = end + 1;
            text_start = i;
            continue;
        }
        i += 1;
    }
    if text_start < bytes.len() {
        tokens.push(Token::Text(&html[text_start..]));
    }
    tokens
}

/// Tags stay atomic; text splits into words and whitespace runs.
fn word_tokens(html: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    for token in tokenize(html) {
        let Token::Text(text) = token else {
            tokens.push(token);
            continue;
        };
        let mut start = 0;
        let mut in_space: Option<bool> = None;
        for (idx, ch) in text.char_indices() {
            let space = ch.is_whitespace();
            if in_space.is_some_and(|s| s != space) {
                tokens.push(Token::Text(&text[start..idx]));
                start = idx;
            }
            in_space = Some(space);
        }
        if start < text.len() {
            tokens.push(Token::Text(&text[start..]));
        }
    }
    tokens
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Equal,
    Removed,
    Added,
}

#[derive(Debug)]
struct Run<'a> {
    change: Change,
    tokens: Vec<Token<'a>>,
}

impl Run<'_> {
    fn joined(&self) -> String {
        self.tokens.iter().map(Token::as_str).collect()
    }

    fn is_bare_tag(&self) -> bool {
        matches!(self.tokens.as_slice(), [Token::Tag(_)])
    }
}

/// Longest common subsequence of two token slices as matched index pairs.
fn lcs_indices(old: &[Token<'_>], new: &[Token<'_>]) -> Vec<(usize, usize)> {
    let m = old.len();
    let n = new.len();
    let width = n + 1;

    let mut table = vec![0u32; (m + 1) * width];
    for i in 1..=m {
        for j in 1..=n {
            table[i * width + j] = if old[i - 1] == new[j - 1] {
                table[(i - 1) * width + j - 1] + 1
            } else {
                table[(i - 1) * width + j].max(table[i * width + j - 1])
            };
        }
    }

    let mut matches = Vec::new();
    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        if old[i - 1] == new[j - 1] {
            matches.push((i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if table[(i - 1) * width + j] >= table[i * width + j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    matches.reverse();
    matches
}

/// Token-level diff. Between two matches, removals precede additions.
fn diff_tokens<'a>(old: &[Token<'a>], new: &[Token<'a>]) -> Vec<(Change, Token<'a>)> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops: Vec<(Change, Token<'a>)> =
        old[..prefix].iter().map(|t| (Change::Equal, *t)).collect();

    let matches = if old_mid.len().saturating_mul(new_mid.len()) > MAX_LCS_CELLS {
        Vec::new()
    } else {
        lcs_indices(old_mid, new_mid)
    };

    let (mut oi, mut ni) = (0, 0);
    for &(om, nm) in &matches {
        ops.extend(old_mid[oi..om].iter().map(|t| (Change::Removed, *t)));
        ops.extend(new_mid[ni..nm].iter().map(|t| (Change::Added, *t)));
        ops.push((Change::Equal, new_mid[nm]));
        oi = om + 1;
        ni = nm + 1;
    }
    ops.extend(old_mid[oi..].iter().map(|t| (Change::Removed, *t)));
    ops.extend(new_mid[ni..].iter().map(|t| (Change::Added, *t)));

    ops.extend(old[old.len() - suffix..].iter().map(|t| (Change::Equal, *t)));
    ops
}

fn group(ops: Vec<(Change, Token<'_>)>) -> Vec<Run<'_>> {
    let mut runs: Vec<Run<'_>> = Vec::new();
    for (change, token) in ops {
        match runs.last_mut() {
            Some(run) if run.change == change => run.tokens.push(token),
            _ => runs.push(Run {
                change,
                tokens: vec![token],
            }),
        }
    }
    runs
}

fn push_span(out: &mut String, class: &str, content: &str) {
    out.push_str("<span class=\"");
    out.push_str(class);
    out.push_str("\">");
    out.push_str(content);
    out.push_str("</span>");
}

fn flush_stretch(out: &mut String, class: &str, stretch: &mut String) {
    if stretch.trim().is_empty() {
        out.push_str(stretch);
    } else {
        push_span(out, class, stretch);
    }
    stretch.clear();
}

/// Wrap the text stretches of a changed word run, leaving tags outside spans.
fn push_wrapped_text(out: &mut String, class: &str, tokens: &[Token<'_>]) {
    let mut stretch = String::new();
    for token in tokens {
        match token {
            Token::Text(text) => stretch.push_str(text),
            Token::Tag(tag) => {
                flush_stretch(out, class, &mut stretch);
                out.push_str(tag);
            }
        }
    }
    flush_stretch(out, class, &mut stretch);
}

fn word_level_diff(out: &mut String, removed: &str, added: &str) {
    let old = word_tokens(removed);
    let new = word_tokens(added);
    for run in group(diff_tokens(&old, &new)) {
        match run.change {
            Change::Equal => out.push_str(&run.joined()),
            Change::Removed => push_wrapped_text(out, REMOVE_CLASS, &run.tokens),
            Change::Added => push_wrapped_text(out, ADD_CLASS, &run.tokens),
        }
    }
}

/// Annotate `current` with what changed since `previous`.
///
/// Identical input is returned unchanged.
pub fn compute_diff(previous: &str, current: &str) -> String {
    if previous == current {
        return current.to_string();
    }

    let old = tokenize(previous);
    let new = tokenize(current);
    let runs = group(diff_tokens(&old, &new));

    let mut out = String::with_capacity(current.len() + previous.len() / 2);
    let mut i = 0;
    while i < runs.len() {
        let run = &runs[i];
        match run.change {
            Change::Equal => out.push_str(&run.joined()),
            Change::Removed => {
                if let Some(next) = runs.get(i + 1)
                    && next.change == Change::Added
                    && !run.is_bare_tag()
                    && !next.is_bare_tag()
                {
                    word_level_diff(&mut out, &run.joined(), &next.joined());
                    i += 2;
                    continue;
                }
                push_span(&mut out, REMOVE_CLASS, &run.joined());
            }
            Change::Added => push_span(&mut out, ADD_CLASS, &run.joined()),
        }
        i += 1;
    }
    out
}
