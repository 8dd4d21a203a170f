//! Terminal rendering for chat messages, the report pane and evaluations.
//!
//! Report and evaluation HTML is laid out by html2text and styled with ANSI
//! escapes: `add` spans render green, `remove` spans red and struck through.

use crate::playback::PlaybackSettings;
use crate::report::diff::{Token, tokenize};
use crate::stream::{ConversationEvent, Speaker};
use html2text::render::text_renderer::RichAnnotation;

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const ITALIC: &str = "\x1b[3m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const MAGENTA: &str = "\x1b[35m";
const RESET: &str = "\x1b[0m";
const STRIKETHROUGH: &str = "\x1b[9m";

/// Clear the current terminal line (replaces status lines)
pub fn clear_line() {
    eprint!("\r\x1b[2K");
}

fn speaker_style(speaker: Speaker) -> &'static str {
    match speaker {
        Speaker::Interviewer => CYAN,
        Speaker::InterviewerThinking => DIM,
        Speaker::Patient => MAGENTA,
        Speaker::Report => BOLD,
    }
}

/// One chat line: colored speaker label, then the message.
pub fn render_message(event: &ConversationEvent) -> String {
    let style = speaker_style(event.speaker);
    match event.speaker {
        Speaker::InterviewerThinking => {
            format!("{DIM}{ITALIC}{}: {}{RESET}", event.speaker.label(), event.text.trim())
        }
        _ => format!(
            "{style}{BOLD}{}:{RESET} {}",
            event.speaker.label(),
            event.text.trim()
        ),
    }
}

/// Report pane block with a revision header.
pub fn render_report(view_html: &str, revision: usize) -> String {
    let rule = "─".repeat(24);
    let header = format!("{rule} report revision {revision} {rule}");
    let footer = "─".repeat(header.chars().count());
    format!(
        "{DIM}{header}{RESET}\n{}\n{DIM}{footer}{RESET}",
        html_to_terminal(view_html)
    )
}

pub fn render_settings(settings: PlaybackSettings) -> String {
    let audio = if settings.audio_enabled { "on" } else { "off" };
    format!("{DIM}[audio {audio}, pace {}]{RESET}", settings.pace)
}

/// Tag name in lowercase, without `/` or attributes.
fn tag_name(tag: &str) -> (String, bool) {
    let inner = tag.trim_start_matches('<').trim_end_matches('>');
    let closing = inner.starts_with('/');
    let name = inner
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    (name, closing)
}

fn has_class(tag: &str, class: &str) -> bool {
    tag.contains(&format!("class=\"{class}\"")) || tag.contains(&format!("class='{class}'"))
}

/// Wrap width for rendered report and evaluation HTML.
const RENDER_WIDTH: usize = 100;

// Classed elements survive html2text as private-use marker characters.
const ADD_MARK: char = '\u{E000}';
const REMOVE_MARK: char = '\u{E001}';
const HELPFUL_MARK: char = '\u{E002}';
const MISSING_MARK: char = '\u{E003}';
const END_MARK: char = '\u{E00F}';

fn class_mark(tag: &str) -> Option<char> {
    [
        ("add", ADD_MARK),
        ("remove", REMOVE_MARK),
        ("helpful", HELPFUL_MARK),
        ("missing", MISSING_MARK),
    ]
    .into_iter()
    .find(|(class, _)| has_class(tag, class))
    .map(|(_, mark)| mark)
}

fn mark_style(mark: char) -> &'static str {
    match mark {
        ADD_MARK => GREEN,
        REMOVE_MARK => "\x1b[31m\x1b[9m",
        HELPFUL_MARK => "\x1b[1m\x1b[32m",
        MISSING_MARK => "\x1b[1m\x1b[33m",
        _ => "",
    }
}

/// Insert marker characters just inside classed `span` and heading elements.
fn mark_classes(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut open: Vec<(String, bool)> = Vec::new();

    for token in tokenize(html) {
        let tag = match token {
            Token::Text(text) => {
                out.push_str(text);
                continue;
            }
            Token::Tag(tag) => tag,
        };
        let (name, closing) = tag_name(tag);
        if !matches!(
            name.as_str(),
            "span" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
        ) {
            out.push_str(tag);
            continue;
        }

        if closing {
            if open.last().is_some_and(|(open_name, _)| *open_name == name)
                && let Some((_, true)) = open.pop()
            {
                out.push(END_MARK);
            }
            out.push_str(tag);
        } else {
            out.push_str(tag);
            let mark = class_mark(tag);
            if let Some(mark) = mark {
                out.push(mark);
            }
            open.push((name, mark.is_some()));
        }
    }
    out
}

fn annotation_style(annotations: &[RichAnnotation]) -> String {
    annotations
        .iter()
        .map(|annotation| match annotation {
            RichAnnotation::Strong => BOLD,
            RichAnnotation::Emphasis => ITALIC,
            RichAnnotation::Strikeout => STRIKETHROUGH,
            RichAnnotation::Code => CYAN,
            _ => "",
        })
        .collect()
}

/// Emit the active style from scratch; returns whether anything is styled.
fn restyle(out: &mut String, styled: bool, marks: &[&'static str], annotation: &str) -> bool {
    if styled {
        out.push_str(RESET);
    }
    for style in marks {
        out.push_str(style);
    }
    out.push_str(annotation);
    !marks.is_empty() || !annotation.is_empty()
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    for ch in text.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines > 2 {
                continue;
            }
        } else {
            newlines = 0;
        }
        out.push(ch);
    }
    out.trim_matches('\n').to_string()
}

/// Render report or evaluation HTML as ANSI-styled text.
///
/// Layout and entity decoding come from html2text; `add`/`remove` spans and
/// `helpful`/`missing` headings get their colors on top.
pub fn html_to_terminal(html: &str) -> String {
    let marked = mark_classes(html);
    let lines = html2text::from_read_rich(marked.as_bytes(), RENDER_WIDTH);

    let mut out = String::with_capacity(html.len());
    let mut marks: Vec<&'static str> = Vec::new();
    for line in &lines {
        let mut rendered = String::new();
        let mut styled = false;
        for piece in line.tagged_strings() {
            let annotation = annotation_style(&piece.tag);
            styled = restyle(&mut rendered, styled, &marks, &annotation);
            for ch in piece.s.chars() {
                match ch {
                    ADD_MARK | REMOVE_MARK | HELPFUL_MARK | MISSING_MARK => {
                        marks.push(mark_style(ch));
                        styled = restyle(&mut rendered, styled, &marks, &annotation);
                    }
                    END_MARK => {
                        marks.pop();
                        styled = restyle(&mut rendered, styled, &marks, &annotation);
                    }
                    _ => rendered.push(ch),
                }
            }
        }
        if styled {
            rendered.push_str(RESET);
        }
        out.push_str(rendered.trim_end());
        out.push('\n');
    }
    collapse_blank_lines(&out)
}

/// Strip ANSI escape sequences (for width calculations and tests).
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        out.push(ch);
    }
    out
}

/// Status line for a finished or stalled interview.
pub fn render_status(message: &str, ok: bool) -> String {
    let color = if ok { GREEN } else { YELLOW };
    format!("{color}{message}{RESET}")
}

/// Error line.
pub fn render_error(message: &str) -> String {
    format!("{RED}{message}{RESET}")
}
