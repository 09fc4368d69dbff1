//! Message Parser
//!
//! Turns the raw text accumulated for a turn into display parts. The backend
//! marks model reasoning with `<think>` / `</think>` and inline tool invocations
//! with `<tool_call>` / `</tool_call>`; everything else is plain text.
//!
//! # Design Philosophy
//!
//! Parsing is total. A delimiter that cannot be matched (a closer without an
//! opener, a tag inside a block that is not its closer, a tag cut in half by a
//! chunk boundary) stays in the output as literal text instead of being
//! rejected. Because the parser always runs over the *whole* accumulated text,
//! a delimiter split across two chunks is recognized as soon as the second
//! chunk lands.
//!
//! Work is split in two passes:
//! - [`tokenize`]: a small lexer producing [`Token`]s
//! - [`parse`]: folds tokens into [`MessagePart`]s, tracking at most one open block

use serde::{Deserialize, Serialize};

/// Opens a reasoning block
pub const THINK_OPEN: &str = "<think>";
/// Closes a reasoning block
pub const THINK_CLOSE: &str = "</think>";
/// Opens an inline tool-call marker
pub const TOOL_CALL_OPEN: &str = "<tool_call>";
/// Closes an inline tool-call marker
pub const TOOL_CALL_CLOSE: &str = "</tool_call>";

/// Kind of delimited block
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    /// Model reasoning
    Thinking,
    /// Inline tool invocation marker
    ToolCall,
}

impl BlockKind {
    /// Opening delimiter for this block kind
    #[must_use]
    pub fn opener(self) -> &'static str {
        match self {
            Self::Thinking => THINK_OPEN,
            Self::ToolCall => TOOL_CALL_OPEN,
        }
    }

    /// Closing delimiter for this block kind
    #[must_use]
    pub fn closer(self) -> &'static str {
        match self {
            Self::Thinking => THINK_CLOSE,
            Self::ToolCall => TOOL_CALL_CLOSE,
        }
    }
}

/// Lexical token over raw turn text
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'a> {
    /// Run of text containing no recognized delimiter
    Text(&'a str),
    /// Opening delimiter
    Open(BlockKind),
    /// Closing delimiter
    Close(BlockKind),
}

impl Token<'_> {
    /// The source text this token was lexed from
    #[must_use]
    pub fn literal(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Open(kind) => kind.opener(),
            Self::Close(kind) => kind.closer(),
        }
    }
}

const DELIMITERS: [(&str, Token<'static>); 4] = [
    (THINK_OPEN, Token::Open(BlockKind::Thinking)),
    (THINK_CLOSE, Token::Close(BlockKind::Thinking)),
    (TOOL_CALL_OPEN, Token::Open(BlockKind::ToolCall)),
    (TOOL_CALL_CLOSE, Token::Close(BlockKind::ToolCall)),
];

/// A display segment of a turn
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePart {
    /// Answer text
    Text(String),
    /// Reasoning block
    Thinking {
        /// Reasoning text (delimiters stripped)
        content: String,
        /// True while the closing delimiter has not arrived yet
        is_open: bool,
    },
    /// Inline tool invocation
    ToolCall(String),
}

impl MessagePart {
    /// Text carried by this part (tool name for tool calls)
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Text(content) | Self::ToolCall(content) => content,
            Self::Thinking { content, .. } => content,
        }
    }

    /// Whether this is a reasoning block still being streamed
    #[must_use]
    pub fn is_open_thinking(&self) -> bool {
        matches!(self, Self::Thinking { is_open: true, .. })
    }
}

/// Split raw text into tokens
///
/// Only the four known delimiters are tokens; every other `<` is text.
#[must_use]
pub fn tokenize(raw: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(offset) = raw[cursor..].find('<') {
        let at = cursor + offset;
        if let Some((token, len)) = match_delimiter(&raw[at..]) {
            if at > text_start {
                tokens.push(Token::Text(&raw[text_start..at]));
            }
            tokens.push(token);
            cursor = at + len;
            text_start = cursor;
        } else {
            // '<' is a single byte, so this stays on a char boundary
            cursor = at + 1;
        }
    }

    if text_start < raw.len() {
        tokens.push(Token::Text(&raw[text_start..]));
    }

    tokens
}

fn match_delimiter(rest: &str) -> Option<(Token<'static>, usize)> {
    DELIMITERS
        .iter()
        .find(|(tag, _)| rest.starts_with(tag))
        .map(|(tag, token)| (*token, tag.len()))
}

/// Block opened but not yet closed while folding tokens
struct OpenBlock {
    kind: BlockKind,
    body: String,
}

impl OpenBlock {
    fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            body: String::new(),
        }
    }

    fn close(self) -> MessagePart {
        match self.kind {
            BlockKind::Thinking => MessagePart::Thinking {
                content: self.body,
                is_open: false,
            },
            BlockKind::ToolCall => MessagePart::ToolCall(self.body),
        }
    }
}

/// Parse raw turn text into display parts
///
/// Pure and total: any input yields a valid (possibly empty) sequence, and
/// every character of the input outside recognized delimiters is kept.
#[must_use]
pub fn parse(raw: &str) -> Vec<MessagePart> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut block: Option<OpenBlock> = None;

    for token in tokenize(raw) {
        block = match (block, token) {
            (None, Token::Text(fragment)) => {
                text.push_str(fragment);
                None
            }
            (None, Token::Open(kind)) => {
                flush_text(&mut parts, &mut text);
                Some(OpenBlock::new(kind))
            }
            (None, Token::Close(kind)) => {
                text.push_str(kind.closer());
                None
            }
            (Some(open), Token::Close(kind)) if open.kind == kind => {
                parts.push(open.close());
                None
            }
            (Some(mut open), other) => {
                open.body.push_str(other.literal());
                Some(open)
            }
        };
    }

    match block {
        Some(open) if open.kind == BlockKind::Thinking => {
            flush_text(&mut parts, &mut text);
            parts.push(MessagePart::Thinking {
                content: open.body,
                is_open: true,
            });
        }
        Some(open) => {
            // Unterminated tool marker degrades to the literal text
            text.push_str(open.kind.opener());
            text.push_str(&open.body);
            flush_text(&mut parts, &mut text);
        }
        None => flush_text(&mut parts, &mut text),
    }

    parts
}

/// Whether the last unterminated block opener in `raw` opens a reasoning block
#[must_use]
pub fn is_currently_thinking(raw: &str) -> bool {
    parse(raw)
        .last()
        .is_some_and(MessagePart::is_open_thinking)
}

/// Move pending text into `parts`, merging with a trailing text part
fn flush_text(parts: &mut Vec<MessagePart>, text: &mut String) {
    if text.is_empty() {
        return;
    }

    let segment = std::mem::take(text);
    match parts.last_mut() {
        Some(MessagePart::Text(previous)) => previous.push_str(&segment),
        _ => parts.push(MessagePart::Text(segment)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> MessagePart {
        MessagePart::Text(s.to_string())
    }

    fn thinking(s: &str, is_open: bool) -> MessagePart {
        MessagePart::Thinking {
            content: s.to_string(),
            is_open,
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(parse("").is_empty());
        assert!(!is_currently_thinking(""));
    }

    #[test]
    fn test_whitespace_between_blocks_is_kept() {
        assert_eq!(parse("  \n "), vec![text("  \n ")]);
        assert_eq!(
            parse("<think>a</think>\n\n<tool_call>x</tool_call>"),
            vec![
                thinking("a", false),
                text("\n\n"),
                MessagePart::ToolCall("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_plain_text_is_untouched() {
        let raw = "a < b and c > d, <b>bold</b>";
        assert_eq!(parse(raw), vec![text(raw)]);
    }

    #[test]
    fn test_closed_thinking_then_answer() {
        let parts = parse("<think>Let me see...</think>answer");
        assert_eq!(parts, vec![thinking("Let me see...", false), text("answer")]);
    }

    #[test]
    fn test_open_thinking_at_end() {
        let raw = "<think>still reasoning";
        assert_eq!(parse(raw), vec![thinking("still reasoning", true)]);
        assert!(is_currently_thinking(raw));
    }

    #[test]
    fn test_bare_opener_is_open_thinking() {
        assert_eq!(parse("<think>"), vec![thinking("", true)]);
        assert!(is_currently_thinking("<think>"));
    }

    #[test]
    fn test_text_before_thinking_is_kept() {
        let parts = parse("Hello <think>hmm</think> world");
        assert_eq!(
            parts,
            vec![text("Hello "), thinking("hmm", false), text(" world")]
        );
    }

    #[test]
    fn test_split_delimiter_degrades_then_recovers() {
        // Chunk boundary in the middle of the closing tag
        let partial = "<think>abc</thi";
        assert_eq!(parse(partial), vec![thinking("abc</thi", true)]);

        let complete = "<think>abc</think>done";
        assert_eq!(parse(complete), vec![thinking("abc", false), text("done")]);
        assert!(!is_currently_thinking(complete));
    }

    #[test]
    fn test_stray_closer_is_text() {
        assert_eq!(parse("oops</think> ok"), vec![text("oops</think> ok")]);
        assert!(!is_currently_thinking("oops</think>"));
    }

    #[test]
    fn test_blocks_do_not_nest() {
        let parts = parse("<think>a<think>b</think>c");
        assert_eq!(parts, vec![thinking("a<think>b", false), text("c")]);
    }

    #[test]
    fn test_tool_call_marker() {
        let parts = parse("Checking <tool_call>weather</tool_call>It is sunny.");
        assert_eq!(
            parts,
            vec![
                text("Checking "),
                MessagePart::ToolCall("weather".to_string()),
                text("It is sunny."),
            ]
        );
    }

    #[test]
    fn test_unterminated_tool_call_degrades_to_text() {
        let parts = parse("Checking <tool_call>weath");
        assert_eq!(parts, vec![text("Checking <tool_call>weath")]);
        assert!(!is_currently_thinking("Checking <tool_call>weath"));
    }

    #[test]
    fn test_thinking_opener_inside_tool_call_is_not_thinking() {
        assert!(!is_currently_thinking("<tool_call><think>"));
    }

    #[test]
    fn test_tool_opener_inside_open_thinking_stays_thinking() {
        assert!(is_currently_thinking("<think>maybe <tool_call>x"));
    }

    #[test]
    fn test_multibyte_text_around_delimiters() {
        let parts = parse("café <think>naïve</think>→ résumé");
        assert_eq!(
            parts,
            vec![text("café "), thinking("naïve", false), text("→ résumé")]
        );
    }

    #[test]
    fn test_every_prefix_of_stream_parses() {
        let full = "<think>plan: call tool</think>Sure! <tool_call>search</tool_call>Found it.";
        for end in 0..=full.len() {
            if !full.is_char_boundary(end) {
                continue;
            }
            let prefix = &full[..end];
            let parts = parse(prefix);
            // Reasoning is open exactly while the closer has not fully arrived
            let expect_thinking =
                end > 0 && prefix.starts_with(THINK_OPEN) && !prefix.contains(THINK_CLOSE);
            assert_eq!(is_currently_thinking(prefix), expect_thinking, "prefix {prefix:?}");
            assert!(parts.len() <= 5);
        }
    }

    #[test]
    fn test_no_text_is_lost() {
        let raw = "one <think>two</think> three <tool_call> four </tool_call> five </think> six";
        let joined: String = parse(raw).iter().map(MessagePart::content).collect();
        assert_eq!(joined, "one two three  four  five </think> six");
    }

    #[test]
    fn test_tokenize_literals_roundtrip_source() {
        let raw = "x<think>y</think>z<tool_call>";
        let rebuilt: String = tokenize(raw).iter().map(Token::literal).collect();
        assert_eq!(rebuilt, raw);
    }
}
