//! # Shell-like Lexing Utilities
//!
//! This module provides utilities for tokenizing shell-like input, supporting
//! single and double quotes, backslash escapes, and position tracking, plus the
//! inverse direction: quoting literal words so a rendered command line splits
//! back into exactly the words it was built from.

use std::borrow::Cow;

/// Tokenize input using a simple, shell-like lexer.
///
/// Supports single and double quotes and backslash escapes. Used to inspect
/// rendered job command lines (process counts, mount references).
/// This function returns owned strings, discarding position information.
///
/// # Arguments
/// * `input` - The raw input line to tokenize
///
/// # Returns
/// A vector of tokens preserving quoted segments
///
/// # Example
/// ```rust
/// use batchai_util::shell_lexing::lex_shell_like;
///
/// let tokens = lex_shell_like("cmd --flag 'some value'");
/// assert_eq!(
///     tokens,
///     vec!["cmd", "--flag", "'some value'"]
/// );
///
/// let tokens = lex_shell_like("echo \"hello world\"");
/// assert_eq!(
///     tokens,
///     vec!["echo", "\"hello world\""]
/// );
///
/// let tokens = lex_shell_like("path\\ with\\ spaces");
/// assert_eq!(
///     tokens,
///     vec!["path\\ with\\ spaces"]
/// );
/// ```
pub fn lex_shell_like(input: &str) -> Vec<String> {
    lex_shell_like_ranged(input)
        .into_iter()
        .map(|token| token.text.to_string())
        .collect()
}

/// Token with original byte positions.
///
/// Represents a single token extracted from shell-like input,
/// preserving both the text content and its position in the original string.
/// This is useful for applications that need to know where tokens
/// appear in the original text for error reporting or highlighting.
///
/// # Fields
/// * `text` - The text content of the token
/// * `start` - The starting byte position in the original string
/// * `end` - The ending byte position in the original string
#[derive(Debug, Clone)]
pub struct LexToken<'a> {
    /// The text content of the token
    pub text: &'a str,
    /// The starting byte position in the original string
    pub start: usize,
    /// The ending byte position in the original string
    pub end: usize,
}

/// Tokenize input returning borrowed slices and byte ranges.
///
/// This function provides more detailed tokenization than `lex_shell_like`,
/// returning tokens with their original positions in the input string.
/// This is useful for applications that need to know where tokens
/// appear in the original text for error reporting, syntax highlighting,
/// or cursor positioning.
///
/// # Arguments
/// * `input` - The input string to tokenize
///
/// # Returns
/// A vector of tokens with position information
///
/// # Example
/// ```rust
/// use batchai_util::shell_lexing::lex_shell_like_ranged;
///
/// let tokens = lex_shell_like_ranged("hello world");
/// assert_eq!(tokens.len(), 2);
/// assert_eq!(tokens[0].text, "hello");
/// assert_eq!(tokens[0].start, 0);
/// assert_eq!(tokens[0].end, 5);
///
/// assert_eq!(tokens[1].text, "world");
/// assert_eq!(tokens[1].start, 6);
/// assert_eq!(tokens[1].end, 11);
///
/// // Quoted strings preserve their quotes
/// let tokens = lex_shell_like_ranged("cmd 'arg with spaces'");
/// assert_eq!(tokens[1].text, "'arg with spaces'");
/// ```
pub fn lex_shell_like_ranged(input: &str) -> Vec<LexToken<'_>> {
    let mut tokens = Vec::new();
    let mut current_index = 0usize;
    let bytes = input.as_bytes();

    while current_index < bytes.len() {
        // Skip leading whitespace
        current_index = skip_whitespace(bytes, current_index);

        if current_index >= bytes.len() {
            break;
        }

        let start = current_index;
        current_index = parse_token(bytes, current_index);

        tokens.push(LexToken {
            text: &input[start..current_index],
            start,
            end: current_index,
        });
    }

    tokens
}

/// Skips whitespace characters starting from the given index.
///
/// This function advances the index past any consecutive whitespace
/// characters, including spaces, tabs, and other ASCII whitespace.
///
/// # Arguments
/// * `bytes` - The byte array to scan
/// * `start_index` - The starting index to begin scanning from
///
/// # Returns
/// The index after the last whitespace character
fn skip_whitespace(bytes: &[u8], start_index: usize) -> usize {
    let mut index = start_index;
    while index < bytes.len() && bytes[index].is_ascii_whitespace() {
        index += 1;
    }
    index
}

/// Parses a single token from the input bytes.
///
/// Handles quoted strings, escaped characters, and regular text.
/// Stops at whitespace or the end of input. This function properly
/// handles nested quotes and escaped characters within quoted strings.
///
/// # Arguments
/// * `bytes` - The byte array to parse
/// * `start_index` - The starting index for this token
///
/// # Returns
/// The index after the end of the token
fn parse_token(bytes: &[u8], start_index: usize) -> usize {
    let mut index = start_index;
    let mut in_single_quotes = false;
    let mut in_double_quotes = false;

    while index < bytes.len() {
        let byte = bytes[index];

        // Handle escaped characters
        if byte == b'\\' && index + 1 < bytes.len() {
            index += 2;
            continue;
        }

        // Handle single quotes
        if byte == b'\'' && !in_double_quotes {
            in_single_quotes = !in_single_quotes;
            index += 1;
            continue;
        }

        // Handle double quotes
        if byte == b'"' && !in_single_quotes {
            in_double_quotes = !in_double_quotes;
            index += 1;
            continue;
        }

        // Stop at whitespace if not in quotes
        if !in_single_quotes && !in_double_quotes && byte.is_ascii_whitespace() {
            break;
        }

        index += 1;
    }

    index
}

/// Quote a literal word for a POSIX shell.
///
/// Words made only of characters that carry no meaning to the shell are
/// returned unchanged; everything else is wrapped in single quotes, with
/// embedded single quotes spelled as `'\''`. `$` is not in the
/// safe set, so a literal word can never expand a variable.
///
/// # Example
/// ```rust
/// use batchai_util::shell_lexing::quote_shell_word;
///
/// assert_eq!(quote_shell_word("NCCL_DEBUG=INFO"), "NCCL_DEBUG=INFO");
/// assert_eq!(quote_shell_word("two words"), "'two words'");
/// assert_eq!(quote_shell_word("it's"), "'it'\\''s'");
/// assert_eq!(quote_shell_word(""), "''");
/// ```
pub fn quote_shell_word(word: &str) -> Cow<'_, str> {
    if word.is_empty() {
        return Cow::Borrowed("''");
    }
    if word.bytes().all(is_shell_safe) {
        return Cow::Borrowed(word);
    }
    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('\'');
    for character in word.chars() {
        if character == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(character);
        }
    }
    quoted.push('\'');
    Cow::Owned(quoted)
}

/// Render literal words into a single shell line, quoting as needed.
///
/// # Example
/// ```rust
/// use batchai_util::shell_lexing::render_shell_words;
///
/// let words = vec!["az".to_string(), "configure".to_string(), "--defaults".to_string(), "group=".to_string()];
/// assert_eq!(render_shell_words(&words), "az configure --defaults group=");
/// ```
pub fn render_shell_words<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|word| quote_shell_word(word.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_shell_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.' | b'/' | b'=' | b':' | b',' | b'+' | b'@' | b'%' | b'^')
}
