pub mod async_runtime;
pub mod path_processing;
pub mod shell_lexing;

pub use async_runtime::block_on_future;
pub use path_processing::{expand_tilde, find_in_ancestors};
pub use shell_lexing::{lex_shell_like, quote_shell_word, render_shell_words};

use once_cell::sync::Lazy;
use regex::Regex;

static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(--(?:account-key|sas-token|connection-string|password|secret)[ =])(\S+)",
        r"(?i)([A-Z0-9_]*?(KEY|TOKEN|SECRET|PASSWORD)=)(\S+)",
        r"(?i)(AZURE_STORAGE_CONNECTION_STRING=)(\S+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("redaction pattern should compile"))
    .collect()
});

/// Redacts values that look like secrets in a rendered command line.
///
/// `az storage` commands accept credentials as flags (`--account-key`,
/// `--sas-token`) or through `KEY=value` style environment assignments; both
/// forms keep the flag or variable name and replace the value.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in SECRET_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |caps: &regex::Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{}<redacted>", prefix)
            })
            .to_string();
    }
    redacted
}
