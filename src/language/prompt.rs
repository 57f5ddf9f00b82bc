//! Response-language directives prepended to every outgoing message.
//!
//! English, Hindi and Spanish have hand-written directives.  A configured
//! language may override its directive; any other language gets a generated
//! English instruction naming it.

use super::Language;

// ---------------------------------------------------------------------------
// Built-in directives
// ---------------------------------------------------------------------------

const DIRECTIVE_EN: &str = "Please respond in English.";

const DIRECTIVE_HI: &str = "कृपया हिंदी में जवाब दें। (Please respond in Hindi)";

const DIRECTIVE_ES: &str = "Por favor responde en español. (Please respond in Spanish)";

/// Built-in directive for `code`, if one exists.
pub fn builtin_directive(code: &str) -> Option<&'static str> {
    match code {
        "en" => Some(DIRECTIVE_EN),
        "hi" => Some(DIRECTIVE_HI),
        "es" => Some(DIRECTIVE_ES),
        _ => None,
    }
}

/// Resolve the directive for `language`: its own override, then the
/// built-in table, then a generated instruction.
pub fn directive_for(language: &Language) -> String {
    if let Some(prompt) = language.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        return prompt.to_string();
    }
    match builtin_directive(&language.code) {
        Some(directive) => directive.to_string(),
        None => format!("Please respond in {}.", language.name),
    }
}

/// Prefix `text` with `directive`, separated by a blank line.
///
/// ```
/// use chat_widget::language::compose_message;
///
/// assert_eq!(
///     compose_message("Please respond in English.", "Hello"),
///     "Please respond in English.\n\nHello"
/// );
/// ```
pub fn compose_message(directive: &str, text: &str) -> String {
    format!("{directive}\n\n{text}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
