//! Language negotiation.
//!
//! * [`LanguageRegistry`]: supported languages; resolves a code to its
//!   display name, response directive and speech locale.
//! * [`LanguagePreference`]: the user's persisted choice.
//! * [`directive_for`] / [`compose_message`]: build the outgoing text.

pub mod prompt;
pub mod registry;

pub use prompt::{builtin_directive, compose_message, directive_for};
pub use registry::{default_languages, Language, LanguagePreference, LanguageRegistry};
