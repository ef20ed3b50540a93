//! Default persona for chat sessions
//!
//! This module provides the built-in system instructions and starter
//! suggestions used when the configuration does not override them.

/// Display name of the default persona
pub const PERSONA_NAME: &str = "Bio Tutor";

/// Default system instructions: a biology tutor
pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "\
You are 'Bio Tutor', an AI assistant with expert knowledge of biology. \
Your purpose is to give precise, clear and educational answers.

Rules of interaction:
- **Tone**: Didactic, scientific and friendly.
- **Accuracy**: Prioritize scientific correctness. If you are not sure, say so.
- **Safety**: Never give medical or veterinary advice. Always recommend consulting a qualified professional.
- **Format**: Use Markdown (bold, lists, etc.) to structure your answers and improve readability.";

/// Heading shown above the starter suggestions
pub const SUGGESTIONS_HEADING: &str = "How can I help you today?";

/// Input hint shown by interactive front ends
pub const INPUT_HINT: &str = "Ask me something about biology...";

/// Default starter suggestions offered while a conversation is empty
pub const DEFAULT_SUGGESTIONS: [&str; 4] = [
    "Explain photosynthesis to me",
    "What is CRISPR gene editing?",
    "Describe an animal that lives in the deep ocean",
    "Differences between mitosis and meiosis",
];

/// Default starter suggestions as owned strings
///
/// # Examples
///
/// ```
/// use parley::prompts::default_suggestions;
///
/// let suggestions = default_suggestions();
/// assert_eq!(suggestions.len(), 4);
/// assert!(suggestions[0].contains("photosynthesis"));
/// ```
pub fn default_suggestions() -> Vec<String> {
    DEFAULT_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
}
