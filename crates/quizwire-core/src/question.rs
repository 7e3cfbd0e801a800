use serde::{Deserialize, Serialize};

/// Server-assigned question identifier.
pub type QuestionId = u64;

/// A quiz question as pushed by the server. Immutable once received;
/// identity is the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    /// Prompt text. Wire name is `question`.
    #[serde(rename = "question")]
    pub prompt: String,
    pub options: Vec<String>,
}

impl Question {
    /// Whether `index` addresses one of this question's options.
    pub fn is_valid_choice(&self, index: usize) -> bool {
        index < self.options.len()
    }
}
