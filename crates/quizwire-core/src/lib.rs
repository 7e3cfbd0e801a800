pub mod leaderboard;
pub mod net;
pub mod question;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::question::{Question, QuestionId};

    /// Create a test question with `n` options labeled "Option 1..n".
    pub fn make_question(id: QuestionId, n: usize) -> Question {
        Question {
            id,
            prompt: format!("Question {id}"),
            options: (1..=n).map(|i| format!("Option {i}")).collect(),
        }
    }
}
