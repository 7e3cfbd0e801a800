use serde::{Deserialize, Serialize};

use crate::leaderboard::ScoreRow;
use crate::question::{Question, QuestionId};

/// Payload of a `question_start` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionStartMsg {
    pub question: Question,
}

/// Payload of a `leaderboard_update` event. Rows are pair-encoded, name
/// first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardUpdateMsg {
    pub leaderboard: Vec<ScoreRow>,
}

/// Payload of an `answer_result` event: the authoritative scoring verdict
/// for one player's submission. Arrives over the channel, independent of
/// the HTTP submit response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResultMsg {
    pub name: String,
    pub qid: QuestionId,
    pub correct: bool,
    pub correct_index: u32,
    pub correct_text: String,
    pub current_score: i64,
}

/// Events pushed by the server over the realtime channel. JSON with a
/// `type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    QuestionStart(QuestionStartMsg),
    LeaderboardUpdate(LeaderboardUpdateMsg),
    AnswerResult(AnswerResultMsg),
}

/// Body of `POST /submit_answer`. The response carries no scoring
/// information; the verdict arrives later as an `answer_result` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitAnswerBody {
    pub name: String,
    pub qid: QuestionId,
    pub chosen_index: u32,
    pub time_taken: f64,
}
