use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use quizwire_core::leaderboard::{Leaderboard, ScoreRow};
use quizwire_core::net::messages::SubmitAnswerBody;
use quizwire_core::question::{Question, QuestionId};

use crate::error::ClientError;

/// One-shot HTTP calls to the quiz backend.
///
/// Every request URL gets a monotonically increasing `ts=` token appended
/// exactly once, so intermediary caches never serve a stale response. The
/// token joins with `&` when the path already carries query parameters and
/// `?` otherwise. Calls are never auto-retried; retrying is a user action.
pub struct Gateway {
    http: reqwest::Client,
    base_url: String,
    cache_bust: AtomicU64,
}

impl Gateway {
    pub fn new(base_url: &str, request_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("quizwire-client/0.1")
            .timeout(request_timeout)
            .build()
            .expect("Failed to create HTTP client");
        // seed from epoch millis so tokens stay fresh across restarts
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache_bust: AtomicU64::new(seed),
        }
    }

    fn bust(&self, path: &str) -> String {
        let token = self.cache_bust.fetch_add(1, Ordering::Relaxed);
        let sep = if path.contains('?') { '&' } else { '?' };
        format!("{}{}{}ts={}", self.base_url, path, sep, token)
    }

    pub async fn get(&self, path: &str) -> Result<reqwest::Response, ClientError> {
        let url = self.bust(path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        check_status(resp).await
    }

    pub async fn post_json<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, ClientError> {
        let url = self.bust(path);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        check_status(resp).await
    }

    pub async fn post(&self, path: &str) -> Result<reqwest::Response, ClientError> {
        let url = self.bust(path);
        let resp = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        check_status(resp).await
    }

    /// `POST /submit_answer`. Success carries no scoring information; the
    /// verdict arrives later as an `answer_result` event.
    pub async fn submit_answer(&self, body: &SubmitAnswerBody) -> Result<(), ClientError> {
        self.post_json("/submit_answer", body).await.map(|_| ())
    }

    /// `GET /leaderboard` — pair-encoded rows, name first.
    pub async fn leaderboard(&self) -> Result<Leaderboard, ClientError> {
        let rows: Vec<ScoreRow> = self
            .get("/leaderboard")
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        Ok(Leaderboard::from_rows(rows))
    }

    /// `GET /questions` — the host-side question listing.
    pub async fn questions(&self) -> Result<Vec<Question>, ClientError> {
        self.get("/questions")
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))
    }

    /// `POST /host/start_question?qid=<id>` — asks the server to broadcast
    /// a `question_start` for the given question.
    pub async fn start_question(&self, qid: QuestionId) -> Result<(), ClientError> {
        self.post(&format!("/host/start_question?qid={qid}"))
            .await
            .map(|_| ())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Http {
        status: status.as_u16(),
        body,
    })
}
