use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tokio::sync::{Mutex, broadcast};

use quizwire_client::config::{ClientConfig, ReconnectConfig, Role, TimerConfig};
use quizwire_client::session::SessionEvent;
use quizwire_core::net::messages::{QuestionStartMsg, ServerEvent, SubmitAnswerBody};
use quizwire_core::net::protocol::encode_server_event;
use quizwire_core::question::Question;
use quizwire_core::test_helpers::make_question;

/// Shared state of the in-process quiz backend.
#[derive(Clone)]
pub struct QuizBackend {
    /// Raw frames broadcast to every connected WebSocket client.
    pub events: broadcast::Sender<String>,
    /// Force-closes all WebSocket connections (for reconnect tests).
    pub kill: broadcast::Sender<()>,
    pub questions: Arc<Vec<Question>>,
    pub submissions: Arc<Mutex<Vec<SubmitAnswerBody>>>,
    pub leaderboard_rows: Arc<Mutex<Vec<(String, i64)>>>,
    pub fail_submits: Arc<AtomicBool>,
    pub submit_delay_ms: Arc<AtomicU64>,
    /// Full path-and-query of every HTTP request, for cache-bust assertions.
    pub seen_queries: Arc<Mutex<Vec<String>>>,
    pub ws_connections: Arc<AtomicUsize>,
}

impl QuizBackend {
    fn new(questions: Vec<Question>) -> Self {
        let (events, _) = broadcast::channel(64);
        let (kill, _) = broadcast::channel(8);
        Self {
            events,
            kill,
            questions: Arc::new(questions),
            submissions: Arc::new(Mutex::new(Vec::new())),
            leaderboard_rows: Arc::new(Mutex::new(Vec::new())),
            fail_submits: Arc::new(AtomicBool::new(false)),
            submit_delay_ms: Arc::new(AtomicU64::new(0)),
            seen_queries: Arc::new(Mutex::new(Vec::new())),
            ws_connections: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// In-process quiz backend for driving the client under test.
pub struct TestServer {
    pub addr: SocketAddr,
    pub backend: QuizBackend,
    _serve: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_questions(vec![
            make_question(1, 2),
            make_question(2, 3),
            make_question(5, 4),
        ])
        .await
    }

    pub async fn with_questions(questions: Vec<Question>) -> Self {
        let backend = QuizBackend::new(questions);
        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/submit_answer", post(submit_answer))
            .route("/leaderboard", get(leaderboard))
            .route("/questions", get(questions_handler))
            .route("/host/start_question", post(start_question))
            .with_state(backend.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            backend,
            _serve: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Client config pointed at this server with test-friendly timings:
    /// 25 ms ticks, a 100 ms reconnect delay, and a question window long
    /// enough that only tests which shorten it ever hit expiry.
    pub fn client_config(&self, role: Role) -> ClientConfig {
        ClientConfig {
            backend_url: self.base_url(),
            role,
            question_duration_secs: 400,
            timer: TimerConfig {
                tick_interval_ms: 25,
            },
            reconnect: ReconnectConfig {
                delay_ms: 100,
                max_attempts: None,
            },
            ..ClientConfig::default()
        }
    }

    /// Broadcast an event frame to every connected client.
    pub fn push(&self, event: &ServerEvent) {
        let frame = encode_server_event(event).unwrap();
        let _ = self.backend.events.send(frame);
    }

    pub fn push_question(&self, question: Question) {
        self.push(&ServerEvent::QuestionStart(QuestionStartMsg { question }));
    }

    pub fn push_raw(&self, frame: &str) {
        let _ = self.backend.events.send(frame.to_string());
    }

    /// Force-close every WebSocket connection.
    pub fn drop_connections(&self) {
        let _ = self.backend.kill.send(());
    }

    pub async fn submissions(&self) -> Vec<SubmitAnswerBody> {
        self.backend.submissions.lock().await.clone()
    }

    pub async fn set_leaderboard(&self, rows: &[(&str, i64)]) {
        *self.backend.leaderboard_rows.lock().await = rows
            .iter()
            .map(|(name, score)| (name.to_string(), *score))
            .collect();
    }

    pub fn set_fail_submits(&self, fail: bool) {
        self.backend.fail_submits.store(fail, Ordering::Relaxed);
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        self.backend
            .submit_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub async fn seen_queries(&self) -> Vec<String> {
        self.backend.seen_queries.lock().await.clone()
    }

    /// Wait until at least `n` WebSocket clients are connected.
    pub async fn wait_for_ws_clients(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.backend.ws_connections.load(Ordering::Relaxed) < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {n} ws clients"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

async fn ws_handler(State(b): State<QuizBackend>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, b))
}

async fn serve_socket(mut socket: WebSocket, b: QuizBackend) {
    let mut events = b.events.subscribe();
    let mut kill = b.kill.subscribe();
    b.ws_connections.fetch_add(1, Ordering::Relaxed);

    loop {
        tokio::select! {
            frame = events.recv() => {
                let Ok(frame) = frame else { break };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            },
            _ = kill.recv() => break,
            msg = socket.recv() => {
                // the backend ignores client frames; watch for disconnect
                match msg {
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            },
        }
    }

    b.ws_connections.fetch_sub(1, Ordering::Relaxed);
}

async fn submit_answer(
    State(b): State<QuizBackend>,
    uri: Uri,
    Json(body): Json<SubmitAnswerBody>,
) -> axum::response::Response {
    b.seen_queries.lock().await.push(uri.to_string());

    let delay = b.submit_delay_ms.load(Ordering::Relaxed);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if b.fail_submits.load(Ordering::Relaxed) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "submit rejected by test flag").into_response();
    }
    b.submissions.lock().await.push(body);
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

async fn leaderboard(State(b): State<QuizBackend>, uri: Uri) -> Json<Vec<(String, i64)>> {
    b.seen_queries.lock().await.push(uri.to_string());
    Json(b.leaderboard_rows.lock().await.clone())
}

async fn questions_handler(State(b): State<QuizBackend>, uri: Uri) -> Json<Vec<Question>> {
    b.seen_queries.lock().await.push(uri.to_string());
    Json((*b.questions).clone())
}

#[derive(serde::Deserialize)]
struct StartQuestionParams {
    qid: u64,
}

async fn start_question(
    State(b): State<QuizBackend>,
    uri: Uri,
    Query(params): Query<StartQuestionParams>,
) -> axum::response::Response {
    b.seen_queries.lock().await.push(uri.to_string());

    let Some(question) = b.questions.iter().find(|q| q.id == params.qid) else {
        return (StatusCode::NOT_FOUND, "unknown question").into_response();
    };
    let frame = encode_server_event(&ServerEvent::QuestionStart(QuestionStartMsg {
        question: question.clone(),
    }))
    .unwrap();
    let _ = b.events.send(frame);
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

/// Receive session events until one matches `pred`, panicking on timeout.
pub async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<SessionEvent>,
    timeout_ms: u64,
    mut pred: F,
) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) => {
                if pred(&event) {
                    return event;
                }
            },
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                panic!("session event stream closed while waiting")
            },
            Err(_) => panic!("timed out waiting for session event"),
        }
    }
}

/// Assert no event matching `pred` arrives within the window.
pub async fn expect_no_event<F>(
    rx: &mut broadcast::Receiver<SessionEvent>,
    window_ms: u64,
    mut pred: F,
) where
    F: FnMut(&SessionEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(window_ms);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) => {
                assert!(!pred(&event), "unexpected event: {event:?}");
            },
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                tokio::time::sleep(remaining).await;
                return;
            },
            Err(_) => return,
        }
    }
}
