use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use quizwire_core::leaderboard::{Leaderboard, ScoreRecord, ScoreRow};
use quizwire_core::net::messages::{AnswerResultMsg, ServerEvent, SubmitAnswerBody};
use quizwire_core::question::{Question, QuestionId};

use crate::channel::{ConnectionState, RealtimeChannel};
use crate::config::{ClientConfig, Role};
use crate::countdown::{Countdown, TimerEvent};
use crate::error::ClientError;
use crate::gate::{AnswerGate, SubmissionState};
use crate::gateway::Gateway;

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Joining,
    Waiting,
    Answering,
}

/// The active question plus its timer and submission state. Exactly one
/// exists at a time; a new `question_start` replaces it wholesale, even if
/// it was never answered. The context outlives its countdown so that a late
/// `answer_result` can still be matched after expiry.
struct ActiveQuestionContext {
    question: Question,
    started_at: Instant,
    deadline: Instant,
    timer_generation: u64,
    gate: AnswerGate,
}

/// UI-visible state changes, published on a broadcast channel. Subscribe
/// via [`SessionHandle::subscribe`] or [`SessionHandle::event_stream`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Joined {
        name: String,
    },
    QuestionStarted {
        question: Question,
        duration_secs: u32,
    },
    CountdownTick {
        remaining_secs: u32,
    },
    /// Presentation layers disable option selection whenever this leaves
    /// `Armed`.
    SubmissionStateChanged {
        state: SubmissionState,
    },
    /// The countdown ran out with no confirmed submission. Distinct from
    /// `SubmissionAccepted`.
    TimeUp,
    /// The outbound submit call was confirmed by the server.
    SubmissionAccepted,
    SubmissionFailed {
        retry_available: bool,
    },
    /// Authoritative verdict for our own submission.
    AnswerResult {
        correct: bool,
        correct_index: u32,
        correct_text: String,
        score: i64,
    },
    ScoreUpdated {
        score: i64,
    },
    LeaderboardUpdated {
        leaderboard: Vec<ScoreRecord>,
    },
    ConnectionChanged {
        state: ConnectionState,
    },
}

enum Command {
    Join {
        name: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Submit {
        choice: usize,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    FetchQuestions {
        reply: oneshot::Sender<Result<Vec<Question>, ClientError>>,
    },
    StartQuestion {
        qid: QuestionId,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    FetchLeaderboard {
        reply: oneshot::Sender<Result<Leaderboard, ClientError>>,
    },
    Shutdown,
}

/// Outcome of one outbound submit call, tagged with the context it belongs
/// to so results for a superseded question are discarded.
struct SubmitOutcome {
    qid: QuestionId,
    timer_generation: u64,
    result: Result<(), ClientError>,
}

/// Entry point for running a quiz session.
pub struct Session;

impl Session {
    /// Validate the config and spawn the controller task. Must be called
    /// within a tokio runtime.
    pub fn spawn(config: ClientConfig) -> Result<SessionHandle, ClientError> {
        config.validate()?;

        let channel = RealtimeChannel::spawn(
            config.ws_url(),
            config.reconnect.clone(),
            config.limits.event_capacity,
        );
        let gateway = Arc::new(Gateway::new(
            &config.backend_url,
            Duration::from_secs(config.limits.request_timeout_secs),
        ));
        let (events_tx, _) = broadcast::channel(config.limits.event_capacity);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);

        let controller = Controller::new(config, channel, gateway, events_tx.clone(), cmd_rx);
        let task = tokio::spawn(controller.run());

        Ok(SessionHandle {
            commands: cmd_tx,
            events: events_tx,
            task,
        })
    }
}

/// Public API of a running session. All mutation flows through the
/// controller task; the handle sends commands and subscribes to events.
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Typed event stream, for consumers that prefer `futures::Stream`.
    pub fn event_stream(&self) -> BroadcastStream<SessionEvent> {
        BroadcastStream::new(self.subscribe())
    }

    /// Join the quiz under the given display name (player role). The name
    /// is trimmed; an empty result is rejected without any network call.
    pub async fn join(&self, name: &str) -> Result<(), ClientError> {
        let name = name.to_string();
        self.request(|reply| Command::Join { name, reply }).await
    }

    /// Submit an answer for the active question. Accepted at most once per
    /// question; the server's confirmation arrives as a session event.
    pub async fn submit_answer(&self, choice: usize) -> Result<(), ClientError> {
        self.request(|reply| Command::Submit { choice, reply })
            .await
    }

    /// Fetch the question bank (host role).
    pub async fn questions(&self) -> Result<Vec<Question>, ClientError> {
        self.request(|reply| Command::FetchQuestions { reply })
            .await
    }

    /// Ask the server to broadcast a `question_start` (host role).
    pub async fn start_question(&self, qid: QuestionId) -> Result<(), ClientError> {
        self.request(|reply| Command::StartQuestion { qid, reply })
            .await
    }

    /// Fetch a fresh leaderboard snapshot over HTTP.
    pub async fn fetch_leaderboard(&self) -> Result<Leaderboard, ClientError> {
        self.request(|reply| Command::FetchLeaderboard { reply })
            .await
    }

    /// Stop the controller and the channel, waiting for the task to end.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let _ = self.task.await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, ClientError>>) -> Command,
    ) -> Result<T, ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| ClientError::Closed)?;
        reply_rx.await.map_err(|_| ClientError::Closed)?
    }
}

struct Controller {
    config: ClientConfig,
    channel: RealtimeChannel,
    server_events: broadcast::Receiver<ServerEvent>,
    gateway: Arc<Gateway>,
    events: broadcast::Sender<SessionEvent>,
    commands: mpsc::Receiver<Command>,
    countdown: Countdown,
    timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    submit_tx: mpsc::UnboundedSender<SubmitOutcome>,
    submit_rx: mpsc::UnboundedReceiver<SubmitOutcome>,
    lb_tx: mpsc::UnboundedSender<Leaderboard>,
    lb_rx: mpsc::UnboundedReceiver<Leaderboard>,
    phase: Phase,
    player_name: Option<String>,
    context: Option<ActiveQuestionContext>,
    last_answered_qid: Option<QuestionId>,
    score: i64,
    leaderboard: Leaderboard,
}

impl Controller {
    fn new(
        config: ClientConfig,
        channel: RealtimeChannel,
        gateway: Arc<Gateway>,
        events: broadcast::Sender<SessionEvent>,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        let (lb_tx, lb_rx) = mpsc::unbounded_channel();
        let countdown = Countdown::new(
            timer_tx,
            Duration::from_millis(config.timer.tick_interval_ms),
        );
        let phase = match config.role {
            Role::Player => Phase::Joining,
            Role::Host => Phase::Waiting,
        };
        // subscribe before the controller task starts so no event slips by
        let server_events = channel.subscribe();
        Self {
            config,
            channel,
            server_events,
            gateway,
            events,
            commands,
            countdown,
            timer_rx,
            submit_tx,
            submit_rx,
            lb_tx,
            lb_rx,
            phase,
            player_name: None,
            context: None,
            last_answered_qid: None,
            score: 0,
            leaderboard: Leaderboard::new(),
        }
    }

    async fn run(mut self) {
        let mut conn_state = self.channel.connection_state();
        let mut conn_alive = true;

        loop {
            tokio::select! {
                maybe_cmd = self.commands.recv() => {
                    match maybe_cmd {
                        Some(Command::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                },
                result = self.server_events.recv() => {
                    match result {
                        Ok(event) => self.handle_server_event(event),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(missed = n, "Controller lagged, server events dropped");
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                },
                Some(event) = self.timer_rx.recv() => self.handle_timer_event(event),
                Some(outcome) = self.submit_rx.recv() => self.handle_submit_outcome(outcome),
                Some(snapshot) = self.lb_rx.recv() => self.apply_leaderboard(snapshot),
                changed = conn_state.changed(), if conn_alive => {
                    match changed {
                        Ok(()) => {
                            let state = *conn_state.borrow_and_update();
                            self.emit(SessionEvent::ConnectionChanged { state });
                        },
                        Err(_) => {
                            // channel task is gone (shutdown or attempt cap)
                            conn_alive = false;
                            self.emit(SessionEvent::ConnectionChanged {
                                state: ConnectionState::Closed,
                            });
                        },
                    }
                },
            }
        }

        self.countdown.cancel();
        self.channel.close();
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Join { name, reply } => {
                let _ = reply.send(self.handle_join(name));
            },
            Command::Submit { choice, reply } => {
                let _ = reply.send(self.handle_submit(choice));
            },
            Command::FetchQuestions { reply } => {
                if self.config.role != Role::Host {
                    let _ = reply.send(Err(ClientError::Validation(
                        "question listing is a host operation".to_string(),
                    )));
                    return;
                }
                let gateway = Arc::clone(&self.gateway);
                tokio::spawn(async move {
                    let _ = reply.send(gateway.questions().await);
                });
            },
            Command::StartQuestion { qid, reply } => {
                if self.config.role != Role::Host {
                    let _ = reply.send(Err(ClientError::Validation(
                        "starting questions is a host operation".to_string(),
                    )));
                    return;
                }
                let gateway = Arc::clone(&self.gateway);
                tokio::spawn(async move {
                    let _ = reply.send(gateway.start_question(qid).await);
                });
            },
            Command::FetchLeaderboard { reply } => {
                let gateway = Arc::clone(&self.gateway);
                tokio::spawn(async move {
                    let _ = reply.send(gateway.leaderboard().await);
                });
            },
            // handled by the run loop
            Command::Shutdown => {},
        }
    }

    fn handle_join(&mut self, name: String) -> Result<(), ClientError> {
        if self.config.role != Role::Player {
            return Err(ClientError::Validation(
                "joining is a player operation".to_string(),
            ));
        }
        if self.phase != Phase::Joining {
            return Err(ClientError::Validation("already joined".to_string()));
        }
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ClientError::Validation(
                "player name must not be empty".to_string(),
            ));
        }
        self.player_name = Some(name.clone());
        self.phase = Phase::Waiting;
        self.emit(SessionEvent::Joined { name });
        Ok(())
    }

    fn handle_submit(&mut self, choice: usize) -> Result<(), ClientError> {
        if self.config.role != Role::Player {
            return Err(ClientError::Validation(
                "submitting is a player operation".to_string(),
            ));
        }
        let Some(name) = self.player_name.clone() else {
            return Err(ClientError::Validation("not joined".to_string()));
        };
        let Some(ctx) = self.context.as_mut() else {
            return Err(ClientError::Validation("no active question".to_string()));
        };

        // the gate is the enforcement point: expired, superseded-then-kept
        // and already-submitted contexts all refuse here
        ctx.gate
            .begin_submit(choice, ctx.question.options.len())
            .map_err(|e| ClientError::Validation(e.to_string()))?;

        let body = SubmitAnswerBody {
            name,
            qid: ctx.question.id,
            chosen_index: choice as u32,
            time_taken: ctx.started_at.elapsed().as_secs_f64(),
        };
        let qid = ctx.question.id;
        let timer_generation = ctx.timer_generation;
        self.last_answered_qid = Some(qid);

        self.emit(SessionEvent::SubmissionStateChanged {
            state: SubmissionState::Submitting,
        });

        let gateway = Arc::clone(&self.gateway);
        let submit_tx = self.submit_tx.clone();
        tokio::spawn(async move {
            let result = gateway.submit_answer(&body).await;
            let _ = submit_tx.send(SubmitOutcome {
                qid,
                timer_generation,
                result,
            });
        });
        Ok(())
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::QuestionStart(msg) => self.handle_question_start(msg.question),
            ServerEvent::LeaderboardUpdate(msg) => self.apply_leaderboard_rows(msg.leaderboard),
            ServerEvent::AnswerResult(msg) => self.handle_answer_result(msg),
        }
    }

    fn handle_question_start(&mut self, question: Question) {
        let duration_secs = self.config.question_duration_secs;

        if self.config.role == Role::Host {
            // the host mirrors the broadcast but never answers
            self.emit(SessionEvent::QuestionStarted {
                question,
                duration_secs,
            });
            return;
        }
        if self.phase == Phase::Joining {
            tracing::debug!(qid = question.id, "Question before join, ignored");
            return;
        }
        if let Some(old) = &self.context {
            // any in-flight submission for the old context is now orphaned;
            // its outcome will be dropped by the id/generation guard
            tracing::debug!(
                old_qid = old.question.id,
                new_qid = question.id,
                "Question superseded"
            );
        }

        let timer_generation = self.countdown.start(duration_secs);
        let started_at = Instant::now();
        let mut gate = AnswerGate::new();
        // fresh gate, arming from Idle cannot fail
        let _ = gate.arm();

        // the countdown is the deadline clock, so the deadline scales with
        // the tick interval
        let tick = Duration::from_millis(self.config.timer.tick_interval_ms);
        self.context = Some(ActiveQuestionContext {
            question: question.clone(),
            started_at,
            deadline: started_at + tick * duration_secs,
            timer_generation,
            gate,
        });
        self.phase = Phase::Answering;
        self.emit(SessionEvent::QuestionStarted {
            question,
            duration_secs,
        });
        self.emit(SessionEvent::SubmissionStateChanged {
            state: SubmissionState::Armed,
        });
    }

    fn handle_answer_result(&mut self, msg: AnswerResultMsg) {
        // results are broadcast to every client; only ours applies
        if self.player_name.as_deref() != Some(msg.name.as_str()) {
            return;
        }
        let current_qid = self.context.as_ref().map(|c| c.question.id);
        if current_qid != Some(msg.qid) && self.last_answered_qid != Some(msg.qid) {
            tracing::debug!(qid = msg.qid, "Stale answer result dropped");
            return;
        }
        self.score = msg.current_score;
        self.emit(SessionEvent::AnswerResult {
            correct: msg.correct,
            correct_index: msg.correct_index,
            correct_text: msg.correct_text,
            score: msg.current_score,
        });
        self.emit(SessionEvent::ScoreUpdated {
            score: msg.current_score,
        });
    }

    fn handle_timer_event(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Tick {
                generation,
                remaining_secs,
            } => {
                let Some(ctx) = self.context.as_ref() else {
                    return;
                };
                if generation != ctx.timer_generation {
                    return;
                }
                self.emit(SessionEvent::CountdownTick { remaining_secs });
            },
            TimerEvent::Expired { generation } => {
                let newly_expired = match self.context.as_mut() {
                    Some(ctx) if ctx.timer_generation == generation => ctx.gate.expire(),
                    // a stale countdown's expiry means nothing
                    _ => return,
                };
                self.phase = Phase::Waiting;
                if newly_expired {
                    self.emit(SessionEvent::SubmissionStateChanged {
                        state: SubmissionState::Expired,
                    });
                    self.emit(SessionEvent::TimeUp);
                }
            },
        }
    }

    fn handle_submit_outcome(&mut self, outcome: SubmitOutcome) {
        let Some(ctx) = self.context.as_mut() else {
            tracing::debug!(qid = outcome.qid, "Submit outcome without a context, dropped");
            return;
        };
        if ctx.question.id != outcome.qid || ctx.timer_generation != outcome.timer_generation {
            tracing::debug!(qid = outcome.qid, "Orphaned submit outcome dropped");
            return;
        }

        match outcome.result {
            Ok(()) => {
                let was_submitting = ctx.gate.state() == SubmissionState::Submitting;
                ctx.gate.submit_succeeded();
                if !was_submitting {
                    // expired while the request was in flight: the server
                    // scores it anyway, the UI stays on "time up"
                    tracing::debug!(qid = outcome.qid, "Late submit success for expired context");
                    return;
                }
                self.countdown.cancel();
                self.phase = Phase::Waiting;
                self.emit(SessionEvent::SubmissionStateChanged {
                    state: SubmissionState::Submitted,
                });
                self.emit(SessionEvent::SubmissionAccepted);

                // refresh our own score from the authoritative snapshot
                let gateway = Arc::clone(&self.gateway);
                let lb_tx = self.lb_tx.clone();
                tokio::spawn(async move {
                    match gateway.leaderboard().await {
                        Ok(snapshot) => {
                            let _ = lb_tx.send(snapshot);
                        },
                        Err(e) => tracing::warn!(error = %e, "Leaderboard refresh failed"),
                    }
                });
            },
            Err(e) => {
                ctx.gate.submit_failed();
                if ctx.gate.state() != SubmissionState::Failed {
                    // already expired; nothing left to resolve
                    tracing::debug!(qid = outcome.qid, error = %e, "Submit failure for expired context");
                    return;
                }
                if Instant::now() < ctx.deadline {
                    // deadline still holds: re-arm so the player can retry
                    let _ = ctx.gate.rearm();
                    tracing::warn!(qid = outcome.qid, error = %e, "Submit failed, retry available");
                    self.emit(SessionEvent::SubmissionStateChanged {
                        state: SubmissionState::Armed,
                    });
                    self.emit(SessionEvent::SubmissionFailed {
                        retry_available: true,
                    });
                } else {
                    ctx.gate.expire();
                    self.phase = Phase::Waiting;
                    tracing::warn!(qid = outcome.qid, error = %e, "Submit failed after the deadline");
                    self.emit(SessionEvent::SubmissionStateChanged {
                        state: SubmissionState::Expired,
                    });
                    self.emit(SessionEvent::SubmissionFailed {
                        retry_available: false,
                    });
                }
            },
        }
    }

    fn apply_leaderboard_rows(&mut self, rows: Vec<ScoreRow>) {
        self.apply_leaderboard(Leaderboard::from_rows(rows));
    }

    fn apply_leaderboard(&mut self, snapshot: Leaderboard) {
        self.leaderboard = snapshot;
        if let Some(name) = &self.player_name
            && let Some(score) = self.leaderboard.score_for(name)
            && score != self.score
        {
            self.score = score;
            self.emit(SessionEvent::ScoreUpdated { score });
        }
        self.emit(SessionEvent::LeaderboardUpdated {
            leaderboard: self.leaderboard.entries().to_vec(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
