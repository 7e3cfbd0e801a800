/// Submission lifecycle for the active question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Armed,
    Submitting,
    Submitted,
    Expired,
    Failed,
}

impl Default for SubmissionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Submitting => "submitting",
            Self::Submitted => "submitted",
            Self::Expired => "expired",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Reasons the gate refuses an operation. Refusals never change state.
#[derive(Debug, PartialEq, Eq)]
pub enum GateError {
    /// A submission was already accepted for this context.
    AlreadySubmitted,
    /// The context is not accepting submissions in its current state.
    NotAnswerable(SubmissionState),
    /// The chosen option does not exist on this question.
    ChoiceOutOfRange { index: usize, option_count: usize },
    /// `arm`/`rearm` called from a state that does not allow it.
    NotArmable(SubmissionState),
}

impl std::fmt::Display for GateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadySubmitted => write!(f, "answer already submitted"),
            Self::NotAnswerable(state) => write!(f, "question is not answerable ({state})"),
            Self::ChoiceOutOfRange {
                index,
                option_count,
            } => {
                write!(f, "choice {index} out of range ({option_count} options)")
            },
            Self::NotArmable(state) => write!(f, "cannot arm from state {state}"),
        }
    }
}

impl std::error::Error for GateError {}

/// Enforces "submit at most once per active question".
///
/// The gate is pure state: the session controller performs the outbound call
/// exactly once per transition into `Submitting` and feeds the outcome back
/// through `submit_succeeded`/`submit_failed`.
#[derive(Debug, Default)]
pub struct AnswerGate {
    state: SubmissionState,
}

impl AnswerGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state == SubmissionState::Armed
    }

    /// Enable submissions for a fresh context. Valid only on context
    /// replacement: from `Idle`, `Expired`, or `Submitted`.
    pub fn arm(&mut self) -> Result<(), GateError> {
        match self.state {
            SubmissionState::Idle | SubmissionState::Expired | SubmissionState::Submitted => {
                self.state = SubmissionState::Armed;
                Ok(())
            },
            state => Err(GateError::NotArmable(state)),
        }
    }

    /// Accept a submission attempt: `Armed → Submitting`, exactly once per
    /// context. Out-of-range choices are rejected without a state change.
    pub fn begin_submit(&mut self, index: usize, option_count: usize) -> Result<(), GateError> {
        match self.state {
            SubmissionState::Armed => {
                if index >= option_count {
                    return Err(GateError::ChoiceOutOfRange {
                        index,
                        option_count,
                    });
                }
                self.state = SubmissionState::Submitting;
                Ok(())
            },
            SubmissionState::Submitting | SubmissionState::Submitted => {
                Err(GateError::AlreadySubmitted)
            },
            state => Err(GateError::NotAnswerable(state)),
        }
    }

    /// The outbound call succeeded: `Submitting → Submitted`. A late success
    /// for an already expired context is accepted for scoring but leaves the
    /// gate expired.
    pub fn submit_succeeded(&mut self) {
        if self.state == SubmissionState::Submitting {
            self.state = SubmissionState::Submitted;
        }
    }

    /// The outbound call failed: `Submitting → Failed`. The caller decides
    /// between `rearm` (deadline still holds) and `expire`.
    pub fn submit_failed(&mut self) {
        if self.state == SubmissionState::Submitting {
            self.state = SubmissionState::Failed;
        }
    }

    /// Re-enable submissions after a failure: `Failed → Armed`.
    pub fn rearm(&mut self) -> Result<(), GateError> {
        match self.state {
            SubmissionState::Failed => {
                self.state = SubmissionState::Armed;
                Ok(())
            },
            state => Err(GateError::NotArmable(state)),
        }
    }

    /// Force expiry from `Armed`, `Submitting`, or `Failed`. Idempotent:
    /// returns true only when the state newly became `Expired`. A confirmed
    /// submission is never expired.
    pub fn expire(&mut self) -> bool {
        match self.state {
            SubmissionState::Armed | SubmissionState::Submitting | SubmissionState::Failed => {
                self.state = SubmissionState::Expired;
                true
            },
            _ => false,
        }
    }
}
