//! Questionnaire state machine — which question a chat is on and what to
//! reply to its next message.
//!
//! Everything here is pure: the orchestrator owns I/O and the session store.

use serde::{Deserialize, Serialize};

use super::prompts::{GREETING, QUESTIONS, START_REMINDER};

/// Position of a chat in the survey.
///
/// Progresses linearly: Idle → FullName → Specialization → Source →
/// Location → Email. Each non-idle step names the answer being awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyStep {
    #[default]
    Idle,
    FullName,
    Specialization,
    Source,
    Location,
    Email,
}

impl SurveyStep {
    /// Numeric step: 0 when idle, otherwise the 1-based question number.
    pub fn number(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::FullName => 1,
            Self::Specialization => 2,
            Self::Source => 3,
            Self::Location => 4,
            Self::Email => 5,
        }
    }

    /// The step after this one. `None` for the last question and for idle.
    pub fn next(&self) -> Option<SurveyStep> {
        match self {
            Self::FullName => Some(Self::Specialization),
            Self::Specialization => Some(Self::Source),
            Self::Source => Some(Self::Location),
            Self::Location => Some(Self::Email),
            Self::Idle | Self::Email => None,
        }
    }

    /// Question text asked at this step.
    pub fn prompt(&self) -> Option<&'static str> {
        match self.number() {
            0 => None,
            n => QUESTIONS.get(usize::from(n) - 1).copied(),
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for SurveyStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::FullName => "full_name",
            Self::Specialization => "specialization",
            Self::Source => "source",
            Self::Location => "location",
            Self::Email => "email",
        };
        write!(f, "{s}")
    }
}

/// Answers collected so far. Each field stays `None` until its question is answered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyAnswers {
    pub full_name: Option<String>,
    pub specialization: Option<String>,
    pub source: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
}

impl SurveyAnswers {
    /// Store `text` as the answer to the question asked at `step`.
    fn record(&mut self, step: SurveyStep, text: &str) {
        let slot = match step {
            SurveyStep::Idle => return,
            SurveyStep::FullName => &mut self.full_name,
            SurveyStep::Specialization => &mut self.specialization,
            SurveyStep::Source => &mut self.source,
            SurveyStep::Location => &mut self.location,
            SurveyStep::Email => &mut self.email,
        };
        *slot = Some(text.to_string());
    }
}

/// Per-chat survey state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub step: SurveyStep,
    pub answers: SurveyAnswers,
}

impl Session {
    /// A freshly started survey, waiting for the first answer.
    pub fn started() -> Self {
        Self {
            step: SurveyStep::FullName,
            answers: SurveyAnswers::default(),
        }
    }

    /// The idle form a session returns to after completion.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn current_step(&self) -> u8 {
        self.step.number()
    }
}

/// Result of feeding one event through the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Session to store. `None` when the chat has no session and none is created.
    pub session: Option<Session>,
    /// Messages to send, in order.
    pub prompts: Vec<String>,
    /// Set when the email answer was just recorded.
    pub is_complete: bool,
}

/// Begin (or restart) the survey. Any previous progress is discarded.
pub fn start() -> Transition {
    let session = Session::started();
    let mut prompts = vec![GREETING.to_string()];
    prompts.extend(session.step.prompt().map(str::to_string));
    Transition {
        session: Some(session),
        prompts,
        is_complete: false,
    }
}

/// Apply a free-text answer to the chat's session.
///
/// Text is stored verbatim, blank strings included. Without an active
/// session the only reply is the start reminder and nothing is stored.
pub fn answer(session: Option<&Session>, text: &str) -> Transition {
    let Some(current) = session.filter(|s| s.step.is_active()) else {
        return Transition {
            session: session.cloned(),
            prompts: vec![START_REMINDER.to_string()],
            is_complete: false,
        };
    };

    let mut updated = current.clone();
    updated.answers.record(current.step, text);

    match current.step.next() {
        Some(next) => {
            updated.step = next;
            Transition {
                session: Some(updated),
                prompts: next.prompt().map(str::to_string).into_iter().collect(),
                is_complete: false,
            }
        }
        // Last question: the step stays on Email until the orchestrator resets it.
        None => Transition {
            session: Some(updated),
            prompts: Vec::new(),
            is_complete: true,
        },
    }
}
