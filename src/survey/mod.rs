//! Survey flow — five questions over chat, then a discount check.
//!
//! `questionnaire` holds the pure state machine, `session` the per-chat
//! store, `prompts` the fixed texts, and `bot` the orchestrator that ties
//! them to a channel and the discount service.

pub mod bot;
pub mod prompts;
pub mod questionnaire;
pub mod session;

pub use bot::{ChatEvent, SurveyBot};
pub use questionnaire::{Session, SurveyAnswers, SurveyStep, Transition};
pub use session::SessionStore;
