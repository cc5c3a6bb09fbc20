//! SurveyBot — routes chat messages through the questionnaire, sends the
//! replies, and runs discount verification when a survey completes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::discount::{self, DiscountVerifier};

use super::prompts::{self, THANK_YOU};
use super::questionnaire::{self, Session};
use super::session::SessionStore;

/// Command that (re)starts the survey.
pub const START_COMMAND: &str = "/start";

/// What an inbound message means to the survey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// `/start`, optionally addressed (`/start@bot`) or with a payload.
    Start,
    /// Free text: an answer, or premature input before `/start`.
    Text(String),
    /// Any other slash command. Never treated as an answer.
    Command(String),
}

impl ChatEvent {
    pub fn classify(content: &str) -> Self {
        if !content.starts_with('/') {
            return Self::Text(content.to_string());
        }

        let token = content.split_whitespace().next().unwrap_or(content);
        let command = token.split('@').next().unwrap_or(token);
        if command == START_COMMAND {
            Self::Start
        } else {
            Self::Command(command.to_string())
        }
    }
}

/// Per-chat queue feeding one worker task.
struct ChatWorker {
    tx: mpsc::UnboundedSender<IncomingMessage>,
}

/// A worker's queue, handed back to the run loop when the worker stops.
struct IdleWorker {
    chat_id: String,
    rx: mpsc::UnboundedReceiver<IncomingMessage>,
}

/// Owns a worker's queue and returns it to the run loop on drop, panics
/// included, so no queued message is lost and the map entry can be retired.
struct WorkerGuard {
    idle: Option<IdleWorker>,
    done: mpsc::UnboundedSender<IdleWorker>,
}

impl WorkerGuard {
    /// Next message already queued for this chat, without waiting.
    fn next_queued(&mut self) -> Option<IncomingMessage> {
        self.idle.as_mut()?.rx.try_recv().ok()
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if let Some(idle) = self.idle.take() {
            if std::thread::panicking() {
                tracing::error!(chat_id = %idle.chat_id, "Chat worker panicked");
            }
            let _ = self.done.send(idle);
        }
    }
}

/// The conversation orchestrator.
pub struct SurveyBot {
    channel: Arc<dyn Channel>,
    verifier: Arc<dyn DiscountVerifier>,
    store: Arc<SessionStore>,
    live_workers: AtomicUsize,
}

impl SurveyBot {
    pub fn new(
        channel: Arc<dyn Channel>,
        verifier: Arc<dyn DiscountVerifier>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            channel,
            verifier,
            store,
            live_workers: AtomicUsize::new(0),
        }
    }

    /// Number of chats with a worker currently attached in [`SurveyBot::run`].
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Relaxed)
    }

    // ── Main loop ───────────────────────────────────────────────────

    /// Consume the channel's messages until the stream ends or `shutdown`
    /// resolves.
    ///
    /// Each chat with pending messages gets one worker task, so one chat's
    /// messages are handled strictly one after another (verification call
    /// included) while other chats proceed in parallel. A worker stops as
    /// soon as its queue is empty and the chat's entry is dropped. On exit,
    /// messages the stream has already produced and every queued message are
    /// handled before returning.
    pub async fn run<S>(self: Arc<Self>, mut messages: MessageStream, shutdown: S)
    where
        S: Future<Output = ()> + Send,
    {
        let mut workers: HashMap<String, ChatWorker> = HashMap::new();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<IdleWorker>();
        tokio::pin!(shutdown);

        tracing::info!(channel = self.channel.name(), "Survey bot ready and listening");

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    // Updates already pulled from the platform are acknowledged
                    // there and will not be redelivered.
                    let mut drained = 0usize;
                    while let Some(Some(message)) = messages.next().now_or_never() {
                        self.dispatch(&mut workers, &done_tx, message);
                        drained += 1;
                    }
                    tracing::info!(drained, "Shutdown requested, stopping survey bot...");
                    break;
                }
                Some(idle) = done_rx.recv() => self.retire(&mut workers, &done_tx, idle),
                msg = messages.next() => match msg {
                    Some(message) => self.dispatch(&mut workers, &done_tx, message),
                    None => {
                        tracing::info!("Channel stream ended, stopping survey bot...");
                        break;
                    }
                },
            }
        }

        // Every worker hands its queue back when it stops, so this ends once
        // all queued messages are handled.
        while !workers.is_empty() {
            match done_rx.recv().await {
                Some(idle) => self.retire(&mut workers, &done_tx, idle),
                None => break,
            }
        }
    }

    /// Queue a message on its chat's worker, spawning the worker if the chat
    /// has none.
    fn dispatch(
        self: &Arc<Self>,
        workers: &mut HashMap<String, ChatWorker>,
        done: &mpsc::UnboundedSender<IdleWorker>,
        message: IncomingMessage,
    ) {
        let chat_id = message.chat_id.clone();

        let message = match workers.get(&chat_id) {
            Some(worker) => match worker.tx.send(message) {
                Ok(()) => return,
                Err(mpsc::error::SendError(message)) => {
                    tracing::warn!(chat_id = %chat_id, "Chat queue closed, replacing worker");
                    message
                }
            },
            None => message,
        };

        let (tx, rx) = mpsc::unbounded_channel::<IncomingMessage>();
        self.spawn_worker(chat_id.clone(), message, rx, done.clone());
        workers.insert(chat_id, ChatWorker { tx });
        self.live_workers.store(workers.len(), Ordering::Relaxed);
    }

    /// A worker stopped. Restart it if messages arrived meanwhile, otherwise
    /// forget the chat.
    fn retire(
        self: &Arc<Self>,
        workers: &mut HashMap<String, ChatWorker>,
        done: &mpsc::UnboundedSender<IdleWorker>,
        idle: IdleWorker,
    ) {
        let IdleWorker { chat_id, mut rx } = idle;
        match rx.try_recv() {
            Ok(next) => self.spawn_worker(chat_id, next, rx, done.clone()),
            Err(_) => {
                workers.remove(&chat_id);
                tracing::trace!(chat_id = %chat_id, "Chat worker retired");
            }
        }
        self.live_workers.store(workers.len(), Ordering::Relaxed);
    }

    fn spawn_worker(
        self: &Arc<Self>,
        chat_id: String,
        first: IncomingMessage,
        rx: mpsc::UnboundedReceiver<IncomingMessage>,
        done: mpsc::UnboundedSender<IdleWorker>,
    ) {
        let bot = Arc::clone(self);
        tokio::spawn(async move {
            let mut guard = WorkerGuard {
                idle: Some(IdleWorker { chat_id, rx }),
                done,
            };
            bot.handle_message(&first).await;
            while let Some(message) = guard.next_queued() {
                bot.handle_message(&message).await;
            }
        });
    }

    // ── Event handling ──────────────────────────────────────────────

    /// Handle one inbound message to completion.
    pub async fn handle_message(&self, message: &IncomingMessage) {
        tracing::debug!(
            channel = %message.channel,
            chat_id = %message.chat_id,
            user = message.user_name.as_deref().unwrap_or("unknown"),
            "Message received"
        );

        match ChatEvent::classify(&message.content) {
            ChatEvent::Start => self.handle_start(message).await,
            ChatEvent::Text(text) => self.handle_text(message, &text).await,
            ChatEvent::Command(command) => {
                tracing::debug!(
                    chat_id = %message.chat_id,
                    command = %command,
                    "Ignoring unsupported command"
                );
            }
        }
    }

    /// `/start`: reset the chat's session and ask the first question.
    async fn handle_start(&self, message: &IncomingMessage) {
        let chat_id = message.chat_id.as_str();
        if let Some(previous) = self.store.get(chat_id).await {
            if previous.step.is_active() {
                tracing::info!(
                    chat_id,
                    step = %previous.step,
                    "Restart discards survey in progress"
                );
            }
        }

        let transition = questionnaire::start();
        if let Some(session) = transition.session {
            self.store.set(chat_id, session).await;
        }
        tracing::info!(
            chat_id,
            user = message.user_name.as_deref().unwrap_or("unknown"),
            received_at = %message.received_at,
            queued_ms = message.age().num_milliseconds(),
            "Survey started"
        );

        self.send_all(chat_id, &transition.prompts).await;
    }

    /// Free text: record it as the current answer, or remind to `/start`.
    async fn handle_text(&self, message: &IncomingMessage, text: &str) {
        let chat_id = message.chat_id.as_str();
        let current = self.store.get(chat_id).await;
        let transition = questionnaire::answer(current.as_ref(), text);

        if transition.session != current {
            if let Some(session) = transition.session.clone() {
                self.store.set(chat_id, session).await;
            }
        }

        self.send_all(chat_id, &transition.prompts).await;

        if transition.is_complete {
            if let Some(session) = transition.session {
                self.finish(message, session).await;
            }
        }
    }

    /// Verify the email, report the results, and reset the chat's session.
    ///
    /// Sends are strictly ordered: verification status, summary, thank-you.
    /// The reset happens even if a send fails.
    async fn finish(&self, message: &IncomingMessage, session: Session) {
        let chat_id = message.chat_id.as_str();
        let email = session.answers.email.clone().unwrap_or_default();
        let status = self.verifier.verify(&email).await;
        let verified = !discount::is_failure(&status);

        tracing::info!(
            chat_id,
            user = message.user_name.as_deref().unwrap_or("unknown"),
            verified,
            elapsed_ms = message.age().num_milliseconds(),
            "Survey completed"
        );

        self.send(chat_id, &status).await;
        self.send(chat_id, &prompts::summary(&session.answers, verified))
            .await;
        self.send(chat_id, THANK_YOU).await;

        self.store.set(chat_id, Session::idle()).await;
    }

    async fn send_all(&self, chat_id: &str, texts: &[String]) {
        for text in texts {
            self.send(chat_id, text).await;
        }
    }

    /// Send one message; failures are logged and do not interrupt the flow.
    async fn send(&self, chat_id: &str, text: &str) {
        if let Err(e) = self
            .channel
            .respond(chat_id, OutgoingResponse::text(text))
            .await
        {
            tracing::error!(chat_id, error = %e, "Failed to send message");
        }
    }
}
