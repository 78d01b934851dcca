//! Speech input controller
//!
//! Tracks one recognition session at a time. A final transcript is submitted
//! after 3 s of silence, when the user stops manually (after a short grace
//! for trailing results), or when the engine ends on its own.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use super::RecognitionError;

/// Silence after the last result that ends an utterance
pub const SILENCE_TIMEOUT: Duration = Duration::from_secs(3);

/// How long to wait for any speech before giving up
pub const NO_SPEECH_TIMEOUT: Duration = Duration::from_secs(8);

/// Grace period after a manual stop for trailing results
pub const STOP_GRACE: Duration = Duration::from_millis(500);

/// Delay before the automatic retry after a first no-speech error
pub const NO_SPEECH_RETRY_DELAY: Duration = Duration::from_millis(1500);

/// Engine options for a recognition session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: u8,
    /// Empty for automatic language detection
    pub language: String,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            continuous: true,
            interim_results: true,
            max_alternatives: 3,
            language: String::new(),
        }
    }
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Idle,
    Listening,
    /// Manual stop issued; trailing results still count
    Stopping,
    /// Waiting to restart after a no-speech error
    RetryPending,
}

/// User-facing feedback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hint {
    NoSpeech,
    PermissionDenied,
    Failed(String),
}

/// Identifies one recognition session
///
/// Engines tag every event with the id they were started with, so reports
/// from a stopped session cannot reach the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RecognitionId(u64);

impl RecognitionId {
    const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for RecognitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Effect requested from the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    StartRecognition {
        id: RecognitionId,
        options: RecognitionOptions,
    },
    StopRecognition,
    Submit(String),
    Hint(Hint),
}

#[derive(Debug, Clone, Copy, Default)]
struct Timers {
    silence: Option<Instant>,
    no_speech: Option<Instant>,
    stop_grace: Option<Instant>,
    retry: Option<Instant>,
}

/// Recognition state machine
#[derive(Debug)]
pub struct SpeechInput {
    state: InputState,
    session: RecognitionId,
    options: RecognitionOptions,
    transcript: String,
    heard_speech: bool,
    recognizer_active: bool,
    consecutive_no_speech: u32,
    timers: Timers,
}

impl Default for SpeechInput {
    fn default() -> Self {
        Self::new(RecognitionOptions::default())
    }
}

impl SpeechInput {
    #[must_use]
    pub fn new(options: RecognitionOptions) -> Self {
        Self {
            state: InputState::Idle,
            session: RecognitionId::default(),
            options,
            transcript: String::new(),
            heard_speech: false,
            recognizer_active: false,
            consecutive_no_speech: 0,
            timers: Timers::default(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> InputState {
        self.state
    }

    /// Latest transcript of the current session
    #[must_use]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Id of the most recently started session
    #[must_use]
    pub const fn session(&self) -> RecognitionId {
        self.session
    }

    /// Whether a recognizer has been started and not yet stopped or ended
    #[must_use]
    pub const fn recognizer_active(&self) -> bool {
        self.recognizer_active
    }

    /// Begin a recognition session
    ///
    /// A transcript held over from a manual stop is submitted first.
    pub fn start(&mut self, now: Instant) -> Vec<InputAction> {
        let mut actions = Vec::with_capacity(3);
        if self.state == InputState::Stopping {
            actions.extend(self.submission());
        }
        if self.recognizer_active {
            actions.push(InputAction::StopRecognition);
        }

        self.session = self.session.next();
        self.state = InputState::Listening;
        self.transcript.clear();
        self.heard_speech = false;
        self.recognizer_active = true;
        self.timers = Timers {
            no_speech: Some(now + NO_SPEECH_TIMEOUT),
            ..Timers::default()
        };

        tracing::debug!(session = %self.session, "starting speech recognition");
        actions.push(InputAction::StartRecognition {
            id: self.session,
            options: self.options.clone(),
        });
        actions
    }

    /// Microphone access was refused before the session could start
    pub fn permission_denied(&mut self) -> Vec<InputAction> {
        tracing::warn!("microphone permission denied");
        self.reset_to_idle();
        vec![InputAction::Hint(Hint::PermissionDenied)]
    }

    /// Apply an engine event; events from earlier sessions are dropped
    pub fn on_event(
        &mut self,
        id: RecognitionId,
        event: &RecognitionEvent,
        now: Instant,
    ) -> Vec<InputAction> {
        if id != self.session {
            tracing::trace!(%id, current = %self.session, ?event, "ignoring stale recognition event");
            return Vec::new();
        }

        match event {
            RecognitionEvent::Result(text) => {
                self.on_result(text, now);
                Vec::new()
            }
            RecognitionEvent::Error(e) => self.on_error(e, now),
            RecognitionEvent::End => self.on_end(now),
        }
    }

    /// A (possibly interim) recognition result arrived
    fn on_result(&mut self, transcript: &str, now: Instant) {
        match self.state {
            InputState::Listening => {
                self.transcript = transcript.to_string();
                self.heard_speech = true;
                self.consecutive_no_speech = 0;
                self.timers.no_speech = None;
                self.timers.silence = Some(now + SILENCE_TIMEOUT);
            }
            InputState::Stopping => {
                self.transcript = transcript.to_string();
                self.consecutive_no_speech = 0;
            }
            InputState::Idle | InputState::RetryPending => {
                tracing::trace!("ignoring result outside a session");
            }
        }
    }

    /// Manual stop
    pub fn stop(&mut self, now: Instant) -> Vec<InputAction> {
        match self.state {
            InputState::Listening => {
                self.state = InputState::Stopping;
                self.recognizer_active = false;
                self.timers = Timers {
                    stop_grace: Some(now + STOP_GRACE),
                    ..Timers::default()
                };
                vec![InputAction::StopRecognition]
            }
            InputState::RetryPending => {
                self.reset_to_idle();
                Vec::new()
            }
            InputState::Idle | InputState::Stopping => Vec::new(),
        }
    }

    /// The engine reported an error
    fn on_error(&mut self, error: &RecognitionError, now: Instant) -> Vec<InputAction> {
        self.recognizer_active = false;

        if self.state == InputState::Stopping {
            tracing::trace!(%error, "ignoring recognition error during stop grace");
            return Vec::new();
        }

        match error {
            RecognitionError::NoSpeech => {
                self.consecutive_no_speech += 1;
                self.transcript.clear();
                if self.consecutive_no_speech == 1 {
                    self.state = InputState::RetryPending;
                    self.timers = Timers {
                        retry: Some(now + NO_SPEECH_RETRY_DELAY),
                        ..Timers::default()
                    };
                } else {
                    self.reset_to_idle();
                    self.consecutive_no_speech = 0;
                }
                vec![InputAction::Hint(Hint::NoSpeech)]
            }
            RecognitionError::Aborted => {
                self.reset_to_idle();
                Vec::new()
            }
            RecognitionError::NotAllowed => {
                self.reset_to_idle();
                self.consecutive_no_speech = 0;
                vec![InputAction::Hint(Hint::PermissionDenied)]
            }
            RecognitionError::Other(message) => {
                tracing::warn!(error = %message, "speech recognition error");
                self.reset_to_idle();
                self.consecutive_no_speech = 0;
                vec![InputAction::Hint(Hint::Failed(message.clone()))]
            }
        }
    }

    /// The engine ended the session
    fn on_end(&mut self, _now: Instant) -> Vec<InputAction> {
        self.recognizer_active = false;
        if self.state != InputState::Listening {
            return Vec::new();
        }

        let actions = self.submission().into_iter().collect();
        self.reset_to_idle();
        actions
    }

    /// Earliest pending timer
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let t = &self.timers;
        [t.silence, t.no_speech, t.stop_grace, t.retry]
            .into_iter()
            .flatten()
            .min()
    }

    /// Fire any timers that are due
    pub fn tick(&mut self, now: Instant) -> Vec<InputAction> {
        let due = |deadline: Option<Instant>| deadline.is_some_and(|d| d <= now);

        match self.state {
            InputState::Listening if due(self.timers.silence) => {
                tracing::debug!("silence detected, ending utterance");
                let mut actions = vec![InputAction::StopRecognition];
                actions.extend(self.submission());
                self.reset_to_idle();
                actions
            }
            InputState::Listening if due(self.timers.no_speech) && !self.heard_speech => {
                tracing::debug!("no speech detected, stopping");
                self.reset_to_idle();
                vec![InputAction::StopRecognition, InputAction::Hint(Hint::NoSpeech)]
            }
            InputState::Stopping if due(self.timers.stop_grace) => {
                let actions = self.submission().into_iter().collect();
                self.reset_to_idle();
                actions
            }
            InputState::RetryPending if due(self.timers.retry) => {
                tracing::debug!("retrying after no speech");
                self.start(now)
            }
            _ => Vec::new(),
        }
    }

    fn submission(&self) -> Option<InputAction> {
        let text = self.transcript.trim();
        (!text.is_empty()).then(|| InputAction::Submit(text.to_string()))
    }

    fn reset_to_idle(&mut self) {
        self.state = InputState::Idle;
        self.recognizer_active = false;
        self.heard_speech = false;
        self.transcript.clear();
        self.timers = Timers::default();
    }
}

/// Events a recognition engine reports to the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Result(String),
    Error(RecognitionError),
    End,
}

/// Requests from the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCommand {
    Start,
    Stop,
}

/// What the driver reports back to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Submitted(String),
    Hint(Hint),
}

/// A speech recognition engine
///
/// Engines report results through the channel handed to them at
/// construction, tagging each [`RecognitionEvent`] with the id of the session
/// that produced it.
#[async_trait]
pub trait Recognizer: Send {
    /// Acquire microphone access
    ///
    /// # Errors
    ///
    /// Returns [`RecognitionError::NotAllowed`] if access is refused
    async fn request_permission(&mut self) -> Result<(), RecognitionError>;

    /// Start a recognition session
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot start
    fn start(
        &mut self,
        id: RecognitionId,
        options: &RecognitionOptions,
    ) -> Result<(), RecognitionError>;

    /// Stop the current session; the engine reports `End` when done
    fn stop(&mut self);
}

/// Drive a [`SpeechInput`] against a recognizer until the command channel closes
pub async fn run_speech_input<R: Recognizer>(
    mut recognizer: R,
    mut commands: mpsc::UnboundedReceiver<InputCommand>,
    mut engine_events: mpsc::UnboundedReceiver<(RecognitionId, RecognitionEvent)>,
    output: mpsc::UnboundedSender<InputEvent>,
) {
    let mut machine = SpeechInput::default();

    loop {
        let deadline = machine.next_deadline();

        let actions = tokio::select! {
            command = commands.recv() => match command {
                Some(InputCommand::Start) => {
                    if machine.state() == InputState::Listening {
                        Vec::new()
                    } else if let Err(e) = recognizer.request_permission().await {
                        tracing::debug!(error = %e, "permission request failed");
                        machine.permission_denied()
                    } else {
                        machine.start(Instant::now())
                    }
                }
                Some(InputCommand::Stop) => machine.stop(Instant::now()),
                None => break,
            },
            event = engine_events.recv() => match event {
                Some((id, event)) => machine.on_event(id, &event, Instant::now()),
                None => {
                    tracing::warn!("recognition engine channel closed");
                    break;
                }
            },
            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                machine.tick(Instant::now())
            }
        };

        for action in actions {
            let delivered = match action {
                InputAction::StartRecognition { id, options } => {
                    if let Err(e) = recognizer.start(id, &options) {
                        let follow_up = machine.on_error(&e, Instant::now());
                        follow_up.into_iter().all(|a| forward(&output, a))
                    } else {
                        true
                    }
                }
                InputAction::StopRecognition => {
                    recognizer.stop();
                    true
                }
                other => forward(&output, other),
            };
            if !delivered {
                tracing::debug!("speech input listener dropped");
                recognizer.stop();
                return;
            }
        }
    }

    if machine.recognizer_active() {
        recognizer.stop();
    }
}

/// Send a submission or hint to the application; false once it is gone
fn forward(output: &mpsc::UnboundedSender<InputEvent>, action: InputAction) -> bool {
    let event = match action {
        InputAction::Submit(text) => InputEvent::Submitted(text),
        InputAction::Hint(hint) => InputEvent::Hint(hint),
        InputAction::StartRecognition { .. } | InputAction::StopRecognition => return true,
    };
    output.send(event).is_ok()
}
