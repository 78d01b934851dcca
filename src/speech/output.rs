//! Speech output queue
//!
//! Replies are spoken strictly one at a time in arrival order. A watchdog
//! recovers from engines that silently drop an utterance, and regaining
//! visibility resumes or resubmits speech the platform paused.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use uuid::Uuid;

use super::SynthesisError;
use super::voice::{Voice, base_language, select_voice, target_locale};

/// How long an utterance may go without the engine speaking
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(3);

/// Pause before moving on after a failed utterance
pub const ERROR_ADVANCE_DELAY: Duration = Duration::from_millis(500);

/// What the engine is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStatus {
    pub speaking: bool,
    pub pending: bool,
    pub paused: bool,
}

impl EngineStatus {
    /// Nothing speaking, queued or paused
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            speaking: false,
            pending: false,
            paused: false,
        }
    }

    const fn busy(self) -> bool {
        self.speaking || self.pending
    }
}

/// One utterance handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: Uuid,
    pub text: String,
    /// Locale to speak in
    pub lang: String,
    /// `None` selects the engine default voice
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Effect requested from the driver
#[derive(Debug, Clone, PartialEq)]
pub enum OutputAction {
    Cancel,
    Speak(Utterance),
    Resume,
}

#[derive(Debug, Clone)]
struct QueueEntry {
    text: String,
    language: Option<String>,
}

/// FIFO utterance queue
#[derive(Debug, Default)]
pub struct SpeechQueue {
    queue: VecDeque<QueueEntry>,
    current: Option<Utterance>,
    speaking: bool,
    voices: Vec<Voice>,
    watchdog: Option<Instant>,
    advance_at: Option<Instant>,
}

impl SpeechQueue {
    #[must_use]
    pub fn new(voices: Vec<Voice>) -> Self {
        Self {
            voices,
            ..Self::default()
        }
    }

    /// Replace the available voices (engines often load them late)
    pub fn set_voices(&mut self, voices: Vec<Voice>) {
        self.voices = voices;
    }

    /// Whether speech is queued or playing
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// The utterance handed to the engine, if any
    #[must_use]
    pub const fn current(&self) -> Option<&Utterance> {
        self.current.as_ref()
    }

    /// Entries waiting behind the current utterance
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Nothing queued, playing or about to advance
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.current.is_none() && self.advance_at.is_none()
    }

    /// Add text to speak, optionally with a detected language code
    pub fn enqueue(
        &mut self,
        text: impl Into<String>,
        language: Option<String>,
        engine: EngineStatus,
        now: Instant,
    ) -> Vec<OutputAction> {
        self.queue.push_back(QueueEntry {
            text: text.into(),
            language,
        });
        self.speaking = true;

        if self.current.is_none() && self.advance_at.is_none() {
            self.play_next(engine, now)
        } else {
            Vec::new()
        }
    }

    /// The engine started speaking `id`
    pub fn on_start(&mut self, id: Uuid) {
        if self.is_current(id) {
            tracing::trace!(%id, "utterance started");
        }
    }

    /// The engine finished `id`
    pub fn on_end(&mut self, id: Uuid, now: Instant) -> Vec<OutputAction> {
        if !self.is_current(id) {
            return Vec::new();
        }
        self.current = None;
        self.watchdog = None;
        self.play_next(EngineStatus::idle(), now)
    }

    /// The engine failed `id`; the next entry plays after a short delay
    pub fn on_error(&mut self, id: Uuid, error: &SynthesisError, now: Instant) {
        if !self.is_current(id) {
            return;
        }
        match error {
            SynthesisError::Interrupted => {
                tracing::warn!(%id, "speech synthesis was interrupted");
            }
            other => tracing::error!(%id, error = %other, "speech synthesis error"),
        }
        self.current = None;
        self.watchdog = None;
        self.advance_at = Some(now + ERROR_ADVANCE_DELAY);
    }

    /// Visibility of the hosting surface changed
    pub fn on_visibility(
        &mut self,
        visible: bool,
        engine: EngineStatus,
        now: Instant,
    ) -> Vec<OutputAction> {
        if !visible {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if engine.paused {
            actions.push(OutputAction::Resume);
        }

        if self.speaking && !engine.busy() {
            if let Some(current) = &self.current {
                tracing::debug!(id = %current.id, "resubmitting utterance after visibility change");
                actions.push(OutputAction::Speak(current.clone()));
                self.watchdog = Some(now + WATCHDOG_TIMEOUT);
            } else if self.advance_at.is_none() {
                actions.extend(self.play_next(engine, now));
            }
        }
        actions
    }

    /// Earliest pending timer
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.watchdog, self.advance_at].into_iter().flatten().min()
    }

    /// Fire any timers that are due
    pub fn tick(&mut self, engine: EngineStatus, now: Instant) -> Vec<OutputAction> {
        if self.advance_at.is_some_and(|t| t <= now) {
            self.advance_at = None;
            return self.play_next(engine, now);
        }

        if self.watchdog.is_some_and(|t| t <= now) {
            if engine.busy() {
                self.watchdog = Some(now + WATCHDOG_TIMEOUT);
                return Vec::new();
            }
            tracing::warn!("speech synthesis appears stuck, resetting");
            self.current = None;
            self.watchdog = None;
            return self.play_next(engine, now);
        }

        Vec::new()
    }

    fn is_current(&self, id: Uuid) -> bool {
        self.current.as_ref().is_some_and(|u| u.id == id)
    }

    fn play_next(&mut self, engine: EngineStatus, now: Instant) -> Vec<OutputAction> {
        let Some(entry) = self.queue.pop_front() else {
            self.speaking = false;
            return Vec::new();
        };

        let mut actions = Vec::with_capacity(2);
        if engine.busy() || self.current.is_some() {
            actions.push(OutputAction::Cancel);
        }

        let utterance = self.utterance_for(entry);
        tracing::debug!(id = %utterance.id, lang = %utterance.lang, "speaking utterance");

        self.current = Some(utterance.clone());
        self.watchdog = Some(now + WATCHDOG_TIMEOUT);
        actions.push(OutputAction::Speak(utterance));
        actions
    }

    fn utterance_for(&self, entry: QueueEntry) -> Utterance {
        let target = target_locale(&entry.text, entry.language.as_deref());
        let voice = select_voice(&self.voices, &target).cloned();
        let lang = voice.as_ref().map_or_else(
            || {
                tracing::debug!(%target, "no matching voice, using engine default");
                base_language(&target).to_string()
            },
            |v| v.lang.clone(),
        );

        Utterance {
            id: Uuid::new_v4(),
            text: entry.text,
            lang,
            voice,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// Events a synthesis engine reports to the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Started(Uuid),
    Ended(Uuid),
    Failed(Uuid, SynthesisError),
}

/// Requests from the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputCommand {
    Speak {
        text: String,
        language: Option<String>,
    },
    Visibility(bool),
}

/// A speech synthesis engine
///
/// Engines report progress through the [`OutputEvent`] channel handed to them
/// at construction.
pub trait SpeechSynthesizer: Send {
    /// Voices currently available
    fn voices(&self) -> Vec<Voice>;

    fn status(&self) -> EngineStatus;

    fn speak(&mut self, utterance: Utterance);

    /// Drop the current and any queued engine utterances
    fn cancel(&mut self);

    fn resume(&mut self);
}

/// Drive a [`SpeechQueue`] against a synthesizer
///
/// Runs until the command channel closes and the queue has drained, or the
/// engine channel closes.
pub async fn run_speech_output<S: SpeechSynthesizer>(
    mut synthesizer: S,
    mut commands: mpsc::UnboundedReceiver<OutputCommand>,
    mut engine_events: mpsc::UnboundedReceiver<OutputEvent>,
) {
    let mut queue = SpeechQueue::new(synthesizer.voices());
    let mut accepting = true;

    loop {
        if !accepting && queue.is_idle() {
            break;
        }
        let deadline = queue.next_deadline();

        let actions = tokio::select! {
            command = commands.recv(), if accepting => match command {
                Some(OutputCommand::Speak { text, language }) => {
                    if queue.current().is_none() {
                        queue.set_voices(synthesizer.voices());
                    }
                    queue.enqueue(text, language, synthesizer.status(), Instant::now())
                }
                Some(OutputCommand::Visibility(visible)) => {
                    queue.on_visibility(visible, synthesizer.status(), Instant::now())
                }
                None => {
                    accepting = false;
                    Vec::new()
                }
            },
            event = engine_events.recv() => match event {
                Some(OutputEvent::Started(id)) => {
                    queue.on_start(id);
                    Vec::new()
                }
                Some(OutputEvent::Ended(id)) => queue.on_end(id, Instant::now()),
                Some(OutputEvent::Failed(id, e)) => {
                    queue.on_error(id, &e, Instant::now());
                    Vec::new()
                }
                None => {
                    tracing::warn!("synthesis engine channel closed");
                    break;
                }
            },
            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                queue.tick(synthesizer.status(), Instant::now())
            }
        };

        for action in actions {
            match action {
                OutputAction::Cancel => synthesizer.cancel(),
                OutputAction::Speak(utterance) => synthesizer.speak(utterance),
                OutputAction::Resume => synthesizer.resume(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speak_id(actions: &[OutputAction]) -> Uuid {
        actions
            .iter()
            .find_map(|a| match a {
                OutputAction::Speak(u) => Some(u.id),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn plays_in_arrival_order_one_at_a_time() {
        let now = Instant::now();
        let mut queue = SpeechQueue::default();

        let first = queue.enqueue("moja", None, EngineStatus::idle(), now);
        let second = queue.enqueue("mbili", None, EngineStatus::idle(), now);

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.current().unwrap().text, "moja");

        let id = speak_id(&first);
        let next = queue.on_end(id, now);
        let OutputAction::Speak(utterance) = &next[0] else {
            panic!("expected speak, got {next:?}");
        };
        assert_eq!(utterance.text, "mbili");
    }

    #[test]
    fn queue_drain_clears_speaking_flag() {
        let now = Instant::now();
        let mut queue = SpeechQueue::default();
        let id = speak_id(&queue.enqueue("moja", None, EngineStatus::idle(), now));
        assert!(queue.is_speaking());

        assert!(queue.on_end(id, now).is_empty());
        assert!(!queue.is_speaking());
        assert!(queue.is_idle());
    }

    #[test]
    fn busy_engine_is_cancelled_before_speaking() {
        let mut queue = SpeechQueue::default();
        let busy = EngineStatus {
            speaking: true,
            ..EngineStatus::idle()
        };
        let actions = queue.enqueue("habari", None, busy, Instant::now());
        assert_eq!(actions[0], OutputAction::Cancel);
        assert!(matches!(actions[1], OutputAction::Speak(_)));
    }

    #[test]
    fn stale_events_are_ignored() {
        let now = Instant::now();
        let mut queue = SpeechQueue::default();
        queue.enqueue("moja", None, EngineStatus::idle(), now);

        assert!(queue.on_end(Uuid::new_v4(), now).is_empty());
        queue.on_error(Uuid::new_v4(), &SynthesisError::Interrupted, now);
        assert!(queue.current().is_some());
    }

    #[test]
    fn error_advances_after_delay() {
        let now = Instant::now();
        let mut queue = SpeechQueue::default();
        let id = speak_id(&queue.enqueue("moja", None, EngineStatus::idle(), now));
        queue.enqueue("mbili", None, EngineStatus::idle(), now);

        queue.on_error(id, &SynthesisError::Other("synthesis-failed".to_string()), now);
        assert!(queue.current().is_none());
        assert!(queue.tick(EngineStatus::idle(), now).is_empty());

        let actions = queue.tick(EngineStatus::idle(), now + ERROR_ADVANCE_DELAY);
        assert_eq!(queue.current().unwrap().text, "mbili");
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn watchdog_rearms_while_engine_speaks() {
        let now = Instant::now();
        let mut queue = SpeechQueue::default();
        queue.enqueue("moja", None, EngineStatus::idle(), now);

        let speaking = EngineStatus {
            speaking: true,
            ..EngineStatus::idle()
        };
        assert!(queue.tick(speaking, now + WATCHDOG_TIMEOUT).is_empty());
        assert_eq!(
            queue.next_deadline(),
            Some(now + WATCHDOG_TIMEOUT + WATCHDOG_TIMEOUT)
        );
        assert!(queue.current().is_some());
    }

    #[test]
    fn watchdog_recovers_stuck_engine() {
        let now = Instant::now();
        let mut queue = SpeechQueue::default();
        queue.enqueue("moja", None, EngineStatus::idle(), now);
        queue.enqueue("mbili", None, EngineStatus::idle(), now);

        let actions = queue.tick(EngineStatus::idle(), now + WATCHDOG_TIMEOUT);

        assert_eq!(actions.len(), 1);
        assert_eq!(queue.current().unwrap().text, "mbili");
    }

    #[test]
    fn visibility_resumes_paused_engine() {
        let now = Instant::now();
        let mut queue = SpeechQueue::default();
        queue.enqueue("moja", None, EngineStatus::idle(), now);

        let paused = EngineStatus {
            speaking: true,
            paused: true,
            ..EngineStatus::idle()
        };
        assert_eq!(
            queue.on_visibility(true, paused, now),
            vec![OutputAction::Resume]
        );
        assert!(queue.on_visibility(false, paused, now).is_empty());
    }

    #[test]
    fn visibility_resubmits_dropped_utterance() {
        let now = Instant::now();
        let mut queue = SpeechQueue::default();
        queue.enqueue("moja", None, EngineStatus::idle(), now);
        let id = queue.current().unwrap().id;

        let actions = queue.on_visibility(true, EngineStatus::idle(), now);
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], OutputAction::Speak(u) if u.id == id));
    }

    #[test]
    fn voice_follows_detected_language() {
        let mut queue = SpeechQueue::new(vec![
            Voice::new("Alex", "en-US"),
            Voice::new("Ezinne (Nigeria)", "en-NG"),
        ]);
        queue.enqueue("Ẹ kú àárọ̀", Some("yo".to_string()), EngineStatus::idle(), Instant::now());

        let utterance = queue.current().unwrap();
        assert_eq!(utterance.lang, "en-NG");
        assert!((utterance.rate - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_voice_uses_base_language() {
        let mut queue = SpeechQueue::default();
        queue.enqueue("Habari", Some("sw".to_string()), EngineStatus::idle(), Instant::now());

        let utterance = queue.current().unwrap();
        assert_eq!(utterance.lang, "sw");
        assert!(utterance.voice.is_none());
    }
}
