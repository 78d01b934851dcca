//! Terminal speech engines
//!
//! Lines typed on stdin stand in for recognised speech, and utterances are
//! printed with a simulated speaking time. This runs the full voice loop
//! without audio hardware.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::input::{RecognitionEvent, RecognitionId, RecognitionOptions, Recognizer};
use super::output::{EngineStatus, OutputEvent, SpeechSynthesizer, Utterance};
use super::voice::Voice;
use super::{RecognitionError, SynthesisError};

/// Simulated speaking time per word
const WORD_DURATION: Duration = Duration::from_millis(120);

/// Reads one stdin line per recognition session
pub struct ConsoleRecognizer {
    lines: Arc<AsyncMutex<Lines<BufReader<Stdin>>>>,
    events: mpsc::UnboundedSender<(RecognitionId, RecognitionEvent)>,
    task: Option<(RecognitionId, JoinHandle<()>)>,
}

impl std::fmt::Debug for ConsoleRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleRecognizer")
            .field("active", &self.task.is_some())
            .finish_non_exhaustive()
    }
}

impl ConsoleRecognizer {
    #[must_use]
    pub fn new(events: mpsc::UnboundedSender<(RecognitionId, RecognitionEvent)>) -> Self {
        Self {
            lines: Arc::new(AsyncMutex::new(BufReader::new(tokio::io::stdin()).lines())),
            events,
            task: None,
        }
    }
}

#[async_trait]
impl Recognizer for ConsoleRecognizer {
    async fn request_permission(&mut self) -> Result<(), RecognitionError> {
        Ok(())
    }

    fn start(
        &mut self,
        id: RecognitionId,
        _options: &RecognitionOptions,
    ) -> Result<(), RecognitionError> {
        self.stop();

        let lines = Arc::clone(&self.lines);
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let next = lines.lock().await.next_line().await;
            let event = match next {
                Ok(Some(line)) => {
                    let _ = events.send((id, RecognitionEvent::Result(line)));
                    RecognitionEvent::End
                }
                Ok(None) => RecognitionEvent::Error(RecognitionError::Other(
                    "end of input".to_string(),
                )),
                Err(e) => RecognitionEvent::Error(RecognitionError::Other(e.to_string())),
            };
            let _ = events.send((id, event));
        });
        self.task = Some((id, task));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some((id, task)) = self.task.take()
            && !task.is_finished()
        {
            task.abort();
            let _ = self.events.send((id, RecognitionEvent::End));
        }
    }
}

/// Prints utterances and reports them finished after a simulated duration
pub struct ConsoleSynthesizer {
    events: mpsc::UnboundedSender<OutputEvent>,
    status: Arc<Mutex<EngineStatus>>,
    current: Option<(uuid::Uuid, JoinHandle<()>)>,
    word_duration: Duration,
}

impl std::fmt::Debug for ConsoleSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSynthesizer")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl ConsoleSynthesizer {
    #[must_use]
    pub fn new(events: mpsc::UnboundedSender<OutputEvent>) -> Self {
        Self::with_word_duration(events, WORD_DURATION)
    }

    #[must_use]
    pub fn with_word_duration(
        events: mpsc::UnboundedSender<OutputEvent>,
        word_duration: Duration,
    ) -> Self {
        Self {
            events,
            status: Arc::new(Mutex::new(EngineStatus::idle())),
            current: None,
            word_duration,
        }
    }

    fn set_speaking(status: &Mutex<EngineStatus>, speaking: bool) {
        status.lock().unwrap_or_else(|e| e.into_inner()).speaking = speaking;
    }
}

impl SpeechSynthesizer for ConsoleSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        vec![Voice::new("Console", "en")]
    }

    fn status(&self) -> EngineStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn speak(&mut self, utterance: Utterance) {
        println!("🔊 [{}] {}", utterance.lang, utterance.text);

        let words = u32::try_from(utterance.text.split_whitespace().count()).unwrap_or(u32::MAX);
        let duration = self.word_duration.saturating_mul(words.max(1));
        let id = utterance.id;
        let events = self.events.clone();
        let status = Arc::clone(&self.status);

        Self::set_speaking(&status, true);
        let task = tokio::spawn(async move {
            let _ = events.send(OutputEvent::Started(id));
            tokio::time::sleep(duration).await;
            Self::set_speaking(&status, false);
            let _ = events.send(OutputEvent::Ended(id));
        });
        self.current = Some((id, task));
    }

    fn cancel(&mut self) {
        if let Some((id, task)) = self.current.take() {
            task.abort();
            Self::set_speaking(&self.status, false);
            let _ = self.events.send(OutputEvent::Failed(id, SynthesisError::Interrupted));
        }
    }

    fn resume(&mut self) {
        self.status.lock().unwrap_or_else(|e| e.into_inner()).paused = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utterance(text: &str) -> Utterance {
        Utterance {
            id: uuid::Uuid::new_v4(),
            text: text.to_string(),
            lang: "en".to_string(),
            voice: None,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reports_start_then_end() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut synth = ConsoleSynthesizer::with_word_duration(tx, Duration::from_millis(100));
        let u = utterance("three short words");

        synth.speak(u.clone());
        assert!(synth.status().speaking);

        assert_eq!(rx.recv().await, Some(OutputEvent::Started(u.id)));
        assert_eq!(rx.recv().await, Some(OutputEvent::Ended(u.id)));
        assert!(!synth.status().speaking);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_current() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut synth = ConsoleSynthesizer::new(tx);
        let u = utterance("a long reply about the Swahili coast");

        synth.speak(u.clone());
        synth.cancel();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.contains(&OutputEvent::Failed(u.id, SynthesisError::Interrupted)));
        assert!(!events.contains(&OutputEvent::Ended(u.id)));
        assert!(!synth.status().speaking);
    }
}
