//! In-memory chat sessions
//!
//! Maps a caller-chosen session id to a provider conversation. Sessions live
//! only as long as the process and are evicted after a period of inactivity
//! by a periodic sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::prompt;
use crate::provider::{
    Content, Conversation, GenerateResponse, GenerationConfig, Provider, ProviderError,
    RetryPolicy, default_safety_settings,
};

/// Shortest period the sweeper will tick at
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Shared handle to one session; the mutex serializes turns within it
pub type SessionHandle = Arc<Mutex<ChatSession>>;

/// One ongoing conversation
#[derive(Debug)]
pub struct ChatSession {
    pub session_id: String,
    pub conversation: Conversation,
    pub last_updated: DateTime<Utc>,
    pub message_count: u32,
}

impl ChatSession {
    /// Refresh the inactivity clock
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = now;
    }

    /// Whether this turn should be preceded by a reminder
    #[must_use]
    pub const fn reminder_due(&self, every: u32) -> bool {
        every > 0 && self.message_count > 0 && self.message_count % every == 0
    }

    /// Re-send the reminder turn; failures are logged and otherwise ignored
    pub async fn send_reminder(&mut self) {
        match self
            .conversation
            .send_message(prompt::REMINDER, &RetryPolicy::none())
            .await
        {
            Ok(_) => tracing::debug!(session_id = %self.session_id, "sent reminder turn"),
            Err(e) => tracing::warn!(
                session_id = %self.session_id,
                error = %e,
                "reminder turn failed"
            ),
        }
    }

    /// Send a user message and count it once the provider answers
    ///
    /// # Errors
    ///
    /// Returns the provider error after retries
    pub async fn send(
        &mut self,
        text: &str,
        policy: &RetryPolicy,
    ) -> Result<GenerateResponse, ProviderError> {
        let response = self.conversation.send_message(text, policy).await?;
        self.message_count = self.message_count.saturating_add(1);
        Ok(response)
    }

    /// Whether earlier turns inform this reply
    #[must_use]
    pub const fn has_context(&self) -> bool {
        self.message_count > 1
    }
}

/// Session id → conversation map with idle eviction
pub struct SessionStore {
    provider: Arc<dyn Provider>,
    config: SessionConfig,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create an empty store whose conversations use `provider`
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>, config: SessionConfig) -> Self {
        Self {
            provider,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Lifetime settings
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Fetch a session, creating (or replacing, with `force_reset`) it as needed
    pub async fn get_or_create(&self, session_id: &str, force_reset: bool) -> SessionHandle {
        self.get_or_create_at(session_id, force_reset, Utc::now()).await
    }

    /// Fetch or create a session as of `now`
    pub async fn get_or_create_at(
        &self,
        session_id: &str,
        force_reset: bool,
        now: DateTime<Utc>,
    ) -> SessionHandle {
        let mut sessions = self.sessions.write().await;

        if !force_reset && let Some(handle) = sessions.get(session_id) {
            // Busy sessions are touched by their own turn
            if let Ok(mut session) = handle.try_lock() {
                session.touch(now);
            }
            return Arc::clone(handle);
        }

        tracing::info!(session_id, force_reset, "creating chat session");
        let handle = Arc::new(Mutex::new(self.new_session(session_id, now)));
        sessions.insert(session_id.to_string(), Arc::clone(&handle));
        handle
    }

    fn new_session(&self, session_id: &str, now: DateTime<Utc>) -> ChatSession {
        let conversation = Conversation::new(
            Arc::clone(&self.provider),
            vec![
                Content::user(prompt::SYSTEM_INSTRUCTION),
                Content::model(prompt::GREETING),
            ],
            GenerationConfig::chat(),
            default_safety_settings(),
        );

        ChatSession {
            session_id: session_id.to_string(),
            conversation,
            last_updated: now,
            message_count: 0,
        }
    }

    /// Drop a session; returns whether it existed
    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// Whether a session is currently stored
    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Number of stored sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are stored
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Evict sessions idle for longer than the TTL; returns how many went
    ///
    /// Sessions locked by an in-flight turn are kept.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    /// Evict sessions idle for longer than the TTL as of `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let ttl = TimeDelta::from_std(self.config.ttl).unwrap_or(TimeDelta::MAX);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, handle| {
            handle
                .try_lock()
                .map_or(true, |session| now - session.last_updated <= ttl)
        });

        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, remaining = sessions.len(), "evicted idle sessions");
        }
        removed
    }

    /// Run [`Self::sweep`] on the configured interval until the task is aborted
    #[must_use]
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.sweep_interval.max(MIN_SWEEP_INTERVAL);
        tracing::debug!(interval_secs = period.as_secs(), "session sweeper started");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;
                self.sweep().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::provider::GenerateRequest;

    struct CountingProvider {
        calls: AtomicUsize,
        fail_reminders: bool,
    }

    #[async_trait]
    impl Provider for CountingProvider {
        async fn generate(
            &self,
            request: &GenerateRequest,
        ) -> Result<GenerateResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_reminders && request.last_user_text() == Some(prompt::REMINDER) {
                return Err(ProviderError::Status {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(GenerateResponse::from_text("ok"))
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn store(fail_reminders: bool) -> (Arc<CountingProvider>, SessionStore) {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_reminders,
        });
        let store = SessionStore::new(provider.clone(), SessionConfig::default());
        (provider, store)
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn new_session_is_seeded() {
        let (_, store) = store(false);
        let handle = store.get_or_create_at("s1", false, t0()).await;
        let session = handle.lock().await;

        assert_eq!(session.message_count, 0);
        assert_eq!(session.conversation.history().len(), 2);
        assert_eq!(
            session.conversation.history()[1].parts[0].text.as_deref(),
            Some(prompt::GREETING)
        );
    }

    #[tokio::test]
    async fn existing_session_is_reused_and_touched() {
        let (_, store) = store(false);
        let first = store.get_or_create_at("s1", false, t0()).await;
        first.lock().await.message_count = 4;

        let later = t0() + TimeDelta::minutes(5);
        let second = store.get_or_create_at("s1", false, later).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.last_updated, later);
    }

    #[tokio::test]
    async fn force_reset_replaces_session() {
        let (_, store) = store(false);
        let first = store.get_or_create_at("s1", false, t0()).await;
        first.lock().await.message_count = 7;

        let second = store.get_or_create_at("s1", true, t0()).await;

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.message_count, 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn sweep_evicts_only_stale_sessions() {
        let (_, store) = store(false);
        store.get_or_create_at("stale", false, t0()).await;
        let fresh_at = t0() + TimeDelta::minutes(59);
        store.get_or_create_at("fresh", false, fresh_at).await;

        let removed = store.sweep_at(t0() + TimeDelta::minutes(61)).await;

        assert_eq!(removed, 1);
        assert!(!store.contains("stale").await);
        assert!(store.contains("fresh").await);
    }

    #[tokio::test]
    async fn sweep_skips_busy_sessions() {
        let (_, store) = store(false);
        let handle = store.get_or_create_at("busy", false, t0()).await;
        let _guard = handle.lock().await;

        let removed = store.sweep_at(t0() + TimeDelta::hours(2)).await;

        assert_eq!(removed, 0);
        assert!(store.contains("busy").await);
    }

    #[tokio::test]
    async fn send_counts_only_successful_turns() {
        let (provider, store) = store(false);
        let handle = store.get_or_create_at("s1", false, t0()).await;
        let mut session = handle.lock().await;

        session.send("hello", &RetryPolicy::none()).await.unwrap();
        assert!(!session.has_context());
        session.send("again", &RetryPolicy::none()).await.unwrap();
        assert!(session.has_context());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reminder_due_every_tenth_message() {
        let (_, store) = store(false);
        let handle = store.get_or_create_at("s1", false, t0()).await;
        let mut session = handle.lock().await;

        assert!(!session.reminder_due(10));
        session.message_count = 10;
        assert!(session.reminder_due(10));
        session.message_count = 11;
        assert!(!session.reminder_due(10));
        session.message_count = 20;
        assert!(session.reminder_due(10));
        assert!(!session.reminder_due(0));
    }

    #[tokio::test]
    async fn failed_reminder_is_swallowed() {
        let (provider, store) = store(true);
        let handle = store.get_or_create_at("s1", false, t0()).await;
        let mut session = handle.lock().await;

        session.send_reminder().await;

        // Not retried, not recorded
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.conversation.history().len(), 2);
        assert_eq!(session.message_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_on_interval() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_reminders: false,
        });
        let store = Arc::new(SessionStore::new(
            provider,
            SessionConfig {
                ttl: Duration::ZERO,
                sweep_interval: Duration::from_secs(60),
                reminder_every: 10,
            },
        ));
        store
            .get_or_create_at("old", false, Utc::now() - TimeDelta::seconds(5))
            .await;

        let task = Arc::clone(&store).spawn_sweeper();
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(store.is_empty().await);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_sweeper_keeps_running() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail_reminders: false,
        });
        let store = Arc::new(SessionStore::new(
            provider,
            SessionConfig {
                ttl: Duration::ZERO,
                sweep_interval: Duration::ZERO,
                reminder_every: 10,
            },
        ));
        store
            .get_or_create_at("old", false, Utc::now() - TimeDelta::seconds(5))
            .await;

        let task = Arc::clone(&store).spawn_sweeper();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(!task.is_finished());
        assert!(store.is_empty().await);
        task.abort();
    }
}
