//! Single-request streaming chat session.
//!
//! The session owns the message list and at most one active request. Each
//! submission gets a fresh [`StreamSessionId`]; events carry it back in their
//! [`StreamTarget`] and anything not addressed to the active target is
//! dropped. Superseding a request aborts its reader task, which drops the
//! provider stream and thereby signals the worker to stop.

use std::sync::Arc;

use drift_llm::{
    LlmProvider, ProviderConfig, ProviderEventStream, ProviderResult, ProviderStreamHandle,
    StreamEventPayload, StreamRequest, create_provider,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chat::events::{SessionChange, SessionEvent, SubmitOutcome};
use crate::chat::message::{
    Message, MessageId, MessageStatus, StreamSessionId, StreamState, StreamTarget,
    StreamTransition,
};
use crate::settings::{ProviderSettings, SettingsError, SettingsStore};

pub const NOT_CONFIGURED_NOTICE: &str = "Please set your OpenAI API key before chatting. \
     Run `/api-key <key>` or add it to the settings file.";
pub const FAILURE_NOTICE: &str = "Sorry, I can't continue replying right now. Please try again later.";

pub type ProviderFactory =
    Arc<dyn Fn(ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> + Send + Sync>;

struct StreamTasks {
    reader: JoinHandle<()>,
    // Detached on drop; it stops once it observes the cancel signal.
    _worker: JoinHandle<()>,
}

struct ActiveRequest {
    target: StreamTarget,
    reply_id: MessageId,
    tasks: Option<StreamTasks>,
}

pub struct ChatSession {
    settings: Arc<SettingsStore>,
    provider_factory: ProviderFactory,
    provider: Option<(ProviderConfig, Arc<dyn LlmProvider>)>,
    messages: Vec<Message>,
    stream_state: StreamState,
    active: Option<ActiveRequest>,
    next_session_id: StreamSessionId,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChatSession {
    /// Creates a session backed by the rig OpenAI provider.
    ///
    /// The returned receiver yields events for [`ChatSession::handle_event`].
    pub fn new(settings: Arc<SettingsStore>) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        Self::with_provider_factory(settings, Arc::new(create_provider))
    }

    pub fn with_provider_factory(
        settings: Arc<SettingsStore>,
        provider_factory: ProviderFactory,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            settings,
            provider_factory,
            provider: None,
            messages: Vec::new(),
            stream_state: StreamState::Idle,
            active: None,
            next_session_id: StreamSessionId::new(1),
            events_tx,
        };
        (session, events_rx)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn stream_state(&self) -> StreamState {
        self.stream_state
    }

    pub fn active_target(&self) -> Option<StreamTarget> {
        self.active.as_ref().map(|active| active.target)
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Submits user text. Must be called from within a tokio runtime.
    pub fn submit(&mut self, text: &str) -> SubmitOutcome {
        let content = text.trim();
        if content.is_empty() {
            tracing::debug!("ignoring blank chat submission");
            return SubmitOutcome::Ignored;
        }

        let settings = self.settings.settings();
        let Some(config) = settings.to_provider_config() else {
            tracing::info!("no API key configured; skipping provider request");
            self.messages.push(Message::local(content));
            self.messages.push(Message::remote(NOT_CONFIGURED_NOTICE));
            return SubmitOutcome::NotConfigured;
        };

        if self.cancel_active() {
            tracing::debug!("previous request superseded");
        }

        let provider = match self.provider_for(config) {
            Ok(provider) => provider,
            Err(error) => {
                tracing::error!(error = %error, "failed to create provider");
                self.messages.push(Message::local(content));
                self.messages.push(Message::remote(FAILURE_NOTICE));
                return SubmitOutcome::Failed;
            }
        };

        let target = self.alloc_target();
        match self.stream_state.apply(StreamTransition::Start(target)) {
            Ok(state) => self.stream_state = state,
            Err(rejection) => {
                tracing::error!(
                    ?rejection,
                    session_id = target.session_id.0,
                    "stream start rejected"
                );
                return SubmitOutcome::Failed;
            }
        }

        self.messages.push(Message::local(content));
        let reply = Message::reply_placeholder(target.session_id);
        let reply_id = reply.id;
        self.messages.push(reply);

        let request = Self::build_request(target, &settings, content);
        match provider.stream_chat(request) {
            Ok(handle) => {
                let tasks = self.spawn_stream_pipeline(handle);
                self.active = Some(ActiveRequest {
                    target,
                    reply_id,
                    tasks: Some(tasks),
                });
                tracing::debug!(
                    session_id = target.session_id.0,
                    provider_id = %provider.id(),
                    "request started"
                );
                SubmitOutcome::Started(target)
            }
            Err(error) => {
                self.active = Some(ActiveRequest {
                    target,
                    reply_id,
                    tasks: None,
                });
                self.finish_with_error(target, error.to_string());
                SubmitOutcome::Failed
            }
        }
    }

    /// Applies one event from the session's event channel.
    pub fn handle_event(&mut self, event: SessionEvent) -> Option<SessionChange> {
        match event {
            SessionEvent::Stream(event) => {
                if !self.is_current(event.target) {
                    tracing::trace!(
                        session_id = event.target.session_id.0,
                        "discarding event for stale stream"
                    );
                    return None;
                }

                match event.payload {
                    StreamEventPayload::Delta(fragment) => {
                        self.append_fragment(event.target, fragment)
                    }
                    StreamEventPayload::Done => self.finish_with_done(event.target),
                    StreamEventPayload::Error(message) => {
                        self.finish_with_error(event.target, message)
                    }
                }
            }
            SessionEvent::ReaderClosed(target) => {
                if !self.is_current(target) {
                    return None;
                }
                self.finish_with_error(
                    target,
                    "provider stream ended before a terminal event".to_string(),
                )
            }
        }
    }

    /// Silently cancels the active request, if any. Returns whether one was active.
    pub fn cancel_active(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };

        if let Some(tasks) = active.tasks {
            tasks.reader.abort();
        }

        self.apply_transition(StreamTransition::Cancel(active.target));
        if let Some(reply) = self.reply_mut(active.reply_id, active.target) {
            reply.status = MessageStatus::Cancelled;
        }

        tracing::debug!(session_id = active.target.session_id.0, "request cancelled");
        true
    }

    /// Stores a new credential. A reply already streaming finishes on the old one.
    pub fn set_api_key(&mut self, api_key: &str) -> Result<(), SettingsError> {
        self.settings.set_api_key(api_key)?;
        self.reload_settings();
        Ok(())
    }

    /// Drops the cached provider so the next submission uses the current settings.
    pub fn reload_settings(&mut self) {
        self.provider = None;
        tracing::info!("chat settings reloaded");
    }

    fn provider_for(&mut self, config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
        if let Some((cached_config, provider)) = &self.provider
            && *cached_config == config
        {
            return Ok(provider.clone());
        }

        let provider = (self.provider_factory)(config.clone())?;
        self.provider = Some((config, provider.clone()));
        Ok(provider)
    }

    fn alloc_target(&mut self) -> StreamTarget {
        let target = StreamTarget::new(self.next_session_id);
        self.next_session_id = self.next_session_id.next();
        target
    }

    // Only the current user text is sent; earlier turns are not replayed upstream.
    fn build_request(
        target: StreamTarget,
        settings: &ProviderSettings,
        content: &str,
    ) -> StreamRequest {
        let mut request = StreamRequest::new(target, settings.model.clone(), content)
            .with_preamble(settings.preamble.clone());

        if let Some(max_tokens) = settings.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = settings.temperature {
            request = request.with_temperature(temperature);
        }
        request
    }

    fn spawn_stream_pipeline(&self, handle: ProviderStreamHandle) -> StreamTasks {
        StreamTasks {
            _worker: tokio::spawn(handle.worker),
            reader: self.spawn_stream_reader(handle.stream),
        }
    }

    fn spawn_stream_reader(&self, mut stream: ProviderEventStream) -> JoinHandle<()> {
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let target = stream.target();
            while let Some(event) = stream.recv().await {
                if events_tx.send(SessionEvent::Stream(event)).is_err() {
                    return;
                }
            }
            let _ = events_tx.send(SessionEvent::ReaderClosed(target));
        })
    }

    fn is_current(&self, target: StreamTarget) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.target == target)
            && self.stream_state.accepts_stream_event(target)
    }

    fn append_fragment(&mut self, target: StreamTarget, fragment: String) -> Option<SessionChange> {
        if fragment.is_empty() {
            return None;
        }

        if matches!(self.stream_state, StreamState::Sending(_)) {
            self.apply_transition(StreamTransition::Receive(target));
        }

        let reply_id = self.active.as_ref()?.reply_id;
        let reply = self.reply_mut(reply_id, target)?;
        reply.text.push_str(&fragment);

        Some(SessionChange::FragmentAppended {
            message_id: reply_id,
            fragment,
        })
    }

    fn finish_with_done(&mut self, target: StreamTarget) -> Option<SessionChange> {
        let reply_id = self.finalize(
            target,
            MessageStatus::Done,
            StreamTransition::Complete(target),
        )?;
        tracing::debug!(session_id = target.session_id.0, "request completed");
        Some(SessionChange::Completed {
            message_id: reply_id,
        })
    }

    fn finish_with_error(&mut self, target: StreamTarget, message: String) -> Option<SessionChange> {
        tracing::error!(
            session_id = target.session_id.0,
            error = %message,
            "chat request failed"
        );
        let reply_id = self.finalize(
            target,
            MessageStatus::Error(message),
            StreamTransition::Fail(target),
        )?;

        let notice = Message::remote(FAILURE_NOTICE);
        let notice_id = notice.id;
        self.messages.push(notice);

        Some(SessionChange::Failed {
            message_id: reply_id,
            notice_id,
        })
    }

    fn finalize(
        &mut self,
        target: StreamTarget,
        final_status: MessageStatus,
        transition: StreamTransition,
    ) -> Option<MessageId> {
        let active = self.active.take_if(|active| active.target == target)?;

        self.apply_transition(transition);
        if let Some(reply) = self.reply_mut(active.reply_id, target) {
            reply.status = final_status;
        }
        Some(active.reply_id)
    }

    fn reply_mut(&mut self, reply_id: MessageId, target: StreamTarget) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .rev()
            .find(|message| message.id == reply_id)
            .filter(|message| message.accepts_fragments_from(target.session_id))
    }

    fn apply_transition(&mut self, transition: StreamTransition) {
        match self.stream_state.apply(transition) {
            Ok(state) => self.stream_state = state,
            Err(rejection) => {
                tracing::warn!(?rejection, ?transition, "ignored stream transition");
            }
        }
    }
}
