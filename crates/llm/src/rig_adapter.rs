use futures::{Stream, StreamExt};
use rig::completion::{CompletionError, CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::openai;
use rig::streaming::StreamedAssistantContent;
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use crate::event::{StreamEventMapped, StreamTarget};
use crate::provider::{
    CompletionsFailedSnafu, EmptyPromptSnafu, HttpClientSnafu, LlmProvider, MissingApiKeySnafu,
    ProviderConfig, ProviderError, ProviderResult, ProviderStreamHandle, ProviderWorker,
    StreamRequest, make_event_stream,
};

pub const RIG_OPENAI_PROVIDER_ID: &str = "openai";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

type RigStreamingResponse = rig::streaming::StreamingCompletionResponse<
    rig::providers::openai::responses_api::streaming::StreamingCompletionResponse,
>;

/// How a provider stream stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// Upstream ended cleanly and `Done` was sent.
    Finished,
    /// An error chunk arrived and a single `Error` was sent.
    Failed,
    /// Cancel signal observed; nothing further was sent.
    Cancelled,
    /// The consumer dropped its receiver.
    Detached,
}

pub struct RigProviderAdapter {
    config: ProviderConfig,
}

impl RigProviderAdapter {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-adapter-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self { config })
    }

    fn build_client(config: &ProviderConfig) -> ProviderResult<openai::Client> {
        let mut builder = openai::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }

    async fn open_stream(
        config: &ProviderConfig,
        request: &StreamRequest,
    ) -> ProviderResult<RigStreamingResponse> {
        let client = Self::build_client(config)?;
        let model = client.completion_model(request.model_id.clone());

        let mut builder = model.completion_request(RigMessage::user(request.prompt.clone()));
        if let Some(preamble) = &request.preamble {
            builder = builder.preamble(preamble.clone());
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        })
    }

    // Only visible text reaches the reply; reasoning, tool and final chunks are dropped.
    fn map_stream_item<R>(
        target: StreamTarget,
        item: StreamedAssistantContent<R>,
    ) -> Option<StreamEventMapped>
    where
        R: Clone + Unpin,
    {
        match item {
            StreamedAssistantContent::Text(text) if !text.text.is_empty() => {
                Some(StreamEventMapped::delta(target, text.text))
            }
            StreamedAssistantContent::Text(_)
            | StreamedAssistantContent::Reasoning(_)
            | StreamedAssistantContent::ReasoningDelta { .. }
            | StreamedAssistantContent::ToolCall { .. }
            | StreamedAssistantContent::ToolCallDelta { .. }
            | StreamedAssistantContent::Final(_) => None,
        }
    }

    /// Forwards chunks until the stream ends, fails, or is cancelled.
    ///
    /// A cancel wins over a ready chunk.
    async fn drive_stream<S, R>(
        target: StreamTarget,
        stream: &mut S,
        event_tx: &mpsc::UnboundedSender<StreamEventMapped>,
        cancel_rx: &mut oneshot::Receiver<()>,
    ) -> StreamEnd
    where
        S: Stream<Item = Result<StreamedAssistantContent<R>, CompletionError>> + Unpin,
        R: Clone + Unpin,
    {
        loop {
            tokio::select! {
                biased;

                _ = &mut *cancel_rx => return StreamEnd::Cancelled,
                next_item = stream.next() => match next_item {
                    Some(Ok(item)) => {
                        if let Some(mapped) = Self::map_stream_item(target, item)
                            && event_tx.send(mapped).is_err()
                        {
                            return StreamEnd::Detached;
                        }
                    }
                    Some(Err(source)) => {
                        let error = ProviderError::CompletionsFailed {
                            stage: "stream-chunk",
                            source,
                        };
                        tracing::debug!(
                            target = ?target,
                            error = %error,
                            "provider stream failed"
                        );
                        let _ = event_tx
                            .send(StreamEventMapped::error(target, error.to_string()));
                        return StreamEnd::Failed;
                    }
                    None => {
                        let _ = event_tx.send(StreamEventMapped::done(target));
                        return StreamEnd::Finished;
                    }
                },
            }
        }
    }

    async fn run_stream_worker(
        config: ProviderConfig,
        request: StreamRequest,
        event_tx: mpsc::UnboundedSender<StreamEventMapped>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let target = request.target;
        let mut stream = match Self::open_stream(&config, &request).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::debug!(
                    target = ?target,
                    provider_id = %config.provider_id,
                    model_id = %request.model_id,
                    error = %error,
                    "failed to open provider stream"
                );
                let _ = event_tx.send(StreamEventMapped::error(target, error.to_string()));
                return;
            }
        };

        let end = Self::drive_stream(target, &mut stream, &event_tx, &mut cancel_rx).await;
        if end == StreamEnd::Cancelled {
            tracing::debug!(target = ?target, "provider stream cancelled");
            stream.cancel();
        }
    }
}

impl LlmProvider for RigProviderAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !request.prompt.trim().is_empty(),
            EmptyPromptSnafu {
                stage: "stream-chat",
                target: request.target,
            }
        );

        let (event_tx, stream, cancel_rx) = make_event_stream(request.target);
        let worker: ProviderWorker = Box::pin(Self::run_stream_worker(
            self.config.clone(),
            request,
            event_tx,
            cancel_rx,
        ));

        Ok(ProviderStreamHandle { stream, worker })
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use rig::message::Reasoning;

    use super::*;
    use crate::event::{StreamEventPayload, StreamSessionId};

    type Chunk = Result<StreamedAssistantContent<()>, CompletionError>;

    fn target() -> StreamTarget {
        StreamTarget::new(StreamSessionId::new(1))
    }

    fn text(chunk: &str) -> Chunk {
        Ok(StreamedAssistantContent::text(chunk))
    }

    async fn drain(
        event_rx: &mut mpsc::UnboundedReceiver<StreamEventMapped>,
    ) -> Vec<StreamEventMapped> {
        let mut events = Vec::new();
        while let Some(event) = event_rx.recv().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let result = RigProviderAdapter::new(ProviderConfig::new("openai", "  ", ""));
        assert!(matches!(result, Err(ProviderError::MissingApiKey { .. })));
    }

    #[test]
    fn blank_prompt_is_rejected_before_spawning() {
        let adapter =
            RigProviderAdapter::new(ProviderConfig::new("openai", "sk-test", "")).unwrap();
        let request = StreamRequest::new(target(), DEFAULT_OPENAI_MODEL, " ");
        let result = adapter.stream_chat(request);
        assert!(matches!(
            result,
            Err(ProviderError::EmptyPrompt { stage: "stream-chat", .. })
        ));
    }

    #[test]
    fn only_non_empty_text_becomes_a_delta() {
        let map = RigProviderAdapter::map_stream_item::<()>;

        assert_eq!(
            map(target(), StreamedAssistantContent::text("Hel")),
            Some(StreamEventMapped::delta(target(), "Hel"))
        );
        assert_eq!(map(target(), StreamedAssistantContent::text("")), None);
        assert_eq!(
            map(target(), StreamedAssistantContent::Reasoning(Reasoning::new("thinking"))),
            None
        );
        assert_eq!(
            map(
                target(),
                StreamedAssistantContent::ReasoningDelta {
                    id: None,
                    reasoning: "hmm".to_string(),
                }
            ),
            None
        );
        assert_eq!(map(target(), StreamedAssistantContent::Final(())), None);
    }

    #[tokio::test]
    async fn clean_end_sends_fragments_then_done() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (_cancel_tx, mut cancel_rx) = oneshot::channel();
        let mut chunks = stream::iter(vec![text("Hel"), text(""), text("lo")]);

        let end =
            RigProviderAdapter::drive_stream(target(), &mut chunks, &event_tx, &mut cancel_rx)
                .await;
        drop(event_tx);

        assert_eq!(end, StreamEnd::Finished);
        assert_eq!(
            drain(&mut event_rx).await,
            vec![
                StreamEventMapped::delta(target(), "Hel"),
                StreamEventMapped::delta(target(), "lo"),
                StreamEventMapped::done(target()),
            ]
        );
    }

    #[tokio::test]
    async fn error_chunk_sends_one_error_and_no_done() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (_cancel_tx, mut cancel_rx) = oneshot::channel();
        let mut chunks = stream::iter(vec![
            text("Hel"),
            Err(CompletionError::ResponseError("connection reset".to_string())),
            text("never"),
        ]);

        let end =
            RigProviderAdapter::drive_stream(target(), &mut chunks, &event_tx, &mut cancel_rx)
                .await;
        drop(event_tx);

        assert_eq!(end, StreamEnd::Failed);
        let events = drain(&mut event_rx).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEventMapped::delta(target(), "Hel"));
        assert!(matches!(
            &events[1].payload,
            StreamEventPayload::Error(message) if message.contains("connection reset")
        ));
    }

    #[tokio::test]
    async fn pending_cancel_wins_over_ready_chunks() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        cancel_tx.send(()).unwrap();
        let mut chunks = stream::iter(vec![text("Hel")]);

        let end =
            RigProviderAdapter::drive_stream(target(), &mut chunks, &event_tx, &mut cancel_rx)
                .await;
        drop(event_tx);

        assert_eq!(end, StreamEnd::Cancelled);
        assert!(drain(&mut event_rx).await.is_empty());
    }

    #[tokio::test]
    async fn cancel_while_waiting_stops_without_done() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let mut chunks = Box::pin(stream::iter(vec![text("Hel")]).chain(stream::pending()));

        let worker = tokio::spawn(async move {
            RigProviderAdapter::drive_stream(target(), &mut chunks, &event_tx, &mut cancel_rx)
                .await
        });

        assert_eq!(
            event_rx.recv().await,
            Some(StreamEventMapped::delta(target(), "Hel"))
        );
        cancel_tx.send(()).unwrap();

        assert_eq!(worker.await.unwrap(), StreamEnd::Cancelled);
        assert_eq!(event_rx.recv().await, None);
    }
}
