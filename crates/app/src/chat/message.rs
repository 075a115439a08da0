use std::fmt;

use uuid::Uuid;

pub use drift_llm::{StreamSessionId, StreamTarget};

/// Opaque, unique identifier for one chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Who a message is shown as coming from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    /// Typed by the user.
    Local,
    /// Produced by the assistant or by the session itself.
    Remote,
}

/// Lifecycle status for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageStatus {
    Done,
    Streaming(StreamSessionId),
    Error(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub text: String,
    pub status: MessageStatus,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id: MessageId::new_v4(),
            sender,
            text: text.into(),
            status,
        }
    }

    pub fn local(text: impl Into<String>) -> Self {
        Self::new(Sender::Local, text, MessageStatus::Done)
    }

    pub fn remote(text: impl Into<String>) -> Self {
        Self::new(Sender::Remote, text, MessageStatus::Done)
    }

    /// Empty reply that incoming fragments are appended to.
    pub fn reply_placeholder(session_id: StreamSessionId) -> Self {
        Self::new(Sender::Remote, String::new(), MessageStatus::Streaming(session_id))
    }

    /// True while this message is the target of the given stream.
    pub fn accepts_fragments_from(&self, session_id: StreamSessionId) -> bool {
        self.status == MessageStatus::Streaming(session_id)
    }
}

/// Request lifecycle for one chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    /// Request issued, nothing received yet.
    Sending(StreamTarget),
    Streaming(StreamTarget),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTransition {
    Start(StreamTarget),
    Receive(StreamTarget),
    Complete(StreamTarget),
    Fail(StreamTarget),
    Cancel(StreamTarget),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTransitionRejection {
    AlreadyActive {
        active: StreamTarget,
        attempted: StreamTarget,
    },
    NoActiveStream,
    SessionMismatch {
        active: StreamTarget,
        attempted: StreamTarget,
    },
}

pub type StreamTransitionResult = Result<StreamState, StreamTransitionRejection>;

impl StreamState {
    pub fn active_target(&self) -> Option<StreamTarget> {
        match self {
            Self::Sending(target) | Self::Streaming(target) => Some(*target),
            Self::Idle => None,
        }
    }

    pub fn accepts_stream_event(&self, target: StreamTarget) -> bool {
        self.active_target() == Some(target)
    }

    /// Applies one transition.
    ///
    /// A new request may only start from `Idle`; superseding an active request
    /// means cancelling it first. Every other transition must name the active
    /// target exactly.
    pub fn apply(&self, transition: StreamTransition) -> StreamTransitionResult {
        match transition {
            StreamTransition::Start(target) => match self.active_target() {
                Some(active) => Err(StreamTransitionRejection::AlreadyActive {
                    active,
                    attempted: target,
                }),
                None => Ok(Self::Sending(target)),
            },
            StreamTransition::Receive(target) => {
                self.require_active(target)?;
                Ok(Self::Streaming(target))
            }
            StreamTransition::Complete(target)
            | StreamTransition::Fail(target)
            | StreamTransition::Cancel(target) => {
                self.require_active(target)?;
                Ok(Self::Idle)
            }
        }
    }

    fn require_active(&self, target: StreamTarget) -> Result<(), StreamTransitionRejection> {
        match self.active_target() {
            Some(active) if active == target => Ok(()),
            Some(active) => Err(StreamTransitionRejection::SessionMismatch {
                active,
                attempted: target,
            }),
            None => Err(StreamTransitionRejection::NoActiveStream),
        }
    }
}
