use drift_llm::StreamEventMapped;

use crate::chat::message::{MessageId, StreamTarget};

/// Input to [`ChatSession::handle_event`](crate::chat::ChatSession::handle_event).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Event forwarded from a provider stream.
    Stream(StreamEventMapped),
    /// The stream for this target ended; terminal events, if any, came first.
    ReaderClosed(StreamTarget),
}

/// Result of [`ChatSession::submit`](crate::chat::ChatSession::submit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input, nothing happened.
    Ignored,
    /// No credential configured; an instructional reply was appended.
    NotConfigured,
    /// The request could not be issued; a failure reply was appended.
    Failed,
    Started(StreamTarget),
}

/// What a handled event changed, for hosts that render incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    FragmentAppended {
        message_id: MessageId,
        fragment: String,
    },
    Completed {
        message_id: MessageId,
    },
    Failed {
        message_id: MessageId,
        notice_id: MessageId,
    },
}
