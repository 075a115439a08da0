pub mod events;
pub mod message;
pub mod session;

pub use events::{SessionChange, SessionEvent, SubmitOutcome};
pub use message::{
    Message, MessageId, MessageStatus, Sender, StreamSessionId, StreamState, StreamTarget,
    StreamTransition, StreamTransitionRejection,
};
pub use session::{ChatSession, FAILURE_NOTICE, NOT_CONFIGURED_NOTICE, ProviderFactory};
