#![deny(unsafe_code)]

//! Floating-universe demo host: a first-person fly camera next to a streaming
//! chat session.

pub mod app;
pub mod chat;
pub mod settings;
