//! 心域 HeartSphere: companion chat and interactive fiction on top of a
//! streaming generation backend.
//!
//! [`chat`] holds the conversation core: replies stream in as fragments and
//! are folded into the message history, with transient backend failures
//! retried by [`llm::with_retry`].

pub mod chat;
pub mod config;
pub mod core;
pub mod llm;
pub mod story;
pub mod studio;
pub mod ui;
