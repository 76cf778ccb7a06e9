//! The two transport surfaces this server exposes: newline-delimited JSON
//! over stdio, and a streaming HTTP surface (SSE + companion submission
//! endpoint). Both dispatch through the same [`crate::protocol::Engine`]
//! instead of each transport re-implementing its own method-dispatch table.

pub mod http;
pub mod line;
