//! Line-framed stdio transport.
//!
//! One process-wide session, dispatching through the shared [`Engine`] so
//! stdio and HTTP run identical method-handling code. One newline-
//! delimited JSON frame per line, 4 MiB cap enforced while reading (not
//! after), EOF is the only teardown signal — no idle timeout applies here.

use crate::protocol::engine::Engine;
use crate::protocol::types::{MCPError, MCPRequest, MCPResponse};
use crate::session::{Session, SessionManager};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};

/// Maximum line length accepted from stdin.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Run the line transport until stdin reaches EOF. Reads are buffered
/// through a `BufReader` so the line scan works in chunks rather than one
/// syscall per byte, matching the single-threaded, exactly-one-session
/// lifecycle of this transport.
pub async fn run(engine: Arc<Engine>, sessions: Arc<SessionManager>) -> anyhow::Result<()> {
    let session = sessions.attach_line();
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();

    loop {
        match read_line_bounded(&mut stdin, MAX_LINE_BYTES).await? {
            ReadOutcome::Eof => {
                tracing::info!("stdin closed, line transport shutting down");
                break;
            }
            ReadOutcome::Oversized => {
                tracing::warn!(limit = MAX_LINE_BYTES, "oversize frame discarded");
                let response = MCPResponse {
                    jsonrpc: "2.0".to_string(),
                    id: crate::protocol::types::RequestId::Number(0),
                    result: None,
                    error: Some(MCPError::parse_error(format!(
                        "frame exceeded maximum size of {MAX_LINE_BYTES} bytes"
                    ))),
                };
                let encoded = serde_json::to_string(&response)?;
                stdout.write_all(encoded.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            ReadOutcome::Line(line) if line.trim().is_empty() => continue,
            ReadOutcome::Line(line) => {
                if let Some(response) = process_line(&engine, &session, &line).await {
                    let encoded = serde_json::to_string(&response)?;
                    stdout.write_all(encoded.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
            }
        }
    }

    sessions.detach(&session.id);
    Ok(())
}

async fn process_line(engine: &Engine, session: &Session, line: &str) -> Option<MCPResponse> {
    let request: MCPRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "malformed JSON-RPC frame on stdin");
            // A parse failure has no request id to answer against, so
            // respond with a null id rather than dropping the frame silently.
            return Some(MCPResponse {
                jsonrpc: "2.0".to_string(),
                id: crate::protocol::types::RequestId::Number(0),
                result: None,
                error: Some(MCPError::parse_error(e.to_string())),
            });
        }
    };
    engine.dispatch(session, request).await
}

/// Outcome of reading one line from stdin.
enum ReadOutcome {
    /// Clean end-of-stream with no partial data.
    Eof,
    /// The line exceeded the byte cap; its remaining bytes up to the next
    /// newline were discarded without being buffered.
    Oversized,
    Line(String),
}

/// Read one newline-terminated frame from `reader`, scanning whatever
/// `fill_buf` hands back a chunk at a time instead of one byte per syscall.
/// A line exceeding `limit` bytes is discarded rather than tearing down the
/// transport — reading continues until the next newline or EOF so the
/// stream realigns on the following frame.
async fn read_line_bounded<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    limit: usize,
) -> anyhow::Result<ReadOutcome> {
    let mut buf = Vec::new();
    let mut oversized = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if buf.is_empty() && !oversized {
                return Ok(ReadOutcome::Eof);
            }
            break;
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                if !oversized {
                    buf.extend_from_slice(&available[..pos]);
                    if buf.len() > limit {
                        oversized = true;
                        buf.clear();
                    }
                }
                reader.consume(pos + 1);
                break;
            }
            None => {
                if !oversized {
                    buf.extend_from_slice(available);
                    if buf.len() > limit {
                        oversized = true;
                        buf.clear();
                    }
                }
                let consumed = available.len();
                reader.consume(consumed);
            }
        }
    }
    if oversized {
        return Ok(ReadOutcome::Oversized);
    }
    Ok(ReadOutcome::Line(String::from_utf8_lossy(&buf).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn reads_single_line() {
        let mut reader = BufReader::new(Cursor::new(b"hello\n".to_vec()));
        let line = read_line_bounded(&mut reader, 1024).await.unwrap();
        assert!(matches!(line, ReadOutcome::Line(s) if s == "hello"));
    }

    #[tokio::test]
    async fn returns_eof_on_clean_eof() {
        let mut reader = BufReader::new(Cursor::new(Vec::new()));
        let line = read_line_bounded(&mut reader, 1024).await.unwrap();
        assert!(matches!(line, ReadOutcome::Eof));
    }

    #[tokio::test]
    async fn discards_oversize_line_without_ending_the_stream() {
        let mut reader = BufReader::new(Cursor::new(vec![b'a'; 100]));
        let result = read_line_bounded(&mut reader, 10).await.unwrap();
        assert!(matches!(result, ReadOutcome::Oversized));
    }

    #[tokio::test]
    async fn next_frame_is_readable_after_an_oversize_line() {
        let mut reader = BufReader::new(Cursor::new(b"aaaaaaaaaaaaaaaaaaaa\nhello\n".to_vec()));
        let first = read_line_bounded(&mut reader, 10).await.unwrap();
        assert!(matches!(first, ReadOutcome::Oversized));
        let second = read_line_bounded(&mut reader, 10).await.unwrap();
        assert!(matches!(second, ReadOutcome::Line(s) if s == "hello"));
    }

    #[tokio::test]
    async fn reads_final_line_without_trailing_newline() {
        let mut reader = BufReader::new(Cursor::new(b"no newline at end".to_vec()));
        let line = read_line_bounded(&mut reader, 1024).await.unwrap();
        assert!(matches!(line, ReadOutcome::Line(s) if s == "no newline at end"));
    }

    #[tokio::test]
    async fn oversize_line_spanning_multiple_fill_buf_chunks_is_still_discarded() {
        // Cursor's fill_buf returns its whole remaining slice in one chunk,
        // so force multiple chunks by reading through a >limit stream with
        // a line far longer than any single reasonable buffer.
        let mut reader = BufReader::new(Cursor::new(vec![b'x'; 9_000]));
        let result = read_line_bounded(&mut reader, 100).await.unwrap();
        assert!(matches!(result, ReadOutcome::Oversized));
    }
}
