//! Streamed completion consumption.
//!
//! Chunks are accumulated in order until a terminal marker or stream end,
//! under a hard time ceiling. When the far end ignores the structured
//! protocol, [`extract_files`] recovers fenced code blocks instead.

use anyhow::Result;
use futures::StreamExt;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use super::TokenStream;
use crate::error::{Phase, PipelineError};
use crate::models::generation::GeneratedFile;

/// Marker a provider may emit inline to signal completion.
pub const DONE_MARKER: &str = "[DONE]";

/// Accumulates chunks; stops at [`DONE_MARKER`].
///
/// A tail that could be the start of the marker is held back until the next
/// chunk or [`ChunkParser::flush`], so no marker fragment is ever released.
#[derive(Debug, Default)]
pub struct ChunkParser {
    buf: String,
    /// Bytes of `buf` already released to the caller.
    released: usize,
    done: bool,
}

impl ChunkParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk. Returns the newly releasable text, which is empty
    /// once the marker has been seen.
    pub fn push(&mut self, chunk: &str) -> &str {
        if self.done {
            return "";
        }
        self.buf.push_str(chunk);
        // Released text never holds a marker prefix, so the marker can only
        // start in the unreleased tail.
        let end = match self.buf[self.released..].find(DONE_MARKER) {
            Some(pos) => {
                self.buf.truncate(self.released + pos);
                self.done = true;
                self.buf.len()
            }
            None => self.buf.len() - held_back(&self.buf[self.released..]),
        };
        let from = self.released;
        self.released = end;
        &self.buf[from..end]
    }

    /// Release whatever was held back; used when the stream ends.
    pub fn flush(&mut self) -> &str {
        let from = self.released;
        self.released = self.buf.len();
        &self.buf[from..]
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of the
/// marker. The marker is ASCII, so the cut is always a char boundary.
fn held_back(text: &str) -> usize {
    (1..DONE_MARKER.len())
        .rev()
        .find(|&k| text.ends_with(&DONE_MARKER[..k]))
        .unwrap_or(0)
}

/// Drain `stream` under `ceiling`, forwarding accepted text to `progress`.
///
/// A stream that errors after producing text is treated as truncated and
/// its partial text is returned; an error before any text, or hitting the
/// ceiling, is an upstream error.
pub async fn collect(
    mut stream: TokenStream,
    ceiling: Duration,
    progress: Option<&UnboundedSender<String>>,
) -> Result<String> {
    let mut parser = ChunkParser::new();

    let drained = tokio::time::timeout(ceiling, async {
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    let accepted = parser.push(&chunk);
                    if let Some(tx) = progress
                        && !accepted.is_empty()
                    {
                        let _ = tx.send(accepted.to_string());
                    }
                    if parser.is_done() {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    })
    .await;

    match drained {
        Err(_) => anyhow::bail!(
            PipelineError::upstream(format!(
                "Streamed generation exceeded the {}s ceiling",
                ceiling.as_secs()
            ))
            .in_phase(Phase::Generation)
        ),
        Ok(Err(e)) => {
            release_tail(&mut parser, progress);
            let text = parser.finish();
            if text.trim().is_empty() {
                anyhow::bail!(
                    PipelineError::upstream(format!("Stream failed before any output: {e}"))
                        .in_phase(Phase::Generation)
                );
            }
            warn!(error = %e, received = text.len(), "stream truncated, keeping partial output");
            Ok(text)
        }
        Ok(Ok(())) => {
            release_tail(&mut parser, progress);
            Ok(parser.finish())
        }
    }
}

fn release_tail(parser: &mut ChunkParser, progress: Option<&UnboundedSender<String>>) {
    let tail = parser.flush();
    if let Some(tx) = progress
        && !tail.is_empty()
    {
        let _ = tx.send(tail.to_string());
    }
}

// ---------------------------------------------------------------------------
// Fallback extraction
// ---------------------------------------------------------------------------

static PATH_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^#{1,6}\s+|^(?i:file|path):\s*|^\*\*)`?([A-Za-z0-9_\-./]+\.[A-Za-z0-9]+)`?")
        .expect("static regex")
});

/// Recover files from markdown: each fenced block becomes a file, named by
/// the nearest preceding heading, `File:` line or bold path.
pub fn extract_files(text: &str) -> Vec<GeneratedFile> {
    let mut files = Vec::new();
    let mut last_hint: Option<String> = None;
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if let Some(tag) = trimmed.strip_prefix("```") {
            let mut body = Vec::new();
            for inner in lines.by_ref() {
                if inner.trim_start().starts_with("```") {
                    break;
                }
                body.push(inner);
            }
            if body.iter().all(|l| l.trim().is_empty()) {
                continue;
            }
            let path = last_hint
                .take()
                .unwrap_or_else(|| format!("generated_{}.{}", files.len() + 1, ext_for_tag(tag)));
            files.push(GeneratedFile {
                path,
                content: body.join("\n"),
                description: "Recovered from unstructured model output".to_string(),
            });
            continue;
        }
        if let Some(caps) = PATH_HINT.captures(trimmed) {
            last_hint = Some(caps[1].to_string());
        }
    }
    files
}

fn ext_for_tag(tag: &str) -> &'static str {
    match tag.trim().to_ascii_lowercase().as_str() {
        "ts" | "typescript" => "ts",
        "tsx" => "tsx",
        "js" | "javascript" => "js",
        "jsx" => "jsx",
        "py" | "python" => "py",
        "rs" | "rust" => "rs",
        "go" => "go",
        "java" => "java",
        _ => "txt",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_stops_at_marker_across_chunks() {
        let mut p = ChunkParser::new();
        assert_eq!(p.push("hello [DO"), "hello ");
        assert_eq!(p.push("NE] trailing"), "");
        assert!(p.is_done());
        assert_eq!(p.push("more"), "");
        assert_eq!(p.finish(), "hello ");
    }

    #[test]
    fn test_parser_releases_false_marker_prefix() {
        let mut p = ChunkParser::new();
        assert_eq!(p.push("arr[D"), "arr");
        assert_eq!(p.push("] = 1"), "[D] = 1");
        assert_eq!(p.push(" ["), " ");
        assert_eq!(p.flush(), "[");
        assert!(!p.is_done());
        assert_eq!(p.finish(), "arr[D] = 1 [");
    }

    #[tokio::test]
    async fn test_collect_never_forwards_marker_fragments() {
        let chunks: Vec<Result<String>> =
            vec![Ok("let x = a[".into()), Ok("0];".into()), Ok(" done [DO".into()), Ok("NE]".into())];
        let stream: TokenStream = Box::pin(futures::stream::iter(chunks));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let text = collect(stream, Duration::from_secs(5), Some(&tx)).await.unwrap();
        drop(tx);
        let mut parts = Vec::new();
        while let Some(part) = rx.recv().await {
            parts.push(part);
        }
        assert_eq!(text, "let x = a[0]; done ");
        assert_eq!(parts.concat(), text);
        assert!(parts.iter().all(|p| !p.contains("[DO")));
    }

    #[tokio::test]
    async fn test_collect_forwards_progress_in_order() {
        let chunks: Vec<Result<String>> = vec![Ok("a".into()), Ok("b".into()), Ok("c".into())];
        let stream: TokenStream = Box::pin(futures::stream::iter(chunks));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let text = collect(stream, Duration::from_secs(5), Some(&tx))
            .await
            .unwrap();
        drop(tx);
        let mut seen = String::new();
        while let Some(part) = rx.recv().await {
            seen.push_str(&part);
        }
        assert_eq!(text, "abc");
        assert_eq!(seen, "abc");
    }

    #[tokio::test]
    async fn test_collect_keeps_partial_on_truncation() {
        let chunks: Vec<Result<String>> =
            vec![Ok("partial".into()), Err(anyhow::anyhow!("connection reset"))];
        let stream: TokenStream = Box::pin(futures::stream::iter(chunks));
        let text = collect(stream, Duration::from_secs(5), None).await.unwrap();
        assert_eq!(text, "partial");
    }

    #[tokio::test]
    async fn test_collect_times_out() {
        let stream: TokenStream = Box::pin(futures::stream::pending());
        let err = collect(stream, Duration::from_millis(20), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ceiling"));
    }

    #[test]
    fn test_extract_files_uses_headings() {
        let text = "Here is the plan.\n\n### src/auth/reset-token.ts\n```ts\nexport const x = 1;\n```\n\nFile: src/auth/index.ts\n```typescript\nexport * from './reset-token';\n```\n```python\nprint('x')\n```\n";
        let files = extract_files(text);
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].path, "src/auth/reset-token.ts");
        assert_eq!(files[0].content, "export const x = 1;");
        assert_eq!(files[1].path, "src/auth/index.ts");
        assert_eq!(files[2].path, "generated_3.py");
    }
}
