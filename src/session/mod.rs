use anyhow::Result;
use std::io::{self, BufRead, Write};

use crate::error::{self, PipelineError};
use crate::models::request::SightRequest;

/// Maximum line size for session input: 100 MB.
const MAX_LINE_SIZE: usize = 100 * 1024 * 1024;

/// Run an NDJSON session over stdin/stdout.
pub fn run_session(handler: impl Fn(SightRequest) -> Result<serde_json::Value>) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(stdin.lock(), stdout.lock(), handler)
}

/// One response line per non-blank request line, in order. Handler errors
/// become `{"error": ...}` lines; the loop keeps going.
pub fn serve(
    input: impl BufRead,
    output: impl Write,
    handler: impl Fn(SightRequest) -> Result<serde_json::Value>,
) -> Result<()> {
    let mut out = io::BufWriter::new(output);

    for line in input.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let value = if trimmed.len() > MAX_LINE_SIZE {
            error::envelope(
                &PipelineError::invalid_request(format!(
                    "Input line exceeds maximum size ({} bytes > {} bytes)",
                    trimmed.len(),
                    MAX_LINE_SIZE
                ))
                .into(),
            )
        } else {
            match serde_json::from_str::<SightRequest>(trimmed) {
                Ok(req) => handler(req).unwrap_or_else(|e| error::envelope(&e)),
                Err(e) => error::envelope(
                    &PipelineError::invalid_request(format!("Invalid JSON request: {e}")).into(),
                ),
            }
        };

        serde_json::to_writer(&mut out, &value)?;
        out.write_all(b"\n")?;
        out.flush()?;
    }

    Ok(())
}
