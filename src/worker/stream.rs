//! Stream adapters for worker output.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_stream::wrappers::SplitStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::io::ReaderStream;

use crate::worker::{classify, Line, WorkerInput, WorkerOutput};

/// Classified, non-empty lines from a worker's stdout.
///
/// Lines are split on raw `\n` bytes and decoded lossily, so invalid UTF-8
/// never ends the stream. Blank lines are dropped before classification. The
/// stream ends at EOF or after yielding the first read error.
pub fn classified_lines(output: WorkerOutput) -> impl Stream<Item = std::io::Result<Line>> {
    SplitStream::new(BufReader::new(output).split(b'\n')).filter_map(|next| match next {
        Ok(raw) => {
            let text = String::from_utf8_lossy(&raw);
            (!text.trim().is_empty()).then(|| Ok(classify(&text)))
        }
        Err(e) => Some(Err(e)),
    })
}

/// Raw text chunks from a worker's diagnostic stream.
///
/// Chunk boundaries are whatever the pipe delivers; any chunk at all
/// signals a device-level failure, so no line splitting is done.
pub fn diagnostic_chunks(output: WorkerOutput) -> impl Stream<Item = std::io::Result<String>> {
    ReaderStream::new(output)
        .map(|next| next.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
}

/// Write one command line to the worker and flush it.
///
/// # Errors
///
/// Returns an error if the worker's input pipe is closed.
pub async fn write_line(input: &mut WorkerInput, line: &str) -> std::io::Result<()> {
    input.write_all(line.as_bytes()).await?;
    input.flush().await
}
