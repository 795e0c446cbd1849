//! Output streaming.
//!
//! Reads a child's combined output off the caller's context and turns it
//! into ordered [`OutputEvent`]s, one per line.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use super::event::{Notification, OutputEvent};
use super::launcher::SpawnedChild;
use crate::output::{OutputSanitizer, Redactor};
use crate::session::SessionId;

/// Buffer size for reading child output.
const READ_BUFFER_SIZE: usize = 4096;

/// Longest payload emitted for output that never ends a line.
pub const DEFAULT_MAX_CHUNK: usize = 64 * 1024;

/// Sends one session's events, applying sanitizing and redaction.
///
/// Every payload goes through the redactor, status messages included.
pub(crate) struct Emitter {
    tx: mpsc::UnboundedSender<Notification>,
    session: SessionId,
    redactor: Redactor,
    strip_ansi: bool,
}

impl Emitter {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<Notification>,
        session: SessionId,
        redactor: Redactor,
        strip_ansi: bool,
    ) -> Self {
        Self {
            tx,
            session,
            redactor,
            strip_ansi,
        }
    }

    pub(crate) fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Emit one line (or chunk) of raw process output.
    pub(crate) fn output(&self, raw: &[u8]) {
        let text = if self.strip_ansi {
            OutputSanitizer::strip_ansi(raw)
        } else {
            String::from_utf8_lossy(raw).into_owned()
        };
        if text.is_empty() {
            return;
        }
        match self.redactor.filter_line(&text) {
            Some(line) => self.send(OutputEvent::normal(line)),
            None => trace!(session = %self.session, "suppressed prompt line"),
        }
    }

    /// Emit a status event.
    pub(crate) fn emit(&self, event: OutputEvent) {
        let payload = self.redactor.redact(&event.payload);
        self.send(OutputEvent::new(payload, event.kind));
    }

    fn send(&self, event: OutputEvent) {
        // A caller that stopped listening must not stall the worker.
        let _ = self.tx.send(Notification::Output {
            session: self.session,
            event,
        });
    }
}

/// Splits a byte stream into lines, keeping line terminators.
///
/// A line longer than `max_chunk` is emitted in pieces so progress output
/// without newlines still reaches the caller. Pieces never end inside a
/// UTF-8 sequence or a partially received secret.
pub(crate) struct LineSplitter {
    pending: Vec<u8>,
    max_chunk: usize,
}

impl LineSplitter {
    pub(crate) fn new(max_chunk: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_chunk: max_chunk.max(16),
        }
    }

    /// Feed bytes and return every complete piece.
    pub(crate) fn push(&mut self, bytes: &[u8], redactor: &Redactor) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(bytes);
        let mut pieces = Vec::new();

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            pieces.push(self.pending.drain(..=pos).collect());
        }

        while self.pending.len() > self.max_chunk {
            // Mask complete secrets, then keep back enough bytes that a secret
            // still arriving cannot be split across two payloads.
            if redactor.longest_secret() > 0 {
                self.pending = redactor.redact_bytes(&self.pending);
            }
            let hold_back = redactor.longest_secret().saturating_sub(1);
            let mut cut = self.pending.len().saturating_sub(hold_back).min(self.max_chunk);
            while cut > 0 && is_utf8_continuation(self.pending[cut]) {
                cut -= 1;
            }
            if cut == 0 {
                break;
            }
            pieces.push(self.pending.drain(..cut).collect());
        }

        pieces
    }

    /// Take whatever is left at end of stream.
    pub(crate) fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

fn is_utf8_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}

/// Why streaming stopped.
#[derive(Debug)]
pub(crate) enum StreamOutcome {
    /// End of stream, and the process exited.
    Exited(ExitStatus),
    /// The deadline passed first.
    TimedOut,
    /// Cancellation was requested (or the engine went away).
    Cancelled,
    /// Reading the output failed.
    StreamFailed(io::Error),
    /// Waiting for the exit status failed.
    WaitFailed(io::Error),
}

/// Stream a running child's output until it exits, the deadline passes or
/// cancellation arrives, whichever comes first.
///
/// Events are emitted in the order bytes were read. On `TimedOut`,
/// `Cancelled` and the failure outcomes the child may still be alive; the
/// caller terminates and reaps it.
pub(crate) async fn pump(
    spawned: &mut SpawnedChild,
    emitter: &Emitter,
    timeout: Duration,
    max_chunk: usize,
    cancel: &mut oneshot::Receiver<()>,
) -> StreamOutcome {
    let SpawnedChild { child, output, .. } = spawned;
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut splitter = LineSplitter::new(max_chunk);
    let mut open = true;

    loop {
        tokio::select! {
            biased;

            _ = &mut *cancel => break StreamOutcome::Cancelled,
            _ = &mut deadline => break StreamOutcome::TimedOut,
            read = output.read(&mut buf), if open => match read {
                Ok(0) => {
                    open = false;
                    if let Some(rest) = splitter.finish() {
                        emitter.output(&rest);
                    }
                }
                Ok(n) => {
                    for piece in splitter.push(&buf[..n], emitter.redactor()) {
                        emitter.output(&piece);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break StreamOutcome::StreamFailed(e),
            },
            status = child.wait(), if !open => match status {
                Ok(status) => break StreamOutcome::Exited(status),
                Err(e) => break StreamOutcome::WaitFailed(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{Credential, EventKind};

    fn pieces_as_strings(pieces: Vec<Vec<u8>>) -> Vec<String> {
        pieces
            .into_iter()
            .map(|p| String::from_utf8(p).unwrap())
            .collect()
    }

    #[test]
    fn test_splits_lines_keeping_terminators() {
        let mut splitter = LineSplitter::new(DEFAULT_MAX_CHUNK);
        let r = Redactor::passthrough();

        assert_eq!(
            pieces_as_strings(splitter.push(b"one\ntwo\nthr", &r)),
            vec!["one\n", "two\n"]
        );
        assert_eq!(pieces_as_strings(splitter.push(b"ee\n", &r)), vec!["three\n"]);
        assert!(splitter.finish().is_none());
    }

    #[test]
    fn test_finish_returns_partial_line() {
        let mut splitter = LineSplitter::new(DEFAULT_MAX_CHUNK);
        assert!(splitter.push(b"no newline", &Redactor::passthrough()).is_empty());
        assert_eq!(splitter.finish(), Some(b"no newline".to_vec()));
    }

    #[test]
    fn test_long_line_is_chunked_on_char_boundary() {
        let mut splitter = LineSplitter::new(16);
        let text = "ééééééééééé"; // 22 bytes
        let pieces = splitter.push(text.as_bytes(), &Redactor::passthrough());

        assert_eq!(pieces.len(), 1);
        assert!(String::from_utf8(pieces[0].clone()).is_ok());
        let rest = splitter.finish().unwrap();
        let joined: Vec<u8> = pieces[0].iter().chain(rest.iter()).copied().collect();
        assert_eq!(joined, text.as_bytes());
    }

    #[test]
    fn test_chunking_does_not_split_secret() {
        let redactor = Redactor::for_credential(&Credential::new("hunter2"));
        let mut splitter = LineSplitter::new(16);

        let mut emitted = Vec::new();
        for piece in [&b"aaaaaaaaaaaaaahun"[..], b"ter2bbbbbbbbbbbbbbbbbb"] {
            emitted.extend(splitter.push(piece, &redactor));
        }
        emitted.extend(splitter.finish());

        for piece in &emitted {
            let text = String::from_utf8_lossy(piece);
            assert!(!text.contains("hunter2"), "leaked in {text:?}");
        }
    }

    #[test]
    fn test_emitter_redacts_and_suppresses() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = SessionId::new();
        let emitter = Emitter::new(
            tx,
            session,
            Redactor::for_credential(&Credential::new("hunter2")),
            true,
        );

        emitter.output(b"[sudo] password for me:\n");
        emitter.output(b"\x1b[1mhunter2\x1b[0m\n");
        emitter.emit(OutputEvent::error("bad hunter2\n"));
        drop(emitter);

        let mut events = Vec::new();
        while let Ok(Notification::Output { event, .. }) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], OutputEvent::normal("********\n"));
        assert_eq!(events[1].kind, EventKind::Error);
        assert!(!events[1].payload.contains("hunter2"));
    }
}
