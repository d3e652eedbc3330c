use std::collections::VecDeque;

use bytes::{Buf, Bytes};

use crate::encode::{Encoder, Op};
use crate::error::{BoxError, Error};

/// A body chunk flowing through the compression pipeline.
///
/// The same shape is used on both sides: input handed to
/// [`Session::step`] and output offered to a [`Sink`].
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// Payload bytes; may be empty for a pure end-of-stream or flush marker.
    pub data: Bytes,
    /// Marks the final chunk of the stream.
    pub last: bool,
    /// Marks a flush boundary: everything emitted up to and including this
    /// chunk must be decodable without further input.
    pub flush: bool,
}

impl Chunk {
    /// Creates a plain data chunk.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            last: false,
            flush: false,
        }
    }

    /// Creates an empty chunk marking the end of the stream.
    pub fn end() -> Self {
        Self {
            data: Bytes::new(),
            last: true,
            flush: false,
        }
    }
}

/// Consumption signal returned by a [`Sink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    /// The sink made progress; whatever it took was advanced off the chunk.
    Accepted,
    /// The sink cannot make progress right now; retry once it drains.
    Blocked,
}

/// Downstream consumer of chunks leaving the session.
///
/// A sink consumes by advancing `chunk.data` and may take none, part, or all
/// of it. A partially taken chunk is retained by the session and offered
/// again on the next round, so sinks never see bytes out of order.
pub trait Sink {
    /// Offers a chunk to the sink.
    fn consume(&mut self, chunk: &mut Chunk) -> Result<SinkStatus, BoxError>;
}

/// Result of a [`Session::step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Everything that could progress this round has progressed.
    Ok,
    /// Progress is blocked on the downstream sink; call `step` again once it
    /// can accept more.
    Again,
}

/// The in-flight output chunk, at most one at a time.
#[derive(Debug, Default)]
enum Slot {
    #[default]
    Empty,
    /// Produced but not yet offered downstream.
    Pending(Chunk),
    /// Offered downstream and not yet fully drained.
    Busy(Chunk),
}

impl Slot {
    /// Takes the slot content, reporting whether it was still unoffered.
    fn take(&mut self) -> Option<(Chunk, bool)> {
        match std::mem::take(self) {
            Slot::Empty => None,
            Slot::Pending(chunk) => Some((chunk, true)),
            Slot::Busy(chunk) => Some((chunk, false)),
        }
    }
}

/// One streaming compression session, scoped to a single response body.
///
/// Input chunks are queued, pushed through an incrementally driven Brotli
/// encoder, and the encoded chunks are offered to a caller-provided [`Sink`],
/// honoring its backpressure. The encoder is created lazily on the first
/// [`step`](Self::step) and destroyed exactly once on [`close`](Self::close),
/// which also runs on success and on every error path.
pub struct Session {
    quality: u32,
    window_bits: u32,
    content_length: Option<u64>,

    encoder: Option<Encoder>,
    input: VecDeque<Chunk>,
    slot: Slot,

    end_of_input: bool,
    end_of_block: bool,
    closed: bool,
    success: bool,
    buffered: bool,

    bytes_in: u64,
    bytes_out: u64,
}

impl Session {
    /// Creates a session for one response stream.
    ///
    /// `content_length`, when known up front, tunes the encoder window; see
    /// the window rules on [`crate::Config`].
    pub fn new(quality: u32, window_bits: u32, content_length: Option<u64>) -> Self {
        Self {
            quality,
            window_bits,
            content_length,
            encoder: None,
            input: VecDeque::new(),
            slot: Slot::Empty,
            end_of_input: false,
            end_of_block: false,
            closed: false,
            success: false,
            buffered: false,
            bytes_in: 0,
            bytes_out: 0,
        }
    }

    /// Uncompressed bytes consumed so far. Never decreases.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Compressed bytes handed to the sink side so far. Never decreases.
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// True while the session holds data it has not pushed downstream yet.
    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    /// True once the stream compressed to completion.
    pub fn succeeded(&self) -> bool {
        self.success
    }

    /// True once the session closed, successfully or not.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Compression ratio of a successful stream, formatted the way access
    /// log templates expect it: `"<int>.<2 digits>"`, rounded half-up.
    ///
    /// `None` until the session succeeds, and for streams that produced no
    /// output.
    pub fn ratio(&self) -> Option<String> {
        if !self.success || self.bytes_out == 0 {
            return None;
        }
        Some(format_ratio(self.bytes_in, self.bytes_out))
    }

    /// Closes the session, destroying the encoder immediately.
    ///
    /// Idempotent. After closing, [`step`](Self::step) forwards input to the
    /// sink unmodified, so callers may keep invoking it during unwind.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Free encoder working memory now rather than at scope teardown.
        self.encoder = None;
        self.slot = Slot::Empty;
        self.input.clear();
    }

    /// Runs one round of the filter loop.
    ///
    /// `batch` may be empty, meaning "drain more output". Returns
    /// [`Status::Again`] when the sink blocked further progress; the caller
    /// re-invokes once the sink is ready or more input arrives. All errors
    /// are fatal and close the session before propagating.
    pub fn step<S: Sink>(
        &mut self,
        batch: impl IntoIterator<Item = Chunk>,
        sink: &mut S,
    ) -> Result<Status, Error> {
        if self.closed {
            return self.forward(batch, sink);
        }

        if self.encoder.is_none() {
            match Encoder::new(self.quality, self.window_bits, self.content_length) {
                Ok(encoder) => self.encoder = Some(encoder),
                Err(err) => return Err(self.fail(err)),
            }
        }

        let mut queued = false;
        for chunk in batch {
            self.input.push_back(chunk);
            queued = true;
        }
        if queued {
            self.buffered = true;
        }

        self.drive(sink)
    }

    /// The main loop: drain the output slot, pull encoder output, finish the
    /// stream, or feed the next queued input chunk, in that order.
    fn drive<S: Sink>(&mut self, sink: &mut S) -> Result<Status, Error> {
        loop {
            // While the slot holds data the encoder must not be touched.
            if let Some((mut chunk, was_pending)) = self.slot.take() {
                let before = if was_pending { 0 } else { chunk.data.len() };
                let result = sink.consume(&mut chunk);

                let remaining = chunk.data.len();
                let busy = remaining > 0;
                if busy {
                    self.slot = Slot::Busy(chunk);
                }

                match result {
                    Ok(SinkStatus::Accepted) => {
                        if busy && remaining == before {
                            // Nothing new offered, nothing drained.
                            self.buffered = true;
                            return Ok(Status::Again);
                        }
                    }
                    Ok(SinkStatus::Blocked) => {
                        if busy {
                            if !self.input.is_empty() {
                                self.buffered = true;
                            }
                            return Ok(Status::Again);
                        }
                        // The sink's backlog is unrelated to this stream.
                    }
                    Err(err) => return Err(self.fail(Error::Sink(err))),
                }
                continue;
            }

            let Some(encoder) = self.encoder.as_mut() else {
                return Ok(Status::Ok);
            };

            if encoder.has_output() {
                let data = match encoder.take_output() {
                    Ok(data) => data,
                    Err(err) => {
                        tracing::error!("brotli encoder claimed pending output but returned none");
                        return Err(self.fail(err));
                    }
                };
                let finished = encoder.is_finished();
                self.bytes_out += data.len() as u64;
                tracing::debug!(size = data.len(), "brotli out");

                let mut chunk = Chunk::new(data);
                if self.end_of_input && finished {
                    chunk.last = true;
                    self.buffered = false;
                } else if self.end_of_block {
                    chunk.flush = true;
                    self.buffered = false;
                }
                self.end_of_block = false;
                self.slot = Slot::Pending(chunk);
                continue;
            }

            if encoder.is_finished() {
                self.success = true;
                self.buffered = false;
                self.close();
                return Ok(Status::Ok);
            }

            if self.end_of_input {
                // Ask the encoder to dump the leftover.
                if let Err(err) = encoder.push(&[], Op::Finish) {
                    return Err(self.fail(err));
                }
                self.buffered = true;
                continue;
            }

            let Some(head) = self.input.front_mut() else {
                return Ok(Status::Ok);
            };

            if head.data.is_empty() && !head.last && !head.flush {
                self.input.pop_front();
                continue;
            }

            let op = if head.last {
                Op::Finish
            } else if head.flush {
                Op::Flush
            } else {
                Op::Process
            };
            let size = head.data.len();
            let consumed = match encoder.push(&head.data, op) {
                Ok(consumed) => consumed,
                Err(err) => return Err(self.fail(err)),
            };
            self.buffered = true;
            self.bytes_in += consumed as u64;
            head.data.advance(consumed);

            if consumed == size {
                if head.last {
                    self.end_of_input = true;
                } else if head.flush {
                    self.end_of_block = true;
                }
                self.input.pop_front();
                continue;
            }

            if consumed == 0 && !encoder.has_output() {
                // The encoder took nothing and produced nothing; its contract
                // says a later round will make progress once it sees the
                // FLUSH/FINISH operation again.
                tracing::debug!("brotli consumed no input and produced no output");
            }
        }
    }

    /// Pass-through used once the session is closed: hand input to the sink
    /// unmodified, preserving order across blocked rounds.
    fn forward<S: Sink>(
        &mut self,
        batch: impl IntoIterator<Item = Chunk>,
        sink: &mut S,
    ) -> Result<Status, Error> {
        self.input.extend(batch);
        while let Some(chunk) = self.input.front_mut() {
            let before = chunk.data.len();
            match sink.consume(chunk) {
                Ok(SinkStatus::Accepted) => {
                    if chunk.data.is_empty() {
                        self.input.pop_front();
                    } else if chunk.data.len() == before {
                        return Ok(Status::Again);
                    }
                }
                Ok(SinkStatus::Blocked) => return Ok(Status::Again),
                Err(err) => return Err(Error::Sink(err)),
            }
        }
        Ok(Status::Ok)
    }

    /// Closes the session and hands the error back for propagation.
    fn fail(&mut self, err: Error) -> Error {
        self.close();
        err
    }
}

/// Formats `bytes_in / bytes_out` with two fractional digits, rounding
/// half-up on the third.
fn format_ratio(bytes_in: u64, bytes_out: u64) -> String {
    let scaled = u128::from(bytes_in) * 1000 / u128::from(bytes_out);
    let mut int = scaled / 1000;
    let mut frac = (scaled / 10) % 100;
    if scaled % 10 >= 5 {
        frac += 1;
        if frac >= 100 {
            frac = 0;
            int += 1;
        }
    }
    format!("{int}.{frac:02}")
}
