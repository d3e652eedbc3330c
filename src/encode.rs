use bytes::{Bytes, BytesMut};
use compression_codecs::{
    EncodeV2,
    brotli::{BrotliEncoder, params::EncoderParams as BrotliParams},
};
use compression_core::Level;
use compression_core::util::{PartialBuffer, WriteBuffer};

use crate::error::Error;

pub(crate) const MIN_WINDOW_BITS: u32 = 10;
pub(crate) const MAX_WINDOW_BITS: u32 = 24;
pub(crate) const MAX_QUALITY: u32 = 11;

const SCRATCH_SIZE: usize = 8 * 1024; // 8KB scratch buffer per stream

/// Stream operation, selected by the tags on the chunk being pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    /// Consume input; the encoder buffers output at its own pace.
    Process,
    /// Consume input and emit output decodable without further input.
    Flush,
    /// Consume input and run the stream towards its trailer.
    Finish,
}

/// Incremental Brotli encoder with an explicit push/pull contract.
///
/// Input goes in through [`push`](Self::push); produced bytes are staged
/// internally and retrieved with [`take_output`](Self::take_output). The
/// stream is over once a `Finish` push has drained everything and
/// [`is_finished`](Self::is_finished) reports true.
pub(crate) struct Encoder {
    inner: BrotliEncoder,
    scratch: Vec<u8>,
    staged: BytesMut,
    finished: bool,
}

impl Encoder {
    /// Creates an encoder tuned for one response stream.
    ///
    /// `max_window_bits` is the configured ceiling; a known payload length
    /// shrinks the window to the smallest power of two that still covers it.
    pub(crate) fn new(
        quality: u32,
        max_window_bits: u32,
        content_length: Option<u64>,
    ) -> Result<Self, Error> {
        let window_bits = derive_window_bits(content_length, max_window_bits);
        let params = BrotliParams::default()
            .quality(Level::Precise(quality as i32))
            .window_size(window_bits as i32);
        tracing::debug!(quality, window_bits, ?content_length, "brotli encoder initialized");
        Ok(Self {
            inner: BrotliEncoder::new(params),
            scratch: vec![0u8; SCRATCH_SIZE],
            staged: BytesMut::new(),
            finished: false,
        })
    }

    /// True if a previous push produced bytes not yet retrieved.
    pub(crate) fn has_output(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Retrieves the currently staged output.
    ///
    /// Calling this without staged output is a contract breach on the
    /// caller's side and aborts the stream.
    pub(crate) fn take_output(&mut self) -> Result<Bytes, Error> {
        if self.staged.is_empty() {
            return Err(Error::InvariantViolation);
        }
        Ok(self.staged.split().freeze())
    }

    /// True once a `Finish` push has drained the stream and no output remains.
    pub(crate) fn is_finished(&self) -> bool {
        self.finished && self.staged.is_empty()
    }

    /// Pushes a prefix of `input` through the encoder and returns how many
    /// bytes were consumed. Produced output is staged.
    ///
    /// A `Flush` push completes the flush once its input is fully consumed; a
    /// `Finish` push with no input runs one finishing step, so repeated empty
    /// `Finish` pushes drain the stream.
    pub(crate) fn push(&mut self, input: &[u8], op: Op) -> Result<usize, Error> {
        match op {
            Op::Process => self.encode_step(input),
            Op::Flush => {
                let consumed = if input.is_empty() {
                    0
                } else {
                    self.encode_step(input)?
                };
                if consumed == input.len() {
                    self.flush_steps()?;
                }
                Ok(consumed)
            }
            Op::Finish => {
                if input.is_empty() {
                    self.finish_step()?;
                    Ok(0)
                } else {
                    self.encode_step(input)
                }
            }
        }
    }

    fn encode_step(&mut self, input: &[u8]) -> Result<usize, Error> {
        let mut partial = PartialBuffer::new(input);
        let mut output = WriteBuffer::new_initialized(self.scratch.as_mut_slice());
        self.inner
            .encode(&mut partial, &mut output)
            .map_err(|e| Error::Encoding(e.into()))?;
        let written = output.written_len();
        if written > 0 {
            self.staged.extend_from_slice(&self.scratch[..written]);
        }
        Ok(partial.written_len())
    }

    fn flush_steps(&mut self) -> Result<(), Error> {
        loop {
            let mut output = WriteBuffer::new_initialized(self.scratch.as_mut_slice());
            let done = self
                .inner
                .flush(&mut output)
                .map_err(|e| Error::Encoding(e.into()))?;
            let written = output.written_len();
            if written > 0 {
                self.staged.extend_from_slice(&self.scratch[..written]);
            }
            if done {
                return Ok(());
            }
        }
    }

    fn finish_step(&mut self) -> Result<(), Error> {
        let mut output = WriteBuffer::new_initialized(self.scratch.as_mut_slice());
        let done = self
            .inner
            .finish(&mut output)
            .map_err(|e| Error::Encoding(e.into()))?;
        let written = output.written_len();
        if written > 0 {
            self.staged.extend_from_slice(&self.scratch[..written]);
        }
        if done {
            self.finished = true;
        }
        Ok(())
    }
}

/// Picks the window for a stream: the smallest power of two covering a known
/// payload, bounded by the configured window; the configured window when the
/// length is unknown or too large to matter.
fn derive_window_bits(content_length: Option<u64>, max_window_bits: u32) -> u32 {
    let bits = match content_length {
        Some(len) if len > 0 && len <= 1u64 << MAX_WINDOW_BITS => {
            let mut bits = MIN_WINDOW_BITS;
            while (1u64 << bits) < len && bits < MAX_WINDOW_BITS {
                bits += 1;
            }
            bits.min(max_window_bits)
        }
        _ => max_window_bits,
    };
    bits.clamp(MIN_WINDOW_BITS, MAX_WINDOW_BITS)
}
