use crate::error::BoxError;
use crate::session::{Chunk, Session, Sink, SinkStatus};
use bytes::{Buf, Bytes};
use http_body::{Body, Frame};
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// A response body that may be compressed.
    ///
    /// This type wraps an inner body and either streams it through a Brotli
    /// compression session or passes it through unchanged.
    #[project = CompressionBodyProj]
    #[allow(missing_docs)]
    pub enum CompressionBody<B> {
        /// Compressed body with an active session.
        Compressed {
            #[pin]
            inner: B,
            state: CompressedBody,
        },
        /// Passthrough body without compression.
        Passthrough {
            #[pin]
            inner: B,
        },
    }
}

/// State for an actively compressed body.
pub(crate) struct CompressedBody {
    session: Session,
    ready: VecDeque<Chunk>,
    always_flush: bool,
    state: CompressState,
    pending_trailers: Option<http::HeaderMap>,
}

/// Progress of a compressed body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompressState {
    /// Reading data from the inner body and compressing.
    Reading,
    /// Emitting buffered trailers.
    Trailers,
    /// Compression is complete.
    Done,
}

/// Sink that queues every chunk the session emits, to be handed out as
/// frames. Polling pulls from the body, so it never blocks the session.
struct QueueSink<'a> {
    ready: &'a mut VecDeque<Chunk>,
}

impl Sink for QueueSink<'_> {
    fn consume(&mut self, chunk: &mut Chunk) -> Result<SinkStatus, BoxError> {
        let data = std::mem::take(&mut chunk.data);
        self.ready.push_back(Chunk {
            data,
            last: chunk.last,
            flush: chunk.flush,
        });
        Ok(SinkStatus::Accepted)
    }
}

impl CompressedBody {
    fn new(session: Session, always_flush: bool) -> Self {
        Self {
            session,
            ready: VecDeque::new(),
            always_flush,
            state: CompressState::Reading,
            pending_trailers: None,
        }
    }

    /// Returns the current compression state.
    pub(crate) fn state(&self) -> CompressState {
        self.state
    }

    /// Returns whether always flush is enabled.
    #[allow(dead_code)]
    pub(crate) fn always_flush(&self) -> bool {
        self.always_flush
    }

    /// Returns the session's compression ratio, if the stream succeeded.
    pub(crate) fn ratio(&self) -> Option<String> {
        self.session.ratio()
    }

    /// Runs one session round with the given input chunk.
    fn feed(&mut self, chunk: Chunk) -> io::Result<()> {
        let mut sink = QueueSink {
            ready: &mut self.ready,
        };
        self.session
            .step([chunk], &mut sink)
            .map_err(io::Error::other)?;
        Ok(())
    }

    /// Polls the inner body and compresses data.
    fn poll_compressed<B>(
        &mut self,
        cx: &mut Context<'_>,
        mut inner: Pin<&mut B>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>>
    where
        B: Body,
        B::Data: Buf,
        B::Error: Into<BoxError>,
    {
        loop {
            // Deliver already compressed chunks before making new ones.
            if let Some(chunk) = self.ready.pop_front() {
                return Poll::Ready(Some(Ok(Frame::data(chunk.data))));
            }

            match self.state {
                CompressState::Done => return Poll::Ready(None),

                CompressState::Trailers => {
                    self.state = CompressState::Done;
                    if let Some(trailers) = self.pending_trailers.take() {
                        return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
                    }
                    return Poll::Ready(None);
                }

                CompressState::Reading => match inner.as_mut().poll_frame(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(None) => {
                        // Inner body is done; finish the stream.
                        self.feed(Chunk::end())?;
                        self.state = CompressState::Trailers;
                    }
                    Poll::Ready(Some(Err(e))) => {
                        self.session.close();
                        return Poll::Ready(Some(Err(io::Error::other(e.into()))));
                    }
                    Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                        Ok(data) => {
                            let mut chunk = Chunk::new(collect_bytes(data));
                            chunk.flush = self.always_flush;
                            self.feed(chunk)?;
                        }
                        Err(frame) => {
                            if let Ok(trailers) = frame.into_trailers() {
                                // Buffer trailers and finish compression first.
                                self.pending_trailers = Some(trailers);
                                self.feed(Chunk::end())?;
                                self.state = CompressState::Trailers;
                            }
                        }
                    },
                },
            }
        }
    }
}

impl<B> CompressionBody<B> {
    /// Creates a compressed body around the given session.
    pub fn compressed(inner: B, session: Session, always_flush: bool) -> Self {
        Self::Compressed {
            inner,
            state: CompressedBody::new(session, always_flush),
        }
    }

    /// Creates a passthrough body without compression.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    /// Compression ratio achieved for this body, available once the stream
    /// compressed to completion with non-empty output.
    pub fn ratio(&self) -> Option<String> {
        match self {
            CompressionBody::Compressed { state, .. } => state.ratio(),
            CompressionBody::Passthrough { .. } => None,
        }
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Data: Buf,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CompressionBodyProj::Passthrough { inner } => {
                // Pass through frames, converting data to Bytes.
                match inner.poll_frame(cx) {
                    Poll::Pending => Poll::Pending,
                    Poll::Ready(None) => Poll::Ready(None),
                    Poll::Ready(Some(Ok(frame))) => {
                        Poll::Ready(Some(Ok(frame.map_data(collect_bytes))))
                    }
                    Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(io::Error::other(e.into())))),
                }
            }
            CompressionBodyProj::Compressed { inner, state } => state.poll_compressed(cx, inner),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Passthrough { inner } => inner.is_end_stream(),
            CompressionBody::Compressed { state, .. } => state.state() == CompressState::Done,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            CompressionBody::Passthrough { inner } => inner.size_hint(),
            // Compressed size is unknown.
            CompressionBody::Compressed { .. } => http_body::SizeHint::default(),
        }
    }
}

fn collect_bytes<D: Buf>(mut data: D) -> Bytes {
    data.copy_to_bytes(data.remaining())
}
