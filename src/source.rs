//! Transport-independent command sources.

use crate::constants::READ_QUERY_LINE;
use crate::error::SourceError;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// One event delivered by a communication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A payload carrying a new target angle.
    Write(Vec<u8>),
    /// A request for the last stored payload.
    Read,
}

/// Pull-based view of a communication layer.
pub trait CommandSource {
    /// Waits for the next event. `Ok(None)` means the source is exhausted.
    fn next_event(&mut self) -> impl Future<Output = Result<Option<InboundEvent>, SourceError>>;

    /// Answers the most recent [`InboundEvent::Read`].
    fn reply(&mut self, value: &[u8]) -> impl Future<Output = Result<(), SourceError>>;
}

/// In-process source fed through a [`ChannelHandle`].
pub struct ChannelSource {
    events: mpsc::UnboundedReceiver<InboundEvent>,
    replies: mpsc::UnboundedSender<Vec<u8>>,
}

/// Sending side of a [`ChannelSource`].
pub struct ChannelHandle {
    events: mpsc::UnboundedSender<InboundEvent>,
    replies: mpsc::UnboundedReceiver<Vec<u8>>,
}

pub fn channel() -> (ChannelHandle, ChannelSource) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    (
        ChannelHandle {
            events: event_tx,
            replies: reply_rx,
        },
        ChannelSource {
            events: event_rx,
            replies: reply_tx,
        },
    )
}

impl ChannelHandle {
    /// Queues a write. Returns false once the source is gone.
    pub fn write(&self, payload: impl Into<Vec<u8>>) -> bool {
        self.events.send(InboundEvent::Write(payload.into())).is_ok()
    }

    /// Queues a read request; the answer arrives through [`ChannelHandle::reply`].
    pub fn read(&self) -> bool {
        self.events.send(InboundEvent::Read).is_ok()
    }

    pub async fn reply(&mut self) -> Option<Vec<u8>> {
        self.replies.recv().await
    }
}

impl CommandSource for ChannelSource {
    async fn next_event(&mut self) -> Result<Option<InboundEvent>, SourceError> {
        Ok(self.events.recv().await)
    }

    async fn reply(&mut self, value: &[u8]) -> Result<(), SourceError> {
        // A dropped handle just means nobody is listening any more
        let _ = self.replies.send(value.to_vec());
        Ok(())
    }
}

/// Newline-delimited commands over a byte stream.
///
/// Each line is a write, except a line holding only `?`, which is a read
/// query answered with the stored payload and a newline.
pub struct LineSource<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> LineSource<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        LineSource { reader, writer }
    }
}

impl LineSource<BufReader<OwnedReadHalf>, OwnedWriteHalf> {
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        LineSource::new(BufReader::new(read), write)
    }
}

impl<R, W> CommandSource for LineSource<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn next_event(&mut self) -> Result<Option<InboundEvent>, SourceError> {
        let mut line = Vec::new();
        let read = self.reader.read_until(b'\n', &mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }

        let is_query = std::str::from_utf8(&line)
            .map(|text| text.trim() == READ_QUERY_LINE)
            .unwrap_or(false);
        if is_query {
            Ok(Some(InboundEvent::Read))
        } else {
            Ok(Some(InboundEvent::Write(line)))
        }
    }

    async fn reply(&mut self, value: &[u8]) -> Result<(), SourceError> {
        self.writer.write_all(value).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}
