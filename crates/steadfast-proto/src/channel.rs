//! Framed channel halves over any async byte stream
//!
//! [`FrameReader`] yields one message per frame. [`FrameSender`] is cheap to
//! clone; every clone shares one writer behind an async mutex, so concurrent
//! senders never interleave bytes of two frames. Each send is flushed before
//! the lock is released.

use crate::codec::{parse_body, to_body, FrameCodec};
use crate::error::Result;
use crate::message::Message;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, Stdin, Stdout, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};

#[derive(Debug)]
pub struct FrameReader<R> {
    inner: FramedRead<R, FrameCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        FrameReader {
            inner: FramedRead::new(reader, FrameCodec::new(max_frame_bytes)),
        }
    }

    /// Next frame as a JSON object; `Ok(None)` on clean end of stream.
    ///
    /// Cancel safe.
    pub async fn recv_value(&mut self) -> Result<Option<Value>> {
        match self.inner.next().await {
            None => Ok(None),
            Some(Err(e)) => Err(e),
            Some(Ok(body)) => parse_body(&body).map(Some),
        }
    }

    /// Next frame as a [`Message`]. Cancel safe.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        match self.recv_value().await? {
            None => Ok(None),
            Some(value) => Message::from_value(value).map(Some),
        }
    }
}

#[derive(Debug)]
pub struct FrameSender<W> {
    inner: Arc<Mutex<FramedWrite<W, FrameCodec>>>,
}

impl<W> Clone for FrameSender<W> {
    fn clone(&self) -> Self {
        FrameSender {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: AsyncWrite + Unpin> FrameSender<W> {
    pub fn new(writer: W, max_frame_bytes: usize) -> Self {
        FrameSender {
            inner: Arc::new(Mutex::new(FramedWrite::new(
                writer,
                FrameCodec::new(max_frame_bytes),
            ))),
        }
    }

    /// Serialize, frame, write and flush one value
    pub async fn send_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let body = to_body(value)?;
        let mut framed = self.inner.lock().await;
        framed.send(body).await
    }

    pub async fn send(&self, message: &Message) -> Result<()> {
        self.send_value(message).await
    }
}

/// Split one duplex stream into reader and sender halves
pub fn split<S>(stream: S, max_frame_bytes: usize) -> (FrameReader<ReadHalf<S>>, FrameSender<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite,
{
    let (read, write) = tokio::io::split(stream);
    (
        FrameReader::new(read, max_frame_bytes),
        FrameSender::new(write, max_frame_bytes),
    )
}

/// Channel over this process's stdin and stdout
pub fn stdio(max_frame_bytes: usize) -> (FrameReader<Stdin>, FrameSender<Stdout>) {
    (
        FrameReader::new(tokio::io::stdin(), max_frame_bytes),
        FrameSender::new(tokio::io::stdout(), max_frame_bytes),
    )
}
