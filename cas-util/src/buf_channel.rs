// Copyright 2024 The Cascache Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A bounded, back-pressured byte-stream channel used to move bulk object
//! bytes between the HTTP layer and the bulk object store without buffering
//! an entire object in memory. Mirrors the teacher's `DropCloserWriteHalf`/
//! `DropCloserReadHalf` pair: dropping either half before an explicit
//! `send_eof`/end-of-stream is treated as an error by the other half rather
//! than silently truncating the stream.

use bytes::Bytes;
use cas_error::{make_err, Code, Error, ResultExt};
use tokio::sync::mpsc;

/// Default number of in-flight chunks the channel will buffer before the
/// writer blocks. Chosen to absorb a few `MIN_SIZE_FOR_BULK`-sized chunks of
/// jitter between producer and consumer without unbounded growth.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

enum Frame {
    Data(Bytes),
    Eof,
}

/// The write half of a buf channel. `send` pushes a chunk; `send_eof` must
/// be called exactly once to signal a clean end of stream. Dropping the
/// writer without calling `send_eof` causes the reader's next `recv` to
/// return an `Internal` error instead of a silent empty read.
pub struct DropCloserWriteHalf {
    tx: mpsc::Sender<Frame>,
    eof_sent: bool,
}

/// The read half of a buf channel.
pub struct DropCloserReadHalf {
    rx: mpsc::Receiver<Frame>,
    eof_received: bool,
}

/// Creates a connected read/write pair with `capacity` in-flight chunks.
pub fn make_buf_channel_pair() -> (DropCloserWriteHalf, DropCloserReadHalf) {
    make_buf_channel_pair_with_capacity(DEFAULT_CHANNEL_CAPACITY)
}

pub fn make_buf_channel_pair_with_capacity(
    capacity: usize,
) -> (DropCloserWriteHalf, DropCloserReadHalf) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        DropCloserWriteHalf { tx, eof_sent: false },
        DropCloserReadHalf { rx, eof_received: false },
    )
}

impl DropCloserWriteHalf {
    /// Sends a chunk of data. Empty chunks are accepted but pointless;
    /// callers should prefer to only call `send_eof` when done.
    pub async fn send(&mut self, data: Bytes) -> Result<(), Error> {
        if self.eof_sent {
            return Err(make_err!(Code::Internal, "send() called after send_eof()"));
        }
        self.tx
            .send(Frame::Data(data))
            .await
            .map_err(|_| make_err!(Code::Internal, "Reader dropped before send() completed"))
    }

    /// Signals a clean end of stream. Must be called exactly once.
    pub async fn send_eof(&mut self) -> Result<(), Error> {
        if self.eof_sent {
            return Err(make_err!(Code::Internal, "send_eof() called twice"));
        }
        self.eof_sent = true;
        self.tx
            .send(Frame::Eof)
            .await
            .map_err(|_| make_err!(Code::Internal, "Reader dropped before send_eof() completed"))
    }
}

impl Drop for DropCloserWriteHalf {
    fn drop(&mut self) {
        // The channel's own Drop will close `tx`; the reader's next `recv`
        // will observe the close and, if EOF was never sent, surface it as
        // a broken-stream error rather than a truncated-but-successful read.
        if !self.eof_sent {
            tracing::debug!("DropCloserWriteHalf dropped without send_eof()");
        }
    }
}

impl DropCloserReadHalf {
    /// Receives the next chunk. Returns `Ok(None)` once end-of-stream has
    /// been observed; returns an error if the writer was dropped without
    /// calling `send_eof` first.
    pub async fn recv(&mut self) -> Result<Option<Bytes>, Error> {
        if self.eof_received {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(Frame::Data(data)) => Ok(Some(data)),
            Some(Frame::Eof) => {
                self.eof_received = true;
                Ok(None)
            }
            None => Err(make_err!(
                Code::Internal,
                "Writer dropped without send_eof(); stream is truncated"
            )),
        }
    }

    /// Drains the channel into a single contiguous buffer. Used by code
    /// paths that must have the whole object in memory (inline placement,
    /// checksum recomputation for verification).
    pub async fn collect_all(&mut self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.recv().await.err_tip(|| "While collecting buf channel")? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }
}

/// Pushes the entire contents of `data` through a freshly created channel
/// pair and returns the read half, useful for feeding an in-memory buffer
/// into an API that expects a `DropCloserReadHalf`.
pub async fn buf_channel_from_bytes(data: Bytes) -> Result<DropCloserReadHalf, Error> {
    let (mut tx, rx) = make_buf_channel_pair();
    tx.send(data).await?;
    tx.send_eof().await?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn round_trips_chunks_in_order() {
        let (mut tx, mut rx) = make_buf_channel_pair();
        let handle = tokio::spawn(async move {
            tx.send(Bytes::from_static(b"hello ")).await.unwrap();
            tx.send(Bytes::from_static(b"world")).await.unwrap();
            tx.send_eof().await.unwrap();
        });
        let collected = rx.collect_all().await.unwrap();
        handle.await.unwrap();
        assert_eq!(collected, b"hello world".to_vec());
    }

    #[tokio::test]
    async fn recv_after_eof_returns_none() {
        let (mut tx, mut rx) = make_buf_channel_pair();
        tx.send_eof().await.unwrap();
        assert!(rx.recv().await.unwrap().is_none());
        assert!(rx.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dropping_writer_without_eof_errors_reader() {
        let (tx, mut rx) = make_buf_channel_pair();
        drop(tx);
        assert!(rx.recv().await.is_err());
    }

    #[tokio::test]
    async fn from_bytes_round_trips() {
        let mut rx = buf_channel_from_bytes(Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(rx.collect_all().await.unwrap(), b"abc".to_vec());
    }
}
