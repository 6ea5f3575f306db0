//! Bounded in-memory byte pipe connecting adjacent pipeline stages.
//!
//! ```text
//!   PipeWriter ──▶ [VecDeque<u8>, capacity N] ──▶ PipeReader
//!                  writer waits while full
//!                  reader waits while empty
//!                  writer dropped → reader sees EOF once drained
//!                  reader dropped → writes fail with BrokenPipe
//! ```
//!
//! All state sits behind one `std::sync::Mutex`. Critical sections are plain
//! deque operations, so the lock is never held across an await, and both
//! `Drop` impls can close their end synchronously.

use std::collections::VecDeque;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Default pipe capacity, the same as a Linux kernel pipe.
pub const PIPE_BUFFER_SIZE: usize = 64 * 1024;

struct State {
    data: VecDeque<u8>,
    capacity: usize,
    writer_gone: bool,
    reader_gone: bool,
    /// Parked reader, woken by a write or by the writer closing.
    reader_waker: Option<Waker>,
    /// Parked writer, woken by a read or by the reader closing.
    writer_waker: Option<Waker>,
}

struct Shared(Mutex<State>);

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Writing end of a byte pipe.
pub struct PipeWriter {
    shared: Arc<Shared>,
}

/// Reading end of a byte pipe.
pub struct PipeReader {
    shared: Arc<Shared>,
}

/// Create a pipe holding at most `capacity` unread bytes.
pub fn pipe_stream(capacity: usize) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared(Mutex::new(State {
        data: VecDeque::with_capacity(capacity.min(8192)),
        capacity: capacity.max(1),
        writer_gone: false,
        reader_gone: false,
        reader_waker: None,
        writer_waker: None,
    })));
    (
        PipeWriter {
            shared: shared.clone(),
        },
        PipeReader { shared },
    )
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
}

impl PipeWriter {
    /// Write part of `data`, waiting for room if the pipe is full.
    ///
    /// Returns how many bytes were accepted.
    pub async fn write_bytes(&self, data: &[u8]) -> io::Result<usize> {
        poll_fn(|cx| self.poll_write_shared(cx, data)).await
    }

    /// Write all of `data`, waiting for the reader as often as needed.
    pub async fn write_all_bytes(&self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let n = self.write_bytes(data).await?;
            data = &data[n..];
        }
        Ok(())
    }

    fn poll_write_shared(&self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let mut state = self.shared.lock();
        if state.reader_gone {
            return Poll::Ready(Err(broken_pipe()));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let room = state.capacity.saturating_sub(state.data.len());
        if room == 0 {
            state.writer_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let n = buf.len().min(room);
        state.data.extend(&buf[..n]);
        if let Some(waker) = state.reader_waker.take() {
            waker.wake();
        }
        Poll::Ready(Ok(n))
    }

    fn close(&self) {
        let mut state = self.shared.lock();
        state.writer_gone = true;
        if let Some(waker) = state.reader_waker.take() {
            waker.wake();
        }
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.poll_write_shared(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.close();
        Poll::Ready(Ok(()))
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.close();
    }
}

impl PipeReader {
    fn poll_read_shared(&self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let mut state = self.shared.lock();

        if state.data.is_empty() {
            if state.writer_gone {
                // EOF: leave `buf` untouched.
                return Poll::Ready(Ok(()));
            }
            state.reader_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let n = buf.remaining().min(state.data.len());
        let (front, back) = state.data.as_slices();
        if n <= front.len() {
            buf.put_slice(&front[..n]);
        } else {
            buf.put_slice(front);
            buf.put_slice(&back[..n - front.len()]);
        }
        state.data.drain(..n);

        if let Some(waker) = state.writer_waker.take() {
            waker.wake();
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        self.poll_read_shared(cx, buf)
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.reader_gone = true;
        state.data.clear();
        if let Some(waker) = state.writer_waker.take() {
            waker.wake();
        }
    }
}

impl std::fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeWriter").finish()
    }
}

impl std::fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeReader").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn written_bytes_arrive_then_eof() {
        let (writer, mut reader) = pipe_stream(1024);
        writer.write_all_bytes(b"Albert\nBerlin\n").await.unwrap();
        drop(writer);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"Albert\nBerlin\n");
    }

    #[tokio::test]
    async fn writer_waits_for_reader_when_full() {
        let (writer, mut reader) = pipe_stream(8);
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let expected = data.clone();

        let producer = tokio::spawn(async move {
            writer.write_all_bytes(&data).await.unwrap();
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        producer.await.unwrap();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn partial_write_when_nearly_full() {
        let (writer, _reader) = pipe_stream(4);
        assert_eq!(writer.write_bytes(b"abcdef").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn closed_reader_breaks_pipe() {
        let (writer, reader) = pipe_stream(16);
        drop(reader);
        let err = writer.write_bytes(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn blocked_writer_wakes_when_reader_closes() {
        let (writer, reader) = pipe_stream(4);
        let producer = tokio::spawn(async move { writer.write_all_bytes(&[0u8; 64]).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(reader);

        let result = tokio::time::timeout(Duration::from_secs(2), producer)
            .await
            .expect("writer hung after reader closed")
            .unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn idle_reader_wakes_on_writer_drop() {
        let (writer, mut reader) = pipe_stream(16);
        let consumer = tokio::spawn(async move {
            let mut out = Vec::new();
            reader.read_to_end(&mut out).await.unwrap();
            out
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(writer);

        let out = tokio::time::timeout(Duration::from_secs(2), consumer)
            .await
            .expect("reader hung after writer closed")
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn shutdown_signals_eof() {
        let (mut writer, mut reader) = pipe_stream(64);
        writer.write_all(b"via AsyncWrite").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "via AsyncWrite");
    }
}
