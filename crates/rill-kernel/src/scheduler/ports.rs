//! Stage ports: the byte and value inputs and outputs a form runs with.
//!
//! Every handle here is cheap to clone. Output ends close when the last
//! clone is dropped, which is the only end-of-stream signal a downstream
//! stage ever sees.

use std::io;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc};

use crate::interpreter::EvalResult;
use crate::value::Value;

use super::pipe_stream::{PipeReader, PipeWriter};

/// The four ports of a running form.
#[derive(Clone)]
pub struct Ports {
    pub byte_in: ByteIn,
    pub value_in: ValueIn,
    pub value_out: ValueOut,
    pub byte_out: ByteOut,
}

impl Ports {
    /// No input, values dropped, bytes to process stdout.
    pub fn stdout() -> Self {
        Self {
            byte_in: ByteIn::empty(),
            value_in: ValueIn::empty(),
            value_out: ValueOut::discard(),
            byte_out: ByteOut::stdout(),
        }
    }

    /// Same ports with values redirected.
    pub fn with_value_out(&self, value_out: ValueOut) -> Self {
        Self {
            value_out,
            ..self.clone()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Byte ports
// ═══════════════════════════════════════════════════════════════════════════

/// Byte input. An empty port reads as immediate EOF.
#[derive(Clone, Default)]
pub struct ByteIn(Option<Arc<Mutex<BufReader<PipeReader>>>>);

impl ByteIn {
    pub fn empty() -> Self {
        ByteIn(None)
    }

    pub fn from_pipe(reader: PipeReader) -> Self {
        ByteIn(Some(Arc::new(Mutex::new(BufReader::new(reader)))))
    }

    pub fn is_connected(&self) -> bool {
        self.0.is_some()
    }

    /// Next line without its terminator, or `None` at EOF.
    ///
    /// Invalid UTF-8 is replaced with U+FFFD.
    pub async fn read_line(&self) -> io::Result<Option<String>> {
        let Some(reader) = &self.0 else {
            return Ok(None);
        };
        let mut reader = reader.lock().await;
        let mut buf = Vec::new();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Read a chunk of raw bytes into `buf`; 0 means EOF.
    pub async fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        match &self.0 {
            None => Ok(0),
            Some(reader) => reader.lock().await.read(buf).await,
        }
    }
}

enum ByteSink {
    Discard,
    Stdout,
    Pipe(PipeWriter),
    Buffer(Arc<StdMutex<Vec<u8>>>),
}

/// Byte output.
#[derive(Clone)]
pub struct ByteOut(Arc<ByteSink>);

impl ByteOut {
    pub fn discard() -> Self {
        ByteOut(Arc::new(ByteSink::Discard))
    }

    pub fn stdout() -> Self {
        ByteOut(Arc::new(ByteSink::Stdout))
    }

    pub fn to_pipe(writer: PipeWriter) -> Self {
        ByteOut(Arc::new(ByteSink::Pipe(writer)))
    }

    /// Collect into a shared buffer.
    pub fn to_buffer(buffer: Arc<StdMutex<Vec<u8>>>) -> Self {
        ByteOut(Arc::new(ByteSink::Buffer(buffer)))
    }

    /// Write all of `data`.
    ///
    /// A downstream stage that stopped reading is not an error: the bytes
    /// are dropped, like output to a closed pipe whose writer ignores SIGPIPE.
    pub async fn write(&self, data: &[u8]) -> EvalResult<()> {
        self.write_checked(data).await.map(|_| ())
    }

    /// Write all of `data`, returning `false` once the reader has gone.
    ///
    /// Producers that never reach EOF on their own use this to stop.
    pub async fn write_checked(&self, data: &[u8]) -> EvalResult<bool> {
        let result = match &*self.0 {
            ByteSink::Discard => Ok(()),
            ByteSink::Stdout => {
                let mut out = tokio::io::stdout();
                match out.write_all(data).await {
                    Ok(()) => out.flush().await,
                    Err(e) => Err(e),
                }
            }
            ByteSink::Pipe(writer) => writer.write_all_bytes(data).await,
            ByteSink::Buffer(buffer) => {
                buffer
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .extend_from_slice(data);
                Ok(())
            }
        };
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_str(&self, s: &str) -> EvalResult<()> {
        self.write(s.as_bytes()).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Value ports
// ═══════════════════════════════════════════════════════════════════════════

/// Value input. An empty port yields no values.
#[derive(Clone, Default)]
pub struct ValueIn(Option<Arc<Mutex<mpsc::Receiver<Value>>>>);

impl ValueIn {
    pub fn empty() -> Self {
        ValueIn(None)
    }

    pub fn from_channel(rx: mpsc::Receiver<Value>) -> Self {
        ValueIn(Some(Arc::new(Mutex::new(rx))))
    }

    /// Next value, or `None` once every upstream sender is gone.
    pub async fn recv(&self) -> Option<Value> {
        match &self.0 {
            None => None,
            Some(rx) => rx.lock().await.recv().await,
        }
    }
}

/// Value output.
#[derive(Clone, Default)]
pub struct ValueOut(Option<mpsc::Sender<Value>>);

impl ValueOut {
    pub fn discard() -> Self {
        ValueOut(None)
    }

    pub fn from_channel(tx: mpsc::Sender<Value>) -> Self {
        ValueOut(Some(tx))
    }

    /// Send a value, waiting while the channel is full.
    ///
    /// A closed receiver drops the value silently.
    pub async fn send(&self, value: Value) -> EvalResult<()> {
        if let Some(tx) = &self.0 {
            let _ = tx.send(value).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::pipe_stream::pipe_stream;

    #[tokio::test]
    async fn lines_are_split_and_trimmed() {
        let (writer, reader) = pipe_stream(64);
        let out = ByteOut::to_pipe(writer);
        let input = ByteIn::from_pipe(reader);

        out.write_str("a\r\nb\nlast").await.unwrap();
        drop(out);

        assert_eq!(input.read_line().await.unwrap().as_deref(), Some("a"));
        assert_eq!(input.read_line().await.unwrap().as_deref(), Some("b"));
        assert_eq!(input.read_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(input.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn eof_only_after_last_clone_drops() {
        let (writer, reader) = pipe_stream(64);
        let out = ByteOut::to_pipe(writer);
        let second = out.clone();
        let input = ByteIn::from_pipe(reader);

        drop(out);
        second.write_str("x\n").await.unwrap();
        drop(second);

        assert_eq!(input.read_line().await.unwrap().as_deref(), Some("x"));
        assert_eq!(input.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn writes_to_departed_reader_are_dropped() {
        let (writer, reader) = pipe_stream(4);
        drop(reader);
        let out = ByteOut::to_pipe(writer);
        assert!(out.write_str("more than four bytes").await.is_ok());
    }

    #[tokio::test]
    async fn checked_write_reports_departed_reader() {
        let (writer, reader) = pipe_stream(64);
        let out = ByteOut::to_pipe(writer);
        assert!(out.write_checked(b"first").await.unwrap());
        drop(reader);
        assert!(!out.write_checked(b"second").await.unwrap());
        assert!(ByteOut::discard().write_checked(b"x").await.unwrap());
    }

    #[tokio::test]
    async fn value_channel_closes_with_senders() {
        let (tx, rx) = mpsc::channel(4);
        let out = ValueOut::from_channel(tx);
        let input = ValueIn::from_channel(rx);

        out.send(Value::str("lorem")).await.unwrap();
        drop(out);

        assert_eq!(input.recv().await, Some(Value::str("lorem")));
        assert_eq!(input.recv().await, None);
    }

    #[tokio::test]
    async fn empty_inputs_are_at_eof() {
        assert_eq!(ByteIn::empty().read_line().await.unwrap(), None);
        assert_eq!(ValueIn::empty().recv().await, None);
    }

    #[tokio::test]
    async fn buffer_sink_collects() {
        let buffer = Arc::new(StdMutex::new(Vec::new()));
        let out = ByteOut::to_buffer(buffer.clone());
        out.write_str("hi ").await.unwrap();
        out.write_str("there").await.unwrap();
        assert_eq!(&*buffer.lock().unwrap(), b"hi there");
    }
}
