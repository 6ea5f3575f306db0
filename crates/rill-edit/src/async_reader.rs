//! AsyncReader: a pausable background reader.
//!
//! ```text
//!   owner                      reader thread                 source fd
//!   ─────                      ─────────────                 ─────────
//!   stop() ──'s'──▶ control ─▶ poll(control, source) ◀────── readable
//!          ◀──────── ack ────  │ decode until EAGAIN
//!   cont() ──'c'──▶            ▼
//!   quit() ──'q'──▶        mpsc::Sender<char> ──▶ Receiver<char> (owner)
//! ```
//!
//! While reading, the source is in non-blocking mode and the thread drains
//! everything available each time `poll` reports it readable. While stopped,
//! the source is back in blocking mode and only the control socket is
//! watched, so the owner may lend the descriptor to a foreground program.
//!
//! Decoded chars the channel has no room for wait in a backlog. While the
//! backlog is non-empty the source is left alone and the control socket is
//! polled with a short timeout, so control requests are serviced even when
//! the receiver is not draining.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error};

/// Capacity of the char channel.
pub const CHANNEL_SIZE: usize = 128;

const READ_BUFFER_SIZE: usize = 4096;

/// Poll timeout in milliseconds while the backlog waits for channel room.
const BACKLOG_RETRY_MS: u16 = 10;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("reader thread failed: {0}")]
    Fatal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Stop,
    Continue,
    Quit,
}

impl Command {
    fn byte(self) -> u8 {
        match self {
            Command::Stop => b's',
            Command::Continue => b'c',
            Command::Quit => b'q',
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b's' => Some(Command::Stop),
            b'c' => Some(Command::Continue),
            b'q' => Some(Command::Quit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Reading,
    Stopped,
}

type FatalSlot = Arc<Mutex<Option<String>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Owner's end of the control protocol.
struct Control {
    socket: UnixStream,
    acks: Receiver<()>,
}

/// Handle to a background reader.
///
/// Dropping the handle asks the thread to quit without waiting for it.
pub struct AsyncReader {
    control: Mutex<Control>,
    fatal: FatalSlot,
}

impl AsyncReader {
    /// Take ownership of `source` and start reading it on a new thread.
    pub fn spawn<S>(source: S) -> Result<(Self, mpsc::Receiver<char>), ReaderError>
    where
        S: Read + AsFd + Send + 'static,
    {
        let (socket, worker_socket) = UnixStream::pair()?;
        let (ack_tx, ack_rx) = sync_channel(0);
        let (char_tx, char_rx) = mpsc::channel(CHANNEL_SIZE);
        let fatal = FatalSlot::default();

        set_nonblocking(source.as_fd(), true)?;

        let worker = Worker {
            source,
            control: worker_socket,
            acks: ack_tx,
            chars: Some(char_tx),
            backlog: VecDeque::new(),
            decoder: crate::Utf8Decoder::new(),
            fatal: fatal.clone(),
        };
        thread::Builder::new()
            .name("rill-async-reader".to_string())
            .spawn(move || worker.run())?;

        let reader = Self {
            control: Mutex::new(Control { socket, acks: ack_rx }),
            fatal,
        };
        Ok((reader, char_rx))
    }

    /// Stop reading and put the source back in blocking mode.
    pub fn stop(&self) -> Result<(), ReaderError> {
        self.request(Command::Stop)
    }

    /// Resume reading after [`stop`](Self::stop).
    pub fn cont(&self) -> Result<(), ReaderError> {
        self.request(Command::Continue)
    }

    /// End the thread and close the char channel.
    pub fn quit(&self) -> Result<(), ReaderError> {
        self.request(Command::Quit)
    }

    fn request(&self, command: Command) -> Result<(), ReaderError> {
        let mut control = lock(&self.control);
        if let Err(e) = control.socket.write_all(&[command.byte()]) {
            return match e.kind() {
                io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => self.exited(),
                _ => Err(e.into()),
            };
        }
        match control.acks.recv() {
            Ok(()) => Ok(()),
            Err(_) => self.exited(),
        }
    }

    /// Outcome of a request made after the thread is gone.
    fn exited(&self) -> Result<(), ReaderError> {
        match lock(&self.fatal).clone() {
            Some(message) => Err(ReaderError::Fatal(message)),
            None => Ok(()),
        }
    }
}

impl Drop for AsyncReader {
    fn drop(&mut self) {
        let mut control = lock(&self.control);
        let _ = control.socket.write_all(&[Command::Quit.byte()]);
    }
}

impl std::fmt::Debug for AsyncReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncReader").finish_non_exhaustive()
    }
}

struct Ready {
    control: bool,
    source: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Drained {
    Pending,
    Eof,
}

struct Worker<S> {
    source: S,
    control: UnixStream,
    acks: SyncSender<()>,
    chars: Option<mpsc::Sender<char>>,
    backlog: VecDeque<char>,
    decoder: crate::Utf8Decoder,
    fatal: FatalSlot,
}

impl<S: Read + AsFd> Worker<S> {
    fn run(mut self) {
        if let Err(e) = self.serve() {
            error!(error = %e, "async reader failed");
            *lock(&self.fatal) = Some(e.to_string());
        }
        let _ = set_nonblocking(self.source.as_fd(), false);
    }

    fn serve(&mut self) -> io::Result<()> {
        let mut state = State::Reading;
        let mut at_eof = false;
        loop {
            self.flush();
            if at_eof && self.backlog.is_empty() {
                debug!("reader reached end of input");
                return Ok(());
            }

            let backlogged = !self.backlog.is_empty();
            let watch_source = state == State::Reading && !backlogged && !at_eof;
            let timeout = if backlogged {
                PollTimeout::from(BACKLOG_RETRY_MS)
            } else {
                PollTimeout::NONE
            };
            let ready = self.wait(watch_source, timeout)?;

            if ready.control {
                let Some(command) = self.read_command()? else {
                    debug!("reader owner went away");
                    return Ok(());
                };
                match command {
                    Command::Stop => {
                        if state == State::Reading {
                            set_nonblocking(self.source.as_fd(), false)?;
                            state = State::Stopped;
                            debug!(backlog = self.backlog.len(), "reader stopped");
                        }
                    }
                    Command::Continue => {
                        if state == State::Stopped {
                            set_nonblocking(self.source.as_fd(), true)?;
                            state = State::Reading;
                            debug!("reader continued");
                        }
                    }
                    Command::Quit => {
                        set_nonblocking(self.source.as_fd(), false)?;
                        self.chars = None;
                        self.backlog.clear();
                        debug!("reader quit");
                        self.ack();
                        return Ok(());
                    }
                }
                self.ack();
            } else if ready.source && self.drain()? == Drained::Eof {
                at_eof = true;
            }
        }
    }

    fn wait(&self, watch_source: bool, timeout: PollTimeout) -> io::Result<Ready> {
        let readable = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL;
        loop {
            let mut fds = vec![PollFd::new(self.control.as_fd(), PollFlags::POLLIN)];
            if watch_source {
                fds.push(PollFd::new(self.source.as_fd(), PollFlags::POLLIN));
            }

            match poll(&mut fds, timeout) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }

            let is_ready = |fd: &PollFd| fd.revents().is_some_and(|r| r.intersects(readable));
            return Ok(Ready {
                control: is_ready(&fds[0]),
                source: fds.get(1).is_some_and(is_ready),
            });
        }
    }

    /// Read one control byte. `None` means the owner's socket closed.
    fn read_command(&mut self) -> io::Result<Option<Command>> {
        let mut byte = [0u8; 1];
        loop {
            match self.control.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => match Command::from_byte(byte[0]) {
                    Some(command) => return Ok(Some(command)),
                    None => debug!(byte = byte[0], "ignoring unknown control byte"),
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn ack(&self) {
        // Fails only when the owner dropped the handle; nobody is waiting.
        let _ = self.acks.send(());
    }

    /// Decode what the source has ready, stopping early once the channel
    /// is full.
    fn drain(&mut self) -> io::Result<Drained> {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            match self.source.read(&mut buf) {
                Ok(0) => {
                    let rest = self.decoder.finish();
                    self.backlog.extend(rest.chars());
                    self.flush();
                    return Ok(Drained::Eof);
                }
                Ok(n) => {
                    let text = self.decoder.decode(&buf[..n]);
                    self.backlog.extend(text.chars());
                    self.flush();
                    if !self.backlog.is_empty() {
                        return Ok(Drained::Pending);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Drained::Pending),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Move as much of the backlog into the channel as it has room for.
    fn flush(&mut self) {
        let Some(chars) = &self.chars else {
            self.backlog.clear();
            return;
        };
        while let Some(&c) = self.backlog.front() {
            match chars.try_send(c) {
                Ok(()) => {
                    self.backlog.pop_front();
                }
                Err(TrySendError::Full(_)) => return,
                Err(TrySendError::Closed(_)) => {
                    self.backlog.clear();
                    return;
                }
            }
        }
    }
}

fn set_nonblocking(fd: BorrowedFd<'_>, on: bool) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    let flags = if on {
        flags | OFlag::O_NONBLOCK
    } else {
        flags - OFlag::O_NONBLOCK
    };
    fcntl(raw, FcntlArg::F_SETFL(flags))?;
    Ok(())
}
