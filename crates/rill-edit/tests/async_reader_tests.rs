//! Integration tests for AsyncReader.
//!
//! Each test feeds the reader through one end of a Unix socket pair and
//! writes to the other end.

use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::{Arc, mpsc as std_mpsc};
use std::thread;
use std::time::Duration;

use rill_edit::{AsyncReader, CHANNEL_SIZE, ReaderError};
use rstest::rstest;
use tokio::sync::mpsc::Receiver;
use tokio::sync::mpsc::error::TryRecvError;

fn spawn_reader() -> (UnixStream, AsyncReader, Receiver<char>) {
    let (writer, source) = UnixStream::pair().expect("socket pair");
    let (reader, chars) = AsyncReader::spawn(source).expect("spawn reader");
    (writer, reader, chars)
}

fn recv_n(chars: &mut Receiver<char>, n: usize) -> String {
    (0..n)
        .map(|_| chars.blocking_recv().expect("channel closed early"))
        .collect()
}

fn assert_idle(chars: &mut Receiver<char>) {
    thread::sleep(Duration::from_millis(50));
    assert_eq!(chars.try_recv(), Err(TryRecvError::Empty));
}

#[test]
fn delivers_input_in_order() {
    let (mut writer, reader, mut chars) = spawn_reader();
    writer.write_all(b"hello world").unwrap();
    assert_eq!(recv_n(&mut chars, 11), "hello world");
    reader.quit().unwrap();
}

#[test]
fn stop_and_continue_deliver_everything_exactly_once() {
    let (mut writer, reader, mut chars) = spawn_reader();

    writer.write_all(b"abc").unwrap();
    assert_eq!(recv_n(&mut chars, 3), "abc");

    reader.stop().unwrap();
    writer.write_all(b"def").unwrap();
    assert_idle(&mut chars);

    reader.cont().unwrap();
    assert_eq!(recv_n(&mut chars, 3), "def");

    reader.quit().unwrap();
    assert_eq!(chars.blocking_recv(), None);
}

#[test]
fn owner_can_read_source_while_stopped() {
    let (mut writer, source) = UnixStream::pair().unwrap();
    let mut borrowed = source.try_clone().unwrap();
    let (reader, mut chars) = AsyncReader::spawn(source).unwrap();

    reader.stop().unwrap();
    writer.write_all(b"xy").unwrap();
    let mut buf = [0u8; 2];
    borrowed.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"xy");

    reader.cont().unwrap();
    writer.write_all(b"z").unwrap();
    assert_eq!(recv_n(&mut chars, 1), "z");
    reader.quit().unwrap();
}

#[rstest]
#[case::stop_twice(&["stop", "stop", "cont"])]
#[case::cont_while_reading(&["cont", "cont"])]
#[case::alternating(&["stop", "cont", "stop", "cont"])]
#[case::everything_twice(&["stop", "stop", "cont", "cont"])]
fn repeated_requests_are_acknowledged(#[case] requests: &[&str]) {
    let (mut writer, reader, mut chars) = spawn_reader();
    for request in requests {
        match *request {
            "stop" => reader.stop().unwrap(),
            "cont" => reader.cont().unwrap(),
            other => panic!("unknown request {other}"),
        }
    }
    writer.write_all(b"ok").unwrap();
    assert_eq!(recv_n(&mut chars, 2), "ok");
    reader.quit().unwrap();
}

#[test]
fn quit_closes_channel_and_ignores_later_input() {
    let (mut writer, reader, mut chars) = spawn_reader();
    reader.quit().unwrap();
    let _ = writer.write_all(b"late");
    assert_eq!(chars.blocking_recv(), None);
}

#[test]
fn quit_while_stopped() {
    let (_writer, reader, mut chars) = spawn_reader();
    reader.stop().unwrap();
    reader.quit().unwrap();
    assert_eq!(chars.blocking_recv(), None);
}

#[test]
fn end_of_input_closes_channel_and_later_requests_return() {
    let (mut writer, reader, mut chars) = spawn_reader();
    writer.write_all(b"bye").unwrap();
    drop(writer);

    assert_eq!(recv_n(&mut chars, 3), "bye");
    assert_eq!(chars.blocking_recv(), None);

    reader.stop().unwrap();
    reader.cont().unwrap();
    reader.quit().unwrap();
}

#[test]
fn utf8_split_across_writes() {
    let (mut writer, reader, mut chars) = spawn_reader();
    writer.write_all(b"\xc3").unwrap();
    assert_idle(&mut chars);
    writer.write_all(b"\xa9\xe2\x82").unwrap();
    assert_eq!(recv_n(&mut chars, 1), "é");
    writer.write_all(b"\xac").unwrap();
    assert_eq!(recv_n(&mut chars, 1), "€");
    reader.quit().unwrap();
}

#[test]
fn invalid_bytes_become_replacement_chars() {
    let (mut writer, reader, mut chars) = spawn_reader();
    writer.write_all(b"a\xffb").unwrap();
    assert_eq!(recv_n(&mut chars, 3), "a\u{FFFD}b");
    reader.quit().unwrap();
}

#[test]
fn dropping_handle_ends_thread() {
    let (_writer, reader, mut chars) = spawn_reader();
    drop(reader);
    assert_eq!(chars.blocking_recv(), None);
}

#[test]
fn more_input_than_channel_capacity() {
    let (mut writer, reader, mut chars) = spawn_reader();
    let input = "x".repeat(CHANNEL_SIZE * 4);
    let feeder = thread::spawn(move || {
        writer.write_all(input.as_bytes()).unwrap();
        writer
    });
    let got = recv_n(&mut chars, CHANNEL_SIZE * 4);
    assert!(got.chars().all(|c| c == 'x'));
    let _writer = feeder.join().unwrap();
    reader.quit().unwrap();
}

#[test]
fn backlog_is_delivered_before_end_of_input() {
    let (mut writer, reader, mut chars) = spawn_reader();
    writer.write_all("y".repeat(CHANNEL_SIZE * 3).as_bytes()).unwrap();
    drop(writer);
    thread::sleep(Duration::from_millis(50));

    let got = recv_n(&mut chars, CHANNEL_SIZE * 3);
    assert!(got.chars().all(|c| c == 'y'));
    assert_eq!(chars.blocking_recv(), None);
    reader.quit().unwrap();
}

/// Run `request` on another thread, failing if it does not return in time.
fn within_deadline(reader: &Arc<AsyncReader>, request: fn(&AsyncReader) -> Result<(), ReaderError>) {
    let reader = reader.clone();
    let (done_tx, done_rx) = std_mpsc::channel();
    thread::spawn(move || {
        let _ = done_tx.send(request(&reader).is_ok());
    });
    assert_eq!(
        done_rx.recv_timeout(Duration::from_secs(3)),
        Ok(true),
        "control request did not return while the channel was full"
    );
}

#[test]
fn control_requests_are_serviced_while_channel_is_full() {
    let (mut writer, reader, mut chars) = spawn_reader();
    let reader = Arc::new(reader);
    let tail = "x".repeat(CHANNEL_SIZE * 2);
    writer.write_all(format!("put a\n{tail}").as_bytes()).unwrap();

    assert_eq!(recv_n(&mut chars, 6), "put a\n");
    // Let the thread fill the channel behind the first line.
    thread::sleep(Duration::from_millis(50));

    within_deadline(&reader, AsyncReader::stop);
    writer.write_all(b"z").unwrap();
    within_deadline(&reader, AsyncReader::cont);

    assert_eq!(recv_n(&mut chars, tail.len() + 1), format!("{tail}z"));
    assert_idle(&mut chars);
    within_deadline(&reader, AsyncReader::quit);
    assert_eq!(chars.blocking_recv(), None);
}

#[test]
fn quit_discards_backlog_and_closes_channel() {
    let (mut writer, reader, mut chars) = spawn_reader();
    writer.write_all("q".repeat(CHANNEL_SIZE * 2).as_bytes()).unwrap();
    thread::sleep(Duration::from_millis(50));

    reader.quit().unwrap();
    let mut delivered = 0;
    while chars.blocking_recv().is_some() {
        delivered += 1;
    }
    assert!(delivered <= CHANNEL_SIZE * 2);
}

/// A pollable source whose reads always fail.
struct Broken(UnixStream);

impl Read for Broken {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::other("device gone"))
    }
}

impl AsFd for Broken {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

#[test]
fn read_failure_is_reported_as_fatal() {
    let (mut writer, source) = UnixStream::pair().unwrap();
    let (reader, mut chars) = AsyncReader::spawn(Broken(source)).unwrap();

    writer.write_all(b"!").unwrap();
    assert_eq!(chars.blocking_recv(), None);

    match reader.stop() {
        Err(ReaderError::Fatal(message)) => assert!(message.contains("device gone"), "{message}"),
        other => panic!("expected fatal error, got {other:?}"),
    }
}

#[tokio::test]
async fn async_consumer() {
    let (mut writer, reader, mut chars) = spawn_reader();
    writer.write_all(b"hi").unwrap();
    assert_eq!(chars.recv().await, Some('h'));
    assert_eq!(chars.recv().await, Some('i'));
    drop(writer);
    assert_eq!(chars.recv().await, None);
    reader.quit().unwrap();
}
