//! Blocking input streams turned into channel receivers.
//!
//! Each stream gets a named reader thread that forwards raw chunks. The
//! threads hold no bring-up state; everything they read is framed and
//! interpreted by the event loop.

use std::io::{self, Read};
use std::thread;

use crossbeam_channel::{bounded, Receiver};

/// One read from an input stream.
#[derive(Debug)]
pub enum Input {
    Data(Vec<u8>),
    /// End of stream.
    Closed,
    Failed(io::Error),
}

/// Chunks buffered between a reader thread and the event loop.
const CHANNEL_CAPACITY: usize = 64;

/// Spawns a thread reading `reader` in `chunk`-sized pieces.
///
/// The thread exits after forwarding [`Input::Closed`] or
/// [`Input::Failed`], or once the receiver is dropped.
pub fn spawn_reader<R>(name: &str, mut reader: R, chunk: usize) -> io::Result<Receiver<Input>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = bounded(CHANNEL_CAPACITY);
    thread::Builder::new()
        .name(format!("{name}-reader"))
        .spawn(move || {
            let mut buf = vec![0u8; chunk.max(1)];
            loop {
                let input = match reader.read(&mut buf) {
                    Ok(0) => Input::Closed,
                    Ok(n) => Input::Data(buf[..n].to_vec()),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => Input::Failed(e),
                };
                let last = !matches!(input, Input::Data(_));
                if tx.send(input).is_err() || last {
                    break;
                }
            }
        })?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "line dropped"))
        }
    }

    #[test]
    fn forwards_chunks_then_closed() {
        let rx = spawn_reader("test", Cursor::new(b"OK\nOK\n".to_vec()), 3).unwrap();
        let mut data = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                Input::Data(chunk) => {
                    assert!(chunk.len() <= 3);
                    data.extend(chunk);
                }
                Input::Closed => break,
                Input::Failed(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(data, b"OK\nOK\n");
    }

    #[test]
    fn forwards_read_errors() {
        let rx = spawn_reader("broken", Broken, 16).unwrap();
        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            Input::Failed(e) => assert_eq!(e.to_string(), "line dropped"),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
