use std::{io::BufRead, thread, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::message::DetectionFrame;

/// Lines seen by a message reader once its input is exhausted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub accepted: usize,
    pub rejected: usize,
}

/// Parses one detection message per line on a background thread.
///
/// Malformed lines are logged and skipped. The thread stops at end of input
/// or once the receiving side hangs up.
pub fn spawn_message_reader<Rd>(
    reader: Rd,
    tx: Sender<DetectionFrame>,
) -> thread::JoinHandle<ReaderStats>
where
    Rd: BufRead + Send + 'static,
{
    thread::spawn(move || {
        let mut stats = ReaderStats::default();
        for (number, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    log::error!("failed to read detection input: {err}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match DetectionFrame::parse_line(&line) {
                Ok(frame) => {
                    stats.accepted += 1;
                    if tx.send(frame).is_err() {
                        log::debug!("message consumer went away, stopping reader");
                        break;
                    }
                }
                Err(err) => {
                    stats.rejected += 1;
                    log::warn!("line {}: {err}", number + 1);
                }
            }
        }
        stats
    })
}

#[derive(Debug, PartialEq)]
pub enum Sample<T> {
    Item(T),
    /// Nothing arrived within the frame timeout.
    Gap,
    Closed,
}

/// Waits up to `timeout` for the next item, in order.
pub fn next_sample<T>(rx: &Receiver<T>, timeout: Duration) -> Sample<T> {
    match rx.recv_timeout(timeout) {
        Ok(item) => Sample::Item(item),
        Err(RecvTimeoutError::Timeout) => Sample::Gap,
        Err(RecvTimeoutError::Disconnected) => Sample::Closed,
    }
}

/// Like [`next_sample`] but skips ahead to the newest queued item, so a slow
/// consumer always works on the freshest frame.
pub fn latest_sample<T>(rx: &Receiver<T>, timeout: Duration) -> Sample<T> {
    match next_sample(rx, timeout) {
        Sample::Item(mut item) => {
            while let Ok(newer) = rx.try_recv() {
                item = newer;
            }
            Sample::Item(item)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};
    use std::io::Cursor;

    const LINE: &str =
        r#"{"camera":{"width":640,"height":480},"marker":null,"gesture":{"state":"NONE"}}"#;

    #[test]
    fn reader_skips_blank_and_malformed_lines() {
        let input = format!("{LINE}\n\nnot json\n{LINE}\n");
        let (tx, rx) = unbounded();
        let stats = spawn_message_reader(Cursor::new(input), tx)
            .join()
            .expect("reader thread");
        assert_eq!(
            stats,
            ReaderStats {
                accepted: 2,
                rejected: 1
            }
        );
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn reader_stops_when_consumer_drops() {
        let input = format!("{LINE}\n{LINE}\n{LINE}\n");
        let (tx, rx) = bounded(1);
        drop(rx);
        let stats = spawn_message_reader(Cursor::new(input), tx)
            .join()
            .expect("reader thread");
        assert_eq!(stats.accepted, 1);
    }

    #[test]
    fn latest_wins() {
        let (tx, rx) = bounded(4);
        for i in 0..3 {
            tx.send(i).expect("send");
        }
        assert_eq!(latest_sample(&rx, Duration::from_millis(5)), Sample::Item(2));
        assert_eq!(latest_sample(&rx, Duration::from_millis(5)), Sample::Gap);
        drop(tx);
        assert_eq!(latest_sample(&rx, Duration::from_millis(5)), Sample::Closed);
    }

    #[test]
    fn timeouts_are_gaps() {
        let (tx, rx) = bounded::<u8>(1);
        assert_eq!(next_sample(&rx, Duration::from_millis(5)), Sample::Gap);
        tx.send(7).expect("send");
        assert_eq!(next_sample(&rx, Duration::from_millis(5)), Sample::Item(7));
        drop(tx);
        assert_eq!(next_sample(&rx, Duration::from_millis(5)), Sample::Closed);
    }
}
