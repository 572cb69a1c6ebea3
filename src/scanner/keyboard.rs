// A "camera" for terminals. Handheld QR scanners show up as a keyboard and
// type the decoded text followed by Enter, so every line on the input is
// one decode. Lines starting with ':' are commands for the session instead
// (:start, :stop, :toggle, :reset, :hide, :show, :quit).
//
// Lines that arrive while the decoder is paused or not acquired are
// dropped, the same way a paused camera simply doesn't see the code.

use super::decoder::{Camera, Decoder};
use super::{ScanEvent, Visibility};
use crate::error::CameraError;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct LineState {
    acquired: AtomicBool,
    paused: AtomicBool,
    // The input hit EOF or failed. Nothing more will ever be decoded.
    closed: AtomicBool,
}

#[derive(Debug, Default)]
pub struct KeyboardCamera {
    state: Arc<LineState>,
}

impl KeyboardCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_stdin(&self, events: mpsc::Sender<ScanEvent>) -> JoinHandle<()> {
        self.attach(std::io::BufReader::new(std::io::stdin()), events)
    }

    /// Starts forwarding lines from `reader` on a plain thread. Blocking
    /// reads stay off the async runtime, and the thread ends on EOF or once
    /// the receiving side hangs up. Its sender goes with it, so the session
    /// sees the channel close once input is exhausted.
    pub fn attach<R>(&self, reader: R, events: mpsc::Sender<ScanEvent>) -> JoinHandle<()>
    where
        R: BufRead + Send + 'static,
    {
        let state = Arc::clone(&self.state);

        std::thread::spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to read scanner input");
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let event = match parse_command(line) {
                    Some(event) => event,
                    None if state.acquired.load(Ordering::SeqCst)
                        && !state.paused.load(Ordering::SeqCst) =>
                    {
                        ScanEvent::Decoded(line.to_owned())
                    }
                    None => {
                        tracing::debug!("decoder not running, dropping scanned line");
                        continue;
                    }
                };

                if events.blocking_send(event).is_err() {
                    break;
                }
            }
            state.closed.store(true, Ordering::SeqCst);
        })
    }
}

fn parse_command(line: &str) -> Option<ScanEvent> {
    let command = line.strip_prefix(':')?;
    match command.trim() {
        "start" => Some(ScanEvent::Start),
        "stop" => Some(ScanEvent::Stop),
        "toggle" => Some(ScanEvent::Toggle),
        "reset" => Some(ScanEvent::Reset),
        "hide" => Some(ScanEvent::VisibilityChanged(Visibility::Hidden)),
        "show" => Some(ScanEvent::VisibilityChanged(Visibility::Visible)),
        "quit" | "q" => Some(ScanEvent::Shutdown),
        _ => None,
    }
}

impl Camera for KeyboardCamera {
    fn acquire(&mut self) -> Result<Box<dyn Decoder>, CameraError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(CameraError::NoDevice);
        }
        if self.state.acquired.swap(true, Ordering::SeqCst) {
            return Err(CameraError::Device(
                "the scanner is already in use by another session".to_owned(),
            ));
        }
        self.state.paused.store(false, Ordering::SeqCst);
        Ok(Box::new(KeyboardDecoder {
            state: Arc::clone(&self.state),
        }))
    }
}

struct KeyboardDecoder {
    state: Arc<LineState>,
}

impl Decoder for KeyboardDecoder {
    fn pause(&mut self) -> Result<(), CameraError> {
        self.state.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), CameraError> {
        self.state.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        self.state.acquired.store(false, Ordering::SeqCst);
        self.state.paused.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn drain(rx: &mut mpsc::Receiver<ScanEvent>) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn forwards_lines_only_while_acquired() {
        let (tx, mut rx) = mpsc::channel(16);
        let camera = KeyboardCamera::new();

        // Not acquired: payloads are dropped, commands still go through
        camera
            .attach(Cursor::new("TOK1\n:hide\n"), tx)
            .join()
            .unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![ScanEvent::VisibilityChanged(Visibility::Hidden)]
        );
    }

    #[test]
    fn acquired_decoder_delivers_payloads() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut camera = KeyboardCamera::new();
        let _decoder = camera.acquire().unwrap();

        camera
            .attach(Cursor::new("  TOK123  \n\n:quit\n"), tx)
            .join()
            .unwrap();
        assert_eq!(
            drain(&mut rx),
            vec![ScanEvent::Decoded("TOK123".into()), ScanEvent::Shutdown]
        );
    }

    #[test]
    fn paused_decoder_drops_payloads() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut camera = KeyboardCamera::new();
        let mut decoder = camera.acquire().unwrap();
        decoder.pause().unwrap();

        camera.attach(Cursor::new("TOK123\n"), tx).join().unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn only_one_holder_at_a_time_and_none_after_eof() {
        let (tx, _rx) = mpsc::channel(16);
        let mut camera = KeyboardCamera::new();

        let mut decoder = camera.acquire().unwrap();
        assert!(matches!(camera.acquire(), Err(CameraError::Device(_))));
        decoder.release();
        let mut decoder = camera.acquire().unwrap();
        decoder.release();

        camera.attach(Cursor::new(""), tx).join().unwrap();
        assert_eq!(camera.acquire().err(), Some(CameraError::NoDevice));
    }
}
