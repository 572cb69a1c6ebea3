// Student side: point the camera at the code, submit what it reads, and
// make sure one physical QR code turns into at most one check-in.
//
// The whole session is one enum. The decoder lease lives inside the
// variants that are allowed to have a running camera, so "succeeded but
// still scanning" can't be written down.

pub mod decoder;
pub mod keyboard;
pub mod session;
pub mod throttle;

use crate::config::Config;
use crate::error::{ApiError, AttendanceError};
use crate::notice::Notice;
use crate::token::CheckInResponse;
use decoder::{Camera, DecoderLease};
use std::mem;
use std::time::Duration;
use throttle::DecodeThrottle;
use tokio::time::Instant;

pub use session::{ScanEvent, ScanSession};

pub const DEFAULT_ERROR_CLEAR_DELAY: Duration = Duration::from_millis(5000);
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Checked in successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Idle,
    Scanning,
    /// A payload was accepted and the decoder is paused until the check-in
    /// call comes back.
    Paused,
    Succeeded,
    /// Last check-in was rejected. The decoder is running again and the
    /// error is still on screen.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug)]
enum SessionState {
    Idle,
    Scanning {
        decoder: DecoderLease,
    },
    Submitting {
        decoder: DecoderLease,
        payload: String,
    },
    Failed {
        decoder: DecoderLease,
        error: AttendanceError,
        clear_at: Instant,
    },
    Succeeded {
        message: String,
    },
}

/// An accepted decode on its way to the check-in endpoint. Tied to the
/// session that accepted it; if that session is gone by the time the answer
/// arrives, the answer is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    session: u64,
    payload: String,
}

impl Submission {
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInResult {
    CheckedIn { message: String },
    Rejected(AttendanceError),
    /// The session was stopped, hidden or reset while the call was out.
    Abandoned,
}

pub struct ScanClient<C> {
    camera: C,
    state: SessionState,
    session: u64,
    throttle: DecodeThrottle,
    error_clear_delay: Duration,
    camera_error: Option<AttendanceError>,
    notice: Option<Notice>,
}

impl<C: Camera> ScanClient<C> {
    pub fn new(camera: C, throttle_window: Duration, error_clear_delay: Duration) -> Self {
        Self {
            camera,
            state: SessionState::Idle,
            session: 0,
            throttle: DecodeThrottle::new(throttle_window),
            error_clear_delay,
            camera_error: None,
            notice: None,
        }
    }

    pub fn with_config(camera: C, config: &Config) -> Self {
        Self::new(camera, config.scan_throttle(), config.error_clear_delay())
    }

    pub fn status(&self) -> ScanStatus {
        status_of(&self.state)
    }

    pub fn holds_decoder(&self) -> bool {
        matches!(
            self.state,
            SessionState::Scanning { .. }
                | SessionState::Submitting { .. }
                | SessionState::Failed { .. }
        )
    }

    /// The inline error, if any: a rejected check-in, or the camera refusing
    /// to start.
    pub fn last_error(&self) -> Option<&AttendanceError> {
        match &self.state {
            SessionState::Failed { error, .. } => Some(error),
            _ => self.camera_error.as_ref(),
        }
    }

    pub fn success_message(&self) -> Option<&str> {
        match &self.state {
            SessionState::Succeeded { message } => Some(message),
            _ => None,
        }
    }

    pub fn pending_payload(&self) -> Option<&str> {
        match &self.state {
            SessionState::Submitting { payload, .. } => Some(payload),
            _ => None,
        }
    }

    pub fn last_decode_at(&self) -> Option<Instant> {
        self.throttle.last_accepted()
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    // The toggle is hidden once the session has checked in
    pub fn can_toggle(&self) -> bool {
        !matches!(self.state, SessionState::Succeeded { .. })
    }

    pub fn start(&mut self) -> Result<(), AttendanceError> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Succeeded { .. } => {
                tracing::debug!("already checked in, reset before scanning again");
                return Ok(());
            }
            _ => return Ok(()),
        }

        self.camera_error = None;
        match DecoderLease::acquire(&mut self.camera) {
            Ok(decoder) => {
                self.session += 1;
                self.throttle.reset();
                self.state = SessionState::Scanning { decoder };
                tracing::info!(session = self.session, "scanner started");
                Ok(())
            }
            Err(err) => {
                let err = AttendanceError::from(err);
                tracing::warn!(error = %err, "could not start the scanner");
                self.notice = Some(Notice::error(err.to_string()));
                self.camera_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Safe from any state, any number of times. A checked-in session stays
    /// checked in; its decoder is already gone.
    pub fn stop(&mut self) {
        if let SessionState::Succeeded { .. } = self.state {
            return;
        }
        if self.holds_decoder() {
            tracing::info!(session = self.session, "scanner stopped");
        }
        self.camera_error = None;
        // Dropping the lease releases the decoder
        self.state = SessionState::Idle;
    }

    pub fn toggle(&mut self) -> Result<(), AttendanceError> {
        match self.state {
            SessionState::Idle => self.start(),
            SessionState::Succeeded { .. } => Ok(()),
            _ => {
                self.stop();
                Ok(())
            }
        }
    }

    /// Back to a fresh Idle session, even from Succeeded.
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.camera_error = None;
        self.notice = None;
        self.throttle.reset();
    }

    pub fn on_visibility_change(&mut self, visibility: Visibility) {
        if visibility == Visibility::Hidden && self.holds_decoder() {
            tracing::info!("page hidden, stopping scanner");
            self.stop();
        }
    }

    /// Decides whether a decoded payload gets submitted. On `Some`, the
    /// decoder has already been paused and the caller must send the payload
    /// and report back through [`ScanClient::finish_submission`].
    pub fn accept_decode(&mut self, payload: &str, now: Instant) -> Option<Submission> {
        if !self.throttle.allows(now) {
            tracing::debug!("scan throttled");
            return None;
        }
        // The token is opaque; whatever the decoder read is what gets sent
        if payload.is_empty() {
            return None;
        }

        let mut decoder = match mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Scanning { decoder } | SessionState::Failed { decoder, .. } => decoder,
            other => {
                tracing::debug!(status = ?status_of(&other), "decode ignored");
                self.state = other;
                return None;
            }
        };

        self.throttle.record(now);
        decoder.pause();
        tracing::info!(session = self.session, "QR payload scanned, checking in");
        self.state = SessionState::Submitting {
            decoder,
            payload: payload.to_owned(),
        };

        Some(Submission {
            session: self.session,
            payload: payload.to_owned(),
        })
    }

    pub fn finish_submission(
        &mut self,
        submission: Submission,
        result: Result<CheckInResponse, ApiError>,
        now: Instant,
    ) -> CheckInResult {
        let mut decoder = match mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Submitting { decoder, .. } if submission.session == self.session => {
                decoder
            }
            other => {
                tracing::info!(
                    session = submission.session,
                    "check-in finished after its session ended, ignoring"
                );
                self.state = other;
                return CheckInResult::Abandoned;
            }
        };

        match result {
            Ok(response) => {
                decoder.release();
                let message = if response.message.trim().is_empty() {
                    DEFAULT_SUCCESS_MESSAGE.to_owned()
                } else {
                    response.message
                };
                tracing::info!(session = self.session, %message, "checked in");
                self.notice = Some(Notice::success(message.clone()));
                self.state = SessionState::Succeeded {
                    message: message.clone(),
                };
                CheckInResult::CheckedIn { message }
            }
            Err(err) => {
                let error = AttendanceError::CheckInRejected(err.to_string());
                tracing::warn!(session = self.session, error = %error, "check-in rejected");
                self.notice = Some(Notice::error(error.to_string()));
                decoder.resume();
                self.state = SessionState::Failed {
                    decoder,
                    error: error.clone(),
                    clear_at: now + self.error_clear_delay,
                };
                CheckInResult::Rejected(error)
            }
        }
    }

    /// Housekeeping for time-based transitions. Clears a rejected check-in's
    /// error once it has been on screen long enough.
    pub fn tick(&mut self, now: Instant) {
        let expired = matches!(
            &self.state,
            SessionState::Failed { clear_at, .. } if now >= *clear_at
        );
        if !expired {
            return;
        }
        if let SessionState::Failed { decoder, .. } = mem::replace(&mut self.state, SessionState::Idle)
        {
            self.state = SessionState::Scanning { decoder };
        }
    }
}

fn status_of(state: &SessionState) -> ScanStatus {
    match state {
        SessionState::Idle => ScanStatus::Idle,
        SessionState::Scanning { .. } => ScanStatus::Scanning,
        SessionState::Submitting { .. } => ScanStatus::Paused,
        SessionState::Failed { .. } => ScanStatus::Failed,
        SessionState::Succeeded { .. } => ScanStatus::Succeeded,
    }
}
