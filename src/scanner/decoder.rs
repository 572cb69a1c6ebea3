// The camera is one physical thing and only one scan session may hold it.
// Sessions never see the raw decoder, only a DecoderLease, which releases
// exactly once however many exit paths try to release it.

use crate::error::CameraError;

/// Hands out the decoder. Implementations decide what "the camera" is.
pub trait Camera {
    fn acquire(&mut self) -> Result<Box<dyn Decoder>, CameraError>;
}

/// A running decoder. Decoded payloads are delivered out of band (as
/// `ScanEvent::Decoded` for the session driver); this only controls it.
pub trait Decoder {
    fn pause(&mut self) -> Result<(), CameraError>;
    fn resume(&mut self) -> Result<(), CameraError>;
    fn release(&mut self);
}

pub struct DecoderLease {
    decoder: Option<Box<dyn Decoder>>,
}

impl DecoderLease {
    pub fn new(decoder: Box<dyn Decoder>) -> Self {
        Self {
            decoder: Some(decoder),
        }
    }

    pub fn acquire<C: Camera + ?Sized>(camera: &mut C) -> Result<Self, CameraError> {
        camera.acquire().map(DecoderLease::new)
    }

    // Failing to pause or resume is logged and otherwise ignored. The scan
    // state machine stays in charge either way.
    pub fn pause(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            match decoder.pause() {
                Ok(()) => tracing::debug!("decoder paused"),
                Err(err) => tracing::warn!(error = %err, "error pausing decoder"),
            }
        }
    }

    pub fn resume(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            match decoder.resume() {
                Ok(()) => tracing::debug!("decoder resumed"),
                Err(err) => tracing::warn!(error = %err, "error resuming decoder"),
            }
        }
    }

    pub fn release(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.release();
            tracing::debug!("decoder released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.decoder.is_none()
    }
}

impl Drop for DecoderLease {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for DecoderLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderLease")
            .field("released", &self.is_released())
            .finish()
    }
}
