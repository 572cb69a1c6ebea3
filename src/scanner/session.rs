// Drives a ScanClient from the outside world: decoded payloads, the page
// being hidden, the start/stop toggle. Runs on one thread; the only thing
// that ever waits is the check-in call, and while it is out the other
// events keep being handled.

use super::decoder::Camera;
use super::{CheckInResult, ScanClient, Submission, Visibility};
use crate::api::CheckInApi;
use crate::error::ApiError;
use crate::token::CheckInResponse;
use futures::future::{LocalBoxFuture, OptionFuture};
use std::cell::{Ref, RefCell, RefMut};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

const TICK_EVERY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Decoded(String),
    VisibilityChanged(Visibility),
    Start,
    Stop,
    Toggle,
    Reset,
    Shutdown,
}

pub struct ScanSession<C, A> {
    client: RefCell<ScanClient<C>>,
    api: A,
}

impl<C: Camera, A: CheckInApi> ScanSession<C, A> {
    pub fn new(client: ScanClient<C>, api: A) -> Self {
        Self {
            client: RefCell::new(client),
            api,
        }
    }

    pub fn client(&self) -> Ref<'_, ScanClient<C>> {
        self.client.borrow()
    }

    pub fn client_mut(&self) -> RefMut<'_, ScanClient<C>> {
        self.client.borrow_mut()
    }

    /// One decode, start to finish. `None` if the decode was not accepted
    /// (throttled, paused, not scanning).
    pub async fn on_decode(&self, payload: &str) -> Option<CheckInResult> {
        let submission = self
            .client
            .borrow_mut()
            .accept_decode(payload, Instant::now())?;
        let result = self.api.check_in(submission.payload()).await;
        Some(
            self.client
                .borrow_mut()
                .finish_submission(submission, result, Instant::now()),
        )
    }

    /// Handles events until `Shutdown` or until every sender is gone, then
    /// tears the session down. `on_update` runs after every event so the
    /// host can redraw and pick up notices.
    pub async fn run<F>(&self, mut events: mpsc::Receiver<ScanEvent>, mut on_update: F)
    where
        F: FnMut(&mut ScanClient<C>),
    {
        type InFlight<'a> = LocalBoxFuture<'a, (Submission, Result<CheckInResponse, ApiError>)>;
        let mut in_flight: Option<InFlight<'_>> = None;

        let mut ticker = time::interval(TICK_EVERY);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some((submission, result)) = OptionFuture::from(in_flight.as_mut()), if in_flight.is_some() => {
                    in_flight = None;
                    self.client
                        .borrow_mut()
                        .finish_submission(submission, result, Instant::now());
                }
                event = events.recv() => {
                    match event {
                        Some(ScanEvent::Decoded(payload)) => {
                            let accepted = self
                                .client
                                .borrow_mut()
                                .accept_decode(&payload, Instant::now());
                            if let Some(submission) = accepted {
                                in_flight = Some(self.submit(submission));
                            }
                        }
                        Some(ScanEvent::VisibilityChanged(visibility)) => {
                            self.client.borrow_mut().on_visibility_change(visibility);
                        }
                        // A camera failure is already recorded on the client
                        Some(ScanEvent::Start) => {
                            let _ = self.client.borrow_mut().start();
                        }
                        Some(ScanEvent::Toggle) => {
                            let _ = self.client.borrow_mut().toggle();
                        }
                        Some(ScanEvent::Stop) => self.client.borrow_mut().stop(),
                        Some(ScanEvent::Reset) => self.client.borrow_mut().reset(),
                        Some(ScanEvent::Shutdown) | None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.client.borrow_mut().tick(Instant::now());
                }
            }
            on_update(&mut *self.client.borrow_mut());
        }

        self.client.borrow_mut().stop();
        on_update(&mut *self.client.borrow_mut());
    }

    fn submit(&self, submission: Submission) -> LocalBoxFuture<'_, (Submission, Result<CheckInResponse, ApiError>)> {
        let api = &self.api;
        Box::pin(async move {
            let result = api.check_in(submission.payload()).await;
            (submission, result)
        })
    }
}
