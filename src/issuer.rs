// Teacher side: pick a duration, ask the backend for a token, show it.
//
// Requests are numbered. Only the newest request is allowed to touch the
// display, so a slow response to an old request can never replace the
// code a newer request produced.

use crate::api::IssuanceApi;
use crate::error::{ApiError, AttendanceError, DurationError};
use crate::notice::Notice;
use crate::render::ZoomLevel;
use crate::token::{ClassId, IssueTokenResponse, QrArtifact, ScheduleId, ValidityMinutes};
use chrono::{DateTime, Duration, Utc};
use std::cell::RefCell;

/// The duration dialog. Holds whatever the operator typed, and the message
/// to show under the field while it is not a valid duration.
#[derive(Debug, Clone)]
pub struct DurationPrompt {
    input: String,
    validation: Option<DurationError>,
}

impl DurationPrompt {
    pub fn new(default_minutes: u32) -> Self {
        let mut prompt = Self {
            input: String::new(),
            validation: None,
        };
        prompt.set_input(&default_minutes.to_string());
        prompt
    }

    pub fn set_input(&mut self, input: &str) {
        self.input = input.to_owned();
        self.validation = input.parse::<ValidityMinutes>().err();
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn validation_message(&self) -> Option<String> {
        self.validation.as_ref().map(|err| err.to_string())
    }

    pub fn can_confirm(&self) -> bool {
        self.validation.is_none()
    }

    pub fn confirm(&self) -> Result<ValidityMinutes, AttendanceError> {
        Ok(self.input.parse::<ValidityMinutes>()?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuerState {
    NoToken,
    Requesting { request_id: u64 },
    Displayed(QrArtifact),
    Error { message: String },
}

/// Everything needed to make one issuance call and to hand its answer back
/// with [`TokenIssuer::complete_issue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueTicket {
    pub request_id: u64,
    pub class_id: ClassId,
    pub schedule_id: ScheduleId,
    pub validity: ValidityMinutes,
}

#[derive(Debug)]
pub struct TokenIssuer {
    class_id: ClassId,
    schedule_id: ScheduleId,
    state: IssuerState,
    last_request_id: u64,
    // None once the dialog is closed or the schedule changed, so nothing
    // still in flight can land.
    latest_live_request: Option<u64>,
    last_confirmed: Option<ValidityMinutes>,
    zoom: ZoomLevel,
    notice: Option<Notice>,
}

impl TokenIssuer {
    pub fn new(class_id: ClassId, schedule_id: ScheduleId) -> Self {
        Self {
            class_id,
            schedule_id,
            state: IssuerState::NoToken,
            last_request_id: 0,
            latest_live_request: None,
            last_confirmed: None,
            zoom: ZoomLevel::default(),
            notice: None,
        }
    }

    pub fn state(&self) -> &IssuerState {
        &self.state
    }

    pub fn artifact(&self) -> Option<&QrArtifact> {
        match &self.state {
            IssuerState::Displayed(artifact) => Some(artifact),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            IssuerState::Error { message } => Some(message),
            _ => None,
        }
    }

    pub fn is_requesting(&self) -> bool {
        matches!(self.state, IssuerState::Requesting { .. })
    }

    pub fn last_confirmed(&self) -> Option<ValidityMinutes> {
        self.last_confirmed
    }

    pub fn schedule_id(&self) -> &ScheduleId {
        &self.schedule_id
    }

    pub fn zoom(&self) -> ZoomLevel {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: ZoomLevel) {
        self.zoom = zoom;
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    // Informational countdown for the displayed code
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.artifact().map(|artifact| artifact.time_remaining(now))
    }

    /// Validates operator input. Never touches the network; a bad value is
    /// reported back so the dialog can re-prompt.
    pub fn request_duration(&mut self, input: &str) -> Result<ValidityMinutes, AttendanceError> {
        let validity = input.parse::<ValidityMinutes>()?;
        self.last_confirmed = Some(validity);
        Ok(validity)
    }

    /// Starts a new issuance. Whatever was displayed goes away right now, and
    /// every earlier ticket becomes stale.
    pub fn begin_issue(&mut self, validity: ValidityMinutes) -> IssueTicket {
        self.last_request_id += 1;
        let request_id = self.last_request_id;
        self.latest_live_request = Some(request_id);
        self.last_confirmed = Some(validity);
        self.state = IssuerState::Requesting { request_id };

        tracing::debug!(
            request_id,
            class_id = %self.class_id,
            schedule_id = %self.schedule_id,
            minutes = validity.get(),
            "requesting QR token"
        );

        IssueTicket {
            request_id,
            class_id: self.class_id.clone(),
            schedule_id: self.schedule_id.clone(),
            validity,
        }
    }

    pub fn begin_regenerate(&mut self) -> Result<IssueTicket, AttendanceError> {
        let validity = self
            .last_confirmed
            .ok_or(AttendanceError::InvalidDuration(DurationError::NotConfirmed))?;
        Ok(self.begin_issue(validity))
    }

    /// Applies the outcome of a ticket. Returns `StaleResponse` (and changes
    /// nothing) if a newer ticket exists or the dialog was closed since.
    pub fn complete_issue(
        &mut self,
        ticket: IssueTicket,
        result: Result<IssueTokenResponse, ApiError>,
    ) -> Result<(), AttendanceError> {
        if self.latest_live_request != Some(ticket.request_id) {
            tracing::debug!(
                request_id = ticket.request_id,
                latest = ?self.latest_live_request,
                "discarding superseded issuance response"
            );
            return Err(AttendanceError::StaleResponse {
                request_id: ticket.request_id,
            });
        }

        match result {
            Ok(response) => {
                tracing::info!(
                    request_id = ticket.request_id,
                    expires_at = %response.expires_at,
                    "QR token issued"
                );
                self.state = IssuerState::Displayed(QrArtifact {
                    class_id: ticket.class_id,
                    schedule_id: ticket.schedule_id,
                    validity: ticket.validity,
                    image_url: response.qr_image_url,
                    payload: response.qr_data,
                    expires_at: response.expires_at,
                    request_id: ticket.request_id,
                });
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(request_id = ticket.request_id, %message, "QR issuance failed");
                self.notice = Some(Notice::error(message.clone()));
                self.state = IssuerState::Error {
                    message: message.clone(),
                };
                Err(AttendanceError::IssuanceFailed(message))
            }
        }
    }

    /// The dialog was closed. The code is gone and anything still in flight
    /// will be dropped when it lands.
    pub fn close(&mut self) {
        self.latest_live_request = None;
        self.state = IssuerState::NoToken;
        self.zoom = ZoomLevel::default();
    }

    pub fn select_schedule(&mut self, schedule_id: ScheduleId) {
        if schedule_id != self.schedule_id {
            self.schedule_id = schedule_id;
            self.close();
        }
    }

    pub async fn issue<A>(
        this: &RefCell<Self>,
        api: &A,
        validity: ValidityMinutes,
    ) -> Result<(), AttendanceError>
    where
        A: IssuanceApi + ?Sized,
    {
        let ticket = this.borrow_mut().begin_issue(validity);
        Self::drive(this, api, ticket).await
    }

    pub async fn regenerate<A>(this: &RefCell<Self>, api: &A) -> Result<(), AttendanceError>
    where
        A: IssuanceApi + ?Sized,
    {
        let ticket = this.borrow_mut().begin_regenerate()?;
        Self::drive(this, api, ticket).await
    }

    // No borrow is held across the await, so the UI can start another
    // request (or close the dialog) while this one is out.
    async fn drive<A>(this: &RefCell<Self>, api: &A, ticket: IssueTicket) -> Result<(), AttendanceError>
    where
        A: IssuanceApi + ?Sized,
    {
        let result = api
            .issue_token(&ticket.class_id, &ticket.schedule_id, ticket.validity)
            .await;
        match this.borrow_mut().complete_issue(ticket, result) {
            Err(AttendanceError::StaleResponse { .. }) => Ok(()),
            other => other,
        }
    }
}
