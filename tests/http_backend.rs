use qr_attendance_client::{
    api::{CheckInApi, HttpBackend, IssuanceApi},
    config::Config,
    issuer::{IssuerState, TokenIssuer},
    scanner::{keyboard::KeyboardCamera, CheckInResult, ScanClient, ScanSession, ScanStatus},
    token::{ClassId, ScheduleId, ValidityMinutes},
    ApiError, AttendanceError,
};
use serde_json::json;
use std::cell::RefCell;
use wiremock::{
    matchers::{body_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn backend(server: &MockServer) -> HttpBackend {
    let config = Config {
        api_base_url: format!("{}/api/", server.uri()),
        bearer_token: Some("teacher-token".to_owned()),
        ..Config::default()
    };
    HttpBackend::new(&config).unwrap()
}

#[tokio::test]
async fn issues_token_for_class_schedule() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/classes/c1/schedules/s1/qr"))
        .and(header("authorization", "Bearer teacher-token"))
        .and(body_json(json!({ "durationMinutes": 10 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "qrImageUrl": "https://cdn.example.org/qr/abc.png",
            "expiresAt": "2026-10-16T09:15:00Z",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = backend(&server)
        .issue_token(
            &ClassId("c1".into()),
            &ScheduleId("s1".into()),
            ValidityMinutes::new(10).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.qr_image_url, "https://cdn.example.org/qr/abc.png");
    assert_eq!(response.expires_at.to_rfc3339(), "2026-10-16T09:15:00+00:00");
    assert_eq!(response.qr_data, None);
}

#[tokio::test]
async fn ids_are_encoded_as_single_path_segments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/classes/c%2F1/schedules/s%232/qr"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "qrImageUrl": "https://cdn.example.org/qr/c1.png",
            "expiresAt": "2026-10-16T09:15:00Z",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/classes/..%2Fattendance%2Fcheck-in%3Fx=/schedules/s1/qr"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "message": "Class not found" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/api/attendance/check-in"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let api = backend(&server);
    let validity = ValidityMinutes::default();

    let response = api
        .issue_token(&ClassId("c/1".into()), &ScheduleId("s#2".into()), validity)
        .await
        .unwrap();
    assert_eq!(response.qr_image_url, "https://cdn.example.org/qr/c1.png");

    let err = api
        .issue_token(
            &ClassId("../attendance/check-in?x=".into()),
            &ScheduleId("s1".into()),
            validity,
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "Class not found");
}

#[tokio::test]
async fn dot_segment_ids_are_never_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let api = backend(&server);
    for id in ["..", "."] {
        let err = api
            .issue_token(
                &ClassId("c1".into()),
                &ScheduleId(id.into()),
                ValidityMinutes::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }
}

#[tokio::test]
async fn accepts_legacy_image_field_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/classes/c1/schedules/s1/qr"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "qrCodeUrl": "data:image/png;base64,AAAA",
            "expiresAt": "2026-10-16T09:15:00Z",
            "qrData": "TOK123",
        })))
        .mount(&server)
        .await;

    let response = backend(&server)
        .issue_token(
            &ClassId("c1".into()),
            &ScheduleId("s1".into()),
            ValidityMinutes::default(),
        )
        .await
        .unwrap();

    assert_eq!(response.qr_image_url, "data:image/png;base64,AAAA");
    assert_eq!(response.qr_data.as_deref(), Some("TOK123"));
}

#[tokio::test]
async fn backend_error_message_reaches_the_issuer_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/classes/c1/schedules/s1/qr"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({ "message": "Not your class" })),
        )
        .mount(&server)
        .await;

    let api = backend(&server);
    let issuer = RefCell::new(TokenIssuer::new(ClassId("c1".into()), ScheduleId("s1".into())));
    let validity = ValidityMinutes::new(5).unwrap();

    let result = TokenIssuer::issue(&issuer, &api, validity).await;
    assert_eq!(
        result,
        Err(AttendanceError::IssuanceFailed("Not your class".into()))
    );
    assert_eq!(
        issuer.borrow().state(),
        &IssuerState::Error {
            message: "Not your class".into()
        }
    );
    assert_eq!(issuer.borrow().last_confirmed(), Some(validity));
}

#[tokio::test]
async fn missing_error_message_falls_back_to_status_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/attendance/check-in"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = backend(&server).check_in("TOK123").await.unwrap_err();
    match err {
        ApiError::Rejected { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Unauthorized");
        }
        other => panic!("expected a rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn check_in_sends_payload_and_reads_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/attendance/check-in"))
        .and(body_json(json!({ "payload": "TOK123" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "message": "Welcome to CS101" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = backend(&server).check_in("TOK123").await.unwrap();
    assert_eq!(response.message, "Welcome to CS101");
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let config = Config {
        api_base_url: "http://127.0.0.1:9".to_owned(),
        ..Config::default()
    };
    let err = HttpBackend::new(&config)
        .unwrap()
        .check_in("TOK123")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn scan_session_checks_in_over_http_and_releases_the_scanner() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/attendance/check-in"))
        .and(body_json(json!({ "payload": " TOK\t" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ScanClient::with_config(KeyboardCamera::new(), &Config::default());
    let session = ScanSession::new(client, backend(&server));
    session.client_mut().start().unwrap();

    // Sent byte for byte, surrounding whitespace included
    let result = session.on_decode(" TOK\t").await;
    assert!(matches!(result, Some(CheckInResult::CheckedIn { .. })));
    assert_eq!(session.client().status(), ScanStatus::Succeeded);
    assert!(!session.client().holds_decoder());
    // An empty backend message gets the stock text
    assert_eq!(
        session.client().success_message(),
        Some("Checked in successfully")
    );
}

#[tokio::test]
async fn rejected_scan_shows_backend_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/attendance/check-in"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "QR code has expired" })),
        )
        .mount(&server)
        .await;

    let client = ScanClient::with_config(KeyboardCamera::new(), &Config::default());
    let session = ScanSession::new(client, backend(&server));
    session.client_mut().start().unwrap();

    let result = session.on_decode("OLD-TOKEN").await;
    assert!(matches!(
        result,
        Some(CheckInResult::Rejected(AttendanceError::CheckInRejected(ref message)))
            if message == "QR code has expired"
    ));
    assert_eq!(session.client().status(), ScanStatus::Failed);
    assert!(session.client().holds_decoder());

    let notice = session.client_mut().take_notice().unwrap();
    assert_eq!(notice.message, "QR code has expired");
}
