mod support;

use std::sync::Arc;

use apnamanager_client::{ClientRuntime, LoginOutcome, Phase};
use serde_json::json;
use support::{RecordingHost, config_for, envelope, user_json};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn start_restores_session_and_expiry_ends_it() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(user_json("u1", "Hotel"))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/rooms/dashboard"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let host = Arc::new(RecordingHost::default());
    let runtime = ClientRuntime::start(config_for(&server), host.clone())
        .await
        .unwrap();
    assert_eq!(runtime.session().phase(), Phase::Authenticated);

    let mut states = runtime.session().subscribe();
    let _ = runtime.transport().get("/rooms/dashboard").await;
    states.wait_for(|s| s.user.is_none()).await.unwrap();

    assert_eq!(host.toasts().len(), 1);
    assert_eq!(host.navigations(), vec!["/login"]);
    runtime.shutdown();
}

#[tokio::test]
async fn reset_ticket_completes_through_account() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/profile"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(envelope(json!({"userId": "h1", "needsPasswordReset": true}))),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/auth/change-password"))
        .and(body_json(json!({"userId": "h1", "newPassword": "fresh-pass"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Password updated"})))
        .expect(1)
        .mount(&server)
        .await;

    let host = Arc::new(RecordingHost::default());
    let runtime = ClientRuntime::start(config_for(&server), host.clone())
        .await
        .unwrap();
    assert_eq!(runtime.session().phase(), Phase::Anonymous);

    let outcome = runtime
        .session()
        .login("desk@hotel.in", "temporary", None)
        .await
        .unwrap();
    let LoginOutcome::PasswordResetRequired(ticket) = outcome else {
        panic!("expected a reset ticket");
    };

    let account = runtime.account();
    assert!(
        account
            .complete_password_reset(ticket.clone(), "fresh-pass", "fresh-pas")
            .await
            .is_err()
    );
    account
        .complete_password_reset(ticket, "fresh-pass", "fresh-pass")
        .await
        .unwrap();

    assert_eq!(runtime.session().phase(), Phase::Anonymous);
    assert!(host.navigations().is_empty());
    runtime.shutdown();
}

#[tokio::test]
async fn change_password_surfaces_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(user_json("u1", "Police"))))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/users/change-password"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "Old password is incorrect"})))
        .mount(&server)
        .await;

    let runtime = ClientRuntime::start(config_for(&server), Arc::new(RecordingHost::default()))
        .await
        .unwrap();

    let err = runtime
        .account()
        .change_password("wrong", "n3w-pass", "n3w-pass")
        .await
        .unwrap_err();
    assert_eq!(err.server_message().as_deref(), Some("Old password is incorrect"));
    assert_eq!(runtime.session().phase(), Phase::Authenticated);
    runtime.shutdown();
}
