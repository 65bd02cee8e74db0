//! The password-reset flow over HTTP.

#![allow(clippy::unwrap_used)]

use depot_core::Role;
use depot_integration_tests::TestApp;
use reqwest::StatusCode;
use serde_json::Value;

const RESET_MESSAGE: &str =
    "If an account exists with this email, you will receive a password reset link";

async fn request_reset(app: &TestApp, email: &str) -> (StatusCode, String) {
    let response = TestApp::client()
        .post(app.url("/forgot-password"))
        .form(&[("email", email)])
        .send()
        .await
        .unwrap();
    (response.status(), response.text().await.unwrap())
}

async fn redeem(app: &TestApp, token: &str, password: &str) -> reqwest::Response {
    TestApp::client()
        .post(app.url("/reset-password"))
        .form(&[
            ("token", token),
            ("password", password),
            ("confirm_password", password),
        ])
        .send()
        .await
        .unwrap()
}

fn token_of(link: &url::Url) -> String {
    link.query_pairs()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

#[tokio::test]
async fn test_reset_replaces_password_and_revokes_sessions() {
    let app = TestApp::spawn().await;
    let client = TestApp::client();
    app.register(&client, "a@x.com", "secret123").await;
    let other_device = TestApp::client();
    app.login(&other_device, "a@x.com", "secret123").await;
    assert_eq!(app.store.session_count(), 2);

    let (status, message) = request_reset(&app, "a@x.com").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message, RESET_MESSAGE);
    let link = app.links.last_link().unwrap();
    assert_eq!(link.path(), "/reset-password");

    let response = redeem(&app, &token_of(&link), "newpass123").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.text().await.unwrap(),
        "Password has been reset successfully"
    );

    assert_eq!(app.store.session_count(), 0);
    assert_eq!(app.me(&client).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.me(&other_device).await.status(), StatusCode::UNAUTHORIZED);

    let old = app.login(&TestApp::client(), "a@x.com", "secret123").await;
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);
    let new = app.login(&TestApp::client(), "a@x.com", "newpass123").await;
    assert_eq!(new.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_unknown_email_gets_identical_response() {
    let app = TestApp::spawn().await;
    app.create_account("real@x.com", "secret123", Role::User)
        .await;

    let known = request_reset(&app, "real@x.com").await;
    let unknown = request_reset(&app, "ghost@x.com").await;

    assert_eq!(known, unknown);
    assert_eq!(app.links.count(), 1);
}

#[tokio::test]
async fn test_reset_link_validates_without_consuming() {
    let app = TestApp::spawn().await;
    app.create_account("a@x.com", "secret123", Role::User).await;
    request_reset(&app, "a@x.com").await;
    let link = app.links.last_link().unwrap();

    for _ in 0..2 {
        let response = TestApp::client().get(link.clone()).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["token"], token_of(&link));
    }

    let response = redeem(&app, &token_of(&link), "newpass123").await;
    assert_eq!(response.status(), StatusCode::OK);

    // Spent links send the user back to request a new one.
    let response = TestApp::client().get(link).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "/forgot-password"
    );
}

#[tokio::test]
async fn test_used_token_is_reported_as_used() {
    let app = TestApp::spawn().await;
    app.create_account("a@x.com", "secret123", Role::User).await;
    request_reset(&app, "a@x.com").await;
    let token = token_of(&app.links.last_link().unwrap());

    assert_eq!(redeem(&app, &token, "newpass123").await.status(), StatusCode::OK);
    assert_eq!(
        redeem(&app, &token, "another-pass").await.status(),
        StatusCode::GONE
    );

    let login = app.login(&TestApp::client(), "a@x.com", "newpass123").await;
    assert_eq!(login.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_form_checks_run_before_the_token_is_touched() {
    let app = TestApp::spawn().await;
    app.create_account("a@x.com", "secret123", Role::User).await;
    request_reset(&app, "a@x.com").await;
    let token = token_of(&app.links.last_link().unwrap());

    let mismatch = TestApp::client()
        .post(app.url("/reset-password"))
        .form(&[
            ("token", token.as_str()),
            ("password", "newpass123"),
            ("confirmPassword", "newpass124"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(mismatch.status(), StatusCode::BAD_REQUEST);
    assert_eq!(mismatch.text().await.unwrap(), "Passwords do not match");

    let short = redeem(&app, &token, "short").await;
    assert_eq!(short.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        short.text().await.unwrap(),
        "Password must be at least 8 characters long"
    );

    let missing = TestApp::client()
        .post(app.url("/reset-password"))
        .form(&[("token", token.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(missing.text().await.unwrap(), "Invalid request");

    // Still redeemable.
    assert_eq!(redeem(&app, &token, "newpass123").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_garbage_token_is_invalid() {
    let app = TestApp::spawn().await;

    let response = redeem(&app, "definitely-not-a-token", "newpass123").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.text().await.unwrap(),
        "Invalid or expired reset token"
    );
}

#[tokio::test]
async fn test_every_issued_token_stays_valid() {
    let app = TestApp::spawn().await;
    app.create_account("a@x.com", "secret123", Role::User).await;

    request_reset(&app, "a@x.com").await;
    let first = token_of(&app.links.last_link().unwrap());
    request_reset(&app, "a@x.com").await;
    let second = token_of(&app.links.last_link().unwrap());
    assert_ne!(first, second);

    assert_eq!(redeem(&app, &first, "first-pass").await.status(), StatusCode::OK);
    assert_eq!(redeem(&app, &second, "second-pass").await.status(), StatusCode::OK);

    let login = app.login(&TestApp::client(), "a@x.com", "second-pass").await;
    assert_eq!(login.status(), StatusCode::SEE_OTHER);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redemption_has_one_winner() {
    let app = TestApp::spawn().await;
    app.create_account("a@x.com", "secret123", Role::User).await;
    request_reset(&app, "a@x.com").await;
    let token = token_of(&app.links.last_link().unwrap());

    let mut set = tokio::task::JoinSet::new();
    for i in 0..8 {
        let resets = app.state.resets().clone();
        let token = token.clone();
        set.spawn(async move { resets.redeem(&token, &format!("password-{i}")).await });
    }

    let mut winners = 0;
    let mut used = 0;
    while let Some(result) = set.join_next().await {
        match result.unwrap().unwrap() {
            depot_server::services::RedeemOutcome::PasswordReset { .. } => winners += 1,
            depot_server::services::RedeemOutcome::AlreadyUsed => used += 1,
            depot_server::services::RedeemOutcome::InvalidOrExpired => {
                panic!("a live token must not read as invalid")
            }
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(used, 7);
}
