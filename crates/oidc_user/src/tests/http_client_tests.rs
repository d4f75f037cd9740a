use super::*;
use std::{sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::{
    net::TcpListener,
    sync::{Mutex, Notify},
};

#[derive(Clone)]
struct UserInfoServerState {
    requests: Arc<Mutex<Vec<Option<String>>>>,
    fail_with: Arc<Mutex<Option<StatusCode>>>,
    hold: Arc<Mutex<Option<Arc<Notify>>>>,
}

async fn handle_userinfo(
    State(state): State<UserInfoServerState>,
    headers: HeaderMap,
) -> axum::response::Response {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let request_number = {
        let mut requests = state.requests.lock().await;
        requests.push(authorization.clone());
        requests.len()
    };

    let hold = state.hold.lock().await.clone();
    if let Some(hold) = hold {
        hold.notified().await;
    }

    if let Some(status) = *state.fail_with.lock().await {
        return status.into_response();
    }
    if authorization.as_deref() != Some("Bearer token-1") {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    Json(json!({
        "sub": "u1",
        "name": format!("User revision {request_number}"),
        "email": "u1@example.test",
        "tenant": "acme"
    }))
    .into_response()
}

async fn spawn_userinfo_server() -> anyhow::Result<(Url, UserInfoServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = UserInfoServerState {
        requests: Arc::new(Mutex::new(Vec::new())),
        fail_with: Arc::new(Mutex::new(None)),
        hold: Arc::new(Mutex::new(None)),
    };
    let app = Router::new()
        .route("/userinfo", get(handle_userinfo))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((Url::parse(&format!("http://{addr}/userinfo"))?, state))
}

#[tokio::test]
async fn fetch_without_token_reports_no_session() {
    let (endpoint, state) = spawn_userinfo_server().await.expect("spawn server");
    let client = HttpIdentityClient::<UserInfo>::new(endpoint);

    assert!(!client.has_active_session());
    let err = client
        .fetch_user_info(true)
        .await
        .expect_err("no token must fail");
    assert!(matches!(
        err.downcast_ref::<UserInfoError>(),
        Some(UserInfoError::NoActiveSession)
    ));
    assert!(state.requests.lock().await.is_empty());
}

#[tokio::test]
async fn fetch_sends_bearer_token_and_decodes_claims() {
    let (endpoint, state) = spawn_userinfo_server().await.expect("spawn server");
    let client = HttpIdentityClient::<UserInfo>::new(endpoint);
    client.set_access_token(Some("token-1".into()));

    assert!(client.has_active_session());
    let user = client.fetch_user_info(false).await.expect("user info");

    assert_eq!(user.sub, "u1");
    assert_eq!(user.email.as_deref(), Some("u1@example.test"));
    assert_eq!(user.claim("tenant"), Some(&json!("acme")));
    assert_eq!(
        *state.requests.lock().await,
        vec![Some("Bearer token-1".to_string())]
    );
}

#[tokio::test]
async fn cached_answer_is_reused_unless_forced() {
    let (endpoint, state) = spawn_userinfo_server().await.expect("spawn server");
    let client = HttpIdentityClient::<UserInfo>::new(endpoint);
    client.set_access_token(Some("token-1".into()));

    let first = client.fetch_user_info(false).await.expect("first");
    let cached = client.fetch_user_info(false).await.expect("cached");
    assert_eq!(first, cached);
    assert_eq!(state.requests.lock().await.len(), 1);

    let live = client.fetch_user_info(true).await.expect("live");
    assert_eq!(live.name.as_deref(), Some("User revision 2"));
    assert_eq!(state.requests.lock().await.len(), 2);
}

#[tokio::test]
async fn token_change_invalidates_cache() {
    let (endpoint, state) = spawn_userinfo_server().await.expect("spawn server");
    let client = HttpIdentityClient::<UserInfo>::new(endpoint);
    client.set_access_token(Some("token-1".into()));
    client.fetch_user_info(false).await.expect("first");

    client.set_access_token(Some("token-2".into()));
    let err = client
        .fetch_user_info(false)
        .await
        .expect_err("new token is not accepted by the server");

    assert!(matches!(
        err.downcast_ref::<UserInfoError>(),
        Some(UserInfoError::Status { status: 401 })
    ));
    assert_eq!(state.requests.lock().await.len(), 2);

    client.set_access_token(None);
    assert!(!client.has_active_session());
}

#[tokio::test]
async fn server_error_is_reported_with_status() {
    let (endpoint, state) = spawn_userinfo_server().await.expect("spawn server");
    *state.fail_with.lock().await = Some(StatusCode::BAD_GATEWAY);
    let client = HttpIdentityClient::<UserInfo>::new(endpoint);
    client.set_access_token(Some("token-1".into()));

    let err = client.fetch_user_info(true).await.expect_err("502");
    assert_eq!(
        format!("{err:#}"),
        "userinfo endpoint answered with status 502"
    );
}

#[tokio::test]
async fn unreachable_endpoint_is_a_request_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let endpoint = Url::parse(&format!("http://{addr}/userinfo")).expect("url");
    let client = HttpIdentityClient::<UserInfo>::new(endpoint);
    client.set_access_token(Some("token-1".into()));

    let err = client.fetch_user_info(true).await.expect_err("refused");
    assert!(err.chain().any(|cause| matches!(
        cause.downcast_ref::<UserInfoError>(),
        Some(UserInfoError::Request(_))
    )));
    assert!(format!("{err:#}").starts_with(&format!("GET http://{addr}/userinfo")));
}

#[tokio::test]
async fn sign_out_during_fetch_keeps_cache_cleared() {
    let (endpoint, state) = spawn_userinfo_server().await.expect("spawn server");
    let hold = Arc::new(Notify::new());
    *state.hold.lock().await = Some(hold.clone());
    let client = Arc::new(HttpIdentityClient::<UserInfo>::new(endpoint));
    client.set_access_token(Some("token-1".into()));

    let in_flight = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.fetch_user_info(true).await }
    });
    tokio::time::timeout(Duration::from_secs(1), async {
        while state.requests.lock().await.is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("request reached server");

    client.set_access_token(None);
    *state.hold.lock().await = None;
    hold.notify_one();
    let answered = in_flight.await.expect("join").expect("user info");
    assert_eq!(answered.name.as_deref(), Some("User revision 1"));

    client.set_access_token(Some("token-1".into()));
    let user = client.fetch_user_info(false).await.expect("user info");
    assert_eq!(user.name.as_deref(), Some("User revision 2"));
    assert_eq!(state.requests.lock().await.len(), 2);
}
