use circle_api::{CreateCircleReq, CreateUserReq};
use circlectl::{client::ListParams, ApiClient, ClientError, SessionStore};
use circles::{
    api::{build_router, AppState},
    config::Config,
};
use reqwest::StatusCode;
use std::{net::TcpListener, time::Duration};
use tokio::task::JoinHandle;

async fn spawn_server() -> (ApiClient, JoinHandle<()>, tempfile::TempDir) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let mut config = Config::for_data_dir(addr.to_string(), tmp.path().to_path_buf());
    config.seed_sample_data = true;
    let state = AppState::new(config).await.unwrap();
    let app = build_router(state);
    let server = tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });
    (ApiClient::new(format!("http://{}/", addr)), server, tmp)
}

#[tokio::test]
async fn sign_in_and_keep_session() {
    let (api, server, tmp) = spawn_server().await;
    let resp = api.sign_in("test_user", "password123").await.unwrap();
    assert_eq!(resp.user.id, "user-000");

    let store = SessionStore::new(tmp.path().join("session.json"));
    store
        .save(
            &resp.user.id,
            &resp.user.name,
            Some(resp.token),
            Some(Duration::from_millis(resp.expires_in as u64)),
        )
        .await
        .unwrap();
    let me = circlectl::require_session(&store).await.unwrap();
    assert_eq!(me.name, "test_user");

    match api.sign_in("test_user", "nope").await {
        Err(ClientError::Api { status, message }) => {
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(message, "invalid username or password");
        }
        other => panic!("expected api error, got {other:?}"),
    }

    store.clear().await.unwrap();
    assert!(circlectl::require_session(&store).await.is_err());
    server.abort();
}

#[tokio::test]
async fn browse_join_and_chat() {
    let (api, server, _tmp) = spawn_server().await;

    let page = api
        .list_circles(&ListParams {
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.limit, 2);
    assert_eq!(page.data.len(), 2);
    assert!(page.total >= 2);

    let user = api
        .register_user(&CreateUserReq {
            name: Some("erin".into()),
            password: Some("pw".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    let circle = api
        .create_circle(&CreateCircleReq {
            name: Some("Chess Club".into()),
            description: Some("Weekly chess meetups for all levels".into()),
            circle_type: Some("university".into()),
            owner_id: Some(user.id.clone()),
            tags: Some(vec!["games".into(), "Games".into()]),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(circle.tags, vec!["games"]);
    assert_eq!(api.get_circle(&circle.id).await.unwrap(), circle);

    let joined = api.join_circle(&circle.id, "user-001", "user001").await.unwrap();
    assert!(joined.is_new_chat);
    let sent = api
        .send_message(&circle.id, "user-001", &user.id, "See you Wednesday")
        .await
        .unwrap();
    assert!(!sent.is_new_chat);
    assert_eq!(sent.chat.id, joined.chat.id);

    let history = api.chat_history(&circle.id, "user-001").await.unwrap();
    assert_eq!(history.messages.len(), 2);
    assert_eq!(history.messages[1].content, "See you Wednesday");

    let profile = api.get_user(&user.id).await.unwrap();
    assert_eq!(profile.user, user);
    assert!(profile.appliment_ids.is_empty());

    api.delete_circle(&circle.id).await.unwrap();
    match api.get_circle(&circle.id).await {
        Err(ClientError::Api { status, .. }) => assert_eq!(status, StatusCode::NOT_FOUND),
        other => panic!("expected not found, got {other:?}"),
    }
    server.abort();
}
