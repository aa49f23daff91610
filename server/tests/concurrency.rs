use axum::http::StatusCode;
use circles::{
    api::{build_router, AppState},
    chats::ChatStore,
    config::Config,
    db, directory,
    error::AppError,
    join::{self, ConversationLocks},
    model::{Circle, CircleType},
};
use futures::future::join_all;
use serde_json::{json, Value};
use std::{net::TcpListener, sync::Arc, thread};

fn circle(id: &str) -> Circle {
    Circle {
        id: id.into(),
        name: "Futsal Lovers".into(),
        description: "Casual futsal every weekend".into(),
        circle_type: CircleType::Amateur,
        tags: vec![],
        members_count: 1,
        location: String::new(),
        active_days: vec![],
        owner_id: "owner".into(),
        created_at: 0,
        updated_at: 0,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_join_requests_share_one_chat() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let state = AppState::new(Config::for_data_dir(
        addr.to_string(),
        tmp.path().to_path_buf(),
    ))
    .await
    .unwrap();
    {
        let conn = state.pool.get().unwrap();
        directory::insert(&conn, &circle("circle-001")).unwrap();
    }
    let app = build_router(state.clone());
    let server = tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });

    const N: usize = 20;
    let client = reqwest::Client::new();
    let requests = (0..N).map(|_| {
        let client = client.clone();
        async move {
            let resp = client
                .post(format!("http://{}/circle/circle-001", addr))
                .json(&json!({"userId": "user-42", "userName": "Alice"}))
                .send()
                .await
                .unwrap();
            let status = resp.status();
            let v: Value = resp.json().await.unwrap();
            (status, v["chat"]["id"].as_str().unwrap().to_string())
        }
    });
    let results = join_all(requests).await;

    let created = results
        .iter()
        .filter(|(s, _)| *s == StatusCode::CREATED)
        .count();
    assert_eq!(created, 1);
    assert!(results.iter().all(|(s, _)| s.is_success()));
    assert!(results.iter().all(|(_, id)| *id == results[0].1));

    assert_eq!(state.chats.len(), 1);
    let chat = state
        .chats
        .find_by_user_and_circle("circle-001", "user-42")
        .unwrap();
    assert_eq!(chat.messages.len(), N);
    assert_eq!(state.locks.active(), 0);

    server.abort();
}

#[test]
fn joins_racing_a_delete_leave_no_orphan_chats() {
    let tmp = tempfile::tempdir().unwrap();
    let pool = db::open_pool(tmp.path().join("circles.db")).unwrap();
    let store = Arc::new(ChatStore::new());
    let locks = Arc::new(ConversationLocks::new());

    for round in 0..50 {
        let id = format!("circle-{round}");
        directory::insert(&pool.get().unwrap(), &circle(&id)).unwrap();

        let mut handles = Vec::new();
        for t in 0..4 {
            let (pool, store, locks, id) = (pool.clone(), store.clone(), locks.clone(), id.clone());
            handles.push(thread::spawn(move || {
                let conn = pool.get().unwrap();
                for _ in 0..20 {
                    match join::submit_join_request(
                        &conn,
                        &store,
                        &locks,
                        &id,
                        &format!("user-{t}"),
                        "Alice",
                    ) {
                        Ok(_) | Err(AppError::NotFound("Circle")) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            }));
        }
        let deleter = {
            let (pool, store, locks, id) = (pool.clone(), store.clone(), locks.clone(), id.clone());
            thread::spawn(move || {
                let conn = pool.get().unwrap();
                join::delete_circle(&conn, &store, &locks, &id).unwrap()
            })
        };
        for h in handles {
            h.join().unwrap();
        }
        assert!(deleter.join().unwrap());

        assert!(store.list_by_circle(&id).is_empty(), "round {round}");
        assert!(!directory::exists(&pool.get().unwrap(), &id).unwrap());
    }
    assert!(store.is_empty());
    assert_eq!(locks.active(), 0);
}
