use crate::{
    applications, auth,
    chats::{ChatStore, NewMessage},
    config::Config,
    db::{self, DbPool},
    directory::{self, CircleQuery},
    error::{AppError, AppResult},
    join::{self, ConversationLocks},
    model::{check_id, required, ChatSummary},
    seed, users,
};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use circle_api::{
    ApplicationList, ApplyResp, ChatHistory, CircleActionReq, CircleChats, CreateCircleReq,
    CreateUserReq, DeleteApplicationResp, DeleteCircleResp, JoinResp, MarkReadReq, MarkReadResp,
    SendMessageReq, SendMessageResp, SignInReq, SignInResp, SignInUser, UpdateUserReq,
    UpdateUserResp, UserProfile,
};
use rusqlite::Connection;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub chats: Arc<ChatStore>,
    pub locks: Arc<ConversationLocks>,
    pub config: Config,
    pub tokens: Arc<auth::TokenSigner>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .with_context(|| format!("creating {}", config.data_dir.display()))?;
        let pool = db::open_pool(config.database_path())?;
        if config.seed_sample_data {
            let conn = pool.get()?;
            seed::seed_sample_data(&conn)?;
        }
        Ok(Self {
            pool,
            chats: Arc::new(ChatStore::new()),
            locks: Arc::new(ConversationLocks::new()),
            tokens: Arc::new(auth::TokenSigner::new(config.token_ttl)),
            config,
        })
    }

    /// Run `f` with a pooled connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| AppError::Internal(e.into()))?
    }
}

/// Build the HTTP application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/signin", post(signin))
        .route("/circle", get(list_circles).post(create_circle))
        .route(
            "/circle/:id",
            get(get_circle).post(circle_action).delete(delete_circle),
        )
        .route("/circle/:id/applications", get(list_applications))
        .route("/circle/:id/chats", get(circle_chats))
        .route(
            "/circle/:id/chats/:user_id",
            get(chat_history).post(send_chat_message),
        )
        .route("/circle/:id/chats/:user_id/read", post(mark_read))
        .route("/applications/:application_id", delete(delete_application))
        .route(
            "/applications/:application_id/approve",
            post(approve_application),
        )
        .route("/user", post(create_user))
        .route("/user/:user_id", get(get_user).patch(update_user))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn signin(
    State(state): State<AppState>,
    body: Result<Json<SignInReq>, JsonRejection>,
) -> AppResult<Json<SignInResp>> {
    let Json(req) = body?;
    let username = required("username", req.username.as_deref())?;
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::validation("password", "password is required"))?;

    let name = username.clone();
    let found = state
        .with_conn(move |conn| users::verify_credentials(conn, &name, &password))
        .await?;
    let Some(user) = found else {
        tracing::warn!(username = %username, "sign-in failed");
        tokio::time::sleep(state.config.signin_delay).await;
        return Err(AppError::Unauthorized);
    };

    let signed = state.tokens.sign(&user.id)?;
    tracing::info!(user_id = %user.id, "signed in");
    Ok(Json(SignInResp {
        success: true,
        message: "Signed in successfully".into(),
        user: SignInUser {
            id: user.id,
            name: user.name,
            attribute: user.attribute,
            age: user.age,
        },
        token: signed.token,
        expires_in: signed.expires_in_ms,
    }))
}

async fn list_circles(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<circle_api::CirclePage>> {
    let query = CircleQuery::from_params(
        params.get("offset").map(String::as_str),
        params.get("limit").map(String::as_str),
        params.get("type").map(String::as_str),
        params.get("tag").map(String::as_str),
    )?;
    let page = state
        .with_conn(move |conn| directory::list(conn, &query))
        .await?;
    Ok(Json(page))
}

async fn create_circle(
    State(state): State<AppState>,
    body: Result<Json<CreateCircleReq>, JsonRejection>,
) -> AppResult<(StatusCode, Json<circle_api::Circle>)> {
    let Json(req) = body?;
    let circle = state
        .with_conn(move |conn| directory::create(conn, &req))
        .await?;
    Ok((StatusCode::CREATED, Json(circle)))
}

async fn get_circle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<circle_api::Circle>> {
    check_id("circleId", &id)?;
    let circle = state
        .with_conn(move |conn| directory::find_by_id(conn, &id))
        .await?
        .ok_or(AppError::NotFound("Circle"))?;
    Ok(Json(circle))
}

async fn circle_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<CircleActionReq>, JsonRejection>,
) -> AppResult<axum::response::Response> {
    use axum::response::IntoResponse;

    check_id("circleId", &id)?;
    let Json(req) = body?;
    match req {
        CircleActionReq::Join(join_req) => {
            let user_id = required("userId", join_req.user_id.as_deref())?;
            check_id("userId", &user_id)?;
            let display_name = join_req.user_name.unwrap_or_default();
            let (chats, locks) = (state.chats.clone(), state.locks.clone());
            let outcome = state
                .with_conn(move |conn| {
                    join::submit_join_request(conn, &chats, &locks, &id, &user_id, &display_name)
                })
                .await?;
            let (status, message) = if outcome.created {
                (StatusCode::CREATED, "Join request sent")
            } else {
                (StatusCode::OK, "Join request added to existing chat")
            };
            let resp = JoinResp {
                success: true,
                message: message.into(),
                chat: outcome.chat,
                is_new_chat: outcome.created,
            };
            Ok((status, Json(resp)).into_response())
        }
        CircleActionReq::Apply(apply_req) => {
            let applicant = apply_req.user_appliment_id.trim().to_string();
            if applicant.is_empty() {
                return Err(AppError::validation(
                    "user_appliment_id",
                    "user_appliment_id is required",
                ));
            }
            check_id("user_appliment_id", &applicant)?;
            let (application, name) = state
                .with_conn(move |conn| {
                    let application = applications::apply(conn, &id, &applicant)?;
                    let name = users::find_by_id(conn, &applicant)?.map(|u| u.name);
                    Ok((application, name))
                })
                .await?;
            let resp = ApplyResp {
                success: true,
                application,
                name,
            };
            Ok((StatusCode::CREATED, Json(resp)).into_response())
        }
    }
}

async fn delete_circle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DeleteCircleResp>> {
    check_id("circleId", &id)?;
    let circle_id = id.clone();
    let (chats, locks) = (state.chats.clone(), state.locks.clone());
    let deleted = state
        .with_conn(move |conn| join::delete_circle(conn, &chats, &locks, &circle_id))
        .await?;
    if !deleted {
        return Err(AppError::NotFound("Circle"));
    }
    Ok(Json(DeleteCircleResp {
        success: true,
        message: "Circle deleted successfully".into(),
        circle_id: id,
    }))
}

async fn list_applications(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApplicationList>> {
    check_id("circleId", &id)?;
    let circle_id = id.clone();
    let applications = state
        .with_conn(move |conn| {
            if !directory::exists(conn, &circle_id)? {
                return Err(AppError::NotFound("Circle"));
            }
            applications::list_for_circle(conn, &circle_id)
        })
        .await?;
    Ok(Json(ApplicationList {
        circle_id: id,
        applications,
    }))
}

async fn approve_application(
    State(state): State<AppState>,
    Path(application_id): Path<String>,
) -> AppResult<Json<circle_api::Application>> {
    check_id("applicationId", &application_id)?;
    let application = state
        .with_conn(move |conn| applications::approve(conn, &application_id))
        .await?
        .ok_or(AppError::NotFound("Application"))?;
    Ok(Json(application))
}

async fn delete_application(
    State(state): State<AppState>,
    Path(application_id): Path<String>,
) -> AppResult<Json<DeleteApplicationResp>> {
    check_id("applicationId", &application_id)?;
    let id = application_id.clone();
    let removed = state
        .with_conn(move |conn| applications::reject(conn, &id))
        .await?;
    if !removed {
        return Err(AppError::NotFound("Application"));
    }
    Ok(Json(DeleteApplicationResp {
        success: true,
        message: "Application rejected".into(),
        application_id,
    }))
}

async fn ensure_circle(state: &AppState, circle_id: &str) -> AppResult<()> {
    let id = circle_id.to_string();
    if state
        .with_conn(move |conn| directory::exists(conn, &id))
        .await?
    {
        Ok(())
    } else {
        Err(AppError::NotFound("Circle"))
    }
}

async fn circle_chats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<CircleChats>> {
    check_id("circleId", &id)?;
    ensure_circle(&state, &id).await?;
    let chats = state.chats.list_by_circle(&id);
    Ok(Json(CircleChats {
        circle_id: id,
        chats,
    }))
}

async fn chat_history(
    State(state): State<AppState>,
    Path((circle_id, user_id)): Path<(String, String)>,
) -> AppResult<Json<ChatHistory>> {
    check_id("circleId", &circle_id)?;
    check_id("userId", &user_id)?;
    ensure_circle(&state, &circle_id).await?;
    let chat = state.chats.find_by_user_and_circle(&circle_id, &user_id);
    Ok(Json(ChatHistory {
        success: true,
        chat: chat.as_ref().map(ChatSummary::from),
        messages: chat.map(|c| c.messages).unwrap_or_default(),
        circle_id,
        user_id,
    }))
}

async fn send_chat_message(
    State(state): State<AppState>,
    Path((circle_id, user_id)): Path<(String, String)>,
    body: Result<Json<SendMessageReq>, JsonRejection>,
) -> AppResult<(StatusCode, Json<SendMessageResp>)> {
    check_id("circleId", &circle_id)?;
    check_id("userId", &user_id)?;
    let Json(req) = body?;
    let sender_id = required("senderId", req.sender_id.as_deref())?;
    check_id("senderId", &sender_id)?;
    let msg = NewMessage::new(sender_id, req.content.as_deref().unwrap_or_default())?;

    let (chats, locks) = (state.chats.clone(), state.locks.clone());
    let outcome = state
        .with_conn(move |conn| join::send_message(conn, &chats, &locks, &circle_id, &user_id, msg))
        .await?;
    let new_message = outcome
        .chat
        .messages
        .last()
        .cloned()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("message was not stored")))?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(SendMessageResp {
            success: true,
            message: "Message sent".into(),
            chat: ChatSummary::from(&outcome.chat),
            new_message,
            is_new_chat: outcome.created,
        }),
    ))
}

async fn mark_read(
    State(state): State<AppState>,
    Path((circle_id, user_id)): Path<(String, String)>,
    body: Result<Json<MarkReadReq>, JsonRejection>,
) -> AppResult<Json<MarkReadResp>> {
    check_id("circleId", &circle_id)?;
    check_id("userId", &user_id)?;
    let Json(req) = body?;
    let reader_id = required("readerId", req.reader_id.as_deref())?;
    check_id("readerId", &reader_id)?;
    ensure_circle(&state, &circle_id).await?;
    let updated = state
        .chats
        .find_by_user_and_circle(&circle_id, &user_id)
        .and_then(|chat| state.chats.mark_read(&chat.id, &reader_id))
        .ok_or(AppError::NotFound("Chat"))?;
    Ok(Json(MarkReadResp { updated }))
}

async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<UserProfile>> {
    check_id("userId", &user_id)?;
    let profile = state
        .with_conn(move |conn| {
            let user = users::find_by_id(conn, &user_id)?.ok_or(AppError::NotFound("User"))?;
            let appliment_ids = users::applicant_ids_for_owner(conn, &user.id)?;
            Ok(UserProfile {
                user,
                appliment_ids,
            })
        })
        .await?;
    Ok(Json(profile))
}

async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<CreateUserReq>, JsonRejection>,
) -> AppResult<(StatusCode, Json<circle_api::User>)> {
    let Json(req) = body?;
    let user = state
        .with_conn(move |conn| users::create(conn, &req))
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Result<Json<UpdateUserReq>, JsonRejection>,
) -> AppResult<Json<UpdateUserResp>> {
    check_id("userId", &user_id)?;
    let Json(req) = body?;
    let user = state
        .with_conn(move |conn| users::update(conn, &user_id, &req))
        .await?
        .ok_or(AppError::NotFound("User"))?;
    Ok(Json(UpdateUserResp {
        message: "User updated successfully".into(),
        user,
    }))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

/// Run the HTTP server bound to the configured address.
pub async fn run_http_server(config: Config) -> Result<()> {
    let addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind))?;
    let state = AppState::new(config).await?;
    tracing::info!(%addr, "listening");
    axum::Server::bind(&addr)
        .serve(build_router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
