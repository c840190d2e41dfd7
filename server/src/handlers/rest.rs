/// REST API handlers for HTTP endpoints.
/// Handles user registration, conversation and thread snapshots, sending,
/// user search, and reports.

use crate::db::{models::*, Database, DbPool};
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use serde_json::json;

/// Header carrying the id of the calling user
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Resolve the calling user from the `X-User-Id` header and mark them as seen
async fn authenticate(pool: &DbPool, req: &HttpRequest) -> Result<User, HttpResponse> {
    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .ok_or_else(|| {
            HttpResponse::Unauthorized().json(json!({
                "error": "Missing or invalid X-User-Id header"
            }))
        })?;

    match Database::get_user(pool, user_id).await {
        Ok(Some(user)) => {
            if let Err(e) = Database::touch_user(pool, user.id).await {
                log::warn!("Failed to update last_seen for {}: {}", user.id, e);
            }
            Ok(user)
        }
        Ok(None) => Err(HttpResponse::Unauthorized().json(json!({
            "error": "Unknown user"
        }))),
        Err(e) => {
            log::error!("Database error: {}", e);
            Err(HttpResponse::InternalServerError().json(json!({
                "error": "Failed to check user"
            })))
        }
    }
}

fn internal_error(context: &str, e: rusqlite::Error) -> HttpResponse {
    log::error!("{}: {}", context, e);
    HttpResponse::InternalServerError().json(json!({ "error": context }))
}

/// Register a new user
/// POST /users
pub async fn register_user(
    pool: web::Data<DbPool>,
    req: web::Json<RegisterUserRequest>,
) -> ActixResult<HttpResponse> {
    if req.name.trim().is_empty() || req.email.trim().is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Name and email are required"
        })));
    }

    let role = req.role.as_deref().unwrap_or("student");
    match Database::register_user(&pool, req.id, req.name.trim(), req.email.trim(), role).await {
        Ok(user) => Ok(HttpResponse::Created().json(user)),
        Err(e) => {
            log::error!("Failed to register user: {}", e);
            if e.to_string().contains("UNIQUE constraint failed") {
                Ok(HttpResponse::Conflict().json(json!({
                    "error": "User already exists"
                })))
            } else {
                Ok(HttpResponse::InternalServerError().json(json!({
                    "error": "Failed to register user"
                })))
            }
        }
    }
}

/// Conversation list, or one thread when `other_user_id` is given
/// GET /messages
/// GET /messages?other_user_id={id}
pub async fn get_messages(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    query: web::Query<ThreadQuery>,
) -> ActixResult<HttpResponse> {
    let me = match authenticate(&pool, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };

    let other = match query.other_user_id.as_deref() {
        None => {
            return match Database::list_conversations(&pool, me.id).await {
                Ok(conversations) => {
                    Ok(HttpResponse::Ok().json(ConversationsResponse { conversations }))
                }
                Err(e) => Ok(internal_error("Failed to load conversations", e)),
            };
        }
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(id) => id,
            Err(_) => {
                return Ok(HttpResponse::BadRequest().json(json!({
                    "error": "Invalid other_user_id"
                })))
            }
        },
    };

    let messages = match Database::get_thread(&pool, me.id, other).await {
        Ok(messages) => messages,
        Err(e) => return Ok(internal_error("Failed to load messages", e)),
    };

    if let Err(e) = Database::mark_thread_read(&pool, me.id, other).await {
        log::warn!("Failed to mark thread {}<->{} read: {}", me.id, other, e);
    }

    Ok(HttpResponse::Ok().json(MessagesResponse { messages }))
}

/// Send a direct message
/// POST /messages
pub async fn send_message(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    body: web::Json<SendMessageRequest>,
) -> ActixResult<HttpResponse> {
    let me = match authenticate(&pool, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };

    let content = body.content.trim();
    if content.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Message content is required"
        })));
    }

    let recipient_id = match parse_user_id(&body.recipient_id) {
        Some(id) => id,
        None => {
            return Ok(HttpResponse::BadRequest().json(json!({
                "error": "Invalid recipient_id"
            })))
        }
    };

    match Database::get_user(&pool, recipient_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Ok(HttpResponse::NotFound().json(json!({
                "error": "Recipient not found"
            })))
        }
        Err(e) => return Ok(internal_error("Failed to check recipient", e)),
    }

    match Database::store_message(&pool, me.id, recipient_id, content).await {
        Ok(message) => {
            log::debug!("Message {} stored: {} -> {}", message.id, me.id, recipient_id);
            Ok(HttpResponse::Created().json(SendMessageResponse { message }))
        }
        Err(e) => Ok(internal_error("Failed to send message", e)),
    }
}

/// User lookup for starting new chats
/// GET /search?q={query}&type=users
pub async fn search(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    query: web::Query<SearchQuery>,
) -> ActixResult<HttpResponse> {
    let me = match authenticate(&pool, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };

    match query.kind.as_deref() {
        None | Some("users") => {}
        Some(other) => {
            return Ok(HttpResponse::BadRequest().json(json!({
                "error": format!("Unsupported search type: {}", other)
            })))
        }
    }

    let q = query.q.trim();
    if q.is_empty() {
        return Ok(HttpResponse::Ok().json(SearchResponse { users: Vec::new() }));
    }

    match Database::search_users(&pool, me.id, q).await {
        Ok(users) => Ok(HttpResponse::Ok().json(SearchResponse { users })),
        Err(e) => Ok(internal_error("Failed to search users", e)),
    }
}

/// File a report against another user
/// POST /reports
pub async fn create_report(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    body: web::Json<ReportRequest>,
) -> ActixResult<HttpResponse> {
    let me = match authenticate(&pool, &req).await {
        Ok(user) => user,
        Err(response) => return Ok(response),
    };

    let reported = match parse_user_id(&body.other_user_id) {
        Some(id) => id,
        None => {
            return Ok(HttpResponse::BadRequest().json(json!({
                "error": "Invalid other_user_id"
            })))
        }
    };

    match Database::store_report(&pool, me.id, reported, body.reason.as_deref()).await {
        Ok(report) => {
            log::info!("User {} reported user {}", me.id, reported);
            Ok(HttpResponse::Created().json(report))
        }
        Err(e) => Ok(internal_error("Failed to store report", e)),
    }
}

/// Health check endpoint
/// GET /health
pub async fn health() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok"
    })))
}
