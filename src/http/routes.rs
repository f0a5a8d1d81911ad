//! HTTP route definitions: the `/api/v1` surface plus the static-file
//! fallback.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{any, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::app::{AppError, AppState};
use crate::game::Map;
use crate::http::auth::parse_bearer_token;

/// Build the application router.
///
/// API routes dispatch onto the strand inside their handlers; everything
/// else is served from `www_root`. Each method router carries a fallback so
/// wrong-method requests get the JSON 405 body instead of an empty reply.
pub fn build_router(state: AppState, www_root: PathBuf) -> Router {
    Router::new()
        .route("/api/v1/maps", get(list_maps).fallback(invalid_method))
        .route("/api/v1/maps/:map_id", get(get_map).fallback(invalid_method))
        .route("/api/v1/game/join", post(join_game).fallback(invalid_method))
        .route("/api/v1/game/players", get(game_players).fallback(invalid_method))
        .route("/api/v1/game/state", get(game_state).fallback(invalid_method))
        .route(
            "/api/v1/game/player/action",
            post(player_action).fallback(invalid_method),
        )
        .route("/api/v1/game/tick", post(game_tick).fallback(invalid_method))
        .route(
            "/api/v1/game/records",
            get(game_records).fallback(invalid_method),
        )
        // Anything else under /api is a bad request, never a static file.
        .route("/api", any(unknown_api))
        .route("/api/*rest", any(unknown_api))
        .fallback_service(ServeDir::new(www_root))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Map endpoints
// ============================================================================

async fn list_maps(State(state): State<AppState>) -> Response {
    let app = state.app.lock().await;
    let maps: Vec<Value> = app
        .maps()
        .iter()
        .map(|map| json!({ "id": map.id, "name": map.name }))
        .collect();
    Json(Value::Array(maps)).into_response()
}

async fn get_map(
    State(state): State<AppState>,
    Path(map_id): Path<String>,
) -> Result<Response, ApiError> {
    let app = state.app.lock().await;
    let map = app.find_map(&map_id).ok_or(ApiError::MapNotFound)?;
    Ok(Json(map_to_json(map)).into_response())
}

fn map_to_json(map: &Map) -> Value {
    let roads: Vec<Value> = map
        .roads
        .iter()
        .map(|road| {
            let (start, end) = (road.start(), road.end());
            if road.is_horizontal() {
                json!({ "x0": start.x, "y0": start.y, "x1": end.x })
            } else {
                json!({ "x0": start.x, "y0": start.y, "y1": end.y })
            }
        })
        .collect();
    let buildings: Vec<Value> = map
        .buildings
        .iter()
        .map(|b| json!({ "x": b.x, "y": b.y, "w": b.w, "h": b.h }))
        .collect();
    let offices: Vec<Value> = map
        .offices
        .iter()
        .map(|office| {
            json!({
                "id": office.id,
                "x": office.position.x,
                "y": office.position.y,
                "offsetX": office.offset_x,
                "offsetY": office.offset_y,
            })
        })
        .collect();
    json!({
        "id": map.id,
        "name": map.name,
        "roads": roads,
        "buildings": buildings,
        "offices": offices,
        "lootTypes": map.loot_types,
    })
}

// ============================================================================
// Game endpoints
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest {
    user_name: String,
    map_id: String,
}

async fn join_game(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: JoinRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::InvalidArgument("Join game request parse error".into()))?;
    let mut app = state.app.lock().await;
    let joined = app.join_game(&request.user_name, &request.map_id)?;
    Ok(no_cache(Json(json!({
        "authToken": joined.token,
        "playerId": joined.player_id,
    }))))
}

async fn game_players(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = authorize(&headers)?;
    let app = state.app.lock().await;
    let roster = app.session_roster(&token)?;

    let mut body = serde_json::Map::new();
    for (dog_id, name) in roster {
        body.insert(dog_id.to_string(), json!({ "name": name }));
    }
    Ok(no_cache(Json(Value::Object(body))))
}

async fn game_state(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = authorize(&headers)?;
    let app = state.app.lock().await;
    let view = app.game_state(&token)?;

    let mut players = serde_json::Map::new();
    for dog in view.dogs {
        let bag: Vec<Value> = dog
            .bag
            .iter()
            .map(|item| json!({ "id": item.id, "type": item.type_index }))
            .collect();
        players.insert(
            dog.id.to_string(),
            json!({
                "pos": [dog.position.x, dog.position.y],
                "speed": [dog.speed.x, dog.speed.y],
                "dir": dog.direction.as_str(),
                "bag": bag,
                "score": dog.score,
            }),
        );
    }

    let mut lost_objects = serde_json::Map::new();
    for (index, object) in view.lost_objects.iter().enumerate() {
        lost_objects.insert(
            index.to_string(),
            json!({
                "type": object.type_index,
                "pos": [object.position.x, object.position.y],
            }),
        );
    }

    Ok(no_cache(Json(json!({
        "players": players,
        "lostObjects": lost_objects,
    }))))
}

#[derive(Deserialize)]
struct ActionRequest {
    #[serde(rename = "move")]
    move_cmd: String,
}

async fn player_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let token = authorize(&headers)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type.split(';').next().map(str::trim) != Some("application/json") {
        return Err(ApiError::InvalidArgument("Invalid content type".into()));
    }

    let request: ActionRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::InvalidArgument("Failed to parse action".into()))?;
    let mut app = state.app.lock().await;
    app.action(&token, &request.move_cmd)?;
    Ok(no_cache(Json(json!({}))))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickRequest {
    time_delta: i64,
}

async fn game_tick(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    {
        let app = state.app.lock().await;
        if app.auto_tick_enabled() {
            return Err(ApiError::InvalidArgument("Invalid endpoint".into()));
        }
    }

    let request: TickRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::InvalidArgument("Failed to parse tick request JSON".into()))?;
    if request.time_delta < 0 {
        return Err(AppError::InvalidTime.into());
    }

    state
        .advance(Duration::from_millis(request.time_delta as u64))
        .await?;
    Ok(no_cache(Json(json!({}))))
}

async fn game_records(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let start = parse_int_param(&params, "start")?;
    let max_items = parse_int_param(&params, "maxItems")?;

    let app = state.app.lock().await;
    let rows = app.records(start, max_items).await?;

    let body: Vec<Value> = rows
        .iter()
        .map(|row| {
            json!({
                "name": row.name,
                "score": row.score,
                "playTime": row.play_time_ms / 1000,
            })
        })
        .collect();
    Ok(no_cache(Json(Value::Array(body))))
}

fn parse_int_param(params: &HashMap<String, String>, name: &str) -> Result<Option<i64>, ApiError> {
    match params.get(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::InvalidArgument(format!("Invalid {name} value"))),
    }
}

// ============================================================================
// Fallbacks and helpers
// ============================================================================

async fn invalid_method() -> ApiError {
    ApiError::InvalidMethod
}

async fn unknown_api() -> ApiError {
    ApiError::BadRequest
}

fn authorize(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_token)
        .ok_or(ApiError::InvalidToken)
}

/// Game responses must never be cached; map reads may be.
fn no_cache(resp: impl IntoResponse) -> Response {
    let mut response = resp.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    );
    response
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request")]
    BadRequest,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Map not found")]
    MapNotFound,

    #[error("Authorization header is missing or malformed")]
    InvalidToken,

    #[error("Player token has not been found")]
    UnknownToken,

    #[error("Invalid method")]
    InvalidMethod,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest | ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::MapNotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidToken | ApiError::UnknownToken => StatusCode::UNAUTHORIZED,
            ApiError::InvalidMethod => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest => "badRequest",
            ApiError::InvalidArgument(_) => "invalidArgument",
            ApiError::MapNotFound => "mapNotFound",
            ApiError::InvalidToken => "invalidToken",
            ApiError::UnknownToken => "unknownToken",
            ApiError::InvalidMethod => "invalidMethod",
            ApiError::Internal(_) => "internalError",
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::EmptyName => ApiError::InvalidArgument("Invalid name".into()),
            AppError::UnknownMap => ApiError::MapNotFound,
            AppError::UnknownToken => ApiError::UnknownToken,
            AppError::InvalidDirection => {
                ApiError::InvalidArgument("Failed to parse action".into())
            }
            AppError::InvalidTime => {
                ApiError::InvalidArgument("Failed to parse tick request JSON".into())
            }
            AppError::InvalidStart => ApiError::InvalidArgument("Invalid start value".into()),
            AppError::InvalidMaxItems => {
                ApiError::InvalidArgument("Invalid maxItems value".into())
            }
            AppError::NoDatabase => ApiError::Internal("records store unavailable".into()),
            AppError::Database(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        no_cache((self.status(), Json(body)))
    }
}
