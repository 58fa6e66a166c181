use std::collections::HashMap;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use tracing::{error, instrument, warn};

use super::{
    dto::{
        AccountForm, AccountKey, AccountProjection, LoginRequest, TransferStatus, UploadDescriptor,
    },
    error::AccountError,
};
use crate::{state::AppState, storage::SourceHandle};

type ApiError = (StatusCode, String);

const AVATAR_FIELDS: [&str; 2] = ["avatar", "avatar_path"];

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/accounts", post(register).get(list_accounts))
        .route(
            "/accounts/:key",
            get(view_account).put(update_account).delete(delete_account),
        )
        .route("/accounts/:key/avatar", put(attach_avatar))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)) // 10MB
}

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

/// Status code and user-facing message for each failure.
fn into_http(e: AccountError) -> ApiError {
    let status = match &e {
        AccountError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        AccountError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
        AccountError::NotFound => StatusCode::NOT_FOUND,
        AccountError::Conflict(_) => StatusCode::CONFLICT,
        AccountError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        AccountError::Storage { .. } => StatusCode::BAD_GATEWAY,
        AccountError::AvatarNotLinked { .. } | AccountError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        error!(error = %e, "account operation failed");
        return (status, "Something went wrong".into());
    }
    (status, e.to_string())
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| (StatusCode::BAD_REQUEST, "Account id must be an integer".into()))
}

/// Splits a multipart body into text fields and the avatar upload.
async fn read_multipart(mut mp: Multipart) -> Result<(AccountForm, UploadDescriptor), ApiError> {
    let mut fields = HashMap::new();
    let mut upload = UploadDescriptor::absent();

    loop {
        let field = match mp.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "malformed multipart body");
                return Err((StatusCode::BAD_REQUEST, "Malformed multipart body".into()));
            }
        };
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if AVATAR_FIELDS.contains(&name.as_str()) {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_else(|| "application/octet-stream".into());
            upload = match field.bytes().await {
                Ok(data) if data.is_empty() && file_name.is_empty() => {
                    UploadDescriptor::failed(TransferStatus::NoFile)
                }
                Ok(data) => UploadDescriptor::received(content_type, SourceHandle::Bytes(data)),
                Err(e) => {
                    warn!(error = %e, "avatar part could not be read");
                    UploadDescriptor::failed(TransferStatus::OtherError)
                }
            };
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, format!("Field {name} is not text")))?;
        fields.insert(name, value);
    }

    Ok((AccountForm::from_map(fields), upload))
}

/// POST /accounts (multipart)
#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mp: Multipart,
) -> Result<(StatusCode, HeaderMap, Json<AccountProjection>), ApiError> {
    let (form, upload) = read_multipart(mp).await?;
    let id = match state.accounts.register(form, upload).await {
        Ok(id) => id,
        Err(e) => {
            let partial = e.account_id();
            let (status, msg) = into_http(e);
            return Err(match partial {
                Some(id) => (
                    status,
                    format!("{msg}; account {id} was created without an avatar"),
                ),
                None => (status, msg),
            });
        }
    };
    let created = state
        .accounts
        .view(&AccountKey::Id(id))
        .await
        .map_err(into_http)?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/accounts/{}", id).parse() {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(created)))
}

#[instrument(skip(state))]
pub async fn list_accounts(
    State(state): State<AppState>,
) -> Result<Json<Vec<AccountProjection>>, ApiError> {
    let all = state.accounts.list_all().await.map_err(into_http)?;
    Ok(Json(all))
}

/// GET /accounts/:key, where key is an id or an email
#[instrument(skip(state))]
pub async fn view_account(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<AccountProjection>, ApiError> {
    let account = state
        .accounts
        .view(&AccountKey::parse(&key))
        .await
        .map_err(into_http)?;
    Ok(Json(account))
}

#[instrument(skip(state, mp))]
pub async fn update_account(
    State(state): State<AppState>,
    Path(key): Path<String>,
    mp: Multipart,
) -> Result<Json<AccountProjection>, ApiError> {
    let id = parse_id(&key)?;
    let (form, upload) = read_multipart(mp).await?;
    let account = state
        .accounts
        .update(id, form, upload)
        .await
        .map_err(into_http)?;
    let view = AccountProjection::from_account(&account)
        .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong".to_string()))?;
    Ok(Json(view))
}

#[instrument(skip(state, mp))]
pub async fn attach_avatar(
    State(state): State<AppState>,
    Path(key): Path<String>,
    mp: Multipart,
) -> Result<Json<AccountProjection>, ApiError> {
    let id = parse_id(&key)?;
    let (_, upload) = read_multipart(mp).await?;
    let view = state
        .accounts
        .attach_avatar(id, upload)
        .await
        .map_err(into_http)?;
    Ok(Json(view))
}

#[instrument(skip(state))]
pub async fn delete_account(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&key)?;
    state.accounts.delete(id).await.map_err(into_http)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/login. No session is issued; the caller owns that.
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AccountProjection>, ApiError> {
    let account = state
        .accounts
        .authenticate(&payload.email, &payload.password)
        .await
        .map_err(into_http)?;
    let view = AccountProjection::from_account(&account)
        .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong".to_string()))?;
    Ok(Json(view))
}
