use crate::auth::{AuthGate, Identity, RequestContext, SESSION_COOKIE};
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::files::{Download, FileManager, ReceivedArtifact};
use crate::models::{AccountResponse, CredentialsForm, FileSummary, IndexResponse, RenameForm};
use crate::sessions::{InMemorySessionStore, SessionStore};
use crate::storage::{display_name, ArtifactStore};
use crate::user_storage::MetadataStore;
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::warn;

const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// RFC 5987 `attr-char` punctuation left unescaped in `filename*`.
const FILENAME_ATTR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

const LOGIN_FORM: &str = r#"<!doctype html>
<html><body>
<h1>Log in</h1>
<form method="post" action="/login">
  <input type="email" name="email" placeholder="Email" required>
  <input type="password" name="password" placeholder="Password" required>
  <button type="submit">Log in</button>
</form>
<p><a href="/sign-up">Create an account</a></p>
</body></html>"#;

const SIGN_UP_FORM: &str = r#"<!doctype html>
<html><body>
<h1>Sign up</h1>
<form method="post" action="/sign-up">
  <input type="email" name="email" placeholder="Email" required>
  <input type="password" name="password" placeholder="Password" required>
  <button type="submit">Sign up</button>
</form>
<p><a href="/login">Already registered? Log in</a></p>
</body></html>"#;

pub struct AppState {
    pub auth: AuthGate,
    pub files: FileManager,
    pub sessions: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn open(config: &ServerConfig) -> anyhow::Result<Self> {
        let store = Arc::new(MetadataStore::open(&config.data_dir)?);
        let artifacts = Arc::new(ArtifactStore::new(config.upload_dir.clone())?);
        let sessions: Arc<dyn SessionStore> =
            Arc::new(InMemorySessionStore::new(config.session_ttl()));

        Ok(Self {
            auth: AuthGate::new(store.clone(), sessions.clone(), config.bcrypt_cost),
            files: FileManager::new(store, artifacts),
            sessions,
        })
    }
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/rename/:id", post(rename))
        .route("/delete/:id", post(delete))
        .route("/download/:id", get(download))
        .route("/login", get(login_form).post(login))
        .route("/sign-up", get(sign_up_form).post(sign_up))
        .route("/logout", post(logout))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
        state.auth.resolve(token.as_deref()).await
    }
}

/// Extractor for endpoints that need a logged-in caller; rejects with 401.
pub struct AuthUser(pub Identity);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let ctx = RequestContext::from_request_parts(parts, state).await?;
        AuthGate::require_auth(&ctx).cloned().map(AuthUser)
    }
}

async fn index(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> Result<Json<IndexResponse>, AppError> {
    let Ok(user) = AuthGate::require_auth(&ctx) else {
        return Ok(Json(IndexResponse {
            user: None,
            files: Vec::new(),
            message: Some("Log in or sign up to see your files.".to_string()),
        }));
    };

    let files = state.files.list(user).await?;
    Ok(Json(IndexResponse {
        user: Some(user.email.clone()),
        files: files.into_iter().map(FileSummary::from).collect(),
        message: None,
    }))
}

async fn login_form() -> Html<&'static str> {
    Html(LOGIN_FORM)
}

async fn sign_up_form() -> Html<&'static str> {
    Html(SIGN_UP_FORM)
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> Result<(CookieJar, Json<AccountResponse>), AppError> {
    let (identity, token) = state.auth.login(&form.email, &form.password).await?;
    Ok((jar.add(session_cookie(token)), Json(account(identity))))
}

async fn sign_up(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> Result<(StatusCode, CookieJar, Json<AccountResponse>), AppError> {
    let (identity, token) = state.auth.sign_up(&form.email, &form.password).await?;
    Ok((
        StatusCode::CREATED,
        jar.add(session_cookie(token)),
        Json(account(identity)),
    ))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    jar: CookieJar,
) -> (CookieJar, StatusCode) {
    state.auth.logout(&ctx).await;
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/").build()),
        StatusCode::NO_CONTENT,
    )
}

async fn upload(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileSummary>), AppError> {
    let artifacts = state.files.artifacts();
    let artifact = receive_artifact(artifacts, &mut multipart).await?;
    let written = artifact.as_ref().map(|a| a.path.clone());

    match state.files.upload(&user, artifact).await {
        Ok(record) => Ok((StatusCode::CREATED, Json(record.into()))),
        Err(e) => {
            if let Some(path) = written {
                discard(artifacts, &path).await;
            }
            Err(e)
        }
    }
}

async fn rename(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Form(form): Form<RenameForm>,
) -> Result<Json<FileSummary>, AppError> {
    let record = state.files.rename(&user, &id, &form.new_name).await?;
    Ok(Json(record.into()))
}

async fn delete(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.files.delete(&user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn download(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let Download { record, file } = state.files.download(&user, &id).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&record.mimetype)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIMETYPE)),
    );
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(&record.filename));

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((StatusCode::OK, headers, body).into_response())
}

/// Writes the multipart field named `file` into a fresh artifact. Parts
/// without a usable filename count as no file.
async fn receive_artifact(
    artifacts: &ArtifactStore,
    multipart: &mut Multipart,
) -> Result<Option<ReceivedArtifact>, AppError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(AppError::Upload)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let Some(name) = field.file_name().and_then(display_name) else {
            continue;
        };
        let mimetype = field
            .content_type()
            .unwrap_or(DEFAULT_MIMETYPE)
            .to_string();

        let (path, mut file) = artifacts.create(&name).await.map_err(AppError::Filesystem)?;
        let mut size_bytes = 0u64;
        let written: Result<(), AppError> = async {
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(AppError::Upload)?
            {
                file.write_all(&chunk).await.map_err(AppError::Filesystem)?;
                size_bytes += chunk.len() as u64;
            }
            file.flush().await.map_err(AppError::Filesystem)
        }
        .await;

        if let Err(e) = written {
            drop(file);
            discard(artifacts, &path).await;
            return Err(e);
        }

        return Ok(Some(ReceivedArtifact {
            original_name: name,
            mimetype,
            path,
            size_bytes,
        }));
    }
    Ok(None)
}

async fn discard(artifacts: &ArtifactStore, path: &FsPath) {
    if let Err(e) = artifacts.remove(path).await {
        warn!(error = %e, path = %path.display(), "failed to remove orphaned upload");
    }
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn account(identity: Identity) -> AccountResponse {
    AccountResponse {
        id: identity.user_id,
        email: identity.email,
    }
}

/// `attachment` disposition with an ASCII fallback name and the exact
/// UTF-8 name in `filename*`.
fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(filename, FILENAME_ATTR)
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
