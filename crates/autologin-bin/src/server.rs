// ============================
// crates/autologin-bin/src/server.rs
// ============================
/** HTTP front end for the auth core.
Every request gets a `CookieJar` built from its `Cookie` header and a
server-side session named by the `sid` cookie. Cookie writes made while
handling the request are sent back as `Set-Cookie` headers. */
use autologin_common::SessionUser;
use autologin_lib::{
    auth::{CookieJar, CookieTransport, ManagedSession, SessionManager},
    AuthError, Authenticator, FileTokenStore, FileUserStore, Remember, Settings,
};
use axum::{
    extract::State,
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Name of the session id cookie
pub const SESSION_COOKIE: &str = "sid";

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<Authenticator>,
    pub sessions: Arc<SessionManager>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(auth: Authenticator, settings: Settings) -> Self {
        let sessions = SessionManager::new_with_timeouts(
            Duration::from_secs(settings.session.absolute_ttl_secs),
            Duration::from_secs(settings.session.idle_ttl_secs),
        );
        Self {
            auth: Arc::new(auth),
            sessions: Arc::new(sessions),
            settings: Arc::new(settings),
        }
    }

    /// State backed by the flat-file stores under `storage.path`
    pub async fn from_settings(settings: Settings) -> Result<Self, AuthError> {
        let users = FileUserStore::load(settings.user_store_path()).await?;
        if users.is_empty() {
            warn!(path = %settings.user_store_path().display(), "No users loaded");
        }
        let tokens = FileTokenStore::open(settings.token_store_path()).await?;
        let auth = Authenticator::from_settings(&settings, Arc::new(users), Arc::new(tokens))?;
        Ok(Self::new(auth, settings))
    }

    fn context(&self, headers: &HeaderMap) -> RequestContext {
        let cookie_header = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect::<Vec<_>>()
            .join("; ");
        let jar = CookieJar::from_header(&cookie_header);
        let session = self.sessions.open(jar.get_cookie(SESSION_COOKIE).as_deref());
        RequestContext { jar, session }
    }
}

/// Cookies and session of one HTTP request
struct RequestContext {
    jar: CookieJar,
    session: ManagedSession,
}

impl RequestContext {
    /// Attach the pending cookie writes to `response`. The session id is only
    /// handed out once the session holds something.
    fn finish(&self, state: &AppState, mut response: Response) -> Response {
        if self.session.needs_cookie() {
            self.jar.set_cookie(
                SESSION_COOKIE,
                self.session.id(),
                Duration::from_secs(state.settings.session.absolute_ttl_secs),
            );
        }
        let attributes = &state.auth.options().cookie_attributes;
        for value in self.jar.header_values(attributes) {
            match HeaderValue::from_str(&value) {
                Ok(header) => {
                    response.headers_mut().append(SET_COOKIE, header);
                },
                Err(e) => warn!(error = %e, "Dropping unrepresentable Set-Cookie header"),
            }
        }
        response
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identification: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: Option<SessionUser>,
    pub remember: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub logged_in: bool,
    pub user: Option<SessionUser>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/me", get(me_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "Healthy"
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Response {
    let ctx = state.context(&headers);
    let request = state.auth.begin(&ctx.session, &ctx.jar).await;

    let response = match request
        .login(&body.identification, &body.password, body.remember)
        .await
    {
        Ok(remember) => {
            let (remember, warning) = match remember {
                Remember::NotRequested => ("not_requested", None),
                Remember::Issued => ("issued", None),
                Remember::Failed(kind) => (
                    "failed",
                    Some(format!("Could not remember this device ({kind})")),
                ),
            };
            Json(LoginResponse {
                user: request.user().await,
                remember,
                warning,
            })
            .into_response()
        },
        Err(e) => {
            debug!(error = %e, "Login failed");
            e.into_response()
        },
    };
    ctx.finish(&state, response)
}

async fn logout_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let ctx = state.context(&headers);
    state.auth.begin(&ctx.session, &ctx.jar).await.logout().await;
    ctx.jar.set_cookie(SESSION_COOKIE, "", Duration::ZERO);
    ctx.finish(&state, StatusCode::NO_CONTENT.into_response())
}

async fn me_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let ctx = state.context(&headers);
    let request = state.auth.begin(&ctx.session, &ctx.jar).await;

    let user = request.user().await;
    let status = if user.is_some() {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    let body = MeResponse {
        logged_in: user.is_some(),
        user,
    };
    ctx.finish(&state, (status, Json(body)).into_response())
}

/// Periodically drop expired sessions and remember-me grants
pub fn spawn_maintenance(state: Arc<AppState>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let sessions = state.sessions.cleanup_expired_sessions();
            match state.auth.clean_expired().await {
                Ok(tokens) => debug!(sessions, tokens, "Maintenance sweep finished"),
                Err(e) => warn!(error = %e, "Expired token sweep failed"),
            }
        }
    })
}
