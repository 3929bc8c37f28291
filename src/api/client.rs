use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use super::{ApiRequest, ApiResponse, FilePart, Transport};
use crate::errors::ApiError;
use crate::models::{
    Ack, ActivityData, ApiErrorBody, AvatarUpload, Badge, Chat, Friend, FriendRequest,
    FriendRequestAction, FriendRequestCreate, Message, MessageCreate, Profile, ProfileUpdate,
    SignUp, Task, TaskCreate, TaskLevel, TaskStatus, TaskStatusUpdate, Token, User, WeeklyGoal,
};
use crate::storage::TokenStorage;

/// Callback run when an authenticated call comes back 401.
pub type UnauthorizedHandler = Arc<dyn Fn() + Send + Sync>;

struct Inner<T> {
    transport: T,
    tokens: Arc<dyn TokenStorage>,
    unauthorized: Mutex<Vec<UnauthorizedHandler>>,
}

/// Typed client for every endpoint the app uses.
///
/// All requests pass through [`ApiClient::send`], which attaches the bearer
/// token and is the single place a 401 is turned into a session invalidation.
pub struct ApiClient<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, tokens: Arc<dyn TokenStorage>) -> Self {
        Self {
            inner: Arc::new(Inner { transport, tokens, unauthorized: Mutex::new(Vec::new()) }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStorage> {
        &self.inner.tokens
    }

    /// Registers a handler for the global unauthorized signal.
    pub fn on_unauthorized(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.inner.unauthorized.lock().push(Arc::new(handler));
    }

    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if request.authenticated {
            request.bearer = match self.inner.tokens.load() {
                Ok(token) => token,
                Err(e) => {
                    warn!("Could not read access token, sending unsigned: {e}");
                    None
                }
            };
        }
        let method = request.method;
        let path = request.path.clone();
        let authenticated = request.authenticated;
        let signed_with = request.bearer.clone();

        let response = self.inner.transport.execute(request).await.map_err(|e| {
            warn!("{method} {path} failed before a response: {e}");
            ApiError::Network(e)
        })?;
        debug!("{method} {path} -> {}", response.status);

        if response.is_success() {
            return Ok(response);
        }

        let detail = serde_json::from_str::<ApiErrorBody>(&response.body)
            .ok()
            .and_then(|body| body.message());

        if response.status == 401 {
            if authenticated {
                if self.still_signed_with(signed_with.as_deref()) {
                    self.invalidate_session();
                } else {
                    info!("{method} {path} was rejected for a token that has since been replaced; keeping the session");
                }
            }
            return Err(ApiError::Unauthorized { detail });
        }
        Err(ApiError::Status { status: response.status, detail })
    }

    /// A 401 only speaks for the token the request was signed with.
    fn still_signed_with(&self, bearer: Option<&str>) -> bool {
        match self.inner.tokens.load() {
            Ok(current) => current.as_deref() == bearer,
            Err(_) => true,
        }
    }

    fn invalidate_session(&self) {
        warn!("API rejected the access token; clearing the session");
        if let Err(e) = self.inner.tokens.clear() {
            error!("Failed to clear access token: {e}");
        }
        // Handlers may call back into the client, so run them unlocked.
        let handlers: Vec<UnauthorizedHandler> = self.inner.unauthorized.lock().clone();
        for handler in handlers {
            handler();
        }
    }

    async fn json<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, ApiError> {
        let path = request.path.clone();
        let response = self.send(request).await?;
        serde_json::from_str(&response.body).map_err(|e| {
            error!("Unexpected payload from {path}: {e}");
            ApiError::Decode(e.to_string())
        })
    }

    /// Mutation endpoints answer `{ "message": ... }`; an empty or odd body is
    /// still a success.
    async fn ack(&self, request: ApiRequest) -> Result<Ack, ApiError> {
        let response = self.send(request).await?;
        Ok(serde_json::from_str(&response.body).unwrap_or_default())
    }

    // ── Auth ─────────────────────────────────────────────────────────────────

    pub async fn sign_up(&self, form: &SignUp) -> Result<User, ApiError> {
        self.json(ApiRequest::post("/api/auth/signup").public().json(form)?).await
    }

    /// OAuth2 password form: the email goes in the `username` field.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Token, ApiError> {
        let form = vec![
            ("username".to_string(), email.to_string()),
            ("password".to_string(), password.to_string()),
        ];
        self.json(ApiRequest::post("/api/auth/signin").public().form(form)).await
    }

    pub async fn sign_out(&self) -> Result<Ack, ApiError> {
        self.ack(ApiRequest::post("/api/auth/signout")).await
    }

    // ── Profile ──────────────────────────────────────────────────────────────

    pub async fn profile(&self) -> Result<Profile, ApiError> {
        self.json(ApiRequest::get("/api/user/profile")).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.json(ApiRequest::put("/api/user/profile").json(update)?).await
    }

    pub async fn upload_avatar(&self, file: FilePart) -> Result<AvatarUpload, ApiError> {
        self.json(ApiRequest::post("/api/user/profile/photo").multipart(file)).await
    }

    pub async fn delete_account(&self) -> Result<Ack, ApiError> {
        self.ack(ApiRequest::delete("/api/user/account")).await
    }

    // ── Tasks ────────────────────────────────────────────────────────────────

    pub async fn tasks(&self, level: Option<TaskLevel>) -> Result<Vec<Task>, ApiError> {
        let mut request = ApiRequest::get("/api/tasks");
        if let Some(level) = level {
            request = request.query("level", level.as_str());
        }
        self.json(request).await
    }

    pub async fn create_task(&self, task: &TaskCreate) -> Result<Task, ApiError> {
        self.json(ApiRequest::post("/api/tasks").json(task)?).await
    }

    pub async fn update_task_status(&self, task_id: i64, status: TaskStatus) -> Result<Ack, ApiError> {
        let body = TaskStatusUpdate { status };
        self.ack(ApiRequest::put(format!("/api/tasks/{task_id}/status")).json(&body)?).await
    }

    // ── Friends ──────────────────────────────────────────────────────────────

    pub async fn friends(&self) -> Result<Vec<Friend>, ApiError> {
        self.json(ApiRequest::get("/api/friends")).await
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<User>, ApiError> {
        self.json(ApiRequest::get("/api/friends/search").query("q", query)).await
    }

    pub async fn send_friend_request(&self, user_id: i64) -> Result<Ack, ApiError> {
        let body = FriendRequestCreate { user_id };
        self.ack(ApiRequest::post("/api/friends/request").json(&body)?).await
    }

    pub async fn friend_requests(&self) -> Result<Vec<FriendRequest>, ApiError> {
        self.json(ApiRequest::get("/api/friends/requests")).await
    }

    pub async fn respond_to_request(
        &self,
        request_id: i64,
        action: FriendRequestAction,
    ) -> Result<Ack, ApiError> {
        self.ack(ApiRequest::put(format!("/api/friends/requests/{request_id}/{}", action.as_str())))
            .await
    }

    // ── Chats ────────────────────────────────────────────────────────────────

    pub async fn chats(&self) -> Result<Vec<Chat>, ApiError> {
        self.json(ApiRequest::get("/api/chats")).await
    }

    pub async fn messages(&self, chat_id: i64) -> Result<Vec<Message>, ApiError> {
        self.json(ApiRequest::get(format!("/api/chats/{chat_id}/messages"))).await
    }

    pub async fn send_message(&self, chat_id: i64, content: &str) -> Result<Message, ApiError> {
        let body = MessageCreate { content: content.to_string() };
        self.json(ApiRequest::post(format!("/api/chats/{chat_id}/messages")).json(&body)?).await
    }

    pub async fn mark_read(&self, chat_id: i64) -> Result<Ack, ApiError> {
        self.ack(ApiRequest::put(format!("/api/chats/{chat_id}/read"))).await
    }

    // ── Progress ─────────────────────────────────────────────────────────────

    pub async fn activity(&self) -> Result<ActivityData, ApiError> {
        self.json(ApiRequest::get("/api/progress/activity")).await
    }

    pub async fn badges(&self) -> Result<Vec<Badge>, ApiError> {
        self.json(ApiRequest::get("/api/progress/badges")).await
    }

    pub async fn goals(&self) -> Result<Vec<WeeklyGoal>, ApiError> {
        self.json(ApiRequest::get("/api/progress/goals")).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::api::{Method, RequestBody};
    use crate::testing::{api as client, FakeTransport, Reply};

    #[tokio::test]
    async fn signs_authenticated_requests_with_the_stored_token() {
        let fake = FakeTransport::new();
        fake.on(Method::Get, "/api/chats", Reply::json(200, json!([])));
        let api = client(&fake, Some("tok-1"));

        api.chats().await.unwrap();

        let call = fake.last_call().unwrap();
        assert_eq!(call.authorization().as_deref(), Some("Bearer tok-1"));
    }

    #[tokio::test]
    async fn sign_in_is_form_encoded_and_unsigned() {
        let fake = FakeTransport::new();
        fake.on(
            Method::Post,
            "/api/auth/signin",
            Reply::json(200, json!({ "access_token": "new", "token_type": "bearer" })),
        );
        let api = client(&fake, Some("stale"));

        let token = api.sign_in("ada@example.com", "hunter22").await.unwrap();

        assert_eq!(token.access_token, "new");
        let call = fake.last_call().unwrap();
        assert_eq!(call.bearer, None);
        assert_eq!(
            call.body,
            RequestBody::Form(vec![
                ("username".into(), "ada@example.com".into()),
                ("password".into(), "hunter22".into()),
            ])
        );
    }

    #[tokio::test]
    async fn unauthorized_clears_token_and_runs_handlers_once() {
        let fake = FakeTransport::new();
        fake.on(Method::Get, "/api/tasks", Reply::status(401));
        let api = client(&fake, Some("expired"));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        api.on_unauthorized(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = api.tasks(None).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(api.tokens().load().unwrap(), None);
    }

    #[tokio::test]
    async fn bad_credentials_do_not_invalidate_the_session() {
        let fake = FakeTransport::new();
        fake.on(
            Method::Post,
            "/api/auth/signin",
            Reply::json(401, json!({ "detail": "Incorrect email or password" })),
        );
        let api = client(&fake, Some("keep-me"));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        api.on_unauthorized(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = api.sign_in("ada@example.com", "wrong").await.unwrap_err();

        assert_eq!(err.user_message("Invalid email or password"), "Incorrect email or password");
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(api.tokens().load().unwrap().as_deref(), Some("keep-me"));
    }

    #[tokio::test]
    async fn level_filter_is_sent_as_query() {
        let fake = FakeTransport::new();
        fake.on(Method::Get, "/api/tasks", Reply::json(200, json!([])));
        let api = client(&fake, Some("t"));

        api.tasks(Some(TaskLevel::Expert)).await.unwrap();

        assert_eq!(fake.last_call().unwrap().query, vec![("level".to_string(), "expert".to_string())]);
    }

    #[tokio::test]
    async fn server_errors_carry_status_and_detail() {
        let fake = FakeTransport::new();
        fake.on(
            Method::Put,
            "/api/user/profile",
            Reply::json(400, json!({ "detail": "Username already taken" })),
        );
        let api = client(&fake, Some("t"));

        let err = api.update_profile(&ProfileUpdate::default()).await.unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert_eq!(err.user_message("Update failed"), "Username already taken");
    }

    #[tokio::test]
    async fn undecodable_body_is_a_decode_error() {
        let fake = FakeTransport::new();
        fake.on(Method::Get, "/api/user/profile", Reply::raw(200, "<html>"));
        let api = client(&fake, Some("t"));

        assert!(matches!(api.profile().await, Err(ApiError::Decode(_))));
    }

    #[tokio::test]
    async fn ack_body_is_optional() {
        let fake = FakeTransport::new();
        fake.on(Method::Put, "/api/chats/3/read", Reply::json(200, json!({ "message": "Messages marked as read" })));
        fake.on(Method::Post, "/api/auth/signout", Reply::raw(204, ""));
        let api = client(&fake, Some("t"));

        assert_eq!(api.mark_read(3).await.unwrap().message, "Messages marked as read");
        assert_eq!(api.sign_out().await.unwrap(), Ack::default());
    }
}
