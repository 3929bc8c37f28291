use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, Transport};
use crate::cell::{Shared, StateCell};
use crate::errors::ApiError;
use crate::models::Profile;

/// Who is logged in. The token survives reloads through [`TokenStorage`];
/// the profile is always fetched again.
///
/// [`TokenStorage`]: crate::storage::TokenStorage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<Profile>,
    /// True until the first bootstrap attempt has finished.
    pub loading: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self { token: None, user: None, loading: true }
    }
}

impl Session {
    /// A token on its own is not enough: the profile must have loaded too.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.loading {
            SessionPhase::Bootstrapping
        } else if self.is_authenticated() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Unauthenticated
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Routing decision deferred: show neither signed-in nor signed-out views.
    Bootstrapping,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    /// The user asked to log out (or deleted the account).
    Explicit,
    /// Fetching the profile failed for any reason.
    RefreshFailed,
    /// Some call came back 401.
    Unauthorized,
}

type SignedOutListener = Arc<dyn Fn(SignOutReason) + Send + Sync>;
type Listeners = Arc<Mutex<Vec<SignedOutListener>>>;

/// Single owner of the authentication state.
///
/// Construction registers the store with the client's 401 hook, so any call
/// made through the same [`ApiClient`] can end the session.
pub struct SessionStore<T, C = Shared<Session>> {
    api: ApiClient<T>,
    cell: C,
    listeners: Listeners,
    bootstrapped: Arc<AtomicBool>,
}

impl<T, C: Clone> Clone for SessionStore<T, C> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            cell: self.cell.clone(),
            listeners: Arc::clone(&self.listeners),
            bootstrapped: Arc::clone(&self.bootstrapped),
        }
    }
}

impl<T: Transport> SessionStore<T> {
    pub fn in_memory(api: ApiClient<T>) -> Self {
        Self::new(api, Shared::new(Session::default()))
    }
}

impl<T, C> SessionStore<T, C>
where
    T: Transport,
    C: StateCell<Session> + Clone + Send + Sync + 'static,
{
    pub fn new(api: ApiClient<T>, cell: C) -> Self {
        let listeners: Listeners = Arc::default();

        let hook_cell = cell.clone();
        let hook_listeners = Arc::clone(&listeners);
        api.on_unauthorized(move || {
            clear_session(&hook_cell, &hook_listeners, SignOutReason::Unauthorized);
        });

        Self { api, cell, listeners, bootstrapped: Arc::new(AtomicBool::new(false)) }
    }

    pub fn api(&self) -> &ApiClient<T> {
        &self.api
    }

    pub fn cell(&self) -> &C {
        &self.cell
    }

    /// Called whenever a signed-in session ends, with the reason. Front ends use
    /// this to send the user back to the sign-in page.
    pub fn on_signed_out(&self, listener: impl Fn(SignOutReason) + Send + Sync + 'static) {
        self.listeners.lock().push(Arc::new(listener));
    }

    /// Restores a stored session. Runs once; later calls return immediately.
    pub async fn bootstrap(&self) {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return;
        }

        let stored = match self.api.tokens().load() {
            Ok(token) => token,
            Err(e) => {
                warn!("Could not read stored token, starting signed out: {e}");
                None
            }
        };

        match stored {
            Some(token) => {
                self.cell.update(|s| s.token = Some(token));
                if let Err(e) = self.refresh_user().await {
                    info!("Stored session is no longer valid: {e}");
                }
            }
            None => debug!("No stored token, starting signed out"),
        }

        self.cell.update(|s| s.loading = false);
        info!(phase = ?self.phase(), "Session bootstrap complete");
    }

    /// Persists `token`, adopts it and loads the matching profile.
    ///
    /// Requests are signed from token storage, so a token that cannot be stored
    /// is rejected here and the session is left as it was.
    pub async fn set_token(&self, token: String) -> Result<(), ApiError> {
        if let Err(e) = self.api.tokens().store(&token) {
            warn!("Could not store access token, sign-in abandoned: {e}");
            return Err(e.into());
        }
        self.cell.update(|s| s.token = Some(token));
        self.refresh_user().await
    }

    pub fn set_user(&self, user: Profile) {
        self.cell.update(|s| s.user = Some(user));
    }

    /// Clears the stored token and in-memory state. Does not call the server.
    pub fn logout(&self) {
        if let Err(e) = self.api.tokens().clear() {
            warn!("Failed to clear stored token: {e}");
        }
        clear_session(&self.cell, &self.listeners, SignOutReason::Explicit);
    }

    /// Re-fetches the profile. Any failure, transient or not, ends the session,
    /// unless the session moved to another token while the call was in flight.
    pub async fn refresh_user(&self) -> Result<(), ApiError> {
        let token = self.token();
        let fetched = self.api.profile().await;
        if self.token() != token {
            debug!("Session changed during profile refresh; dropping the result");
            return fetched.map(drop);
        }
        match fetched {
            Ok(profile) => {
                debug!(user_id = profile.id(), "Profile refreshed");
                self.cell.update(|s| s.user = Some(profile));
                Ok(())
            }
            Err(e) => {
                warn!("Profile refresh failed, signing out: {e}");
                if let Err(e) = self.api.tokens().clear() {
                    warn!("Failed to clear stored token: {e}");
                }
                clear_session(&self.cell, &self.listeners, SignOutReason::RefreshFailed);
                Err(e)
            }
        }
    }

    pub fn snapshot(&self) -> Session {
        self.cell.snapshot().unwrap_or_default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.cell.read(Session::is_authenticated).unwrap_or(false)
    }

    pub fn is_loading(&self) -> bool {
        self.cell.read(|s| s.loading).unwrap_or(true)
    }

    pub fn phase(&self) -> SessionPhase {
        self.cell.read(Session::phase).unwrap_or(SessionPhase::Bootstrapping)
    }

    pub fn token(&self) -> Option<String> {
        self.cell.read(|s| s.token.clone()).flatten()
    }

    pub fn user(&self) -> Option<Profile> {
        self.cell.read(|s| s.user.clone()).flatten()
    }
}

/// Drops token and user. Listeners hear about it only if something was cleared,
/// so a 401 followed by the refresh failure it caused notifies once.
fn clear_session<C: StateCell<Session>>(cell: &C, listeners: &Listeners, reason: SignOutReason) {
    let cleared = cell
        .update(|s| {
            let had_session = s.token.is_some() || s.user.is_some();
            s.token = None;
            s.user = None;
            had_session
        })
        .unwrap_or(false);

    if cleared {
        info!(?reason, "Session ended");
        let listeners: Vec<SignedOutListener> = listeners.lock().clone();
        for listener in listeners {
            listener(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    use std::time::Duration;

    use super::*;
    use crate::api::Method;
    use crate::errors::StorageError;
    use crate::storage::TokenStorage;
    use crate::testing::{api, profile_json, FakeTransport, Reply};

    fn store(fake: &FakeTransport, token: Option<&str>) -> SessionStore<FakeTransport> {
        SessionStore::in_memory(api(fake, token))
    }

    fn recorded_reasons(store: &SessionStore<FakeTransport>) -> Arc<Mutex<Vec<SignOutReason>>> {
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reasons);
        store.on_signed_out(move |reason| sink.lock().push(reason));
        reasons
    }

    fn profile() -> Profile {
        serde_json::from_value(profile_json(1, "ada")).unwrap()
    }

    #[rstest]
    #[case(None, None, false)]
    #[case(Some("t"), None, false)]
    #[case(None, Some(profile()), false)]
    #[case(Some("t"), Some(profile()), true)]
    fn authenticated_needs_token_and_user(
        #[case] token: Option<&str>,
        #[case] user: Option<Profile>,
        #[case] expected: bool,
    ) {
        let session = Session { token: token.map(str::to_string), user, loading: false };
        assert_eq!(session.is_authenticated(), expected);
    }

    #[test]
    fn loading_until_bootstrapped() {
        let fake = FakeTransport::new();
        let store = store(&fake, Some("t"));
        assert!(store.is_loading());
        assert_eq!(store.phase(), SessionPhase::Bootstrapping);
    }

    #[tokio::test]
    async fn bootstrap_without_token_makes_no_calls() {
        let fake = FakeTransport::new();
        let store = store(&fake, None);

        store.bootstrap().await;

        assert_eq!(store.phase(), SessionPhase::Unauthenticated);
        assert!(!store.is_loading());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn bootstrap_with_valid_token_authenticates() {
        let fake = FakeTransport::new();
        fake.on(Method::Get, "/api/user/profile", Reply::json(200, profile_json(1, "ada")));
        let store = store(&fake, Some("good"));

        store.bootstrap().await;

        assert_eq!(store.phase(), SessionPhase::Authenticated);
        assert_eq!(store.user().unwrap().user.username, "ada");
        assert_eq!(fake.last_call().unwrap().authorization().as_deref(), Some("Bearer good"));
    }

    #[tokio::test]
    async fn bootstrap_with_expired_token_self_heals() {
        let fake = FakeTransport::new();
        fake.on(Method::Get, "/api/user/profile", Reply::json(401, json!({ "detail": "expired" })));
        let store = store(&fake, Some("expired"));
        let reasons = recorded_reasons(&store);

        store.bootstrap().await;

        assert_eq!(store.phase(), SessionPhase::Unauthenticated);
        assert_eq!(store.token(), None);
        assert_eq!(store.api().tokens().load().unwrap(), None);
        assert_eq!(*reasons.lock(), vec![SignOutReason::Unauthorized]);
    }

    #[tokio::test]
    async fn bootstrap_runs_once() {
        let fake = FakeTransport::new();
        fake.on(Method::Get, "/api/user/profile", Reply::json(200, profile_json(1, "ada")));
        let store = store(&fake, Some("good"));

        store.bootstrap().await;
        store.bootstrap().await;

        assert_eq!(fake.calls_to(Method::Get, "/api/user/profile").len(), 1);
    }

    #[tokio::test]
    async fn set_token_persists_and_refreshes() {
        let fake = FakeTransport::new();
        fake.on(Method::Get, "/api/user/profile", Reply::json(200, profile_json(3, "grace")));
        let store = store(&fake, None);
        store.bootstrap().await;

        store.set_token("fresh".into()).await.unwrap();

        assert!(store.is_authenticated());
        assert_eq!(store.api().tokens().load().unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn network_failure_during_refresh_logs_out() {
        let fake = FakeTransport::new();
        fake.once(Method::Get, "/api/user/profile", Reply::json(200, profile_json(1, "ada")));
        fake.on(Method::Get, "/api/user/profile", Reply::NetworkDown);
        let store = store(&fake, Some("good"));
        store.bootstrap().await;
        let reasons = recorded_reasons(&store);

        let err = store.refresh_user().await.unwrap_err();

        assert!(err.is_network());
        assert_eq!(store.phase(), SessionPhase::Unauthenticated);
        assert_eq!(store.api().tokens().load().unwrap(), None);
        assert_eq!(*reasons.lock(), vec![SignOutReason::RefreshFailed]);
    }

    #[tokio::test]
    async fn unauthorized_from_any_feature_ends_the_session() {
        let fake = FakeTransport::new();
        fake.on(Method::Get, "/api/user/profile", Reply::json(200, profile_json(1, "ada")));
        fake.on(Method::Get, "/api/chats", Reply::status(401));
        let store = store(&fake, Some("good"));
        store.bootstrap().await;
        let reasons = recorded_reasons(&store);

        let _ = store.api().chats().await;

        assert_eq!(store.phase(), SessionPhase::Unauthenticated);
        assert_eq!(*reasons.lock(), vec![SignOutReason::Unauthorized]);
    }

    #[tokio::test]
    async fn logout_clears_without_calling_the_server() {
        let fake = FakeTransport::new();
        fake.on(Method::Get, "/api/user/profile", Reply::json(200, profile_json(1, "ada")));
        let store = store(&fake, Some("good"));
        store.bootstrap().await;
        let calls_before = fake.calls().len();
        let reasons = recorded_reasons(&store);

        store.logout();
        store.logout();

        assert_eq!(store.snapshot(), Session { token: None, user: None, loading: false });
        assert_eq!(fake.calls().len(), calls_before);
        assert_eq!(*reasons.lock(), vec![SignOutReason::Explicit]);
    }

    #[tokio::test(start_paused = true)]
    async fn late_unauthorized_for_a_replaced_token_keeps_the_new_session() {
        let fake = FakeTransport::new();
        fake.on(Method::Get, "/api/user/profile", Reply::json(200, profile_json(1, "ada")));
        fake.on(Method::Get, "/api/chats", Reply::status(401).after(Duration::from_millis(100)));
        let store = store(&fake, None);
        store.bootstrap().await;
        store.set_token("old".into()).await.unwrap();
        let reasons = recorded_reasons(&store);

        let relogin = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.logout();
            store.set_token("new".into()).await.unwrap();
        };
        let (stale, ()) = tokio::join!(store.api().chats(), relogin);

        assert!(stale.unwrap_err().is_unauthorized());
        assert_eq!(fake.calls_to(Method::Get, "/api/chats")[0].bearer.as_deref(), Some("old"));
        assert_eq!(store.phase(), SessionPhase::Authenticated);
        assert_eq!(store.token().as_deref(), Some("new"));
        assert_eq!(store.api().tokens().load().unwrap().as_deref(), Some("new"));
        assert_eq!(*reasons.lock(), vec![SignOutReason::Explicit]);
    }

    #[tokio::test(start_paused = true)]
    async fn late_refresh_failure_for_a_replaced_token_is_ignored() {
        let fake = FakeTransport::new();
        fake.once(Method::Get, "/api/user/profile", Reply::json(200, profile_json(1, "ada")));
        fake.once(Method::Get, "/api/user/profile", Reply::NetworkDown.after(Duration::from_millis(100)));
        fake.on(Method::Get, "/api/user/profile", Reply::json(200, profile_json(2, "grace")));
        let store = store(&fake, None);
        store.bootstrap().await;
        store.set_token("old".into()).await.unwrap();

        let relogin = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.logout();
            store.set_token("new".into()).await.unwrap();
        };
        let (stale, ()) = tokio::join!(store.refresh_user(), relogin);

        assert!(stale.unwrap_err().is_network());
        assert_eq!(store.phase(), SessionPhase::Authenticated);
        assert_eq!(store.user().unwrap().user.username, "grace");
    }

    struct UnwritableTokens;

    impl TokenStorage for UnwritableTokens {
        fn load(&self) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn store(&self, _token: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".into()))
        }

        fn clear(&self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unstorable_token_fails_sign_in_without_calls() {
        let fake = FakeTransport::new();
        fake.on(Method::Get, "/api/user/profile", Reply::json(200, profile_json(1, "ada")));
        let store = SessionStore::in_memory(ApiClient::new(fake.clone(), Arc::new(UnwritableTokens)));
        store.bootstrap().await;

        let err = store.set_token("fresh".into()).await.unwrap_err();

        assert!(matches!(err, ApiError::Storage(StorageError::Unavailable(_))));
        assert!(fake.calls().is_empty());
        assert_eq!(store.token(), None);
        assert_eq!(store.phase(), SessionPhase::Unauthenticated);
    }

    fn failing_reply() -> impl Strategy<Value = Reply> {
        prop_oneof![
            Just(Reply::NetworkDown),
            Just(Reply::status(401)),
            Just(Reply::status(500)),
            Just(Reply::status(503)),
            Just(Reply::raw(200, "not json")),
        ]
    }

    proptest! {
        #[test]
        fn set_token_then_failed_fetch_always_ends_signed_out(
            token in "[A-Za-z0-9._-]{1,40}",
            reply in failing_reply(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let fake = FakeTransport::new();
            fake.on(Method::Get, "/api/user/profile", reply);
            let store = store(&fake, None);

            runtime.block_on(async {
                store.bootstrap().await;
                let _ = store.set_token(token).await;
            });

            let session = store.snapshot();
            prop_assert_eq!(session.token, None);
            prop_assert_eq!(session.user, None);
            prop_assert!(!session.loading);
            prop_assert_eq!(store.phase(), SessionPhase::Unauthenticated);
            prop_assert_eq!(store.api().tokens().load().unwrap(), None);
        }
    }
}
