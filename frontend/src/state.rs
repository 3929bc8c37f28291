use std::sync::Arc;

use leptos::prelude::*;
use leptos::task::spawn_local;

use trackitnow::chats::{ChatController, ChatInbox};
use trackitnow::friends::{FriendsController, FriendsState};
use trackitnow::progress::{load_dashboard, Dashboard};
use trackitnow::tasks::{TaskBoard, TaskController};
use trackitnow::{ApiClient, ClientConfig, Session, SessionStore, SignOutReason, StateCell};

use crate::api::GlooTransport;
use crate::storage::LocalTokenStorage;

/// A controller's state held in a Leptos signal, so views re-render whenever a
/// controller mutates it. Reads made by controllers are untracked.
pub struct SignalCell<S: 'static>(RwSignal<S>);

impl<S: Send + Sync + 'static> SignalCell<S> {
    pub fn new(state: S) -> Self {
        Self(RwSignal::new(state))
    }

    pub fn signal(&self) -> RwSignal<S> {
        self.0
    }
}

impl<S: 'static> Clone for SignalCell<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: 'static> Copy for SignalCell<S> {}

impl<S: Send + Sync + 'static> StateCell<S> for SignalCell<S> {
    fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        self.0.try_update(f)
    }

    fn read<R>(&self, f: impl FnOnce(&S) -> R) -> Option<R> {
        self.0.try_with_untracked(f)
    }
}

pub type AppSession = SessionStore<GlooTransport, SignalCell<Session>>;
pub type AppTasks = TaskController<GlooTransport, SignalCell<TaskBoard>>;
pub type AppChats = ChatController<GlooTransport, SignalCell<ChatInbox>>;
pub type AppFriends = FriendsController<GlooTransport, SignalCell<FriendsState>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Page {
    #[default]
    Dashboard,
    Tasks,
    Chats,
    Search,
    Settings,
}

impl Page {
    pub const ALL: [Page; 5] = [Page::Dashboard, Page::Tasks, Page::Chats, Page::Search, Page::Settings];

    pub fn label(&self) -> &'static str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::Tasks => "Tasks",
            Page::Chats => "Chats",
            Page::Search => "Find friends",
            Page::Settings => "Settings",
        }
    }
}

/// Shared application state, provided via Leptos context.
#[derive(Clone)]
pub struct AppState {
    pub session: AppSession,
    pub tasks: AppTasks,
    pub chats: AppChats,
    pub friends: AppFriends,
    pub dashboard: RwSignal<Option<Dashboard>>,
    pub page: RwSignal<Page>,
    /// One-line notice shown above the current page.
    pub notice: RwSignal<Option<String>>,
}

impl AppState {
    /// Create a new `AppState` and provide it in the current Leptos context.
    pub fn provide() -> Self {
        let config = build_config();
        log::debug!("Using API at {}", config.api_url);
        let api = ApiClient::new(GlooTransport::new(&config.api_url), Arc::new(LocalTokenStorage));

        let session = SessionStore::new(api.clone(), SignalCell::new(Session::default()));
        let tasks = TaskController::new(api.clone(), SignalCell::new(TaskBoard::default()));
        let chats = ChatController::new(api.clone(), SignalCell::new(ChatInbox::default()));
        let friends = FriendsController::new(api, SignalCell::new(FriendsState::default()))
            .with_debounce(config.search_debounce)
            .with_suggestion_limit(config.suggestion_limit);

        let state = Self {
            session,
            tasks,
            chats,
            friends,
            dashboard: RwSignal::new(None),
            page: RwSignal::new(Page::default()),
            notice: RwSignal::new(None),
        };
        state.reset_on_sign_out();

        provide_context(state.clone());
        state
    }

    /// Everything cached for the previous user is dropped when a session ends.
    fn reset_on_sign_out(&self) {
        let tasks = self.tasks.cell().signal();
        let chats = self.chats.cell().signal();
        let friends = self.friends.cell().signal();
        let dashboard = self.dashboard;
        let page = self.page;
        let notice = self.notice;

        self.session.on_signed_out(move |reason| {
            log::info!("Signed out: {reason:?}");
            tasks.try_set(TaskBoard::default());
            chats.try_set(ChatInbox::default());
            friends.try_set(FriendsState::default());
            dashboard.try_set(None);
            page.try_set(Page::Dashboard);
            let message = match reason {
                SignOutReason::Unauthorized => Some("Your session expired. Please sign in again.".to_string()),
                SignOutReason::RefreshFailed => Some("Could not load your profile. Please sign in again.".to_string()),
                SignOutReason::Explicit => None,
            };
            notice.try_set(message);
        });
    }

    /// Restore a stored session on startup.
    pub fn bootstrap(&self) {
        let session = self.session.clone();
        spawn_local(async move {
            session.bootstrap().await;
        });
    }

    pub fn navigate(&self, page: Page) {
        self.notice.set(None);
        self.page.set(page);
    }

    pub fn load_dashboard(&self) {
        let api = self.session.api().clone();
        let dashboard = self.dashboard;
        spawn_local(async move {
            let data = load_dashboard(&api).await;
            dashboard.try_set(Some(data));
        });
    }

    pub fn user_id(&self) -> Option<i64> {
        self.session.user().map(|user| user.id())
    }
}

/// The browser has no process environment, so settings are baked in at build time.
fn build_config() -> ClientConfig {
    ClientConfig::from_lookup(|key| {
        match key {
            "TRACKIT_API_URL" => option_env!("TRACKIT_API_URL"),
            "TRACKIT_SEARCH_DEBOUNCE_MS" => option_env!("TRACKIT_SEARCH_DEBOUNCE_MS"),
            "TRACKIT_SUGGESTION_LIMIT" => option_env!("TRACKIT_SUGGESTION_LIMIT"),
            _ => None,
        }
        .map(str::to_string)
    })
}
