use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::{ApiClient, Transport};
use crate::cell::{Shared, StateCell};
use crate::debounce::Debouncer;
use crate::models::{Friend, FriendRequest, FriendRequestAction, User};

/// How many users the search page suggests before anything is typed.
pub const DEFAULT_SUGGESTION_LIMIT: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchState {
    pub query: String,
    pub results: Vec<User>,
    /// True only while a non-empty query is in flight.
    pub loading: bool,
    /// Users a friend request was successfully sent to this session.
    pub requested: BTreeSet<i64>,
}

impl SearchState {
    pub fn is_requested(&self, user_id: i64) -> bool {
        self.requested.contains(&user_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FriendsState {
    pub friends: Vec<Friend>,
    pub requests: Vec<FriendRequest>,
    pub search: SearchState,
}

pub struct FriendsController<T, C = Shared<FriendsState>> {
    api: ApiClient<T>,
    cell: C,
    debouncer: Debouncer,
    suggestion_limit: usize,
}

impl<T, C: Clone> Clone for FriendsController<T, C> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            cell: self.cell.clone(),
            debouncer: self.debouncer.clone(),
            suggestion_limit: self.suggestion_limit,
        }
    }
}

impl<T: Transport, C: StateCell<FriendsState>> FriendsController<T, C> {
    pub fn new(api: ApiClient<T>, cell: C) -> Self {
        Self { api, cell, debouncer: Debouncer::default(), suggestion_limit: DEFAULT_SUGGESTION_LIMIT }
    }

    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debouncer = Debouncer::new(window);
        self
    }

    pub fn with_suggestion_limit(mut self, limit: usize) -> Self {
        self.suggestion_limit = limit;
        self
    }

    pub fn cell(&self) -> &C {
        &self.cell
    }

    pub async fn load_friends(&self) {
        match self.api.friends().await {
            Ok(friends) => {
                debug!(count = friends.len(), "Friends loaded");
                self.cell.update(|state| state.friends = friends);
            }
            Err(e) => warn!("Failed to load friends: {e}"),
        }
    }

    pub async fn load_requests(&self) {
        match self.api.friend_requests().await {
            Ok(requests) => {
                debug!(count = requests.len(), "Friend requests loaded");
                self.cell.update(|state| state.requests = requests);
            }
            Err(e) => warn!("Failed to load friend requests: {e}"),
        }
    }

    pub async fn accept(&self, request_id: i64) {
        self.respond(request_id, FriendRequestAction::Accept).await;
    }

    pub async fn decline(&self, request_id: i64) {
        self.respond(request_id, FriendRequestAction::Decline).await;
    }

    /// The request leaves the pending list before the call and never comes back,
    /// whatever the server answers.
    async fn respond(&self, request_id: i64, action: FriendRequestAction) {
        self.cell.update(|state| state.requests.retain(|request| request.id != request_id));
        match self.api.respond_to_request(request_id, action).await {
            Ok(_) => info!(request_id, action = action.as_str(), "Friend request answered"),
            Err(e) => warn!(request_id, action = action.as_str(), "Friend request answer not confirmed: {e}"),
        }
    }

    /// Marks the user as requested only once the server accepted the request.
    pub async fn send_request(&self, user_id: i64) -> bool {
        match self.api.send_friend_request(user_id).await {
            Ok(_) => {
                info!(user_id, "Friend request sent");
                self.cell.update(|state| state.search.requested.insert(user_id));
                true
            }
            Err(e) => {
                warn!(user_id, "Friend request failed: {e}");
                false
            }
        }
    }

    /// Initial suggestions: the first few users of an unfiltered search.
    pub async fn load_suggestions(&self) {
        let results = match self.api.search_users("").await {
            Ok(mut users) => {
                users.truncate(self.suggestion_limit);
                users
            }
            Err(e) => {
                warn!("Failed to load suggestions: {e}");
                Vec::new()
            }
        };
        self.cell.update(|state| {
            if state.search.query.trim().is_empty() {
                state.search.results = results;
                state.search.loading = false;
            }
        });
    }

    /// Records a keystroke and runs the search once typing pauses. Returns
    /// `true` if this call's query was the one sent.
    pub async fn on_query(&self, query: &str) -> bool {
        self.cell.update(|state| state.search.query = query.to_string());
        if !self.debouncer.schedule().fire().await {
            return false;
        }
        self.run_search(query).await;
        true
    }

    /// Runs `query` now. Results are applied only if the query box still holds
    /// the same text when they arrive.
    pub async fn run_search(&self, query: &str) {
        if query.trim().is_empty() {
            self.load_suggestions().await;
            return;
        }

        self.cell.update(|state| state.search.loading = true);
        let results = self.api.search_users(query).await.unwrap_or_else(|e| {
            warn!(query, "Search failed: {e}");
            Vec::new()
        });
        let applied = self
            .cell
            .update(|state| {
                if state.search.query != query {
                    return false;
                }
                state.search.results = results;
                state.search.loading = false;
                true
            })
            .unwrap_or(false);
        if !applied {
            debug!(query, "Dropped results for a superseded query");
        }
    }
}
