use leptos::ev;
use leptos::prelude::*;
use leptos::task::spawn_local;

use trackitnow::models::User;

use crate::state::{AppFriends, AppState};

/// Debounced user search with friend-request buttons.
#[component]
pub fn SearchPage() -> impl IntoView {
    let state = expect_context::<AppState>();
    let friends = state.friends.clone();
    let search = friends.cell().signal();

    let loader = friends.clone();
    spawn_local(async move {
        loader.load_friends().await;
        loader.load_suggestions().await;
    });

    let on_input = {
        let friends = friends.clone();
        move |ev: ev::Event| {
            let query = event_target_value(&ev);
            let friends = friends.clone();
            spawn_local(async move {
                friends.on_query(&query).await;
            });
        }
    };

    view! {
        <section class="search">
            <input
                class="search-input"
                placeholder="Search by name or username"
                prop:value=move || search.with(|s| s.search.query.clone())
                on:input=on_input
            />
            {move || search.with(|s| s.search.loading).then(|| view! { <div class="empty-state">"Searching…"</div> })}
            <div class="search-results">
                {
                    let friends = friends.clone();
                    move || {
                        let (query, results) =
                            search.with(|s| (s.search.query.clone(), s.search.results.clone()));
                        if results.is_empty() {
                            let text = if query.trim().is_empty() { "No suggestions yet" } else { "No users found" };
                            return view! { <div class="empty-state">{text}</div> }.into_any();
                        }
                        results
                            .into_iter()
                            .map(|user| view! { <UserRow user=user friends=friends.clone() /> })
                            .collect_view()
                            .into_any()
                    }
                }
            </div>
        </section>
    }
}

#[component]
fn UserRow(user: User, friends: AppFriends) -> impl IntoView {
    let search = friends.cell().signal();
    let id = user.id;
    let is_friend = move || search.with(|s| s.friends.iter().any(|f| f.id == id));
    let requested = move || search.with(|s| s.search.is_requested(id));

    let on_add = move |_| {
        let friends = friends.clone();
        spawn_local(async move {
            friends.send_request(id).await;
        });
    };

    view! {
        <div class="user-row">
            <div class="avatar">{user.initial()}</div>
            <div>
                <div class="user-name">{user.display_name.clone()}</div>
                <div class="user-meta">{format!("@{}", user.username)}</div>
            </div>
            {move || {
                if is_friend() {
                    view! { <span class="user-meta">"Friends"</span> }.into_any()
                } else if requested() {
                    view! { <span class="user-meta">"Requested"</span> }.into_any()
                } else {
                    view! { <button on:click=on_add.clone()>"Add friend"</button> }.into_any()
                }
            }}
        </div>
    }
}
