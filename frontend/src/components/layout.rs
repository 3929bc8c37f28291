use leptos::prelude::*;

use crate::state::{AppState, Page};

/// Navigation, unread badge and the signed-in user's summary.
#[component]
pub fn Sidebar() -> impl IntoView {
    let state = expect_context::<AppState>();
    let session = state.session.cell().signal();
    let chats = state.chats.cell().signal();
    let current = state.page;

    let unread = move || chats.with(|inbox| inbox.total_unread());

    view! {
        <aside class="sidebar">
            <div class="sidebar-header">
                <h2>"TrackItNow"</h2>
            </div>
            <nav class="nav-list">
                {Page::ALL
                    .into_iter()
                    .map(|page| {
                        let state = state.clone();
                        view! {
                            <div
                                class="nav-item"
                                class:active=move || current.get() == page
                                on:click=move |_| state.navigate(page)
                            >
                                {page.label()}
                                {move || (page == Page::Chats && unread() > 0)
                                    .then(|| view! { <span class="badge">{unread()}</span> })}
                            </div>
                        }
                    })
                    .collect_view()}
            </nav>
            {move || session.with(|s| s.user.clone()).map(|profile| view! {
                <div class="sidebar-user">
                    <div class="avatar">{profile.user.initial()}</div>
                    <div>
                        <div class="user-name">{profile.user.display_name.clone()}</div>
                        <div class="user-meta">
                            {format!("{} pts · {} day streak", profile.total_points, profile.streak)}
                        </div>
                    </div>
                </div>
            })}
        </aside>
    }
}
