mod api;
mod components;
mod state;
mod storage;

use leptos::mount::mount_to_body;
use leptos::prelude::*;

use components::auth::AuthPage;
use components::chats::ChatsPage;
use components::dashboard::DashboardPage;
use components::layout::Sidebar;
use components::search::SearchPage;
use components::settings::SettingsPage;
use components::tasks::TasksPage;
use state::{AppState, Page};
use trackitnow::SessionPhase;

/// Root application component.
#[component]
fn App() -> impl IntoView {
    let state = AppState::provide();
    state.bootstrap();

    let session = state.session.cell().signal();
    let phase = move || session.with(|s| s.phase());

    view! {
        {move || match phase() {
            SessionPhase::Bootstrapping => view! { <div class="splash">"Loading…"</div> }.into_any(),
            SessionPhase::Unauthenticated => view! { <AuthPage /> }.into_any(),
            SessionPhase::Authenticated => view! { <Shell /> }.into_any(),
        }}
    }
}

/// Signed-in layout: navigation plus whichever page is selected.
#[component]
fn Shell() -> impl IntoView {
    let state = expect_context::<AppState>();
    let page = state.page;
    let notice = state.notice;

    view! {
        <div class="app-container">
            <Sidebar />
            <main class="page">
                {move || notice.get().map(|text| view! { <div class="notice-banner">{text}</div> })}
                {move || match page.get() {
                    Page::Dashboard => view! { <DashboardPage /> }.into_any(),
                    Page::Tasks => view! { <TasksPage /> }.into_any(),
                    Page::Chats => view! { <ChatsPage /> }.into_any(),
                    Page::Search => view! { <SearchPage /> }.into_any(),
                    Page::Settings => view! { <SettingsPage /> }.into_any(),
                }}
            </main>
        </div>
    }
}

fn main() {
    if let Err(e) = console_log::init_with_level(log::Level::Debug) {
        web_sys::console::error_1(&format!("Failed to init logger: {e}").into());
    }
    mount_to_body(App);
}
