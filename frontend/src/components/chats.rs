use chrono::Utc;
use leptos::ev;
use leptos::prelude::*;
use leptos::task::spawn_local;

use trackitnow::chats::time_ago;
use trackitnow::models::{Chat, FriendRequest};

use crate::state::{AppChats, AppFriends, AppState};

/// Inbox, the open thread and pending friend requests.
#[component]
pub fn ChatsPage() -> impl IntoView {
    let state = expect_context::<AppState>();
    let chats = state.chats.clone();
    let friends = state.friends.clone();

    let loader_chats = chats.clone();
    let loader_friends = friends.clone();
    spawn_local(async move {
        loader_chats.load_chats().await;
        loader_friends.load_requests().await;
    });

    let inbox = chats.cell().signal();

    view! {
        <section class="chats">
            <FriendRequests friends=friends />
            <div class="chat-layout">
                <div class="chat-list">
                    {
                        let chats = chats.clone();
                        move || {
                            let list: Vec<Chat> = inbox.with(|i| i.chats.clone());
                            if list.is_empty() {
                                return view! { <div class="empty-state">"No chats yet"</div> }.into_any();
                            }
                            list.into_iter()
                                .map(|chat| view! { <ChatRow chat=chat chats=chats.clone() /> })
                                .collect_view()
                                .into_any()
                        }
                    }
                </div>
                <ChatThreadView chats=chats />
            </div>
        </section>
    }
}

#[component]
fn ChatRow(chat: Chat, chats: AppChats) -> impl IntoView {
    let inbox = chats.cell().signal();
    let id = chat.id;
    let preview = chat
        .last_message
        .as_ref()
        .map(|m| m.content.clone())
        .unwrap_or_else(|| "Say hello".to_string());
    let when = chat
        .last_message
        .as_ref()
        .map(|m| time_ago(&m.created_at, Utc::now()))
        .unwrap_or_default();

    let on_click = move |_| {
        let chats = chats.clone();
        spawn_local(async move { chats.open(id).await });
    };

    view! {
        <div
            class="chat-row"
            class:active=move || inbox.with(|i| i.thread.as_ref().is_some_and(|t| t.chat_id == id))
            on:click=on_click
        >
            <div class="avatar">{chat.friend.initial()}</div>
            <div class="chat-summary">
                <div class="user-name">{chat.friend.display_name.clone()}</div>
                <div class="chat-preview">{preview}</div>
            </div>
            <div class="chat-when">{when}</div>
            {(chat.unread_count > 0).then(|| view! { <span class="badge">{chat.unread_count}</span> })}
        </div>
    }
}

#[component]
fn ChatThreadView(chats: AppChats) -> impl IntoView {
    let state = expect_context::<AppState>();
    let inbox = chats.cell().signal();
    let (input, set_input) = signal(String::new());

    let is_sending = move || inbox.with(|i| i.sending);
    let me = state.user_id().unwrap_or_default();

    let send = {
        let chats = chats.clone();
        move || {
            let text = input.get_untracked();
            if text.trim().is_empty() || is_sending() {
                return;
            }
            set_input.set(String::new());
            let chats = chats.clone();
            spawn_local(async move {
                chats.send_message(me, &text).await;
            });
        }
    };

    let send_on_enter = send.clone();
    let on_keydown = move |ev: ev::KeyboardEvent| {
        if ev.key() == "Enter" && !ev.shift_key() {
            ev.prevent_default();
            send_on_enter();
        }
    };

    let closer = chats.clone();

    view! {
        <Show
            when=move || inbox.with(|i| i.thread.is_some())
            fallback=|| view! { <div class="empty-state">"Pick a chat to start talking"</div> }
        >
            <div class="chat-area">
                <div class="chat-header">
                    {move || inbox.with(|i| i.open_chat().map(|c| c.friend.display_name.clone()))}
                    <button class="link-btn" on:click={
                        let closer = closer.clone();
                        move |_| closer.close()
                    }>"Close"</button>
                </div>
                <div class="messages-container">
                    {move || {
                        let (loading, messages) = inbox.with(|i| {
                            i.thread
                                .as_ref()
                                .map(|t| (t.loading, t.messages.clone()))
                                .unwrap_or_default()
                        });
                        if loading {
                            return view! { <div class="empty-state">"Loading messages…"</div> }.into_any();
                        }
                        messages
                            .into_iter()
                            .map(|entry| {
                                let pending = entry.is_pending();
                                let message = entry.into_value();
                                let mine = message.sender_id == me;
                                view! {
                                    <div class="message" class:user=mine class:pending=pending>
                                        <div>{message.content.clone()}</div>
                                        <div class="message-time">{time_ago(&message.created_at, Utc::now())}</div>
                                    </div>
                                }
                            })
                            .collect_view()
                            .into_any()
                    }}
                </div>
                <div class="input-row">
                    <textarea
                        rows="1"
                        placeholder="Type a message…"
                        prop:value=input
                        on:input=move |ev| set_input.set(event_target_value(&ev))
                        on:keydown=on_keydown.clone()
                        disabled=is_sending
                    />
                    <button
                        class="send-btn"
                        on:click={
                            let send = send.clone();
                            move |_| send()
                        }
                        disabled=move || is_sending() || input.get().trim().is_empty()
                    >
                        {move || if is_sending() { "Sending…" } else { "Send" }}
                    </button>
                </div>
            </div>
        </Show>
    }
}

#[component]
fn FriendRequests(friends: AppFriends) -> impl IntoView {
    let state = friends.cell().signal();

    move || {
        let requests: Vec<FriendRequest> = state.with(|s| s.requests.clone());
        (!requests.is_empty()).then(|| {
            let rows = requests
                .into_iter()
                .map(|request| {
                    let id = request.id;
                    let name = request
                        .user
                        .as_ref()
                        .map(|u| u.display_name.clone())
                        .unwrap_or_else(|| format!("User #{}", request.user_id));
                    let accept = friends.clone();
                    let decline = friends.clone();
                    view! {
                        <div class="request-row">
                            <span>{name}</span>
                            <button on:click=move |_| {
                                let accept = accept.clone();
                                spawn_local(async move { accept.accept(id).await });
                            }>"Accept"</button>
                            <button class="link-btn" on:click=move |_| {
                                let decline = decline.clone();
                                spawn_local(async move { decline.decline(id).await });
                            }>"Decline"</button>
                        </div>
                    }
                })
                .collect_view();
            view! {
                <div class="friend-requests">
                    <h3>"Friend requests"</h3>
                    {rows}
                </div>
            }
        })
    }
}
