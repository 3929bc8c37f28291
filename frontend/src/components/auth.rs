use leptos::ev::SubmitEvent;
use leptos::prelude::*;
use leptos::task::spawn_local;

use trackitnow::auth::{self, SIGN_IN_FALLBACK, SIGN_UP_FALLBACK};
use trackitnow::models::SignUp;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    SignIn,
    SignUp,
}

/// Sign-in and registration forms.
#[component]
pub fn AuthPage() -> impl IntoView {
    let state = expect_context::<AppState>();
    let notice = state.notice;

    let (mode, set_mode) = signal(Mode::SignIn);
    let (email, set_email) = signal(String::new());
    let (password, set_password) = signal(String::new());
    let (username, set_username) = signal(String::new());
    let (display_name, set_display_name) = signal(String::new());
    let (error, set_error) = signal(None::<String>);
    let (busy, set_busy) = signal(false);

    let toggle = move |_| {
        set_error.set(None);
        set_mode.update(|m| *m = if *m == Mode::SignIn { Mode::SignUp } else { Mode::SignIn });
    };

    let on_submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        if busy.get_untracked() {
            return;
        }
        set_busy.set(true);
        set_error.set(None);
        let session = state.session.clone();
        let current = mode.get_untracked();
        let email_value = email.get_untracked();
        let password_value = password.get_untracked();
        let form = SignUp {
            email: email_value.clone(),
            username: username.get_untracked(),
            display_name: display_name.get_untracked(),
            password: password_value.clone(),
        };

        spawn_local(async move {
            match current {
                Mode::SignIn => {
                    if let Err(e) = auth::sign_in(&session, &email_value, &password_value).await {
                        set_error.try_set(Some(e.user_message(SIGN_IN_FALLBACK)));
                    }
                }
                Mode::SignUp => match auth::sign_up(&session, &form).await {
                    Ok(_) => {
                        set_password.try_set(String::new());
                        set_mode.try_set(Mode::SignIn);
                        notice.try_set(Some("Account created. Sign in to continue.".to_string()));
                    }
                    Err(e) => {
                        set_error.try_set(Some(e.user_message(SIGN_UP_FALLBACK)));
                    }
                },
            }
            set_busy.try_set(false);
        });
    };

    view! {
        <div class="auth-page">
            <form class="auth-card" on:submit=on_submit>
                <h1>"TrackItNow"</h1>
                <h2>{move || if mode.get() == Mode::SignIn { "Welcome back" } else { "Create your account" }}</h2>

                {move || notice.get().map(|text| view! { <div class="notice-banner">{text}</div> })}
                {move || error.get().map(|text| view! { <div class="error-banner">{text}</div> })}

                <input
                    type="email"
                    placeholder="Email"
                    prop:value=email
                    on:input=move |ev| set_email.set(event_target_value(&ev))
                />
                <Show when=move || mode.get() == Mode::SignUp>
                    <input
                        placeholder="Username"
                        prop:value=username
                        on:input=move |ev| set_username.set(event_target_value(&ev))
                    />
                    <input
                        placeholder="Display name"
                        prop:value=display_name
                        on:input=move |ev| set_display_name.set(event_target_value(&ev))
                    />
                </Show>
                <input
                    type="password"
                    placeholder="Password"
                    prop:value=password
                    on:input=move |ev| set_password.set(event_target_value(&ev))
                />

                <button type="submit" disabled=move || busy.get()>
                    {move || match (busy.get(), mode.get()) {
                        (true, _) => "Please wait…",
                        (false, Mode::SignIn) => "Sign in",
                        (false, Mode::SignUp) => "Sign up",
                    }}
                </button>
                <button type="button" class="link-btn" on:click=toggle>
                    {move || if mode.get() == Mode::SignIn {
                        "No account yet? Sign up"
                    } else {
                        "Already registered? Sign in"
                    }}
                </button>
            </form>
        </div>
    }
}
