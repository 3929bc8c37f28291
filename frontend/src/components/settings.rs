use leptos::ev::{self, SubmitEvent};
use leptos::prelude::*;
use leptos::task::spawn_local;
use wasm_bindgen_futures::JsFuture;
use web_sys::HtmlInputElement;

use trackitnow::api::FilePart;
use trackitnow::auth::{self, DELETE_CONFIRMATION};
use trackitnow::models::ProfileUpdate;
use trackitnow::profile;

use crate::state::AppState;

/// Profile editing, avatar upload, sign-out and account deletion.
#[component]
pub fn SettingsPage() -> impl IntoView {
    let state = expect_context::<AppState>();
    let session = state.session.clone();

    let initial = session
        .user()
        .map(|profile| ProfileUpdate::from_user(&profile.user))
        .unwrap_or_default();
    let form = RwSignal::new(initial.clone());
    let (status, set_status) = signal(None::<Result<String, String>>);
    let (confirmation, set_confirmation) = signal(String::new());

    let on_save = {
        let session = session.clone();
        move |ev: SubmitEvent| {
            ev.prevent_default();
            let update = form.get_untracked();
            let session = session.clone();
            spawn_local(async move {
                let outcome = profile::update_profile(&session, &update)
                    .await
                    .map(|()| "Profile saved".to_string())
                    .map_err(|e| e.user_message("Could not save your profile"));
                set_status.try_set(Some(outcome));
            });
        }
    };

    let on_avatar = {
        let session = session.clone();
        move |ev: ev::Event| {
            let input = event_target::<HtmlInputElement>(&ev);
            let Some(file) = input.files().and_then(|files| files.get(0)) else {
                return;
            };
            let session = session.clone();
            spawn_local(async move {
                let outcome = match read_file(&file).await {
                    Ok(part) => profile::upload_avatar(&session, part)
                        .await
                        .map(|_| "Avatar updated".to_string())
                        .map_err(|e| e.user_message("Could not upload your avatar")),
                    Err(e) => Err(e),
                };
                set_status.try_set(Some(outcome));
            });
        }
    };

    let on_logout = {
        let session = session.clone();
        move |_| {
            let session = session.clone();
            spawn_local(async move { auth::sign_out(&session).await });
        }
    };

    let on_delete = {
        let session = session.clone();
        move |_| {
            let typed = confirmation.get_untracked();
            let session = session.clone();
            spawn_local(async move {
                if let Err(e) = auth::delete_account(&session, &typed).await {
                    set_status.try_set(Some(Err(e.user_message("Could not delete your account"))));
                }
            });
        }
    };

    let avatar_url = {
        let cell = session.cell().signal();
        let api = session.api().clone();
        move || {
            cell.with(|s| s.user.as_ref().and_then(|p| p.user.avatar_url.clone()))
                .map(|url| api.transport().resolve(&url))
        }
    };

    view! {
        <section class="settings">
            <h1>"Settings"</h1>
            {move || status.get().map(|outcome| match outcome {
                Ok(text) => view! { <div class="notice-banner">{text}</div> }.into_any(),
                Err(text) => view! { <div class="error-banner">{text}</div> }.into_any(),
            })}

            <div class="avatar-upload">
                {move || avatar_url().map(|url| view! { <img class="avatar-large" src=url /> })}
                <input type="file" accept="image/*" on:change=on_avatar />
            </div>

            <form class="profile-form" on:submit=on_save>
                <Field label="Username" value=initial.username.clone() form=form field=|f| &mut f.username />
                <Field label="Display name" value=initial.display_name.clone() form=form field=|f| &mut f.display_name />
                <Field label="Bio" value=initial.bio.clone() form=form field=|f| &mut f.bio />
                <Field label="Location" value=initial.location.clone() form=form field=|f| &mut f.location />
                <Field label="GitHub" value=initial.github_url.clone() form=form field=|f| &mut f.github_url />
                <Field label="LinkedIn" value=initial.linkedin_url.clone() form=form field=|f| &mut f.linkedin_url />
                <Field label="Twitter" value=initial.twitter_url.clone() form=form field=|f| &mut f.twitter_url />
                <button type="submit">"Save profile"</button>
            </form>

            <div class="danger-zone">
                <button on:click=on_logout>"Log out"</button>
                <p>{format!("Type \"{DELETE_CONFIRMATION}\" to delete your account. This cannot be undone.")}</p>
                <input
                    prop:value=confirmation
                    on:input=move |ev| set_confirmation.set(event_target_value(&ev))
                />
                <button
                    class="danger-btn"
                    disabled=move || auth::check_delete_confirmation(&confirmation.get()).is_err()
                    on:click=on_delete
                >
                    "Delete account"
                </button>
            </div>
        </section>
    }
}

/// One optional text field of the profile form. `value` is only the starting
/// text; edits go straight into `form`.
#[component]
fn Field(
    label: &'static str,
    value: Option<String>,
    form: RwSignal<ProfileUpdate>,
    field: fn(&mut ProfileUpdate) -> &mut Option<String>,
) -> impl IntoView {
    let value = value.unwrap_or_default();

    view! {
        <label class="field">
            <span>{label}</span>
            <input
                prop:value=value
                on:input=move |ev| {
                    let text = event_target_value(&ev);
                    form.update(|f| *field(f) = Some(text));
                }
            />
        </label>
    }
}

async fn read_file(file: &web_sys::File) -> Result<FilePart, String> {
    let buffer = JsFuture::from(file.array_buffer())
        .await
        .map_err(|e| format!("Could not read the file: {e:?}"))?;
    let bytes = js_sys::Uint8Array::new(&buffer).to_vec();
    Ok(FilePart::new(file.name(), file.type_(), bytes))
}
