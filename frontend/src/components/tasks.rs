use chrono::Local;
use leptos::ev::SubmitEvent;
use leptos::prelude::*;
use leptos::task::spawn_local;

use trackitnow::models::{Task, TaskCreate, TaskLevel};
use trackitnow::tasks::{DEFAULT_TASK_ICON, DEFAULT_TASK_KIND};

use crate::state::{AppState, AppTasks};

/// Level tabs, the task of the day, the task list and the create form.
#[component]
pub fn TasksPage() -> impl IntoView {
    let state = expect_context::<AppState>();
    let tasks = state.tasks.clone();
    let board = tasks.cell().signal();

    // Reload whenever the level tab changes
    let loader = tasks.clone();
    Effect::new(move |_| {
        let level = board.with(|b| b.selected_level);
        let loader = loader.clone();
        spawn_local(async move { loader.load(Some(level)).await });
    });

    let tabs = tasks.clone();
    let today = Local::now().date_naive();

    view! {
        <section class="tasks">
            <div class="tabs">
                {TaskLevel::ALL
                    .into_iter()
                    .map(|level| {
                        let tabs = tabs.clone();
                        view! {
                            <button
                                class="tab"
                                class:active=move || board.with(|b| b.selected_level == level)
                                on:click=move |_| tabs.select_level(level)
                            >
                                {level.label()}
                            </button>
                        }
                    })
                    .collect_view()}
            </div>

            {move || board.with(|b| b.task_of_the_day(today).cloned()).map(|task| view! {
                <div class="task-of-the-day">
                    <div class="eyebrow">"Task of the day"</div>
                    <div class="task-title">{format!("{} {}", task.icon, task.title)}</div>
                    <div class="task-description">{task.description}</div>
                </div>
            })}

            <div class="task-list">
                {
                    let tasks = tasks.clone();
                    move || {
                        let visible: Vec<Task> = board.with(|b| b.filtered().into_iter().cloned().collect());
                        if visible.is_empty() {
                            return view! { <div class="empty-state">"No tasks at this level yet"</div> }.into_any();
                        }
                        visible
                            .into_iter()
                            .map(|task| view! { <TaskCard task=task tasks=tasks.clone() /> })
                            .collect_view()
                            .into_any()
                    }
                }
            </div>

            <TaskDetail tasks=tasks.clone() />
            <CreateTask tasks=tasks />
        </section>
    }
}

#[component]
fn TaskCard(task: Task, tasks: AppTasks) -> impl IntoView {
    let id = task.id;
    let opener = tasks.clone();
    let next_steps = task.status.transitions();

    view! {
        <div class="task-card">
            <div class="task-title" on:click=move |_| opener.open_task(Some(id))>
                {format!("{} {}", task.icon, task.title)}
            </div>
            <div class="task-meta">{format!("{} · {}", task.kind, task.status.label())}</div>
            <div class="task-actions">
                {next_steps
                    .iter()
                    .copied()
                    .map(|status| {
                        let tasks = tasks.clone();
                        view! {
                            <button on:click=move |_| {
                                let tasks = tasks.clone();
                                spawn_local(async move {
                                    tasks.set_status(id, status).await;
                                });
                            }>
                                {format!("Mark {}", status.label())}
                            </button>
                        }
                    })
                    .collect_view()}
            </div>
        </div>
    }
}

#[component]
fn TaskDetail(tasks: AppTasks) -> impl IntoView {
    let board = tasks.cell().signal();

    move || {
        board.with(|b| b.open().cloned()).map(|task| {
            let closer = tasks.clone();
            view! {
                <div class="modal" on:click=move |_| closer.open_task(None)>
                    <div class="modal-card">
                        <h2>{format!("{} {}", task.icon, task.title)}</h2>
                        <p>{task.description}</p>
                        <div class="task-meta">
                            {format!("{} · {} · {}", task.level.label(), task.kind, task.status.label())}
                        </div>
                    </div>
                </div>
            }
        })
    }
}

#[component]
fn CreateTask(tasks: AppTasks) -> impl IntoView {
    let board = tasks.cell().signal();
    let (title, set_title) = signal(String::new());
    let (description, set_description) = signal(String::new());
    let (kind, set_kind) = signal(DEFAULT_TASK_KIND.to_string());
    let (icon, set_icon) = signal(String::new());
    let (error, set_error) = signal(None::<String>);

    let creating = move || board.with(|b| b.creating);

    let on_submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        let icon_value = icon.get_untracked();
        let form = TaskCreate {
            title: title.get_untracked(),
            description: description.get_untracked(),
            level: board.with_untracked(|b| b.selected_level),
            kind: kind.get_untracked(),
            icon: (!icon_value.trim().is_empty()).then_some(icon_value),
        };
        let tasks = tasks.clone();
        spawn_local(async move {
            match tasks.create(form).await {
                Ok(true) => {
                    set_error.try_set(None);
                    set_title.try_set(String::new());
                    set_description.try_set(String::new());
                    set_icon.try_set(String::new());
                }
                Ok(false) => {}
                Err(e) => {
                    set_error.try_set(Some(e.to_string()));
                }
            }
        });
    };

    view! {
        <form class="create-task" on:submit=on_submit>
            <h3>"Add a custom task"</h3>
            {move || error.get().map(|text| view! { <div class="error-banner">{text}</div> })}
            <input
                placeholder="Title"
                prop:value=title
                on:input=move |ev| set_title.set(event_target_value(&ev))
            />
            <textarea
                placeholder="Description"
                prop:value=description
                on:input=move |ev| set_description.set(event_target_value(&ev))
            />
            <input
                placeholder="Type"
                prop:value=kind
                on:input=move |ev| set_kind.set(event_target_value(&ev))
            />
            <input
                placeholder=DEFAULT_TASK_ICON
                prop:value=icon
                on:input=move |ev| set_icon.set(event_target_value(&ev))
            />
            <button type="submit" disabled=creating>
                {move || if creating() { "Adding…" } else { "Add task" }}
            </button>
        </form>
    }
}
