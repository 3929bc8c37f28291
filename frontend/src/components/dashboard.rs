use chrono::Local;
use leptos::prelude::*;

use trackitnow::progress::{ActivityGrid, Dashboard};

use crate::state::AppState;

const HEATMAP_WEEKS: usize = ActivityGrid::DEFAULT_WEEKS;

/// Streak stats, the activity heatmap, weekly goals and badges.
#[component]
pub fn DashboardPage() -> impl IntoView {
    let state = expect_context::<AppState>();
    state.load_dashboard();

    let session = state.session.cell().signal();
    let dashboard = state.dashboard;

    view! {
        <section class="dashboard">
            {move || session.with(|s| s.user.clone()).map(|profile| view! {
                <h1>{format!("Welcome back, {}", profile.user.display_name)}</h1>
                <div class="stat-row">
                    <Stat label="Points" value=profile.total_points.to_string() />
                    <Stat label="Rank" value=format!("#{}", profile.rank) />
                    <Stat label="Friends" value=profile.friends_count.to_string() />
                    <Stat label="Completion" value=format!("{}%", profile.completion_rate()) />
                </div>
            })}
            {move || match dashboard.get() {
                None => view! { <div class="empty-state">"Loading your progress…"</div> }.into_any(),
                Some(data) => view! { <Progress data=data /> }.into_any(),
            }}
        </section>
    }
}

#[component]
fn Stat(label: &'static str, value: String) -> impl IntoView {
    view! {
        <div class="stat">
            <div class="stat-value">{value}</div>
            <div class="stat-label">{label}</div>
        </div>
    }
}

#[component]
fn Progress(data: Dashboard) -> impl IntoView {
    let today = Local::now().date_naive();
    let streak = data.streak(today);
    let grid = data.grid(today, HEATMAP_WEEKS);
    let earned = data.earned_badges();
    let badge_total = data.badges.len();

    view! {
        <div class="stat-row">
            <Stat label="Current streak" value=format!("{} days", streak.current) />
            <Stat label="Longest streak" value=format!("{} days", streak.longest) />
            <Stat label="Consistency" value=format!("{}%", streak.consistency_rate) />
        </div>

        <h3>{format!("{} tasks in the last year", grid.total())}</h3>
        {data.activity.is_none().then(|| view! {
            <div class="notice-banner">"Activity is unavailable right now."</div>
        })}
        <Heatmap grid=grid />

        <h3>"Weekly goals"</h3>
        {if data.goals.is_empty() {
            view! { <div class="empty-state">"No goals this week"</div> }.into_any()
        } else {
            data.goals
                .into_iter()
                .map(|goal| {
                    let percent = goal.percent();
                    let unit = goal.unit.clone().unwrap_or_default();
                    view! {
                        <div class="goal">
                            <div class="goal-title">
                                {goal.title.clone()}
                                <span>{format!("{}/{} {unit}", goal.current, goal.total)}</span>
                            </div>
                            <div class="goal-bar">
                                <div
                                    class="goal-fill"
                                    style=format!("width:{percent}%;background:{}", goal.color)
                                ></div>
                            </div>
                        </div>
                    }
                })
                .collect_view()
                .into_any()
        }}

        <h3>{format!("Badges ({earned}/{badge_total})")}</h3>
        <div class="badge-grid">
            {data.badges
                .into_iter()
                .map(|badge| view! {
                    <div class="badge-card" class:earned=badge.is_earned title=badge.description.clone()>
                        {badge.name.clone()}
                    </div>
                })
                .collect_view()}
        </div>
    }
}

#[component]
fn Heatmap(grid: ActivityGrid) -> impl IntoView {
    view! {
        <div class="heatmap">
            {grid
                .rows()
                .iter()
                .zip(ActivityGrid::DAY_LABELS)
                .map(|(row, label)| view! {
                    <div class="heatmap-row">
                        <span class="day-label">{label}</span>
                        {row
                            .iter()
                            .map(|cell| {
                                let title = format!("{} tasks on {}", cell.count, cell.date.format("%b %d, %Y"));
                                view! { <div class=format!("cell level-{}", cell.level) title=title></div> }
                            })
                            .collect_view()}
                    </div>
                })
                .collect_view()}
        </div>
    }
}
