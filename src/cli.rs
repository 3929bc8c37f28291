use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use trackitnow::api::http::HttpTransport;
use trackitnow::api::FilePart;
use trackitnow::chats::{time_ago, ChatController, ChatInbox};
use trackitnow::friends::{FriendsController, FriendsState};
use trackitnow::models::{ProfileUpdate, SignUp, TaskCreate, TaskLevel, TaskStatus};
use trackitnow::progress::{load_dashboard, monthly_totals, weekly_points, ActivityGrid};
use trackitnow::storage::FileTokenStorage;
use trackitnow::tasks::{TaskBoard, TaskController, DEFAULT_TASK_KIND};
use trackitnow::{auth, profile};
use trackitnow::{ApiClient, ClientConfig, Shared, SessionStore, SignOutReason};

type Session = SessionStore<HttpTransport>;

#[derive(Debug, Parser)]
#[command(name = "trackitnow", version, about = "Track daily habits, friends and streaks from the terminal")]
pub struct Cli {
    /// API base URL, overriding TRACKIT_API_URL.
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register a new account
    Signup {
        email: String,
        username: String,
        display_name: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in and remember the session
    Signin { email: String, password: String },
    /// End the session
    Signout,
    /// Show the signed-in profile
    Whoami,
    /// List tasks, optionally for one level
    Tasks {
        #[arg(long)]
        level: Option<TaskLevel>,
    },
    /// Show the task of the day
    Today,
    /// Create a custom task
    TaskCreate {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = TaskLevel::Beginner)]
        level: TaskLevel,
        #[arg(long = "type", default_value = DEFAULT_TASK_KIND)]
        kind: String,
        #[arg(long)]
        icon: Option<String>,
    },
    /// Move a task to pending, progress or done
    TaskStatus { id: i64, status: TaskStatus },
    /// List friends
    Friends,
    /// List pending friend requests
    Requests,
    /// Accept a friend request
    Accept { request_id: i64 },
    /// Decline a friend request
    Decline { request_id: i64 },
    /// Send a friend request
    AddFriend { user_id: i64 },
    /// Search users; without a query shows suggestions
    Search {
        #[arg(default_value = "")]
        query: String,
    },
    /// List chats
    Chats,
    /// Show the messages of a chat and mark it read
    Open { chat_id: i64 },
    /// Send a message to a chat
    Send { chat_id: i64, message: String },
    /// Show streaks, badges, goals and the activity heatmap
    Dashboard {
        #[arg(long, default_value_t = 12)]
        weeks: usize,
    },
    /// Update profile fields
    Profile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        github: Option<String>,
        #[arg(long)]
        linkedin: Option<String>,
        #[arg(long)]
        twitter: Option<String>,
    },
    /// Upload a profile photo
    Avatar { path: PathBuf },
    /// Permanently delete the account; pass "delete" to confirm
    DeleteAccount { confirmation: String },
}

pub async fn run(cli: Cli, mut config: ClientConfig) -> anyhow::Result<()> {
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    info!(api_url = %config.api_url, "Using API");

    let transport = HttpTransport::new(&config.api_url, config.http_timeout)?;
    let tokens = Arc::new(FileTokenStorage::new(&config.token_dir));
    let session = SessionStore::in_memory(ApiClient::new(transport, tokens));
    session.on_signed_out(|reason| {
        if reason == SignOutReason::Unauthorized {
            eprintln!("Your session has expired. Sign in again with `trackitnow signin`.");
        }
    });
    session.bootstrap().await;

    match cli.command {
        Command::Signup { email, username, display_name, password } => {
            let form = SignUp { email, username, display_name, password };
            let user = auth::sign_up(&session, &form)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message(auth::SIGN_UP_FALLBACK)))?;
            println!("Registered {} (@{}). Sign in to continue.", user.display_name, user.username);
        }
        Command::Signin { email, password } => {
            auth::sign_in(&session, &email, &password)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message(auth::SIGN_IN_FALLBACK)))?;
            let user = session.user().context("Signed in but the profile did not load")?;
            println!("Welcome back, {}!", user.user.display_name);
        }
        Command::Signout => {
            auth::sign_out(&session).await;
            println!("Signed out.");
        }
        Command::Whoami => whoami(&session)?,
        Command::Tasks { level } => list_tasks(&session, level).await?,
        Command::Today => today(&session).await?,
        Command::TaskCreate { title, description, level, kind, icon } => {
            require_session(&session)?;
            let tasks = task_controller(&session);
            tasks.load(None).await;
            let form = TaskCreate { title, description, level, kind, icon };
            tasks.create(form).await?;
            let board = tasks.cell().get();
            if let Some(task) = board.tasks.last() {
                let note = if task.is_pending() { " (saved locally, the server did not confirm it)" } else { "" };
                println!("Created #{} {} {}{note}", task.value().id, task.value().icon, task.value().title);
            }
        }
        Command::TaskStatus { id, status } => {
            require_session(&session)?;
            let tasks = task_controller(&session);
            tasks.load(None).await;
            if let Some(task) = tasks.cell().get().task(id) {
                if !task.status.can_move_to(status) && task.status != status {
                    println!("Note: moving from {} to {} skips the usual order.", task.status.label(), status.label());
                }
            }
            if !tasks.set_status(id, status).await {
                bail!("No task with id {id}");
            }
            println!("Task #{id} is now {}.", status.label());
        }
        Command::Friends => {
            require_session(&session)?;
            let friends = friends_controller(&session, &config);
            friends.load_friends().await;
            let state = friends.cell().get();
            if state.friends.is_empty() {
                println!("No friends yet. Try `trackitnow search`.");
            }
            for friend in state.friends {
                println!("#{:<5} {} (@{})", friend.id, friend.display_name, friend.username);
            }
        }
        Command::Requests => {
            require_session(&session)?;
            let friends = friends_controller(&session, &config);
            friends.load_requests().await;
            let state = friends.cell().get();
            if state.requests.is_empty() {
                println!("No pending requests.");
            }
            for request in state.requests {
                let from = request
                    .user
                    .map(|u| format!("{} (@{})", u.display_name, u.username))
                    .unwrap_or_else(|| format!("user #{}", request.user_id));
                println!("#{:<5} from {from}", request.id);
            }
        }
        Command::Accept { request_id } => {
            require_session(&session)?;
            friends_controller(&session, &config).accept(request_id).await;
            println!("Accepted request #{request_id}.");
        }
        Command::Decline { request_id } => {
            require_session(&session)?;
            friends_controller(&session, &config).decline(request_id).await;
            println!("Declined request #{request_id}.");
        }
        Command::AddFriend { user_id } => {
            require_session(&session)?;
            if !friends_controller(&session, &config).send_request(user_id).await {
                bail!("Friend request to user #{user_id} failed");
            }
            println!("Friend request sent to user #{user_id}.");
        }
        Command::Search { query } => {
            require_session(&session)?;
            let friends = friends_controller(&session, &config);
            friends.on_query(&query).await;
            let results = friends.cell().get().search.results;
            if results.is_empty() {
                println!("No users found.");
            }
            for user in results {
                println!("#{:<5} {} (@{})", user.id, user.display_name, user.username);
            }
        }
        Command::Chats => {
            require_session(&session)?;
            let chats = chat_controller(&session);
            chats.load_chats().await;
            let inbox = chats.cell().get();
            println!("{} unread", inbox.total_unread());
            for chat in &inbox.chats {
                let last = chat
                    .last_message
                    .as_ref()
                    .map(|m| format!("{} · {}", m.content, time_ago(&m.created_at, Utc::now())))
                    .unwrap_or_default();
                println!("#{:<5} {:<20} {:>3} new  {last}", chat.id, chat.friend.display_name, chat.unread_count);
            }
        }
        Command::Open { chat_id } => {
            require_session(&session)?;
            let chats = chat_controller(&session);
            chats.load_chats().await;
            chats.open(chat_id).await;
            print_thread(&chats.cell().get(), session.user().map(|p| p.id()));
        }
        Command::Send { chat_id, message } => {
            let me = require_session(&session)?;
            let chats = chat_controller(&session);
            chats.load_chats().await;
            chats.open(chat_id).await;
            if !chats.send_message(me, &message).await {
                bail!("Nothing to send");
            }
            let inbox = chats.cell().get();
            let confirmed = inbox
                .thread
                .as_ref()
                .and_then(|thread| thread.messages.last())
                .is_some_and(|last| !last.is_pending());
            if confirmed {
                println!("Sent.");
            } else {
                println!("Saved locally; the server did not confirm the message.");
            }
        }
        Command::Dashboard { weeks } => dashboard(&session, weeks).await?,
        Command::Profile { username, display_name, bio, location, github, linkedin, twitter } => {
            require_session(&session)?;
            let update = ProfileUpdate {
                username,
                display_name,
                bio,
                location,
                github_url: github,
                linkedin_url: linkedin,
                twitter_url: twitter,
            };
            if update.is_empty() {
                return whoami(&session);
            }
            profile::update_profile(&session, &update)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message("Update failed")))?;
            println!("Profile updated.");
            whoami(&session)?;
        }
        Command::Avatar { path } => {
            require_session(&session)?;
            let file = read_image(&path)?;
            let url = profile::upload_avatar(&session, file)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message("Upload failed")))?;
            println!("Avatar updated: {url}");
        }
        Command::DeleteAccount { confirmation } => {
            require_session(&session)?;
            auth::delete_account(&session, &confirmation).await?;
            println!("Account deleted.");
        }
    }
    Ok(())
}

/// Returns the signed-in user's id.
fn require_session(session: &Session) -> anyhow::Result<i64> {
    match session.user() {
        Some(user) if session.is_authenticated() => Ok(user.id()),
        _ => bail!("Not signed in. Run `trackitnow signin <email> <password>` first."),
    }
}

fn task_controller(session: &Session) -> TaskController<HttpTransport> {
    TaskController::new(session.api().clone(), Shared::new(TaskBoard::default()))
}

fn chat_controller(session: &Session) -> ChatController<HttpTransport> {
    ChatController::new(session.api().clone(), Shared::new(ChatInbox::default()))
}

fn friends_controller(session: &Session, config: &ClientConfig) -> FriendsController<HttpTransport> {
    // One-shot commands have nothing to debounce.
    FriendsController::new(session.api().clone(), Shared::new(FriendsState::default()))
        .with_debounce(std::time::Duration::ZERO)
        .with_suggestion_limit(config.suggestion_limit)
}

fn whoami(session: &Session) -> anyhow::Result<()> {
    require_session(session)?;
    let profile = session.user().context("Profile not loaded")?;
    let user = &profile.user;
    println!("{} (@{}) <{}>", user.display_name, user.username, user.email);
    if let Some(bio) = user.bio.as_deref().filter(|b| !b.is_empty()) {
        println!("  {bio}");
    }
    println!(
        "  {} points · {}-day streak · rank #{} · {} friends",
        profile.total_points, profile.streak, profile.rank, profile.friends_count
    );
    println!(
        "  {}/{} tasks done ({}%)",
        profile.completed_tasks,
        profile.total_tasks,
        profile.completion_rate()
    );
    Ok(())
}

async fn list_tasks(session: &Session, level: Option<TaskLevel>) -> anyhow::Result<()> {
    require_session(session)?;
    let tasks = task_controller(session);
    tasks.load(None).await;
    let board = tasks.cell().get();
    for level in level.map(|l| vec![l]).unwrap_or_else(|| TaskLevel::ALL.to_vec()) {
        println!("{}", level.label());
        for task in board.tasks.iter().map(|t| t.value()).filter(|t| t.level == level) {
            println!("  #{:<4} {} {:<28} [{}] {}", task.id, task.icon, task.title, task.status.label(), task.kind);
        }
    }
    Ok(())
}

async fn today(session: &Session) -> anyhow::Result<()> {
    require_session(session)?;
    let tasks = task_controller(session);
    tasks.load(None).await;
    let board = tasks.cell().get();
    match board.task_of_the_day(Local::now().date_naive()) {
        Some(task) => {
            println!("Task of the day: {} {}", task.icon, task.title);
            println!("  {} · {} · {}", task.kind, task.level.label(), task.status.label());
            if !task.description.is_empty() {
                println!("  {}", task.description);
            }
        }
        None => println!("No tasks available."),
    }
    Ok(())
}

async fn dashboard(session: &Session, weeks: usize) -> anyhow::Result<()> {
    require_session(session)?;
    let today = Local::now().date_naive();
    let data = load_dashboard(session.api()).await;
    let streak = data.streak(today);

    println!(
        "Streak: {} days (longest {}) · {}% consistency over 30 days",
        streak.current, streak.longest, streak.consistency_rate
    );

    println!("\nActivity, last {weeks} weeks:");
    let grid = data.grid(today, weeks);
    const SHADES: [char; 5] = ['·', '░', '▒', '▓', '█'];
    for (row, label) in grid.rows().iter().zip(ActivityGrid::DAY_LABELS) {
        let cells: String = row.iter().map(|cell| SHADES[usize::from(cell.level)]).collect();
        println!("{label:>4} {cells}");
    }
    if data.activity.is_none() {
        println!("     (activity unavailable)");
    }

    let activity = data.activity.clone().unwrap_or_default();
    println!("\nMonthly completed:");
    for month in monthly_totals(&activity, today, 6) {
        println!("  {} {:>4}", month.label, month.completed);
    }
    println!("\nWeekly points:");
    for week in weekly_points(&activity, today, 4) {
        println!("  {:<8} {:>5}", week.label, week.points);
    }

    println!("\nBadges ({} earned):", data.earned_badges());
    for badge in &data.badges {
        let mark = if badge.is_earned { '★' } else { '☆' };
        println!("  {mark} {} · {}", badge.name, badge.description);
    }

    if !data.goals.is_empty() {
        println!("\nWeekly goals:");
        for goal in &data.goals {
            let unit = goal.unit.as_deref().unwrap_or("");
            println!("  {:<16} {}/{}{unit} ({}%)", goal.title, goal.current, goal.total, goal.percent());
        }
    }
    Ok(())
}

fn print_thread(inbox: &ChatInbox, me: Option<i64>) {
    let Some(thread) = &inbox.thread else {
        return;
    };
    let name = inbox.open_chat().map(|c| c.friend.display_name.as_str()).unwrap_or("Unknown chat");
    println!("Chat with {name}");
    if thread.messages.is_empty() {
        println!("  No messages yet.");
    }
    for message in thread.messages.iter().map(|m| m.value()) {
        let who = if Some(message.sender_id) == me { "you" } else { name };
        println!("  [{}] {who}: {}", time_ago(&message.created_at, Utc::now()), message.content);
    }
}

fn read_image(path: &Path) -> anyhow::Result<FilePart> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    let mime = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    };
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("avatar")
        .to_string();
    Ok(FilePart::new(file_name, mime, bytes))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_task_commands() {
        let cli = Cli::parse_from(["trackitnow", "task-status", "4", "done"]);
        assert!(matches!(cli.command, Command::TaskStatus { id: 4, status: TaskStatus::Done }));

        let cli = Cli::parse_from(["trackitnow", "tasks", "--level", "expert", "--api-url", "http://api"]);
        assert!(matches!(cli.command, Command::Tasks { level: Some(TaskLevel::Expert) }));
        assert_eq!(cli.api_url.as_deref(), Some("http://api"));
    }

    #[test]
    fn task_create_defaults() {
        let cli = Cli::parse_from(["trackitnow", "task-create", "Stretch"]);
        let Command::TaskCreate { level, kind, icon, .. } = cli.command else {
            panic!("expected task-create");
        };
        assert_eq!(level, TaskLevel::Beginner);
        assert_eq!(kind, DEFAULT_TASK_KIND);
        assert_eq!(icon, None);
    }

    #[test]
    fn image_mime_comes_from_the_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("me.JPG");
        std::fs::write(&path, [0xff, 0xd8]).unwrap();

        let file = read_image(&path).unwrap();

        assert_eq!(file.mime, "image/jpeg");
        assert_eq!(file.file_name, "me.JPG");
        assert_eq!(file.bytes, vec![0xff, 0xd8]);
    }
}
