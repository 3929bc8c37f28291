//! Task board: level tabs, the task of the day, optimistic status changes and
//! custom task creation.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, Transport};
use crate::cell::{Shared, StateCell};
use crate::errors::ValidationError;
use crate::models::{Task, TaskCreate, TaskLevel, TaskStatus};
use crate::optimistic::{reconcile, Optimistic, TempIds};

pub const DEFAULT_TASK_KIND: &str = "Fitness";
pub const DEFAULT_TASK_ICON: &str = "📝";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskBoard {
    pub tasks: Vec<Optimistic<Task>>,
    pub selected_level: TaskLevel,
    pub open_task: Option<i64>,
    /// Set while a create call is in flight; gates duplicate submissions.
    pub creating: bool,
}

impl Default for TaskBoard {
    fn default() -> Self {
        Self {
            tasks: starter_tasks().into_iter().map(Optimistic::from).collect(),
            selected_level: TaskLevel::default(),
            open_task: None,
            creating: false,
        }
    }
}

impl TaskBoard {
    pub fn task(&self, id: i64) -> Option<&Task> {
        self.tasks.iter().map(Optimistic::value).find(|task| task.id == id)
    }

    /// Tasks under the selected level tab, in list order.
    pub fn filtered(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .map(Optimistic::value)
            .filter(|task| task.level == self.selected_level)
            .collect()
    }

    pub fn open(&self) -> Option<&Task> {
        self.open_task.and_then(|id| self.task(id))
    }

    pub fn task_of_the_day(&self, today: NaiveDate) -> Option<&Task> {
        let index = day_index(today, self.tasks.len())?;
        self.tasks.get(index).map(Optimistic::value)
    }
}

/// Index of the day's featured task: the character codes of the date written
/// as `Wed Oct 14 2026`, summed, modulo `len`. `None` for an empty list.
pub fn day_index(date: NaiveDate, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let hash: u64 = date.format("%a %b %d %Y").to_string().chars().map(u64::from).sum();
    usize::try_from(hash % len as u64).ok()
}

pub fn task_of_the_day(date: NaiveDate, tasks: &[Task]) -> Option<&Task> {
    day_index(date, tasks.len()).and_then(|index| tasks.get(index))
}

/// Built-in catalog shown until (and unless) the server returns real tasks.
pub fn starter_tasks() -> Vec<Task> {
    use TaskLevel::{Beginner, Expert, Intermediate};

    let catalog: [(&str, &str, TaskLevel, &str, &str); 12] = [
        ("Run 2km", "Complete a 2km run at your own pace.", Beginner, "Fitness", "🏃"),
        ("10 Pushups", "Do 10 pushups in one set.", Beginner, "Fitness", "💪"),
        ("Read 10 minutes", "Read a book or article for 10 minutes.", Beginner, "Learning", "📖"),
        ("Drink 8 glasses of water", "Stay hydrated throughout the day.", Beginner, "Health", "💧"),
        ("Solve 3 DSA problems", "Solve 3 data structure or algorithm problems.", Beginner, "Coding", "🧩"),
        ("Run 5km", "Complete a 5km run.", Intermediate, "Fitness", "🏃"),
        ("50 Pushups", "Complete 50 pushups in sets.", Intermediate, "Fitness", "💪"),
        ("30 min study session", "Focused study or practice for 30 minutes.", Intermediate, "Learning", "📚"),
        ("Solve 5 medium problems", "Solve 5 LeetCode-style medium problems.", Intermediate, "Coding", "⚡"),
        ("10km run", "Complete a 10km run.", Expert, "Fitness", "🏃"),
        ("100 pushups", "Complete 100 pushups in a day.", Expert, "Fitness", "💪"),
        ("Solve 1 hard problem", "Solve one hard DSA/LeetCode problem.", Expert, "Coding", "🔥"),
    ];

    catalog
        .into_iter()
        .zip(1..)
        .map(|((title, description, level, kind, icon), id)| Task {
            id,
            title: title.to_string(),
            description: description.to_string(),
            level,
            kind: kind.to_string(),
            icon: icon.to_string(),
            user_id: None,
            created_at: String::new(),
            status: TaskStatus::Pending,
        })
        .collect()
}

pub struct TaskController<T, C = Shared<TaskBoard>> {
    api: ApiClient<T>,
    cell: C,
    ids: Arc<TempIds>,
}

impl<T, C: Clone> Clone for TaskController<T, C> {
    fn clone(&self) -> Self {
        Self { api: self.api.clone(), cell: self.cell.clone(), ids: Arc::clone(&self.ids) }
    }
}

impl<T: Transport, C: StateCell<TaskBoard>> TaskController<T, C> {
    pub fn new(api: ApiClient<T>, cell: C) -> Self {
        Self { api, cell, ids: Arc::new(TempIds::new()) }
    }

    pub fn cell(&self) -> &C {
        &self.cell
    }

    pub fn select_level(&self, level: TaskLevel) {
        self.cell.update(|board| board.selected_level = level);
    }

    pub fn open_task(&self, id: Option<i64>) {
        self.cell.update(|board| board.open_task = id);
    }

    /// Replaces the board with the server's tasks. An empty or failed response
    /// keeps whatever is shown (the starter catalog on first load).
    pub async fn load(&self, level: Option<TaskLevel>) {
        match self.api.tasks(level).await {
            Ok(tasks) if tasks.is_empty() => debug!("Server returned no tasks, keeping the current list"),
            Ok(tasks) => {
                info!(count = tasks.len(), "Tasks loaded");
                self.cell.update(|board| {
                    board.tasks = tasks.into_iter().map(Optimistic::from).collect();
                });
            }
            Err(e) => warn!("Failed to load tasks, keeping the current list: {e}"),
        }
    }

    /// Flips the status locally, then tells the server. The local status stays
    /// even if the call fails. Returns `false` for an unknown task.
    pub async fn set_status(&self, task_id: i64, status: TaskStatus) -> bool {
        let found = self
            .cell
            .update(|board| {
                let mut found = false;
                for task in board.tasks.iter_mut().map(Optimistic::value_mut) {
                    if task.id == task_id {
                        task.status = status;
                        found = true;
                    }
                }
                found
            })
            .unwrap_or(false);
        if !found {
            return false;
        }

        match self.api.update_task_status(task_id, status).await {
            Ok(_) => debug!(task_id, %status, "Task status saved"),
            Err(e) => warn!(task_id, %status, "Task status kept locally only: {e}"),
        }
        true
    }

    /// Adds a provisional task immediately and swaps in the server's record when
    /// it arrives. Returns `Ok(false)` when another create is still in flight.
    pub async fn create(&self, form: TaskCreate) -> Result<bool, ValidationError> {
        if form.title.trim().is_empty() {
            return Err(ValidationError::empty("title"));
        }

        let key = self.ids.next();
        let provisional = Task {
            id: key,
            title: form.title.trim().to_string(),
            description: form.description.clone(),
            level: form.level,
            kind: form.kind.clone(),
            icon: form.icon.clone().unwrap_or_else(|| DEFAULT_TASK_ICON.to_string()),
            user_id: None,
            created_at: Utc::now().to_rfc3339(),
            status: TaskStatus::Pending,
        };

        let started = self
            .cell
            .update(|board| {
                if board.creating {
                    return false;
                }
                board.creating = true;
                board.tasks.push(Optimistic::pending(key, provisional));
                true
            })
            .unwrap_or(false);
        if !started {
            return Ok(false);
        }

        let form = TaskCreate { title: form.title.trim().to_string(), ..form };
        let outcome = self.api.create_task(&form).await;
        self.cell.update(|board| {
            board.creating = false;
            match outcome {
                Ok(task) => {
                    info!(task_id = task.id, "Task created");
                    reconcile(&mut board.tasks, key, task);
                }
                Err(e) => warn!("Task kept locally only: {e}"),
            }
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::pin::pin;

    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::api::{Method, RequestBody};
    use crate::testing::{api, FakeTransport, Reply};

    fn controller(fake: &FakeTransport) -> TaskController<FakeTransport> {
        TaskController::new(api(fake, Some("tok")), Shared::new(TaskBoard::default()))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn form(title: &str) -> TaskCreate {
        TaskCreate {
            title: title.into(),
            description: "Hold each stretch for 30 seconds".into(),
            level: TaskLevel::Intermediate,
            kind: "Health".into(),
            icon: None,
        }
    }

    fn task_json(id: i64, title: &str) -> serde_json::Value {
        json!({ "id": id, "title": title, "description": "", "level": "expert", "type": "Coding", "icon": "🔥", "status": "pending" })
    }

    #[test]
    fn day_index_hashes_the_date_string() {
        // "Wed Oct 14 2026"
        let expected: u64 = "Wed Oct 14 2026".chars().map(u64::from).sum();
        assert_eq!(day_index(date(2026, 10, 14), 12), Some((expected % 12) as usize));
        assert_eq!(day_index(date(2026, 10, 14), 0), None);
    }

    #[test]
    fn task_of_the_day_picks_from_the_whole_board() {
        let board = TaskBoard::default();
        let tasks = starter_tasks();
        let today = date(2026, 10, 14);

        assert_eq!(board.task_of_the_day(today), task_of_the_day(today, &tasks));
        assert!(task_of_the_day(today, &[]).is_none());
    }

    #[test]
    fn starter_catalog_covers_every_level() {
        let tasks = starter_tasks();
        assert_eq!(tasks.len(), 12);
        for level in TaskLevel::ALL {
            assert!(tasks.iter().any(|t| t.level == level));
        }
        assert_eq!(TaskBoard::default().filtered().len(), 5);
    }

    proptest! {
        #[test]
        fn task_of_the_day_is_pure(days in 0i64..20_000, len in 1usize..40) {
            let day = date(1990, 1, 1) + chrono::Duration::days(days);
            let tasks: Vec<Task> = starter_tasks().into_iter().cycle().take(len).collect();

            let first = task_of_the_day(day, &tasks).map(|t| t.id);
            let second = task_of_the_day(day, &tasks).map(|t| t.id);
            prop_assert_eq!(first, second);

            let index = day_index(day, len).unwrap();
            prop_assert!(index < len);
            let wider = day_index(day, len + 1).unwrap();
            let hash: u64 = day.format("%a %b %d %Y").to_string().chars().map(u64::from).sum();
            prop_assert_eq!(wider as u64, hash % (len as u64 + 1));
        }
    }

    #[tokio::test]
    async fn failed_or_empty_load_keeps_the_catalog() {
        let fake = FakeTransport::new();
        fake.once(Method::Get, "/api/tasks", Reply::NetworkDown);
        fake.once(Method::Get, "/api/tasks", Reply::json(200, json!([])));
        let tasks = controller(&fake);

        tasks.load(None).await;
        tasks.load(None).await;

        assert_eq!(tasks.cell().get(), TaskBoard::default());
    }

    #[tokio::test]
    async fn load_replaces_the_catalog() {
        let fake = FakeTransport::new();
        fake.on(Method::Get, "/api/tasks", Reply::json(200, json!([task_json(40, "Ship it")])));
        let tasks = controller(&fake);

        tasks.load(None).await;

        let board = tasks.cell().get();
        assert_eq!(board.tasks.len(), 1);
        assert_eq!(board.task(40).unwrap().title, "Ship it");
    }

    #[tokio::test]
    async fn status_change_is_optimistic_and_survives_failure() {
        let fake = FakeTransport::new();
        fake.on(Method::Put, "/api/tasks/3/status", Reply::status(500));
        let tasks = controller(&fake);

        assert!(tasks.set_status(3, TaskStatus::Progress).await);

        assert_eq!(tasks.cell().get().task(3).unwrap().status, TaskStatus::Progress);
        let call = &fake.calls_to(Method::Put, "/api/tasks/3/status")[0];
        assert_eq!(call.body, RequestBody::Json(json!({ "status": "progress" })));
    }

    #[tokio::test]
    async fn status_change_for_unknown_task_is_skipped() {
        let fake = FakeTransport::new();
        let tasks = controller(&fake);

        assert!(!tasks.set_status(999, TaskStatus::Done).await);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn create_reconciles_the_provisional_task() {
        let fake = FakeTransport::new();
        fake.on(Method::Post, "/api/tasks", Reply::json(200, task_json(77, "Stretch")));
        let tasks = controller(&fake);

        assert!(tasks.create(form("  Stretch ")).await.unwrap());

        let board = tasks.cell().get();
        assert_eq!(board.tasks.len(), 13);
        assert!(!board.creating);
        let last = board.tasks.last().unwrap();
        assert!(!last.is_pending());
        assert_eq!(last.value().id, 77);
        let call = fake.last_call().unwrap();
        assert!(matches!(&call.body, RequestBody::Json(body) if body["title"] == "Stretch"));
    }

    #[tokio::test]
    async fn failed_create_keeps_the_local_task() {
        let fake = FakeTransport::new();
        fake.on(Method::Post, "/api/tasks", Reply::NetworkDown);
        let tasks = controller(&fake);

        tasks.create(form("Stretch")).await.unwrap();

        let board = tasks.cell().get();
        let last = board.tasks.last().unwrap();
        assert!(last.is_pending());
        assert_eq!(last.value().icon, DEFAULT_TASK_ICON);
        assert_eq!(last.value().status, TaskStatus::Pending);
        assert!(!board.creating);
    }

    #[tokio::test]
    async fn blank_title_is_rejected_before_any_change() {
        let fake = FakeTransport::new();
        let tasks = controller(&fake);

        assert_eq!(tasks.create(form("   ")).await, Err(ValidationError::empty("title")));
        assert_eq!(tasks.cell().get(), TaskBoard::default());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn second_create_is_gated_while_the_first_is_in_flight() {
        let fake = FakeTransport::new();
        fake.on(Method::Post, "/api/tasks", Reply::Hang);
        let tasks = controller(&fake);

        let mut first = pin!(tasks.create(form("First")));
        assert!(futures_util::poll!(first.as_mut()).is_pending());

        assert_eq!(tasks.create(form("Second")).await, Ok(false));
        let board = tasks.cell().get();
        assert!(board.creating);
        assert_eq!(board.tasks.len(), 13);
        assert_eq!(fake.calls_to(Method::Post, "/api/tasks").len(), 1);
    }
}
