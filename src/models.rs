use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Users ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_url: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

impl User {
    /// First letter of the display name, upper-cased, for avatar placeholders.
    pub fn initial(&self) -> String {
        initial_of(&self.display_name)
    }
}

/// Server-owned profile: the user record plus stats computed by the API.
/// Missing stats fall back to zero (rank to 999) so a partial payload still renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    #[serde(default)]
    pub total_points: i64,
    #[serde(default)]
    pub streak: i64,
    #[serde(default = "default_rank")]
    pub rank: i64,
    #[serde(default)]
    pub friends_count: i64,
    #[serde(default)]
    pub total_tasks: i64,
    #[serde(default)]
    pub completed_tasks: i64,
}

fn default_rank() -> i64 {
    999
}

impl Profile {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    /// Percentage of assigned tasks marked done, 0 when nothing is assigned.
    pub fn completion_rate(&self) -> u32 {
        crate::progress::progress_percent(self.completed_tasks, self.total_tasks)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignUp {
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub password: String,
}

/// Partial profile update. Only the fields that are `Some` are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_url: Option<String>,
}

impl ProfileUpdate {
    /// Prefills an edit form with every editable field of `user`.
    pub fn from_user(user: &User) -> Self {
        Self {
            username: Some(user.username.clone()),
            display_name: Some(user.display_name.clone()),
            bio: Some(user.bio.clone().unwrap_or_default()),
            location: Some(user.location.clone().unwrap_or_default()),
            github_url: Some(user.github_url.clone().unwrap_or_default()),
            linkedin_url: Some(user.linkedin_url.clone().unwrap_or_default()),
            twitter_url: Some(user.twitter_url.clone().unwrap_or_default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &ProfileUpdate::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AvatarUpload {
    pub avatar_url: String,
}

// ── Tasks ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskLevel {
    #[default]
    Beginner,
    Intermediate,
    Expert,
}

impl TaskLevel {
    pub const ALL: [TaskLevel; 3] = [TaskLevel::Beginner, TaskLevel::Intermediate, TaskLevel::Expert];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskLevel::Beginner => "beginner",
            TaskLevel::Intermediate => "intermediate",
            TaskLevel::Expert => "expert",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskLevel::Beginner => "Beginner",
            TaskLevel::Intermediate => "Intermediate",
            TaskLevel::Expert => "Expert",
        }
    }
}

impl fmt::Display for TaskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beginner" => Ok(TaskLevel::Beginner),
            "intermediate" => Ok(TaskLevel::Intermediate),
            "expert" => Ok(TaskLevel::Expert),
            other => Err(format!("Unknown task level: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Progress,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Progress => "progress",
            TaskStatus::Done => "done",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Progress => "In Progress",
            TaskStatus::Done => "Done",
        }
    }

    /// Statuses the user may move a task to from this one. `Done` is final.
    pub fn transitions(&self) -> &'static [TaskStatus] {
        match self {
            TaskStatus::Pending => &[TaskStatus::Progress],
            TaskStatus::Progress => &[TaskStatus::Done, TaskStatus::Pending],
            TaskStatus::Done => &[],
        }
    }

    pub fn can_move_to(&self, next: TaskStatus) -> bool {
        self.transitions().contains(&next)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "progress" => Ok(TaskStatus::Progress),
            "done" => Ok(TaskStatus::Done),
            other => Err(format!("Unknown task status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub level: TaskLevel,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskCreate {
    pub title: String,
    pub description: String,
    pub level: TaskLevel,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskStatusUpdate {
    pub status: TaskStatus,
}

// ── Friends ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friend {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Friend {
    pub fn initial(&self) -> String {
        initial_of(&self.display_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: i64,
    pub user_id: i64,
    pub friend_id: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Friend>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FriendRequestCreate {
    pub user_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendRequestAction {
    Accept,
    Decline,
}

impl FriendRequestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendRequestAction::Accept => "accept",
            FriendRequestAction::Decline => "decline",
        }
    }
}

// ── Chats ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageCreate {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub friend: Friend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    #[serde(default)]
    pub unread_count: u32,
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_earned: bool,
}

/// Completed-task counts keyed by ISO date (`YYYY-MM-DD`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityData {
    #[serde(default)]
    pub activity: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyGoal {
    pub id: i64,
    pub title: String,
    pub current: i64,
    pub total: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub color: String,
}

impl WeeklyGoal {
    pub fn percent(&self) -> u32 {
        crate::progress::progress_percent(self.current, self.total)
    }
}

// ── Envelopes ────────────────────────────────────────────────────────────────

/// Plain `{ "message": ... }` acknowledgement returned by mutation endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: String,
}

/// FastAPI error envelope. `detail` is a string for handled errors and a list of
/// field errors for request validation failures.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub detail: serde_json::Value,
}

impl ApiErrorBody {
    pub fn message(&self) -> Option<String> {
        match &self.detail {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => items
                .first()
                .and_then(|item| item.get("msg"))
                .and_then(|msg| msg.as_str())
                .map(str::to_string),
            _ => None,
        }
    }
}

fn initial_of(name: &str) -> String {
    name.chars().next().map(|c| c.to_uppercase().collect()).unwrap_or_default()
}
