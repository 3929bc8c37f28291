pub mod auth;
pub mod chats;
pub mod dashboard;
pub mod layout;
pub mod search;
pub mod settings;
pub mod tasks;
