//! Profile edits. Every change is a server round trip followed by a fresh
//! profile fetch, so the cached profile always matches the server.

use tracing::info;

use crate::api::{FilePart, Transport};
use crate::cell::StateCell;
use crate::errors::{ApiError, ValidationError};
use crate::models::ProfileUpdate;
use crate::session::{Session, SessionStore};

pub const MAX_BIO_LENGTH: usize = 500;

pub fn validate_update(update: &ProfileUpdate) -> Result<(), ValidationError> {
    for (field_name, value) in [("username", &update.username), ("display_name", &update.display_name)] {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(ValidationError::empty(field_name));
        }
    }
    if let Some(bio) = &update.bio {
        let actual_length = bio.chars().count();
        if actual_length > MAX_BIO_LENGTH {
            return Err(ValidationError::FieldTooLong {
                field_name: "bio".to_string(),
                max_length: MAX_BIO_LENGTH,
                actual_length,
            });
        }
    }
    Ok(())
}

pub async fn update_profile<T, C>(session: &SessionStore<T, C>, update: &ProfileUpdate) -> Result<(), ApiError>
where
    T: Transport,
    C: StateCell<Session> + Clone + Send + Sync + 'static,
{
    validate_update(update)?;
    let user = session.api().update_profile(update).await?;
    info!(user_id = user.id, "Profile updated");
    session.refresh_user().await
}

pub fn validate_avatar(file: &FilePart) -> Result<(), ValidationError> {
    if file.bytes.is_empty() {
        return Err(ValidationError::empty("file"));
    }
    if !file.mime.starts_with("image/") {
        return Err(ValidationError::UnsupportedMedia { mime: file.mime.clone() });
    }
    Ok(())
}

/// Uploads a new avatar and returns its URL once the profile has been refreshed.
pub async fn upload_avatar<T, C>(session: &SessionStore<T, C>, file: FilePart) -> Result<String, ApiError>
where
    T: Transport,
    C: StateCell<Session> + Clone + Send + Sync + 'static,
{
    validate_avatar(&file)?;
    let uploaded = session.api().upload_avatar(file).await?;
    info!(avatar_url = %uploaded.avatar_url, "Avatar uploaded");
    session.refresh_user().await?;
    Ok(uploaded.avatar_url)
}
