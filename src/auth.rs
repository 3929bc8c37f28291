//! Sign-up, sign-in and the terminal account flows built on the session store.

use tracing::{info, warn};

use crate::api::Transport;
use crate::cell::StateCell;
use crate::errors::{ApiError, ValidationError};
use crate::models::{SignUp, User};
use crate::session::{Session, SessionStore};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Text the user must type to confirm account deletion (any case).
pub const DELETE_CONFIRMATION: &str = "delete";

pub const SIGN_IN_FALLBACK: &str = "Invalid email or password";
pub const SIGN_UP_FALLBACK: &str = "Registration failed";

pub fn validate_sign_up(form: &SignUp) -> Result<(), ValidationError> {
    for (field_name, value) in [
        ("email", &form.email),
        ("username", &form.username),
        ("display_name", &form.display_name),
    ] {
        if value.trim().is_empty() {
            return Err(ValidationError::empty(field_name));
        }
    }
    if !form.email.contains('@') {
        return Err(ValidationError::InvalidEmail { value: form.email.clone() });
    }
    if form.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort { min_length: MIN_PASSWORD_LENGTH });
    }
    Ok(())
}

/// Registers an account. The caller still has to sign in afterwards.
pub async fn sign_up<T, C>(session: &SessionStore<T, C>, form: &SignUp) -> Result<User, ApiError>
where
    T: Transport,
    C: StateCell<Session> + Clone + Send + Sync + 'static,
{
    validate_sign_up(form)?;
    let user = session.api().sign_up(form).await?;
    info!(user_id = user.id, "Account registered");
    Ok(user)
}

/// Exchanges credentials for a token and loads the profile behind it.
/// A rejected sign-in leaves any existing session as it was.
pub async fn sign_in<T, C>(
    session: &SessionStore<T, C>,
    email: &str,
    password: &str,
) -> Result<(), ApiError>
where
    T: Transport,
    C: StateCell<Session> + Clone + Send + Sync + 'static,
{
    if email.trim().is_empty() {
        return Err(ValidationError::empty("email").into());
    }
    if password.is_empty() {
        return Err(ValidationError::empty("password").into());
    }
    let token = session.api().sign_in(email.trim(), password).await?;
    session.set_token(token.access_token).await
}

/// Tells the server, then logs out locally whatever it answered.
pub async fn sign_out<T, C>(session: &SessionStore<T, C>)
where
    T: Transport,
    C: StateCell<Session> + Clone + Send + Sync + 'static,
{
    if let Err(e) = session.api().sign_out().await {
        warn!("Sign-out call failed, logging out locally anyway: {e}");
    }
    session.logout();
}

pub fn check_delete_confirmation(confirmation: &str) -> Result<(), ValidationError> {
    if confirmation.trim().eq_ignore_ascii_case(DELETE_CONFIRMATION) {
        Ok(())
    } else {
        Err(ValidationError::ConfirmationMismatch { expected: DELETE_CONFIRMATION.to_string() })
    }
}

/// Deletes the account once confirmed. Success and failure both end the session;
/// only a confirmation mismatch returns early without a call.
pub async fn delete_account<T, C>(session: &SessionStore<T, C>, confirmation: &str) -> Result<(), ApiError>
where
    T: Transport,
    C: StateCell<Session> + Clone + Send + Sync + 'static,
{
    check_delete_confirmation(confirmation)?;
    match session.api().delete_account().await {
        Ok(_) => info!("Account deleted"),
        Err(e) => warn!("Account deletion failed, logging out anyway: {e}"),
    }
    session.logout();
    Ok(())
}
