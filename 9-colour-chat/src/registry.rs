use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{error::AuthError, palette::Colour};

/// Directory of every account created since the process started.
///
/// All state sits behind a single lock and every operation holds it for its
/// whole critical section. At most one session holds the logged-in flag of a
/// given account at any instant.
#[derive(Default)]
pub struct Registry {
    users: Mutex<HashMap<String, User>>,
}

#[derive(Debug, Clone)]
struct User {
    password: String,
    logged_in: bool,
    colour: Colour,
}

impl User {
    fn new(password: &str) -> Self {
        Self {
            password: password.to_string(),
            logged_in: false,
            colour: Colour::default(),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the account for the caller.
    ///
    /// The password is checked before the logged-in flag, so a wrong password
    /// on an active account reports [`AuthError::WrongCredentials`].
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let mut users = self.users.lock().await;
        match users.get_mut(username) {
            Some(user) if user.password == password => {
                if user.logged_in {
                    return Err(AuthError::AlreadyLoggedIn);
                }
                user.logged_in = true;
                info!(user = username, "user logged in");
                Ok(())
            }
            _ => Err(AuthError::WrongCredentials),
        }
    }

    /// Creates a logged-out account with the default colour.
    pub async fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let mut users = self.users.lock().await;
        Self::insert_new(&mut users, username, password).map(|_| ())
    }

    /// Creates the account and claims it for the caller under one lock
    /// acquisition, so no other session can log in between the two steps.
    pub async fn register_and_login(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let mut users = self.users.lock().await;
        let user = Self::insert_new(&mut users, username, password)?;
        user.logged_in = true;
        info!(user = username, "user registered and logged in");
        Ok(())
    }

    fn insert_new<'a>(
        users: &'a mut HashMap<String, User>,
        username: &str,
        password: &str,
    ) -> Result<&'a mut User, AuthError> {
        if users.contains_key(username) {
            return Err(AuthError::DuplicateUsername);
        }
        Ok(users
            .entry(username.to_string())
            .or_insert_with(|| User::new(password)))
    }

    pub async fn logout(&self, username: &str) {
        let mut users = self.users.lock().await;
        match users.get_mut(username) {
            Some(user) => {
                user.logged_in = false;
                info!(user = username, "user logged out");
            }
            None => warn!(user = username, "attempted to log out unknown user"),
        }
    }

    // Reads share the lock with set_colour; a concurrent change may land on
    // either side of this lookup and both outcomes are accepted.
    pub async fn colour(&self, username: &str) -> Option<Colour> {
        self.users.lock().await.get(username).map(|user| user.colour)
    }

    /// Returns `false` when the account does not exist.
    pub async fn set_colour(&self, username: &str, colour: Colour) -> bool {
        let mut users = self.users.lock().await;
        match users.get_mut(username) {
            Some(user) => {
                user.colour = colour;
                true
            }
            None => false,
        }
    }

    /// Snapshot of every known username, logged in or not.
    pub async fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.users.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    #[cfg(test)]
    async fn is_logged_in(&self, username: &str) -> bool {
        self.users
            .lock()
            .await
            .get(username)
            .is_some_and(|user| user.logged_in)
    }

    #[cfg(test)]
    async fn password(&self, username: &str) -> Option<String> {
        self.users
            .lock()
            .await
            .get(username)
            .map(|user| user.password.clone())
    }
}
