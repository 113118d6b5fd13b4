//! User and fridge management: registration, login, ownership checks and the
//! token endpoints built on [`TokenAuthority`].

use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{TokenAuthority, TokenKind};
use crate::db::models::{Fridge, NewFridge, NewUser, OwnerStatistics};
use crate::db::store::Store;
use crate::error::{FridgeError, FridgeResult};

pub const MIN_PASSWORD_LEN: usize = 8;
#[cfg(not(test))]
const PASSWORD_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const PASSWORD_COST: u32 = 4; // bcrypt's minimum cost (bcrypt::MIN_COST is private)

/// bcrypt hash in modular crypt format; the salt is embedded.
pub fn hash_password(password: &str) -> FridgeResult<String> {
    bcrypt::hash(password, PASSWORD_COST).map_err(|e| FridgeError::Storage(format!("password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or_else(|e| {
        warn!("Stored password hash could not be checked: {}", e);
        false
    })
}

fn normalize_email(email: &str) -> FridgeResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(FridgeError::InvalidInput(format!("invalid email address: {:?}", email))),
    }
}

fn check_password(password: &str) -> FridgeResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(FridgeError::InvalidInput(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn check_position(position: &str) -> FridgeResult<&str> {
    let position = position.trim();
    if position.is_empty() {
        return Err(FridgeError::InvalidInput("fridge position must not be empty".to_string()));
    }
    Ok(position)
}

/// How a caller proves access to a fridge's data.
#[derive(Debug, Clone, Copy)]
pub enum Access<'a> {
    /// The device itself.
    Fridge(&'a str),
    /// The owning user, naming the fridge.
    Owner { user_token: &'a str, fridge_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FridgeAccess {
    pub fridge_id: i64,
    /// The token the caller should present from now on.
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredFridge {
    pub fridge_id: i64,
    pub token: String,
}

pub struct Accounts {
    store: Arc<dyn Store>,
    tokens: Arc<TokenAuthority>,
}

impl Accounts {
    pub fn new(store: Arc<dyn Store>, tokens: Arc<TokenAuthority>) -> Self {
        Accounts { store, tokens }
    }

    pub fn register_user(&self, email: &str, password: &str) -> FridgeResult<String> {
        let email = normalize_email(email)?;
        check_password(password)?;
        let user_id = self.store.insert_user(NewUser {
            email: email.clone(),
            password_hash: hash_password(password)?,
        })?;
        info!("Registered user {} <{}>", user_id, email);
        Ok(self.tokens.issue_user_token(user_id))
    }

    pub fn login(&self, email: &str, password: &str) -> FridgeResult<String> {
        let denied = || FridgeError::Unauthorized("invalid email or password".to_string());
        let email = normalize_email(email).map_err(|_| denied())?;
        let user = self.store.find_user_by_email(&email)?.ok_or_else(denied)?;
        if !verify_password(password, &user.password_hash) {
            warn!("Failed login for user {}", user.id);
            return Err(denied());
        }
        Ok(self.tokens.issue_user_token(user.id))
    }

    /// Validates a user token whose user still exists.
    fn user_id(&self, user_token: &str) -> FridgeResult<i64> {
        let user_id = self.tokens.validate(user_token, TokenKind::User)?.subject_id;
        match self.store.find_user(user_id)? {
            Some(_) => Ok(user_id),
            None => Err(FridgeError::Unauthorized(format!("user {} no longer exists", user_id))),
        }
    }

    /// Returns the token to keep using; refreshed when close to or past expiry.
    pub fn is_authorized_user(&self, user_token: &str) -> FridgeResult<String> {
        self.user_id(user_token)?;
        self.tokens.is_authorized(user_token, TokenKind::User)
    }

    pub fn renew_user(&self, user_token: &str) -> FridgeResult<String> {
        self.user_id(user_token)?;
        self.tokens.renew(user_token, TokenKind::User)
    }

    pub fn change_password(&self, user_token: &str, old_password: &str, new_password: &str) -> FridgeResult<()> {
        let user_id = self.user_id(user_token)?;
        check_password(new_password)?;
        let user = self
            .store
            .find_user(user_id)?
            .ok_or_else(|| FridgeError::NotFound(format!("user {}", user_id)))?;
        if !verify_password(old_password, &user.password_hash) {
            return Err(FridgeError::Unauthorized("current password does not match".to_string()));
        }
        self.store.update_password(user_id, &hash_password(new_password)?)?;
        info!("Password changed for user {}", user_id);
        Ok(())
    }

    /// Removes the user; their fridges stay registered without an owner.
    pub fn delete_account(&self, user_token: &str) -> FridgeResult<()> {
        let user_id = self.user_id(user_token)?;
        self.store.delete_user(user_id)?;
        info!("Deleted user {}", user_id);
        Ok(())
    }

    pub fn register_fridge(&self, user_token: &str, position: &str) -> FridgeResult<RegisteredFridge> {
        let user_id = self.tokens.validate(user_token, TokenKind::User)?.subject_id;
        let position = check_position(position)?;
        if self.store.find_user(user_id)?.is_none() {
            return Err(FridgeError::NotFound(format!("user {}", user_id)));
        }
        let fridge_id = self.store.insert_fridge(NewFridge {
            owner_user_id: Some(user_id),
            position: position.to_string(),
        })?;
        info!("Registered fridge {} at {:?} for user {}", fridge_id, position, user_id);
        Ok(RegisteredFridge {
            fridge_id,
            token: self.tokens.issue_fridge_token(fridge_id),
        })
    }

    pub fn is_authorized_fridge(&self, fridge_token: &str) -> FridgeResult<String> {
        let fridge_id = self.tokens.validate(fridge_token, TokenKind::Fridge)?.subject_id;
        if self.store.find_fridge(fridge_id)?.is_none() {
            return Err(FridgeError::Unauthorized(format!("fridge {} no longer exists", fridge_id)));
        }
        self.tokens.is_authorized(fridge_token, TokenKind::Fridge)
    }

    /// Issues a new fridge token on behalf of the fridge's current owner.
    pub fn renew_fridge(&self, user_token: &str, fridge_id: i64) -> FridgeResult<String> {
        let user_id = self.tokens.validate(user_token, TokenKind::User)?.subject_id;
        self.owned_fridge(user_id, fridge_id)?;
        info!("Renewed token of fridge {} for user {}", fridge_id, user_id);
        Ok(self.tokens.issue_fridge_token(fridge_id))
    }

    fn owned_fridge(&self, user_id: i64, fridge_id: i64) -> FridgeResult<Fridge> {
        let fridge = self
            .store
            .find_fridge(fridge_id)?
            .ok_or_else(|| FridgeError::NotFound(format!("fridge {}", fridge_id)))?;
        if fridge.owner_user_id != Some(user_id) {
            warn!("User {} is not the owner of fridge {}", user_id, fridge_id);
            return Err(FridgeError::Forbidden(format!(
                "fridge {} is not owned by user {}",
                fridge_id, user_id
            )));
        }
        Ok(fridge)
    }

    pub fn list_fridges(&self, user_token: &str) -> FridgeResult<Vec<Fridge>> {
        let user_id = self.user_id(user_token)?;
        self.store.fridges_by_owner(user_id)
    }

    pub fn fridge_info(&self, user_token: &str, fridge_id: i64) -> FridgeResult<Fridge> {
        self.owned_fridge(self.user_id(user_token)?, fridge_id)
    }

    pub fn rename_fridge(&self, user_token: &str, fridge_id: i64, position: &str) -> FridgeResult<()> {
        let position = check_position(position)?;
        self.owned_fridge(self.user_id(user_token)?, fridge_id)?;
        self.store.update_fridge_position(fridge_id, position)?;
        Ok(())
    }

    pub fn delete_fridge(&self, user_token: &str, fridge_id: i64) -> FridgeResult<()> {
        let user_id = self.user_id(user_token)?;
        self.owned_fridge(user_id, fridge_id)?;
        self.store.delete_fridge(fridge_id)?;
        info!("Deleted fridge {} of user {}", fridge_id, user_id);
        Ok(())
    }

    /// Resolves either credential form to the fridge it grants access to.
    pub fn authorize_fridge(&self, access: Access<'_>) -> FridgeResult<FridgeAccess> {
        match access {
            Access::Fridge(token) => {
                let fridge_id = self.tokens.validate(token, TokenKind::Fridge)?.subject_id;
                let token = self.is_authorized_fridge(token)?;
                Ok(FridgeAccess { fridge_id, token })
            }
            Access::Owner { user_token, fridge_id } => {
                let user_id = self.user_id(user_token)?;
                self.owned_fridge(user_id, fridge_id)?;
                let token = self.tokens.is_authorized(user_token, TokenKind::User)?;
                Ok(FridgeAccess { fridge_id, token })
            }
        }
    }

    pub fn user_statistics(&self, user_token: &str) -> FridgeResult<OwnerStatistics> {
        let user_id = self.user_id(user_token)?;
        self.store.owner_statistics(user_id)
    }
}
