use parley_types::api::NewUser;
use parley_types::models::{StoreStats, User};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{USER_COLUMNS, format_timestamp, now, user_from_row};
use crate::Database;

const MAX_USERNAME_LEN: usize = 150;

impl Database {
    // -- Users --

    pub fn create_user(&self, req: &NewUser) -> Result<User> {
        let username = req.username.trim();
        let email = req.email.trim().to_lowercase();
        validate_user(username, &email)?;

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email,
            created_at: now(),
        };

        self.atomic("create user", |tx| {
            let taken: Option<String> = tx
                .query_row(
                    "SELECT username FROM users WHERE username = ?1 OR email = ?2",
                    (&user.username, &user.email),
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing) = taken {
                let field = if existing == user.username { "username" } else { "email" };
                return Err(Error::Conflict(format!("{} already registered", field)));
            }

            tx.execute(
                "INSERT INTO users (id, username, email, created_at) VALUES (?1, ?2, ?3, ?4)",
                (
                    user.id.to_string(),
                    &user.username,
                    &user.email,
                    format_timestamp(&user.created_at),
                ),
            )?;
            Ok(())
        })?;

        debug!(user_id = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    pub fn get_user(&self, id: Uuid) -> Result<User> {
        self.with_conn(|conn| query_user(conn, id))?
            .ok_or_else(|| Error::not_found("user", id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS);
            Ok(conn.query_row(&sql, [username], user_from_row).optional()?)
        })
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64> {
                let sql = format!("SELECT COUNT(*) FROM {}", table);
                let n: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
                Ok(n as u64)
            };
            Ok(StoreStats {
                users: count("users")?,
                messages: count("messages")?,
                histories: count("message_history")?,
                notifications: count("notifications")?,
            })
        })
    }
}

fn validate_user(username: &str, email: &str) -> Result<()> {
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(Error::Validation(format!(
            "username must be 1 to {} characters",
            MAX_USERNAME_LEN
        )));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(Error::Validation(format!("malformed email: {}", email))),
    }
}

pub(crate) fn query_user(conn: &Connection, id: Uuid) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    Ok(conn
        .query_row(&sql, [id.to_string()], user_from_row)
        .optional()?)
}

pub(crate) fn user_exists(conn: &Connection, id: Uuid) -> Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", [id.to_string()], |_| Ok(()))
        .optional()?
        .is_some())
}
