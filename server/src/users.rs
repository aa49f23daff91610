use crate::{
    db::{constraint_violation, Constraint},
    error::{AppError, AppResult},
    model::{new_id, now_millis, required, User},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use circle_api::{CreateUserReq, UpdateUserReq};
use rusqlite::{params, Connection, OptionalExtension};

const COLUMNS: &str = "id, name, attribute, age, created_at, updated_at";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        attribute: row.get(2)?,
        age: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn check_age(age: Option<i64>) -> AppResult<Option<i64>> {
    match age {
        Some(a) if a < 0 => Err(AppError::validation(
            "age",
            "age must be a non-negative integer",
        )),
        other => Ok(other),
    }
}

fn clean_attribute(attribute: Option<&str>) -> Option<String> {
    attribute
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
}

/// Argon2id PHC string for a password.
fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("hashing password: {e}")))
}

fn map_unique(e: rusqlite::Error) -> AppError {
    if constraint_violation(&e) == Some(Constraint::Unique) {
        AppError::conflict("a user with the same name already exists")
    } else {
        e.into()
    }
}

/// Insert a user with a caller-chosen id. The password is hashed here.
pub fn insert_with_id(
    conn: &Connection,
    id: &str,
    name: &str,
    attribute: Option<&str>,
    age: Option<i64>,
    password: &str,
) -> AppResult<User> {
    let hash = hash_password(password)?;
    let now = now_millis();
    let user = User {
        id: id.to_string(),
        name: name.to_string(),
        attribute: clean_attribute(attribute),
        age,
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO users (id, name, attribute, age, password, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![user.id, user.name, user.attribute, user.age, hash, now, now],
    )
    .map_err(map_unique)?;
    Ok(user)
}

/// Register a new user.
pub fn create(conn: &Connection, req: &CreateUserReq) -> AppResult<User> {
    let name = required("name", req.name.as_deref())?;
    let password = req
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::validation("password", "password is required"))?;
    let age = check_age(req.age)?;
    let user = insert_with_id(
        conn,
        &new_id(),
        &name,
        req.attribute.as_deref(),
        age,
        password,
    )?;
    tracing::info!(user_id = %user.id, "user registered");
    Ok(user)
}

pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM users WHERE id = ?1"))?;
    Ok(stmt.query_row([id], row_to_user).optional()?)
}

pub fn find_by_name(conn: &Connection, name: &str) -> AppResult<Option<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM users WHERE name = ?1"))?;
    Ok(stmt.query_row([name], row_to_user).optional()?)
}

/// Apply a partial update. `None` when the user does not exist.
pub fn update(conn: &Connection, id: &str, req: &UpdateUserReq) -> AppResult<Option<User>> {
    if req.name.is_none() && req.attribute.is_none() && req.age.is_none() {
        return Err(AppError::validation("body", "No fields provided for update"));
    }
    let Some(mut user) = find_by_id(conn, id)? else {
        return Ok(None);
    };
    if req.name.is_some() {
        user.name = required("name", req.name.as_deref())?;
    }
    if req.attribute.is_some() {
        user.attribute = clean_attribute(req.attribute.as_deref());
    }
    if req.age.is_some() {
        user.age = check_age(req.age)?;
    }
    user.updated_at = now_millis().max(user.updated_at);
    conn.execute(
        "UPDATE users SET name = ?2, attribute = ?3, age = ?4, updated_at = ?5 WHERE id = ?1",
        params![user.id, user.name, user.attribute, user.age, user.updated_at],
    )
    .map_err(map_unique)?;
    Ok(Some(user))
}

/// Look up a user by name and check the password. `None` on any mismatch.
pub fn verify_credentials(conn: &Connection, name: &str, password: &str) -> AppResult<Option<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS}, password FROM users WHERE name = ?1"
    ))?;
    let found = stmt
        .query_row([name], |row| Ok((row_to_user(row)?, row.get::<_, String>(6)?)))
        .optional()?;
    let Some((user, stored)) = found else {
        return Ok(None);
    };
    let Ok(parsed) = PasswordHash::new(&stored) else {
        tracing::warn!(user_id = %user.id, "stored password is not a PHC string");
        return Ok(None);
    };
    let matches = Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok();
    Ok(matches.then_some(user))
}

/// Ids of everyone who applied to a circle owned by `owner_id`.
pub fn applicant_ids_for_owner(conn: &Connection, owner_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_appliment_id FROM apply_circles WHERE user_owner_id = ?1 ORDER BY created_at, application_id",
    )?;
    let ids = stmt
        .query_map([owner_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}
