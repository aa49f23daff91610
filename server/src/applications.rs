use crate::{
    db::{constraint_violation, Constraint},
    directory,
    error::{AppError, AppResult},
    model::{new_id, now_millis, Application},
};
use rusqlite::{params, Connection, OptionalExtension};

const COLUMNS: &str =
    "application_id, circle_id, user_owner_id, user_appliment_id, auth, created_at";

fn row_to_application(row: &rusqlite::Row<'_>) -> rusqlite::Result<Application> {
    Ok(Application {
        application_id: row.get(0)?,
        circle_id: row.get(1)?,
        user_owner_id: row.get(2)?,
        user_appliment_id: row.get(3)?,
        auth: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
    })
}

/// File an application of `applicant_id` to `circle_id`.
pub fn apply(conn: &Connection, circle_id: &str, applicant_id: &str) -> AppResult<Application> {
    let circle = directory::find_by_id(conn, circle_id)?.ok_or(AppError::NotFound("Circle"))?;
    let app = Application {
        application_id: new_id(),
        circle_id: circle.id,
        user_owner_id: circle.owner_id,
        user_appliment_id: applicant_id.to_string(),
        auth: false,
        created_at: now_millis(),
    };
    let res = conn.execute(
        &format!("INSERT INTO apply_circles ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, 0, ?5)"),
        params![
            app.application_id,
            app.circle_id,
            app.user_owner_id,
            app.user_appliment_id,
            app.created_at
        ],
    );
    match res {
        Ok(_) => {
            tracing::info!(
                application_id = %app.application_id,
                circle_id = %app.circle_id,
                applicant_id,
                "application submitted"
            );
            Ok(app)
        }
        Err(e) => match constraint_violation(&e) {
            Some(Constraint::Unique) => Err(AppError::conflict("Application already exists")),
            Some(Constraint::ForeignKey) => Err(AppError::validation(
                "user_appliment_id",
                "user_appliment_id does not reference a registered user",
            )),
            None => Err(e.into()),
        },
    }
}

pub fn find_by_id(conn: &Connection, application_id: &str) -> AppResult<Option<Application>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM apply_circles WHERE application_id = ?1"
    ))?;
    Ok(stmt.query_row([application_id], row_to_application).optional()?)
}

pub fn list_for_circle(conn: &Connection, circle_id: &str) -> AppResult<Vec<Application>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM apply_circles WHERE circle_id = ?1 ORDER BY created_at, application_id"
    ))?;
    let apps = stmt
        .query_map([circle_id], row_to_application)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(apps)
}

/// Mark an application as approved. `None` when it does not exist.
pub fn approve(conn: &Connection, application_id: &str) -> AppResult<Option<Application>> {
    let changed = conn.execute(
        "UPDATE apply_circles SET auth = 1 WHERE application_id = ?1",
        [application_id],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    tracing::info!(application_id, "application approved");
    find_by_id(conn, application_id)
}

/// Delete an application. Returns false when it did not exist.
pub fn reject(conn: &Connection, application_id: &str) -> AppResult<bool> {
    let changed = conn.execute(
        "DELETE FROM apply_circles WHERE application_id = ?1",
        [application_id],
    )?;
    if changed > 0 {
        tracing::info!(application_id, "application rejected");
    }
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, users};
    use circle_api::{CreateCircleReq, CreateUserReq};

    fn setup() -> (Connection, String, String) {
        let conn = db::init_db(":memory:").unwrap();
        let owner = users::create(
            &conn,
            &CreateUserReq {
                name: Some("owner".into()),
                password: Some("pw".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let applicant = users::create(
            &conn,
            &CreateUserReq {
                name: Some("applicant".into()),
                password: Some("pw".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let circle = directory::create(
            &conn,
            &CreateCircleReq {
                name: Some("Futsal".into()),
                description: Some("Casual futsal on weekends".into()),
                circle_type: Some("amateur".into()),
                owner_id: Some(owner.id),
                ..Default::default()
            },
        )
        .unwrap();
        (conn, circle.id, applicant.id)
    }

    #[test]
    fn apply_then_duplicate_conflicts() {
        let (conn, circle_id, applicant) = setup();
        let app = apply(&conn, &circle_id, &applicant).unwrap();
        assert!(!app.auth);
        assert!(matches!(
            apply(&conn, &circle_id, &applicant),
            Err(AppError::Conflict(_))
        ));
        assert_eq!(list_for_circle(&conn, &circle_id).unwrap(), vec![app.clone()]);
        assert_eq!(
            users::applicant_ids_for_owner(&conn, &app.user_owner_id).unwrap(),
            vec![applicant]
        );
    }

    #[test]
    fn apply_validates_references() {
        let (conn, circle_id, applicant) = setup();
        assert!(matches!(
            apply(&conn, "missing", &applicant),
            Err(AppError::NotFound("Circle"))
        ));
        assert!(matches!(
            apply(&conn, &circle_id, "ghost"),
            Err(AppError::Validation { field: "user_appliment_id", .. })
        ));
    }

    #[test]
    fn approve_reject_and_cascade() {
        let (conn, circle_id, applicant) = setup();
        let app = apply(&conn, &circle_id, &applicant).unwrap();
        let approved = approve(&conn, &app.application_id).unwrap().unwrap();
        assert!(approved.auth);
        assert_eq!(approve(&conn, "missing").unwrap(), None);

        assert!(reject(&conn, &app.application_id).unwrap());
        assert!(!reject(&conn, &app.application_id).unwrap());

        apply(&conn, &circle_id, &applicant).unwrap();
        directory::delete(&conn, &circle_id).unwrap();
        assert!(list_for_circle(&conn, &circle_id).unwrap().is_empty());
    }
}
