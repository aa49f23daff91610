use crate::{
    directory,
    error::AppResult,
    model::{now_millis, Circle, CircleType},
    users,
};
use rusqlite::Connection;

const OWNER_ID: &str = "user-000";

// (id, name, attribute, password)
const USERS: [(&str, &str, &str, &str); 4] = [
    ("user-000", "test_user", "student", "password123"),
    ("user-001", "user001", "student", "password123"),
    ("user-002", "user002", "professional", "password123"),
    ("user-003", "admin", "student", "admin123"),
];

struct SampleCircle {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    circle_type: CircleType,
    tags: &'static [&'static str],
    location: &'static str,
    active_days: &'static [&'static str],
}

const CIRCLES: [SampleCircle; 3] = [
    SampleCircle {
        id: "circle-001",
        name: "Futsal Lovers",
        description: "Casual futsal every weekend. Beginners are very welcome!",
        circle_type: CircleType::Amateur,
        tags: &["sports", "futsal"],
        location: "City Gym",
        active_days: &["Saturday", "Sunday"],
    },
    SampleCircle {
        id: "circle-002",
        name: "Badminton Circle",
        description: "We play fairly seriously and enter the regional league.",
        circle_type: CircleType::University,
        tags: &["sports", "badminton"],
        location: "Campus Hall B",
        active_days: &["Tuesday", "Thursday"],
    },
    SampleCircle {
        id: "circle-003",
        name: "Chess Club",
        description: "Weekly chess meetups for all levels, boards provided.",
        circle_type: CircleType::University,
        tags: &["games"],
        location: "Library Room 2",
        active_days: &["Wednesday"],
    },
];

/// Insert the development fixtures into an empty directory.
///
/// Returns `false` without touching anything when circles already exist.
/// Fixture users whose id or name is already taken are left alone; the
/// circles then belong to whoever holds the owner's name.
pub fn seed_sample_data(conn: &Connection) -> AppResult<bool> {
    let tx = conn.unchecked_transaction()?;
    if directory::count(&tx)? > 0 {
        return Ok(false);
    }
    let mut owner_id = OWNER_ID.to_string();
    let mut added = 0;
    for (id, name, attribute, password) in USERS {
        if let Some(existing) = users::find_by_name(&tx, name)? {
            if id == OWNER_ID {
                owner_id = existing.id;
            }
            continue;
        }
        if users::find_by_id(&tx, id)?.is_some() {
            continue;
        }
        users::insert_with_id(&tx, id, name, Some(attribute), None, password)?;
        added += 1;
    }
    let now = now_millis();
    for c in &CIRCLES {
        directory::insert(
            &tx,
            &Circle {
                id: c.id.into(),
                name: c.name.into(),
                description: c.description.into(),
                circle_type: c.circle_type,
                tags: c.tags.iter().map(|t| t.to_string()).collect(),
                members_count: 1,
                location: c.location.into(),
                active_days: c.active_days.iter().map(|d| d.to_string()).collect(),
                owner_id: owner_id.clone(),
                created_at: now,
                updated_at: now,
            },
        )?;
    }
    tx.commit()?;
    tracing::info!(
        users = added,
        circles = CIRCLES.len(),
        %owner_id,
        "seeded sample data"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn seeds_once() {
        let conn = db::init_db(":memory:").unwrap();
        assert!(seed_sample_data(&conn).unwrap());
        assert_eq!(directory::count(&conn).unwrap(), CIRCLES.len() as u64);
        assert!(!seed_sample_data(&conn).unwrap());
        assert_eq!(directory::count(&conn).unwrap(), CIRCLES.len() as u64);

        let circle = directory::find_by_id(&conn, "circle-001").unwrap().unwrap();
        assert_eq!(circle.owner_id, OWNER_ID);
        assert!(users::verify_credentials(&conn, "admin", "admin123")
            .unwrap()
            .is_some());
    }

    #[test]
    fn keeps_existing_users() {
        let conn = db::init_db(":memory:").unwrap();
        users::insert_with_id(&conn, "user-001", "user001", None, Some(40), "other").unwrap();
        assert!(seed_sample_data(&conn).unwrap());
        let kept = users::find_by_id(&conn, "user-001").unwrap().unwrap();
        assert_eq!(kept.age, Some(40));
    }

    #[test]
    fn taken_owner_name_does_not_stop_seeding() {
        let conn = db::init_db(":memory:").unwrap();
        let mine =
            users::insert_with_id(&conn, "someone-else", "test_user", None, None, "mine").unwrap();
        assert!(seed_sample_data(&conn).unwrap());

        assert!(users::find_by_id(&conn, OWNER_ID).unwrap().is_none());
        let circle = directory::find_by_id(&conn, "circle-001").unwrap().unwrap();
        assert_eq!(circle.owner_id, mine.id);
        assert!(users::verify_credentials(&conn, "test_user", "mine")
            .unwrap()
            .is_some());
        assert!(users::find_by_id(&conn, "user-003").unwrap().is_some());
    }

    #[test]
    fn failed_seed_leaves_nothing_behind() {
        let conn = db::init_db(":memory:").unwrap();
        // reject one fixture circle partway through
        conn.execute_batch(
            "CREATE TRIGGER no_badminton BEFORE INSERT ON circles
             WHEN NEW.id = 'circle-002'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();
        assert!(seed_sample_data(&conn).is_err());
        assert_eq!(directory::count(&conn).unwrap(), 0);
        assert!(users::find_by_id(&conn, OWNER_ID).unwrap().is_none());
    }
}
