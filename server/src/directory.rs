use crate::{
    db::{constraint_violation, Constraint},
    error::{AppError, AppResult},
    model::{check_id, new_id, now_millis, required, Circle, CircleType},
};
use circle_api::{CirclePage, CreateCircleReq};
use rusqlite::{params, types::Type, Connection, OptionalExtension};

pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Normalized listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CircleQuery {
    pub offset: u64,
    pub limit: u64,
    pub circle_type: Option<CircleType>,
    pub tag: Option<String>,
}

/// Parse an integer, saturating values too long to represent.
fn parse_saturating(raw: &str) -> Option<i128> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i128>() {
        return Some(n);
    }
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(if negative { i128::MIN } else { i128::MAX })
}

impl CircleQuery {
    /// Build a query from raw request parameters. Unparsable numbers fall back
    /// to the defaults, parsed ones are clamped (`offset >= 0`, `1 <= limit <= 100`).
    pub fn from_params(
        offset: Option<&str>,
        limit: Option<&str>,
        circle_type: Option<&str>,
        tag: Option<&str>,
    ) -> AppResult<Self> {
        let offset = offset
            .and_then(parse_saturating)
            .map(|o| o.clamp(0, u64::MAX as i128) as u64)
            .unwrap_or(0);
        let limit = limit
            .and_then(parse_saturating)
            .map(|l| l.clamp(1, MAX_LIMIT as i128) as u64)
            .unwrap_or(DEFAULT_LIMIT);
        let circle_type = match circle_type.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => Some(
                t.parse::<CircleType>()
                    .map_err(|_| AppError::validation("type", "type must be university or amateur"))?,
            ),
            None => None,
        };
        let tag = tag
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Ok(Self {
            offset,
            limit,
            circle_type,
            tag,
        })
    }
}

fn row_to_circle(row: &rusqlite::Row<'_>) -> rusqlite::Result<Circle> {
    let circle_type: String = row.get(3)?;
    let tags: String = row.get(4)?;
    let active_days: String = row.get(7)?;
    Ok(Circle {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        circle_type: circle_type
            .parse()
            .map_err(|e: anyhow::Error| {
                rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
            })?,
        tags: serde_json::from_str(&tags)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        members_count: row.get(5)?,
        location: row.get(6)?,
        active_days: serde_json::from_str(&active_days)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?,
        owner_id: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

const COLUMNS: &str = "id, name, description, circle_type, tags, members_count, location, active_days, owner_id, created_at, updated_at";

fn tag_matches(circle: &Circle, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    circle
        .tags
        .iter()
        .any(|t| t.to_lowercase().contains(&needle))
}

/// List circles in insertion order, filtered, and clipped to the requested page.
pub fn list(conn: &Connection, query: &CircleQuery) -> AppResult<CirclePage> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM circles WHERE (?1 IS NULL OR circle_type = ?1) ORDER BY seq"
    ))?;
    let rows = stmt.query_map(
        params![query.circle_type.map(|t| t.as_str())],
        row_to_circle,
    )?;
    let start = query.offset;
    let end = query.offset.saturating_add(query.limit);
    let mut total = 0u64;
    let mut data = Vec::new();
    for circle in rows {
        let circle = circle?;
        if let Some(tag) = &query.tag {
            if !tag_matches(&circle, tag) {
                continue;
            }
        }
        if total >= start && total < end {
            data.push(circle);
        }
        total += 1;
    }
    Ok(CirclePage {
        total,
        offset: query.offset,
        limit: query.limit,
        data,
    })
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !out.iter().any(|seen| seen.to_lowercase() == tag.to_lowercase()) {
            out.push(tag.to_string());
        }
    }
    out
}

fn normalize_days(days: &[String]) -> AppResult<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    for day in days {
        let day = day.trim();
        let canonical = WEEKDAYS
            .iter()
            .find(|w| w.eq_ignore_ascii_case(day))
            .ok_or_else(|| {
                AppError::validation("activeDays", format!("unknown weekday {day:?}"))
            })?;
        if !out.iter().any(|d| d == canonical) {
            out.push((*canonical).to_string());
        }
    }
    Ok(out)
}

fn check_len(field: &'static str, value: &str, min: usize, max: usize) -> AppResult<()> {
    let n = value.chars().count();
    if n < min || n > max {
        return Err(AppError::validation(
            field,
            format!("{field} must be between {min} and {max} characters"),
        ));
    }
    Ok(())
}

/// Validate a creation request into a complete record without storing it.
pub fn validate(req: &CreateCircleReq, now: i64) -> AppResult<Circle> {
    let name = required("name", req.name.as_deref())?;
    check_len("name", &name, 2, 50)?;
    let description = required("description", req.description.as_deref())?;
    check_len("description", &description, 10, 500)?;
    let circle_type = required("type", req.circle_type.as_deref())?
        .parse::<CircleType>()
        .map_err(|_| AppError::validation("type", "type must be university or amateur"))?;
    let owner_id = required("ownerId", req.owner_id.as_deref())?;
    check_id("ownerId", &owner_id)?;
    Ok(Circle {
        id: new_id(),
        name,
        description,
        circle_type,
        tags: normalize_tags(req.tags.as_deref().unwrap_or_default()),
        members_count: 1,
        location: req.location.as_deref().unwrap_or_default().trim().to_string(),
        active_days: normalize_days(req.active_days.as_deref().unwrap_or_default())?,
        owner_id,
        created_at: now,
        updated_at: now,
    })
}

/// Store a fully formed circle record.
pub fn insert(conn: &Connection, circle: &Circle) -> AppResult<()> {
    let res = conn.execute(
        &format!("INSERT INTO circles ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
        params![
            circle.id,
            circle.name,
            circle.description,
            circle.circle_type.as_str(),
            serde_json::to_string(&circle.tags)?,
            circle.members_count,
            circle.location,
            serde_json::to_string(&circle.active_days)?,
            circle.owner_id,
            circle.created_at,
            circle.updated_at,
        ],
    );
    match res {
        Ok(_) => Ok(()),
        Err(e) if constraint_violation(&e) == Some(Constraint::Unique) => {
            Err(AppError::conflict("circle id already exists"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Validate and append a new circle.
pub fn create(conn: &Connection, req: &CreateCircleReq) -> AppResult<Circle> {
    let circle = validate(req, now_millis())?;
    insert(conn, &circle)?;
    tracing::info!(circle_id = %circle.id, owner_id = %circle.owner_id, "circle created");
    Ok(circle)
}

pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<Circle>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM circles WHERE id = ?1"))?;
    let circle = stmt.query_row([id], row_to_circle).optional()?;
    Ok(circle)
}

pub fn exists(conn: &Connection, id: &str) -> AppResult<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM circles WHERE id = ?1")?;
    let found: Option<i64> = stmt.query_row([id], |row| row.get(0)).optional()?;
    Ok(found.is_some())
}

/// Remove a circle; its applications go with it.
pub fn delete(conn: &Connection, id: &str) -> AppResult<bool> {
    let changed = conn.execute("DELETE FROM circles WHERE id = ?1", [id])?;
    Ok(changed > 0)
}

pub fn count(conn: &Connection) -> AppResult<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM circles", [], |row| row.get(0))?;
    Ok(n as u64)
}
