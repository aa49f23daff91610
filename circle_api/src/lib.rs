use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};

/// Category of a circle.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CircleType {
    University,
    Amateur,
}

impl CircleType {
    pub const ALL: [CircleType; 2] = [CircleType::University, CircleType::Amateur];

    pub fn as_str(&self) -> &'static str {
        match self {
            CircleType::University => "university",
            CircleType::Amateur => "amateur",
        }
    }
}

impl fmt::Display for CircleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircleType {
    type Err = anyhow::Error;

    /// Exact match against the enumeration; no case folding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CircleType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown circle type {s:?}"))
    }
}

/// A hobby circle as stored in the directory.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Circle {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub circle_type: CircleType,
    pub tags: Vec<String>,
    pub members_count: u32,
    pub location: String,
    pub active_days: Vec<String>,
    pub owner_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One page of the circle listing.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CirclePage {
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub data: Vec<Circle>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateCircleReq {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub circle_type: Option<String>,
    pub owner_id: Option<String>,
    pub tags: Option<Vec<String>>,
    pub location: Option<String>,
    pub active_days: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DeleteCircleResp {
    pub success: bool,
    pub message: String,
    pub circle_id: String,
}

/// A single chat line. Immutable once created apart from `read_status`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub timestamp: i64,
    pub read_status: bool,
    #[serde(default)]
    pub system: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Conversation between a prospective member and a circle owner.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub circle_id: String,
    pub user_id: String,
    pub messages: Vec<Message>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Chat header without its messages.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub circle_id: String,
    pub user_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&Chat> for ChatSummary {
    fn from(chat: &Chat) -> Self {
        Self {
            id: chat.id.clone(),
            circle_id: chat.circle_id.clone(),
            user_id: chat.user_id.clone(),
            created_at: chat.created_at,
            updated_at: chat.updated_at,
        }
    }
}

/// Body accepted by `POST /circle/:id`.
///
/// `{user_appliment_id}` files a membership application, anything else is
/// treated as a chat join request and validated as such.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum CircleActionReq {
    Apply(ApplyReq),
    Join(JoinReq),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct JoinReq {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApplyReq {
    /// Older clients send the applicant id as a number.
    #[serde(deserialize_with = "string_or_number")]
    pub user_appliment_id: String,
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }
    Ok(match Raw::deserialize(d)? {
        Raw::Text(s) => s,
        Raw::Signed(n) => n.to_string(),
        Raw::Unsigned(n) => n.to_string(),
    })
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinResp {
    pub success: bool,
    pub message: String,
    pub chat: Chat,
    pub is_new_chat: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    pub success: bool,
    pub circle_id: String,
    pub user_id: String,
    pub chat: Option<ChatSummary>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CircleChats {
    pub circle_id: String,
    pub chats: Vec<Chat>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageReq {
    pub sender_id: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResp {
    pub success: bool,
    pub message: String,
    pub chat: ChatSummary,
    pub new_message: Message,
    pub is_new_chat: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadReq {
    pub reader_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MarkReadResp {
    pub updated: usize,
}

/// Membership application (SQL-backed).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Application {
    pub application_id: String,
    pub circle_id: String,
    pub user_owner_id: String,
    pub user_appliment_id: String,
    pub auth: bool,
    pub created_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ApplyResp {
    pub success: bool,
    pub application: Application,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ApplicationList {
    pub circle_id: String,
    pub applications: Vec<Application>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DeleteApplicationResp {
    pub success: bool,
    pub message: String,
    pub application_id: String,
}

/// Registered user. The password hash never leaves the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub attribute: Option<String>,
    pub age: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub appliment_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CreateUserReq {
    pub name: Option<String>,
    pub attribute: Option<String>,
    pub age: Option<i64>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct UpdateUserReq {
    pub name: Option<String>,
    pub attribute: Option<String>,
    pub age: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UpdateUserResp {
    pub message: String,
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SignInReq {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SignInUser {
    pub id: String,
    pub name: String,
    pub attribute: Option<String>,
    pub age: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SignInResp {
    pub success: bool,
    pub message: String,
    pub user: SignInUser,
    pub token: String,
    /// Token lifetime in milliseconds.
    #[serde(rename = "expiresIn")]
    pub expires_in: i64,
}

/// JSON error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn circle_uses_camel_case_and_type_key() {
        let circle = Circle {
            id: "c1".into(),
            name: "Chess Club".into(),
            description: "Weekly chess meetups".into(),
            circle_type: CircleType::University,
            tags: vec![],
            members_count: 1,
            location: String::new(),
            active_days: vec!["Monday".into()],
            owner_id: "u1".into(),
            created_at: 1,
            updated_at: 2,
        };
        let v = serde_json::to_value(&circle).unwrap();
        assert_eq!(v["type"], "university");
        assert_eq!(v["membersCount"], 1);
        assert_eq!(v["activeDays"][0], "Monday");
        assert_eq!(v["ownerId"], "u1");
    }

    #[test]
    fn circle_action_dispatches_on_shape() {
        let apply: CircleActionReq =
            serde_json::from_value(json!({"user_appliment_id": "u9"})).unwrap();
        assert!(matches!(apply, CircleActionReq::Apply(ref a) if a.user_appliment_id == "u9"));

        let join: CircleActionReq =
            serde_json::from_value(json!({"userId": "u1", "userName": "Alice"})).unwrap();
        match join {
            CircleActionReq::Join(j) => {
                assert_eq!(j.user_id.as_deref(), Some("u1"));
                assert_eq!(j.user_name.as_deref(), Some("Alice"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let numeric: CircleActionReq =
            serde_json::from_value(json!({"user_appliment_id": 101})).unwrap();
        assert!(matches!(numeric, CircleActionReq::Apply(ref a) if a.user_appliment_id == "101"));

        // an empty body still lands on the join shape so it can be validated
        let empty: CircleActionReq = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(empty, CircleActionReq::Join(_)));
    }

    #[test]
    fn circle_type_parse_is_exact() {
        assert_eq!("amateur".parse::<CircleType>().unwrap(), CircleType::Amateur);
        assert!("Amateur".parse::<CircleType>().is_err());
        assert!("professional".parse::<CircleType>().is_err());
    }

    #[test]
    fn error_body_omits_missing_field() {
        let body = ErrorBody {
            error: "Circle not found".into(),
            field: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"error": "Circle not found"})
        );
    }
}
