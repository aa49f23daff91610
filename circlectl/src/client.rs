use circle_api::{
    ChatHistory, Circle, CirclePage, CreateCircleReq, CreateUserReq, DeleteCircleResp, ErrorBody,
    JoinReq, JoinResp, SendMessageReq, SendMessageResp, SignInReq, SignInResp, User, UserProfile,
};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server answered with a non-success status.
    #[error("{message} ({status})")]
    Api { status: StatusCode, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Filters for [`ApiClient::list_circles`].
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub circle_type: Option<String>,
    pub tag: Option<String>,
}

impl ListParams {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut q = Vec::new();
        if let Some(o) = self.offset {
            q.push(("offset", o.to_string()));
        }
        if let Some(l) = self.limit {
            q.push(("limit", l.to_string()));
        }
        if let Some(t) = &self.circle_type {
            q.push(("type", t.clone()));
        }
        if let Some(t) = &self.tag {
            q.push(("tag", t.clone()));
        }
        q
    }
}

/// Thin typed wrapper over the circles HTTP API.
#[derive(Clone)]
pub struct ApiClient {
    base: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self {
            base,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> ClientResult<T> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };
        Err(ClientError::Api { status, message })
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> ClientResult<SignInResp> {
        let body = SignInReq {
            username: Some(username.into()),
            password: Some(password.into()),
        };
        let resp = self
            .http
            .post(self.url("/auth/signin"))
            .json(&body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn list_circles(&self, params: &ListParams) -> ClientResult<CirclePage> {
        let resp = self
            .http
            .get(self.url("/circle"))
            .query(&params.query())
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn get_circle(&self, id: &str) -> ClientResult<Circle> {
        let resp = self.http.get(self.url(&format!("/circle/{id}"))).send().await?;
        Self::decode(resp).await
    }

    pub async fn create_circle(&self, req: &CreateCircleReq) -> ClientResult<Circle> {
        let resp = self.http.post(self.url("/circle")).json(req).send().await?;
        Self::decode(resp).await
    }

    pub async fn join_circle(
        &self,
        circle_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> ClientResult<JoinResp> {
        let body = JoinReq {
            user_id: Some(user_id.into()),
            user_name: Some(user_name.into()),
        };
        let resp = self
            .http
            .post(self.url(&format!("/circle/{circle_id}")))
            .json(&body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn chat_history(&self, circle_id: &str, user_id: &str) -> ClientResult<ChatHistory> {
        let resp = self
            .http
            .get(self.url(&format!("/circle/{circle_id}/chats/{user_id}")))
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn send_message(
        &self,
        circle_id: &str,
        user_id: &str,
        sender_id: &str,
        content: &str,
    ) -> ClientResult<SendMessageResp> {
        let body = SendMessageReq {
            sender_id: Some(sender_id.into()),
            content: Some(content.into()),
        };
        let resp = self
            .http
            .post(self.url(&format!("/circle/{circle_id}/chats/{user_id}")))
            .json(&body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn delete_circle(&self, id: &str) -> ClientResult<DeleteCircleResp> {
        let resp = self
            .http
            .delete(self.url(&format!("/circle/{id}")))
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn register_user(&self, req: &CreateUserReq) -> ClientResult<User> {
        let resp = self.http.post(self.url("/user")).json(req).send().await?;
        Self::decode(resp).await
    }

    pub async fn get_user(&self, id: &str) -> ClientResult<UserProfile> {
        let resp = self.http.get(self.url(&format!("/user/{id}"))).send().await?;
        Self::decode(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_only_send_what_is_set() {
        let params = ListParams {
            limit: Some(5),
            tag: Some("sports".into()),
            ..Default::default()
        };
        assert_eq!(
            params.query(),
            vec![("limit", "5".to_string()), ("tag", "sports".to_string())]
        );
        assert!(ListParams::default().query().is_empty());
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = ApiClient::new("http://localhost:8787/");
        assert_eq!(client.url("/circle"), "http://localhost:8787/circle");
    }
}
