//! HTTP client for the document comment API.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use docwatch_core::{
    parse_lenient_timestamp, Comment, CommentFetcher, CommentSnapshot, DocumentId, FetchError,
    Reply,
};
use serde::Deserialize;
use serde_json::Value;

use crate::transport_helpers::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error, RETRY_ATTEMPT_HEADER,
};

const MAX_COMMENT_PAGES: usize = 200;
const PAGE_SIZE: &str = "100";

#[derive(Debug, Clone)]
pub struct HttpCommentFetcherConfig {
    pub api_base: String,
    pub access_token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
struct CommentPageEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<CommentPage>,
}

#[derive(Debug, Default, Deserialize)]
struct CommentPage {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Clone)]
pub struct HttpCommentFetcher {
    http: reqwest::Client,
    api_base: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl HttpCommentFetcher {
    pub fn new(config: HttpCommentFetcherConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("docwatch-comment-monitor"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let auth_header = format!("Bearer {}", config.access_token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid document api authorization header")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create document api client")?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    async fn request_page(
        &self,
        document_id: &DocumentId,
        page_token: Option<&str>,
    ) -> Result<CommentPage, FetchError> {
        let url = format!("{}/documents/{}/comments", self.api_base, document_id);
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let mut request = self
                .http
                .get(&url)
                .query(&[("page_size", PAGE_SIZE)])
                .header(RETRY_ATTEMPT_HEADER, attempt.saturating_sub(1).to_string());
            if let Some(token) = page_token {
                request = request.query(&[("page_token", token)]);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let envelope = response
                            .json::<CommentPageEnvelope>()
                            .await
                            .map_err(|error| FetchError::InvalidResponse(error.to_string()))?;
                        if envelope.code != 0 {
                            return Err(FetchError::Api {
                                code: envelope.code,
                                message: envelope.msg,
                            });
                        }
                        return Ok(envelope.data.unwrap_or_default());
                    }

                    let status = status.as_u16();
                    if status == 401 || status == 403 {
                        return Err(FetchError::Unauthorized { status });
                    }
                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts && is_retryable_status(status) {
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }
                    return Err(FetchError::HttpStatus {
                        status,
                        body: truncate_for_error(&body, 800),
                    });
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(FetchError::Transport(error.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl CommentFetcher for HttpCommentFetcher {
    async fn fetch(&self, document_id: &DocumentId) -> Result<CommentSnapshot, FetchError> {
        let mut comments = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        for _ in 0..MAX_COMMENT_PAGES {
            let page = self
                .request_page(document_id, page_token.as_deref())
                .await?;
            comments.extend(page.items.iter().filter_map(|item| {
                let parsed = parse_comment(item);
                if parsed.is_none() {
                    tracing::debug!(document_id = %document_id, "skipping malformed comment item");
                }
                parsed
            }));

            let next_token = page
                .page_token
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty());
            match next_token {
                Some(token) if page.has_more && seen_tokens.insert(token.clone()) => {
                    page_token = Some(token);
                }
                _ => return Ok(CommentSnapshot::new(comments)),
            }
        }
        tracing::warn!(
            document_id = %document_id,
            pages = MAX_COMMENT_PAGES,
            "comment pagination limit reached; returning partial snapshot"
        );
        Ok(CommentSnapshot::new(comments))
    }
}

fn id_field(object: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn parse_comment(item: &Value) -> Option<Comment> {
    let object = item.as_object()?;
    let comment_id = id_field(object, "comment_id")?;
    let quote = object
        .get("quote")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|quote| !quote.is_empty())
        .map(str::to_string);
    let solved = object
        .get("is_solved")
        .or_else(|| object.get("solved"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let raw_replies = object
        .get("reply_list")
        .and_then(|list| list.get("replies"))
        .or_else(|| object.get("replies"))
        .and_then(Value::as_array);
    let replies = raw_replies
        .map(|replies| replies.iter().filter_map(parse_reply).collect())
        .unwrap_or_default();
    Some(Comment {
        comment_id,
        quote,
        solved,
        replies,
    })
}

fn parse_reply(item: &Value) -> Option<Reply> {
    let object = item.as_object()?;
    let author = ["user_id", "author"]
        .iter()
        .find_map(|key| id_field(object, key))
        .unwrap_or_default();
    let created_at = object
        .get("create_time")
        .or_else(|| object.get("created_at"))
        .and_then(parse_lenient_timestamp);
    Some(Reply {
        reply_id: id_field(object, "reply_id"),
        author,
        created_at,
        text: reply_text(object),
    })
}

fn reply_text(object: &serde_json::Map<String, Value>) -> String {
    let elements = object
        .get("content")
        .and_then(|content| content.get("elements"))
        .and_then(Value::as_array);
    if let Some(elements) = elements {
        return elements
            .iter()
            .filter_map(|element| {
                element
                    .get("text_run")
                    .and_then(|run| run.get("text"))
                    .and_then(Value::as_str)
            })
            .collect::<String>();
    }
    object
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
