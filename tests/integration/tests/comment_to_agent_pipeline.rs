use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docwatch_agent::AgentReplyDispatcher;
use docwatch_core::{AgentRunError, AgentRuntime, DocumentId, ProgressStream};
use docwatch_gateway::{build_gateway_router, GatewayState};
use docwatch_monitor::{ManualScheduler, MonitorRegistry, TickOutcome, TickReport};
use docwatch_remote::{
    HttpAgentRuntime, HttpAgentRuntimeConfig, HttpCommentFetcher, HttpCommentFetcherConfig,
};
use futures_util::{stream, StreamExt};
use httpmock::prelude::*;
use serde_json::{json, Value};
use tokio::net::TcpListener;

const COMMENTS_PATH: &str = "/documents/doc-d/comments";

struct RecordingRuntime {
    instructions: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingRuntime {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            instructions: Mutex::new(Vec::new()),
            fail,
        })
    }

    fn instructions(&self) -> Vec<String> {
        self.instructions.lock().expect("instructions lock").clone()
    }
}

#[async_trait]
impl AgentRuntime for RecordingRuntime {
    async fn invoke(&self, instruction: &str) -> Result<ProgressStream, AgentRunError> {
        self.instructions
            .lock()
            .expect("instructions lock")
            .push(instruction.to_string());
        if self.fail {
            return Err(AgentRunError::Invoke("agent unreachable".to_string()));
        }
        Ok(stream::iter(vec![
            Ok(json!({"agent": {"messages": [{"type": "ai", "content": "Summary appended."}]}})),
            Ok(json!({"type": "end"})),
        ])
        .boxed())
    }
}

fn reply(id: &str, text: &str) -> Value {
    json!({
        "reply_id": id,
        "user_id": "ou_ana",
        "create_time": 1_700_000_000,
        "content": {"elements": [{"type": "text_run", "text_run": {"text": text}}]}
    })
}

fn comments_page(with_r4: bool) -> Value {
    let mut second_replies = vec![reply("r3", "agreed")];
    if with_r4 {
        second_replies.push(reply("r4", "@bot add a summary of section 2"));
    }
    json!({
        "code": 0,
        "msg": "success",
        "data": {
            "items": [
                {
                    "comment_id": "c1",
                    "quote": "Section 1",
                    "reply_list": {"replies": [reply("r1", "typo here"), reply("r2", "fixed")]}
                },
                {
                    "comment_id": "c2",
                    "quote": "Section 2",
                    "reply_list": {"replies": second_replies}
                }
            ],
            "has_more": false
        }
    })
}

fn comment_fetcher(server: &MockServer) -> Arc<HttpCommentFetcher> {
    Arc::new(
        HttpCommentFetcher::new(HttpCommentFetcherConfig {
            api_base: server.base_url(),
            access_token: "integration-token".to_string(),
            request_timeout_ms: 2_000,
            retry_max_attempts: 1,
            retry_base_delay_ms: 1,
        })
        .expect("comment fetcher"),
    )
}

async fn run_detection_scenario(agent_fails: bool) {
    let server = MockServer::start();
    let mut comments = server.mock(|when, then| {
        when.method(GET).path(COMMENTS_PATH);
        then.status(200).json_body(comments_page(false));
    });

    let runtime = RecordingRuntime::new(agent_fails);
    let registry = MonitorRegistry::new(
        comment_fetcher(&server),
        Arc::new(AgentReplyDispatcher::new(runtime.clone())),
        Arc::new(ManualScheduler::new()),
    );
    let document = DocumentId::parse("doc-d").expect("doc id");
    registry
        .start(document.clone(), Duration::from_secs(30))
        .expect("start monitor");

    let baseline = registry.poll_now(&document).await.expect("baseline poll");
    assert_eq!(baseline, TickOutcome::Baseline { fetched_replies: 3 });
    assert!(runtime.instructions().is_empty());

    comments.delete();
    comments = server.mock(|when, then| {
        when.method(GET).path(COMMENTS_PATH);
        then.status(200).json_body(comments_page(true));
    });

    let detected = registry.poll_now(&document).await.expect("detection poll");
    let (dispatched, failed) = if agent_fails { (0, 1) } else { (1, 0) };
    assert_eq!(
        detected,
        TickOutcome::Polled(TickReport {
            fetched_replies: 4,
            new_replies: 1,
            dispatched,
            failed_dispatches: failed,
        })
    );

    let instructions = runtime.instructions();
    assert_eq!(instructions.len(), 1);
    assert!(instructions[0].contains("add a summary of section 2"));
    assert!(instructions[0].contains("Section 2"));
    assert_eq!(
        registry
            .snapshot(&document)
            .map(|snapshot| snapshot.reply_count()),
        Some(4)
    );

    registry.poll_now(&document).await.expect("idempotent poll");
    assert_eq!(runtime.instructions().len(), 1);
    assert!(comments.calls() >= 2);
}

#[tokio::test]
async fn integration_new_reply_triggers_exactly_one_agent_run() {
    run_detection_scenario(false).await;
}

#[tokio::test]
async fn integration_failed_agent_run_still_commits_snapshot() {
    run_detection_scenario(true).await;
}

#[tokio::test]
async fn integration_gateway_streams_ndjson_agent_run_as_sse() {
    let agent = MockServer::start();
    agent.mock(|when, then| {
        when.method(POST).path("/runs/stream");
        then.status(200).body(concat!(
            "{\"agent\":{\"messages\":[{\"type\":\"ai\",\"content\":\"Reading the doc.\",",
            "\"tool_calls\":[{\"name\":\"docx_read\",\"args\":\"{\\\"doc\\\":\\\"doc-d\\\"}\"}]}]}}\n",
            "{\"tools\":{\"messages\":[{\"type\":\"tool\",\"tool_call_id\":\"docx_read:1\",",
            "\"content\":\"{\\\"code\\\":0,\\\"data\\\":{\\\"blocks\\\":3}}\"}]}}\n",
            "this line is not json\n",
            "{\"type\":\"end\"}\n"
        ));
    });
    let runtime: Arc<dyn AgentRuntime> = Arc::new(
        HttpAgentRuntime::new(HttpAgentRuntimeConfig {
            endpoint: agent.url("/runs/stream"),
            max_iterations: 10,
            request_timeout_ms: 2_000,
        })
        .expect("agent runtime"),
    );

    let docs = MockServer::start();
    let registry = MonitorRegistry::new(
        comment_fetcher(&docs),
        Arc::new(AgentReplyDispatcher::new(Arc::clone(&runtime))),
        Arc::new(ManualScheduler::new()),
    );
    let state = Arc::new(GatewayState::new(
        registry,
        runtime,
        Duration::from_secs(30),
    ));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral listener");
    let addr = listener.local_addr().expect("listener addr");
    let app = build_gateway_router(state);
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let body = reqwest::Client::new()
        .post(format!("http://{addr}/agent/stream"))
        .json(&json!({"instruction": "read doc-d"}))
        .send()
        .await
        .expect("stream request")
        .text()
        .await
        .expect("stream body");

    let frames = body
        .split("\n\n")
        .filter(|frame| !frame.is_empty())
        .collect::<Vec<_>>();
    assert_eq!(frames.last().copied(), Some("data: [DONE]"));
    let events = frames[..frames.len() - 1]
        .iter()
        .map(|frame| {
            serde_json::from_str::<Value>(frame.trim_start_matches("data: ")).expect("event json")
        })
        .collect::<Vec<_>>();
    let kinds = events
        .iter()
        .map(|event| event["type"].as_str().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec!["message", "tool_call", "tool_result", "final"]);
    assert_eq!(events[1]["arguments"], json!({"doc": "doc-d"}));
    assert_eq!(events[2]["name"], "docx_read");
    assert_eq!(events[2]["result"], json!({"blocks": 3}));
    assert_eq!(events[3]["content"], "Reading the doc.");

    server.abort();
}
