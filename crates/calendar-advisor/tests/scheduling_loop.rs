//! End-to-end runs of the conversation loop against the static calendar.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use agent_core::mock::MockProvider;
use agent_core::{
    AgentBuilder, AgentError, CancellationToken, Completion, Role, StreamDelta, ToolCall,
};
use async_trait::async_trait;
use calendar_advisor::{
    CalendarProvider, Meeting, SCHEDULING_PROMPT, StaticCalendar, scheduling_tools,
};
use chrono::NaiveDate;
use serde_json::json;

/// Wraps the static calendar, counting queries and delaying some users
struct InstrumentedCalendar {
    inner: StaticCalendar,
    queries: AtomicUsize,
    slow_user: Option<&'static str>,
}

impl InstrumentedCalendar {
    fn new(slow_user: Option<&'static str>) -> Self {
        Self {
            inner: StaticCalendar::embedded().unwrap(),
            queries: AtomicUsize::new(0),
            slow_user,
        }
    }
}

#[async_trait]
impl CalendarProvider for InstrumentedCalendar {
    async fn query(&self, user: &str, date: NaiveDate) -> calendar_advisor::Result<Vec<Meeting>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.slow_user == Some(user) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        self.inner.query(user, date).await
    }

    fn name(&self) -> &str {
        "Instrumented"
    }
}

fn meetings_call(id: &str, user: &str, date: &str) -> ToolCall {
    ToolCall::new(id, "meetings", json!({"user": user, "date": date}))
}

fn build(mock: &MockProvider, calendar: Arc<InstrumentedCalendar>) -> agent_core::Agent {
    AgentBuilder::new()
        .provider(Arc::new(mock.clone()))
        .tools(scheduling_tools(calendar))
        .system_prompt(SCHEDULING_PROMPT)
        .build()
        .unwrap()
}

#[tokio::test]
async fn returns_second_round_text_after_one_dispatch() {
    let mock = MockProvider::new();
    mock.queue_completion(Completion::with_tool_calls(
        "",
        vec![meetings_call("call_1", "Miki", "2026-06-07")],
    ));
    mock.queue_completion(Completion::text("09:30-10:15, 10:15-11:00, 14:15-15:00"));

    let calendar = Arc::new(InstrumentedCalendar::new(None));
    let agent = build(&mock, calendar.clone());

    let answer = agent.ask("When is Miki free?").await.unwrap();
    assert_eq!(answer, "09:30-10:15, 10:15-11:00, 14:15-15:00");
    assert_eq!(calendar.queries.load(Ordering::SeqCst), 1);
    assert_eq!(mock.call_count(), 2);

    let second = &mock.recorded_calls()[1];
    assert_eq!(second.tools.len(), 1);
    assert_eq!(second.tools[0].name, "meetings");

    let tool_message = second.messages.last().unwrap();
    assert_eq!(tool_message.role, Role::Tool);
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
    let meetings: Vec<Meeting> = serde_json::from_str(&tool_message.content).unwrap();
    assert_eq!(meetings.len(), 2);
}

#[tokio::test]
async fn unknown_tool_fails_without_further_rounds() {
    let mock = MockProvider::new();
    mock.queue_completion(Completion::with_tool_calls(
        "",
        vec![ToolCall::new("x", "unknown", json!({}))],
    ));
    mock.queue_completion(Completion::text("unreachable"));

    let agent = build(&mock, Arc::new(InstrumentedCalendar::new(None)));
    let err = agent.ask("q").await.unwrap_err();

    assert!(matches!(err, AgentError::UnsupportedTool(name) if name == "unknown"));
    assert_eq!(mock.call_count(), 1);
    assert_eq!(mock.remaining(), 1);
}

#[tokio::test(start_paused = true)]
async fn tool_results_follow_request_order() {
    let mock = MockProvider::new();
    mock.queue_completion(Completion::with_tool_calls(
        "",
        vec![
            meetings_call("a", "miki", "2026-06-07"),
            meetings_call("b", "bill", "2026-06-07"),
        ],
    ));
    mock.queue_completion(Completion::text("done"));

    // miki's lookup finishes last
    let calendar = Arc::new(InstrumentedCalendar::new(Some("miki")));
    let agent = build(&mock, calendar.clone());
    let outcome = agent
        .run_detailed("q", CancellationToken::new())
        .await
        .unwrap();

    let tool_messages: Vec<_> = outcome
        .conversation
        .messages()
        .iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(tool_messages.len(), 2);
    assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("a"));
    assert_eq!(tool_messages[1].tool_call_id.as_deref(), Some("b"));
    assert!(tool_messages[0].content.contains("\"User\":\"miki\""));
    assert!(tool_messages[1].content.contains("\"User\":\"bill\""));
    assert_eq!(calendar.queries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalid_date_aborts_run() {
    let mock = MockProvider::new();
    mock.queue_completion(Completion::with_tool_calls(
        "",
        vec![meetings_call("a", "miki", "07/06/2026")],
    ));

    let agent = build(&mock, Arc::new(InstrumentedCalendar::new(None)));
    let err = agent.ask("q").await.unwrap_err();

    assert!(matches!(err, AgentError::InvalidArguments { tool, .. } if tool == "meetings"));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn streamed_fragments_are_assembled_before_dispatch() {
    let mock = MockProvider::new();
    mock.queue_stream(vec![
        StreamDelta::ToolCallStart { id: "a".into(), name: "meetings".into() },
        StreamDelta::ToolCallStart { id: "b".into(), name: "meetings".into() },
        StreamDelta::ToolCallArguments { id: "a".into(), fragment: r#"{"user":"MI"#.into() },
        StreamDelta::ToolCallArguments { id: "b".into(), fragment: r#"{"user":"bill","#.into() },
        StreamDelta::ToolCallArguments { id: "a".into(), fragment: r#"KI","date":"2026-06-07"}"#.into() },
        StreamDelta::ToolCallEnd { id: "a".into() },
        StreamDelta::ToolCallArguments { id: "b".into(), fragment: r#""date":"2026-06-08"}"#.into() },
        StreamDelta::Done { finish_reason: None },
    ]);
    mock.queue_stream(vec![
        StreamDelta::Text("Free at ".into()),
        StreamDelta::Text("10:00".into()),
        StreamDelta::Done { finish_reason: None },
    ]);

    let calendar = Arc::new(InstrumentedCalendar::new(None));
    let agent = AgentBuilder::new()
        .provider(Arc::new(mock.clone()))
        .tools(scheduling_tools(calendar.clone()))
        .stream(true)
        .build()
        .unwrap();

    let outcome = agent
        .run_detailed("q", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.answer, "Free at 10:00");
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.tool_calls, 2);

    let messages = outcome.conversation.messages();
    let miki: Vec<Meeting> = serde_json::from_str(&messages[3].content).unwrap();
    let bill: Vec<Meeting> = serde_json::from_str(&messages[4].content).unwrap();
    assert_eq!(miki.len(), 2);
    assert!(bill.is_empty());
}
