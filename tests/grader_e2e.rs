use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rubric_harness::gateway::{ChatGateway, ChatRequest, ChatResponse, ProviderError, Role};
use rubric_harness::grader::{
    generate_rubric, grade_submission, GenerationRequest, GradingRequest, STUB_CRITERION_TEXT,
    STUB_SECTION_TITLE,
};
use rubric_harness::prompts::{answer_page, prompt_image};
use rubric_harness::rubric::{normalize, Rubric};
use rubric_harness::store::{
    record_grade, save_rubric, AssignmentRecord, RecordStore, SqliteRecordStore, SubmissionRecord,
};
use rubric_harness::GraderConfig;
use serde_json::json;

/// Replays canned replies and keeps every request it was sent.
#[derive(Default)]
struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedGateway {
    fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatGateway for ScriptedGateway {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.requests.lock().unwrap().push(req);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::provider("script", "no reply queued", false)));
        reply.map(ChatResponse::text)
    }
}

fn rubric() -> Rubric {
    normalize(Some(&json!({"sections": [{
        "title": "Induction",
        "rubricItems": [
            {"title": "Base case", "points": 2},
            {"title": "Inductive step", "points": 6}
        ],
        "parts": [{"title": "Part (b)", "rubricItems": [{"title": "Conclusion", "points": 2}]}]
    }]})))
}

#[tokio::test]
async fn grading_reconciles_model_output_against_the_rubric() {
    let gateway = ScriptedGateway::new(vec![Ok(r#"```json
{"total": 10, "hits": [
  {"section": "Induction", "criterion": "Base case", "itemId": "item-0-0", "points": 5, "comment": "n=1 shown"},
  {"section": "Induction", "criterion": "Made up", "points": 3, "comment": "?"},
]}
```"#
        .to_string())]);

    let config = GraderConfig {
        model: "openai/gpt-4o-mini".into(),
        ..GraderConfig::default()
    };
    let req = GradingRequest::new(rubric(), 10)
        .with_config(&config)
        .with_images(vec![prompt_image("data:image/png;base64,AA"), answer_page("data:image/png;base64,BB")])
        .for_submission("a1", "s1");

    let outcome = grade_submission(&gateway, &req).await;
    assert_eq!(outcome.total, 2);
    assert_eq!(outcome.hits.len(), 1);
    assert_eq!(outcome.hits[0].comment, "n=1 shown");

    let requests = gateway.requests.lock().unwrap();
    let sent = &requests[0];
    assert_eq!(sent.model.model_id(), "openai/gpt-4o-mini");
    assert_eq!(sent.max_tokens, Some(400));
    assert_eq!(sent.image_count(), 2);
    assert_eq!(sent.attribution.submission_id.as_deref(), Some("s1"));
    assert_eq!(sent.messages[0].role, Role::System);
    assert!(sent.messages.iter().any(|m| m.content.contains("item-0-0-0")));
    assert!(sent.messages.iter().any(|m| m.content.contains("worth 10 points")));
}

#[tokio::test]
async fn grading_fails_open_on_provider_error() {
    let gateway = ScriptedGateway::new(vec![Err(ProviderError::refused("I cannot grade this"))]);
    let outcome = grade_submission(&gateway, &GradingRequest::new(rubric(), 10)).await;
    assert_eq!(outcome.total, 10);
    assert!(outcome.hits.is_empty());
}

#[tokio::test]
async fn grading_fails_open_on_garbage() {
    let gateway = ScriptedGateway::new(vec![Ok("Sorry, here are my thoughts...".to_string())]);
    let outcome = grade_submission(&gateway, &GradingRequest::new(rubric(), 10)).await;
    assert_eq!(outcome.total, 10);
    assert!(outcome.hits.is_empty());
}

#[tokio::test]
async fn generation_normalizes_the_draft_and_assesses_it() {
    let draft = r#"{"sections": [
        {"title": "Stars and bars", "points": 8, "criteria": [
            {"text": "Identifies C(n+k-1, k-1)", "points": 5},
            {"text": "Evaluates to 66", "points": 3,}
        ]}
    ]}"#;
    let gateway = ScriptedGateway::new(vec![Ok(draft.to_string())]);
    let req = GenerationRequest::new(8)
        .with_images(vec![prompt_image("https://img/prompt.png")])
        .for_assignment("a1");

    let generated = generate_rubric(&gateway, &req).await;
    assert!(!generated.fallback);
    assert!(generated.status.rubric_valid);
    assert_eq!(generated.status.rubric_points, 8);
    assert_eq!(generated.rubric.sections[0].rubric_items[1].id, "item-0-1");

    let requests = gateway.requests.lock().unwrap();
    assert_eq!(requests[0].max_tokens, Some(800));
    assert_eq!(requests[0].attribution.assignment_id.as_deref(), Some("a1"));
}

#[tokio::test]
async fn generation_falls_back_to_stub_rubric() {
    for reply in [
        Err(ProviderError::provider("script", "boom", true)),
        Ok("no rubric today".to_string()),
        Ok("{}".to_string()),
    ] {
        let gateway = ScriptedGateway::new(vec![reply]);
        let generated = generate_rubric(&gateway, &GenerationRequest::new(12)).await;

        assert!(generated.fallback);
        assert!(generated.status.rubric_valid);
        assert_eq!(generated.status.rubric_points, 12);
        let section = &generated.rubric.sections[0];
        assert_eq!(section.title, STUB_SECTION_TITLE);
        assert_eq!(section.rubric_items[0].title, STUB_CRITERION_TEXT);
        assert_eq!(section.rubric_items[0].points, 12);
    }
}

#[tokio::test]
async fn generated_rubric_and_grade_round_trip_through_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteRecordStore::new(dir.path().join("records.sqlite")).unwrap());
    store
        .save_assignment(&AssignmentRecord::new("a1", "Counting", 10))
        .await
        .unwrap();
    store
        .save_submission(&SubmissionRecord::new("s1", "a1"))
        .await
        .unwrap();

    let gateway = ScriptedGateway::new(vec![
        Err(ProviderError::provider("script", "down", true)),
        Ok(r#"{"hits": [{"section": "Overall Correctness", "criterion": "Matches provided solution", "points": 1, "comment": "correct"}]}"#.to_string()),
    ]);

    let generated = generate_rubric(gateway_ref(&gateway), &GenerationRequest::new(10)).await;
    let raw = serde_json::to_value(&generated.rubric).unwrap();
    let (rubric, status) = save_rubric(store.as_ref(), "a1", Some(&raw)).await.unwrap();
    assert!(status.rubric_valid);

    let assignment = store.load_assignment("a1").await.unwrap().unwrap();
    assert_eq!(assignment.canonical_rubric(), rubric);

    let req = GradingRequest::new(assignment.canonical_rubric(), assignment.total_points)
        .for_submission("a1", "s1");
    let outcome = grade_submission(gateway_ref(&gateway), &req).await;
    assert_eq!(outcome.total, 10);
    assert_eq!(outcome.hits[0].item_id.as_deref(), Some("item-0-0"));

    record_grade(store.as_ref(), "s1", &outcome).await.unwrap();
    let stored = store.load_submission("s1").await.unwrap().unwrap();
    assert_eq!(stored.total_score, Some(10));
    assert_eq!(stored.feedback, outcome.hits);
}

fn gateway_ref(gateway: &ScriptedGateway) -> &dyn ChatGateway {
    gateway
}
