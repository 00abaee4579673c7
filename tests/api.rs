use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use cloud_architect::{
    diagram::{parse_flowchart, DiagramRenderer},
    gemini::{ContentRequest, GeminiError, GenerationBackend},
    generation::GenerationClient,
    models::{CloudSolution, Provider},
    routes::{router, AppState},
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tower::ServiceExt;

const SAMPLE: &str = include_str!("fixtures/aws_ecommerce.json");

struct FakeBackend {
    reply: Option<&'static str>,
    calls: AtomicUsize,
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    async fn generate_content(&self, request: ContentRequest<'_>) -> Result<Option<String>, GeminiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(request.prompt.contains("AWS"));
        Ok(self.reply.map(str::to_string))
    }
}

fn app(reply: Option<&'static str>) -> (Router, Arc<FakeBackend>) {
    let backend = Arc::new(FakeBackend { reply, calls: AtomicUsize::new(0) });
    let state = AppState {
        generator: Arc::new(GenerationClient::new(backend.clone())),
        diagram: Arc::new(DiagramRenderer::new()),
    };
    (router(state), backend)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

fn json_of(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn generates_multi_region_aws_solution() {
    let (app, backend) = app(Some(SAMPLE));
    let (status, body) = call(
        &app,
        "POST",
        "/api/solutions",
        Some(json!({
            "problemDescription": "Highly available e-commerce platform for 1M concurrent users with microservices, isolated payments/order processing and multi-region disaster recovery",
            "provider": "AWS"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let solution: CloudSolution = serde_json::from_slice(&body).unwrap();
    assert_eq!(solution.provider, Provider::Aws);
    assert!(solution.reliability.disaster_recovery.to_lowercase().contains("multi-region"));
    let chart = parse_flowchart(&solution.mermaid_diagram).unwrap();
    assert!(!chart.subgraphs.is_empty());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blank_description_is_rejected_before_generation() {
    let (app, backend) = app(Some(SAMPLE));
    let (status, body) =
        call(&app, "POST", "/api/solutions", Some(json!({ "problemDescription": "   ", "provider": "AWS" }))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_of(&body)["error"], "problem description must not be empty");
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_backend_reply_is_bad_gateway() {
    let (app, _) = app(None);
    let (status, body) =
        call(&app, "POST", "/api/solutions", Some(json!({ "problemDescription": "A blog", "provider": "AWS" }))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        json_of(&body)["error"],
        "Failed to generate solution. Please try again or check your API key/connection."
    );
}

#[tokio::test]
async fn malformed_backend_reply_is_bad_gateway() {
    let (app, _) = app(Some("{\"title\": 42}"));
    let (status, _) =
        call(&app, "POST", "/api/solutions", Some(json!({ "problemDescription": "A blog", "provider": "AWS" }))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn diagram_render_expand_and_svg() {
    let (app, _) = app(None);

    let (status, _) = call(&app, "GET", "/api/diagram/svg", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = call(&app, "GET", "/api/diagram", None).await;
    assert_eq!(json_of(&body), json!({ "render": { "status": "idle" }, "view": "normal" }));

    let solution: Value = serde_json::from_str(SAMPLE).unwrap();
    let (status, body) =
        call(&app, "POST", "/api/diagram", Some(json!({ "chart": solution["mermaidDiagram"] }))).await;
    assert_eq!(status, StatusCode::OK);
    let view = json_of(&body);
    assert_eq!(view["render"]["status"], "rendered");
    let id = view["render"]["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("mermaid-"));

    let (_, body) = call(&app, "POST", "/api/diagram/expand", None).await;
    let expanded = json_of(&body);
    assert_eq!(expanded["view"], "expanded");
    assert_eq!(expanded["render"], view["render"]);

    let (status, svg) = call(&app, "GET", "/api/diagram/svg", None).await;
    assert_eq!(status, StatusCode::OK);
    let svg = String::from_utf8(svg).unwrap();
    assert!(svg.starts_with(&format!("<svg id=\"{id}\"")));
    assert!(svg.contains("us-east-1 Primary Region"));
}

#[tokio::test]
async fn invalid_chart_shows_failure_with_source() {
    let (app, _) = app(None);
    let chart = "flowchart TB\n    A[ALB --> B\n";
    let (status, body) = call(&app, "POST", "/api/diagram", Some(json!({ "chart": chart }))).await;

    assert_eq!(status, StatusCode::OK);
    let view = json_of(&body);
    assert_eq!(view["render"]["status"], "failed");
    assert_eq!(view["render"]["chart"], chart);
    assert_eq!(
        view["render"]["message"],
        "Failed to render architecture diagram. The syntax might be invalid."
    );

    let (status, _) = call(&app, "GET", "/api/diagram/svg", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn malformed_reply_payload_is_logged_once() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || writer.clone())
        .finish();
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

    let status = tracing::subscriber::with_default(subscriber, || {
        runtime.block_on(async {
            let (app, _) = app(Some("{\"title\": \"payload-3f9c\"}"));
            let (status, _) = call(
                &app,
                "POST",
                "/api/solutions",
                Some(json!({ "problemDescription": "A blog", "provider": "AWS" })),
            )
            .await;
            status
        })
    });

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let output = String::from_utf8(logs.0.lock().clone()).unwrap();
    assert_eq!(output.matches("payload-3f9c").count(), 1, "{output}");
}
