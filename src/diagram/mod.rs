//! Diagram rendering: chart text to a scoped SVG artifact, with last-chart-wins
//! superseding and an expand/collapse view flag.

pub mod config;
pub mod layout;
pub mod parse;
pub mod svg;

pub use config::DiagramConfig;
pub use parse::{parse_flowchart, DiagramError, Flowchart};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const FAILURE_MESSAGE: &str = "Failed to render architecture diagram. The syntax might be invalid.";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RenderId(String);

impl RenderId {
    pub fn generate() -> Self {
        Self(format!("mermaid-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedDiagram {
    pub id: RenderId,
    pub svg: String,
    pub rendered_at: DateTime<Utc>,
}

impl RenderedDiagram {
    pub fn data_uri(&self) -> String {
        format!("data:image/svg+xml;base64,{}", STANDARD.encode(self.svg.as_bytes()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderFailure {
    pub id: RenderId,
    pub message: &'static str,
    pub diagnostic: String,
    /// Kept verbatim so the user can see what failed.
    pub chart: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RenderOutcome {
    Rendered(RenderedDiagram),
    Failed(RenderFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RenderState {
    Idle,
    Rendering { id: RenderId },
    Rendered(RenderedDiagram),
    Failed(RenderFailure),
}

impl From<RenderOutcome> for RenderState {
    fn from(outcome: RenderOutcome) -> Self {
        match outcome {
            RenderOutcome::Rendered(diagram) => RenderState::Rendered(diagram),
            RenderOutcome::Failed(failure) => RenderState::Failed(failure),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewState {
    #[default]
    Normal,
    Expanded,
}

impl ViewState {
    pub fn toggled(self) -> Self {
        match self {
            ViewState::Normal => ViewState::Expanded,
            ViewState::Expanded => ViewState::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagramView {
    pub render: RenderState,
    pub view: ViewState,
}

/// Turns chart text into SVG markup whose root element carries `id`.
#[async_trait]
pub trait DiagramCompiler: Send + Sync {
    async fn compile(&self, id: &RenderId, chart: &str) -> Result<String, DiagramError>;
}

/// In-process flowchart compiler using the process-wide [`DiagramConfig`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MermaidCompiler;

#[async_trait]
impl DiagramCompiler for MermaidCompiler {
    async fn compile(&self, id: &RenderId, chart: &str) -> Result<String, DiagramError> {
        compile_svg(chart, id.as_str(), DiagramConfig::global())
    }
}

pub fn compile_svg(chart: &str, id: &str, config: &DiagramConfig) -> Result<String, DiagramError> {
    let flowchart = parse_flowchart(chart)?;
    let placed = layout::layout(&flowchart, config);
    Ok(svg::render_svg(&flowchart, &placed, id, config))
}

struct Inner {
    latest: u64,
    render: RenderState,
    view: ViewState,
}

pub struct DiagramRenderer {
    compiler: Arc<dyn DiagramCompiler>,
    inner: Mutex<Inner>,
}

impl Default for DiagramRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagramRenderer {
    pub fn new() -> Self {
        Self::with_compiler(Arc::new(MermaidCompiler))
    }

    pub fn with_compiler(compiler: Arc<dyn DiagramCompiler>) -> Self {
        Self {
            compiler,
            inner: Mutex::new(Inner { latest: 0, render: RenderState::Idle, view: ViewState::Normal }),
        }
    }

    /// Render `chart`. The outcome always goes back to the caller, but it only becomes
    /// the observable state if no newer render was started in the meantime.
    pub async fn render(&self, chart: &str) -> RenderOutcome {
        let id = RenderId::generate();
        let ticket = {
            let mut inner = self.inner.lock();
            inner.latest += 1;
            inner.render = RenderState::Rendering { id: id.clone() };
            inner.latest
        };
        debug!(%id, ticket, chart_chars = chart.len(), "Rendering diagram");

        let outcome = match self.compiler.compile(&id, chart).await {
            Ok(svg) => {
                info!(%id, svg_bytes = svg.len(), "🖼️ Diagram rendered");
                RenderOutcome::Rendered(RenderedDiagram { id, svg, rendered_at: Utc::now() })
            }
            Err(e) => {
                warn!(%id, "❌ Mermaid render error: {}", e);
                RenderOutcome::Failed(RenderFailure {
                    id,
                    message: FAILURE_MESSAGE,
                    diagnostic: e.to_string(),
                    chart: chart.to_string(),
                })
            }
        };

        let mut inner = self.inner.lock();
        if inner.latest == ticket {
            inner.render = outcome.clone().into();
        } else {
            debug!(ticket, latest = inner.latest, "Discarding superseded render");
        }
        outcome
    }

    pub fn toggle_expand(&self) -> ViewState {
        let mut inner = self.inner.lock();
        inner.view = inner.view.toggled();
        inner.view
    }

    pub fn snapshot(&self) -> DiagramView {
        let inner = self.inner.lock();
        DiagramView { render: inner.render.clone(), view: inner.view }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tokio::sync::{mpsc, oneshot};

    const CHART: &str = "flowchart TB\nsubgraph vpc [VPC]\nalb[ALB] --> app[App]\nend\napp --> db[(DB)]";

    /// Holds each compile until the test releases it, keyed by chart text.
    struct GatedCompiler {
        entered: mpsc::UnboundedSender<String>,
        gates: Mutex<HashMap<String, oneshot::Receiver<Result<String, DiagramError>>>>,
    }

    #[async_trait]
    impl DiagramCompiler for GatedCompiler {
        async fn compile(&self, _id: &RenderId, chart: &str) -> Result<String, DiagramError> {
            let gate = self.gates.lock().remove(chart).unwrap();
            self.entered.send(chart.to_string()).unwrap();
            gate.await.unwrap()
        }
    }

    fn gated(
        charts: &[&str],
    ) -> (Arc<DiagramRenderer>, Vec<oneshot::Sender<Result<String, DiagramError>>>, mpsc::UnboundedReceiver<String>) {
        let (entered, entered_rx) = mpsc::unbounded_channel();
        let mut gates = HashMap::new();
        let mut senders = Vec::new();
        for chart in charts {
            let (tx, rx) = oneshot::channel();
            gates.insert(chart.to_string(), rx);
            senders.push(tx);
        }
        let compiler = GatedCompiler { entered, gates: Mutex::new(gates) };
        (Arc::new(DiagramRenderer::with_compiler(Arc::new(compiler))), senders, entered_rx)
    }

    fn spawn_render(renderer: &Arc<DiagramRenderer>, chart: &'static str) -> tokio::task::JoinHandle<RenderOutcome> {
        let renderer = renderer.clone();
        tokio::spawn(async move { renderer.render(chart).await })
    }

    #[tokio::test]
    async fn renders_chart_into_scoped_svg() {
        let renderer = DiagramRenderer::new();
        assert_eq!(renderer.snapshot().render, RenderState::Idle);

        let RenderOutcome::Rendered(diagram) = renderer.render(CHART).await else {
            panic!("expected a rendered diagram");
        };
        assert!(diagram.id.as_str().starts_with("mermaid-"));
        assert!(diagram.svg.starts_with(&format!("<svg id=\"{}\"", diagram.id)));
        assert!(diagram.data_uri().starts_with("data:image/svg+xml;base64,"));
        assert_eq!(renderer.snapshot().render, RenderState::Rendered(diagram));
    }

    #[tokio::test]
    async fn failure_keeps_chart_verbatim() {
        let renderer = DiagramRenderer::new();
        let chart = "flowchart TB\nA[ALB --> B";
        let RenderOutcome::Failed(failure) = renderer.render(chart).await else {
            panic!("expected a failure");
        };
        assert_eq!(failure.chart, chart);
        assert_eq!(failure.message, FAILURE_MESSAGE);
        assert!(failure.diagnostic.starts_with("Parse error on line 2"));
        assert_eq!(renderer.snapshot().render, RenderState::Failed(failure));
    }

    #[tokio::test]
    async fn each_render_gets_a_fresh_id() {
        let renderer = DiagramRenderer::new();
        let (a, b) = (renderer.render(CHART).await, renderer.render(CHART).await);
        let (RenderOutcome::Rendered(a), RenderOutcome::Rendered(b)) = (a, b) else {
            panic!("expected two renders");
        };
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn newer_chart_wins_when_older_finishes_last() {
        let (renderer, mut gates, mut entered) = gated(&["old", "new"]);
        let old = spawn_render(&renderer, "old");
        assert_eq!(entered.recv().await.unwrap(), "old");
        let new = spawn_render(&renderer, "new");
        assert_eq!(entered.recv().await.unwrap(), "new");
        assert!(matches!(renderer.snapshot().render, RenderState::Rendering { .. }));

        let old_gate = gates.remove(0);
        gates.remove(0).send(Ok("<svg>new</svg>".into())).unwrap();
        let new = new.await.unwrap();
        old_gate.send(Ok("<svg>old</svg>".into())).unwrap();
        let old = old.await.unwrap();

        // The stale outcome still reaches its own caller.
        assert!(matches!(&old, RenderOutcome::Rendered(d) if d.svg == "<svg>old</svg>"));
        assert_eq!(renderer.snapshot().render, RenderState::from(new));
    }

    #[tokio::test]
    async fn newer_chart_wins_when_older_finishes_first() {
        let (renderer, mut gates, mut entered) = gated(&["old", "new"]);
        let old = spawn_render(&renderer, "old");
        entered.recv().await.unwrap();
        let new = spawn_render(&renderer, "new");
        entered.recv().await.unwrap();

        gates.remove(0).send(Err(DiagramError { line: 1, message: "boom".into() })).unwrap();
        old.await.unwrap();
        // Still waiting on the newer chart; the stale failure must not show.
        assert!(matches!(renderer.snapshot().render, RenderState::Rendering { .. }));

        gates.remove(0).send(Ok("<svg>new</svg>".into())).unwrap();
        let new = new.await.unwrap();
        assert_eq!(renderer.snapshot().render, RenderState::from(new));
    }

    #[tokio::test]
    async fn toggle_leaves_render_state_alone() {
        let renderer = DiagramRenderer::new();
        renderer.render(CHART).await;
        let before = renderer.snapshot().render;

        assert_eq!(renderer.toggle_expand(), ViewState::Expanded);
        assert_eq!(renderer.snapshot().render, before);
        assert_eq!(renderer.toggle_expand(), ViewState::Normal);
        assert_eq!(renderer.snapshot(), DiagramView { render: before, view: ViewState::Normal });
    }

    #[test]
    fn state_serializes_with_status_tag() {
        let json = serde_json::to_value(DiagramView { render: RenderState::Idle, view: ViewState::Expanded }).unwrap();
        assert_eq!(json, serde_json::json!({ "render": { "status": "idle" }, "view": "expanded" }));
    }
}
