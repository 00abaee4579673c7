use serde::Serialize;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// `<br>` inside labels becomes a line break.
    Loose,
    /// Labels are shown exactly as written.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeName {
    Dark,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Theme {
    pub background: &'static str,
    pub node_fill: &'static str,
    pub node_border: &'static str,
    pub cluster_fill: &'static str,
    pub cluster_border: &'static str,
    pub line_color: &'static str,
    pub text_color: &'static str,
    pub edge_label_background: &'static str,
}

impl ThemeName {
    pub fn palette(self) -> Theme {
        match self {
            ThemeName::Dark => Theme {
                background: "#1e293b",
                node_fill: "#1f2020",
                node_border: "#81b1db",
                cluster_fill: "#2c3e50",
                cluster_border: "#64748b",
                line_color: "#d3d3d3",
                text_color: "#e2e8f0",
                edge_label_background: "#334155",
            },
            ThemeName::Default => Theme {
                background: "#ffffff",
                node_fill: "#ececff",
                node_border: "#9370db",
                cluster_fill: "#ffffde",
                cluster_border: "#aaaa33",
                line_color: "#333333",
                text_color: "#333333",
                edge_label_background: "#e8e8e8",
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagramConfig {
    pub theme: ThemeName,
    pub security_level: SecurityLevel,
    pub font_family: String,
    pub font_size: f32,
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            theme: ThemeName::Dark,
            security_level: SecurityLevel::Loose,
            font_family: "Inter".to_string(),
            font_size: 14.0,
        }
    }
}

static GLOBAL: OnceLock<DiagramConfig> = OnceLock::new();

impl DiagramConfig {
    /// Install the process-wide configuration. Only the first call wins; later calls get
    /// their config handed back.
    pub fn init(config: DiagramConfig) -> Result<(), DiagramConfig> {
        GLOBAL.set(config)
    }

    /// The installed configuration, or the default one if nothing was installed before
    /// the first render.
    pub fn global() -> &'static DiagramConfig {
        GLOBAL.get_or_init(DiagramConfig::default)
    }
}
