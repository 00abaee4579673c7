//! Response contract for architecture generation.
//!
//! One [`Schema`] value describes the `CloudSolution` document. It is sent to Gemini as
//! `responseSchema` so decoding is constrained server-side, and the same value validates
//! the decoded JSON before it is turned into typed structs.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    String,
    Array,
    Object,
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaType::String => "string",
            SchemaType::Array => "array",
            SchemaType::Object => "object",
        };
        f.write_str(name)
    }
}

/// Subset of the OpenAPI schema object understood by Gemini structured output.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type")]
    pub kind: SchemaType,
    pub description: Option<String>,
    #[serde(rename = "enum")]
    pub variants: Option<Vec<String>>,
    #[serde(serialize_with = "serialize_properties", skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<(String, Schema)>,
    pub property_ordering: Option<Vec<String>>,
    pub items: Option<Box<Schema>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

// Properties are kept as a Vec so the wire order matches declaration order.
fn serialize_properties<S>(props: &[(String, Schema)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_map(props.iter().map(|(name, schema)| (name, schema)))
}

impl Schema {
    fn of(kind: SchemaType) -> Self {
        Self {
            kind,
            description: None,
            variants: None,
            properties: Vec::new(),
            property_ordering: None,
            items: None,
            required: Vec::new(),
        }
    }

    pub fn string() -> Self { Self::of(SchemaType::String) }

    pub fn string_enum(values: &[&str]) -> Self {
        let mut schema = Self::of(SchemaType::String);
        schema.variants = Some(values.iter().map(|v| v.to_string()).collect());
        schema
    }

    pub fn array(items: Schema) -> Self {
        let mut schema = Self::of(SchemaType::Array);
        schema.items = Some(Box::new(items));
        schema
    }

    pub fn object(properties: Vec<(&str, Schema)>, required: &[&str]) -> Self {
        let mut schema = Self::of(SchemaType::Object);
        schema.property_ordering = Some(properties.iter().map(|(name, _)| name.to_string()).collect());
        schema.properties = properties.into_iter().map(|(name, s)| (name.to_string(), s)).collect();
        schema.required = required.iter().map(|r| r.to_string()).collect();
        schema
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn property(&self, name: &str) -> Option<&Schema> {
        self.properties.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    /// Check `value` against this schema. Stops at the first violation.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        self.validate_at(value, "$")
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<(), SchemaViolation> {
        match (self.kind, value) {
            (SchemaType::String, Value::String(s)) => {
                if let Some(variants) = &self.variants {
                    if !variants.iter().any(|v| v == s) {
                        return Err(SchemaViolation::new(
                            path,
                            format!("expected one of [{}], found \"{}\"", variants.join(", "), s),
                        ));
                    }
                }
                Ok(())
            }
            (SchemaType::Array, Value::Array(elements)) => {
                if let Some(items) = &self.items {
                    for (i, element) in elements.iter().enumerate() {
                        items.validate_at(element, &format!("{path}[{i}]"))?;
                    }
                }
                Ok(())
            }
            (SchemaType::Object, Value::Object(map)) => {
                for name in &self.required {
                    if map.get(name).map_or(true, Value::is_null) {
                        return Err(SchemaViolation::new(path, format!("missing required field `{name}`")));
                    }
                }
                for (name, schema) in &self.properties {
                    match map.get(name) {
                        None | Some(Value::Null) => {}
                        Some(v) => schema.validate_at(v, &format!("{path}.{name}"))?,
                    }
                }
                Ok(())
            }
            (kind, other) => Err(SchemaViolation::new(
                path,
                format!("expected {kind}, found {}", json_type_name(other)),
            )),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    fn new(path: &str, message: String) -> Self {
        Self { path: path.to_string(), message }
    }
}

/// The `CloudSolution` contract, built once per process.
pub fn cloud_solution_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(build_cloud_solution_schema)
}

fn build_cloud_solution_schema() -> Schema {
    let tech_stack_entry = Schema::object(
        vec![
            ("category", Schema::string().describe("e.g., Compute, Database, Networking")),
            ("services", Schema::array(Schema::string())),
            ("justification", Schema::string().describe("Why this service was chosen")),
        ],
        &["category", "services", "justification"],
    );

    let networking = Schema::object(
        vec![
            ("vpcDesign", Schema::string().describe("CIDR blocks, VPC/VNet structure")),
            ("subnets", Schema::string().describe("Public vs Private subnets strategy")),
            ("connectivity", Schema::string().describe("VPN, Direct Connect/ExpressRoute, Interconnect, etc.")),
            ("securityGroups", Schema::string().describe("Firewall rules, NSGs, Security Groups")),
        ],
        &["vpcDesign", "subnets", "connectivity", "securityGroups"],
    );

    let reliability = Schema::object(
        vec![
            ("loadBalancing", Schema::string().describe("ALB/NLB, App Gateway, or HTTP(S) LB details")),
            ("failoverStrategy", Schema::string().describe("How automatic failover is handled")),
            ("disasterRecovery", Schema::string().describe("RTO/RPO targets and strategy")),
            ("backupPlan", Schema::string().describe("Backup frequency and retention")),
        ],
        &["loadBalancing", "failoverStrategy", "disasterRecovery", "backupPlan"],
    );

    Schema::object(
        vec![
            ("title", Schema::string().describe("A professional title for the architecture")),
            ("summary", Schema::string().describe("A high-level executive summary")),
            ("provider", Schema::string_enum(&["AWS", "GCP", "Azure"])),
            (
                "mermaidDiagram",
                Schema::string().describe("Valid Mermaid.js flowchart code. Do not include markdown backticks."),
            ),
            ("techStack", Schema::array(tech_stack_entry)),
            ("networking", networking),
            ("reliability", reliability),
            (
                "walkthrough",
                Schema::array(Schema::string())
                    .describe("Step-by-step data flow or user journey through the system"),
            ),
        ],
        &["title", "summary", "provider", "mermaidDiagram", "techStack", "networking", "reliability", "walkthrough"],
    )
}
