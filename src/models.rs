use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    #[serde(rename = "AWS")]
    Aws,
    #[serde(rename = "GCP")]
    Gcp,
    #[serde(rename = "Azure")]
    Azure,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Aws, Provider::Gcp, Provider::Azure];

    /// Wire name, identical to the serde representation and the schema enum values.
    pub const fn as_str(self) -> &'static str {
        match self {
            Provider::Aws => "AWS",
            Provider::Gcp => "GCP",
            Provider::Azure => "Azure",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("problem description must not be empty")]
    EmptyDescription,
}

/// One submission from the UI. Built through [`GenerationRequest::new`] so the
/// description is always trimmed and non-empty.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    problem_description: String,
    provider: Provider,
}

impl GenerationRequest {
    pub fn new(problem_description: impl AsRef<str>, provider: Provider) -> Result<Self, RequestError> {
        let trimmed = problem_description.as_ref().trim();
        if trimmed.is_empty() {
            return Err(RequestError::EmptyDescription);
        }
        Ok(Self { problem_description: trimmed.to_string(), provider })
    }

    pub fn problem_description(&self) -> &str { &self.problem_description }

    pub fn provider(&self) -> Provider { self.provider }
}

/// Body accepted by `POST /api/solutions` before validation.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SolutionRequestBody {
    pub problem_description: String,
    pub provider: Provider,
}

impl TryFrom<SolutionRequestBody> for GenerationRequest {
    type Error = RequestError;

    fn try_from(body: SolutionRequestBody) -> Result<Self, Self::Error> {
        GenerationRequest::new(body.problem_description, body.provider)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TechStackEntry {
    pub category: String,
    pub services: Vec<String>,
    pub justification: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Networking {
    pub vpc_design: String,
    pub subnets: String,
    pub connectivity: String,
    pub security_groups: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reliability {
    pub load_balancing: String,
    pub failover_strategy: String,
    pub disaster_recovery: String,
    pub backup_plan: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CloudSolution {
    pub title: String,
    pub summary: String,
    pub provider: Provider,
    pub mermaid_diagram: String,
    pub tech_stack: Vec<TechStackEntry>,
    pub networking: Networking,
    pub reliability: Reliability,
    pub walkthrough: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderRequestBody {
    pub chart: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_trims_description() {
        let req = GenerationRequest::new("  three-tier web app \n", Provider::Gcp).unwrap();
        assert_eq!(req.problem_description(), "three-tier web app");
        assert_eq!(req.provider(), Provider::Gcp);
    }

    #[test]
    fn request_rejects_blank_description() {
        assert_eq!(GenerationRequest::new(" \t\n", Provider::Aws), Err(RequestError::EmptyDescription));
    }

    #[test]
    fn provider_uses_wire_names() {
        for provider in Provider::ALL {
            let json = serde_json::to_string(&provider).unwrap();
            assert_eq!(json, format!("\"{}\"", provider.as_str()));
        }
        assert!(serde_json::from_str::<Provider>("\"aws\"").is_err());
    }

    #[test]
    fn request_body_deserializes_camel_case() {
        let body: SolutionRequestBody = serde_json::from_str(
            r#"{"problemDescription":"chat backend","provider":"Azure"}"#,
        ).unwrap();
        let req = GenerationRequest::try_from(body).unwrap();
        assert_eq!(req.provider(), Provider::Azure);
    }
}
