use crate::models::{CloudSolution, Provider};
use crate::schema::{Schema, SchemaViolation};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("response is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),
    #[error("response does not match schema at {0}")]
    Schema(#[from] SchemaViolation),
    #[error("response could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("response provider {actual} does not match requested {expected}")]
    ProviderMismatch { expected: Provider, actual: Provider },
}

/// Strict decode of a raw model payload into a [`CloudSolution`].
///
/// Syntax, schema conformance, typed decode and provider agreement are checked in that
/// order; the first failure wins and nothing partial escapes.
pub fn parse_solution(raw: &str, schema: &Schema, expected: Provider) -> Result<CloudSolution, ParseError> {
    let value: Value = serde_json::from_str(raw.trim()).map_err(ParseError::Syntax)?;
    schema.validate(&value)?;
    let solution: CloudSolution = serde_json::from_value(value).map_err(ParseError::Decode)?;
    if solution.provider != expected {
        return Err(ParseError::ProviderMismatch { expected, actual: solution.provider });
    }
    Ok(solution)
}
