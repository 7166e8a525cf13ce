//! Extractor output schema validation (spec.md §4.5).
//!
//! Grounded on `QuarantinedLLM._validate_output` in
//! `examples/original_source/camel/llm.py`: the quarantined extractor's
//! result is a bare scalar, never a tool call, and is only ever trusted by
//! the rest of the system after it passes one of these fixed schemas.

use thiserror::Error;

/// A schema the extractor's raw output must satisfy before it is wrapped
/// into a program value and handed back to the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorSchema {
    /// Must contain `@` and a `.` after it, matching the reference
    /// implementation's deliberately loose email check.
    Email,
    /// Must be no longer than 1000 characters.
    String,
    /// Must not contain any of `<>:"/\|?*`.
    Filename,
    /// Must parse as a base-10 integer.
    Integer,
}

/// The extractor's output did not satisfy its declared schema.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("output does not satisfy schema {schema:?}: {reason}")]
pub struct SchemaViolation {
    /// The schema that was not satisfied.
    pub schema: ExtractorSchema,
    /// A human-readable reason for the failure.
    pub reason: String,
}

const FILENAME_FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Validate `output` against `schema`, returning the validated string
/// unchanged on success.
pub fn validate(schema: ExtractorSchema, output: &str) -> Result<String, SchemaViolation> {
    match schema {
        ExtractorSchema::Email => {
            let at = output.find('@').ok_or_else(|| SchemaViolation {
                schema,
                reason: "missing '@'".to_string(),
            })?;
            if !output[at..].contains('.') {
                return Err(SchemaViolation {
                    schema,
                    reason: "missing '.' after '@'".to_string(),
                });
            }
            Ok(output.to_string())
        }
        ExtractorSchema::String => {
            if output.len() > 1000 {
                Err(SchemaViolation {
                    schema,
                    reason: "exceeds 1000 characters".to_string(),
                })
            } else {
                Ok(output.to_string())
            }
        }
        ExtractorSchema::Filename => {
            if let Some(c) = output.chars().find(|c| FILENAME_FORBIDDEN.contains(c)) {
                Err(SchemaViolation {
                    schema,
                    reason: format!("contains forbidden character '{c}'"),
                })
            } else {
                Ok(output.to_string())
            }
        }
        ExtractorSchema::Integer => output.parse::<i64>().map(|_| output.to_string()).map_err(|_| SchemaViolation {
            schema,
            reason: "not a valid integer".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_email() {
        assert!(validate(ExtractorSchema::Email, "alice@company.com").is_ok());
    }

    #[test]
    fn rejects_email_without_at() {
        assert!(validate(ExtractorSchema::Email, "alice.company.com").is_err());
    }

    #[test]
    fn rejects_email_without_dot_after_at() {
        assert!(validate(ExtractorSchema::Email, "alice@company").is_err());
    }

    #[test]
    fn accepts_string_under_limit() {
        assert!(validate(ExtractorSchema::String, "hello").is_ok());
    }

    #[test]
    fn rejects_string_over_limit() {
        let long = "a".repeat(1001);
        assert!(validate(ExtractorSchema::String, &long).is_err());
    }

    #[test]
    fn rejects_filename_with_path_traversal_characters() {
        assert!(validate(ExtractorSchema::Filename, "../etc/passwd").is_err());
    }

    #[test]
    fn accepts_plain_filename() {
        assert!(validate(ExtractorSchema::Filename, "quarterly_report.pdf").is_ok());
    }

    #[test]
    fn integer_schema_round_trips() {
        assert_eq!(validate(ExtractorSchema::Integer, "42").unwrap(), "42");
        assert!(validate(ExtractorSchema::Integer, "not a number").is_err());
    }
}
