use serde_json::Value;

/// Error reported by a schema when data does not conform.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct SchemaError(pub String);

impl SchemaError {
    pub fn new(message: impl Into<String>) -> Self {
        SchemaError(message.into())
    }
}

/// Result of a non-raising parse.
#[derive(Debug, Clone, PartialEq)]
pub enum SafeParse {
    Success(Value),
    Failure(SchemaError),
}

/// A schema that validates (and may transform) a materialized model.
///
/// Any validation library can be adapted to this two-method shape.
/// `parse` fails on invalid input; `safe_parse` never does.
pub trait Schema: Send + Sync {
    fn parse(&self, data: &Value) -> Result<Value, SchemaError>;

    fn safe_parse(&self, data: &Value) -> SafeParse {
        match self.parse(data) {
            Ok(value) => SafeParse::Success(value),
            Err(error) => SafeParse::Failure(error),
        }
    }
}

impl<F> Schema for F
where
    F: Fn(&Value) -> Result<Value, SchemaError> + Send + Sync,
{
    fn parse(&self, data: &Value) -> Result<Value, SchemaError> {
        self(data)
    }
}

/// Outcome of validating one model.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub valid: bool,
    pub data: Value,
    pub error: Option<String>,
}

/// Runs a schema against model data.
///
/// In strict mode an invalid model is an `Err`. In non-strict mode the
/// adapter must always return `Ok`, reporting failure through
/// [`Validation::valid`].
pub trait SchemaAdapter: Send + Sync {
    fn validate(&self, schema: &dyn Schema, data: &Value, strict: bool)
    -> Result<Validation, SchemaError>;
}

/// Default adapter: `parse` when strict, `safe_parse` otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseAdapter;

impl SchemaAdapter for ParseAdapter {
    fn validate(
        &self,
        schema: &dyn Schema,
        data: &Value,
        strict: bool,
    ) -> Result<Validation, SchemaError> {
        if strict {
            let parsed = schema.parse(data)?;
            return Ok(Validation {
                valid: true,
                data: parsed,
                error: None,
            });
        }

        Ok(match schema.safe_parse(data) {
            SafeParse::Success(parsed) => Validation {
                valid: true,
                data: parsed,
                error: None,
            },
            SafeParse::Failure(error) => Validation {
                valid: false,
                data: data.clone(),
                error: Some(error.to_string()),
            },
        })
    }
}
