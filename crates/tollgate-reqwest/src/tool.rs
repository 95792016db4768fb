//! Tool facade: schema-checked invocation of priced endpoints.
//!
//! A [`Tool`] wraps one HTTP endpoint with a name, a JSON input schema, and
//! a method. Invocation checks the schema's required fields, shapes the
//! request (query parameters for GET/DELETE, JSON body otherwise), and
//! delegates to a payment-aware client.

use http::Method;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::Value;

/// Declaration of a remote tool.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the input object; only `required` is enforced
    /// client-side, the server remains the authority.
    pub input_schema: Value,
    pub endpoint: String,
    pub method: Method,
    /// Extra headers attached to every invocation.
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),
    #[error(transparent)]
    Http(#[from] reqwest_middleware::Error),
    #[error(transparent)]
    Body(#[from] reqwest::Error),
}

/// Outcome of a tool invocation.
#[derive(Debug)]
pub struct ToolResponse {
    pub ok: bool,
    pub status: u16,
    /// Decoded JSON when the content type permits, else the raw text.
    pub data: Value,
}

/// A declared tool bound to a payment-aware client.
pub struct Tool {
    definition: ToolDefinition,
    client: ClientWithMiddleware,
}

impl Tool {
    pub fn new(definition: ToolDefinition, client: ClientWithMiddleware) -> Self {
        Self { definition, client }
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    pub async fn invoke(&self, input: Value) -> Result<ToolResponse, ToolError> {
        self.check_required(&input)?;

        let method = self.definition.method.clone();
        let mut request = self
            .client
            .request(method.clone(), &self.definition.endpoint);
        for (name, value) in &self.definition.headers {
            request = request.header(name, value);
        }
        request = match method {
            Method::GET | Method::DELETE => request.query(&query_pairs(&input)),
            _ => request.json(&input),
        };

        let response = request.send().await?;
        let status = response.status();
        let is_json = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|content_type| content_type.contains("json"));
        let data = if is_json {
            response.json::<Value>().await?
        } else {
            Value::String(response.text().await?)
        };

        Ok(ToolResponse {
            ok: status.is_success(),
            status: status.as_u16(),
            data,
        })
    }

    fn check_required(&self, input: &Value) -> Result<(), ToolError> {
        let required = self
            .definition
            .input_schema
            .get("required")
            .and_then(Value::as_array);
        for name in required.into_iter().flatten().filter_map(Value::as_str) {
            match input.get(name) {
                Some(value) if !value.is_null() => {}
                _ => return Err(ToolError::MissingRequiredField(name.to_string())),
            }
        }
        Ok(())
    }
}

/// Stringifies input entries for the query string: strings verbatim,
/// everything else as its JSON rendering.
fn query_pairs(input: &Value) -> Vec<(String, String)> {
    let Some(object) = input.as_object() else {
        return Vec::new();
    };
    object
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_pairs_stringify() {
        let pairs = query_pairs(&json!({"city": "London", "days": 3, "metric": true}));
        assert!(pairs.contains(&("city".to_string(), "London".to_string())));
        assert!(pairs.contains(&("days".to_string(), "3".to_string())));
        assert!(pairs.contains(&("metric".to_string(), "true".to_string())));
    }

    #[test]
    fn test_query_pairs_non_object() {
        assert!(query_pairs(&json!("just a string")).is_empty());
    }
}
