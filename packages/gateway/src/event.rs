//! Builds the API-Gateway v1 event object handed to the RIE, matching the
//! shape a real AWS API Gateway proxy integration would send.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Serialize)]
pub struct ApiGatewayEvent {
    #[serde(rename = "httpMethod")]
    pub http_method: String,
    pub path: String,
    pub resource: String,
    #[serde(rename = "pathParameters")]
    pub path_parameters: HashMap<String, String>,
    #[serde(rename = "queryStringParameters")]
    pub query_string_parameters: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: String,
    #[serde(rename = "requestContext")]
    pub request_context: Value,
}

pub fn build(
    method: &str,
    path: &str,
    resource: &str,
    path_parameters: HashMap<String, String>,
    query_string_parameters: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: String,
    authorizer_subject: &str,
    request_id: &str,
) -> ApiGatewayEvent {
    ApiGatewayEvent {
        http_method: method.to_string(),
        path: path.to_string(),
        resource: resource.to_string(),
        path_parameters,
        query_string_parameters,
        headers,
        body,
        request_context: json!({
            "requestId": request_id,
            "authorizer": {
                "cognito:username": authorizer_subject,
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_embeds_authorizer_subject_and_request_id() {
        let event = build(
            "GET",
            "/items/42",
            "/items/{id}",
            HashMap::from([("id".to_string(), "42".to_string())]),
            HashMap::new(),
            HashMap::new(),
            String::new(),
            "alice",
            "trace-123",
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["requestContext"]["authorizer"]["cognito:username"], "alice");
        assert_eq!(value["requestContext"]["requestId"], "trace-123");
        assert_eq!(value["resource"], "/items/{id}");
        assert_eq!(value["pathParameters"]["id"], "42");
    }
}
