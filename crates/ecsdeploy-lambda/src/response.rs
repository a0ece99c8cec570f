// HTTP response builders for Lambda
//
// Converts internal response format to the API Gateway REST proxy response

use aws_lambda_events::{
    apigw::ApiGatewayProxyResponse,
    encodings::Body,
    http::{header::CONTENT_TYPE, HeaderValue},
};
use serde_json::json;

use crate::error::HandlerError;

/// Internal HTTP response data
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponseData {
    pub status_code: u16,
    pub body: String,
    pub content_type: &'static str,
}

impl HttpResponseData {
    pub fn json(status_code: u16, body: String) -> Self {
        Self {
            status_code,
            body,
            content_type: "application/json",
        }
    }

    pub fn error(err: &HandlerError) -> Self {
        Self::json(
            err.status_code(),
            json!({ "error": err.error_type(), "message": err.to_string() }).to_string(),
        )
    }

    /// Parsed JSON body, for assertions and logging
    pub fn body_json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Build API Gateway v1 response from internal response data
pub fn build_api_gateway_response(data: HttpResponseData) -> ApiGatewayProxyResponse {
    let mut response = ApiGatewayProxyResponse::default();
    response.status_code = i64::from(data.status_code);
    response.body = Some(Body::Text(data.body));
    response.is_base64_encoded = false;
    response
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static(data.content_type));
    response
}
