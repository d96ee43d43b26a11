//! Provider webhook handler
//!
//! Public route. Providers retry on any non-2xx answer, so only failures
//! worth retrying (store errors, provider API errors) return 5xx.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use tracing::{info, warn};

use domain_payments::{GatewayType, PaymentError, WebhookRequest};

use crate::dto::payments::WebhookAck;
use crate::{error::ApiError, AppState};

/// Copies the HTTP request into the form adapters verify
fn webhook_request(headers: &HeaderMap, query: HashMap<String, String>, body: Bytes) -> WebhookRequest {
    let mut request = WebhookRequest::new(body.to_vec());
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }
    for (name, value) in query {
        request = request.with_query(name, value);
    }
    request
}

pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(gateway_type): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let gateway_type: GatewayType = gateway_type.parse()?;
    let request = webhook_request(&headers, query, body);

    match state.service.handle_webhook(gateway_type, &request).await {
        Ok(outcome) => {
            info!(gateway_type = %gateway_type, outcome = outcome.label(), "Webhook handled");
            Ok(Json(WebhookAck::Handled(outcome)))
        }
        Err(PaymentError::NotFound { entity, id }) => {
            warn!(
                gateway_type = %gateway_type,
                entity = %entity,
                id = %id,
                "Webhook for unknown transaction acknowledged"
            );
            Ok(Json(WebhookAck::unknown_transaction()))
        }
        Err(err) => {
            warn!(gateway_type = %gateway_type, error = %err, "Webhook refused");
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_webhook_request_copies_headers_and_query() {
        let mut headers = HeaderMap::new();
        headers.insert("x-signature", HeaderValue::from_static("ts=1,v1=abc"));
        headers.insert("x-request-id", HeaderValue::from_static("req-1"));
        let query = HashMap::from([("data.id".to_string(), "123".to_string())]);

        let request = webhook_request(&headers, query, Bytes::from_static(b"{\"a\":1}"));

        assert_eq!(request.header("X-Signature"), Some("ts=1,v1=abc"));
        assert_eq!(request.header("x-request-id"), Some("req-1"));
        assert_eq!(request.query_param("data.id"), Some("123"));
        assert_eq!(request.body(), b"{\"a\":1}");
    }
}
