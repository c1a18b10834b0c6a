//! One-shot shutdown signal.
//!
//! Best effort: a failure here is reported as `ShutdownSignalFailed` and
//! never replaces the result of the primary exchange.

use pfurl_shared::protocol::{ActionRequest, Message};
use pfurl_shared::{Error, Result};
use tracing::info;

use crate::exchange::{HttpExchange, RequestBody};

/// Ask the remote service to terminate, through the same exchange as the
/// primary request. The reply body is ignored.
pub async fn send_shutdown(exchange: &HttpExchange, wrapper: Option<&str>) -> Result<()> {
    let body = Message::from(ActionRequest::shutdown()).to_body(wrapper)?;
    info!("Sending shutdown signal to {}", exchange.config().url);

    exchange
        .send(RequestBody::Message(body))
        .await
        .map(|_| ())
        .map_err(|e| Error::ShutdownSignalFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{parse_target, ExchangeConfig};
    use axum::routing::post;
    use axum::Router;
    use reqwest::Method;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_shutdown_message_is_wrapped() {
        let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
        let recorder = seen.clone();
        let app = Router::new().route(
            "/",
            post(move |body: String| {
                let recorder = recorder.clone();
                async move {
                    recorder.lock().unwrap().push(serde_json::from_str(&body).unwrap());
                    "bye"
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let config = ExchangeConfig::new(Method::POST, parse_target(&addr.to_string()).unwrap());
        let exchange = HttpExchange::new(config).unwrap();
        send_shutdown(&exchange, Some("payload")).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["payload"]["action"], "quit");
        assert_eq!(seen[0]["payload"]["meta"]["when"], "now");
    }

    #[tokio::test]
    async fn test_failure_is_shutdown_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ExchangeConfig::new(Method::POST, parse_target(&addr.to_string()).unwrap());
        let exchange = HttpExchange::new(config).unwrap();
        let err = send_shutdown(&exchange, None).await.unwrap_err();
        assert!(matches!(err, Error::ShutdownSignalFailed(_)));
    }
}
