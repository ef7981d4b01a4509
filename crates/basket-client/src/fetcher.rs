use std::time::Duration;

use async_trait::async_trait;
use basket_core::error::AppError;
use basket_core::http::{HttpMethod, HttpRequest, HttpResponse};
use basket_core::traits::HttpClient;
use reqwest::{Client, Method};

/// HTTP client using reqwest.
///
/// Returns every status code as an [`HttpResponse`]; only transport failures
/// become errors. Per-attempt timeouts are normally enforced by the retry
/// controller, so no overall timeout is set unless [`with_timeout`](Self::with_timeout)
/// is used.
#[derive(Clone)]
pub struct ReqwestClient {
    client: Client,
    timeout_ms: u64,
}

impl ReqwestClient {
    pub fn new() -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(concat!("Basket/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_ms: 0,
        })
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(concat!("Basket/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Post => Method::POST,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        // Anything but a malformed request is a transport failure.
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_ms)
            } else if e.is_builder() {
                AppError::HttpError(e.to_string())
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::NetworkError(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to read response body: {e}")))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        let cancel = request.cancel.clone();
        tokio::select! {
            result = self.exchange(request) => result,
            () = cancel.cancelled() => Err(AppError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use basket_core::config::{RateLimitConfig, RetryConfig, ScraperConfig};
    use basket_core::traits::Scraper;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::catalog::{CatalogApiScraper, CatalogEndpoints};

    #[tokio::test]
    async fn test_returns_body_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":"1"}"#))
            .mount(&server)
            .await;

        let client = ReqwestClient::new().unwrap();
        let response = client
            .send(HttpRequest::get(format!("{}/products/1", server.uri())))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.status_text, "OK");
        assert_eq!(response.body, r#"{"id":"1"}"#);
    }

    #[tokio::test]
    async fn test_server_error_is_a_response_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = ReqwestClient::new().unwrap();
        let response = client.send(HttpRequest::get(server.uri())).await.unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(response.status_line(), "503 Service Unavailable");
    }

    #[tokio::test]
    async fn test_sends_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = ReqwestClient::new().unwrap();
        let response = client
            .send(HttpRequest::get(server.uri()).with_header("x-api-key", "secret"))
            .await
            .unwrap();

        assert_eq!(response.status, 204);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let client = ReqwestClient::new().unwrap();
        let err = client
            .send(HttpRequest::get(format!("http://127.0.0.1:{port}/")))
            .await
            .unwrap_err();

        assert!(err.is_retryable(), "expected a retryable error, got {err:?}");
    }

    /// Accepts connections and closes each one without answering.
    async fn hang_up_listener() -> (String, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepts);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });
        (format!("http://{addr}/"), accepts)
    }

    #[tokio::test]
    async fn test_dropped_connection_is_retryable_network_error() {
        let (url, _) = hang_up_listener().await;

        let client = ReqwestClient::new().unwrap();
        let err = client.send(HttpRequest::get(url)).await.unwrap_err();

        assert!(matches!(err, AppError::NetworkError(_)), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_dropped_connection_is_retried_to_exhaustion() {
        let (url, accepts) = hang_up_listener().await;
        let config = ScraperConfig::new(&url)
            .unwrap()
            .with_rate_limit(RateLimitConfig::new(1000.0, 1))
            .with_retry(RetryConfig::new(2, Duration::from_millis(1)));
        let scraper = CatalogApiScraper::new(
            "hang-up",
            config,
            CatalogEndpoints::default(),
            Arc::new(ReqwestClient::new().unwrap()),
        )
        .unwrap();

        let err = scraper.get_product("1").await.unwrap_err();

        assert!(matches!(err, AppError::RetryExhausted { attempts: 3, .. }), "got {err:?}");
        assert!(matches!(err.root(), AppError::NetworkError(_)));
        assert_eq!(accepts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let request = HttpRequest::get(server.uri()).with_cancellation(cancel.clone());
        let client = ReqwestClient::new().unwrap();

        let canceller = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        };
        let (result, ()) = tokio::join!(client.send(request), canceller);

        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[tokio::test]
    async fn test_client_timeout_maps_to_timeout_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = ReqwestClient::with_timeout(Duration::from_millis(50)).unwrap();
        let err = client.send(HttpRequest::get(server.uri())).await.unwrap_err();

        assert!(matches!(err, AppError::Timeout(50)));
    }
}
