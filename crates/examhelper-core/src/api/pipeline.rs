//! Request/response middleware applied by the API client's transport.
//!
//! Every outgoing request passes through the request middlewares in
//! registration order before it is sent, and every outcome (response or
//! error) passes through the response middlewares in registration order
//! before it reaches the caller.
//!
//! The standard pipeline is built with [`Pipeline::session_aware`]:
//! [`BearerAuth`] attaches the stored token, and [`SessionGuard`] clears the
//! session and requests an application reset on 401/403.

use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Request;
use tracing::{debug, warn};

use crate::auth::{SessionEvents, SessionStore};

use super::ApiError;

/// Transform applied to each request before it is sent.
pub trait RequestMiddleware: Send + Sync {
    fn handle(&self, request: Request) -> Result<Request, ApiError>;
}

/// Transform applied to each outcome before it is returned.
pub trait ResponseMiddleware<R>: Send + Sync {
    fn handle(&self, outcome: Result<R, ApiError>) -> Result<R, ApiError>;
}

/// Ordered middleware chains.
pub struct Pipeline<R = reqwest::Response> {
    request: Vec<Arc<dyn RequestMiddleware>>,
    response: Vec<Arc<dyn ResponseMiddleware<R>>>,
}

impl<R> Clone for Pipeline<R> {
    fn clone(&self) -> Self {
        Self {
            request: self.request.clone(),
            response: self.response.clone(),
        }
    }
}

impl<R> Default for Pipeline<R> {
    fn default() -> Self {
        Self {
            request: Vec::new(),
            response: Vec::new(),
        }
    }
}

impl<R: 'static> Pipeline<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bearer token injection plus authentication failure recovery
    pub fn session_aware(store: Arc<dyn SessionStore>, events: SessionEvents) -> Self {
        Self::new()
            .with_request(BearerAuth::new(store.clone()))
            .with_response(SessionGuard::new(store, events))
    }

    pub fn with_request(mut self, middleware: impl RequestMiddleware + 'static) -> Self {
        self.request.push(Arc::new(middleware));
        self
    }

    pub fn with_response(mut self, middleware: impl ResponseMiddleware<R> + 'static) -> Self {
        self.response.push(Arc::new(middleware));
        self
    }

    pub fn apply_request(&self, request: Request) -> Result<Request, ApiError> {
        self.request
            .iter()
            .try_fold(request, |req, middleware| middleware.handle(req))
    }

    pub fn apply_response(&self, outcome: Result<R, ApiError>) -> Result<R, ApiError> {
        self.response
            .iter()
            .fold(outcome, |outcome, middleware| middleware.handle(outcome))
    }
}

/// Sets `Authorization: Bearer <token>` from the session store.
pub struct BearerAuth {
    store: Arc<dyn SessionStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

impl RequestMiddleware for BearerAuth {
    fn handle(&self, mut request: Request) -> Result<Request, ApiError> {
        let Some(token) = self.store.token() else {
            debug!(url = %request.url(), "No session token, sending unauthenticated");
            return Ok(request);
        };

        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ApiError::InvalidToken)?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(request)
    }
}

/// Clears the session and requests a reset when the server answers 401/403.
///
/// The original outcome is always passed on unchanged.
pub struct SessionGuard {
    store: Arc<dyn SessionStore>,
    events: SessionEvents,
}

impl SessionGuard {
    pub fn new(store: Arc<dyn SessionStore>, events: SessionEvents) -> Self {
        Self { store, events }
    }
}

impl<R> ResponseMiddleware<R> for SessionGuard {
    fn handle(&self, outcome: Result<R, ApiError>) -> Result<R, ApiError> {
        if let Err(error) = &outcome {
            if error.is_auth_failure() {
                warn!(error = %error, "Authentication rejected, clearing session");
                if let Err(e) = self.store.clear() {
                    warn!(error = %e, "Failed to clear session");
                }
                if let Some(status) = error.status() {
                    self.events.request_reset(status);
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{KeyValueStorage, MemoryStorage, Session, SessionEvent, SESSION_KEY};
    use reqwest::{Method, StatusCode, Url};

    struct Fixture {
        storage: Arc<MemoryStorage>,
        events: SessionEvents,
        pipeline: Pipeline<&'static str>,
    }

    fn fixture(stored: Option<&str>) -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        if let Some(raw) = stored {
            storage.set(SESSION_KEY, raw).unwrap();
        }
        let events = SessionEvents::new();
        let store: Arc<dyn SessionStore> = Arc::new(Session::new(storage.clone()));
        Fixture {
            storage,
            events: events.clone(),
            pipeline: Pipeline::session_aware(store, events),
        }
    }

    fn request() -> Request {
        Request::new(Method::GET, Url::parse("http://localhost:8080/api/tasks?userId=1").unwrap())
    }

    fn authorization(fx: &Fixture) -> Option<String> {
        let req = fx.pipeline.apply_request(request()).unwrap();
        req.headers()
            .get(AUTHORIZATION)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[test]
    fn test_no_session_adds_no_header() {
        assert_eq!(authorization(&fixture(None)), None);
    }

    #[test]
    fn test_token_becomes_bearer_header() {
        let fx = fixture(Some(r#"{"id":1,"username":"lin","token":"abc"}"#));
        assert_eq!(authorization(&fx).as_deref(), Some("Bearer abc"));
    }

    #[test]
    fn test_unparsable_session_sends_unauthenticated() {
        assert_eq!(authorization(&fixture(Some("not-json"))), None);
    }

    #[test]
    fn test_session_without_token_leaves_request_unmodified() {
        let fx = fixture(Some(r#"{"id":1,"username":"lin"}"#));
        let original = request();
        let headers_before = original.headers().clone();
        let req = fx.pipeline.apply_request(original).unwrap();
        assert_eq!(req.headers(), &headers_before);
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.url().as_str(), "http://localhost:8080/api/tasks?userId=1");
    }

    #[test]
    fn test_bearer_header_replaces_existing_and_is_sensitive() {
        let fx = fixture(Some(r#"{"token":"new"}"#));
        let mut req = request();
        req.headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer old"));
        let req = fx.pipeline.apply_request(req).unwrap();
        let value = req.headers().get(AUTHORIZATION).unwrap();
        assert_eq!(value, "Bearer new");
        assert!(value.is_sensitive());
    }

    #[test]
    fn test_unencodable_token_fails_the_request() {
        let fx = fixture(Some(r#"{"token":"abc\ndef"}"#));
        let result = fx.pipeline.apply_request(request());
        assert!(matches!(result, Err(ApiError::InvalidToken)));
    }

    #[test]
    fn test_success_passes_through() {
        let fx = fixture(Some(r#"{"token":"abc"}"#));
        assert_eq!(fx.pipeline.apply_response(Ok("body")).unwrap(), "body");
        assert!(fx.storage.get(SESSION_KEY).unwrap().is_some());
        assert!(!fx.events.is_reset_pending());
    }

    #[tokio::test]
    async fn test_401_clears_session_and_requests_reset() {
        let fx = fixture(Some(r#"{"token":"abc"}"#));
        let mut rx = fx.events.subscribe();

        let result = fx.pipeline.apply_response(Err(ApiError::Unauthorized));

        assert!(matches!(result, Err(ApiError::Unauthorized)));
        assert_eq!(fx.storage.get(SESSION_KEY).unwrap(), None);
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::Unauthenticated { status: StatusCode::UNAUTHORIZED }
        );
    }

    #[tokio::test]
    async fn test_403_clears_session_and_requests_reset() {
        let fx = fixture(Some(r#"{"token":"abc"}"#));
        let mut rx = fx.events.subscribe();

        let result = fx
            .pipeline
            .apply_response(Err(ApiError::AccessDenied("Access denied".into())));

        assert!(matches!(result, Err(ApiError::AccessDenied(ref body)) if body == "Access denied"));
        assert_eq!(fx.storage.get(SESSION_KEY).unwrap(), None);
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::Unauthenticated { status: StatusCode::FORBIDDEN }
        );
    }

    #[test]
    fn test_server_error_leaves_session_alone() {
        let fx = fixture(Some(r#"{"token":"abc"}"#));
        let result = fx
            .pipeline
            .apply_response(Err(ApiError::ServerError("boom".into())));

        assert!(matches!(result, Err(ApiError::ServerError(_))));
        assert!(fx.storage.get(SESSION_KEY).unwrap().is_some());
        assert!(!fx.events.is_reset_pending());
    }

    #[tokio::test]
    async fn test_network_failure_leaves_session_alone() {
        let fx = fixture(Some(r#"{"token":"abc"}"#));
        // Nothing listens on port 9 of the loopback interface
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:9/")
            .send()
            .await
            .unwrap_err();
        let result = fx.pipeline.apply_response(Err(ApiError::NetworkError(err)));

        assert!(matches!(result, Err(ApiError::NetworkError(_))));
        assert!(fx.storage.get(SESSION_KEY).unwrap().is_some());
        assert!(!fx.events.is_reset_pending());
    }

    #[tokio::test]
    async fn test_repeated_401s_are_harmless() {
        let fx = fixture(Some(r#"{"token":"abc"}"#));
        let mut rx = fx.events.subscribe();

        let first = fx.pipeline.apply_response(Err(ApiError::Unauthorized));
        let second = fx.pipeline.apply_response(Err(ApiError::Unauthorized));

        assert!(matches!(first, Err(ApiError::Unauthorized)));
        assert!(matches!(second, Err(ApiError::Unauthorized)));
        assert_eq!(fx.storage.get(SESSION_KEY).unwrap(), None);
        assert!(rx.recv().await.is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_middlewares_run_in_registration_order() {
        struct Tag(&'static str);
        impl RequestMiddleware for Tag {
            fn handle(&self, mut request: Request) -> Result<Request, ApiError> {
                request
                    .headers_mut()
                    .append("x-order", HeaderValue::from_static(self.0));
                Ok(request)
            }
        }

        let pipeline: Pipeline<()> = Pipeline::new()
            .with_request(Tag("first"))
            .with_request(Tag("second"));
        let req = pipeline.apply_request(request()).unwrap();
        let order: Vec<_> = req.headers().get_all("x-order").iter().collect();
        assert_eq!(order, vec!["first", "second"]);
    }
}
