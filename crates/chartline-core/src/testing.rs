//! In-process stand-ins for the network, for tests and offline dry runs

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::CallError;
use crate::http::{HttpRequest, HttpResponse, Transport};

type Scripted = Result<HttpResponse, CallError>;
type Handler = Box<dyn Fn(&HttpRequest) -> Option<Scripted> + Send + Sync>;

/// [`Transport`] that replays canned responses and records every request.
///
/// Lookup order for each request:
/// 1. the first route whose fragment occurs in the URL and still has responses
/// 2. the handler, if one is set and it returns `Some`
/// 3. the shared FIFO queue
///
/// Anything unscripted gets a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    routes: Vec<(String, VecDeque<Scripted>)>,
    queue: VecDeque<Scripted>,
    handler: Option<Handler>,
    requests: Vec<HttpRequest>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next request not matched by a route.
    pub fn push(&self, response: HttpResponse) {
        self.lock().queue.push_back(Ok(response));
    }

    pub fn push_ok(&self, body: impl Into<String>) {
        self.push(HttpResponse::new(200, body));
    }

    pub fn push_status(&self, status: u16) {
        self.push(HttpResponse::new(status, ""));
    }

    pub fn push_network_error(&self, msg: &str) {
        self.lock()
            .queue
            .push_back(Err(CallError::Transport(msg.to_string())));
    }

    /// Queue a response for requests whose URL contains `fragment`.
    pub fn route(&self, fragment: &str, response: HttpResponse) {
        self.route_result(fragment, Ok(response));
    }

    pub fn route_result(&self, fragment: &str, response: Scripted) {
        let mut inner = self.lock();
        match inner.routes.iter().position(|(f, _)| f == fragment) {
            Some(idx) => inner.routes[idx].1.push_back(response),
            None => inner
                .routes
                .push((fragment.to_string(), VecDeque::from([response]))),
        }
    }

    /// Compute responses on the fly (after routes, before the queue).
    pub fn set_handler(
        &self,
        handler: impl Fn(&HttpRequest) -> Option<Scripted> + Send + Sync + 'static,
    ) {
        self.lock().handler = Some(Box::new(handler));
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    /// Number of requests whose URL contains `fragment`.
    pub fn count(&self, fragment: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.url.contains(fragment))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, CallError> {
        let mut inner = self.lock();
        inner.requests.push(request.clone());

        let routed = inner
            .routes
            .iter_mut()
            .find(|(fragment, queue)| request.url.contains(fragment.as_str()) && !queue.is_empty())
            .and_then(|(_, queue)| queue.pop_front());
        if let Some(response) = routed {
            return response;
        }
        if let Some(response) = inner.handler.as_ref().and_then(|h| h(request)) {
            return response;
        }
        inner
            .queue
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::new(404, "unscripted request")))
    }
}
