//! LLM-based route classification.

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::route::Route;
use strato_llm::{ChatClient, GenerationOptions};
use strato_profile::ProfileRegistry;

/// System prompt for the router model.
pub const CLASSIFICATION_PROMPT: &str = "\
You are a request classifier. Classify the user request into exactly one of:

MATH - integration, differentiation, equation solving, calculations, limits, summations
SIMPLE_CODE - single functions, small algorithms, bug fixes, single-file scripts
COMPLEX_CODE - system architecture, multi-component applications, API design, full-stack work
REASONING - comparisons, trade-off analysis, pros/cons, analytical questions
RESEARCH - in-depth research, current events, latest developments, multi-source investigation
SELF_HANDLE - general conversation, quick facts, simple questions, everything else

Respond with ONLY the route name in uppercase. Nothing else.";

/// Outcome of classifying one turn.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    /// Chosen route.
    pub route: Route,
    /// Classification latency.
    pub latency_ms: u128,
    /// Raw classifier output, kept for diagnostics.
    pub raw: String,
}

/// Classifies turns with the active profile's router model.
pub struct Router {
    client: Arc<dyn ChatClient>,
    profiles: Arc<ProfileRegistry>,
}

impl Router {
    /// Create a router.
    #[must_use]
    pub fn new(client: Arc<dyn ChatClient>, profiles: Arc<ProfileRegistry>) -> Self {
        Self { client, profiles }
    }

    /// Classify a user message into a route.
    ///
    /// The router model is read from the active profile on every call so
    /// profile switches take effect immediately. Unparseable or failed
    /// classifications fall back to [`Route::Reasoning`], the most capable
    /// general route.
    pub async fn classify(&self, user_message: &str) -> RouteDecision {
        let started = Instant::now();
        let router_model = self.profiles.active().roles.router.clone();

        let prompt = format!("USER REQUEST: {user_message}");
        let raw = match self
            .client
            .complete_simple(
                &router_model,
                &format!("{CLASSIFICATION_PROMPT}\n\n{prompt}"),
                GenerationOptions::classification(),
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "classification call failed, defaulting to REASONING");
                return RouteDecision {
                    route: Route::Reasoning,
                    latency_ms: started.elapsed().as_millis(),
                    raw: String::new(),
                };
            },
        };

        let route = parse_route(&raw);
        let latency_ms = started.elapsed().as_millis();
        info!(%route, latency_ms, "request classified");

        RouteDecision {
            route,
            latency_ms,
            raw,
        }
    }
}

/// Normalize the classifier output and map it to a route.
///
/// Exact match first; otherwise scan for any known route label inside the
/// response (models sometimes pad the answer); REASONING as the last resort.
fn parse_route(raw: &str) -> Route {
    let normalized = raw.trim().to_uppercase();

    if let Some(route) = Route::from_label(&normalized) {
        return route;
    }

    for route in Route::ALL {
        if normalized.contains(route.label()) {
            warn!(raw = %normalized, extracted = %route, "extracted route from padded response");
            return route;
        }
    }

    warn!(raw = %normalized, "classification unclear, defaulting to REASONING");
    Route::Reasoning
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use strato_llm::{ChatRequest, ChatResponse, LlmError, LlmResult, StreamBox};

    struct FixedClassifier(&'static str);

    #[async_trait]
    impl ChatClient for FixedClassifier {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn stream(&self, _request: ChatRequest) -> LlmResult<StreamBox> {
            Err(LlmError::RequestFailed("not used".to_string()))
        }

        async fn complete(&self, _request: ChatRequest) -> LlmResult<ChatResponse> {
            Ok(ChatResponse {
                message: strato_llm::ChatMessage::assistant(self.0),
                tool_calls: Vec::new(),
                stop_reason: strato_llm::StopReason::EndTurn,
                usage: strato_llm::Usage::default(),
            })
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl ChatClient for FailingClassifier {
        fn name(&self) -> &str {
            "failing"
        }

        async fn stream(&self, _request: ChatRequest) -> LlmResult<StreamBox> {
            Err(LlmError::RequestFailed("down".to_string()))
        }

        async fn complete(&self, _request: ChatRequest) -> LlmResult<ChatResponse> {
            Err(LlmError::RequestFailed("down".to_string()))
        }
    }

    fn router(client: impl ChatClient + 'static) -> Router {
        Router::new(
            Arc::new(client),
            Arc::new(ProfileRegistry::with_builtin("performance").unwrap()),
        )
    }

    #[test]
    fn test_parse_route_exact() {
        assert_eq!(parse_route("MATH"), Route::Math);
        assert_eq!(parse_route("  simple_code \n"), Route::SimpleCode);
    }

    #[test]
    fn test_parse_route_substring() {
        assert_eq!(
            parse_route("The route is RESEARCH because..."),
            Route::Research
        );
    }

    #[test]
    fn test_parse_route_fallback() {
        assert_eq!(parse_route("no idea"), Route::Reasoning);
        assert_eq!(parse_route(""), Route::Reasoning);
    }

    #[tokio::test]
    async fn test_classify_math() {
        let decision = router(FixedClassifier("MATH"))
            .classify("integrate x^2 + 3x")
            .await;
        assert_eq!(decision.route, Route::Math);
        assert_eq!(decision.raw, "MATH");
    }

    #[tokio::test]
    async fn test_classifier_error_falls_back() {
        let decision = router(FailingClassifier).classify("anything").await;
        assert_eq!(decision.route, Route::Reasoning);
    }
}
