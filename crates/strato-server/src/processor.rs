//! The per-request turn processor run by queue workers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::AppContext;
use strato_core::{ArtifactSummary, ClientEvent, RequestId, StatusKind, StratoError};
use strato_hub::SessionHub;
use strato_llm::{ChatMessage, GenerationOptions, ThinkingDirective};
use strato_pipeline::{PipelineError, enrich_message, split_message, strategy_for_interface};
use strato_profile::ThinkingFormat;
use strato_queue::{ProcessOutcome, QueuedRequest, RequestProcessor};
use strato_router::{RequestOverrides, Route};
use strato_storage::{StoredMessage, StoredRole};
use strato_tools::ExecutionContext;

/// Live cancellation tokens for in-flight turns, so a WS `cancel` message
/// can reach the agent loop.
#[derive(Default)]
struct CancellationRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancellationRegistry {
    fn register(&self, request_id: &RequestId) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(request_id.to_string(), token.clone());
        }
        token
    }

    fn cancel(&self, request_id: &RequestId) -> bool {
        match self.tokens.lock() {
            Ok(tokens) => tokens
                .get(request_id.as_str())
                .map(CancellationToken::cancel)
                .is_some(),
            Err(_) => false,
        }
    }

    fn remove(&self, request_id: &RequestId) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.remove(request_id.as_str());
        }
    }
}

/// Runs the full preprocess → agent → postprocess pipeline for one request.
pub struct TurnProcessor {
    app: Arc<AppContext>,
    cancellations: CancellationRegistry,
}

impl TurnProcessor {
    /// Create a processor over the app context.
    #[must_use]
    pub fn new(app: Arc<AppContext>) -> Self {
        Self {
            app,
            cancellations: CancellationRegistry::default(),
        }
    }

    /// Cancel an in-flight turn (WS `cancel` path for processing requests).
    pub fn cancel_inflight(&self, request_id: &RequestId) -> bool {
        self.cancellations.cancel(request_id)
    }

    async fn run(&self, request: QueuedRequest) -> Result<ProcessOutcome, StratoError> {
        let app = &self.app;
        let hub: &Arc<SessionHub> = &app.hub;
        let cancel = self.cancellations.register(&request.request_id);

        // Tell the client processing began.
        if let Some(bot_id) = &request.bot_id {
            hub.send_to_client(
                bot_id,
                &ClientEvent::Processing {
                    request_id: request.request_id.clone(),
                },
            )
            .await;
            let kind = if request.file_refs.is_empty() {
                StatusKind::Thinking
            } else {
                StatusKind::ProcessingFiles
            };
            hub.send_status_indicator(
                bot_id,
                &request.channel_id,
                &request.message_id,
                kind,
                &request.request_id,
            )
            .await;
        }

        // Try to leave fallback before routing so the turn sees the profile
        // it will actually run under.
        app.profile_manager.check_and_recover().await;
        let profile = app.profiles.active();

        let user = app.load_or_create_user(&request.user_id).await?;

        // --- Preprocess ---------------------------------------------------
        let strategy = strategy_for_interface(&request.interface);
        let sanitized = strategy.sanitize_prompt(&request.message);

        let resolved = app.resolver.resolve(
            &RequestOverrides {
                model: request.model.clone(),
                temperature: request.temperature,
                thinking_enabled: request.thinking_enabled,
            },
            &user.preferences,
            &profile,
        );

        let artifact_intent = app
            .detector
            .detect(&resolved.artifact_detection_model, &sanitized)
            .await;

        let enriched = enrich_message(&request.message, &request.file_refs);

        let history = app
            .summarizer
            .maybe_summarize(
                &request.thread_id,
                &profile.roles.summarization,
                user.preferences.summarize_threshold(),
            )
            .await
            .map_err(StratoError::from)?;

        // --- Routing ------------------------------------------------------
        let (route, model) = if resolved.bypass_routing {
            let model = resolved.model.clone().unwrap_or_else(|| {
                Route::Reasoning.model(&profile.roles).to_string()
            });
            (Route::Reasoning, model)
        } else {
            let decision = app.router.classify(&sanitized).await;
            let model = decision.route.model(&profile.roles).to_string();
            (decision.route, model)
        };

        let capability = app.profiles.capabilities(&model);

        // --- Model residency ----------------------------------------------
        app.vram
            .ensure_loaded(&model, None)
            .await
            .map_err(StratoError::from)?;

        // --- Agent loop ---------------------------------------------------
        let thinking = match resolved.thinking_enabled {
            None => ThinkingDirective::ModelDefault,
            Some(true) if capability.thinking_format == ThinkingFormat::Level => {
                ThinkingDirective::Level(capability.default_thinking_level.clone())
            },
            Some(enabled) => ThinkingDirective::Enabled(enabled),
        };
        let options = GenerationOptions::default()
            .with_temperature(resolved.temperature)
            .with_keep_alive(capability.keep_alive.clone())
            .with_thinking(thinking);

        let system_prompt = app.composer.compose(
            route,
            artifact_intent,
            profile.fetch_limit(route.label()),
            user.preferences.base_prompt.as_deref(),
        );

        let mut messages: Vec<ChatMessage> = history
            .iter()
            .map(|m| match m.role {
                StoredRole::User => ChatMessage::user(&m.content),
                StoredRole::Assistant => ChatMessage::assistant(&m.content),
                StoredRole::System => ChatMessage::system(&m.content),
            })
            .collect();
        messages.push(ChatMessage::user(&enriched));

        let ctx = ExecutionContext {
            request_id: request.request_id.clone(),
            user_id: request.user_id.clone(),
            thread_id: request.thread_id.clone(),
            channel_id: request.channel_id.clone(),
            message_id: request.message_id.clone(),
            bot_id: request.bot_id.clone(),
            interface: request.interface.clone(),
            cancel: cancel.clone(),
            hub: Arc::clone(hub),
            file_refs: request.file_refs.clone(),
            artifacts_created: tokio::sync::Mutex::new(Vec::new()),
            artifact_dir: app.settings.temp_artifact_dir.clone(),
            workspace_dir: app.settings.temp_upload_dir.clone(),
            endpoints: app.endpoints.clone(),
        };

        let outcome = app
            .agent
            .run_turn(
                app.client_for(capability.backend),
                &ctx,
                &model,
                &system_prompt,
                messages,
                options,
                capability.supports_tools,
            )
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(PipelineError::Backend(message)) => {
                // A crashed backend feeds the circuit breaker; the request
                // itself still fails as unavailable.
                app.vram.record_crash(&model, "generation_failure").await;
                self.cancellations.remove(&request.request_id);
                return Err(StratoError::BackendUnavailable(message));
            },
            Err(e) => {
                self.cancellations.remove(&request.request_id);
                return Err(e.into());
            },
        };

        // --- Postprocess --------------------------------------------------
        let mut artifacts = ctx.artifacts().await;
        artifacts.extend(
            app.artifact_extractor
                .extract(
                    &resolved.artifact_extraction_model,
                    &request.message,
                    &outcome.response,
                    artifact_intent,
                    &app.settings.temp_artifact_dir,
                )
                .await,
        );
        let artifact_summaries: Vec<ArtifactSummary> = artifacts
            .iter()
            .map(|a| ArtifactSummary {
                artifact_id: a.artifact_id.clone(),
                filename: a.filename.clone(),
                size_bytes: a.size_bytes,
                artifact_type: a.artifact_type.as_str().to_string(),
            })
            .collect();

        let response = if let Some(limit) = strategy.chunk_limit() {
            split_message(&outcome.response, limit).join("\n")
        } else {
            outcome.response.clone()
        };

        // --- Persist & account --------------------------------------------
        self.persist_turn(&request, &outcome.response, outcome.tokens_used, &model)
            .await;

        if let Some(bot_id) = &request.bot_id {
            hub.send_to_client(
                bot_id,
                &ClientEvent::Result {
                    request_id: request.request_id.clone(),
                    response: response.clone(),
                    tokens_used: outcome.tokens_used,
                    artifacts: artifact_summaries.clone(),
                    channel_id: request.channel_id.clone(),
                    message_id: request.message_id.clone(),
                },
            )
            .await;
        }

        self.cancellations.remove(&request.request_id);
        info!(
            request_id = %request.request_id,
            %route,
            %model,
            tokens = outcome.tokens_used,
            artifacts = artifact_summaries.len(),
            "turn completed"
        );

        Ok(ProcessOutcome {
            response,
            tokens_used: outcome.tokens_used,
            artifacts: artifact_summaries,
        })
    }

    /// Store both sides of the turn and charge the user's budget. Failures
    /// here are logged, not fatal: the response already exists.
    async fn persist_turn(
        &self,
        request: &QueuedRequest,
        response: &str,
        tokens_used: u64,
        model: &str,
    ) {
        let app = &self.app;
        let user_message =
            StoredMessage::new(&request.thread_id, StoredRole::User, &request.message);
        if let Err(e) = app.conversations.append(user_message).await {
            warn!(error = %e, "could not persist user message");
        }
        let assistant_message =
            StoredMessage::new(&request.thread_id, StoredRole::Assistant, response)
                .with_model(model);
        if let Err(e) = app.conversations.append(assistant_message).await {
            warn!(error = %e, "could not persist assistant message");
        }

        match app.users.get(&request.user_id).await {
            Ok(Some(mut user)) => {
                user.record_usage(tokens_used);
                if let Err(e) = app.users.save(user).await {
                    warn!(error = %e, "could not record token usage");
                }
            },
            Ok(None) => {},
            Err(e) => warn!(error = %e, "could not load user for accounting"),
        }
    }
}

#[async_trait]
impl RequestProcessor for TurnProcessor {
    async fn process(&self, request: QueuedRequest) -> Result<ProcessOutcome, StratoError> {
        let result = self.run(request.clone()).await;
        if result.is_err() {
            self.cancellations.remove(&request.request_id);
        }
        result
    }

    async fn on_failure(&self, request: &QueuedRequest, error: &StratoError, retried: bool) {
        if retried {
            return;
        }
        if let Some(bot_id) = &request.bot_id {
            self.app
                .hub
                .send_to_client(
                    bot_id,
                    &ClientEvent::Failed {
                        request_id: request.request_id.clone(),
                        error: error.to_string(),
                        attempts: request.attempt.saturating_add(1),
                    },
                )
                .await;
        }
    }
}
