// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The request orchestrator.
//!
//! Every command goes through the same steps: profile, context, intent,
//! agent, `safe_process`, context update, activity log. Whatever happens
//! below, callers get an [`AgentResponse`] back.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::{FutureExt, StreamExt};
use larder_config::LarderConfig;
use larder_core::{
    AgentInput, AgentResponse, AlertSink, Attachment, Command, ContextDelta, ContextStore,
    ConversationTurn, ErrorSeverity, Intent, IntentClassifier, LarderError, MediaFamily, Profile,
    ProfileStore, SessionId,
};
use larder_router::HybridClient;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agents::{self, DOCUMENT_PROCESSING, IMAGE_PROCESSING};
use crate::alert::LogAlertSink;
use crate::capability::{CapabilityAgent, TextStream};
use crate::executor::{AgentExecutor, StreamOutcome};
use crate::factory::AgentFactory;
use crate::fallback::{FallbackPolicy, apology};
use crate::intent::KeywordIntentClassifier;
use crate::shutdown::{InFlight, InFlightGuard};
use crate::stores::{InMemoryContextStore, InMemoryProfileStore};

/// Everything resolved before the agent runs.
struct Prepared {
    intent: Intent,
    agent: Arc<dyn CapabilityAgent>,
    input: AgentInput,
}

/// Assembles an [`Orchestrator`]. Unset collaborators default to the
/// in-memory stores, the keyword classifier, and the log alert sink.
pub struct OrchestratorBuilder {
    client: Arc<HybridClient>,
    factory: AgentFactory,
    profiles: Option<Arc<dyn ProfileStore>>,
    contexts: Option<Arc<dyn ContextStore>>,
    intents: Option<Arc<dyn IntentClassifier>>,
    alerts: Option<Arc<dyn AlertSink>>,
    policy: FallbackPolicy,
    default_language: String,
    shutdown: CancellationToken,
}

impl OrchestratorBuilder {
    pub fn profiles(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn contexts(mut self, contexts: Arc<dyn ContextStore>) -> Self {
        self.contexts = Some(contexts);
        self
    }

    pub fn intents(mut self, intents: Arc<dyn IntentClassifier>) -> Self {
        self.intents = Some(intents);
        self
    }

    pub fn alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    /// Request tokens are children of `token`; cancelling it aborts all requests.
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn build(self) -> Orchestrator {
        let language = self.default_language;
        let alerts = self
            .alerts
            .unwrap_or_else(|| Arc::new(LogAlertSink::default()));
        Orchestrator {
            executor: AgentExecutor::new(self.client.clone(), alerts, self.policy),
            client: self.client,
            factory: self.factory,
            profiles: self
                .profiles
                .unwrap_or_else(|| Arc::new(InMemoryProfileStore::new(language.clone()))),
            contexts: self
                .contexts
                .unwrap_or_else(|| Arc::new(InMemoryContextStore::default())),
            intents: self
                .intents
                .unwrap_or_else(|| Arc::new(KeywordIntentClassifier::new())),
            default_language: language,
            shutdown: self.shutdown,
            in_flight: InFlight::new(),
        }
    }
}

/// Top-level request coordinator.
pub struct Orchestrator {
    client: Arc<HybridClient>,
    factory: AgentFactory,
    executor: AgentExecutor,
    profiles: Arc<dyn ProfileStore>,
    contexts: Arc<dyn ContextStore>,
    intents: Arc<dyn IntentClassifier>,
    default_language: String,
    shutdown: CancellationToken,
    in_flight: InFlight,
}

impl Orchestrator {
    pub fn builder(client: Arc<HybridClient>, factory: AgentFactory) -> OrchestratorBuilder {
        OrchestratorBuilder {
            client,
            factory,
            profiles: None,
            contexts: None,
            intents: None,
            alerts: None,
            policy: FallbackPolicy::default(),
            default_language: "pl".to_string(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Builder preloaded from configuration: built-in agents, fallback
    /// policy, alert settings, and default language.
    pub fn builder_from_config(
        client: Arc<HybridClient>,
        config: &LarderConfig,
    ) -> Result<OrchestratorBuilder, LarderError> {
        let factory = agents::builtin_factory(&config.agent)?;
        Ok(Self::builder(client, factory)
            .policy(FallbackPolicy::from_config(&config.fallback))
            .alerts(Arc::new(LogAlertSink::from_config(&config.alerts)))
            .default_language(config.agent.default_language.clone()))
    }

    pub fn client(&self) -> &Arc<HybridClient> {
        &self.client
    }

    pub fn factory(&self) -> &AgentFactory {
        &self.factory
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Handles a text command.
    pub async fn process_command(&self, text: &str, session_id: &SessionId) -> AgentResponse {
        let cancel = self.shutdown.child_token();
        self.process_command_with_cancel(text, session_id, &cancel)
            .await
    }

    /// Handles a text command that `cancel` can abort.
    pub async fn process_command_with_cancel(
        &self,
        text: &str,
        session_id: &SessionId,
        cancel: &CancellationToken,
    ) -> AgentResponse {
        let command = Command {
            text: text.to_string(),
            session_id: session_id.clone(),
            attachment: None,
        };
        self.run(command, None, cancel).await
    }

    /// Handles an uploaded file, routed by its media family.
    pub async fn process_file(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        session_id: &SessionId,
        media_type: &str,
    ) -> AgentResponse {
        let started = Instant::now();
        let attachment = Attachment {
            filename: filename.to_string(),
            media_type: media_type.to_string(),
            bytes,
        };
        let intent_type = match attachment.family() {
            MediaFamily::Image => IMAGE_PROCESSING,
            MediaFamily::Document => DOCUMENT_PROCESSING,
            MediaFamily::Unsupported => {
                warn!(
                    session_id = %session_id,
                    filename,
                    media_type,
                    "unsupported content type"
                );
                return AgentResponse::failure(
                    format!("unsupported content type: {media_type}"),
                    ErrorSeverity::Low,
                )
                .with_metadata("error_kind", "unsupported_content_type")
                .with_metadata("session_id", session_id.as_str())
                .with_processing_time(started.elapsed());
            }
        };
        let command = Command {
            text: String::new(),
            session_id: session_id.clone(),
            attachment: Some(attachment),
        };
        let cancel = self.shutdown.child_token();
        self.run(command, Some(Intent::new(intent_type)), &cancel)
            .await
    }

    /// Handles a text command, streaming the answer when the agent can.
    ///
    /// The session context is updated once the stream has been consumed
    /// to the end without errors.
    pub async fn stream_command(
        &self,
        text: &str,
        session_id: &SessionId,
        cancel: CancellationToken,
    ) -> StreamOutcome {
        let started = Instant::now();
        let guard = self.in_flight.enter();
        let command = Command {
            text: text.to_string(),
            session_id: session_id.clone(),
            attachment: None,
        };

        let dispatched = AssertUnwindSafe(async {
            let prepared = match self.prepare(&command, None).await {
                Ok(prepared) => prepared,
                Err(err) => return StreamOutcome::Complete(self.store_failure(&command, err)),
            };
            match self
                .executor
                .safe_stream(prepared.agent.as_ref(), &prepared.input, &cancel)
                .await
            {
                StreamOutcome::Complete(response) => {
                    StreamOutcome::Complete(self.finish(&command, &prepared, response).await)
                }
                StreamOutcome::Streaming(stream) => {
                    info!(
                        session_id = %command.session_id,
                        agent = prepared.agent.name(),
                        "streaming response"
                    );
                    StreamOutcome::Streaming(self.tap_stream(stream, &command, &prepared, guard))
                }
            }
        })
        .catch_unwind()
        .await;

        match dispatched {
            Ok(StreamOutcome::Complete(response)) => {
                StreamOutcome::Complete(response.with_processing_time(started.elapsed()))
            }
            Ok(streaming) => streaming,
            Err(_) => StreamOutcome::Complete(
                self.panicked(&command)
                    .await
                    .with_processing_time(started.elapsed()),
            ),
        }
    }

    /// Cancels every request and shuts the model backend down.
    pub async fn shutdown(&self) -> Result<(), LarderError> {
        self.shutdown.cancel();
        self.client.shutdown().await
    }

    async fn run(
        &self,
        command: Command,
        intent: Option<Intent>,
        cancel: &CancellationToken,
    ) -> AgentResponse {
        let _guard = self.in_flight.enter();
        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.dispatch(&command, intent, cancel))
            .catch_unwind()
            .await;
        let response = match outcome {
            Ok(response) => response,
            Err(_) => self.panicked(&command).await,
        };
        let elapsed = started.elapsed();
        info!(
            session_id = %command.session_id,
            success = response.success,
            fallback = response.processed_with_fallback,
            elapsed_ms = elapsed.as_millis() as u64,
            "command processed"
        );
        response.with_processing_time(elapsed)
    }

    async fn dispatch(
        &self,
        command: &Command,
        intent: Option<Intent>,
        cancel: &CancellationToken,
    ) -> AgentResponse {
        let prepared = match self.prepare(command, intent).await {
            Ok(prepared) => prepared,
            Err(err) => return self.store_failure(command, err),
        };
        let response = self
            .executor
            .safe_process(prepared.agent.as_ref(), &prepared.input, cancel)
            .await;
        self.finish(command, &prepared, response).await
    }

    async fn prepare(
        &self,
        command: &Command,
        intent: Option<Intent>,
    ) -> Result<Prepared, LarderError> {
        let session_id = &command.session_id;
        let profile = self.profiles.get_or_create_profile(session_id).await?;
        let context = self.contexts.get_context(session_id).await?;

        let intent = match intent {
            Some(intent) => intent,
            None => match self.intents.classify(&command.text, &context).await {
                Ok(intent) => intent,
                Err(err) => {
                    warn!(
                        session_id = %session_id,
                        error = %err,
                        "intent classification failed, using default agent"
                    );
                    Intent::new(self.factory.default_type())
                }
            },
        };
        debug!(session_id = %session_id, intent = %intent.intent_type, "intent resolved");

        let agent = self.factory.create(&intent.intent_type);
        let input = AgentInput {
            text: command.text.clone(),
            session_id: session_id.clone(),
            entities: intent.entities.clone(),
            context,
            attachment: command.attachment.clone(),
            personalization: Some(personalization(&profile)),
            language: profile.language.clone(),
        };
        Ok(Prepared {
            intent,
            agent,
            input,
        })
    }

    /// Writes context and activity for a finished response and adds routing metadata.
    async fn finish(
        &self,
        command: &Command,
        prepared: &Prepared,
        mut response: AgentResponse,
    ) -> AgentResponse {
        let session_id = &command.session_id;
        let mut delta = response.context_update.take().unwrap_or_default();
        if response.success {
            delta = delta.merge(ContextDelta {
                turn: Some(turn(command, &prepared.intent, response.display_text())),
                ..Default::default()
            });
        }
        if !delta.is_empty() {
            if let Err(err) = self.contexts.update_context(session_id, delta).await {
                warn!(session_id = %session_id, error = %err, "context update failed");
                response = response.with_metadata("context_update_error", err.to_string());
            }
        }
        if let Err(err) = self
            .profiles
            .log_activity(session_id, &prepared.intent.intent_type, &command.text)
            .await
        {
            warn!(session_id = %session_id, error = %err, "activity log failed");
            response = response.with_metadata("activity_log_error", err.to_string());
        }

        response
            .with_metadata("intent", prepared.intent.intent_type.clone())
            .with_metadata("agent", prepared.agent.name().to_string())
            .with_metadata("session_id", session_id.as_str())
    }

    /// Wraps a live stream so the context is updated once it completes.
    fn tap_stream(
        &self,
        stream: TextStream,
        command: &Command,
        prepared: &Prepared,
        guard: InFlightGuard,
    ) -> TextStream {
        let tap = StreamTap {
            inner: stream,
            text: String::new(),
            failed: false,
            finish: Some(StreamFinish {
                profiles: self.profiles.clone(),
                contexts: self.contexts.clone(),
                session_id: command.session_id.clone(),
                command: command.text.clone(),
                intent: prepared.intent.clone(),
                agent: prepared.agent.name().to_string(),
            }),
            _guard: guard,
        };
        futures::stream::unfold(tap, |mut tap| async move {
            match tap.inner.next().await {
                Some(Ok(chunk)) => {
                    tap.text.push_str(&chunk);
                    Some((Ok(chunk), tap))
                }
                Some(Err(err)) => {
                    tap.failed = true;
                    Some((Err(err), tap))
                }
                None => {
                    if let Some(finish) = tap.finish.take() {
                        if tap.failed {
                            debug!(session_id = %finish.session_id, "stream failed, context untouched");
                        } else {
                            finish.run(&tap.text).await;
                        }
                    }
                    None
                }
            }
        })
        .boxed()
    }

    fn store_failure(&self, command: &Command, err: LarderError) -> AgentResponse {
        error!(
            session_id = %command.session_id,
            error = %err,
            "could not prepare request"
        );
        AgentResponse::failure(apology(&self.default_language), ErrorSeverity::High)
            .with_metadata("error_kind", err.kind())
            .with_metadata("error_detail", err.to_string())
            .with_metadata("session_id", command.session_id.as_str())
    }

    async fn panicked(&self, command: &Command) -> AgentResponse {
        error!(session_id = %command.session_id, "request handling panicked");
        self.executor
            .alert(
                "request handling panicked",
                &json!({ "session_id": command.session_id.as_str() }),
                ErrorSeverity::Critical,
            )
            .await;
        AgentResponse::failure(apology(&self.default_language), ErrorSeverity::High)
            .with_metadata("error_kind", "critical")
            .with_metadata("session_id", command.session_id.as_str())
    }
}

struct StreamTap {
    inner: TextStream,
    text: String,
    failed: bool,
    finish: Option<StreamFinish>,
    _guard: InFlightGuard,
}

struct StreamFinish {
    profiles: Arc<dyn ProfileStore>,
    contexts: Arc<dyn ContextStore>,
    session_id: SessionId,
    command: String,
    intent: Intent,
    agent: String,
}

impl StreamFinish {
    async fn run(self, answer: &str) {
        let delta = ContextDelta {
            turn: Some(ConversationTurn {
                user: self.command.clone(),
                assistant: answer.to_string(),
                intent: self.intent.intent_type.clone(),
                at: Utc::now(),
            }),
            ..Default::default()
        };
        if let Err(err) = self.contexts.update_context(&self.session_id, delta).await {
            warn!(session_id = %self.session_id, error = %err, "context update failed");
        }
        if let Err(err) = self
            .profiles
            .log_activity(&self.session_id, &self.intent.intent_type, &self.command)
            .await
        {
            warn!(session_id = %self.session_id, error = %err, "activity log failed");
        }
        debug!(session_id = %self.session_id, agent = %self.agent, "streamed response recorded");
    }
}

fn turn(command: &Command, intent: &Intent, answer: &str) -> ConversationTurn {
    let user = match &command.attachment {
        Some(attachment) if command.text.is_empty() => format!("[file: {}]", attachment.filename),
        _ => command.text.clone(),
    };
    ConversationTurn {
        user,
        assistant: answer.to_string(),
        intent: intent.intent_type.clone(),
        at: Utc::now(),
    }
}

fn personalization(profile: &Profile) -> String {
    format!(
        "User profile: preferred language {}, {} previous interactions.",
        profile.language, profile.interactions
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personalization_mentions_language_and_count() {
        let mut profile = Profile::new(SessionId::from("s"), "pl");
        profile.interactions = 7;
        let hint = personalization(&profile);
        assert!(hint.contains("pl"));
        assert!(hint.contains("7 previous"));
    }

    #[test]
    fn file_turn_names_the_file() {
        let command = Command {
            text: String::new(),
            session_id: SessionId::from("s"),
            attachment: Some(Attachment {
                filename: "receipt.jpg".to_string(),
                media_type: "image/jpeg".to_string(),
                bytes: vec![1],
            }),
        };
        let turn = turn(&command, &Intent::new("image_processing"), "milk");
        assert_eq!(turn.user, "[file: receipt.jpg]");
        assert_eq!(turn.intent, "image_processing");
    }
}
