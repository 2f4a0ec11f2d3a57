//! The desk: one chat session over a registry, router, conversation and model.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::Invoker;
use crate::archive::{Archive, QaRecord};
use crate::config::DeskConfig;
use crate::context::SideContext;
use crate::conversation::{Conversation, ConversationTurn};
use crate::error::{Error, Result};
use crate::llm::{build_model, Citation, Message};
use crate::persona::{CatalogSource, Persona, PersonaRegistry};
use crate::plan::{ExecutionPlan, PlanExecutor, SkippedStep, StepRecord};
use crate::research::{committee_plan, RiskAssessment};
use crate::router::{Router, RoutingDecision, RoutingType, Scenario};
use crate::tools::McpClient;

/// One incoming chat message and its optional extras.
#[derive(Debug, Clone, Default)]
pub struct ChatInput {
    pub message: String,
    /// Stored in the session and reused by later turns
    pub document: Option<String>,
    pub scenario: Option<Scenario>,
    pub feedback: Option<String>,
}

impl ChatInput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingSummary {
    #[serde(rename = "type")]
    pub routing_type: RoutingType,
    pub reason: String,
    pub mentions: Vec<String>,
}

impl From<&RoutingDecision> for RoutingSummary {
    fn from(decision: &RoutingDecision) -> Self {
        Self {
            routing_type: decision.routing_type,
            reason: decision.reason.clone(),
            mentions: decision.mentions.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub executed: Vec<StepRecord>,
    pub skipped: Vec<SkippedStep>,
}

/// What the desk answers for one message.
#[derive(Debug, Clone, Serialize)]
pub struct DeskReply {
    /// False when the reply is a degraded warning instead of an answer
    pub success: bool,
    pub persona: String,
    pub role: String,
    pub text: String,
    pub routing: RoutingSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanSummary>,
    /// Risk officer verdict of a research workflow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAssessment>,
}

pub struct Desk {
    session_id: Uuid,
    registry: Arc<PersonaRegistry>,
    router: Router,
    conversation: Conversation,
    invoker: Invoker,
    archive: Option<Arc<Archive>>,
    history_window: usize,
    recent_limit: usize,
}

impl Desk {
    pub fn new(registry: Arc<PersonaRegistry>, invoker: Invoker) -> Result<Self> {
        let router = Router::new(Arc::clone(&registry))?;
        Ok(Self {
            session_id: Uuid::new_v4(),
            registry,
            router,
            conversation: Conversation::new(),
            invoker,
            archive: None,
            history_window: 5,
            recent_limit: 10,
        })
    }

    /// Desk wired from configuration: catalog, model adapter and tool servers.
    pub fn from_config(config: &DeskConfig) -> Result<Self> {
        let registry = PersonaRegistry::load(CatalogSource::from_settings(&config.personas))?;
        let model = build_model(&config.llm)?;

        let mut invoker = Invoker::new(
            model,
            config.context.document_char_budget,
            config.tools.max_steps,
        );
        if !config.tools.servers.is_empty() {
            invoker = invoker.with_tools(Arc::new(McpClient::new(&config.tools)?));
        }

        let mut desk = Self::new(Arc::new(registry), invoker)?
            .with_history_window(config.conversation.history_window);
        desk.recent_limit = config.conversation.recent_limit;

        match Archive::from_settings(&config.archive) {
            Ok(Some(archive)) => desk = desk.with_archive(Arc::new(archive)),
            Ok(None) => {}
            Err(e) => warn!(error = %e.format_for_log(), "Session archive disabled"),
        }

        info!(
            session = %desk.session_id,
            personas = desk.registry.len(),
            provider = %desk.invoker.model().name(),
            "Desk session started"
        );
        Ok(desk)
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Record answered turns in `archive`.
    pub fn with_archive(mut self, archive: Arc<Archive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Handle one message end to end.
    ///
    /// Model and tool failures degrade into a warning reply with
    /// `success = false`; only routing inconsistencies return `Err`.
    /// Successful replies are archived.
    pub async fn chat(&mut self, input: ChatInput) -> Result<DeskReply> {
        let question = input.message.clone();
        let reply = self.respond(input).await?;
        self.archive_reply(&question, &reply);
        Ok(reply)
    }

    async fn respond(&mut self, input: ChatInput) -> Result<DeskReply> {
        if let Some(document) = input.document {
            self.conversation.set_document(document);
        }

        let decision = self.router.route(&input.message, input.scenario)?;
        let persona = Arc::clone(&decision.persona);
        info!(
            session = %self.session_id,
            persona = %persona.name,
            routing = %decision.routing_type,
            "Message routed"
        );

        let mut messages = self.conversation.history_for_model(self.history_window);
        self.conversation.push_user(input.message.clone());
        messages.push(Message::user(decision.message.clone()));

        let context = SideContext::new()
            .with_document(self.conversation.document())
            .with_feedback(input.feedback.as_deref());

        let response = match self.invoker.invoke(&persona, messages, &context).await {
            Ok(response) => response,
            Err(e) => {
                warn!(persona = %persona.name, error = %e.format_for_log(), "Persona call failed");
                return Ok(degraded(&persona, &decision, e.user_warning()));
            }
        };

        self.conversation
            .push_assistant(response.text.clone(), persona.name.clone());

        let plan = if persona.coordinator {
            ExecutionPlan::detect(&response.text)
        } else {
            None
        };

        let Some(plan) = plan else {
            return Ok(DeskReply {
                success: true,
                persona: persona.name.clone(),
                role: persona.role.clone(),
                text: response.text,
                routing: RoutingSummary::from(&decision),
                citations: response.citations,
                plan: None,
                risk: None,
            });
        };

        let document = self.conversation.document().map(str::to_string);
        let executor = PlanExecutor::new(&self.registry, &self.invoker);
        let outcome = executor
            .execute(&plan, document.as_deref(), &mut self.conversation)
            .await;

        match outcome {
            Ok(outcome) => Ok(DeskReply {
                success: true,
                persona: persona.name.clone(),
                role: persona.role.clone(),
                text: outcome.report,
                routing: RoutingSummary::from(&decision),
                citations: Vec::new(),
                plan: Some(PlanSummary {
                    executed: outcome.executed,
                    skipped: outcome.skipped,
                }),
                risk: None,
            }),
            Err(e) => {
                warn!(error = %e.format_for_log(), "Plan aborted");
                Ok(degraded(&persona, &decision, e.user_warning()))
            }
        }
    }

    /// Run the investment-committee workflow on `topic`.
    ///
    /// The committee plan goes through the plan executor like a coordinator
    /// plan; the reply carries the risk officer's verdict when readable.
    pub async fn research(&mut self, topic: &str, deep_research: bool) -> Result<DeskReply> {
        let coordinator = self
            .registry
            .coordinator()
            .ok_or_else(|| Error::persona_catalog("no coordinator persona is registered"))?;
        let routing = RoutingSummary {
            routing_type: RoutingType::ScenarioPriority,
            reason: format!("scenario {}: investment committee workflow", Scenario::Investment),
            mentions: Vec::new(),
        };
        info!(session = %self.session_id, topic, deep_research, "Starting research workflow");

        self.conversation.push_user(topic.to_string());
        let plan = committee_plan(topic, deep_research);
        let document = self.conversation.document().map(str::to_string);
        let executor = PlanExecutor::new(&self.registry, &self.invoker);
        let outcome = executor
            .execute(&plan, document.as_deref(), &mut self.conversation)
            .await;

        let reply = match outcome {
            Ok(outcome) => DeskReply {
                success: true,
                persona: coordinator.name.clone(),
                role: coordinator.role.clone(),
                text: outcome.report,
                routing,
                citations: Vec::new(),
                risk: RiskAssessment::from_steps(&outcome.executed),
                plan: Some(PlanSummary {
                    executed: outcome.executed,
                    skipped: outcome.skipped,
                }),
            },
            Err(e) => {
                warn!(error = %e.format_for_log(), "Research workflow aborted");
                DeskReply {
                    routing,
                    ..degraded_reply(&coordinator, e.user_warning())
                }
            }
        };

        self.archive_reply(topic, &reply);
        Ok(reply)
    }

    /// Continue an archived session: adopt its id and replay its answered turns.
    ///
    /// Returns the number of records replayed.
    pub fn resume(&mut self, id: &str) -> Result<usize> {
        let archive = self
            .archive
            .as_ref()
            .ok_or_else(|| Error::archive_unavailable("archiving is disabled"))?;
        let session_id = archive.resolve(id)?;
        let records = archive.session(session_id)?;
        if !self.conversation.is_empty() {
            debug!(turns = self.conversation.len(), "Archived turns follow the current transcript");
        }

        for record in &records {
            self.conversation.push_user(record.question.clone());
            self.conversation
                .push_assistant(record.answer.clone(), record.persona.clone());
        }
        self.session_id = session_id;

        info!(session = %session_id, records = records.len(), "Archived session resumed");
        Ok(records.len())
    }

    fn archive_reply(&self, question: &str, reply: &DeskReply) {
        let Some(ref archive) = self.archive else {
            return;
        };
        if !reply.success {
            return;
        }

        let record = QaRecord {
            session_id: self.session_id,
            timestamp: Utc::now(),
            question: question.to_string(),
            answer: reply.text.clone(),
            persona: reply.persona.clone(),
            role: reply.role.clone(),
            routing: reply.routing.routing_type,
        };
        if let Err(e) = archive.append(&record) {
            warn!(error = %e.format_for_log(), "Failed to archive answer");
        }
    }

    /// Each persona once, in registration order.
    pub fn agents(&self) -> Vec<Arc<Persona>> {
        self.registry.list()
    }

    /// The last `limit` turns (the configured recent limit when `None`).
    pub fn history(&self, limit: Option<usize>) -> &[ConversationTurn] {
        self.conversation.recent(limit.unwrap_or(self.recent_limit))
    }

    pub fn set_document(&mut self, document: impl Into<String>) {
        self.conversation.set_document(document);
    }

    /// Drop the transcript and the stored document.
    pub fn clear(&mut self) {
        self.conversation.clear();
        info!(session = %self.session_id, "Conversation cleared");
    }

    /// Rebuild the registry from its catalog source and swap it in with a new router.
    ///
    /// The conversation is untouched. On failure the current registry stays.
    pub fn reload(&mut self) -> Result<()> {
        let registry = Arc::new(PersonaRegistry::load(self.registry.source().clone())?);
        let router = Router::new(Arc::clone(&registry))?;

        self.registry = registry;
        self.router = router;
        info!(session = %self.session_id, personas = self.registry.len(), "Persona registry reloaded");
        Ok(())
    }
}

/// A failed reply carrying `warning`. Nothing is recorded in the conversation.
fn degraded(persona: &Persona, decision: &RoutingDecision, warning: String) -> DeskReply {
    DeskReply {
        routing: RoutingSummary::from(decision),
        ..degraded_reply(persona, warning)
    }
}

fn degraded_reply(persona: &Persona, warning: String) -> DeskReply {
    DeskReply {
        success: false,
        persona: persona.name.clone(),
        role: persona.role.clone(),
        text: warning,
        routing: RoutingSummary {
            routing_type: RoutingType::KeywordHeuristic,
            reason: String::new(),
            mentions: Vec::new(),
        },
        citations: Vec::new(),
        plan: None,
        risk: None,
    }
}
