//! Execution plans emitted by the coordinator persona.
//!
//! A plan is an ordered list of (persona, instruction) steps embedded as JSON
//! in the coordinator's reply. Steps run strictly in order, each one seeing
//! the labeled outputs of every earlier step as side-context.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::agent::Invoker;
use crate::context::SideContext;
use crate::conversation::Conversation;
use crate::error::{Error, Result};
use crate::extract::extract_json_object;
use crate::llm::Message;
use crate::persona::PersonaRegistry;

// ─────────────────────────────────────────────────────────────────
// Plan model
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    /// Persona name or alias as written by the coordinator; `None` if missing.
    pub agent: Option<String>,
    pub instruction: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
    pub explanation: String,
}

impl ExecutionPlan {
    /// Detect a plan in a coordinator reply.
    ///
    /// Requires an embedded object with `"type": "plan"` and a non-empty
    /// `steps` list. Anything else means the reply is a plain answer.
    pub fn detect(text: &str) -> Option<Self> {
        let obj = extract_json_object(text)?;
        Self::from_object(&obj)
    }

    fn from_object(obj: &Map<String, Value>) -> Option<Self> {
        if obj.get("type").and_then(Value::as_str) != Some("plan") {
            return None;
        }

        let steps: Vec<PlanStep> = obj
            .get("steps")?
            .as_array()?
            .iter()
            .map(|step| PlanStep {
                agent: step
                    .get("agent")
                    .and_then(Value::as_str)
                    .map(|a| a.trim().to_string()),
                instruction: match step.get("instruction") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                },
            })
            .collect();

        if steps.is_empty() {
            return None;
        }

        let explanation = obj
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Some(Self { steps, explanation })
    }
}

// ─────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────

/// A step that ran.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// 1-based position in the plan, counting skipped steps
    pub step: usize,
    pub persona: String,
    pub instruction: String,
    pub output: String,
}

/// A step dropped because its persona did not resolve.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedStep {
    pub step: usize,
    pub agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    pub report: String,
    pub executed: Vec<StepRecord>,
    pub skipped: Vec<SkippedStep>,
}

pub struct PlanExecutor<'a> {
    registry: &'a PersonaRegistry,
    invoker: &'a Invoker,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(registry: &'a PersonaRegistry, invoker: &'a Invoker) -> Self {
        Self { registry, invoker }
    }

    /// Run every resolvable step in order.
    ///
    /// Unresolvable steps are skipped. A failing step aborts the plan with
    /// `PlanStepFailed`; outputs of earlier steps stay in the conversation.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        document: Option<&str>,
        conversation: &mut Conversation,
    ) -> Result<PlanOutcome> {
        let mut executed: Vec<StepRecord> = Vec::new();
        let mut skipped: Vec<SkippedStep> = Vec::new();

        info!(steps = plan.steps.len(), "Executing coordinator plan");

        for (i, step) in plan.steps.iter().enumerate() {
            let number = i + 1;

            let Some(persona) = step.agent.as_deref().and_then(|a| self.registry.get(a)) else {
                warn!(step = number, agent = ?step.agent, "Skipping plan step with unknown persona");
                skipped.push(SkippedStep {
                    step: number,
                    agent: step.agent.clone(),
                });
                continue;
            };

            let mut context = SideContext::new().with_document(document);
            if !executed.is_empty() {
                context = context.with_previous_results(previous_results(&executed));
            }

            debug!(step = number, persona = %persona.name, "Running plan step");
            let response = self
                .invoker
                .invoke(&persona, vec![Message::user(step.instruction.clone())], &context)
                .await
                .map_err(|e| Error::PlanStepFailed {
                    step: number,
                    persona: persona.name.clone(),
                    source: Box::new(e),
                })?;

            conversation.push_assistant(response.text.clone(), persona.name.clone());
            executed.push(StepRecord {
                step: number,
                persona: persona.name.clone(),
                instruction: step.instruction.clone(),
                output: response.text,
            });
        }

        Ok(PlanOutcome {
            report: render_report(&plan.explanation, &executed),
            executed,
            skipped,
        })
    }
}

fn previous_results(executed: &[StepRecord]) -> String {
    executed
        .iter()
        .map(|r| format!("--- {} output ---\n{}", r.persona, r.output))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_report(explanation: &str, executed: &[StepRecord]) -> String {
    let steps: Vec<String> = executed
        .iter()
        .map(|r| {
            format!(
                "### Step {}: {}\n**Instruction**: {}\n\n{}\n",
                r.step, r.persona, r.instruction, r.output
            )
        })
        .collect();

    format!("**Execution report**\n\n{}\n\n{}", explanation, steps.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockModel;
    use std::sync::Arc;

    #[test]
    fn test_detect_bare_plan() {
        let text = r#"{"type": "plan", "steps": [{"agent": "UnknownPersona", "instruction": "x"}], "explanation": "e"}"#;
        let plan = ExecutionPlan::detect(text).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].agent.as_deref(), Some("UnknownPersona"));
        assert_eq!(plan.explanation, "e");
    }

    #[test]
    fn test_detect_fenced_plan_with_prose() {
        let text = "好的，我来安排：\n```json\n{\n  \"type\": \"plan\",\n  \"steps\": [\n    {\"agent\": \"文档分析师\", \"instruction\": \"提取要点\"},\n    {\"agent\": \"内容创作者\", \"instruction\": \"写邮件\"}\n  ],\n  \"explanation\": \"先分析再写作\"\n}\n```\n请稍候。";
        let plan = ExecutionPlan::detect(text).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].instruction, "写邮件");
    }

    #[test]
    fn test_unrelated_json_is_not_a_plan() {
        let text = r#"Here is the data you asked for: {"revenue": 100, "type": "table"}"#;
        assert!(ExecutionPlan::detect(text).is_none());
        assert!(ExecutionPlan::detect("No JSON here at all.").is_none());
    }

    #[test]
    fn test_empty_or_malformed_steps_are_not_a_plan() {
        assert!(ExecutionPlan::detect(r#"{"type": "plan", "steps": []}"#).is_none());
        assert!(ExecutionPlan::detect(r#"{"type": "plan"}"#).is_none());
        assert!(ExecutionPlan::detect(r#"{"type": "plan", "steps": "analyze"}"#).is_none());
    }

    #[test]
    fn test_missing_agent_field() {
        let plan = ExecutionPlan::detect(r#"{"type": "plan", "steps": [{"instruction": "x"}]}"#)
            .unwrap();
        assert!(plan.steps[0].agent.is_none());
        assert_eq!(plan.explanation, "");
    }

    fn setup(mock: Arc<MockModel>) -> (PersonaRegistry, Invoker) {
        (PersonaRegistry::bundled().unwrap(), Invoker::new(mock, 1000, 5))
    }

    #[tokio::test]
    async fn test_unknown_persona_plan_runs_nothing() {
        let mock = Arc::new(MockModel::new());
        let (registry, invoker) = setup(mock.clone());
        let mut conversation = Conversation::new();

        let plan = ExecutionPlan::detect(
            r#"{"type": "plan", "steps": [{"agent": "UnknownPersona", "instruction": "x"}], "explanation": "e"}"#,
        )
        .unwrap();
        let outcome = PlanExecutor::new(&registry, &invoker)
            .execute(&plan, None, &mut conversation)
            .await
            .unwrap();

        assert!(outcome.executed.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
        assert!(!outcome.report.is_empty());
        assert!(outcome.report.contains('e'));
        assert_eq!(mock.call_count(), 0);
        assert!(conversation.is_empty());
    }

    #[tokio::test]
    async fn test_step_outputs_thread_forward() {
        let mock = Arc::new(MockModel::new());
        mock.push_response("OUTPUT-ONE");
        mock.push_response("OUTPUT-TWO");
        mock.push_response("OUTPUT-THREE");
        let (registry, invoker) = setup(mock.clone());
        let mut conversation = Conversation::new();

        let plan = ExecutionPlan {
            steps: vec![
                PlanStep { agent: Some("文档分析师".into()), instruction: "提取".into() },
                PlanStep { agent: Some("@数据专家".into()), instruction: "统计".into() },
                PlanStep { agent: Some("内容创作者".into()), instruction: "成文".into() },
            ],
            explanation: "三步完成".into(),
        };

        let outcome = PlanExecutor::new(&registry, &invoker)
            .execute(&plan, Some("原始文档"), &mut conversation)
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 3);

        // Step 1 sees only the document; step 3 sees both earlier outputs
        let first_context = &requests[0].messages[1].content;
        assert!(first_context.contains("原始文档"));
        assert!(!first_context.contains("之前的处理结果"));

        let third_context = &requests[2].messages[1].content;
        assert!(third_context.contains("OUTPUT-ONE"));
        assert!(third_context.contains("OUTPUT-TWO"));
        assert!(third_context.contains("--- 数据专家 output ---"));
        assert_eq!(requests[2].messages.last().unwrap().content, "成文");

        assert_eq!(outcome.executed.len(), 3);
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation.turns()[1].persona.as_deref(), Some("数据专家"));

        assert!(outcome.report.starts_with("**Execution report**\n\n三步完成"));
        assert!(outcome.report.contains("### Step 2: 数据专家\n**Instruction**: 统计\n\nOUTPUT-TWO\n"));
    }

    #[tokio::test]
    async fn test_skipped_steps_keep_numbering() {
        let mock = Arc::new(MockModel::with_default_response("done"));
        let (registry, invoker) = setup(mock.clone());
        let mut conversation = Conversation::new();

        let plan = ExecutionPlan {
            steps: vec![
                PlanStep { agent: Some("nobody".into()), instruction: "a".into() },
                PlanStep { agent: Some("校对编辑".into()), instruction: "b".into() },
            ],
            explanation: String::new(),
        };

        let outcome = PlanExecutor::new(&registry, &invoker)
            .execute(&plan, None, &mut conversation)
            .await
            .unwrap();

        assert_eq!(outcome.executed[0].step, 2);
        assert_eq!(outcome.skipped[0].step, 1);
        assert!(outcome.report.contains("### Step 2: 校对编辑"));
    }

    #[tokio::test]
    async fn test_failing_step_aborts_remaining_plan() {
        let mock = Arc::new(MockModel::new());
        mock.push_response("first ok");
        mock.push_error(Error::model_call_failed("mock", Some(503), "overloaded"));
        let (registry, invoker) = setup(mock.clone());
        let mut conversation = Conversation::new();

        let plan = ExecutionPlan {
            steps: vec![
                PlanStep { agent: Some("文档分析师".into()), instruction: "a".into() },
                PlanStep { agent: Some("数据专家".into()), instruction: "b".into() },
                PlanStep { agent: Some("内容创作者".into()), instruction: "c".into() },
            ],
            explanation: "e".into(),
        };

        let err = PlanExecutor::new(&registry, &invoker)
            .execute(&plan, None, &mut conversation)
            .await
            .unwrap_err();

        match err {
            Error::PlanStepFailed { step, persona, source } => {
                assert_eq!(step, 2);
                assert_eq!(persona, "数据专家");
                assert!(matches!(*source, Error::ModelCallFailed { status: Some(503), .. }));
            }
            other => panic!("expected PlanStepFailed, got {:?}", other),
        }
        // Step 3 never ran; step 1's output stays in the transcript
        assert_eq!(mock.call_count(), 2);
        assert_eq!(conversation.len(), 1);
    }
}
