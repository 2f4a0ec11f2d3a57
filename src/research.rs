//! Investment-committee research workflow.
//!
//! A fixed plan run through the ordinary plan executor: optional deep
//! research, market intelligence, quant comparison, portfolio memo,
//! red-team review and a final risk verdict. Each seat sees every earlier
//! seat's output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::extract::extract_json_object;
use crate::plan::{ExecutionPlan, PlanStep, StepRecord};

pub const DEEP_RESEARCHER: &str = "逻辑";
pub const MARKET_ANALYST: &str = "天眼";
pub const QUANT_ANALYST: &str = "西格玛";
pub const PORTFOLIO_MANAGER: &str = "阿尔法";
pub const CRITIC: &str = "天平";
pub const RISK_OFFICER: &str = "坚盾";

/// (persona, instruction template); `{topic}` is replaced by the research topic.
const COMMITTEE: &[(&str, &str)] = &[
    (
        MARKET_ANALYST,
        "基于已有的战略假设，检索「{topic}」的实时市场情报，输出《市场情报综述》：宏观驱动力、市场情绪、近期催化剂。",
    ),
    (
        QUANT_ANALYST,
        "检索与「{topic}」相关的 5-8 个核心标的的最新交易数据，先输出 Markdown 对比表，再给出 3-6 条要点结论。",
    ),
    (
        PORTFOLIO_MANAGER,
        "综合战略假设、市场情报与量化数据，撰写「{topic}」的《投资决策备忘录》，给出明确的配置建议（超配/标配/低配）。",
    ),
    (
        CRITIC,
        "对上述「{topic}」投资决策进行压力测试：识别尾部风险，推演失败的根本原因，挑战团队假设。",
    ),
    (
        RISK_OFFICER,
        "基于全链路信息对「{topic}」策略做最终合规与风险审查，只输出 JSON：{\"score\": 0-100, \"critique\": \"意见\", \"approved\": true/false}。",
    ),
];

const DEEP_RESEARCH: &str =
    "对「{topic}」进行深度宏观逻辑推演，输出《深度战略研判简报》：底层逻辑、非共识洞察、终局思维。";

/// The committee plan for `topic`, with the deep-research seat first when requested.
pub fn committee_plan(topic: &str, deep_research: bool) -> ExecutionPlan {
    let topic = topic.trim();
    let mut steps = Vec::with_capacity(COMMITTEE.len() + 1);

    if deep_research {
        steps.push(step(DEEP_RESEARCHER, DEEP_RESEARCH, topic));
    }
    steps.extend(
        COMMITTEE
            .iter()
            .map(|(persona, template)| step(persona, template, topic)),
    );

    ExecutionPlan {
        steps,
        explanation: format!("投委会工作流：{}", topic),
    }
}

fn step(persona: &str, template: &str, topic: &str) -> PlanStep {
    PlanStep {
        agent: Some(persona.to_string()),
        instruction: template.replace("{topic}", topic),
    }
}

/// The risk officer's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Safety score, 0-100
    pub score: u8,
    pub critique: String,
    pub approved: bool,
}

impl RiskAssessment {
    /// Read the verdict embedded in the risk officer's reply.
    ///
    /// Scores above 100 are clamped. A reply without a readable verdict
    /// yields `None` rather than a guessed approval.
    pub fn from_reply(text: &str) -> Option<Self> {
        let obj = extract_json_object(text)?;

        let score = match obj.get("score")? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        let approved = obj.get("approved")?.as_bool()?;
        let critique = obj
            .get("critique")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Some(Self {
            score: score.clamp(0.0, 100.0).round() as u8,
            critique,
            approved,
        })
    }

    /// Verdict from the risk officer's step, if that step ran.
    pub fn from_steps(executed: &[StepRecord]) -> Option<Self> {
        executed
            .iter()
            .rev()
            .find(|r| r.persona == RISK_OFFICER)
            .and_then(|r| Self::from_reply(&r.output))
    }
}
