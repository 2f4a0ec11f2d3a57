//! Message routing: explicit mention, scenario priority, then keyword rules.
//!
//! Keyword rules are evaluated in a fixed order and the first match wins.
//! `shadowed_keywords()` reports keywords that can never fire because an
//! earlier rule always matches first.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::mention::{parse_mentions, strip_mention};
use crate::persona::{Persona, PersonaRegistry};

// ─────────────────────────────────────────────────────────────────
// Scenario
// ─────────────────────────────────────────────────────────────────

/// Closed set of scenario tags that override keyword routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Compliance,
    Investment,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scenario::Compliance => write!(f, "compliance"),
            Scenario::Investment => write!(f, "investment"),
        }
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compliance" => Ok(Scenario::Compliance),
            "investment" => Ok(Scenario::Investment),
            _ => Err(format!(
                "Unknown scenario '{}'. Valid: compliance, investment",
                s
            )),
        }
    }
}

/// Two-way choice applied under a scenario tag.
struct ScenarioOverride {
    scenario: Scenario,
    keywords: &'static [&'static str],
    on_match: &'static str,
    otherwise: &'static str,
}

const SCENARIO_OVERRIDES: &[ScenarioOverride] = &[
    ScenarioOverride {
        scenario: Scenario::Compliance,
        keywords: &["撰写", "生成", "文案"],
        on_match: "内容创作者",
        otherwise: "合规官",
    },
    ScenarioOverride {
        scenario: Scenario::Investment,
        keywords: &["数据", "表格", "趋势"],
        on_match: "数据专家",
        otherwise: "文档分析师",
    },
];

// ─────────────────────────────────────────────────────────────────
// Keyword rules
// ─────────────────────────────────────────────────────────────────

/// "If any keyword is a substring of the lower-cased message, choose `persona`."
#[derive(Debug, Clone, Serialize)]
pub struct KeywordRule {
    pub label: String,
    pub persona: String,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(label: &str, persona: &str, keywords: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            persona: persona.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// First keyword contained in an already lower-cased message.
    fn find_in(&self, message_lower: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|k| message_lower.contains(k.as_str()))
            .map(String::as_str)
    }
}

/// The built-in rule table, highest priority first.
pub fn default_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule::new(
            "summarize",
            "文档分析师",
            &["总结", "摘要", "提取", "分析文档", "关键信息"],
        ),
        KeywordRule::new(
            "write",
            "内容创作者",
            &["撰写", "写一份", "生成", "邮件", "报告", "文案"],
        ),
        KeywordRule::new("data", "数据专家", &["数据", "表格", "统计", "趋势", "图表"]),
        KeywordRule::new("proofread", "校对编辑", &["检查", "校对", "修改", "优化", "润色"]),
        KeywordRule::new("translate", "翻译专家", &["翻译", "translate", "英文", "中文"]),
        KeywordRule::new(
            "compliance",
            "合规官",
            &["合规", "审核", "风险", "违规", "法规", "监管"],
        ),
        KeywordRule::new(
            "visualize",
            "数据可视化专家",
            &[
                "可视化", "图表", "画一个", "生成图", "柱状图", "饼图", "折线图", "仪表板", "chart",
                "html", "uml", "时序图", "绘图", "画图",
            ],
        ),
        KeywordRule::new(
            "knowledge",
            "知识管理专家",
            &["知识库", "检索", "搜索", "查找", "多文档", "对比", "关联", "知识"],
        ),
        KeywordRule::new(
            "market-intel",
            "天眼",
            &["市场情报", "竞品", "行业动态", "舆情", "最新消息", "新闻"],
        ),
        KeywordRule::new(
            "quotes",
            "行情助手",
            &["行情", "股价", "股票", "k线", "涨跌", "成交量"],
        ),
        KeywordRule::new(
            "collaborate",
            "协调者",
            &["协同", "合作", "配合", "团队", "流程", "先", "然后"],
        ),
    ]
}

/// A keyword that can never select its own rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShadowedKeyword {
    pub keyword: String,
    /// Label of the rule the keyword belongs to.
    pub rule: String,
    /// Label of the earlier rule that always wins.
    pub shadowed_by: String,
    /// The earlier rule's keyword contained in `keyword`.
    pub by_keyword: String,
}

impl fmt::Display for ShadowedKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" in rule '{}' is shadowed by \"{}\" in rule '{}'",
            self.keyword, self.rule, self.by_keyword, self.shadowed_by
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Routing decision
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingType {
    Explicit,
    ScenarioPriority,
    KeywordHeuristic,
}

impl fmt::Display for RoutingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingType::Explicit => write!(f, "explicit"),
            RoutingType::ScenarioPriority => write!(f, "scenario_priority"),
            RoutingType::KeywordHeuristic => write!(f, "keyword_heuristic"),
        }
    }
}

/// The router's output for one message.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub persona: Arc<Persona>,
    /// The message with the explicit mention removed, otherwise unchanged.
    pub message: String,
    pub routing_type: RoutingType,
    pub reason: String,
    /// Canonical names of every valid mention, in order of appearance.
    pub mentions: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────

pub struct Router {
    registry: Arc<PersonaRegistry>,
    rules: Vec<KeywordRule>,
    fallback: Arc<Persona>,
}

impl Router {
    /// Router over the built-in rule table.
    pub fn new(registry: Arc<PersonaRegistry>) -> Result<Self> {
        Self::with_rules(registry, default_rules())
    }

    /// Router over a custom rule table. Rules naming an unregistered persona are dropped.
    pub fn with_rules(registry: Arc<PersonaRegistry>, rules: Vec<KeywordRule>) -> Result<Self> {
        let fallback = registry.fallback().ok_or_else(|| {
            Error::persona_catalog("no default persona registered for routing fallback")
        })?;

        let rules = rules
            .into_iter()
            .filter(|rule| {
                let known = registry.contains(&rule.persona);
                if !known {
                    warn!(rule = %rule.label, persona = %rule.persona, "Dropping routing rule for unregistered persona");
                }
                known
            })
            .collect();

        Ok(Self {
            registry,
            rules,
            fallback,
        })
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    pub fn fallback(&self) -> &Arc<Persona> {
        &self.fallback
    }

    /// Decide which persona handles `message`.
    pub fn route(&self, message: &str, scenario: Option<Scenario>) -> Result<RoutingDecision> {
        let mentions = parse_mentions(message, &self.registry);

        if let Some(first) = mentions.first() {
            let decision = RoutingDecision {
                persona: Arc::clone(&first.persona),
                message: strip_mention(message, first),
                routing_type: RoutingType::Explicit,
                reason: format!("explicit mention {}", first.literal()),
                mentions: mentions.iter().map(|m| m.persona.name.clone()).collect(),
            };
            debug!(persona = %decision.persona.name, "Routed by mention");
            return Ok(decision);
        }

        let message_lower = message.to_lowercase();

        if let Some(scenario) = scenario {
            return self.route_scenario(message, &message_lower, scenario);
        }

        for rule in &self.rules {
            if let Some(keyword) = rule.find_in(&message_lower) {
                let persona = self.registry.require(&rule.persona)?;
                debug!(persona = %persona.name, keyword, rule = %rule.label, "Routed by keyword");
                return Ok(RoutingDecision {
                    reason: format!("keyword \"{}\" matched rule for {}", keyword, persona.name),
                    persona,
                    message: message.to_string(),
                    routing_type: RoutingType::KeywordHeuristic,
                    mentions: Vec::new(),
                });
            }
        }

        debug!(persona = %self.fallback.name, "No routing rule matched, using default persona");
        Ok(RoutingDecision {
            persona: Arc::clone(&self.fallback),
            message: message.to_string(),
            routing_type: RoutingType::KeywordHeuristic,
            reason: format!("no keyword matched, defaulted to {}", self.fallback.name),
            mentions: Vec::new(),
        })
    }

    fn route_scenario(
        &self,
        message: &str,
        message_lower: &str,
        scenario: Scenario,
    ) -> Result<RoutingDecision> {
        let table = SCENARIO_OVERRIDES
            .iter()
            .find(|o| o.scenario == scenario)
            .ok_or_else(|| Error::Internal(format!("no override table for scenario {}", scenario)))?;

        let name = if table.keywords.iter().any(|k| message_lower.contains(k)) {
            table.on_match
        } else {
            table.otherwise
        };
        let persona = self.registry.require(name)?;

        debug!(persona = %persona.name, %scenario, "Routed by scenario");
        Ok(RoutingDecision {
            reason: format!("{} scenario prefers {}", scenario, persona.name),
            persona,
            message: message.to_string(),
            routing_type: RoutingType::ScenarioPriority,
            mentions: Vec::new(),
        })
    }

    /// Keywords of rule j containing a keyword of some earlier rule i < j.
    pub fn shadowed_keywords(&self) -> Vec<ShadowedKeyword> {
        let mut shadowed = Vec::new();

        for (j, rule) in self.rules.iter().enumerate() {
            for keyword in &rule.keywords {
                let earlier = self.rules[..j].iter().find_map(|earlier| {
                    earlier
                        .keywords
                        .iter()
                        .find(|k| keyword.contains(k.as_str()))
                        .map(|k| (earlier, k))
                });

                if let Some((earlier, by_keyword)) = earlier {
                    shadowed.push(ShadowedKeyword {
                        keyword: keyword.clone(),
                        rule: rule.label.clone(),
                        shadowed_by: earlier.label.clone(),
                        by_keyword: by_keyword.clone(),
                    });
                }
            }
        }

        shadowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::{CatalogSource, Capability};

    fn router() -> Router {
        Router::new(Arc::new(PersonaRegistry::bundled().unwrap())).unwrap()
    }

    #[test]
    fn test_explicit_mention() {
        let decision = router().route("@翻译专家 Hello", None).unwrap();
        assert_eq!(decision.routing_type, RoutingType::Explicit);
        assert_eq!(decision.persona.name, "翻译专家");
        assert_eq!(decision.message, "Hello");
        assert_eq!(decision.mentions, vec!["翻译专家"]);
    }

    #[test]
    fn test_mention_round_trip_for_every_persona() {
        let router = router();
        for persona in router.registry.list() {
            let message = format!("{} please handle this", persona.mention());
            let decision = router.route(&message, None).unwrap();
            assert_eq!(decision.persona.name, persona.name);
            assert_eq!(decision.message, "please handle this");
            assert!(!decision.message.contains(&persona.mention()));
        }
    }

    #[test]
    fn test_mention_beats_scenario_and_keywords() {
        let decision = router()
            .route("@校对编辑 帮我总结这份文档", Some(Scenario::Compliance))
            .unwrap();
        assert_eq!(decision.routing_type, RoutingType::Explicit);
        assert_eq!(decision.persona.name, "校对编辑");
        assert_eq!(decision.message, "帮我总结这份文档");
    }

    #[test]
    fn test_first_mention_wins() {
        let decision = router().route("@合规官 @翻译专家 看看这段", None).unwrap();
        assert_eq!(decision.persona.name, "合规官");
        assert_eq!(decision.mentions, vec!["合规官", "翻译专家"]);
        assert_eq!(decision.message, "@翻译专家 看看这段");
    }

    #[test]
    fn test_summarize_routes_to_document_analyst() {
        let decision = router().route("帮我总结这份文档", None).unwrap();
        assert_eq!(decision.routing_type, RoutingType::KeywordHeuristic);
        assert_eq!(decision.persona.name, "文档分析师");
        assert_eq!(decision.message, "帮我总结这份文档");
        assert_eq!(decision.reason, "keyword \"总结\" matched rule for 文档分析师");
    }

    #[test]
    fn test_keyword_rules() {
        let router = router();
        let cases = [
            ("写一份周报", "内容创作者"),
            ("统计一下销量", "数据专家"),
            ("帮我润色这段话", "校对编辑"),
            ("Please TRANSLATE this", "翻译专家"),
            ("这条广告有没有违规", "合规官"),
            ("画一个饼图", "数据可视化专家"),
            ("在知识库里查找", "知识管理专家"),
            ("看看竞品的最新消息", "天眼"),
            ("查一下平安银行的股价", "行情助手"),
            ("我们团队如何配合", "协调者"),
        ];
        for (message, expected) in cases {
            let decision = router.route(message, None).unwrap();
            assert_eq!(decision.persona.name, expected, "message: {}", message);
        }
    }

    #[test]
    fn test_earlier_rule_takes_precedence() {
        // "生成" belongs to the writing rule, which precedes visualization
        let decision = router().route("生成图", None).unwrap();
        assert_eq!(decision.persona.name, "内容创作者");
    }

    #[test]
    fn test_fallback() {
        let decision = router().route("你好", None).unwrap();
        assert_eq!(decision.routing_type, RoutingType::KeywordHeuristic);
        assert_eq!(decision.persona.name, "文档分析师");
        assert!(decision.mentions.is_empty());
    }

    #[test]
    fn test_scenario_compliance() {
        let router = router();
        let d = router.route("帮我撰写一段宣传语", Some(Scenario::Compliance)).unwrap();
        assert_eq!(d.routing_type, RoutingType::ScenarioPriority);
        assert_eq!(d.persona.name, "内容创作者");

        let d = router.route("帮我总结这份文档", Some(Scenario::Compliance)).unwrap();
        assert_eq!(d.persona.name, "合规官");
    }

    #[test]
    fn test_scenario_investment() {
        let router = router();
        let d = router.route("分析营收趋势", Some(Scenario::Investment)).unwrap();
        assert_eq!(d.persona.name, "数据专家");

        let d = router.route("这家公司怎么样", Some(Scenario::Investment)).unwrap();
        assert_eq!(d.persona.name, "文档分析师");
        assert_eq!(d.routing_type, RoutingType::ScenarioPriority);
    }

    #[test]
    fn test_scenario_from_str() {
        assert_eq!("Compliance".parse::<Scenario>().unwrap(), Scenario::Compliance);
        assert_eq!("investment".parse::<Scenario>().unwrap(), Scenario::Investment);
        assert!("legal".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_shadowed_keywords() {
        let shadowed = router().shadowed_keywords();

        let chart = shadowed
            .iter()
            .find(|s| s.keyword == "图表" && s.rule == "visualize")
            .unwrap();
        assert_eq!(chart.shadowed_by, "data");

        let gen_chart = shadowed.iter().find(|s| s.keyword == "生成图").unwrap();
        assert_eq!(gen_chart.shadowed_by, "write");
        assert_eq!(gen_chart.by_keyword, "生成");

        // Keywords of the first rule can never be shadowed
        assert!(shadowed.iter().all(|s| s.rule != "summarize"));
    }

    #[test]
    fn test_rules_for_missing_personas_are_dropped() {
        let mut registry = PersonaRegistry::empty(CatalogSource::Bundled);
        registry
            .register(Persona {
                name: "solo".into(),
                role: "generalist".into(),
                aliases: vec![],
                preamble: "p".into(),
                temperature: 0.3,
                capability: Capability::Text,
                coordinator: true,
                fallback: true,
            })
            .unwrap();

        let router = Router::new(Arc::new(registry)).unwrap();
        assert!(router.rules().is_empty());
        assert_eq!(router.route("帮我总结", None).unwrap().persona.name, "solo");
    }

    #[test]
    fn test_missing_fallback_is_an_error() {
        let registry = PersonaRegistry::empty(CatalogSource::Bundled);
        assert!(Router::new(Arc::new(registry)).is_err());
    }
}
