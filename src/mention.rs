//! "@Persona" mention parsing.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::persona::{Persona, PersonaRegistry};

/// "@" followed by word or ideographic characters. `\w` is Unicode-aware.
static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(\w+)").expect("mention pattern is valid"));

/// A mention that resolved against the registry.
#[derive(Debug, Clone)]
pub struct Mention {
    /// The form written after "@", e.g. an alias rather than the canonical name.
    pub token: String,
    pub persona: Arc<Persona>,
}

impl Mention {
    /// The literal "@token" text as it appears in the message.
    pub fn literal(&self) -> String {
        format!("@{}", self.token)
    }
}

/// Extract every valid mention, one per persona, in order of first appearance.
///
/// Chinese text has no word breaks, so "@翻译专家请帮我" captures the whole
/// run. When the full run does not resolve, the longest registered prefix is
/// used instead.
pub fn parse_mentions(text: &str, registry: &PersonaRegistry) -> Vec<Mention> {
    let mut mentions: Vec<Mention> = Vec::new();

    for caps in MENTION_RE.captures_iter(text) {
        let run = &caps[1];
        let Some((token, persona)) = resolve_run(run, registry) else {
            continue;
        };
        if mentions.iter().any(|m| m.persona.name == persona.name) {
            continue;
        }
        mentions.push(Mention {
            token: token.to_string(),
            persona,
        });
    }

    mentions
}

fn resolve_run<'a>(run: &'a str, registry: &PersonaRegistry) -> Option<(&'a str, Arc<Persona>)> {
    let mut ends: Vec<usize> = run.char_indices().map(|(i, _)| i).skip(1).collect();
    ends.push(run.len());

    ends.into_iter().rev().find_map(|end| {
        let candidate = &run[..end];
        registry.get(candidate).map(|persona| (candidate, persona))
    })
}

/// Remove the first occurrence of the mention from `text` and trim.
///
/// Falls back to "@" + canonical name when the written form is not present.
pub fn strip_mention(text: &str, mention: &Mention) -> String {
    let literal = mention.literal();
    if text.contains(&literal) {
        return text.replacen(&literal, "", 1).trim().to_string();
    }
    text.replacen(&mention.persona.mention(), "", 1)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PersonaRegistry {
        PersonaRegistry::bundled().unwrap()
    }

    fn names(mentions: &[Mention]) -> Vec<&str> {
        mentions.iter().map(|m| m.persona.name.as_str()).collect()
    }

    #[test]
    fn test_single_mention() {
        let mentions = parse_mentions("@翻译专家 Hello", &registry());
        assert_eq!(names(&mentions), vec!["翻译专家"]);
        assert_eq!(mentions[0].token, "翻译专家");
    }

    #[test]
    fn test_no_mentions() {
        assert!(parse_mentions("帮我总结这份文档", &registry()).is_empty());
        assert!(parse_mentions("email me at someone@", &registry()).is_empty());
    }

    #[test]
    fn test_unknown_mentions_filtered() {
        let mentions = parse_mentions("@nobody @合规官 check this", &registry());
        assert_eq!(names(&mentions), vec!["合规官"]);
    }

    #[test]
    fn test_order_of_first_appearance() {
        let mentions = parse_mentions("@数据专家 and @校对编辑 then @数据专家 again", &registry());
        assert_eq!(names(&mentions), vec!["数据专家", "校对编辑"]);
    }

    #[test]
    fn test_alias_mention() {
        let mentions = parse_mentions("@绘画智能体 画一个柱状图", &registry());
        assert_eq!(names(&mentions), vec!["数据可视化专家"]);
        assert_eq!(mentions[0].token, "绘画智能体");
    }

    #[test]
    fn test_mention_without_space() {
        let mentions = parse_mentions("@翻译专家请翻译这句话", &registry());
        assert_eq!(names(&mentions), vec!["翻译专家"]);
        assert_eq!(mentions[0].token, "翻译专家");
    }

    #[test]
    fn test_strip_mention() {
        let reg = registry();
        let mentions = parse_mentions("  @翻译专家 Hello  ", &reg);
        assert_eq!(strip_mention("  @翻译专家 Hello  ", &mentions[0]), "Hello");

        let mentions = parse_mentions("@翻译专家请翻译这句话", &reg);
        assert_eq!(strip_mention("@翻译专家请翻译这句话", &mentions[0]), "请翻译这句话");
    }

    #[test]
    fn test_strip_mention_falls_back_to_canonical_name() {
        let reg = registry();
        let persona = reg.get("数据可视化专家").unwrap();
        let mention = Mention {
            token: "绘画智能体".into(),
            persona,
        };
        assert_eq!(strip_mention("@数据可视化专家 画图", &mention), "画图");
    }

    #[test]
    fn test_strip_only_first_occurrence() {
        let reg = registry();
        let text = "@合规官 review what @合规官 said";
        let mentions = parse_mentions(text, &reg);
        assert_eq!(strip_mention(text, &mentions[0]), "review what @合规官 said");
    }
}
