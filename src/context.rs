//! Side-context merged into a model call alongside the message list.

/// Auxiliary information for one persona invocation. Absent parts are omitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideContext {
    pub document: Option<String>,
    /// Outputs of earlier plan steps, labeled by persona
    pub previous_results: Option<String>,
    pub feedback: Option<String>,
}

impl SideContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, document: Option<&str>) -> Self {
        self.document = document.map(str::to_string);
        self
    }

    pub fn with_previous_results(mut self, results: impl Into<String>) -> Self {
        self.previous_results = Some(results.into());
        self
    }

    pub fn with_feedback(mut self, feedback: Option<&str>) -> Self {
        self.feedback = feedback.map(str::to_string);
        self
    }

    /// Render the context block, or `None` when every part is absent or blank.
    ///
    /// The document excerpt keeps at most `document_budget` characters and is
    /// marked with "..." when cut.
    pub fn render(&self, document_budget: usize) -> Option<String> {
        let mut sections: Vec<String> = Vec::new();

        if let Some(document) = non_blank(&self.document) {
            sections.push(format!("📄 **文档内容**:\n{}", excerpt(document, document_budget)));
        }
        if let Some(results) = non_blank(&self.previous_results) {
            sections.push(format!("📋 **之前的处理结果**:\n{}", results));
        }
        if let Some(feedback) = non_blank(&self.feedback) {
            sections.push(format!("💬 **用户反馈**:\n{}", feedback));
        }

        if sections.is_empty() {
            None
        } else {
            Some(sections.join("\n\n"))
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn excerpt(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context_renders_nothing() {
        assert!(SideContext::new().render(1000).is_none());
        let blank = SideContext::new().with_feedback(Some("   "));
        assert!(blank.render(1000).is_none());
    }

    #[test]
    fn test_all_sections_in_order() {
        let context = SideContext::new()
            .with_document(Some("合同正文"))
            .with_previous_results("--- 文档分析师 output ---\n要点")
            .with_feedback(Some("请更简洁"));

        let rendered = context.render(1000).unwrap();
        assert_eq!(
            rendered,
            "📄 **文档内容**:\n合同正文\n\n📋 **之前的处理结果**:\n--- 文档分析师 output ---\n要点\n\n💬 **用户反馈**:\n请更简洁"
        );
    }

    #[test]
    fn test_document_budget_counts_characters() {
        let document = "条款".repeat(10);
        let rendered = SideContext::new()
            .with_document(Some(&document))
            .render(5)
            .unwrap();
        assert_eq!(rendered, "📄 **文档内容**:\n条款条款条...");
    }

    #[test]
    fn test_short_document_not_marked() {
        let rendered = SideContext::new()
            .with_document(Some("short"))
            .render(5)
            .unwrap();
        assert!(rendered.ends_with("short"));
    }
}
