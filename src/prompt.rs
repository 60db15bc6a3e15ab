//! Prompt rendering for the chat flow.
//!
//! Templates use three placeholders: `{{query}}`, `{{context}}` and
//! `{{history}}`. Context documents are numbered in rank order.

use ragbridge_core::models::{Conversation, SearchHit};

pub const DEFAULT_TEMPLATE: &str = "\
You are a helpful assistant. Answer the question using only the context below.
If the context does not contain the answer, say that you do not know.

Context:
{{context}}

Conversation so far:
{{history}}

Question: {{query}}
Answer:";

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Built-in template unless the config overrides it.
    pub fn from_config(template: Option<&str>) -> Self {
        template.map(Self::new).unwrap_or_default()
    }

    pub fn render(&self, query: &str, context: &[SearchHit], history: &[Conversation]) -> String {
        let context_text = if context.is_empty() {
            "(no relevant documents)".to_string()
        } else {
            context
                .iter()
                .enumerate()
                .map(|(i, hit)| match hit.title {
                    Some(ref title) => format!("[{}] {}\n{}", i + 1, title, hit.text),
                    None => format!("[{}] {}", i + 1, hit.text),
                })
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let history_text = if history.is_empty() {
            "(none)".to_string()
        } else {
            history
                .iter()
                .map(|c| format!("{}: {}", c.role.as_str(), c.text))
                .collect::<Vec<_>>()
                .join("\n")
        };

        // Single pass, so placeholder-like text inside documents or the
        // query is never expanded.
        let mut out = String::with_capacity(self.template.len() + context_text.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            rest = &rest[start..];
            let value = [
                ("{{query}}", query),
                ("{{context}}", context_text.as_str()),
                ("{{history}}", history_text.as_str()),
            ]
            .into_iter()
            .find(|(placeholder, _)| rest.starts_with(placeholder));
            match value {
                Some((placeholder, value)) => {
                    out.push_str(value);
                    rest = &rest[placeholder.len()..];
                }
                None => {
                    out.push_str("{{");
                    rest = &rest[2..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(title: Option<&str>, text: &str) -> SearchHit {
        SearchHit {
            document_id: "d".into(),
            title: title.map(String::from),
            source: None,
            text: text.into(),
            score: 1.0,
        }
    }

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let t = PromptTemplate::new("Q={{query}} C={{context}} H={{history}}");
        let out = t.render("why?", &[hit(Some("Doc"), "because")], &[]);
        assert_eq!(out, "Q=why? C=[1] Doc\nbecause H=(none)");
    }

    #[test]
    fn test_placeholders_in_values_are_not_expanded() {
        let t = PromptTemplate::new("{{context}} | {{query}} | {{unknown}}");
        let out = t.render("{{context}}", &[hit(None, "see {{query}}")], &[]);
        assert_eq!(out, "[1] see {{query}} | {{context}} | {{unknown}}");
    }

    #[test]
    fn test_empty_context_is_marked() {
        let out = PromptTemplate::default().render("hello", &[], &[]);
        assert!(out.contains("(no relevant documents)"));
        assert!(out.contains("Question: hello"));
    }
}
