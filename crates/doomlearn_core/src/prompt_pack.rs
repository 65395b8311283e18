//! crates/doomlearn_core/src/prompt_pack.rs
//!
//! Bounded fact sets for generation calls.

/// Limits applied when assembling a prompt pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackLimits {
    pub max_facts: usize,
    pub max_fact_chars: usize,
}

impl Default for PackLimits {
    fn default() -> Self {
        Self {
            max_facts: 6,
            max_fact_chars: 600,
        }
    }
}

/// The topic title plus the facts handed to the generation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPack {
    pub topic_title: String,
    pub facts: Vec<String>,
}

/// Trims each candidate, drops blanks, truncates each fact to `max_fact_chars`
/// characters and keeps at most `max_facts`, preserving input order.
pub fn build_prompt_pack<I, S>(topic_title: &str, candidates: I, limits: PackLimits) -> PromptPack
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let facts = candidates
        .into_iter()
        .filter_map(|text| {
            let text = text.as_ref().trim();
            (!text.is_empty()).then(|| text.chars().take(limits.max_fact_chars).collect())
        })
        .take(limits.max_facts)
        .collect();

    PromptPack {
        topic_title: topic_title.to_string(),
        facts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keeps_order_and_drops_blanks() {
        let pack = build_prompt_pack(
            "Osmosis",
            ["  water moves ", "", "   ", "across membranes"],
            PackLimits::default(),
        );
        assert_eq!(pack.topic_title, "Osmosis");
        assert_eq!(pack.facts, vec!["water moves", "across membranes"]);
    }

    #[test]
    fn truncates_facts_and_count() {
        let long = "é".repeat(700);
        let candidates: Vec<String> = (0..10).map(|i| format!("{i}{long}")).collect();
        let pack = build_prompt_pack("T", &candidates, PackLimits::default());

        assert_eq!(pack.facts.len(), 6);
        assert!(pack.facts.iter().all(|f| f.chars().count() == 600));
        assert!(pack.facts[0].starts_with('0'));
        assert!(pack.facts[5].starts_with('5'));
    }
}
