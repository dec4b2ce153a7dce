//! Fun facts: one chat call parsed into exactly ten Q&A pairs, padded with a
//! stock fact when the model comes up short.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::OpenAiClient;
use crate::api::openai::ChatMessage;
use crate::db::Storage;
use crate::error::ApiError;

const FACT_COUNT: usize = 10;

const FUN_FACTS_SYSTEM_PROMPT: &str = "You are a friendly educator who creates fascinating fun facts for children aged 3-5. \
Generate exactly 10 fun facts in question-answer format. Each fact should be simple, \
educational but entertaining, and related to the given context when possible. \
Keep questions starting with 'Did you know...' and answers friendly, short, and exciting. \
Format your response as exactly 10 Q&A pairs like this:\n\
Q: Did you know cats can sleep for 16 hours a day?\n\
A: Yes! Cats love to nap and dream just like us.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunFact {
    pub question: String,
    pub answer: String,
}

impl FunFact {
    fn stock() -> Self {
        Self {
            question: "Did you know reading stories helps your imagination grow?".to_string(),
            answer: "Yes! Every story takes you on a magical adventure in your mind.".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct FunFactsService {
    openai: OpenAiClient,
    db: Storage,
}

impl FunFactsService {
    pub fn new(openai: OpenAiClient, db: Storage) -> Self {
        Self { openai, db }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        request_id: &str,
        user_id: Option<i64>,
    ) -> Result<Vec<FunFact>, ApiError> {
        let context_prompt = if prompt.trim().is_empty() {
            "Create 10 fun facts about animals, nature, friendship, and adventures that would interest children"
                .to_string()
        } else {
            format!(
                "Create 10 fun facts related to the theme or characters from this story idea: '{}'",
                prompt
            )
        };

        info!("request {}: generating fun facts", request_id);
        let messages = [
            ChatMessage::system(FUN_FACTS_SYSTEM_PROMPT),
            ChatMessage::user(context_prompt),
        ];
        let content = self.openai.chat(&messages, 800, 0.8).await?;
        let facts = parse_fun_facts(&content);

        // Persistence is best-effort and only for signed-in callers.
        if user_id.is_some() {
            let facts_value = serde_json::to_value(&facts)?;
            if let Err(err) = self.db.save_fun_facts(prompt, &facts_value, request_id).await {
                warn!("request {}: could not save fun facts: {}", request_id, err);
            }
        }

        Ok(facts)
    }
}

/// Parses `Q:`/`A:` line pairs, then pads or truncates to exactly ten facts.
pub fn parse_fun_facts(content: &str) -> Vec<FunFact> {
    let mut facts = Vec::new();
    let mut current_question: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if let Some(q) = line.strip_prefix("Q:") {
            current_question = Some(q.trim().to_string());
        } else if let Some(a) = line.strip_prefix("A:")
            && let Some(question) = current_question.take()
        {
            facts.push(FunFact {
                question,
                answer: a.trim().to_string(),
            });
        }
    }

    while facts.len() < FACT_COUNT {
        facts.push(FunFact::stock());
    }
    facts.truncate(FACT_COUNT);
    facts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_q_a_pairs_in_order() {
        let content = "Q: Did you know bees dance?\nA: Yes! They dance to show where flowers are.\n\n\
                       Q: Did you know rain smells?\nA: It does! That smell is called petrichor.";
        let facts = parse_fun_facts(content);
        assert_eq!(facts[0].question, "Did you know bees dance?");
        assert_eq!(facts[1].answer, "It does! That smell is called petrichor.");
    }

    #[test]
    fn pads_to_ten_facts() {
        let facts = parse_fun_facts("Q: one?\nA: yes.");
        assert_eq!(facts.len(), 10);
        assert_eq!(facts[9], FunFact::stock());
    }

    #[test]
    fn truncates_past_ten_and_skips_orphan_answers() {
        let mut content = String::from("A: orphan answer without a question\n");
        for i in 0..12 {
            content.push_str(&format!("Q: question {}?\nA: answer {}.\n", i, i));
        }
        let facts = parse_fun_facts(&content);
        assert_eq!(facts.len(), 10);
        assert_eq!(facts[0].question, "question 0?");
    }
}
