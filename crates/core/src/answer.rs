use crate::models::{SearchHit, UserProfile};

pub const QA_PROMPT_FILE: &str = "qa_bilingual.txt";

pub const DEFAULT_QA_PROMPT: &str = r#"
You answer questions about Israeli HMOs (מכבי, מאוחדת, כללית) using the provided context.
- Answer in the user's language.
- Tailor the answer to the user's HMO and tier.
- If the answer is not in CONTEXT, say you don't know.

USER PROFILE:
{{USER_PROFILE}}

CONTEXT:
{{CONTEXT}}

Answer clearly and concisely.
Cite with [1], [2]... where relevant based on the numbered context blocks.
"#;

/// Numbered context blocks, one per hit, in rank order.
pub fn build_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(position, hit)| {
            format!(
                "[{}] ({} • score={:.3})\n{}",
                position + 1,
                hit.source,
                hit.score,
                hit.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_qa_prompt(template: &str, profile: &UserProfile, hits: &[SearchHit]) -> String {
    let profile_json = serde_json::to_string(profile).unwrap_or_else(|_| "{}".to_string());
    template
        .replace("{{USER_PROFILE}}", &profile_json)
        .replace("{{CONTEXT}}", &build_context(hits))
}

#[cfg(test)]
mod tests {
    use super::{build_context, render_qa_prompt, DEFAULT_QA_PROMPT};
    use crate::models::{SearchHit, UserProfile};

    fn hit(score: f32, source: &str, text: &str) -> SearchHit {
        SearchHit {
            score,
            text: text.to_string(),
            source: source.to_string(),
            chunk_id: 0,
        }
    }

    #[test]
    fn context_blocks_are_numbered_from_one() {
        let hits = vec![
            hit(0.91234, "dental.html", "Cleaning twice a year"),
            hit(0.5, "optometry.html", "Eye exam"),
        ];
        assert_eq!(
            build_context(&hits),
            "[1] (dental.html • score=0.912)\nCleaning twice a year\n\n\
             [2] (optometry.html • score=0.500)\nEye exam"
        );
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn prompt_receives_profile_and_context() {
        let profile = UserProfile {
            hmo: Some("מכבי".to_string()),
            tier: Some("זהב".to_string()),
            ..UserProfile::default()
        };
        let prompt = render_qa_prompt(
            DEFAULT_QA_PROMPT,
            &profile,
            &[hit(0.8, "alt.html", "Acupuncture 70% off")],
        );
        assert!(prompt.contains(r#"{"hmo":"מכבי","tier":"זהב"}"#));
        assert!(prompt.contains("[1] (alt.html • score=0.800)\nAcupuncture 70% off"));
        assert!(!prompt.contains("{{"));
    }
}
