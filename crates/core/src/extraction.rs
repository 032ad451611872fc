use crate::error::ExtractionError;
use crate::models::ChatMessage;
use crate::traits::{ChatCompleter, OcrEngine, PromptLoader};
use crate::validation::{form_template, validate, ValidationIssue};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "You are a precise information extraction assistant.";
const TRANSLATE_PROMPT: &str = "translate_json_fields_prompt.txt";
const PREVIEW_CHARS: usize = 1_500;

/// `he` when the text contains any Hebrew letter, `en` otherwise.
pub fn detect_language(text: &str) -> &'static str {
    if text.chars().any(|c| ('\u{05d0}'..='\u{05ea}').contains(&c)) {
        "he"
    } else {
        "en"
    }
}

/// Removes a surrounding Markdown code fence (with or without a language tag).
pub fn strip_code_fences(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub language: &'static str,
    pub raw_output: String,
    pub payload: Option<Value>,
    pub issues: Vec<ValidationIssue>,
}

impl ExtractionReport {
    pub fn is_valid(&self) -> bool {
        self.payload.is_some() && self.issues.is_empty()
    }
}

/// OCR, two completion passes and validation over one uploaded form.
pub struct FieldExtractor<'a> {
    ocr: &'a dyn OcrEngine,
    completer: &'a dyn ChatCompleter,
    prompts: &'a dyn PromptLoader,
}

impl<'a> FieldExtractor<'a> {
    pub fn new(
        ocr: &'a dyn OcrEngine,
        completer: &'a dyn ChatCompleter,
        prompts: &'a dyn PromptLoader,
    ) -> Self {
        Self {
            ocr,
            completer,
            prompts,
        }
    }

    /// First characters of the OCR text, for a quick look before extraction.
    pub async fn preview(
        &self,
        document: &[u8],
        file_name: &str,
    ) -> Result<String, ExtractionError> {
        let text = self
            .ocr
            .ocr(document, file_name)
            .await
            .map_err(ExtractionError::Ocr)?;
        Ok(text.chars().take(PREVIEW_CHARS).collect())
    }

    pub async fn run(
        &self,
        document: &[u8],
        file_name: &str,
    ) -> Result<ExtractionReport, ExtractionError> {
        let text = self
            .ocr
            .ocr(document, file_name)
            .await
            .map_err(ExtractionError::Ocr)?;
        let language = detect_language(&text);
        info!(
            file_name,
            language,
            chars = text.chars().count(),
            "extracting fields"
        );

        let prompt_name = if language == "he" {
            "prompt_he.txt"
        } else {
            "prompt_en.txt"
        };
        let extraction_prompt = format!(
            "{}\n\n\"\"\"\n{}\n\"\"\"",
            self.prompts.load_prompt(prompt_name)?,
            text
        );
        let extracted = self.ask(extraction_prompt).await?;

        let translate_prompt = format!(
            "{}\n\n{}",
            self.prompts.load_prompt(TRANSLATE_PROMPT)?,
            strip_code_fences(&extracted)
        );
        let translated = self.ask(translate_prompt).await?;
        let raw_output = strip_code_fences(&translated).to_string();

        let (payload, issues) = match serde_json::from_str::<Value>(&raw_output) {
            Ok(payload) => {
                let issues = validate(&payload, &form_template());
                (Some(payload), issues)
            }
            Err(error) => {
                warn!(file_name, %error, "model output is not valid JSON");
                (None, Vec::new())
            }
        };

        Ok(ExtractionReport {
            language,
            raw_output,
            payload,
            issues,
        })
    }

    async fn ask(&self, prompt: String) -> Result<String, ExtractionError> {
        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];
        Ok(self.completer.complete(&messages).await?)
    }
}
