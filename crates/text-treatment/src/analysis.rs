//! Invoice analysis: prompt, schema, parsing and fallback

use crate::client::TextAnalyzer;
use crate::errors::{AnalysisError, Result};
use invoiceflow_common::metrics;
use regex_lite::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::{info, instrument, warn};

pub const SCHEMA_NAME: &str = "invoice_analyze";

const SYSTEM_PROMPT: &str = "Tu es une IA qui extrait les données importantes d'une facture.";

pub const FALLBACK_CONTENT: &str =
    "Le texte fourni ne contient pas de détails pour générer un résumé structuré de la facture.";

/// Structured result of an analysis
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceAnalysis {
    pub content: String,
    pub amount: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAnalysis {
    content: String,
    amount: serde_json::Value,
}

fn user_prompt(content: &str) -> String {
    format!(
        "Tu es une IA spécialisée dans l'analyse de texte de facture.\n\
         Tu dois retourner un JSON avec deux champs :\n\
         {{\n  \"content\": \"un résumé ou traitement structuré de la facture\",\n  \
         \"amount\": montant_total_en_euros_float\n}}\n\
         Texte à analyser : {}",
        content
    )
}

/// JSON schema of the expected completion
pub fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "content": { "type": "string" },
            "amount": { "type": "number" }
        },
        "required": ["content", "amount"],
        "additionalProperties": false
    })
}

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("code fence regex is valid")
});

/// Parse a completion into an analysis. Surrounding markdown code fences are ignored.
pub fn parse_analysis(raw: &str) -> Result<InvoiceAnalysis> {
    let json = CODE_FENCE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map_or(raw.trim(), |m| m.as_str());

    let parsed: RawAnalysis = serde_json::from_str(json)?;

    let amount = parsed
        .amount
        .as_f64()
        .ok_or_else(|| AnalysisError::SchemaViolation {
            message: format!("amount is not a number: {}", parsed.amount),
        })?;
    if !amount.is_finite() {
        return Err(AnalysisError::SchemaViolation {
            message: "amount is not finite".to_string(),
        });
    }

    Ok(InvoiceAnalysis {
        content: parsed.content,
        amount,
    })
}

/// Result substituted when the model call or its output cannot be used
#[derive(Debug, Clone)]
pub struct FallbackAnalysisPolicy {
    pub content: String,
    pub amount: f64,
}

impl Default for FallbackAnalysisPolicy {
    fn default() -> Self {
        Self {
            content: FALLBACK_CONTENT.to_string(),
            amount: 0.0,
        }
    }
}

impl FallbackAnalysisPolicy {
    pub fn resolve(&self, result: Result<InvoiceAnalysis>) -> InvoiceAnalysis {
        match result {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Analysis failed, using fallback");
                metrics::record_degraded("analysis", e.kind());
                InvoiceAnalysis {
                    content: self.content.clone(),
                    amount: self.amount,
                }
            }
        }
    }
}

/// Runs the completion and applies the fallback policy
pub struct InvoiceAnalyzer {
    analyzer: Arc<dyn TextAnalyzer>,
    fallback: FallbackAnalysisPolicy,
    schema: serde_json::Value,
}

impl InvoiceAnalyzer {
    pub fn new(analyzer: Arc<dyn TextAnalyzer>, fallback: FallbackAnalysisPolicy) -> Self {
        Self {
            analyzer,
            fallback,
            schema: response_schema(),
        }
    }

    async fn try_analyze(&self, content: &str) -> Result<InvoiceAnalysis> {
        let raw = self
            .analyzer
            .complete(SYSTEM_PROMPT, &user_prompt(content), SCHEMA_NAME, &self.schema)
            .await?;
        parse_analysis(&raw)
    }

    /// Never fails: unusable results are replaced by the fallback
    #[instrument(skip(self, content), fields(model = self.analyzer.model_name(), chars = content.len()))]
    pub async fn analyze(&self, invoice_id: i32, content: &str) -> InvoiceAnalysis {
        let analysis = self.fallback.resolve(self.try_analyze(content).await);
        info!(invoice_id, amount = analysis.amount, "Invoice analysed");
        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedAnalyzer {
        reply: std::result::Result<String, u16>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedAnalyzer {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::default(),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                prompts: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl TextAnalyzer for ScriptedAnalyzer {
        async fn complete(
            &self,
            _system: &str,
            user: &str,
            _schema_name: &str,
            _schema: &serde_json::Value,
        ) -> Result<String> {
            self.prompts.lock().unwrap().push(user.to_string());
            self.reply.clone().map_err(|status| AnalysisError::Api {
                status,
                body: "upstream down".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn analyzer(scripted: ScriptedAnalyzer) -> (InvoiceAnalyzer, Arc<ScriptedAnalyzer>) {
        let scripted = Arc::new(scripted);
        (
            InvoiceAnalyzer::new(scripted.clone(), FallbackAnalysisPolicy::default()),
            scripted,
        )
    }

    fn fallback() -> InvoiceAnalysis {
        InvoiceAnalysis {
            content: FALLBACK_CONTENT.to_string(),
            amount: 0.0,
        }
    }

    #[tokio::test]
    async fn test_well_formed_response_is_returned_exactly() {
        let (analyzer, scripted) =
            analyzer(ScriptedAnalyzer::replying(r#"{"content":"Loyer mars","amount":850.5}"#));

        let analysis = analyzer.analyze(42, "Loyer mars 850,50 EUR").await;

        assert_eq!(
            analysis,
            InvoiceAnalysis {
                content: "Loyer mars".to_string(),
                amount: 850.5,
            }
        );
        assert!(scripted.prompts.lock().unwrap()[0].ends_with("Texte à analyser : Loyer mars 850,50 EUR"));
    }

    #[tokio::test]
    async fn test_integer_amount_is_a_number() {
        let (analyzer, _) = analyzer(ScriptedAnalyzer::replying(r#"{"content":"Total: 100","amount":100}"#));
        assert_eq!(analyzer.analyze(42, "Total: 100").await.amount, 100.0);
    }

    #[tokio::test]
    async fn test_call_failure_returns_fallback() {
        let (analyzer, _) = analyzer(ScriptedAnalyzer::failing(503));
        assert_eq!(analyzer.analyze(1, "x").await, fallback());
    }

    #[tokio::test]
    async fn test_malformed_and_non_conforming_json_return_fallback() {
        let replies = [
            "not json at all",
            r#"{"content":"no amount"}"#,
            r#"{"amount":12}"#,
            r#"{"content":"text amount","amount":"12.5"}"#,
            r#"{"content":5,"amount":1}"#,
            "",
        ];

        for reply in replies {
            let (analyzer, _) = analyzer(ScriptedAnalyzer::replying(reply));
            assert_eq!(analyzer.analyze(1, "x").await, fallback(), "reply {:?}", reply);
        }
    }

    #[test]
    fn test_parse_strips_code_fences() {
        let raw = "```json\n{\"content\":\"EDF\",\"amount\":61.2}\n```";
        let analysis = parse_analysis(raw).unwrap();
        assert_eq!(analysis.content, "EDF");
        assert_eq!(analysis.amount, 61.2);

        assert!(parse_analysis("```\n{\"content\":\"a\",\"amount\":0}\n```").is_ok());
    }

    #[tokio::test]
    async fn test_extra_fields_return_fallback() {
        let raw = r#"{"content":"Loyer mars","amount":850.5,"currency":"EUR"}"#;
        assert!(matches!(parse_analysis(raw), Err(AnalysisError::Malformed(_))));

        let (analyzer, _) = analyzer(ScriptedAnalyzer::replying(raw));
        assert_eq!(analyzer.analyze(1, "Loyer mars").await, fallback());
    }

    #[test]
    fn test_schema_requires_both_fields() {
        let schema = response_schema();
        assert_eq!(schema["required"], serde_json::json!(["content", "amount"]));
        assert_eq!(schema["additionalProperties"], false);
    }
}
