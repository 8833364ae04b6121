//! 帮助中心工具：query_help_center
//!
//! 基于内置 FAQ 的关键词匹配，命中词最多的条目胜出；无命中时返回联系方式。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::{params_schema, parse_args, Tool, ToolContext, ToolOutcome, ToolRegistry};

pub const SUPPORT_CONTACT: &str = "+34 900 000 000 | support@stays.example.com | Mon-Sun 09:00-21:00 CET";

struct FaqEntry {
    keywords: &'static [&'static str],
    answer: &'static str,
}

const FAQ: &[FaqEntry] = &[
    FaqEntry {
        keywords: &["payment", "pay", "card", "pago", "tarjeta", "paypal", "transfer"],
        answer: "We accept Visa, Mastercard, American Express and PayPal. Stays longer than 60 nights \
                 can be paid in monthly instalments; the first month is charged at booking.",
    },
    FaqEntry {
        keywords: &["minimum", "minimo", "mínimo", "min", "nights", "noches"],
        answer: "The minimum stay is 7 nights for most apartments. Some properties allow shorter stays \
                 outside high season; the listing page shows the exact minimum.",
    },
    FaqEntry {
        keywords: &["extend", "extension", "extender", "ampliar", "longer"],
        answer: "To extend your stay, request it from your booking page at least 7 days before check-out. \
                 Extensions depend on availability and are charged at the current monthly rate.",
    },
    FaqEntry {
        keywords: &["deposit", "fianza", "deposito", "depósito"],
        answer: "A refundable security deposit of one week's rent is pre-authorised on your card at \
                 check-in and released within 7 days after check-out if there is no damage.",
    },
    FaqEntry {
        keywords: &["invoice", "factura", "vat", "iva", "receipt"],
        answer: "Invoices including VAT are available in your account under 'My bookings' once the \
                 payment is complete. Company details can be added before the invoice is issued.",
    },
    FaqEntry {
        keywords: &["account", "login", "password", "cuenta", "contraseña", "register"],
        answer: "You can reset your password from the login page using 'Forgot password'. Bookings made \
                 as a guest can be linked to a new account with the same email address.",
    },
    FaqEntry {
        keywords: &["early", "checkout", "check-out", "leave", "salida"],
        answer: "Leaving earlier than planned is possible. Nights not used are refunded according to the \
                 cancellation policy of your booking.",
    },
];

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn best_answer(question: &str) -> Option<&'static str> {
    let words = tokenize(question);
    FAQ.iter()
        .map(|entry| {
            let hits = entry
                .keywords
                .iter()
                .filter(|k| words.iter().any(|w| w == *k))
                .count();
            (hits, entry.answer)
        })
        .filter(|(hits, _)| *hits > 0)
        .max_by_key(|(hits, _)| *hits)
        .map(|(_, answer)| answer)
}

pub fn register(registry: &mut ToolRegistry) {
    registry.register(HelpCenterTool);
}

#[derive(Debug, Deserialize, JsonSchema)]
struct QueryArgs {
    /// 用户的问题原文
    question: String,
}

pub struct HelpCenterTool;

#[async_trait]
impl Tool for HelpCenterTool {
    fn name(&self) -> &str {
        "query_help_center"
    }

    fn description(&self) -> &str {
        "Ask the help center about platform FAQs: payment methods, minimum stay, stay extensions, \
         deposits, invoices, accounts and general platform questions."
    }

    fn parameters_schema(&self) -> Value {
        params_schema::<QueryArgs>()
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutcome, String> {
        let args: QueryArgs = parse_args(self.name(), args)?;
        Ok(ToolOutcome::value(match best_answer(&args.question) {
            Some(answer) => answer.to_string(),
            None => format!(
                "No specific information was found for that in the help center. \
                 Please contact our team: {SUPPORT_CONTACT}"
            ),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_answer_matches_keywords() {
        assert!(best_answer("Which payment methods do you accept?")
            .unwrap()
            .contains("PayPal"));
        assert!(best_answer("¿Cuál es la estancia mínima en noches?")
            .unwrap()
            .contains("minimum stay"));
        assert!(best_answer("Tell me a joke").is_none());
    }

    #[tokio::test]
    async fn test_no_match_returns_contact() {
        let out = HelpCenterTool
            .execute(serde_json::json!({"question": "weather tomorrow"}), &ToolContext::default())
            .await
            .unwrap();
        assert!(matches!(out, ToolOutcome::Value(ref v) if v.contains(SUPPORT_CONTACT)));
    }
}
