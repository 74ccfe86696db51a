//! Payloads sent by the ledger's webhooks and the calls they map to.
//!
//! A "store transaction" hook is answered by classifying each transaction
//! and pushing the category back; an "update transaction" hook carries the
//! category the user settled on and is used for training.

use serde::Deserialize;

use crate::classifier::{Category, ClassifierError};
use crate::ledger::{FireflyClient, LedgerError};
use crate::service::Categorizer;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub content: WebhookContent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookContent {
    #[serde(default)]
    pub transactions: Vec<WebhookTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookTransaction {
    #[serde(rename = "transaction_journal_id")]
    pub id: i64,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "category_name", default)]
    pub category: Option<String>,
}

impl WebhookPayload {
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// Classifies every transaction of a new-transaction hook.
pub fn handle_new_transactions(categorizer: &Categorizer, payload: &WebhookPayload) -> Vec<(i64, Category)> {
    payload
        .content
        .transactions
        .iter()
        .map(|trn| {
            log::info!("hook new trn: received (id: {}) (description: {})", trn.id, trn.description);
            (trn.id, categorizer.on_new_transaction(&trn.description))
        })
        .collect()
}

/// Trains on every transaction of an update hook.
///
/// A failing transaction does not stop the rest; each result is returned
/// next to its journal id.
pub fn handle_updated_transactions(
    categorizer: &Categorizer,
    payload: &WebhookPayload,
) -> Vec<(i64, Result<(), ClassifierError>)> {
    payload
        .content
        .transactions
        .iter()
        .map(|trn| {
            let category = trn.category.as_deref().unwrap_or_default();
            let result = categorizer.on_category_confirmed(&trn.description, category);
            if let Err(e) = &result {
                log::warn!("hook update trn: error updating model (id: {}): {}", trn.id, e);
            }
            (trn.id, result)
        })
        .collect()
}

/// Writes classified categories back to the ledger.
///
/// `Unknown` results are left alone so the ledger never receives the
/// placeholder as a real category. Returns the failures.
pub async fn push_categories(client: &FireflyClient, results: &[(i64, Category)]) -> Vec<(i64, LedgerError)> {
    let mut failures = Vec::new();
    for (id, category) in results {
        let Some(label) = category.label() else {
            log::info!("hook new trn: no category yet for (id: {}), not updating", id);
            continue;
        };
        if let Err(e) = client.update_transaction_category(&id.to_string(), label).await {
            log::error!("hook new trn: error updating (id: {}): {}", id, e);
            failures.push((*id, e));
        }
    }
    failures
}
