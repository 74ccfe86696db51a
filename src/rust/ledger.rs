use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::LedgerConfig;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Ledger returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to decode ledger response: {0}")]
    Decode(String),
    #[error("Missing configuration: {0} is not set")]
    MissingConfig(&'static str),
}

/// A historical transaction that already carries a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorizedTransaction {
    pub description: String,
    pub category: String,
}

impl CategorizedTransaction {
    pub fn new(description: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            category: category.into(),
        }
    }
}

/// Anything that can enumerate every categorized transaction in the ledger.
#[allow(async_fn_in_trait)]
pub trait TransactionSource {
    async fn fetch_all_categorized(&self) -> Result<Vec<CategorizedTransaction>, LedgerError>;
}

/// In-memory source, mostly useful for tests and replays.
impl TransactionSource for Vec<CategorizedTransaction> {
    async fn fetch_all_categorized(&self) -> Result<Vec<CategorizedTransaction>, LedgerError> {
        Ok(self.clone())
    }
}

#[derive(Deserialize)]
struct TransactionsPage {
    data: Vec<TransactionGroup>,
    meta: PageMeta,
}

#[derive(Deserialize)]
struct TransactionGroup {
    attributes: GroupAttributes,
}

#[derive(Deserialize)]
struct GroupAttributes {
    transactions: Vec<TransactionSplit>,
}

#[derive(Deserialize)]
struct TransactionSplit {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category_name: Option<String>,
}

#[derive(Deserialize)]
struct PageMeta {
    pagination: Pagination,
}

#[derive(Deserialize)]
struct Pagination {
    total_pages: u32,
}

#[derive(Serialize)]
struct CategoryUpdate<'a> {
    apply_rules: bool,
    transactions: [CategorySplit<'a>; 1],
}

#[derive(Serialize)]
struct CategorySplit<'a> {
    category_name: &'a str,
}

/// Decodes one page of `GET /api/v1/transactions`.
///
/// Returns every split that has a category, along with the total page count.
/// Splits with a category but no description are kept so the bootstrap can
/// count them as skipped.
pub fn parse_transactions_page(body: &str) -> Result<(Vec<CategorizedTransaction>, u32), LedgerError> {
    let page: TransactionsPage =
        serde_json::from_str(body).map_err(|e| LedgerError::Decode(e.to_string()))?;
    let transactions = page
        .data
        .into_iter()
        .flat_map(|group| group.attributes.transactions)
        .filter_map(|split| {
            let category = split.category_name.filter(|c| !c.trim().is_empty())?;
            Some(CategorizedTransaction {
                description: split.description.unwrap_or_default(),
                category,
            })
        })
        .collect();
    Ok((transactions, page.meta.pagination.total_pages))
}

/// Minimal Firefly III REST client.
#[derive(Debug, Clone)]
pub struct FireflyClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl FireflyClient {
    pub fn new(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("categorist/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<String, LedgerError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LedgerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn fetch_page(&self, page: u32) -> Result<(Vec<CategorizedTransaction>, u32), LedgerError> {
        log::debug!("Fetching transactions page {}", page);
        let response = self
            .client
            .get(self.url("transactions"))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/vnd.api+json")
            .query(&[("page", page)])
            .send()
            .await?;
        let body = Self::check(response).await?;
        parse_transactions_page(&body)
    }

    /// Sets the category of a transaction without re-running ledger rules.
    pub async fn update_transaction_category(&self, id: &str, category: &str) -> Result<(), LedgerError> {
        let payload = CategoryUpdate {
            apply_rules: false,
            transactions: [CategorySplit { category_name: category }],
        };
        let response = self
            .client
            .put(self.url(&format!("transactions/{}", id)))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/vnd.api+json")
            .json(&payload)
            .send()
            .await?;
        Self::check(response).await?;
        log::info!("Updated transaction {} to category '{}'", id, category);
        Ok(())
    }
}

impl TransactionSource for FireflyClient {
    async fn fetch_all_categorized(&self) -> Result<Vec<CategorizedTransaction>, LedgerError> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let (mut transactions, total_pages) = self.fetch_page(page).await?;
            all.append(&mut transactions);
            if page >= total_pages {
                break;
            }
            page += 1;
        }
        log::info!("Fetched {} categorized transaction(s) over {} page(s)", all.len(), page);
        Ok(all)
    }
}
