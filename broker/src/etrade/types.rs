//! E*Trade API response types.
//!
//! Only the fields the backend reads are modelled; everything else in the
//! responses is ignored.

use serde::Deserialize;

/// `GET /v1/accounts/list.json`
#[derive(Debug, Deserialize)]
pub struct AccountListEnvelope {
    #[serde(rename = "AccountListResponse")]
    pub response: AccountListResponse,
}

#[derive(Debug, Deserialize)]
pub struct AccountListResponse {
    #[serde(rename = "Accounts", default)]
    pub accounts: Accounts,
}

#[derive(Debug, Default, Deserialize)]
pub struct Accounts {
    #[serde(rename = "Account", default)]
    pub account: Vec<AccountEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEntry {
    pub account_id: String,
    pub account_id_key: String,
    #[serde(default)]
    pub account_desc: Option<String>,
    #[serde(default)]
    pub account_status: Option<String>,
}

/// `GET /v1/accounts/{key}/balance.json`
#[derive(Debug, Deserialize)]
pub struct BalanceEnvelope {
    #[serde(rename = "BalanceResponse")]
    pub response: BalanceResponse,
}

#[derive(Debug, Deserialize)]
pub struct BalanceResponse {
    #[serde(rename = "Computed")]
    pub computed: ComputedBalance,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedBalance {
    #[serde(default)]
    pub cash_available_for_investment: Option<f64>,
    #[serde(rename = "RealTimeValues", default)]
    pub real_time_values: Option<RealTimeValues>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealTimeValues {
    #[serde(default)]
    pub total_account_value: Option<f64>,
}

/// `GET /v1/accounts/{key}/portfolio.json`
///
/// Positions are kept as raw JSON so callers get the full record.
#[derive(Debug, Deserialize)]
pub struct PortfolioEnvelope {
    #[serde(rename = "PortfolioResponse")]
    pub response: PortfolioResponse,
}

#[derive(Debug, Deserialize)]
pub struct PortfolioResponse {
    #[serde(rename = "AccountPortfolio", default)]
    pub account_portfolio: Vec<AccountPortfolio>,
}

#[derive(Debug, Deserialize)]
pub struct AccountPortfolio {
    #[serde(rename = "Position", default)]
    pub position: Vec<serde_json::Value>,
}

/// The fields of one portfolio position record we interpret.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionEntry {
    #[serde(default)]
    pub symbol_description: Option<String>,
    #[serde(rename = "Product", default)]
    pub product: Option<ProductEntry>,
    pub quantity: f64,
    #[serde(default)]
    pub position_type: Option<String>,
    #[serde(default)]
    pub market_value: f64,
    #[serde(rename = "Quick", default)]
    pub quick: Option<QuickView>,
}

impl PositionEntry {
    pub fn symbol(&self) -> Option<&str> {
        self.product
            .as_ref()
            .map(|p| p.symbol.as_str())
            .or(self.symbol_description.as_deref())
    }

    /// Signed share count: short positions are negative.
    pub fn signed_quantity(&self) -> i64 {
        let qty = self.quantity.trunc() as i64;
        match self.position_type.as_deref() {
            Some("SHORT") if qty > 0 => -qty,
            _ => qty,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductEntry {
    pub symbol: String,
    #[serde(default)]
    pub security_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickView {
    #[serde(default)]
    pub last_trade: f64,
}

/// `GET /v1/market/quote/{symbol}.json?detailFlag=ALL`
#[derive(Debug, Deserialize)]
pub struct QuoteEnvelope {
    #[serde(rename = "QuoteResponse")]
    pub response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
pub struct QuoteResponse {
    #[serde(rename = "QuoteData", default)]
    pub quote_data: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteData {
    #[serde(rename = "All", default)]
    pub all: Option<AllQuoteDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllQuoteDetails {
    #[serde(default)]
    pub bid: f64,
    #[serde(default)]
    pub ask: f64,
    #[serde(default)]
    pub last_trade: f64,
}

/// `POST /v1/accounts/{key}/orders/preview.json`
#[derive(Debug, Deserialize)]
pub struct PreviewEnvelope {
    #[serde(rename = "PreviewOrderResponse")]
    pub response: PreviewOrderResponse,
}

#[derive(Debug, Deserialize)]
pub struct PreviewOrderResponse {
    #[serde(rename = "PreviewIds", default)]
    pub preview_ids: Vec<PreviewIdEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewIdEntry {
    pub preview_id: u64,
}
