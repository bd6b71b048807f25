//! E*Trade broker implementation.

pub mod client;
pub mod orders;
pub mod types;

use std::time::Duration;

use log::{info, warn};
use tradegate::{ClientOrderId, OrderIntent, Price, Symbol};

use crate::Broker;
use crate::error::{BrokerError, Precondition};
use crate::oauth::{AuthorizedCredentials, OAuthEndpoints, OAuthHandshake};
use crate::transport::{HttpTransport, Transport};
use crate::types::*;
use client::{ETradeClient, LIVE_BASE_URL, ResponseError, SANDBOX_BASE_URL, parse_json};
pub use orders::PreviewedOrder;
use types::{
    AccountListEnvelope, BalanceEnvelope, ComputedBalance, PortfolioEnvelope, PositionEntry,
    QuoteEnvelope,
};

/// Connection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ETradeConfig {
    /// Use the sandbox API instead of the live one.
    pub sandbox: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ETradeConfig {
    fn default() -> Self {
        Self {
            sandbox: false,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ETradeConfig {
    pub fn base_url(&self) -> &'static str {
        if self.sandbox {
            SANDBOX_BASE_URL
        } else {
            LIVE_BASE_URL
        }
    }
}

/// E*Trade connection implementing the generic Broker trait.
///
/// Blocking (sync): every call is one or two signed REST requests.
pub struct ETradeBroker {
    client: ETradeClient,
    handshake: OAuthHandshake,
    account: Option<AccountHandle>,
}

impl ETradeBroker {
    /// Backend tag used in the session registry.
    pub const KIND: &'static str = "etrade";

    /// Create an unauthenticated connection over the given transport.
    pub fn new(config: &ETradeConfig, transport: Box<dyn Transport>) -> Self {
        let base_url = config.base_url();
        Self {
            client: ETradeClient::new(transport, base_url),
            handshake: OAuthHandshake::new(OAuthEndpoints::etrade(base_url)),
            account: None,
        }
    }

    /// Create an unauthenticated connection over HTTPS.
    pub fn connect(config: &ETradeConfig) -> Result<Self, BrokerError> {
        let transport = HttpTransport::new(config.timeout)
            .map_err(|e| BrokerError::BackendQuery(e.to_string()))?;
        Ok(Self::new(config, Box::new(transport)))
    }

    /// Credentials and account for an account-scoped call.
    fn ready(&self) -> Result<(AuthorizedCredentials<'_>, &AccountHandle), BrokerError> {
        let account = require_ready(self.handshake.phase(), self.account.as_ref())?;
        Ok((self.handshake.authorized()?, account))
    }

    fn query<T: serde::de::DeserializeOwned>(
        &self,
        what: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, BrokerError> {
        let creds = self.handshake.authorized()?;
        parse_json(self.client.get(creds, path, query)).map_err(|e| query_error(what, e))
    }

    fn balance(&self) -> Result<ComputedBalance, BrokerError> {
        let (_, account) = self.ready()?;
        let path = format!("/v1/accounts/{}/balance.json", account.account_key);
        let env: BalanceEnvelope = self.query(
            "balance",
            &path,
            &[("instType", "BROKERAGE"), ("realTimeNAV", "true")],
        )?;
        Ok(env.response.computed)
    }
}

fn query_error(what: &str, e: ResponseError) -> BrokerError {
    BrokerError::BackendQuery(format!("{what}: {e}"))
}

fn missing(what: &str) -> BrokerError {
    BrokerError::BackendQuery(format!("balance response missing {what}"))
}

impl Broker for ETradeBroker {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn handshake_phase(&self) -> HandshakePhase {
        self.handshake.phase()
    }

    fn begin_handshake(&mut self, consumer: ConsumerCredentials) -> Result<String, BrokerError> {
        self.handshake.begin(self.client.transport(), consumer)
    }

    fn complete_handshake(&mut self, verifier: &str) -> Result<(), BrokerError> {
        self.handshake.complete(self.client.transport(), verifier)
    }

    fn select_account(&mut self, account_id: &str) -> Result<AccountHandle, BrokerError> {
        if self.handshake.phase() != HandshakePhase::Authorized {
            return Err(Precondition::NotAuthorized.into());
        }
        let wanted = normalize_account_id(account_id);
        let env: AccountListEnvelope = self.query("account list", "/v1/accounts/list.json", &[])?;

        let entry = env
            .response
            .accounts
            .account
            .into_iter()
            .find(|a| normalize_account_id(&a.account_id) == wanted)
            .ok_or_else(|| BrokerError::InvalidAccount(account_id.to_string()))?;

        let handle = AccountHandle {
            account_id: wanted,
            account_key: entry.account_id_key,
        };
        info!("selected account {}", handle.account_id);
        self.account = Some(handle.clone());
        Ok(handle)
    }

    fn selected_account(&self) -> Option<&AccountHandle> {
        self.account.as_ref()
    }

    fn account_value(&self) -> Result<Price, BrokerError> {
        let value = self
            .balance()?
            .real_time_values
            .and_then(|v| v.total_account_value)
            .ok_or_else(|| missing("RealTimeValues.totalAccountValue"))?;
        Ok(Price::from_dollars(value))
    }

    fn cash_available(&self) -> Result<Price, BrokerError> {
        let cash = self
            .balance()?
            .cash_available_for_investment
            .ok_or_else(|| missing("cashAvailableForInvestment"))?;
        Ok(Price::from_dollars(cash))
    }

    fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        let (creds, account) = self.ready()?;
        let path = format!("/v1/accounts/{}/portfolio.json", account.account_key);
        let response = self
            .client
            .get(creds, &path, &[])
            .map_err(|e| query_error("portfolio", ResponseError::Transport(e)))?;
        // No content: the account holds nothing
        if response.status == 204 || (response.is_success() && response.body.trim().is_empty()) {
            return Ok(Vec::new());
        }
        let env: PortfolioEnvelope =
            parse_json(Ok(response)).map_err(|e| query_error("portfolio", e))?;

        let mut positions = Vec::new();
        for raw in env
            .response
            .account_portfolio
            .into_iter()
            .flat_map(|p| p.position)
        {
            let entry: PositionEntry = serde_json::from_value(raw.clone())
                .map_err(|e| query_error("portfolio", ResponseError::Parse(e)))?;
            let Some(symbol) = entry.symbol().and_then(Symbol::try_new) else {
                warn!("skipping position with unsupported symbol: {:?}", entry.symbol());
                continue;
            };
            positions.push(Position {
                symbol,
                quantity: entry.signed_quantity(),
                market_value: Price::from_dollars(entry.market_value),
                last_price: Price::from_dollars(
                    entry.quick.as_ref().map_or(0.0, |q| q.last_trade),
                ),
                security_type: entry.product.as_ref().and_then(|p| p.security_type.clone()),
                raw,
            });
        }
        Ok(positions)
    }

    fn quote(&self, symbol: Symbol) -> Result<Quote, BrokerError> {
        let path = format!("/v1/market/quote/{}.json", symbol.as_str());
        let env: QuoteEnvelope = self.query("quote", &path, &[("detailFlag", "ALL")])?;
        let all = env
            .response
            .quote_data
            .into_iter()
            .next()
            .and_then(|d| d.all)
            .ok_or_else(|| BrokerError::BackendQuery(format!("quote: no data for {symbol}")))?;
        Ok(Quote {
            symbol,
            bid: Price::from_dollars(all.bid),
            ask: Price::from_dollars(all.ask),
            last: Price::from_dollars(all.last_trade),
        })
    }

    fn place_order(
        &mut self,
        intent: &OrderIntent,
        client_order_id: Option<ClientOrderId>,
    ) -> Result<OrderResult, BrokerError> {
        let previewed = self.preview(intent, client_order_id)?;
        self.confirm(&previewed)
    }
}
