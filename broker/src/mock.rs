//! Mock broker for testing: implements the `Broker` trait with configurable behavior.
//!
//! Use this in tests to simulate a backend without network calls. The
//! handshake is simulated (any consumer credentials, one accepted verifier),
//! balances, positions and quotes are fixed, and placed orders are recorded.
//!
//! ```
//! use tradegate::Symbol;
//! use tradegate_broker::mock::{FillMode, MockBroker};
//!
//! let broker = MockBroker::builder()
//!     .fill_mode(FillMode::Accept)
//!     .with_account("1234-5678")
//!     .with_position(Symbol::new("AAPL"), 100, 150_00)
//!     .with_balances(1_000_000_00, 500_000_00)
//!     .build();
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tradegate::{ClientOrderId, OrderIntent, Price, Symbol};

use crate::Broker;
use crate::error::{BrokerError, Precondition};
use crate::types::*;

/// Verifier the mock accepts unless configured otherwise.
pub const DEFAULT_VERIFIER: &str = "mock-verifier";

/// How the mock broker handles orders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillMode {
    /// Every order previews and places.
    Accept,
    /// Every preview fails.
    RejectPreview,
    /// Previews succeed, every placement fails.
    RejectPlacement,
    /// The first `n` orders place, later placements fail.
    RejectAfter(usize),
}

/// A placed order, for assertions in tests.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedOrder {
    pub client_order_id: ClientOrderId,
    pub preview_id: u64,
    pub intent: OrderIntent,
}

/// Shared view of the orders a mock has placed. Stays readable after the
/// broker itself has been boxed into a session.
pub type OrderLog = Arc<Mutex<Vec<RecordedOrder>>>;

/// Builder for `MockBroker`.
pub struct MockBrokerBuilder {
    fill_mode: FillMode,
    accounts: Vec<String>,
    positions: Vec<Position>,
    quotes: Vec<Quote>,
    account_value: Price,
    cash: Price,
    verifier: String,
}

impl MockBrokerBuilder {
    pub fn fill_mode(mut self, mode: FillMode) -> Self {
        self.fill_mode = mode;
        self
    }

    /// Add an account the mock lists. Without any, it lists `12345678`.
    pub fn with_account(mut self, account_id: &str) -> Self {
        self.accounts.push(normalize_account_id(account_id));
        self
    }

    pub fn with_position(mut self, symbol: Symbol, quantity: i64, last_price_cents: i64) -> Self {
        self.positions.push(Position {
            symbol,
            quantity,
            market_value: Price(quantity * last_price_cents),
            last_price: Price(last_price_cents),
            security_type: Some("EQ".into()),
            raw: json!({
                "symbolDescription": symbol.as_str(),
                "quantity": quantity,
            }),
        });
        self
    }

    /// Quote with last trade at the midpoint.
    pub fn with_quote(mut self, symbol: Symbol, bid: i64, ask: i64) -> Self {
        self.quotes.push(Quote {
            symbol,
            bid: Price(bid),
            ask: Price(ask),
            last: Price((bid + ask) / 2),
        });
        self
    }

    pub fn with_balances(mut self, account_value_cents: i64, cash_cents: i64) -> Self {
        self.account_value = Price(account_value_cents);
        self.cash = Price(cash_cents);
        self
    }

    /// The verifier `complete_handshake` accepts.
    pub fn verifier(mut self, verifier: &str) -> Self {
        self.verifier = verifier.to_string();
        self
    }

    pub fn build(self) -> MockBroker {
        let accounts = if self.accounts.is_empty() {
            vec!["12345678".to_string()]
        } else {
            self.accounts
        };
        MockBroker {
            fill_mode: self.fill_mode,
            accounts,
            positions: self.positions,
            quotes: self.quotes,
            account_value: self.account_value,
            cash: self.cash,
            verifier: self.verifier,
            phase: HandshakePhase::Unauthenticated,
            account: None,
            next_preview_id: 1,
            orders: OrderLog::default(),
        }
    }
}

/// A mock broker that records placed orders and returns configurable responses.
pub struct MockBroker {
    fill_mode: FillMode,
    accounts: Vec<String>,
    positions: Vec<Position>,
    quotes: Vec<Quote>,
    account_value: Price,
    cash: Price,
    verifier: String,
    phase: HandshakePhase,
    account: Option<AccountHandle>,
    next_preview_id: u64,
    orders: OrderLog,
}

impl MockBroker {
    pub const KIND: &'static str = "mock";

    pub fn builder() -> MockBrokerBuilder {
        MockBrokerBuilder {
            fill_mode: FillMode::Accept,
            accounts: Vec::new(),
            positions: Vec::new(),
            quotes: Vec::new(),
            account_value: Price(1_000_000_00),
            cash: Price(1_000_000_00),
            verifier: DEFAULT_VERIFIER.to_string(),
        }
    }

    /// Handle to the placed-order log.
    pub fn order_log(&self) -> OrderLog {
        Arc::clone(&self.orders)
    }

    /// Orders placed so far (for assertion in tests).
    pub fn placed_orders(&self) -> Vec<RecordedOrder> {
        self.orders.lock().clone()
    }

    fn result_for(order: &RecordedOrder) -> OrderResult {
        OrderResult {
            client_order_id: order.client_order_id.clone(),
            preview_id: order.preview_id,
            confirmation: json!({
                "clientOrderId": order.client_order_id.as_str(),
                "previewId": order.preview_id,
                "status": "OPEN",
            }),
        }
    }
}

impl Broker for MockBroker {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn handshake_phase(&self) -> HandshakePhase {
        self.phase
    }

    fn begin_handshake(&mut self, consumer: ConsumerCredentials) -> Result<String, BrokerError> {
        match self.phase {
            HandshakePhase::Unauthenticated => {}
            HandshakePhase::RequestTokenObtained => {
                return Err(Precondition::HandshakeInProgress.into());
            }
            HandshakePhase::Authorized => return Err(Precondition::AlreadyAuthorized.into()),
        }
        self.phase = HandshakePhase::RequestTokenObtained;
        Ok(format!(
            "https://mock.invalid/authorize?key={}&token=mock-request-token",
            consumer.key
        ))
    }

    fn complete_handshake(&mut self, verifier: &str) -> Result<(), BrokerError> {
        match self.phase {
            HandshakePhase::RequestTokenObtained => {}
            HandshakePhase::Unauthenticated => {
                return Err(Precondition::HandshakeNotStarted.into());
            }
            HandshakePhase::Authorized => return Err(Precondition::AlreadyAuthorized.into()),
        }
        if verifier.trim() != self.verifier {
            return Err(BrokerError::HandshakeTransport(
                "mock: verifier rejected".into(),
            ));
        }
        self.phase = HandshakePhase::Authorized;
        Ok(())
    }

    fn select_account(&mut self, account_id: &str) -> Result<AccountHandle, BrokerError> {
        if self.phase != HandshakePhase::Authorized {
            return Err(Precondition::NotAuthorized.into());
        }
        let wanted = normalize_account_id(account_id);
        if !self.accounts.contains(&wanted) {
            return Err(BrokerError::InvalidAccount(account_id.to_string()));
        }
        let handle = AccountHandle {
            account_key: format!("key-{wanted}"),
            account_id: wanted,
        };
        self.account = Some(handle.clone());
        Ok(handle)
    }

    fn selected_account(&self) -> Option<&AccountHandle> {
        self.account.as_ref()
    }

    fn account_value(&self) -> Result<Price, BrokerError> {
        require_ready(self.phase, self.account.as_ref())?;
        Ok(self.account_value)
    }

    fn cash_available(&self) -> Result<Price, BrokerError> {
        require_ready(self.phase, self.account.as_ref())?;
        Ok(self.cash)
    }

    fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        require_ready(self.phase, self.account.as_ref())?;
        Ok(self.positions.clone())
    }

    fn quote(&self, symbol: Symbol) -> Result<Quote, BrokerError> {
        if self.phase != HandshakePhase::Authorized {
            return Err(Precondition::NotAuthorized.into());
        }
        self.quotes
            .iter()
            .find(|q| q.symbol == symbol)
            .copied()
            .ok_or_else(|| BrokerError::BackendQuery(format!("mock: no quote for {symbol}")))
    }

    fn place_order(
        &mut self,
        intent: &OrderIntent,
        client_order_id: Option<ClientOrderId>,
    ) -> Result<OrderResult, BrokerError> {
        require_ready(self.phase, self.account.as_ref())?;
        intent.validate()?;
        let client_order_id = client_order_id.unwrap_or_else(ClientOrderId::generate);

        // A client order id the backend has already accepted is not placed twice
        if let Some(existing) = self
            .orders
            .lock()
            .iter()
            .find(|o| o.client_order_id == client_order_id)
        {
            return Ok(Self::result_for(existing));
        }

        if self.fill_mode == FillMode::RejectPreview {
            return Err(BrokerError::OrderPreviewFailed {
                client_order_id,
                reason: "mock: preview rejected".into(),
            });
        }
        let preview_id = self.next_preview_id;
        self.next_preview_id += 1;

        let placed = self.orders.lock().len();
        let reject = match self.fill_mode {
            FillMode::RejectPlacement => true,
            FillMode::RejectAfter(n) => placed >= n,
            FillMode::Accept | FillMode::RejectPreview => false,
        };
        if reject {
            return Err(BrokerError::OrderPlacementFailed {
                client_order_id,
                preview_id: Some(preview_id),
                reason: "mock: placement rejected".into(),
            });
        }

        let order = RecordedOrder {
            client_order_id,
            preview_id,
            intent: intent.clone(),
        };
        let result = Self::result_for(&order);
        self.orders.lock().push(order);
        Ok(result)
    }
}
