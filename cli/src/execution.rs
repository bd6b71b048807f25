//! Command workflows: open a session, query the account, place one order,
//! or plan → confirm → place a target.

use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use rustc_hash::FxHashMap;
use tradegate::{
    ClientOrderId, MarketSession, OrderIntent, OrderTerm, Price, PriceType, Symbol, Target,
    TargetPortfolio,
};
use tradegate_broker::etrade::ETradeBroker;
use tradegate_broker::{
    AccountHandle, BackendRegistry, Broker, BrokerError, OrderResult, Precondition, SessionId,
    SessionRegistry, SharedBroker,
};

use crate::audit::{self, AuditLog};
use crate::config::Config;
use crate::error::{Error, Result};

/// Backends the binary can create sessions for.
pub fn backends(config: &Config) -> BackendRegistry {
    let etrade = config.etrade();
    BackendRegistry::new().with(ETradeBroker::KIND, move || {
        Ok(Box::new(ETradeBroker::connect(&etrade)?) as Box<dyn Broker>)
    })
}

/// Session registry with the configured idle TTL.
pub fn session_registry(config: &Config, backends: BackendRegistry) -> SessionRegistry {
    SessionRegistry::new(backends).with_idle_ttl(config.idle_ttl())
}

/// An authorized session with the configured account selected.
pub struct Session {
    pub id: SessionId,
    pub broker: SharedBroker,
    pub account: AccountHandle,
}

/// Create a session, run the OAuth handshake and select the configured
/// account. `verifier` is shown the authorize URL and returns the code the
/// user got there.
pub fn open_session(
    config: &Config,
    registry: &SessionRegistry,
    audit: &mut AuditLog,
    verifier: &mut dyn FnMut(&str) -> Result<String>,
) -> Result<Session> {
    let id = registry.create(&config.broker.backend)?;
    audit::log_session_created(audit, id, &config.broker.backend)?;

    let broker = registry.get(&id)?;
    let account = {
        let mut b = broker.lock();
        let url = b.begin_handshake(config.consumer())?;
        let code = verifier(&url)?;
        b.complete_handshake(&code)?;
        audit::log_handshake_completed(audit, id)?;

        let account = b.select_account(&config.account.id)?;
        audit::log_account_selected(audit, &account)?;
        account
    };
    info!("session {id} ready on account {}", account.account_id);

    Ok(Session {
        id,
        broker,
        account,
    })
}

/// Interactive verifier prompt.
pub fn prompt_verifier(authorize_url: &str) -> Result<String> {
    println!("Authorize this application at:\n\n  {authorize_url}\n");
    dialoguer::Input::<String>::new()
        .with_prompt("Verifier code")
        .interact_text()
        .map_err(|e| Error::Prompt(e.to_string()))
}

/// Interactive yes/no prompt, defaulting to no.
pub fn prompt_confirm(question: &str) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(question)
        .default(false)
        .interact()
        .map_err(|e| Error::Prompt(e.to_string()))
}

// ============================================================================
// Queries
// ============================================================================

pub fn show_status(broker: &dyn Broker) -> Result<()> {
    let account = broker
        .selected_account()
        .ok_or(BrokerError::Precondition(Precondition::NoAccountSelected))?;
    let value = broker.account_value()?;
    let cash = broker.cash_available()?;
    println!("Backend:       {}", broker.kind());
    println!("Account:       {}", account.account_id);
    println!("Account value: {value}");
    println!("Cash:          {cash}");
    Ok(())
}

pub fn show_positions(broker: &dyn Broker) -> Result<()> {
    let positions = broker.positions()?;
    if positions.is_empty() {
        println!("No positions.");
        return Ok(());
    }
    println!("{:<8} {:>10} {:>14} {:>12}", "Symbol", "Qty", "Value", "Last");
    let mut total = Price::ZERO;
    for p in &positions {
        total = Price(total.0 + p.market_value.0);
        println!(
            "{:<8} {:>10} {:>14} {:>12}",
            p.symbol, p.quantity, p.market_value, p.last_price
        );
    }
    println!("{:<8} {:>10} {:>14}", "Total", "", total);
    Ok(())
}

pub fn show_quote(broker: &dyn Broker, symbol: Symbol) -> Result<()> {
    let q = broker.quote(symbol)?;
    println!("{}: bid {} / ask {} / last {}", q.symbol, q.bid, q.ask, q.last);
    Ok(())
}

// ============================================================================
// Single order
// ============================================================================

/// Order parameters as given on the command line.
#[derive(Debug, Clone)]
pub struct OrderArgs {
    pub symbol: String,
    pub quantity: i64,
    pub price_type: PriceType,
    pub limit: Option<f64>,
    pub stop: Option<f64>,
    pub term: OrderTerm,
    pub session: MarketSession,
}

impl OrderArgs {
    /// Build and validate the intent.
    pub fn to_intent(&self) -> Result<OrderIntent> {
        let symbol = Symbol::try_new(&self.symbol)
            .ok_or_else(|| Error::Order(format!("invalid symbol '{}'", self.symbol)))?;
        let intent = OrderIntent {
            symbol,
            quantity: self.quantity,
            price_type: self.price_type,
            term: self.term,
            market_session: self.session,
            limit_price: self.limit.map(Price::from_dollars),
            stop_price: self.stop.map(Price::from_dollars),
        };
        intent.validate().map_err(|e| Error::Order(e.to_string()))?;
        Ok(intent)
    }
}

/// Place one order through the preview/place protocol.
pub fn place_single(
    broker: &mut dyn Broker,
    intent: &OrderIntent,
    client_order_id: Option<ClientOrderId>,
    audit: &mut AuditLog,
) -> Result<OrderResult> {
    audit::log_plan(audit, "order", "command line", std::slice::from_ref(intent))?;
    match broker.place_order(intent, client_order_id) {
        Ok(result) => {
            audit::log_order_placed(audit, intent, &result)?;
            println!(
                "Placed {intent} (client order id {}, preview {})",
                result.client_order_id, result.preview_id
            );
            Ok(result)
        }
        Err(e) => {
            audit::log_order_failed(audit, intent, &e)?;
            if let BrokerError::OrderPlacementFailed {
                client_order_id, ..
            } = &e
            {
                eprintln!(
                    "Placement outcome unknown. Retry only with --client-order-id {client_order_id}"
                );
            }
            Err(e.into())
        }
    }
}

// ============================================================================
// Targets
// ============================================================================

/// What a target run rebalances.
#[derive(Debug, Clone)]
pub enum TargetMode {
    /// Only the listed symbols.
    Target(Target),
    /// The whole portfolio; unlisted holdings are sold.
    Portfolio(TargetPortfolio),
}

impl TargetMode {
    fn name(&self) -> &'static str {
        match self {
            TargetMode::Target(_) => "target",
            TargetMode::Portfolio(_) => "portfolio",
        }
    }
}

/// Options for a target run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
    /// Where the target came from (file path), for the audit trail.
    pub source: String,
    pub order_interval: Duration,
    pub max_orders: usize,
    pub term: OrderTerm,
    pub session: MarketSession,
}

impl RunOptions {
    pub fn from_config(config: &Config, source: &str, dry_run: bool, force: bool) -> Self {
        Self {
            dry_run,
            force,
            source: source.to_string(),
            order_interval: config.order_interval(),
            max_orders: config.orders.max_orders_per_run,
            term: config.orders.order_term,
            session: config.orders.market_session,
        }
    }
}

/// What a target run planned and placed.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub planned: Vec<OrderIntent>,
    pub placed: Vec<OrderResult>,
}

/// Plan a target, show the plan, confirm, then place it order by order.
///
/// The batch stops at the first failed order; orders placed before it stay
/// placed and are in the audit trail.
pub fn run_target(
    broker: &mut dyn Broker,
    mode: &TargetMode,
    opts: &RunOptions,
    audit: &mut AuditLog,
    confirm: &mut dyn FnMut(&str) -> Result<bool>,
) -> Result<RunSummary> {
    let held: FxHashMap<Symbol, i64> = broker
        .positions()?
        .iter()
        .filter_map(|p| p.holding())
        .map(|h| (h.symbol, h.quantity))
        .collect();

    let planned: Vec<OrderIntent> = match mode {
        TargetMode::Target(t) => broker.plan_target(t)?,
        TargetMode::Portfolio(p) => broker.plan_target_portfolio(p)?,
    }
    .into_iter()
    .map(|i| i.with_term(opts.term).with_market_session(opts.session))
    .collect();
    audit::log_plan(audit, mode.name(), &opts.source, &planned)?;

    let mut summary = RunSummary {
        planned,
        placed: Vec::new(),
    };

    if summary.planned.is_empty() {
        println!("No orders needed: holdings already match the target.");
        audit::log_run_completed(audit, 0, 0, 0)?;
        return Ok(summary);
    }

    display_plan(&summary.planned, &held);

    if summary.planned.len() > opts.max_orders {
        return Err(Error::TooManyOrders {
            count: summary.planned.len(),
            max: opts.max_orders,
        });
    }

    if opts.dry_run {
        println!("\n[DRY RUN] No orders placed.");
        return Ok(summary);
    }

    if !opts.force {
        let question = format!("Place {} orders?", summary.planned.len());
        if !confirm(&question)? {
            audit.log("user_confirmed", serde_json::json!({ "approved": false }))?;
            return Err(Error::Aborted("declined at confirmation".into()));
        }
        audit.log("user_confirmed", serde_json::json!({ "approved": true }))?;
    }

    let total = summary.planned.len();
    for (i, intent) in summary.planned.iter().enumerate() {
        if i > 0 && !opts.order_interval.is_zero() {
            thread::sleep(opts.order_interval);
        }
        print!("[{}/{total}] {intent} ... ", i + 1);
        match broker.place_order(intent, None) {
            Ok(result) => {
                println!("placed ({})", result.client_order_id);
                audit::log_order_placed(audit, intent, &result)?;
                summary.placed.push(result);
            }
            Err(e) => {
                println!("FAILED");
                error!("order {intent} failed: {e}");
                audit::log_order_failed(audit, intent, &e)?;
                if i + 1 < total {
                    warn!("stopping batch: {} of {total} orders not attempted", total - i - 1);
                }
                audit::log_run_completed(audit, total, summary.placed.len(), 1)?;
                return Err(e.into());
            }
        }
    }

    audit::log_run_completed(audit, total, summary.placed.len(), 0)?;
    println!("\nPlaced {} orders.", summary.placed.len());
    Ok(summary)
}

fn display_plan(intents: &[OrderIntent], held: &FxHashMap<Symbol, i64>) {
    println!(
        "{:<8} {:<5} {:>8} {:>10} {:>10}  Type",
        "Symbol", "Side", "Shares", "Held", "After"
    );
    for intent in intents {
        let current = held.get(&intent.symbol).copied().unwrap_or(0);
        println!(
            "{:<8} {:<5} {:>8} {:>10} {:>10}  {}",
            intent.symbol,
            intent.action(),
            intent.shares(),
            current,
            current + intent.quantity,
            intent.price_type,
        );
    }
}
