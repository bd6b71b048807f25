//! CLI entry point for tradegate.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use log::info;

use tradegate::{ClientOrderId, MarketSession, OrderIntent, OrderTerm, PriceType, Symbol};
use tradegate_broker::Broker;
use tradegate_cli::audit::AuditLog;
use tradegate_cli::config::Config;
use tradegate_cli::error::{Error, Result};
use tradegate_cli::execution::{self, OrderArgs, RunOptions, TargetMode};
use tradegate_cli::target::TargetFile;

#[derive(Parser)]
#[command(name = "tradegate")]
#[command(about = "Place orders and target allocations through a brokerage API")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show account value and available cash
    Status,

    /// Show current positions
    Positions,

    /// Show the latest quote for a symbol
    Quote { symbol: String },

    /// Preview and place a single order
    Order {
        symbol: String,

        /// Signed share delta: positive buys, negative sells
        #[arg(allow_negative_numbers = true)]
        quantity: i64,

        #[arg(long, default_value = "MARKET")]
        price_type: PriceType,

        /// Limit price in dollars
        #[arg(long)]
        limit: Option<f64>,

        /// Stop price in dollars
        #[arg(long)]
        stop: Option<f64>,

        /// Time-in-force (default from config)
        #[arg(long)]
        term: Option<OrderTerm>,

        /// Market session (default from config)
        #[arg(long)]
        session: Option<MarketSession>,

        /// Reuse the id of an earlier attempt to retry it safely
        #[arg(long)]
        client_order_id: Option<String>,
    },

    /// Move the listed symbols to their target allocations
    Target {
        /// Path to target.json
        file: PathBuf,

        /// Show plan without placing orders
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Turn the whole portfolio into the target, selling unlisted holdings
    Portfolio {
        /// Path to target.json
        file: PathBuf,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        force: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        let code = e.exit_code();
        match &e {
            Error::Aborted(msg) => eprintln!("Aborted: {msg}"),
            _ => eprintln!("Error: {e}"),
        }
        process::exit(code);
    }
}

/// A command with its inputs parsed and validated.
enum Action {
    Status,
    Positions,
    Quote(Symbol),
    Order(OrderIntent, Option<ClientOrderId>),
    Run(TargetMode, RunOptions),
}

/// Validate everything the command was given before any network traffic.
fn prepare(command: Command, config: &Config) -> Result<Action> {
    let action = match command {
        Command::Status => Action::Status,
        Command::Positions => Action::Positions,
        Command::Quote { symbol } => Action::Quote(
            Symbol::try_new(&symbol)
                .ok_or_else(|| Error::Order(format!("invalid symbol '{symbol}'")))?,
        ),
        Command::Order {
            symbol,
            quantity,
            price_type,
            limit,
            stop,
            term,
            session,
            client_order_id,
        } => {
            let args = OrderArgs {
                symbol,
                quantity,
                price_type,
                limit,
                stop,
                term: term.unwrap_or(config.orders.order_term),
                session: session.unwrap_or(config.orders.market_session),
            };
            let id = client_order_id
                .map(ClientOrderId::new)
                .transpose()
                .map_err(|e| Error::Order(e.to_string()))?;
            Action::Order(args.to_intent()?, id)
        }
        Command::Target {
            file,
            dry_run,
            force,
        } => {
            let target = TargetFile::load(&file)?;
            let opts = RunOptions::from_config(config, &file.display().to_string(), dry_run, force);
            Action::Run(TargetMode::Target(target.to_target()), opts)
        }
        Command::Portfolio {
            file,
            dry_run,
            force,
        } => {
            let target = TargetFile::load(&file)?;
            let opts = RunOptions::from_config(config, &file.display().to_string(), dry_run, force);
            Action::Run(TargetMode::Portfolio(target.to_portfolio()), opts)
        }
    };
    Ok(action)
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    let action = prepare(cli.command, &config)?;

    let mut audit = AuditLog::open(&config.audit_path())?;
    let registry = execution::session_registry(&config, execution::backends(&config));
    let session = execution::open_session(
        &config,
        &registry,
        &mut audit,
        &mut execution::prompt_verifier,
    )?;

    let mut guard = session.broker.lock();
    let broker: &mut dyn Broker = &mut **guard;

    match action {
        Action::Status => execution::show_status(broker),
        Action::Positions => execution::show_positions(broker),
        Action::Quote(symbol) => execution::show_quote(broker, symbol),
        Action::Order(intent, id) => {
            execution::place_single(broker, &intent, id, &mut audit)?;
            Ok(())
        }
        Action::Run(mode, opts) => {
            let summary = execution::run_target(
                broker,
                &mode,
                &opts,
                &mut audit,
                &mut execution::prompt_confirm,
            )?;
            info!(
                "{} planned, {} placed",
                summary.planned.len(),
                summary.placed.len()
            );
            Ok(())
        }
    }
}
