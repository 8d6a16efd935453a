//! Simulated Broker Session
//!
//! In-process stand-in for the broker connection. It implements both ports
//! against a small instrument table: streams are tasks emitting synthetic
//! updates on the event channel, orders live in memory and market orders
//! fill immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::instruments::{self, INSTRUMENTS, Instrument};
use super::market::{self, TickerWalk};
use crate::application::ports::{
    BrokerError, BrokerEvent, BrokerPort, ConnectionInfo, RequestId, StreamingPort, UpstreamHandle,
};
use crate::domain::account::{AccountValue, PortfolioItem, Position, SUMMARY_TAGS};
use crate::domain::contract::{Contract, SecType};
use crate::domain::market_data::{
    Bar, DepthBook, HistoricalBarsQuery, RealtimeBar, Tick, TickType, WhatToShow,
};
use crate::domain::order::{Fill, Order, OrderAction, OrderId, OrderStatus, OrderType, Trade};
use crate::domain::scanner::{ContractDetails, ScanResult, ScannerRequest};
use crate::domain::streaming::{PnlUpdate, StreamMessage, TickerUpdate};
use crate::domain::subscription::ResourceKey;
use crate::infrastructure::config::{BrokerSettings, SimulatorSettings};

/// Starting cash per simulated account.
const STARTING_CASH: f64 = 1_000_000.0;

/// Commission per share.
const COMMISSION_PER_SHARE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

/// Broker code for an unknown account.
const UNKNOWN_ACCOUNT: i32 = 321;

/// Broker code for cancelling an order that is no longer open.
const NOT_CANCELLABLE: i32 = 161;

const SCANNER_PARAMETERS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ScanParameterResponse>
  <InstrumentList><Instrument><type>STK</type><name>US Stocks</name></Instrument></InstrumentList>
  <LocationTree><Location><locationCode>STK.US.MAJOR</locationCode><displayName>US Major</displayName></Location></LocationTree>
  <ScanTypeList>
    <ScanType><scanCode>TOP_PERC_GAIN</scanCode><displayName>Top % Gainers</displayName></ScanType>
    <ScanType><scanCode>TOP_PERC_LOSE</scanCode><displayName>Top % Losers</displayName></ScanType>
    <ScanType><scanCode>MOST_ACTIVE</scanCode><displayName>Most Active</displayName></ScanType>
    <ScanType><scanCode>HOT_BY_PRICE</scanCode><displayName>Hot by Price</displayName></ScanType>
  </ScanTypeList>
</ScanParameterResponse>"#;

#[derive(Default)]
struct OrderBook {
    trades: Vec<Trade>,
    fills: Vec<Fill>,
}

/// In-process Broker Session.
pub struct SimulatedBroker {
    settings: BrokerSettings,
    sim: SimulatorSettings,
    events: mpsc::Sender<BrokerEvent>,
    connected: AtomicBool,
    next_request_id: AtomicI64,
    next_order_id: AtomicI64,
    streams: parking_lot::Mutex<HashMap<RequestId, CancellationToken>>,
    last_prices: Arc<parking_lot::RwLock<HashMap<String, f64>>>,
    book: parking_lot::Mutex<OrderBook>,
    shutdown: CancellationToken,
}

impl SimulatedBroker {
    /// Create a disconnected session that emits events on `events`.
    #[must_use]
    pub fn new(
        settings: BrokerSettings,
        sim: SimulatorSettings,
        events: mpsc::Sender<BrokerEvent>,
    ) -> Self {
        Self {
            settings,
            sim,
            events,
            connected: AtomicBool::new(false),
            next_request_id: AtomicI64::new(1),
            next_order_id: AtomicI64::new(1),
            streams: parking_lot::Mutex::new(HashMap::new()),
            last_prices: Arc::new(parking_lot::RwLock::new(HashMap::new())),
            book: parking_lot::Mutex::new(OrderBook::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Connect the session and announce it on the event channel.
    pub async fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(
            host = %self.settings.host,
            port = self.settings.port,
            client_id = self.settings.client_id,
            readonly = self.settings.readonly,
            "Simulated broker session connected"
        );
        if self.events.send(BrokerEvent::Connected).await.is_err() {
            tracing::warn!("Broker event channel closed before connect");
        }
    }

    /// Disconnect the session and stop every stream.
    pub async fn disconnect(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        self.stop_streams();
        let event = BrokerEvent::Disconnected {
            reason: reason.to_string(),
        };
        if self.events.send(event).await.is_err() {
            tracing::debug!("Broker event channel closed before disconnect");
        }
    }

    /// Stop every stream task without emitting events.
    pub fn shutdown(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.stop_streams();
        self.shutdown.cancel();
    }

    /// Number of live upstream streams.
    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.streams.lock().len()
    }

    fn stop_streams(&self) {
        for (_, token) in self.streams.lock().drain() {
            token.cancel();
        }
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    fn default_account(&self) -> &str {
        self.sim.accounts.first().map_or("", String::as_str)
    }

    fn ensure_account(&self, account: &str) -> Result<(), BrokerError> {
        if self.sim.accounts.iter().any(|a| a == account) {
            Ok(())
        } else {
            Err(BrokerError::Rejected {
                code: UNKNOWN_ACCOUNT,
                message: format!("Error validating request: unknown account {account}"),
            })
        }
    }

    fn resolve(&self, contract: &Contract) -> Result<(&'static Instrument, Contract), BrokerError> {
        self.ensure_connected()?;
        instruments::qualify(contract)
            .ok_or_else(|| BrokerError::no_security_definition(&contract.stream_symbol()))
    }

    fn price_of(&self, instrument: &Instrument) -> f64 {
        self.last_prices
            .read()
            .get(&instrument.stream_symbol())
            .copied()
            .unwrap_or(instrument.base_price)
    }

    fn spawn_stream<F>(&self, request_id: RequestId, key: ResourceKey, mut next: F)
    where
        F: FnMut() -> StreamMessage + Send + 'static,
    {
        let token = self.shutdown.child_token();
        self.streams.lock().insert(request_id, token.clone());

        let events = self.events.clone();
        let interval = self.sim.tick_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let event = BrokerEvent::Update {
                            key: key.clone(),
                            request_id,
                            message: next(),
                        };
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(request_id = %request_id, "Simulated stream stopped");
        });
    }

    fn ticker_stream(&self, request_id: RequestId, key: &ResourceKey, instrument: &'static Instrument) {
        let symbol = instrument.stream_symbol();
        let start = self.price_of(instrument);
        let prices = Arc::clone(&self.last_prices);
        let mut walk = TickerWalk::new(
            symbol.clone(),
            start,
            instrument.min_tick,
            market::seed_for(&(symbol.as_str(), request_id.0)),
        );
        self.spawn_stream(request_id, key.clone(), move || {
            let update = walk.next(Utc::now());
            if let Some(last) = update.last {
                prices.write().insert(symbol.clone(), last);
            }
            StreamMessage::Ticker(update)
        });
    }

    fn pnl_stream(&self, request_id: RequestId, key: &ResourceKey, account: String) {
        let mut rng = StdRng::seed_from_u64(market::seed_for(&(account.as_str(), request_id.0)));
        let realized = self.realized_pnl(&account);
        let mut unrealized = self.unrealized_pnl(&account);
        self.spawn_stream(request_id, key.clone(), move || {
            unrealized += rng.random_range(-50.0..50.0);
            StreamMessage::Pnl(PnlUpdate {
                account: account.clone(),
                daily_pnl: realized + unrealized,
                unrealized_pnl: unrealized,
                realized_pnl: realized,
                time: Utc::now(),
            })
        });
    }

    // ---- portfolio accounting ----

    fn holdings(&self, account: &str) -> Vec<(Contract, f64, f64)> {
        let book = self.book.lock();
        let mut by_con_id: HashMap<i64, (Contract, f64, f64)> = HashMap::new();
        for trade in &book.trades {
            if trade.order.account.as_deref().unwrap_or_else(|| self.default_account()) != account {
                continue;
            }
            let filled = trade.filled.to_f64().unwrap_or_default();
            if filled == 0.0 {
                continue;
            }
            let price = trade.avg_fill_price.to_f64().unwrap_or_default();
            let signed = filled * sign(trade.order.action);
            let entry = by_con_id
                .entry(trade.contract.con_id)
                .or_insert_with(|| (trade.contract.clone(), 0.0, 0.0));
            let (_, qty, cost) = entry;
            if *qty == 0.0 || qty.signum() == signed.signum() {
                *cost = (*cost * *qty + price * signed) / (*qty + signed);
            }
            *qty += signed;
        }
        by_con_id
            .into_values()
            .filter(|(_, qty, _)| *qty != 0.0)
            .collect()
    }

    fn market_price(&self, contract: &Contract) -> f64 {
        instruments::qualify(contract).map_or(0.0, |(instrument, _)| self.price_of(instrument))
    }

    fn unrealized_pnl(&self, account: &str) -> f64 {
        self.holdings(account)
            .iter()
            .map(|(contract, qty, cost)| (self.market_price(contract) - cost) * qty)
            .sum()
    }

    fn realized_pnl(&self, account: &str) -> f64 {
        let book = self.book.lock();
        let commissions: f64 = book
            .fills
            .iter()
            .filter(|f| f.account == account)
            .map(|f| f.commission.to_f64().unwrap_or_default())
            .sum();
        -commissions
    }

    fn cash(&self, account: &str) -> f64 {
        let book = self.book.lock();
        STARTING_CASH
            - book
                .fills
                .iter()
                .filter(|f| f.account == account)
                .map(|f| {
                    let notional = (f.shares * f.price).to_f64().unwrap_or_default();
                    let commission = f.commission.to_f64().unwrap_or_default();
                    let sign = if f.side == "BOT" { 1.0 } else { -1.0 };
                    notional.mul_add(sign, commission)
                })
                .sum::<f64>()
    }

    fn fill(&self, book: &mut OrderBook, trade: &mut Trade, price: Decimal) {
        let account = trade
            .order
            .account
            .clone()
            .unwrap_or_else(|| self.default_account().to_string());
        let quantity = trade.remaining;
        trade.filled += quantity;
        trade.remaining = Decimal::ZERO;
        trade.avg_fill_price = price;
        trade.last_fill_price = price;
        trade.status = OrderStatus::Filled;

        book.fills.push(Fill {
            exec_id: format!("0000e0d5.{:08x}.01.01", trade.perm_id),
            time: Utc::now(),
            account,
            symbol: trade.contract.symbol.clone(),
            sec_type: trade.contract.sec_type.as_str().to_string(),
            side: match trade.order.action {
                OrderAction::Buy => "BOT",
                OrderAction::Sell => "SLD",
            }
            .to_string(),
            shares: quantity,
            price,
            perm_id: trade.perm_id,
            client_id: trade.client_id,
            order_id: trade.order_id,
            cum_qty: trade.filled,
            avg_price: price,
            commission: (quantity * COMMISSION_PER_SHARE).max(Decimal::ONE),
        });
        tracing::info!(
            order_id = trade.order_id,
            symbol = %trade.contract.symbol,
            %quantity,
            %price,
            "Simulated fill"
        );
    }
}

const fn sign(action: OrderAction) -> f64 {
    match action {
        OrderAction::Buy => 1.0,
        OrderAction::Sell => -1.0,
    }
}

/// Whether a limit order is marketable at `price`.
fn marketable(order: &Order, price: Decimal) -> bool {
    match (order.order_type, order.limit_price) {
        (OrderType::Market, _) => true,
        (OrderType::Limit, Some(limit)) => match order.action {
            OrderAction::Buy => limit >= price,
            OrderAction::Sell => limit <= price,
        },
        _ => false,
    }
}

// =============================================================================
// StreamingPort
// =============================================================================

#[async_trait]
impl StreamingPort for SimulatedBroker {
    async fn subscribe_stream(&self, key: &ResourceKey) -> Result<UpstreamHandle, BrokerError> {
        self.ensure_connected()?;
        let request_id = RequestId(self.next_request_id.fetch_add(1, Ordering::SeqCst));

        match key {
            ResourceKey::Ticker(symbol) => {
                let instrument = instruments::by_stream_symbol(symbol)
                    .ok_or_else(|| BrokerError::no_security_definition(symbol))?;
                self.ticker_stream(request_id, key, instrument);
            }
            ResourceKey::Pnl(account) => {
                self.ensure_account(account)?;
                self.pnl_stream(request_id, key, account.clone());
            }
        }

        tracing::debug!(key = %key, request_id = %request_id, "Simulated stream opened");
        Ok(UpstreamHandle {
            request_id,
            key: key.clone(),
            opened_at: Utc::now(),
        })
    }

    async fn cancel_stream(&self, handle: &UpstreamHandle) -> Result<(), BrokerError> {
        let token = self.streams.lock().remove(&handle.request_id);
        match token {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(BrokerError::NotFound {
                what: format!("stream request {}", handle.request_id),
            }),
        }
    }
}

// =============================================================================
// BrokerPort
// =============================================================================

#[async_trait]
impl BrokerPort for SimulatedBroker {
    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            connected: self.connected.load(Ordering::SeqCst),
            client_id: self.settings.client_id,
            host: self.settings.host.clone(),
            port: self.settings.port,
        }
    }

    async fn managed_accounts(&self) -> Result<Vec<String>, BrokerError> {
        self.ensure_connected()?;
        Ok(self.sim.accounts.clone())
    }

    async fn account_values(&self, account: &str) -> Result<Vec<AccountValue>, BrokerError> {
        self.ensure_connected()?;
        self.ensure_account(account)?;

        let cash = self.cash(account);
        let gross: f64 = self
            .holdings(account)
            .iter()
            .map(|(contract, qty, _)| (self.market_price(contract) * qty).abs())
            .sum();
        let net_liq = cash + gross;
        let init_margin = gross * 0.25;
        let available = net_liq - init_margin;

        let numeric = |tag: &str| -> Option<f64> {
            Some(match tag {
                "NetLiquidation" | "EquityWithLoanValue" | "PreviousDayEquityWithLoanValue"
                | "RegTEquity" => net_liq,
                "TotalCashValue" | "SettledCash" => cash,
                "AccruedCash" => 0.0,
                "BuyingPower" => available * 4.0,
                "GrossPositionValue" => gross,
                "RegTMargin" | "InitMarginReq" | "FullInitMarginReq" => init_margin,
                "MaintMarginReq" | "FullMaintMarginReq" => init_margin * 0.8,
                "SMA" | "AvailableFunds" | "ExcessLiquidity" | "FullAvailableFunds"
                | "FullExcessLiquidity" => available,
                "Cushion" => {
                    if net_liq > 0.0 {
                        available / net_liq
                    } else {
                        0.0
                    }
                }
                _ => return None,
            })
        };

        let value = |tag: &str, value: String, currency: &str| AccountValue {
            account: account.to_string(),
            tag: tag.to_string(),
            value,
            currency: currency.to_string(),
        };

        let mut values = vec![value("AccountType", "INDIVIDUAL".to_string(), "")];
        for &tag in SUMMARY_TAGS {
            let entry = match (tag, numeric(tag)) {
                ("Cushion", Some(v)) => value(tag, format!("{v:.4}"), ""),
                (_, Some(v)) => value(tag, format!("{v:.2}"), "USD"),
                ("LookAheadNextChange", None) => value(tag, "0".to_string(), ""),
                ("DayTradesRemaining", None) => value(tag, "-1".to_string(), ""),
                (_, None) => continue,
            };
            values.push(entry);
        }
        values.push(value("CashBalance", format!("{cash:.2}"), "USD"));
        values.push(value("CashBalance", format!("{cash:.2}"), "BASE"));
        Ok(values)
    }

    async fn positions(&self, account: Option<&str>) -> Result<Vec<Position>, BrokerError> {
        self.ensure_connected()?;
        let accounts = account.map_or_else(|| self.sim.accounts.clone(), |a| vec![a.to_string()]);
        Ok(accounts
            .iter()
            .flat_map(|acct| {
                self.holdings(acct)
                    .into_iter()
                    .map(|(contract, position, avg_cost)| Position {
                        account: acct.clone(),
                        contract,
                        position,
                        avg_cost,
                    })
            })
            .collect())
    }

    async fn portfolio(&self, account: Option<&str>) -> Result<Vec<PortfolioItem>, BrokerError> {
        let positions = self.positions(account).await?;
        Ok(positions
            .into_iter()
            .map(|p| {
                let market_price = self.market_price(&p.contract);
                PortfolioItem {
                    market_value: market_price * p.position,
                    unrealized_pnl: (market_price - p.avg_cost) * p.position,
                    realized_pnl: 0.0,
                    account: p.account,
                    contract: p.contract,
                    position: p.position,
                    market_price,
                    average_cost: p.avg_cost,
                }
            })
            .collect())
    }

    async fn qualify_contract(&self, contract: &Contract) -> Result<Vec<Contract>, BrokerError> {
        self.ensure_connected()?;
        Ok(instruments::qualify(contract)
            .map(|(_, qualified)| qualified)
            .into_iter()
            .collect())
    }

    async fn place_order(&self, contract: &Contract, order: &Order) -> Result<Trade, BrokerError> {
        self.ensure_connected()?;
        if self.settings.readonly {
            return Err(BrokerError::ReadOnly);
        }
        if let Some(account) = &order.account {
            self.ensure_account(account)?;
        }
        let (instrument, qualified) = self.resolve(contract)?;

        let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        let mut trade = Trade {
            order_id,
            perm_id: 1_000_000_000 + order_id,
            client_id: self.settings.client_id,
            contract: qualified,
            order: order.clone(),
            status: if order.transmit {
                OrderStatus::Submitted
            } else {
                OrderStatus::PendingSubmit
            },
            filled: Decimal::ZERO,
            remaining: order.total_quantity,
            avg_fill_price: Decimal::ZERO,
            last_fill_price: Decimal::ZERO,
            why_held: String::new(),
        };
        if matches!(order.order_type, OrderType::Stop | OrderType::StopLimit) && order.transmit {
            trade.status = OrderStatus::PreSubmitted;
            trade.why_held = "trigger".to_string();
        }

        let price = Decimal::from_f64(self.price_of(instrument))
            .unwrap_or_default()
            .round_dp(4);
        let mut book = self.book.lock();
        if order.transmit && marketable(order, price) {
            self.fill(&mut book, &mut trade, price);
        }
        book.trades.push(trade.clone());
        drop(book);

        tracing::info!(
            order_id,
            symbol = %trade.contract.symbol,
            action = ?order.action,
            order_type = order.order_type.as_str(),
            status = ?trade.status,
            "Order placed"
        );
        Ok(trade)
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<Trade, BrokerError> {
        self.ensure_connected()?;
        let mut book = self.book.lock();
        let trade = book
            .trades
            .iter_mut()
            .find(|t| t.order_id == order_id)
            .ok_or_else(|| BrokerError::NotFound {
                what: format!("order {order_id}"),
            })?;
        if !trade.status.is_open() {
            return Err(BrokerError::Rejected {
                code: NOT_CANCELLABLE,
                message: format!(
                    "Cancel attempted when order is not in a cancellable state. Order permId ={}",
                    trade.perm_id
                ),
            });
        }
        trade.status = OrderStatus::Cancelled;
        Ok(trade.clone())
    }

    async fn open_trades(&self) -> Result<Vec<Trade>, BrokerError> {
        self.ensure_connected()?;
        Ok(self
            .book
            .lock()
            .trades
            .iter()
            .filter(|t| t.status.is_open())
            .cloned()
            .collect())
    }

    async fn trades(&self) -> Result<Vec<Trade>, BrokerError> {
        self.ensure_connected()?;
        Ok(self.book.lock().trades.clone())
    }

    async fn fills(&self) -> Result<Vec<Fill>, BrokerError> {
        self.ensure_connected()?;
        Ok(self.book.lock().fills.clone())
    }

    async fn historical_bars(
        &self,
        contract: &Contract,
        query: &HistoricalBarsQuery,
    ) -> Result<Vec<Bar>, BrokerError> {
        let (instrument, qualified) = self.resolve(contract)?;
        Ok(market::historical_bars(
            &qualified.stream_symbol(),
            instrument.base_price,
            instrument.min_tick,
            query,
            Utc::now(),
        ))
    }

    async fn realtime_bars(
        &self,
        contract: &Contract,
        _what_to_show: WhatToShow,
        _use_rth: bool,
    ) -> Result<Vec<RealtimeBar>, BrokerError> {
        let (instrument, qualified) = self.resolve(contract)?;
        Ok(market::realtime_bars(
            &qualified.stream_symbol(),
            self.price_of(instrument),
            instrument.min_tick,
            Utc::now(),
        ))
    }

    async fn ticker_snapshot(&self, contract: &Contract) -> Result<TickerUpdate, BrokerError> {
        let (instrument, qualified) = self.resolve(contract)?;
        let symbol = qualified.stream_symbol();
        let mut walk = TickerWalk::new(
            symbol.clone(),
            self.price_of(instrument),
            instrument.min_tick,
            market::seed_for(&symbol),
        );
        Ok(walk.next(Utc::now()))
    }

    async fn historical_ticks(
        &self,
        contract: &Contract,
        tick_type: TickType,
        count: u32,
    ) -> Result<Vec<Tick>, BrokerError> {
        let (instrument, qualified) = self.resolve(contract)?;
        Ok(market::historical_ticks(
            &qualified.stream_symbol(),
            self.price_of(instrument),
            instrument.min_tick,
            tick_type,
            count,
            Utc::now(),
        ))
    }

    async fn market_depth(&self, contract: &Contract, rows: u32) -> Result<DepthBook, BrokerError> {
        let (instrument, qualified) = self.resolve(contract)?;
        Ok(market::depth_book(
            &qualified.stream_symbol(),
            self.price_of(instrument),
            instrument.min_tick,
            rows.clamp(1, 20),
        ))
    }

    async fn contract_details(
        &self,
        contract: &Contract,
    ) -> Result<Vec<ContractDetails>, BrokerError> {
        self.ensure_connected()?;
        Ok(instruments::qualify(contract)
            .map(|(instrument, qualified)| instrument.details(qualified))
            .into_iter()
            .collect())
    }

    async fn scan(&self, request: &ScannerRequest) -> Result<Vec<ScanResult>, BrokerError> {
        self.ensure_connected()?;
        if request.instrument != "STK" {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let mut rows: Vec<(f64, u64, &Instrument)> = INSTRUMENTS
            .iter()
            .filter(|i| i.sec_type == SecType::Stock)
            .filter_map(|i| {
                let bar = market::realtime_bars(i.symbol, self.price_of(i), i.min_tick, now);
                let last = bar.last()?.close;
                let change = (last - i.base_price) / i.base_price;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let volume = bar.iter().map(|b| b.volume).sum::<f64>() as u64;
                request.accepts(last, volume).then_some((change, volume, i))
            })
            .collect();

        match request.scan_code.as_str() {
            "TOP_PERC_GAIN" | "HOT_BY_PRICE" => rows.sort_by(|a, b| b.0.total_cmp(&a.0)),
            "TOP_PERC_LOSE" => rows.sort_by(|a, b| a.0.total_cmp(&b.0)),
            "MOST_ACTIVE" => rows.sort_by(|a, b| b.1.cmp(&a.1)),
            _ => return Ok(Vec::new()),
        }

        Ok(rows
            .into_iter()
            .take(request.number_of_rows.clamp(1, 50) as usize)
            .zip(0_u32..)
            .map(|((change, _, instrument), rank)| ScanResult {
                rank,
                contract: instrument.contract(),
                distance: String::new(),
                benchmark: String::new(),
                projection: format!("{:.2}%", change * 100.0),
                legs: String::new(),
            })
            .collect())
    }

    async fn scanner_parameters(&self) -> Result<String, BrokerError> {
        self.ensure_connected()?;
        Ok(SCANNER_PARAMETERS.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::contract::{ContractRequest, create_contract};
    use crate::domain::order::{OrderRequest, TimeInForce, build_order};

    fn broker(readonly: bool) -> (SimulatedBroker, mpsc::Receiver<BrokerEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let settings = BrokerSettings {
            readonly,
            ..BrokerSettings::default()
        };
        let sim = SimulatorSettings {
            tick_interval: Duration::from_millis(10),
            ..SimulatorSettings::default()
        };
        (SimulatedBroker::new(settings, sim, tx), rx)
    }

    async fn connected(readonly: bool) -> (SimulatedBroker, mpsc::Receiver<BrokerEvent>) {
        let (broker, mut rx) = broker(readonly);
        broker.connect().await;
        assert_eq!(rx.recv().await, Some(BrokerEvent::Connected));
        (broker, rx)
    }

    fn aapl() -> Contract {
        create_contract(&ContractRequest::stock("AAPL")).unwrap()
    }

    fn order(order_type: OrderType, limit: Option<Decimal>) -> Order {
        build_order(&OrderRequest {
            contract: ContractRequest::stock("AAPL"),
            action: OrderAction::Buy,
            order_type,
            quantity: Decimal::new(10, 0),
            limit_price: limit,
            stop_price: None,
            time_in_force: TimeInForce::Day,
            account: None,
            transmit: true,
            parent_id: None,
            oca_group: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn calls_fail_when_disconnected() {
        let (broker, _rx) = broker(false);
        assert_eq!(broker.managed_accounts().await, Err(BrokerError::NotConnected));
        let key = ResourceKey::ticker("AAPL").unwrap();
        assert_eq!(
            broker.subscribe_stream(&key).await.unwrap_err(),
            BrokerError::NotConnected
        );
        assert!(!broker.connection_info().connected);
    }

    #[tokio::test]
    async fn ticker_stream_emits_until_cancelled() {
        let (broker, mut rx) = connected(false).await;
        let key = ResourceKey::ticker("AAPL").unwrap();
        let handle = broker.subscribe_stream(&key).await.unwrap();
        assert_eq!(broker.open_streams(), 1);

        match rx.recv().await {
            Some(BrokerEvent::Update { key: got, request_id, message }) => {
                assert_eq!(got, key);
                assert_eq!(request_id, handle.request_id);
                assert!(message.is_for(&key));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        broker.cancel_stream(&handle).await.unwrap();
        assert_eq!(broker.open_streams(), 0);
        assert!(broker.cancel_stream(&handle).await.is_err());
    }

    #[tokio::test]
    async fn unknown_symbol_is_rejected() {
        let (broker, _rx) = connected(false).await;
        let err = broker
            .subscribe_stream(&ResourceKey::ticker("XYZ").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Rejected { code: 200, .. }));
        assert_eq!(broker.open_streams(), 0);
    }

    #[tokio::test]
    async fn pnl_requires_managed_account() {
        let (broker, _rx) = connected(false).await;
        assert!(
            broker
                .subscribe_stream(&ResourceKey::pnl("DU123456").unwrap())
                .await
                .is_ok()
        );
        let err = broker
            .subscribe_stream(&ResourceKey::pnl("U999").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Rejected { code: 321, .. }));
        broker.shutdown();
        assert_eq!(broker.open_streams(), 0);
    }

    #[tokio::test]
    async fn market_order_fills_and_shows_as_position() {
        let (broker, _rx) = connected(false).await;
        let trade = broker
            .place_order(&aapl(), &order(OrderType::Market, None))
            .await
            .unwrap();
        assert_eq!(trade.status, OrderStatus::Filled);
        assert_eq!(trade.filled, Decimal::new(10, 0));
        assert!(trade.contract.is_qualified());

        let fills = broker.fills().await.unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].side, "BOT");

        let positions = broker.positions(None).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert!((positions[0].position - 10.0).abs() < f64::EPSILON);
        assert!(broker.open_trades().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resting_limit_order_can_be_cancelled_once() {
        let (broker, _rx) = connected(false).await;
        let trade = broker
            .place_order(&aapl(), &order(OrderType::Limit, Some(Decimal::ONE)))
            .await
            .unwrap();
        assert_eq!(trade.status, OrderStatus::Submitted);
        assert_eq!(broker.open_trades().await.unwrap().len(), 1);

        let cancelled = broker.cancel_order(trade.order_id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(matches!(
            broker.cancel_order(trade.order_id).await,
            Err(BrokerError::Rejected { code: 161, .. })
        ));
        assert!(matches!(
            broker.cancel_order(999).await,
            Err(BrokerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn readonly_session_rejects_orders() {
        let (broker, _rx) = connected(true).await;
        assert_eq!(
            broker
                .place_order(&aapl(), &order(OrderType::Market, None))
                .await
                .unwrap_err(),
            BrokerError::ReadOnly
        );
    }

    #[tokio::test]
    async fn account_values_cover_summary_tags() {
        let (broker, _rx) = connected(false).await;
        let values = broker.account_values("DU123456").await.unwrap();
        for tag in SUMMARY_TAGS {
            assert!(values.iter().any(|v| v.tag == *tag), "missing {tag}");
        }
        let net_liq = values.iter().find(|v| v.tag == "NetLiquidation").unwrap();
        assert_eq!(net_liq.value, "1000000.00");
    }

    #[tokio::test]
    async fn scan_ranks_stocks() {
        let (broker, _rx) = connected(false).await;
        let request: ScannerRequest = serde_json::from_str(r#"{"number_of_rows": 3}"#).unwrap();
        let results = broker.scan(&request).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].rank, 0);

        let unknown: ScannerRequest =
            serde_json::from_str(r#"{"scan_code": "NOT_A_SCAN"}"#).unwrap();
        assert!(broker.scan(&unknown).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disconnect_stops_streams() {
        let (broker, mut rx) = connected(false).await;
        broker
            .subscribe_stream(&ResourceKey::ticker("MSFT").unwrap())
            .await
            .unwrap();
        broker.disconnect("maintenance").await;
        assert_eq!(broker.open_streams(), 0);
        assert!(!broker.connection_info().connected);

        let mut saw_disconnect = false;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(100), rx.recv()).await
        {
            if matches!(event, BrokerEvent::Disconnected { .. }) {
                saw_disconnect = true;
                break;
            }
        }
        assert!(saw_disconnect);
    }
}
