//! Synthetic price generation for the simulated broker.
//!
//! Every series is a seeded random walk, so the same request returns the
//! same data.

use std::hash::{DefaultHasher, Hash, Hasher};

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::market_data::{
    Bar, DepthBook, DepthLevel, HistoricalBarsQuery, RealtimeBar, Tick, TickType,
};
use crate::domain::streaming::TickerUpdate;

/// Upper bound on bars per historical request.
pub const MAX_BARS: u64 = 2_000;

const MARKET_MAKERS: &[&str] = &["NSDQ", "ARCA", "BATS", "EDGX", "IEX"];

pub fn seed_for(parts: &impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    parts.hash(&mut hasher);
    hasher.finish()
}

fn round_to(value: f64, tick: f64) -> f64 {
    (value / tick).round() * tick
}

/// One step of a multiplicative random walk.
pub fn step(rng: &mut StdRng, price: f64, volatility: f64) -> f64 {
    let shock: f64 = rng.random_range(-1.0..1.0);
    (price * shock.mul_add(volatility, 1.0)).max(0.01)
}

fn align_down(time: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    let ts = time.timestamp();
    Utc.timestamp_opt(ts - ts.rem_euclid(seconds), 0)
        .single()
        .unwrap_or(time)
}

/// Historical bars ending at `query.end` (or `now`).
pub fn historical_bars(
    symbol: &str,
    base: f64,
    min_tick: f64,
    query: &HistoricalBarsQuery,
    now: DateTime<Utc>,
) -> Vec<Bar> {
    let bar_secs = i64::from(query.bar_size.seconds());
    let count = (query.duration.approx_seconds() / u64::from(query.bar_size.seconds())).clamp(1, MAX_BARS);
    let end = align_down(query.end.unwrap_or(now), bar_secs);
    let count_i = i64::try_from(count).unwrap_or(1);
    let start = end - ChronoDuration::seconds(bar_secs * (count_i - 1));

    let mut rng = StdRng::seed_from_u64(seed_for(&(symbol, start.timestamp(), bar_secs)));
    let volatility = 0.002 * f64::from(query.bar_size.seconds()).sqrt() / 60f64.sqrt();
    let mut close = base;

    (0..count_i)
        .map(|i| {
            let open = close;
            close = step(&mut rng, open, volatility);
            let wiggle = rng.random_range(0.0..volatility) * open;
            let high = round_to(open.max(close) + wiggle, min_tick);
            let low = round_to((open.min(close) - wiggle).max(min_tick), min_tick);
            let volume = f64::from(rng.random_range(100_u32..50_000));
            Bar {
                date: start + ChronoDuration::seconds(bar_secs * i),
                open: round_to(open, min_tick),
                high,
                low,
                close: round_to(close, min_tick),
                volume,
                average: round_to((high + low + close) / 3.0, min_tick),
                bar_count: rng.random_range(10..500),
            }
        })
        .collect()
}

/// The last minute of 5-second bars.
pub fn realtime_bars(symbol: &str, base: f64, min_tick: f64, now: DateTime<Utc>) -> Vec<RealtimeBar> {
    let end = align_down(now, 5);
    let mut rng = StdRng::seed_from_u64(seed_for(&(symbol, end.timestamp())));
    let mut close = base;
    (0..12_i64)
        .rev()
        .map(|back| {
            let open = close;
            close = step(&mut rng, open, 0.000_5);
            let high = round_to(open.max(close), min_tick);
            let low = round_to(open.min(close), min_tick);
            RealtimeBar {
                time: end - ChronoDuration::seconds(5 * back),
                open: round_to(open, min_tick),
                high,
                low,
                close: round_to(close, min_tick),
                volume: f64::from(rng.random_range(0_u32..2_000)),
                wap: round_to((high + low) / 2.0, min_tick),
                count: rng.random_range(0..40),
            }
        })
        .collect()
}

/// `count` ticks, one per second, most recent last.
pub fn historical_ticks(
    symbol: &str,
    base: f64,
    min_tick: f64,
    tick_type: TickType,
    count: u32,
    now: DateTime<Utc>,
) -> Vec<Tick> {
    let mut rng = StdRng::seed_from_u64(seed_for(&(symbol, now.timestamp(), count)));
    let mut price = base;
    (0..i64::from(count))
        .rev()
        .map(|back| {
            price = step(&mut rng, price, 0.000_3);
            let time = now - ChronoDuration::seconds(back);
            let spread = min_tick * f64::from(rng.random_range(1_u32..4));
            let size = f64::from(rng.random_range(1_u32..10) * 100);
            match tick_type {
                TickType::Last | TickType::AllLast => Tick {
                    time,
                    price: Some(round_to(price, min_tick)),
                    size: Some(size),
                    bid_price: None,
                    ask_price: None,
                    bid_size: None,
                    ask_size: None,
                },
                TickType::BidAsk => Tick {
                    time,
                    price: None,
                    size: None,
                    bid_price: Some(round_to(price - spread / 2.0, min_tick)),
                    ask_price: Some(round_to(price + spread / 2.0, min_tick)),
                    bid_size: Some(size),
                    ask_size: Some(f64::from(rng.random_range(1_u32..10) * 100)),
                },
                TickType::MidPoint => Tick {
                    time,
                    price: Some(round_to(price, min_tick / 2.0)),
                    size: None,
                    bid_price: None,
                    ask_price: None,
                    bid_size: None,
                    ask_size: None,
                },
            }
        })
        .collect()
}

/// Order book with `rows` levels each side around `mid`.
pub fn depth_book(symbol: &str, mid: f64, min_tick: f64, rows: u32) -> DepthBook {
    let mut rng = StdRng::seed_from_u64(seed_for(&(symbol, rows)));
    let level = |position: u32, price: f64, rng: &mut StdRng| DepthLevel {
        position,
        price: round_to(price, min_tick),
        size: f64::from(rng.random_range(1_u32..50) * 100),
        market_maker: MARKET_MAKERS[position as usize % MARKET_MAKERS.len()].to_string(),
    };

    let bids = (0..rows)
        .map(|p| level(p, mid - min_tick * f64::from(p + 1), &mut rng))
        .collect();
    let asks = (0..rows)
        .map(|p| level(p, mid + min_tick * f64::from(p + 1), &mut rng))
        .collect();

    DepthBook {
        symbol: symbol.to_string(),
        bids,
        asks,
    }
}

/// Running state of a simulated ticker stream.
pub struct TickerWalk {
    rng: StdRng,
    symbol: String,
    min_tick: f64,
    open: f64,
    close: f64,
    last: f64,
    high: f64,
    low: f64,
    volume: f64,
}

impl TickerWalk {
    pub fn new(symbol: String, base: f64, min_tick: f64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            symbol,
            min_tick,
            open: base,
            close: base,
            last: base,
            high: base,
            low: base,
            volume: 0.0,
        }
    }

    /// Advance one tick and return the full ticker state.
    pub fn next(&mut self, time: DateTime<Utc>) -> TickerUpdate {
        self.last = round_to(step(&mut self.rng, self.last, 0.000_4), self.min_tick);
        self.high = self.high.max(self.last);
        self.low = self.low.min(self.last);
        let last_size = f64::from(self.rng.random_range(1_u32..20) * 100);
        self.volume += last_size;
        let half_spread = self.min_tick * f64::from(self.rng.random_range(1_u32..3));

        TickerUpdate {
            symbol: self.symbol.clone(),
            bid: Some(round_to(self.last - half_spread, self.min_tick)),
            ask: Some(round_to(self.last + half_spread, self.min_tick)),
            last: Some(self.last),
            bid_size: Some(f64::from(self.rng.random_range(1_u32..30) * 100)),
            ask_size: Some(f64::from(self.rng.random_range(1_u32..30) * 100)),
            last_size: Some(last_size),
            volume: Some(self.volume),
            high: Some(self.high),
            low: Some(self.low),
            close: Some(self.close),
            open: Some(self.open),
            halted: Some(0.0),
            time,
        }
    }
}
