use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use barfeed_core::{FeedError, Instrument, Symbol, SymbolResolver};

/// Symbol resolver backed by a fixed table.
///
/// In permissive mode (the default) unknown symbols resolve to a fresh
/// instrument on the requested venue.
pub struct StaticResolver {
    table: Mutex<HashMap<Symbol, Instrument>>,
    failing: Mutex<HashSet<Symbol>>,
    permissive: bool,
    calls: AtomicUsize,
}

impl Default for StaticResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticResolver {
    /// Permissive resolver with an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            permissive: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Only resolve symbols present in the table.
    #[must_use]
    pub const fn strict(mut self) -> Self {
        self.permissive = false;
        self
    }

    /// Add or replace one instrument.
    #[must_use]
    pub fn with_instrument(self, instrument: Instrument) -> Self {
        self.table
            .lock()
            .expect("mutex poisoned")
            .insert(instrument.symbol.clone(), instrument);
        self
    }

    /// Make lookups of `symbol` fail with a source error.
    pub fn fail(&self, symbol: Symbol) {
        self.failing.lock().expect("mutex poisoned").insert(symbol);
    }

    /// Number of `resolve` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SymbolResolver for StaticResolver {
    async fn resolve(
        &self,
        exchange: &str,
        market: &str,
        symbol: &Symbol,
    ) -> Result<Instrument, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().expect("mutex poisoned").contains(symbol) {
            return Err(FeedError::source("static", format!("lookup of {symbol} failed")));
        }
        let mut table = self.table.lock().expect("mutex poisoned");
        if let Some(inst) = table.get(symbol) {
            return Ok(inst.clone());
        }
        if !self.permissive {
            return Err(FeedError::not_found(format!("instrument {symbol}")));
        }
        let inst = Instrument {
            id: i64::try_from(table.len()).unwrap_or(i64::MAX) + 1,
            symbol: symbol.clone(),
            exchange: exchange.to_string(),
            market: market.to_string(),
        };
        table.insert(symbol.clone(), inst.clone());
        Ok(inst)
    }
}
