//! In-memory chain client for tests

use crate::balance::YieldBalance;
use crate::chain::{ChainCall, ChainClient, ChainError, ChainId, ChainResult};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Chain client that accepts every call unless told otherwise.
///
/// Unknown accounts are rejected with `InvalidAccount`, like a real ledger.
pub struct FakeChainClient {
    chain: ChainId,
    connect_error: Option<ChainError>,
    call_errors: HashMap<&'static str, ChainError>,
    balances: HashMap<String, YieldBalance>,
    gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<ChainCall>>,
    connects: AtomicUsize,
    balance_queries: AtomicUsize,
}

impl FakeChainClient {
    pub fn new(chain: ChainId) -> Self {
        Self {
            chain,
            connect_error: None,
            call_errors: HashMap::new(),
            balances: HashMap::new(),
            gate: None,
            calls: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            balance_queries: AtomicUsize::new(0),
        }
    }

    pub fn failing_connect(mut self, error: ChainError) -> Self {
        self.connect_error = Some(error);
        self
    }

    /// Reject every call with the given method name
    pub fn failing_call(mut self, method: &'static str, error: ChainError) -> Self {
        self.call_errors.insert(method, error);
        self
    }

    pub fn with_balance(mut self, account: &str, balance: YieldBalance) -> Self {
        self.balances.insert(account.to_string(), balance);
        self
    }

    /// Hold every submit until the gate is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<ChainCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn balance_queries(&self) -> usize {
        self.balance_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for FakeChainClient {
    fn chain(&self) -> ChainId {
        self.chain
    }

    async fn connect(&self) -> ChainResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.connect_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn health_check(&self) -> bool {
        self.connect_error.is_none()
    }

    async fn query_balance(&self, account: &str) -> ChainResult<YieldBalance> {
        self.balance_queries.fetch_add(1, Ordering::SeqCst);
        self.balances
            .get(account)
            .cloned()
            .ok_or_else(|| ChainError::InvalidAccount(account.to_string()))
    }

    async fn submit(&self, call: ChainCall) -> ChainResult<Option<String>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let method = call.name();
        let sequence = {
            let mut calls = self.calls.lock().unwrap_or_else(|p| p.into_inner());
            calls.push(call);
            calls.len()
        };

        match self.call_errors.get(method) {
            Some(e) => Err(e.clone()),
            None => Ok(Some(format!("{}-{}", self.chain, sequence))),
        }
    }
}
