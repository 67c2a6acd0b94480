use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::contract::{Payment, SaleContract};
use crate::errors::{EngineError, Result};
use crate::types::{ContractId, PaymentId};

/// a contract together with the payments registered against it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub contract: SaleContract,
    pub payments: Vec<Payment>,
}

impl ContractRecord {
    pub fn new(contract: SaleContract) -> Self {
        Self {
            contract,
            payments: Vec::new(),
        }
    }

    pub fn payment(&self, id: PaymentId) -> Result<&Payment> {
        self.payments
            .iter()
            .find(|p| p.id == id)
            .ok_or(EngineError::PaymentNotFound { id })
    }

    pub fn payment_mut(&mut self, id: PaymentId) -> Result<&mut Payment> {
        self.payments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(EngineError::PaymentNotFound { id })
    }
}

/// persistence for contract records
///
/// `transaction` runs the closure against the current record with other
/// writers to the same contract excluded, and keeps its changes only when
/// the closure returns `Ok`.
pub trait ContractStore {
    fn insert(&self, record: ContractRecord) -> Result<()>;

    /// snapshot of the stored record
    fn load(&self, id: ContractId) -> Result<ContractRecord>;

    fn transaction<T, F>(&self, id: ContractId, f: F) -> Result<T>
    where
        F: FnOnce(&mut ContractRecord) -> Result<T>;

    fn contract_for_payment(&self, payment_id: PaymentId) -> Result<ContractId>;

    fn ids(&self) -> Vec<ContractId>;
}

/// in-memory store with a lock per contract
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<ContractId, Arc<Mutex<ContractRecord>>>>,
    payment_index: RwLock<HashMap<PaymentId, ContractId>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, id: ContractId) -> Result<Arc<Mutex<ContractRecord>>> {
        let records = self.records.read().map_err(|_| poisoned("records"))?;
        records
            .get(&id)
            .cloned()
            .ok_or(EngineError::ContractNotFound { id })
    }

    fn index_payments(&self, record: &ContractRecord) -> Result<()> {
        let mut index = self.payment_index.write().map_err(|_| poisoned("payment index"))?;
        for payment in &record.payments {
            index.insert(payment.id, record.contract.id);
        }
        Ok(())
    }
}

impl ContractStore for MemoryStore {
    fn insert(&self, record: ContractRecord) -> Result<()> {
        let id = record.contract.id;
        {
            let mut records = self.records.write().map_err(|_| poisoned("records"))?;
            if records.contains_key(&id) {
                return Err(EngineError::Storage {
                    message: format!("contract {} already stored", id),
                });
            }
            records.insert(id, Arc::new(Mutex::new(record.clone())));
        }
        self.index_payments(&record)
    }

    fn load(&self, id: ContractId) -> Result<ContractRecord> {
        let record = self.record(id)?;
        let guard = record.lock().map_err(|_| poisoned("contract"))?;
        Ok(guard.clone())
    }

    fn transaction<T, F>(&self, id: ContractId, f: F) -> Result<T>
    where
        F: FnOnce(&mut ContractRecord) -> Result<T>,
    {
        let record = self.record(id)?;
        let mut guard = record.lock().map_err(|_| poisoned("contract"))?;

        let mut draft = guard.clone();
        let value = f(&mut draft)?;

        self.index_payments(&draft)?;
        *guard = draft;
        Ok(value)
    }

    fn contract_for_payment(&self, payment_id: PaymentId) -> Result<ContractId> {
        let index = self.payment_index.read().map_err(|_| poisoned("payment index"))?;
        index
            .get(&payment_id)
            .copied()
            .ok_or(EngineError::PaymentNotFound { id: payment_id })
    }

    fn ids(&self) -> Vec<ContractId> {
        self.records
            .read()
            .map(|records| records.keys().copied().collect())
            .unwrap_or_default()
    }
}

fn poisoned(what: &str) -> EngineError {
    EngineError::Storage {
        message: format!("{} lock poisoned", what),
    }
}
