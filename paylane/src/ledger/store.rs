//! Ledger persistence contract and in-memory implementation.

use super::{
    AuditEvent, Intent, LedgerError, Order, PayoutInstruction, SettlementBatch, SettlementDetail,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Persistence collaborator for the settlement ledger.
///
/// Callers invoke these operations synchronously within a settlement flow
/// and treat failures as propagating errors; the core never retries a
/// ledger write internally. SQL-backed implementations live outside this
/// workspace.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts or replaces the order with the same `order_number`.
    async fn upsert_order(&self, order: Order) -> Result<(), LedgerError>;

    /// Inserts a batch together with the detail row it owns.
    async fn insert_settlement_batch(
        &self,
        batch: SettlementBatch,
        detail: SettlementDetail,
    ) -> Result<(), LedgerError>;

    /// Appends an audit event. Events are never updated or deleted.
    async fn insert_audit_event(&self, event: AuditEvent) -> Result<(), LedgerError>;

    /// Records a transfer intent.
    async fn insert_intent(&self, intent: Intent) -> Result<(), LedgerError>;

    /// Records an onward-payout instruction.
    async fn insert_payout_instruction(
        &self,
        payout: PayoutInstruction,
    ) -> Result<(), LedgerError>;

    /// Fetches an order by its unique number.
    async fn get_order(&self, order_number: &str) -> Result<Option<Order>, LedgerError>;

    /// Lists all orders belonging to a payer wallet.
    async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>, LedgerError>;
}

#[derive(Debug, Default)]
struct MemoryLedgerInner {
    orders: HashMap<String, Order>,
    batches: Vec<(SettlementBatch, SettlementDetail)>,
    audit_events: Vec<AuditEvent>,
    intents: Vec<Intent>,
    payouts: Vec<PayoutInstruction>,
}

/// In-memory [`LedgerStore`] used by tests and demos.
///
/// Uses a plain blocking mutex: every critical section is a short map or
/// vector operation with no await points inside.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: Mutex<MemoryLedgerInner>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all persisted batch/detail pairs.
    #[must_use]
    pub fn batches(&self) -> Vec<(SettlementBatch, SettlementDetail)> {
        self.inner.lock().expect("ledger lock poisoned").batches.clone()
    }

    /// Snapshot of all appended audit events.
    #[must_use]
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.inner
            .lock()
            .expect("ledger lock poisoned")
            .audit_events
            .clone()
    }

    /// Snapshot of all recorded intents.
    #[must_use]
    pub fn intents(&self) -> Vec<Intent> {
        self.inner.lock().expect("ledger lock poisoned").intents.clone()
    }

    /// Snapshot of all recorded payout instructions.
    #[must_use]
    pub fn payouts(&self) -> Vec<PayoutInstruction> {
        self.inner.lock().expect("ledger lock poisoned").payouts.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn upsert_order(&self, order: Order) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        inner.orders.insert(order.order_number.clone(), order);
        Ok(())
    }

    async fn insert_settlement_batch(
        &self,
        batch: SettlementBatch,
        detail: SettlementDetail,
    ) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        inner.batches.push((batch, detail));
        Ok(())
    }

    async fn insert_audit_event(&self, event: AuditEvent) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        inner.audit_events.push(event);
        Ok(())
    }

    async fn insert_intent(&self, intent: Intent) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        inner.intents.push(intent);
        Ok(())
    }

    async fn insert_payout_instruction(
        &self,
        payout: PayoutInstruction,
    ) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        inner.payouts.push(payout);
        Ok(())
    }

    async fn get_order(&self, order_number: &str) -> Result<Option<Order>, LedgerError> {
        let inner = self.inner.lock().expect("ledger lock poisoned");
        Ok(inner.orders.get(order_number).cloned())
    }

    async fn list_orders(&self, user_id: &str) -> Result<Vec<Order>, LedgerError> {
        let inner = self.inner.lock().expect("ledger lock poisoned");
        Ok(inner
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::OrderStatus;
    use crate::timestamp::UnixTimestamp;
    use rust_decimal::dec;

    fn order(number: &str, user: &str, status: OrderStatus) -> Order {
        Order {
            order_number: number.to_owned(),
            user_id: user.to_owned(),
            spend_amount: dec!(10),
            budget: dec!(100),
            currency: "USDC".to_owned(),
            chain: "eip155:11155111".to_owned(),
            deadline: UnixTimestamp::from_secs(2_000_000_000),
            status,
            status_message: String::new(),
            created_at: UnixTimestamp::now(),
            updated_at: UnixTimestamp::now(),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_by_order_number() {
        let ledger = MemoryLedger::new();
        ledger
            .upsert_order(order("ord-1", "0xAAA", OrderStatus::Pending))
            .await
            .unwrap();
        ledger
            .upsert_order(order("ord-1", "0xAAA", OrderStatus::Success))
            .await
            .unwrap();

        let stored = ledger.get_order("ord-1").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Success);
        assert_eq!(ledger.list_orders("0xAAA").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_orders_filters_by_user() {
        let ledger = MemoryLedger::new();
        ledger
            .upsert_order(order("ord-1", "0xAAA", OrderStatus::Pending))
            .await
            .unwrap();
        ledger
            .upsert_order(order("ord-2", "0xBBB", OrderStatus::Pending))
            .await
            .unwrap();

        let for_a = ledger.list_orders("0xAAA").await.unwrap();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].order_number, "ord-1");
        assert!(ledger.list_orders("0xCCC").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_order_is_none() {
        let ledger = MemoryLedger::new();
        assert!(ledger.get_order("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn payout_instructions_append() {
        use crate::ledger::{collect_payout_instruction, PayoutInput, PayoutStatus};

        let ledger = MemoryLedger::new();
        let payout = collect_payout_instruction(&PayoutInput {
            network: "sepolia",
            to_address: "0xMerchant",
            amount: dec!(99.65),
            gas_estimate: None,
            gas_fee_paid: None,
            tx_hash: "",
        })
        .unwrap();
        ledger.insert_payout_instruction(payout).await.unwrap();

        let payouts = ledger.payouts();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].status, PayoutStatus::Created);
    }
}
