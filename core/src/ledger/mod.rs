// sheethub/src/ledger/mod.rs

//! The order ledger: catalog records, orders, and settlement.
//!
//! State lives behind a single `parking_lot::RwLock`. Guards on it are never
//! held across `.await`; the only lock that spans the payment gateway call is
//! the per-order settlement lock, which serializes completion attempts for
//! one order and nothing else.

mod state;
mod stats;

pub use stats::SalesSummary;

use crate::config::SettlementConfig;
use crate::core::{system_clock, KeyedMutex, SharedClock};
use crate::error::{Result, SheetHubError};
use crate::gateway::{Confirmation, GatewayError, PaymentGateway};
use crate::models::{DerivativeArtifact, NewSheet, Order, OrderStatus, Sheet, User};
use crate::money::{validate_royalty_percentage, ListPriceSplit, Money, RoyaltyCalculator, SaleSplit};
use crate::notify::{Notifier, PurchaseCompleted};
use parking_lot::RwLock;
use state::{LedgerState, Settled};
use std::sync::Arc;
use tracing::{event, info, instrument, warn, Level};
use uuid::Uuid;

pub struct OrderLedger {
  state: RwLock<LedgerState>,
  settlement_locks: KeyedMutex<Uuid>,
  gateway: Arc<dyn PaymentGateway>,
  notifier: Arc<dyn Notifier>,
  calculator: RoyaltyCalculator,
  config: SettlementConfig,
  clock: SharedClock,
}

impl OrderLedger {
  pub fn new(config: SettlementConfig, gateway: Arc<dyn PaymentGateway>, notifier: Arc<dyn Notifier>) -> Self {
    Self {
      state: RwLock::new(LedgerState::default()),
      settlement_locks: KeyedMutex::new(),
      gateway,
      notifier,
      calculator: config.calculator(),
      config,
      clock: system_clock(),
    }
  }

  /// Replaces the wall clock used for `created_at`/`purchased_at`.
  pub fn with_clock(mut self, clock: SharedClock) -> Self {
    self.clock = clock;
    self
  }

  pub fn config(&self) -> &SettlementConfig {
    &self.config
  }

  pub fn calculator(&self) -> &RoyaltyCalculator {
    &self.calculator
  }

  // --- Catalog ---

  #[instrument(name = "OrderLedger::register_creator", skip_all, fields(creator_id = %creator.id), err(Display))]
  pub fn register_creator(&self, creator: User) -> Result<User> {
    validate_royalty_percentage(creator.royalty_percentage)?;
    let mut state = self.state.write();
    if state.users.contains_key(&creator.id) {
      return Err(SheetHubError::DuplicateCreator(creator.id));
    }
    state.users.insert(creator.id, creator.clone());
    info!(membership = ?creator.membership, "Creator registered.");
    Ok(creator)
  }

  /// Publishes a sheet. A basic creator may hold at most
  /// `free_sheet_quota` free sheets; the creator's `has_published` flag is
  /// set on the first publication.
  #[instrument(name = "OrderLedger::publish_sheet", skip_all, fields(creator_id = %new_sheet.creator_id), err(Display))]
  pub fn publish_sheet(&self, new_sheet: NewSheet) -> Result<Sheet> {
    if new_sheet.price.is_negative() {
      return Err(SheetHubError::InvalidPrice(new_sheet.price.minor_units()));
    }
    let quota = self.config.free_sheet_quota;
    let mut state = self.state.write();

    let membership = state.user(new_sheet.creator_id)?.membership;
    if new_sheet.price.is_zero() && membership.has_free_sheet_quota() {
      let free_sheets = state
        .sheets
        .values()
        .filter(|sheet| sheet.creator_id == new_sheet.creator_id && sheet.is_free())
        .count();
      if free_sheets >= quota as usize {
        return Err(SheetHubError::FreeSheetQuotaExceeded {
          creator_id: new_sheet.creator_id,
          quota,
        });
      }
    }

    let sheet = Sheet {
      id: Uuid::new_v4(),
      creator_id: new_sheet.creator_id,
      title: new_sheet.title,
      price: new_sheet.price,
      master: new_sheet.master,
      assets: new_sheet.assets,
      total_sold: 0,
      created_at: self.clock.now(),
    };
    state.sheets.insert(sheet.id, sheet.clone());

    if let Some(creator) = state.users.get_mut(&sheet.creator_id) {
      if !creator.has_published {
        creator.has_published = true;
        event!(Level::DEBUG, creator_id = %creator.id, "Creator published their first sheet.");
      }
    }

    info!(sheet_id = %sheet.id, price = %sheet.price, "Sheet published.");
    Ok(sheet)
  }

  /// Changes a sheet's list price. Open orders keep the amount they were created with.
  #[instrument(name = "OrderLedger::update_price", skip(self), err(Display))]
  pub fn update_price(&self, sheet_id: Uuid, price: Money) -> Result<Sheet> {
    if price.is_negative() {
      return Err(SheetHubError::InvalidPrice(price.minor_units()));
    }
    let mut state = self.state.write();
    let sheet = state
      .sheets
      .get_mut(&sheet_id)
      .ok_or(SheetHubError::SheetNotFound(sheet_id))?;
    sheet.price = price;
    Ok(sheet.clone())
  }

  pub fn creator(&self, creator_id: Uuid) -> Result<User> {
    self.state.read().user(creator_id).cloned()
  }

  pub fn sheet(&self, sheet_id: Uuid) -> Result<Sheet> {
    self.state.read().sheet(sheet_id).cloned()
  }

  pub fn order(&self, order_id: Uuid) -> Result<Order> {
    self.state.read().order(order_id).cloned()
  }

  pub fn find_order(&self, buyer_id: Uuid, sheet_id: Uuid) -> Option<Order> {
    self.state.read().order_for(buyer_id, sheet_id).cloned()
  }

  // --- Orders ---

  /// Opens an order in `processing` with the sheet's current price.
  #[instrument(name = "OrderLedger::create_order", skip(self), err(Display))]
  pub fn create_order(&self, buyer_id: Uuid, sheet_id: Uuid) -> Result<Order> {
    let now = self.clock.now();
    let mut state = self.state.write();
    let amount = state.sheet(sheet_id)?.price;
    let order = state.insert_order(Order {
      id: Uuid::new_v4(),
      buyer_id,
      sheet_id,
      status: OrderStatus::Processing,
      amount,
      created_at: now,
      purchased_at: None,
      payment_reference: None,
      failure_reason: None,
      derivative: None,
    })?;
    info!(order_id = %order.id, amount = %order.amount, "Order created.");
    Ok(order)
  }

  /// Settles an order against the processor.
  ///
  /// Completed orders are returned unchanged. Otherwise the payment is
  /// confirmed (free orders skip the gateway) and the order, its
  /// `purchased_at` and the sheet's sale counter are updated in one write.
  /// A decline fails the order; transient and ambiguous outcomes leave it in
  /// `processing` for a later attempt.
  #[instrument(name = "OrderLedger::complete_purchase", skip(self, payment_reference), err(Display))]
  pub async fn complete_purchase(&self, order_id: Uuid, payment_reference: &str) -> Result<Order> {
    let _claim = self.settlement_locks.lock(order_id).await;

    let order = self.order(order_id)?;
    match order.status {
      OrderStatus::Completed => {
        event!(Level::DEBUG, "Order already completed, nothing to do.");
        return Ok(order);
      }
      OrderStatus::Failed => return Err(SheetHubError::OrderFailed { order_id }),
      OrderStatus::Processing => {}
    }

    if order.amount.is_zero() {
      event!(Level::DEBUG, "Free order, skipping payment confirmation.");
    } else {
      match self.confirm_payment(payment_reference).await {
        Ok(confirmation) => self.audit_settled_amount(&order, &confirmation),
        Err(error) if error.is_terminal() => {
          let reason = error.to_string();
          self.state.write().fail(order_id, payment_reference, &reason)?;
          warn!(%reason, "Payment verification failed, order marked failed.");
          return Err(SheetHubError::PaymentVerification { order_id, reason });
        }
        Err(error) => {
          warn!(kind = ?error.kind(), %error, "Payment outcome unresolved, order left processing.");
          return Err(error.into());
        }
      }
    }

    let settled = self.state.write().settle(order_id, payment_reference, self.clock.now())?;
    match settled {
      Settled::Applied { order, creator_id } => {
        info!(sheet_id = %order.sheet_id, amount = %order.amount, "Order settled.");
        let event = PurchaseCompleted {
          order_id: order.id,
          buyer_id: order.buyer_id,
          sheet_id: order.sheet_id,
          creator_id,
        };
        if let Err(e) = self.notifier.purchase_completed(event).await {
          warn!(error = %e, "Sale notification was not enqueued.");
        }
        Ok(order)
      }
      Settled::AlreadyCompleted(order) => Ok(order),
    }
  }

  /// One bounded confirmation, retried while the failure is transient.
  async fn confirm_payment(&self, reference: &str) -> std::result::Result<Confirmation, GatewayError> {
    let max_attempts = self.config.gateway_max_attempts.max(1);
    let mut attempt = 1;
    loop {
      let outcome = match tokio::time::timeout(self.config.gateway_timeout, self.gateway.confirm(reference)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(GatewayError::Ambiguous(format!(
          "no answer from the processor within {:?}",
          self.config.gateway_timeout
        ))),
      };
      match outcome {
        Err(error) if error.is_retryable() && attempt < max_attempts => {
          warn!(attempt, max_attempts, %error, "Transient gateway failure, retrying.");
          tokio::time::sleep(self.config.gateway_retry_backoff).await;
          attempt += 1;
        }
        other => return other,
      }
    }
  }

  fn audit_settled_amount(&self, order: &Order, confirmation: &Confirmation) {
    match confirmation.settled_amount {
      Some(settled) if settled != order.amount => warn!(
        expected = %order.amount,
        settled = %settled,
        "Processor settled a different amount; keeping the order amount."
      ),
      Some(_) => {}
      None => event!(Level::DEBUG, "Processor did not report a settled amount."),
    }
  }

  /// True when the sheet is free or the buyer holds a completed order for it.
  pub fn entitled(&self, buyer_id: Uuid, sheet_id: Uuid) -> Result<bool> {
    let state = self.state.read();
    if state.sheet(sheet_id)?.is_free() {
      return Ok(true);
    }
    Ok(
      state
        .order_for(buyer_id, sheet_id)
        .map_or(false, |order| order.is_completed()),
    )
  }

  pub(crate) fn record_derivative(&self, order_id: Uuid, derivative: DerivativeArtifact) -> Result<Order> {
    self.state.write().swap_derivative(order_id, derivative)
  }

  // --- Money ---

  /// Royalty and commission of a completed order at the creator's percentage.
  pub fn sale_split(&self, order_id: Uuid) -> Result<SaleSplit> {
    let state = self.state.read();
    let order = state.order(order_id)?;
    if !order.is_completed() {
      return Err(SheetHubError::NotCompleted {
        order_id,
        status: order.status,
      });
    }
    let sheet = state.sheet(order.sheet_id)?;
    let creator = state.user(sheet.creator_id)?;
    self.calculator.split(order.amount, creator.royalty_percentage)
  }

  pub fn list_price_split(&self, sheet_id: Uuid) -> Result<ListPriceSplit> {
    let state = self.state.read();
    let sheet = state.sheet(sheet_id)?;
    let creator = state.user(sheet.creator_id)?;
    self.calculator.list_price_split(sheet.price, creator.royalty_percentage)
  }

  /// Completed orders for a sheet, oldest purchase first.
  pub fn completed_orders(&self, sheet_id: Uuid) -> Vec<Order> {
    let mut orders: Vec<Order> = self
      .state
      .read()
      .orders
      .values()
      .filter(|order| order.sheet_id == sheet_id && order.is_completed())
      .cloned()
      .collect();
    orders.sort_by_key(|order| order.purchased_at);
    orders
  }

  pub fn sales_summary(&self, sheet_id: Uuid) -> Result<SalesSummary> {
    let state = self.state.read();
    let sheet = state.sheet(sheet_id)?;
    let creator = state.user(sheet.creator_id)?;
    let splits = state
      .orders
      .values()
      .filter(|order| order.sheet_id == sheet_id && order.is_completed())
      .map(|order| self.calculator.split(order.amount, creator.royalty_percentage))
      .collect::<Result<Vec<_>>>()?;
    Ok(SalesSummary::from_splits(sheet_id, &splits, &self.calculator))
  }
}
