// sheethub/src/ledger/state.rs

//! In-memory tables behind the ledger and the mutations that must be applied
//! as a unit. Every method here runs under the ledger's write lock, so each
//! one is atomic with respect to every other reader and writer.

use crate::error::{Result, SheetHubError};
use crate::models::{DerivativeArtifact, Order, OrderStatus, Sheet, User};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Result of the status-guarded completion.
#[derive(Debug)]
pub(crate) enum Settled {
  /// This call moved the order to `completed`.
  Applied { order: Order, creator_id: Uuid },
  /// Someone else already did; nothing was touched.
  AlreadyCompleted(Order),
}

#[derive(Debug, Default)]
pub(crate) struct LedgerState {
  pub(crate) users: HashMap<Uuid, User>,
  pub(crate) sheets: HashMap<Uuid, Sheet>,
  pub(crate) orders: HashMap<Uuid, Order>,
  order_by_pair: HashMap<(Uuid, Uuid), Uuid>,
}

impl LedgerState {
  pub(crate) fn order(&self, order_id: Uuid) -> Result<&Order> {
    self.orders.get(&order_id).ok_or(SheetHubError::OrderNotFound(order_id))
  }

  pub(crate) fn sheet(&self, sheet_id: Uuid) -> Result<&Sheet> {
    self.sheets.get(&sheet_id).ok_or(SheetHubError::SheetNotFound(sheet_id))
  }

  pub(crate) fn user(&self, user_id: Uuid) -> Result<&User> {
    self.users.get(&user_id).ok_or(SheetHubError::CreatorNotFound(user_id))
  }

  pub(crate) fn order_for(&self, buyer_id: Uuid, sheet_id: Uuid) -> Option<&Order> {
    self
      .order_by_pair
      .get(&(buyer_id, sheet_id))
      .and_then(|order_id| self.orders.get(order_id))
  }

  /// Inserts a new order unless the (buyer, sheet) pair already has one.
  pub(crate) fn insert_order(&mut self, order: Order) -> Result<Order> {
    let pair = (order.buyer_id, order.sheet_id);
    if let Some(existing) = self.order_by_pair.get(&pair) {
      return Err(SheetHubError::DuplicateOrder {
        buyer_id: order.buyer_id,
        sheet_id: order.sheet_id,
        existing_order_id: *existing,
      });
    }
    self.order_by_pair.insert(pair, order.id);
    self.orders.insert(order.id, order.clone());
    Ok(order)
  }

  /// `processing -> completed`: sets status, `purchased_at` and the payment
  /// reference, and bumps the sheet's sale counter. Everything is validated
  /// before the first write so the transition applies fully or not at all.
  pub(crate) fn settle(&mut self, order_id: Uuid, reference: &str, at: DateTime<Utc>) -> Result<Settled> {
    let (status, sheet_id) = {
      let order = self.order(order_id)?;
      (order.status, order.sheet_id)
    };
    match status {
      OrderStatus::Completed => return Ok(Settled::AlreadyCompleted(self.order(order_id)?.clone())),
      OrderStatus::Failed => return Err(SheetHubError::OrderFailed { order_id }),
      OrderStatus::Processing => {}
    }
    let sheet = self
      .sheets
      .get_mut(&sheet_id)
      .ok_or(SheetHubError::SheetNotFound(sheet_id))?;
    let order = self
      .orders
      .get_mut(&order_id)
      .ok_or(SheetHubError::OrderNotFound(order_id))?;

    sheet.total_sold += 1;
    order.status = OrderStatus::Completed;
    order.purchased_at = Some(at);
    order.payment_reference = Some(reference.to_string());
    order.failure_reason = None;

    Ok(Settled::Applied {
      order: order.clone(),
      creator_id: sheet.creator_id,
    })
  }

  /// `processing -> failed`. Terminal.
  pub(crate) fn fail(&mut self, order_id: Uuid, reference: &str, reason: &str) -> Result<Order> {
    let order = self
      .orders
      .get_mut(&order_id)
      .ok_or(SheetHubError::OrderNotFound(order_id))?;
    if order.status != OrderStatus::Processing {
      return Err(SheetHubError::Internal(format!(
        "order {} cannot fail from status {}",
        order_id, order.status
      )));
    }
    order.status = OrderStatus::Failed;
    order.purchased_at = None;
    order.payment_reference = Some(reference.to_string());
    order.failure_reason = Some(reason.to_string());
    Ok(order.clone())
  }

  /// Points a completed order at a newly generated derivative.
  pub(crate) fn swap_derivative(&mut self, order_id: Uuid, derivative: DerivativeArtifact) -> Result<Order> {
    let order = self
      .orders
      .get_mut(&order_id)
      .ok_or(SheetHubError::OrderNotFound(order_id))?;
    if order.status != OrderStatus::Completed {
      return Err(SheetHubError::NotCompleted {
        order_id,
        status: order.status,
      });
    }
    order.derivative = Some(derivative);
    Ok(order.clone())
  }
}
