// sheethub/src/ledger/stats.rs

use crate::money::{RoyaltyCalculator, SaleSplit};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Sales figures for one sheet, over its completed orders, in major units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
  pub sheet_id: Uuid,
  pub completed_orders: u64,
  pub total_sales: Decimal,
  /// Sum of the creator's per-order royalties.
  pub total_earnings: Decimal,
  pub average_sale: Decimal,
  pub maximum_sale: Decimal,
}

impl SalesSummary {
  pub(crate) fn from_splits(sheet_id: Uuid, splits: &[SaleSplit], calculator: &RoyaltyCalculator) -> Self {
    let total_sales: Decimal = splits.iter().map(|split| split.amount).sum();
    let total_earnings: Decimal = splits.iter().map(|split| split.royalty).sum();
    let maximum_sale = splits
      .iter()
      .map(|split| split.amount)
      .max()
      .unwrap_or(Decimal::ZERO);
    let average_sale = if splits.is_empty() {
      Decimal::ZERO
    } else {
      calculator.round2(total_sales / Decimal::from(splits.len()))
    };

    Self {
      sheet_id,
      completed_orders: splits.len() as u64,
      total_sales,
      total_earnings,
      average_sale,
      maximum_sale,
    }
  }
}
