// sheethub/src/models/user.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
  #[default]
  Basic,
  Plus,
  Pro,
}

impl Membership {
  /// Only basic members are limited in how many free sheets they may publish.
  pub fn has_free_sheet_quota(self) -> bool {
    matches!(self, Membership::Basic)
  }
}

/// A marketplace user as far as settlement cares: creators earn royalties and
/// buyers are referenced by id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub id: Uuid,
  pub email: String,
  /// Creator's share of a sale as a fraction in `[0, 1]`.
  pub royalty_percentage: Decimal,
  pub membership: Membership,
  /// Flipped once, when the user's first sheet is published.
  pub has_published: bool,
  pub created_at: DateTime<Utc>,
}

impl User {
  pub fn new(email: impl Into<String>, royalty_percentage: Decimal, membership: Membership) -> Self {
    Self {
      id: Uuid::new_v4(),
      email: email.into(),
      royalty_percentage,
      membership,
      has_published: false,
      created_at: Utc::now(),
    }
  }
}
