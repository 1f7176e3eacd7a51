//! # Cart
//!
//! The in-memory cart: the source of reservation events and the input to
//! checkout.
//!
//! ## Reservation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     Cart ↔ Stock Interplay                          │
//! │                                                                     │
//! │  UI edit ──► Cart mutation ──► Ok + StockOp(s) ──► reservation      │
//! │                  │                                 queue (async)    │
//! │                  └─► Err (no mutation, no ops)                      │
//! │                                                                     │
//! │  Availability check is synchronous against a cached StockSnapshot:  │
//! │                                                                     │
//! │     total_available = snapshot quantity + quantity already in cart  │
//! │                                                                     │
//! │  The in-cart term matters: units already in the cart were           │
//! │  provisionally removed from the snapshot figure by an earlier       │
//! │  enqueued reduction, so they must be added back or a line could     │
//! │  never be increased.                                                │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every successful mutation returns the signed stock operations the caller
//! must enqueue; a rejected mutation changes nothing and returns none.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::StockKey;
use crate::types::StockOp;
use crate::MAX_CART_ITEMS;
use crate::MAX_ITEM_QUANTITY;

// =============================================================================
// Stock Snapshot
// =============================================================================

/// A locally cached view of per-bucket stock quantities, supplied by the
/// inventory collaborator. Reads are synchronous; staleness is bounded by
/// how often the caller refreshes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockSnapshot {
    quantities: HashMap<StockKey, i64>,
}

impl StockSnapshot {
    pub fn new() -> Self {
        StockSnapshot::default()
    }

    /// Records the known quantity for one stock bucket.
    pub fn set(&mut self, key: StockKey, quantity: i64) {
        self.quantities.insert(key, quantity);
    }

    /// Available units for a bucket; unknown buckets read as zero.
    pub fn available(&self, key: &StockKey) -> i64 {
        self.quantities.get(key).copied().unwrap_or(0)
    }
}

impl FromIterator<(StockKey, i64)> for StockSnapshot {
    fn from_iter<I: IntoIterator<Item = (StockKey, i64)>>(iter: I) -> Self {
        StockSnapshot {
            quantities: iter.into_iter().collect(),
        }
    }
}

// =============================================================================
// Cart Item
// =============================================================================

/// One line in the cart.
///
/// `unit_price_cents` is the current effective price; `original_price_cents`
/// is the immutable list-price baseline. Discounts (group-level and
/// variant-level, both in basis points) derive `discounted_price_cents`
/// from the original price; the derived figure is what refunds later treat
/// as the actual price paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Unique line id, assigned when the line is created.
    pub id: String,
    pub stock_id: String,
    pub color: String,
    pub size: String,
    /// Units in the cart. Always > 0.
    pub quantity: i64,
    /// Current effective unit price.
    pub unit_price_cents: i64,
    /// Immutable list-price baseline.
    pub original_price_cents: i64,
    /// Discount applied to all variants of this stock item, in bps.
    pub group_discount_bps: u32,
    /// Discount applied to this line only, in bps.
    pub variant_discount_bps: u32,
    /// Derived: original price after group then variant discount.
    pub discounted_price_cents: Option<i64>,
}

impl CartItem {
    /// The price per unit the customer will actually pay.
    #[inline]
    pub fn actual_price_paid(&self) -> Money {
        Money::from_cents(self.discounted_price_cents.unwrap_or(self.unit_price_cents))
    }

    pub fn stock_key(&self) -> StockKey {
        StockKey::new(
            self.stock_id.clone(),
            self.color.clone(),
            self.size.clone(),
        )
    }

    /// Recomputes the derived discounted price from the immutable baseline.
    ///
    /// Group and variant discounts compound; each application rounds
    /// half-up once. With both at zero the derived price clears back to
    /// `None`.
    fn recompute_discounted_price(&mut self) {
        if self.group_discount_bps == 0 && self.variant_discount_bps == 0 {
            self.discounted_price_cents = None;
            return;
        }
        let discounted = Money::from_cents(self.original_price_cents)
            .apply_discount_bps(self.group_discount_bps)
            .apply_discount_bps(self.variant_discount_bps);
        self.discounted_price_cents = Some(discounted.cents());
    }
}

// =============================================================================
// Cart
// =============================================================================

/// The shopping cart.
///
/// ## Invariants
/// - Lines are unique by (stock_id, color, size); adding the same variant
///   again increases its quantity
/// - Quantity is always > 0 (setting it to 0 removes the line)
/// - Every successful mutation returns the stock ops to enqueue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self {
        Cart { items: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total units of one stock bucket currently in the cart.
    pub fn quantity_in_cart(&self, key: &StockKey) -> i64 {
        self.items
            .iter()
            .filter(|i| &i.stock_key() == key)
            .map(|i| i.quantity)
            .sum()
    }

    /// Σ effective unit price × quantity. The transaction subtotal at
    /// checkout; line-level discounts show up in the derived discounted
    /// prices, not here.
    pub fn subtotal_cents(&self) -> i64 {
        self.items
            .iter()
            .map(|i| i.unit_price_cents * i.quantity)
            .sum()
    }

    /// Σ actual price paid × quantity - what the items really cost after
    /// line discounts, before the cart-level discount and tax.
    pub fn discounted_subtotal_cents(&self) -> i64 {
        self.items
            .iter()
            .map(|i| i.actual_price_paid().cents() * i.quantity)
            .sum()
    }

    /// Rejects an increase that is not covered by physical stock.
    ///
    /// `total_available = snapshot + already in this cart`, because the
    /// in-cart units were already provisionally deducted from the snapshot
    /// by earlier enqueued reductions.
    fn check_available(
        &self,
        snapshot: &StockSnapshot,
        key: &StockKey,
        new_cart_quantity: i64,
    ) -> CoreResult<()> {
        let total_available = snapshot.available(key) + self.quantity_in_cart(key);
        if new_cart_quantity > total_available {
            return Err(CoreError::InsufficientStock {
                stock_key: key.to_string(),
                available: total_available,
                requested: new_cart_quantity,
            });
        }
        Ok(())
    }

    /// Adds units of a variant to the cart, merging into an existing line
    /// for the same (stock_id, color, size).
    ///
    /// Returns the reduction to enqueue against the stock ledger.
    pub fn add_item(
        &mut self,
        snapshot: &StockSnapshot,
        id: impl Into<String>,
        key: StockKey,
        quantity: i64,
        unit_price_cents: i64,
    ) -> CoreResult<StockOp> {
        if quantity <= 0 || quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::Validation(
                crate::error::ValidationError::OutOfRange {
                    field: "quantity",
                    min: 1,
                    max: MAX_ITEM_QUANTITY,
                },
            ));
        }

        if let Some(position) = self.items.iter().position(|i| i.stock_key() == key) {
            let new_quantity = self.items[position].quantity + quantity;
            self.check_available(snapshot, &key, new_quantity)?;
            self.items[position].quantity = new_quantity;
            return Ok(StockOp::Reduce { key, quantity });
        }

        if self.items.len() >= MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS });
        }

        self.check_available(snapshot, &key, quantity)?;
        self.items.push(CartItem {
            id: id.into(),
            stock_id: key.stock_id.clone(),
            color: key.color.clone(),
            size: key.size.clone(),
            quantity,
            unit_price_cents,
            original_price_cents: unit_price_cents,
            group_discount_bps: 0,
            variant_discount_bps: 0,
            discounted_price_cents: None,
        });
        Ok(StockOp::Reduce { key, quantity })
    }

    /// Sets a line's quantity, returning the signed delta to enqueue.
    ///
    /// Quantity 0 removes the line. Increases are validated against the
    /// snapshot; decreases always succeed. `Ok(None)` means no change.
    pub fn set_quantity(
        &mut self,
        snapshot: &StockSnapshot,
        item_id: &str,
        quantity: i64,
    ) -> CoreResult<Option<StockOp>> {
        if quantity == 0 {
            return self.remove_item(item_id).map(Some);
        }
        if quantity < 0 || quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::Validation(
                crate::error::ValidationError::OutOfRange {
                    field: "quantity",
                    min: 0,
                    max: MAX_ITEM_QUANTITY,
                },
            ));
        }

        let position = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| CoreError::ItemNotInCart {
                item_id: item_id.to_string(),
            })?;
        let key = self.items[position].stock_key();
        let current = self.items[position].quantity;

        let delta = quantity - current;
        if delta == 0 {
            return Ok(None);
        }
        if delta > 0 {
            // Other lines of the same bucket count toward availability too.
            let new_bucket_quantity = self.quantity_in_cart(&key) + delta;
            self.check_available(snapshot, &key, new_bucket_quantity)?;
        }

        self.items[position].quantity = quantity;

        Ok(Some(if delta > 0 {
            StockOp::Reduce { key, quantity: delta }
        } else {
            StockOp::Restore { key, quantity: -delta }
        }))
    }

    /// Removes a line, returning the restoration to enqueue.
    pub fn remove_item(&mut self, item_id: &str) -> CoreResult<StockOp> {
        let position = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| CoreError::ItemNotInCart {
                item_id: item_id.to_string(),
            })?;
        let item = self.items.remove(position);
        Ok(StockOp::Restore {
            key: item.stock_key(),
            quantity: item.quantity,
        })
    }

    /// Empties the cart, returning one restoration per line.
    pub fn clear(&mut self) -> Vec<StockOp> {
        self.items
            .drain(..)
            .map(|item| StockOp::Restore {
                key: StockKey::new(item.stock_id, item.color, item.size),
                quantity: item.quantity,
            })
            .collect()
    }

    /// Applies a discount to every line of a stock item (all its variants).
    pub fn set_group_discount(&mut self, stock_id: &str, discount_bps: u32) -> CoreResult<()> {
        validate_discount_bps(discount_bps)?;
        let mut touched = false;
        for item in self.items.iter_mut().filter(|i| i.stock_id == stock_id) {
            item.group_discount_bps = discount_bps;
            item.recompute_discounted_price();
            touched = true;
        }
        if !touched {
            return Err(CoreError::ItemNotInCart {
                item_id: stock_id.to_string(),
            });
        }
        Ok(())
    }

    /// Applies a discount to a single line.
    pub fn set_variant_discount(&mut self, item_id: &str, discount_bps: u32) -> CoreResult<()> {
        validate_discount_bps(discount_bps)?;
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| CoreError::ItemNotInCart {
                item_id: item_id.to_string(),
            })?;
        item.variant_discount_bps = discount_bps;
        item.recompute_discounted_price();
        Ok(())
    }
}

fn validate_discount_bps(discount_bps: u32) -> CoreResult<()> {
    if discount_bps > 10000 {
        return Err(CoreError::Validation(
            crate::error::ValidationError::OutOfRange {
                field: "discount_bps",
                min: 0,
                max: 10000,
            },
        ));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
