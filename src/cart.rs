//! Pricing and receipts.
//!
//! Prices are whole currency units. The price table is consulted only when a
//! receipt is built; stabilization never looks at prices.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::stabilizer::StableCart;

/// Unit price per product class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable(BTreeMap<String, u64>);

impl PriceTable {
    pub fn new(prices: BTreeMap<String, u64>) -> Self {
        Self(prices)
    }

    pub fn unit_price(&self, class: &str) -> Option<u64> {
        self.0.get(class).copied()
    }

    pub fn set(&mut self, class: impl Into<String>, unit_price: u64) {
        self.0.insert(class.into(), unit_price);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        let mut table = Self(BTreeMap::new());
        table.set("Coke", 100);
        table.set("Dettol", 25);
        table.set("Wai Wai", 20);
        table.set("Ariel", 175);
        table
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReceiptLine {
    pub class: String,
    pub quantity: u32,
    /// `None` when the class has no entry in the price table.
    pub unit_price: Option<u64>,
    pub line_total: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub lines: Vec<ReceiptLine>,
    /// Sum over priced lines only.
    pub total: u64,
}

impl Receipt {
    pub fn build(cart: &StableCart, prices: &PriceTable) -> Self {
        let mut lines = Vec::with_capacity(cart.len());
        let mut total = 0u64;
        for (class, quantity) in cart.iter() {
            let unit_price = prices.unit_price(class);
            let line_total = unit_price.map(|price| price.saturating_mul(u64::from(quantity)));
            match line_total {
                Some(amount) => total = total.saturating_add(amount),
                None => log::warn!("no price for '{}'; excluded from total", class),
            }
            lines.push(ReceiptLine {
                class: class.to_string(),
                quantity,
                unit_price,
                line_total,
            });
        }
        Self { lines, total }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn unpriced(&self) -> impl Iterator<Item = &ReceiptLine> {
        self.lines.iter().filter(|line| line.unit_price.is_none())
    }
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            match line.line_total {
                Some(amount) => writeln!(f, "{} x {}  Rs. {}", line.class, line.quantity, amount)?,
                None => writeln!(f, "{} x {}  (no price)", line.class, line.quantity)?,
            }
        }
        write!(f, "Total  Rs. {}", self.total)
    }
}
