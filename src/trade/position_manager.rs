//! Accounting ledger for the buys and sells of a single sniping task.
//!
//! Amounts are raw token units held as `Decimal`; nothing here performs I/O.

use rust_decimal::Decimal;

/// Tracks invested capital, returned capital and the base-token position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionManager {
    total_investment: Decimal,
    total_return: Decimal,
    current_position: Decimal,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a buy of `base_amount` paid with `quote_amount`.
    pub fn buy(&mut self, quote_amount: Decimal, base_amount: Decimal) {
        self.total_investment += quote_amount;
        self.current_position += base_amount;
    }

    /// Record a sell of `base_amount` that returned `quote_amount`.
    pub fn sell(&mut self, base_amount: Decimal, quote_amount: Decimal) {
        self.total_return += quote_amount;
        self.current_position -= base_amount;
    }

    pub fn total_investment(&self) -> Decimal {
        self.total_investment
    }

    pub fn total_return(&self) -> Decimal {
        self.total_return
    }

    pub fn current_position(&self) -> Decimal {
        self.current_position
    }

    /// Realized profit and loss.
    pub fn pnl(&self) -> Decimal {
        self.total_return - self.total_investment
    }

    /// Realized return on investment, zero when nothing was invested.
    pub fn roi(&self) -> Decimal {
        self.ratio_of_investment(self.pnl())
    }

    /// Profit and loss if the remaining position were valued at `mark_price`.
    pub fn unrealized_pnl(&self, mark_price: Decimal) -> Decimal {
        self.total_return + self.current_position * mark_price - self.total_investment
    }

    /// Unrealized return on investment, zero when nothing was invested.
    pub fn unrealized_roi(&self, mark_price: Decimal) -> Decimal {
        self.ratio_of_investment(self.unrealized_pnl(mark_price))
    }

    fn ratio_of_investment(&self, amount: Decimal) -> Decimal {
        amount
            .checked_div(self.total_investment)
            .unwrap_or(Decimal::ZERO)
    }
}
