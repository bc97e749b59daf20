use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;

use crate::model::{
    enums::{OrderSide, PositionSide},
    events::Event,
    identifiers::{InstrumentId, PositionId},
    value::Quantity,
};

/// A net position in one instrument, updated from fill events.
///
/// Positions hold ids rather than order references; the execution engine owns
/// the orders themselves.
#[derive(Clone, Debug, PartialEq)]
pub struct Position {
    pub id: PositionId,
    pub instrument_id: InstrumentId,
    pub side: PositionSide,
    pub quantity: Quantity,
    pub avg_px_open: Decimal,
    pub realized_pnl: Decimal,
}

impl Position {
    pub fn new(id: PositionId, instrument_id: InstrumentId, size_precision: u8) -> Self {
        Self {
            id,
            instrument_id,
            side: PositionSide::Flat,
            quantity: Quantity::zero(size_precision),
            avg_px_open: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.side == PositionSide::Flat
    }

    /// Returns the signed net quantity: positive long, negative short.
    pub fn signed_qty(&self) -> Decimal {
        match self.side {
            PositionSide::Short => -self.quantity.value(),
            _ => self.quantity.value(),
        }
    }

    /// Applies a fill to the position: opening, increasing, reducing or
    /// flipping it. Realized PnL accrues in quote currency units on any
    /// reducing portion.
    pub fn apply_fill(&mut self, event: &Event) {
        let (side, last_qty, last_px) = match event {
            Event::OrderFilled {
                side,
                last_qty,
                last_px,
                ..
            } => (*side, *last_qty, *last_px),
            _ => return,
        };

        let fill_sign = match side {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => Decimal::NEGATIVE_ONE,
        };
        let current = self.signed_qty();
        let new_net = current + fill_sign * last_qty.value();

        let same_direction = current.is_zero() || (current.signum() == fill_sign);
        if same_direction {
            // Opening or increasing: average in the new fill.
            let prev_abs = current.abs();
            let new_abs = prev_abs + last_qty.value();
            self.avg_px_open =
                (self.avg_px_open * prev_abs + last_px.value() * last_qty.value()) / new_abs;
        } else {
            // Reducing (possibly through flat into a flip).
            let reduced = last_qty.value().min(current.abs());
            let direction = current.signum();
            self.realized_pnl += (last_px.value() - self.avg_px_open) * reduced * direction;
            if new_net.signum() == fill_sign && !new_net.is_zero() {
                // Flipped through flat: the remainder opens at the fill price.
                self.avg_px_open = last_px.value();
            }
        }

        self.side = if new_net.is_zero() {
            PositionSide::Flat
        } else if new_net > Decimal::ZERO {
            PositionSide::Long
        } else {
            PositionSide::Short
        };
        self.quantity = Quantity::new(new_net.abs(), self.quantity.precision())
            .expect("absolute quantity is non-negative");
        if self.is_flat() {
            self.avg_px_open = Decimal::ZERO;
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::model::{
        enums::LiquiditySide,
        identifiers::{AccountId, ClientOrderId, ExecutionId, Symbol, Venue, VenueOrderId},
        value::{Currency, Money, Price},
    };

    fn audusd() -> InstrumentId {
        InstrumentId::new(Symbol::new("AUD/USD"), Venue::new("SIM"))
    }

    fn fill(side: OrderSide, qty: Decimal, px: Decimal) -> Event {
        let qty = Quantity::new(qty, 0).unwrap();
        Event::order_filled(
            AccountId::new("SIM-001"),
            ClientOrderId::new("O-1"),
            VenueOrderId::new("1"),
            ExecutionId::new("E-1"),
            audusd(),
            side,
            qty,
            Price::new(px, 5).unwrap(),
            qty,
            Quantity::zero(0),
            LiquiditySide::Taker,
            Money::zero(Currency::from_code("USD").unwrap()),
            0,
        )
    }

    #[test]
    fn open_and_close_realizes_pnl() {
        let mut position = Position::new(PositionId::new("P-1"), audusd(), 0);
        position.apply_fill(&fill(OrderSide::Buy, dec!(100), dec!(1.00000)));
        assert_eq!(position.side, PositionSide::Long);
        assert_eq!(position.avg_px_open, dec!(1.00000));

        position.apply_fill(&fill(OrderSide::Sell, dec!(100), dec!(1.10000)));
        assert!(position.is_flat());
        assert_eq!(position.realized_pnl, dec!(10.00000));
    }

    #[test]
    fn increase_averages_entry_price() {
        let mut position = Position::new(PositionId::new("P-1"), audusd(), 0);
        position.apply_fill(&fill(OrderSide::Buy, dec!(100), dec!(1.0)));
        position.apply_fill(&fill(OrderSide::Buy, dec!(100), dec!(2.0)));
        assert_eq!(position.avg_px_open, dec!(1.5));
        assert_eq!(position.quantity.value(), dec!(200));
    }

    #[test]
    fn flip_through_flat_opens_at_fill_price() {
        let mut position = Position::new(PositionId::new("P-1"), audusd(), 0);
        position.apply_fill(&fill(OrderSide::Buy, dec!(100), dec!(1.0)));
        position.apply_fill(&fill(OrderSide::Sell, dec!(150), dec!(1.2)));
        assert_eq!(position.side, PositionSide::Short);
        assert_eq!(position.quantity.value(), dec!(50));
        assert_eq!(position.avg_px_open, dec!(1.2));
        // PnL realized on the closing 100.
        assert_eq!(position.realized_pnl, dec!(20.0));
    }
}
