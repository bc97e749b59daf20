use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{
    identifiers::InstrumentId,
    value::{Currency, Price, Quantity},
    ValidationError,
};

/// Reference data for a tradable instrument. Immutable once registered with
/// an engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub quote_currency: Currency,
    pub price_precision: u8,
    pub size_precision: u8,
    pub tick_size: Decimal,
    pub is_inverse: bool,
}

impl Instrument {
    pub fn new(
        id: InstrumentId,
        quote_currency: Currency,
        price_precision: u8,
        size_precision: u8,
        tick_size: Decimal,
        is_inverse: bool,
    ) -> Result<Self, ValidationError> {
        if tick_size <= Decimal::ZERO {
            return Err(ValidationError::Invalid(format!(
                "tick size must be positive, was {tick_size}"
            )));
        }
        if tick_size.scale() as u8 > price_precision {
            return Err(ValidationError::Invalid(format!(
                "tick size {tick_size} is finer than price precision {price_precision}"
            )));
        }
        Ok(Self {
            id,
            quote_currency,
            price_precision,
            size_precision,
            tick_size,
            is_inverse,
        })
    }

    /// Constructs a price at this instrument's price precision.
    pub fn make_price(&self, value: Decimal) -> Result<Price, ValidationError> {
        Price::new(value, self.price_precision)
    }

    /// Constructs a quantity at this instrument's size precision.
    pub fn make_qty(&self, value: Decimal) -> Result<Quantity, ValidationError> {
        Quantity::new(value, self.size_precision)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::model::identifiers::{Symbol, Venue};

    fn audusd_id() -> InstrumentId {
        InstrumentId::new(Symbol::new("AUD/USD"), Venue::new("SIM"))
    }

    #[test]
    fn rejects_tick_size_finer_than_precision() {
        let result = Instrument::new(
            audusd_id(),
            Currency::from_code("USD").unwrap(),
            2,
            0,
            dec!(0.00001),
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn make_price_uses_instrument_precision() {
        let instrument = Instrument::new(
            audusd_id(),
            Currency::from_code("USD").unwrap(),
            5,
            0,
            dec!(0.00001),
            false,
        )
        .unwrap();
        let price = instrument.make_price(dec!(1.0)).unwrap();
        assert_eq!(price.to_string(), "1.00000");
    }
}
