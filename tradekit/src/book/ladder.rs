use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    book::BookError,
    model::{
        enums::OrderSide,
        value::{Price, Quantity},
    },
};

/// An order resting in (or aggressing into) a book ladder.
#[derive(Clone, Debug, PartialEq)]
pub struct BookOrder {
    pub id: String,
    pub side: OrderSide,
    pub price: Price,
    pub volume: Quantity,
}

impl BookOrder {
    pub fn new(side: OrderSide, price: Price, volume: Quantity) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            side,
            price,
            volume,
        }
    }

    pub fn with_id(id: impl Into<String>, side: OrderSide, price: Price, volume: Quantity) -> Self {
        Self {
            id: id.into(),
            side,
            price,
            volume,
        }
    }
}

/// All orders resting at a single price, in time priority (insertion order).
#[derive(Clone, Debug, PartialEq)]
pub struct BookLevel {
    pub price: Price,
    pub orders: Vec<BookOrder>,
}

impl BookLevel {
    fn new(price: Price) -> Self {
        Self {
            price,
            orders: Vec::new(),
        }
    }

    /// The level's total volume: the sum of its orders' volumes.
    pub fn volume(&self) -> Decimal {
        self.orders.iter().map(|o| o.volume.value()).sum()
    }
}

/// One side of an order book: price levels in sorted order with order-level
/// granularity. `reverse == true` denotes descending price order (bids).
///
/// Levels are kept in an ordered map keyed by price, so mutations at a known
/// level are O(log L) and the best level is O(1) at either end.
#[derive(Debug)]
pub struct Ladder {
    pub reverse: bool,
    pub price_precision: u8,
    pub size_precision: u8,
    levels: BTreeMap<Decimal, BookLevel>,
    // order id -> level key, so update/delete find their level directly.
    order_index: HashMap<String, Decimal>,
}

impl Ladder {
    pub fn new(reverse: bool, price_precision: u8, size_precision: u8) -> Self {
        Self {
            reverse,
            price_precision,
            size_precision,
            levels: BTreeMap::new(),
            order_index: HashMap::new(),
        }
    }

    fn normalize_price(&self, price: Price) -> Price {
        Price::new(price.value(), self.price_precision).expect("ladder price precision")
    }

    fn normalize_volume(&self, volume: Quantity) -> Quantity {
        Quantity::new(volume.value(), self.size_precision).expect("ladder size precision")
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Adds an order, creating its level if absent. Time priority within the
    /// level is preserved by appending.
    pub fn add(&mut self, order: BookOrder) -> Result<(), BookError> {
        if self.order_index.contains_key(&order.id) {
            return Err(BookError::OrderAlreadyExists(order.id));
        }
        let price = self.normalize_price(order.price);
        let volume = self.normalize_volume(order.volume);
        let key = price.value();
        let level = self
            .levels
            .entry(key)
            .or_insert_with(|| BookLevel::new(price));
        level.orders.push(BookOrder {
            id: order.id.clone(),
            side: order.side,
            price,
            volume,
        });
        self.order_index.insert(order.id, key);
        Ok(())
    }

    /// Adjusts an existing order's volume (zero volume removes it); a changed
    /// price moves the order to the back of its new level.
    pub fn update(&mut self, order: BookOrder) -> Result<(), BookError> {
        let key = *self
            .order_index
            .get(&order.id)
            .ok_or_else(|| BookError::OrderNotFound(order.id.clone()))?;

        let volume = self.normalize_volume(order.volume);
        if volume.is_zero() {
            return self.delete(&order.id);
        }

        let new_key = self.normalize_price(order.price).value();
        if new_key != key {
            self.delete(&order.id)?;
            return self.add(order);
        }

        let level = self.levels.get_mut(&key).expect("indexed level exists");
        let resting = level
            .orders
            .iter_mut()
            .find(|o| o.id == order.id)
            .expect("indexed order exists");
        resting.volume = volume;
        Ok(())
    }

    /// Removes an order, dropping its level if it becomes empty.
    pub fn delete(&mut self, order_id: &str) -> Result<(), BookError> {
        let key = self
            .order_index
            .remove(order_id)
            .ok_or_else(|| BookError::OrderNotFound(order_id.to_string()))?;
        let level = self.levels.get_mut(&key).expect("indexed level exists");
        level.orders.retain(|o| o.id != order_id);
        if level.orders.is_empty() {
            self.levels.remove(&key);
        }
        Ok(())
    }

    /// Returns the levels in the ladder's natural order: ascending price for
    /// asks, descending for bids.
    pub fn levels(&self) -> Vec<&BookLevel> {
        if self.reverse {
            self.levels.values().rev().collect()
        } else {
            self.levels.values().collect()
        }
    }

    /// Returns the best level, or `None` for an empty ladder.
    pub fn top(&self) -> Option<&BookLevel> {
        if self.reverse {
            self.levels.values().next_back()
        } else {
            self.levels.values().next()
        }
    }

    pub fn prices(&self) -> Vec<Price> {
        self.levels().iter().map(|level| level.price).collect()
    }

    pub fn volumes(&self) -> Vec<Decimal> {
        self.levels().iter().map(|level| level.volume()).collect()
    }

    /// Cumulative `price * volume` through each level, in ladder order.
    pub fn exposures(&self) -> Vec<Decimal> {
        let mut cumulative = Decimal::ZERO;
        self.levels()
            .iter()
            .map(|level| {
                cumulative += level.price.value() * level.volume();
                cumulative
            })
            .collect()
    }

    /// Sum of all order volumes across all levels.
    pub fn total_volume(&self) -> Decimal {
        self.levels.values().map(|level| level.volume()).sum()
    }

    fn crosses(&self, incoming: Price, level: Price) -> bool {
        if self.reverse {
            // Bids: a sell crosses while its price is at or below the level.
            incoming <= level
        } else {
            // Asks: a buy crosses while its price is at or above the level.
            incoming >= level
        }
    }

    /// Total volume the given price crosses, without consuming anything.
    pub fn crossable_volume(&self, price: Price) -> Decimal {
        self.levels()
            .iter()
            .take_while(|level| self.crosses(price, level.price))
            .map(|level| level.volume())
            .sum()
    }

    /// Walks the ladder in natural order, consuming resting orders in time
    /// priority while the incoming order's price crosses, and returns the
    /// `(price, quantity)` fills that would result. The ladder itself is not
    /// mutated. Emitted prices and quantities carry the ladder's precisions.
    pub fn simulate_order_fills(&self, order: &BookOrder) -> Vec<(Price, Quantity)> {
        let mut fills = Vec::new();
        let mut remaining = self.normalize_volume(order.volume);

        for level in self.levels() {
            if remaining.is_zero() || !self.crosses(order.price, level.price) {
                break;
            }
            for resting in &level.orders {
                if remaining.is_zero() {
                    break;
                }
                let taken = remaining.min(resting.volume);
                fills.push((level.price, taken));
                remaining -= taken;
            }
        }
        fills
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn order(price: Decimal, volume: Decimal, side: OrderSide) -> BookOrder {
        BookOrder::new(
            side,
            Price::new(price, 4).unwrap(),
            Quantity::new(volume, 4).unwrap(),
        )
    }

    fn order_with_id(
        id: &str,
        price: Decimal,
        volume: Decimal,
        side: OrderSide,
    ) -> BookOrder {
        BookOrder::with_id(
            id,
            side,
            Price::new(price, 4).unwrap(),
            Quantity::new(volume, 4).unwrap(),
        )
    }

    /// The standard ask-side fixture: levels at 15, 16 and 17.
    fn asks() -> Ladder {
        let mut ladder = Ladder::new(false, 4, 4);
        ladder.add(order(dec!(15), dec!(10), OrderSide::Sell)).unwrap();
        ladder.add(order(dec!(16), dec!(20), OrderSide::Sell)).unwrap();
        ladder.add(order(dec!(17), dec!(30), OrderSide::Sell)).unwrap();
        ladder
    }

    #[test]
    fn insert_aggregates_levels() {
        let mut ladder = Ladder::new(false, 0, 0);
        for (price, volume) in [
            (dec!(100), dec!(10)),
            (dec!(100), dec!(1)),
            (dec!(105), dec!(20)),
            (dec!(100), dec!(10)),
            (dec!(101), dec!(5)),
            (dec!(101), dec!(5)),
        ] {
            ladder
                .add(BookOrder::new(
                    OrderSide::Buy,
                    Price::new(price, 0).unwrap(),
                    Quantity::new(volume, 0).unwrap(),
                ))
                .unwrap();
        }

        let result: Vec<_> = ladder
            .levels()
            .iter()
            .map(|level| (level.price.value(), level.volume()))
            .collect();
        assert_eq!(
            result,
            vec![
                (dec!(100), dec!(21)),
                (dec!(101), dec!(10)),
                (dec!(105), dec!(20)),
            ]
        );
    }

    #[test]
    fn reverse_ladder_orders_descending() {
        let mut bids = Ladder::new(true, 0, 0);
        bids.add(order_with_id("1", dec!(100), dec!(10), OrderSide::Buy)).unwrap();
        bids.add(order_with_id("2", dec!(102), dec!(5), OrderSide::Buy)).unwrap();
        bids.add(order_with_id("3", dec!(101), dec!(7), OrderSide::Buy)).unwrap();

        let prices: Vec<_> = bids.prices().iter().map(|p| p.value()).collect();
        assert_eq!(prices, vec![dec!(102), dec!(101), dec!(100)]);
        assert_eq!(bids.top().unwrap().price.value(), dec!(102));
    }

    #[test]
    fn delete_individual_order() {
        let mut ladder = Ladder::new(true, 4, 4);
        ladder.add(order_with_id("1", dec!(100), dec!(10), OrderSide::Buy)).unwrap();
        ladder.add(order_with_id("2", dec!(100), dec!(5), OrderSide::Buy)).unwrap();

        ladder.delete("1").unwrap();
        assert_eq!(ladder.volumes(), vec![dec!(5)]);
    }

    #[test]
    fn delete_last_order_drops_level() {
        let mut ladder = Ladder::new(true, 4, 4);
        ladder.add(order_with_id("1", dec!(100), dec!(10), OrderSide::Buy)).unwrap();
        ladder.delete("1").unwrap();
        assert!(ladder.levels().is_empty());
    }

    #[test]
    fn update_adjusts_level_volume() {
        let mut ladder = Ladder::new(true, 4, 4);
        ladder.add(order_with_id("1", dec!(100), dec!(10), OrderSide::Buy)).unwrap();
        ladder
            .update(order_with_id("1", dec!(100), dec!(20), OrderSide::Buy))
            .unwrap();
        assert_eq!(ladder.levels()[0].volume(), dec!(20));
    }

    #[test]
    fn update_to_zero_volume_removes_order_and_level() {
        let mut ladder = Ladder::new(true, 4, 4);
        ladder.add(order_with_id("1", dec!(100), dec!(10), OrderSide::Buy)).unwrap();
        ladder
            .update(order_with_id("1", dec!(100), dec!(0), OrderSide::Buy))
            .unwrap();
        assert!(ladder.prices().is_empty());
    }

    #[test]
    fn update_of_unknown_order_is_rejected() {
        let mut ladder = Ladder::new(true, 4, 4);
        let result = ladder.update(order_with_id("missing", dec!(100), dec!(1), OrderSide::Buy));
        assert!(matches!(result, Err(BookError::OrderNotFound(_))));
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let mut ladder = Ladder::new(false, 4, 4);
        ladder.add(order_with_id("1", dec!(15), dec!(1), OrderSide::Sell)).unwrap();
        let result = ladder.add(order_with_id("1", dec!(16), dec!(1), OrderSide::Sell));
        assert!(matches!(result, Err(BookError::OrderAlreadyExists(_))));
    }

    #[test]
    fn exposures_are_cumulative() {
        let mut ladder = Ladder::new(false, 4, 4);
        ladder.add(order(dec!(100), dec!(10), OrderSide::Sell)).unwrap();
        ladder.add(order(dec!(101), dec!(10), OrderSide::Sell)).unwrap();
        ladder.add(order(dec!(105), dec!(5), OrderSide::Sell)).unwrap();
        assert_eq!(
            ladder.exposures(),
            vec![dec!(1000), dec!(2010), dec!(2535)]
        );
    }

    #[test]
    fn simulate_fills_no_cross() {
        let fills = asks().simulate_order_fills(&order(dec!(10), dec!(10), OrderSide::Buy));
        assert!(fills.is_empty());
    }

    #[test]
    fn simulate_fills_single_level() {
        let fills = asks().simulate_order_fills(&order(dec!(15), dec!(10), OrderSide::Buy));
        assert_eq!(
            fills,
            vec![(
                Price::new(dec!(15), 4).unwrap(),
                Quantity::new(dec!(10), 4).unwrap()
            )]
        );
    }

    #[test]
    fn simulate_fills_multiple_levels() {
        let fills = asks().simulate_order_fills(&order(dec!(20), dec!(20), OrderSide::Buy));
        assert_eq!(
            fills,
            vec![
                (
                    Price::new(dec!(15), 4).unwrap(),
                    Quantity::new(dec!(10), 4).unwrap()
                ),
                (
                    Price::new(dec!(16), 4).unwrap(),
                    Quantity::new(dec!(10), 4).unwrap()
                ),
            ]
        );
    }

    #[test]
    fn simulate_fills_whole_ladder() {
        let fills = asks().simulate_order_fills(&order(dec!(100), dec!(1000), OrderSide::Buy));
        assert_eq!(
            fills,
            vec![
                (
                    Price::new(dec!(15), 4).unwrap(),
                    Quantity::new(dec!(10), 4).unwrap()
                ),
                (
                    Price::new(dec!(16), 4).unwrap(),
                    Quantity::new(dec!(20), 4).unwrap()
                ),
                (
                    Price::new(dec!(17), 4).unwrap(),
                    Quantity::new(dec!(30), 4).unwrap()
                ),
            ]
        );
    }

    #[test]
    fn simulate_fills_respects_time_priority_within_level() {
        let mut ladder = Ladder::new(false, 4, 4);
        ladder.add(order_with_id("1", dec!(15), dec!(1), OrderSide::Sell)).unwrap();
        ladder.add(order_with_id("2", dec!(16), dec!(2), OrderSide::Sell)).unwrap();
        ladder.add(order_with_id("3", dec!(16), dec!(3), OrderSide::Sell)).unwrap();
        ladder.add(order_with_id("4", dec!(20), dec!(10), OrderSide::Sell)).unwrap();

        let fills = ladder.simulate_order_fills(&order(dec!(16.5), dec!(4), OrderSide::Buy));
        assert_eq!(
            fills,
            vec![
                (
                    Price::new(dec!(15), 4).unwrap(),
                    Quantity::new(dec!(1), 4).unwrap()
                ),
                (
                    Price::new(dec!(16), 4).unwrap(),
                    Quantity::new(dec!(2), 4).unwrap()
                ),
                (
                    Price::new(dec!(16), 4).unwrap(),
                    Quantity::new(dec!(1), 4).unwrap()
                ),
            ]
        );
    }

    #[test]
    fn simulate_fills_never_exceed_order_volume() {
        let ladder = asks();
        let fills = ladder.simulate_order_fills(&order(dec!(100), dec!(25), OrderSide::Buy));
        let total: Decimal = fills.iter().map(|(_, qty)| qty.value()).sum();
        assert_eq!(total, dec!(25));
    }

    #[test]
    fn total_volume_matches_order_sum() {
        let ladder = asks();
        assert_eq!(ladder.total_volume(), dec!(60));
    }
}
