use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::{
    identifiers::AccountId,
    value::{Currency, Money},
    ValidationError,
};

/// A per-currency balance. Invariant: `free + locked == total`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AccountBalance {
    pub currency: Currency,
    pub total: Money,
    pub free: Money,
    pub locked: Money,
}

impl AccountBalance {
    pub fn new(total: Money, free: Money, locked: Money) -> Result<Self, ValidationError> {
        if free.currency() != total.currency() || locked.currency() != total.currency() {
            return Err(ValidationError::Invalid(
                "balance components must share one currency".to_string(),
            ));
        }
        if free.value() + locked.value() != total.value() {
            return Err(ValidationError::Invalid(format!(
                "balance invariant violated: free {free} + locked {locked} != total {total}"
            )));
        }
        Ok(Self {
            currency: total.currency(),
            total,
            free,
            locked,
        })
    }

    pub fn unlocked(total: Money) -> Self {
        Self {
            currency: total.currency(),
            total,
            free: total,
            locked: Money::zero(total.currency()),
        }
    }
}

/// A venue account holding balances per currency.
#[derive(Clone, Debug, PartialEq)]
pub struct Account {
    pub id: AccountId,
    balances: HashMap<Currency, AccountBalance>,
}

impl Account {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            balances: HashMap::new(),
        }
    }

    pub fn balance(&self, currency: Currency) -> Option<&AccountBalance> {
        self.balances.get(&currency)
    }

    pub fn balances(&self) -> Vec<AccountBalance> {
        let mut balances: Vec<_> = self.balances.values().copied().collect();
        balances.sort_by_key(|b| b.currency.code().to_string());
        balances
    }

    /// Replaces the balances wholesale, as reported by an `AccountState`
    /// event.
    pub fn apply_state(&mut self, balances: &[AccountBalance]) {
        self.balances = balances.iter().map(|b| (b.currency, *b)).collect();
    }

    /// Moves an amount from free to locked, e.g. as margin for a working
    /// order.
    pub fn lock(&mut self, amount: Money) -> Result<(), ValidationError> {
        let balance = self.balances.get_mut(&amount.currency()).ok_or_else(|| {
            ValidationError::Invalid(format!("no balance in {}", amount.currency()))
        })?;
        if balance.free.value() < amount.value() {
            return Err(ValidationError::Invalid(format!(
                "insufficient free balance: {} < {}",
                balance.free, amount
            )));
        }
        balance.free = balance.free - amount;
        balance.locked = balance.locked + amount;
        Ok(())
    }

    /// Releases a previously locked amount back to free.
    pub fn unlock(&mut self, amount: Money) -> Result<(), ValidationError> {
        let balance = self.balances.get_mut(&amount.currency()).ok_or_else(|| {
            ValidationError::Invalid(format!("no balance in {}", amount.currency()))
        })?;
        if balance.locked.value() < amount.value() {
            return Err(ValidationError::Invalid(format!(
                "insufficient locked balance: {} < {}",
                balance.locked, amount
            )));
        }
        balance.locked = balance.locked - amount;
        balance.free = balance.free + amount;
        Ok(())
    }

    /// Adjusts the total (and free) balance by a signed amount, e.g. realized
    /// PnL or commission.
    pub fn adjust(&mut self, amount: Money, sign: Decimal) {
        let delta = amount * sign;
        let entry = self
            .balances
            .entry(amount.currency())
            .or_insert_with(|| AccountBalance::unlocked(Money::zero(amount.currency())));
        entry.total = entry.total + delta;
        entry.free = entry.free + delta;
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn usd(value: Decimal) -> Money {
        Money::new(value, Currency::from_code("USD").unwrap())
    }

    #[test]
    fn balance_invariant_is_enforced() {
        assert!(AccountBalance::new(usd(dec!(100)), usd(dec!(90)), usd(dec!(10))).is_ok());
        assert!(AccountBalance::new(usd(dec!(100)), usd(dec!(90)), usd(dec!(20))).is_err());
    }

    #[test]
    fn lock_unlock_preserves_total() {
        let mut account = Account::new(AccountId::new("SIM-001"));
        account.apply_state(&[AccountBalance::unlocked(usd(dec!(1000)))]);

        account.lock(usd(dec!(400))).unwrap();
        let balance = account.balance(Currency::from_code("USD").unwrap()).unwrap();
        assert_eq!(balance.total, usd(dec!(1000)));
        assert_eq!(balance.free, usd(dec!(600)));
        assert_eq!(balance.locked, usd(dec!(400)));
        assert_eq!(
            balance.free.value() + balance.locked.value(),
            balance.total.value()
        );

        account.unlock(usd(dec!(400))).unwrap();
        let balance = account.balance(Currency::from_code("USD").unwrap()).unwrap();
        assert_eq!(balance.free, usd(dec!(1000)));
        assert!(balance.locked.value().is_zero());
    }

    #[test]
    fn lock_beyond_free_is_rejected() {
        let mut account = Account::new(AccountId::new("SIM-001"));
        account.apply_state(&[AccountBalance::unlocked(usd(dec!(100)))]);
        assert!(account.lock(usd(dec!(101))).is_err());
    }
}
