//! Balance conservation.
//!
//! `AssetAccumulator` keeps one signed running total per currency and one
//! signed count per ticket. A transaction balances when every entry is
//! exactly zero after all inputs, outputs and the fee have been fed in.
//!
//! ```text
//! out_plus = false  (verification)     out_plus = true  (selection)
//!   fee      -                           fee      +
//!   input    +                           input    -
//!   output   -                           output   +
//! ```
//!
//! With `out_plus = true` the positive residuals are exactly what still has
//! to be found on the input side (or, after inputs, what must be returned as
//! change).

use std::collections::BTreeMap;

use shroud_privacy::{Asset, Ticket, Token};

use crate::error::{AssetKey, LedgerError, Result};

#[derive(Debug, Clone)]
pub struct AssetAccumulator {
    out_plus: bool,
    tokens: BTreeMap<[u8; 32], i128>,
    tickets: BTreeMap<Ticket, i64>,
}

impl AssetAccumulator {
    pub fn new(out_plus: bool, fee: &Token) -> Self {
        let mut acc = Self {
            out_plus,
            tokens: BTreeMap::new(),
            tickets: BTreeMap::new(),
        };
        let amount = fee.amount as i128;
        acc.bump_token(fee.currency, if out_plus { amount } else { -amount });
        acc
    }

    /// Feed a spent asset. Empty currencies, zero amounts and empty tickets
    /// contribute nothing; returns whether anything was counted.
    pub fn add_input(&mut self, asset: &Asset) -> bool {
        let sign: i128 = if self.out_plus { -1 } else { 1 };
        let mut added = false;

        if let Some(token) = asset.token.filter(|t| !t.is_empty()) {
            self.bump_token(token.currency, sign * token.amount as i128);
            added = true;
        }
        if let Some(ticket) = asset.ticket.filter(|t| !t.is_empty()) {
            self.bump_ticket(ticket, sign as i64);
            added = true;
        }
        added
    }

    /// Feed a created asset; returns whether anything was counted
    pub fn add_output(&mut self, asset: &Asset) -> bool {
        let sign: i128 = if self.out_plus { 1 } else { -1 };
        let mut added = false;

        if let Some(token) = asset.token {
            self.bump_token(token.currency, sign * token.amount as i128);
            added = true;
        }
        if let Some(ticket) = asset.ticket {
            self.bump_ticket(ticket, sign as i64);
            added = true;
        }
        added
    }

    /// Every currency total and ticket count must be zero
    pub fn check(&self) -> Result<()> {
        if let Some((currency, residual)) = self.tokens.iter().find(|(_, v)| **v != 0) {
            return Err(LedgerError::Imbalance {
                asset: AssetKey::Currency(*currency),
                residual: *residual,
            });
        }
        if let Some((ticket, count)) = self.tickets.iter().find(|(_, v)| **v != 0) {
            return Err(LedgerError::Imbalance {
                asset: AssetKey::Ticket {
                    category: ticket.category,
                    serial: ticket.serial,
                },
                residual: *count as i128,
            });
        }
        Ok(())
    }

    /// Positive residuals, in currency and ticket order
    pub fn list_nonzero_outputs(&self) -> (Vec<Token>, Vec<Ticket>) {
        let tokens = self
            .tokens
            .iter()
            .filter(|(_, v)| **v > 0)
            .map(|(currency, v)| Token::new(*currency, u64::try_from(*v).unwrap_or(u64::MAX)))
            .collect();
        let tickets = self
            .tickets
            .iter()
            .filter(|(_, v)| **v > 0)
            .map(|(t, _)| *t)
            .collect();
        (tokens, tickets)
    }

    /// Signed total of one currency
    pub fn token_residual(&self, currency: &[u8; 32]) -> i128 {
        self.tokens.get(currency).copied().unwrap_or(0)
    }

    fn bump_token(&mut self, currency: [u8; 32], delta: i128) {
        *self.tokens.entry(currency).or_insert(0) += delta;
    }

    fn bump_ticket(&mut self, ticket: Ticket, delta: i64) {
        *self.tickets.entry(ticket).or_insert(0) += delta;
    }
}
