//! Assets
//!
//! An output carries an optional fungible token and an optional
//! non-fungible ticket.
//!
//! ```text
//! Asset = {
//!     token:  Option<Token { currency: [u8; 32], amount: u64 }>,
//!     ticket: Option<Ticket { category: [u8; 32], serial: [u8; 32] }>,
//! }
//! ```
//!
//! Wire layout (big-endian):
//!
//! ```text
//! flags: u8            bit 0 = token present, bit 1 = ticket present
//! [currency: 32][amount: u64]       if token
//! [category: 32][serial: 32]        if ticket
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};

const FLAG_TOKEN: u8 = 0b01;
const FLAG_TICKET: u8 = 0b10;

/// Build a currency id from its ticker (left-aligned ASCII, zero padded).
///
/// Names longer than 32 bytes are truncated.
pub fn currency_id(name: &str) -> [u8; 32] {
    let mut id = [0u8; 32];
    let bytes = name.as_bytes();
    let len = bytes.len().min(32);
    id[..len].copy_from_slice(&bytes[..len]);
    id
}

/// Render a currency id back into its ticker when it is printable.
pub fn currency_name(id: &[u8; 32]) -> String {
    let end = id.iter().position(|b| *b == 0).unwrap_or(id.len());
    match std::str::from_utf8(&id[..end]) {
        Ok(s) if !s.is_empty() && id[end..].iter().all(|b| *b == 0) => s.to_string(),
        _ => id.iter().map(|b| format!("{:02x}", b)).collect(),
    }
}

/// Fungible value of one currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub currency: [u8; 32],
    pub amount: u64,
}

impl Token {
    pub fn new(currency: [u8; 32], amount: u64) -> Self {
        Self { currency, amount }
    }

    /// Empty currency or zero amount contributes nothing to a balance
    pub fn is_empty(&self) -> bool {
        self.currency == [0u8; 32] || self.amount == 0
    }
}

/// Non-fungible item identified by (category, serial)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticket {
    pub category: [u8; 32],
    pub serial: [u8; 32],
}

impl Ticket {
    pub fn new(category: [u8; 32], serial: [u8; 32]) -> Self {
        Self { category, serial }
    }

    pub fn is_empty(&self) -> bool {
        self.category == [0u8; 32] || self.serial == [0u8; 32]
    }
}

/// Value carried by one output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub token: Option<Token>,
    pub ticket: Option<Ticket>,
}

impl Asset {
    pub fn token(currency: [u8; 32], amount: u64) -> Self {
        Self {
            token: Some(Token::new(currency, amount)),
            ticket: None,
        }
    }

    pub fn ticket(category: [u8; 32], serial: [u8; 32]) -> Self {
        Self {
            token: None,
            ticket: Some(Ticket::new(category, serial)),
        }
    }

    pub fn with_ticket(mut self, ticket: Ticket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    /// True when neither a token nor a ticket is present
    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.ticket.is_none()
    }

    /// True when at least one component carries real value
    pub fn has_value(&self) -> bool {
        self.token.map(|t| !t.is_empty()).unwrap_or(false)
            || self.ticket.map(|t| !t.is_empty()).unwrap_or(false)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut flags = 0u8;
        if self.token.is_some() {
            flags |= FLAG_TOKEN;
        }
        if self.ticket.is_some() {
            flags |= FLAG_TICKET;
        }
        w.write_u8(flags)?;
        if let Some(token) = &self.token {
            w.write_all(&token.currency)?;
            w.write_u64::<BigEndian>(token.amount)?;
        }
        if let Some(ticket) = &self.ticket {
            w.write_all(&ticket.category)?;
            w.write_all(&ticket.serial)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let flags = r.read_u8()?;
        if flags & !(FLAG_TOKEN | FLAG_TICKET) != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown asset flags {:#04x}", flags),
            ));
        }

        let token = if flags & FLAG_TOKEN != 0 {
            let mut currency = [0u8; 32];
            r.read_exact(&mut currency)?;
            let amount = r.read_u64::<BigEndian>()?;
            Some(Token { currency, amount })
        } else {
            None
        };

        let ticket = if flags & FLAG_TICKET != 0 {
            let mut category = [0u8; 32];
            let mut serial = [0u8; 32];
            r.read_exact(&mut category)?;
            r.read_exact(&mut serial)?;
            Some(Ticket { category, serial })
        } else {
            None
        };

        Ok(Self { token, ticket })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 40 + 64);
        // Writing into a Vec cannot fail
        let _ = self.write_to(&mut out);
        out
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.token, &self.ticket) {
            (None, None) => write!(f, "<empty>"),
            (Some(t), None) => write!(f, "{} {}", t.amount, currency_name(&t.currency)),
            (None, Some(k)) => write!(f, "ticket {}", currency_name(&k.category)),
            (Some(t), Some(k)) => write!(
                f,
                "{} {} + ticket {}",
                t.amount,
                currency_name(&t.currency),
                currency_name(&k.category)
            ),
        }
    }
}
