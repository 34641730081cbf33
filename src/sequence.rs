//! Logical block numbering.
//!
//! Block numbers are unbounded within a transaction but travel modulo 65536.
//! A [`BlockCounter`] keeps the logical value and resolves each wire value to
//! the logical block it most plausibly names, so a rollover from 65535 to 0
//! is never mistaken for a block arriving out of order.

use crate::packet::Block;

const WIRE_MODULUS: u64 = 1 << 16;

/// How a received block number relates to the one a session expects.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Sequence {
    /// Exactly the expected block.
    Expected(u64),

    /// The block immediately before the expected one, i.e. a retransmission.
    Duplicate(u64),

    /// Anything else. Fatal to the transaction.
    OutOfSequence,
}

/// The logical block a session is waiting on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockCounter {
    expected: u64,
    first: u64,
}

impl BlockCounter {
    /// A counter whose first expected block is `first`. Nothing before
    /// `first` is ever treated as a duplicate.
    pub fn starting_at(first: u64) -> Self {
        Self {
            expected: first,
            first,
        }
    }

    /// A counter primed at an arbitrary logical block, as if the blocks
    /// between `first` and `expected` had already been exchanged.
    pub fn resume_at(first: u64, expected: u64) -> Self {
        Self {
            expected: expected.max(first),
            first,
        }
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// The expected block as it appears on the wire.
    pub fn wire(&self) -> Block {
        to_wire(self.expected)
    }

    pub fn advance(&mut self) {
        self.expected += 1;
    }

    /// Places a wire block number relative to the expected logical block.
    ///
    /// The wire value is unwrapped to the logical number nearest the
    /// expected one, shifting by 65536 in whichever direction the rollover
    /// points. Only a difference of zero or minus one is acceptable.
    pub fn classify(&self, wire: Block) -> Sequence {
        let logical = self.unwrap(wire);

        if logical == self.expected {
            Sequence::Expected(logical)
        } else if logical + 1 == self.expected && logical >= self.first {
            Sequence::Duplicate(logical)
        } else {
            Sequence::OutOfSequence
        }
    }

    fn unwrap(&self, wire: Block) -> u64 {
        let base = self.expected - self.expected % WIRE_MODULUS;
        let candidate = base + u64::from(wire.value());

        // Pick whichever of candidate - 65536, candidate, candidate + 65536
        // lies closest to the expected block.
        let half = WIRE_MODULUS / 2;
        if candidate > self.expected + half {
            candidate.checked_sub(WIRE_MODULUS).unwrap_or(candidate)
        } else if candidate + half < self.expected {
            candidate + WIRE_MODULUS
        } else {
            candidate
        }
    }
}

/// Reduces a logical block number to its 16-bit wire form.
pub fn to_wire(logical: u64) -> Block {
    Block((logical % WIRE_MODULUS) as u16)
}
