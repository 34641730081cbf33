//! Fault rules and the set the relay consults for every datagram.

use std::fmt;
use std::time::Duration;

use rand::Rng;

use crate::packet::Opcode;

/// Which leg of the relay a datagram is travelling on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// From the requester towards the responder.
    ToServer,

    /// From the responder back to the requester.
    ToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::ToServer => "to-server",
            Direction::ToClient => "to-client",
        })
    }
}

/// Selects datagrams by leg, opcode and block number. Unset fields match
/// anything.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Matcher {
    pub direction: Option<Direction>,
    pub opcode: Option<Opcode>,

    /// Only DATA and ACK packets carry a block number, so a matcher with a
    /// block never selects anything else.
    pub block: Option<u16>,
}

impl Matcher {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn opcode(opcode: Opcode) -> Self {
        Self {
            opcode: Some(opcode),
            ..Self::default()
        }
    }

    pub fn with_block(mut self, block: u16) -> Self {
        self.block = Some(block);
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Inspects the raw datagram; it does not have to be a valid packet.
    pub fn matches(&self, direction: Direction, datagram: &[u8]) -> bool {
        if self.direction.map_or(false, |wanted| wanted != direction) {
            return false;
        }

        let opcode = Opcode::peek(datagram);
        if let Some(wanted) = self.opcode {
            if opcode != Some(wanted) {
                return false;
            }
        }

        match self.block {
            None => true,
            Some(block) => {
                matches!(opcode, Some(Opcode::Data | Opcode::Ack))
                    && datagram.len() >= 4
                    && u16::from_be_bytes([datagram[2], datagram[3]]) == block
            }
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode {
            Some(opcode) => write!(f, "{}", opcode)?,
            None => f.write_str("any")?,
        }
        if let Some(block) = self.block {
            write!(f, " #{}", block)?;
        }
        if let Some(direction) = self.direction {
            write!(f, " {}", direction)?;
        }
        Ok(())
    }
}

/// Ways of damaging a datagram in flight.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Corruption {
    /// Overwrites the opcode.
    Opcode(u16),

    /// Overwrites the block number (or error code).
    Block(u16),

    /// Cuts the datagram down to this many bytes.
    Truncate(usize),

    /// Flips one random byte.
    Scramble,
}

impl Corruption {
    fn apply(self, datagram: &mut Vec<u8>) {
        match self {
            Corruption::Opcode(opcode) => overwrite(datagram, 0, opcode),
            Corruption::Block(block) => overwrite(datagram, 2, block),
            Corruption::Truncate(len) => datagram.truncate(len),
            Corruption::Scramble => {
                if datagram.is_empty() {
                    return;
                }
                let mut rng = rand::thread_rng();
                let at = rng.gen_range(0..datagram.len());
                datagram[at] ^= rng.gen_range(1..=u8::MAX);
            }
        }
    }
}

fn overwrite(datagram: &mut [u8], at: usize, val: u16) {
    if let Some(field) = datagram.get_mut(at..at + 2) {
        field.copy_from_slice(&val.to_be_bytes());
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    Drop,
    Delay(Duration),
    Duplicate,
    Corrupt(Corruption),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Drop => f.write_str("drop"),
            Action::Delay(delay) => write!(f, "delay {}ms", delay.as_millis()),
            Action::Duplicate => f.write_str("duplicate"),
            Action::Corrupt(Corruption::Opcode(op)) => write!(f, "corrupt opcode {}", op),
            Action::Corrupt(Corruption::Block(block)) => write!(f, "corrupt block {}", block),
            Action::Corrupt(Corruption::Truncate(len)) => write!(f, "corrupt truncate {}", len),
            Action::Corrupt(Corruption::Scramble) => f.write_str("corrupt scramble"),
        }
    }
}

/// Whether a rule retires after its first hit.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Activation {
    #[default]
    Once,
    Persistent,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FaultRule {
    pub matcher: Matcher,
    pub action: Action,
    pub activation: Activation,
}

impl FaultRule {
    pub fn new(matcher: Matcher, action: Action, activation: Activation) -> Self {
        Self {
            matcher,
            action,
            activation,
        }
    }

    pub fn once(matcher: Matcher, action: Action) -> Self {
        Self::new(matcher, action, Activation::Once)
    }

    pub fn persistent(matcher: Matcher, action: Action) -> Self {
        Self::new(matcher, action, Activation::Persistent)
    }
}

impl fmt::Display for FaultRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let activation = match self.activation {
            Activation::Once => "once",
            Activation::Persistent => "always",
        };
        write!(f, "{} {} {}", self.action, self.matcher, activation)
    }
}

/// What to do with one datagram once every matching rule has had its say.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Plan {
    /// How many times to send it. Zero means it is dropped.
    pub copies: usize,
    pub delay: Duration,
    pub datagram: Vec<u8>,

    /// Rules that fired, for logging.
    pub applied: Vec<FaultRule>,
}

impl Plan {
    fn pass_through(datagram: Vec<u8>) -> Self {
        Self {
            copies: 1,
            delay: Duration::ZERO,
            datagram,
            applied: Vec::new(),
        }
    }
}

/// The installed rules, in installation order.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<FaultRule>,
}

impl RuleSet {
    /// Adds a rule. A rule with the same matcher is replaced in place.
    pub fn install(&mut self, rule: FaultRule) {
        match self.rules.iter_mut().find(|r| r.matcher == rule.matcher) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn rules(&self) -> &[FaultRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Runs a datagram through every matching rule. Matching is done on the
    /// datagram as received, so one rule's corruption cannot change which
    /// rules apply. One-shot rules are retired here.
    pub fn apply(&mut self, direction: Direction, datagram: Vec<u8>) -> Plan {
        let original = datagram.clone();
        let mut plan = Plan::pass_through(datagram);
        let mut dropped = false;

        self.rules.retain(|rule| {
            if !rule.matcher.matches(direction, &original) {
                return true;
            }

            match rule.action {
                Action::Drop => dropped = true,
                Action::Delay(delay) => plan.delay += delay,
                Action::Duplicate => plan.copies += 1,
                Action::Corrupt(corruption) => corruption.apply(&mut plan.datagram),
            }
            plan.applied.push(rule.clone());

            rule.activation == Activation::Persistent
        });

        if dropped {
            plan.copies = 0;
        }
        plan
    }
}
