//! The operator's side of the relay: a line-oriented command language for
//! changing fault rules while the relay runs.
//!
//! ```text
//! <action> <opcode> [block] [to-server|to-client] [once|always]
//! list
//! clear
//! quit
//! ```
//!
//! where `<action>` is one of `drop`, `dup`, `delay <ms>` or
//! `corrupt opcode|block|truncate <n>` / `corrupt scramble`, and `<opcode>`
//! is one of `rrq`, `wrq`, `data`, `ack`, `error` or `any`. Rules fire once
//! unless `always` is given.

use std::io::{BufRead, Result, Write};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::rule::{Action, Activation, Corruption, Direction, FaultRule, Matcher};
use super::RelayHandle;
use crate::packet::Opcode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Install(FaultRule),
    List,
    Clear,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("missing {0}")]
    Missing(&'static str),

    #[error("`{0}` is not a valid number")]
    InvalidNumber(String),

    #[error("unknown opcode `{0}`")]
    UnknownOpcode(String),

    #[error("unexpected `{0}`")]
    Unexpected(String),

    #[error("{0} packets have no block number")]
    NoBlockNumber(Opcode),
}

/// Parses one line of operator input.
pub fn parse_command(line: &str) -> std::result::Result<Command, CommandError> {
    let mut words = line.split_whitespace().peekable();
    let verb = words.next().ok_or(CommandError::Empty)?;

    let action = match verb.to_ascii_lowercase().as_str() {
        "list" | "ls" => return no_more(words, Command::List),
        "clear" => return no_more(words, Command::Clear),
        "quit" | "exit" => return no_more(words, Command::Quit),
        "drop" => Action::Drop,
        "dup" | "duplicate" => Action::Duplicate,
        "delay" => Action::Delay(Duration::from_millis(number(words.next(), "delay in ms")?)),
        "corrupt" => Action::Corrupt(corruption(&mut words)?),
        _ => return Err(CommandError::UnknownCommand(verb.to_string())),
    };

    let mut matcher = parse_matcher(&mut words)?;
    let mut activation = Activation::Once;
    for word in words {
        match word.to_ascii_lowercase().as_str() {
            "to-server" => matcher.direction = Some(Direction::ToServer),
            "to-client" => matcher.direction = Some(Direction::ToClient),
            "once" => activation = Activation::Once,
            "always" => activation = Activation::Persistent,
            _ => return Err(CommandError::Unexpected(word.to_string())),
        }
    }

    Ok(Command::Install(FaultRule::new(matcher, action, activation)))
}

fn no_more<'a>(
    mut words: impl Iterator<Item = &'a str>,
    command: Command,
) -> std::result::Result<Command, CommandError> {
    match words.next() {
        Some(word) => Err(CommandError::Unexpected(word.to_string())),
        None => Ok(command),
    }
}

fn number<T: FromStr>(word: Option<&str>, what: &'static str) -> std::result::Result<T, CommandError> {
    let word = word.ok_or(CommandError::Missing(what))?;
    word.parse()
        .map_err(|_| CommandError::InvalidNumber(word.to_string()))
}

fn corruption<'a>(
    words: &mut impl Iterator<Item = &'a str>,
) -> std::result::Result<Corruption, CommandError> {
    let kind = words.next().ok_or(CommandError::Missing("corruption kind"))?;
    Ok(match kind.to_ascii_lowercase().as_str() {
        "opcode" => Corruption::Opcode(number(words.next(), "opcode value")?),
        "block" => Corruption::Block(number(words.next(), "block value")?),
        "truncate" => Corruption::Truncate(number(words.next(), "length")?),
        "scramble" => Corruption::Scramble,
        _ => return Err(CommandError::Unexpected(kind.to_string())),
    })
}

/// Reads the opcode and an optional block number. The block number is the
/// only bare number that may follow the opcode.
fn parse_matcher<'a>(
    words: &mut std::iter::Peekable<impl Iterator<Item = &'a str>>,
) -> std::result::Result<Matcher, CommandError> {
    let name = words.next().ok_or(CommandError::Missing("opcode"))?;
    let mut matcher = match name.to_ascii_lowercase().as_str() {
        "any" => Matcher::any(),
        "rrq" => Matcher::opcode(Opcode::Rrq),
        "wrq" => Matcher::opcode(Opcode::Wrq),
        "data" => Matcher::opcode(Opcode::Data),
        "ack" => Matcher::opcode(Opcode::Ack),
        "error" => Matcher::opcode(Opcode::Error),
        _ => return Err(CommandError::UnknownOpcode(name.to_string())),
    };

    if let Some(block) = words.peek().and_then(|word| word.parse::<u16>().ok()) {
        words.next();
        if let Some(opcode) = matcher.opcode.filter(|op| !matches!(op, Opcode::Data | Opcode::Ack)) {
            return Err(CommandError::NoBlockNumber(opcode));
        }
        matcher = matcher.with_block(block);
    }

    Ok(matcher)
}

/// Serves operator commands from `input` until `quit` or end of input.
/// Replies go to `output`. A bad line is reported and skipped.
pub fn run_control<R: BufRead, W: Write>(input: R, mut output: W, handle: &RelayHandle) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Ok(Command::Install(rule)) => {
                writeln!(output, "installed: {}", rule)?;
                handle.install(rule);
            }
            Ok(Command::List) => {
                let rules = handle.rules();
                if rules.is_empty() {
                    writeln!(output, "no rules installed")?;
                }
                for (i, rule) in rules.iter().enumerate() {
                    writeln!(output, "{}: {}", i, rule)?;
                }
            }
            Ok(Command::Clear) => {
                handle.clear();
                writeln!(output, "cleared")?;
            }
            Ok(Command::Quit) => {
                info!("operator asked the relay to quit");
                handle.shutdown();
                return Ok(());
            }
            Err(err) => {
                warn!(%line, error = %err, "bad command");
                writeln!(output, "error: {}", err)?;
            }
        }
        output.flush()?;
    }

    Ok(())
}
