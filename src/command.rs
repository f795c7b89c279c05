//! Slash-command text parsing and dispatch
//!
//! Turns `/bet <text>` into a [`Command`] and runs it against the
//! [`BetService`]. Integer arguments are validated here, never in the service.

use crate::error::BetError;
use crate::services::BetService;
use crate::types::BetRef;
use chrono::Month;
use std::str::FromStr;
use thiserror::Error;

pub const AVAILABLE_COMMANDS: &str =
    "Available commands: start, save, end, list, info, whowins, savefor, listabsent, savewinner, last";

/// A parsed bet command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Save { number: i64, note: Option<String> },
    End,
    List,
    Info(InfoTarget),
    WhoWins(i64),
    SaveFor { user: String, number: i64, note: Option<String> },
    ListAbsent,
    SaveWinner { bet_id: i64, score: i64 },
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoTarget {
    Bet(BetRef),
    Month(Month),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0}")]
    Usage(&'static str),
    #[error("{what} is not a valid integer {value}")]
    InvalidInteger { what: &'static str, value: String },
    #[error("{0} is not a valid month.")]
    InvalidMonth(String),
}

/// Why a command produced no result
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Bet(#[from] BetError),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let Some((first, args)) = words.split_first() else {
            return Err(CommandError::Usage(AVAILABLE_COMMANDS));
        };

        let command = match first.to_lowercase().as_str() {
            "start" => Command::Start,
            "end" => Command::End,
            "list" => Command::List,
            "listabsent" => Command::ListAbsent,
            "last" => Command::Last,
            "save" => {
                let number = args
                    .first()
                    .ok_or(CommandError::Usage("save command format: save <number> [note]"))?;
                Command::Save {
                    number: parse_int("number", number)?,
                    note: join_note(&args[1..]),
                }
            }
            "savefor" => {
                if args.len() < 2 {
                    return Err(CommandError::Usage(
                        "savefor command format: savefor <user> <number> [note]",
                    ));
                }
                Command::SaveFor {
                    user: args[0].to_string(),
                    number: parse_int("number", args[1])?,
                    note: join_note(&args[2..]),
                }
            }
            "whowins" => {
                let reference = args
                    .first()
                    .ok_or(CommandError::Usage("usage: /bet whowins <number>"))?;
                Command::WhoWins(parse_int("reference number", reference)?)
            }
            "savewinner" => {
                if args.len() != 2 {
                    return Err(CommandError::Usage("usage: /bet savewinner <bet id> <score>"));
                }
                Command::SaveWinner {
                    bet_id: parse_int("betID", args[0])?,
                    score: parse_int("winner number", args[1])?,
                }
            }
            "info" => Command::Info(parse_info_target(args.first().copied())?),
            _ => return Err(CommandError::Usage(AVAILABLE_COMMANDS)),
        };

        Ok(command)
    }
}

fn parse_int(what: &'static str, value: &str) -> Result<i64, CommandError> {
    value.parse().map_err(|_| CommandError::InvalidInteger {
        what,
        value: value.to_string(),
    })
}

fn join_note(words: &[&str]) -> Option<String> {
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// No argument means the latest bet, digits mean a bet id, anything else
/// must be a month name ("march", "Mar", ...)
fn parse_info_target(arg: Option<&str>) -> Result<InfoTarget, CommandError> {
    let Some(arg) = arg else {
        return Ok(InfoTarget::Bet(BetRef::Latest));
    };

    if arg.chars().all(|c| c.is_ascii_digit()) {
        let id = parse_int("id", arg)?;
        return Ok(InfoTarget::Bet(BetRef::Id(id)));
    }

    Month::from_str(arg)
        .map(InfoTarget::Month)
        .map_err(|_| CommandError::InvalidMonth(arg.to_string()))
}

/// Run a parsed command as `user`
pub async fn dispatch(
    service: &BetService,
    user: &str,
    command: Command,
    list_count: usize,
) -> Result<String, BetError> {
    match command {
        Command::Start => service.start_bet(user).await,
        Command::Save { number, note } => service.save_guess(user, number, note).await,
        Command::End => service.end_bet(user).await,
        Command::List => {
            let listing = service.list_recent_bets(list_count).await?;
            if listing.is_empty() {
                Ok("no bets yet".to_string())
            } else {
                Ok(listing)
            }
        }
        Command::Info(InfoTarget::Bet(bet)) => service.bet_info(bet).await,
        Command::Info(InfoTarget::Month(month)) => service.bet_info_for_month(month).await,
        Command::WhoWins(reference) => service.calculate_who_wins(reference).await,
        Command::SaveFor { user: target, number, note } => {
            service.save_guess_for(user, &target, number, note).await
        }
        Command::ListAbsent => service.list_absent_users().await,
        Command::SaveWinner { bet_id, score } => {
            service.save_winner_score(user, bet_id, score).await
        }
        Command::Last => service.last_ended_bet_info().await,
    }
}

/// Parse `text` and run it as `user`
pub async fn handle_text(
    service: &BetService,
    user: &str,
    text: &str,
    list_count: usize,
) -> Result<String, DispatchError> {
    let command: Command = text.parse()?;
    Ok(dispatch(service, user, command, list_count).await?)
}
