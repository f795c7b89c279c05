//! Bet lifecycle service
//!
//! Owns the `no bet -> open -> closed` state machine. All state lives in the
//! store and is re-read on every call; nothing about the open bet is cached
//! in memory. There is no locking around read-modify-write sequences, so two
//! concurrent guesses racing on the same list can lose one of the updates.
//!
//! Broadcasts are handed to the [`Broadcaster`] after the result is decided
//! and are never awaited here.

use super::broadcast::Broadcaster;
use crate::db::Database;
use crate::error::{BetError, BetResult};
use crate::scoring::compute_winners;
use crate::types::{BetRef, BetSummary, Guess, DATE_FORMAT};
use chrono::{Datelike, Local, Month, NaiveDate};
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info};

/// Static settings for the service
#[derive(Debug, Clone)]
pub struct BetSettings {
    /// Admin user names, matched case-insensitively
    pub admins: Vec<String>,
    /// How many recent bets `info <month>` looks through
    pub month_scan_depth: usize,
}

impl BetSettings {
    pub fn is_admin(&self, user: &str) -> bool {
        self.admins.iter().any(|a| a.eq_ignore_ascii_case(user))
    }
}

#[derive(Clone)]
pub struct BetService {
    db: Arc<Database>,
    broadcaster: Broadcaster,
    settings: Arc<BetSettings>,
}

impl BetService {
    pub fn new(db: Arc<Database>, broadcaster: Broadcaster, settings: BetSettings) -> Self {
        Self {
            db,
            broadcaster,
            settings: Arc::new(settings),
        }
    }

    pub fn is_admin(&self, user: &str) -> bool {
        self.settings.is_admin(user)
    }

    /// Wait for in-flight broadcasts. Only for shutdown paths and tests.
    pub async fn flush_broadcasts(&self) {
        self.broadcaster.flush().await;
    }

    fn require_admin(&self, user: &str, action: &'static str) -> BetResult<()> {
        if self.is_admin(user) {
            Ok(())
        } else {
            Err(BetError::Unauthorized { action })
        }
    }

    /// Open a new bet. Admin only, and only when no bet is open.
    pub async fn start_bet(&self, user: &str) -> BetResult<String> {
        self.require_admin(user, "start a bet")?;

        if self.db.get_open_bet_id().await?.is_some() {
            return Err(BetError::BetInProgress);
        }

        let new_id = self.db.get_last_bet_id().await?.unwrap_or(0) + 1;
        self.db.create_bet(new_id, &today()).await?;

        info!(bet_id = new_id, user, "Bet started");
        self.broadcaster.send("bet started", "A new bet has started!");
        Ok(format!("started bet[{}] successfully", new_id))
    }

    /// Place or revise `user`'s guess on the open bet.
    ///
    /// The reply never contains the guess: while a bet is open nobody's
    /// number is revealed.
    pub async fn save_guess(&self, user: &str, number: i64, note: Option<String>) -> BetResult<String> {
        let open_id = self
            .db
            .get_open_bet_id()
            .await?
            .ok_or(BetError::NoBetInProgress)?;

        let mut guesses = self.db.get_guesses(open_id).await?;
        upsert_guess(&mut guesses, Guess::new(user, number, note));
        self.db.set_guesses(open_id, &guesses).await?;

        debug!(bet_id = open_id, user, "Guess saved");
        self.broadcaster
            .send("guess placed", format!("{} has placed a bet. Have you?", user));
        Ok("saved successfully".to_string())
    }

    /// Place a guess on behalf of another user. Admin only.
    pub async fn save_guess_for(
        &self,
        actor: &str,
        user: &str,
        number: i64,
        note: Option<String>,
    ) -> BetResult<String> {
        self.require_admin(actor, "save a bet for another user")?;
        self.save_guess(user, number, note).await
    }

    /// Close the open bet. The full report is broadcast in the background.
    pub async fn end_bet(&self, user: &str) -> BetResult<String> {
        self.require_admin(user, "end a bet")?;

        let open_id = self
            .db
            .get_open_bet_id()
            .await?
            .ok_or(BetError::NoBetInProgress)?;

        self.db.set_ended(open_id, &today()).await?;
        info!(bet_id = open_id, user, "Bet ended");

        let service = self.clone();
        self.broadcaster.dispatch("bet ended", async move {
            let report = service.bet_info(BetRef::Id(open_id)).await?;
            Ok(Some(report))
        });

        Ok(format!("ended bet[{}] successfully", open_id))
    }

    /// Summary of a bet, plus its guesses once it is no longer open.
    ///
    /// Guesses are listed by value; if a winner score is recorded the
    /// winning rows are marked.
    pub async fn bet_info(&self, bet: BetRef) -> BetResult<String> {
        let id = match bet {
            BetRef::Latest => self.db.get_last_bet_id().await?.ok_or(BetError::NoBetExists)?,
            BetRef::Id(id) => id,
        };

        let summary = self.db.get_summary(id).await?.ok_or(BetError::NoSuchBet)?;

        if self.db.get_open_bet_id().await? == Some(id) {
            return Ok(summary.to_string());
        }

        let guesses = self.db.get_guesses(id).await?;
        let winners: HashSet<String> = match summary.winner_score {
            Some(score) => compute_winners(&guesses, score)
                .into_iter()
                .map(|g| g.user)
                .collect(),
            None => HashSet::new(),
        };

        Ok(render_report(&summary, guesses, &winners))
    }

    /// Report for the most recent bet that has been closed
    pub async fn last_ended_bet_info(&self) -> BetResult<String> {
        let mut id = self.db.get_last_bet_id().await?.ok_or(BetError::NoBetExists)?;
        let open_id = self.db.get_open_bet_id().await?;

        if open_id == Some(id) {
            id -= 1;
        }
        if id < 1 {
            return Err(BetError::NoBetExists);
        }
        self.bet_info(BetRef::Id(id)).await
    }

    /// Hypothetical winners of the last bet for `reference`.
    /// Refused while that bet is still open.
    pub async fn calculate_who_wins(&self, reference: i64) -> BetResult<String> {
        let id = self.db.get_last_bet_id().await?.ok_or(BetError::NoBetExists)?;
        if self.db.get_open_bet_id().await? == Some(id) {
            return Err(BetError::ActiveBetQuery);
        }

        let guesses = self.db.get_guesses(id).await?;
        let total = guesses.len();
        let winners = compute_winners(&guesses, reference);

        let mut response = format!(
            "bet {}, {} people joined, hypothetical {} winners for score {}: \n",
            id,
            total,
            total / 2,
            reference
        );
        for winner in &winners {
            let _ = writeln!(response, "\t{}\t{}", winner.user, winner.number);
        }
        Ok(response)
    }

    /// Record the actual outcome of a bet. Admin only; the bet need not be closed.
    pub async fn save_winner_score(&self, actor: &str, bet_id: i64, score: i64) -> BetResult<String> {
        self.require_admin(actor, "save a winner score")?;

        if !self.db.bet_exists(bet_id).await? {
            return Err(BetError::NoSuchBet);
        }
        self.db.set_winner_score(bet_id, score).await?;

        info!(bet_id, score, "Winner score saved");
        Ok(format!(
            "winner {} for bet {} is saved successfully",
            score, bet_id
        ))
    }

    /// Summaries of the last `count` bets, oldest first, one per line.
    /// Empty when no bet exists yet.
    pub async fn list_recent_bets(&self, count: usize) -> BetResult<String> {
        let Some(last_id) = self.db.get_last_bet_id().await? else {
            return Ok(String::new());
        };

        let count = i64::try_from(count).unwrap_or(i64::MAX);
        let first_id = last_id.saturating_sub(count).saturating_add(1).max(1);

        let mut response = String::new();
        for id in first_id..=last_id {
            if let Some(summary) = self.db.get_summary(id).await? {
                let _ = writeln!(response, "{}", summary);
            }
        }
        Ok(response)
    }

    /// Broadcast who in the channel hasn't guessed on the open bet yet.
    ///
    /// Returns right away; the membership lookup and the broadcast happen in
    /// the background and their failures are only logged.
    pub async fn list_absent_users(&self) -> BetResult<String> {
        let open_id = self
            .db
            .get_open_bet_id()
            .await?
            .ok_or(BetError::NoBetInProgress)?;
        let guesses = self.db.get_guesses(open_id).await?;

        let notifier = self.broadcaster.notifier();
        self.broadcaster.dispatch("absent users", async move {
            let members = notifier.list_members().await?;
            let absent = absent_users(members, &guesses);
            Ok(Some(format!(
                "Users who have not placed a bet yet: {}",
                absent.join(", ")
            )))
        });

        Ok("ok".to_string())
    }

    /// Report for the most recent bet that ended (or, if still open, started)
    /// in `month`, looking back at most `month_scan_depth` bets.
    pub async fn bet_info_for_month(&self, month: Month) -> BetResult<String> {
        let not_found = || BetError::MonthNotFound(month.name().to_string());

        let last_id = self.db.get_last_bet_id().await?.ok_or_else(not_found)?;
        let month_number = month.number_from_month();

        let mut id = last_id;
        let mut scanned = 0;
        while id >= 1 && scanned < self.settings.month_scan_depth {
            if let Some(summary) = self.db.get_summary(id).await? {
                if summary_month(&summary) == Some(month_number) {
                    return self.bet_info(BetRef::Id(id)).await;
                }
            }
            id -= 1;
            scanned += 1;
        }

        Err(not_found())
    }
}

fn today() -> String {
    Local::now().format(DATE_FORMAT).to_string()
}

fn summary_month(summary: &BetSummary) -> Option<u32> {
    NaiveDate::parse_from_str(summary.reference_date(), DATE_FORMAT)
        .ok()
        .map(|d| d.month())
}

/// Replace the user's guess in place, or append it if they have none yet
fn upsert_guess(guesses: &mut Vec<Guess>, guess: Guess) {
    match guesses.iter_mut().find(|g| g.user == guess.user) {
        Some(existing) => *existing = guess,
        None => guesses.push(guess),
    }
}

/// Channel members without a guess, compared case-insensitively
fn absent_users(members: Vec<String>, guesses: &[Guess]) -> Vec<String> {
    let guessed: HashSet<String> = guesses.iter().map(|g| g.user.to_lowercase()).collect();
    members
        .into_iter()
        .filter(|m| !guessed.contains(&m.to_lowercase()))
        .collect()
}

fn render_report(summary: &BetSummary, mut guesses: Vec<Guess>, winners: &HashSet<String>) -> String {
    guesses.sort_by_key(|g| g.number);

    let mut response = format!("{}\n\n", summary);
    for (i, guess) in guesses.iter().enumerate() {
        let mut row = format!("{}.\t{}\t{}", i + 1, guess.user, guess.number);
        if let Some(note) = &guess.note {
            let _ = write!(row, "\t{}", note);
        }
        if winners.contains(&guess.user) {
            row = format!("*{} (WINNER!)*", row);
        }
        let _ = writeln!(response, "{}", row);
    }
    response
}
