//! Closest-guess scoring
//!
//! Winners are the closest half of the guessers to the reference score.
//! Ties keep the input order, so earlier submissions win a tie.

use crate::types::Guess;

/// Pick the winning half of `guesses` for `reference`.
///
/// Returns `floor(len / 2)` guesses ordered by ascending distance to
/// `reference`, each carrying its original number.
pub fn compute_winners(guesses: &[Guess], reference: i64) -> Vec<Guess> {
    let mut ranked: Vec<(u64, &Guess)> = guesses
        .iter()
        .map(|g| (g.number.abs_diff(reference), g))
        .collect();

    // sort_by_key is stable: equal distances keep submission order
    ranked.sort_by_key(|(distance, _)| *distance);

    ranked
        .into_iter()
        .take(guesses.len() / 2)
        .map(|(_, guess)| guess.clone())
        .collect()
}
