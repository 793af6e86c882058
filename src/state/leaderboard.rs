use std::collections::HashMap;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::session::PlayerSession;

/// Position-change indicator shown during a leaderboard reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    /// Ranked higher than before the revealed question.
    Up,
    /// Ranked lower than before the revealed question.
    Down,
    /// Rank unchanged.
    Same,
    /// No answer history before the revealed question.
    New,
}

/// One row of a ranked leaderboard.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RankedPlayer {
    /// Player the row belongs to.
    pub player_id: Uuid,
    /// Display name.
    pub nickname: String,
    /// Cumulative score.
    pub score: u32,
    /// Current consecutive-correct streak.
    pub streak: u32,
    /// 1-based position.
    pub rank: usize,
    /// Position before the revealed question's points, when computable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_rank: Option<usize>,
    /// Reveal movement indicator; absent outside reveals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movement: Option<Movement>,
}

/// Rank players by score, ties broken by join order.
///
/// The order is a total order derived only from the record contents
/// (score, `joined_at`, then `player_id` for identical join instants), so
/// repeated computations over the same input set agree regardless of the
/// order snapshots delivered the records in.
pub fn rank(players: &[PlayerSession]) -> Vec<RankedPlayer> {
    ordered(players, |player| player.score)
        .into_iter()
        .enumerate()
        .map(|(position, player)| RankedPlayer {
            player_id: player.player_id,
            nickname: player.nickname.clone(),
            score: player.score,
            streak: player.streak,
            rank: position + 1,
            previous_rank: None,
            movement: None,
        })
        .collect()
}

/// Rank players for the reveal after `question_index`, adding the position
/// each player held before that question's points were applied.
pub fn rank_reveal(players: &[PlayerSession], question_index: u32) -> Vec<RankedPlayer> {
    let previous_score = |player: &PlayerSession| {
        let earned = player
            .answers
            .get(&question_index)
            .map(|record| record.points)
            .unwrap_or(0);
        player.score.saturating_sub(earned)
    };

    let previous_positions: HashMap<Uuid, usize> = ordered(players, previous_score)
        .into_iter()
        .enumerate()
        .map(|(position, player)| (player.player_id, position + 1))
        .collect();

    ordered(players, |player| player.score)
        .into_iter()
        .enumerate()
        .map(|(position, player)| {
            let rank = position + 1;
            let debuted = player
                .answers
                .keys()
                .all(|answered| *answered >= question_index)
                && previous_score(player) == 0;

            let (previous_rank, movement) = if debuted {
                (None, Movement::New)
            } else {
                let previous = previous_positions[&player.player_id];
                let movement = match rank.cmp(&previous) {
                    std::cmp::Ordering::Less => Movement::Up,
                    std::cmp::Ordering::Greater => Movement::Down,
                    std::cmp::Ordering::Equal => Movement::Same,
                };
                (Some(previous), movement)
            };

            RankedPlayer {
                player_id: player.player_id,
                nickname: player.nickname.clone(),
                score: player.score,
                streak: player.streak,
                rank,
                previous_rank,
                movement: Some(movement),
            }
        })
        .collect()
}

fn ordered(
    players: &[PlayerSession],
    score_of: impl Fn(&PlayerSession) -> u32,
) -> Vec<&PlayerSession> {
    let mut sorted: Vec<&PlayerSession> = players.iter().collect();
    sorted.sort_by(|a, b| {
        score_of(b)
            .cmp(&score_of(a))
            .then_with(|| a.joined_at.cmp(&b.joined_at))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
    sorted
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::state::session::AnswerRecord;

    fn player(nickname: &str, score: u32, joined_offset_ms: u64) -> PlayerSession {
        PlayerSession {
            pin: "123456".into(),
            player_id: Uuid::new_v4(),
            nickname: nickname.into(),
            score,
            streak: 0,
            answers: BTreeMap::new(),
            joined_at: SystemTime::UNIX_EPOCH + Duration::from_millis(joined_offset_ms),
            avatar: None,
        }
    }

    fn answer(points: u32) -> AnswerRecord {
        AnswerRecord {
            answer_index: Some(0),
            is_correct: points > 0,
            points,
            time_remaining_at_submit: 10.0,
            submitted_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn higher_score_ranks_first() {
        let ranked = rank(&[player("low", 100, 0), player("high", 900, 10)]);
        assert_eq!(ranked[0].nickname, "high");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].nickname, "low");
        assert_eq!(ranked[1].rank, 2);
    }

    #[test]
    fn ties_break_by_join_order_deterministically() {
        let first = player("first", 500, 0);
        let second = player("second", 500, 50);

        let forward = rank(&[first.clone(), second.clone()]);
        let reversed = rank(&[second, first]);

        assert_eq!(forward[0].nickname, "first");
        assert_eq!(reversed[0].nickname, "first");
        assert_eq!(
            forward.iter().map(|row| row.player_id).collect::<Vec<_>>(),
            reversed.iter().map(|row| row.player_id).collect::<Vec<_>>(),
        );
    }

    #[test]
    fn reveal_reports_overtakes() {
        let mut leader = player("leader", 500, 0);
        leader.answers.insert(0, answer(500));
        let mut chaser = player("chaser", 1000, 10);
        chaser.answers.insert(0, answer(200));
        chaser.answers.insert(1, answer(800));
        leader.answers.insert(1, answer(0));

        // Before question 1: leader 500, chaser 200. After: chaser overtakes.
        let ranked = rank_reveal(&[leader, chaser], 1);
        assert_eq!(ranked[0].nickname, "chaser");
        assert_eq!(ranked[0].previous_rank, Some(2));
        assert_eq!(ranked[0].movement, Some(Movement::Up));
        assert_eq!(ranked[1].nickname, "leader");
        assert_eq!(ranked[1].previous_rank, Some(1));
        assert_eq!(ranked[1].movement, Some(Movement::Down));
    }

    #[test]
    fn reveal_marks_unmoved_players_as_same() {
        let mut only = player("only", 750, 0);
        only.answers.insert(0, answer(750));
        let mut other = player("other", 0, 10);
        other.answers.insert(0, answer(0));

        let ranked = rank_reveal(&[only, other], 1);
        assert_eq!(ranked[0].movement, Some(Movement::Same));
        assert_eq!(ranked[1].movement, Some(Movement::Same));
    }

    #[test]
    fn reveal_marks_fresh_joiners_as_new() {
        let mut veteran = player("veteran", 600, 0);
        veteran.answers.insert(0, answer(600));
        let mut joiner = player("joiner", 900, 10);
        joiner.answers.insert(1, answer(900));

        let ranked = rank_reveal(&[veteran, joiner], 1);
        let joiner_row = ranked.iter().find(|row| row.nickname == "joiner").unwrap();
        assert_eq!(joiner_row.movement, Some(Movement::New));
        assert_eq!(joiner_row.previous_rank, None);
    }

    #[test]
    fn repeated_reveals_from_the_same_set_agree() {
        let mut a = player("a", 300, 0);
        a.answers.insert(0, answer(300));
        let mut b = player("b", 300, 0);
        b.answers.insert(0, answer(300));
        // Identical scores and join instants: player_id decides, whichever
        // way, but always the same way.
        let once = rank_reveal(&[a.clone(), b.clone()], 0);
        let twice = rank_reveal(&[b, a], 0);
        assert_eq!(
            once.iter().map(|row| row.player_id).collect::<Vec<_>>(),
            twice.iter().map(|row| row.player_id).collect::<Vec<_>>(),
        );
    }
}
