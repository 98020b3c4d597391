use super::model::{Leaderboard, LeaderboardEntry};
use crate::core::Points;

/// Ranks `(handle, display_name, points)` rows by points descending, ties
/// broken by handle. Ranks are positional (1, 2, 3, ...), so equal balances
/// still get distinct ranks.
pub fn rank(mut rows: Vec<(String, String, Points)>, caller: Option<&str>, limit: usize) -> Leaderboard {
    rows.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

    let total = rows.len();
    let mut my_rank = None;
    let mut my_points = None;
    let mut entries = Vec::with_capacity(limit.min(total));

    for (index, (handle, display_name, points)) in rows.into_iter().enumerate() {
        let rank = index + 1;
        if caller == Some(handle.as_str()) {
            my_rank = Some(rank);
            my_points = Some(points);
        }
        if index < limit {
            entries.push(LeaderboardEntry {
                rank,
                handle,
                display_name,
                points,
            });
        } else if my_rank.is_some() {
            break;
        }
    }

    Leaderboard {
        entries,
        total,
        my_rank,
        my_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(handle: &str, points: u64) -> (String, String, Points) {
        (handle.to_string(), handle.to_uppercase(), Points::whole(points))
    }

    #[test]
    fn test_ties_break_lexically() {
        let board = rank(vec![row("c", 5), row("b", 10), row("a", 10)], Some("b"), 50);
        let order: Vec<_> = board.entries.iter().map(|e| e.handle.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(board.my_rank, Some(2));
        assert_eq!(board.my_points, Some(Points::whole(10)));
    }

    #[test]
    fn test_caller_outside_top_is_still_ranked() {
        let rows = (0..60).map(|i| row(&format!("user{:02}", i), 100 - i)).collect();
        let board = rank(rows, Some("user59"), 50);
        assert_eq!(board.entries.len(), 50);
        assert_eq!(board.total, 60);
        assert_eq!(board.my_rank, Some(60));
        assert_eq!(board.my_points, Some(Points::whole(41)));
    }

    #[test]
    fn test_unranked_caller() {
        let board = rank(vec![row("a", 1)], Some("ghost"), 50);
        assert_eq!(board.my_rank, None);
        assert_eq!(board.total, 1);
    }
}
