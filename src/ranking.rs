use std::cmp::Ordering;
use std::collections::HashMap;

use crate::row::Row;

pub const DEFAULT_TOP_N: usize = 20;
const LEADER_COUNT: usize = 3;
const EASE_FACTOR: f64 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarTone {
    Leader,
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedBar {
    /// 1-based position in the ranking.
    pub rank: usize,
    pub code: Option<String>,
    pub name: String,
    pub amount: Option<f64>,
    pub auction_pct_change: Option<f64>,
    pub open_amount: Option<f64>,
    pub bid_turnover: Option<f64>,
    pub sector: Option<String>,
    pub tone: BarTone,
}

/// Picks the `limit` rows with the largest seal amount, largest first.
///
/// The sort is stable, so equal amounts keep their input order. Rows without
/// an amount go after every row that has one.
pub fn rank_top(rows: &[Row], limit: usize) -> Vec<RankedBar> {
    let mut sorted: Vec<&Row> = rows.iter().collect();
    sorted.sort_by(|a, b| amount_desc(a.seal_amount, b.seal_amount));
    sorted
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(idx, row)| RankedBar {
            rank: idx + 1,
            code: row.code.clone(),
            name: row.display_name().to_string(),
            amount: row.seal_amount,
            auction_pct_change: row.auction_pct_change,
            open_amount: row.open_amount,
            bid_turnover: row.bid_turnover,
            sector: row.sector.clone(),
            tone: bar_tone(idx, row.auction_pct_change),
        })
        .collect()
}

impl RankedBar {
    /// Stable identity across selections: the code, or the name without one.
    pub fn identity(&self) -> &str {
        self.code.as_deref().unwrap_or(&self.name)
    }
}

fn amount_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn bar_tone(idx: usize, change: Option<f64>) -> BarTone {
    if idx < LEADER_COUNT {
        return BarTone::Leader;
    }
    match change {
        Some(v) if v > 0.0 => BarTone::Up,
        Some(v) if v < 0.0 => BarTone::Down,
        _ => BarTone::Flat,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMove {
    New,
    Up(usize),
    Down(usize),
    Same,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimatedBar {
    pub bar: RankedBar,
    /// Value currently drawn; converges on `bar.amount` through `tick`.
    pub shown: f64,
    pub movement: RankMove,
}

impl AnimatedBar {
    fn target(&self) -> f64 {
        self.bar.amount.unwrap_or(0.0).max(0.0)
    }
}

/// Keeps the drawn ranking in motion between two selections: bars keep their
/// displayed height when they move, new bars grow from zero.
#[derive(Debug, Default)]
pub struct RankTransition {
    bars: Vec<AnimatedBar>,
    selection_key: String,
}

impl RankTransition {
    pub fn new() -> Self {
        RankTransition::default()
    }

    pub fn bars(&self) -> &[AnimatedBar] {
        &self.bars
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Replaces the selection. Returns `false` when nothing changed.
    pub fn update(&mut self, ranked: Vec<RankedBar>) -> bool {
        let key = selection_key(&ranked);
        if key == self.selection_key {
            return false;
        }
        let previous: HashMap<String, (usize, f64)> = self
            .bars
            .drain(..)
            .map(|bar| (bar.bar.identity().to_string(), (bar.bar.rank, bar.shown)))
            .collect();
        self.bars = ranked
            .into_iter()
            .map(|bar| {
                let (movement, shown) = match previous.get(bar.identity()) {
                    Some(&(old_rank, shown)) => {
                        let movement = match old_rank.cmp(&bar.rank) {
                            Ordering::Greater => RankMove::Up(old_rank - bar.rank),
                            Ordering::Less => RankMove::Down(bar.rank - old_rank),
                            Ordering::Equal => RankMove::Same,
                        };
                        (movement, shown)
                    }
                    None => (RankMove::New, 0.0),
                };
                AnimatedBar {
                    bar,
                    shown,
                    movement,
                }
            })
            .collect();
        self.selection_key = key;
        true
    }

    pub fn clear(&mut self) {
        self.bars.clear();
        self.selection_key.clear();
    }

    /// Advances every bar one easing step. Returns `true` while anything moved.
    pub fn tick(&mut self) -> bool {
        let mut moved = false;
        for bar in &mut self.bars {
            let target = bar.target();
            let gap = target - bar.shown;
            if gap == 0.0 {
                continue;
            }
            let snap = (target.abs() * 0.01).max(1.0);
            if gap.abs() <= snap {
                bar.shown = target;
            } else {
                bar.shown += gap * EASE_FACTOR;
            }
            moved = true;
        }
        moved
    }

    pub fn max_target(&self) -> f64 {
        self.bars
            .iter()
            .map(AnimatedBar::target)
            .fold(0.0, f64::max)
    }
}

fn selection_key(bars: &[RankedBar]) -> String {
    let mut key = String::new();
    for bar in bars {
        key.push_str(bar.identity());
        key.push('|');
        if let Some(amount) = bar.amount {
            key.push_str(&amount.to_string());
        }
        key.push(',');
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, amount: Option<f64>, change: Option<f64>) -> Row {
        Row {
            name: Some(name.to_string()),
            seal_amount: amount,
            auction_pct_change: change,
            ..Row::default()
        }
    }

    #[test]
    fn keeps_at_most_limit_sorted_descending() {
        let rows: Vec<Row> = (0..45)
            .map(|i| row(&format!("S{i}"), Some(((i * 37) % 45) as f64 * 1e6), Some(1.0)))
            .collect();
        let bars = rank_top(&rows, DEFAULT_TOP_N);
        assert_eq!(bars.len(), DEFAULT_TOP_N);
        for pair in bars.windows(2) {
            assert!(pair[0].amount >= pair[1].amount);
        }
        assert_eq!(bars[0].rank, 1);
        assert_eq!(bars[19].rank, 20);
    }

    #[test]
    fn small_sets_are_returned_whole() {
        let rows = vec![row("A", Some(1.0), None), row("B", Some(3.0), None)];
        let bars = rank_top(&rows, DEFAULT_TOP_N);
        let names: Vec<&str> = bars.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert!(rank_top(&[], DEFAULT_TOP_N).is_empty());
    }

    #[test]
    fn ties_keep_input_order_and_missing_amounts_sink() {
        let rows = vec![
            row("missing", None, None),
            row("first", Some(5.0), None),
            row("second", Some(5.0), None),
            row("top", Some(9.0), None),
        ];
        let names: Vec<String> = rank_top(&rows, 10).into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["top", "first", "second", "missing"]);
    }

    #[test]
    fn top_three_are_leaders_rest_follow_sign() {
        let rows = vec![
            row("a", Some(10.0), Some(-1.0)),
            row("b", Some(9.0), Some(-1.0)),
            row("c", Some(8.0), Some(0.0)),
            row("d", Some(7.0), Some(2.0)),
            row("e", Some(6.0), Some(-2.0)),
            row("f", Some(5.0), Some(0.0)),
            row("g", Some(4.0), None),
        ];
        let tones: Vec<BarTone> = rank_top(&rows, 10).into_iter().map(|b| b.tone).collect();
        assert_eq!(
            tones,
            vec![
                BarTone::Leader,
                BarTone::Leader,
                BarTone::Leader,
                BarTone::Up,
                BarTone::Down,
                BarTone::Flat,
                BarTone::Flat,
            ]
        );
    }

    #[test]
    fn transition_tracks_rank_moves_and_converges() {
        let mut transition = RankTransition::new();
        let first = rank_top(
            &[row("A", Some(100.0), None), row("B", Some(50.0), None)],
            DEFAULT_TOP_N,
        );
        assert!(transition.update(first.clone()));
        assert!(!transition.update(first));
        assert!(transition.bars().iter().all(|b| b.movement == RankMove::New));
        assert!(transition.bars().iter().all(|b| b.shown == 0.0));

        while transition.tick() {}
        assert_eq!(transition.bars()[0].shown, 100.0);

        let second = rank_top(
            &[
                row("A", Some(100.0), None),
                row("B", Some(200.0), None),
                row("C", Some(10.0), None),
            ],
            DEFAULT_TOP_N,
        );
        assert!(transition.update(second));
        let moves: Vec<(&str, RankMove)> = transition
            .bars()
            .iter()
            .map(|b| (b.bar.name.as_str(), b.movement))
            .collect();
        assert_eq!(
            moves,
            vec![
                ("B", RankMove::Up(1)),
                ("A", RankMove::Down(1)),
                ("C", RankMove::New),
            ]
        );
        // B keeps the height it was drawn at before moving.
        assert_eq!(transition.bars()[0].shown, 50.0);
        assert_eq!(transition.max_target(), 200.0);
        while transition.tick() {}
        assert_eq!(transition.bars()[0].shown, 200.0);
    }

    #[test]
    fn clear_forgets_selection() {
        let mut transition = RankTransition::new();
        let bars = rank_top(&[row("A", Some(1.0), None)], DEFAULT_TOP_N);
        transition.update(bars.clone());
        transition.clear();
        assert!(transition.is_empty());
        assert!(transition.update(bars));
    }

    #[test]
    fn unnamed_rows_are_tracked_by_code() {
        let coded = |code: &str, amount: f64| Row {
            code: Some(code.to_string()),
            seal_amount: Some(amount),
            ..Row::default()
        };
        let mut transition = RankTransition::new();
        transition.update(rank_top(
            &[coded("600000", 3.0), coded("600001", 2.0), coded("600002", 1.0)],
            DEFAULT_TOP_N,
        ));
        assert!(transition.update(rank_top(
            &[coded("600000", 3.0), coded("600001", 2.0), coded("600002", 5.0)],
            DEFAULT_TOP_N,
        )));
        let moves: Vec<(Option<&str>, &str, RankMove)> = transition
            .bars()
            .iter()
            .map(|b| (b.bar.code.as_deref(), b.bar.name.as_str(), b.movement))
            .collect();
        assert_eq!(
            moves,
            vec![
                (Some("600002"), "-", RankMove::Up(2)),
                (Some("600000"), "-", RankMove::Down(1)),
                (Some("600001"), "-", RankMove::Down(1)),
            ]
        );
    }
}
