use crate::history::SessionHistory;
use serde::Serialize;

/// Bumped whenever tier names or boundaries change
pub const RANK_TABLE_VERSION: u32 = 1;

/// Sessions averaged when ranking a history
pub const RANKED_SESSIONS: usize = 10;

/// XP bonus per streak point, as a fraction of the base
pub const XP_STREAK_BONUS: f64 = 0.1;

/// A rank tier covering `[min_wpm, next tier's min_wpm)`; the top tier is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankTier {
    pub name: &'static str,
    pub level: u8,
    pub min_wpm: f64,
    pub accent_color: &'static str,
}

pub static RANK_TIERS: [RankTier; 6] = [
    RankTier {
        name: "Bronze",
        level: 1,
        min_wpm: 0.0,
        accent_color: "#CD7F32",
    },
    RankTier {
        name: "Silver",
        level: 2,
        min_wpm: 40.0,
        accent_color: "#C0C0C0",
    },
    RankTier {
        name: "Gold",
        level: 3,
        min_wpm: 80.0,
        accent_color: "#FFD700",
    },
    RankTier {
        name: "Platinum",
        level: 4,
        min_wpm: 120.0,
        accent_color: "#E5E4E2",
    },
    RankTier {
        name: "Diamond",
        level: 5,
        min_wpm: 160.0,
        accent_color: "#B9F2FF",
    },
    RankTier {
        name: "Radiant",
        level: 6,
        min_wpm: 200.0,
        accent_color: "#FF6EC7",
    },
];

impl RankTier {
    fn index(&self) -> usize {
        usize::from(self.level - 1)
    }

    /// Exclusive upper bound, `None` for the top tier
    pub fn max_wpm(&self) -> Option<f64> {
        next_rank(self).map(|next| next.min_wpm)
    }

    pub fn contains(&self, wpm: f64) -> bool {
        wpm >= self.min_wpm && self.max_wpm().map_or(true, |max| wpm < max)
    }

    pub fn is_top(&self) -> bool {
        self.index() + 1 == RANK_TIERS.len()
    }
}

pub fn lowest_rank() -> &'static RankTier {
    &RANK_TIERS[0]
}

/// Negative and non-finite speeds count as standing still
fn sanitize_wpm(wpm: f64) -> f64 {
    if wpm.is_finite() {
        wpm.max(0.0)
    } else {
        0.0
    }
}

/// Tier containing `wpm`; negative or non-finite speeds fall back to the lowest tier
pub fn get_rank(wpm: f64) -> &'static RankTier {
    let wpm = sanitize_wpm(wpm);
    RANK_TIERS
        .iter()
        .rev()
        .find(|tier| wpm >= tier.min_wpm)
        .unwrap_or_else(lowest_rank)
}

pub fn next_rank(tier: &RankTier) -> Option<&'static RankTier> {
    RANK_TIERS.get(tier.index() + 1)
}

/// Position of `wpm` inside its tier as a percentage; 100 in the top tier
pub fn calculate_progress(wpm: f64) -> f64 {
    let wpm = sanitize_wpm(wpm);
    let tier = get_rank(wpm);
    match tier.max_wpm() {
        Some(max) => ((wpm - tier.min_wpm) / (max - tier.min_wpm) * 100.0).clamp(0.0, 100.0),
        None => 100.0,
    }
}

/// Speed still missing to reach the next tier; 0 at the top
pub fn wpm_to_next_rank(wpm: f64) -> f64 {
    let wpm = sanitize_wpm(wpm);
    let tier = get_rank(wpm);
    match next_rank(tier) {
        Some(next) => (next.min_wpm - wpm).max(0.0),
        None => 0.0,
    }
}

/// Experience for one session: accuracy-weighted speed, boosted 10% per streak point
pub fn calculate_xp(wpm: f64, accuracy: f64, streak: u32) -> u64 {
    let accuracy = if accuracy.is_finite() {
        accuracy.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let base = sanitize_wpm(wpm) * accuracy / 100.0;
    let multiplier = 1.0 + f64::from(streak) * XP_STREAK_BONUS;
    (base * multiplier).round() as u64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankChange {
    pub from: &'static RankTier,
    pub to: &'static RankTier,
}

impl RankChange {
    pub fn is_promotion(&self) -> bool {
        self.to.level > self.from.level
    }
}

/// Tier transition between two speeds, if they fall in different tiers
pub fn rank_change(previous_wpm: f64, current_wpm: f64) -> Option<RankChange> {
    let from = get_rank(previous_wpm);
    let to = get_rank(current_wpm);
    (from.level != to.level).then_some(RankChange { from, to })
}

/// Where a typist stands, ranked on the average of their recent sessions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankProgress {
    pub average_wpm: f64,
    pub peak_wpm: f64,
    pub rank: &'static RankTier,
    pub progress: f64,
    pub wpm_to_next: f64,
}

impl RankProgress {
    pub fn for_wpm(wpm: f64) -> Self {
        let wpm = sanitize_wpm(wpm);
        Self {
            average_wpm: wpm,
            peak_wpm: wpm,
            rank: get_rank(wpm),
            progress: calculate_progress(wpm),
            wpm_to_next: wpm_to_next_rank(wpm),
        }
    }

    pub fn from_history(history: &SessionHistory) -> Self {
        let average_wpm = history.average_wpm(RANKED_SESSIONS).unwrap_or(0.0);
        Self {
            average_wpm: average_wpm.round(),
            peak_wpm: history.peak_wpm().unwrap_or(0.0).round(),
            rank: get_rank(average_wpm),
            progress: calculate_progress(average_wpm),
            wpm_to_next: wpm_to_next_rank(average_wpm),
        }
    }
}
