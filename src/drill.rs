use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;

/// Letters drilled when the profile has nothing to target yet
pub const FALLBACK_KEYS: [char; 7] = ['a', 'e', 'r', 's', 't', 'l', 'n'];

const WEAK_WORD_POOL_SHARE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrillConfig {
    pub word_count: usize,
    pub min_word_len: usize,
    pub max_word_len: usize,
}

impl Default for DrillConfig {
    fn default() -> Self {
        Self {
            word_count: 30,
            min_word_len: 3,
            max_word_len: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drill {
    pub title: String,
    pub keys: Vec<char>,
    pub content: String,
    /// False when the drill fell back to the common-letter set
    pub targeted: bool,
}

fn drillable(keys: &[char]) -> Vec<char> {
    keys.iter()
        .copied()
        .filter(|c| !c.is_control() && !c.is_whitespace())
        .unique()
        .collect()
}

/// Build practice text out of random patterns over the critical keys
pub fn generate_drill<R: Rng>(critical_keys: &[char], config: &DrillConfig, rng: &mut R) -> Drill {
    let targets = drillable(critical_keys);
    let targeted = !targets.is_empty();
    let keys = if targeted {
        targets
    } else {
        FALLBACK_KEYS.to_vec()
    };

    let min_len = config.min_word_len.max(1);
    let max_len = config.max_word_len.max(min_len);
    let mut patterns = Vec::with_capacity(config.word_count);
    for _ in 0..config.word_count {
        let len = rng.gen_range(min_len..=max_len);
        let mut pattern = String::with_capacity(len);
        for _ in 0..len {
            if let Some(key) = keys.choose(rng) {
                pattern.push(*key);
            }
        }
        patterns.push(pattern);
    }
    let content = patterns.join(" ");

    let title = if targeted {
        format!(
            "Practice: {}",
            keys.iter().map(|k| k.to_uppercase().to_string()).join(", ")
        )
    } else {
        "Speed Drill".to_string()
    };

    tracing::debug!(keys = ?keys, targeted, "generated drill");
    Drill {
        title,
        keys,
        content,
        targeted,
    }
}

/// Share of a word's characters that are critical keys
fn weakness_score(word: &str, critical_keys: &[char]) -> f64 {
    let total = word.chars().count();
    if total == 0 {
        return 0.0;
    }
    let hits = word
        .chars()
        .filter(|c| {
            let lower = c.to_lowercase().next().unwrap_or(*c);
            critical_keys.contains(c) || critical_keys.contains(&lower)
        })
        .count();
    hits as f64 / total as f64
}

/// Pick practice words from a dictionary, favouring words dense in critical keys.
///
/// Words are ranked by how much of them is made of critical keys and `count`
/// are sampled from the top 30% (never fewer than `count`). Without critical
/// keys the whole dictionary is sampled uniformly.
pub fn select_practice_words<R: Rng>(
    words: &[String],
    critical_keys: &[char],
    count: usize,
    rng: &mut R,
) -> Vec<String> {
    if critical_keys.is_empty() {
        return words.choose_multiple(rng, count).cloned().collect();
    }

    let scored: Vec<(&String, f64)> = words
        .iter()
        .map(|word| (word, weakness_score(word, critical_keys)))
        .sorted_by(|a, b| b.1.total_cmp(&a.1))
        .collect();

    let pool_size = ((scored.len() as f64 * WEAK_WORD_POOL_SHARE) as usize)
        .max(count)
        .min(scored.len());

    scored[..pool_size]
        .choose_multiple(rng, count)
        .map(|(word, _)| (*word).clone())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Move on to the given lesson
    Advance(u32),
    Repeat,
    /// Drill the given keys before continuing
    Drill(Vec<char>),
}

pub const REPEAT_BELOW_ACCURACY: f64 = 90.0;
pub const PASSING_ACCURACY: f64 = 98.0;
pub const PASSING_WPM: f64 = 30.0;
const DRILL_MIN_KEYS: usize = 3;
const DRILL_MAX_KEYS: usize = 4;

/// Decide what a learner should do after finishing `lesson_id`
pub fn decide_next_step(
    lesson_id: u32,
    wpm: f64,
    accuracy: f64,
    critical_keys: &[char],
) -> NextStep {
    if accuracy < REPEAT_BELOW_ACCURACY {
        return NextStep::Repeat;
    }

    let targets = drillable(critical_keys);
    if targets.len() >= DRILL_MIN_KEYS {
        return NextStep::Drill(targets.into_iter().take(DRILL_MAX_KEYS).collect());
    }

    if accuracy >= PASSING_ACCURACY && wpm >= PASSING_WPM {
        return NextStep::Advance(lesson_id.saturating_add(1));
    }

    NextStep::Repeat
}
