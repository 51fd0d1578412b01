use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::GapConfig;
use crate::models::{Occurrence, Suggestion, SuggestionKind};
use crate::store::TaskStore;

/// Occurrences this long or longer are treated as full-day and ignored.
const FULL_DAY_MINUTES: u32 = 1440;

struct FillerIdea {
    kind: SuggestionKind,
    title: &'static str,
    details: &'static str,
    duration: u32,
}

const FILLER_IDEAS: &[FillerIdea] = &[
    FillerIdea {
        kind: SuggestionKind::WellBeing,
        title: "Take a 10-min walk",
        details: "Stretch your legs and get some fresh air.",
        duration: 10,
    },
    FillerIdea {
        kind: SuggestionKind::Leisure,
        title: "Tidy your desk",
        details: "A tidy space for a tidy mind.",
        duration: 15,
    },
    FillerIdea {
        kind: SuggestionKind::WellBeing,
        title: "Prep a healthy snack",
        details: "Grab an apple or some nuts.",
        duration: 5,
    },
    FillerIdea {
        kind: SuggestionKind::WellBeing,
        title: "Quick meditation session",
        details: "Use a mindfulness app or just focus on your breath.",
        duration: 10,
    },
    FillerIdea {
        kind: SuggestionKind::TaskBreakdown,
        title: "Review tomorrow's plan",
        details: "Briefly look at tomorrow's tasks.",
        duration: 5,
    },
    FillerIdea {
        kind: SuggestionKind::Leisure,
        title: "Read an article",
        details: "Catch up on industry news or a personal interest.",
        duration: 20,
    },
];

/// An idle interval inside the working window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Gap {
    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

fn at(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    date.and_time(time)
        .and_local_timezone(offset)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

/// First gap of at least `min_gap_minutes` in the working window of `date`.
///
/// Holidays and full-day occurrences are ignored. Occurrences starting after
/// the window closes are skipped. An empty `today` counts as one big gap.
pub fn find_gap(
    occurrences: &[Occurrence],
    date: NaiveDate,
    today: NaiveDate,
    config: &GapConfig,
    offset: FixedOffset,
) -> Option<Gap> {
    let window_start = at(date, config.work_start, offset)?;
    let window_end = at(date, config.work_end, offset)?;
    let min_gap = Duration::minutes(i64::from(config.min_gap_minutes));

    let mut timed: Vec<(DateTime<Utc>, DateTime<Utc>)> = occurrences
        .iter()
        .filter(|o| !o.task.is_holiday && o.task.duration < FULL_DAY_MINUTES)
        .filter_map(|o| Some((o.start()?, o.end()?)))
        .collect();
    timed.sort_by_key(|(start, _)| *start);

    if timed.is_empty() && date == today {
        return Some(Gap { start: window_start, end: window_end });
    }

    let mut last_end = window_start;
    for (start, end) in timed {
        if start > window_end {
            continue;
        }
        if start - last_end >= min_gap {
            return Some(Gap { start: last_end, end: start });
        }
        last_end = last_end.max(end);
    }
    if window_end - last_end >= min_gap {
        return Some(Gap { start: last_end, end: window_end });
    }
    None
}

/// Picks `count` distinct ideas from the filler catalog.
pub fn sample_fillers<R: Rng + ?Sized>(date: NaiveDate, count: usize, rng: &mut R) -> Vec<Suggestion> {
    FILLER_IDEAS
        .choose_multiple(rng, count)
        .enumerate()
        .map(|(i, idea)| Suggestion {
            id: format!("filler-{}-{}", i, date),
            kind: idea.kind,
            title: idea.title.to_string(),
            details: idea.details.to_string(),
            duration: Some(idea.duration),
        })
        .collect()
}

/// Filler ideas for `date` when it has a qualifying gap, else nothing.
pub fn time_filler_candidates<R: Rng + ?Sized>(
    store: &TaskStore,
    date: NaiveDate,
    today: NaiveDate,
    config: &GapConfig,
    rng: &mut R,
) -> Vec<Suggestion> {
    let occurrences = store.occurrences_on(date);
    match find_gap(&occurrences, date, today, config, store.offset()) {
        Some(_) => sample_fillers(date, config.sample_size, rng),
        None => Vec::new(),
    }
}
