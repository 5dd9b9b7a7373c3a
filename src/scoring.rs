// src/scoring.rs
//! Relevance score for a content record: popularity (with a video boost),
//! recency and engagement quality, summed.

use chrono::{DateTime, Duration, Utc};

use crate::content::{ContentKind, ContentRecord};

const VIDEO_BOOST: f64 = 1.5;

pub trait Scorer: Send + Sync {
    /// Pure function of the record and the reference time.
    fn score(&self, record: &ContentRecord, now: DateTime<Utc>) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RelevanceScorer;

impl RelevanceScorer {
    pub fn popularity(record: &ContentRecord) -> f64 {
        match record.kind {
            ContentKind::Video => {
                (record.views as f64 / 1000.0 + record.likes as f64 / 100.0) * VIDEO_BOOST
            }
            ContentKind::Text => record.reading_time as f64 + record.reactions as f64 / 50.0,
        }
    }

    pub fn recency(record: &ContentRecord, now: DateTime<Utc>) -> f64 {
        let age = now - record.created_at;
        if age <= Duration::days(7) {
            5.0
        } else if age <= Duration::days(30) {
            3.0
        } else if age <= Duration::days(90) {
            1.0
        } else {
            0.0
        }
    }

    pub fn quality(record: &ContentRecord) -> f64 {
        match record.kind {
            ContentKind::Video if record.views == 0 => 0.0,
            ContentKind::Video => record.likes as f64 / record.views as f64 * 10.0,
            ContentKind::Text if record.reading_time == 0 => 0.0,
            ContentKind::Text => record.reactions as f64 / record.reading_time as f64 * 5.0,
        }
    }
}

impl Scorer for RelevanceScorer {
    fn score(&self, record: &ContentRecord, now: DateTime<Utc>) -> f64 {
        Self::popularity(record) + Self::recency(record, now) + Self::quality(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn video_score_sums_components() {
        let mut r = ContentRecord::new("p", "p_1", "t", ContentKind::Video, now() - Duration::days(3));
        r.views = 10_000;
        r.likes = 500;
        // popularity (10 + 5) * 1.5 = 22.5, recency 5, quality 500/10000*10 = 0.5
        let s = RelevanceScorer.score(&r, now());
        assert!((s - 28.0).abs() < 1e-9, "got {s}");
    }

    #[test]
    fn text_score_without_reading_time_has_no_quality() {
        let mut r = ContentRecord::new("p", "p_2", "t", ContentKind::Text, now() - Duration::days(45));
        r.reactions = 100;
        // popularity 0 + 2, recency 1, quality 0
        let s = RelevanceScorer.score(&r, now());
        assert!((s - 3.0).abs() < 1e-9, "got {s}");
    }

    #[test]
    fn recency_buckets() {
        let at = |days| ContentRecord::new("p", "x", "t", ContentKind::Text, now() - Duration::days(days));
        assert_eq!(RelevanceScorer::recency(&at(7), now()), 5.0);
        assert_eq!(RelevanceScorer::recency(&at(8), now()), 3.0);
        assert_eq!(RelevanceScorer::recency(&at(90), now()), 1.0);
        assert_eq!(RelevanceScorer::recency(&at(91), now()), 0.0);
    }

    #[test]
    fn score_is_deterministic() {
        let r = ContentRecord::new("p", "x", "t", ContentKind::Video, now());
        assert_eq!(RelevanceScorer.score(&r, now()), RelevanceScorer.score(&r, now()));
    }
}
