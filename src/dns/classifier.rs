//! Per-question block/allow decision.
//!
//! The classifier consults the pause controller first (resolving an expired
//! session on the way) and then the block set. Every classification is
//! counted once in the stats ledger and the activity ring and handed to the
//! query log.

use std::sync::Arc;

use tracing::debug;

use super::blocker::{BlockSet, clean_domain};
use crate::pause::PauseController;
use crate::query_log::{JsonLinesLog, QueryLog};
use crate::stats::{ActivityRing, StatsLedger};

/// Outcome for one DNS question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Blocked,
    Allowed,
}

/// A verdict and the domain it was made for, without the root dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    pub domain: String,
}

impl Classification {
    pub fn is_blocked(&self) -> bool {
        self.verdict == Verdict::Blocked
    }
}

/// Decides and records verdicts for query names.
pub struct Classifier {
    block_set: Arc<BlockSet>,
    pause: Arc<PauseController>,
    ledger: Arc<StatsLedger>,
    activity: Arc<ActivityRing>,
    query_log: Arc<dyn QueryLog>,
}

impl Classifier {
    /// Create a classifier with query logging disabled.
    pub fn new(
        block_set: Arc<BlockSet>,
        pause: Arc<PauseController>,
        ledger: Arc<StatsLedger>,
        activity: Arc<ActivityRing>,
    ) -> Self {
        Self {
            block_set,
            pause,
            ledger,
            activity,
            query_log: Arc::new(JsonLinesLog::disabled()),
        }
    }

    #[must_use]
    pub fn with_query_log(mut self, query_log: Arc<dyn QueryLog>) -> Self {
        self.query_log = query_log;
        self
    }

    /// Decide a verdict for `name` without recording it.
    pub fn decide(&self, name: &str) -> Verdict {
        if self.pause.is_paused() {
            return Verdict::Allowed;
        }
        if self.block_set.is_blocked(name) {
            Verdict::Blocked
        } else {
            Verdict::Allowed
        }
    }

    /// Decide a verdict for one question and record it.
    pub fn classify(&self, name: &str, query_type: &str) -> Classification {
        let verdict = self.decide(name);
        let domain = clean_domain(name).to_string();
        let blocked = verdict == Verdict::Blocked;

        self.activity.record();
        self.ledger.record_request(&domain, blocked);
        self.query_log.record(&domain, blocked, query_type);
        crate::metrics::record_verdict(blocked);
        debug!(domain = %domain, query_type, blocked, "classified query");

        Classification { verdict, domain }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingLog {
        entries: Mutex<Vec<(String, bool, String)>>,
    }

    impl QueryLog for RecordingLog {
        fn record(&self, domain: &str, blocked: bool, query_type: &str) {
            self.entries
                .lock()
                .push((domain.to_string(), blocked, query_type.to_string()));
        }
    }

    struct Fixture {
        classifier: Classifier,
        pause: Arc<PauseController>,
        ledger: Arc<StatsLedger>,
        activity: Arc<ActivityRing>,
    }

    fn fixture(sites: &[&str], window: Duration) -> Fixture {
        let ledger = Arc::new(StatsLedger::new());
        let activity = Arc::new(ActivityRing::new());
        let pause = Arc::new(PauseController::with_window(Arc::clone(&ledger), window));
        let classifier = Classifier::new(
            Arc::new(BlockSet::new(sites)),
            Arc::clone(&pause),
            Arc::clone(&ledger),
            Arc::clone(&activity),
        );
        Fixture {
            classifier,
            pause,
            ledger,
            activity,
        }
    }

    #[test]
    fn should_block_entry_and_subdomains_only() {
        let f = fixture(&["blocked.com"], Duration::from_secs(600));

        assert_eq!(f.classifier.decide("blocked.com."), Verdict::Blocked);
        assert_eq!(f.classifier.decide("a.b.blocked.com."), Verdict::Blocked);
        assert_eq!(f.classifier.decide("xblocked.com."), Verdict::Allowed);
        assert_eq!(f.classifier.decide("notblocked.com."), Verdict::Allowed);
    }

    #[test]
    fn should_strip_root_dot_from_domain() {
        let f = fixture(&["blocked.com"], Duration::from_secs(600));

        let classification = f.classifier.classify("www.blocked.com.", "A");
        assert!(classification.is_blocked());
        assert_eq!(classification.domain, "www.blocked.com");
    }

    #[test]
    fn should_record_every_classification_once() {
        let f = fixture(&["blocked.com"], Duration::from_secs(600));

        f.classifier.classify("blocked.com.", "A");
        f.classifier.classify("allowed.com.", "A");
        f.classifier.classify("allowed.com.", "AAAA");

        let counts = f.ledger.counts();
        assert_eq!((counts.total, counts.blocked, counts.allowed), (3, 1, 2));
        assert_eq!(f.activity.snapshot().iter().sum::<u64>(), 3);
    }

    #[test]
    fn should_not_record_when_only_deciding() {
        let f = fixture(&["blocked.com"], Duration::from_secs(600));

        f.classifier.decide("blocked.com.");

        assert_eq!(f.ledger.counts().total, 0);
        assert_eq!(f.activity.snapshot().iter().sum::<u64>(), 0);
    }

    #[test]
    fn should_allow_everything_while_paused() {
        let f = fixture(&["blocked.com"], Duration::from_secs(600));
        f.pause.pause();

        let classification = f.classifier.classify("blocked.com.", "A");

        assert_eq!(classification.verdict, Verdict::Allowed);
        assert_eq!(f.ledger.counts().allowed, 1);
    }

    #[test]
    fn should_block_again_after_pause_expires() {
        let f = fixture(&["blocked.com"], Duration::from_millis(40));
        f.pause.pause();

        assert_eq!(f.classifier.decide("blocked.com."), Verdict::Allowed);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(f.classifier.decide("blocked.com."), Verdict::Blocked);
        assert!(!f.pause.is_paused());
    }

    #[test]
    fn should_forward_classifications_to_query_log() {
        let f = fixture(&["blocked.com"], Duration::from_secs(600));
        let log = Arc::new(RecordingLog::default());
        let classifier = f
            .classifier
            .with_query_log(Arc::clone(&log) as Arc<dyn QueryLog>);

        classifier.classify("blocked.com.", "A");
        classifier.classify("ok.net.", "MX");

        let entries = log.entries.lock();
        assert_eq!(
            *entries,
            vec![
                ("blocked.com".to_string(), true, "A".to_string()),
                ("ok.net".to_string(), false, "MX".to_string()),
            ]
        );
    }
}
