use std::time::Duration;

use rand::Rng;

/// Delay ranges used to spread replies out over time. All draws are
/// uniform; the point is non-deterministic pacing that looks like a
/// person working through a comment section, not statistical realism.
#[derive(Debug, Clone)]
pub struct PacingProfile {
    pub before_reply_ms: (u64, u64),
    pub after_reply_ms: (u64, u64),
    pub inter_batch_secs: (u64, u64),
    pub inter_video_secs: (u64, u64),
    pub batch_size: (usize, usize),
}

impl PacingProfile {
    /// Human-paced defaults used in production.
    pub fn human() -> Self {
        Self {
            before_reply_ms: (800, 3500),
            after_reply_ms: (1000, 2500),
            inter_batch_secs: (90, 180),
            inter_video_secs: (5, 15),
            batch_size: (8, 15),
        }
    }

    /// Zero-delay profile for local runs and tests.
    pub fn immediate() -> Self {
        Self {
            before_reply_ms: (0, 0),
            after_reply_ms: (0, 0),
            inter_batch_secs: (0, 0),
            inter_video_secs: (0, 0),
            batch_size: (8, 15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DelayPacer {
    profile: PacingProfile,
}

impl DelayPacer {
    pub fn new(profile: PacingProfile) -> Self {
        Self { profile }
    }

    pub fn human() -> Self {
        Self::new(PacingProfile::human())
    }

    /// Reading/thinking time before a reply goes out.
    pub fn before_reply_delay(&self) -> Duration {
        uniform_ms(self.profile.before_reply_ms)
    }

    /// Cool-down after a reply.
    pub fn after_reply_delay(&self) -> Duration {
        uniform_ms(self.profile.after_reply_ms)
    }

    /// Longer break between reply batches.
    pub fn inter_batch_delay(&self) -> Duration {
        uniform_secs(self.profile.inter_batch_secs)
    }

    /// Pause between videos within one scheduler tick.
    pub fn inter_video_delay(&self) -> Duration {
        uniform_secs(self.profile.inter_video_secs)
    }

    /// Random batch size so reply bursts do not form a fixed pattern.
    pub fn batch_size(&self) -> usize {
        let (lo, hi) = self.profile.batch_size;
        rand::thread_rng().gen_range(lo..=hi)
    }

    pub async fn pause_before_reply(&self) {
        tokio::time::sleep(self.before_reply_delay()).await;
    }

    pub async fn pause_after_reply(&self) {
        tokio::time::sleep(self.after_reply_delay()).await;
    }

    pub async fn pause_between_videos(&self) {
        tokio::time::sleep(self.inter_video_delay()).await;
    }
}

fn uniform_ms((lo, hi): (u64, u64)) -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

fn uniform_secs((lo, hi): (u64, u64)) -> Duration {
    Duration::from_secs(rand::thread_rng().gen_range(lo..=hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_delays_stay_in_range() {
        let pacer = DelayPacer::human();
        for _ in 0..100 {
            let before = pacer.before_reply_delay();
            assert!(before >= Duration::from_millis(800) && before <= Duration::from_millis(3500));

            let after = pacer.after_reply_delay();
            assert!(after >= Duration::from_millis(1000) && after <= Duration::from_millis(2500));

            let batch = pacer.inter_batch_delay();
            assert!(batch >= Duration::from_secs(90) && batch <= Duration::from_secs(180));

            let video = pacer.inter_video_delay();
            assert!(video >= Duration::from_secs(5) && video <= Duration::from_secs(15));
        }
    }

    #[test]
    fn batch_size_stays_in_range() {
        let pacer = DelayPacer::human();
        for _ in 0..100 {
            let size = pacer.batch_size();
            assert!((8..=15).contains(&size));
        }
    }

    #[test]
    fn immediate_profile_produces_zero_delays() {
        let pacer = DelayPacer::new(PacingProfile::immediate());
        assert_eq!(pacer.before_reply_delay(), Duration::ZERO);
        assert_eq!(pacer.after_reply_delay(), Duration::ZERO);
        assert_eq!(pacer.inter_video_delay(), Duration::ZERO);
    }
}
