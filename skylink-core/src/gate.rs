use jiff::{SignedDuration, Timestamp};

/// Time-based throttle for publishing the combined snapshot.
///
/// The gate fires at most once per interval and never queues: whatever the
/// snapshot holds at the next firing is what gets sent. A gate that has never
/// fired opens on the first update.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishGate {
    last_fire: Option<Timestamp>,
}

impl PublishGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_fire(&self) -> Option<Timestamp> {
        self.last_fire
    }

    /// Returns true, and records `now` as the last firing, when more than
    /// `interval` has passed since the previous firing.
    pub fn should_fire(&mut self, now: Timestamp, interval: SignedDuration) -> bool {
        let open = match self.last_fire {
            None => true,
            Some(last) => now.duration_since(last) > interval,
        };

        if open {
            self.last_fire = Some(now);
        }
        open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_second(secs).unwrap()
    }

    fn decisions(gate: &mut PublishGate, times: &[i64], interval: SignedDuration) -> Vec<bool> {
        times
            .iter()
            .map(|&t| gate.should_fire(at(t), interval))
            .collect()
    }

    #[test]
    fn throttles_to_one_fire_per_interval() {
        let mut gate = PublishGate::new();
        let interval = SignedDuration::from_secs(15);

        assert_eq!(
            decisions(&mut gate, &[0, 5, 14, 16, 31, 32], interval),
            vec![true, false, false, true, false, true]
        );
        assert_eq!(gate.last_fire(), Some(at(32)));
    }

    #[test]
    fn exactly_one_interval_does_not_fire() {
        let mut gate = PublishGate::new();
        let interval = SignedDuration::from_secs(15);

        assert!(gate.should_fire(at(100), interval));
        assert!(!gate.should_fire(at(115), interval));
        assert!(gate.should_fire(at(115) + SignedDuration::from_millis(1), interval));
    }

    #[test]
    fn first_update_after_startup_fires() {
        let mut gate = PublishGate::new();
        assert_eq!(gate.last_fire(), None);
        assert!(gate.should_fire(Timestamp::now(), SignedDuration::from_secs(3600)));
    }

    #[test]
    fn suppressed_calls_do_not_move_the_window() {
        let mut gate = PublishGate::new();
        let interval = SignedDuration::from_secs(10);

        assert!(gate.should_fire(at(0), interval));
        for t in 1..=10 {
            assert!(!gate.should_fire(at(t), interval));
        }
        assert_eq!(gate.last_fire(), Some(at(0)));
        assert!(gate.should_fire(at(11), interval));
    }

    #[test]
    fn clock_stepping_backwards_does_not_fire() {
        let mut gate = PublishGate::new();
        let interval = SignedDuration::from_secs(15);

        assert!(gate.should_fire(at(1_000), interval));
        assert!(!gate.should_fire(at(900), interval));
    }
}
