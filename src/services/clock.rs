//! Wall-clock source for expiry decisions.

use chrono::{DateTime, Utc};

/// Supplies "now" to code that evaluates expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub mod testing {
    use super::Clock;
    use chrono::{DateTime, Duration, Utc};
    use std::{collections::VecDeque, sync::Mutex};

    /// A clock that only moves when told to.
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    /// Answers each `now()` with the next scripted instant, then keeps
    /// repeating the last one.
    pub struct ScriptedClock {
        times: Mutex<VecDeque<DateTime<Utc>>>,
    }

    impl ScriptedClock {
        pub fn new(times: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
            let times: VecDeque<_> = times.into_iter().collect();
            assert!(!times.is_empty(), "a scripted clock needs at least one instant");
            Self {
                times: Mutex::new(times),
            }
        }
    }

    impl Clock for ScriptedClock {
        fn now(&self) -> DateTime<Utc> {
            let mut times = self.times.lock().unwrap();
            if times.len() > 1 {
                times.pop_front().unwrap()
            } else {
                times[0]
            }
        }
    }
}
