use chrono::{DateTime, FixedOffset, Utc};

/// Wall clock in the school's local offset.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

pub struct LocalClock {
    offset: FixedOffset,
}

impl LocalClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for LocalClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) struct FixedClock(pub DateTime<FixedOffset>);

    impl FixedClock {
        /// 2024-05-24 at the given local time, UTC+7.
        pub(crate) fn at(hour: u32, minute: u32) -> Self {
            FixedClock(
                FixedOffset::east_opt(7 * 3600)
                    .unwrap()
                    .with_ymd_and_hms(2024, 5, 24, hour, minute, 0)
                    .unwrap(),
            )
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<FixedOffset> {
            self.0
        }
    }

    #[test]
    fn local_clock_uses_offset() {
        let wib = FixedOffset::east_opt(7 * 3600).unwrap();
        assert_eq!(LocalClock::new(wib).now().offset(), &wib);
    }
}
