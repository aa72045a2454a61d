/// Note value as an exact fraction of a whole note.
///
/// Kept rational until the last step so dotted and tuplet values do not drift;
/// only [`Clock::duration`](crate::Clock::duration) turns it into samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration {
    pub numerator: u32,
    /// 4 = quarter, 16 = sixteenth (one tick)
    pub denominator: u32,
}

impl Duration {
    pub const WHOLE: Duration = Duration::new(1, 1);
    pub const HALF: Duration = Duration::new(1, 2);
    pub const QUARTER: Duration = Duration::new(1, 4);
    pub const EIGHTH: Duration = Duration::new(1, 8);
    pub const SIXTEENTH: Duration = Duration::new(1, 16);
    pub const THIRTY_SECOND: Duration = Duration::new(1, 32);

    pub const DOTTED_QUARTER: Duration = Duration::QUARTER.dotted();
    pub const EIGHTH_TRIPLET: Duration = Duration::EIGHTH.triplet();

    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// A bar of 4/4 (sixteen ticks)
    pub const fn measures(count: u32) -> Self {
        Duration::new(count, 1)
    }

    /// Multiply by 3/2
    pub const fn dotted(self) -> Self {
        Duration::new(self.numerator * 3, self.denominator * 2).reduce()
    }

    /// Three in the time of two
    pub const fn triplet(self) -> Self {
        self.tuplet(2, 3)
    }

    /// `played` notes in the time of `in_time_of`
    pub const fn tuplet(self, in_time_of: u32, played: u32) -> Self {
        Duration::new(self.numerator * in_time_of, self.denominator * played).reduce()
    }

    /// Repeat this value `count` times
    pub const fn times(self, count: u32) -> Self {
        Duration::new(self.numerator * count, self.denominator).reduce()
    }

    pub const fn add(self, other: Self) -> Self {
        Duration::new(
            self.numerator * other.denominator + other.numerator * self.denominator,
            self.denominator * other.denominator,
        )
        .reduce()
    }

    pub const fn reduce(self) -> Self {
        let gcd = gcd(self.numerator, self.denominator);
        if gcd == 0 {
            return self;
        }
        Duration::new(self.numerator / gcd, self.denominator / gcd)
    }

    /// Length in ticks (sixteenth notes); fractional for tuplets
    pub fn as_ticks(self) -> f64 {
        if self.denominator == 0 {
            return 0.0;
        }
        (self.numerator as f64 * 16.0) / self.denominator as f64
    }
}

const fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
