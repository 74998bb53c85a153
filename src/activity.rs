use std::fmt;
use std::ops::BitOr;

/// A set of run loop phases an observer is notified about.
///
/// The phases follow one iteration of a run loop:
/// [`Entry`] once when the loop starts running, then for every cycle
/// [`BeforeTimers`], [`BeforeSources`] and, when there is nothing left to do,
/// [`BeforeWaiting`] and [`AfterWaiting`] around the blocking wait.
/// [`Exit`] is reported when the loop stops.
///
/// Observer callbacks always receive exactly one phase.
///
/// [`Entry`]: Activity::Entry
/// [`BeforeTimers`]: Activity::BeforeTimers
/// [`BeforeSources`]: Activity::BeforeSources
/// [`BeforeWaiting`]: Activity::BeforeWaiting
/// [`AfterWaiting`]: Activity::AfterWaiting
/// [`Exit`]: Activity::Exit
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Activity(u8);

macro_rules! impl_activity {
    (impl $name:ident { $($(#[$($meta:meta)*])* $vis:vis const $ident:ident: $ty:ty = $expr:expr;)* }) => {
        #[allow(non_upper_case_globals)]
        impl $name {
            /// Every phase of the loop.
            pub const All: $name = $name(0 $(| Self::$ident.0)*);

            $($(#[$($meta)*])* $vis const $ident: $ty = $expr;)*

            const NAMES: &'static [(&'static str, $name)] = &[$((stringify!($ident), Self::$ident)),*];
        }
    };
}

impl_activity! {
    impl Activity {
        /// The loop is about to start running.
        pub const Entry: Activity = Activity(1 << 0);

        /// The loop is about to process timers.
        pub const BeforeTimers: Activity = Activity(1 << 1);

        /// The loop is about to process its sources, including the normal task queue.
        pub const BeforeSources: Activity = Activity(1 << 2);

        /// The loop is about to block waiting for new work (the pre-idle phase).
        pub const BeforeWaiting: Activity = Activity(1 << 5);

        /// The loop has been woken up.
        pub const AfterWaiting: Activity = Activity(1 << 6);

        /// The loop is about to stop running.
        pub const Exit: Activity = Activity(1 << 7);
    }
}

impl Activity {
    /// Tests if `self` is a superset of `other`.
    /// In other words: Tests if all flags set in `other` are set in `self`.
    pub fn is(self, other: Self) -> bool {
        (other.0 & self.0) == other.0
    }

    /// The phases contained in either `self` or `other`.
    /// Same as `self | other`, usable in constants.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Tests if `self` shares at least one phase with `other`.
    pub fn intersects(self, other: Self) -> bool {
        (other.0 & self.0) != 0
    }

    /// Tests if `self` is empty.
    /// In other words: Tests if no flags are set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The raw bits. These match the values of `CFRunLoopActivity`.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Builds a set from raw bits, discarding bits that don't name a phase.
    pub fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::All.0)
    }
}

impl BitOr for Activity {
    type Output = Activity;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (name, activity) in Self::NAMES {
            if self.is(*activity) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}
