//! Runtime seams: time and randomness.
//!
//! Both are injected into every component that needs them so that proration,
//! bucketing and simulated outcomes can be tested deterministically.

mod clock;
mod random;

pub use clock::{Clock, ManualClock, SystemClock};
pub use random::{FixedRandom, RandomSource, SeededRandom, ThreadRandom, synthetic_ipv4};
