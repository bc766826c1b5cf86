//! Raw sensor sample types.
//!
//! Samples are the empirical input to the dispatch pipeline: what the
//! hardware (or a simulated source) actually reported. Requests decide
//! what to do with them; samples themselves carry no policy.

mod heading;
mod location;

pub use heading::HeadingSample;
pub use location::LocationSample;
