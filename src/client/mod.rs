//! Generation client: provider abstraction, Gemini backend, throttling.

mod gemini;
mod provider;
mod throttle;

pub use gemini::*;
pub use provider::*;
pub use throttle::*;
