//! Social feed abstraction (X today; anything with "latest post by handle" later).

pub mod port;

pub use port::{FeedPort, FeedResult};
