//! Video page interaction layer

mod video;

pub use video::{PageTimeouts, VideoPage};
