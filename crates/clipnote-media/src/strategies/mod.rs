//! Concrete acquisition strategies.

mod oembed;
mod tikwm;
mod ytdlp;

pub use oembed::OEmbedStrategy;
pub use tikwm::TikwmStrategy;
pub use ytdlp::YtDlpStrategy;
