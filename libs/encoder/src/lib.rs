pub mod driver;
pub mod error;
pub mod playlist;
pub mod probe;

pub use driver::{EncoderDriver, FfmpegDriver, ProgressCallback};
pub use error::EncoderError;
pub use playlist::{master_playlist, RenditionEntry};
pub use probe::ProbeResult;
