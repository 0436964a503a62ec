/// Supported source file extensions. Anything else produces a warn log during
/// the `initialized` stage but does not abort the job.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "m4v"];

/// Thumbnail capture timestamp, in seconds, measured from the start of the source.
pub const THUMBNAIL_TIMESTAMP_SECS: f64 = 1.0;

pub const THUMBNAIL_WIDTH: u32 = 320;
pub const THUMBNAIL_HEIGHT: u32 = 240;

/// HLS segment target duration, in seconds.
pub const HLS_SEGMENT_DURATION_SECS: u32 = 10;

pub const HLS_SEGMENT_PATTERN: &str = "index-%05d.ts";

pub const ENCODER_CRF: u32 = 23;

/// Progress checkpoints, in whole percent, for the non-resolution stages.
pub mod progress {
    pub const INITIALIZED_START: u8 = 0;
    pub const INITIALIZED_END: u8 = 5;
    pub const DOWNLOADED_END: u8 = 10;
    pub const ANALYZED_END: u8 = 12;
    pub const THUMBNAILS_END: u8 = 15;
    pub const TRANSCODED_UPLOADED_START: u8 = 15;
    pub const TRANSCODED_UPLOADED_END: u8 = 80;
    pub const MASTER_PLAYLIST_END: u8 = 85;
    pub const THUMBNAIL_UPLOAD_END: u8 = 90;
    pub const CALLBACK_END: u8 = 95;
    pub const COMPLETE: u8 = 100;

    /// Total progress budget split across all valid resolutions during the
    /// transcode+upload stage.
    pub const TRANSCODE_BUDGET: u8 = TRANSCODED_UPLOADED_END - TRANSCODED_UPLOADED_START;
}
