// Error types shared by the players, the extractor and the backend client

// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

// Everything that can go wrong while driving the players or talking to the backend.
//
// None of these are fatal: the UI turns them into a notification and carries on.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // The URL input was empty
    #[error("Please paste a YouTube URL")]
    EmptyUrl,

    // Neither a playlist nor a video id could be found in the input
    #[error("Invalid URL: use a YouTube playlist or video URL")]
    InvalidUrl,

    // HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    // JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    // Malformed backend URL
    #[error("Invalid backend URL: {0}")]
    Url(#[from] url::ParseError),

    // IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Backend answered with an unexpected status and no error body
    #[error("Backend returned status {0}")]
    Status(reqwest::StatusCode),

    // Backend reported a business failure; the message is shown verbatim
    #[error("{0}")]
    Backend(String),

    // yt-dlp failed or returned something unusable
    #[error("yt-dlp: {0}")]
    Extractor(String),

    // Audio could not be decoded or played
    #[error("Audio error: {0}")]
    Audio(String),

    // Configuration could not be read
    #[error("Config error: {0}")]
    Config(String),
}
