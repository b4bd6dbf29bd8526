#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Generic {0}")]
    Generic(String),

    #[error("Recognizer failed: {0}")]
    Recognizer(String),

    #[error("Recognizer returned HTTP {status}: {body}")]
    RecognizerHttp { status: u16, body: String },
}
