pub type Svg2GifResult<T> = Result<T, Svg2GifError>;

#[derive(thiserror::Error, Debug)]
pub enum Svg2GifError {
    /// Rejected before a job exists: missing or unusable markup, bad config values.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("rasterizer failure: {0}")]
    Rasterizer(String),

    #[error("encoder failure: {0}")]
    Encoder(String),

    /// Unknown, expired, or not-yet-finished job identifiers all map here.
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Svg2GifError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn rasterizer(msg: impl Into<String>) -> Self {
        Self::Rasterizer(msg.into())
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::JobNotFound(id.into())
    }

    /// Re-tag any error as a rasterizer failure, prefixing the stage that failed.
    pub(crate) fn into_rasterizer(self, stage: &str) -> Self {
        match self {
            Self::Rasterizer(msg) => Self::Rasterizer(format!("{stage}: {msg}")),
            other => Self::Rasterizer(format!("{stage}: {other}")),
        }
    }

    pub(crate) fn into_encoder(self, stage: &str) -> Self {
        match self {
            Self::Encoder(msg) => Self::Encoder(format!("{stage}: {msg}")),
            other => Self::Encoder(format!("{stage}: {other}")),
        }
    }
}

impl From<gif::EncodingError> for Svg2GifError {
    fn from(e: gif::EncodingError) -> Self {
        Self::Encoder(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            Svg2GifError::invalid_input("x")
                .to_string()
                .contains("invalid input:")
        );
        assert!(
            Svg2GifError::rasterizer("x")
                .to_string()
                .contains("rasterizer failure:")
        );
        assert!(
            Svg2GifError::encoder("x")
                .to_string()
                .contains("encoder failure:")
        );
        assert!(
            Svg2GifError::job_not_found("abc")
                .to_string()
                .contains("job not found:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = Svg2GifError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn stage_context_does_not_double_prefix() {
        let err = Svg2GifError::rasterizer("tab crashed").into_rasterizer("seek 1.500s");
        assert_eq!(
            err.to_string(),
            "rasterizer failure: seek 1.500s: tab crashed"
        );

        let err = Svg2GifError::invalid_input("bad").into_encoder("append frame 3");
        assert!(matches!(err, Svg2GifError::Encoder(_)));
        assert!(err.to_string().contains("append frame 3: invalid input: bad"));
    }
}
