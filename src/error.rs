pub type ReelsmithResult<T> = Result<T, ReelsmithError>;

#[derive(thiserror::Error, Debug)]
pub enum ReelsmithError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("export precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("media error: {0}")]
    Media(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("segmentation error: {0}")]
    Segment(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One variant per export precondition, so callers can tell exactly which
/// gate rejected a project before rendering started.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("project title must not be empty")]
    EmptyTitle,

    #[error("project must contain at least one slide")]
    NoSlides,

    #[error("slide {index} ('{id}') has no media")]
    SlideMissingMedia { index: usize, id: String },

    #[error("a closing vignette video must be set before export")]
    MissingVignette,

    #[error("slide {index} caption exceeds {max} characters")]
    CaptionTooLong { index: usize, max: usize },

    #[error("slide {index} requested duration must be within {min}..={max} seconds")]
    DurationOutOfRange { index: usize, min: u32, max: u32 },

    #[error("a caption font is required because at least one slide has a caption")]
    MissingCaptionFont,
}

impl ReelsmithError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn segment(msg: impl Into<String>) -> Self {
        Self::Segment(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ReelsmithError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(ReelsmithError::media("x").to_string().contains("media error:"));
        assert!(
            ReelsmithError::encode("x")
                .to_string()
                .contains("encode error:")
        );
        assert!(
            ReelsmithError::segment("x")
                .to_string()
                .contains("segmentation error:")
        );
    }

    #[test]
    fn preconditions_are_distinguishable() {
        let a = ReelsmithError::from(PreconditionError::NoSlides);
        let b = ReelsmithError::from(PreconditionError::MissingVignette);
        assert!(matches!(
            a,
            ReelsmithError::Precondition(PreconditionError::NoSlides)
        ));
        assert!(matches!(
            b,
            ReelsmithError::Precondition(PreconditionError::MissingVignette)
        ));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ReelsmithError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
