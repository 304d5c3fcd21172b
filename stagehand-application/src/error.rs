use stagehand_domain::error::DomainError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("domain: {0}")]
    Domain(#[from] DomainError),

    #[error("config: {0}")]
    Config(String),

    #[error("store already registered: entity_type={entity_type}")]
    AlreadyRegistered { entity_type: &'static str },
}

impl AppError {
    /// 见 `DomainError::blocks_dismissal`
    pub fn blocks_dismissal(&self) -> bool {
        matches!(self, Self::Domain(err) if err.blocks_dismissal())
    }
}
