use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersonaError {
    #[error("Parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Protocol not found: {protocol}")]
    ProtocolNotFound { protocol: String },

    #[error("Resource not found: {protocol}://{resource}")]
    ResourceNotFound { protocol: String, resource: String },

    #[error("Invalid resource reference: {0}")]
    InvalidReference(String),

    #[error("Could not resolve {reference}: {source}")]
    Compose {
        reference: String,
        #[source]
        source: Box<PersonaError>,
    },

    #[error("Nesting depth limit exceeded: {limit}")]
    DepthExceeded { limit: usize },

    #[error("Registry initialization failed: {0}")]
    Initialization(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PersonaError {
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    pub fn not_found(protocol: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            protocol: protocol.into(),
            resource: resource.into(),
        }
    }

    /// Wrap a token-level failure so it can be rendered inline.
    pub fn compose(reference: impl Into<String>, source: PersonaError) -> Self {
        Self::Compose {
            reference: reference.into(),
            source: Box::new(source),
        }
    }

    /// True for failures that belong to a single reference rather than the
    /// whole document. Composition renders these inline and returns the rest.
    pub fn is_token_level(&self) -> bool {
        matches!(
            self,
            Self::ProtocolNotFound { .. }
                | Self::ResourceNotFound { .. }
                | Self::InvalidReference(_)
                | Self::Compose { .. }
                | Self::DepthExceeded { .. }
                | Self::Io(_)
        )
    }
}

pub type PersonaResult<T> = Result<T, PersonaError>;
