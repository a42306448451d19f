use thiserror::Error;

/// Errors raised while configuring or starting the directory service.
///
/// Request handling reports [`dirpg_types::LdapError`] instead, so that every
/// failure carries a result code.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("schema error: {0}")]
    Schema(#[from] dirpg_schema::SchemaError),

    #[error("directory error: {0}")]
    Ldap(#[from] dirpg_types::LdapError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;
