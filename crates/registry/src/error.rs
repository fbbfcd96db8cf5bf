use normalizers::NormalizeError;

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no normalizer registered for format '{0}'")]
    UnknownFormat(String),

    #[error("cannot convert {source_format} -> {target_format}: {reason}")]
    Incompatible {
        source_format: &'static str,
        target_format: &'static str,
        reason: &'static str,
    },

    #[error("format conversion failed: {0}")]
    Conversion(#[from] NormalizeError),
}
