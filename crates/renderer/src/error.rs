use rhi::shader::ShaderError;
use rhi::RhiError;
use thiserror::Error;
use types::MeshDataError;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Rhi(#[from] RhiError),
    #[error("invalid mesh: {0}")]
    Mesh(#[from] MeshDataError),
    #[error(transparent)]
    ShaderCache(#[from] ShaderError),
    #[error("shader `{0}` failed to compile")]
    Shader(String),
    #[error("reading {path}: {source}")]
    ConfigIo { path: String, source: std::io::Error },
    #[error("parsing render config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("invalid render config: {0}")]
    InvalidConfig(String),
}
