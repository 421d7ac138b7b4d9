use thiserror::Error;

use crate::command::CommandListState;
use crate::descriptor::HeapKind;

#[derive(Debug, Error)]
pub enum RhiError {
    #[error("no suitable adapter: {0}")]
    NoAdapter(String),
    #[error("device request failed: {0}")]
    DeviceRequest(String),
    #[error("buffer creation failed: {0}")]
    BufferCreation(String),
    #[error("texture creation failed: {0}")]
    TextureCreation(String),
    #[error("shader creation failed: {0}")]
    ShaderCreation(String),
    #[error("pipeline creation failed: {0}")]
    PipelineCreation(String),
    #[error("surface error: {0}")]
    Surface(String),
    #[error("{kind:?} descriptor heap exhausted ({capacity} descriptors)")]
    HeapExhausted { kind: HeapKind, capacity: u32 },
    #[error("command list is {found:?}, expected {expected:?}")]
    InvalidState { expected: CommandListState, found: CommandListState },
    #[error("readback failed: {0}")]
    Readback(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}
