//! Render Hardware Interface.
//!
//! A generic front end ([`Device`], [`CommandList`], [`Fence`], pools,
//! swapchains and resource wrappers) over a [`Backend`]. Command lists record
//! a plain `Vec<Command<B>>`, so the bind/draw path is monomorphic in the
//! backend. Two backends ship: [`gpu::WgpuBackend`] and
//! [`headless::HeadlessBackend`].

pub mod backend;
pub mod command;
pub mod desc;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod fence;
pub mod gpu;
pub mod headless;
pub mod pool;
pub mod resource;
pub mod shader;
pub mod swapchain;

mod sync;

pub use backend::{Backend, Capabilities};
pub use command::{ColorAttachment, Command, CommandList, CommandListState, DepthAttachment, RenderPassDesc};
pub use desc::*;
pub use descriptor::{DescriptorHandle, DescriptorHeap, HeapKind};
pub use device::{Device, DeviceDesc};
pub use error::RhiError;
pub use fence::Fence;
pub use pool::{CommandListPool, ParallelRecordingContext, PooledList};
pub use resource::{Buffer, GraphicsPipelineDesc, Pipeline, Shader, Texture};
pub use swapchain::Swapchain;
