use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    ConstantBuffer,
    Texture,
    Sampler,
    Uav,
    StructuredBuffer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantBufferInfo {
    pub name: String,
    pub size: u32,
    pub bind_point: u32,
    pub space: u32,
    pub variables: Vec<VariableInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundResource {
    pub name: String,
    pub kind: ResourceKind,
    pub bind_point: u32,
    pub space: u32,
    pub count: u32,
}

/// Resource interface of one compiled entry point's module.
/// `bind_point` is the binding index, `space` the bind group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflection {
    pub constant_buffers: Vec<ConstantBufferInfo>,
    pub resources: Vec<BoundResource>,
}

impl Reflection {
    pub fn from_module(module: &naga::Module) -> Self {
        let mut reflection = Reflection::default();
        for (_, var) in module.global_variables.iter() {
            let Some(binding) = var.binding.as_ref() else { continue };
            let name = var.name.clone().unwrap_or_default();
            let mut inner = &module.types[var.ty].inner;
            let mut count = 1;
            if let naga::TypeInner::BindingArray { base, size } = inner {
                count = match size {
                    naga::ArraySize::Constant(n) => n.get(),
                    _ => 0,
                };
                inner = &module.types[*base].inner;
            }

            let kind = match var.space {
                naga::AddressSpace::Uniform => {
                    reflection.constant_buffers.push(ConstantBufferInfo {
                        name: name.clone(),
                        size: inner.size(module.to_ctx()),
                        bind_point: binding.binding,
                        space: binding.group,
                        variables: struct_members(module, inner),
                    });
                    ResourceKind::ConstantBuffer
                }
                naga::AddressSpace::Storage { access } => {
                    if access.contains(naga::StorageAccess::STORE) {
                        ResourceKind::Uav
                    } else {
                        ResourceKind::StructuredBuffer
                    }
                }
                naga::AddressSpace::Handle => match inner {
                    naga::TypeInner::Sampler { .. } => ResourceKind::Sampler,
                    naga::TypeInner::Image { class: naga::ImageClass::Storage { .. }, .. } => ResourceKind::Uav,
                    _ => ResourceKind::Texture,
                },
                _ => continue,
            };
            reflection.resources.push(BoundResource {
                name,
                kind,
                bind_point: binding.binding,
                space: binding.group,
                count,
            });
        }
        reflection
    }

    pub fn constant_buffer(&self, name: &str) -> Option<&ConstantBufferInfo> {
        self.constant_buffers.iter().find(|cb| cb.name == name)
    }
}

fn struct_members(module: &naga::Module, inner: &naga::TypeInner) -> Vec<VariableInfo> {
    match inner {
        naga::TypeInner::Struct { members, .. } => members
            .iter()
            .map(|m| VariableInfo {
                name: m.name.clone().unwrap_or_default(),
                offset: m.offset,
                size: module.types[m.ty].inner.size(module.to_ctx()),
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflects_uniforms_textures_and_samplers() {
        let src = r#"
struct Camera { view_proj: mat4x4<f32>, eye: vec4<f32>, time: f32 }
@group(0) @binding(0) var<uniform> camera: Camera;
@group(0) @binding(2) var albedo: texture_2d<f32>;
@group(0) @binding(3) var samp: sampler;
@fragment fn PSMain() -> @location(0) vec4<f32> {
    return textureSample(albedo, samp, vec2<f32>(0.5)) * camera.time;
}
"#;
        let module = naga::front::wgsl::parse_str(src).unwrap();
        let r = Reflection::from_module(&module);
        let cb = r.constant_buffer("camera").unwrap();
        assert_eq!(cb.bind_point, 0);
        assert_eq!(cb.variables.len(), 3);
        assert_eq!(cb.variables[1].offset, 64);
        assert_eq!(cb.variables[2].offset, 80);
        assert_eq!(cb.size, 96);
        let kinds: Vec<_> = r.resources.iter().map(|b| (b.bind_point, b.kind)).collect();
        assert!(kinds.contains(&(0, ResourceKind::ConstantBuffer)));
        assert!(kinds.contains(&(2, ResourceKind::Texture)));
        assert!(kinds.contains(&(3, ResourceKind::Sampler)));
    }
}
