//! One resource manager per resource kind
//!
//! A backend names its native representation of each kind through
//! [`ResourceTypes`]; the database gives every kind the same create /
//! lookup / destroy surface. Kinds never mix because each manager is keyed
//! by its own handle type.

use crate::render::api::handle::{
    self, BufferHandle, DescriptorSetHandle, DescriptorSetLayoutHandle, PipelineHandle,
    SamplerHandle, ShaderHandle, TextureHandle,
};
use crate::render::api::descriptions::{DescriptorBinding, DescriptorResource, DescriptorWrite};
use crate::render::api::resource_manager::ResourceManager;
use crate::render::api::types::DescriptorType;
use crate::render::error::{RalError, RalResult};

/// Native resource representation chosen by a backend
pub trait ResourceTypes {
    type Buffer;
    type Texture;
    type Shader;
    type Pipeline;
    type DescriptorSet;
    type DescriptorSetLayout;
    type Sampler;
}

/// Aggregated resource managers for one device
pub struct ResourcesDatabase<R: ResourceTypes> {
    buffers: ResourceManager<handle::Buffer, R::Buffer>,
    textures: ResourceManager<handle::Texture, R::Texture>,
    shaders: ResourceManager<handle::Shader, R::Shader>,
    pipelines: ResourceManager<handle::Pipeline, R::Pipeline>,
    descriptor_sets: ResourceManager<handle::DescriptorSet, R::DescriptorSet>,
    descriptor_set_layouts: ResourceManager<handle::DescriptorSetLayout, R::DescriptorSetLayout>,
    samplers: ResourceManager<handle::Sampler, R::Sampler>,
}

macro_rules! kind_accessors {
    ($(
        $field:ident: $handle:ty => $native:ident {
            get: $get:ident,
            get_mut: $get_mut:ident,
            valid: $valid:ident,
            manager: $manager:ident,
        }
    )*) => {
        impl<R: ResourceTypes> ResourcesDatabase<R> {
            $(
                /// Resolve a handle to its native object
                pub fn $get(&self, handle: $handle) -> RalResult<&R::$native> {
                    self.$field.get(handle)
                }

                /// Resolve a handle to its native object, mutably
                pub fn $get_mut(&mut self, handle: $handle) -> RalResult<&mut R::$native> {
                    self.$field.get_mut(handle)
                }

                /// Whether the handle names a live resource
                pub fn $valid(&self, handle: $handle) -> bool {
                    self.$field.is_valid(handle)
                }

                /// Manager for this kind
                pub fn $manager(&mut self) -> &mut ResourceManager<<$handle as HandleKind>::Kind, R::$native> {
                    &mut self.$field
                }
            )*
        }
    };
}

/// Maps a handle alias back to its kind marker
pub trait HandleKind {
    type Kind: handle::ResourceKind;
}

impl<K: handle::ResourceKind> HandleKind for handle::Handle<K> {
    type Kind = K;
}

kind_accessors! {
    buffers: BufferHandle => Buffer {
        get: get_buffer,
        get_mut: get_buffer_mut,
        valid: is_valid_buffer,
        manager: buffers,
    }
    textures: TextureHandle => Texture {
        get: get_texture,
        get_mut: get_texture_mut,
        valid: is_valid_texture,
        manager: textures,
    }
    shaders: ShaderHandle => Shader {
        get: get_shader,
        get_mut: get_shader_mut,
        valid: is_valid_shader,
        manager: shaders,
    }
    pipelines: PipelineHandle => Pipeline {
        get: get_pipeline,
        get_mut: get_pipeline_mut,
        valid: is_valid_pipeline,
        manager: pipelines,
    }
    descriptor_sets: DescriptorSetHandle => DescriptorSet {
        get: get_descriptor_set,
        get_mut: get_descriptor_set_mut,
        valid: is_valid_descriptor_set,
        manager: descriptor_sets,
    }
    descriptor_set_layouts: DescriptorSetLayoutHandle => DescriptorSetLayout {
        get: get_descriptor_set_layout,
        get_mut: get_descriptor_set_layout_mut,
        valid: is_valid_descriptor_set_layout,
        manager: descriptor_set_layouts,
    }
    samplers: SamplerHandle => Sampler {
        get: get_sampler,
        get_mut: get_sampler_mut,
        valid: is_valid_sampler,
        manager: samplers,
    }
}

impl<R: ResourceTypes> ResourcesDatabase<R> {
    /// Create an empty database
    pub fn new() -> Self {
        Self {
            buffers: ResourceManager::new(),
            textures: ResourceManager::new(),
            shaders: ResourceManager::new(),
            pipelines: ResourceManager::new(),
            descriptor_sets: ResourceManager::new(),
            descriptor_set_layouts: ResourceManager::new(),
            samplers: ResourceManager::new(),
        }
    }

    /// Live resources across every kind
    pub fn live_count(&self) -> usize {
        self.buffers.len()
            + self.textures.len()
            + self.shaders.len()
            + self.pipelines.len()
            + self.descriptor_sets.len()
            + self.descriptor_set_layouts.len()
            + self.samplers.len()
    }

    /// Check descriptor writes against layout bindings and live handles
    pub fn validate_descriptor_writes(
        &self,
        bindings: &[DescriptorBinding],
        writes: &[DescriptorWrite],
    ) -> RalResult<()> {
        for write in writes {
            let binding = bindings
                .iter()
                .find(|b| b.binding == write.binding)
                .ok_or_else(|| {
                    RalError::invalid_operation(format!("layout has no binding {}", write.binding))
                })?;

            let compatible = match (binding.descriptor_type, write.resource) {
                (
                    DescriptorType::UniformBuffer
                    | DescriptorType::UniformBufferDynamic
                    | DescriptorType::StorageBuffer,
                    DescriptorResource::Buffer { buffer, .. },
                ) => {
                    self.buffers.get(buffer)?;
                    true
                }
                (
                    DescriptorType::CombinedImageSampler,
                    DescriptorResource::Texture { texture, sampler: Some(sampler) },
                ) => {
                    self.textures.get(texture)?;
                    self.samplers.get(sampler)?;
                    true
                }
                (
                    DescriptorType::SampledImage | DescriptorType::StorageImage,
                    DescriptorResource::Texture { texture, sampler: None },
                ) => {
                    self.textures.get(texture)?;
                    true
                }
                (DescriptorType::Sampler, DescriptorResource::Sampler(sampler)) => {
                    self.samplers.get(sampler)?;
                    true
                }
                _ => false,
            };

            if !compatible {
                return Err(RalError::invalid_operation(format!(
                    "binding {} expects {:?}, got {:?}",
                    write.binding, binding.descriptor_type, write.resource
                )));
            }
        }
        Ok(())
    }
}

impl<R: ResourceTypes> Default for ResourcesDatabase<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Names;

    impl ResourceTypes for Names {
        type Buffer = &'static str;
        type Texture = &'static str;
        type Shader = &'static str;
        type Pipeline = &'static str;
        type DescriptorSet = &'static str;
        type DescriptorSetLayout = &'static str;
        type Sampler = &'static str;
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut db = ResourcesDatabase::<Names>::new();
        let buffer = db.buffers().create("vertices");
        let texture = db.textures().create("albedo");

        // Same raw parts, different kinds: each manager answers for its own.
        assert_eq!(buffer.index(), texture.index());
        assert_eq!(*db.get_buffer(buffer).unwrap(), "vertices");
        assert_eq!(*db.get_texture(texture).unwrap(), "albedo");

        db.buffers().destroy(buffer);
        assert!(!db.is_valid_buffer(buffer));
        assert!(db.is_valid_texture(texture));
        assert_eq!(db.live_count(), 1);
    }

    #[test]
    fn test_lookup_error_names_kind() {
        let mut db = ResourcesDatabase::<Names>::new();
        let sampler = db.samplers().create("linear");
        db.samplers().destroy(sampler);
        match db.get_sampler(sampler) {
            Err(RalError::InvalidHandle { kind, .. }) => assert_eq!(kind, "sampler"),
            other => panic!("expected invalid handle, got {other:?}"),
        }
    }

    #[test]
    fn test_descriptor_write_validation() {
        use crate::render::api::types::ShaderStages;

        let mut db = ResourcesDatabase::<Names>::new();
        let ubo = db.buffers().create("ubo");
        let bindings = [DescriptorBinding::new(0, DescriptorType::UniformBuffer, ShaderStages::VERTEX)];
        let good = DescriptorWrite {
            binding: 0,
            resource: DescriptorResource::Buffer { buffer: ubo, offset: 0, range: None },
        };
        assert!(db.validate_descriptor_writes(&bindings, &[good]).is_ok());

        let wrong_binding = DescriptorWrite { binding: 1, ..good };
        assert!(db.validate_descriptor_writes(&bindings, &[wrong_binding]).is_err());

        let sampler = db.samplers().create("linear");
        let wrong_type = DescriptorWrite { binding: 0, resource: DescriptorResource::Sampler(sampler) };
        assert!(db.validate_descriptor_writes(&bindings, &[wrong_type]).is_err());

        db.buffers().destroy(ubo);
        assert!(matches!(
            db.validate_descriptor_writes(&bindings, &[good]),
            Err(RalError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn test_get_mut_updates_in_place() {
        let mut db = ResourcesDatabase::<Names>::new();
        let pipeline = db.pipelines().create("old");
        *db.get_pipeline_mut(pipeline).unwrap() = "new";
        assert_eq!(*db.get_pipeline(pipeline).unwrap(), "new");
    }
}
