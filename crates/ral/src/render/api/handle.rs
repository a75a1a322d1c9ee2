//! Generation-checked resource handles
//!
//! A handle is an `{index, generation}` pair naming one creation of one
//! resource. It carries no ownership: copying or dropping a handle never
//! affects the resource, and destruction always goes through the device.
//!
//! The kind parameter is a zero-sized marker, so a texture handle cannot be
//! passed where a buffer handle is expected.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Slot index reserved for the invalid handle
pub const SENTINEL: u32 = u32::MAX;

/// Resource kind marker
pub trait ResourceKind: 'static {
    /// Human readable kind name used in diagnostics
    const NAME: &'static str;
}

macro_rules! resource_kinds {
    ($($(#[$meta:meta])* $kind:ident => $name:literal),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub enum $kind {}

            impl ResourceKind for $kind {
                const NAME: &'static str = $name;
            }
        )*
    };
}

resource_kinds! {
    /// GPU buffer kind
    Buffer => "buffer",
    /// Texture (image + default view) kind
    Texture => "texture",
    /// Shader module kind
    Shader => "shader",
    /// Graphics or compute pipeline kind
    Pipeline => "pipeline",
    /// Descriptor set kind
    DescriptorSet => "descriptor set",
    /// Descriptor set layout kind
    DescriptorSetLayout => "descriptor set layout",
    /// Sampler kind
    Sampler => "sampler",
}

/// Opaque `{index, generation}` reference to a pooled resource slot
pub struct Handle<K: ResourceKind> {
    index: u32,
    generation: u32,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ResourceKind> Handle<K> {
    /// The invalid handle
    pub const INVALID: Self = Self::from_raw(SENTINEL, 0);

    /// Build a handle from its raw parts
    pub const fn from_raw(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _kind: PhantomData,
        }
    }

    /// Slot index
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the creation this handle names
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Whether this is the sentinel handle
    ///
    /// A non-sentinel handle may still be stale; only the owning manager can
    /// answer whether it is live.
    pub const fn is_sentinel(self) -> bool {
        self.index == SENTINEL
    }

    /// Kind name used in diagnostics
    pub const fn kind_name() -> &'static str {
        K::NAME
    }
}

impl<K: ResourceKind> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: ResourceKind> Copy for Handle<K> {}

impl<K: ResourceKind> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<K: ResourceKind> Eq for Handle<K> {}

impl<K: ResourceKind> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<K: ResourceKind> Default for Handle<K> {
    fn default() -> Self {
        Self::INVALID
    }
}

impl<K: ResourceKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sentinel() {
            write!(f, "Handle<{}>(invalid)", K::NAME)
        } else {
            write!(f, "Handle<{}>({}v{})", K::NAME, self.index, self.generation)
        }
    }
}

/// Handle to a buffer
pub type BufferHandle = Handle<Buffer>;
/// Handle to a texture
pub type TextureHandle = Handle<Texture>;
/// Handle to a shader module
pub type ShaderHandle = Handle<Shader>;
/// Handle to a pipeline
pub type PipelineHandle = Handle<Pipeline>;
/// Handle to a descriptor set
pub type DescriptorSetHandle = Handle<DescriptorSet>;
/// Handle to a descriptor set layout
pub type DescriptorSetLayoutHandle = Handle<DescriptorSetLayout>;
/// Handle to a sampler
pub type SamplerHandle = Handle<Sampler>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_invalid_handle_is_sentinel() {
        assert!(BufferHandle::INVALID.is_sentinel());
        assert!(BufferHandle::default().is_sentinel());
        assert!(!BufferHandle::from_raw(0, 1).is_sentinel());
    }

    #[test]
    fn test_equality_requires_matching_generation() {
        let a = TextureHandle::from_raw(4, 1);
        let b = TextureHandle::from_raw(4, 2);
        assert_ne!(a, b);
        assert_eq!(a, TextureHandle::from_raw(4, 1));
    }

    #[test]
    fn test_hash_distinguishes_generations() {
        let set: HashSet<_> = [
            SamplerHandle::from_raw(0, 1),
            SamplerHandle::from_raw(0, 2),
            SamplerHandle::from_raw(0, 1),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_debug_output_names_kind() {
        assert_eq!(format!("{:?}", PipelineHandle::from_raw(2, 7)), "Handle<pipeline>(2v7)");
        assert_eq!(format!("{:?}", ShaderHandle::INVALID), "Handle<shader>(invalid)");
    }
}
