/// Descriptor pools
///
/// `DescriptorAllocator` hands out per-draw texture sets from a list of pools
/// that grows when the current one is exhausted. The whole list is reset
/// once per frame slot, after the slot's fence has been waited.

use ash::vk;
use tetra_render::Result;

use crate::vulkan_convert::vk_err;

const SOURCE: &str = "tetra::vulkan::descriptors";

/// Sets per growable pool
const SETS_PER_POOL: u32 = 256;

fn create_pool(device: &ash::Device, max_sets: u32, sizes: &[vk::DescriptorPoolSize]) -> Result<vk::DescriptorPool> {
    let create_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(max_sets)
        .pool_sizes(sizes);
    unsafe {
        device
            .create_descriptor_pool(&create_info, None)
            .map_err(|e| vk_err(SOURCE, "Failed to create descriptor pool", e))
    }
}

pub struct DescriptorAllocator {
    pools: Vec<vk::DescriptorPool>,
    /// Pool currently allocated from; earlier ones are full
    current: usize,
    sizes: Vec<vk::DescriptorPoolSize>,
    allocations: u32,
}

impl DescriptorAllocator {
    /// Pools sized for sets holding `samplers_per_set` combined image samplers
    pub fn new(device: &ash::Device, samplers_per_set: u32) -> Result<Self> {
        let sizes = vec![vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: SETS_PER_POOL * samplers_per_set,
        }];
        let first = create_pool(device, SETS_PER_POOL, &sizes)?;
        Ok(Self { pools: vec![first], current: 0, sizes, allocations: 0 })
    }

    pub fn allocate(&mut self, device: &ash::Device, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        let layouts = [layout];
        loop {
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(self.pools[self.current])
                .set_layouts(&layouts);

            match unsafe { device.allocate_descriptor_sets(&allocate_info) } {
                Ok(sets) => {
                    self.allocations += 1;
                    return sets
                        .into_iter()
                        .next()
                        .ok_or_else(|| tetra_render::render_err!(SOURCE, "Driver returned no descriptor set"));
                }
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                    self.current += 1;
                    if self.current == self.pools.len() {
                        let pool = create_pool(device, SETS_PER_POOL, &self.sizes)?;
                        self.pools.push(pool);
                        tetra_render::render_info!(
                            SOURCE,
                            "Descriptor pool exhausted, created new pool (total: {})",
                            self.pools.len()
                        );
                    }
                }
                Err(e) => return Err(vk_err(SOURCE, "Failed to allocate descriptor set", e)),
            }
        }
    }

    /// Return every set to its pool (GPU must be done with them)
    pub fn reset(&mut self, device: &ash::Device) -> Result<()> {
        for &pool in &self.pools {
            unsafe {
                device
                    .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
                    .map_err(|e| vk_err(SOURCE, "Failed to reset descriptor pool", e))?;
            }
        }
        self.current = 0;
        Ok(())
    }

    /// Sets allocated since the last call
    pub fn take_allocations(&mut self) -> u32 {
        std::mem::take(&mut self.allocations)
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        for pool in self.pools.drain(..) {
            unsafe { device.destroy_descriptor_pool(pool, None) };
        }
        self.current = 0;
    }
}

/// Fixed pool for the per-slot uniform set (set 0), one set per frame slot
pub fn create_uniform_pool(device: &ash::Device, frames: u32, bindings_per_set: u32) -> Result<vk::DescriptorPool> {
    let sizes = [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
        descriptor_count: frames * bindings_per_set,
    }];
    create_pool(device, frames, &sizes)
}
