use std::sync::Arc;

use skein_gpu::ash::vk;
use skein_gpu::descriptor::{DescriptorAllocator, DescriptorCounts};
use skein_gpu::device::{Device, HeadlessDevice};
use skein_gpu::transfer::{ImageUpload, MipLevels};
use skein_gpu::wsi::{SwapchainManager, SwapchainSettings};
use skein_gpu::GraphicsContext;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[test]
fn everything_created_is_destroyed() {
    init_tracing();
    let device = Arc::new(HeadlessDevice::new());
    {
        let context = GraphicsContext::new(device.clone()).unwrap();
        let mut swapchain = SwapchainManager::new(device.clone(), SwapchainSettings::default());
        swapchain.create_or_recreate(640, 480, true).unwrap();

        let uniform = context
            .uploader()
            .upload_buffer(
                "uniform",
                &[0u8; 64],
                vk::BufferUsageFlags::UNIFORM_BUFFER,
            )
            .unwrap();
        let texture = context
            .uploader()
            .upload_image(&ImageUpload {
                name: "texture",
                format: vk::Format::R8G8B8A8_UNORM,
                width: 2,
                height: 2,
                data: &[255u8; 16],
                mips: MipLevels::Generate,
            })
            .unwrap();
        let sampler = device.create_sampler(&Default::default()).unwrap();

        let mut allocator = DescriptorAllocator::new(
            &context,
            DescriptorCounts {
                uniform_buffers: 1,
                image_sets: 1,
                image_bindings: 1,
            },
        )
        .unwrap();
        allocator.allocate_node_set(&uniform).unwrap();
        allocator
            .allocate_material_set(&[(texture.view(), sampler)])
            .unwrap();
        device.destroy_sampler(sampler);
        assert!(device.live_objects() > 0);
    }
    assert_eq!(device.live_objects(), 0);
}
