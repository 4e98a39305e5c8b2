use std::sync::{Arc, Mutex};

use ash::vk;
use tracing::{debug, warn};

use crate::GpuError;
use crate::command::CommandBufferRecording;
use crate::device::{BufferDesc, Device, ImageBarrier, ImageDesc, MemoryLocation};
use crate::resource::{Buffer, Image};
use crate::util::ImmediateSubmit;
use crate::util::format;

/// Byte range of one mip level inside the upload data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipRegion {
    pub offset: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipLevels<'a> {
    /// Only the base level is stored
    Single,
    /// Base level is stored, the rest of the chain is produced by linear blits
    Generate,
    /// Every level is stored in the data, as container formats do
    Explicit(&'a [MipRegion]),
}

#[derive(Debug, Clone, Copy)]
pub struct ImageUpload<'a> {
    pub name: &'a str,
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
    pub mips: MipLevels<'a>,
}

/// Copies host data into device local buffers and images through a temporary host visible
/// buffer.
///
/// Every upload is synchronous: when a call returns the destination is fully populated and, for
/// images, in [`vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL`]. The staging buffer never outlives
/// the call.
#[derive(Debug)]
pub struct StagingUploader<D: Device> {
    device: Arc<D>,
    immediate: Mutex<ImmediateSubmit<D>>,
}

impl<D: Device> StagingUploader<D> {
    pub fn new(device: Arc<D>, timeout: u64) -> crate::Result<Self> {
        let immediate = ImmediateSubmit::new(device.clone(), timeout)?;
        Ok(Self {
            device,
            immediate: Mutex::new(immediate),
        })
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    fn staging(&self, data: &[u8]) -> crate::Result<Buffer<D>> {
        if data.is_empty() {
            return Err(GpuError::EmptyUpload);
        }
        let staging = Buffer::new(
            self.device.clone(),
            &BufferDesc {
                name: "staging",
                size: data.len() as vk::DeviceSize,
                usage: vk::BufferUsageFlags::TRANSFER_SRC,
                location: MemoryLocation::CpuToGpu,
            },
        )?;
        staging.write(0, data)?;
        Ok(staging)
    }

    fn submit<F: FnOnce(&CommandBufferRecording<D>)>(&self, function: F) -> crate::Result<()> {
        self.immediate.lock()?.submit(function)
    }

    /// Uploads `data` into a new device local buffer usable as `usage`
    pub fn upload_buffer(
        &self,
        name: &str,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> crate::Result<Buffer<D>> {
        let staging = self.staging(data)?;
        let buffer = Buffer::new(
            self.device.clone(),
            &BufferDesc {
                name,
                size: data.len() as vk::DeviceSize,
                usage: usage | vk::BufferUsageFlags::TRANSFER_DST,
                location: MemoryLocation::GpuOnly,
            },
        )?;
        self.submit(|cmd| {
            cmd.copy_buffer(
                staging.handle(),
                buffer.handle(),
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: data.len() as vk::DeviceSize,
                }],
            )
        })?;
        debug!(name, size = data.len(), "Uploaded buffer");
        Ok(buffer)
    }

    /// Overwrites part of an existing buffer, which must have been created with
    /// [`vk::BufferUsageFlags::TRANSFER_DST`]
    pub fn upload_into(
        &self,
        dst: &Buffer<D>,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> crate::Result<()> {
        if offset + data.len() as vk::DeviceSize > dst.size() {
            return Err(GpuError::OutOfBounds {
                offset,
                size: data.len() as u64,
                capacity: dst.size(),
            });
        }
        let staging = self.staging(data)?;
        self.submit(|cmd| {
            cmd.copy_buffer(
                staging.handle(),
                dst.handle(),
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: offset,
                    size: data.len() as vk::DeviceSize,
                }],
            )
        })
    }

    /// Copies a buffer back into host memory
    pub fn read_back(&self, src: &Buffer<D>) -> crate::Result<Vec<u8>> {
        let readback = Buffer::new(
            self.device.clone(),
            &BufferDesc {
                name: "readback",
                size: src.size(),
                usage: vk::BufferUsageFlags::TRANSFER_DST,
                location: MemoryLocation::GpuToCpu,
            },
        )?;
        self.submit(|cmd| {
            cmd.copy_buffer(
                src.handle(),
                readback.handle(),
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: src.size(),
                }],
            )
        })?;
        let mut out = vec![0u8; src.size() as usize];
        readback.read(0, &mut out)?;
        Ok(out)
    }

    /// Uploads a sampled 2D image, leaving it in shader read only layout
    pub fn upload_image(&self, upload: &ImageUpload) -> crate::Result<Image<D>> {
        let mut mips = upload.mips;
        if mips == MipLevels::Generate
            && !self.device.supports_format(
                upload.format,
                vk::FormatFeatureFlags::BLIT_SRC
                    | vk::FormatFeatureFlags::BLIT_DST
                    | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
            )
        {
            warn!(
                name = upload.name,
                format = ?upload.format,
                "Format does not support linear blits, skipping mip generation"
            );
            mips = MipLevels::Single;
        }

        let base = vk::Extent3D {
            width: upload.width,
            height: upload.height,
            depth: 1,
        };
        let regions: Vec<MipRegion> = match mips {
            MipLevels::Explicit(regions) if !regions.is_empty() => regions.to_vec(),
            _ => vec![MipRegion {
                offset: 0,
                width: upload.width,
                height: upload.height,
            }],
        };
        for region in &regions {
            let size = format::image_level_size(upload.format, region.width, region.height)
                .ok_or(GpuError::UnsupportedFormat)?;
            if region.offset + size > upload.data.len() as u64 {
                return Err(GpuError::OutOfBounds {
                    offset: region.offset,
                    size,
                    capacity: upload.data.len() as u64,
                });
            }
        }
        let mip_levels = match mips {
            MipLevels::Generate => format::mip_levels(upload.width, upload.height),
            _ => regions.len() as u32,
        };
        let mut usage = vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST;
        if mips == MipLevels::Generate {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }

        let staging = self.staging(upload.data)?;
        let image = Image::new(
            self.device.clone(),
            &ImageDesc {
                name: upload.name,
                format: upload.format,
                extent: base,
                mip_levels,
                usage,
            },
            vk::ImageAspectFlags::COLOR,
        )?;
        let copies: Vec<vk::BufferImageCopy> = regions
            .iter()
            .enumerate()
            .map(|(level, region)| vk::BufferImageCopy {
                buffer_offset: region.offset,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level as u32,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D {
                    width: region.width,
                    height: region.height,
                    depth: 1,
                },
            })
            .collect();

        self.submit(|cmd| {
            let handle = image.handle();
            let color = vk::ImageAspectFlags::COLOR;
            cmd.image_barrier(ImageBarrier::transition(
                handle,
                color,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ));
            cmd.copy_buffer_to_image(staging.handle(), handle, &copies);
            if mips == MipLevels::Generate {
                record_mip_chain(cmd, handle, base, mip_levels);
            } else {
                cmd.image_barrier(ImageBarrier::transition(
                    handle,
                    color,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                ));
            }
        })?;
        debug!(
            name = upload.name,
            width = upload.width,
            height = upload.height,
            mip_levels,
            "Uploaded image"
        );
        Ok(image)
    }
}

/// Fills levels `1..mip_levels` from level 0, leaving every level shader readable
fn record_mip_chain<D: Device>(
    cmd: &CommandBufferRecording<D>,
    image: vk::Image,
    base: vk::Extent3D,
    mip_levels: u32,
) {
    let color = vk::ImageAspectFlags::COLOR;
    let extent_of = |level: u32| vk::Offset3D {
        x: (base.width >> level).max(1) as i32,
        y: (base.height >> level).max(1) as i32,
        z: 1,
    };
    for level in 1..mip_levels {
        cmd.image_barrier(
            ImageBarrier::transition(
                image,
                color,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            )
            .mips(level - 1, 1),
        );
        let blit = vk::ImageBlit {
            src_subresource: vk::ImageSubresourceLayers {
                aspect_mask: color,
                mip_level: level - 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            src_offsets: [vk::Offset3D::default(), extent_of(level - 1)],
            dst_subresource: vk::ImageSubresourceLayers {
                aspect_mask: color,
                mip_level: level,
                base_array_layer: 0,
                layer_count: 1,
            },
            dst_offsets: [vk::Offset3D::default(), extent_of(level)],
        };
        cmd.blit_image(image, &[blit], vk::Filter::LINEAR);
        cmd.image_barrier(
            ImageBarrier::transition(
                image,
                color,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
            .mips(level - 1, 1),
        );
    }
    cmd.image_barrier(
        ImageBarrier::transition(
            image,
            color,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .mips(mip_levels - 1, 1),
    );
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::device::{HeadlessDevice, RecordedCommand};

    fn uploader() -> (Arc<HeadlessDevice>, StagingUploader<HeadlessDevice>) {
        let device = Arc::new(HeadlessDevice::new());
        let uploader = StagingUploader::new(device.clone(), u64::MAX).unwrap();
        (device, uploader)
    }

    #[test]
    fn upload_round_trip() {
        let (device, uploader) = uploader();
        let mut rng = rand::rng();
        for _ in 0..8 {
            let size = rng.random_range(1..4096usize);
            let mut data = vec![0u8; size];
            rng.fill(&mut data[..]);
            let buffer = uploader
                .upload_buffer("random", &data, vk::BufferUsageFlags::STORAGE_BUFFER)
                .unwrap();
            assert_eq!(buffer.location(), MemoryLocation::GpuOnly);
            assert!(buffer.usage().contains(vk::BufferUsageFlags::TRANSFER_DST));
            assert_eq!(uploader.read_back(&buffer).unwrap(), data);
            assert_eq!(device.buffer_contents(buffer.handle()).unwrap(), data);
        }
    }

    #[test]
    fn staging_buffers_do_not_outlive_the_upload() {
        let (device, uploader) = uploader();
        let before = device.live_objects();
        let buffer = uploader
            .upload_buffer("indices", &[1, 2, 3, 4], vk::BufferUsageFlags::INDEX_BUFFER)
            .unwrap();
        assert_eq!(device.live_objects(), before + 1);
        drop(buffer);
        assert_eq!(device.live_objects(), before);
    }

    #[test]
    fn empty_upload_is_rejected() {
        let (_, uploader) = uploader();
        assert_eq!(
            uploader
                .upload_buffer("empty", &[], vk::BufferUsageFlags::VERTEX_BUFFER)
                .unwrap_err(),
            GpuError::EmptyUpload
        );
    }

    #[test]
    fn upload_into_offsets() {
        let (device, uploader) = uploader();
        let buffer = uploader
            .upload_buffer("target", &[0u8; 8], vk::BufferUsageFlags::VERTEX_BUFFER)
            .unwrap();
        uploader.upload_into(&buffer, 4, &[9, 9]).unwrap();
        assert_eq!(
            device.buffer_contents(buffer.handle()).unwrap(),
            vec![0, 0, 0, 0, 9, 9, 0, 0]
        );
        assert!(matches!(
            uploader.upload_into(&buffer, 7, &[1, 1]),
            Err(GpuError::OutOfBounds { capacity: 8, .. })
        ));
    }

    #[test]
    fn image_ends_shader_readable() {
        let (device, uploader) = uploader();
        let data: Vec<u8> = (0..4 * 4 * 4).map(|i| i as u8).collect();
        let image = uploader
            .upload_image(&ImageUpload {
                name: "albedo",
                format: vk::Format::R8G8B8A8_UNORM,
                width: 4,
                height: 4,
                data: &data,
                mips: MipLevels::Generate,
            })
            .unwrap();
        assert_eq!(image.mip_levels(), 3);
        assert_eq!(device.image_contents(image.handle(), 0).unwrap(), data);
        assert_eq!(device.image_contents(image.handle(), 2).unwrap().len(), 4);

        let submission = device.submissions().pop().unwrap();
        let barriers: Vec<ImageBarrier> = submission
            .commands
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::Barrier(barrier) => Some(*barrier),
                _ => None,
            })
            .collect();
        assert_eq!(barriers[0].old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barriers[0].new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        // every level ends up shader readable exactly once
        let mut readable: Vec<u32> = barriers
            .iter()
            .filter(|barrier| barrier.new_layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .map(|barrier| barrier.base_mip_level)
            .collect();
        readable.sort();
        assert_eq!(readable, vec![0, 1, 2]);
    }

    #[test]
    fn explicit_mips_are_copied_per_level() {
        let (device, uploader) = uploader();
        let data = vec![7u8; 32 + 8];
        let regions = [
            MipRegion {
                offset: 0,
                width: 8,
                height: 8,
            },
            MipRegion {
                offset: 32,
                width: 4,
                height: 4,
            },
        ];
        let image = uploader
            .upload_image(&ImageUpload {
                name: "compressed",
                format: vk::Format::BC1_RGBA_UNORM_BLOCK,
                width: 8,
                height: 8,
                data: &data,
                mips: MipLevels::Explicit(&regions),
            })
            .unwrap();
        assert_eq!(image.mip_levels(), 2);
        assert_eq!(device.image_contents(image.handle(), 1).unwrap(), vec![7u8; 8]);

        let truncated = uploader.upload_image(&ImageUpload {
            name: "truncated",
            format: vk::Format::BC1_RGBA_UNORM_BLOCK,
            width: 8,
            height: 8,
            data: &data[..36],
            mips: MipLevels::Explicit(&regions),
        });
        assert!(matches!(truncated, Err(GpuError::OutOfBounds { .. })));
    }
}
