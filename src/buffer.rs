//! Typed uniform buffers and host readback of textures.
//!
//! [`UniformBuffer`] wraps a [`wgpu::Buffer`] holding exactly one `T`;
//! the struct is written through the queue, so no `MAP_WRITE` usage is
//! needed.  [`ReadbackBuffer`] is the download side: a `MAP_READ`
//! buffer that texture rows are copied into and read back from on the
//! CPU.  All interactions with the GPU go through a
//! [`crate::FilterContext`].

use std::marker::PhantomData;
use std::sync::mpsc;

use bytemuck::Pod;
use wgpu::{Buffer, BufferDescriptor, BufferUsages};

use crate::error::{FilterError, FilterResult};
use crate::FilterContext;

/// A uniform block of type `T` living in GPU memory.
pub struct UniformBuffer<T: Pod> {
    pub buffer: Buffer,
    _marker: PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T> {
    /// Create a zero-initialized uniform buffer sized for one `T`.
    pub fn new(context: &FilterContext, label: &str) -> Self {
        let buffer = context.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<T>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            _marker: PhantomData,
        }
    }

    /// Queue a write of `value`.  The write lands before any command
    /// buffer submitted afterwards executes.
    pub fn write(&self, context: &FilterContext, value: &T) {
        context
            .queue
            .write_buffer(&self.buffer, 0, bytemuck::bytes_of(value));
    }
}

/// Byte layout of one texture layer inside a readback buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLayout {
    /// Bytes of pixel data per row (`width * 4`).
    pub unpadded_bytes_per_row: u32,
    /// Row stride on the GPU, aligned to `COPY_BYTES_PER_ROW_ALIGNMENT`.
    pub padded_bytes_per_row: u32,
    pub rows: u32,
}

impl RowLayout {
    pub fn rgba8(width: u32, height: u32) -> Self {
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;
        Self {
            unpadded_bytes_per_row: unpadded,
            padded_bytes_per_row: padded,
            rows: height,
        }
    }

    pub fn layer_size(&self) -> u64 {
        self.padded_bytes_per_row as u64 * self.rows as u64
    }

    /// Strip the row padding from one layer.
    pub fn unpad(&self, padded: &[u8]) -> Vec<u8> {
        let mut pixels = Vec::with_capacity((self.unpadded_bytes_per_row * self.rows) as usize);
        for row in padded
            .chunks(self.padded_bytes_per_row as usize)
            .take(self.rows as usize)
        {
            pixels.extend_from_slice(&row[..self.unpadded_bytes_per_row as usize]);
        }
        pixels
    }
}

/// A host-mappable buffer that texture contents are copied into.
pub struct ReadbackBuffer {
    pub buffer: Buffer,
    pub layout: RowLayout,
    pub layers: u32,
}

impl ReadbackBuffer {
    pub fn new(context: &FilterContext, layout: RowLayout, layers: u32) -> Self {
        let buffer = context.device.create_buffer(&BufferDescriptor {
            label: Some("texture_readback_buffer"),
            size: layout.layer_size() * layers as u64,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            buffer,
            layout,
            layers,
        }
    }

    /// Map the buffer and return the unpadded pixels of every layer.
    ///
    /// Blocks until the GPU has finished writing the buffer.  The buffer
    /// is unmapped before returning.
    pub fn read_layers(&self, context: &FilterContext) -> FilterResult<Vec<Vec<u8>>> {
        let slice = self.buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        context
            .device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| FilterError::Readback(format!("device polling failed: {e}")))?;
        receiver
            .recv()
            .map_err(|_| FilterError::Readback("mapping callback never ran".into()))?
            .map_err(|e| FilterError::Readback(e.to_string()))?;

        let data = slice.get_mapped_range();
        let layers = data
            .chunks(self.layout.layer_size() as usize)
            .take(self.layers as usize)
            .map(|layer| self.layout.unpad(layer))
            .collect();
        // The mapped view must be released before unmapping.
        drop(data);
        self.buffer.unmap();
        Ok(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        let layout = RowLayout::rgba8(3, 2);
        assert_eq!(layout.unpadded_bytes_per_row, 12);
        assert_eq!(layout.padded_bytes_per_row, 256);
        assert_eq!(layout.layer_size(), 512);

        let aligned = RowLayout::rgba8(64, 1);
        assert_eq!(aligned.padded_bytes_per_row, 256);
    }

    #[test]
    fn unpad_drops_trailing_row_bytes() {
        let layout = RowLayout::rgba8(1, 2);
        let mut padded = vec![0u8; layout.layer_size() as usize];
        padded[..4].copy_from_slice(&[1, 2, 3, 4]);
        padded[256..260].copy_from_slice(&[5, 6, 7, 8]);
        assert_eq!(layout.unpad(&padded), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
