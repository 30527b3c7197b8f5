//! Solid-color shared-memory buffers.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::os::fd::AsFd;

use wayland_client::{
    protocol::{wl_buffer::WlBuffer, wl_shm, wl_shm::WlShm},
    QueueHandle,
};

use crate::client::ClientState;
use crate::error::{HarnessError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Straight (non-premultiplied) RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const RED: Color = Color::rgb(0xff, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 0xff, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 0xff);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Pixel formats every `wl_shm` implementation supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    Argb8888,
    Xrgb8888,
}

impl PixelFormat {
    pub const BYTES_PER_PIXEL: usize = 4;

    pub fn shm_format(self) -> wl_shm::Format {
        match self {
            PixelFormat::Argb8888 => wl_shm::Format::Argb8888,
            PixelFormat::Xrgb8888 => wl_shm::Format::Xrgb8888,
        }
    }

    /// One pixel in memory order (little-endian `0xAARRGGBB`). Alpha is
    /// premultiplied for `Argb8888`; the unused byte of `Xrgb8888` is 0xff.
    pub fn encode(self, color: Color) -> [u8; 4] {
        match self {
            PixelFormat::Argb8888 => {
                let premultiply = |c: u8| ((c as u16 * color.a as u16 + 127) / 255) as u8;
                [
                    premultiply(color.b),
                    premultiply(color.g),
                    premultiply(color.r),
                    color.a,
                ]
            }
            PixelFormat::Xrgb8888 => [color.b, color.g, color.r, 0xff],
        }
    }
}

/// A file-backed buffer filled with one color.
#[derive(Debug)]
pub struct PixelBuffer {
    file: File,
    size: Size,
    format: PixelFormat,
}

impl PixelBuffer {
    /// Fails with `InvalidSize` for empty sizes and for buffers larger than
    /// a `wl_shm_pool` can address, before anything is allocated.
    pub fn filled(size: Size, color: Color, format: PixelFormat) -> Result<Self> {
        let stride = (size.width as usize).checked_mul(PixelFormat::BYTES_PER_PIXEL);
        let len = stride.and_then(|stride| stride.checked_mul(size.height as usize));
        let addressable = matches!(len, Some(len) if len > 0 && len <= i32::MAX as usize);
        if !addressable {
            return Err(HarnessError::InvalidSize {
                width: size.width,
                height: size.height,
            });
        }

        let file = tempfile::tempfile()?;
        let pixel = format.encode(color);
        let row: Vec<u8> = pixel
            .iter()
            .copied()
            .cycle()
            .take(size.width as usize * PixelFormat::BYTES_PER_PIXEL)
            .collect();
        {
            let mut writer = BufWriter::new(&file);
            for _ in 0..size.height {
                writer.write_all(&row)?;
            }
            writer.flush()?;
        }

        Ok(Self { file, size, format })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn stride(&self) -> usize {
        self.size.width as usize * PixelFormat::BYTES_PER_PIXEL
    }

    pub fn len(&self) -> usize {
        self.stride() * self.size.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Wraps the file in a one-buffer pool. The pool is destroyed right away;
    /// the buffer keeps the mapping alive on the server.
    pub(crate) fn create_wl_buffer(
        &self,
        shm: &WlShm,
        qh: &QueueHandle<ClientState>,
    ) -> WlBuffer {
        let pool = shm.create_pool(self.file.as_fd(), self.len() as i32, qh, ());
        let buffer = pool.create_buffer(
            0,
            self.size.width as i32,
            self.size.height as i32,
            self.stride() as i32,
            self.format.shm_format(),
            qh,
            (),
        );
        pool.destroy();
        buffer
    }
}
