use anyhow::{anyhow, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
    Nv12,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"NV12" => Some(PixelFormat::Nv12),
            _ => None,
        }
    }
}

/// Convert one driver buffer to tightly packed RGB24.
///
/// `stride` is the driver's bytes-per-line for the (first) plane; 0 means
/// rows are packed. Row padding and trailing bytes are dropped.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    w.checked_mul(h)
        .and_then(|area| area.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    let stride = stride as usize;
    match format {
        PixelFormat::Rgb24 => packed_rows(pixels, "RGB", w * 3, stride, h),
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, w, h, stride),
        PixelFormat::Nv12 => nv12_to_rgb(pixels, w, h, stride),
    }
}

/// Copy `rows` rows of `row_bytes` each out of a buffer laid out with
/// `stride` bytes per line.
fn packed_rows(
    pixels: &[u8],
    kind: &str,
    row_bytes: usize,
    stride: usize,
    rows: usize,
) -> Result<Vec<u8>> {
    let stride = if stride == 0 { row_bytes } else { stride };
    if stride < row_bytes {
        return Err(anyhow!(
            "{} stride {} shorter than a {}-byte row",
            kind,
            stride,
            row_bytes
        ));
    }
    let expected = match rows {
        0 => 0,
        rows => stride * (rows - 1) + row_bytes,
    };
    if pixels.len() < expected {
        return Err(length_mismatch(kind, expected, pixels.len()));
    }
    let mut packed = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let start = row * stride;
        packed.extend_from_slice(&pixels[start..start + row_bytes]);
    }
    Ok(packed)
}

fn length_mismatch(kind: &str, expected: usize, actual: usize) -> anyhow::Error {
    anyhow!(
        "{} frame too short: need {} bytes, got {}",
        kind,
        expected,
        actual
    )
}

fn yuyv_to_rgb(pixels: &[u8], w: usize, h: usize, stride: usize) -> Result<Vec<u8>> {
    if w % 2 != 0 {
        return Err(anyhow!("YUYV frame width {} is odd", w));
    }
    let packed = packed_rows(pixels, "YUYV", w * 2, stride, h)?;

    let mut rgb = Vec::with_capacity(w * h * 3);
    for quad in packed.chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for y in [quad[0], quad[2]] {
            rgb.extend_from_slice(&yuv_to_rgb(y as f32, u, v));
        }
    }
    Ok(rgb)
}

// Single-planar NV12: the interleaved UV plane follows `h` luma lines.
fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize, stride: usize) -> Result<Vec<u8>> {
    let line = if stride == 0 { w } else { stride };
    let chroma_width = w.div_ceil(2) * 2;
    let luma = packed_rows(pixels, "NV12", w, line, h)?;
    let chroma_plane = pixels.get(line * h..).unwrap_or(&[]);
    let chroma = packed_rows(chroma_plane, "NV12 chroma", chroma_width, line, h.div_ceil(2))?;

    let mut rgb = vec![0u8; w * h * 3];
    for j in 0..h {
        for i in 0..w {
            let y = luma[j * w + i] as f32;
            let uv_index = (j / 2) * chroma_width + (i / 2) * 2;
            let u = chroma[uv_index] as f32 - 128.0;
            let v = chroma[uv_index + 1] as f32 - 128.0;

            let offset = (j * w + i) * 3;
            rgb[offset..offset + 3].copy_from_slice(&yuv_to_rgb(y, u, v));
        }
    }

    Ok(rgb)
}

fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    [
        clamp_to_u8(y + 1.402_f32 * v),
        clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v),
        clamp_to_u8(y + 1.772_f32 * u),
    ]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
