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
            b"RGB3" => Some(Self::Rgb24),
            b"YUYV" => Some(Self::Yuyv),
            b"NV12" => Some(Self::Nv12),
            _ => None,
        }
    }
}

pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    match format {
        PixelFormat::Rgb24 => {
            let expected = plane * 3;
            check_len("RGB", pixels, expected)?;
            Ok(pixels[..expected].to_vec())
        }
        PixelFormat::Yuyv => {
            if w % 2 != 0 {
                return Err(anyhow!("YUYV frames need an even width, got {}", w));
            }
            check_len("YUYV", pixels, plane * 2)?;
            Ok(yuyv_to_rgb(pixels, plane))
        }
        PixelFormat::Nv12 => {
            check_len("NV12", pixels, plane + plane / 2)?;
            Ok(nv12_to_rgb(pixels, w, h))
        }
    }
}

// Drivers may pad the buffer past the image; only a short buffer is an error.
fn check_len(name: &str, pixels: &[u8], expected: usize) -> Result<()> {
    if pixels.len() < expected {
        return Err(anyhow!(
            "{} frame too short: expected {}, got {}",
            name,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

fn yuyv_to_rgb(pixels: &[u8], plane: usize) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(plane * 3);
    for quad in pixels[..plane * 2].chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for y in [quad[0], quad[2]] {
            rgb.extend_from_slice(&ycbcr_to_rgb(y as f32, u, v));
        }
    }
    rgb
}

fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let y_plane = w * h;
    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let offset = (j * w + i) * 3;
            rgb[offset..offset + 3].copy_from_slice(&ycbcr_to_rgb(y, u, v));
        }
    }
    rgb
}

fn ycbcr_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    [
        clamp_to_u8(y + 1.402_f32 * v),
        clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v),
        clamp_to_u8(y + 1.772_f32 * u),
    ]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_conversion_produces_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let rgb = normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(rgb, vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn yuyv_conversion_expands_pairs() -> Result<()> {
        // Two pixels sharing neutral chroma: dark then bright.
        let yuyv = [16u8, 128, 235, 128];
        let rgb = normalize_to_rgb(&yuyv, 2, 1, PixelFormat::Yuyv)?;
        assert_eq!(rgb, vec![16, 16, 16, 235, 235, 235]);
        Ok(())
    }

    #[test]
    fn yuyv_rejects_odd_width() {
        assert!(normalize_to_rgb(&[0u8; 6], 3, 1, PixelFormat::Yuyv).is_err());
    }

    #[test]
    fn rgb_pass_through_trims_padding() -> Result<()> {
        let mut pixels = vec![1u8; 9];
        pixels.extend_from_slice(&[0, 0, 0]);
        let rgb = normalize_to_rgb(&pixels, 1, 3, PixelFormat::Rgb24)?;
        assert_eq!(rgb, vec![1u8; 9]);
        assert!(normalize_to_rgb(&pixels[..8], 1, 3, PixelFormat::Rgb24).is_err());
        Ok(())
    }

    #[test]
    fn recognizes_capture_fourccs() {
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }
}
