/// Borrowed 8-bit grayscale image, row-major without padding.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32, border: u8) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return border;
    }
    src.data[y as usize * src.width + x as usize]
}

/// Bilinear sample where out-of-bounds taps read as `border`.
///
/// Coordinates with no tap inside the image, including non-finite ones,
/// return `border` without touching the data.
#[inline]
pub fn sample_bilinear_border(src: &GrayImageView<'_>, x: f32, y: f32, border: u8) -> f32 {
    let inside = |t: f32, extent: usize| t > -1.0 && t < extent as f32;
    if !inside(x, src.width) || !inside(y, src.height) {
        return border as f32;
    }
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0, border) as f32;
    let p10 = get_gray(src, x0 + 1, y0, border) as f32;
    let p01 = get_gray(src, x0, y0 + 1, border) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1, border) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(width: usize, height: usize, data: &[u8]) -> GrayImageView<'_> {
        GrayImageView {
            width,
            height,
            data,
        }
    }

    #[test]
    fn integer_taps_are_exact() {
        let data = [10, 20, 30, 40, 50, 60];
        let v = view(3, 2, &data);
        assert_eq!(sample_bilinear_border(&v, 1.0, 1.0, 0), 50.0);
        assert_eq!(sample_bilinear_border(&v, 2.0, 0.0, 0), 30.0);
    }

    #[test]
    fn interpolates_between_taps() {
        let data = [0, 100];
        let v = view(2, 1, &data);
        assert!((sample_bilinear_border(&v, 0.5, 0.0, 0) - 50.0).abs() < 1e-4);
    }

    #[test]
    fn outside_reads_border_value() {
        let data = [7u8; 16];
        let v = view(4, 4, &data);
        assert_eq!(sample_bilinear_border(&v, -3.0, 1.0, 200), 200.0);
        assert_eq!(sample_bilinear_border(&v, 1.0, 10.0, 0), 0.0);
    }

    #[test]
    fn far_and_non_finite_coordinates_read_border() {
        let data = [9u8; 4];
        let v = view(2, 2, &data);
        assert_eq!(sample_bilinear_border(&v, -8.7e30, -6.5e30, 3), 3.0);
        assert_eq!(sample_bilinear_border(&v, 3.0e9, 0.5, 3), 3.0);
        assert_eq!(sample_bilinear_border(&v, f32::NAN, 0.5, 3), 3.0);
        assert_eq!(sample_bilinear_border(&v, 0.5, f32::INFINITY, 3), 3.0);
    }

    #[test]
    fn taps_straddling_the_edge_blend_with_border() {
        let data = [100u8; 4];
        let v = view(2, 2, &data);
        assert!((sample_bilinear_border(&v, -0.5, 0.0, 0) - 50.0).abs() < 1e-4);
    }

    #[test]
    fn last_row_and_column_are_reachable() {
        let data = [1, 2, 3, 4];
        let v = view(2, 2, &data);
        assert_eq!(sample_bilinear_border(&v, 1.0, 1.0, 255), 4.0);
    }
}
