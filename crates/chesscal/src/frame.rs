use image::GrayImage;

/// One captured grayscale image and its capture time in seconds, relative
/// to the first frame of the stream.
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: GrayImage,
    pub timestamp: f64,
}

impl Frame {
    pub fn new(image: GrayImage, timestamp: f64) -> Self {
        Self { image, timestamp }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// `(width, height)` in pixels.
    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Borrow the pixels as a `chesscal-core` view.
    pub fn view(&self) -> chesscal_core::GrayImageView<'_> {
        chesscal_core::GrayImageView {
            width: self.image.width() as usize,
            height: self.image.height() as usize,
            data: self.image.as_raw(),
        }
    }
}
