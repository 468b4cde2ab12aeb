use anyhow::Result;
use image::{imageops, GenericImageView, ImageBuffer, Luma};

use crate::prelude::{PgError, RawFrame};

/// Binary foreground mask: 0 = background, 1 = anything else (paddles, ball)
pub type BinaryFrame = ImageBuffer<Luma<u8>, Vec<u8>>;

#[derive(Clone, Debug, PartialEq)]
pub struct PreprocessParameter {
    /// expected size of the raw frames
    pub input_width: u32,
    pub input_height: u32,
    /// first row of the playing field
    pub crop_top: u32,
    /// first row below the playing field (exclusive)
    pub crop_bottom: u32,
    /// keep every n-th row and column, starting with the first one
    pub downsample: u32,
    /// color channel to look at (0 = red)
    pub channel: usize,
    /// channel values considered as background
    pub background: Vec<u8>,
}

/// Turns raw simulator frames into small binary frames.
///
/// Steps: crop to the playing field, decimate by a fixed factor (no interpolation),
/// pick a single color channel, map background values to 0 and everything else to 1.
#[derive(Clone, Debug)]
pub struct FramePreprocessor {
    param: PreprocessParameter,
}

impl FramePreprocessor {
    pub fn new(param: PreprocessParameter) -> Result<Self> {
        if param.downsample == 0 {
            return Err(PgError::InvalidParameter("downsample factor must be at least 1".to_string()).into());
        }
        if param.crop_top >= param.crop_bottom || param.crop_bottom > param.input_height {
            return Err(PgError::InvalidParameter(format!(
                "crop window {}..{} does not fit into frame height {}",
                param.crop_top, param.crop_bottom, param.input_height
            ))
            .into());
        }
        if param.input_width == 0 {
            return Err(PgError::InvalidParameter("frame width must not be zero".to_string()).into());
        }
        if param.channel > 2 {
            return Err(PgError::InvalidParameter(format!("color channel {} out of range (0..3)", param.channel)).into());
        }
        Ok(Self { param })
    }

    pub fn param(&self) -> &PreprocessParameter { &self.param }

    /// (width, height) of produced frames
    pub fn output_dims(&self) -> (u32, u32) {
        let f = self.param.downsample;
        let cropped_height = self.param.crop_bottom - self.param.crop_top;
        (div_ceil(self.param.input_width, f), div_ceil(cropped_height, f))
    }

    pub fn preprocess(
        &self,
        raw: &RawFrame,
    ) -> Result<BinaryFrame> {
        let expected = (self.param.input_width, self.param.input_height);
        if raw.dimensions() != expected {
            return Err(PgError::FrameShape {
                expected,
                actual: raw.dimensions(),
            }
            .into());
        }

        let field = imageops::crop_imm(
            raw,
            0,
            self.param.crop_top,
            self.param.input_width,
            self.param.crop_bottom - self.param.crop_top,
        );
        let f = self.param.downsample;
        let (width, height) = self.output_dims();
        Ok(BinaryFrame::from_fn(width, height, |x, y| {
            let value = field.get_pixel(x * f, y * f).0[self.param.channel];
            Luma([u8::from(!self.param.background.contains(&value))])
        }))
    }
}

fn div_ceil(
    value: u32,
    divisor: u32,
) -> u32 {
    (value + divisor - 1) / divisor
}

#[cfg(test)]
mod tests {
    use image::Rgb;
    use rstest::rstest;

    use super::*;

    const BACKGROUND: Rgb<u8> = Rgb([144, 72, 17]);

    fn param() -> PreprocessParameter {
        PreprocessParameter {
            input_width: 8,
            input_height: 12,
            crop_top: 2,
            crop_bottom: 10,
            downsample: 2,
            channel: 0,
            background: vec![144, 109],
        }
    }

    fn raw_frame() -> RawFrame {
        let mut frame = RawFrame::from_pixel(8, 12, BACKGROUND);
        // score area - cropped away
        frame.put_pixel(0, 0, Rgb([236, 236, 236]));
        // second background type
        frame.put_pixel(2, 2, Rgb([109, 118, 43]));
        // paddle
        frame.put_pixel(4, 4, Rgb([92, 186, 92]));
        // between sampled rows - dropped by decimation
        frame.put_pixel(5, 5, Rgb([236, 236, 236]));
        frame
    }

    #[test]
    fn test_output_dims() {
        let preprocessor = FramePreprocessor::new(param()).unwrap();
        assert_eq!(preprocessor.output_dims(), (4, 4));
        let frame = preprocessor.preprocess(&raw_frame()).unwrap();
        assert_eq!(frame.dimensions(), (4, 4));
    }

    #[test]
    fn test_binarize_foreground() {
        let preprocessor = FramePreprocessor::new(param()).unwrap();
        let frame = preprocessor.preprocess(&raw_frame()).unwrap();

        // (4,4) in raw coordinates -> row 2 of the crop -> (2,1) after decimation
        assert_eq!(frame.get_pixel(2, 1).0[0], 1);
        let foreground = frame.pixels().filter(|p| p.0[0] == 1).count();
        assert_eq!(foreground, 1);
        assert!(frame.pixels().all(|p| p.0[0] <= 1));
    }

    #[test]
    fn test_deterministic() {
        let preprocessor = FramePreprocessor::new(param()).unwrap();
        let raw = raw_frame();
        let a = preprocessor.preprocess(&raw).unwrap();
        let b = preprocessor.preprocess(&raw).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_odd_size_rounds_up() {
        let mut p = param();
        p.crop_bottom = 9;
        let preprocessor = FramePreprocessor::new(p).unwrap();
        assert_eq!(preprocessor.output_dims(), (4, 4));
    }

    #[test]
    fn test_frame_shape_mismatch() {
        let preprocessor = FramePreprocessor::new(param()).unwrap();
        let err = preprocessor.preprocess(&RawFrame::new(8, 8)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PgError>(),
            Some(&PgError::FrameShape {
                expected: (8, 12),
                actual: (8, 8)
            })
        );
    }

    #[rstest]
    #[case(PreprocessParameter { downsample: 0, ..param() })]
    #[case(PreprocessParameter { crop_top: 10, ..param() })]
    #[case(PreprocessParameter { crop_bottom: 13, ..param() })]
    #[case(PreprocessParameter { channel: 3, ..param() })]
    fn test_invalid_parameter(#[case] param: PreprocessParameter) {
        assert!(FramePreprocessor::new(param).is_err());
    }
}
