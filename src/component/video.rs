use std::ptr;

use libc::c_int;
use rsmpeg::avutil::AVFrame;
use rsmpeg::ffi;

use crate::block::VideoBlock;
use crate::error::{MediaError, Result};
use crate::filtergraph::FilterPipeline;
use crate::rational::Rational;

/// Frame parameters the filter graph was configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FilterInput {
    width: c_int,
    height: c_int,
    pixel_format: ffi::AVPixelFormat,
}

/// Materialises decoded video frames into packed BGR24 blocks, optionally
/// routing them through a user supplied filter chain first.
pub(crate) struct VideoConverter {
    scaler: *mut ffi::SwsContext,
    filter_chain: Option<String>,
    filter: Option<FilterPipeline>,
    filter_input: Option<FilterInput>,
}

impl VideoConverter {
    pub(crate) fn new(filter_chain: Option<String>) -> Self {
        Self {
            scaler: ptr::null_mut(),
            filter_chain: filter_chain.filter(|chain| !chain.trim().is_empty()),
            filter: None,
            filter_input: None,
        }
    }

    pub(crate) fn materialise(
        &mut self,
        frame: &AVFrame,
        time_base: Rational,
        target: &mut VideoBlock,
    ) -> Result<()> {
        let filtered = self.apply_filter(frame, time_base)?;
        let source: &AVFrame = filtered.as_ref().unwrap_or(frame);

        let width = source.width;
        let height = source.height;
        if width <= 0 || height <= 0 {
            return Err(MediaError::ConvertFailed("video frame without dimensions".into()));
        }
        let pixel_format = remap_deprecated_pixel_format(source.format);

        let stride = width as usize * 3;
        let required = stride * height as usize;
        if target.buffer.len() != required {
            target.buffer.resize(required, 0);
        }

        unsafe {
            self.scaler = ffi::sws_getCachedContext(
                self.scaler,
                width,
                height,
                pixel_format,
                width,
                height,
                ffi::AV_PIX_FMT_BGR24,
                ffi::SWS_BICUBIC as c_int,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null(),
            );
            if self.scaler.is_null() {
                return Err(MediaError::ConvertFailed("scaler allocation".into()));
            }

            let dst_data = [target.buffer.as_mut_ptr(), ptr::null_mut(), ptr::null_mut(), ptr::null_mut()];
            let dst_stride = [stride as c_int, 0, 0, 0];
            let rows = ffi::sws_scale(
                self.scaler,
                source.data.as_ptr() as _,
                source.linesize.as_ptr(),
                0,
                height,
                dst_data.as_ptr() as _,
                dst_stride.as_ptr(),
            );
            if rows != height {
                return Err(MediaError::ConvertFailed(format!(
                    "scaler wrote {rows} of {height} rows"
                )));
            }
        }

        let aspect = Rational::from(source.sample_aspect_ratio);
        let (aspect_numerator, aspect_denominator) = if aspect.is_zero() {
            (1, 1)
        } else {
            (aspect.numerator(), aspect.denominator())
        };

        target.stride = stride;
        target.pixel_width = width;
        target.pixel_height = height;
        target.aspect_numerator = aspect_numerator;
        target.aspect_denominator = aspect_denominator;
        Ok(())
    }

    /// Run the frame through the configured filter chain, rebuilding the
    /// graph on the first frame and whenever the input parameters change.
    fn apply_filter(&mut self, frame: &AVFrame, time_base: Rational) -> Result<Option<AVFrame>> {
        let Some(chain) = self.filter_chain.clone() else {
            return Ok(None);
        };

        let input = FilterInput {
            width: frame.width,
            height: frame.height,
            pixel_format: frame.format,
        };
        if self.filter.is_none() || self.filter_input != Some(input) {
            self.filter = Some(FilterPipeline::new(
                input.width,
                input.height,
                input.pixel_format,
                time_base,
                Rational::from(frame.sample_aspect_ratio),
                &chain,
            )?);
            self.filter_input = Some(input);
        }

        let pipeline = self.filter.as_mut().expect("filter pipeline just built");
        pipeline.push(frame)?;
        match pipeline.pull()? {
            Some(filtered) => Ok(Some(filtered)),
            None => Err(MediaError::ConvertFailed(
                "filter graph produced no frame".into(),
            )),
        }
    }
}

impl Drop for VideoConverter {
    fn drop(&mut self) {
        unsafe {
            if !self.scaler.is_null() {
                ffi::sws_freeContext(self.scaler);
            }
        }
    }
}

/// The `J` pixel formats are deprecated aliases for full-range variants the
/// scaler refuses; remap them to their plain equivalents.
fn remap_deprecated_pixel_format(format: ffi::AVPixelFormat) -> ffi::AVPixelFormat {
    match format {
        ffi::AV_PIX_FMT_YUVJ420P => ffi::AV_PIX_FMT_YUV420P,
        ffi::AV_PIX_FMT_YUVJ411P => ffi::AV_PIX_FMT_YUV411P,
        ffi::AV_PIX_FMT_YUVJ422P => ffi::AV_PIX_FMT_YUV422P,
        ffi::AV_PIX_FMT_YUVJ440P => ffi::AV_PIX_FMT_YUV440P,
        ffi::AV_PIX_FMT_YUVJ444P => ffi::AV_PIX_FMT_YUV444P,
        other => other,
    }
}
