use std::mem;
use std::ptr;

use libc::c_int;
use rsmpeg::avutil::AVFrame;
use rsmpeg::ffi;

use crate::block::AudioBlock;
use crate::error::{averror_string, MediaError, Result};
use crate::options::AudioOutputSpec;

/// Source parameters the resampler was built for. A change on any of them
/// forces a rebuild before the next conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SourceSpec {
    sample_format: ffi::AVSampleFormat,
    sample_rate: c_int,
    channel_count: c_int,
}

/// Owning handle for a native software resampler.
struct Resampler {
    ctx: *mut ffi::SwrContext,
}

impl Resampler {
    /// Build and initialise a resampler from `source` to the engine output.
    fn new(source: SourceSpec, source_layout: *const ffi::AVChannelLayout, output: AudioOutputSpec) -> Result<Self> {
        unsafe {
            let mut out_layout: ffi::AVChannelLayout = mem::zeroed();
            ffi::av_channel_layout_default(&mut out_layout, output.channel_count as c_int);

            let mut ctx: *mut ffi::SwrContext = ptr::null_mut();
            let ret = ffi::swr_alloc_set_opts2(
                &mut ctx,
                &out_layout,
                ffi::AV_SAMPLE_FMT_S16,
                output.sample_rate as c_int,
                source_layout,
                source.sample_format,
                source.sample_rate,
                0,
                ptr::null_mut(),
            );
            ffi::av_channel_layout_uninit(&mut out_layout);
            if ret < 0 || ctx.is_null() {
                return Err(MediaError::ConvertFailed(format!(
                    "resampler allocation: {}",
                    averror_string(ret)
                )));
            }

            let ret = ffi::swr_init(ctx);
            if ret < 0 {
                ffi::swr_free(&mut ctx);
                return Err(MediaError::ConvertFailed(format!(
                    "resampler init: {}",
                    averror_string(ret)
                )));
            }
            Ok(Self { ctx })
        }
    }

    /// Samples buffered inside the resampler, expressed at the source rate.
    fn delay(&self, source_rate: c_int) -> i64 {
        unsafe { ffi::swr_get_delay(self.ctx, source_rate as i64) }
    }
}

impl Drop for Resampler {
    fn drop(&mut self) {
        unsafe {
            ffi::swr_free(&mut self.ctx);
        }
    }
}

/// Materialises decoded audio frames into canonical S16 interleaved blocks.
///
/// The resampler is built lazily on the first frame and rebuilt whenever the
/// source format, rate or channel count changes mid-stream.
pub(crate) struct AudioConverter {
    output: AudioOutputSpec,
    resampler: Option<Resampler>,
    last_source_spec: Option<SourceSpec>,
}

impl AudioConverter {
    pub(crate) fn new(output: AudioOutputSpec) -> Self {
        Self {
            output,
            resampler: None,
            last_source_spec: None,
        }
    }

    pub(crate) fn materialise(&mut self, frame: &AVFrame, target: &mut AudioBlock) -> Result<()> {
        let source = SourceSpec {
            sample_format: frame.format,
            sample_rate: frame.sample_rate,
            channel_count: frame.ch_layout.nb_channels,
        };
        if source.sample_rate <= 0 || source.channel_count <= 0 {
            return Err(MediaError::ConvertFailed(
                "audio frame without rate or channels".into(),
            ));
        }

        if self.resampler.is_none() || self.last_source_spec != Some(source) {
            let layout = &frame.ch_layout as *const ffi::AVChannelLayout;
            self.resampler = Some(Resampler::new(source, layout, self.output)?);
            self.last_source_spec = Some(source);
            tracing::debug!(target: "component",
                from_rate = source.sample_rate,
                from_channels = source.channel_count,
                to_rate = self.output.sample_rate,
                to_channels = self.output.channel_count,
                "audio resampler (re)initialised");
        }
        let resampler = self.resampler.as_ref().expect("resampler just initialised");

        // Target count rounds source samples onto the output rate; the
        // resampler delay and the configured padding absorb rounding drift.
        let delay = resampler.delay(source.sample_rate);
        let capacity = ((delay + frame.nb_samples as i64) * self.output.sample_rate as i64
            + source.sample_rate as i64
            - 1)
            / source.sample_rate as i64
            + self.output.buffer_padding as i64;
        let capacity = capacity.max(1) as usize;

        let bytes_per_sample = self.output.channel_count as usize * 2;
        let required = capacity * bytes_per_sample;
        if target.buffer.len() != required {
            target.buffer.resize(required, 0);
        }

        let converted = unsafe {
            let out_ptrs = [target.buffer.as_mut_ptr()];
            ffi::swr_convert(
                resampler.ctx,
                out_ptrs.as_ptr() as _,
                capacity as c_int,
                frame.extended_data as _,
                frame.nb_samples,
            )
        };
        if converted < 0 {
            return Err(MediaError::ConvertFailed(format!(
                "resample: {}",
                averror_string(converted)
            )));
        }

        target.channel_count = self.output.channel_count;
        target.sample_rate = self.output.sample_rate;
        target.samples_per_channel = converted;
        target.buffer.truncate(converted as usize * bytes_per_sample);
        Ok(())
    }
}
