use std::ffi::CString;
use std::ptr;

use libc::c_int;
use rsmpeg::avutil::AVFrame;
use rsmpeg::ffi;

use crate::error::{averror_string, MediaError, Result};
use crate::rational::Rational;

/// An owning wrapper around a configured `buffer -> user chain -> buffersink`
/// video filter graph.
///
/// The pipeline is rebuilt by its owner whenever the source frame parameters
/// change; it never reconfigures in place.
pub(crate) struct FilterPipeline {
    graph: *mut ffi::AVFilterGraph,
    source: *mut ffi::AVFilterContext,
    sink: *mut ffi::AVFilterContext,
}

impl FilterPipeline {
    pub(crate) fn new(
        width: c_int,
        height: c_int,
        pixel_format: ffi::AVPixelFormat,
        time_base: Rational,
        sample_aspect: Rational,
        chain: &str,
    ) -> Result<Self> {
        let time_base = if time_base.is_zero() {
            crate::time::AV_TIME_BASE
        } else {
            time_base
        };
        let sample_aspect = if sample_aspect.is_zero() {
            Rational::new(1, 1)
        } else {
            sample_aspect
        };

        let args = CString::new(format!(
            "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect={}/{}",
            width,
            height,
            pixel_format,
            time_base.numerator(),
            time_base.denominator(),
            sample_aspect.numerator(),
            sample_aspect.denominator(),
        ))
        .expect("filter args contain no NUL");
        let chain_cstr = CString::new(chain)
            .map_err(|_| MediaError::ConvertFailed("filter chain contains NUL".into()))?;

        unsafe {
            let graph = ffi::avfilter_graph_alloc();
            if graph.is_null() {
                return Err(MediaError::ConvertFailed("filter graph allocation".into()));
            }

            let buffer_name = CString::new("in").unwrap();
            let sink_name = CString::new("out").unwrap();

            let mut source: *mut ffi::AVFilterContext = ptr::null_mut();
            let ret = ffi::avfilter_graph_create_filter(
                &mut source,
                ffi::avfilter_get_by_name(CString::new("buffer").unwrap().as_ptr()),
                buffer_name.as_ptr(),
                args.as_ptr(),
                ptr::null_mut(),
                graph,
            );
            if ret < 0 {
                let mut graph = graph;
                ffi::avfilter_graph_free(&mut graph);
                return Err(MediaError::ConvertFailed(format!(
                    "filter source: {}",
                    averror_string(ret)
                )));
            }

            let mut sink: *mut ffi::AVFilterContext = ptr::null_mut();
            let ret = ffi::avfilter_graph_create_filter(
                &mut sink,
                ffi::avfilter_get_by_name(CString::new("buffersink").unwrap().as_ptr()),
                sink_name.as_ptr(),
                ptr::null(),
                ptr::null_mut(),
                graph,
            );
            if ret < 0 {
                let mut graph = graph;
                ffi::avfilter_graph_free(&mut graph);
                return Err(MediaError::ConvertFailed(format!(
                    "filter sink: {}",
                    averror_string(ret)
                )));
            }

            // The user chain's unlabelled input hangs off our source buffer
            // and its unlabelled output feeds the sink.
            let mut outputs = ffi::avfilter_inout_alloc();
            let mut inputs = ffi::avfilter_inout_alloc();
            if outputs.is_null() || inputs.is_null() {
                ffi::avfilter_inout_free(&mut outputs);
                ffi::avfilter_inout_free(&mut inputs);
                let mut graph = graph;
                ffi::avfilter_graph_free(&mut graph);
                return Err(MediaError::ConvertFailed("filter inout allocation".into()));
            }

            (*outputs).name = ffi::av_strdup(buffer_name.as_ptr());
            (*outputs).filter_ctx = source;
            (*outputs).pad_idx = 0;
            (*outputs).next = ptr::null_mut();

            (*inputs).name = ffi::av_strdup(sink_name.as_ptr());
            (*inputs).filter_ctx = sink;
            (*inputs).pad_idx = 0;
            (*inputs).next = ptr::null_mut();

            let ret = ffi::avfilter_graph_parse_ptr(
                graph,
                chain_cstr.as_ptr(),
                &mut inputs,
                &mut outputs,
                ptr::null_mut(),
            );
            ffi::avfilter_inout_free(&mut inputs);
            ffi::avfilter_inout_free(&mut outputs);
            if ret < 0 {
                let mut graph = graph;
                ffi::avfilter_graph_free(&mut graph);
                return Err(MediaError::ConvertFailed(format!(
                    "filter chain '{chain}': {}",
                    averror_string(ret)
                )));
            }

            let ret = ffi::avfilter_graph_config(graph, ptr::null_mut());
            if ret < 0 {
                let mut graph = graph;
                ffi::avfilter_graph_free(&mut graph);
                return Err(MediaError::ConvertFailed(format!(
                    "filter graph config: {}",
                    averror_string(ret)
                )));
            }

            tracing::debug!(target: "component", chain, "video filter graph configured");
            Ok(Self {
                graph,
                source,
                sink,
            })
        }
    }

    /// Feed one frame into the graph.
    pub(crate) fn push(&mut self, frame: &AVFrame) -> Result<()> {
        let ret = unsafe { ffi::av_buffersrc_write_frame(self.source, frame.as_ptr() as _) };
        if ret < 0 {
            return Err(MediaError::ConvertFailed(format!(
                "filter push: {}",
                averror_string(ret)
            )));
        }
        Ok(())
    }

    /// Pull the next filtered frame, or `None` when the graph needs input.
    pub(crate) fn pull(&mut self) -> Result<Option<AVFrame>> {
        let mut output = AVFrame::new();
        let ret = unsafe { ffi::av_buffersink_get_frame(self.sink, output.as_mut_ptr()) };
        if ret >= 0 {
            return Ok(Some(output));
        }
        if ret == crate::error::AVERROR_EAGAIN || ret == ffi::AVERROR_EOF {
            return Ok(None);
        }
        Err(MediaError::ConvertFailed(format!(
            "filter pull: {}",
            averror_string(ret)
        )))
    }
}

impl Drop for FilterPipeline {
    fn drop(&mut self) {
        unsafe {
            ffi::avfilter_graph_free(&mut self.graph);
        }
    }
}

unsafe impl Send for FilterPipeline {}
