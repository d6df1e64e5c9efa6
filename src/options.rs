use std::collections::HashMap;
use std::ffi::{c_int, CStr, CString};
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::str::from_utf8_unchecked;

use rsmpeg::ffi;

use crate::stream::StreamSpecifier;

/// Iterator over the entries of a native dictionary.
pub struct Iter<'a> {
    ptr: *const ffi::AVDictionary,
    cur: *mut ffi::AVDictionaryEntry,
    _marker: PhantomData<&'a ()>,
}

impl<'a> Iter<'a> {
    pub fn new(dictionary: *const ffi::AVDictionary) -> Self {
        Iter {
            ptr: dictionary,
            cur: ptr::null_mut(),
            _marker: PhantomData,
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<<Self as Iterator>::Item> {
        unsafe {
            let empty = CString::new("").unwrap();
            let entry = ffi::av_dict_get(
                self.ptr,
                empty.as_ptr(),
                self.cur,
                ffi::AV_DICT_IGNORE_SUFFIX as c_int,
            );

            if !entry.is_null() {
                let key = from_utf8_unchecked(CStr::from_ptr((*entry).key).to_bytes());
                let val = from_utf8_unchecked(CStr::from_ptr((*entry).value).to_bytes());

                self.cur = entry;

                Some((key, val))
            } else {
                None
            }
        }
    }
}

/// Borrowed view over a native dictionary that the caller does not own, such
/// as container or stream metadata.
pub struct DictionaryRef<'a> {
    ptr: *const ffi::AVDictionary,
    _marker: PhantomData<&'a ()>,
}

impl<'a> DictionaryRef<'a> {
    pub unsafe fn wrap(ptr: *const ffi::AVDictionary) -> Self {
        DictionaryRef {
            ptr,
            _marker: PhantomData,
        }
    }

    pub fn get(&'a self, key: &str) -> Option<&'a str> {
        unsafe {
            let key = CString::new(key).unwrap();
            let entry = ffi::av_dict_get(self.ptr, key.as_ptr(), ptr::null_mut(), 0);

            if entry.is_null() {
                None
            } else {
                Some(from_utf8_unchecked(
                    CStr::from_ptr((*entry).value).to_bytes(),
                ))
            }
        }
    }

    pub fn iter(&self) -> Iter {
        Iter::new(self.ptr)
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        self.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl<'a> fmt::Debug for DictionaryRef<'a> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_map().entries(self.iter()).finish()
    }
}

/// An owned native dictionary used to pass options into the demuxer and the
/// codecs. The pointer may be given away with `disown` for calls that consume
/// the dictionary.
pub struct Dictionary {
    ptr: *mut ffi::AVDictionary,
}

impl Dictionary {
    pub fn new() -> Self {
        Dictionary {
            ptr: ptr::null_mut(),
        }
    }

    pub unsafe fn own(ptr: *mut ffi::AVDictionary) -> Self {
        Dictionary { ptr }
    }

    /// Hand ownership of the native pointer to a consuming native call.
    pub unsafe fn disown(mut self) -> *mut ffi::AVDictionary {
        std::mem::replace(&mut self.ptr, ptr::null_mut())
    }

    pub unsafe fn as_mut_ptr_ref(&mut self) -> *mut *mut ffi::AVDictionary {
        &mut self.ptr
    }

    pub fn set(&mut self, key: &str, value: &str) {
        unsafe {
            let key = CString::new(key).unwrap();
            let value = CString::new(value).unwrap();

            if ffi::av_dict_set(&mut self.ptr, key.as_ptr(), value.as_ptr(), 0) < 0 {
                panic!("out of memory");
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        unsafe {
            let key = CString::new(key).unwrap();
            let entry = ffi::av_dict_get(self.ptr, key.as_ptr(), ptr::null_mut(), 0);

            if entry.is_null() {
                None
            } else {
                Some(
                    CStr::from_ptr((*entry).value)
                        .to_string_lossy()
                        .into_owned(),
                )
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> Iter {
        Iter::new(self.ptr)
    }

    pub fn len(&self) -> usize {
        unsafe { ffi::av_dict_count(self.ptr) as usize }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Dictionary {
    fn clone(&self) -> Self {
        let mut ptr = ptr::null_mut();
        unsafe {
            ffi::av_dict_copy(&mut ptr, self.ptr, 0);
        }
        Dictionary { ptr }
    }
}

impl Drop for Dictionary {
    fn drop(&mut self) {
        unsafe {
            ffi::av_dict_free(&mut self.ptr);
        }
    }
}

impl<'b> FromIterator<(&'b str, &'b str)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (&'b str, &'b str)>>(iterator: T) -> Self {
        let mut result = Dictionary::new();
        for (key, value) in iterator {
            result.set(key, value);
        }
        result
    }
}

impl From<&HashMap<String, String>> for Dictionary {
    fn from(map: &HashMap<String, String>) -> Self {
        let mut result = Dictionary::new();
        for (key, value) in map {
            result.set(key, value);
        }
        result
    }
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_map().entries(self.iter()).finish()
    }
}

unsafe impl Send for Dictionary {}

/// Verbosity forwarded to the native library through `av_log_set_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Trace,
    None,
}

impl LogLevel {
    pub(crate) fn to_native(self) -> c_int {
        let level = match self {
            LogLevel::Trace => ffi::AV_LOG_TRACE,
            LogLevel::Debug => ffi::AV_LOG_DEBUG,
            LogLevel::Info => ffi::AV_LOG_INFO,
            LogLevel::Warning => ffi::AV_LOG_WARNING,
            LogLevel::Error => ffi::AV_LOG_ERROR,
            LogLevel::None => ffi::AV_LOG_QUIET,
        };
        level as c_int
    }
}

/// Canonical audio output specification for materialised audio blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioOutputSpec {
    pub channel_count: i32,
    pub sample_rate: i32,
    /// Extra samples kept in the output buffer to absorb resampler jitter.
    pub buffer_padding: i32,
}

impl Default for AudioOutputSpec {
    fn default() -> Self {
        Self {
            channel_count: 2,
            sample_rate: 48_000,
            buffer_padding: 256,
        }
    }
}

/// Engine configuration assembled by the host before `open`.
///
/// Option keys the demuxer does not recognise are logged as warnings and
/// skipped; they never abort an open.
#[derive(Debug, Clone, Default)]
pub struct MediaOptions {
    /// Short name of a demuxer to use instead of probing, e.g. `mpegts`.
    pub forced_input_format: Option<String>,
    /// Options passed to the demuxer. `scan_all_pmts` is forced to `1` when
    /// the caller does not set it.
    pub format_options: HashMap<String, String>,
    /// Codec options applied per matching stream.
    pub codec_options: Vec<(StreamSpecifier, String, String)>,
    /// Ask the demuxer to generate missing presentation timestamps.
    pub generate_pts: bool,
    /// Enable the codec's low resolution decoding path where supported.
    pub enable_low_res: bool,
    /// Set the codec "fast" flag, trading conformance for speed.
    pub enable_fast_decoding: bool,
    /// Filter chain inserted between the video source buffer and the sink.
    pub video_filter_graph: Option<String>,
    pub is_audio_disabled: bool,
    pub is_video_disabled: bool,
    pub is_subtitle_disabled: bool,
    pub audio_output: AudioOutputSpec,
    pub log_level: LogLevel,
}

impl MediaOptions {
    /// Build the demuxer dictionary, applying the `scan_all_pmts` default.
    pub(crate) fn format_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::from(&self.format_options);
        if !dict.contains("scan_all_pmts") {
            dict.set("scan_all_pmts", "1");
        }
        dict
    }

    /// Collect the codec options that apply to one stream.
    pub(crate) fn codec_dictionary(
        &self,
        media_type: crate::stream::MediaType,
        stream_index: usize,
    ) -> Dictionary {
        let mut dict = Dictionary::new();
        for (spec, key, value) in &self.codec_options {
            if spec.matches(media_type, stream_index) {
                dict.set(key, value);
            }
        }
        dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MediaType;

    #[test]
    fn scan_all_pmts_defaulted() {
        let options = MediaOptions::default();
        let dict = options.format_dictionary();
        assert_eq!(dict.get("scan_all_pmts").as_deref(), Some("1"));
    }

    #[test]
    fn scan_all_pmts_not_overridden() {
        let mut options = MediaOptions::default();
        options
            .format_options
            .insert("scan_all_pmts".into(), "0".into());
        assert_eq!(options.format_dictionary().get("scan_all_pmts").as_deref(), Some("0"));
    }

    #[test]
    fn codec_options_filtered_by_specifier() {
        let mut options = MediaOptions::default();
        options.codec_options.push((
            StreamSpecifier::parse("v").unwrap(),
            "threads".into(),
            "2".into(),
        ));
        options.codec_options.push((
            StreamSpecifier::parse("a:1").unwrap(),
            "ac".into(),
            "1".into(),
        ));

        let video = options.codec_dictionary(MediaType::Video, 0);
        assert_eq!(video.get("threads").as_deref(), Some("2"));
        assert!(video.get("ac").is_none());

        let audio = options.codec_dictionary(MediaType::Audio, 1);
        assert_eq!(audio.get("ac").as_deref(), Some("1"));
    }
}
