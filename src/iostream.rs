use std::io::{Read, Seek, SeekFrom};

use libc::{c_int, c_void};
use rsmpeg::ffi;

use crate::error::{MediaError, Result};

/// Transfer buffer handed to the native I/O layer.
const IO_BUFFER_SIZE: usize = 32 * 1024;

/// A host supplied byte stream the demuxer can read and seek.
///
/// Implementations must be `Send`: the reader worker performs the actual
/// calls. `length` powers the demuxer's size queries; returning `None`
/// degrades seeking but is otherwise harmless.
pub trait MediaInputStream: Read + Seek + Send {
    fn length(&self) -> Option<u64> {
        None
    }
}

impl<T: AsRef<[u8]> + Send> MediaInputStream for std::io::Cursor<T> {
    fn length(&self) -> Option<u64> {
        Some(self.get_ref().as_ref().len() as u64)
    }
}

type StreamBox = Box<dyn MediaInputStream>;

unsafe extern "C" fn read_packet(opaque: *mut c_void, buffer: *mut u8, length: c_int) -> c_int {
    let stream = &mut *(opaque as *mut StreamBox);
    if length <= 0 {
        return 0;
    }
    let slice = std::slice::from_raw_parts_mut(buffer, length as usize);
    match stream.read(slice) {
        Ok(0) => ffi::AVERROR_EOF,
        Ok(read) => read as c_int,
        Err(_) => -libc::EIO,
    }
}

unsafe extern "C" fn seek_stream(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    let stream = &mut *(opaque as *mut StreamBox);

    if whence as libc::c_uint & ffi::AVSEEK_SIZE != 0 {
        return stream.length().map(|length| length as i64).unwrap_or(-1);
    }

    let position = match whence as libc::c_uint & !ffi::AVSEEK_FORCE {
        0 => SeekFrom::Start(offset.max(0) as u64),
        1 => SeekFrom::Current(offset),
        2 => SeekFrom::End(offset),
        _ => return -1,
    };
    stream
        .seek(position)
        .map(|position| position as i64)
        .unwrap_or(-1)
}

/// Owns the `AVIOContext` that routes demuxer I/O through a
/// [`MediaInputStream`]. The bridge must outlive the format context using it.
pub(crate) struct AvioBridge {
    ctx: *mut ffi::AVIOContext,
    opaque: *mut StreamBox,
}

impl AvioBridge {
    pub(crate) fn new(stream: StreamBox) -> Result<Self> {
        unsafe {
            let buffer = ffi::av_malloc(IO_BUFFER_SIZE) as *mut u8;
            if buffer.is_null() {
                return Err(MediaError::OpenFailed("io buffer allocation".into()));
            }

            let opaque = Box::into_raw(Box::new(stream));
            let ctx = ffi::avio_alloc_context(
                buffer,
                IO_BUFFER_SIZE as c_int,
                0,
                opaque as *mut c_void,
                Some(read_packet),
                None,
                Some(seek_stream),
            );
            if ctx.is_null() {
                ffi::av_free(buffer as *mut c_void);
                drop(Box::from_raw(opaque));
                return Err(MediaError::OpenFailed("io context allocation".into()));
            }
            Ok(Self { ctx, opaque })
        }
    }

    pub(crate) fn ctx(&self) -> *mut ffi::AVIOContext {
        self.ctx
    }
}

impl Drop for AvioBridge {
    fn drop(&mut self) {
        unsafe {
            if !self.ctx.is_null() {
                // The io buffer may have been reallocated internally; free
                // whatever the context currently points at.
                ffi::av_freep(&mut (*self.ctx).buffer as *mut _ as *mut c_void);
                ffi::avio_context_free(&mut self.ctx);
            }
            drop(Box::from_raw(self.opaque));
        }
    }
}

unsafe impl Send for AvioBridge {}
