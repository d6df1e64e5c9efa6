use bitflags::bitflags;
use libc::c_uint;
use rsmpeg::ffi;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct AvPacketFlags: c_uint {
        const KEY     = ffi::AV_PKT_FLAG_KEY;
        const CORRUPT = ffi::AV_PKT_FLAG_CORRUPT;
        const DISCARD = ffi::AV_PKT_FLAG_DISCARD;
        const TRUSTED = ffi::AV_PKT_FLAG_TRUSTED;
        const DISPOSABLE = ffi::AV_PKT_FLAG_DISPOSABLE;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct AvFormatFlags: c_uint {
        const NO_FILE       = ffi::AVFMT_NOFILE;
        const NEED_NUMBER   = ffi::AVFMT_NEEDNUMBER;
        const SHOW_IDS      = ffi::AVFMT_SHOW_IDS;
        const GLOBAL_HEADER = ffi::AVFMT_GLOBALHEADER;
        const NO_TIMESTAMPS = ffi::AVFMT_NOTIMESTAMPS;
        const GENERIC_INDEX = ffi::AVFMT_GENERIC_INDEX;
        const TS_DISCONT    = ffi::AVFMT_TS_DISCONT;
        const VARIABLE_FPS  = ffi::AVFMT_VARIABLE_FPS;
        const NO_BINSEARCH  = ffi::AVFMT_NOBINSEARCH;
        const NO_GENSEARCH  = ffi::AVFMT_NOGENSEARCH;
        const NO_BYTE_SEEK  = ffi::AVFMT_NO_BYTE_SEEK;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct AvDispositionFlags: c_uint {
        const DEFAULT          = ffi::AV_DISPOSITION_DEFAULT;
        const DUB              = ffi::AV_DISPOSITION_DUB;
        const ORIGINAL         = ffi::AV_DISPOSITION_ORIGINAL;
        const COMMENT          = ffi::AV_DISPOSITION_COMMENT;
        const LYRICS           = ffi::AV_DISPOSITION_LYRICS;
        const KARAOKE          = ffi::AV_DISPOSITION_KARAOKE;
        const FORCED           = ffi::AV_DISPOSITION_FORCED;
        const HEARING_IMPAIRED = ffi::AV_DISPOSITION_HEARING_IMPAIRED;
        const VISUAL_IMPAIRED  = ffi::AV_DISPOSITION_VISUAL_IMPAIRED;
        const CLEAN_EFFECTS    = ffi::AV_DISPOSITION_CLEAN_EFFECTS;
        const ATTACHED_PIC     = ffi::AV_DISPOSITION_ATTACHED_PIC;
        const CAPTIONS         = ffi::AV_DISPOSITION_CAPTIONS;
        const DESCRIPTIONS     = ffi::AV_DISPOSITION_DESCRIPTIONS;
        const METADATA         = ffi::AV_DISPOSITION_METADATA;
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct AvSeekFlags: c_uint {
        const BACKWARD = ffi::AVSEEK_FLAG_BACKWARD;
        const BYTE     = ffi::AVSEEK_FLAG_BYTE;
        const ANY      = ffi::AVSEEK_FLAG_ANY;
        const FRAME    = ffi::AVSEEK_FLAG_FRAME;
    }
}
