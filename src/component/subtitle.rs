use std::mem;

use rsmpeg::avcodec::AVPacket;
use rsmpeg::ffi;

use crate::block::SubtitleBlock;
use crate::error::{averror_string, MediaError, Result};
use crate::frame::{Frame, FrameSource, SubtitleSource, SubtitleTextType};
use crate::packet::Packet;
use crate::time::Ticks;

use super::{ComponentDecoder, DecoderState};

/// Fallback display time when neither the subtitle nor its packet carries one.
const DEFAULT_DURATION: Ticks = Ticks::from_seconds(3);

/// Decode one subtitle packet through the legacy `avcodec_decode_subtitle2`
/// API. After the source packet is consumed, empty packets keep the call
/// going while the decoder still yields subtitles from the same input.
pub(crate) fn decode_subtitle(
    decoder: &mut ComponentDecoder,
    packet: Packet,
) -> Result<Vec<Frame>> {
    if packet.is_drain() {
        // The legacy API buffers nothing, so draining completes immediately.
        decoder.state = DecoderState::Flushed;
        return Ok(Vec::new());
    }

    let compressed_size = packet.size();
    let packet_pts = packet.pts();
    let packet_duration = packet.duration();
    let stream_index = decoder.stream_index;
    let start_time_offset = decoder.start_time_offset;

    let empty = AVPacket::new();
    let mut frames = Vec::new();
    let mut first_call = true;

    loop {
        let native = match (first_call, packet.as_native()) {
            (true, Some(native)) => native,
            _ => &empty,
        };

        let mut subtitle: ffi::AVSubtitle = unsafe { mem::zeroed() };
        let mut got_frame = 0;
        let ret = unsafe {
            ffi::avcodec_decode_subtitle2(
                decoder.codec_ptr(),
                &mut subtitle,
                &mut got_frame,
                native.as_ptr() as _,
            )
        };
        if ret < 0 {
            if first_call {
                return Err(MediaError::ConvertFailed(format!(
                    "subtitle decode: {}",
                    averror_string(ret)
                )));
            }
            break;
        }
        if got_frame == 0 {
            break;
        }

        let frame = unsafe {
            wrap_subtitle(
                &subtitle,
                packet_pts,
                packet_duration,
                start_time_offset,
                stream_index,
                compressed_size,
            )
        };
        unsafe {
            ffi::avsubtitle_free(&mut subtitle);
        }
        if let Some(frame) = frame {
            frames.push(frame);
        }

        first_call = false;
    }

    if decoder.state == DecoderState::Idle {
        decoder.state = DecoderState::Active;
    }
    Ok(frames)
}

/// Build a subtitle frame from the decoded native structure. Text is copied
/// out immediately so no native memory outlives this call.
unsafe fn wrap_subtitle(
    subtitle: &ffi::AVSubtitle,
    packet_pts: Option<Ticks>,
    packet_duration: Ticks,
    start_time_offset: Ticks,
    stream_index: usize,
    compressed_size: usize,
) -> Option<Frame> {
    let mut rects = Vec::with_capacity(subtitle.num_rects as usize);
    let mut text_type = SubtitleTextType::Text;

    for i in 0..subtitle.num_rects as usize {
        let rect = *subtitle.rects.add(i);
        if rect.is_null() {
            continue;
        }
        match (*rect).type_ {
            ffi::SUBTITLE_ASS => {
                text_type = SubtitleTextType::Ass;
                if !(*rect).ass.is_null() {
                    rects.push(
                        std::ffi::CStr::from_ptr((*rect).ass)
                            .to_string_lossy()
                            .into_owned(),
                    );
                }
            }
            ffi::SUBTITLE_TEXT => {
                text_type = SubtitleTextType::Text;
                if !(*rect).text.is_null() {
                    rects.push(
                        std::ffi::CStr::from_ptr((*rect).text)
                            .to_string_lossy()
                            .into_owned(),
                    );
                }
            }
            ffi::SUBTITLE_BITMAP => {
                text_type = SubtitleTextType::Bitmap;
            }
            _ => {}
        }
    }

    if rects.is_empty() && text_type != SubtitleTextType::Bitmap {
        return None;
    }

    // The legacy API reports pts on the global microsecond scale; the packet
    // pts is the stream-relative fallback. Either way the component offset is
    // subtracted so the frame lands on the 0-based engine timeline.
    let base = if subtitle.pts != ffi::AV_NOPTS_VALUE {
        Ticks::from_av_time(subtitle.pts)
    } else {
        packet_pts.unwrap_or(Ticks::ZERO)
    } - start_time_offset;

    let start_time = base + Ticks::from_millis(subtitle.start_display_time as i64);
    let display = Ticks::from_millis(
        subtitle.end_display_time as i64 - subtitle.start_display_time as i64,
    );
    let duration = if display > Ticks::ZERO {
        display
    } else if packet_duration > Ticks::ZERO {
        packet_duration
    } else {
        DEFAULT_DURATION
    };

    Some(Frame::new(
        crate::stream::MediaType::Subtitle,
        stream_index,
        start_time,
        duration,
        compressed_size,
        FrameSource::Subtitle(SubtitleSource { text_type, rects }),
    ))
}

/// Remove any substring enclosed in `<...>` from an SRT cue.
pub fn strip_srt_formatting(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut depth = 0usize;
    for ch in input.chars() {
        match ch {
            '<' => depth += 1,
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => output.push(ch),
            _ => {}
        }
    }
    output
}

/// Extract the text of an ASS dialogue line.
///
/// Requires the case-insensitive `Dialogue:` prefix and ten comma-separated
/// fields; the text is the tenth field. `\N` becomes a newline, `\n` a space,
/// and `{...}` override blocks are removed. Returns `None` for lines that are
/// not dialogue events.
pub fn strip_ass_formatting(input: &str) -> Option<String> {
    const PREFIX: &str = "dialogue:";
    if input.len() < PREFIX.len() || !input[..PREFIX.len()].eq_ignore_ascii_case(PREFIX) {
        return None;
    }

    let fields: Vec<&str> = input.splitn(10, ',').collect();
    if fields.len() != 10 {
        return None;
    }

    let text = fields[9].replace("\\N", "\n").replace("\\n", " ");
    let mut output = String::with_capacity(text.len());
    let mut depth = 0usize;
    for ch in text.chars() {
        match ch {
            '{' => depth += 1,
            '}' if depth > 0 => depth -= 1,
            _ if depth == 0 => output.push(ch),
            _ => {}
        }
    }
    Some(output)
}

/// Copies subtitle text into blocks, stripping source formatting.
pub(crate) struct SubtitleConverter;

impl SubtitleConverter {
    pub(crate) fn new() -> Self {
        SubtitleConverter
    }

    pub(crate) fn materialise(
        &mut self,
        source: &SubtitleSource,
        target: &mut SubtitleBlock,
    ) -> Result<()> {
        target.lines.clear();
        target.text_type = Some(source.text_type);

        for rect in &source.rects {
            let stripped = match source.text_type {
                SubtitleTextType::Ass => strip_ass_formatting(rect),
                SubtitleTextType::Text => Some(strip_srt_formatting(rect)),
                SubtitleTextType::Bitmap => None,
            };
            let Some(stripped) = stripped else { continue };
            for line in stripped.lines() {
                if !line.trim().is_empty() {
                    target.lines.push(line.to_string());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srt_tags_removed() {
        assert_eq!(
            strip_srt_formatting("<i>hello</i> <b>world</b>"),
            "hello world"
        );
        assert_eq!(strip_srt_formatting("no tags here"), "no tags here");
        assert_eq!(strip_srt_formatting("<font color=\"red\">x</font>"), "x");
    }

    #[test]
    fn ass_dialogue_extracted() {
        let line = "Dialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,{\\an8}Greetings\\Nworld";
        assert_eq!(strip_ass_formatting(line).as_deref(), Some("Greetings\nworld"));
    }

    #[test]
    fn ass_prefix_is_case_insensitive() {
        let line = "dialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,hi";
        assert_eq!(strip_ass_formatting(line).as_deref(), Some("hi"));
    }

    #[test]
    fn ass_rejects_non_dialogue() {
        assert!(strip_ass_formatting("Format: Layer, Start, End").is_none());
        assert!(strip_ass_formatting("Dialogue: too,few,fields").is_none());
    }

    #[test]
    fn ass_text_keeps_embedded_commas() {
        let line = "Dialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,one, two, three";
        assert_eq!(strip_ass_formatting(line).as_deref(), Some("one, two, three"));
    }

    #[test]
    fn ass_soft_break_becomes_space() {
        let line = "Dialogue: 0,0:00:01.00,0:00:02.00,Default,,0,0,0,,a\\nb";
        assert_eq!(strip_ass_formatting(line).as_deref(), Some("a b"));
    }

    #[test]
    fn converter_drops_empty_lines() {
        let mut converter = SubtitleConverter::new();
        let mut block = SubtitleBlock::default();
        let source = SubtitleSource {
            text_type: SubtitleTextType::Text,
            rects: vec!["<i></i>".into(), "<b>hello</b>".into()],
        };
        converter.materialise(&source, &mut block).unwrap();
        assert_eq!(block.lines, vec!["hello".to_string()]);
        assert_eq!(block.text_type, Some(SubtitleTextType::Text));
    }
}
