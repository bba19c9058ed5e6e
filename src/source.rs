//! Sequential frame sources.
//!
//! The scanner only ever walks a video forward, one frame at a time, so a
//! source is anything that can report its [`VideoInfo`] and push decoded
//! frames of a half-open index range into a handler.
//!
//! [`VideoFile`] decodes a container through FFmpeg. [`FrameSequence`] holds
//! pre-rendered frames in memory and is what tests and benchmarks use.

use std::{ops::Range, path::Path};

use ffmpeg_next::{
    Rational,
    codec::context::Context as CodecContext,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::RgbImage;

use crate::{error::ScanError, metadata::VideoInfo, timecode::frame_to_timecode};

/// One decoded frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based frame index within the video.
    pub index: u64,
    /// Pixel data, 8-bit RGB.
    pub image: RgbImage,
}

impl Frame {
    /// `HH:MM:SS:FF` timecode of this frame.
    pub fn timecode(&self, frames_per_second: f64) -> String {
        frame_to_timecode(self.index, frames_per_second)
    }
}

/// A video that can be read front to back.
pub trait FrameSource {
    /// Stream metadata, fixed at open time.
    fn info(&self) -> &VideoInfo;

    /// Decode every frame whose index lies in `range`, in increasing index
    /// order, and pass each to `handler`.
    ///
    /// Frames that fail to decode are logged and skipped. An error returned
    /// by `handler` stops the walk and is returned.
    fn for_each_frame(
        &mut self,
        range: Range<u64>,
        handler: &mut dyn FnMut(Frame) -> Result<(), ScanError>,
    ) -> Result<(), ScanError>;
}

/// A video file decoded through FFmpeg.
///
/// The demuxer handle is owned by this value and released when it is
/// dropped, on every exit path of a scan.
///
/// # Example
///
/// ```no_run
/// use markscan::{FrameSource, ScanError, VideoFile};
///
/// let video = VideoFile::open("reel_03.mov")?;
/// println!("{}x{} @ {:.3} fps", video.info().width, video.info().height, video.info().frames_per_second);
/// # Ok::<(), ScanError>(())
/// ```
pub struct VideoFile {
    input_context: Input,
    video_stream_index: usize,
    info: VideoInfo,
}

impl VideoFile {
    /// Open a video file and read its stream metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::FileOpen`] if FFmpeg cannot open the file or
    /// read its codec parameters, and [`ScanError::NoVideoStream`] if it has
    /// no video stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();
        log::debug!("Opening video file: {}", path.display());

        let open_error = |reason: String| ScanError::FileOpen {
            path: path.to_path_buf(),
            reason,
        };

        // Safe to call more than once.
        ffmpeg_next::init()
            .map_err(|error| open_error(format!("FFmpeg initialisation failed: {error}")))?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| open_error(error.to_string()))?;

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or(ScanError::NoVideoStream)?;
        let video_stream_index = stream.index();

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| open_error(format!("Failed to create video decoder: {error}")))?;

        let frames_per_second = rational_to_f64(stream.avg_frame_rate())
            .or_else(|| rational_to_f64(stream.rate()))
            .unwrap_or(0.0);

        let frame_count = if stream.frames() > 0 {
            stream.frames() as u64
        } else {
            let stream_seconds = if stream.duration() > 0 {
                stream.duration() as f64 * rational_to_f64(stream.time_base()).unwrap_or(0.0)
            } else {
                input_context.duration().max(0) as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE)
            };
            (stream_seconds * frames_per_second) as u64
        };

        let info = VideoInfo::new(
            decoder.width(),
            decoder.height(),
            frames_per_second,
            frame_count,
        );

        log::debug!(
            "Opened video file: {} ({}x{}, {:.3} fps, {} frames)",
            path.display(),
            info.width,
            info.height,
            info.frames_per_second,
            info.frame_count,
        );

        Ok(Self {
            input_context,
            video_stream_index,
            info,
        })
    }
}

impl FrameSource for VideoFile {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn for_each_frame(
        &mut self,
        range: Range<u64>,
        handler: &mut dyn FnMut(Frame) -> Result<(), ScanError>,
    ) -> Result<(), ScanError> {
        if range.is_empty() {
            return Ok(());
        }

        let stream = self
            .input_context
            .stream(self.video_stream_index)
            .ok_or(ScanError::NoVideoStream)?;
        let time_base = stream.time_base();
        let start_pts = stream_start_pts(stream.start_time());
        let mut decoder = CodecContext::from_parameters(stream.parameters())?
            .decoder()
            .video()?;

        let width = self.info.width;
        let height = self.info.height;
        let frames_per_second = self.info.frames_per_second;

        let mut scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            width,
            height,
            ScalingFlags::BILINEAR,
        )?;

        if range.start > 0 {
            // Container-level seeks are in AV_TIME_BASE units and absolute.
            let offset_seconds = start_pts.map_or(0.0, |start| {
                start as f64 * rational_to_f64(time_base).unwrap_or(0.0)
            });
            let target = ((offset_seconds + range.start as f64 / frames_per_second)
                * f64::from(ffmpeg_next::ffi::AV_TIME_BASE)) as i64;
            if let Err(error) = self.input_context.seek(target, ..target) {
                log::warn!("Seek to frame {} failed, decoding from the start: {error}", range.start);
            }
        }

        let mut walk = DecodeWalk {
            range,
            time_base,
            start_pts,
            frames_per_second,
            width,
            height,
            next_index: 0,
            last_delivered: None,
            decoded: VideoFrame::empty(),
            rgb: VideoFrame::empty(),
        };

        for (stream, packet) in self.input_context.packets() {
            if stream.index() != self.video_stream_index {
                continue;
            }
            if let Err(error) = decoder.send_packet(&packet) {
                log::warn!("Skipping undecodable packet: {error}");
                continue;
            }
            if walk.drain(&mut decoder, &mut scaler, handler)? {
                return Ok(());
            }
        }

        decoder.send_eof()?;
        walk.drain(&mut decoder, &mut scaler, handler)?;

        Ok(())
    }
}

/// State carried across packets while walking a frame range.
struct DecodeWalk {
    range: Range<u64>,
    time_base: Rational,
    start_pts: Option<i64>,
    frames_per_second: f64,
    width: u32,
    height: u32,
    next_index: u64,
    last_delivered: Option<u64>,
    decoded: VideoFrame,
    rgb: VideoFrame,
}

impl DecodeWalk {
    /// Pull every frame the decoder has ready. Returns `true` once the walk
    /// has passed the end of the range.
    fn drain(
        &mut self,
        decoder: &mut ffmpeg_next::decoder::Video,
        scaler: &mut ScalingContext,
        handler: &mut dyn FnMut(Frame) -> Result<(), ScanError>,
    ) -> Result<bool, ScanError> {
        while decoder.receive_frame(&mut self.decoded).is_ok() {
            let index = match self.decoded.timestamp().or_else(|| self.decoded.pts()) {
                Some(pts) => {
                    pts_to_frame_index(pts, self.start_pts, self.time_base, self.frames_per_second)
                }
                None => self.next_index,
            };
            self.next_index = index + 1;

            if index >= self.range.end {
                return Ok(true);
            }
            if index < self.range.start || self.last_delivered.is_some_and(|last| index <= last) {
                continue;
            }

            if let Err(error) = scaler.run(&self.decoded, &mut self.rgb) {
                log::warn!("Skipping frame {index}: colour conversion failed: {error}");
                continue;
            }
            let Some(image) = rgb_frame_to_image(&self.rgb, self.width, self.height) else {
                log::warn!("Skipping frame {index}: decoded plane is smaller than expected");
                continue;
            };

            self.last_delivered = Some(index);
            handler(Frame { index, image })?;
        }
        Ok(false)
    }
}

fn rational_to_f64(rational: Rational) -> Option<f64> {
    (rational.numerator() > 0 && rational.denominator() > 0)
        .then(|| rational.numerator() as f64 / rational.denominator() as f64)
}

/// FFmpeg's `AV_NOPTS_VALUE`.
const NO_PTS: i64 = i64::MIN;

fn stream_start_pts(start_time: i64) -> Option<i64> {
    (start_time != NO_PTS).then_some(start_time)
}

/// Zero-based frame index of a presentation timestamp.
///
/// Indices count from `start_pts`, the stream's first timestamp, so
/// containers that do not start at zero (MPEG-TS, some QuickTime files)
/// still number their first frame 0. Timestamps before the start map to 0.
///
/// # Example
///
/// ```
/// use ffmpeg_next::Rational;
/// use markscan::source::pts_to_frame_index;
///
/// let time_base = Rational::new(1, 90_000);
/// assert_eq!(pts_to_frame_index(129_600, Some(126_000), time_base, 25.0), 1);
/// ```
pub fn pts_to_frame_index(
    pts: i64,
    start_pts: Option<i64>,
    time_base: Rational,
    frames_per_second: f64,
) -> u64 {
    let ticks = pts.saturating_sub(start_pts.unwrap_or(0));
    let seconds = ticks as f64 * time_base.numerator() as f64 / time_base.denominator() as f64;
    (seconds * frames_per_second).round().max(0.0) as u64
}

/// Copy an RGB24 plane into a tightly packed image, dropping row padding.
fn rgb_frame_to_image(rgb_frame: &VideoFrame, width: u32, height: u32) -> Option<RgbImage> {
    let stride = rgb_frame.stride(0);
    let row_bytes = width as usize * 3;
    let data = rgb_frame.data(0);

    let buffer = if stride == row_bytes {
        data.get(..row_bytes * height as usize)?.to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            buffer.extend_from_slice(data.get(start..start + row_bytes)?);
        }
        buffer
    };
    RgbImage::from_raw(width, height, buffer)
}

/// Frames held in memory.
///
/// # Example
///
/// ```
/// use image::RgbImage;
/// use markscan::{FrameSequence, FrameSource};
///
/// let frames = vec![RgbImage::new(64, 36); 10];
/// let sequence = FrameSequence::new(frames, 25.0);
/// assert_eq!(sequence.info().frame_count, 10);
/// ```
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<RgbImage>,
    info: VideoInfo,
}

impl FrameSequence {
    /// Wrap a list of frames played back at `frames_per_second`.
    ///
    /// Dimensions are taken from the first frame.
    pub fn new(frames: Vec<RgbImage>, frames_per_second: f64) -> Self {
        let (width, height) = frames.first().map_or((0, 0), |frame| frame.dimensions());
        let info = VideoInfo::new(width, height, frames_per_second, frames.len() as u64);
        Self { frames, info }
    }

    /// Render `count` frames with `render(index)`.
    pub fn from_fn<F>(count: u64, frames_per_second: f64, render: F) -> Self
    where
        F: FnMut(u64) -> RgbImage,
    {
        Self::new((0..count).map(render).collect(), frames_per_second)
    }
}

impl FrameSource for FrameSequence {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn for_each_frame(
        &mut self,
        range: Range<u64>,
        handler: &mut dyn FnMut(Frame) -> Result<(), ScanError>,
    ) -> Result<(), ScanError> {
        let end = range.end.min(self.frames.len() as u64);
        for index in range.start..end {
            handler(Frame {
                index,
                image: self.frames[index as usize].clone(),
            })?;
        }
        Ok(())
    }
}
