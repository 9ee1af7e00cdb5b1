/// Playhead and span display as `HH:MM:SS:FF`.
use crate::{Fps, Frame, TimelineError};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timecode {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
}

impl Timecode {
    pub fn from_frame(frame: Frame, fps: Fps) -> Self {
        let frame = frame.max(0) as u64;
        let per_second = fps.frames_per_second() as u64;
        let total_seconds = frame / per_second;

        Self {
            hours: (total_seconds / 3600) as u32,
            minutes: ((total_seconds % 3600) / 60) as u32,
            seconds: (total_seconds % 60) as u32,
            frames: (frame % per_second) as u32,
        }
    }

    pub fn to_frame(&self, fps: Fps) -> Frame {
        let total_seconds =
            self.hours as i64 * 3600 + self.minutes as i64 * 60 + self.seconds as i64;
        total_seconds * fps.frames_per_second() as i64 + self.frames as i64
    }

    /// Parses `HH:MM:SS:FF`. A bare integer is taken as a frame count.
    pub fn parse(s: &str, fps: Fps) -> Result<Self, TimelineError> {
        let s = s.trim();
        if let Ok(frame) = s.parse::<Frame>() {
            return Ok(Self::from_frame(frame, fps));
        }

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            return Err(TimelineError::InvalidTimecode(s.to_string()));
        }
        let mut fields = [0u32; 4];
        for (slot, part) in fields.iter_mut().zip(&parts) {
            *slot = part
                .parse::<u32>()
                .map_err(|_| TimelineError::InvalidTimecode(s.to_string()))?;
        }
        let [hours, minutes, seconds, frames] = fields;

        if minutes >= 60 || seconds >= 60 || frames >= fps.frames_per_second() {
            return Err(TimelineError::InvalidTimecode(s.to_string()));
        }

        Ok(Self {
            hours,
            minutes,
            seconds,
            frames,
        })
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

/// Seconds with millisecond precision, e.g. `12.033s`.
pub fn format_seconds(frame: Frame, fps: Fps) -> String {
    format!("{:.3}s", fps.frames_to_seconds(frame))
}
