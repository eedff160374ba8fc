//! Timeline-to-frames rendering.
//!
//! The battle clock is compressed into a fixed output duration; each output
//! frame samples every tracked ship's position at the corresponding battle
//! time and draws markers, trails and the header strip.

use crate::drawing::{FrameCanvas, GREEN_TEAM, RED_TEAM, TEXT};
use crate::video::VideoEncoder;
use crate::{VideoError, CANVAS_HEIGHT, HEADER_HEIGHT, MINIMAP_SIZE};
use ab_glyph::FontVec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};
use wows_replay_parser::decoder::{Timeline, TrackPoint};
use wows_replay_parser::types::{MinimapPos, PlayerId};

/// Which color pool a roster entry draws from. Single-perspective renders
/// map ally/enemy onto green/red; dual renders map each perspective's
/// friendly team onto its own side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamSide {
    Green,
    Red,
}

impl TeamSide {
    fn rgb(self) -> (u8, u8, u8) {
        match self {
            TeamSide::Green => GREEN_TEAM,
            TeamSide::Red => RED_TEAM,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub player_id: PlayerId,
    pub name: String,
    pub ship_name: String,
    pub side: TeamSide,
}

/// One replay's contribution to the video.
pub struct RenderInput<'a> {
    pub timeline: &'a Timeline,
    pub roster: Vec<RosterEntry>,
}

/// Renderer configuration. All fields default to their standard values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub show_player_names: bool,
    pub show_ship_names: bool,
    pub show_trails: bool,
    pub show_timer: bool,
    /// TTF/OTF file for labels; labels are skipped when unset.
    pub font_path: Option<PathBuf>,
    /// Target output length in seconds; the battle is compressed to fit.
    pub output_duration_secs: f64,
    pub fps: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            show_player_names: true,
            show_ship_names: false,
            show_trails: true,
            show_timer: true,
            font_path: None,
            output_duration_secs: 60.0,
            fps: 30.0,
        }
    }
}

pub struct MinimapRenderer {
    options: RenderOptions,
    font: Option<FontVec>,
}

impl MinimapRenderer {
    pub fn new(options: RenderOptions) -> Result<Self, VideoError> {
        let font = match &options.font_path {
            Some(path) => {
                let bytes = std::fs::read(path)?;
                Some(
                    FontVec::try_from_vec(bytes)
                        .map_err(|e| VideoError::DrawFailed(format!("font load: {e}")))?,
                )
            }
            None => None,
        };
        Ok(MinimapRenderer { options, font })
    }

    /// Render one or two perspectives into an MP4.
    ///
    /// `green_tag`/`red_tag` label the header strip (clan tags in dual
    /// renders, team labels otherwise).
    pub fn render_mp4(
        &self,
        inputs: &[RenderInput<'_>],
        green_tag: &str,
        red_tag: &str,
    ) -> Result<Vec<u8>, VideoError> {
        let duration = inputs
            .iter()
            .map(|i| i.timeline.duration)
            .fold(0.0f32, f32::max);
        if duration <= 0.0 {
            return Err(VideoError::DrawFailed("timeline has no duration".into()));
        }

        let mut canvas = FrameCanvas::new(MINIMAP_SIZE, CANVAS_HEIGHT)
            .ok_or_else(|| VideoError::DrawFailed("frame allocation failed".into()))?;
        let mut encoder = VideoEncoder::new(MINIMAP_SIZE, CANVAS_HEIGHT, self.options.fps)?;

        let total_frames = (self.options.output_duration_secs * self.options.fps) as u32;
        info!(
            frames = total_frames,
            width = MINIMAP_SIZE,
            height = CANVAS_HEIGHT,
            duration,
            "rendering minimap video"
        );

        for frame in 0..total_frames {
            let t = duration * frame as f32 / total_frames as f32;
            self.draw_frame(&mut canvas, inputs, t, green_tag, red_tag);
            encoder.encode_frame(canvas.rgb_frame())?;
            if frame % 300 == 0 {
                debug!(frame, total_frames, "encoding");
            }
        }

        encoder.finish_mp4()
    }

    /// Render the single frame at battle time `t` to a PNG file. Used to
    /// inspect draw output without an encode pass.
    pub fn render_frame_png(
        &self,
        inputs: &[RenderInput<'_>],
        t: f32,
        green_tag: &str,
        red_tag: &str,
        path: &std::path::Path,
    ) -> Result<(), VideoError> {
        let mut canvas = FrameCanvas::new(MINIMAP_SIZE, CANVAS_HEIGHT)
            .ok_or_else(|| VideoError::DrawFailed("frame allocation failed".into()))?;
        self.draw_frame(&mut canvas, inputs, t, green_tag, red_tag);
        canvas.save_png(path)
    }

    fn draw_frame(
        &self,
        canvas: &mut FrameCanvas,
        inputs: &[RenderInput<'_>],
        t: f32,
        green_tag: &str,
        red_tag: &str,
    ) {
        canvas.begin_frame();

        // Header strip
        canvas.text(self.font.as_ref(), 12.0, 26.0, 20.0, GREEN_TEAM, green_tag);
        canvas.text(
            self.font.as_ref(),
            MINIMAP_SIZE as f32 - 110.0,
            26.0,
            20.0,
            RED_TEAM,
            red_tag,
        );
        if self.options.show_timer {
            let minutes = (t / 60.0) as u32;
            let seconds = (t % 60.0) as u32;
            canvas.text(
                self.font.as_ref(),
                MINIMAP_SIZE as f32 / 2.0 - 24.0,
                26.0,
                20.0,
                TEXT,
                &format!("{minutes:02}:{seconds:02}"),
            );
        }

        for input in inputs {
            for entry in &input.roster {
                let Some(entity) = input.timeline.entity_for_player(entry.player_id) else {
                    continue;
                };
                let Some(track) = input.timeline.tracks.get(&entity) else {
                    continue;
                };
                let Some((pos, heading)) = sample_track(track, t) else {
                    continue;
                };

                let rgb = entry.side.rgb();
                if self.options.show_trails {
                    for point in track.iter().filter(|p| p.clock.seconds() <= t) {
                        let (px, py) = to_canvas(point.pos);
                        canvas.circle(px, py, 1.2, rgb, 96);
                    }
                }

                let (px, py) = to_canvas(pos);
                canvas.ship_marker(px, py, heading, rgb);
                if self.options.show_player_names {
                    canvas.text(self.font.as_ref(), px + 8.0, py - 6.0, 12.0, TEXT, &entry.name);
                }
                if self.options.show_ship_names {
                    canvas.text(
                        self.font.as_ref(),
                        px + 8.0,
                        py + 8.0,
                        11.0,
                        TEXT,
                        &entry.ship_name,
                    );
                }
            }
        }
    }
}

/// Position and heading at battle time `t`, linearly interpolated between
/// the surrounding samples. `None` before the first sample.
pub fn sample_track(track: &[TrackPoint], t: f32) -> Option<(MinimapPos, f32)> {
    let mut before: Option<&TrackPoint> = None;
    let mut after: Option<&TrackPoint> = None;
    for point in track {
        if point.clock.seconds() <= t {
            before = Some(point);
        } else {
            after = Some(point);
            break;
        }
    }

    match (before, after) {
        (Some(a), Some(b)) => {
            let span = b.clock.seconds() - a.clock.seconds();
            let frac = if span > 0.0 {
                (t - a.clock.seconds()) / span
            } else {
                0.0
            };
            Some((a.pos.lerp(b.pos, frac), a.heading))
        }
        (Some(a), None) => Some((a.pos, a.heading)),
        (None, _) => None,
    }
}

fn to_canvas(pos: MinimapPos) -> (f32, f32) {
    let x = pos.x.clamp(0.0, 1.0) * MINIMAP_SIZE as f32;
    let y = HEADER_HEIGHT as f32 + (1.0 - pos.y.clamp(0.0, 1.0)) * MINIMAP_SIZE as f32;
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wows_replay_parser::types::GameClock;

    fn point(t: f32, x: f32, y: f32) -> TrackPoint {
        TrackPoint {
            clock: GameClock(t),
            pos: MinimapPos { x, y },
            heading: 0.0,
        }
    }

    #[test]
    fn track_sampling_interpolates() {
        let track = vec![point(0.0, 0.0, 0.0), point(10.0, 1.0, 0.5)];

        let (pos, _) = sample_track(&track, 5.0).unwrap();
        assert!((pos.x - 0.5).abs() < 1e-6);
        assert!((pos.y - 0.25).abs() < 1e-6);

        // Past the end the ship holds its last position.
        let (pos, _) = sample_track(&track, 99.0).unwrap();
        assert!((pos.x - 1.0).abs() < 1e-6);

        // Before the first sample there is nothing to draw.
        assert!(sample_track(&track, -1.0).is_none());
    }

    #[test]
    fn canvas_mapping_flips_north() {
        let (_, y_top) = to_canvas(MinimapPos { x: 0.5, y: 1.0 });
        let (_, y_bottom) = to_canvas(MinimapPos { x: 0.5, y: 0.0 });
        assert!(y_top < y_bottom);
        assert_eq!(y_top, HEADER_HEIGHT as f32);
    }
}
