//! H.264 encoding and MP4 muxing.
//!
//! Frames are encoded on the fly so raw RGB never accumulates; the encoded
//! Annex B NAL stream is muxed into an in-memory MP4 at the end. SPS/PPS
//! come out of the first keyframe, payload NALs are rewritten to AVCC
//! length-prefixed form.

use crate::VideoError;
use bytes::Bytes;
use openh264::encoder::{Encoder, EncoderConfig, FrameRate, RateControlMode};
use openh264::formats::{RgbSliceU8, YUVBuffer};
use openh264::OpenH264API;
use std::io::Cursor;
use tracing::info;

pub struct VideoEncoder {
    encoder: Encoder,
    width: u32,
    height: u32,
    fps: f64,
    h264_frames: Vec<Vec<u8>>,
}

impl VideoEncoder {
    pub fn new(width: u32, height: u32, fps: f64) -> Result<Self, VideoError> {
        let config = EncoderConfig::new()
            .max_frame_rate(FrameRate::from_hz(fps as f32))
            .rate_control_mode(RateControlMode::Bitrate);
        let encoder = Encoder::with_api_config(OpenH264API::from_source(), config)
            .map_err(|e| VideoError::EncoderInit(format!("openh264 encoder: {e:?}")))?;
        Ok(VideoEncoder {
            encoder,
            width,
            height,
            fps,
            h264_frames: Vec::new(),
        })
    }

    /// Encode one tightly packed RGB frame.
    pub fn encode_frame(&mut self, rgb: &[u8]) -> Result<(), VideoError> {
        let rgb_slice = RgbSliceU8::new(rgb, (self.width as usize, self.height as usize));
        let yuv = YUVBuffer::from_rgb_source(rgb_slice);
        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| VideoError::EncodeFailed(format!("H.264 encode error: {e:?}")))?;
        self.h264_frames.push(bitstream.to_vec());
        Ok(())
    }

    /// Mux everything encoded so far into an MP4 byte buffer.
    pub fn finish_mp4(self) -> Result<Vec<u8>, VideoError> {
        if self.h264_frames.is_empty() {
            return Err(VideoError::MuxFailed("no frames to mux".into()));
        }

        let first_frame = &self.h264_frames[0];
        let nals = parse_annexb_nals(first_frame);
        let sps = nals
            .iter()
            .find(|n| (n[0] & 0x1f) == 7)
            .ok_or_else(|| VideoError::MuxFailed("no SPS in first frame".into()))?;
        let pps = nals
            .iter()
            .find(|n| (n[0] & 0x1f) == 8)
            .ok_or_else(|| VideoError::MuxFailed("no PPS in first frame".into()))?;

        let mp4_config = mp4::Mp4Config {
            major_brand: str::parse("isom").map_err(|_| VideoError::MuxFailed("brand".into()))?,
            minor_version: 512,
            compatible_brands: vec![
                str::parse("isom").map_err(|_| VideoError::MuxFailed("brand".into()))?,
                str::parse("iso2").map_err(|_| VideoError::MuxFailed("brand".into()))?,
                str::parse("avc1").map_err(|_| VideoError::MuxFailed("brand".into()))?,
                str::parse("mp41").map_err(|_| VideoError::MuxFailed("brand".into()))?,
            ],
            timescale: 1000,
        };

        let writer = Cursor::new(Vec::new());
        let mut mp4_writer = mp4::Mp4Writer::write_start(writer, &mp4_config)
            .map_err(|e| VideoError::MuxFailed(format!("{e:?}")))?;

        let track_config = mp4::TrackConfig {
            track_type: mp4::TrackType::Video,
            timescale: 1000,
            language: "und".to_string(),
            media_conf: mp4::MediaConfig::AvcConfig(mp4::AvcConfig {
                width: self.width as u16,
                height: self.height as u16,
                seq_param_set: sps.to_vec(),
                pic_param_set: pps.to_vec(),
            }),
        };
        mp4_writer
            .add_track(&track_config)
            .map_err(|e| VideoError::MuxFailed(format!("{e:?}")))?;

        let sample_duration = (1000.0 / self.fps) as u32;
        for (frame_idx, annexb_data) in self.h264_frames.iter().enumerate() {
            if annexb_data.is_empty() {
                continue;
            }
            let nals = parse_annexb_nals(annexb_data);
            let is_sync = nals.iter().any(|n| (n[0] & 0x1f) == 5);

            let mut avcc_data = Vec::new();
            for nal in &nals {
                let nal_type = nal[0] & 0x1f;
                if nal_type == 7 || nal_type == 8 {
                    continue;
                }
                avcc_data.extend_from_slice(&(nal.len() as u32).to_be_bytes());
                avcc_data.extend_from_slice(nal);
            }
            if avcc_data.is_empty() {
                continue;
            }

            let sample = mp4::Mp4Sample {
                start_time: frame_idx as u64 * u64::from(sample_duration),
                duration: sample_duration,
                rendering_offset: 0,
                is_sync,
                bytes: Bytes::from(avcc_data),
            };
            mp4_writer
                .write_sample(1, &sample)
                .map_err(|e| VideoError::MuxFailed(format!("{e:?}")))?;
        }

        mp4_writer
            .write_end()
            .map_err(|e| VideoError::MuxFailed(format!("{e:?}")))?;

        let buffer = mp4_writer.into_writer().into_inner();
        info!(bytes = buffer.len(), "video muxed");
        Ok(buffer)
    }
}

/// Parse an Annex B byte stream into NAL units (without start codes).
fn parse_annexb_nals(data: &[u8]) -> Vec<&[u8]> {
    let mut nals = Vec::new();
    let mut i = 0;
    while i < data.len() {
        if i + 2 < data.len() && data[i] == 0 && data[i + 1] == 0 {
            let start = if i + 3 < data.len() && data[i + 2] == 0 && data[i + 3] == 1 {
                i + 4
            } else if data[i + 2] == 1 {
                i + 3
            } else {
                i += 1;
                continue;
            };
            let mut end = start;
            while end < data.len() {
                if end + 2 < data.len()
                    && data[end] == 0
                    && data[end + 1] == 0
                    && (data[end + 2] == 1
                        || (end + 3 < data.len() && data[end + 2] == 0 && data[end + 3] == 1))
                {
                    break;
                }
                end += 1;
            }
            if end > start {
                nals.push(&data[start..end]);
            }
            i = end;
        } else {
            i += 1;
        }
    }
    nals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annexb_parsing_handles_both_start_codes() {
        let data = [
            0, 0, 0, 1, 0x67, 0xAA, 0xBB, // SPS, 4-byte start code
            0, 0, 1, 0x68, 0xCC, // PPS, 3-byte start code
            0, 0, 0, 1, 0x65, 0x01, 0x02, 0x03, // IDR
        ];
        let nals = parse_annexb_nals(&data);
        assert_eq!(nals.len(), 3);
        assert_eq!(nals[0][0] & 0x1f, 7);
        assert_eq!(nals[1][0] & 0x1f, 8);
        assert_eq!(nals[2][0] & 0x1f, 5);
        assert_eq!(nals[2], &[0x65, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn empty_stream_has_no_nals() {
        assert!(parse_annexb_nals(&[]).is_empty());
        assert!(parse_annexb_nals(&[0, 0]).is_empty());
    }
}
