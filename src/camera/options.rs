use std::path::PathBuf;
use std::time::Duration;

/// Which camera to open and at what viewfinder size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConstraints {
    pub device: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/video0"),
            width: 640,
            height: 480,
        }
    }
}

/// How often decode attempts are made, and over which part of the frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub fps: u32,
    pub region: Option<RegionOfInterest>,
}

impl SamplingConfig {
    /// Minimum spacing between two reported decodes
    pub fn interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            region: Some(RegionOfInterest::default()),
        }
    }
}

/// Square scan box sized relative to the shorter viewfinder edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionOfInterest {
    pub ratio: f32,
}

impl RegionOfInterest {
    /// Edge length in pixels of the scan box for a given viewfinder
    pub fn edge_for(&self, width: u32, height: u32) -> u32 {
        (width.min(height) as f32 * self.ratio.clamp(0.0, 1.0)).round() as u32
    }
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        Self { ratio: 0.7 }
    }
}
