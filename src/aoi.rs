use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_ACTION: &str = "toggle";
pub const GRID_COLUMNS: u32 = 3;
pub const GRID_CARD_HEIGHT: u32 = 200;

/// Area of interest: a screen rectangle bound to a device action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aoi {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub device_id: String,
    pub action: String,
}

impl Aoi {
    pub fn new(x: i32, y: i32, width: u32, height: u32, device_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            x,
            y,
            width,
            height,
            device_id: device_id.into(),
            action: action.into(),
        }
    }

    /// Half-open on both axes: left/top edges are inside, right/bottom are not.
    pub fn contains(&self, px: i32, py: i32) -> bool {
        let (px, py) = (px as i64, py as i64);
        let (x, y) = (self.x as i64, self.y as i64);
        x <= px && px < x + self.width as i64 && y <= py && py < y + self.height as i64
    }
}

/// Ordered AOI set, rebuilt wholesale whenever the device list changes.
#[derive(Debug, Clone, Default)]
pub struct AoiRegistry {
    aois: Vec<Aoi>,
}

impl AoiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.aois.clear();
        info!("Cleared all AOIs");
    }

    pub fn add(&mut self, aoi: Aoi) {
        info!("Added AOI for {}: ({}, {}, {}, {})", aoi.device_id, aoi.x, aoi.y, aoi.width, aoi.height);
        self.aois.push(aoi);
    }

    /// First AOI in insertion order containing the point.
    pub fn hit_test(&self, x: i32, y: i32) -> Option<&Aoi> {
        self.aois.iter().find(|aoi| aoi.contains(x, y))
    }

    /// Lay devices out as cards, `cols` per row, each `screen_width / cols`
    /// wide and `card_height` tall.
    pub fn rebuild_grid<S: AsRef<str>>(&mut self, devices: &[S], screen_width: u32, cols: u32, card_height: u32) {
        self.aois.clear();
        let cols = cols.max(1);
        let card_width = screen_width / cols;
        for (i, device) in devices.iter().enumerate() {
            let i = i as u32;
            let x = (i % cols) * card_width;
            let y = (i / cols) * card_height;
            let device_id: &str = device.as_ref();
            self.aois.push(Aoi::new(x as i32, y as i32, card_width, card_height, device_id, DEFAULT_ACTION));
        }
        info!("Rebuilt AOI grid with {} devices", self.aois.len());
    }

    pub fn len(&self) -> usize {
        self.aois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aois.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Aoi> {
        self.aois.iter()
    }
}
