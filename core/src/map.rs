//! Static landmark map.
//!
//! The map is loaded once before filtering starts and is only ever borrowed immutably afterwards, so a
//! single instance can be shared by every particle (and every thread, with the `parallel` feature).

use serde::{Deserialize, Serialize};
use std::path::Path;

/// A point landmark with a known position in the map frame
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: i32,
    pub x: f64,
    pub y: f64,
}
impl Landmark {
    pub fn new(id: i32, x: f64, y: f64) -> Self {
        Landmark { id, x, y }
    }
}

/// Ordered collection of landmarks
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Map {
    landmarks: Vec<Landmark>,
}
impl Map {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Map { landmarks }
    }
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
    pub fn get(&self, id: i32) -> Option<&Landmark> {
        self.landmarks.iter().find(|l| l.id == id)
    }
    /// Landmarks inside the axis-aligned square of half-width `range` centred on (`x`, `y`).
    ///
    /// This is deliberately a square and not a circle: a landmark at (range, range) from the centre is
    /// inside the gate even though it is `range * sqrt(2)` away. Map order is preserved.
    pub fn gate(&self, x: f64, y: f64, range: f64) -> Vec<Landmark> {
        self.landmarks
            .iter()
            .filter(|l| (l.x - x).abs() <= range && (l.y - y).abs() <= range)
            .copied()
            .collect()
    }
    /// Reads a map from a CSV file with an `id,x,y` header.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use landmark_pf::Map;
    ///
    /// let map = Map::from_csv("./data/map.csv").expect("Failed to read map");
    /// println!("Loaded {} landmarks", map.len());
    /// ```
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut landmarks = Vec::new();
        for result in rdr.deserialize() {
            let landmark: Landmark = result?;
            landmarks.push(landmark);
        }
        Ok(Map::new(landmarks))
    }
    /// Writes the map to a CSV file with an `id,x,y` header.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for landmark in &self.landmarks {
            writer.serialize(landmark)?;
        }
        writer.flush()?;
        Ok(())
    }
}
impl From<Vec<Landmark>> for Map {
    fn from(landmarks: Vec<Landmark>) -> Self {
        Map::new(landmarks)
    }
}
