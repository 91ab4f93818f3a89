//! Synthetic forcing datasets for tests.
//!
//! Builds a reference sidecar that looks like an NWM CONUS forcing file:
//! a `(time, y, x)` `RAINRATE` array stored as zlib + shuffle `<f4`
//! chunks in a separate blob addressed by byte range, inline `x`/`y`
//! coordinates on a 1000 m pitch, and a `crs` variable carrying the NWM
//! Lambert Conformal `esri_pe_string`.
//!
//! Values follow a fixed pattern so tests can compute what to expect:
//! `value(t, row, col) = ((row * 7 + col * 13 + seed * 5 + t) % 11) * 1e-4`,
//! which is zero (and therefore skipped) on roughly one cell in eleven.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::{json, Map, Value};
use std::io::Write;

use crate::loader::MemoryFetcher;

/// Fill value written where a cell is marked missing.
pub const SYNTHETIC_FILL_VALUE: f32 = -999.0;

/// Grid pitch in metres.
pub const SYNTHETIC_PITCH: f64 = 1000.0;

/// Builder for a synthetic forcing dataset.
#[derive(Debug, Clone)]
pub struct SyntheticForcing {
    height: usize,
    width: usize,
    times: usize,
    chunk: (usize, usize),
    seed: u32,
    missing: Vec<(usize, usize)>,
    projection: Option<String>,
}

impl SyntheticForcing {
    /// A single time step grid of `height × width` cells in 16×16 chunks.
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            times: 1,
            chunk: (16, 16),
            seed: 0,
            missing: Vec::new(),
            projection: Some(projection::NWM_CONUS_PE_STRING.to_string()),
        }
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_times(mut self, times: usize) -> Self {
        self.times = times.max(1);
        self
    }

    pub fn with_chunks(mut self, rows: usize, cols: usize) -> Self {
        self.chunk = (rows.max(1), cols.max(1));
        self
    }

    /// Mark a cell as missing in every time step.
    pub fn with_missing(mut self, row: usize, col: usize) -> Self {
        self.missing.push((row, col));
        self
    }

    /// Drop the projection attribute.
    pub fn without_projection(mut self) -> Self {
        self.projection = None;
        self
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.times, self.height, self.width)
    }

    /// Stored value at a cell, before missing-value decoding.
    pub fn raw_value(&self, t: usize, row: usize, col: usize) -> f32 {
        if self.missing.contains(&(row, col)) {
            return SYNTHETIC_FILL_VALUE;
        }
        let n = (row * 7 + col * 13 + self.seed as usize * 5 + t) % 11;
        n as f32 * 1e-4
    }

    /// Decoded value at a cell; missing cells are NaN.
    pub fn value(&self, t: usize, row: usize, col: usize) -> f32 {
        if self.missing.contains(&(row, col)) {
            f32::NAN
        } else {
            self.raw_value(t, row, col)
        }
    }

    /// Every decoded value, `(t, y, x)` row-major.
    pub fn values(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.times * self.height * self.width);
        for t in 0..self.times {
            for row in 0..self.height {
                for col in 0..self.width {
                    out.push(self.value(t, row, col));
                }
            }
        }
        out
    }

    /// Cell-centre x coordinates, centred on the projection origin.
    pub fn x(&self) -> Vec<f64> {
        centred(self.width)
    }

    /// Cell-centre y coordinates, centred on the projection origin.
    pub fn y(&self) -> Vec<f64> {
        centred(self.height)
    }

    /// Build the reference document and the chunk blob it points into.
    pub fn build(&self, blob_url: &str) -> (Value, Bytes) {
        let (ch, cw) = self.chunk;
        let mut refs = Map::new();
        let mut blob = Vec::new();

        refs.insert(".zgroup".into(), json!({"zarr_format": 2}).to_string().into());
        refs.insert(
            ".zattrs".into(),
            json!({"model_output_type": "forcing"}).to_string().into(),
        );

        refs.insert(
            "RAINRATE/.zarray".into(),
            json!({
                "shape": [self.times, self.height, self.width],
                "chunks": [1, ch, cw],
                "dtype": "<f4",
                "compressor": {"id": "zlib", "level": 2},
                "filters": [{"id": "shuffle", "elementsize": 4}],
                "fill_value": SYNTHETIC_FILL_VALUE,
                "order": "C",
                "zarr_format": 2
            })
            .to_string()
            .into(),
        );
        refs.insert(
            "RAINRATE/.zattrs".into(),
            json!({
                "_ARRAY_DIMENSIONS": ["time", "y", "x"],
                "_FillValue": SYNTHETIC_FILL_VALUE,
                "units": "mm s^-1",
                "grid_mapping": "crs"
            })
            .to_string()
            .into(),
        );

        for t in 0..self.times {
            for cy in 0..self.height.div_ceil(ch) {
                for cx in 0..self.width.div_ceil(cw) {
                    let mut raw = Vec::with_capacity(ch * cw * 4);
                    for r in 0..ch {
                        for c in 0..cw {
                            let (row, col) = (cy * ch + r, cx * cw + c);
                            let v = if row < self.height && col < self.width {
                                self.raw_value(t, row, col)
                            } else {
                                SYNTHETIC_FILL_VALUE
                            };
                            raw.extend_from_slice(&v.to_le_bytes());
                        }
                    }
                    let stored = zlib(&shuffle(&raw, 4));
                    let offset = blob.len();
                    blob.extend_from_slice(&stored);
                    refs.insert(
                        format!("RAINRATE/{}.{}.{}", t, cy, cx),
                        json!([blob_url, offset, stored.len()]),
                    );
                }
            }
        }

        for (name, coords) in [("x", self.x()), ("y", self.y())] {
            refs.insert(
                format!("{}/.zarray", name),
                json!({
                    "shape": [coords.len()],
                    "chunks": [coords.len()],
                    "dtype": "<f8",
                    "compressor": null,
                    "filters": null,
                    "fill_value": "NaN",
                    "order": "C",
                    "zarr_format": 2
                })
                .to_string()
                .into(),
            );
            refs.insert(
                format!("{}/.zattrs", name),
                json!({"_ARRAY_DIMENSIONS": [name], "units": "m"}).to_string().into(),
            );
            let bytes: Vec<u8> = coords.iter().flat_map(|v| v.to_le_bytes()).collect();
            refs.insert(format!("{}/0", name), format!("base64:{}", BASE64.encode(bytes)).into());
        }

        let mut crs_attrs = json!({"_ARRAY_DIMENSIONS": [], "grid_mapping_name": "lambert_conformal_conic"});
        if let Some(wkt) = &self.projection {
            crs_attrs["esri_pe_string"] = Value::String(wkt.clone());
        }
        refs.insert(
            "crs/.zarray".into(),
            json!({
                "shape": [], "chunks": [], "dtype": "|u1", "compressor": null,
                "filters": null, "fill_value": 0, "order": "C", "zarr_format": 2
            })
            .to_string()
            .into(),
        );
        refs.insert("crs/.zattrs".into(), crs_attrs.to_string().into());

        let doc = json!({"version": 1, "refs": Value::Object(refs)});
        (doc, Bytes::from(blob))
    }

    /// Store the sidecar at `sidecar_url` and its chunk blob next to it.
    pub fn install(&self, fetcher: &MemoryFetcher, sidecar_url: &str) {
        let blob_url = format!("{}.chunks", sidecar_url);
        let (doc, blob) = self.build(&blob_url);
        fetcher.insert(sidecar_url, doc.to_string());
        fetcher.insert(blob_url, blob);
    }
}

fn centred(n: usize) -> Vec<f64> {
    let origin = -(n as f64) * SYNTHETIC_PITCH / 2.0 + SYNTHETIC_PITCH / 2.0;
    (0..n).map(|i| origin + i as f64 * SYNTHETIC_PITCH).collect()
}

/// Byte shuffle as the numcodecs `shuffle` filter stores it: byte `j` of
/// every element grouped together.
fn shuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    let count = data.len() / element_size;
    let mut out = vec![0u8; data.len()];
    for i in 0..count {
        for j in 0..element_size {
            out[j * count + i] = data[i * element_size + j];
        }
    }
    out
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail.
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceSet;

    #[test]
    fn test_pattern() {
        let s = SyntheticForcing::new(4, 4).with_missing(1, 1);
        assert!(s.value(0, 1, 1).is_nan());
        assert_eq!(s.raw_value(0, 1, 1), SYNTHETIC_FILL_VALUE);
        assert_eq!(s.value(0, 0, 0), 0.0);
        assert_eq!(s.values().len(), 16);
        assert_eq!(s.x(), vec![-1500.0, -500.0, 500.0, 1500.0]);
    }

    #[test]
    fn test_build_parses() {
        let s = SyntheticForcing::new(20, 40).with_times(2);
        let (doc, blob) = s.build("mem://blob");
        let refs = ReferenceSet::from_value("mem", doc).unwrap();
        assert_eq!(refs.variables(), vec!["RAINRATE", "crs", "x", "y"]);
        assert_eq!(refs.fill_value("RAINRATE").unwrap(), Some(SYNTHETIC_FILL_VALUE as f64));
        // 2 x ceil(20/16) x ceil(40/16) chunks.
        assert!(refs.contains("RAINRATE/1.1.2"));
        assert!(!refs.contains("RAINRATE/2.0.0"));
        assert!(!blob.is_empty());
    }

    #[test]
    fn test_shuffle_groups_bytes() {
        assert_eq!(shuffle(&[1, 2, 3, 4, 5, 6, 7, 8], 4), vec![1, 5, 2, 6, 3, 7, 4, 8]);
    }
}
