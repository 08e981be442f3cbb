//! 地形高程
//!
//! Height lookup for a geodetic point. A miss (outside the raster, NoData,
//! no raster loaded) is normal and reported as `None`.
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use ndarray::Array2;

use crate::error::{NavError, Result};

pub trait TerrainOracle {
    /// Terrain height [m] at a WGS84 point.
    fn sample_lat_lon(&self, latitude_deg: f64, longitude_deg: f64) -> Option<f64>;
}

const NODATA_TOLERANCE: f32 = 1e-5;

/// Affine pixel grid, north-up: `x = origin_x + col * pixel_x`,
/// `y = origin_y + row * pixel_y` with `pixel_y < 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_x: f64,
    pub origin_y: f64,
    pub pixel_y: f64,
}

impl GeoTransform {
    /// (row, col) containing `(x, y)`, possibly out of the raster.
    pub fn cell(&self, x: f64, y: f64) -> (i64, i64) {
        let col = ((x - self.origin_x) / self.pixel_x).floor() as i64;
        let row = ((y - self.origin_y) / self.pixel_y).floor() as i64;
        (row, col)
    }
}

/// ESRI ASCII grid in geographic coordinates (degrees).
#[derive(Debug, Clone)]
pub struct AsciiGrid {
    heights: Array2<f32>,
    transform: GeoTransform,
    nodata: Option<f32>,
}

#[derive(Default)]
struct Header {
    ncols: Option<usize>,
    nrows: Option<usize>,
    xll: Option<(f64, bool)>,
    yll: Option<(f64, bool)>,
    cellsize: Option<f64>,
    nodata: Option<f32>,
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| NavError::Terrain(format!("bad value {:?} for {}", value, key)))
}

fn missing(key: &str) -> NavError {
    NavError::Terrain(format!("missing header {}", key))
}

impl AsciiGrid {
    pub fn new(heights: Array2<f32>, transform: GeoTransform, nodata: Option<f32>) -> Self {
        Self {
            heights,
            transform,
            nodata,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|source| NavError::Input {
            path: path.to_path_buf(),
            source,
        })?;
        let grid = Self::from_reader(file)?;
        let (rows, cols) = grid.heights.dim();
        log::info!("terrain grid {:?}: {}x{} cells", path, cols, rows);
        Ok(grid)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let reader = BufReader::new(reader);
        let mut header = Header::default();
        let mut values: Vec<f32> = Vec::new();

        for line in reader.lines() {
            let line = line.map_err(|e| NavError::Terrain(e.to_string()))?;
            let mut tokens = line.split_whitespace().peekable();
            let Some(first) = tokens.peek().copied() else {
                continue;
            };
            if first.starts_with(|c: char| c.is_ascii_alphabetic()) && values.is_empty() {
                let key = first.to_ascii_lowercase();
                tokens.next();
                let value = tokens.next().ok_or_else(|| missing(&key))?;
                match key.as_str() {
                    "ncols" => header.ncols = Some(parse_value(&key, value)?),
                    "nrows" => header.nrows = Some(parse_value(&key, value)?),
                    "xllcorner" => header.xll = Some((parse_value(&key, value)?, false)),
                    "xllcenter" => header.xll = Some((parse_value(&key, value)?, true)),
                    "yllcorner" => header.yll = Some((parse_value(&key, value)?, false)),
                    "yllcenter" => header.yll = Some((parse_value(&key, value)?, true)),
                    "cellsize" => header.cellsize = Some(parse_value(&key, value)?),
                    "nodata_value" => header.nodata = Some(parse_value(&key, value)?),
                    _ => log::debug!("terrain grid: unknown header {}", key),
                }
                continue;
            }
            for token in tokens {
                values.push(parse_value("cell", token)?);
            }
        }

        let ncols = header.ncols.ok_or_else(|| missing("ncols"))?;
        let nrows = header.nrows.ok_or_else(|| missing("nrows"))?;
        let cellsize = header.cellsize.ok_or_else(|| missing("cellsize"))?;
        let (xll, x_center) = header.xll.ok_or_else(|| missing("xllcorner"))?;
        let (yll, y_center) = header.yll.ok_or_else(|| missing("yllcorner"))?;
        if cellsize <= 0.0 {
            return Err(NavError::Terrain(format!("cellsize {} must be positive", cellsize)));
        }
        let half = cellsize / 2.0;
        let left = if x_center { xll - half } else { xll };
        let bottom = if y_center { yll - half } else { yll };

        let heights = Array2::from_shape_vec((nrows, ncols), values).map_err(|_| {
            NavError::Terrain(format!("expected {} x {} cells", nrows, ncols))
        })?;
        let transform = GeoTransform {
            origin_x: left,
            pixel_x: cellsize,
            origin_y: bottom + nrows as f64 * cellsize,
            pixel_y: -cellsize,
        };
        Ok(Self::new(heights, transform, header.nodata))
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }
}

impl TerrainOracle for AsciiGrid {
    fn sample_lat_lon(&self, latitude_deg: f64, longitude_deg: f64) -> Option<f64> {
        let (row, col) = self.transform.cell(longitude_deg, latitude_deg);
        let (rows, cols) = self.heights.dim();
        if row < 0 || col < 0 || row >= rows as i64 || col >= cols as i64 {
            return None;
        }
        let sample = self.heights[(row as usize, col as usize)];
        if sample.is_nan() {
            return None;
        }
        if let Some(nodata) = self.nodata {
            if (sample - nodata).abs() <= NODATA_TOLERANCE {
                return None;
            }
        }
        Some(sample as f64)
    }
}
