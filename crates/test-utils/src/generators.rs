//! Synthetic data generators: fixed-layout buoy records and mesh node
//! coordinates with known nearest neighbours.

use storm_common::FieldSpec;

/// One synthetic buoy observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuoyRecord {
    pub time: f64,
    pub lat: f32,
    pub lon: f32,
    pub wind_speed: f32,
}

/// Layout matching [`buoy_records_bytes`]: `<f8` time, `<f4` lat, `<f4` lon,
/// `<f4` wind speed (20 bytes per record).
pub fn buoy_layout() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new("time", "<f8"),
        FieldSpec::new("lat", "<f4"),
        FieldSpec::new("lon", "<f4"),
        FieldSpec::new("wspd", "<f4"),
    ]
}

/// Pack records little-endian per [`buoy_layout`].
pub fn buoy_records_bytes(records: &[BuoyRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * 20);
    for r in records {
        out.extend_from_slice(&r.time.to_le_bytes());
        out.extend_from_slice(&r.lat.to_le_bytes());
        out.extend_from_slice(&r.lon.to_le_bytes());
        out.extend_from_slice(&r.wind_speed.to_le_bytes());
    }
    out
}

/// Evenly spaced ascending axis.
pub fn sorted_axis(start: f64, step: f64, len: usize) -> Vec<f64> {
    (0..len).map(|i| start + step * i as f64).collect()
}

/// Node coordinates of a regular `nx` x `ny` lattice flattened row-major,
/// returned as `(ys, xs)` parallel arrays.
pub fn mesh_lattice(x0: f64, y0: f64, step: f64, nx: usize, ny: usize) -> (Vec<f64>, Vec<f64>) {
    let mut ys = Vec::with_capacity(nx * ny);
    let mut xs = Vec::with_capacity(nx * ny);
    for row in 0..ny {
        for col in 0..nx {
            ys.push(y0 + step * row as f64);
            xs.push(x0 + step * col as f64);
        }
    }
    (ys, xs)
}

/// Index of the nearest node by exhaustive search, lowest index on ties.
pub fn brute_force_nearest(ys: &[f64], xs: &[f64], y: f64, x: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, (ny, nx)) in ys.iter().zip(xs).enumerate() {
        let d = (ny - y).powi(2) + (nx - x).powi(2);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buoy_record_size() {
        let bytes = buoy_records_bytes(&[BuoyRecord {
            time: 0.0,
            lat: 0.0,
            lon: 0.0,
            wind_speed: 0.0,
        }]);
        assert_eq!(bytes.len(), 20);
    }

    #[test]
    fn test_mesh_lattice_layout() {
        let (ys, xs) = mesh_lattice(-95.0, 29.0, 0.5, 3, 2);
        assert_eq!(xs, vec![-95.0, -94.5, -94.0, -95.0, -94.5, -94.0]);
        assert_eq!(ys, vec![29.0, 29.0, 29.0, 29.5, 29.5, 29.5]);
    }
}
