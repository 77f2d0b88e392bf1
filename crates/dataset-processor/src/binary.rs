//! Fixed-layout binary record files (e.g. buoy feeds), filtered down to the
//! requirement's time window and extent.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use storm_common::{BoundingBox, FieldSpec, StormResult};

use crate::context::{ProcessorContext, ProcessorSummary};
use crate::error::{ProcessorError, ProcessorResult};
use crate::processor::{DatasetProcessor, FetchOutcome};
use crate::raw::RawFileProcessor;

pub const FIELD_TIME: &str = "time";
pub const FIELD_LAT: &str = "lat";
pub const FIELD_LON: &str = "lon";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Float,
    Int,
    UInt,
    Bool,
    Bytes,
}

/// A numpy-style scalar type such as `<f8`, `>i4`, `u1` or `S10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldType {
    pub kind: FieldKind,
    pub size: usize,
    pub big_endian: bool,
}

impl FieldType {
    pub fn parse(dtype: &str) -> ProcessorResult<Self> {
        let invalid = || ProcessorError::InvalidParams(format!("unsupported dtype '{}'", dtype));

        let (big_endian, rest) = match dtype.chars().next() {
            Some('>') | Some('!') => (true, &dtype[1..]),
            Some('<') => (false, &dtype[1..]),
            Some('=') | Some('|') => (cfg!(target_endian = "big"), &dtype[1..]),
            _ => (cfg!(target_endian = "big"), dtype),
        };

        let mut chars = rest.chars();
        let code = chars.next().ok_or_else(invalid)?;
        let digits = chars.as_str();
        let size = if digits.is_empty() {
            None
        } else {
            Some(digits.parse::<usize>().map_err(|_| invalid())?)
        };

        let (kind, size) = match (code, size) {
            ('f', Some(s @ (4 | 8))) => (FieldKind::Float, s),
            ('f', None) => (FieldKind::Float, 8),
            ('i', Some(s @ (1 | 2 | 4 | 8))) => (FieldKind::Int, s),
            ('i', None) => (FieldKind::Int, 8),
            ('u', Some(s @ (1 | 2 | 4 | 8))) => (FieldKind::UInt, s),
            ('u', None) => (FieldKind::UInt, 8),
            ('b', None | Some(1)) | ('?', None) => (FieldKind::Bool, 1),
            ('S', Some(s)) | ('a', Some(s)) if s > 0 => (FieldKind::Bytes, s),
            _ => return Err(invalid()),
        };

        Ok(Self {
            kind,
            size,
            big_endian,
        })
    }

    /// Numeric value of one encoded field, or `None` for non-numeric kinds.
    pub fn read_f64(&self, raw: &[u8]) -> Option<f64> {
        macro_rules! num {
            ($t:ty) => {{
                let bytes: [u8; std::mem::size_of::<$t>()] = raw.try_into().ok()?;
                if self.big_endian {
                    <$t>::from_be_bytes(bytes) as f64
                } else {
                    <$t>::from_le_bytes(bytes) as f64
                }
            }};
        }

        Some(match (self.kind, self.size) {
            (FieldKind::Float, 4) => num!(f32),
            (FieldKind::Float, 8) => num!(f64),
            (FieldKind::Int, 1) => num!(i8),
            (FieldKind::Int, 2) => num!(i16),
            (FieldKind::Int, 4) => num!(i32),
            (FieldKind::Int, 8) => num!(i64),
            (FieldKind::UInt, 1) => num!(u8),
            (FieldKind::UInt, 2) => num!(u16),
            (FieldKind::UInt, 4) => num!(u32),
            (FieldKind::UInt, 8) => num!(u64),
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutField {
    pub name: String,
    pub ty: FieldType,
    pub offset: usize,
}

/// Packed record layout built from caller-supplied field specs.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLayout {
    fields: Vec<LayoutField>,
    record_size: usize,
}

impl RecordLayout {
    pub fn from_specs(specs: &[FieldSpec]) -> ProcessorResult<Self> {
        let mut fields = Vec::with_capacity(specs.len());
        let mut offset = 0;
        for spec in specs {
            let ty = FieldType::parse(&spec.dtype)?;
            fields.push(LayoutField {
                name: spec.name.clone(),
                ty,
                offset,
            });
            offset += ty.size;
        }

        if offset == 0 {
            return Err(ProcessorError::InvalidParams("empty record layout".to_string()));
        }

        let layout = Self {
            fields,
            record_size: offset,
        };
        for name in [FIELD_TIME, FIELD_LAT, FIELD_LON] {
            match layout.field(name) {
                Some(f) if f.ty.read_f64(&vec![0; f.ty.size]).is_some() => {}
                Some(_) => {
                    return Err(ProcessorError::InvalidParams(format!(
                        "record field '{}' must be numeric",
                        name
                    )))
                }
                None => {
                    return Err(ProcessorError::InvalidParams(format!(
                        "record layout has no '{}' field",
                        name
                    )))
                }
            }
        }

        Ok(layout)
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn field(&self, name: &str) -> Option<&LayoutField> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn value(&self, name: &str, record: &[u8]) -> Option<f64> {
        let field = self.field(name)?;
        field
            .ty
            .read_f64(&record[field.offset..field.offset + field.ty.size])
    }
}

/// Bounds a record must satisfy on every axis.
#[derive(Debug, Clone, Copy)]
pub struct RecordBounds {
    pub time: (f64, f64),
    /// Unsigned-longitude extent
    pub extent: BoundingBox,
}

impl RecordBounds {
    fn keeps(&self, layout: &RecordLayout, record: &[u8]) -> bool {
        let within = |v: Option<f64>, lo: f64, hi: f64| v.map_or(false, |v| v >= lo && v <= hi);

        within(layout.value(FIELD_TIME, record), self.time.0, self.time.1)
            && within(
                layout.value(FIELD_LAT, record),
                self.extent.min_y,
                self.extent.max_y,
            )
            && within(
                layout.value(FIELD_LON, record),
                self.extent.min_x,
                self.extent.max_x,
            )
    }
}

/// Retained records, packed back to back.
pub fn filter_records(data: &[u8], layout: &RecordLayout, bounds: &RecordBounds) -> (Vec<u8>, usize) {
    let size = layout.record_size();
    let trailing = data.len() % size;
    if trailing != 0 {
        warn!(trailing, record_size = size, "Ignoring partial trailing record");
    }

    let mut kept = Vec::new();
    let mut count = 0;
    for record in data.chunks_exact(size) {
        if bounds.keeps(layout, record) {
            kept.extend_from_slice(record);
            count += 1;
        }
    }
    (kept, count)
}

/// Rewrite `path` with only the records inside `bounds`; remove it when
/// none survive. Returns the retained record count.
pub fn filter_file(path: &Path, layout: &RecordLayout, bounds: &RecordBounds) -> ProcessorResult<usize> {
    let data = std::fs::read(path)?;
    let (kept, count) = filter_records(&data, layout, bounds);

    if count == 0 {
        std::fs::remove_file(path)?;
        return Ok(0);
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let permissions = std::fs::metadata(path)?.permissions();
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(&kept)?;
    temp.as_file().sync_all()?;
    std::fs::set_permissions(temp.path(), permissions)?;
    temp.persist(path)?;

    Ok(count)
}

pub struct StructuredBinaryProcessor {
    raw: RawFileProcessor,
    layout: RecordLayout,
}

impl StructuredBinaryProcessor {
    pub fn new(ctx: ProcessorContext) -> ProcessorResult<Self> {
        let specs = ctx.params.record_layout.clone().ok_or_else(|| {
            ProcessorError::InvalidParams("structured binary needs a record layout".to_string())
        })?;
        let layout = RecordLayout::from_specs(&specs)?;
        Ok(Self {
            raw: RawFileProcessor::new(ctx)?,
            layout,
        })
    }

    fn bounds(&self) -> RecordBounds {
        let ctx = self.raw.context();
        RecordBounds {
            time: ctx.requirement.window.unix_bounds(ctx.params.epoch_offset()),
            extent: ctx.requirement.geo.to_unsigned_longitude(),
        }
    }

    async fn run(&self) -> ProcessorResult<FetchOutcome> {
        self.raw.download().await?;

        let path = self.raw.output_path().to_path_buf();
        let layout = self.layout.clone();
        let bounds = self.bounds();
        let target = path.clone();
        let kept =
            tokio::task::spawn_blocking(move || filter_file(&target, &layout, &bounds)).await??;

        if kept == 0 {
            info!(url = %self.raw.context().url, "Skipping dataset with no values");
            return Ok(FetchOutcome::Skipped {
                reason: "no records inside the time window and extent".to_string(),
            });
        }

        info!(path = %path.display(), records = kept, "Filtered binary records");
        Ok(FetchOutcome::Written { path })
    }
}

#[async_trait]
impl DatasetProcessor for StructuredBinaryProcessor {
    async fn fetch(&mut self) -> StormResult<FetchOutcome> {
        let result = self.run().await;
        self.raw.settle(result)
    }

    fn summary(&self) -> ProcessorSummary {
        self.raw.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::generators::{buoy_layout, buoy_records_bytes, BuoyRecord};

    fn bounds() -> RecordBounds {
        RecordBounds {
            time: (1000.0, 2000.0),
            extent: BoundingBox::new(-97.5, 28.2, -91.0, 33.3).to_unsigned_longitude(),
        }
    }

    fn record(time: f64, lat: f32, lon: f32) -> BuoyRecord {
        BuoyRecord {
            time,
            lat,
            lon,
            wind_speed: 12.5,
        }
    }

    #[test]
    fn test_parse_dtypes() {
        assert_eq!(
            FieldType::parse("<f8").unwrap(),
            FieldType { kind: FieldKind::Float, size: 8, big_endian: false }
        );
        assert_eq!(FieldType::parse(">i4").unwrap().size, 4);
        assert!(FieldType::parse(">i4").unwrap().big_endian);
        assert_eq!(FieldType::parse("S10").unwrap().kind, FieldKind::Bytes);
        assert!(FieldType::parse("<c16").is_err());
    }

    #[test]
    fn test_layout_requires_positional_fields() {
        let err = RecordLayout::from_specs(&[FieldSpec::new("time", "<f8")]).unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidParams(_)));

        let err = RecordLayout::from_specs(&[
            FieldSpec::new("time", "S8"),
            FieldSpec::new("lat", "<f4"),
            FieldSpec::new("lon", "<f4"),
        ])
        .unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidParams(_)));
    }

    #[test]
    fn test_filter_keeps_records_inside_every_bound() {
        let layout = RecordLayout::from_specs(&buoy_layout()).unwrap();
        let records = [
            record(1500.0, 29.0, 265.0),  // inside
            record(500.0, 29.0, 265.0),   // too early
            record(1500.0, 40.0, 265.0),  // too far north
            record(1500.0, 29.0, 250.0),  // too far west
            record(2000.0, 33.3, 269.0),  // on the closed upper bounds
        ];
        let (kept, count) = filter_records(&buoy_records_bytes(&records), &layout, &bounds());

        assert_eq!(count, 2);
        assert_eq!(kept, buoy_records_bytes(&[records[0], records[4]]));
    }

    #[test]
    fn test_filter_file_removes_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("42001");
        std::fs::write(&path, buoy_records_bytes(&[record(10.0, 29.0, 265.0)])).unwrap();

        let layout = RecordLayout::from_specs(&buoy_layout()).unwrap();
        assert_eq!(filter_file(&path, &layout, &bounds()).unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_filter_file_rewrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("42001");
        let records = [record(1200.0, 30.0, 266.0), record(3000.0, 30.0, 266.0)];
        std::fs::write(&path, buoy_records_bytes(&records)).unwrap();

        let layout = RecordLayout::from_specs(&buoy_layout()).unwrap();
        assert_eq!(filter_file(&path, &layout, &bounds()).unwrap(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), buoy_records_bytes(&records[..1]));
    }
}
