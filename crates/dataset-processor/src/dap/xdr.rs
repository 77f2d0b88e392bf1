//! XDR decoding of DAP2 `.dods` payloads.
//!
//! Layout rules:
//! - arrays carry their length twice, then the values (strings carry it once)
//! - bytes are packed and padded to 4; 16-bit integers take 4 bytes each
//! - sequences prefix each row with `0x5A000000` and end with `0xA5000000`
//! - grids serialise the array, then each map vector

use super::dds::{ArrayDecl, DapType, Decl, Dds, Dim};
use crate::error::{ProcessorError, ProcessorResult};

const START_OF_INSTANCE: u32 = 0x5A00_0000;
const END_OF_SEQUENCE: u32 = 0xA500_0000;

/// Decoded values of one array.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Byte(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Text(Vec<String>),
}

impl Values {
    fn empty(ty: DapType) -> Self {
        match ty {
            DapType::Byte => Values::Byte(Vec::new()),
            DapType::Int16 => Values::Int16(Vec::new()),
            DapType::UInt16 => Values::UInt16(Vec::new()),
            DapType::Int32 => Values::Int32(Vec::new()),
            DapType::UInt32 => Values::UInt32(Vec::new()),
            DapType::Float32 => Values::Float32(Vec::new()),
            DapType::Float64 => Values::Float64(Vec::new()),
            DapType::String | DapType::Url => Values::Text(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Values::Byte(v) => v.len(),
            Values::Int16(v) => v.len(),
            Values::UInt16(v) => v.len(),
            Values::Int32(v) => v.len(),
            Values::UInt32(v) => v.len(),
            Values::Float32(v) => v.len(),
            Values::Float64(v) => v.len(),
            Values::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric values widened to f64; `None` for text.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        Some(match self {
            Values::Byte(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Values::Int16(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Values::UInt16(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Values::Int32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Values::UInt32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Values::Float32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            Values::Float64(v) => v.clone(),
            Values::Text(_) => return None,
        })
    }
}

/// One decoded array with its dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedArray {
    pub name: String,
    pub dims: Vec<Dim>,
    pub values: Values,
}

/// One decoded top-level variable.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedVar {
    Array(DecodedArray),
    Grid {
        name: String,
        array: DecodedArray,
        maps: Vec<DecodedArray>,
    },
    /// Column-wise rows; every column spans the same row count.
    Sequence {
        name: String,
        columns: Vec<DecodedArray>,
        rows: usize,
    },
    Structure {
        name: String,
        fields: Vec<DecodedVar>,
    },
}

impl DecodedVar {
    pub fn name(&self) -> &str {
        match self {
            DecodedVar::Array(a) => &a.name,
            DecodedVar::Grid { name, .. }
            | DecodedVar::Sequence { name, .. }
            | DecodedVar::Structure { name, .. } => name,
        }
    }
}

/// Decode every variable of `dds` from `data`.
pub fn decode(dds: &Dds, data: &[u8]) -> ProcessorResult<Vec<DecodedVar>> {
    let mut reader = Reader { data, pos: 0 };
    dds.decls.iter().map(|d| reader.decl(d)).collect()
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> ProcessorResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                ProcessorError::Dap(format!(
                    "payload truncated at byte {} (wanted {} more)",
                    self.pos, n
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn word(&mut self) -> ProcessorResult<[u8; 4]> {
        let b = self.take(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    fn u32(&mut self) -> ProcessorResult<u32> {
        Ok(u32::from_be_bytes(self.word()?))
    }

    fn f64(&mut self) -> ProcessorResult<f64> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(f64::from_be_bytes(buf))
    }

    fn string(&mut self) -> ProcessorResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        self.take(padding(len))?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn push(&mut self, ty: DapType, out: &mut Values) -> ProcessorResult<()> {
        match out {
            Values::Byte(v) => v.push(self.u32()? as u8),
            Values::Int16(v) => v.push(self.u32()? as i32 as i16),
            Values::UInt16(v) => v.push(self.u32()? as u16),
            Values::Int32(v) => v.push(i32::from_be_bytes(self.word()?)),
            Values::UInt32(v) => v.push(self.u32()?),
            Values::Float32(v) => v.push(f32::from_be_bytes(self.word()?)),
            Values::Float64(v) => v.push(self.f64()?),
            Values::Text(v) => {
                debug_assert!(ty.is_text());
                v.push(self.string()?)
            }
        }
        Ok(())
    }

    fn array(&mut self, decl: &ArrayDecl) -> ProcessorResult<DecodedArray> {
        let mut values = Values::empty(decl.ty);

        if decl.dims.is_empty() {
            self.push(decl.ty, &mut values)?;
        } else {
            let expected: usize = decl.dims.iter().map(|d| d.size).product();
            let n = self.u32()? as usize;
            if n != expected {
                return Err(ProcessorError::Dap(format!(
                    "{} has {} values, expected {}",
                    decl.name, n, expected
                )));
            }

            match &mut values {
                Values::Text(v) => {
                    for _ in 0..n {
                        v.push(self.string()?);
                    }
                }
                Values::Byte(v) => {
                    self.u32()?;
                    v.extend_from_slice(self.take(n)?);
                    self.take(padding(n))?;
                }
                other => {
                    self.u32()?;
                    for _ in 0..n {
                        self.push(decl.ty, other)?;
                    }
                }
            }
        }

        Ok(DecodedArray {
            name: decl.name.clone(),
            dims: decl.dims.clone(),
            values,
        })
    }

    fn decl(&mut self, decl: &Decl) -> ProcessorResult<DecodedVar> {
        match decl {
            Decl::Base(array) => Ok(DecodedVar::Array(self.array(array)?)),
            Decl::Grid { name, array, maps } => {
                let array = self.array(array)?;
                let maps = maps
                    .iter()
                    .map(|m| self.array(m))
                    .collect::<ProcessorResult<Vec<_>>>()?;
                Ok(DecodedVar::Grid {
                    name: name.clone(),
                    array,
                    maps,
                })
            }
            Decl::Structure { name, fields } => {
                let fields = fields
                    .iter()
                    .map(|f| self.decl(f))
                    .collect::<ProcessorResult<Vec<_>>>()?;
                Ok(DecodedVar::Structure {
                    name: name.clone(),
                    fields,
                })
            }
            Decl::Sequence { name, fields } => self.sequence(name, fields),
        }
    }

    fn sequence(&mut self, name: &str, fields: &[Decl]) -> ProcessorResult<DecodedVar> {
        let mut columns = fields
            .iter()
            .map(|f| match f {
                Decl::Base(a) if a.dims.is_empty() => Ok((a.ty, Values::empty(a.ty))),
                other => Err(ProcessorError::Dap(format!(
                    "sequence {} field {} is not a scalar",
                    name,
                    other.name()
                ))),
            })
            .collect::<ProcessorResult<Vec<_>>>()?;

        let mut rows = 0;
        loop {
            match self.u32()? {
                START_OF_INSTANCE => {
                    for (ty, values) in columns.iter_mut() {
                        self.push(*ty, values)?;
                    }
                    rows += 1;
                }
                END_OF_SEQUENCE => break,
                marker => {
                    return Err(ProcessorError::Dap(format!(
                        "bad sequence marker {:#010x} in {}",
                        marker, name
                    )))
                }
            }
        }

        let columns = fields
            .iter()
            .zip(columns)
            .map(|(field, (_, values))| DecodedArray {
                name: field.name().to_string(),
                dims: vec![Dim {
                    name: "obs".to_string(),
                    size: rows,
                }],
                values,
            })
            .collect();

        Ok(DecodedVar::Sequence {
            name: name.to_string(),
            columns,
            rows,
        })
    }
}

fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}
