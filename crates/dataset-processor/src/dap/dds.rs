//! DAP2 Dataset Descriptor Structure parsing.

use serde::Serialize;

use super::lexer::{tokenize, Tokens};
use crate::error::{ProcessorError, ProcessorResult};

/// Atomic DAP2 types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DapType {
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
    String,
    Url,
}

impl DapType {
    fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "byte" => DapType::Byte,
            "int16" => DapType::Int16,
            "uint16" => DapType::UInt16,
            "int32" => DapType::Int32,
            "uint32" => DapType::UInt32,
            "float32" => DapType::Float32,
            "float64" => DapType::Float64,
            "string" => DapType::String,
            "url" => DapType::Url,
            _ => return None,
        })
    }

    pub fn is_text(&self) -> bool {
        matches!(self, DapType::String | DapType::Url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dim {
    pub name: String,
    pub size: usize,
}

/// A scalar (no dims) or array of an atomic type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayDecl {
    pub ty: DapType,
    pub name: String,
    pub dims: Vec<Dim>,
}

impl ArrayDecl {
    pub fn dim_names(&self) -> Vec<&str> {
        self.dims.iter().map(|d| d.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Decl {
    Base(ArrayDecl),
    Grid {
        name: String,
        array: ArrayDecl,
        maps: Vec<ArrayDecl>,
    },
    Structure {
        name: String,
        fields: Vec<Decl>,
    },
    Sequence {
        name: String,
        fields: Vec<Decl>,
    },
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Base(a) => &a.name,
            Decl::Grid { name, .. } | Decl::Structure { name, .. } | Decl::Sequence { name, .. } => {
                name
            }
        }
    }

    /// Dimensions of an array-shaped declaration; empty for constructors.
    pub fn dims(&self) -> &[Dim] {
        match self {
            Decl::Base(a) => &a.dims,
            Decl::Grid { array, .. } => &array.dims,
            _ => &[],
        }
    }
}

/// A parsed DDS.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dds {
    pub name: String,
    pub decls: Vec<Decl>,
}

impl Dds {
    pub fn parse(src: &str) -> ProcessorResult<Self> {
        let mut tokens = Tokens::new(tokenize(src, "{}[];=:,")?);

        tokens.expect_keyword("Dataset")?;
        tokens.expect('{')?;
        let decls = parse_decls(&mut tokens)?;
        let name = tokens.word()?;
        tokens.eat(';');

        Ok(Self { name, decls })
    }

    /// Names of the top-level variables.
    pub fn variable_names(&self) -> Vec<&str> {
        self.decls.iter().map(Decl::name).collect()
    }

    pub fn find(&self, name: &str) -> Option<&Decl> {
        self.decls.iter().find(|d| d.name() == name)
    }

    /// The first top-level sequence and its field names.
    pub fn sequence(&self) -> Option<(&str, Vec<&str>)> {
        self.decls.iter().find_map(|d| match d {
            Decl::Sequence { name, fields } => {
                Some((name.as_str(), fields.iter().map(Decl::name).collect()))
            }
            _ => None,
        })
    }
}

/// Declarations up to and including the closing brace.
fn parse_decls(tokens: &mut Tokens) -> ProcessorResult<Vec<Decl>> {
    let mut decls = Vec::new();
    while !tokens.eat('}') {
        decls.push(parse_decl(tokens)?);
    }
    Ok(decls)
}

fn parse_decl(tokens: &mut Tokens) -> ProcessorResult<Decl> {
    let keyword = tokens.word()?;

    match keyword.to_ascii_lowercase().as_str() {
        "grid" => {
            tokens.expect('{')?;
            tokens.expect_keyword("Array")?;
            tokens.expect(':')?;
            let array = parse_array(tokens)?;
            tokens.expect_keyword("Maps")?;
            tokens.expect(':')?;
            let mut maps = Vec::new();
            while !tokens.eat('}') {
                maps.push(parse_array(tokens)?);
            }
            let name = tokens.word()?;
            tokens.expect(';')?;
            Ok(Decl::Grid { name, array, maps })
        }
        "structure" | "sequence" => {
            tokens.expect('{')?;
            let fields = parse_decls(tokens)?;
            let name = tokens.word()?;
            tokens.expect(';')?;
            if keyword.eq_ignore_ascii_case("sequence") {
                Ok(Decl::Sequence { name, fields })
            } else {
                Ok(Decl::Structure { name, fields })
            }
        }
        _ => {
            let ty = DapType::parse(&keyword)
                .ok_or_else(|| ProcessorError::Dap(format!("unknown type '{}'", keyword)))?;
            Ok(Decl::Base(parse_array_rest(tokens, ty)?))
        }
    }
}

fn parse_array(tokens: &mut Tokens) -> ProcessorResult<ArrayDecl> {
    let keyword = tokens.word()?;
    let ty = DapType::parse(&keyword)
        .ok_or_else(|| ProcessorError::Dap(format!("unknown type '{}'", keyword)))?;
    parse_array_rest(tokens, ty)
}

fn parse_array_rest(tokens: &mut Tokens, ty: DapType) -> ProcessorResult<ArrayDecl> {
    let name = tokens.word()?;
    let mut dims = Vec::new();

    while tokens.eat('[') {
        let first = tokens.word()?;
        let (dim_name, size) = if tokens.eat('=') {
            (first, tokens.word()?)
        } else {
            (format!("{}_{}", name, dims.len()), first)
        };
        let size = size
            .parse::<usize>()
            .map_err(|_| ProcessorError::Dap(format!("bad dimension size '{}'", size)))?;
        tokens.expect(']')?;
        dims.push(Dim { name: dim_name, size });
    }
    tokens.expect(';')?;

    Ok(ArrayDecl { ty, name, dims })
}

/// Split a `.dods` response into its DDS text and XDR payload.
pub fn split_dods(body: &[u8]) -> ProcessorResult<(Dds, &[u8])> {
    for marker in [&b"\nData:\n"[..], &b"\r\nData:\r\n"[..], &b"\nData:\r\n"[..]] {
        if let Some(pos) = body.windows(marker.len()).position(|w| w == marker) {
            let text = std::str::from_utf8(&body[..pos])
                .map_err(|e| ProcessorError::Dap(format!("DDS is not UTF-8: {}", e)))?;
            return Ok((Dds::parse(text)?, &body[pos + marker.len()..]));
        }
    }
    Err(ProcessorError::Dap("missing Data: marker".to_string()))
}
