//! DAP2 Dataset Attribute Structure parsing.

use std::collections::BTreeMap;

use super::lexer::{tokenize, Token, Tokens};
use crate::error::{ProcessorError, ProcessorResult};

/// Typed attribute values.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Byte(Vec<u8>),
    Short(Vec<i16>),
    UShort(Vec<u16>),
    Int(Vec<i32>),
    UInt(Vec<u32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Text(Vec<String>),
}

impl AttrValue {
    /// First text value, if this is a text attribute.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(v) => v.first().map(String::as_str),
            _ => None,
        }
    }

    fn parse(ty: &str, raw: Vec<String>) -> ProcessorResult<Self> {
        fn nums<T: std::str::FromStr>(raw: &[String]) -> ProcessorResult<Vec<T>> {
            raw.iter()
                .map(|s| {
                    s.parse::<T>()
                        .map_err(|_| ProcessorError::Dap(format!("bad attribute value '{}'", s)))
                })
                .collect()
        }

        Ok(match ty.to_ascii_lowercase().as_str() {
            "byte" => AttrValue::Byte(nums(&raw)?),
            "int16" => AttrValue::Short(nums(&raw)?),
            "uint16" => AttrValue::UShort(nums(&raw)?),
            "int32" => AttrValue::Int(nums(&raw)?),
            "uint32" => AttrValue::UInt(nums(&raw)?),
            "float32" => AttrValue::Float(nums(&raw)?),
            "float64" => AttrValue::Double(nums(&raw)?),
            _ => AttrValue::Text(raw),
        })
    }
}

/// One attribute container; containers nest for constructor types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrTable {
    pub attributes: BTreeMap<String, AttrValue>,
    pub children: BTreeMap<String, AttrTable>,
}

impl AttrTable {
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }
}

/// A parsed DAS, keyed by variable name (`NC_GLOBAL` for globals).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Das {
    pub tables: BTreeMap<String, AttrTable>,
}

impl Das {
    pub fn parse(src: &str) -> ProcessorResult<Self> {
        let mut tokens = Tokens::new(tokenize(src, "{};,")?);
        tokens.expect_keyword("Attributes")?;
        tokens.expect('{')?;
        let root = parse_table(&mut tokens)?;
        Ok(Self {
            tables: root.children,
        })
    }

    /// Attributes of a variable, looking inside sequence containers too.
    pub fn variable(&self, name: &str) -> Option<&AttrTable> {
        self.tables
            .get(name)
            .or_else(|| self.tables.values().find_map(|t| t.children.get(name)))
    }

    pub fn global(&self) -> Option<&AttrTable> {
        self.tables
            .get("NC_GLOBAL")
            .or_else(|| self.tables.get("GLOBAL"))
    }
}

/// Entries up to and including the closing brace.
fn parse_table(tokens: &mut Tokens) -> ProcessorResult<AttrTable> {
    let mut table = AttrTable::default();

    while !tokens.eat('}') {
        let first = tokens.word()?;

        if tokens.eat('{') {
            let child = parse_table(tokens)?;
            table.children.insert(first, child);
            continue;
        }

        let name = tokens.word()?;
        let mut raw = Vec::new();
        loop {
            match tokens.next()? {
                Token::Sym(';') => break,
                Token::Sym(',') => {}
                Token::Word(w) => raw.push(w),
                Token::Quoted(q) => raw.push(q),
                Token::Sym(c) => {
                    return Err(ProcessorError::Dap(format!(
                        "unexpected '{}' in attribute {}",
                        c, name
                    )))
                }
            }
        }

        if first.eq_ignore_ascii_case("alias") {
            continue;
        }
        table.attributes.insert(name, AttrValue::parse(&first, raw)?);
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAS: &str = r#"Attributes {
    time {
        String units "hours since 1800-01-01 00:00:0.0";
        Float64 actual_range 1901208.0, 1901544.0;
    }
    wind_speed {
        Float32 _FillValue -9999.0;
        String long_name "Wind speed at 10 m";
    }
    buoys {
        latitude {
            String units "degrees_north";
        }
    }
    NC_GLOBAL {
        String title "Gulf \"winds\"";
    }
}"#;

    #[test]
    fn test_parse_variable_attributes() {
        let das = Das::parse(DAS).unwrap();
        let time = das.variable("time").unwrap();
        assert_eq!(
            time.get("units").and_then(AttrValue::as_text),
            Some("hours since 1800-01-01 00:00:0.0")
        );
        assert_eq!(
            time.get("actual_range"),
            Some(&AttrValue::Double(vec![1901208.0, 1901544.0]))
        );
        assert_eq!(
            das.variable("wind_speed").unwrap().get("_FillValue"),
            Some(&AttrValue::Float(vec![-9999.0]))
        );
    }

    #[test]
    fn test_nested_sequence_fields_are_found() {
        let das = Das::parse(DAS).unwrap();
        assert_eq!(
            das.variable("latitude").unwrap().get("units").and_then(AttrValue::as_text),
            Some("degrees_north")
        );
    }

    #[test]
    fn test_global_attributes_unescape_quotes() {
        let das = Das::parse(DAS).unwrap();
        assert_eq!(
            das.global().unwrap().get("title").and_then(AttrValue::as_text),
            Some("Gulf \"winds\"")
        );
    }
}
