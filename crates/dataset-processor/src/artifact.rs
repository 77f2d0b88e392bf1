//! Self-describing NetCDF artifacts for subset datasets.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Once;

use tracing::{debug, warn};

use crate::dap::{AttrTable, AttrValue, Das, DecodedArray, DecodedVar, Values};
use crate::error::{ProcessorError, ProcessorResult};

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints diagnostics even for conditions the NetCDF
/// layer handles, e.g. probing for optional attributes. Call once early in
/// `main()`; later calls are no-ops.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and null handlers are a
        // documented way to disable error output.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Flatten decoded variables into named arrays, first occurrence winning
/// (grid maps usually repeat the top-level coordinate arrays).
fn flatten<'a>(vars: &'a [DecodedVar], out: &mut Vec<&'a DecodedArray>) {
    for var in vars {
        match var {
            DecodedVar::Array(a) => out.push(a),
            DecodedVar::Grid { array, maps, .. } => {
                out.push(array);
                out.extend(maps.iter());
            }
            DecodedVar::Sequence { columns, .. } => out.extend(columns.iter()),
            DecodedVar::Structure { fields, .. } => flatten(fields, out),
        }
    }
}

/// Write decoded variables with their DAS attributes to `path`.
///
/// Written to a sibling partial file and renamed into place, so readers
/// never see a half-written artifact.
pub fn write_artifact(path: &Path, vars: &[DecodedVar], das: &Das) -> ProcessorResult<()> {
    silence_hdf5_errors();

    let mut arrays = Vec::new();
    flatten(vars, &mut arrays);

    let mut seen = BTreeSet::new();
    arrays.retain(|a| seen.insert(a.name.clone()));

    let mut dims: BTreeMap<&str, usize> = BTreeMap::new();
    for array in &arrays {
        for dim in &array.dims {
            match dims.get(dim.name.as_str()) {
                Some(&size) if size != dim.size => {
                    return Err(ProcessorError::Dap(format!(
                        "dimension {} has sizes {} and {}",
                        dim.name, size, dim.size
                    )))
                }
                _ => {
                    dims.insert(&dim.name, dim.size);
                }
            }
        }
    }

    let partial = partial_path(path);
    if partial.exists() {
        std::fs::remove_file(&partial)?;
    }

    {
        let mut file = netcdf::create(&partial)?;

        for (name, size) in &dims {
            file.add_dimension(name, *size)?;
        }

        for array in &arrays {
            write_array(&mut file, array, das.variable(&array.name))?;
        }

        if let Some(global) = das.global() {
            for (name, value) in &global.attributes {
                if let Err(e) = file.add_attribute(name, to_netcdf(value)) {
                    warn!(attribute = %name, error = %e, "Skipping global attribute");
                }
            }
        }
    }

    std::fs::rename(&partial, path)?;
    debug!(path = %path.display(), variables = arrays.len(), "Wrote artifact");
    Ok(())
}

fn partial_path(path: &Path) -> std::path::PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.partial", name))
}

fn write_array(
    file: &mut netcdf::FileMut,
    array: &DecodedArray,
    attrs: Option<&AttrTable>,
) -> ProcessorResult<()> {
    let dims: Vec<&str> = array.dims.iter().map(|d| d.name.as_str()).collect();

    let mut var = match &array.values {
        Values::Byte(v) => {
            let mut var = file.add_variable::<u8>(&array.name, &dims)?;
            var.put_values(v, ..)?;
            var
        }
        Values::Int16(v) => {
            let mut var = file.add_variable::<i16>(&array.name, &dims)?;
            var.put_values(v, ..)?;
            var
        }
        Values::UInt16(v) => {
            let mut var = file.add_variable::<u16>(&array.name, &dims)?;
            var.put_values(v, ..)?;
            var
        }
        Values::Int32(v) => {
            let mut var = file.add_variable::<i32>(&array.name, &dims)?;
            var.put_values(v, ..)?;
            var
        }
        Values::UInt32(v) => {
            let mut var = file.add_variable::<u32>(&array.name, &dims)?;
            var.put_values(v, ..)?;
            var
        }
        Values::Float32(v) => {
            let mut var = file.add_variable::<f32>(&array.name, &dims)?;
            var.put_values(v, ..)?;
            var
        }
        Values::Float64(v) => {
            let mut var = file.add_variable::<f64>(&array.name, &dims)?;
            var.put_values(v, ..)?;
            var
        }
        Values::Text(v) => {
            if dims.len() > 1 {
                warn!(variable = %array.name, "Skipping multi-dimensional string variable");
                return Ok(());
            }
            let mut var = file.add_string_variable(&array.name, &dims)?;
            for (i, s) in v.iter().enumerate() {
                var.put_string(s, [i])?;
            }
            var
        }
    };

    if let Some(attrs) = attrs {
        for (name, value) in &attrs.attributes {
            // _FillValue must match the variable type; the library rejects mismatches
            if let Err(e) = var.put_attribute(name, to_netcdf(value)) {
                warn!(variable = %array.name, attribute = %name, error = %e, "Skipping attribute");
            }
        }
    }

    Ok(())
}

fn to_netcdf(value: &AttrValue) -> netcdf::AttributeValue {
    use netcdf::AttributeValue as A;

    match value {
        AttrValue::Byte(v) => A::Uchars(v.clone()),
        AttrValue::Short(v) => A::Shorts(v.clone()),
        AttrValue::UShort(v) => A::Ushorts(v.clone()),
        AttrValue::Int(v) => A::Ints(v.clone()),
        AttrValue::UInt(v) => A::Uints(v.clone()),
        AttrValue::Float(v) => A::Floats(v.clone()),
        AttrValue::Double(v) => A::Doubles(v.clone()),
        AttrValue::Text(v) if v.len() == 1 => A::Str(v[0].clone()),
        AttrValue::Text(v) => A::Str(v.join(", ")),
    }
}
