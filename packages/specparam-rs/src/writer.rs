/// EEGLAB Writer
///
/// Writes `.set` + `.fdt` pairs that `EEGLABReader` (and EEGLAB's
/// `pop_loadset`-compatible tools that read flat variables) can load. The
/// `.set` is an uncompressed MATLAB level-5 file holding `srate`, `nbchan`,
/// `pnts` and `trials` as double scalars; samples go to the `.fdt` as
/// float32 little-endian frames.
///
/// Level-5 layout: https://www.mathworks.com/help/pdf_doc/matlab/matfile_format.pdf
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const MAT_HEADER_TEXT_LEN: usize = 116;
const MI_INT8: u32 = 1;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MX_DOUBLE_CLASS: u32 = 6;

/// A double-precision MATLAB variable, values in column-major order
#[derive(Debug, Clone)]
pub struct MatVar {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f64>,
}

impl MatVar {
    pub fn scalar(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            rows: 1,
            cols: 1,
            values: vec![value],
        }
    }

    pub fn matrix(name: &str, rows: usize, cols: usize, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            rows,
            cols,
            values,
        }
    }
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(8) * 8
}

fn write_fixed_string<W: Write>(writer: &mut W, s: &str, size: usize) -> std::io::Result<()> {
    let mut buffer = vec![b' '; size];
    let bytes = s.as_bytes();
    let copy_len = bytes.len().min(size);
    buffer[..copy_len].copy_from_slice(&bytes[..copy_len]);
    writer.write_all(&buffer)
}

fn write_tag<W: Write>(writer: &mut W, data_type: u32, num_bytes: usize) -> std::io::Result<()> {
    writer.write_all(&data_type.to_le_bytes())?;
    writer.write_all(&(num_bytes as u32).to_le_bytes())
}

fn write_variable<W: Write>(writer: &mut W, var: &MatVar) -> std::io::Result<()> {
    if var.values.len() != var.rows * var.cols {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "variable '{}' has {} values for a {}x{} matrix",
                var.name,
                var.values.len(),
                var.rows,
                var.cols
            ),
        ));
    }

    let name = var.name.as_bytes();
    let name_padded = padded_len(name.len());
    let real_bytes = var.values.len() * 8;
    let body_len = (8 + 8) + (8 + 8) + (8 + name_padded) + (8 + real_bytes);

    write_tag(writer, MI_MATRIX, body_len)?;

    write_tag(writer, MI_UINT32, 8)?;
    writer.write_all(&MX_DOUBLE_CLASS.to_le_bytes())?;
    writer.write_all(&0u32.to_le_bytes())?;

    write_tag(writer, MI_INT32, 8)?;
    writer.write_all(&(var.rows as i32).to_le_bytes())?;
    writer.write_all(&(var.cols as i32).to_le_bytes())?;

    write_tag(writer, MI_INT8, name.len())?;
    writer.write_all(name)?;
    writer.write_all(&vec![0u8; name_padded - name.len()])?;

    write_tag(writer, MI_DOUBLE, real_bytes)?;
    for value in &var.values {
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

/// Write an uncompressed little-endian MATLAB level-5 file.
pub fn write_mat_file(path: &Path, vars: &[MatVar]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    write_fixed_string(
        &mut writer,
        "MATLAB 5.0 MAT-file, Platform: specparam-rs",
        MAT_HEADER_TEXT_LEN,
    )?;
    writer.write_all(&[0u8; 8])?;
    writer.write_all(&0x0100u16.to_le_bytes())?;
    writer.write_all(b"IM")?;

    for var in vars {
        write_variable(&mut writer, var)?;
    }
    writer.flush()
}

/// Write channel data as float32 frames (all channels per time point).
pub fn write_fdt(path: &Path, data: &[Vec<f64>]) -> std::io::Result<()> {
    let num_samples = data.first().map(|c| c.len()).unwrap_or(0);
    if data.iter().any(|c| c.len() != num_samples) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "all channels must have the same number of samples",
        ));
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for sample_idx in 0..num_samples {
        for channel in data {
            writer.write_all(&(channel[sample_idx] as f32).to_le_bytes())?;
        }
    }
    writer.flush()
}

/// Write a `.set` + `.fdt` pair for continuous data given in microvolts.
pub fn write_eeglab(set_path: &Path, sample_rate: f64, data: &[Vec<f64>]) -> std::io::Result<()> {
    let num_samples = data.first().map(|c| c.len()).unwrap_or(0);
    write_mat_file(
        set_path,
        &[
            MatVar::scalar("srate", sample_rate),
            MatVar::scalar("nbchan", data.len() as f64),
            MatVar::scalar("pnts", num_samples as f64),
            MatVar::scalar("trials", 1.0),
        ],
    )?;
    write_fdt(&set_path.with_extension("fdt"), data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mat_header_and_element_sizes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vars.set");
        write_mat_file(&path, &[MatVar::scalar("srate", 250.0)]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"MATLAB 5.0 MAT-file"));
        assert_eq!(&bytes[126..128], b"IM");
        // tag(8) + flags(16) + dims(16) + name(8 + 8) + real(8 + 8)
        assert_eq!(bytes.len(), 128 + 8 + 16 + 16 + 16 + 16);
        let body_len = u32::from_le_bytes([bytes[132], bytes[133], bytes[134], bytes[135]]);
        assert_eq!(body_len, 64);
    }

    #[test]
    fn test_fdt_frames_are_interleaved() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.fdt");
        write_fdt(&path, &[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(values, vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_ragged_channels_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.fdt");
        assert!(write_fdt(&path, &[vec![1.0, 2.0], vec![3.0]]).is_err());
    }
}
