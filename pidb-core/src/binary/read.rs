use byteorder::{ByteOrder, LittleEndian};

// Вызывающая сторона проверяет длину буфера заранее: срезы ниже паникуют на
// коротком буфере.

pub fn read_u32_le(
    buf: &[u8],
    off: &mut usize,
) -> u32 {
    let v = LittleEndian::read_u32(&buf[*off..*off + 4]);
    *off += 4;
    v
}

pub fn read_f64_le(
    buf: &[u8],
    off: &mut usize,
) -> f64 {
    let v = LittleEndian::read_f64(&buf[*off..*off + 8]);
    *off += 8;
    v
}

/// Читает строку из поля `len` байт, обрезая по первому NUL.
pub fn read_fixed_str(
    buf: &[u8],
    off: &mut usize,
    len: usize,
) -> String {
    let raw = &buf[*off..*off + len];
    *off += len;

    let end = raw.iter().position(|&b| b == 0).unwrap_or(len);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Читает `n` значений f32 подряд.
pub fn read_f32_slice_le(
    buf: &[u8],
    off: &mut usize,
    n: usize,
) -> Vec<f32> {
    let mut out = vec![0f32; n];
    LittleEndian::read_f32_into(&buf[*off..*off + 4 * n], &mut out);
    *off += 4 * n;
    out
}
