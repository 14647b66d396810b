use byteorder::{ByteOrder, LittleEndian};

pub fn write_u32_le(
    buf: &mut Vec<u8>,
    val: u32,
) {
    let mut b = [0u8; 4];
    LittleEndian::write_u32(&mut b, val);
    buf.extend_from_slice(&b);
}

pub fn write_f64_le(
    buf: &mut Vec<u8>,
    val: f64,
) {
    let mut b = [0u8; 8];
    LittleEndian::write_f64(&mut b, val);
    buf.extend_from_slice(&b);
}

/// Пишет строку в поле `len` байт: длинная строка обрезается (по границе
/// символа), короткая дополняется NUL.
pub fn write_fixed_str(
    buf: &mut Vec<u8>,
    s: &str,
    len: usize,
) {
    let bytes = truncate_to_boundary(s, len).as_bytes();
    buf.extend_from_slice(bytes);
    buf.resize(buf.len() + (len - bytes.len()), 0);
}

/// Значения f32 подряд.
pub fn write_f32_iter_le<'a, I>(
    buf: &mut Vec<u8>,
    values: I,
) where
    I: IntoIterator<Item = &'a f32>,
{
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

/// Самый длинный префикс `s` не длиннее `len` байт, не разрывающий символ.
pub fn truncate_to_boundary(
    s: &str,
    len: usize,
) -> &str {
    if s.len() <= len {
        return s;
    }

    let mut end = len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
