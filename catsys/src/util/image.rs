/// Reverse the row order of a bitmap.
pub fn flip_rows(buf: &[u8], width_in_bytes: usize) -> Vec<u8> {
    buf.chunks_exact(width_in_bytes)
        .rev()
        .flatten()
        .copied()
        .collect()
}

/// Strip the alignment padding from the end of every row.
pub fn remove_padding(
    buf: &[u8],
    width_in_bytes: usize,
    padding: usize,
) -> Vec<u8> {
    if padding == 0 {
        return buf.to_vec();
    }
    buf.chunks_exact(width_in_bytes)
        .map(|c| &c[..width_in_bytes - padding])
        .flatten()
        .copied()
        .collect()
}

/// Row length in bytes, padded to a multiple of four.
pub fn stride(width: usize, depth_bytes: usize) -> usize {
    (width * depth_bytes + 3) & !3
}
