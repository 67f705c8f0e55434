use crate::error::{AnalyzerError, AnalyzerResult};
use crate::extract::GrayFrame;

const GRID: usize = 8;

/// 64-bit average hash of a grayscale frame.
///
/// The frame is reduced to an 8x8 grid by exact block-range averaging
/// (every source pixel contributes to exactly one cell; no resampling),
/// then bit i (MSB-first, row-major) is set when cell i exceeds the grid
/// mean. Near-identical frames produce hashes within a small Hamming
/// distance of each other.
pub fn average_hash(frame: &GrayFrame) -> AnalyzerResult<u64> {
    if frame.width < GRID || frame.height < GRID {
        return Err(AnalyzerError::InvalidInput(format!(
            "frame {}x{} too small to hash (need at least {GRID}x{GRID})",
            frame.width, frame.height
        )));
    }
    if frame.pixels.len() != frame.width * frame.height {
        return Err(AnalyzerError::InvalidInput(
            "frame buffer does not match dimensions".to_string(),
        ));
    }

    let mut cells = [0.0f64; GRID * GRID];
    for gy in 0..GRID {
        let y0 = gy * frame.height / GRID;
        let y1 = (gy + 1) * frame.height / GRID;
        for gx in 0..GRID {
            let x0 = gx * frame.width / GRID;
            let x1 = (gx + 1) * frame.width / GRID;
            let mut sum = 0.0f64;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += frame.pixels[y * frame.width + x] as f64;
                }
            }
            cells[gy * GRID + gx] = sum / ((y1 - y0) * (x1 - x0)) as f64;
        }
    }

    let mean: f64 = cells.iter().sum::<f64>() / cells.len() as f64;

    let mut hash = 0u64;
    for (i, &cell) in cells.iter().enumerate() {
        if cell > mean {
            hash |= 1 << (63 - i);
        }
    }
    Ok(hash)
}

/// Popcount of the XOR between two 64-bit hashes.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}
