use crate::error::{AnalyzerError, AnalyzerResult};
use crate::extract::GrayFrame;
use crate::model::CameraMotionKind;

/// Best improvement below this fraction of baseline counts as no motion.
const MIN_IMPROVEMENT: f64 = 0.05;
/// Baseline MSE below this means the frames already match.
const STATIC_BASELINE: f64 = 1e-4;

/// Outcome of the translation-search motion classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionEstimate {
    pub kind: CameraMotionKind,
    pub confidence: f64,
    /// Winning shift in pixels (camera displacement from start to end;
    /// positive dx means the camera moved right).
    pub dx: i32,
    pub dy: i32,
}

/// Classify camera motion between two equal-size grayscale frames.
///
/// Brute-force searches integer shifts `dx,dy in [-k, k]`
/// (`k = clamp(width/16, 1, 4)`) for the MSE-minimizing alignment of the
/// end frame against the start frame. Translation-only: zoom is never
/// detected (see `CameraMotionKind`).
pub fn classify_motion(start: &GrayFrame, end: &GrayFrame) -> AnalyzerResult<MotionEstimate> {
    if start.width != end.width || start.height != end.height {
        return Err(AnalyzerError::InvalidInput(format!(
            "frame sizes differ: {}x{} vs {}x{}",
            start.width, start.height, end.width, end.height
        )));
    }
    if start.width == 0 || start.height == 0 {
        return Err(AnalyzerError::InvalidInput("empty frame".to_string()));
    }

    let baseline = shifted_mse(start, end, 0, 0);

    if baseline < STATIC_BASELINE {
        let confidence = (1.0 - baseline * 20.0).clamp(0.7, 0.95);
        return Ok(MotionEstimate {
            kind: CameraMotionKind::Static,
            confidence,
            dx: 0,
            dy: 0,
        });
    }

    let k = ((start.width / 16) as i32).clamp(1, 4);
    let mut best_mse = baseline;
    let mut best_dx = 0i32;
    let mut best_dy = 0i32;
    for dy in -k..=k {
        for dx in -k..=k {
            if dx == 0 && dy == 0 {
                continue;
            }
            let mse = shifted_mse(start, end, dx, dy);
            if mse < best_mse {
                best_mse = mse;
                best_dx = dx;
                best_dy = dy;
            }
        }
    }

    let improvement = (baseline - best_mse) / baseline;
    if improvement < MIN_IMPROVEMENT {
        let confidence = (1.0 - baseline * 20.0).clamp(0.7, 0.95);
        return Ok(MotionEstimate {
            kind: CameraMotionKind::Static,
            confidence,
            dx: 0,
            dy: 0,
        });
    }

    let kind = if best_dx.abs() >= best_dy.abs() && best_dx != 0 {
        if best_dx > 0 {
            CameraMotionKind::PanRight
        } else {
            CameraMotionKind::PanLeft
        }
    } else if best_dy != 0 {
        CameraMotionKind::Tilt
    } else {
        CameraMotionKind::Unknown
    };

    Ok(MotionEstimate {
        kind,
        confidence: improvement.clamp(0.25, 0.95),
        dx: best_dx,
        dy: best_dy,
    })
}

/// Mean squared error between `a` and `b` shifted by `(dx, dy)`, computed
/// over the overlapping region only.
fn shifted_mse(a: &GrayFrame, b: &GrayFrame, dx: i32, dy: i32) -> f64 {
    let w = a.width as i32;
    let h = a.height as i32;

    let x0 = dx.max(0);
    let x1 = (w + dx.min(0)).max(x0);
    let y0 = dy.max(0);
    let y1 = (h + dy.min(0)).max(y0);

    let mut sum = 0.0f64;
    let mut count = 0usize;
    for y in y0..y1 {
        for x in x0..x1 {
            let pa = a.pixels[(y * w + x) as usize] as f64;
            let pb = b.pixels[((y - dy) * w + (x - dx)) as usize] as f64;
            let d = pa - pb;
            sum += d * d;
            count += 1;
        }
    }
    if count == 0 {
        f64::MAX
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_from_fn(size: usize, f: impl Fn(i32, i32) -> f32) -> GrayFrame {
        let mut pixels = Vec::with_capacity(size * size);
        for y in 0..size {
            for x in 0..size {
                pixels.push(f(x as i32, y as i32));
            }
        }
        GrayFrame::new(size, size, pixels).unwrap()
    }

    /// Smooth horizontal gradient pattern that translates cleanly.
    fn pattern(x: i32, y: i32) -> f32 {
        (((x * 13 + y * 7).rem_euclid(32)) as f32) / 31.0
    }

    #[test]
    fn identical_frames_are_static_with_high_confidence() {
        let a = frame_from_fn(64, pattern);
        let b = a.clone();
        let est = classify_motion(&a, &b).unwrap();
        assert_eq!(est.kind, CameraMotionKind::Static);
        assert!(est.confidence >= 0.7);
        assert_eq!((est.dx, est.dy), (0, 0));
    }

    #[test]
    fn horizontal_shift_classifies_as_pan() {
        let a = frame_from_fn(64, pattern);
        // Content moved 3 px right between the two frames.
        let b = frame_from_fn(64, |x, y| pattern(x - 3, y));
        let est = classify_motion(&a, &b).unwrap();
        assert!(
            matches!(
                est.kind,
                CameraMotionKind::PanLeft | CameraMotionKind::PanRight
            ),
            "got {:?}",
            est.kind
        );
        assert_eq!(est.kind, CameraMotionKind::PanLeft);
        assert!(est.confidence >= 0.25);
    }

    #[test]
    fn vertical_shift_classifies_as_tilt() {
        let a = frame_from_fn(64, pattern);
        let b = frame_from_fn(64, |x, y| pattern(x, y - 3));
        let est = classify_motion(&a, &b).unwrap();
        assert_eq!(est.kind, CameraMotionKind::Tilt);
    }

    #[test]
    fn mismatched_sizes_are_invalid_input() {
        let a = frame_from_fn(32, pattern);
        let b = frame_from_fn(64, pattern);
        assert!(classify_motion(&a, &b).is_err());
    }

    #[test]
    fn search_radius_scales_with_width() {
        // 16px wide frame searches k=1; a 1px shift is still recoverable.
        let a = frame_from_fn(16, pattern);
        let b = frame_from_fn(16, |x, y| pattern(x - 1, y));
        let est = classify_motion(&a, &b).unwrap();
        assert_eq!(est.kind, CameraMotionKind::PanLeft);
    }

    #[test]
    fn unrelated_frames_do_not_panic() {
        let a = frame_from_fn(64, |x, y| ((x * y) % 5) as f32 / 4.0);
        let b = frame_from_fn(64, |x, y| ((x + y * 3) % 11) as f32 / 10.0);
        let est = classify_motion(&a, &b).unwrap();
        assert!(est.confidence <= 0.95);
    }
}
