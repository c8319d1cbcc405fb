//! Benchmark workloads built on the public engine API.
//!
//! Each workload checks its own output, so a scheduling bug shows up as a
//! failed [`Report`] instead of a silently wrong timing.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use batchflow_engine::{from_fn, TaskSystem, WorkError};
use serde::Serialize;

use crate::cli::Workload;

const MANDEL_MAX_ITERATIONS: u32 = 256;
const SQRT_THRESHOLD: f32 = 0.00001;
const SQRT_CHUNK: usize = 4096;
const CHAIN_LENGTH: usize = 64;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub workload: &'static str,
    pub units: usize,
    pub elapsed_ms: f64,
    pub checksum: u64,
    pub ok: bool,
}

pub fn run(engine: &TaskSystem, workload: Workload, size: usize) -> Result<Report> {
    let started = Instant::now();
    let (name, units, checksum, ok) = match workload {
        Workload::Mandelbrot => {
            let (units, checksum, ok) = mandelbrot(engine, size)?;
            ("mandelbrot", units, checksum, ok)
        }
        Workload::Sqrt => {
            let (units, checksum, ok) = sqrt(engine, size * 1000)?;
            ("sqrt", units, checksum, ok)
        }
        Workload::Diamond => {
            let (units, checksum, ok) = diamond(engine, size)?;
            ("diamond", units, checksum, ok)
        }
        Workload::Chain => {
            let (units, checksum, ok) = chain(engine, size)?;
            ("chain", units, checksum, ok)
        }
        Workload::All => anyhow::bail!("expand Workload::All before running"),
    };
    Ok(Report {
        workload: name,
        units,
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        checksum,
        ok,
    })
}

fn mandel(c_re: f32, c_im: f32, max: u32) -> u32 {
    let (mut z_re, mut z_im) = (c_re, c_im);
    let mut i = 0;
    while i < max {
        if z_re * z_re + z_im * z_im > 4.0 {
            break;
        }
        let new_re = z_re * z_re - z_im * z_im;
        let new_im = 2.0 * z_re * z_im;
        z_re = c_re + new_re;
        z_im = c_im + new_im;
        i += 1;
    }
    i
}

fn mandel_row(width: usize, height: usize, row: usize, out: &[AtomicU32]) {
    let (x0, x1, y0, y1) = (-2.167f32, 1.167f32, -1.0f32, 1.0f32);
    let dx = (x1 - x0) / width as f32;
    let dy = (y1 - y0) / height as f32;
    let y = y0 + row as f32 * dy;
    for col in 0..width {
        let x = x0 + col as f32 * dx;
        out[row * width + col].store(mandel(x, y, MANDEL_MAX_ITERATIONS), Ordering::Relaxed);
    }
}

/// Render a `3h/2 x h` image with one unit per row and compare it against a
/// serial render.
fn mandelbrot(engine: &TaskSystem, height: usize) -> Result<(usize, u64, bool)> {
    let width = height * 3 / 2;
    let image: Arc<Vec<AtomicU32>> =
        Arc::new((0..width * height).map(|_| AtomicU32::new(0)).collect());

    let out = Arc::clone(&image);
    engine.run_sync(
        from_fn(move |row, rows| {
            mandel_row(width, rows, row, &out);
            Ok(())
        }),
        height,
    )?;

    let serial: Vec<AtomicU32> = (0..width * height).map(|_| AtomicU32::new(0)).collect();
    for row in 0..height {
        mandel_row(width, height, row, &serial);
    }

    let mut checksum = 0u64;
    let mut ok = true;
    for (got, want) in image.iter().zip(&serial) {
        let got = got.load(Ordering::Relaxed);
        checksum += u64::from(got);
        ok &= got == want.load(Ordering::Relaxed);
    }
    Ok((height, checksum, ok))
}

/// Newton iteration for `1 / sqrt(x)`, scaled back to `sqrt(x)`.
fn newton_sqrt(x: f32) -> f32 {
    let mut guess = 1.0f32;
    let mut error = (guess * guess * x - 1.0).abs();
    while error > SQRT_THRESHOLD {
        guess = (3.0 * guess - x * guess * guess * guess) * 0.5;
        error = (guess * guess * x - 1.0).abs();
    }
    x * guess
}

/// Deterministic inputs in `(0, 3)`, where the iteration converges.
fn sqrt_inputs(n: usize) -> Vec<f32> {
    let mut seed = 0x2545_f491u32;
    (0..n)
        .map(|_| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            0.001 + 2.998 * (seed >> 8) as f32 / (1u32 << 24) as f32
        })
        .collect()
}

fn sqrt(engine: &TaskSystem, n: usize) -> Result<(usize, u64, bool)> {
    let inputs = Arc::new(sqrt_inputs(n));
    let outputs: Arc<Vec<AtomicU32>> = Arc::new((0..n).map(|_| AtomicU32::new(0)).collect());
    let units = n.div_ceil(SQRT_CHUNK);

    let (input, output) = (Arc::clone(&inputs), Arc::clone(&outputs));
    engine.run_sync(
        from_fn(move |chunk, _| {
            let start = chunk * SQRT_CHUNK;
            let end = (start + SQRT_CHUNK).min(input.len());
            for i in start..end {
                output[i].store(newton_sqrt(input[i]).to_bits(), Ordering::Relaxed);
            }
            Ok(())
        }),
        units,
    )?;

    let mut checksum = 0u64;
    let mut ok = true;
    for (x, got) in inputs.iter().zip(outputs.iter()) {
        let got = f32::from_bits(got.load(Ordering::Relaxed));
        checksum = checksum.wrapping_add(u64::from(got.to_bits()));
        ok &= (got - x.sqrt()).abs() < 1e-3;
    }
    Ok((units, checksum, ok))
}

/// `fill -> {sum, sum_of_squares} -> combine`, each stage `n` units wide.
fn diamond(engine: &TaskSystem, n: usize) -> Result<(usize, u64, bool)> {
    let values: Arc<Vec<AtomicU64>> = Arc::new((0..n).map(|_| AtomicU64::new(0)).collect());
    let sum = Arc::new(AtomicU64::new(0));
    let squares = Arc::new(AtomicU64::new(0));
    let combined = Arc::new(AtomicU64::new(0));

    let v = Arc::clone(&values);
    let fill = engine.submit_async(
        from_fn(move |i, _| {
            v[i].store(i as u64 + 1, Ordering::Relaxed);
            Ok(())
        }),
        n,
        &[],
    )?;

    let (v, s) = (Arc::clone(&values), Arc::clone(&sum));
    let left = engine.submit_async(
        from_fn(move |i, _| {
            s.fetch_add(v[i].load(Ordering::Relaxed), Ordering::Relaxed);
            Ok(())
        }),
        n,
        &[fill],
    )?;

    let (v, sq) = (Arc::clone(&values), Arc::clone(&squares));
    let right = engine.submit_async(
        from_fn(move |i, _| {
            let x = v[i].load(Ordering::Relaxed);
            sq.fetch_add(x * x, Ordering::Relaxed);
            Ok(())
        }),
        n,
        &[fill],
    )?;

    let (s, sq, out) = (Arc::clone(&sum), Arc::clone(&squares), Arc::clone(&combined));
    let join = engine.submit_async(
        from_fn(move |i, _| {
            if i == 0 {
                out.store(
                    s.load(Ordering::Relaxed) + sq.load(Ordering::Relaxed),
                    Ordering::Relaxed,
                );
            }
            Ok(())
        }),
        1,
        &[left, right],
    )?;
    engine.wait(join)?;

    let n64 = n as u64;
    let expected = n64 * (n64 + 1) / 2 + n64 * (n64 + 1) * (2 * n64 + 1) / 6;
    let checksum = combined.load(Ordering::Relaxed);
    Ok((3 * n + 1, checksum, checksum == expected))
}

/// A chain of batches where every unit checks that the whole previous link
/// has finished before it runs.
fn chain(engine: &TaskSystem, width: usize) -> Result<(usize, u64, bool)> {
    let finished = Arc::new(AtomicUsize::new(0));
    let mut prev = None;
    for step in 0..CHAIN_LENGTH {
        let finished = Arc::clone(&finished);
        let deps: Vec<_> = prev.into_iter().collect();
        let id = engine.submit_async(
            from_fn(move |_, total| {
                let seen = finished.load(Ordering::SeqCst);
                if seen < step * total {
                    return Err(WorkError::Failed(format!(
                        "link {step} started after {seen} units"
                    )));
                }
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            width,
            &deps,
        )?;
        prev = Some(id);
    }
    engine.barrier()?;

    let checksum = finished.load(Ordering::SeqCst) as u64;
    Ok((CHAIN_LENGTH * width, checksum, checksum == (CHAIN_LENGTH * width) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TaskSystem {
        TaskSystem::new(4).unwrap()
    }

    #[test]
    fn newton_sqrt_converges() {
        for x in [0.01f32, 0.5, 1.0, 2.0, 2.99] {
            assert!((newton_sqrt(x) - x.sqrt()).abs() < 1e-3, "x = {x}");
        }
    }

    #[test]
    fn sqrt_inputs_stay_in_range() {
        assert!(sqrt_inputs(10_000).iter().all(|&x| x > 0.0 && x < 3.0));
    }

    #[test]
    fn mandel_escapes_outside_the_set() {
        assert_eq!(mandel(0.0, 0.0, 50), 50);
        assert!(mandel(2.0, 2.0, 50) < 2);
    }

    #[test]
    fn mandelbrot_matches_serial() {
        let report = run(&engine(), Workload::Mandelbrot, 40).unwrap();
        assert!(report.ok);
        assert_eq!(report.units, 40);
    }

    #[test]
    fn sqrt_handles_a_partial_last_chunk() {
        let (units, _, ok) = sqrt(&engine(), SQRT_CHUNK * 2 + 17).unwrap();
        assert_eq!(units, 3);
        assert!(ok);
    }

    #[test]
    fn diamond_combines_both_branches() {
        let (_, checksum, ok) = diamond(&engine(), 10).unwrap();
        assert!(ok);
        assert_eq!(checksum, 55 + 385);
    }

    #[test]
    fn chain_links_run_in_order() {
        let report = run(&engine(), Workload::Chain, 8).unwrap();
        assert!(report.ok);
        assert_eq!(report.checksum, (CHAIN_LENGTH * 8) as u64);
    }

    #[test]
    fn all_must_be_expanded_first() {
        assert!(run(&engine(), Workload::All, 4).is_err());
    }
}
