use nalgebra::Vector2;
use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use wide::{CmpLe, f64x4};

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("tuned_constants.rs");
    let mut f = File::create(&dest_path).unwrap();

    let mut parallel_threshold = 2048;

    // Calibration: time a dense radius filter over a small cloud
    let n_test = 500;
    let mut pos = Vec::with_capacity(n_test);
    for i in 0..n_test {
        let t = i as f64;
        pos.push(Vector2::new((t * 0.37) % 20.0, (t * 0.61) % 20.0));
    }
    let radius = 1.0;

    let start = Instant::now();
    for _ in 0..5 {
        let _ = dummy_radius_filter_simd(&pos, radius);
    }
    let duration = start.elapsed() / 5;
    let micros = duration.as_micros();

    if micros < 100 {
        parallel_threshold = 4096;
    } else if micros > 2000 {
        parallel_threshold = 512;
    }

    writeln!(
        f,
        "pub const TUNED_PARALLEL_THRESHOLD: usize = {};",
        parallel_threshold
    )
    .unwrap();

    println!(
        "cargo:warning=Auto-tuning: PARALLEL_THRESHOLD={}",
        parallel_threshold
    );
    println!("cargo:rerun-if-changed=build.rs");
}

fn dummy_radius_filter_simd(positions: &[Vector2<f64>], radius: f64) -> usize {
    let n = positions.len();
    let radius_sq = radius * radius;
    let radius_sq_v = f64x4::from(radius_sq);
    let mut count = 0;

    let mut px = Vec::with_capacity(n);
    let mut py = Vec::with_capacity(n);
    for p in positions {
        px.push(p.x);
        py.push(p.y);
    }

    for i in 0..n {
        let pix = f64x4::from(px[i]);
        let piy = f64x4::from(py[i]);
        let mut j = 0;
        while j + 4 <= n {
            let pjx = f64x4::from(&px[j..j + 4]);
            let pjy = f64x4::from(&py[j..j + 4]);
            let dx = pjx - pix;
            let dy = pjy - piy;
            let d2 = dx * dx + dy * dy;
            count += d2.cmp_le(radius_sq_v).move_mask().count_ones() as usize;
            j += 4;
        }
        for k in j..n {
            let dx = px[k] - px[i];
            let dy = py[k] - py[i];
            if dx * dx + dy * dy <= radius_sq {
                count += 1;
            }
        }
    }
    count
}
