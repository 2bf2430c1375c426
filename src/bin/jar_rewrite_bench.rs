use std::env;
use std::fs::File;
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

use call_logger::rewriter::{RewriteOutcome, Rewriter, Unchanged};
use call_logger::targets::TargetSpec;
use zip::ZipArchive;

/// Runs the rewriter over every class in a jar.
///
/// `jar_rewrite_bench JAR_PATH [TARGETS]`, where `TARGETS` uses the agent
/// option syntax (`Type:method|method,...`).
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let jar_path = args.next().ok_or("usage: jar_rewrite_bench JAR_PATH [TARGETS]")?;
    let targets = Arc::new(TargetSpec::parse(args.next().as_deref()));
    let rewriter = Rewriter::new(Arc::clone(&targets));

    let file = File::open(&jar_path)?;
    let mut zip = ZipArchive::new(file)?;

    let mut total_bytes: u64 = 0;
    let mut class_files: u64 = 0;
    let mut rewritten: u64 = 0;
    let mut patched_methods: u64 = 0;
    let mut malformed: u64 = 0;

    let mut elapsed = Duration::ZERO;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(name) = entry.name().strip_suffix(".class").map(String::from) else {
            continue;
        };
        class_files += 1;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        total_bytes += bytes.len() as u64;

        let start = Instant::now();
        let outcome = rewriter.transform(&name, &bytes);
        elapsed += start.elapsed();
        match outcome {
            RewriteOutcome::Rewritten { patched, .. } => {
                rewritten += 1;
                patched_methods += patched.len() as u64;
                println!("rewrote {} [{}]", name, patched.join(", "));
            }
            RewriteOutcome::Unchanged(Unchanged::Malformed(e)) => {
                malformed += 1;
                eprintln!("malformed {}: {}", name, e);
            }
            RewriteOutcome::Unchanged(_) => {}
        }
    }

    let secs = elapsed.as_secs_f64();
    let mb = total_bytes as f64 / (1024.0 * 1024.0);
    let ns_per = if class_files > 0 {
        (elapsed.as_nanos() as f64) / (class_files as f64)
    } else {
        0.0
    };
    let mb_per_s = if secs > 0.0 { mb / secs } else { 0.0 };

    println!("jar_path={}", jar_path);
    println!("targets={}", targets);
    println!("class_files={}", class_files);
    println!("rewritten={} patched_methods={} malformed={}", rewritten, patched_methods, malformed);
    println!("total_mb={:.3}", mb);
    println!("transform_time_ms={:.3}", secs * 1000.0);
    println!("ns_per_class={:.1}", ns_per);
    println!("mb_per_s={:.2}", mb_per_s);

    Ok(())
}
